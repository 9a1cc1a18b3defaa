// ABOUTME: Kafka-backed broker adapter over rdkafka with manual offset commits
// ABOUTME: Covers keyed produce with headers, consumer groups, and idempotent topic creation
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! Kafka broker adapter.
//!
//! Producers run idempotent with `acks=all`; consumers disable auto-commit
//! and start from the earliest retained offset, so a fresh consumer group
//! replays the full log and a restarted one resumes from its last commit.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer as KafkaConsumerApi, StreamConsumer};
use rdkafka::message::{Header, Headers as KafkaHeadersApi, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use tracing::{debug, info, warn};

use super::{Broker, ConsumedRecord, Consumer, Producer, ProducerRecord, RecordHeaders, TopicSpec};
use crate::config::Settings;
use crate::errors::{AppError, AppResult};

const PRODUCE_TIMEOUT: Duration = Duration::from_secs(30);

/// Kafka-backed broker adapter
pub struct KafkaBroker {
    base_config: ClientConfig,
    producer: Arc<KafkaProducer>,
}

impl KafkaBroker {
    /// Connect to the cluster described by the settings
    ///
    /// # Errors
    ///
    /// Returns a `BrokerError` if the producer cannot be created.
    pub fn new(settings: &Settings) -> AppResult<Self> {
        let base_config = base_client_config(settings);

        let mut producer_config = base_config.clone();
        producer_config
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .set("linger.ms", "10");
        let producer: FutureProducer = producer_config.create()?;

        info!(
            bootstrap = %settings.broker_bootstrap_servers,
            "Kafka broker adapter initialized"
        );

        Ok(Self {
            base_config,
            producer: Arc::new(KafkaProducer { producer }),
        })
    }
}

fn base_client_config(settings: &Settings) -> ClientConfig {
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", &settings.broker_bootstrap_servers)
        .set("security.protocol", &settings.broker_security_protocol);

    if !settings.broker_security_protocol.eq_ignore_ascii_case("PLAINTEXT") {
        config.set("sasl.mechanism", "PLAIN");
        if let Some(key) = &settings.broker_api_key {
            config.set("sasl.username", key);
        }
        if let Some(secret) = &settings.broker_api_secret {
            config.set("sasl.password", secret);
        }
    }
    config
}

#[async_trait]
impl Broker for KafkaBroker {
    async fn ensure_topics(&self, specs: &[TopicSpec]) -> AppResult<()> {
        let admin: AdminClient<DefaultClientContext> = self.base_config.create()?;

        let retentions: Vec<String> = specs.iter().map(|s| s.retention_ms.to_string()).collect();
        let new_topics: Vec<NewTopic<'_>> = specs
            .iter()
            .zip(retentions.iter())
            .map(|(spec, retention)| {
                NewTopic::new(&spec.name, spec.partitions, TopicReplication::Fixed(1))
                    .set("retention.ms", retention)
            })
            .collect();

        let results = admin
            .create_topics(new_topics.iter(), &AdminOptions::new())
            .await?;

        for result in results {
            match result {
                Ok(topic) => info!(topic = %topic, "Created topic"),
                Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    debug!(topic = %topic, "Topic already exists");
                }
                Err((topic, code)) => {
                    return Err(AppError::broker(format!(
                        "failed to create topic {topic}: {code}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn producer(&self) -> Arc<dyn Producer> {
        Arc::clone(&self.producer) as Arc<dyn Producer>
    }

    async fn subscribe(&self, group: &str, topics: &[String]) -> AppResult<Box<dyn Consumer>> {
        let mut config = self.base_config.clone();
        config
            .set("group.id", group)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "45000")
            .set("heartbeat.interval.ms", "10000")
            .set("max.poll.interval.ms", "300000");

        let consumer: StreamConsumer = config.create()?;
        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer.subscribe(&topic_refs)?;

        info!(group = %group, topics = ?topics, "Consumer subscribed");
        Ok(Box::new(KafkaConsumer { consumer }))
    }
}

struct KafkaProducer {
    producer: FutureProducer,
}

#[async_trait]
impl Producer for KafkaProducer {
    async fn produce(&self, record: ProducerRecord) -> AppResult<()> {
        let retry_count = record.headers.retry_count.to_string();
        let headers = OwnedHeaders::new()
            .insert(Header {
                key: "tenant_id",
                value: Some(record.headers.tenant_id.as_bytes()),
            })
            .insert(Header {
                key: "retry_count",
                value: Some(retry_count.as_bytes()),
            })
            .insert(Header {
                key: "producer",
                value: Some(record.headers.producer.as_bytes()),
            });

        let future_record = FutureRecord::to(&record.topic)
            .key(&record.key)
            .payload(&record.payload)
            .headers(headers);

        self.producer
            .send(future_record, Timeout::After(PRODUCE_TIMEOUT))
            .await
            .map_err(|(err, _)| AppError::from(err))?;
        Ok(())
    }

    async fn flush(&self, timeout: Duration) -> AppResult<()> {
        self.producer.flush(Timeout::After(timeout))?;
        Ok(())
    }
}

struct KafkaConsumer {
    consumer: StreamConsumer,
}

#[async_trait]
impl Consumer for KafkaConsumer {
    async fn poll(&mut self, timeout: Duration) -> AppResult<Option<ConsumedRecord>> {
        match tokio::time::timeout(timeout, self.consumer.recv()).await {
            Ok(Ok(message)) => {
                let headers = decode_headers(&message);
                Ok(Some(ConsumedRecord {
                    topic: message.topic().to_owned(),
                    partition: message.partition(),
                    offset: message.offset(),
                    key: message
                        .key()
                        .map(|key| String::from_utf8_lossy(key).into_owned()),
                    payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                    headers,
                }))
            }
            Ok(Err(err)) => Err(AppError::from(err)),
            Err(_elapsed) => Ok(None),
        }
    }

    async fn commit(&mut self, record: &ConsumedRecord) -> AppResult<()> {
        let mut offsets = TopicPartitionList::new();
        offsets.add_partition_offset(
            &record.topic,
            record.partition,
            Offset::Offset(record.offset + 1),
        )?;
        self.consumer.commit(&offsets, CommitMode::Sync)?;
        Ok(())
    }
}

fn decode_headers<M: Message>(message: &M) -> RecordHeaders {
    let mut headers = RecordHeaders::new("");
    if let Some(raw) = message.headers() {
        for header in raw.iter() {
            let Some(value) = header.value else { continue };
            match header.key {
                "tenant_id" => headers.tenant_id = String::from_utf8_lossy(value).into_owned(),
                "retry_count" => {
                    headers.retry_count = std::str::from_utf8(value)
                        .ok()
                        .and_then(|v| v.parse().ok())
                        .unwrap_or_else(|| {
                            warn!(topic = message.topic(), "Unparseable retry_count header");
                            0
                        });
                }
                "producer" => headers.producer = String::from_utf8_lossy(value).into_owned(),
                _ => {}
            }
        }
    }
    headers
}
