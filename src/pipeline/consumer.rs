// ABOUTME: Shared consume/handle/retry/commit loop with dead-letter routing
// ABOUTME: Every pipeline stage runs inside this loop; handlers only implement semantics
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! # Consumer Loop
//!
//! Per-record discipline: decode-and-handle with up to `max_retries`
//! attempts and exponential backoff; on exhaustion the record is routed to
//! the DLQ with its error detail, and the offset is committed either way so
//! a poison record can never wedge its partition. Transient broker errors
//! bubble out of the loop and the supervisor restarts the component without
//! losing offsets.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use crate::broker::{Broker, ConsumedRecord, Producer, ProducerRecord};
use crate::config::Settings;
use crate::errors::{AppError, AppResult};

/// A pipeline stage's per-record logic
#[async_trait]
pub trait RecordHandler: Send {
    /// Component name for consumer group ids and logs
    fn component(&self) -> &'static str;

    /// Process one record; errors are retried and then dead-lettered
    async fn handle(&mut self, record: &ConsumedRecord) -> AppResult<()>;
}

/// Configuration for one consumer loop
#[derive(Debug, Clone)]
pub struct ConsumerLoopConfig {
    /// Consumer group id
    pub group: String,
    /// Topics to subscribe to
    pub topics: Vec<String>,
    /// Retry budget before a record is dead-lettered
    pub max_retries: u32,
    /// Base delay for the per-record retry backoff
    pub retry_base: Duration,
    /// Poll timeout; also bounds shutdown latency
    pub poll_timeout: Duration,
    /// Dead-letter topic
    pub dlq_topic: String,
}

impl ConsumerLoopConfig {
    /// Loop configuration for a component, derived from settings
    #[must_use]
    pub fn for_component(settings: &Settings, component: &str, topics: Vec<String>) -> Self {
        Self {
            group: settings.group_id(component),
            topics,
            max_retries: settings.max_record_retries,
            retry_base: settings.record_retry_base,
            poll_timeout: settings.poll_timeout,
            dlq_topic: settings.topics.dlq.clone(),
        }
    }
}

/// Payload written to the DLQ for a record that exhausted its retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterRecord {
    /// Topic the record was consumed from
    pub original_topic: String,
    /// Partition the record was consumed from
    pub original_partition: i32,
    /// Offset of the failed record
    pub original_offset: i64,
    /// Original payload, decoded when possible, raw text otherwise
    pub payload: Value,
    /// Error that exhausted the retry budget
    pub error: String,
    /// Attempts made before giving up
    pub retry_count: u32,
    /// When the record was dead-lettered
    pub timestamp: DateTime<Utc>,
}

/// Run a handler inside the shared consumer loop until shutdown
///
/// # Errors
///
/// Returns a `BrokerError` when subscription or polling fails; the
/// supervisor treats that as a component crash and restarts with backoff.
pub async fn run_consumer<H: RecordHandler>(
    broker: Arc<dyn Broker>,
    producer: Arc<dyn Producer>,
    config: ConsumerLoopConfig,
    handler: Arc<Mutex<H>>,
    shutdown: watch::Receiver<bool>,
) -> AppResult<()> {
    let mut consumer = broker.subscribe(&config.group, &config.topics).await?;
    info!(
        group = %config.group,
        topics = ?config.topics,
        "Consumer loop started"
    );

    while !*shutdown.borrow() {
        let Some(record) = consumer.poll(config.poll_timeout).await? else {
            continue;
        };

        match handle_with_retries(&config, &handler, &record, &shutdown).await {
            Ok(()) => {
                debug!(
                    topic = %record.topic,
                    offset = record.offset,
                    "Record processed"
                );
            }
            // A retry loop aborted by shutdown leaves the offset
            // uncommitted so the record is redelivered on restart.
            Err(_) if *shutdown.borrow() => break,
            Err(err) => {
                send_to_dlq(&config, producer.as_ref(), &record, &err).await;
            }
        }

        // Commit after success and after dead-lettering alike.
        if let Err(err) = consumer.commit(&record).await {
            warn!(
                topic = %record.topic,
                offset = record.offset,
                error = %err,
                "Offset commit failed"
            );
        }
    }

    info!(group = %config.group, "Consumer loop stopped");
    Ok(())
}

async fn handle_with_retries<H: RecordHandler>(
    config: &ConsumerLoopConfig,
    handler: &Arc<Mutex<H>>,
    record: &ConsumedRecord,
    shutdown: &watch::Receiver<bool>,
) -> AppResult<()> {
    let mut last_error = AppError::internal("retry budget was zero");
    for attempt in 0..config.max_retries.max(1) {
        match handler.lock().await.handle(record).await {
            Ok(()) => return Ok(()),
            Err(err) => {
                warn!(
                    topic = %record.topic,
                    offset = record.offset,
                    attempt = attempt + 1,
                    max = config.max_retries,
                    error = %err,
                    "Record handling failed"
                );
                last_error = err;
            }
        }
        if *shutdown.borrow() {
            break;
        }
        if attempt + 1 < config.max_retries {
            sleep(config.retry_base * 2_u32.saturating_pow(attempt)).await;
        }
    }
    Err(last_error)
}

async fn send_to_dlq(
    config: &ConsumerLoopConfig,
    producer: &dyn Producer,
    record: &ConsumedRecord,
    cause: &AppError,
) {
    let payload = serde_json::from_slice(&record.payload)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&record.payload).into_owned()));

    let dead_letter = DeadLetterRecord {
        original_topic: record.topic.clone(),
        original_partition: record.partition,
        original_offset: record.offset,
        payload,
        error: cause.internal_details(),
        retry_count: config.max_retries,
        timestamp: Utc::now(),
    };

    let produced = ProducerRecord::json(
        &config.dlq_topic,
        record.key.clone().unwrap_or_default(),
        record.headers.tenant_id.clone(),
        &dead_letter,
    );

    match produced {
        Ok(mut dlq_record) => {
            dlq_record.headers.retry_count = config.max_retries;
            if let Err(err) = producer.produce(dlq_record).await {
                error!(
                    original_topic = %record.topic,
                    offset = record.offset,
                    error = %err,
                    "Failed to dead-letter record"
                );
            } else {
                error!(
                    original_topic = %record.topic,
                    offset = record.offset,
                    dlq_topic = %config.dlq_topic,
                    cause = %cause,
                    "Record dead-lettered after exhausting retries"
                );
            }
        }
        Err(err) => error!(
            original_topic = %record.topic,
            error = %err,
            "Failed to encode dead-letter record"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::broker::RecordHeaders;

    struct FailingHandler {
        attempts: u32,
    }

    #[async_trait]
    impl RecordHandler for FailingHandler {
        fn component(&self) -> &'static str {
            "failing-handler"
        }

        async fn handle(&mut self, _record: &ConsumedRecord) -> AppResult<()> {
            self.attempts += 1;
            Err(AppError::serialization("always broken"))
        }
    }

    #[tokio::test]
    async fn poison_record_reaches_dlq_with_retry_count() {
        let broker = Arc::new(MemoryBroker::new());
        let producer = broker.producer();
        producer
            .produce(ProducerRecord {
                topic: "input".into(),
                key: "c1".into(),
                payload: b"not json".to_vec(),
                headers: RecordHeaders::new("acme"),
            })
            .await
            .unwrap();

        let handler = Arc::new(Mutex::new(FailingHandler { attempts: 0 }));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = ConsumerLoopConfig {
            group: "g".into(),
            topics: vec!["input".into()],
            max_retries: 3,
            retry_base: Duration::from_millis(1),
            poll_timeout: Duration::from_millis(20),
            dlq_topic: "dlq".into(),
        };

        let loop_broker: Arc<dyn Broker> = broker.clone();
        let loop_handle = tokio::spawn(run_consumer(
            loop_broker,
            producer,
            config,
            handler.clone(),
            shutdown_rx,
        ));

        // Wait for the dead-letter to land, then stop the loop.
        for _ in 0..100 {
            if broker.topic_len("dlq").await > 0 {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        shutdown_tx.send(true).unwrap();
        loop_handle.await.unwrap().unwrap();

        assert_eq!(handler.lock().await.attempts, 3);
        let dlq = broker.records("dlq").await;
        assert_eq!(dlq.len(), 1);
        let dead: DeadLetterRecord = dlq[0].decode().unwrap();
        assert_eq!(dead.original_topic, "input");
        assert_eq!(dead.retry_count, 3);
        assert!(dead.error.contains("always broken"));
        assert_eq!(dead.payload, Value::String("not json".into()));
    }
}
