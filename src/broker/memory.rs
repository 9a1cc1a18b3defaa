// ABOUTME: In-process broker with per-topic logs, consumer groups, and committed offsets
// ABOUTME: Backs hermetic tests and local mock mode with the same semantics as the Kafka adapter
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! In-memory broker adapter.
//!
//! Each topic is a single-partition append-only log. Consumer groups track
//! committed offsets, so a fresh subscriber in an existing group resumes
//! from the last commit and a fresh group replays the full log. This is
//! the same replay-on-restart behavior the Kafka adapter gets from
//! `auto.offset.reset=earliest`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Notify, RwLock};
use tokio::time::{sleep, Instant};

use super::{Broker, ConsumedRecord, Consumer, Producer, ProducerRecord, TopicSpec};
use crate::errors::AppResult;

#[derive(Debug, Clone)]
struct StoredRecord {
    offset: i64,
    key: Option<String>,
    payload: Vec<u8>,
    headers: super::RecordHeaders,
}

#[derive(Default)]
struct MemoryInner {
    topics: RwLock<HashMap<String, Vec<StoredRecord>>>,
    /// `(group, topic)` → next offset to deliver
    committed: RwLock<HashMap<(String, String), i64>>,
    arrivals: Notify,
}

/// In-process broker for tests and local mock mode
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<MemoryInner>,
}

impl MemoryBroker {
    /// Create an empty broker
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently retained on a topic
    pub async fn topic_len(&self, topic: &str) -> usize {
        self.inner
            .topics
            .read()
            .await
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Snapshot of all records on a topic, oldest first
    ///
    /// Test-facing: lets assertions inspect what the pipeline produced
    /// without joining a consumer group.
    pub async fn records(&self, topic: &str) -> Vec<ConsumedRecord> {
        let topics = self.inner.topics.read().await;
        topics.get(topic).map_or_else(Vec::new, |log| {
            log.iter()
                .map(|stored| ConsumedRecord {
                    topic: topic.to_owned(),
                    partition: 0,
                    offset: stored.offset,
                    key: stored.key.clone(),
                    payload: stored.payload.clone(),
                    headers: stored.headers.clone(),
                })
                .collect()
        })
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn ensure_topics(&self, specs: &[TopicSpec]) -> AppResult<()> {
        let mut topics = self.inner.topics.write().await;
        for spec in specs {
            topics.entry(spec.name.clone()).or_default();
        }
        Ok(())
    }

    fn producer(&self) -> Arc<dyn Producer> {
        Arc::new(MemoryProducer {
            inner: Arc::clone(&self.inner),
        })
    }

    async fn subscribe(&self, group: &str, topics: &[String]) -> AppResult<Box<dyn Consumer>> {
        let committed = self.inner.committed.read().await;
        let positions = topics
            .iter()
            .map(|topic| {
                let next = committed
                    .get(&(group.to_owned(), topic.clone()))
                    .copied()
                    .unwrap_or(0);
                (topic.clone(), next)
            })
            .collect();
        drop(committed);
        Ok(Box::new(MemoryConsumer {
            inner: Arc::clone(&self.inner),
            group: group.to_owned(),
            positions,
        }))
    }
}

struct MemoryProducer {
    inner: Arc<MemoryInner>,
}

#[async_trait]
impl Producer for MemoryProducer {
    async fn produce(&self, record: ProducerRecord) -> AppResult<()> {
        let mut topics = self.inner.topics.write().await;
        let log = topics.entry(record.topic).or_default();
        let offset = log.len() as i64;
        log.push(StoredRecord {
            offset,
            key: Some(record.key),
            payload: record.payload,
            headers: record.headers,
        });
        drop(topics);
        self.inner.arrivals.notify_waiters();
        Ok(())
    }

    async fn flush(&self, _timeout: Duration) -> AppResult<()> {
        // Appends are synchronous; nothing is ever pending.
        Ok(())
    }
}

struct MemoryConsumer {
    inner: Arc<MemoryInner>,
    group: String,
    /// topic → next offset this instance will deliver
    positions: HashMap<String, i64>,
}

impl MemoryConsumer {
    async fn next_record(&mut self) -> Option<ConsumedRecord> {
        let topics = self.inner.topics.read().await;
        for (topic, position) in &mut self.positions {
            if let Some(log) = topics.get(topic) {
                #[allow(clippy::cast_sign_loss)]
                if let Some(stored) = log.get(*position as usize) {
                    let record = ConsumedRecord {
                        topic: topic.clone(),
                        partition: 0,
                        offset: stored.offset,
                        key: stored.key.clone(),
                        payload: stored.payload.clone(),
                        headers: stored.headers.clone(),
                    };
                    *position += 1;
                    return Some(record);
                }
            }
        }
        None
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn poll(&mut self, timeout: Duration) -> AppResult<Option<ConsumedRecord>> {
        let deadline = Instant::now() + timeout;
        loop {
            // Register for wakeups before scanning so an append between the
            // scan and the await cannot be missed.
            let inner = Arc::clone(&self.inner);
            let arrival = inner.arrivals.notified();
            if let Some(record) = self.next_record().await {
                return Ok(Some(record));
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }
            tokio::select! {
                () = arrival => {}
                () = sleep(remaining) => return Ok(None),
            }
        }
    }

    async fn commit(&mut self, record: &ConsumedRecord) -> AppResult<()> {
        let mut committed = self.inner.committed.write().await;
        let entry = committed
            .entry((self.group.clone(), record.topic.clone()))
            .or_insert(0);
        if record.offset + 1 > *entry {
            *entry = record.offset + 1;
        }
        Ok(())
    }
}
