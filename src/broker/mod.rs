// ABOUTME: Thin abstraction over a keyed, partitioned log with consumer groups
// ABOUTME: Defines record/header types and the Producer/Consumer/Broker traits
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! # Broker Adapter
//!
//! The pipeline needs very little from its log: keyed produce with headers,
//! consumer-group subscription, a blocking poll with a timeout, per-record
//! explicit offset commit, and idempotent topic creation. Per-key ordering
//! within a topic must be preserved; exactly-once is not required because
//! every downstream merge is idempotent under last-writer-wins.
//!
//! Two implementations exist: [`kafka::KafkaBroker`] for a real cluster and
//! [`memory::MemoryBroker`] for tests and local mock mode.

pub mod kafka;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::constants::service;
use crate::errors::AppResult;

/// Headers carried by every produced record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeaders {
    /// Tenant that owns the record
    pub tenant_id: String,
    /// Delivery attempt counter, incremented on redelivery
    pub retry_count: u32,
    /// Identifier of the producing service
    pub producer: String,
}

impl RecordHeaders {
    /// Headers for a first delivery from this service
    #[must_use]
    pub fn new(tenant_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            retry_count: 0,
            producer: service::PRODUCER_ID.into(),
        }
    }
}

/// A record to be produced
#[derive(Debug, Clone)]
pub struct ProducerRecord {
    /// Destination topic
    pub topic: String,
    /// Partition key; always the conversation id in this pipeline
    pub key: String,
    /// Encoded payload
    pub payload: Vec<u8>,
    /// Record headers
    pub headers: RecordHeaders,
}

impl ProducerRecord {
    /// Encode a value as JSON and wrap it with standard headers
    ///
    /// # Errors
    ///
    /// Returns a `SerializationError` if encoding fails.
    pub fn json<T: Serialize>(
        topic: impl Into<String>,
        key: impl Into<String>,
        tenant_id: impl Into<String>,
        value: &T,
    ) -> AppResult<Self> {
        Ok(Self {
            topic: topic.into(),
            key: key.into(),
            payload: serde_json::to_vec(value)?,
            headers: RecordHeaders::new(tenant_id),
        })
    }
}

/// A record delivered to a consumer
#[derive(Debug, Clone)]
pub struct ConsumedRecord {
    /// Source topic
    pub topic: String,
    /// Partition the record was read from
    pub partition: i32,
    /// Offset within the partition
    pub offset: i64,
    /// Partition key, if any
    pub key: Option<String>,
    /// Encoded payload
    pub payload: Vec<u8>,
    /// Record headers
    pub headers: RecordHeaders,
}

impl ConsumedRecord {
    /// Decode the payload as JSON into a typed value
    ///
    /// # Errors
    ///
    /// Returns a `SerializationError` if decoding fails.
    pub fn decode<T: DeserializeOwned>(&self) -> AppResult<T> {
        Ok(serde_json::from_slice(&self.payload)?)
    }
}

/// Provisioning description for one topic
#[derive(Debug, Clone)]
pub struct TopicSpec {
    /// Topic name
    pub name: String,
    /// Partition count
    pub partitions: i32,
    /// Retention in milliseconds
    pub retention_ms: i64,
}

impl TopicSpec {
    /// Create a topic spec
    #[must_use]
    pub fn new(name: impl Into<String>, partitions: i32, retention_ms: i64) -> Self {
        Self {
            name: name.into(),
            partitions,
            retention_ms,
        }
    }
}

/// Keyed producer handle, shared across components
#[async_trait]
pub trait Producer: Send + Sync {
    /// Produce one record, resolving once the broker has accepted it
    async fn produce(&self, record: ProducerRecord) -> AppResult<()>;

    /// Flush pending produces, waiting up to `timeout`
    async fn flush(&self, timeout: Duration) -> AppResult<()>;
}

/// A consumer-group member subscribed to a set of topics
///
/// Consumers are owned by exactly one task; `poll` and `commit` take
/// `&mut self` so no locking is needed on the hot path.
#[async_trait]
pub trait Consumer: Send {
    /// Blocking poll with a timeout; returns `None` when nothing arrived
    async fn poll(&mut self, timeout: Duration) -> AppResult<Option<ConsumedRecord>>;

    /// Commit the offset of a processed record
    async fn commit(&mut self, record: &ConsumedRecord) -> AppResult<()>;
}

/// Broker handle: admin operations plus producer/consumer factories
#[async_trait]
pub trait Broker: Send + Sync {
    /// Idempotently create the given topics
    async fn ensure_topics(&self, specs: &[TopicSpec]) -> AppResult<()>;

    /// Shared producer handle
    fn producer(&self) -> Arc<dyn Producer>;

    /// Join `group` and subscribe to `topics`
    async fn subscribe(&self, group: &str, topics: &[String]) -> AppResult<Box<dyn Consumer>>;
}
