// ABOUTME: Compile-time defaults for topics, limits, and identifiers
// ABOUTME: Single source of truth for values the configuration layer can override
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! Default values used across the pipeline. Anything here that appears in the
//! configuration surface can be overridden via environment variables.

/// Default broker topic names
pub mod topics {
    /// Raw inbound support messages
    pub const MESSAGES_RAW: &str = "support.messages.raw";
    /// Conversation state emitted by the processor
    pub const CONVERSATIONS_STATE: &str = "support.conversations.state";
    /// Sentiment analyzer results
    pub const AI_SENTIMENT: &str = "support.ai.sentiment";
    /// PII analyzer results
    pub const AI_PII: &str = "support.ai.pii";
    /// Insights analyzer results
    pub const AI_INSIGHTS: &str = "support.ai.insights";
    /// Summary analyzer results
    pub const AI_SUMMARY: &str = "support.ai.summary";
    /// Merged per-conversation intelligence
    pub const AI_AGGREGATED: &str = "support.ai.aggregated";
    /// Dead-letter queue for poison records
    pub const DLQ: &str = "support.dlq";
}

/// Topic provisioning defaults
pub mod provisioning {
    /// Minimum partition count for keyed topics
    pub const DEFAULT_PARTITIONS: i32 = 3;
    /// Partition count for the DLQ
    pub const DLQ_PARTITIONS: i32 = 1;
    /// Seven-day retention in milliseconds
    pub const RETENTION_7D_MS: i64 = 7 * 24 * 60 * 60 * 1000;
    /// Fourteen-day retention in milliseconds
    pub const RETENTION_14D_MS: i64 = 14 * 24 * 60 * 60 * 1000;
    /// Thirty-day retention in milliseconds
    pub const RETENTION_30D_MS: i64 = 30 * 24 * 60 * 60 * 1000;
}

/// Pipeline limits and tunables
pub mod limits {
    /// Maximum message text length accepted at ingestion
    pub const MAX_MESSAGE_CHARS: usize = 10_000;
    /// Bounded window of recent messages kept per conversation
    pub const RECENT_MESSAGES_WINDOW: usize = 10;
    /// Global cap on in-flight model calls
    pub const MAX_CONCURRENT_MODEL_REQUESTS: usize = 10;
    /// Model requests allowed per minute
    pub const MODEL_REQUESTS_PER_MINUTE: u32 = 60;
    /// Per-subscriber outbound queue depth
    pub const SUBSCRIBER_QUEUE_DEPTH: usize = 64;
    /// Retry budget before a record is routed to the DLQ
    pub const MAX_RECORD_RETRIES: u32 = 3;
    /// Retry budget for model calls
    pub const MAX_MODEL_RETRIES: u32 = 3;
    /// Base delay for model retry backoff, in milliseconds (2s, 4s, 8s)
    pub const MODEL_RETRY_BASE_MS: u64 = 2_000;
    /// Per-attempt model call deadline, in seconds
    pub const MODEL_ATTEMPT_DEADLINE_SECS: u64 = 15;
    /// Grace period for draining in-flight work at shutdown, in seconds
    pub const SHUTDOWN_GRACE_SECS: u64 = 30;
    /// Blocking poll timeout for consumer loops, in milliseconds
    pub const POLL_TIMEOUT_MS: u64 = 200;
}

/// Service identifiers
pub mod service {
    /// Producer identifier stamped into record headers
    pub const PRODUCER_ID: &str = "signalstream-pipeline";
    /// Consumer group prefix; component suffixes are appended
    pub const GROUP_PREFIX: &str = "signalstream";
}
