// ABOUTME: Data model for messages, conversation state, and intelligence results
// ABOUTME: Every entity here is a wire type; serialization is JSON on all topics
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! # Pipeline Data Model
//!
//! All identifiers are opaque strings; timestamps are UTC instants at
//! millisecond precision. Records are keyed by `conversation_id` on the
//! broker, and every in-process map is keyed by the full
//! [`ConversationKey`] so tenants never observe each other's data.

/// Conversation state with its rolling message window
pub mod conversation;
/// Analyzer results and the merged intelligence view
pub mod intelligence;
/// Support messages and the ingestion contract
pub mod message;

pub use conversation::ConversationState;
pub use intelligence::{
    AggregatedIntelligence, EmotionType, InsightsResult, IntentType, PartialResult, PiiEntity,
    PiiEntityType, PiiResult, ResolutionTime, SentimentResult, SentimentType, SummaryResult,
    UrgencyLevel,
};
pub use message::{
    CreateMessageRequest, CreateMessageResponse, MessageChannel, MessageSender, SupportMessage,
};

use serde::{Deserialize, Serialize};

/// Tenant-scoped conversation identity
///
/// Aggregator state, processor state, and subscriber registries are all
/// keyed by this pair; a conversation id alone is never a key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    /// Tenant that owns the conversation
    pub tenant_id: String,
    /// Conversation identifier, unique within the tenant
    pub conversation_id: String,
}

impl ConversationKey {
    /// Create a key from its parts
    #[must_use]
    pub fn new(tenant_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            conversation_id: conversation_id.into(),
        }
    }
}

impl std::fmt::Display for ConversationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.tenant_id, self.conversation_id)
    }
}
