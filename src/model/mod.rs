// ABOUTME: Model provider abstraction for the four analyses and reply generation
// ABOUTME: Defines the provider contract and the minimal context handed to every call
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! # Model Provider Service Provider Interface
//!
//! The pipeline talks to exactly one generative model through the
//! [`ModelProvider`] trait. Two implementations exist: [`GeminiProvider`]
//! for the real service and [`MockModelProvider`] for deterministic local
//! runs. Workers never hold a provider directly; they go through
//! [`ModelClient`], which owns the rate limit, the concurrency cap, the
//! retry budget, and the fallback values.

mod client;
mod gemini;
mod mock;
/// Prompt builders for the five model operations
pub mod prompts;
mod rate_limit;

pub use client::ModelClient;
pub use gemini::GeminiProvider;
pub use mock::MockModelProvider;
pub use rate_limit::MinuteRateLimiter;

use async_trait::async_trait;

use crate::errors::AppResult;
use crate::models::{
    ConversationState, InsightsResult, MessageSender, PiiResult, SentimentResult, SummaryResult,
};

/// Minimal context handed to every model call: the compressed history plus
/// the message under analysis
#[derive(Debug, Clone)]
pub struct AnalysisContext {
    /// Conversation identifier
    pub conversation_id: String,
    /// Tenant identifier
    pub tenant_id: String,
    /// Latest summary tldr, when one exists
    pub summary_tldr: Option<String>,
    /// The message being analyzed
    pub latest_message: String,
    /// Sender of that message
    pub latest_sender: MessageSender,
    /// Formatted recent-message window, used when no summary exists yet
    pub window_text: String,
}

impl AnalysisContext {
    /// Build the context from a conversation state snapshot
    ///
    /// Returns `None` when the state carries no messages, in which case
    /// there is nothing to analyze.
    #[must_use]
    pub fn from_state(state: &ConversationState) -> Option<Self> {
        let latest = state.latest_message()?;
        Some(Self {
            conversation_id: state.conversation_id.clone(),
            tenant_id: state.tenant_id.clone(),
            summary_tldr: state
                .current_summary
                .as_ref()
                .map(|summary| summary.tldr.clone()),
            latest_message: latest.text.clone(),
            latest_sender: latest.sender,
            window_text: state.context_text(state.recent_messages.len()),
        })
    }

    /// `Context: {summary}\n\nCurrent message: {latest}` as fed to analyzers
    #[must_use]
    pub fn prompt_context(&self) -> String {
        match &self.summary_tldr {
            Some(tldr) => format!(
                "Context: {tldr}\n\nCurrent message: {}",
                self.latest_message
            ),
            None => format!(
                "Context: (start of conversation)\n\nCurrent message: {}",
                self.latest_message
            ),
        }
    }
}

/// Contract a generative model backend must implement
///
/// Providers return typed results or typed errors; they do not retry and
/// they do not fall back. Both concerns belong to [`ModelClient`].
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// Classify the customer's current sentiment
    async fn analyze_sentiment(&self, context: &AnalysisContext) -> AppResult<SentimentResult>;

    /// Detect PII in the latest message
    async fn detect_pii(&self, context: &AnalysisContext) -> AppResult<PiiResult>;

    /// Extract intent, urgency, and recommended actions
    async fn extract_insights(&self, context: &AnalysisContext) -> AppResult<InsightsResult>;

    /// Fold the latest message into the running summary
    ///
    /// With no prior summary the provider summarizes the full recent-message
    /// window instead.
    async fn update_summary(
        &self,
        context: &AnalysisContext,
        old_summary: Option<&SummaryResult>,
    ) -> AppResult<SummaryResult>;

    /// Generate a free-form agent-assist reply
    async fn generate_reply(&self, context: &AnalysisContext) -> AppResult<String>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MessageChannel, SupportMessage};
    use chrono::Utc;
    use uuid::Uuid;

    fn state_with(texts: &[&str]) -> ConversationState {
        let mut state = ConversationState::new("c1", "acme");
        for text in texts {
            state.add_message(
                SupportMessage {
                    message_id: Uuid::new_v4(),
                    conversation_id: "c1".into(),
                    tenant_id: "acme".into(),
                    sender: MessageSender::Customer,
                    text: (*text).into(),
                    channel: MessageChannel::Chat,
                    timestamp: Utc::now(),
                    metadata: None,
                },
                10,
            );
        }
        state
    }

    #[test]
    fn context_requires_at_least_one_message() {
        let empty = ConversationState::new("c1", "acme");
        assert!(AnalysisContext::from_state(&empty).is_none());
    }

    #[test]
    fn prompt_context_prefers_summary_over_window() {
        let mut state = state_with(&["first", "second"]);
        state.current_summary = Some(SummaryResult {
            tldr: "customer cannot log in".into(),
            ..SummaryResult::empty("c1", "acme")
        });
        let context = AnalysisContext::from_state(&state).unwrap();
        let prompt = context.prompt_context();
        assert!(prompt.contains("customer cannot log in"));
        assert!(prompt.contains("Current message: second"));
    }
}
