// ABOUTME: Conversation state with a rolling bounded message window
// ABOUTME: Built by the processor, consumed by the four analyzer workers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::intelligence::SummaryResult;
use super::message::{MessageSender, SupportMessage};

/// Conversation state with rolling message window
///
/// The processor owns the only mutable copy; everything downstream sees
/// immutable snapshots on the state topic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    /// Conversation identifier
    pub conversation_id: String,
    /// Tenant that owns the conversation
    pub tenant_id: String,
    /// Total messages seen, including ones evicted from the window
    pub message_count: u64,
    /// Newest messages, oldest first, bounded by the configured window
    pub recent_messages: Vec<SupportMessage>,
    /// Senders observed over the conversation lifetime
    pub participants: Vec<MessageSender>,
    /// Latest summary fed back from the summary topic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_summary: Option<SummaryResult>,
    /// Timestamp of the most recent message
    pub last_activity: DateTime<Utc>,
    /// When the conversation was first seen
    pub created_at: DateTime<Utc>,
    /// When the state last changed
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Create empty state for a conversation's first message
    #[must_use]
    pub fn new(conversation_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            conversation_id: conversation_id.into(),
            tenant_id: tenant_id.into(),
            message_count: 0,
            recent_messages: Vec::new(),
            participants: Vec::new(),
            current_summary: None,
            last_activity: now,
            created_at: now,
            updated_at: now,
        }
    }

    /// Append a message, evicting the oldest once the window is full
    pub fn add_message(&mut self, message: SupportMessage, window: usize) {
        if !self.participants.contains(&message.sender) {
            self.participants.push(message.sender);
        }
        self.last_activity = message.timestamp;
        self.recent_messages.push(message);
        if self.recent_messages.len() > window {
            let excess = self.recent_messages.len() - window;
            self.recent_messages.drain(..excess);
        }
        self.message_count += 1;
        self.updated_at = Utc::now();
    }

    /// Replace the summary iff the incoming one is strictly newer
    ///
    /// Returns whether the summary was applied. Summary ingest never causes
    /// a state emission; this only refreshes the cached context.
    pub fn apply_summary(&mut self, summary: SummaryResult) -> bool {
        let newer = self
            .current_summary
            .as_ref()
            .map_or(true, |current| summary.timestamp > current.timestamp);
        if newer {
            self.current_summary = Some(summary);
            self.updated_at = Utc::now();
        }
        newer
    }

    /// The newest message in the window, if any
    #[must_use]
    pub fn latest_message(&self) -> Option<&SupportMessage> {
        self.recent_messages.last()
    }

    /// Formatted conversation context for model prompts
    #[must_use]
    pub fn context_text(&self, max_messages: usize) -> String {
        let start = self.recent_messages.len().saturating_sub(max_messages);
        self.recent_messages[start..]
            .iter()
            .map(|msg| format!("{}: {}", msg.sender.label(), msg.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::message::MessageChannel;
    use uuid::Uuid;

    fn message(text: &str, sender: MessageSender) -> SupportMessage {
        SupportMessage {
            message_id: Uuid::new_v4(),
            conversation_id: "c1".into(),
            tenant_id: "acme".into(),
            sender,
            text: text.into(),
            channel: MessageChannel::Chat,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    fn summary(tldr: &str, timestamp: DateTime<Utc>) -> SummaryResult {
        SummaryResult {
            conversation_id: "c1".into(),
            tenant_id: "acme".into(),
            tldr: tldr.into(),
            customer_issue: "issue".into(),
            agent_response: None,
            key_points: vec![],
            next_steps: vec![],
            timestamp,
        }
    }

    #[test]
    fn eleventh_message_evicts_the_first() {
        let mut state = ConversationState::new("c2", "acme");
        for i in 1..=11 {
            state.add_message(message(&format!("msg {i}"), MessageSender::Customer), 10);
        }
        assert_eq!(state.message_count, 11);
        assert_eq!(state.recent_messages.len(), 10);
        assert_eq!(state.recent_messages[0].text, "msg 2");
        assert_eq!(state.recent_messages[9].text, "msg 11");
    }

    #[test]
    fn participants_deduplicate_by_sender() {
        let mut state = ConversationState::new("c1", "acme");
        state.add_message(message("hi", MessageSender::Customer), 10);
        state.add_message(message("hello", MessageSender::Agent), 10);
        state.add_message(message("still here", MessageSender::Customer), 10);
        assert_eq!(
            state.participants,
            vec![MessageSender::Customer, MessageSender::Agent]
        );
    }

    #[test]
    fn stale_summary_is_ignored() {
        let mut state = ConversationState::new("c1", "acme");
        let now = Utc::now();
        assert!(state.apply_summary(summary("newer", now)));
        let stale = now - chrono::Duration::seconds(30);
        assert!(!state.apply_summary(summary("older", stale)));
        assert_eq!(state.current_summary.as_ref().unwrap().tldr, "newer");
    }

    #[test]
    fn context_text_uses_sender_labels() {
        let mut state = ConversationState::new("c1", "acme");
        state.add_message(message("where is my order", MessageSender::Customer), 10);
        state.add_message(message("checking now", MessageSender::Agent), 10);
        let context = state.context_text(5);
        assert_eq!(context, "Customer: where is my order\nAgent: checking now");
    }
}
