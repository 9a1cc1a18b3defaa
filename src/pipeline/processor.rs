// ABOUTME: Conversation processor: builds per-conversation state from raw messages
// ABOUTME: Summary ingest refreshes cached context only and never re-emits state
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! # Conversation Processor
//!
//! Consumes the raw-messages topic and the summary topic; produces to the
//! conversation-state topic.
//!
//! The loop guard: summaries depend on state, and state carries summaries.
//! Emitting on summary ingest would cycle forever, so state is emitted only
//! in response to human message events. Summary records merely refresh the
//! cached `current_summary` the analyzers read as compressed history.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::broker::{ConsumedRecord, Producer, ProducerRecord};
use crate::config::Settings;
use crate::errors::AppResult;
use crate::models::{ConversationKey, ConversationState, SummaryResult, SupportMessage};
use crate::pipeline::consumer::RecordHandler;

/// Stateful builder of [`ConversationState`]
pub struct ConversationProcessor {
    producer: Arc<dyn Producer>,
    state_topic: String,
    summary_topic: String,
    window: usize,
    states: HashMap<ConversationKey, ConversationState>,
}

impl ConversationProcessor {
    /// Create a processor with an empty state map
    #[must_use]
    pub fn new(producer: Arc<dyn Producer>, settings: &Settings) -> Self {
        Self {
            producer,
            state_topic: settings.topics.conversations_state.clone(),
            summary_topic: settings.topics.ai_summary.clone(),
            window: settings.recent_messages_window,
            states: HashMap::new(),
        }
    }

    /// Current state for a conversation, if any
    #[must_use]
    pub fn state(&self, key: &ConversationKey) -> Option<&ConversationState> {
        self.states.get(key)
    }

    /// Number of tracked conversations
    #[must_use]
    pub fn tracked_conversations(&self) -> usize {
        self.states.len()
    }

    async fn handle_message(&mut self, record: &ConsumedRecord) -> AppResult<()> {
        let message: SupportMessage = record.decode()?;
        let key = ConversationKey::new(&message.tenant_id, &message.conversation_id);

        let state = self.states.entry(key).or_insert_with(|| {
            ConversationState::new(&message.conversation_id, &message.tenant_id)
        });
        state.add_message(message, self.window);

        let produced = ProducerRecord::json(
            &self.state_topic,
            &state.conversation_id,
            &state.tenant_id,
            state,
        )?;
        self.producer.produce(produced).await?;

        info!(
            conversation_id = %state.conversation_id,
            tenant_id = %state.tenant_id,
            message_count = state.message_count,
            "Conversation state updated"
        );
        Ok(())
    }

    fn handle_summary(&mut self, record: &ConsumedRecord) -> AppResult<()> {
        let summary: SummaryResult = record.decode()?;
        let key = ConversationKey::new(&summary.tenant_id, &summary.conversation_id);

        let Some(state) = self.states.get_mut(&key) else {
            // Out-of-order or cross-replica summary; there is no state to
            // attach it to and nothing downstream depends on it.
            warn!(
                conversation_id = %summary.conversation_id,
                tenant_id = %summary.tenant_id,
                "Summary for unknown conversation dropped"
            );
            return Ok(());
        };

        if state.apply_summary(summary) {
            debug!(
                conversation_id = %state.conversation_id,
                "Cached summary refreshed"
            );
        } else {
            debug!(
                conversation_id = %state.conversation_id,
                "Stale summary ignored"
            );
        }
        Ok(())
    }
}

#[async_trait]
impl RecordHandler for ConversationProcessor {
    fn component(&self) -> &'static str {
        "conversation-processor"
    }

    async fn handle(&mut self, record: &ConsumedRecord) -> AppResult<()> {
        if record.topic == self.summary_topic {
            self.handle_summary(record)
        } else {
            self.handle_message(record).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::broker::{Broker, RecordHeaders};
    use crate::models::{MessageChannel, MessageSender};
    use chrono::Utc;
    use uuid::Uuid;

    fn settings() -> Settings {
        Settings::for_tests()
    }

    fn message_record(settings: &Settings, conversation: &str, text: &str) -> ConsumedRecord {
        let message = SupportMessage {
            message_id: Uuid::new_v4(),
            conversation_id: conversation.into(),
            tenant_id: "acme".into(),
            sender: MessageSender::Customer,
            text: text.into(),
            channel: MessageChannel::Chat,
            timestamp: Utc::now(),
            metadata: None,
        };
        ConsumedRecord {
            topic: settings.topics.messages_raw.clone(),
            partition: 0,
            offset: 0,
            key: Some(conversation.into()),
            payload: serde_json::to_vec(&message).unwrap(),
            headers: RecordHeaders::new("acme"),
        }
    }

    fn summary_record(settings: &Settings, conversation: &str, tldr: &str) -> ConsumedRecord {
        let summary = SummaryResult {
            tldr: tldr.into(),
            ..SummaryResult::empty(conversation, "acme")
        };
        ConsumedRecord {
            topic: settings.topics.ai_summary.clone(),
            partition: 0,
            offset: 0,
            key: Some(conversation.into()),
            payload: serde_json::to_vec(&summary).unwrap(),
            headers: RecordHeaders::new("acme"),
        }
    }

    #[tokio::test]
    async fn message_emits_state_exactly_once() {
        let broker = MemoryBroker::new();
        let settings = settings();
        let mut processor = ConversationProcessor::new(broker.producer(), &settings);

        processor
            .handle(&message_record(&settings, "c1", "I'm frustrated with my order"))
            .await
            .unwrap();

        let states = broker.records(&settings.topics.conversations_state).await;
        assert_eq!(states.len(), 1);
        let state: ConversationState = states[0].decode().unwrap();
        assert_eq!(state.message_count, 1);
        assert_eq!(state.recent_messages.len(), 1);
    }

    #[tokio::test]
    async fn summary_ingest_never_emits_state() {
        let broker = MemoryBroker::new();
        let settings = settings();
        let mut processor = ConversationProcessor::new(broker.producer(), &settings);

        processor
            .handle(&message_record(&settings, "c1", "hello"))
            .await
            .unwrap();
        processor
            .handle(&summary_record(&settings, "c1", "customer said hello"))
            .await
            .unwrap();

        // Loop guard: exactly the one state record from the message.
        assert_eq!(
            broker.topic_len(&settings.topics.conversations_state).await,
            1
        );
        let key = ConversationKey::new("acme", "c1");
        assert_eq!(
            processor
                .state(&key)
                .unwrap()
                .current_summary
                .as_ref()
                .unwrap()
                .tldr,
            "customer said hello"
        );
    }

    #[tokio::test]
    async fn summary_for_unknown_conversation_is_dropped() {
        let broker = MemoryBroker::new();
        let settings = settings();
        let mut processor = ConversationProcessor::new(broker.producer(), &settings);

        processor
            .handle(&summary_record(&settings, "c99", "phantom"))
            .await
            .unwrap();

        assert_eq!(
            broker.topic_len(&settings.topics.conversations_state).await,
            0
        );
        assert_eq!(processor.tracked_conversations(), 0);
    }

    #[tokio::test]
    async fn window_bounds_recent_messages() {
        let broker = MemoryBroker::new();
        let settings = settings();
        let mut processor = ConversationProcessor::new(broker.producer(), &settings);

        for i in 1..=11 {
            processor
                .handle(&message_record(&settings, "c2", &format!("msg {i}")))
                .await
                .unwrap();
        }

        let key = ConversationKey::new("acme", "c2");
        let state = processor.state(&key).unwrap();
        assert_eq!(state.message_count, 11);
        assert_eq!(state.recent_messages.len(), 10);
        assert_eq!(state.recent_messages[0].text, "msg 2");
    }

    #[tokio::test]
    async fn malformed_payload_is_an_error_for_the_retry_path() {
        let broker = MemoryBroker::new();
        let settings = settings();
        let mut processor = ConversationProcessor::new(broker.producer(), &settings);

        let record = ConsumedRecord {
            topic: settings.topics.messages_raw.clone(),
            partition: 0,
            offset: 0,
            key: Some("c1".into()),
            payload: b"{not json".to_vec(),
            headers: RecordHeaders::new("acme"),
        };
        assert!(processor.handle(&record).await.is_err());
    }
}
