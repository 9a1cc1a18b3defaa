// ABOUTME: The four analyzer workers: sentiment, PII, insights, and incremental summary
// ABOUTME: One parametrized handler; each kind runs in its own consumer group and topic
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! # Analyzer Workers
//!
//! Four independent consumer groups on the conversation-state topic. Each
//! worker reads the latest message plus the summary tldr as compressed
//! history, calls the model client, and produces its typed result to its
//! own topic keyed by conversation id. Workers never depend on each other;
//! a failed worker cannot stall the others.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::broker::{ConsumedRecord, Producer, ProducerRecord};
use crate::config::{Settings, TopicNames};
use crate::errors::AppResult;
use crate::model::{AnalysisContext, ModelClient};
use crate::models::ConversationState;
use crate::pipeline::consumer::RecordHandler;

/// The four analyses the pipeline runs per message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerKind {
    /// Sentiment of the latest message
    Sentiment,
    /// PII in the latest message
    Pii,
    /// Intent, urgency, and recommended actions
    Insights,
    /// Incremental conversation summary
    Summary,
}

impl AnalyzerKind {
    /// All four kinds, in pipeline order
    pub const ALL: [Self; 4] = [Self::Sentiment, Self::Pii, Self::Insights, Self::Summary];

    /// Component name for the consumer group and logs
    #[must_use]
    pub const fn component(self) -> &'static str {
        match self {
            Self::Sentiment => "sentiment-analyzer",
            Self::Pii => "pii-analyzer",
            Self::Insights => "insights-analyzer",
            Self::Summary => "summary-analyzer",
        }
    }

    /// Result topic this analyzer produces to
    #[must_use]
    pub fn output_topic(self, topics: &TopicNames) -> String {
        match self {
            Self::Sentiment => topics.ai_sentiment.clone(),
            Self::Pii => topics.ai_pii.clone(),
            Self::Insights => topics.ai_insights.clone(),
            Self::Summary => topics.ai_summary.clone(),
        }
    }
}

/// One analyzer worker instance
pub struct AnalyzerWorker {
    kind: AnalyzerKind,
    client: Arc<ModelClient>,
    producer: Arc<dyn Producer>,
    output_topic: String,
}

impl AnalyzerWorker {
    /// Create a worker of the given kind
    #[must_use]
    pub fn new(
        kind: AnalyzerKind,
        client: Arc<ModelClient>,
        producer: Arc<dyn Producer>,
        settings: &Settings,
    ) -> Self {
        Self {
            kind,
            client,
            producer,
            output_topic: kind.output_topic(&settings.topics),
        }
    }

    async fn analyze_and_produce(&self, state: &ConversationState) -> AppResult<()> {
        let Some(context) = AnalysisContext::from_state(state) else {
            debug!(
                conversation_id = %state.conversation_id,
                "State carries no messages, nothing to analyze"
            );
            return Ok(());
        };

        let payload = match self.kind {
            AnalyzerKind::Sentiment => {
                serde_json::to_vec(&self.client.analyze_sentiment(&context).await)?
            }
            AnalyzerKind::Pii => serde_json::to_vec(&self.client.detect_pii(&context).await)?,
            AnalyzerKind::Insights => {
                serde_json::to_vec(&self.client.extract_insights(&context).await)?
            }
            AnalyzerKind::Summary => {
                // Incremental summarization: fold the newest message into
                // the previous summary; full-window mode when none exists.
                let old_summary = state.current_summary.as_ref();
                serde_json::to_vec(&self.client.update_summary(&context, old_summary).await)?
            }
        };

        self.producer
            .produce(ProducerRecord {
                topic: self.output_topic.clone(),
                key: state.conversation_id.clone(),
                payload,
                headers: crate::broker::RecordHeaders::new(&state.tenant_id),
            })
            .await?;

        info!(
            analyzer = self.kind.component(),
            conversation_id = %state.conversation_id,
            tenant_id = %state.tenant_id,
            "Analysis produced"
        );
        Ok(())
    }
}

#[async_trait]
impl RecordHandler for AnalyzerWorker {
    fn component(&self) -> &'static str {
        self.kind.component()
    }

    async fn handle(&mut self, record: &ConsumedRecord) -> AppResult<()> {
        let state: ConversationState = record.decode()?;
        self.analyze_and_produce(&state).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::broker::{Broker, RecordHeaders};
    use crate::model::MockModelProvider;
    use crate::models::{
        MessageChannel, MessageSender, PiiResult, SentimentResult, SentimentType, SummaryResult,
        SupportMessage,
    };
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

    fn record_for(settings: &Settings, state: &ConversationState) -> ConsumedRecord {
        ConsumedRecord {
            topic: settings.topics.conversations_state.clone(),
            partition: 0,
            offset: 0,
            key: Some(state.conversation_id.clone()),
            payload: serde_json::to_vec(state).unwrap(),
            headers: RecordHeaders::new("acme"),
        }
    }

    fn worker(kind: AnalyzerKind, broker: &MemoryBroker, settings: &Settings) -> AnalyzerWorker {
        let client = Arc::new(ModelClient::new(
            Arc::new(MockModelProvider::new()),
            settings,
        ));
        AnalyzerWorker::new(kind, client, broker.producer(), settings)
    }

    #[tokio::test]
    async fn sentiment_worker_produces_to_its_topic() {
        let broker = MemoryBroker::new();
        let settings = Settings::for_tests();
        let mut sentiment = worker(AnalyzerKind::Sentiment, &broker, &settings);

        let state = state_with(&["I'm frustrated with my order"]);
        sentiment
            .handle(&record_for(&settings, &state))
            .await
            .unwrap();

        let produced = broker.records(&settings.topics.ai_sentiment).await;
        assert_eq!(produced.len(), 1);
        assert_eq!(produced[0].key.as_deref(), Some("c1"));
        let result: SentimentResult = produced[0].decode().unwrap();
        assert_eq!(result.sentiment, SentimentType::Negative);
        assert_eq!(result.tenant_id, "acme");
    }

    #[tokio::test]
    async fn pii_worker_flags_emails() {
        let broker = MemoryBroker::new();
        let settings = Settings::for_tests();
        let mut pii = worker(AnalyzerKind::Pii, &broker, &settings);

        let state = state_with(&["Contact me at alice@example.com"]);
        pii.handle(&record_for(&settings, &state)).await.unwrap();

        let produced = broker.records(&settings.topics.ai_pii).await;
        let result: PiiResult = produced[0].decode().unwrap();
        assert!(result.has_pii);
    }

    #[tokio::test]
    async fn summary_worker_uses_full_window_without_prior_summary() {
        let broker = MemoryBroker::new();
        let settings = Settings::for_tests();
        let mut summary = worker(AnalyzerKind::Summary, &broker, &settings);

        let state = state_with(&["my order is late"]);
        assert!(state.current_summary.is_none());
        summary.handle(&record_for(&settings, &state)).await.unwrap();

        let produced = broker.records(&settings.topics.ai_summary).await;
        let result: SummaryResult = produced[0].decode().unwrap();
        assert!(result.tldr.contains("my order is late"));
    }

    #[tokio::test]
    async fn empty_state_produces_nothing() {
        let broker = MemoryBroker::new();
        let settings = Settings::for_tests();
        let mut insights = worker(AnalyzerKind::Insights, &broker, &settings);

        let state = ConversationState::new("c1", "acme");
        insights.handle(&record_for(&settings, &state)).await.unwrap();

        assert_eq!(broker.topic_len(&settings.topics.ai_insights).await, 0);
    }
}
