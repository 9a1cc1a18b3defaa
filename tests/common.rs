// ABOUTME: Shared helpers for integration tests: pipeline bring-up and polling
// ABOUTME: Every test runs hermetically on the in-memory broker with a deterministic model
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors
#![allow(missing_docs, dead_code)]

use std::sync::Arc;
use std::time::Duration;

use signalstream::broker::memory::MemoryBroker;
use signalstream::broker::Broker;
use signalstream::config::Settings;
use signalstream::model::{MockModelProvider, ModelClient, ModelProvider};
use signalstream::models::{
    AggregatedIntelligence, CreateMessageRequest, MessageChannel, MessageSender,
};
use signalstream::pipeline::Pipeline;

const WAIT_BUDGET: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A running pipeline plus handles the tests assert against
pub struct TestPipeline {
    pub pipeline: Pipeline,
    pub broker: MemoryBroker,
    pub settings: Settings,
}

/// Start a pipeline on a fresh in-memory broker with the mock model
pub async fn start_mock_pipeline() -> TestPipeline {
    start_pipeline_with_provider(Arc::new(MockModelProvider::new())).await
}

/// Start a pipeline with a custom model provider
pub async fn start_pipeline_with_provider(provider: Arc<dyn ModelProvider>) -> TestPipeline {
    let settings = Settings::for_tests();
    let broker = MemoryBroker::new();
    let model = Arc::new(ModelClient::new(provider, &settings));
    let pipeline = Pipeline::start(
        settings.clone(),
        Arc::new(broker.clone()) as Arc<dyn Broker>,
        model,
    )
    .await
    .expect("pipeline should start");
    TestPipeline {
        pipeline,
        broker,
        settings,
    }
}

/// Ingestion request for a customer chat message
pub fn customer_message(conversation_id: &str, text: &str) -> CreateMessageRequest {
    CreateMessageRequest {
        conversation_id: conversation_id.into(),
        sender: MessageSender::Customer,
        text: text.into(),
        channel: MessageChannel::Chat,
        tenant_id: None,
        metadata: None,
    }
}

/// Records on a topic whose partition key matches
pub async fn keyed_count(broker: &MemoryBroker, topic: &str, key: &str) -> usize {
    broker
        .records(topic)
        .await
        .iter()
        .filter(|record| record.key.as_deref() == Some(key))
        .count()
}

/// Wait until a topic holds at least `at_least` records for the key
pub async fn wait_for_keyed_count(broker: &MemoryBroker, topic: &str, key: &str, at_least: usize) {
    let deadline = tokio::time::Instant::now() + WAIT_BUDGET;
    while keyed_count(broker, topic, key).await < at_least {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {at_least} records keyed {key} on {topic}"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Wait until a topic holds at least `at_least` records in total
pub async fn wait_for_topic_len(broker: &MemoryBroker, topic: &str, at_least: usize) {
    let deadline = tokio::time::Instant::now() + WAIT_BUDGET;
    while broker.topic_len(topic).await < at_least {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {at_least} records on {topic}"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Latest aggregated view for a conversation, decoded from the output topic
pub async fn last_aggregated(
    broker: &MemoryBroker,
    topic: &str,
    key: &str,
) -> Option<AggregatedIntelligence> {
    broker
        .records(topic)
        .await
        .iter()
        .filter(|record| record.key.as_deref() == Some(key))
        .next_back()
        .and_then(|record| record.decode().ok())
}

/// Wait until the latest aggregated view for a conversation carries all
/// four components, then return it
pub async fn wait_for_complete_view(
    broker: &MemoryBroker,
    topic: &str,
    key: &str,
) -> AggregatedIntelligence {
    let deadline = tokio::time::Instant::now() + WAIT_BUDGET;
    loop {
        if let Some(view) = last_aggregated(broker, topic, key).await {
            if view.sentiment.is_some()
                && view.pii.is_some()
                && view.insights.is_some()
                && view.summary.is_some()
            {
                return view;
            }
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for a complete aggregated view for {key}"
        );
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
