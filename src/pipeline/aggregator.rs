// ABOUTME: Merges the four partial result streams into one view per conversation
// ABOUTME: Offset-gated last-writer-wins plus monotonic PII OR-merge and entity union
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! # Aggregator
//!
//! Subscribes to all four result topics. Results arrive out of order across
//! topics; the merge rules are commutative where they must be (PII OR-merge
//! and entity union) and last-offset-wins where they need not be
//! (sentiment, insights, summary). PII is monotonic: once a conversation
//! has shown PII, the merged view reports it for the process lifetime, and
//! entities accumulate as a deduplicated union keyed by
//! `(type, redacted_value)`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info};

use crate::broadcast::Broadcaster;
use crate::broker::{ConsumedRecord, Producer, ProducerRecord};
use crate::config::Settings;
use crate::errors::AppResult;
use crate::models::{
    AggregatedIntelligence, ConversationKey, PartialResult, PiiEntity, PiiResult,
};
use crate::pipeline::consumer::RecordHandler;

/// Merge bookkeeping for one conversation
struct Tracked {
    intelligence: AggregatedIntelligence,
    sentiment_offset: i64,
    insights_offset: i64,
    summary_offset: i64,
}

impl Tracked {
    fn new(key: &ConversationKey) -> Self {
        Self {
            intelligence: AggregatedIntelligence::new(&key.conversation_id, &key.tenant_id),
            sentiment_offset: -1,
            insights_offset: -1,
            summary_offset: -1,
        }
    }
}

/// Stateful merger of partial results
pub struct Aggregator {
    producer: Arc<dyn Producer>,
    broadcaster: Broadcaster,
    output_topic: String,
    states: HashMap<ConversationKey, Tracked>,
}

impl Aggregator {
    /// Create an aggregator with an empty state map
    #[must_use]
    pub fn new(producer: Arc<dyn Producer>, broadcaster: Broadcaster, settings: &Settings) -> Self {
        Self {
            producer,
            broadcaster,
            output_topic: settings.topics.ai_aggregated.clone(),
            states: HashMap::new(),
        }
    }

    /// Current merged view for a conversation, if any
    #[must_use]
    pub fn intelligence(&self, key: &ConversationKey) -> Option<&AggregatedIntelligence> {
        self.states.get(key).map(|tracked| &tracked.intelligence)
    }

    fn merge(tracked: &mut Tracked, partial: PartialResult, offset: i64) -> bool {
        match partial {
            PartialResult::Sentiment(result) => {
                if offset <= tracked.sentiment_offset {
                    return false;
                }
                tracked.sentiment_offset = offset;
                tracked.intelligence.sentiment = Some(result);
                true
            }
            PartialResult::Insights(result) => {
                if offset <= tracked.insights_offset {
                    return false;
                }
                tracked.insights_offset = offset;
                tracked.intelligence.insights = Some(result);
                true
            }
            PartialResult::Summary(result) => {
                if offset <= tracked.summary_offset {
                    return false;
                }
                tracked.summary_offset = offset;
                tracked.intelligence.summary = Some(result);
                true
            }
            PartialResult::Pii(result) => {
                let merged = match tracked.intelligence.pii.take() {
                    Some(existing) => merge_pii(existing, result),
                    None => result,
                };
                tracked.intelligence.pii = Some(merged);
                true
            }
        }
    }
}

/// Monotonic OR on the flag, deduplicated union of entities, latest
/// redacted text for display
fn merge_pii(existing: PiiResult, incoming: PiiResult) -> PiiResult {
    let mut seen: HashSet<(crate::models::PiiEntityType, String)> = HashSet::new();
    let mut entities: Vec<PiiEntity> = Vec::with_capacity(existing.entities.len());
    for entity in existing.entities.into_iter().chain(incoming.entities) {
        if seen.insert(entity.dedup_key()) {
            entities.push(entity);
        }
    }
    PiiResult {
        conversation_id: incoming.conversation_id,
        tenant_id: incoming.tenant_id,
        has_pii: existing.has_pii || incoming.has_pii,
        entities,
        redacted_text: incoming.redacted_text,
        timestamp: incoming.timestamp,
    }
}

#[async_trait]
impl RecordHandler for Aggregator {
    fn component(&self) -> &'static str {
        "aggregation"
    }

    async fn handle(&mut self, record: &ConsumedRecord) -> AppResult<()> {
        let value: serde_json::Value = record.decode()?;
        let partial = PartialResult::classify(&value)?;
        let key = ConversationKey::new(partial.tenant_id(), partial.conversation_id());

        let tracked = self
            .states
            .entry(key.clone())
            .or_insert_with(|| Tracked::new(&key));

        if !Self::merge(tracked, partial, record.offset) {
            debug!(
                key = %key,
                topic = %record.topic,
                offset = record.offset,
                "Stale partial ignored"
            );
            return Ok(());
        }

        tracked.intelligence.last_updated = Utc::now();
        tracked.intelligence.quality_score = tracked.intelligence.compute_quality_score();

        let produced = ProducerRecord::json(
            &self.output_topic,
            &key.conversation_id,
            &key.tenant_id,
            &tracked.intelligence,
        )?;
        self.producer.produce(produced).await?;

        info!(
            key = %key,
            has_sentiment = tracked.intelligence.sentiment.is_some(),
            has_pii = tracked.intelligence.pii.is_some(),
            has_insights = tracked.intelligence.insights.is_some(),
            has_summary = tracked.intelligence.summary.is_some(),
            "Aggregated intelligence updated"
        );

        self.broadcaster
            .publish(&key, tracked.intelligence.clone())
            .await;
        Ok(())
    }
}
