// ABOUTME: Deterministic model provider for mock mode and hermetic tests
// ABOUTME: Keyword sentiment, pattern-based PII with span redaction, canned insights and summaries
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! Mock model provider.
//!
//! Runs the full pipeline without an external service: outputs are derived
//! from the message text alone, so the same input always yields the same
//! intelligence. Detection is intentionally simple; it exists to exercise
//! the pipeline, not to be a real PII detector.

use async_trait::async_trait;
use chrono::Utc;

use crate::errors::AppResult;
use crate::models::{
    EmotionType, InsightsResult, IntentType, MessageSender, PiiEntity, PiiEntityType, PiiResult,
    ResolutionTime, SentimentResult, SentimentType, SummaryResult, UrgencyLevel,
};

use super::{AnalysisContext, ModelProvider};

const REDACTION: &str = "[REDACTED]";

const POSITIVE_MARKERS: &[&str] = &["relief", "thanks", "thank", "great", "perfect", "solved"];
const NEGATIVE_MARKERS: &[&str] = &[
    "frustrat",
    "angry",
    "locked",
    "urgent",
    "terrible",
    "need this fixed",
];

/// Deterministic provider used when `mock_mode` is enabled
#[derive(Debug, Default, Clone)]
pub struct MockModelProvider;

impl MockModelProvider {
    /// Create the mock provider
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ModelProvider for MockModelProvider {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn analyze_sentiment(&self, context: &AnalysisContext) -> AppResult<SentimentResult> {
        let lower = context.latest_message.to_lowercase();
        let (sentiment, emotion, confidence, reasoning) = if POSITIVE_MARKERS
            .iter()
            .any(|marker| lower.contains(marker))
        {
            (
                SentimentType::Positive,
                EmotionType::Satisfied,
                0.95,
                "The customer expresses relief or thanks, indicating satisfaction.",
            )
        } else if NEGATIVE_MARKERS.iter().any(|marker| lower.contains(marker)) {
            (
                SentimentType::Negative,
                EmotionType::Frustrated,
                0.95,
                "The customer expresses frustration or urgency.",
            )
        } else {
            (
                SentimentType::Neutral,
                EmotionType::Neutral,
                0.8,
                "The customer is providing information or responding neutrally.",
            )
        };

        Ok(SentimentResult {
            conversation_id: context.conversation_id.clone(),
            tenant_id: context.tenant_id.clone(),
            sentiment,
            confidence,
            emotion,
            reasoning: reasoning.to_owned(),
            timestamp: Utc::now(),
        })
    }

    async fn detect_pii(&self, context: &AnalysisContext) -> AppResult<PiiResult> {
        let text = &context.latest_message;
        let mut entities = detect_entities(text);
        entities.sort_by_key(|entity| entity.start);
        let has_pii = !entities.is_empty();
        let redacted_text = has_pii.then(|| redact(text, &entities));

        Ok(PiiResult {
            conversation_id: context.conversation_id.clone(),
            tenant_id: context.tenant_id.clone(),
            has_pii,
            entities,
            redacted_text,
            timestamp: Utc::now(),
        })
    }

    async fn extract_insights(&self, context: &AnalysisContext) -> AppResult<InsightsResult> {
        let lower = context.latest_message.to_lowercase();
        let intent = classify_intent(&lower);
        let urgency = classify_urgency(&lower);
        let requires_escalation = urgency == UrgencyLevel::Critical;
        let estimated_resolution_time = match urgency {
            UrgencyLevel::Critical => ResolutionTime::UnderOneHour,
            UrgencyLevel::High => ResolutionTime::OneToFourHours,
            UrgencyLevel::Medium | UrgencyLevel::Low => ResolutionTime::FourToTwentyFourHours,
        };

        let mut suggested_actions = vec!["Provide solution steps".to_owned()];
        if NEGATIVE_MARKERS.iter().any(|marker| lower.contains(marker)) {
            suggested_actions = vec![
                "Apologize and acknowledge frustration".to_owned(),
                "Provide immediate resolution".to_owned(),
            ];
        }
        if requires_escalation {
            suggested_actions.push("Escalate to senior support".to_owned());
        }

        Ok(InsightsResult {
            conversation_id: context.conversation_id.clone(),
            tenant_id: context.tenant_id.clone(),
            intent,
            urgency,
            categories: vec![intent_category(intent).to_owned()],
            suggested_actions,
            requires_escalation,
            estimated_resolution_time,
            key_concerns: vec![snippet(&context.latest_message, 80)],
            timestamp: Utc::now(),
        })
    }

    async fn update_summary(
        &self,
        context: &AnalysisContext,
        old_summary: Option<&SummaryResult>,
    ) -> AppResult<SummaryResult> {
        let latest = snippet(&context.latest_message, 60);
        let summary = match old_summary {
            Some(old) => {
                let mut key_points = old.key_points.clone();
                key_points.push(format!("{}: {latest}", context.latest_sender.label()));
                if key_points.len() > 5 {
                    let excess = key_points.len() - 5;
                    key_points.drain(..excess);
                }
                SummaryResult {
                    conversation_id: context.conversation_id.clone(),
                    tenant_id: context.tenant_id.clone(),
                    tldr: if old.tldr.is_empty() {
                        format!("Customer reported: {latest}")
                    } else {
                        old.tldr.clone()
                    },
                    customer_issue: if old.customer_issue.is_empty() {
                        latest.clone()
                    } else {
                        old.customer_issue.clone()
                    },
                    agent_response: if context.latest_sender == MessageSender::Agent {
                        Some(latest)
                    } else {
                        old.agent_response.clone()
                    },
                    key_points,
                    next_steps: vec!["Agent to follow up with the customer".to_owned()],
                    timestamp: Utc::now(),
                }
            }
            None => SummaryResult {
                conversation_id: context.conversation_id.clone(),
                tenant_id: context.tenant_id.clone(),
                tldr: format!("Customer reported: {latest}"),
                customer_issue: latest.clone(),
                agent_response: None,
                key_points: vec![format!("{}: {latest}", context.latest_sender.label())],
                next_steps: vec!["Agent to review the conversation".to_owned()],
                timestamp: Utc::now(),
            },
        };
        Ok(summary)
    }

    async fn generate_reply(&self, context: &AnalysisContext) -> AppResult<String> {
        Ok(format!(
            "Thank you for reaching out. We understand your concern about \"{}\" and an agent is looking into it now.",
            snippet(&context.latest_message, 40)
        ))
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn classify_intent(lower: &str) -> IntentType {
    if lower.contains("refund") {
        IntentType::RefundRequest
    } else if lower.contains("cancel") {
        IntentType::Cancellation
    } else if lower.contains("bill") || lower.contains("charge") {
        IntentType::BillingInquiry
    } else if lower.contains("account") || lower.contains("locked") || lower.contains("login") {
        IntentType::AccountIssue
    } else if lower.contains("feature") {
        IntentType::FeatureRequest
    } else if lower.contains("broken") || lower.contains("error") || lower.contains("not working")
    {
        IntentType::TechnicalIssue
    } else if lower.contains("complain") {
        IntentType::Complaint
    } else {
        IntentType::GeneralInquiry
    }
}

fn classify_urgency(lower: &str) -> UrgencyLevel {
    if lower.contains("urgent") || lower.contains("immediately") || lower.contains("right now") {
        UrgencyLevel::Critical
    } else if NEGATIVE_MARKERS.iter().any(|marker| lower.contains(marker)) {
        UrgencyLevel::High
    } else {
        UrgencyLevel::Low
    }
}

const fn intent_category(intent: IntentType) -> &'static str {
    match intent {
        IntentType::RefundRequest | IntentType::BillingInquiry => "Financial",
        IntentType::TechnicalIssue => "Technical Support",
        IntentType::AccountIssue => "Account Access",
        IntentType::FeatureRequest => "Product",
        IntentType::Complaint | IntentType::GeneralInquiry | IntentType::Cancellation => {
            "Customer Care"
        }
    }
}

/// Scan for email-, phone-, account-number-, and name-shaped spans
fn detect_entities(text: &str) -> Vec<PiiEntity> {
    let mut entities = Vec::new();
    detect_emails(text, &mut entities);
    detect_digit_runs(text, &mut entities);
    detect_names(text, &mut entities);
    entities
}

fn detect_emails(text: &str, entities: &mut Vec<PiiEntity>) {
    for (start, token) in tokens(text) {
        let Some(at) = token.find('@') else { continue };
        if at == 0 || !token[at + 1..].contains('.') {
            continue;
        }
        let trimmed = token.trim_end_matches(['.', ',', '!', '?', ';']);
        if trimmed.len() <= at + 1 {
            continue;
        }
        entities.push(PiiEntity {
            entity_type: PiiEntityType::Email,
            redacted_value: REDACTION.to_owned(),
            start,
            end: start + trimmed.len(),
        });
    }
}

fn detect_digit_runs(text: &str, entities: &mut Vec<PiiEntity>) {
    let mentions_account = text.to_lowercase().contains("account");
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let len = i - start;
            if len >= 8 {
                entities.push(PiiEntity {
                    entity_type: PiiEntityType::Phone,
                    redacted_value: REDACTION.to_owned(),
                    start,
                    end: i,
                });
            } else if len >= 4 && mentions_account {
                entities.push(PiiEntity {
                    entity_type: PiiEntityType::AccountNumber,
                    redacted_value: REDACTION.to_owned(),
                    start,
                    end: i,
                });
            }
        } else {
            i += 1;
        }
    }
}

fn detect_names(text: &str, entities: &mut Vec<PiiEntity>) {
    const MARKER: &str = "my name is ";
    let lower = text.to_lowercase();
    let Some(found) = lower.find(MARKER) else {
        return;
    };
    let start = found + MARKER.len();
    let rest = &text[start..];
    let mut end = start;
    for (index, word) in tokens(rest).take(2) {
        if !word.chars().next().is_some_and(char::is_uppercase) {
            break;
        }
        let trimmed = word.trim_end_matches(['.', ',', '!', '?']);
        end = start + index + trimmed.len();
    }
    if end > start {
        entities.push(PiiEntity {
            entity_type: PiiEntityType::Name,
            redacted_value: REDACTION.to_owned(),
            start,
            end,
        });
    }
}

/// Whitespace-separated tokens with their byte offsets
fn tokens<'a>(text: &'a str) -> impl Iterator<Item = (usize, &'a str)> + 'a {
    text.split_whitespace()
        .map(move |token| (offset_of(text, token), token))
}

fn offset_of(text: &str, token: &str) -> usize {
    // split_whitespace yields subslices of `text`, so pointer math is exact.
    token.as_ptr() as usize - text.as_ptr() as usize
}

/// Replace detected spans with the redaction placeholder, right to left so
/// earlier offsets stay valid
fn redact(text: &str, entities: &[PiiEntity]) -> String {
    let mut redacted = text.to_owned();
    let mut sorted: Vec<&PiiEntity> = entities.iter().collect();
    sorted.sort_by_key(|entity| std::cmp::Reverse(entity.start));
    for entity in sorted {
        if entity.end <= redacted.len() && redacted.is_char_boundary(entity.start)
            && redacted.is_char_boundary(entity.end)
        {
            redacted.replace_range(entity.start..entity.end, REDACTION);
        }
    }
    redacted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context(text: &str) -> AnalysisContext {
        AnalysisContext {
            conversation_id: "c1".into(),
            tenant_id: "acme".into(),
            summary_tldr: None,
            latest_message: text.into(),
            latest_sender: MessageSender::Customer,
            window_text: format!("Customer: {text}"),
        }
    }

    #[tokio::test]
    async fn frustrated_message_reads_negative() {
        let provider = MockModelProvider::new();
        let result = provider
            .analyze_sentiment(&context("I'm frustrated with my order"))
            .await
            .unwrap();
        assert_eq!(result.sentiment, SentimentType::Negative);
        assert_eq!(result.emotion, EmotionType::Frustrated);
    }

    #[tokio::test]
    async fn thanks_reads_positive() {
        let provider = MockModelProvider::new();
        let result = provider
            .analyze_sentiment(&context("Thanks, that solved it!"))
            .await
            .unwrap();
        assert_eq!(result.sentiment, SentimentType::Positive);
    }

    #[tokio::test]
    async fn email_is_detected_and_redacted() {
        let provider = MockModelProvider::new();
        let result = provider
            .detect_pii(&context("Contact me at alice@example.com"))
            .await
            .unwrap();
        assert!(result.has_pii);
        assert_eq!(result.entities.len(), 1);
        assert_eq!(result.entities[0].entity_type, PiiEntityType::Email);
        assert_eq!(result.entities[0].redacted_value, REDACTION);
        assert_eq!(
            result.redacted_text.as_deref(),
            Some("Contact me at [REDACTED]")
        );
    }

    #[tokio::test]
    async fn long_digit_run_is_a_phone_number() {
        let provider = MockModelProvider::new();
        let result = provider
            .detect_pii(&context("call me on 5551234567 please"))
            .await
            .unwrap();
        assert_eq!(result.entities[0].entity_type, PiiEntityType::Phone);
    }

    #[tokio::test]
    async fn short_digits_near_account_are_account_numbers() {
        let provider = MockModelProvider::new();
        let result = provider
            .detect_pii(&context("my account ending 4421 is locked"))
            .await
            .unwrap();
        assert_eq!(result.entities[0].entity_type, PiiEntityType::AccountNumber);
    }

    #[tokio::test]
    async fn plain_text_has_no_pii() {
        let provider = MockModelProvider::new();
        let result = provider.detect_pii(&context("Thanks!")).await.unwrap();
        assert!(!result.has_pii);
        assert!(result.entities.is_empty());
        assert!(result.redacted_text.is_none());
    }

    #[tokio::test]
    async fn urgent_message_escalates() {
        let provider = MockModelProvider::new();
        let result = provider
            .extract_insights(&context("this is urgent, my account is locked"))
            .await
            .unwrap();
        assert_eq!(result.urgency, UrgencyLevel::Critical);
        assert!(result.requires_escalation);
        assert_eq!(result.intent, IntentType::AccountIssue);
    }

    #[tokio::test]
    async fn summary_update_accumulates_key_points() {
        let provider = MockModelProvider::new();
        let first = provider
            .update_summary(&context("my order is late"), None)
            .await
            .unwrap();
        assert_eq!(first.key_points.len(), 1);

        let second = provider
            .update_summary(&context("it arrived broken too"), Some(&first))
            .await
            .unwrap();
        assert_eq!(second.key_points.len(), 2);
        assert_eq!(second.tldr, first.tldr);
    }
}
