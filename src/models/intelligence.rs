// ABOUTME: Analyzer result types and the merged per-conversation intelligence view
// ABOUTME: Includes the structural discriminator used to classify heterogeneous partials
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{AppError, AppResult};

/// Sentiment classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentType {
    /// Customer reads positive
    Positive,
    /// No clear polarity
    Neutral,
    /// Customer reads negative
    Negative,
}

/// Emotion classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionType {
    /// Overt anger
    Angry,
    /// Frustration short of anger
    Frustrated,
    /// Satisfied with the interaction
    Satisfied,
    /// Confused about product or process
    Confused,
    /// Pressing for immediate action
    Urgent,
    /// Clearly happy
    Happy,
    /// No marked emotion
    Neutral,
}

/// Sentiment analysis result for the latest message of a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentimentResult {
    /// Conversation identifier
    pub conversation_id: String,
    /// Tenant identifier
    pub tenant_id: String,
    /// Overall polarity
    pub sentiment: SentimentType,
    /// Confidence in `[0, 1]`
    pub confidence: f64,
    /// Dominant emotion
    pub emotion: EmotionType,
    /// Brief model explanation
    pub reasoning: String,
    /// Production timestamp
    pub timestamp: DateTime<Utc>,
}

/// Types of PII entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiEntityType {
    /// Email address
    Email,
    /// Phone number
    Phone,
    /// Credit card number, possibly partial
    CreditCard,
    /// SSN or national ID
    Ssn,
    /// Physical address
    Address,
    /// Account number
    AccountNumber,
    /// Personal name
    Name,
}

/// Detected PII entity
///
/// The raw value never leaves the detector; only the redaction placeholder
/// and the span survive onto the log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiEntity {
    /// Entity category
    #[serde(rename = "type")]
    pub entity_type: PiiEntityType,
    /// Redaction placeholder, normally `[REDACTED]`
    pub redacted_value: String,
    /// Start of the span in the original text
    pub start: usize,
    /// End of the span in the original text
    pub end: usize,
}

impl PiiEntity {
    /// Deduplication key for the aggregator's union merge
    #[must_use]
    pub fn dedup_key(&self) -> (PiiEntityType, String) {
        (self.entity_type, self.redacted_value.clone())
    }
}

/// PII detection result for a single message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PiiResult {
    /// Conversation identifier
    pub conversation_id: String,
    /// Tenant identifier
    pub tenant_id: String,
    /// Whether this message contains PII
    pub has_pii: bool,
    /// Entities detected in this message
    pub entities: Vec<PiiEntity>,
    /// Message text with PII spans replaced
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redacted_text: Option<String>,
    /// Production timestamp
    pub timestamp: DateTime<Utc>,
}

/// Customer intent classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentType {
    /// Customer wants money back
    #[serde(rename = "Refund Request")]
    RefundRequest,
    /// Product malfunction
    #[serde(rename = "Technical Issue")]
    TechnicalIssue,
    /// Question about charges
    #[serde(rename = "Billing Inquiry")]
    BillingInquiry,
    /// Request for new functionality
    #[serde(rename = "Feature Request")]
    FeatureRequest,
    /// General dissatisfaction
    #[serde(rename = "Complaint")]
    Complaint,
    /// Anything else
    #[serde(rename = "General Inquiry")]
    GeneralInquiry,
    /// Login, lockout, profile problems
    #[serde(rename = "Account Issue")]
    AccountIssue,
    /// Wants to cancel the service
    #[serde(rename = "Cancellation")]
    Cancellation,
}

/// Urgency classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum UrgencyLevel {
    /// Can wait
    Low,
    /// Normal queue
    Medium,
    /// Needs prompt attention
    High,
    /// Needs immediate attention
    Critical,
}

/// Estimated resolution time bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResolutionTime {
    /// Under one hour
    #[serde(rename = "< 1 hour")]
    UnderOneHour,
    /// One to four hours
    #[serde(rename = "1-4 hours")]
    OneToFourHours,
    /// Four to twenty-four hours
    #[serde(rename = "4-24 hours")]
    FourToTwentyFourHours,
    /// One to three days
    #[serde(rename = "1-3 days")]
    OneToThreeDays,
}

/// Intent and insights extraction result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsightsResult {
    /// Conversation identifier
    pub conversation_id: String,
    /// Tenant identifier
    pub tenant_id: String,
    /// Classified intent
    pub intent: IntentType,
    /// Urgency level
    pub urgency: UrgencyLevel,
    /// Free-form categories
    #[serde(default)]
    pub categories: Vec<String>,
    /// Recommended agent actions
    #[serde(default)]
    pub suggested_actions: Vec<String>,
    /// Whether a human escalation is warranted
    pub requires_escalation: bool,
    /// Expected resolution bucket
    pub estimated_resolution_time: ResolutionTime,
    /// Concerns worth surfacing to the agent
    #[serde(default)]
    pub key_concerns: Vec<String>,
    /// Production timestamp
    pub timestamp: DateTime<Utc>,
}

/// Conversation summary result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryResult {
    /// Conversation identifier
    pub conversation_id: String,
    /// Tenant identifier
    pub tenant_id: String,
    /// One-sentence summary
    pub tldr: String,
    /// What the customer needs
    pub customer_issue: String,
    /// What the agent has done so far, if anything
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_response: Option<String>,
    /// Key points so far
    #[serde(default)]
    pub key_points: Vec<String>,
    /// Agreed or suggested next steps
    #[serde(default)]
    pub next_steps: Vec<String>,
    /// Production timestamp
    pub timestamp: DateTime<Utc>,
}

impl SummaryResult {
    /// Empty skeleton used as the model fallback when no prior summary exists
    #[must_use]
    pub fn empty(conversation_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            tenant_id: tenant_id.into(),
            tldr: String::new(),
            customer_issue: String::new(),
            agent_response: None,
            key_points: Vec::new(),
            next_steps: Vec::new(),
            timestamp: Utc::now(),
        }
    }
}

/// Merged intelligence from all analyzers for one conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedIntelligence {
    /// Conversation identifier
    pub conversation_id: String,
    /// Tenant identifier
    pub tenant_id: String,
    /// Latest sentiment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<SentimentResult>,
    /// Merged PII view (monotonic flag, union of entities)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pii: Option<PiiResult>,
    /// Latest insights
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<InsightsResult>,
    /// Latest summary
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<SummaryResult>,
    /// When any component last changed
    pub last_updated: DateTime<Utc>,
    /// Derived conversation health score in `0..=100`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<u8>,
}

impl AggregatedIntelligence {
    /// Empty view created lazily on the first partial result
    #[must_use]
    pub fn new(conversation_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            tenant_id: tenant_id.into(),
            sentiment: None,
            pii: None,
            insights: None,
            summary: None,
            last_updated: Utc::now(),
            quality_score: None,
        }
    }

    /// Derive the conversation health score from the current components
    ///
    /// Starts at 50; sentiment shifts it by up to ±25 scaled by confidence;
    /// urgency above Low, an escalation flag, and PII presence each pull it
    /// down. Clamped to `0..=100`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn compute_quality_score(&self) -> Option<u8> {
        if self.sentiment.is_none() && self.insights.is_none() && self.pii.is_none() {
            return None;
        }
        let mut score: f64 = 50.0;
        if let Some(sentiment) = &self.sentiment {
            let polarity = match sentiment.sentiment {
                SentimentType::Positive => 25.0,
                SentimentType::Neutral => 0.0,
                SentimentType::Negative => -25.0,
            };
            score += polarity * sentiment.confidence.clamp(0.0, 1.0);
        }
        if let Some(insights) = &self.insights {
            let steps = match insights.urgency {
                UrgencyLevel::Low => 0.0,
                UrgencyLevel::Medium => 1.0,
                UrgencyLevel::High => 2.0,
                UrgencyLevel::Critical => 3.0,
            };
            score -= steps * 10.0;
            if insights.requires_escalation {
                score -= 15.0;
            }
        }
        if self.pii.as_ref().is_some_and(|pii| pii.has_pii) {
            score -= 10.0;
        }
        Some(score.clamp(0.0, 100.0).round() as u8)
    }
}

/// A single analyzer output, classified from its decoded JSON shape
///
/// The four result topics carry four distinct payload shapes with no shared
/// envelope; the discriminating fields below are each unique to one shape.
#[derive(Debug, Clone)]
pub enum PartialResult {
    /// Sentiment analyzer output
    Sentiment(SentimentResult),
    /// PII analyzer output
    Pii(PiiResult),
    /// Insights analyzer output
    Insights(InsightsResult),
    /// Summary analyzer output
    Summary(SummaryResult),
}

impl PartialResult {
    /// Classify a decoded payload by its structure
    ///
    /// # Errors
    ///
    /// Returns a `SerializationError` when the payload matches none of the
    /// four result shapes or fails typed decoding.
    pub fn classify(value: &Value) -> AppResult<Self> {
        if value.get("sentiment").is_some() && value.get("emotion").is_some() {
            return Ok(Self::Sentiment(serde_json::from_value(value.clone())?));
        }
        if value.get("has_pii").is_some() && value.get("entities").is_some() {
            return Ok(Self::Pii(serde_json::from_value(value.clone())?));
        }
        if value.get("intent").is_some() && value.get("urgency").is_some() {
            return Ok(Self::Insights(serde_json::from_value(value.clone())?));
        }
        if value.get("tldr").is_some() && value.get("customer_issue").is_some() {
            return Ok(Self::Summary(serde_json::from_value(value.clone())?));
        }
        Err(AppError::serialization(
            "payload matches no known analyzer result shape",
        ))
    }

    /// Conversation id carried by the result
    #[must_use]
    pub fn conversation_id(&self) -> &str {
        match self {
            Self::Sentiment(r) => &r.conversation_id,
            Self::Pii(r) => &r.conversation_id,
            Self::Insights(r) => &r.conversation_id,
            Self::Summary(r) => &r.conversation_id,
        }
    }

    /// Tenant id carried by the result
    #[must_use]
    pub fn tenant_id(&self) -> &str {
        match self {
            Self::Sentiment(r) => &r.tenant_id,
            Self::Pii(r) => &r.tenant_id,
            Self::Insights(r) => &r.tenant_id,
            Self::Summary(r) => &r.tenant_id,
        }
    }
}
