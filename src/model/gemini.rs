// ABOUTME: Google Gemini provider over the Generative Language REST API
// ABOUTME: Forces JSON-mode output and decodes it into the typed result structs
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! # Gemini Provider
//!
//! JSON mode is requested via `responseMimeType`, but models still wrap
//! output in markdown fences often enough that decoding strips them first.
//! A response that cannot be decoded into the expected shape is a permanent
//! failure; the client substitutes the fallback value.

use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::models::{
    EmotionType, InsightsResult, IntentType, PiiEntity, PiiEntityType, PiiResult, ResolutionTime,
    SentimentResult, SentimentType, SummaryResult, UrgencyLevel,
};

use super::{prompts, AnalysisContext, ModelProvider};

const API_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Google Gemini model provider
pub struct GeminiProvider {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    /// Create a provider for the given API key and model
    #[must_use]
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: API_BASE_URL.to_owned(),
        }
    }

    /// Override the API base URL (test servers)
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn generate_json(&self, prompt: &str) -> AppResult<Value> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_owned(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.3,
                top_p: 0.95,
                top_k: 40,
                max_output_tokens: 2048,
                response_mime_type: "application/json",
            },
        };

        let response = self.client.post(&url).json(&request).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &body));
        }

        let decoded: GenerateResponse = response.json().await?;
        let text = decoded
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content.parts.into_iter().next())
            .and_then(|part| part.text)
            .ok_or_else(|| AppError::serialization("model response carried no text part"))?;

        parse_json_payload(&text)
    }
}

fn classify_status(status: StatusCode, body: &str) -> AppError {
    debug!(status = %status, "Model API returned an error");
    if status == StatusCode::TOO_MANY_REQUESTS {
        AppError::external_rate_limited(format!("model API rate limited: {body}"))
    } else if status.is_server_error() {
        AppError::external_service(format!("model API {status}: {body}"))
    } else {
        // 4xx other than 429 will not succeed on retry.
        AppError::invalid_input(format!("model API rejected request ({status}): {body}"))
    }
}

/// Strip markdown fences and decode; a single-element array unwraps to its
/// first element, which some models emit in JSON mode.
fn parse_json_payload(text: &str) -> AppResult<Value> {
    let mut trimmed = text.trim();
    if trimmed.starts_with("```") {
        trimmed = trimmed.trim_start_matches("```json").trim_start_matches("```");
        if let Some(end) = trimmed.rfind("```") {
            trimmed = &trimmed[..end];
        }
        trimmed = trimmed.trim();
    }
    let value: Value = serde_json::from_str(trimmed)?;
    match value {
        Value::Array(mut items) if !items.is_empty() => Ok(items.remove(0)),
        other => Ok(other),
    }
}

#[async_trait::async_trait]
impl ModelProvider for GeminiProvider {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn analyze_sentiment(&self, context: &AnalysisContext) -> AppResult<SentimentResult> {
        let value = self.generate_json(&prompts::sentiment(context)).await?;
        let payload: SentimentPayload = serde_json::from_value(value)?;
        Ok(SentimentResult {
            conversation_id: context.conversation_id.clone(),
            tenant_id: context.tenant_id.clone(),
            sentiment: payload.sentiment,
            confidence: payload.confidence.clamp(0.0, 1.0),
            emotion: payload.emotion,
            reasoning: payload.reasoning,
            timestamp: Utc::now(),
        })
    }

    async fn detect_pii(&self, context: &AnalysisContext) -> AppResult<PiiResult> {
        let value = self
            .generate_json(&prompts::pii(&context.latest_message))
            .await?;
        let payload: PiiPayload = serde_json::from_value(value)?;
        let entities = payload
            .entities
            .into_iter()
            .map(|entity| PiiEntity {
                entity_type: entity.entity_type,
                redacted_value: entity.value,
                start: entity.start_index,
                end: entity.end_index,
            })
            .collect();
        Ok(PiiResult {
            conversation_id: context.conversation_id.clone(),
            tenant_id: context.tenant_id.clone(),
            has_pii: payload.has_pii,
            entities,
            redacted_text: payload.redacted_text,
            timestamp: Utc::now(),
        })
    }

    async fn extract_insights(&self, context: &AnalysisContext) -> AppResult<InsightsResult> {
        let value = self.generate_json(&prompts::insights(context)).await?;
        let payload: InsightsPayload = serde_json::from_value(value)?;
        Ok(InsightsResult {
            conversation_id: context.conversation_id.clone(),
            tenant_id: context.tenant_id.clone(),
            intent: payload.intent,
            urgency: payload.urgency,
            categories: payload.categories,
            suggested_actions: payload.suggested_actions,
            requires_escalation: payload.requires_escalation,
            estimated_resolution_time: payload.estimated_resolution_time,
            key_concerns: payload.key_concerns,
            timestamp: Utc::now(),
        })
    }

    async fn update_summary(
        &self,
        context: &AnalysisContext,
        old_summary: Option<&SummaryResult>,
    ) -> AppResult<SummaryResult> {
        let prompt = if old_summary.is_some() {
            prompts::summary_update(
                old_summary,
                &context.latest_message,
                context.latest_sender.label(),
            )
        } else {
            prompts::summary_full(&context.window_text)
        };
        let value = self.generate_json(&prompt).await?;
        let payload: SummaryPayload = serde_json::from_value(value)?;
        Ok(SummaryResult {
            conversation_id: context.conversation_id.clone(),
            tenant_id: context.tenant_id.clone(),
            tldr: payload.tldr,
            customer_issue: payload.customer_issue,
            agent_response: payload.agent_response,
            key_points: payload.key_points,
            next_steps: payload.next_steps,
            timestamp: Utc::now(),
        })
    }

    async fn generate_reply(&self, context: &AnalysisContext) -> AppResult<String> {
        let value = self.generate_json(&prompts::reply(context)).await?;
        let payload: ReplyPayload = serde_json::from_value(value)?;
        Ok(payload.response)
    }
}

// ============================================================================
// API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f64,
    #[serde(rename = "topP")]
    top_p: f64,
    #[serde(rename = "topK")]
    top_k: u32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

// ============================================================================
// Model Output Payloads
// ============================================================================

#[derive(Debug, Deserialize)]
struct SentimentPayload {
    sentiment: SentimentType,
    confidence: f64,
    emotion: EmotionType,
    reasoning: String,
}

#[derive(Debug, Deserialize)]
struct PiiPayload {
    #[serde(rename = "hasPII")]
    has_pii: bool,
    #[serde(default)]
    entities: Vec<PiiEntityPayload>,
    #[serde(rename = "redactedText")]
    redacted_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PiiEntityPayload {
    #[serde(rename = "type")]
    entity_type: PiiEntityType,
    #[serde(default = "default_redaction")]
    value: String,
    #[serde(rename = "startIndex")]
    start_index: usize,
    #[serde(rename = "endIndex")]
    end_index: usize,
}

fn default_redaction() -> String {
    "[REDACTED]".to_owned()
}

#[derive(Debug, Deserialize)]
struct InsightsPayload {
    intent: IntentType,
    urgency: UrgencyLevel,
    #[serde(default)]
    categories: Vec<String>,
    #[serde(rename = "suggestedActions", default)]
    suggested_actions: Vec<String>,
    #[serde(rename = "requiresEscalation")]
    requires_escalation: bool,
    #[serde(rename = "estimatedResolutionTime")]
    estimated_resolution_time: ResolutionTime,
    #[serde(rename = "keyConcerns", default)]
    key_concerns: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SummaryPayload {
    tldr: String,
    #[serde(rename = "customerIssue")]
    customer_issue: String,
    #[serde(rename = "agentResponse")]
    agent_response: Option<String>,
    #[serde(rename = "keyPoints", default)]
    key_points: Vec<String>,
    #[serde(rename = "nextSteps", default)]
    next_steps: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyPayload {
    response: String,
}
