// ABOUTME: Rate-limited, bounded-concurrency model client with retry and fallbacks
// ABOUTME: The only path workers use to reach the model; it never returns an error
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! # Model Client
//!
//! Wraps a [`ModelProvider`] with the pipeline's resource discipline:
//!
//! - a token bucket sized in requests per minute,
//! - a global semaphore bounding in-flight calls,
//! - up to three retries on transient failure with jittered exponential
//!   backoff (2s, 4s, 8s ±20%),
//! - a per-attempt deadline,
//! - a deterministic fallback for every operation, so downstream stages
//!   never stall on a model outage.
//!
//! Fallback results and real results are indistinguishable to the rest of
//! the pipeline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use crate::config::Settings;
use crate::errors::AppResult;
use crate::models::{
    EmotionType, InsightsResult, IntentType, PiiResult, ResolutionTime, SentimentResult,
    SentimentType, SummaryResult, UrgencyLevel,
};

use super::{AnalysisContext, MinuteRateLimiter, ModelProvider};

const FALLBACK_REPLY: &str =
    "Thank you for your message. A support agent will assist you shortly.";

/// Shared, rate-limited entry point to the generative model
pub struct ModelClient {
    provider: Arc<dyn ModelProvider>,
    limiter: MinuteRateLimiter,
    semaphore: Semaphore,
    attempt_deadline: Duration,
    max_retries: u32,
    retry_base: Duration,
}

impl ModelClient {
    /// Build a client around a provider using the configured limits
    #[must_use]
    pub fn new(provider: Arc<dyn ModelProvider>, settings: &Settings) -> Self {
        Self {
            provider,
            limiter: MinuteRateLimiter::new(settings.model_requests_per_minute),
            semaphore: Semaphore::new(settings.max_concurrent_model_requests.max(1)),
            attempt_deadline: settings.model_attempt_deadline,
            max_retries: settings.max_model_retries,
            retry_base: settings.model_retry_base,
        }
    }

    /// Name of the underlying provider
    #[must_use]
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Sentiment for the latest message; neutral fallback on failure
    pub async fn analyze_sentiment(&self, context: &AnalysisContext) -> SentimentResult {
        let provider = Arc::clone(&self.provider);
        self.call("analyze_sentiment", context, {
            let context = context.clone();
            move || {
                let provider = Arc::clone(&provider);
                let context = context.clone();
                async move { provider.analyze_sentiment(&context).await }
            }
        })
        .await
        .unwrap_or_else(|| fallback_sentiment(context))
    }

    /// PII detection for the latest message; clean fallback on failure
    pub async fn detect_pii(&self, context: &AnalysisContext) -> PiiResult {
        let provider = Arc::clone(&self.provider);
        self.call("detect_pii", context, {
            let context = context.clone();
            move || {
                let provider = Arc::clone(&provider);
                let context = context.clone();
                async move { provider.detect_pii(&context).await }
            }
        })
        .await
        .unwrap_or_else(|| fallback_pii(context))
    }

    /// Insights for the conversation; general-inquiry fallback on failure
    pub async fn extract_insights(&self, context: &AnalysisContext) -> InsightsResult {
        let provider = Arc::clone(&self.provider);
        self.call("extract_insights", context, {
            let context = context.clone();
            move || {
                let provider = Arc::clone(&provider);
                let context = context.clone();
                async move { provider.extract_insights(&context).await }
            }
        })
        .await
        .unwrap_or_else(|| fallback_insights(context))
    }

    /// Incremental summary update; previous summary (or an empty skeleton)
    /// on failure
    pub async fn update_summary(
        &self,
        context: &AnalysisContext,
        old_summary: Option<&SummaryResult>,
    ) -> SummaryResult {
        let provider = Arc::clone(&self.provider);
        let old_owned = old_summary.cloned();
        self.call("update_summary", context, {
            let context = context.clone();
            move || {
                let provider = Arc::clone(&provider);
                let context = context.clone();
                let old_owned = old_owned.clone();
                async move { provider.update_summary(&context, old_owned.as_ref()).await }
            }
        })
        .await
        .unwrap_or_else(|| fallback_summary(context, old_summary))
    }

    /// Free-form agent-assist reply; canned apology on failure
    pub async fn generate_reply(&self, context: &AnalysisContext) -> String {
        let provider = Arc::clone(&self.provider);
        self.call("generate_reply", context, {
            let context = context.clone();
            move || {
                let provider = Arc::clone(&provider);
                let context = context.clone();
                async move { provider.generate_reply(&context).await }
            }
        })
        .await
        .unwrap_or_else(|| FALLBACK_REPLY.to_owned())
    }

    /// Run one operation under the shared limits with the retry budget.
    /// Returns `None` when every attempt failed and the caller should
    /// substitute its fallback.
    async fn call<T, F, Fut>(
        &self,
        operation: &'static str,
        context: &AnalysisContext,
        attempt: F,
    ) -> Option<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = AppResult<T>>,
    {
        let Ok(_permit) = self.semaphore.acquire().await else {
            // Semaphore closed only at shutdown; fall back immediately.
            return None;
        };

        for round in 0..=self.max_retries {
            if round > 0 {
                sleep(self.backoff_delay(round)).await;
            }

            let deadline = Instant::now() + self.attempt_deadline;
            if let Err(err) = self.limiter.acquire(deadline).await {
                warn!(
                    operation,
                    conversation_id = %context.conversation_id,
                    round,
                    error = %err,
                    "Rate limit acquisition failed"
                );
                continue;
            }

            match timeout(self.attempt_deadline, attempt()).await {
                Ok(Ok(value)) => {
                    debug!(
                        operation,
                        conversation_id = %context.conversation_id,
                        round,
                        "Model call succeeded"
                    );
                    return Some(value);
                }
                Ok(Err(err)) if err.is_transient() && round < self.max_retries => {
                    warn!(
                        operation,
                        conversation_id = %context.conversation_id,
                        round,
                        error = %err,
                        "Transient model failure, will retry"
                    );
                }
                Ok(Err(err)) => {
                    warn!(
                        operation,
                        conversation_id = %context.conversation_id,
                        tenant_id = %context.tenant_id,
                        round,
                        error = %err,
                        "Model call failed permanently, substituting fallback"
                    );
                    return None;
                }
                Err(_elapsed) if round < self.max_retries => {
                    warn!(
                        operation,
                        conversation_id = %context.conversation_id,
                        round,
                        "Model call exceeded its deadline, will retry"
                    );
                }
                Err(_elapsed) => {
                    warn!(
                        operation,
                        conversation_id = %context.conversation_id,
                        round,
                        "Model call exceeded its deadline, substituting fallback"
                    );
                    return None;
                }
            }
        }

        warn!(
            operation,
            conversation_id = %context.conversation_id,
            "Retry budget exhausted, substituting fallback"
        );
        None
    }

    /// Exponential backoff with ±20% jitter: base, 2·base, 4·base, …
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn backoff_delay(&self, round: u32) -> Duration {
        let exponent = round.saturating_sub(1).min(16);
        let base_ms = self.retry_base.as_millis() as u64 * (1_u64 << exponent);
        let jitter = rand::thread_rng().gen_range(0.8..=1.2);
        Duration::from_millis((base_ms as f64 * jitter) as u64)
    }
}

fn fallback_sentiment(context: &AnalysisContext) -> SentimentResult {
    SentimentResult {
        conversation_id: context.conversation_id.clone(),
        tenant_id: context.tenant_id.clone(),
        sentiment: SentimentType::Neutral,
        confidence: 0.0,
        emotion: EmotionType::Neutral,
        reasoning: "Sentiment analysis unavailable; neutral fallback applied.".to_owned(),
        timestamp: Utc::now(),
    }
}

fn fallback_pii(context: &AnalysisContext) -> PiiResult {
    PiiResult {
        conversation_id: context.conversation_id.clone(),
        tenant_id: context.tenant_id.clone(),
        has_pii: false,
        entities: Vec::new(),
        redacted_text: None,
        timestamp: Utc::now(),
    }
}

fn fallback_insights(context: &AnalysisContext) -> InsightsResult {
    InsightsResult {
        conversation_id: context.conversation_id.clone(),
        tenant_id: context.tenant_id.clone(),
        intent: IntentType::GeneralInquiry,
        urgency: UrgencyLevel::Low,
        categories: Vec::new(),
        suggested_actions: Vec::new(),
        requires_escalation: false,
        estimated_resolution_time: ResolutionTime::OneToFourHours,
        key_concerns: Vec::new(),
        timestamp: Utc::now(),
    }
}

fn fallback_summary(
    context: &AnalysisContext,
    old_summary: Option<&SummaryResult>,
) -> SummaryResult {
    old_summary.map_or_else(
        || SummaryResult::empty(&context.conversation_id, &context.tenant_id),
        |old| SummaryResult {
            timestamp: Utc::now(),
            ..old.clone()
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use crate::models::MessageSender;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn context() -> AnalysisContext {
        AnalysisContext {
            conversation_id: "c1".into(),
            tenant_id: "acme".into(),
            summary_tldr: None,
            latest_message: "hello".into(),
            latest_sender: MessageSender::Customer,
            window_text: "Customer: hello".into(),
        }
    }

    /// Provider that fails a configured number of times before succeeding
    struct FlakyProvider {
        failures: AtomicU32,
        permanent: bool,
    }

    #[async_trait]
    impl ModelProvider for FlakyProvider {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn analyze_sentiment(
            &self,
            context: &AnalysisContext,
        ) -> AppResult<SentimentResult> {
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (n > 0).then(|| n - 1)
            }).is_ok()
            {
                if self.permanent {
                    return Err(AppError::serialization("unparseable model output"));
                }
                return Err(AppError::external_service("upstream 503"));
            }
            Ok(SentimentResult {
                conversation_id: context.conversation_id.clone(),
                tenant_id: context.tenant_id.clone(),
                sentiment: SentimentType::Positive,
                confidence: 0.9,
                emotion: EmotionType::Happy,
                reasoning: "recovered".into(),
                timestamp: Utc::now(),
            })
        }

        async fn detect_pii(&self, _context: &AnalysisContext) -> AppResult<PiiResult> {
            Err(AppError::external_service("always down"))
        }

        async fn extract_insights(
            &self,
            _context: &AnalysisContext,
        ) -> AppResult<InsightsResult> {
            Err(AppError::external_service("always down"))
        }

        async fn update_summary(
            &self,
            context: &AnalysisContext,
            old_summary: Option<&SummaryResult>,
        ) -> AppResult<SummaryResult> {
            let _ = (context, old_summary);
            Err(AppError::external_service("always down"))
        }

        async fn generate_reply(&self, _context: &AnalysisContext) -> AppResult<String> {
            Err(AppError::external_service("always down"))
        }
    }

    fn client(provider: FlakyProvider) -> ModelClient {
        ModelClient::new(Arc::new(provider), &Settings::for_tests())
    }

    #[tokio::test]
    async fn transient_failures_are_retried_to_success() {
        let client = client(FlakyProvider {
            failures: AtomicU32::new(2),
            permanent: false,
        });
        let result = client.analyze_sentiment(&context()).await;
        assert_eq!(result.sentiment, SentimentType::Positive);
        assert_eq!(result.reasoning, "recovered");
    }

    #[tokio::test]
    async fn permanent_failure_yields_neutral_fallback() {
        let client = client(FlakyProvider {
            failures: AtomicU32::new(100),
            permanent: true,
        });
        let result = client.analyze_sentiment(&context()).await;
        assert_eq!(result.sentiment, SentimentType::Neutral);
        assert!((result.confidence - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn exhausted_retries_yield_fallbacks_for_every_operation() {
        let client = client(FlakyProvider {
            failures: AtomicU32::new(0),
            permanent: false,
        });
        let ctx = context();

        let pii = client.detect_pii(&ctx).await;
        assert!(!pii.has_pii);
        assert!(pii.entities.is_empty());

        let insights = client.extract_insights(&ctx).await;
        assert_eq!(insights.intent, IntentType::GeneralInquiry);
        assert_eq!(insights.urgency, UrgencyLevel::Low);

        let summary = client.update_summary(&ctx, None).await;
        assert!(summary.tldr.is_empty());

        let reply = client.generate_reply(&ctx).await;
        assert_eq!(reply, FALLBACK_REPLY);
    }

    #[tokio::test]
    async fn fallback_summary_preserves_previous_summary() {
        let client = client(FlakyProvider {
            failures: AtomicU32::new(0),
            permanent: false,
        });
        let previous = SummaryResult {
            tldr: "customer locked out".into(),
            ..SummaryResult::empty("c1", "acme")
        };
        let result = client.update_summary(&context(), Some(&previous)).await;
        assert_eq!(result.tldr, "customer locked out");
    }

    #[test]
    fn backoff_doubles_with_bounded_jitter() {
        let client = client(FlakyProvider {
            failures: AtomicU32::new(0),
            permanent: false,
        });
        let first = client.backoff_delay(1).as_millis() as f64;
        let second = client.backoff_delay(2).as_millis() as f64;
        // base 5ms in test settings: 4..=6 then 8..=12
        assert!((4.0..=6.0).contains(&first));
        assert!((8.0..=12.0).contains(&second));
    }
}
