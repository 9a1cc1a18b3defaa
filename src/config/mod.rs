// ABOUTME: Environment-driven configuration for the pipeline and its collaborators
// ABOUTME: Exposes Settings with per-field defaults matching the documented surface
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! # Configuration Surface
//!
//! All options are read from environment variables with sensible defaults,
//! so a bare process comes up against a local broker in mock mode without
//! any configuration at all.

use std::env;
use std::time::Duration;

use crate::constants::{limits, service, topics};
use crate::errors::{AppError, AppResult};

/// Environment variable for the broker bootstrap servers
pub const BROKER_BOOTSTRAP_ENV: &str = "BROKER_BOOTSTRAP_SERVERS";
/// Environment variable for the broker API key (SASL username)
pub const BROKER_API_KEY_ENV: &str = "BROKER_API_KEY";
/// Environment variable for the broker API secret (SASL password)
pub const BROKER_API_SECRET_ENV: &str = "BROKER_API_SECRET";
/// Environment variable for the broker security protocol
pub const BROKER_SECURITY_PROTOCOL_ENV: &str = "BROKER_SECURITY_PROTOCOL";
/// Environment variable for the Gemini API key
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
/// Environment variable for the Gemini model name
pub const GEMINI_MODEL_ENV: &str = "GEMINI_MODEL";
/// Environment variable enabling the deterministic mock model
pub const MOCK_MODE_ENV: &str = "MOCK_MODE";

/// Broker topic names, individually overridable
#[derive(Debug, Clone)]
pub struct TopicNames {
    /// Raw inbound support messages
    pub messages_raw: String,
    /// Conversation state emitted by the processor
    pub conversations_state: String,
    /// Sentiment analyzer results
    pub ai_sentiment: String,
    /// PII analyzer results
    pub ai_pii: String,
    /// Insights analyzer results
    pub ai_insights: String,
    /// Summary analyzer results
    pub ai_summary: String,
    /// Merged per-conversation intelligence
    pub ai_aggregated: String,
    /// Dead-letter queue
    pub dlq: String,
}

impl Default for TopicNames {
    fn default() -> Self {
        Self {
            messages_raw: topics::MESSAGES_RAW.into(),
            conversations_state: topics::CONVERSATIONS_STATE.into(),
            ai_sentiment: topics::AI_SENTIMENT.into(),
            ai_pii: topics::AI_PII.into(),
            ai_insights: topics::AI_INSIGHTS.into(),
            ai_summary: topics::AI_SUMMARY.into(),
            ai_aggregated: topics::AI_AGGREGATED.into(),
            dlq: topics::DLQ.into(),
        }
    }
}

impl TopicNames {
    /// Load topic names from the environment, falling back to defaults
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            messages_raw: env_or("TOPIC_MESSAGES_RAW", defaults.messages_raw),
            conversations_state: env_or("TOPIC_CONVERSATIONS_STATE", defaults.conversations_state),
            ai_sentiment: env_or("TOPIC_AI_SENTIMENT", defaults.ai_sentiment),
            ai_pii: env_or("TOPIC_AI_PII", defaults.ai_pii),
            ai_insights: env_or("TOPIC_AI_INSIGHTS", defaults.ai_insights),
            ai_summary: env_or("TOPIC_AI_SUMMARY", defaults.ai_summary),
            ai_aggregated: env_or("TOPIC_AI_AGGREGATED", defaults.ai_aggregated),
            dlq: env_or("TOPIC_DLQ", defaults.dlq),
        }
    }

    /// The four analyzer result topics the aggregator subscribes to
    #[must_use]
    pub fn result_topics(&self) -> Vec<String> {
        vec![
            self.ai_sentiment.clone(),
            self.ai_pii.clone(),
            self.ai_insights.clone(),
            self.ai_summary.clone(),
        ]
    }
}

/// Application settings loaded from environment variables
#[derive(Debug, Clone)]
pub struct Settings {
    /// Broker bootstrap servers
    pub broker_bootstrap_servers: String,
    /// Broker API key (SASL), if the broker requires authentication
    pub broker_api_key: Option<String>,
    /// Broker API secret (SASL)
    pub broker_api_secret: Option<String>,
    /// Broker security protocol (`PLAINTEXT` or `SASL_SSL`)
    pub broker_security_protocol: String,
    /// Consumer group prefix; component suffixes are appended
    pub consumer_group_prefix: String,
    /// Topic names
    pub topics: TopicNames,
    /// Global cap on in-flight model calls
    pub max_concurrent_model_requests: usize,
    /// Model requests allowed per minute
    pub model_requests_per_minute: u32,
    /// Bounded window of recent messages kept per conversation
    pub recent_messages_window: usize,
    /// Per-subscriber outbound queue depth
    pub subscriber_queue_depth: usize,
    /// Grace period for draining in-flight work at shutdown
    pub shutdown_grace: Duration,
    /// Use the deterministic mock model instead of the external service
    pub mock_mode: bool,
    /// Gemini API key; required unless `mock_mode` is set
    pub gemini_api_key: Option<String>,
    /// Gemini model name
    pub gemini_model: String,
    /// Per-attempt model call deadline
    pub model_attempt_deadline: Duration,
    /// Retry budget for model calls
    pub max_model_retries: u32,
    /// Base delay for model retry backoff
    pub model_retry_base: Duration,
    /// Retry budget before a record is routed to the DLQ
    pub max_record_retries: u32,
    /// Base delay for record retry backoff
    pub record_retry_base: Duration,
    /// Blocking poll timeout for consumer loops
    pub poll_timeout: Duration,
    /// Tenant applied to ingested messages that carry none
    pub default_tenant_id: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            broker_bootstrap_servers: "localhost:9092".into(),
            broker_api_key: None,
            broker_api_secret: None,
            broker_security_protocol: "PLAINTEXT".into(),
            consumer_group_prefix: service::GROUP_PREFIX.into(),
            topics: TopicNames::default(),
            max_concurrent_model_requests: limits::MAX_CONCURRENT_MODEL_REQUESTS,
            model_requests_per_minute: limits::MODEL_REQUESTS_PER_MINUTE,
            recent_messages_window: limits::RECENT_MESSAGES_WINDOW,
            subscriber_queue_depth: limits::SUBSCRIBER_QUEUE_DEPTH,
            shutdown_grace: Duration::from_secs(limits::SHUTDOWN_GRACE_SECS),
            mock_mode: false,
            gemini_api_key: None,
            gemini_model: "gemini-1.5-pro".into(),
            model_attempt_deadline: Duration::from_secs(limits::MODEL_ATTEMPT_DEADLINE_SECS),
            max_model_retries: limits::MAX_MODEL_RETRIES,
            model_retry_base: Duration::from_millis(limits::MODEL_RETRY_BASE_MS),
            max_record_retries: limits::MAX_RECORD_RETRIES,
            record_retry_base: Duration::from_secs(2),
            poll_timeout: Duration::from_millis(limits::POLL_TIMEOUT_MS),
            default_tenant_id: "demo-tenant".into(),
        }
    }
}

impl Settings {
    /// Load settings from environment variables
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` when `mock_mode` is off and no Gemini API key
    /// is configured, or when a numeric override fails to parse.
    pub fn from_env() -> AppResult<Self> {
        let defaults = Self::default();

        let mock_mode = env_bool(MOCK_MODE_ENV, defaults.mock_mode)?;
        let gemini_api_key = env::var(GEMINI_API_KEY_ENV).ok().filter(|k| !k.is_empty());

        if !mock_mode && gemini_api_key.is_none() {
            return Err(AppError::config(format!(
                "{GEMINI_API_KEY_ENV} is required unless {MOCK_MODE_ENV}=true"
            )));
        }

        Ok(Self {
            broker_bootstrap_servers: env_or(
                BROKER_BOOTSTRAP_ENV,
                defaults.broker_bootstrap_servers,
            ),
            broker_api_key: env::var(BROKER_API_KEY_ENV).ok().filter(|k| !k.is_empty()),
            broker_api_secret: env::var(BROKER_API_SECRET_ENV)
                .ok()
                .filter(|k| !k.is_empty()),
            broker_security_protocol: env_or(
                BROKER_SECURITY_PROTOCOL_ENV,
                defaults.broker_security_protocol,
            ),
            consumer_group_prefix: env_or("CONSUMER_GROUP_PREFIX", defaults.consumer_group_prefix),
            topics: TopicNames::from_env(),
            max_concurrent_model_requests: env_parse(
                "MAX_CONCURRENT_MODEL_REQUESTS",
                defaults.max_concurrent_model_requests,
            )?,
            model_requests_per_minute: env_parse(
                "MODEL_REQUESTS_PER_MINUTE",
                defaults.model_requests_per_minute,
            )?,
            recent_messages_window: env_parse(
                "RECENT_MESSAGES_WINDOW",
                defaults.recent_messages_window,
            )?,
            subscriber_queue_depth: env_parse(
                "SUBSCRIBER_QUEUE_DEPTH",
                defaults.subscriber_queue_depth,
            )?,
            shutdown_grace: Duration::from_secs(env_parse(
                "SHUTDOWN_GRACE_SECONDS",
                defaults.shutdown_grace.as_secs(),
            )?),
            mock_mode,
            gemini_api_key,
            gemini_model: env_or(GEMINI_MODEL_ENV, defaults.gemini_model),
            model_attempt_deadline: Duration::from_secs(env_parse(
                "MODEL_ATTEMPT_DEADLINE_SECONDS",
                defaults.model_attempt_deadline.as_secs(),
            )?),
            max_model_retries: env_parse("MAX_MODEL_RETRIES", defaults.max_model_retries)?,
            model_retry_base: defaults.model_retry_base,
            max_record_retries: env_parse("MAX_RECORD_RETRIES", defaults.max_record_retries)?,
            record_retry_base: defaults.record_retry_base,
            poll_timeout: defaults.poll_timeout,
            default_tenant_id: env_or("DEFAULT_TENANT_ID", defaults.default_tenant_id),
        })
    }

    /// Settings tuned for fast, hermetic tests: mock model, millisecond
    /// backoffs, tiny grace period.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            mock_mode: true,
            model_retry_base: Duration::from_millis(5),
            record_retry_base: Duration::from_millis(5),
            shutdown_grace: Duration::from_secs(2),
            poll_timeout: Duration::from_millis(20),
            ..Self::default()
        }
    }

    /// Consumer group id for a named component
    #[must_use]
    pub fn group_id(&self, component: &str) -> String {
        format!("{}-{component}", self.consumer_group_prefix)
    }
}

fn env_or(key: &str, default: String) -> String {
    env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> AppResult<bool> {
    match env::var(key) {
        Ok(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" | "" => Ok(false),
            other => Err(AppError::config(format!(
                "{key} must be a boolean, got {other:?}"
            ))),
        },
        Err(_) => Ok(default),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> AppResult<T> {
    match env::var(key) {
        Ok(raw) if !raw.is_empty() => raw
            .parse()
            .map_err(|_| AppError::config(format!("{key} has an invalid value: {raw:?}"))),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_surface() {
        let settings = Settings::default();
        assert_eq!(settings.max_concurrent_model_requests, 10);
        assert_eq!(settings.model_requests_per_minute, 60);
        assert_eq!(settings.recent_messages_window, 10);
        assert_eq!(settings.subscriber_queue_depth, 64);
        assert_eq!(settings.shutdown_grace, Duration::from_secs(30));
        assert_eq!(settings.max_record_retries, 3);
        assert!(!settings.mock_mode);
    }

    #[test]
    fn group_id_appends_component_suffix() {
        let settings = Settings::default();
        assert_eq!(settings.group_id("aggregation"), "signalstream-aggregation");
    }

    #[test]
    fn result_topics_cover_all_four_analyzers() {
        let names = TopicNames::default();
        let result = names.result_topics();
        assert_eq!(result.len(), 4);
        assert!(result.contains(&names.ai_sentiment));
        assert!(result.contains(&names.ai_summary));
    }
}
