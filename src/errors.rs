// ABOUTME: Centralized error handling and error types for the SignalStream pipeline
// ABOUTME: Defines error codes, transient classification, and conversions from library errors
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

//! # Unified Error Handling System
//!
//! Every component handles its errors locally; nothing propagates
//! synchronously across component boundaries except via the DLQ path or a
//! fallback record. The [`ErrorCode`] carried by [`AppError`] drives that
//! routing: transient codes are retried, permanent codes become DLQ records
//! or deterministic fallback results.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Standard error codes used throughout the pipeline
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Validation
    /// Input validation failed
    InvalidInput,
    /// Required field is missing from a request or record
    MissingRequiredField,

    // Resource Management
    /// Requested resource was not found
    ResourceNotFound,

    // Rate Limiting
    /// Local rate limit (token bucket) could not be satisfied in time
    RateLimitExceeded,

    // External Services
    /// External model service returned an error
    ExternalServiceError,
    /// External model service rate limited our request
    ExternalRateLimited,
    /// External call exceeded its deadline
    DeadlineExceeded,

    // Broker
    /// Broker produce/consume/commit failure
    BrokerError,

    // Internal
    /// Serialization or deserialization failed
    SerializationError,
    /// Configuration error occurred
    ConfigError,
    /// Internal pipeline error
    InternalError,
}

impl ErrorCode {
    /// Get a short description of this error code
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::InvalidInput => "The provided input is invalid",
            Self::MissingRequiredField => "A required field is missing",
            Self::ResourceNotFound => "The requested resource was not found",
            Self::RateLimitExceeded => "Local rate limit exceeded",
            Self::ExternalServiceError => "The model service encountered an error",
            Self::ExternalRateLimited => "The model service rate limited the request",
            Self::DeadlineExceeded => "The call exceeded its deadline",
            Self::BrokerError => "Broker operation failed",
            Self::SerializationError => "Data serialization or deserialization failed",
            Self::ConfigError => "Configuration error encountered",
            Self::InternalError => "An internal pipeline error occurred",
        }
    }

    /// Whether an operation failing with this code is worth retrying
    #[must_use]
    pub const fn is_transient(self) -> bool {
        matches!(
            self,
            Self::ExternalServiceError
                | Self::ExternalRateLimited
                | Self::DeadlineExceeded
                | Self::BrokerError
        )
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Simplified error type for the pipeline
#[derive(Debug, Clone, ThisError)]
pub struct AppError {
    /// Error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
}

impl AppError {
    /// Create a new `AppError` with the given code and message
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Invalid input error
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// Resource not found error
    #[must_use]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::new(
            ErrorCode::ResourceNotFound,
            format!("{} not found", resource.into()),
        )
    }

    /// Local rate limit error
    #[must_use]
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::RateLimitExceeded, message)
    }

    /// External model service error
    #[must_use]
    pub fn external_service(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalServiceError, message)
    }

    /// External rate limit signal (429-equivalent)
    #[must_use]
    pub fn external_rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ExternalRateLimited, message)
    }

    /// Deadline exceeded error
    #[must_use]
    pub fn deadline(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DeadlineExceeded, message)
    }

    /// Broker error
    #[must_use]
    pub fn broker(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BrokerError, message)
    }

    /// Serialization error
    #[must_use]
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::SerializationError, message)
    }

    /// Configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigError, message)
    }

    /// Internal error
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Whether this error is worth retrying
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        self.code.is_transient()
    }

    /// Full error details for internal logging
    #[must_use]
    pub fn internal_details(&self) -> String {
        format!("{:?}: {}", self.code, self.message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.description(), self.message)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::serialization(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::deadline(err.to_string());
        }
        match err.status() {
            Some(status) if status.as_u16() == 429 => Self::external_rate_limited(err.to_string()),
            _ => Self::external_service(err.to_string()),
        }
    }
}

impl From<rdkafka::error::KafkaError> for AppError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::broker(err.to_string())
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_codes_cover_model_and_broker_failures() {
        assert!(ErrorCode::ExternalServiceError.is_transient());
        assert!(ErrorCode::ExternalRateLimited.is_transient());
        assert!(ErrorCode::DeadlineExceeded.is_transient());
        assert!(ErrorCode::BrokerError.is_transient());
        assert!(!ErrorCode::SerializationError.is_transient());
        assert!(!ErrorCode::InvalidInput.is_transient());
    }

    #[test]
    fn constructors_set_expected_codes() {
        assert_eq!(AppError::invalid_input("bad").code, ErrorCode::InvalidInput);
        assert_eq!(
            AppError::not_found("conversation c1").code,
            ErrorCode::ResourceNotFound
        );
        assert_eq!(AppError::broker("down").code, ErrorCode::BrokerError);
    }

    #[test]
    fn display_includes_description_and_message() {
        let err = AppError::serialization("bad json at byte 4");
        let rendered = err.to_string();
        assert!(rendered.contains("deserialization failed"));
        assert!(rendered.contains("bad json at byte 4"));
    }
}
