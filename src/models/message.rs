// ABOUTME: Support message wire types and the ingestion request/response contract
// ABOUTME: Validates text length and required fields before anything reaches the log
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::constants::limits;
use crate::errors::{AppError, AppResult};

/// Message sender type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageSender {
    /// End customer
    Customer,
    /// Human support agent
    Agent,
    /// Automated system message
    System,
}

impl MessageSender {
    /// Label used in prompt context lines
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Customer => "Customer",
            Self::Agent => "Agent",
            Self::System => "System",
        }
    }
}

/// Communication channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageChannel {
    /// Live chat widget
    Chat,
    /// Email
    Email,
    /// Voice transcription
    Voice,
    /// SMS
    Sms,
}

impl Default for MessageChannel {
    fn default() -> Self {
        Self::Chat
    }
}

/// Request payload from the ingestion collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageRequest {
    /// Unique identifier for the conversation
    pub conversation_id: String,
    /// Who sent the message
    pub sender: MessageSender,
    /// Message content
    pub text: String,
    /// Channel type
    #[serde(default)]
    pub channel: MessageChannel,
    /// Tenant ID; the configured default is applied when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Additional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl CreateMessageRequest {
    /// Validate required fields and bounds
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty conversation id, an empty message,
    /// or a message longer than the accepted maximum.
    pub fn validate(&self) -> AppResult<()> {
        if self.conversation_id.trim().is_empty() {
            return Err(AppError::invalid_input("conversation_id must not be empty"));
        }
        if self.text.is_empty() {
            return Err(AppError::invalid_input("message text must not be empty"));
        }
        let chars = self.text.chars().count();
        if chars > limits::MAX_MESSAGE_CHARS {
            return Err(AppError::invalid_input(format!(
                "message text is {chars} chars, maximum is {}",
                limits::MAX_MESSAGE_CHARS
            )));
        }
        Ok(())
    }
}

/// Acknowledgement returned once the record is safely produced
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageResponse {
    /// Unique message identifier
    pub message_id: Uuid,
    /// Conversation identifier
    pub conversation_id: String,
    /// Processing status, always `accepted`
    pub status: String,
    /// Server timestamp
    pub timestamp: DateTime<Utc>,
}

/// Internal support message as written to the raw-messages topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportMessage {
    /// Unique message ID
    pub message_id: Uuid,
    /// Conversation ID
    pub conversation_id: String,
    /// Tenant ID
    pub tenant_id: String,
    /// Message sender
    pub sender: MessageSender,
    /// Message content
    pub text: String,
    /// Communication channel
    pub channel: MessageChannel,
    /// Message timestamp
    pub timestamp: DateTime<Utc>,
    /// Additional metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl SupportMessage {
    /// Build the immutable log record from a validated ingestion request
    ///
    /// # Errors
    ///
    /// Returns the validation error of the underlying request.
    pub fn from_request(request: CreateMessageRequest, default_tenant: &str) -> AppResult<Self> {
        request.validate()?;
        let tenant_id = request
            .tenant_id
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| default_tenant.to_owned());
        Ok(Self {
            message_id: Uuid::new_v4(),
            conversation_id: request.conversation_id,
            tenant_id,
            sender: request.sender,
            text: request.text,
            channel: request.channel,
            timestamp: Utc::now(),
            metadata: request.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(text: &str) -> CreateMessageRequest {
        CreateMessageRequest {
            conversation_id: "conv_123abc".into(),
            sender: MessageSender::Customer,
            text: text.into(),
            channel: MessageChannel::Chat,
            tenant_id: None,
            metadata: None,
        }
    }

    #[test]
    fn sender_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&MessageSender::Customer).unwrap(),
            "\"customer\""
        );
    }

    #[test]
    fn empty_text_is_rejected() {
        assert!(request("").validate().is_err());
    }

    #[test]
    fn oversized_text_is_rejected() {
        let long = "x".repeat(limits::MAX_MESSAGE_CHARS + 1);
        assert!(request(&long).validate().is_err());
    }

    #[test]
    fn default_tenant_applied_when_absent() {
        let message = SupportMessage::from_request(request("help me"), "acme-corp").unwrap();
        assert_eq!(message.tenant_id, "acme-corp");
        assert_eq!(message.text, "help me");
    }

    #[test]
    fn explicit_tenant_wins_over_default() {
        let mut req = request("help me");
        req.tenant_id = Some("globex".into());
        let message = SupportMessage::from_request(req, "acme-corp").unwrap();
        assert_eq!(message.tenant_id, "globex");
    }

    #[test]
    fn round_trips_through_json() {
        let message = SupportMessage::from_request(request("hello there"), "acme-corp").unwrap();
        let encoded = serde_json::to_string(&message).unwrap();
        let decoded: SupportMessage = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.message_id, message.message_id);
        assert_eq!(decoded.sender, MessageSender::Customer);
        assert_eq!(decoded.text, "hello there");
    }
}
