// ABOUTME: Validated ingestion of support messages onto the raw topic
// ABOUTME: The HTTP collaborator calls submit() and relays the 202-style acknowledgement
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::broker::{Producer, ProducerRecord};
use crate::config::Settings;
use crate::errors::AppResult;
use crate::models::{CreateMessageRequest, CreateMessageResponse, SupportMessage};

/// Ingestion boundary: validates, fills the default tenant, and produces
/// to the raw-messages topic
pub struct Ingestor {
    producer: Arc<dyn Producer>,
    topic: String,
    default_tenant: String,
}

impl Ingestor {
    /// Create an ingestor bound to the configured raw-messages topic
    #[must_use]
    pub fn new(producer: Arc<dyn Producer>, settings: &Settings) -> Self {
        Self {
            producer,
            topic: settings.topics.messages_raw.clone(),
            default_tenant: settings.default_tenant_id.clone(),
        }
    }

    /// Accept one message; the acknowledgement is returned only after the
    /// record is safely produced
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a malformed request and `BrokerError`
    /// when the produce fails.
    pub async fn submit(&self, request: CreateMessageRequest) -> AppResult<CreateMessageResponse> {
        let message = SupportMessage::from_request(request, &self.default_tenant)?;
        let record = ProducerRecord::json(
            &self.topic,
            &message.conversation_id,
            &message.tenant_id,
            &message,
        )?;
        self.producer.produce(record).await?;

        info!(
            conversation_id = %message.conversation_id,
            tenant_id = %message.tenant_id,
            message_id = %message.message_id,
            "Message accepted"
        );

        Ok(CreateMessageResponse {
            message_id: message.message_id,
            conversation_id: message.conversation_id,
            status: "accepted".to_owned(),
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::memory::MemoryBroker;
    use crate::broker::Broker;
    use crate::models::{MessageChannel, MessageSender};

    fn request(conversation_id: &str, text: &str) -> CreateMessageRequest {
        CreateMessageRequest {
            conversation_id: conversation_id.into(),
            sender: MessageSender::Customer,
            text: text.into(),
            channel: MessageChannel::Chat,
            tenant_id: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn accepted_message_lands_on_raw_topic() {
        let broker = MemoryBroker::new();
        let settings = Settings::for_tests();
        let ingestor = Ingestor::new(broker.producer(), &settings);

        let response = ingestor.submit(request("c1", "hello")).await.unwrap();
        assert_eq!(response.status, "accepted");

        let records = broker.records(&settings.topics.messages_raw).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key.as_deref(), Some("c1"));
        let message: SupportMessage = records[0].decode().unwrap();
        assert_eq!(message.tenant_id, settings.default_tenant_id);
        assert_eq!(message.message_id, response.message_id);
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_produce() {
        let broker = MemoryBroker::new();
        let settings = Settings::for_tests();
        let ingestor = Ingestor::new(broker.producer(), &settings);

        let err = ingestor.submit(request("c1", "")).await.unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::InvalidInput);
        assert_eq!(broker.topic_len(&settings.topics.messages_raw).await, 0);
    }
}
