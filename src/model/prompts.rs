// ABOUTME: Prompt builders for the four analyses and reply generation
// ABOUTME: Every prompt demands JSON-only output in a fixed shape the parsers expect
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 SignalStream Contributors

use crate::models::SummaryResult;

use super::AnalysisContext;

/// Sentiment analysis prompt over the compressed context
#[must_use]
pub fn sentiment(context: &AnalysisContext) -> String {
    format!(
        r#"Analyze the CUSTOMER'S CURRENT sentiment based on their LATEST message in this support conversation.
Focus on detecting sentiment changes - if the customer was frustrated but now sounds satisfied, reflect that change.

{}

IMPORTANT: Base your analysis primarily on the LATEST customer message. The context is provided for understanding, but the sentiment should reflect the customer's current emotional state.

Respond ONLY with valid JSON in this exact format:
{{
  "sentiment": "positive" | "neutral" | "negative",
  "confidence": <number between 0 and 1>,
  "emotion": "angry" | "frustrated" | "satisfied" | "confused" | "urgent" | "happy" | "neutral",
  "reasoning": "<brief explanation of the customer's CURRENT emotional state based on their latest message>"
}}"#,
        context.prompt_context()
    )
}

/// PII detection prompt over the latest message only
#[must_use]
pub fn pii(message_text: &str) -> String {
    format!(
        r#"Identify all personally identifiable information (PII) in this message.

Message:
"""
{message_text}
"""

Detect and categorize:
- email addresses
- phone numbers
- credit card numbers (partial)
- SSN/national IDs
- physical addresses
- account numbers
- names

Respond with JSON:
{{
  "hasPII": true | false,
  "entities": [
    {{
      "type": "email" | "phone" | "credit_card" | "ssn" | "address" | "account_number" | "name",
      "value": "[REDACTED]",
      "startIndex": <number>,
      "endIndex": <number>
    }}
  ],
  "redactedText": "<message with [REDACTED] in place of PII>"
}}"#
    )
}

/// Insights extraction prompt over the compressed context
#[must_use]
pub fn insights(context: &AnalysisContext) -> String {
    format!(
        r#"Analyze this support conversation and extract key insights.

Conversation:
"""
{}
"""

IMPORTANT: Analyze customer sentiment/mood from their language and tone. If the customer is frustrated, angry, or highly dissatisfied:
- Suggest offering compensation (discount, refund, credit)
- Recommend empathy and acknowledgment
- Prioritize quick resolution to retain the customer

Respond with JSON:
{{
  "intent": "Refund Request" | "Technical Issue" | "Billing Inquiry" | "Feature Request" | "Complaint" | "General Inquiry" | "Account Issue" | "Cancellation",
  "urgency": "Low" | "Medium" | "High" | "Critical",
  "categories": ["<category1>", "<category2>"],
  "suggestedActions": ["<action1>", "<action2>"],
  "requiresEscalation": true | false,
  "estimatedResolutionTime": "< 1 hour" | "1-4 hours" | "4-24 hours" | "1-3 days",
  "keyConcerns": ["<concern1>", "<concern2>"]
}}"#,
        context.prompt_context()
    )
}

/// Incremental summary prompt: previous summary plus the new message
#[must_use]
pub fn summary_update(
    old_summary: Option<&SummaryResult>,
    new_message: &str,
    sender_label: &str,
) -> String {
    let previous = old_summary.map_or_else(
        || "No previous summary (start of conversation).".to_owned(),
        |summary| {
            format!(
                "Previous Summary:\n- TLDR: {}\n- Issue: {}\n- Key Points: {}\n- Next Steps: {}",
                summary.tldr,
                summary.customer_issue,
                summary.key_points.join(", "),
                summary.next_steps.join(", ")
            )
        },
    );

    format!(
        r#"Update the support conversation summary with the new message.

{previous}

New Message from {sender_label}:
"{new_message}"

Provide an updated structured summary in JSON:
{{
  "tldr": "<updated 1-sentence summary>",
  "customerIssue": "<updated customer needs>",
  "agentResponse": "<updated brief description or null>",
  "keyPoints": ["<updated point1>", "<updated point2>"],
  "nextSteps": ["<updated step1>", "<updated step2>"]
}}"#
    )
}

/// Full-window summary prompt, used when no prior summary exists
#[must_use]
pub fn summary_full(window_text: &str) -> String {
    format!(
        r#"Summarize this support conversation.

Conversation:
"""
{window_text}
"""

Provide a structured summary in JSON:
{{
  "tldr": "<1-sentence summary>",
  "customerIssue": "<what customer needs>",
  "agentResponse": "<brief description or null>",
  "keyPoints": ["<point1>", "<point2>"],
  "nextSteps": ["<step1>", "<step2>"]
}}"#
    )
}

/// Agent-assist reply prompt
#[must_use]
pub fn reply(context: &AnalysisContext) -> String {
    format!(
        r#"You are a helpful AI assistant for a customer support platform called SignalStream.
Generate a professional, empathetic, and helpful response to the customer's message.

Conversation History:
"""
{}
"""

Latest Customer Message:
"""
{}
"""

Guidelines:
- Be professional and empathetic
- Acknowledge the customer's concern
- Provide helpful information or next steps
- Keep the response concise (2-4 sentences)
- If the issue requires human escalation, suggest that
- Be warm and supportive

Respond with JSON containing only the response text:
{{
  "response": "<your generated response here>"
}}"#,
        context.window_text, context.latest_message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageSender;

    fn context() -> AnalysisContext {
        AnalysisContext {
            conversation_id: "c1".into(),
            tenant_id: "acme".into(),
            summary_tldr: Some("login trouble".into()),
            latest_message: "still broken".into(),
            latest_sender: MessageSender::Customer,
            window_text: "Customer: still broken".into(),
        }
    }

    #[test]
    fn sentiment_prompt_embeds_context_and_contract() {
        let prompt = sentiment(&context());
        assert!(prompt.contains("Context: login trouble"));
        assert!(prompt.contains("Current message: still broken"));
        assert!(prompt.contains("\"sentiment\""));
    }

    #[test]
    fn summary_update_mentions_missing_previous_summary() {
        let prompt = summary_update(None, "hello", "Customer");
        assert!(prompt.contains("No previous summary"));
        assert!(prompt.contains("New Message from Customer"));
    }
}
