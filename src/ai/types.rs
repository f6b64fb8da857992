//! AI request/response contract.
//!
//! `AiResponse` is the discriminated union every provider's accumulated text
//! must deserialize to. The `type` discriminator is closed; exactly one
//! shape's fields are meaningful per value.

use crate::request::DataRequest;
use crate::schema::SourceSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: "assistant".to_string(), content: content.into() }
    }
}

/// Caller preferences forwarded into the prompt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_visualization: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_limit: Option<u32>,
}

/// One chat turn's input: the message, the schema ground truth, and prior
/// history. Sample data inside the schemas is already bounded by extraction.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub user_message: String,
    pub schemas: Vec<SourceSchema>,
    pub history: Vec<ChatMessage>,
    pub preferences: Option<Preferences>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clarification {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    pub clarification_question: String,
    #[serde(default)]
    pub suggested_options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    #[serde(default)]
    pub data_requests: Vec<DataRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectAnswer {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
}

/// Structured outcome of one AI turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AiResponse {
    #[serde(rename = "CLARIFICATION_NEEDED")]
    ClarificationNeeded(Clarification),
    #[serde(rename = "READY_TO_EXECUTE")]
    ReadyToExecute(ExecutionPlan),
    #[serde(rename = "DIRECT_ANSWER")]
    DirectAnswer(DirectAnswer),
}

impl AiResponse {
    /// Non-fatal fallback shape used for provider failures and parse errors.
    pub fn direct_answer(content: impl Into<String>) -> Self {
        AiResponse::DirectAnswer(DirectAnswer { content: content.into(), intent: None })
    }

    pub fn response_type(&self) -> &'static str {
        match self {
            AiResponse::ClarificationNeeded(_) => "CLARIFICATION_NEEDED",
            AiResponse::ReadyToExecute(_) => "READY_TO_EXECUTE",
            AiResponse::DirectAnswer(_) => "DIRECT_ANSWER",
        }
    }

    pub fn intent(&self) -> Option<&str> {
        match self {
            AiResponse::ClarificationNeeded(r) => r.intent.as_deref(),
            AiResponse::ReadyToExecute(r) => r.intent.as_deref(),
            AiResponse::DirectAnswer(r) => r.intent.as_deref(),
        }
    }

    pub fn content(&self) -> &str {
        match self {
            AiResponse::ClarificationNeeded(r) => &r.content,
            AiResponse::ReadyToExecute(r) => &r.content,
            AiResponse::DirectAnswer(r) => &r.content,
        }
    }

    pub fn data_requests(&self) -> &[DataRequest] {
        match self {
            AiResponse::ReadyToExecute(r) => &r.data_requests,
            _ => &[],
        }
    }
}
