//! Wire DTOs for the backend HTTP API.
//!
//! Request/response shapes stay at this boundary; handlers convert them
//! into domain types before anything else touches them.

use rill_core::error::{RillError, Result};
use rill_core::session::{Message, MessageContent, MessageRole};
use serde::{Deserialize, Serialize};

/// Body of the send-message request.
///
/// `session_id` may be a placeholder id or absent; the authoritative id
/// arrives only inside stream events.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// One transcript message as returned by the history endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: MessageContent,
    pub timestamp: String,
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub output_tokens: Option<u64>,
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub tools: Vec<String>,
}

impl HistoryMessage {
    /// Converts the wire message into a domain message.
    ///
    /// # Errors
    ///
    /// Returns `RillError::Validation` for an unknown role.
    pub fn into_message(self) -> Result<Message> {
        let role = match self.role.as_str() {
            "user" => MessageRole::User,
            "assistant" => MessageRole::Assistant,
            "system" => MessageRole::System,
            other => {
                return Err(RillError::validation(format!(
                    "unknown message role: '{other}'"
                )));
            }
        };

        let mut message = Message::new(role, self.content);
        message.timestamp = self.timestamp;
        message.input_tokens = self.input_tokens;
        message.output_tokens = self.output_tokens;
        message.cost = self.cost;
        message.tools = self.tools;
        Ok(message)
    }
}

/// Response of the session-history fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionHistoryResponse {
    pub session_id: String,
    pub messages: Vec<HistoryMessage>,
    #[serde(default)]
    pub total_messages: usize,
}

/// Body of the project-history aggregator request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectHistoryRequest {
    pub project_path: String,
    pub primary_session_id: String,
}

/// One related-session summary from the aggregator.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub first_message_time: Option<String>,
    #[serde(default)]
    pub last_message_time: Option<String>,
    #[serde(default)]
    pub total_tokens: Option<u64>,
    #[serde(default)]
    pub total_cost: Option<f64>,
}

/// Response of the project-history aggregator.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectHistoryResponse {
    pub sessions: Vec<SessionSummary>,
}

/// Error body the backend returns on non-success statuses.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
