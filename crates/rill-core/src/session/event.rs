//! Typed events decoded from the completion stream.

use serde::{Deserialize, Serialize};

/// One event from the backend's line-delimited completion stream.
///
/// Every variant may carry the backend session id; the first event that
/// does drives the placeholder-to-real migration. All other payload
/// fields are optional on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// The backend allocated (or re-confirmed) the durable session id.
    SessionMigrated { session_id: String },
    /// The backend accepted the request and started working.
    Processing {
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Incremental assistant text.
    TextChunk {
        content: String,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Complete assistant text delivered in one piece.
    AssistantText {
        content: String,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// The assistant invoked a named tool.
    ToolUse {
        tool: String,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Output of a tool invocation.
    ToolResult {
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Turn summary: authoritative session id plus usage accounting.
    Result {
        #[serde(default)]
        session_id: Option<String>,
        #[serde(default)]
        content: Option<String>,
        #[serde(default)]
        input_tokens: Option<u64>,
        #[serde(default)]
        output_tokens: Option<u64>,
        #[serde(default)]
        cost_usd: Option<f64>,
    },
    /// The backend reported an error. The stream may still end with `done`.
    Error {
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    /// Terminal event: no further events follow.
    Done {
        #[serde(default)]
        session_id: Option<String>,
    },
}

impl StreamEvent {
    /// The backend session id carried by this event, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::SessionMigrated { session_id } => Some(session_id.as_str()),
            Self::Processing { session_id }
            | Self::TextChunk { session_id, .. }
            | Self::AssistantText { session_id, .. }
            | Self::ToolUse { session_id, .. }
            | Self::ToolResult { session_id, .. }
            | Self::Result { session_id, .. }
            | Self::Error { session_id, .. }
            | Self::Done { session_id } => session_id.as_deref(),
        }
    }

    /// True for the terminal `done` event.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. })
    }
}
