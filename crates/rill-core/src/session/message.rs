//! Conversation message types.
//!
//! This module contains types for representing messages in a conversation,
//! including roles, plain and block-structured content, and per-message
//! token accounting.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Represents the role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    /// Message from the user.
    User,
    /// Message from the AI assistant.
    Assistant,
    /// System-generated message.
    System,
}

/// A single block within structured message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Visible assistant or user text.
    Text { text: String },
    /// Model reasoning that is rendered separately from the answer.
    Thinking { text: String },
    /// Invocation of a named tool.
    ToolUse { name: String },
    /// Output produced by a tool invocation.
    ToolResult {
        #[serde(default)]
        content: Option<String>,
    },
}

/// Message content: either plain text or an ordered block list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Plain(String),
    Blocks(Vec<ContentBlock>),
}

impl MessageContent {
    /// Concatenated visible text of the content.
    pub fn text(&self) -> String {
        match self {
            Self::Plain(text) => text.clone(),
            Self::Blocks(blocks) => blocks
                .iter()
                .filter_map(|block| match block {
                    ContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    /// Appends text in place, growing the last text block if there is one.
    pub fn push_text(&mut self, chunk: &str) {
        match self {
            Self::Plain(text) => text.push_str(chunk),
            Self::Blocks(blocks) => match blocks.last_mut() {
                Some(ContentBlock::Text { text }) => text.push_str(chunk),
                _ => blocks.push(ContentBlock::Text {
                    text: chunk.to_string(),
                }),
            },
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Plain(text) => text.is_empty(),
            Self::Blocks(blocks) => blocks.is_empty(),
        }
    }
}

/// A single message in a conversation transcript.
///
/// Messages are appended and never reordered. Content may grow in place
/// only while the message is still streaming.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message identifier (UUID format).
    pub id: String,
    /// The role of the message sender.
    pub role: MessageRole,
    /// The content of the message.
    pub content: MessageContent,
    /// Timestamp when the message was created (ISO 8601 format).
    pub timestamp: String,
    /// Tokens consumed by the prompt side of this message, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u64>,
    /// Tokens produced for this message, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u64>,
    /// Cost attributed to this message in USD, if reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// Names of tools invoked while producing this message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<String>,
    /// True when the turn was cut short by a user interrupt. Partial
    /// content is committed, never silently discarded.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interrupted: bool,
    /// True while the backend is still appending to this message.
    #[serde(skip)]
    pub streaming: bool,
}

impl Message {
    /// Creates a message with a fresh id and the current timestamp.
    pub fn new(role: MessageRole, content: MessageContent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content,
            timestamp: chrono::Utc::now().to_rfc3339(),
            input_tokens: None,
            output_tokens: None,
            cost: None,
            tools: Vec::new(),
            interrupted: false,
            streaming: false,
        }
    }

    /// Creates a plain-text user message.
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(MessageRole::User, MessageContent::Plain(text.into()))
    }

    /// Creates a plain-text assistant message.
    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(MessageRole::Assistant, MessageContent::Plain(text.into()))
    }

    /// Creates a plain-text system message.
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(MessageRole::System, MessageContent::Plain(text.into()))
    }

    /// Total tokens reported for this message.
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.unwrap_or(0) + self.output_tokens.unwrap_or(0)
    }
}
