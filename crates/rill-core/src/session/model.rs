//! Session domain model.
//!
//! This module contains the core Session entity that represents one
//! conversation with the backend, together with its configuration and
//! accumulated usage metrics.

use super::id::SessionId;
use super::message::Message;
use serde::{Deserialize, Serialize};

/// Maximum length of a title derived from the first user message.
const DERIVED_TITLE_MAX_CHARS: usize = 50;

/// Per-session configuration forwarded to the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Model identifier requested for this conversation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Project the conversation is co-located under. Sessions sharing a
    /// project path are considered related for cross-session history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_path: Option<String>,
    /// System prompt sent with the first turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
}

/// Accumulated usage counters for a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    /// Total input + output tokens across all messages.
    pub total_tokens: u64,
    /// Total cost in USD across all messages.
    pub total_cost: f64,
    /// Number of messages in the transcript.
    pub message_count: usize,
}

impl SessionMetrics {
    /// Folds one appended message into the counters.
    pub fn record(&mut self, message: &Message) {
        self.total_tokens += message.total_tokens();
        self.total_cost += message.cost.unwrap_or(0.0);
        self.message_count += 1;
    }

    /// Folds usage reported after a message was already counted
    /// (streaming messages are counted on append, priced on completion).
    pub fn record_usage(&mut self, tokens: u64, cost: f64) {
        self.total_tokens += tokens;
        self.total_cost += cost;
    }
}

/// Represents one conversation session.
///
/// A session is created under a placeholder id on the first outgoing
/// message and becomes real through exactly one migration. The transcript
/// is append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Session identifier (placeholder or backend-confirmed).
    pub id: SessionId,
    /// Human-readable session title.
    pub title: String,
    /// Ordered conversation transcript.
    pub messages: Vec<Message>,
    /// Configuration forwarded to the backend.
    #[serde(default)]
    pub config: SessionConfig,
    /// Accumulated usage counters.
    #[serde(default)]
    pub metrics: SessionMetrics,
    /// Timestamp when the session was created (ISO 8601 format).
    pub created_at: String,
    /// Timestamp when the session was last updated (ISO 8601 format).
    pub updated_at: String,
}

impl Session {
    /// Creates an empty session under the given id.
    pub fn new(id: SessionId, config: SessionConfig) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            title: String::new(),
            messages: Vec::new(),
            config,
            metrics: SessionMetrics::default(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Stamps the last-updated timestamp.
    pub fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().to_rfc3339();
    }

    /// Derives a display title from the first user message when none is set.
    pub fn derive_title(&mut self) {
        if !self.title.is_empty() {
            return;
        }
        if let Some(message) = self.messages.first() {
            let text = message.content.text();
            let mut title: String = text.chars().take(DERIVED_TITLE_MAX_CHARS).collect();
            if text.chars().count() > DERIVED_TITLE_MAX_CHARS {
                title.push('…');
            }
            self.title = title;
        }
    }

    /// Display title: the stored title, or a fallback for untitled sessions.
    pub fn display_title(&self) -> &str {
        if self.title.is_empty() {
            "Untitled session"
        } else {
            &self.title
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::message::Message;

    #[test]
    fn test_metrics_record() {
        let mut metrics = SessionMetrics::default();
        let mut message = Message::assistant("hi");
        message.input_tokens = Some(10);
        message.output_tokens = Some(5);
        message.cost = Some(0.25);
        metrics.record(&message);
        assert_eq!(metrics.total_tokens, 15);
        assert_eq!(metrics.message_count, 1);
        assert!((metrics.total_cost - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_derive_title_truncates() {
        let mut session = Session::new(SessionId::Placeholder(1), SessionConfig::default());
        session.messages.push(Message::user("x".repeat(80)));
        session.derive_title();
        assert_eq!(session.title.chars().count(), 51); // 50 chars + ellipsis
    }

    #[test]
    fn test_derive_title_keeps_existing() {
        let mut session = Session::new(SessionId::Placeholder(1), SessionConfig::default());
        session.title = "Kept".to_string();
        session.messages.push(Message::user("hello"));
        session.derive_title();
        assert_eq!(session.title, "Kept");
    }
}
