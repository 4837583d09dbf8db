//! Error types for the RILL workspace.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A shared error type for the entire RILL workspace.
///
/// This provides typed, structured error variants with automatic conversion
/// from common error types via the `From` trait.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum RillError {
    /// Operation referenced a session id that is not in the registry.
    ///
    /// Returned as a value, never panicked on: the caller decides whether
    /// to create a session or abandon the operation.
    #[error("Session not found: '{id}'")]
    SessionNotFound { id: String },

    /// A second send was attempted while a stream is active for the session.
    #[error("Stream already active for session '{id}'")]
    StreamBusy { id: String },

    /// Malformed event line in the completion stream.
    ///
    /// Local to a single line; decoding continues with the next line.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Network failure talking to the backend.
    #[error("Transport error: {message}")]
    Transport { message: String, retryable: bool },

    /// Malformed session or message shape on import or merge.
    ///
    /// The offending mutation is rejected before any partial write lands.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {format} - {message}")]
    Serialization {
        format: String, // "TOML", "JSON", etc.
        message: String,
    },

    /// IO error (file system operations)
    #[error("IO error: {message}")]
    Io { message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal error (should not happen in normal operation)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RillError {
    // ============================================================================
    // Constructor helpers
    // ============================================================================

    /// Creates a SessionNotFound error
    pub fn session_not_found(id: impl Into<String>) -> Self {
        Self::SessionNotFound { id: id.into() }
    }

    /// Creates a StreamBusy error
    pub fn stream_busy(id: impl Into<String>) -> Self {
        Self::StreamBusy { id: id.into() }
    }

    /// Creates a Protocol error
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Creates a Transport error
    pub fn transport(message: impl Into<String>, retryable: bool) -> Self {
        Self::Transport {
            message: message.into(),
            retryable,
        }
    }

    /// Creates a Validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a Config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Creates an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    // ============================================================================
    // Type checking methods
    // ============================================================================

    /// Check if this is a SessionNotFound error
    pub fn is_session_not_found(&self) -> bool {
        matches!(self, Self::SessionNotFound { .. })
    }

    /// Check if this is a StreamBusy error
    pub fn is_stream_busy(&self) -> bool {
        matches!(self, Self::StreamBusy { .. })
    }

    /// Check if this is a Protocol error
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Check if this is a Validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this error represents a transient failure worth retrying.
    ///
    /// Only `Transport` errors carry a retryable classification; every other
    /// variant is a definitive outcome.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport {
                retryable: true,
                ..
            }
        )
    }
}

// ============================================================================
// From implementations for automatic conversion
// ============================================================================

impl From<std::io::Error> for RillError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: format!("{} (kind: {:?})", err, err.kind()),
        }
    }
}

impl From<serde_json::Error> for RillError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            format: "JSON".to_string(),
            message: err.to_string(),
        }
    }
}

/// A type alias for `Result<T, RillError>`.
pub type Result<T> = std::result::Result<T, RillError>;
