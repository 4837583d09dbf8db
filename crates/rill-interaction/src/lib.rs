//! RILL backend access layer.
//!
//! HTTP client for the completion service, the line-delimited stream
//! decoder, and backend connection configuration.

pub mod client;
pub mod config;
pub mod decoder;
pub mod dto;

pub use client::{BackendClient, ByteStream, CompletionBackend};
pub use config::BackendConfig;
pub use decoder::StreamDecoder;
pub use dto::{
    HistoryMessage, ProjectHistoryRequest, ProjectHistoryResponse, SendMessageRequest,
    SessionHistoryResponse, SessionSummary,
};
