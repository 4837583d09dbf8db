//! Session domain module.
//!
//! This module contains all session-related domain models, the in-memory
//! registry, and the conversation lifecycle state machine.
//!
//! # Module Structure
//!
//! - `id`: session identifier taxonomy (`SessionId`, `PlaceholderAllocator`)
//! - `message`: transcript message types (`Message`, `MessageContent`)
//! - `model`: core session domain model (`Session`, `SessionMetrics`)
//! - `event`: typed completion-stream events (`StreamEvent`)
//! - `registry`: session store and migration controller (`SessionRegistry`)
//! - `state`: conversation lifecycle reducer (`ConversationState`)

mod event;
mod id;
mod message;
mod model;
mod registry;
mod state;

// Re-export public API
pub use event::StreamEvent;
pub use id::{PLACEHOLDER_PREFIX, PlaceholderAllocator, SessionId};
pub use message::{ContentBlock, Message, MessageContent, MessageRole};
pub use model::{Session, SessionConfig, SessionMetrics};
pub use registry::{MigrationOutcome, SessionRegistry, StreamUsage};
pub use state::{ConversationAction, ConversationState, apply};
