//! RILL use-case layer.
//!
//! Orchestrates the domain and backend layers: chat turn driving with
//! interruption, cross-session history loading, and bounded-retry error
//! tracking.

pub mod chat;
pub mod history;
pub mod recovery;

pub use chat::{ChatUseCase, TurnOutcome};
pub use history::{HistoryLoader, HistoryTimeline, TimelineEntry};
pub use recovery::{ErrorTracker, RecoveryAction};
