//! Conversation lifecycle state machine.
//!
//! Tracks where one logical conversation sits in the
//! `None → Placeholder → Real` lifecycle. Transitions are expressed as a
//! pure reducer over tagged actions so the transition table stays
//! exhaustiveness-checked by the compiler.

use super::id::SessionId;
use serde::{Deserialize, Serialize};

/// Lifecycle state of one logical conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ConversationState {
    /// No session exists yet.
    None,
    /// A locally generated session is awaiting backend confirmation.
    Placeholder { id: SessionId },
    /// The backend confirmed a durable session. Terminal: there is no
    /// transition back to `Placeholder`.
    Real { id: SessionId },
}

/// Actions that drive conversation lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationAction {
    /// First outgoing message created a placeholder session.
    Start { placeholder: SessionId },
    /// An existing backend session was resumed directly.
    Resume { real: SessionId },
    /// A stream event carried the backend-confirmed id.
    Migrate { real: SessionId },
    /// The conversation was deleted or replaced.
    Reset,
}

/// Applies one action, returning the next state.
///
/// Invalid transitions leave the state unchanged: migration is the only
/// exit from `Placeholder`, and `Real` is terminal apart from `Reset`.
pub fn apply(state: &ConversationState, action: &ConversationAction) -> ConversationState {
    match (state, action) {
        (ConversationState::None, ConversationAction::Start { placeholder }) => {
            ConversationState::Placeholder {
                id: placeholder.clone(),
            }
        }
        (ConversationState::None, ConversationAction::Resume { real }) => {
            ConversationState::Real { id: real.clone() }
        }
        (ConversationState::Placeholder { .. }, ConversationAction::Migrate { real }) => {
            ConversationState::Real { id: real.clone() }
        }
        (_, ConversationAction::Reset) => ConversationState::None,

        // Everything else is a no-op: repeated starts, migration without a
        // placeholder, resume over a live session.
        (ConversationState::None, ConversationAction::Migrate { .. })
        | (ConversationState::Placeholder { .. }, ConversationAction::Start { .. })
        | (ConversationState::Placeholder { .. }, ConversationAction::Resume { .. })
        | (ConversationState::Real { .. }, ConversationAction::Start { .. })
        | (ConversationState::Real { .. }, ConversationAction::Resume { .. })
        | (ConversationState::Real { .. }, ConversationAction::Migrate { .. }) => state.clone(),
    }
}
