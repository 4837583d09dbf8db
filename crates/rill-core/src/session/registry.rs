//! In-memory session registry and migration controller.
//!
//! `SessionRegistry` owns every live session, keyed by identifier, and
//! tracks the single active session. All mutations funnel through one
//! `RwLock`-guarded state so concurrent observers never see a torn
//! intermediate state; in particular, the placeholder-to-real migration
//! happens entirely under one write guard.

use super::id::{PlaceholderAllocator, SessionId};
use super::message::{Message, MessageContent, MessageRole};
use super::model::{Session, SessionConfig};
use crate::error::{RillError, Result};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Usage reported by the backend for a completed (or interrupted) turn.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamUsage {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub cost: Option<f64>,
}

/// Outcome of a placeholder-to-real migration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The active placeholder was promoted: its transcript, metrics and
    /// config now live under the real id, the placeholder record is gone.
    Promoted { placeholder: SessionId },
    /// The real id was already registered (reconnect): the placeholder was
    /// discarded and the existing session activated.
    ActivatedExisting,
    /// Nothing to do: the active session is already real, or there is no
    /// active placeholder to promote.
    Unchanged,
}

#[derive(Debug, Default)]
struct RegistryState {
    sessions: HashMap<SessionId, Session>,
    active: Option<SessionId>,
}

/// In-memory store of sessions with single-active-session tracking.
///
/// Invariants:
/// - at most one session per id;
/// - at most one id is marked active, and it always references a live
///   session;
/// - migration is atomic: no reader observes the active pointer referencing
///   a deleted id, or two sessions claiming the same transcript.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    state: RwLock<RegistryState>,
    placeholders: PlaceholderAllocator,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new placeholder session with an empty transcript and
    /// marks it active.
    pub async fn create_session(&self, config: SessionConfig) -> SessionId {
        let id = self.placeholders.allocate();
        let session = Session::new(id.clone(), config);

        let mut state = self.state.write().await;
        state.sessions.insert(id.clone(), session);
        state.active = Some(id.clone());
        tracing::debug!(target: "registry", "created placeholder session {}", id);
        id
    }

    /// Inserts (or replaces) a fully formed session record without
    /// touching the active pointer. Used when importing transcripts.
    pub async fn insert_session(&self, session: Session) {
        let mut state = self.state.write().await;
        state.sessions.insert(session.id.clone(), session);
    }

    /// Appends a message to an existing session and updates its metrics.
    ///
    /// # Errors
    ///
    /// Returns `RillError::SessionNotFound` if the id is absent. No
    /// session is created implicitly.
    pub async fn add_message(&self, session_id: &SessionId, message: Message) -> Result<()> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RillError::session_not_found(session_id.to_string()))?;

        session.metrics.record(&message);
        session.messages.push(message);
        session.derive_title();
        session.touch();
        Ok(())
    }

    /// Starts a streaming assistant message and returns its id.
    ///
    /// The message is visible in the transcript immediately; its content
    /// grows through `append_streaming` until `finish_streaming` seals it.
    pub async fn begin_streaming(&self, session_id: &SessionId) -> Result<String> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RillError::session_not_found(session_id.to_string()))?;

        let mut message = Message::new(MessageRole::Assistant, MessageContent::Plain(String::new()));
        message.streaming = true;
        let message_id = message.id.clone();
        session.metrics.message_count += 1;
        session.messages.push(message);
        session.touch();
        Ok(message_id)
    }

    /// Grows the content of a message that is still streaming.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` for an unknown session and `Validation`
    /// when the message does not exist or is no longer streaming; sealed
    /// messages are never mutated.
    pub async fn append_streaming(
        &self,
        session_id: &SessionId,
        message_id: &str,
        chunk: &str,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RillError::session_not_found(session_id.to_string()))?;

        let message = session
            .messages
            .iter_mut()
            .rev()
            .find(|message| message.id == message_id)
            .ok_or_else(|| {
                RillError::validation(format!("no streaming message '{message_id}'"))
            })?;
        if !message.streaming {
            return Err(RillError::validation(format!(
                "message '{message_id}' is no longer streaming"
            )));
        }

        message.content.push_text(chunk);
        session.touch();
        Ok(())
    }

    /// Records a tool invocation on the message being streamed.
    pub async fn record_tool_use(
        &self,
        session_id: &SessionId,
        message_id: &str,
        tool: &str,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RillError::session_not_found(session_id.to_string()))?;

        let message = session
            .messages
            .iter_mut()
            .rev()
            .find(|message| message.id == message_id && message.streaming)
            .ok_or_else(|| {
                RillError::validation(format!("no streaming message '{message_id}'"))
            })?;
        message.tools.push(tool.to_string());
        session.touch();
        Ok(())
    }

    /// Seals a streaming message, stamping usage and the interrupted tag.
    pub async fn finish_streaming(
        &self,
        session_id: &SessionId,
        message_id: &str,
        usage: StreamUsage,
        interrupted: bool,
    ) -> Result<()> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| RillError::session_not_found(session_id.to_string()))?;

        let message = session
            .messages
            .iter_mut()
            .rev()
            .find(|message| message.id == message_id)
            .ok_or_else(|| {
                RillError::validation(format!("no streaming message '{message_id}'"))
            })?;

        message.streaming = false;
        message.interrupted = interrupted;
        message.input_tokens = usage.input_tokens;
        message.output_tokens = usage.output_tokens;
        message.cost = usage.cost;

        let tokens = usage.input_tokens.unwrap_or(0) + usage.output_tokens.unwrap_or(0);
        session
            .metrics
            .record_usage(tokens, usage.cost.unwrap_or(0.0));
        session.touch();
        Ok(())
    }

    /// Promotes the active placeholder session to a backend-confirmed id.
    ///
    /// The whole switch happens under one write guard:
    /// - if the active session is already real (or nothing is active),
    ///   this is a no-op;
    /// - if `real` is already registered, the placeholder is discarded and
    ///   the existing session activated (reconnect case);
    /// - otherwise the placeholder record is re-keyed under the real id,
    ///   carrying its full transcript, metrics and config.
    ///
    /// Idempotent: a second call with the same id finds the active session
    /// already real and leaves exactly one record for it.
    pub async fn migrate_to_real(&self, real: Uuid) -> MigrationOutcome {
        let mut state = self.state.write().await;

        let Some(active) = state.active.clone() else {
            return MigrationOutcome::Unchanged;
        };
        if !active.is_placeholder() {
            return MigrationOutcome::Unchanged;
        }

        let real_id = SessionId::Real(real);
        if state.sessions.contains_key(&real_id) {
            state.sessions.remove(&active);
            state.active = Some(real_id.clone());
            tracing::debug!(
                target: "registry",
                "migration found existing session {}, placeholder {} discarded",
                real_id,
                active
            );
            return MigrationOutcome::ActivatedExisting;
        }

        let Some(mut session) = state.sessions.remove(&active) else {
            // Active pointer referenced a missing record; repair and bail.
            tracing::warn!(target: "registry", "active session {} missing, clearing", active);
            state.active = None;
            return MigrationOutcome::Unchanged;
        };

        session.id = real_id.clone();
        session.touch();
        state.sessions.insert(real_id.clone(), session);
        state.active = Some(real_id.clone());
        tracing::debug!(
            target: "registry",
            "promoted placeholder {} to session {}",
            active,
            real_id
        );
        MigrationOutcome::Promoted { placeholder: active }
    }

    /// Removes a session, returning the record for possible rollback.
    ///
    /// Clears the active pointer if the deleted session was active.
    pub async fn delete_session(&self, session_id: &SessionId) -> Result<Session> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .remove(session_id)
            .ok_or_else(|| RillError::session_not_found(session_id.to_string()))?;

        if state.active.as_ref() == Some(session_id) {
            state.active = None;
        }
        Ok(session)
    }

    /// Reinstates a session removed by `delete_session` (rollback of an
    /// optimistic delete), optionally re-activating it.
    pub async fn restore_session(&self, session: Session, activate: bool) {
        let mut state = self.state.write().await;
        let id = session.id.clone();
        state.sessions.insert(id.clone(), session);
        if activate {
            state.active = Some(id);
        }
    }

    /// Replaces a broken session with a fresh placeholder carrying the
    /// same config. Used after repeated failures exhaust the retry budget.
    pub async fn replace_session(&self, session_id: &SessionId) -> Result<SessionId> {
        let mut state = self.state.write().await;
        let old = state
            .sessions
            .remove(session_id)
            .ok_or_else(|| RillError::session_not_found(session_id.to_string()))?;

        let id = self.placeholders.allocate();
        let session = Session::new(id.clone(), old.config);
        state.sessions.insert(id.clone(), session);
        state.active = Some(id.clone());
        tracing::info!(target: "registry", "replaced session {} with {}", session_id, id);
        Ok(id)
    }

    /// Marks an existing session active.
    pub async fn set_active(&self, session_id: &SessionId) -> Result<()> {
        let mut state = self.state.write().await;
        if !state.sessions.contains_key(session_id) {
            return Err(RillError::session_not_found(session_id.to_string()));
        }
        state.active = Some(session_id.clone());
        Ok(())
    }

    /// Returns the id of the active session, if any.
    pub async fn active_session_id(&self) -> Option<SessionId> {
        self.state.read().await.active.clone()
    }

    /// Returns a snapshot of the active session, if any.
    pub async fn active_session(&self) -> Option<Session> {
        let state = self.state.read().await;
        let id = state.active.as_ref()?;
        state.sessions.get(id).cloned()
    }

    /// Returns a snapshot of one session.
    pub async fn get(&self, session_id: &SessionId) -> Option<Session> {
        self.state.read().await.sessions.get(session_id).cloned()
    }

    /// Returns snapshots of all sessions, most recently updated first.
    pub async fn list(&self) -> Vec<Session> {
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }

    /// Ensures there is an active session, creating a placeholder when
    /// there is none, and returns its id.
    pub async fn ensure_active(&self, config: SessionConfig) -> SessionId {
        if let Some(id) = self.active_session_id().await {
            return id;
        }
        self.create_session(config).await
    }
}
