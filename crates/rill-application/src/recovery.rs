//! Bounded retry tracking for transport failures.
//!
//! An explicit service, constructed once at the composition root and
//! passed by reference: it counts consecutive transport failures per
//! session and tells the caller when to stop offering retries and offer
//! session cleanup or replacement instead.

use rill_core::session::SessionId;
use std::collections::HashMap;
use std::sync::Mutex;

/// Default number of consecutive failures before replacement is offered.
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// What the UI should offer after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Transient failure: show a retryable notice.
    Retry,
    /// The bounded attempt count is exhausted: offer explicit session
    /// cleanup or replacement instead of retrying silently.
    ReplaceSession,
}

/// Counts consecutive transport failures per session.
#[derive(Debug)]
pub struct ErrorTracker {
    failures: Mutex<HashMap<SessionId, u32>>,
    limit: u32,
}

impl Default for ErrorTracker {
    fn default() -> Self {
        Self::with_limit(MAX_CONSECUTIVE_FAILURES)
    }
}

impl ErrorTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a tracker with a custom failure bound.
    pub fn with_limit(limit: u32) -> Self {
        Self {
            failures: Mutex::new(HashMap::new()),
            limit,
        }
    }

    /// Records one failure and returns the action to offer.
    pub fn record_failure(&self, session_id: &SessionId) -> RecoveryAction {
        let mut failures = self.failures.lock().expect("error tracker lock");
        let count = failures.entry(session_id.clone()).or_insert(0);
        *count += 1;

        if *count >= self.limit {
            tracing::warn!(
                target: "recovery",
                "session {} failed {} times, offering replacement",
                session_id,
                count
            );
            RecoveryAction::ReplaceSession
        } else {
            RecoveryAction::Retry
        }
    }

    /// Resets the counter after a successful turn.
    pub fn record_success(&self, session_id: &SessionId) {
        self.failures
            .lock()
            .expect("error tracker lock")
            .remove(session_id);
    }

    /// Action to offer given the current counter, without recording
    /// anything.
    pub fn recovery_action(&self, session_id: &SessionId) -> RecoveryAction {
        if self.failure_count(session_id) >= self.limit {
            RecoveryAction::ReplaceSession
        } else {
            RecoveryAction::Retry
        }
    }

    /// Current consecutive failure count for a session.
    pub fn failure_count(&self, session_id: &SessionId) -> u32 {
        self.failures
            .lock()
            .expect("error tracker lock")
            .get(session_id)
            .copied()
            .unwrap_or(0)
    }

    /// Drops all bookkeeping for a session (deleted or replaced).
    pub fn forget(&self, session_id: &SessionId) {
        self.failures
            .lock()
            .expect("error tracker lock")
            .remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_until_limit_then_replace() {
        let tracker = ErrorTracker::with_limit(3);
        let id = SessionId::Placeholder(1);

        assert_eq!(tracker.record_failure(&id), RecoveryAction::Retry);
        assert_eq!(tracker.record_failure(&id), RecoveryAction::Retry);
        assert_eq!(tracker.record_failure(&id), RecoveryAction::ReplaceSession);
        assert_eq!(tracker.failure_count(&id), 3);
    }

    #[test]
    fn test_success_resets_counter() {
        let tracker = ErrorTracker::with_limit(2);
        let id = SessionId::Placeholder(1);

        tracker.record_failure(&id);
        tracker.record_success(&id);
        assert_eq!(tracker.failure_count(&id), 0);
        assert_eq!(tracker.record_failure(&id), RecoveryAction::Retry);
    }

    #[test]
    fn test_recovery_action_reflects_counter() {
        let tracker = ErrorTracker::with_limit(2);
        let id = SessionId::Placeholder(1);

        assert_eq!(tracker.recovery_action(&id), RecoveryAction::Retry);
        tracker.record_failure(&id);
        tracker.record_failure(&id);
        assert_eq!(tracker.recovery_action(&id), RecoveryAction::ReplaceSession);
    }

    #[test]
    fn test_sessions_are_tracked_independently() {
        let tracker = ErrorTracker::with_limit(2);
        let first = SessionId::Placeholder(1);
        let second = SessionId::Placeholder(2);

        tracker.record_failure(&first);
        assert_eq!(tracker.failure_count(&second), 0);
    }
}
