//! Cross-session history loading.
//!
//! Given a primary session, fetches the transcripts of every related
//! session (co-located under one project) concurrently and merges them
//! into a single chronological timeline. A failed or malformed transcript
//! only removes that session from the batch, never the whole merge.

use futures::StreamExt;
use rill_core::error::{RillError, Result};
use rill_core::session::{Message, Session, SessionConfig, SessionId, SessionRegistry};
use rill_interaction::client::CompletionBackend;
use rill_interaction::dto::{SessionHistoryResponse, SessionSummary};
use serde::Serialize;
use std::cmp::Ordering;
use std::sync::Arc;

/// One merged-timeline entry: a message tagged with its origin session.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    pub origin: SessionId,
    pub origin_title: String,
    pub message: Message,
}

/// Result of a cross-session load.
#[derive(Debug, Default, Serialize)]
pub struct HistoryTimeline {
    /// Every message from every valid session, ascending by timestamp.
    /// Equal timestamps keep their arrival order; byte-identical messages
    /// from different sessions are both present.
    pub entries: Vec<TimelineEntry>,
    pub sessions_loaded: usize,
    pub sessions_skipped: usize,
}

/// Fetches and merges related session transcripts.
pub struct HistoryLoader {
    registry: Arc<SessionRegistry>,
    backend: Arc<dyn CompletionBackend>,
    /// Upper bound on concurrent transcript fetches.
    concurrency: usize,
}

impl HistoryLoader {
    pub fn new(
        registry: Arc<SessionRegistry>,
        backend: Arc<dyn CompletionBackend>,
        concurrency: usize,
    ) -> Self {
        Self {
            registry,
            backend,
            concurrency: concurrency.max(1),
        }
    }

    /// Loads every session related to `primary` and merges the transcripts.
    ///
    /// Each valid session is inserted into the registry individually; the
    /// returned timeline carries every message tagged with its origin.
    ///
    /// # Errors
    ///
    /// Fails only when the related-session listing itself cannot be
    /// fetched. Per-session fetch or validation failures are skipped and
    /// counted in `sessions_skipped`.
    pub async fn load_project_timeline(
        &self,
        project_path: &str,
        primary: &SessionId,
    ) -> Result<HistoryTimeline> {
        let summaries = self
            .backend
            .related_sessions(project_path, &primary.to_string())
            .await?;
        tracing::debug!(
            target: "history",
            "loading {} related sessions for {}",
            summaries.len(),
            primary
        );

        // Independent fetches, bounded concurrency; results come back in
        // summary order so the merge is deterministic.
        let fetches = summaries.into_iter().map(|summary| {
            let backend = Arc::clone(&self.backend);
            async move {
                let transcript = backend.fetch_session_history(&summary.id).await;
                (summary, transcript)
            }
        });
        let results: Vec<_> = futures::stream::iter(fetches)
            .buffered(self.concurrency)
            .collect()
            .await;

        let mut timeline = HistoryTimeline::default();
        for (summary, transcript) in results {
            let session = match transcript {
                Ok(response) => match import_session(&summary, response) {
                    Ok(session) => session,
                    Err(err) => {
                        tracing::warn!(
                            target: "history",
                            "skipping malformed session {}: {}",
                            summary.id,
                            err
                        );
                        timeline.sessions_skipped += 1;
                        continue;
                    }
                },
                Err(err) => {
                    tracing::warn!(
                        target: "history",
                        "skipping session {}: fetch failed: {}",
                        summary.id,
                        err
                    );
                    timeline.sessions_skipped += 1;
                    continue;
                }
            };

            let title = session.display_title().to_string();
            for message in &session.messages {
                timeline.entries.push(TimelineEntry {
                    origin: session.id.clone(),
                    origin_title: title.clone(),
                    message: message.clone(),
                });
            }
            self.registry.insert_session(session).await;
            timeline.sessions_loaded += 1;
        }

        // Stable sort: equal timestamps keep their arrival order.
        timeline
            .entries
            .sort_by(|a, b| compare_timestamps(&a.message.timestamp, &b.message.timestamp));
        Ok(timeline)
    }
}

/// Validates one fetched transcript and builds the session record.
///
/// All-or-nothing: a malformed id or any malformed message rejects the
/// whole session before it touches the registry.
fn import_session(summary: &SessionSummary, response: SessionHistoryResponse) -> Result<Session> {
    if response.session_id.trim().is_empty() {
        return Err(RillError::validation("session id is empty"));
    }
    let id = SessionId::parse(&response.session_id)?;

    let messages: Vec<Message> = response
        .messages
        .into_iter()
        .map(|message| message.into_message())
        .collect::<Result<_>>()?;

    let mut session = Session::new(id, SessionConfig::default());
    if let Some(title) = &summary.title {
        session.title = title.clone();
    }
    if let Some(first) = &summary.first_message_time {
        session.created_at = first.clone();
    } else if let Some(message) = messages.first() {
        session.created_at = message.timestamp.clone();
    }
    if let Some(last) = &summary.last_message_time {
        session.updated_at = last.clone();
    } else if let Some(message) = messages.last() {
        session.updated_at = message.timestamp.clone();
    }

    for message in &messages {
        session.metrics.record(message);
    }
    session.messages = messages;
    session.derive_title();
    Ok(session)
}

/// Orders ISO 8601 timestamps, falling back to a lexicographic compare
/// when either side does not parse.
fn compare_timestamps(a: &str, b: &str) -> Ordering {
    match (
        chrono::DateTime::parse_from_rfc3339(a),
        chrono::DateTime::parse_from_rfc3339(b),
    ) {
        (Ok(left), Ok(right)) => left.cmp(&right),
        _ => a.cmp(b),
    }
}
