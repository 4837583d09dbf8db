//! `rill send` - one chat turn against the backend.

use anyhow::{Context, Result};
use rill_application::{ChatUseCase, ErrorTracker, RecoveryAction};
use rill_core::session::{SessionConfig, SessionId, SessionRegistry};
use rill_interaction::{BackendClient, BackendConfig};
use std::sync::Arc;

/// Sends one message and prints the assistant reply.
///
/// The engine is assembled here, at the composition root: registry,
/// backend client, error tracker and the chat use case are constructed
/// once and shared by reference.
pub async fn send(
    config: BackendConfig,
    message: &str,
    session: Option<&str>,
    project: Option<String>,
) -> Result<()> {
    let registry = Arc::new(SessionRegistry::new());
    let backend = Arc::new(BackendClient::new(config)?);
    let tracker = Arc::new(ErrorTracker::new());
    let session_config = SessionConfig {
        project_path: project,
        ..Default::default()
    };
    let chat = ChatUseCase::new(
        Arc::clone(&registry),
        backend,
        Arc::clone(&tracker),
        session_config,
    );

    if let Some(raw) = session {
        let id = SessionId::parse(raw).context("invalid session id")?;
        chat.resume_session(&id)
            .await
            .context("failed to resume session")?;
    }

    match chat.send_message(message).await {
        Ok(outcome) => {
            if let Some(error) = outcome.error {
                eprintln!("backend reported: {error}");
            }
            println!("{}", outcome.reply);
            eprintln!("session: {}", outcome.session_id);
            Ok(())
        }
        Err(err) => {
            if err.is_retryable() {
                let action = match registry.active_session_id().await {
                    Some(id) => tracker.recovery_action(&id),
                    None => RecoveryAction::Retry,
                };
                match action {
                    RecoveryAction::Retry => {
                        eprintln!("transient failure, try again: {err}");
                    }
                    RecoveryAction::ReplaceSession => {
                        eprintln!(
                            "repeated failures; delete the session or start a new one: {err}"
                        );
                    }
                }
            }
            Err(err.into())
        }
    }
}
