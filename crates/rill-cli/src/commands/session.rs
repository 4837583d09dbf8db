//! `rill delete` - remove a session on the backend.

use anyhow::{Context, Result};
use rill_core::session::SessionId;
use rill_interaction::{BackendClient, BackendConfig};
use rill_interaction::client::CompletionBackend;

pub async fn delete(config: BackendConfig, session: &str) -> Result<()> {
    let id = SessionId::parse(session).context("invalid session id")?;
    if id.is_placeholder() {
        anyhow::bail!("placeholder sessions exist only locally; nothing to delete");
    }

    let backend = BackendClient::new(config)?;
    backend
        .delete_session(&id.to_string())
        .await
        .context("backend delete failed")?;
    println!("deleted {id}");
    Ok(())
}

pub async fn clear(config: BackendConfig, session: &str) -> Result<()> {
    let id = SessionId::parse(session).context("invalid session id")?;
    if id.is_placeholder() {
        anyhow::bail!("placeholder sessions exist only locally; nothing to clear");
    }

    let backend = BackendClient::new(config)?;
    backend
        .clear_session(&id.to_string())
        .await
        .context("backend clear failed")?;
    println!("cleared {id}");
    Ok(())
}
