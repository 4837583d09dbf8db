//! `rill timeline` - cross-session merged history.

use anyhow::{Context, Result};
use rill_application::HistoryLoader;
use rill_core::session::{SessionId, SessionRegistry};
use rill_interaction::{BackendClient, BackendConfig};
use std::sync::Arc;

/// Loads every session related to `primary` and prints the merged
/// chronological timeline.
pub async fn timeline(
    config: BackendConfig,
    project: &str,
    primary: &str,
    json: bool,
) -> Result<()> {
    let concurrency = config.history_concurrency;
    let registry = Arc::new(SessionRegistry::new());
    let backend = Arc::new(BackendClient::new(config)?);
    let loader = HistoryLoader::new(registry, backend, concurrency);

    let primary_id = SessionId::parse(primary).context("invalid session id")?;
    let timeline = loader
        .load_project_timeline(project, &primary_id)
        .await
        .context("failed to load project history")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&timeline)?);
        return Ok(());
    }

    for entry in &timeline.entries {
        println!(
            "[{}] ({}) {:?}: {}",
            entry.message.timestamp,
            entry.origin_title,
            entry.message.role,
            entry.message.content.text()
        );
    }
    eprintln!(
        "{} sessions merged, {} skipped",
        timeline.sessions_loaded, timeline.sessions_skipped
    );
    Ok(())
}
