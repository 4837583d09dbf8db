use anyhow::Result;
use clap::{Parser, Subcommand};
use rill_interaction::BackendConfig;

mod commands;

#[derive(Parser)]
#[command(name = "rill")]
#[command(about = "RILL - streaming session lifecycle engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Send a message to the backend and print the reply
    Send {
        /// The message text
        message: String,
        /// Resume an existing backend session instead of starting fresh
        #[arg(long)]
        session: Option<String>,
        /// Project path the conversation belongs to
        #[arg(long)]
        project: Option<String>,
    },
    /// Merge related session transcripts into one chronological timeline
    Timeline {
        /// Project path whose sessions are related
        project: String,
        /// Primary session id
        primary: String,
        /// Print the timeline as JSON
        #[arg(long)]
        json: bool,
    },
    /// Clear a session's transcript on the backend
    Clear {
        /// Session id to clear
        session: String,
    },
    /// Delete a session on the backend
    Delete {
        /// Session id to delete
        session: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = BackendConfig::load()?;

    match cli.command {
        Commands::Send {
            message,
            session,
            project,
        } => commands::chat::send(config, &message, session.as_deref(), project).await?,
        Commands::Timeline {
            project,
            primary,
            json,
        } => commands::history::timeline(config, &project, &primary, json).await?,
        Commands::Clear { session } => commands::session::clear(config, &session).await?,
        Commands::Delete { session } => commands::session::delete(config, &session).await?,
    }

    Ok(())
}
