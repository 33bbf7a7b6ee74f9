//! Agent Backup - Main entry point
//!
//! Serves the backup HTTP API, or runs a single engine operation from the command line.

use agent_backup::catalog::SnapshotKind;
use agent_backup::{api, daemon::shutdown, utils, AppState, Config};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Live data root (overrides config and OPENCLAW_HOME)
    #[arg(long, value_name = "DIR", global = true)]
    data_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API (default)
    Serve {
        /// Port to listen on (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Create a snapshot
    Create {
        /// Tag the snapshot as automatic so retention applies to it
        #[arg(long)]
        auto: bool,
    },
    /// List snapshots, newest first
    List {
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 10)]
        page_size: usize,
    },
    /// Delete a snapshot
    Delete { name: String },
    /// Restore a snapshot and wait for it to finish
    Restore { name: String },
    /// Apply the retention policy now
    Prune,
    /// Rewrite the scheduler entries from the schedule store
    Resync,
    /// Show stored schedules
    Schedules,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(root) = args.data_root {
        config.paths.data_root = root;
    }

    let log_level = args.log_level.clone().unwrap_or_else(|| config.log.level.clone());
    utils::logger::init(&log_level)?;

    let state = Arc::new(AppState::production(config).context("failed to initialise engine")?);

    match args.command.unwrap_or(Command::Serve { port: None }) {
        Command::Serve { port } => serve(state, port).await,
        Command::Create { auto } => {
            let kind = if auto { SnapshotKind::Auto } else { SnapshotKind::Manual };
            let name = state.builder.create(kind).await?;
            println!("{}", name);
            Ok(())
        }
        Command::List { page, page_size } => {
            let page = state.catalog.list(page, page_size).await;
            println!("{}", serde_json::to_string_pretty(&page)?);
            Ok(())
        }
        Command::Delete { name } => {
            state.catalog.delete(&name).await?;
            println!("Deleted {}", name);
            Ok(())
        }
        Command::Restore { name } => {
            let status = state.restorer.start(&name)?.wait().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
            if let Some(error) = status.error {
                bail!("restore failed: {}", error);
            }
            Ok(())
        }
        Command::Prune => {
            let report = state.catalog.prune().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Command::Resync => {
            state.schedules.resync_from_store().await?;
            println!("Scheduler entries updated");
            Ok(())
        }
        Command::Schedules => {
            println!("{}", serde_json::to_string_pretty(&state.schedules.list())?);
            Ok(())
        }
    }
}

async fn serve(state: Arc<AppState>, port: Option<u16>) -> Result<()> {
    let host: std::net::IpAddr = state
        .config
        .server
        .host
        .parse()
        .with_context(|| format!("invalid listen address '{}'", state.config.server.host))?;
    let addr = SocketAddr::new(host, port.unwrap_or(state.config.server.port));

    tracing::info!(
        "Starting agent-backup v{} (data root: {})",
        env!("CARGO_PKG_VERSION"),
        state.layout.data_root.display()
    );

    if let Err(e) = state.schedules.resync_from_store().await {
        tracing::warn!("Initial scheduler resync failed: {}", e);
    }

    let shutdown_token = CancellationToken::new();
    shutdown::cancel_on_signal(shutdown_token.clone());

    let app = api::create_router(state.clone());
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_token.cancelled_owned())
        .await?;

    if state.restorer.is_running() {
        tracing::warn!("Shutting down with a restore still in progress");
    }
    tracing::info!("Server shutdown complete");
    Ok(())
}
