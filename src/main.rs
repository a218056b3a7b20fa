//! # webtrail CLI (`trail`)
//!
//! The `trail` binary drives the capture pipeline: database initialization,
//! one-shot and streamed capture, history inspection, and store maintenance.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `trail init` | Create the local SQLite cache and run schema migrations |
//! | `trail capture <url>` | Run one navigation event through the pipeline |
//! | `trail collect <tree.json>` | Capture a content card from an element tree |
//! | `trail watch` | Read capture events (JSON lines) from stdin until EOF |
//! | `trail history` | Print the canonical view of both stores |
//! | `trail delete <id>` | Delete one committed record from both stores |
//! | `trail resync` | Push local-only records to the remote store |
//! | `trail clear` | Wipe both stores, reporting each outcome |
//!
//! All commands accept `--config` pointing to a TOML configuration file;
//! see `config/trail.example.toml`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use webtrail::{config, events, history, migrate};

/// webtrail: capture browsing activity and keep a local cache and a remote
/// history service converging on one record per address.
#[derive(Parser)]
#[command(
    name = "trail",
    about = "webtrail: an event-driven capture and sync pipeline for browsing activity",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/trail.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the local cache schema. Idempotent; also deduplicates
    /// legacy databases written before the uniqueness index existed.
    Init,

    /// Run a single navigation event through the capture pipeline.
    Capture {
        /// The resolved page address.
        url: String,

        /// The page title; defaults to the address.
        #[arg(long)]
        title: Option<String>,
    },

    /// Capture a content card from an element-tree JSON file.
    Collect {
        /// Path to the card's element tree (JSON, with computed styles).
        path: PathBuf,
    },

    /// Read capture events from stdin (one JSON object per line) until EOF.
    Watch,

    /// Print the canonical view: remote records merged with local-only ones.
    History,

    /// Delete one committed record (by remote id) from both stores.
    Delete {
        /// The remote-assigned record id.
        id: i64,
    },

    /// Push records the remote store has not acknowledged yet.
    Resync,

    /// Delete all records from both stores. Reports each side separately and
    /// fails when either side did not clear.
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Local cache initialized successfully.");
        }
        Commands::Capture { url, title } => {
            events::run_capture(&cfg, url, title).await?;
        }
        Commands::Collect { path } => {
            events::run_collect(&cfg, &path).await?;
        }
        Commands::Watch => {
            events::run_watch(&cfg).await?;
        }
        Commands::History => {
            history::run_history(&cfg).await?;
        }
        Commands::Delete { id } => {
            history::run_delete(&cfg, id).await?;
        }
        Commands::Resync => {
            history::run_resync(&cfg).await?;
        }
        Commands::Clear => {
            history::run_clear(&cfg).await?;
        }
    }

    Ok(())
}
