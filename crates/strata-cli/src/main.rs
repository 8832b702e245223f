//! Strata CLI - operator interface for the event-aggregation engine

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use strata_core::StoreBackend;
use strata_memory::MemoryStore;
use strata_sqlite::SqliteStore;

mod commands;
mod config;

use config::EngineConfig;

#[derive(Parser)]
#[command(name = "strata")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a JSON engine configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write events from a newline-delimited JSON file and notify their shards
    Ingest {
        /// File with one `{"path": ..., "data": ..., "metadata": ...}` object per line
        file: PathBuf,

        /// Only write the events; leave them to the stale-event sweep
        #[arg(long)]
        no_notify: bool,
    },

    /// Run one processing invocation for a shard, ignoring the debounce window
    Process {
        /// Processor id (e.g. "ownership")
        processor: String,

        /// Events collection of the shard (e.g. "collections/c1/items/7/transfers")
        shard: String,
    },

    /// Run one recovery sweep pass for every processor
    Sweep {
        /// Only the stale-event sweep
        #[arg(long)]
        events: bool,

        /// Only the stale-trigger sweep
        #[arg(long)]
        triggers: bool,
    },

    /// Show pending shards and unprocessed events per processor
    Status,

    /// Run the engine with scheduled sweeps until Ctrl+C
    Serve,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .init();

    let config = EngineConfig::load(cli.config.as_deref())?;

    match &config.store.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; nothing outlives this process");
            let store = Arc::new(MemoryStore::with_config(&config.store));
            commands::execute(store, &config, cli.command)
        }
        StoreBackend::Sqlite { path } => {
            let store = SqliteStore::with_config(&config.store)
                .with_context(|| format!("Failed to open store at {}", path.display()))?;
            commands::execute(Arc::new(store), &config, cli.command)
        }
    }
}
