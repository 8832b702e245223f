//! Subcommand implementations, generic over the configured store

pub mod ingest;
pub mod process;
pub mod serve;
pub mod status;
pub mod sweep;

use crate::config::EngineConfig;
use crate::Commands;
use anyhow::{Context, Result};
use std::sync::Arc;
use strata_core::DocumentStore;
use strata_engine::ProcessorRegistry;

pub fn execute<S>(store: Arc<S>, config: &EngineConfig, command: Commands) -> Result<()>
where
    S: DocumentStore + 'static,
{
    let registry = strata_projections::build_registry(
        store.clone(),
        &config.processors,
        &config.sweep,
        None,
    )
    .context("Failed to register processors")?;

    match command {
        Commands::Ingest { file, no_notify } => {
            ingest::execute(store.as_ref(), &registry, &file, !no_notify).map(|_| ())
        }
        Commands::Process { processor, shard } => process::execute(&registry, &processor, &shard),
        Commands::Sweep { events, triggers } => {
            // Neither flag means both sweeps.
            let both = !events && !triggers;
            sweep::execute(&registry, events || both, triggers || both)
        }
        Commands::Status => status::execute(&registry),
        Commands::Serve => serve::execute(Arc::new(registry), config),
    }
}

/// Registry lookup with a helpful error.
fn workflow<'a>(
    registry: &'a ProcessorRegistry,
    id: &str,
) -> Result<&'a Arc<dyn strata_engine::ShardWorkflow>> {
    registry.get(id).with_context(|| {
        let known: Vec<&str> = registry.iter().map(|w| w.id()).collect();
        format!("Unknown processor '{}' (configured: {})", id, known.join(", "))
    })
}
