//! Serve command implementation

use crate::config::EngineConfig;
use anyhow::{Context, Result};
use std::sync::Arc;
use strata_engine::{EngineRuntime, ProcessorRegistry};

pub fn execute(registry: Arc<ProcessorRegistry>, config: &EngineConfig) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new().context("Failed to start tokio runtime")?;
    runtime.block_on(async {
        let engine = EngineRuntime::new(registry, config.runtime.clone());
        let handle = engine.handle();

        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => tracing::info!("Received Ctrl+C, shutting down"),
                Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C, shutting down"),
            }
            handle.shutdown();
        });

        println!("Running engine... (Press Ctrl+C to stop)");
        let stats = engine.run().await.context("Engine runtime failed")?;
        println!(
            "✓ Stopped after {} notification(s), {} sweep pass(es), {} failure(s)",
            stats.notifications, stats.sweeps, stats.failures
        );
        Ok(())
    })
}
