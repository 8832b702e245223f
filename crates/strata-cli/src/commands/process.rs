//! Process command implementation

use anyhow::{Context, Result};
use strata_engine::ProcessorRegistry;

pub fn execute(registry: &ProcessorRegistry, processor: &str, shard: &str) -> Result<()> {
    let workflow = super::workflow(registry, processor)?;
    tracing::info!(processor, shard, "Processing shard");

    let report = workflow
        .process(shard)
        .with_context(|| format!("Processing {} failed", shard))?;

    println!(
        "✓ {}: {} event(s) over {} page(s), {} quarantined",
        processor, report.events, report.pages, report.quarantined
    );
    if report.has_more {
        println!("Page budget exhausted; the shard stays pending for the next run");
    } else if report.is_empty() {
        println!("No ready events - shard is up to date");
    }
    Ok(())
}
