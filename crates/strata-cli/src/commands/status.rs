//! Status command implementation

use anyhow::{Context, Result};
use strata_engine::ProcessorRegistry;

pub fn execute(registry: &ProcessorRegistry) -> Result<()> {
    println!("\nEngine Status");
    println!("{}", "=".repeat(60));

    let mut backlog = 0;
    for workflow in registry.iter() {
        let status = workflow
            .status()
            .with_context(|| format!("Failed to read status of {}", workflow.id()))?;
        println!("\n{}:", status.processor);
        println!("  Unprocessed events: {}", status.unprocessed_events);
        println!("  Pending shards: {}", status.pending_shards.len());
        for shard in &status.pending_shards {
            println!("    - {}", shard);
        }
        backlog += status.unprocessed_events + status.pending_shards.len();
    }

    if backlog == 0 {
        println!("\n✓ All projections are up to date");
    } else {
        println!("\n⚠️  Work outstanding; run 'strata sweep' or keep 'strata serve' running");
    }
    Ok(())
}
