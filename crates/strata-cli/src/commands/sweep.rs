//! Sweep command implementation

use anyhow::{bail, Result};
use strata_engine::ProcessorRegistry;

pub fn execute(registry: &ProcessorRegistry, events: bool, triggers: bool) -> Result<()> {
    let mut errors = 0;
    for (processor, outcome) in registry.sweep_all(events, triggers) {
        match outcome {
            Ok(report) => println!(
                "{:<12} {:<15} shards={} processed={} deferred={} failed={}",
                processor,
                report.kind.as_str(),
                report.shards,
                report.processed,
                report.deferred,
                report.failed
            ),
            Err(e) => {
                errors += 1;
                eprintln!("{:<12} sweep failed: {}", processor, e);
            }
        }
    }
    if errors > 0 {
        bail!("{} sweep(s) failed", errors);
    }
    Ok(())
}
