//! Engine configuration file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use strata_core::{ProcessorConfig, RuntimeConfig, StoreConfig, SweepConfig};

/// Top-level configuration read from `--config`
///
/// Every section is optional and falls back to its defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Default: SQLite at `./data/strata.db`
    #[serde(default = "default_store")]
    pub store: StoreConfig,

    #[serde(default)]
    pub sweep: SweepConfig,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Projections to run; the id selects the projection
    /// Default: every shipped projection
    #[serde(default = "strata_projections::default_configs")]
    pub processors: Vec<ProcessorConfig>,
}

fn default_store() -> StoreConfig {
    StoreConfig::sqlite(PathBuf::from("./data/strata.db"))
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store: default_store(),
            sweep: SweepConfig::default(),
            runtime: RuntimeConfig::default(),
            processors: strata_projections::default_configs(),
        }
    }
}

impl EngineConfig {
    /// Load from `path`, or use the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.sweep
            .schedule
            .validate()
            .context("Invalid sweep schedule")?;
        for processor in &self.processors {
            processor.validate()?;
        }
        Ok(())
    }
}
