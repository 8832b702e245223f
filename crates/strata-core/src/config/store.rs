use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Which document store backs the engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StoreBackend {
    /// Volatile, process-local store
    Memory,
    /// SQLite database file
    Sqlite { path: PathBuf },
}

/// Configuration for the document store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Default: memory
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Attempts per transaction before a conflict is reported
    /// Default: 5
    #[serde(default = "default_max_txn_attempts")]
    pub max_txn_attempts: usize,
}

fn default_backend() -> StoreBackend {
    StoreBackend::Memory
}

fn default_max_txn_attempts() -> usize {
    5
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            max_txn_attempts: default_max_txn_attempts(),
        }
    }
}

impl StoreConfig {
    pub fn memory() -> Self {
        Self::default()
    }

    pub fn sqlite(path: impl Into<PathBuf>) -> Self {
        Self {
            backend: StoreBackend::Sqlite { path: path.into() },
            ..Self::default()
        }
    }

    pub fn with_max_txn_attempts(mut self, attempts: usize) -> Self {
        self.max_txn_attempts = attempts;
        self
    }
}
