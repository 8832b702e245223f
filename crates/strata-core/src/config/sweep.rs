use crate::schedule::Schedule;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration of the two recovery sweeps
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepConfig {
    /// Cadence shared by the stale-event and stale-trigger sweeps
    /// Default: every 5 minutes
    #[serde(default)]
    pub schedule: Schedule,

    /// Age after which an unprocessed event counts as stale
    /// Default: 600000ms (10 minutes)
    #[serde(default = "default_tts_ms")]
    pub tts_ms: u64,
}

fn default_tts_ms() -> u64 {
    600_000
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            schedule: Schedule::default(),
            tts_ms: default_tts_ms(),
        }
    }
}

impl SweepConfig {
    pub fn new(schedule: Schedule) -> Self {
        Self {
            schedule,
            ..Self::default()
        }
    }

    pub fn with_tts_ms(mut self, ms: u64) -> Self {
        self.tts_ms = ms;
        self
    }

    pub fn tts(&self) -> Duration {
        Duration::from_millis(self.tts_ms)
    }
}
