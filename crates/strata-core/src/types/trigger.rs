//! Per-shard trigger state
//!
//! One record per shard, created lazily on the first notification and only
//! ever written by the debouncer and the sweeper, always inside the shard's
//! processing transaction.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const LAST_RUN_AT_FIELD: &str = "lastRunAt";
pub const PENDING_FIELD: &str = "pending";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerState {
    /// Events collection path of the shard this record belongs to.
    pub shard: String,

    /// Start time of the last processing run (epoch millis).
    pub last_run_at: i64,

    /// Work was requested but not yet done.
    pub pending: bool,

    /// Canonical key of the event the derived state was last computed from.
    /// Only ordered processors maintain this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_key: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPhase {
    Idle,
    Pending,
}

impl TriggerState {
    pub fn new(shard: impl Into<String>, last_run_at: i64) -> Self {
        Self {
            shard: shard.into(),
            last_run_at,
            pending: false,
            last_applied_key: None,
        }
    }

    pub fn phase(&self) -> TriggerPhase {
        if self.pending {
            TriggerPhase::Pending
        } else {
            TriggerPhase::Idle
        }
    }

    /// Whether at least `min_interval_ms` has elapsed since the last run.
    pub fn is_due(&self, now: i64, min_interval_ms: i64) -> bool {
        now.saturating_sub(self.last_run_at) >= min_interval_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_due_after_interval() {
        let state = TriggerState::new("referrals/abc/events", 0);
        assert!(!state.is_due(2, 5));
        assert!(state.is_due(5, 5));
        assert_eq!(state.phase(), TriggerPhase::Idle);
    }

    #[test]
    fn test_serialized_field_names() {
        let mut state = TriggerState::new("referrals/abc/events", 10);
        state.pending = true;
        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(value[LAST_RUN_AT_FIELD], 10);
        assert_eq!(value[PENDING_FIELD], true);
        assert!(value.get("lastAppliedKey").is_none());
    }
}
