//! Trigger Debouncer
//!
//! Per-shard `Idle`/`Pending` state machine bounding how often a shard is
//! processed. The state lives in a [`TriggerState`] document and is only
//! read and written inside the shard's own transaction, so concurrent
//! triggers of one shard conflict at commit and serialize.

use std::time::Duration;
use strata_core::types::PENDING_FIELD;
use strata_core::{DocPath, Result, ShardKey, StoreTxn, TriggerState};

/// Root collection holding engine bookkeeping.
pub const SYSTEM_ROOT: &str = "_strata";

/// Outcome of debouncing one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerDecision {
    /// Process now.
    RunNow,
    /// Too soon after the last run; leave the shard pending.
    Defer { already_pending: bool },
}

#[derive(Debug, Clone)]
pub struct Debouncer {
    min_interval_ms: i64,
}

impl Debouncer {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval_ms: i64::try_from(min_interval.as_millis()).unwrap_or(i64::MAX),
        }
    }

    pub fn min_interval_ms(&self) -> i64 {
        self.min_interval_ms
    }

    /// Collection holding every trigger state of one processor.
    pub fn triggers_collection(processor_id: &str) -> String {
        format!("{}/{}/triggers", SYSTEM_ROOT, processor_id)
    }

    pub fn trigger_path(processor_id: &str, shard: &ShardKey) -> Result<DocPath> {
        DocPath::child(&Self::triggers_collection(processor_id), &shard.encode())
    }

    /// A shard with no trigger state has never run and is always due.
    pub fn decide(&self, state: Option<&TriggerState>, now: i64) -> TriggerDecision {
        match state {
            Some(state) if !state.is_due(now, self.min_interval_ms) => TriggerDecision::Defer {
                already_pending: state.pending,
            },
            _ => TriggerDecision::RunNow,
        }
    }

    /// Last-run cutoff for the stale-trigger sweep.
    pub fn stale_cutoff(&self, now: i64) -> i64 {
        now.saturating_sub(self.min_interval_ms)
    }

    pub fn load<T: StoreTxn>(txn: &mut T, path: &DocPath) -> Result<Option<TriggerState>> {
        match txn.get(path)? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    pub fn save<T: StoreTxn>(txn: &mut T, path: &DocPath, state: &TriggerState) -> Result<()> {
        txn.upsert(path.clone(), serde_json::to_value(state)?)
    }

    /// State for a run starting at `now`; `Idle` until the run reports more work.
    pub fn begin_run(existing: Option<TriggerState>, shard: &ShardKey, now: i64) -> TriggerState {
        let mut state = existing.unwrap_or_else(|| TriggerState::new(shard.to_string(), now));
        state.shard = shard.to_string();
        state.last_run_at = now;
        state.pending = false;
        state
    }

    /// Move the shard to `Pending`. Writes nothing if it already is.
    ///
    /// A shard without state gets `lastRunAt = now`, so the stale-trigger
    /// sweep picks it up one interval later.
    pub fn mark_pending<T: StoreTxn>(
        txn: &mut T,
        path: &DocPath,
        shard: &ShardKey,
        existing: Option<&TriggerState>,
        now: i64,
    ) -> Result<bool> {
        match existing {
            Some(state) if state.pending => Ok(false),
            Some(_) => {
                txn.update(
                    path.clone(),
                    vec![(PENDING_FIELD.to_string(), serde_json::Value::Bool(true))],
                )?;
                Ok(true)
            }
            None => {
                let mut state = TriggerState::new(shard.to_string(), now);
                state.pending = true;
                Self::save(txn, path, &state)?;
                Ok(true)
            }
        }
    }
}
