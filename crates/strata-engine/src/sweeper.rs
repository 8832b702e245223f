//! Backup Recovery Sweeper
//!
//! Two independent passes that make a processor converge even when write
//! notifications are lost or processing runs crash:
//! - the stale-event sweep re-triggers every shard holding an unprocessed
//!   event older than the time-to-live;
//! - the stale-trigger sweep resumes every shard left `Pending` for longer
//!   than the trigger interval.
//!
//! Both only read committed state and then go through the normal shard
//! transaction, so they are safe to run alongside live traffic.

use crate::debouncer::Debouncer;
use crate::engine::{Engine, TriggerOutcome};
use crate::pager::CursorPager;
use crate::processor::ShardProcessor;
use std::collections::BTreeSet;
use strata_core::types::{LAST_RUN_AT_FIELD, PENDING_FIELD, PROCESSED_FIELD, UPDATED_AT_FIELD};
use strata_core::{Direction, DocumentStore, FilterOp, Query, Result, ShardKey, TriggerState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepKind {
    StaleEvents,
    StaleTriggers,
}

impl SweepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepKind::StaleEvents => "stale_events",
            SweepKind::StaleTriggers => "stale_triggers",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub kind: SweepKind,
    /// Distinct shards the scan found
    pub shards: usize,
    pub processed: usize,
    pub deferred: usize,
    pub failed: usize,
}

impl SweepReport {
    fn new(kind: SweepKind) -> Self {
        Self {
            kind,
            shards: 0,
            processed: 0,
            deferred: 0,
            failed: 0,
        }
    }
}

impl<S, P> Engine<S, P>
where
    S: DocumentStore,
    P: ShardProcessor,
{
    /// Shards holding an unprocessed event last updated before `cutoff`.
    pub fn stale_event_shards(&self, cutoff: i64) -> Result<BTreeSet<ShardKey>> {
        let query = self
            .events_scope()
            .filter(PROCESSED_FIELD, FilterOp::Eq, false)
            .filter(UPDATED_AT_FIELD, FilterOp::Lt, cutoff)
            .order_by(UPDATED_AT_FIELD, Direction::Asc);

        let mut shards = BTreeSet::new();
        let items = CursorPager::new(query, self.config.batch_size)
            .pages(self.store.as_ref())
            .items();
        for item in items {
            let doc = item?;
            match self.template.resolve(&doc.path) {
                Ok(shard) => {
                    shards.insert(shard);
                }
                Err(e) => tracing::warn!(event = %doc.path, error = %e, "Skipping unroutable event"),
            }
        }
        Ok(shards)
    }

    /// Stale-event sweep entry point.
    pub fn sweep_stale_events(&self) -> Result<SweepReport> {
        let now = self.clock.now_millis();
        let cutoff = now.saturating_sub(i64::try_from(self.sweep.tts_ms).unwrap_or(i64::MAX));
        let shards = self.stale_event_shards(cutoff)?;

        let mut report = SweepReport::new(SweepKind::StaleEvents);
        report.shards = shards.len();
        for shard in &shards {
            match self.trigger(shard) {
                Ok(TriggerOutcome::Processed(_)) => report.processed += 1,
                Ok(TriggerOutcome::Deferred { .. }) => report.deferred += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        processor = %self.config.id,
                        shard = %shard,
                        error = %e,
                        "Stale-event sweep could not trigger shard"
                    );
                }
            }
        }

        self.log_sweep(&report);
        Ok(report)
    }

    /// Shards left pending since at least one trigger interval.
    pub fn stale_trigger_shards(&self, now: i64) -> Result<Vec<ShardKey>> {
        let query = Query::collection(Debouncer::triggers_collection(&self.config.id))
            .filter(PENDING_FIELD, FilterOp::Eq, true)
            .filter(LAST_RUN_AT_FIELD, FilterOp::Le, self.debouncer.stale_cutoff(now))
            .order_by(LAST_RUN_AT_FIELD, Direction::Asc);

        let template = &self.template;
        CursorPager::new(query, self.config.batch_size)
            .pages(self.store.as_ref())
            .filter_map_items(|doc| {
                let shard = doc
                    .decode::<TriggerState>()
                    .and_then(|state| template.resolve_collection(&state.shard));
                match shard {
                    Ok(shard) => Some(shard),
                    Err(e) => {
                        tracing::warn!(trigger = %doc.path, error = %e, "Skipping unreadable trigger state");
                        None
                    }
                }
            })
            .collect()
    }

    /// Stale-trigger sweep entry point.
    pub fn sweep_stale_triggers(&self) -> Result<SweepReport> {
        let now = self.clock.now_millis();
        let shards = self.stale_trigger_shards(now)?;

        let mut report = SweepReport::new(SweepKind::StaleTriggers);
        report.shards = shards.len();
        for shard in &shards {
            match self.process_shard(shard) {
                Ok(_) => report.processed += 1,
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(
                        processor = %self.config.id,
                        shard = %shard,
                        error = %e,
                        "Stale-trigger sweep could not resume shard"
                    );
                }
            }
        }

        self.log_sweep(&report);
        Ok(report)
    }

    fn log_sweep(&self, report: &SweepReport) {
        strata_core::observe::record_sweep(report.kind.as_str(), report.shards as u64);
        if report.shards > 0 {
            tracing::info!(
                processor = %self.config.id,
                sweep = report.kind.as_str(),
                shards = report.shards,
                processed = report.processed,
                deferred = report.deferred,
                failed = report.failed,
                "Sweep finished"
            );
        } else {
            tracing::debug!(processor = %self.config.id, sweep = report.kind.as_str(), "Nothing to sweep");
        }
    }
}
