use crate::debouncer::{Debouncer, TriggerDecision};
use crate::processor::{ProcessContext, ProcessReport, ShardProcessor};
use std::sync::Arc;
use std::time::Instant;
use strata_core::types::{PENDING_FIELD, PROCESSED_FIELD};
use strata_core::{
    Clock, DocPath, DocumentStore, FilterOp, PathTemplate, ProcessorConfig, Query, Result,
    ShardKey, SweepConfig, SystemClock, TriggerState,
};

/// Result of one trigger of a shard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
    Processed(ProcessReport),
    /// Debounced; the shard is left `Pending`.
    Deferred { already_pending: bool },
}

impl TriggerOutcome {
    pub fn is_processed(&self) -> bool {
        matches!(self, TriggerOutcome::Processed(_))
    }
}

/// Snapshot of a processor's backlog
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStatus {
    pub processor: String,
    /// Events collections of shards waiting for a run
    pub pending_shards: Vec<String>,
    pub unprocessed_events: usize,
}

/// One processor bound to a store
///
/// Exposes the four entry points: [`on_event_written`](Self::on_event_written),
/// [`process_shard`](Self::process_shard),
/// [`sweep_stale_events`](Self::sweep_stale_events) and
/// [`sweep_stale_triggers`](Self::sweep_stale_triggers).
pub struct Engine<S, P>
where
    S: DocumentStore,
    P: ShardProcessor,
{
    pub(crate) config: ProcessorConfig,
    pub(crate) template: PathTemplate,
    pub(crate) store: Arc<S>,
    pub(crate) processor: P,
    pub(crate) debouncer: Debouncer,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) sweep: SweepConfig,
}

impl<S, P> Engine<S, P>
where
    S: DocumentStore,
    P: ShardProcessor,
{
    /// Validate `config` and bind `processor` to `store`.
    pub fn new(config: ProcessorConfig, store: Arc<S>, processor: P) -> Result<Self> {
        let template = config.validate()?;
        let debouncer = Debouncer::new(config.min_trigger_interval());
        Ok(Self {
            config,
            template,
            store,
            processor,
            debouncer,
            clock: Arc::new(SystemClock),
            sweep: SweepConfig::default(),
        })
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sweep_config(mut self, sweep: SweepConfig) -> Self {
        self.sweep = sweep;
        self
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }

    pub fn template(&self) -> &PathTemplate {
        &self.template
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    pub fn sweep_config(&self) -> &SweepConfig {
        &self.sweep
    }

    /// Shard owning the event at `path`.
    pub fn shard_for(&self, path: &DocPath) -> Result<ShardKey> {
        self.template.resolve(path)
    }

    /// Write-notification entry point.
    pub fn on_event_written(&self, path: &DocPath) -> Result<TriggerOutcome> {
        let shard = self.shard_for(path)?;
        tracing::trace!(processor = %self.config.id, event = %path, "Event written");
        self.trigger(&shard)
    }

    /// Debounced trigger of one shard.
    pub fn trigger(&self, shard: &ShardKey) -> Result<TriggerOutcome> {
        self.invoke(shard, false)
    }

    /// Processing entry point: run the processor regardless of the debounce
    /// window.
    pub fn process_shard(&self, shard: &ShardKey) -> Result<ProcessReport> {
        match self.invoke(shard, true)? {
            TriggerOutcome::Processed(report) => Ok(report),
            TriggerOutcome::Deferred { .. } => Ok(ProcessReport::default()),
        }
    }

    fn invoke(&self, shard: &ShardKey, force: bool) -> Result<TriggerOutcome> {
        let trigger_path = Debouncer::trigger_path(&self.config.id, shard)?;
        let started = Instant::now();

        let result = self.store.run_transaction(|txn| {
            let now = self.clock.now_millis();
            let existing = Debouncer::load(txn, &trigger_path)?;

            if !force {
                if let TriggerDecision::Defer { already_pending } =
                    self.debouncer.decide(existing.as_ref(), now)
                {
                    Debouncer::mark_pending(txn, &trigger_path, shard, existing.as_ref(), now)?;
                    return Ok(TriggerOutcome::Deferred { already_pending });
                }
            }

            let mut state = Debouncer::begin_run(existing, shard, now);
            let ctx = ProcessContext {
                config: &self.config,
                template: &self.template,
                shard,
                now,
            };
            let report = self.processor.process(txn, &ctx, &mut state)?;
            state.pending = report.has_more;
            Debouncer::save(txn, &trigger_path, &state)?;
            Ok(TriggerOutcome::Processed(report))
        });

        match result {
            Ok(TriggerOutcome::Processed(report)) => {
                strata_core::observe::record_processing_run(
                    &self.config.id,
                    started.elapsed(),
                    report.events as u64,
                );
                strata_core::observe::record_quarantine(report.quarantined as u64);
                tracing::info!(
                    processor = %self.config.id,
                    shard = %shard,
                    events = report.events,
                    pages = report.pages,
                    has_more = report.has_more,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Processed shard"
                );
                Ok(TriggerOutcome::Processed(report))
            }
            Ok(deferred) => {
                strata_core::observe::record_deferred(&self.config.id);
                tracing::debug!(processor = %self.config.id, shard = %shard, "Trigger deferred");
                Ok(deferred)
            }
            Err(e) => {
                tracing::error!(
                    processor = %self.config.id,
                    shard = %shard,
                    kind = ?e.kind(),
                    error = %e,
                    "Shard processing failed"
                );
                if let Err(mark_err) = self.mark_pending(shard, &trigger_path) {
                    tracing::warn!(
                        processor = %self.config.id,
                        shard = %shard,
                        error = %mark_err,
                        "Could not leave shard pending after failure"
                    );
                }
                Err(e)
            }
        }
    }

    /// Leave the shard for the stale-trigger sweep.
    fn mark_pending(&self, shard: &ShardKey, trigger_path: &DocPath) -> Result<()> {
        self.store.run_transaction(|txn| {
            let now = self.clock.now_millis();
            let existing = Debouncer::load(txn, trigger_path)?;
            Debouncer::mark_pending(txn, trigger_path, shard, existing.as_ref(), now)?;
            Ok(())
        })
    }

    /// Trigger state of one shard.
    pub fn trigger_state(&self, shard: &ShardKey) -> Result<Option<TriggerState>> {
        let path = Debouncer::trigger_path(&self.config.id, shard)?;
        match self.store.get(&path)? {
            Some(doc) => Ok(Some(doc.decode()?)),
            None => Ok(None),
        }
    }

    /// Query over every events collection this processor owns.
    pub fn events_scope(&self) -> Query {
        if self.config.is_group_scoped {
            Query::group(self.template.clone())
        } else {
            Query::collection(self.template.as_str())
        }
    }

    pub fn status(&self) -> Result<EngineStatus> {
        let pending = self.store.query(
            &Query::collection(Debouncer::triggers_collection(&self.config.id))
                .filter(PENDING_FIELD, FilterOp::Eq, true),
        )?;
        let mut pending_shards = Vec::with_capacity(pending.len());
        for doc in pending {
            let state: TriggerState = doc.decode()?;
            pending_shards.push(state.shard);
        }

        let unprocessed = self
            .store
            .query(&self.events_scope().filter(PROCESSED_FIELD, FilterOp::Eq, false))?;

        Ok(EngineStatus {
            processor: self.config.id.clone(),
            pending_shards,
            unprocessed_events: unprocessed.len(),
        })
    }
}
