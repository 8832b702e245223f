//! Optional metrics instrumentation for strata.
//!
//! When the `observe` feature is enabled, key operations emit counters and
//! histograms via the [`metrics`] crate. A downstream application must install
//! a metrics recorder (e.g. `metrics-exporter-prometheus`) to collect the data.
//!
//! When the feature is **not** enabled every function in this module is a
//! zero-cost no-op.

/// Record a shard processing run.
///
/// - `strata.processor.runs_total` – counter with `processor` label
/// - `strata.processor.run_duration_seconds` – histogram
/// - `strata.processor.events_processed_total` – counter
#[inline]
pub fn record_processing_run(processor: &str, duration: std::time::Duration, events: u64) {
    #[cfg(feature = "observe")]
    {
        let processor = processor.to_string();
        metrics::counter!("strata.processor.runs_total", "processor" => processor.clone())
            .increment(1);
        metrics::histogram!("strata.processor.run_duration_seconds", "processor" => processor.clone())
            .record(duration.as_secs_f64());
        metrics::counter!("strata.processor.events_processed_total", "processor" => processor)
            .increment(events);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (processor, duration, events);
    }
}

/// Record a debounced (deferred) trigger.
///
/// - `strata.debouncer.deferred_total` – counter
#[inline]
pub fn record_deferred(processor: &str) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("strata.debouncer.deferred_total", "processor" => processor.to_string())
            .increment(1);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = processor;
    }
}

/// Record a sweep pass.
///
/// - `strata.sweep.runs_total` – counter with `kind` label
/// - `strata.sweep.shards_total` – counter of shards re-armed or resumed
#[inline]
pub fn record_sweep(kind: &'static str, shards: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("strata.sweep.runs_total", "kind" => kind).increment(1);
        metrics::counter!("strata.sweep.shards_total", "kind" => kind).increment(shards);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = (kind, shards);
    }
}

/// Record an optimistic transaction conflict.
///
/// - `strata.store.conflicts_total` – counter
#[inline]
pub fn record_conflict() {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("strata.store.conflicts_total").increment(1);
    }
}

/// Record an event consumed without contributing to state.
///
/// - `strata.processor.quarantined_total` – counter
#[inline]
pub fn record_quarantine(count: u64) {
    #[cfg(feature = "observe")]
    {
        metrics::counter!("strata.processor.quarantined_total").increment(count);
    }
    #[cfg(not(feature = "observe"))]
    {
        let _ = count;
    }
}
