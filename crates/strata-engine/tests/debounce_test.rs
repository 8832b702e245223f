//! Debounce behaviour of the write-notification entry point

mod common;

use common::*;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use strata_core::{ManualClock, ProcessorConfig, TriggerPhase};
use strata_engine::TriggerOutcome;
use strata_memory::MemoryStore;

#[test]
fn test_burst_processes_once_then_sweep_drains() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let config = ProcessorConfig::new("counter", COUNTER_TEMPLATE).with_min_trigger_interval_ms(5);
    let engine = counter_engine(&store, &clock, config, Counter::default());

    // t=0: first write runs immediately.
    let first = write_count(store.as_ref(), "abc", "e1", 1, 0);
    assert!(engine.on_event_written(&first).unwrap().is_processed());

    // t=2: second write is debounced.
    clock.set(2);
    let second = write_count(store.as_ref(), "abc", "e2", 1, 2);
    assert_eq!(
        engine.on_event_written(&second).unwrap(),
        TriggerOutcome::Deferred {
            already_pending: false
        }
    );
    assert_eq!(
        engine.processor().projection().reduce_calls.load(Ordering::SeqCst),
        1
    );

    let shard = engine.shard_for(&second).unwrap();
    let state = engine.trigger_state(&shard).unwrap().unwrap();
    assert_eq!(state.phase(), TriggerPhase::Pending);
    assert_eq!(state.last_run_at, 0);
    assert!(!is_processed(store.as_ref(), &second));

    // Still inside the window: the sweep leaves it alone.
    clock.set(4);
    assert_eq!(engine.sweep_stale_triggers().unwrap().shards, 0);

    // t=5: the stale-trigger sweep resumes the shard.
    clock.set(5);
    let report = engine.sweep_stale_triggers().unwrap();
    assert_eq!(report.shards, 1);
    assert_eq!(report.processed, 1);
    assert!(is_processed(store.as_ref(), &second));
    assert_eq!(
        engine.trigger_state(&shard).unwrap().unwrap().phase(),
        TriggerPhase::Idle
    );
    assert_eq!(
        engine.processor().projection().reduce_calls.load(Ordering::SeqCst),
        2
    );
}

#[test]
fn test_repeated_deferral_is_idempotent() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let config = ProcessorConfig::new("counter", COUNTER_TEMPLATE).with_min_trigger_interval_ms(5);
    let engine = counter_engine(&store, &clock, config, Counter::default());

    let first = write_count(store.as_ref(), "abc", "e1", 1, 0);
    engine.on_event_written(&first).unwrap();

    clock.set(1);
    let second = write_count(store.as_ref(), "abc", "e2", 1, 1);
    engine.on_event_written(&second).unwrap();
    let sequence = store.sequence();

    clock.set(2);
    assert_eq!(
        engine.on_event_written(&second).unwrap(),
        TriggerOutcome::Deferred {
            already_pending: true
        }
    );
    // Nothing was written for the second deferral.
    assert_eq!(store.sequence(), sequence);
}

#[test]
fn test_notification_after_window_processes_directly() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(0));
    let config = ProcessorConfig::new("counter", COUNTER_TEMPLATE).with_min_trigger_interval_ms(5);
    let engine = counter_engine(&store, &clock, config, Counter::default());

    let first = write_count(store.as_ref(), "abc", "e1", 1, 0);
    engine.on_event_written(&first).unwrap();
    clock.set(2);
    let second = write_count(store.as_ref(), "abc", "e2", 1, 2);
    engine.on_event_written(&second).unwrap();

    clock.set(7);
    let third = write_count(store.as_ref(), "abc", "e3", 1, 7);
    match engine.on_event_written(&third).unwrap() {
        TriggerOutcome::Processed(report) => assert_eq!(report.events, 2),
        other => panic!("expected processing, got {:?}", other),
    }
    let shard = engine.shard_for(&third).unwrap();
    let state = engine.trigger_state(&shard).unwrap().unwrap();
    assert_eq!(state.last_run_at, 7);
    assert!(!state.pending);
}
