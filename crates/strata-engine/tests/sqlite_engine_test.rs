//! End-to-end processing on the durable SQLite backend

mod common;

use common::*;
use serde_json::json;
use std::sync::Arc;
use strata_core::{ManualClock, ProcessorConfig, SweepConfig};
use strata_engine::{BatchEventProcessor, Engine, OrderedEventProcessor};
use strata_sqlite::SqliteStore;
use tempfile::TempDir;

fn open() -> (TempDir, Arc<SqliteStore>) {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(temp_dir.path().join("strata.db")).unwrap();
    (temp_dir, Arc::new(store))
}

#[test]
fn test_batch_sum_on_sqlite() {
    let (_dir, store) = open();
    let clock = Arc::new(ManualClock::new(0));
    let engine = Engine::new(
        ProcessorConfig::new("counter", COUNTER_TEMPLATE)
            .with_min_trigger_interval_ms(5)
            .with_batch_size(2),
        store.clone(),
        BatchEventProcessor::new(Counter::default()),
    )
    .unwrap()
    .with_clock(clock.clone());

    let mut last = None;
    for (i, count) in [1, 2, 3, 4, 5].iter().enumerate() {
        last = Some(write_count(store.as_ref(), "abc", &format!("e{}", i), *count, 0));
    }
    let outcome = engine.on_event_written(&last.unwrap()).unwrap();
    assert!(outcome.is_processed());

    assert_eq!(field(store.as_ref(), "counters/abc", "total"), Some(json!(15)));
    let status = engine.status().unwrap();
    assert_eq!(status.unprocessed_events, 0);
    assert!(status.pending_shards.is_empty());
}

#[test]
fn test_state_survives_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("strata.db");
    let clock = Arc::new(ManualClock::new(0));
    let config = ProcessorConfig::new("owner", OWNER_TEMPLATE).with_min_trigger_interval_ms(5);

    {
        let store = Arc::new(SqliteStore::open(&db_path).unwrap());
        let engine = Engine::new(config.clone(), store.clone(), OrderedEventProcessor::new(Owner))
            .unwrap()
            .with_clock(clock.clone());
        let path = write_transfer(store.as_ref(), "t1", 5, 2, "bob", false, 0);
        engine.on_event_written(&path).unwrap();
    }

    // The stored canonical key still guards against a late earlier log.
    let store = Arc::new(SqliteStore::open(&db_path).unwrap());
    let engine = Engine::new(config, store.clone(), OrderedEventProcessor::new(Owner))
        .unwrap()
        .with_clock(clock.clone())
        .with_sweep_config(SweepConfig::default().with_tts_ms(1));

    clock.set(10);
    let late = write_transfer(store.as_ref(), "t1", 5, 1, "alice", false, 10);
    let shard = engine.shard_for(&late).unwrap();
    let state = engine.trigger_state(&shard).unwrap().unwrap();
    assert_eq!(state.last_applied_key, Some(vec![json!(5), json!(2)]));

    // Delivered through the sweep this time.
    clock.set(20);
    let report = engine.sweep_stale_events().unwrap();
    assert_eq!(report.processed, 1);
    assert!(is_processed(store.as_ref(), &late));
    assert_eq!(field(store.as_ref(), "tokens/t1", "owner"), Some(json!("bob")));
}
