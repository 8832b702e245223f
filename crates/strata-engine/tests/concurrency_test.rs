//! Concurrent triggers racing on the same shards
//!
//! Processing of one shard commits at most once per batch of events: every
//! event that ends up marked processed is counted exactly once.

mod common;

use common::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use strata_core::{DocPath, ManualClock, ProcessorConfig, ShardKey};
use strata_engine::TriggerOutcome;
use strata_memory::MemoryStore;

const THREADS: usize = 8;

fn config() -> ProcessorConfig {
    ProcessorConfig::new("counter", COUNTER_TEMPLATE)
        .with_min_trigger_interval_ms(0)
        .with_batch_size(3)
}

/// Process until the shard reports nothing left.
fn drain(engine: &CounterEngine, shard: &ShardKey) -> usize {
    let mut events = 0;
    loop {
        let report = engine.process_shard(shard).unwrap();
        events += report.events;
        if !report.has_more {
            return events;
        }
    }
}

/// Many threads write and trigger one accumulating shard at once
#[test]
fn test_same_shard_counts_each_event_once() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1_000));
    let engine = Arc::new(counter_engine(&store, &clock, config(), Counter::default()));
    let shard = engine
        .shard_for(&DocPath::parse("counters/hot/events/seed").unwrap())
        .unwrap();

    let rounds = 5;
    let events_per_thread = 6;
    let processed = Arc::new(AtomicUsize::new(0));
    let conflicts = Arc::new(AtomicUsize::new(0));

    for round in 0..rounds {
        let barrier = Arc::new(Barrier::new(THREADS));
        let handles: Vec<_> = (0..THREADS)
            .map(|thread_id| {
                let store = Arc::clone(&store);
                let engine = Arc::clone(&engine);
                let barrier = Arc::clone(&barrier);
                let processed = Arc::clone(&processed);
                let conflicts = Arc::clone(&conflicts);

                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..events_per_thread {
                        let id = format!("r{}-t{}-e{}", round, thread_id, i);
                        let path = write_count(store.as_ref(), "hot", &id, 1, 500);
                        match engine.on_event_written(&path) {
                            Ok(TriggerOutcome::Processed(report)) => {
                                processed.fetch_add(report.events, Ordering::SeqCst);
                            }
                            Ok(TriggerOutcome::Deferred { .. }) => {}
                            // Losing every retry to another thread is allowed;
                            // nothing from that attempt was committed.
                            Err(e) => {
                                assert!(e.is_retryable(), "unexpected error: {}", e);
                                conflicts.fetch_add(1, Ordering::SeqCst);
                            }
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        processed.fetch_add(drain(&engine, &shard), Ordering::SeqCst);
        let written = (round + 1) * THREADS * events_per_thread;
        assert_eq!(
            processed.load(Ordering::SeqCst),
            written,
            "round {}: processed count drifted from events written",
            round
        );
        assert_eq!(
            field(store.as_ref(), "counters/hot", "total"),
            Some(json!(written)),
            "round {}: total double-counted or lost events",
            round
        );
    }

    println!(
        "Same-shard race: {} events, {} conflicted triggers",
        processed.load(Ordering::SeqCst),
        conflicts.load(Ordering::SeqCst)
    );
}

/// Threads on different shards never see each other's events
#[test]
fn test_parallel_shards_stay_isolated() {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(1_000));
    let engine = Arc::new(counter_engine(&store, &clock, config(), Counter::default()));
    let events_per_thread = 10;
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|thread_id| {
            let store = Arc::clone(&store);
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);

            thread::spawn(move || {
                let code = format!("shard{}", thread_id);
                barrier.wait();
                for i in 0..events_per_thread {
                    let path = write_count(store.as_ref(), &code, &format!("e{}", i), 2, 500);
                    // Other shards commit concurrently; retries cover the overlap.
                    if let Err(e) = engine.on_event_written(&path) {
                        assert!(e.is_retryable(), "unexpected error: {}", e);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    for thread_id in 0..THREADS {
        let code = format!("shard{}", thread_id);
        let shard = engine
            .shard_for(&DocPath::parse(format!("counters/{}/events/e0", code)).unwrap())
            .unwrap();
        drain(&engine, &shard);
        assert_eq!(
            field(store.as_ref(), &format!("counters/{}", code), "total"),
            Some(json!(events_per_thread * 2)),
            "shard {} total",
            code
        );
    }
}
