//! Shared fixtures for engine integration tests
#![allow(dead_code)]

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use strata_core::{
    DecodedEvent, DocPath, DocumentStore, Event, ManualClock, ProcessorConfig, Result, ShardKey,
    StoreTxn, StrataError, WriteOp,
};
use strata_engine::{
    BatchEventProcessor, BatchProjection, Engine, EventQueries, OrderedEventProcessor,
    OrderedProjection,
};
use strata_memory::MemoryStore;

pub const COUNTER_TEMPLATE: &str = "counters/{code}/events";
pub const OWNER_TEMPLATE: &str = "tokens/{tokenId}/transfers";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Count {
    pub count: i64,
}

/// Sums `count` into the shard's `total`.
#[derive(Default)]
pub struct Counter {
    pub reduce_calls: AtomicUsize,
    pub fail: bool,
}

impl Counter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

impl EventQueries for Counter {}

impl BatchProjection for Counter {
    type Data = Count;

    fn name(&self) -> &str {
        "counter"
    }

    fn reduce<T: StoreTxn>(
        &self,
        txn: &mut T,
        shard: &ShardKey,
        events: &[DecodedEvent<Count>],
        _now: i64,
    ) -> Result<()> {
        self.reduce_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StrataError::Projection("counter reducer failed".into()));
        }
        let target = shard
            .target_path()
            .ok_or_else(|| StrataError::InvalidPath(shard.to_string()))?;
        let current = txn
            .get(&target)?
            .and_then(|doc| doc.field("total").and_then(Value::as_i64))
            .unwrap_or(0);
        let sum: i64 = events.iter().map(|e| e.data.count).sum();
        txn.upsert(target, json!({ "total": current + sum }))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub from: String,
    pub to: String,
}

/// Current owner from the canonically latest valid transfer.
pub struct Owner;

impl EventQueries for Owner {}

impl OrderedProjection for Owner {
    type Data = Transfer;

    fn name(&self) -> &str {
        "owner"
    }

    fn canonical_fields(&self) -> &[&'static str] {
        &["metadata.blockNumber", "metadata.logIndex"]
    }

    fn apply<T: StoreTxn>(
        &self,
        txn: &mut T,
        shard: &ShardKey,
        latest: &DecodedEvent<Transfer>,
        _now: i64,
    ) -> Result<()> {
        let target = shard
            .target_path()
            .ok_or_else(|| StrataError::InvalidPath(shard.to_string()))?;
        txn.upsert(
            target,
            json!({
                "owner": latest.data.to,
                "ownershipBlock": latest.metadata.get("blockNumber").cloned().unwrap_or(Value::Null),
            }),
        )
    }
}

pub type CounterEngine = Engine<MemoryStore, BatchEventProcessor<Counter>>;
pub type OwnerEngine = Engine<MemoryStore, OrderedEventProcessor<Owner>>;

pub fn counter_engine(
    store: &Arc<MemoryStore>,
    clock: &Arc<ManualClock>,
    config: ProcessorConfig,
    counter: Counter,
) -> CounterEngine {
    Engine::new(config, store.clone(), BatchEventProcessor::new(counter))
        .unwrap()
        .with_clock(clock.clone())
}

pub fn owner_engine(store: &Arc<MemoryStore>, clock: &Arc<ManualClock>) -> OwnerEngine {
    let config = ProcessorConfig::new("owner", OWNER_TEMPLATE)
        .with_min_trigger_interval_ms(5)
        .with_batch_size(10);
    Engine::new(config, store.clone(), OrderedEventProcessor::new(Owner))
        .unwrap()
        .with_clock(clock.clone())
}

/// Write a count event without notifying anyone.
pub fn write_count<S: DocumentStore>(
    store: &S,
    code: &str,
    id: &str,
    count: i64,
    timestamp: i64,
) -> DocPath {
    let path = DocPath::parse(format!("counters/{}/events/{}", code, id)).unwrap();
    let body = Event::new(id, Count { count }, timestamp).to_value().unwrap();
    store
        .commit_batch(vec![WriteOp::upsert(path.clone(), body)])
        .unwrap();
    path
}

/// Write a transfer log at canonical position `(block, log_index)`.
pub fn write_transfer<S: DocumentStore>(
    store: &S,
    token: &str,
    block: i64,
    log_index: i64,
    to: &str,
    removed: bool,
    timestamp: i64,
) -> DocPath {
    let id = format!("{}-{}{}", block, log_index, if removed { "-removed" } else { "" });
    let path = DocPath::parse(format!("tokens/{}/transfers/{}", token, id)).unwrap();
    let body = Event::new(
        id,
        Transfer {
            from: "0xfrom".into(),
            to: to.into(),
        },
        timestamp,
    )
    .with_meta("blockNumber", block)
    .with_meta("logIndex", log_index)
    .with_meta("removed", removed)
    .to_value()
    .unwrap();
    store
        .commit_batch(vec![WriteOp::upsert(path.clone(), body)])
        .unwrap();
    path
}

pub fn is_processed<S: DocumentStore>(store: &S, path: &DocPath) -> bool {
    store
        .get(path)
        .unwrap()
        .and_then(|doc| doc.field("metadata.processed").and_then(Value::as_bool))
        .unwrap_or(false)
}

pub fn field<S: DocumentStore>(store: &S, path: &str, field: &str) -> Option<Value> {
    store
        .get(&DocPath::parse(path).unwrap())
        .unwrap()
        .and_then(|doc| doc.field(field).cloned())
}
