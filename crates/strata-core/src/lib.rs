//! Strata Core: traits and types for the sharded event-aggregation engine
//!
//! This crate defines the abstractions every other strata crate builds on:
//! - Documents, events and per-shard trigger state
//! - Typed shard keys parsed from storage path templates
//! - A small query model with a total order over JSON values
//! - The transactional document store contract (optimistic transactions,
//!   bounded atomic batches)
//! - Processor, sweep, store and runtime configuration
//!
//! Key properties the engine relies on:
//! - `processed` flags only ever move from `false` to `true`
//! - Mutual exclusion per shard is delegated to store transactions
//! - Every error is classified as retryable or terminal

pub mod clock;
pub mod config;
pub mod error;
pub mod observe;
pub mod query;
pub mod schedule;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ProcessorConfig, RuntimeConfig, StoreBackend, StoreConfig, SweepConfig};
pub use error::{ErrorKind, Result, StrataError};
pub use query::{
    compare_keys, compare_values, type_rank, Cursor, Direction, Filter, FilterOp, OrderBy, Query,
    QueryScope,
};
pub use schedule::Schedule;
pub use traits::{
    resolve_writes, CommitInfo, DocumentStore, OptimisticState, StoreTxn, WriteOp, MAX_BATCH_WRITES,
};
pub use types::{
    DecodedEvent, DocPath, Document, Event, EventMetadata, PathTemplate, ShardKey, TriggerPhase,
    TriggerState,
};
