//! Strata Engine: drains sharded event logs into derived state
//!
//! The engine turns per-entity event logs into queryable state exactly once
//! in effect, under concurrent writers, bursty traffic, out-of-order delivery
//! and lost notifications.
//!
//! Components, leaves first:
//! - [`pager::CursorPager`] - resumable pagination over an ordered query
//! - [`writer::ChunkedWriter`] - mutations committed in atomic chunks
//! - [`debouncer::Debouncer`] - per-shard trigger throttling
//! - [`processor`] - unordered and canonically ordered shard processors
//! - [`sweeper`] - recovery sweeps for stale events and stale triggers
//!
//! [`Engine`] binds one processor to a store and exposes the entry points;
//! [`ProcessorRegistry`] routes notifications across engines and
//! [`EngineRuntime`] hosts them on tokio.
//!
//! # Example
//!
//! ```ignore
//! use strata_engine::prelude::*;
//!
//! let engine = Engine::new(config, store.clone(), BatchEventProcessor::new(Referrals))?;
//! engine.on_event_written(&event_path)?;
//! engine.sweep_stale_triggers()?;
//! ```

pub mod debouncer;
pub mod engine;
pub mod pager;
pub mod prelude;
pub mod processor;
pub mod registry;
pub mod runtime;
pub mod sweeper;
pub mod writer;

pub use debouncer::{Debouncer, TriggerDecision};
pub use engine::{Engine, EngineStatus, TriggerOutcome};
pub use pager::{CursorExtractor, CursorPager};
pub use processor::{
    BatchEventProcessor, BatchProjection, EventQueries, OrderedEventProcessor, OrderedProjection,
    ProcessContext, ProcessReport, ShardProcessor,
};
pub use registry::{ProcessorRegistry, ShardWorkflow};
pub use runtime::{EngineRuntime, RuntimeHandle, RuntimeStats};
pub use sweeper::{SweepKind, SweepReport};
pub use writer::{ChunkedWriter, StoreSink, TxnSink, WriteSink, WriterStats};
