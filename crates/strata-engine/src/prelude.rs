//! Convenience re-exports for projection and host code
//!
//! ```ignore
//! use strata_engine::prelude::*;
//! ```

pub use crate::{
    BatchEventProcessor, BatchProjection, ChunkedWriter, CursorPager, Engine, EngineRuntime,
    EventQueries, OrderedEventProcessor, OrderedProjection, ProcessReport, ProcessorRegistry,
    ShardWorkflow, StoreSink, SweepReport, TriggerOutcome, TxnSink,
};
pub use strata_core::{
    Clock, DecodedEvent, Direction, DocPath, Document, DocumentStore, Event, FilterOp, ManualClock,
    ProcessorConfig, Query, Result, RuntimeConfig, Schedule, ShardKey, StoreTxn, StrataError,
    SweepConfig, SystemClock, WriteOp,
};
