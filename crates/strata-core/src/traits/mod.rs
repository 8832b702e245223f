pub mod optimistic;
pub mod store;

pub use optimistic::{resolve_writes, OptimisticState};
pub use store::{CommitInfo, DocumentStore, StoreTxn, WriteOp, MAX_BATCH_WRITES};
