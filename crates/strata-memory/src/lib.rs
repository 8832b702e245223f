//! In-memory document store
//!
//! A [`DocumentStore`](strata_core::DocumentStore) held entirely in process
//! memory. Commits are validated and applied under a single write lock, which
//! gives the same optimistic conflict behaviour as the durable backend.
//!
//! Used as the default backend for tests and for short-lived runs.

pub mod store;
pub mod txn;

pub use store::MemoryStore;
pub use txn::MemoryTxn;
