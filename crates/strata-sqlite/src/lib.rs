//! SQLite-backed document store
//!
//! Durable implementation of [`DocumentStore`](strata_core::DocumentStore).
//!
//! Key features:
//! - JSON documents in a single table, indexed by parent collection and by
//!   the `processed`/`updatedAt` event metadata
//! - Filters, ordering, cursors and limits translated to SQL where exact
//! - A global commit sequence used as the document version
//! - WAL mode for better concurrency
//! - Optimistic transactions validated inside `BEGIN IMMEDIATE`

mod plan;
pub mod schema;
pub mod store;
pub mod txn;

pub use store::SqliteStore;
pub use txn::SqliteTxn;
