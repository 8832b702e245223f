use crate::error::{Result, StrataError};
use crate::query::Query;
use crate::types::{set_field, DocPath, Document};
use serde_json::Value;

/// Maximum number of operations one atomic batch may carry.
pub const MAX_BATCH_WRITES: usize = 500;

/// A single buffered mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    /// Create the document, or merge `data`'s top-level fields into it.
    Upsert { path: DocPath, data: Value },
    /// Set dotted fields on an existing document.
    Update {
        path: DocPath,
        fields: Vec<(String, Value)>,
    },
    Delete { path: DocPath },
}

impl WriteOp {
    pub fn upsert(path: DocPath, data: Value) -> Self {
        WriteOp::Upsert { path, data }
    }

    pub fn update<I, K>(path: DocPath, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        WriteOp::Update {
            path,
            fields: fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn delete(path: DocPath) -> Self {
        WriteOp::Delete { path }
    }

    pub fn path(&self) -> &DocPath {
        match self {
            WriteOp::Upsert { path, .. } | WriteOp::Update { path, .. } | WriteOp::Delete { path } => {
                path
            }
        }
    }

    /// Compute the document body after this write.
    ///
    /// Returns `None` when the document no longer exists.
    pub fn apply(&self, current: Option<&Value>) -> Result<Option<Value>> {
        match self {
            WriteOp::Upsert { path, data } => {
                let incoming = data.as_object().ok_or_else(|| {
                    StrataError::Serialization(format!("document '{}' must be a JSON object", path))
                })?;
                let mut merged = current
                    .and_then(Value::as_object)
                    .cloned()
                    .unwrap_or_default();
                for (key, value) in incoming {
                    merged.insert(key.clone(), value.clone());
                }
                Ok(Some(Value::Object(merged)))
            }
            WriteOp::Update { path, fields } => {
                let mut doc = current
                    .cloned()
                    .ok_or_else(|| StrataError::NotFound(path.to_string()))?;
                for (field, value) in fields {
                    set_field(&mut doc, field, value.clone());
                }
                Ok(Some(doc))
            }
            WriteOp::Delete { .. } => Ok(None),
        }
    }
}

/// Summary of a committed transaction or batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommitInfo {
    /// Number of write operations applied
    pub writes: usize,
    /// Commit sequence assigned to the written documents
    pub version: u64,
}

/// Optimistic read-write transaction.
///
/// Reads observe committed state overlaid with this transaction's own
/// buffered writes. Commit fails with [`StrataError::Conflict`] if any
/// document or query result read by the transaction changed meanwhile.
///
/// Note: Not required to be Send, as some backends hold connection guards
pub trait StoreTxn {
    fn get(&mut self, path: &DocPath) -> Result<Option<Document>>;

    fn query(&mut self, query: &Query) -> Result<Vec<Document>>;

    /// Buffer a write; nothing is visible to others until commit.
    fn write(&mut self, op: WriteOp) -> Result<()>;

    fn upsert(&mut self, path: DocPath, data: Value) -> Result<()> {
        self.write(WriteOp::upsert(path, data))
    }

    fn update(&mut self, path: DocPath, fields: Vec<(String, Value)>) -> Result<()> {
        self.write(WriteOp::Update { path, fields })
    }

    fn delete(&mut self, path: DocPath) -> Result<()> {
        self.write(WriteOp::delete(path))
    }

    /// Number of buffered writes.
    fn pending_writes(&self) -> usize;

    fn commit(self) -> Result<CommitInfo>
    where
        Self: Sized;

    fn rollback(self)
    where
        Self: Sized;
}

/// Transactional document store
///
/// Provides:
/// - Point reads and scoped queries of committed state
/// - Bounded atomic batches
/// - Optimistic transactions with automatic retry on conflict
pub trait DocumentStore: Send + Sync {
    type Txn<'a>: StoreTxn
    where
        Self: 'a;

    /// Begin a read-write transaction
    fn begin(&self) -> Result<Self::Txn<'_>>;

    fn get(&self, path: &DocPath) -> Result<Option<Document>>;

    fn query(&self, query: &Query) -> Result<Vec<Document>>;

    /// Apply up to [`max_batch_writes`](Self::max_batch_writes) operations atomically
    fn commit_batch(&self, ops: Vec<WriteOp>) -> Result<CommitInfo>;

    fn max_batch_writes(&self) -> usize {
        MAX_BATCH_WRITES
    }

    /// Attempts [`run_transaction`](Self::run_transaction) makes before
    /// reporting a conflict
    fn max_txn_attempts(&self) -> usize;

    /// Run `f` inside a transaction, retrying on commit conflicts.
    ///
    /// An error returned by `f` discards the transaction without retry.
    fn run_transaction<'s, T, F>(&'s self, mut f: F) -> Result<T>
    where
        F: FnMut(&mut Self::Txn<'s>) -> Result<T>,
    {
        let attempts = self.max_txn_attempts().max(1);
        let mut attempt = 1;
        loop {
            let mut txn = self.begin()?;
            let value = match f(&mut txn) {
                Ok(value) => value,
                Err(e) => {
                    txn.rollback();
                    return Err(e);
                }
            };
            match txn.commit() {
                Ok(_) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    crate::observe::record_conflict();
                    tracing::debug!(attempt, error = %e, "Transaction conflict, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
