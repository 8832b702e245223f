use crate::txn::MemoryTxn;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::ops::Bound;
use strata_core::{
    resolve_writes, CommitInfo, Cursor, DocPath, Document, DocumentStore, OptimisticState, Query,
    QueryScope, Result, StoreConfig, StrataError, WriteOp, MAX_BATCH_WRITES,
};

#[derive(Debug, Clone)]
struct StoredDoc {
    data: Value,
    version: u64,
}

#[derive(Debug, Default)]
struct Inner {
    docs: BTreeMap<DocPath, StoredDoc>,
    /// Last assigned commit sequence
    sequence: u64,
}

impl Inner {
    fn get(&self, path: &DocPath) -> Option<Document> {
        self.docs
            .get(path)
            .map(|d| Document::new(path.clone(), d.data.clone(), d.version))
    }

    /// Filter by reference and clone only the documents on the page.
    fn query(&self, query: &Query) -> Vec<Document> {
        let prefix = match &query.scope {
            QueryScope::Collection(collection) => format!("{}/", collection),
            QueryScope::Template(template) => template.literal_prefix(),
        };
        let mut matched: Vec<(Cursor, &DocPath, &StoredDoc)> = self
            .docs
            .range::<str, _>((Bound::Included(prefix.as_str()), Bound::Unbounded))
            .take_while(|(path, _)| path.as_str().starts_with(&prefix))
            .filter(|(path, d)| {
                query.scope.contains(path) && query.filters.iter().all(|f| f.matches(&d.data))
            })
            .map(|(path, d)| (query.position(path, &d.data), path, d))
            .filter(|(position, _, _)| query.is_after_start(position))
            .collect();

        let by_position = |a: &(Cursor, &DocPath, &StoredDoc), b: &(Cursor, &DocPath, &StoredDoc)| {
            query.compare_positions(&a.0, &b.0)
        };
        if let Some(limit) = query.limit {
            if matched.len() > limit {
                matched.select_nth_unstable_by(limit, by_position);
                matched.truncate(limit);
            }
        }
        matched.sort_by(by_position);
        matched
            .into_iter()
            .map(|(_, path, d)| Document::new(path.clone(), d.data.clone(), d.version))
            .collect()
    }

    fn apply(&mut self, ops: &[WriteOp]) -> Result<CommitInfo> {
        let resolved = resolve_writes(ops, |path| Ok(self.docs.get(path).map(|d| d.data.clone())))?;
        let version = self.sequence + 1;
        for (path, data) in resolved {
            match data {
                Some(data) => {
                    self.docs.insert(path, StoredDoc { data, version });
                }
                None => {
                    self.docs.remove(&path);
                }
            }
        }
        self.sequence = version;
        Ok(CommitInfo {
            writes: ops.len(),
            version,
        })
    }
}

/// In-memory document store
pub struct MemoryStore {
    inner: RwLock<Inner>,
    max_txn_attempts: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_config(&StoreConfig::memory())
    }

    pub fn with_config(config: &StoreConfig) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_txn_attempts: config.max_txn_attempts,
        }
    }

    /// Number of stored documents
    pub fn len(&self) -> usize {
        self.inner.read().docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Last assigned commit sequence
    pub fn sequence(&self) -> u64 {
        self.inner.read().sequence
    }

    /// Validate a transaction's reads and apply its writes atomically.
    pub(crate) fn commit_txn(&self, state: OptimisticState) -> Result<CommitInfo> {
        let mut inner = self.inner.write();
        {
            let view = &*inner;
            state.validate(|path| Ok(view.get(path)), |query| Ok(view.query(query)))?;
        }
        let ops = state.into_writes();
        if ops.is_empty() {
            return Ok(CommitInfo {
                writes: 0,
                version: inner.sequence,
            });
        }
        inner.apply(&ops)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    type Txn<'a> = MemoryTxn<'a>;

    fn begin(&self) -> Result<Self::Txn<'_>> {
        Ok(MemoryTxn::new(self))
    }

    fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        Ok(self.inner.read().get(path))
    }

    fn query(&self, query: &Query) -> Result<Vec<Document>> {
        Ok(self.inner.read().query(query))
    }

    fn commit_batch(&self, ops: Vec<WriteOp>) -> Result<CommitInfo> {
        if ops.len() > MAX_BATCH_WRITES {
            return Err(StrataError::BatchTooLarge {
                size: ops.len(),
                max: MAX_BATCH_WRITES,
            });
        }
        let info = self.inner.write().apply(&ops)?;
        tracing::trace!(writes = info.writes, version = info.version, "Committed batch");
        Ok(info)
    }

    fn max_txn_attempts(&self) -> usize {
        self.max_txn_attempts
    }
}
