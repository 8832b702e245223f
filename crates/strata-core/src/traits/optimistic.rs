//! Bookkeeping shared by optimistic store backends
//!
//! A backend transaction owns an [`OptimisticState`] and hands it closures
//! that read committed state. The state records what was observed so the
//! backend can revalidate it under its commit lock, and keeps an overlay of
//! buffered writes so the transaction reads its own writes.

use super::store::WriteOp;
use crate::error::{Result, StrataError};
use crate::query::Query;
use crate::types::{DocPath, Document};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Version recorded for a document observed as absent.
const ABSENT: u64 = 0;

#[derive(Debug, Default)]
pub struct OptimisticState {
    reads: HashMap<DocPath, u64>,
    queries: Vec<(Query, Vec<(DocPath, u64)>)>,
    writes: Vec<WriteOp>,
    overlay: BTreeMap<DocPath, Option<Value>>,
}

impl OptimisticState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Point read through the write overlay.
    pub fn read_through<F>(&mut self, path: &DocPath, fetch: F) -> Result<Option<Document>>
    where
        F: FnOnce(&DocPath) -> Result<Option<Document>>,
    {
        if let Some(buffered) = self.overlay.get(path) {
            let version = self.reads.get(path).copied().unwrap_or(ABSENT);
            return Ok(buffered
                .clone()
                .map(|data| Document::new(path.clone(), data, version)));
        }
        let committed = fetch(path)?;
        self.reads
            .entry(path.clone())
            .or_insert_with(|| committed.as_ref().map_or(ABSENT, |d| d.version));
        Ok(committed)
    }

    /// Run `query` against committed state merged with buffered writes.
    pub fn query_through<F>(&mut self, query: &Query, mut fetch: F) -> Result<Vec<Document>>
    where
        F: FnMut(&Query) -> Result<Vec<Document>>,
    {
        let touched = self.overlay.keys().filter(|p| query.scope.contains(p)).count();
        if touched == 0 {
            let docs = fetch(query)?;
            self.queries.push((query.clone(), fingerprint(&docs)));
            return Ok(docs);
        }

        // Each buffered write can push at most one committed document out of
        // the window, so `limit + touched` committed rows always cover it.
        let mut widened = query.clone();
        widened.limit = query.limit.map(|limit| limit.saturating_add(touched));
        let committed = fetch(&widened)?;
        self.queries.push((widened, fingerprint(&committed)));

        let mut merged: Vec<Document> = committed
            .into_iter()
            .filter(|doc| !self.overlay.contains_key(&doc.path))
            .collect();
        for (path, buffered) in &self.overlay {
            if let Some(data) = buffered {
                let version = self.reads.get(path).copied().unwrap_or(ABSENT);
                merged.push(Document::new(path.clone(), data.clone(), version));
            }
        }
        Ok(query.evaluate(merged))
    }

    /// Buffer `op` and fold it into the overlay.
    ///
    /// `fetch` supplies the committed body when the path has no buffered
    /// state yet. Blind writes are not recorded as reads.
    pub fn write_through<F>(&mut self, op: WriteOp, fetch: F) -> Result<()>
    where
        F: FnOnce(&DocPath) -> Result<Option<Document>>,
    {
        let path = op.path().clone();
        let current = match self.overlay.get(&path) {
            Some(buffered) => buffered.clone(),
            None => fetch(&path)?.map(|doc| doc.data),
        };
        let next = op.apply(current.as_ref())?;
        self.overlay.insert(path, next);
        self.writes.push(op);
        Ok(())
    }

    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Check every recorded read against committed state.
    ///
    /// Must run under the backend's commit lock, before any write applies.
    pub fn validate<G, Q>(&self, mut get: G, mut query: Q) -> Result<()>
    where
        G: FnMut(&DocPath) -> Result<Option<Document>>,
        Q: FnMut(&Query) -> Result<Vec<Document>>,
    {
        for (path, version) in &self.reads {
            let current = get(path)?.map_or(ABSENT, |d| d.version);
            if current != *version {
                return Err(StrataError::Conflict(format!(
                    "'{}' changed since it was read (version {} -> {})",
                    path, version, current
                )));
            }
        }
        for (q, observed) in &self.queries {
            let current = fingerprint(&query(q)?);
            if &current != observed {
                return Err(StrataError::Conflict(format!(
                    "result set of query over {:?} changed",
                    q.scope
                )));
            }
        }
        Ok(())
    }

    pub fn into_writes(self) -> Vec<WriteOp> {
        self.writes
    }
}

fn fingerprint(docs: &[Document]) -> Vec<(DocPath, u64)> {
    docs.iter().map(|d| (d.path.clone(), d.version)).collect()
}

/// Fold `ops` in order into final document bodies.
///
/// `fetch` supplies the committed body of each path on first touch.
/// `None` in the result means the document is deleted.
pub fn resolve_writes<F>(ops: &[WriteOp], mut fetch: F) -> Result<BTreeMap<DocPath, Option<Value>>>
where
    F: FnMut(&DocPath) -> Result<Option<Value>>,
{
    let mut resolved: BTreeMap<DocPath, Option<Value>> = BTreeMap::new();
    for op in ops {
        let path = op.path();
        let current = match resolved.get(path) {
            Some(state) => state.clone(),
            None => fetch(path)?,
        };
        let next = op.apply(current.as_ref())?;
        resolved.insert(path.clone(), next);
    }
    Ok(resolved)
}
