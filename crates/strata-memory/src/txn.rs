use crate::store::MemoryStore;
use strata_core::{
    CommitInfo, DocPath, Document, DocumentStore, OptimisticState, Query, Result, StoreTxn,
    WriteOp,
};

/// Optimistic transaction over a [`MemoryStore`]
///
/// Holds no lock until commit.
pub struct MemoryTxn<'a> {
    store: &'a MemoryStore,
    state: OptimisticState,
}

impl<'a> MemoryTxn<'a> {
    pub(crate) fn new(store: &'a MemoryStore) -> Self {
        Self {
            store,
            state: OptimisticState::new(),
        }
    }
}

impl<'a> StoreTxn for MemoryTxn<'a> {
    fn get(&mut self, path: &DocPath) -> Result<Option<Document>> {
        let store = self.store;
        self.state.read_through(path, |p| store.get(p))
    }

    fn query(&mut self, query: &Query) -> Result<Vec<Document>> {
        let store = self.store;
        self.state.query_through(query, |q| store.query(q))
    }

    fn write(&mut self, op: WriteOp) -> Result<()> {
        let store = self.store;
        self.state.write_through(op, |p| store.get(p))
    }

    fn pending_writes(&self) -> usize {
        self.state.pending_writes()
    }

    fn commit(self) -> Result<CommitInfo> {
        self.store.commit_txn(self.state)
    }

    fn rollback(self) {}
}
