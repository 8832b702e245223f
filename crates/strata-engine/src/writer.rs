//! Chunked Atomic Writer
//!
//! Buffers write operations and commits them in chunks no larger than the
//! sink's atomic limit. Each chunk commits independently: a failure leaves
//! earlier chunks in effect, so callers must keep every chunk idempotent.
//!
//! # Example
//!
//! ```ignore
//! let mut writer = ChunkedWriter::new(StoreSink::new(&store));
//! for event in events {
//!     writer.upsert(event.path, event.body)?;
//! }
//! let stats = writer.finish()?;
//! ```

use serde_json::Value;
use std::future::Future;
use strata_core::{DocPath, DocumentStore, Result, StoreTxn, WriteOp, MAX_BATCH_WRITES};

/// Destination of committed chunks.
pub trait WriteSink {
    /// Largest chunk the sink accepts atomically.
    fn max_chunk(&self) -> usize;

    fn commit_chunk(&mut self, ops: Vec<WriteOp>) -> Result<()>;
}

/// Commits each chunk as one atomic store batch.
pub struct StoreSink<'s, S: DocumentStore> {
    store: &'s S,
}

impl<'s, S: DocumentStore> StoreSink<'s, S> {
    pub fn new(store: &'s S) -> Self {
        Self { store }
    }
}

impl<'s, S: DocumentStore> WriteSink for StoreSink<'s, S> {
    fn max_chunk(&self) -> usize {
        self.store.max_batch_writes()
    }

    fn commit_chunk(&mut self, ops: Vec<WriteOp>) -> Result<()> {
        self.store.commit_batch(ops).map(|_| ())
    }
}

/// Buffers each chunk into an open transaction.
///
/// Everything becomes visible together when the transaction commits.
pub struct TxnSink<'t, T: StoreTxn> {
    txn: &'t mut T,
}

impl<'t, T: StoreTxn> TxnSink<'t, T> {
    pub fn new(txn: &'t mut T) -> Self {
        Self { txn }
    }
}

impl<'t, T: StoreTxn> WriteSink for TxnSink<'t, T> {
    fn max_chunk(&self) -> usize {
        MAX_BATCH_WRITES
    }

    fn commit_chunk(&mut self, ops: Vec<WriteOp>) -> Result<()> {
        for op in ops {
            self.txn.write(op)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Operations in successfully committed chunks
    pub ops: usize,
    /// Successfully committed chunks
    pub chunks: usize,
    /// Chunks whose commit failed
    pub failed_chunks: usize,
}

pub struct ChunkedWriter<K: WriteSink> {
    sink: K,
    chunk_size: usize,
    buffer: Vec<WriteOp>,
    stats: WriterStats,
}

impl<K: WriteSink> ChunkedWriter<K> {
    pub fn new(sink: K) -> Self {
        let chunk_size = sink.max_chunk().max(1);
        Self {
            sink,
            chunk_size,
            buffer: Vec::with_capacity(chunk_size),
            stats: WriterStats::default(),
        }
    }

    /// Use smaller chunks than the sink allows.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, self.sink.max_chunk().max(1));
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Operations buffered but not yet committed.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn stats(&self) -> WriterStats {
        self.stats
    }

    /// Buffer an operation, committing the chunk once it is full.
    pub fn push(&mut self, op: WriteOp) -> Result<()> {
        self.buffer.push(op);
        if self.buffer.len() >= self.chunk_size {
            self.commit_buffer()?;
        }
        Ok(())
    }

    pub fn upsert(&mut self, path: DocPath, data: Value) -> Result<()> {
        self.push(WriteOp::upsert(path, data))
    }

    pub fn update(&mut self, path: DocPath, fields: Vec<(String, Value)>) -> Result<()> {
        self.push(WriteOp::Update { path, fields })
    }

    pub fn delete(&mut self, path: DocPath) -> Result<()> {
        self.push(WriteOp::delete(path))
    }

    /// Buffer the operation produced by `produce`, if any.
    pub fn push_with<F>(&mut self, produce: F) -> Result<()>
    where
        F: FnOnce() -> Result<Option<WriteOp>>,
    {
        match produce()? {
            Some(op) => self.push(op),
            None => Ok(()),
        }
    }

    /// Await an asynchronous producer and buffer its operation.
    ///
    /// Submission order is preserved: the operation lands after everything
    /// pushed before this call.
    pub async fn push_async<Fut>(&mut self, producer: Fut) -> Result<()>
    where
        Fut: Future<Output = Result<Option<WriteOp>>>,
    {
        match producer.await? {
            Some(op) => self.push(op),
            None => Ok(()),
        }
    }

    /// Commit whatever is buffered.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        self.commit_buffer()
    }

    /// Flush and report totals.
    pub fn finish(mut self) -> Result<WriterStats> {
        self.flush()?;
        Ok(self.stats)
    }

    fn commit_buffer(&mut self) -> Result<()> {
        let ops = std::mem::replace(&mut self.buffer, Vec::with_capacity(self.chunk_size));
        let count = ops.len();
        match self.sink.commit_chunk(ops) {
            Ok(()) => {
                self.stats.ops += count;
                self.stats.chunks += 1;
                Ok(())
            }
            Err(e) => {
                self.stats.failed_chunks += 1;
                tracing::warn!(
                    ops = count,
                    committed_chunks = self.stats.chunks,
                    error = %e,
                    "Chunk commit failed"
                );
                Err(e)
            }
        }
    }
}

impl<K: WriteSink> Drop for ChunkedWriter<K> {
    fn drop(&mut self) {
        if !self.buffer.is_empty() {
            tracing::warn!(ops = self.buffer.len(), "Dropping writer with unflushed operations");
        }
    }
}
