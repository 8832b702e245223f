//! Shard processors
//!
//! A processor drains one shard's unprocessed events inside the shard's
//! transaction. Two flavours exist:
//! - [`BatchEventProcessor`] hands every page of newly ready events to a
//!   reducer; use it when only the set of events matters.
//! - [`OrderedEventProcessor`] reconciles against the canonical order so the
//!   derived state always reflects the latest valid event.
//!
//! Projections supply their behaviour through [`BatchProjection`] or
//! [`OrderedProjection`]; the event query hooks shared by both live on
//! [`EventQueries`] and can be overridden per projection.

pub mod batch;
pub mod ordered;

pub use batch::{BatchEventProcessor, BatchProjection};
pub use ordered::{OrderedEventProcessor, OrderedProjection};

use crate::pager::{default_extractor, CursorExtractor};
use crate::writer::{ChunkedWriter, TxnSink};
use serde::de::DeserializeOwned;
use serde_json::Value;
use strata_core::types::{PROCESSED_FIELD, QUARANTINED_FIELD, UPDATED_AT_FIELD};
use strata_core::{
    DecodedEvent, Direction, DocPath, Document, FilterOp, PathTemplate, ProcessorConfig, Query,
    Result, ShardKey, StoreTxn, StrataError, TriggerState, WriteOp,
};

/// Query hooks over a shard's event log
pub trait EventQueries {
    fn is_event_processed(&self, event: &Document) -> bool {
        event
            .field(PROCESSED_FIELD)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Every unprocessed event in `collection`.
    fn unprocessed_query(&self, collection: &str) -> Query {
        Query::collection(collection).filter(PROCESSED_FIELD, FilterOp::Eq, false)
    }

    /// Unprocessed events updated at or before `before`, in a stable order
    /// suitable for pagination, with the matching cursor extractor.
    fn cursor_query(&self, collection: &str, before: i64) -> (Query, CursorExtractor) {
        let query = self
            .unprocessed_query(collection)
            .filter(UPDATED_AT_FIELD, FilterOp::Le, before)
            .order_by(UPDATED_AT_FIELD, Direction::Asc);
        let extractor = default_extractor(&query);
        (query, extractor)
    }
}

/// Inputs of one processing invocation
#[derive(Debug, Clone, Copy)]
pub struct ProcessContext<'a> {
    pub config: &'a ProcessorConfig,
    pub template: &'a PathTemplate,
    pub shard: &'a ShardKey,
    /// Invocation time (epoch millis)
    pub now: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessReport {
    /// Pages fetched
    pub pages: usize,
    /// Events marked processed, quarantined ones included
    pub events: usize,
    /// Malformed events consumed without contributing
    pub quarantined: usize,
    /// Derived-state writes made by the projection
    pub applied: usize,
    /// Unprocessed events may remain after the page budget ran out
    pub has_more: bool,
}

impl ProcessReport {
    pub fn is_empty(&self) -> bool {
        self.events == 0
    }
}

/// Drains a shard inside its transaction
///
/// Implementations must leave no partial effect on error: the caller discards
/// the transaction.
pub trait ShardProcessor: Send + Sync {
    fn name(&self) -> &str;

    fn process<T: StoreTxn>(
        &self,
        txn: &mut T,
        ctx: &ProcessContext<'_>,
        trigger: &mut TriggerState,
    ) -> Result<ProcessReport>;
}

/// A page split into decodable events and malformed documents.
pub(crate) struct DecodedPage<D> {
    pub events: Vec<DecodedEvent<D>>,
    pub malformed: Vec<(DocPath, String)>,
}

pub(crate) fn decode_page<D, Q>(queries: &Q, page: Vec<Document>) -> DecodedPage<D>
where
    D: DeserializeOwned,
    Q: EventQueries + ?Sized,
{
    let mut decoded = DecodedPage {
        events: Vec::with_capacity(page.len()),
        malformed: Vec::new(),
    };
    for doc in page {
        // Another run may have consumed it since the page was read.
        if queries.is_event_processed(&doc) {
            continue;
        }
        match DecodedEvent::from_document(&doc) {
            Ok(event) => decoded.events.push(event),
            Err(StrataError::MalformedEvent { reason, .. }) => {
                tracing::warn!(event = %doc.path, reason = %reason, "Quarantining malformed event");
                decoded.malformed.push((doc.path, reason));
            }
            Err(e) => {
                tracing::warn!(event = %doc.path, error = %e, "Quarantining undecodable event");
                decoded.malformed.push((doc.path, e.to_string()));
            }
        }
    }
    decoded
}

pub(crate) fn processed_op(path: DocPath, now: i64) -> WriteOp {
    WriteOp::update(
        path,
        [
            (PROCESSED_FIELD, Value::Bool(true)),
            (UPDATED_AT_FIELD, Value::from(now)),
        ],
    )
}

pub(crate) fn quarantine_op(path: DocPath, reason: String, now: i64) -> WriteOp {
    WriteOp::update(
        path,
        [
            (PROCESSED_FIELD, Value::Bool(true)),
            (UPDATED_AT_FIELD, Value::from(now)),
            (QUARANTINED_FIELD, Value::String(reason)),
        ],
    )
}

/// Mark a page consumed inside the transaction. Returns how many events
/// were marked.
pub(crate) fn mark_consumed<T, I>(
    txn: &mut T,
    consumed: I,
    malformed: Vec<(DocPath, String)>,
    now: i64,
) -> Result<usize>
where
    T: StoreTxn,
    I: IntoIterator<Item = DocPath>,
{
    let mut writer = ChunkedWriter::new(TxnSink::new(txn));
    for path in consumed {
        writer.push(processed_op(path, now))?;
    }
    for (path, reason) in malformed {
        writer.push(quarantine_op(path, reason, now))?;
    }
    Ok(writer.finish()?.ops)
}
