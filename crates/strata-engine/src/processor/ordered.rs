//! Ordered Batch Event Processor
//!
//! Derived state is a function of the single latest valid event under the
//! projection's canonical order. Each page is sorted canonically and split
//! into valid and invalidated events. The page's own tail is only trusted
//! when it provably holds the shard's latest valid event; otherwise the
//! latest valid event is looked up explicitly. Every event in the page is
//! marked processed either way.

use super::{
    decode_page, mark_consumed, quarantine_op, EventQueries, ProcessContext, ProcessReport,
    ShardProcessor,
};
use crate::pager::CursorPager;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use strata_core::types::{QUARANTINED_FIELD, REMOVED_FIELD, TIMESTAMP_FIELD};
use strata_core::{
    compare_keys, DecodedEvent, Direction, DocPath, Document, FilterOp, Query, Result, ShardKey,
    StoreTxn, TriggerState,
};

/// A projection that must reflect the canonically latest valid event
pub trait OrderedProjection: EventQueries + Send + Sync {
    type Data: DeserializeOwned;

    fn name(&self) -> &str;

    /// Dotted fields forming the canonical key, most significant first.
    fn canonical_fields(&self) -> &[&'static str];

    /// Order `query` canonically.
    fn canonical_order(&self, query: Query, direction: Direction) -> Query {
        self.canonical_fields()
            .iter()
            .fold(query, |q, field| q.order_by(*field, direction))
    }

    /// Restrict `query` to events that happened at or before `timestamp`.
    fn canonical_order_before(&self, query: Query, timestamp: i64) -> Query {
        query.filter(TIMESTAMP_FIELD, FilterOp::Le, timestamp)
    }

    fn canonical_key(&self, event: &Document) -> Vec<Value> {
        self.canonical_fields()
            .iter()
            .map(|field| event.field(field).cloned().unwrap_or(Value::Null))
            .collect()
    }

    /// Restrict `query` to events allowed to contribute to state.
    fn valid_events(&self, query: Query) -> Query {
        query.filter(REMOVED_FIELD, FilterOp::Ne, true)
    }

    fn is_valid(&self, event: &DecodedEvent<Self::Data>) -> bool {
        !event.metadata.flag("removed")
    }

    /// Write the derived state implied by `latest`.
    fn apply<T: StoreTxn>(
        &self,
        txn: &mut T,
        shard: &ShardKey,
        latest: &DecodedEvent<Self::Data>,
        now: i64,
    ) -> Result<()>;
}

/// Page size of the latest-valid lookup; the first hit usually ends it.
const LATEST_LOOKUP_PAGE: usize = 8;

pub struct OrderedEventProcessor<P> {
    projection: P,
}

/// A decoded event with its canonical key.
struct Keyed<D> {
    key: Vec<Value>,
    event: DecodedEvent<D>,
}

impl<P: OrderedProjection> OrderedEventProcessor<P> {
    pub fn new(projection: P) -> Self {
        Self { projection }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    fn keyed(&self, doc: &Document) -> Vec<Value> {
        self.projection.canonical_key(doc)
    }

    /// Look up the shard's latest valid event, quarantining malformed
    /// candidates met on the way.
    fn latest_valid<T: StoreTxn>(
        &self,
        txn: &mut T,
        ctx: &ProcessContext<'_>,
        report: &mut ProcessReport,
    ) -> Result<Option<Keyed<P::Data>>> {
        let base = Query::collection(ctx.shard.events_collection())
            .filter(QUARANTINED_FIELD, FilterOp::Eq, Value::Null);
        let query = self.projection.canonical_order(
            self.projection
                .canonical_order_before(self.projection.valid_events(base), ctx.now),
            Direction::Desc,
        );
        let mut pager = CursorPager::new(query, LATEST_LOOKUP_PAGE);

        while let Some(page) = pager.next_page(|q| txn.query(q))? {
            for doc in page {
                match DecodedEvent::<P::Data>::from_document(&doc) {
                    Ok(event) if self.projection.is_valid(&event) => {
                        return Ok(Some(Keyed {
                            key: self.keyed(&doc),
                            event,
                        }));
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::warn!(event = %doc.path, error = %e, "Quarantining malformed event");
                        txn.write(quarantine_op(doc.path, e.to_string(), ctx.now))?;
                        report.quarantined += 1;
                        report.events += 1;
                    }
                }
            }
        }
        Ok(None)
    }
}

impl<P: OrderedProjection> ShardProcessor for OrderedEventProcessor<P> {
    fn name(&self) -> &str {
        self.projection.name()
    }

    fn process<T: StoreTxn>(
        &self,
        txn: &mut T,
        ctx: &ProcessContext<'_>,
        trigger: &mut TriggerState,
    ) -> Result<ProcessReport> {
        let (query, extractor) = self
            .projection
            .cursor_query(ctx.shard.events_collection(), ctx.now);
        let mut pager = CursorPager::new(query, ctx.config.batch_size).with_extractor(extractor);
        let mut report = ProcessReport::default();

        while report.pages < ctx.config.max_pages {
            let page = match pager.next_page(|q| txn.query(q))? {
                Some(page) => page,
                None => break,
            };
            report.pages += 1;
            let complete = page.len() < ctx.config.batch_size;

            let keys: HashMap<DocPath, Vec<Value>> = page
                .iter()
                .map(|doc| (doc.path.clone(), self.keyed(doc)))
                .collect();
            let decoded = decode_page::<P::Data, _>(&self.projection, page);
            report.quarantined += decoded.malformed.len();

            let mut keyed: Vec<Keyed<P::Data>> = decoded
                .events
                .into_iter()
                .map(|event| Keyed {
                    key: keys.get(&event.path).cloned().unwrap_or_default(),
                    event,
                })
                .collect();
            keyed.sort_by(|a, b| compare_keys(&a.key, &b.key));

            let (valid, invalid): (Vec<_>, Vec<_>) = keyed
                .into_iter()
                .partition(|k| self.projection.is_valid(&k.event));
            if !invalid.is_empty() {
                tracing::debug!(
                    shard = %ctx.shard,
                    count = invalid.len(),
                    "Consuming invalidated events"
                );
            }

            // Consume first so quarantined documents drop out of the
            // latest-valid lookup.
            let consumed = valid
                .iter()
                .chain(invalid.iter())
                .map(|k| k.event.path.clone());
            report.events += mark_consumed(txn, consumed, decoded.malformed, ctx.now)?;

            let stored = trigger.last_applied_key.as_deref();
            let provable = report.pages == 1 && complete && stored.is_some();
            let latest = if provable {
                match valid.into_iter().last() {
                    Some(candidate)
                        if stored.map_or(true, |s| {
                            compare_keys(&candidate.key, s) == Ordering::Greater
                        }) =>
                    {
                        Some(candidate)
                    }
                    _ => None,
                }
            } else {
                self.latest_valid(txn, ctx, &mut report)?
            };

            if let Some(latest) = latest {
                if trigger.last_applied_key.as_ref() != Some(&latest.key) {
                    self.projection
                        .apply(txn, ctx.shard, &latest.event, ctx.now)?;
                    tracing::debug!(
                        processor = self.projection.name(),
                        shard = %ctx.shard,
                        key = ?latest.key,
                        "Applied latest valid event"
                    );
                    trigger.last_applied_key = Some(latest.key);
                    report.applied += 1;
                }
            }
        }

        report.has_more = !pager.is_exhausted();
        Ok(report)
    }
}
