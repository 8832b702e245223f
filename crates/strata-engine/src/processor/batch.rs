//! Batch Event Processor (unordered)

use super::{decode_page, mark_consumed, EventQueries, ProcessContext, ProcessReport, ShardProcessor};
use crate::pager::CursorPager;
use serde::de::DeserializeOwned;
use strata_core::{DecodedEvent, Result, ShardKey, StoreTxn, TriggerState};

/// A projection whose derived state depends only on the set of events
pub trait BatchProjection: EventQueries + Send + Sync {
    type Data: DeserializeOwned;

    fn name(&self) -> &str;

    /// Fold one page of newly ready events into the shard's derived state.
    ///
    /// Runs inside the shard transaction; the events are marked processed
    /// in the same transaction after this returns. An error aborts the
    /// whole invocation.
    fn reduce<T: StoreTxn>(
        &self,
        txn: &mut T,
        shard: &ShardKey,
        events: &[DecodedEvent<Self::Data>],
        now: i64,
    ) -> Result<()>;
}

pub struct BatchEventProcessor<P> {
    projection: P,
}

impl<P: BatchProjection> BatchEventProcessor<P> {
    pub fn new(projection: P) -> Self {
        Self { projection }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }
}

impl<P: BatchProjection> ShardProcessor for BatchEventProcessor<P> {
    fn name(&self) -> &str {
        self.projection.name()
    }

    fn process<T: StoreTxn>(
        &self,
        txn: &mut T,
        ctx: &ProcessContext<'_>,
        _trigger: &mut TriggerState,
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

            let decoded = decode_page::<P::Data, _>(&self.projection, page);
            report.quarantined += decoded.malformed.len();
            if !decoded.events.is_empty() {
                self.projection
                    .reduce(txn, ctx.shard, &decoded.events, ctx.now)?;
                report.applied += 1;
            }
            let consumed = decoded.events.iter().map(|e| e.path.clone());
            report.events += mark_consumed(txn, consumed, decoded.malformed, ctx.now)?;

            tracing::debug!(
                processor = self.projection.name(),
                shard = %ctx.shard,
                page = report.pages,
                events = report.events,
                "Reduced page"
            );
        }

        report.has_more = !pager.is_exhausted();
        Ok(report)
    }
}
