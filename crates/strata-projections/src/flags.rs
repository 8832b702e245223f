//! Moderation flag status of an item
//!
//! Flag and unflag events are ordered by `(timestamp, id)`; the latest one
//! decides.

use crate::target_document;
use serde::{Deserialize, Serialize};
use serde_json::json;
use strata_core::{DecodedEvent, Result, ShardKey, StoreTxn};
use strata_engine::{EventQueries, OrderedProjection};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlagEvent {
    pub flagged: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

pub struct FlagStatus;

impl EventQueries for FlagStatus {}

impl OrderedProjection for FlagStatus {
    type Data = FlagEvent;

    fn name(&self) -> &str {
        "flags"
    }

    fn canonical_fields(&self) -> &[&'static str] {
        &["metadata.timestamp", "metadata.id"]
    }

    fn apply<T: StoreTxn>(
        &self,
        txn: &mut T,
        shard: &ShardKey,
        latest: &DecodedEvent<FlagEvent>,
        _now: i64,
    ) -> Result<()> {
        // An unflag clears the reason.
        let reason = if latest.data.flagged {
            latest.data.reason.clone()
        } else {
            None
        };
        txn.upsert(
            target_document(shard)?,
            json!({
                "flagged": latest.data.flagged,
                "flagReason": reason,
                "flagUpdatedAt": latest.metadata.timestamp,
            }),
        )
    }
}
