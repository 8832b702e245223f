//! Current owner of an item from its transfer logs
//!
//! Transfer logs are chain events: they can be delivered late, out of order,
//! or retracted by a reorg (`metadata.removed = true`). The owner is always
//! the recipient of the canonically latest non-removed log.

use crate::target_document;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strata_core::{DecodedEvent, Result, ShardKey, StoreTxn};
use strata_engine::{EventQueries, OrderedProjection};

/// ERC-721/1155 transfer payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferLog {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

pub struct Ownership;

impl EventQueries for Ownership {}

impl OrderedProjection for Ownership {
    type Data = TransferLog;

    fn name(&self) -> &str {
        "ownership"
    }

    fn canonical_fields(&self) -> &[&'static str] {
        &[
            "metadata.blockNumber",
            "metadata.transactionIndex",
            "metadata.logIndex",
        ]
    }

    fn apply<T: StoreTxn>(
        &self,
        txn: &mut T,
        shard: &ShardKey,
        latest: &DecodedEvent<TransferLog>,
        _now: i64,
    ) -> Result<()> {
        let block = latest
            .metadata
            .get("blockNumber")
            .cloned()
            .unwrap_or(Value::Null);
        tracing::debug!(shard = %shard, owner = %latest.data.to, block = %block, "Ownership changed");
        txn.upsert(
            target_document(shard)?,
            json!({
                "owner": latest.data.to,
                "ownershipBlock": block,
                "ownershipUpdatedAt": latest.metadata.timestamp,
            }),
        )
    }
}
