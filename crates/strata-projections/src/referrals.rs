//! Referral tallies
//!
//! Each event credits a referral code with `count` referrals. The tally is
//! accumulated: the increment and the `processed` flips of the same events
//! commit together, so a retried transaction starts again from fresh reads.

use crate::target_document;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use strata_core::{DecodedEvent, Result, ShardKey, StoreTxn};
use strata_engine::{BatchProjection, EventQueries};

pub const TOTAL_FIELD: &str = "totalReferrals";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralEvent {
    #[serde(default = "default_count")]
    pub count: u64,
    #[serde(default)]
    pub referred: Option<String>,
}

fn default_count() -> u64 {
    1
}

pub struct ReferralTally;

impl EventQueries for ReferralTally {}

impl BatchProjection for ReferralTally {
    type Data = ReferralEvent;

    fn name(&self) -> &str {
        "referrals"
    }

    fn reduce<T: StoreTxn>(
        &self,
        txn: &mut T,
        shard: &ShardKey,
        events: &[DecodedEvent<ReferralEvent>],
        now: i64,
    ) -> Result<()> {
        let target = target_document(shard)?;
        let current = txn
            .get(&target)?
            .and_then(|doc| doc.field(TOTAL_FIELD).and_then(Value::as_u64))
            .unwrap_or(0);
        let added = events
            .iter()
            .fold(0u64, |sum, e| sum.saturating_add(e.data.count));
        txn.upsert(
            target,
            json!({
                TOTAL_FIELD: current.saturating_add(added),
                "referralsUpdatedAt": now,
            }),
        )
    }
}
