//! Best listing and best offer of an item
//!
//! Order lifecycle events (created, cancelled, filled, expired) update one
//! order document each under `{item}/orders/{orderId}`, last writer by
//! `(timestamp, event id)` winning. After every batch the item's active
//! orders are re-read and the best prices recomputed from scratch, so the
//! snapshot never depends on delivery order.

use crate::target_document;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use strata_core::{DecodedEvent, DocPath, FilterOp, Query, Result, ShardKey, StoreTxn};
use strata_engine::{BatchProjection, EventQueries};

pub const ORDERS_COLLECTION: &str = "orders";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Listing,
    Offer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Active,
    Cancelled,
    Filled,
    Expired,
}

/// One order lifecycle change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderEvent {
    pub order_id: String,
    pub side: OrderSide,
    pub status: OrderStatus,
    /// Price in the currency's smallest unit
    #[serde(with = "amount")]
    pub price: u128,
    pub maker: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// Stored state of one order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderRecord {
    order_id: String,
    side: OrderSide,
    status: OrderStatus,
    #[serde(with = "amount")]
    price: u128,
    maker: String,
    #[serde(default)]
    expires_at: Option<i64>,
    updated_at: i64,
    event_id: String,
}

impl OrderRecord {
    fn from_event(event: &DecodedEvent<OrderEvent>) -> Self {
        Self {
            order_id: event.data.order_id.clone(),
            side: event.data.side,
            status: event.data.status,
            price: event.data.price,
            maker: event.data.maker.clone(),
            expires_at: event.data.expires_at,
            updated_at: event.metadata.timestamp,
            event_id: event.metadata.id.clone(),
        }
    }

    fn position(&self) -> (i64, &str) {
        (self.updated_at, &self.event_id)
    }

    /// Expiry is only seen when a batch runs for the item. Between batches
    /// the stored snapshot can still name an expired order; readers compare
    /// `bestOrderValidUntil` against their own clock.
    fn is_live(&self, now: i64) -> bool {
        self.status == OrderStatus::Active && self.expires_at.map_or(true, |at| at > now)
    }

    fn summary(&self) -> Value {
        json!({
            "orderId": self.order_id,
            "price": self.price.to_string(),
            "maker": self.maker,
            "expiresAt": self.expires_at,
        })
    }
}

/// Amounts travel as decimal strings; JSON numbers cannot hold every `u128`.
mod amount {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &u128,
        serializer: S,
    ) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<u128, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(text) => text.parse().map_err(serde::de::Error::custom),
            Raw::Number(n) => Ok(u128::from(n)),
        }
    }
}

pub struct BestOrder;

impl BestOrder {
    fn orders_collection(target: &DocPath) -> String {
        format!("{}/{}", target, ORDERS_COLLECTION)
    }

    /// Record the event on its order document unless a later one is stored.
    fn record<T: StoreTxn>(
        &self,
        txn: &mut T,
        collection: &str,
        event: &DecodedEvent<OrderEvent>,
    ) -> Result<bool> {
        let path = match DocPath::child(collection, &event.data.order_id) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(event = %event.path, error = %e, "Skipping order event with unusable order id");
                return Ok(false);
            }
        };
        let incoming = OrderRecord::from_event(event);
        if let Some(doc) = txn.get(&path)? {
            match doc.decode::<OrderRecord>() {
                Ok(stored) if stored.position() >= incoming.position() => return Ok(false),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(order = %path, error = %e, "Replacing unreadable order record")
                }
            }
        }
        txn.upsert(path, serde_json::to_value(&incoming)?)?;
        Ok(true)
    }

    fn best(orders: &[OrderRecord], side: OrderSide, now: i64) -> Option<&OrderRecord> {
        let candidates = orders.iter().filter(|o| o.side == side && o.is_live(now));
        // Equal prices resolve to the smallest order id.
        match side {
            OrderSide::Listing => candidates.min_by(|a, b| {
                a.price
                    .cmp(&b.price)
                    .then_with(|| a.order_id.cmp(&b.order_id))
            }),
            OrderSide::Offer => candidates.max_by(|a, b| {
                a.price
                    .cmp(&b.price)
                    .then_with(|| b.order_id.cmp(&a.order_id))
            }),
        }
    }
}

impl EventQueries for BestOrder {}

impl BatchProjection for BestOrder {
    type Data = OrderEvent;

    fn name(&self) -> &str {
        "best-order"
    }

    fn reduce<T: StoreTxn>(
        &self,
        txn: &mut T,
        shard: &ShardKey,
        events: &[DecodedEvent<OrderEvent>],
        now: i64,
    ) -> Result<()> {
        let target = target_document(shard)?;
        let collection = Self::orders_collection(&target);

        let mut changed = 0usize;
        for event in events {
            if self.record(txn, &collection, event)? {
                changed += 1;
            }
        }

        let active = txn.query(
            &Query::collection(collection.as_str()).filter("status", FilterOp::Eq, "active"),
        )?;
        let orders: Vec<OrderRecord> = active
            .iter()
            .filter_map(|doc| doc.decode().ok())
            .collect();

        let listing = Self::best(&orders, OrderSide::Listing, now);
        let offer = Self::best(&orders, OrderSide::Offer, now);
        let valid_until = listing
            .iter()
            .chain(offer.iter())
            .filter_map(|o| o.expires_at)
            .min();
        tracing::debug!(
            shard = %shard,
            changed,
            active = orders.len(),
            "Recomputed best orders"
        );

        txn.upsert(
            target,
            json!({
                "bestListing": listing.map(OrderRecord::summary),
                "bestOffer": offer.map(OrderRecord::summary),
                "bestOrderValidUntil": valid_until,
                "bestOrderUpdatedAt": now,
            }),
        )
    }
}
