//! Event documents
//!
//! Every event stored in a shard's log has the shape
//! `{ data: <payload>, metadata: { id, processed, timestamp, updatedAt, ... } }`.
//! Domain fields (block numbers, log indices, `removed`, ...) live next to the
//! engine-owned fields in `metadata`.

use super::document::{DocPath, Document};
use crate::error::{Result, StrataError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const PROCESSED_FIELD: &str = "metadata.processed";
pub const UPDATED_AT_FIELD: &str = "metadata.updatedAt";
pub const TIMESTAMP_FIELD: &str = "metadata.timestamp";
pub const REMOVED_FIELD: &str = "metadata.removed";
pub const QUARANTINED_FIELD: &str = "metadata.quarantined";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMetadata {
    pub id: String,

    /// Flips false -> true exactly once, inside a processing transaction.
    #[serde(default)]
    pub processed: bool,

    /// Creation time, immutable.
    pub timestamp: i64,

    /// Creation time until processed, then the processing time.
    pub updated_at: i64,

    /// Set when the event could not be decoded and was consumed without
    /// contributing to derived state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quarantined: Option<String>,

    /// Domain-specific metadata fields.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventMetadata {
    pub fn new(id: impl Into<String>, timestamp: i64) -> Self {
        Self {
            id: id.into(),
            processed: false,
            timestamp,
            updated_at: timestamp,
            quarantined: None,
            extra: Map::new(),
        }
    }

    /// Read a boolean domain flag, treating absence as `false`.
    pub fn flag(&self, name: &str) -> bool {
        self.extra
            .get(name)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.extra.get(name)
    }
}

/// An event as written by a producer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event<T> {
    pub data: T,
    pub metadata: EventMetadata,
}

impl<T: Serialize> Event<T> {
    pub fn new(id: impl Into<String>, data: T, timestamp: i64) -> Self {
        Self {
            data,
            metadata: EventMetadata::new(id, timestamp),
        }
    }

    /// Attach a domain metadata field.
    pub fn with_meta(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.extra.insert(name.into(), value.into());
        self
    }

    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}

/// An event read back from its shard, decoded into the projection's type.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent<T> {
    pub path: DocPath,
    pub data: T,
    pub metadata: EventMetadata,
}

impl<T: DeserializeOwned> DecodedEvent<T> {
    /// Decode a stored event document.
    ///
    /// Shape errors are reported as [`StrataError::MalformedEvent`].
    pub fn from_document(doc: &Document) -> Result<Self> {
        let event: Event<T> = serde_json::from_value(doc.data.clone())
            .map_err(|e| StrataError::malformed(doc.path.as_str(), e.to_string()))?;
        Ok(Self {
            path: doc.path.clone(),
            data: event.data,
            metadata: event.metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize, Serialize, PartialEq)]
    struct Referral {
        count: u64,
    }

    #[test]
    fn test_event_layout() {
        let event = Event::new("e1", Referral { count: 2 }, 1_000).with_meta("blockNumber", 7);
        let value = event.to_value().unwrap();
        assert_eq!(
            value,
            json!({
                "data": {"count": 2},
                "metadata": {
                    "id": "e1",
                    "processed": false,
                    "timestamp": 1000,
                    "updatedAt": 1000,
                    "blockNumber": 7
                }
            })
        );
    }

    #[test]
    fn test_decode_reports_malformed_events() {
        let path = DocPath::parse("referrals/abc/events/e1").unwrap();
        let good = Document::new(
            path.clone(),
            json!({"data": {"count": 1}, "metadata": {"id": "e1", "timestamp": 1, "updatedAt": 1, "removed": true}}),
            1,
        );
        let decoded = DecodedEvent::<Referral>::from_document(&good).unwrap();
        assert_eq!(decoded.data.count, 1);
        assert!(decoded.metadata.flag("removed"));
        assert!(!decoded.metadata.processed);

        let bad = Document::new(path, json!({"data": {"count": "x"}}), 1);
        let err = DecodedEvent::<Referral>::from_document(&bad).unwrap_err();
        assert!(matches!(err, StrataError::MalformedEvent { .. }));
    }
}
