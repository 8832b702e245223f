//! Document paths and stored documents
//!
//! Paths alternate collection and document segments, Firestore style:
//! `collections/c1/items/i1` is a document inside the collection
//! `collections/c1/items`.

use crate::error::{Result, StrataError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::borrow::Borrow;
use std::fmt;

/// Path of a single document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DocPath(String);

impl DocPath {
    /// Parse and validate a document path.
    pub fn parse(path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        let segments: Vec<&str> = path.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(StrataError::InvalidPath(format!(
                "empty segment in '{}'",
                path
            )));
        }
        if segments.len() % 2 != 0 {
            return Err(StrataError::InvalidPath(format!(
                "'{}' names a collection, not a document",
                path
            )));
        }
        Ok(Self(path))
    }

    /// Build the path of document `id` inside `collection`.
    pub fn child(collection: &str, id: &str) -> Result<Self> {
        if id.contains('/') {
            return Err(StrataError::InvalidPath(format!(
                "document id '{}' contains '/'",
                id
            )));
        }
        Self::parse(format!("{}/{}", collection, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last segment.
    pub fn id(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[idx + 1..],
            None => &self.0,
        }
    }

    /// Path of the collection holding this document.
    pub fn collection(&self) -> &str {
        match self.0.rfind('/') {
            Some(idx) => &self.0[..idx],
            None => "",
        }
    }

    /// The document owning this document's collection, if any.
    pub fn parent_document(&self) -> Option<DocPath> {
        let collection = self.collection();
        collection
            .rfind('/')
            .map(|idx| DocPath(collection[..idx].to_string()))
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DocPath {
    type Error = StrataError;

    fn try_from(value: String) -> Result<Self> {
        DocPath::parse(value)
    }
}

impl Borrow<str> for DocPath {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<DocPath> for String {
    fn from(path: DocPath) -> Self {
        path.0
    }
}

/// A stored document together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub path: DocPath,
    pub data: Value,
    /// Commit sequence of the last write; never 0 for a stored document.
    pub version: u64,
}

impl Document {
    pub fn new(path: DocPath, data: Value, version: u64) -> Self {
        Self {
            path,
            data,
            version,
        }
    }

    /// Read a dotted field path, e.g. `metadata.processed`.
    pub fn field(&self, field: &str) -> Option<&Value> {
        get_field(&self.data, field)
    }

    /// Deserialize the whole document body.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone())
            .map_err(|e| StrataError::malformed(self.path.as_str(), e.to_string()))
    }
}

/// Read a dotted field path out of a JSON value.
pub fn get_field<'a>(data: &'a Value, field: &str) -> Option<&'a Value> {
    field
        .split('.')
        .try_fold(data, |current, segment| current.as_object()?.get(segment))
}

/// Write a dotted field path, creating intermediate objects as needed.
///
/// Non-object intermediates are replaced by objects.
pub fn set_field(data: &mut Value, field: &str, value: Value) {
    let mut current = data;
    let mut segments = field.split('.').peekable();
    while let Some(segment) = segments.next() {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        let map = match current.as_object_mut() {
            Some(map) => map,
            None => return,
        };
        if segments.peek().is_none() {
            map.insert(segment.to_string(), value);
            return;
        }
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
}
