//! Shard identity
//!
//! A processor is configured with a path template such as
//! `collections/{collectionId}/items/{itemId}/events`. The template is parsed
//! once, at configuration time, into literal and placeholder segments. Every
//! instantiation of the template is one shard: its events collection, its
//! derived-state document (the collection's parent) and its trigger state.

use super::document::DocPath;
use crate::error::{Result, StrataError};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// Parsed storage path template of a shard's events collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn parse(raw: &str) -> Result<Self> {
        let invalid = |reason: &str| StrataError::Config(format!("template '{}': {}", raw, reason));

        let parts: Vec<&str> = raw.split('/').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(invalid("empty segment"));
        }
        if parts.len() % 2 == 0 {
            return Err(invalid("must name a collection (odd number of segments)"));
        }

        let mut seen = HashSet::new();
        let mut segments = Vec::with_capacity(parts.len());
        for (idx, part) in parts.iter().enumerate() {
            if let Some(name) = part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                if name.is_empty() || name.contains(['{', '}']) {
                    return Err(invalid("malformed placeholder"));
                }
                // Collection names stay literal; only document ids vary.
                if idx % 2 == 0 {
                    return Err(invalid("placeholders are only allowed in document-id positions"));
                }
                if !seen.insert(name.to_string()) {
                    return Err(invalid("duplicate placeholder"));
                }
                segments.push(Segment::Placeholder(name.to_string()));
            } else if part.contains(['{', '}']) {
                return Err(invalid("malformed placeholder"));
            } else {
                segments.push(Segment::Literal(part.to_string()));
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    pub fn has_placeholders(&self) -> bool {
        self.placeholders().next().is_some()
    }

    /// Leading literal segments, joined; used to narrow backend scans.
    pub fn literal_prefix(&self) -> String {
        self.segments
            .iter()
            .map_while(|s| match s {
                Segment::Literal(lit) => Some(lit.as_str()),
                Segment::Placeholder(_) => None,
            })
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Segments in order: the literal text, or `None` for a placeholder.
    pub fn segments(&self) -> impl Iterator<Item = Option<&str>> {
        self.segments.iter().map(|s| match s {
            Segment::Literal(lit) => Some(lit.as_str()),
            Segment::Placeholder(_) => None,
        })
    }

    /// Whether `collection` is an instantiation of this template.
    pub fn matches_collection(&self, collection: &str) -> bool {
        self.bind(collection).is_some()
    }

    /// Resolve the shard owning an event document.
    pub fn resolve(&self, event_path: &DocPath) -> Result<ShardKey> {
        self.resolve_collection(event_path.collection())
    }

    /// Resolve the shard from its events collection path.
    pub fn resolve_collection(&self, collection: &str) -> Result<ShardKey> {
        let params = self.bind(collection).ok_or_else(|| {
            StrataError::InvalidPath(format!(
                "'{}' does not match template '{}'",
                collection, self.raw
            ))
        })?;
        Ok(ShardKey {
            collection: collection.to_string(),
            params,
        })
    }

    /// Build the events collection path for a set of placeholder values.
    pub fn format(&self, params: &[(&str, &str)]) -> Result<ShardKey> {
        let mut parts = Vec::with_capacity(self.segments.len());
        for segment in &self.segments {
            match segment {
                Segment::Literal(lit) => parts.push(lit.as_str()),
                Segment::Placeholder(name) => {
                    let value = params
                        .iter()
                        .find(|(k, _)| k == name)
                        .map(|(_, v)| *v)
                        .ok_or_else(|| {
                            StrataError::InvalidPath(format!("missing value for '{{{}}}'", name))
                        })?;
                    if value.is_empty() || value.contains('/') {
                        return Err(StrataError::InvalidPath(format!(
                            "invalid value '{}' for '{{{}}}'",
                            value, name
                        )));
                    }
                    parts.push(value);
                }
            }
        }
        self.resolve_collection(&parts.join("/"))
    }

    fn bind(&self, collection: &str) -> Option<Vec<(String, String)>> {
        let parts: Vec<&str> = collection.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }
        let mut params = Vec::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(lit) if lit == part => {}
                Segment::Literal(_) => return None,
                Segment::Placeholder(_) if part.is_empty() => return None,
                Segment::Placeholder(name) => params.push((name.clone(), part.to_string())),
            }
        }
        Some(params)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Identity of one shard: a resolved instantiation of a [`PathTemplate`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ShardKey {
    collection: String,
    params: Vec<(String, String)>,
}

impl ShardKey {
    /// Path of the shard's events collection.
    pub fn events_collection(&self) -> &str {
        &self.collection
    }

    /// The document holding the shard's derived state.
    pub fn target_path(&self) -> Option<DocPath> {
        self.collection
            .rfind('/')
            .and_then(|idx| DocPath::parse(&self.collection[..idx]).ok())
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Reversible, slash-free encoding used as a document id.
    pub fn encode(&self) -> String {
        self.collection.replace('%', "%25").replace('/', "%2F")
    }

    pub fn decode(template: &PathTemplate, encoded: &str) -> Result<Self> {
        let collection = encoded.replace("%2F", "/").replace("%25", "%");
        template.resolve_collection(&collection)
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.collection)
    }
}
