//! Query model shared by every store backend
//!
//! Queries are evaluated in Rust against a scope's documents so that the
//! in-memory and SQLite backends agree exactly on filtering, ordering and
//! cursor semantics:
//! - Missing fields evaluate as `null`
//! - Values are totally ordered: null < bool < number < string < array < object
//! - Range filters (`<`, `<=`, `>`, `>=`) only match values of the same type
//! - The document path is the implicit final tie-break, in the direction of
//!   the last explicit order-by

use crate::types::{get_field, DocPath, Document, PathTemplate};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl Filter {
    pub fn matches(&self, data: &Value) -> bool {
        let actual = get_field(data, &self.field).unwrap_or(&Value::Null);
        match self.op {
            FilterOp::Eq => compare_values(actual, &self.value) == Ordering::Equal,
            FilterOp::Ne => compare_values(actual, &self.value) != Ordering::Equal,
            range => {
                if type_rank(actual) != type_rank(&self.value) {
                    return false;
                }
                let ordering = compare_values(actual, &self.value);
                match range {
                    FilterOp::Lt => ordering == Ordering::Less,
                    FilterOp::Le => ordering != Ordering::Greater,
                    FilterOp::Gt => ordering == Ordering::Greater,
                    FilterOp::Ge => ordering != Ordering::Less,
                    FilterOp::Eq | FilterOp::Ne => unreachable!(),
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Pagination position: the order-by values of the last returned document
/// plus its path as tie-break.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub values: Vec<Value>,
    pub path: DocPath,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryScope {
    /// Documents directly inside one collection.
    Collection(String),
    /// Documents inside any instantiation of a template.
    Template(PathTemplate),
}

impl QueryScope {
    pub fn contains(&self, path: &DocPath) -> bool {
        match self {
            QueryScope::Collection(collection) => path.collection() == collection,
            QueryScope::Template(template) => template.matches_collection(path.collection()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub scope: QueryScope,
    pub filters: Vec<Filter>,
    pub order_by: Vec<OrderBy>,
    pub start_after: Option<Cursor>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(path: impl Into<String>) -> Self {
        Self::scoped(QueryScope::Collection(path.into()))
    }

    /// Span every instantiation of `template`.
    pub fn group(template: PathTemplate) -> Self {
        Self::scoped(QueryScope::Template(template))
    }

    fn scoped(scope: QueryScope) -> Self {
        Self {
            scope,
            filters: Vec::new(),
            order_by: Vec::new(),
            start_after: None,
            limit: None,
        }
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op,
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn start_after(mut self, cursor: Cursor) -> Self {
        self.start_after = Some(cursor);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Scope and filters, ignoring cursor and limit.
    pub fn matches(&self, doc: &Document) -> bool {
        self.scope.contains(&doc.path) && self.filters.iter().all(|f| f.matches(&doc.data))
    }

    /// The cursor positioned at `doc` under this query's ordering.
    pub fn cursor_for(&self, doc: &Document) -> Cursor {
        self.position(&doc.path, &doc.data)
    }

    /// Position of a document given its path and data.
    pub fn position(&self, path: &DocPath, data: &Value) -> Cursor {
        Cursor {
            values: self
                .order_by
                .iter()
                .map(|o| get_field(data, &o.field).cloned().unwrap_or(Value::Null))
                .collect(),
            path: path.clone(),
        }
    }

    /// Whether `position` lies past the start cursor, if any.
    pub fn is_after_start(&self, position: &Cursor) -> bool {
        self.start_after.as_ref().map_or(true, |cursor| {
            self.compare_positions(position, cursor) == Ordering::Greater
        })
    }

    fn tie_break_direction(&self) -> Direction {
        self.order_by
            .last()
            .map(|o| o.direction)
            .unwrap_or(Direction::Asc)
    }

    /// Compare two documents under this query's ordering.
    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        self.compare_positions(&self.cursor_for(a), &self.cursor_for(b))
    }

    /// Compare two positions under this query's ordering.
    pub fn compare_positions(&self, a: &Cursor, b: &Cursor) -> Ordering {
        for (idx, order) in self.order_by.iter().enumerate() {
            let left = a.values.get(idx).unwrap_or(&Value::Null);
            let right = b.values.get(idx).unwrap_or(&Value::Null);
            let ordering = order.direction.apply(compare_values(left, right));
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        self.tie_break_direction().apply(a.path.cmp(&b.path))
    }

    /// Filter, sort, apply the cursor and limit.
    pub fn evaluate<I>(&self, docs: I) -> Vec<Document>
    where
        I: IntoIterator<Item = Document>,
    {
        let mut matched: Vec<(Cursor, Document)> = docs
            .into_iter()
            .filter(|doc| self.matches(doc))
            .map(|doc| (self.cursor_for(&doc), doc))
            .collect();
        matched.sort_by(|(a, _), (b, _)| self.compare_positions(a, b));

        let iter = matched
            .into_iter()
            .filter(|(position, _)| self.is_after_start(position))
            .map(|(_, doc)| doc);

        match self.limit {
            Some(limit) => iter.take(limit).collect(),
            None => iter.collect(),
        }
    }
}

/// Position of a value's type in the total order, null first.
pub fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            if let (Some(x), Some(y)) = (x.as_i64(), y.as_i64()) {
                x.cmp(&y)
            } else if let (Some(x), Some(y)) = (x.as_u64(), y.as_u64()) {
                x.cmp(&y)
            } else {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => compare_keys(x, y),
        (Value::Object(x), Value::Object(y)) => {
            for ((kx, vx), (ky, vy)) in x.iter().zip(y.iter()) {
                let ordering = kx.cmp(ky).then_with(|| compare_values(vx, vy));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            x.len().cmp(&y.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

/// Lexicographic order over composite keys.
pub fn compare_keys(a: &[Value], b: &[Value]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        let ordering = compare_values(x, y);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(path: &str, data: Value) -> Document {
        Document::new(DocPath::parse(path).unwrap(), data, 1)
    }

    #[test]
    fn test_value_type_order() {
        let ordered = [
            json!(null),
            json!(false),
            json!(true),
            json!(-3),
            json!(2.5),
            json!(10),
            json!("a"),
            json!([1]),
            json!({"a": 1}),
        ];
        for pair in ordered.windows(2) {
            assert_eq!(compare_values(&pair[0], &pair[1]), Ordering::Less, "{:?}", pair);
        }
        assert_eq!(compare_values(&json!(2), &json!(2.0)), Ordering::Equal);
    }

    #[test]
    fn test_composite_keys() {
        assert_eq!(compare_keys(&[json!(5), json!(1)], &[json!(5), json!(2)]), Ordering::Less);
        assert_eq!(compare_keys(&[json!(6), json!(0)], &[json!(5), json!(9)]), Ordering::Greater);
        assert_eq!(compare_keys(&[json!(5)], &[json!(5), json!(0)]), Ordering::Less);
    }

    #[test]
    fn test_filters_and_missing_fields() {
        let processed = doc("e/1", json!({"metadata": {"processed": true, "updatedAt": 5}}));
        let fresh = doc("e/2", json!({"metadata": {"processed": false, "updatedAt": 7}}));
        let bare = doc("e/3", json!({}));

        let unprocessed = Query::collection("e").filter("metadata.processed", FilterOp::Eq, false);
        assert!(!unprocessed.matches(&processed));
        assert!(unprocessed.matches(&fresh));
        assert!(!unprocessed.matches(&bare));

        let not_removed = Query::collection("e").filter("metadata.removed", FilterOp::Ne, true);
        assert!(not_removed.matches(&bare));

        let before = Query::collection("e").filter("metadata.updatedAt", FilterOp::Le, 5);
        assert!(before.matches(&processed));
        assert!(!before.matches(&fresh));
        assert!(!before.matches(&bare));
    }

    #[test]
    fn test_scope() {
        let template = PathTemplate::parse("referrals/{code}/events").unwrap();
        let group = Query::group(template);
        assert!(group.matches(&doc("referrals/a/events/1", json!({}))));
        assert!(group.matches(&doc("referrals/b/events/1", json!({}))));
        assert!(!group.matches(&doc("referrals/b/other/1", json!({}))));

        let single = Query::collection("referrals/a/events");
        assert!(!single.matches(&doc("referrals/b/events/1", json!({}))));
    }

    #[test]
    fn test_evaluate_orders_with_path_tie_break_and_cursor() {
        let docs = vec![
            doc("e/c", json!({"t": 1})),
            doc("e/a", json!({"t": 2})),
            doc("e/b", json!({"t": 1})),
            doc("e/d", json!({"t": 3})),
        ];
        let query = Query::collection("e").order_by("t", Direction::Asc);
        let all: Vec<_> = query
            .evaluate(docs.clone())
            .into_iter()
            .map(|d| d.path.id().to_string())
            .collect();
        assert_eq!(all, vec!["b", "c", "a", "d"]);

        let cursor = Cursor {
            values: vec![json!(1)],
            path: DocPath::parse("e/c").unwrap(),
        };
        let rest: Vec<_> = query
            .clone()
            .start_after(cursor)
            .limit(1)
            .evaluate(docs.clone())
            .into_iter()
            .map(|d| d.path.id().to_string())
            .collect();
        assert_eq!(rest, vec!["a"]);

        let desc: Vec<_> = Query::collection("e")
            .order_by("t", Direction::Desc)
            .evaluate(docs)
            .into_iter()
            .map(|d| d.path.id().to_string())
            .collect();
        assert_eq!(desc, vec!["d", "a", "c", "b"]);
    }
}
