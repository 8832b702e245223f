//! SQL for a [`Query`]
//!
//! Filters, ordering, the start cursor and the limit are translated with
//! `json_extract`/`json_type` wherever SQLite can reproduce the Rust
//! semantics exactly. Clauses without an exact form are left out, which only
//! widens the candidate set; the limit is pushed down only when nothing was
//! left out. Fetched rows always go through [`Query::evaluate`] afterwards.

use rusqlite::types::Value as SqlValue;
use serde_json::Value;
use std::collections::HashMap;
use strata_core::{type_rank, Cursor, Direction, Document, FilterOp, Query, QueryScope};

/// Leading columns of the `documents_pending` index, in index order.
pub const PENDING_INDEX_FIELDS: [&str; 2] = ["metadata.processed", "metadata.updatedAt"];

/// A rank expression sorts arrays and objects by their JSON text, which
/// disagrees with the Rust order. Pages that contain such values on a
/// rank-sorted field are re-read without the limit.
const FIRST_COMPOSITE_RANK: u8 = 4;

pub struct SqlPlan {
    pub sql: String,
    pub params: Vec<SqlValue>,
    /// ORDER BY and LIMIT were applied by SQLite.
    pub limited: bool,
    /// Order-by fields sorted through a type-rank expression.
    rank_sorted: Vec<String>,
}

impl SqlPlan {
    /// Translate `query`. With `push_limit` false the statement only narrows
    /// the scan.
    pub fn build(query: &Query, push_limit: bool) -> Self {
        let mut builder = Builder::default();
        let mut clauses = vec![builder.scope(&query.scope)];
        let mut exact = true;

        // Fields held to one type by an exact filter sort by plain value.
        let mut typed: HashMap<&str, u8> = HashMap::new();
        for filter in &query.filters {
            match builder.filter(&filter.field, filter.op, &filter.value) {
                Some(clause) => {
                    clauses.push(clause);
                    let holds_type = !matches!(filter.op, FilterOp::Ne) && !filter.value.is_null();
                    if holds_type {
                        typed.insert(filter.field.as_str(), type_rank(&filter.value));
                    }
                }
                None => exact = false,
            }
        }

        let order = query
            .order_by
            .iter()
            .map(|o| json_path(&o.field).map(|path| (o.field.as_str(), path, o.direction)))
            .collect::<Option<Vec<_>>>();

        let mut sql = format!(
            "SELECT path, data, version FROM documents WHERE {}",
            clauses.join(" AND ")
        );
        let mut limited = false;
        let mut rank_sorted = Vec::new();

        if let (Some(order), true, Some(limit)) = (order, exact && push_limit, query.limit) {
            let cursor = match &query.start_after {
                Some(cursor) => builder.cursor(cursor, &order, &typed, tie_break(query)),
                None => Some(String::new()),
            };
            if let Some(cursor) = cursor {
                if !cursor.is_empty() {
                    sql.push_str(" AND ");
                    sql.push_str(&cursor);
                }

                let mut terms = Vec::with_capacity(order.len() * 2 + 1);
                for (field, path, direction) in &order {
                    if !typed.contains_key(field) {
                        terms.push(format!("{} {}", rank_expr(path), keyword(*direction)));
                        rank_sorted.push(field.to_string());
                    }
                    terms.push(format!("{} {}", extract(path), keyword(*direction)));
                }
                terms.push(format!("path {}", keyword(tie_break(query))));
                let limit = builder.bind(SqlValue::Integer(limit.min(i64::MAX as usize) as i64));
                sql.push_str(&format!(" ORDER BY {} LIMIT {}", terms.join(", "), limit));
                limited = true;
            }
        }

        Self {
            sql,
            params: builder.params,
            limited,
            rank_sorted,
        }
    }

    /// Whether SQLite's order may have disagreed with the query's on this page.
    pub fn page_needs_full_read(&self, docs: &[Document]) -> bool {
        self.limited
            && docs.iter().any(|doc| {
                self.rank_sorted.iter().any(|field| {
                    doc.field(field)
                        .map_or(false, |v| type_rank(v) >= FIRST_COMPOSITE_RANK)
                })
            })
    }
}

fn tie_break(query: &Query) -> Direction {
    query
        .order_by
        .last()
        .map(|o| o.direction)
        .unwrap_or(Direction::Asc)
}

fn keyword(direction: Direction) -> &'static str {
    match direction {
        Direction::Asc => "ASC",
        Direction::Desc => "DESC",
    }
}

/// JSON path of a dotted field, when every segment is a plain identifier.
///
/// The text is inlined into SQL so that it can match the expression index.
pub fn json_path(field: &str) -> Option<String> {
    let plain = |segment: &str| {
        segment
            .chars()
            .next()
            .map_or(false, |c| c.is_ascii_alphabetic() || c == '_')
            && segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    };
    if field.split('.').all(plain) {
        Some(format!("$.{}", field))
    } else {
        None
    }
}

pub fn extract(path: &str) -> String {
    format!("json_extract(data, '{}')", path)
}

fn json_type(path: &str) -> String {
    format!("json_type(data, '{}')", path)
}

/// Type rank matching [`type_rank`]; missing fields rank as null.
fn rank_expr(path: &str) -> String {
    format!(
        "(CASE {} WHEN 'true' THEN 1 WHEN 'false' THEN 1 WHEN 'integer' THEN 2 \
         WHEN 'real' THEN 2 WHEN 'text' THEN 3 WHEN 'array' THEN 4 WHEN 'object' THEN 5 \
         ELSE 0 END)",
        json_type(path)
    )
}

/// A JSON value SQLite compares the same way Rust does.
enum Scalar {
    Null,
    Bool(bool),
    Number(SqlValue),
    Text(String),
}

impl Scalar {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(Scalar::Null),
            Value::Bool(b) => Some(Scalar::Bool(*b)),
            Value::Number(n) => match (n.as_i64(), n.as_u64()) {
                (Some(i), _) => Some(Scalar::Number(SqlValue::Integer(i))),
                // Beyond i64 SQLite only has lossy reals.
                (None, Some(_)) => None,
                (None, None) => n.as_f64().map(|f| Scalar::Number(SqlValue::Real(f))),
            },
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Scalar::Null => 0,
            Scalar::Bool(_) => 1,
            Scalar::Number(_) => 2,
            Scalar::Text(_) => 3,
        }
    }

    /// `json_type` results of this value's type.
    fn type_names(&self) -> &'static str {
        match self {
            Scalar::Null => "'null'",
            Scalar::Bool(_) => "'true', 'false'",
            Scalar::Number(_) => "'integer', 'real'",
            Scalar::Text(_) => "'text'",
        }
    }

    /// What `json_extract` returns for this value; booleans come back as 0/1.
    fn sql_value(&self) -> SqlValue {
        match self {
            Scalar::Null => SqlValue::Null,
            Scalar::Bool(b) => SqlValue::Integer(*b as i64),
            Scalar::Number(n) => n.clone(),
            Scalar::Text(s) => SqlValue::Text(s.clone()),
        }
    }
}

#[derive(Default)]
struct Builder {
    params: Vec<SqlValue>,
}

impl Builder {
    fn bind(&mut self, value: SqlValue) -> String {
        self.params.push(value);
        format!("?{}", self.params.len())
    }

    fn scope(&mut self, scope: &QueryScope) -> String {
        match scope {
            QueryScope::Collection(collection) => {
                format!("collection = {}", self.bind(SqlValue::Text(collection.clone())))
            }
            QueryScope::Template(template) => {
                let prefix = template.literal_prefix();
                let upper = format!("{}\u{10FFFF}", prefix);
                let segments: Vec<String> = template
                    .segments()
                    .map(|s| s.map_or_else(|| "*".to_string(), glob_literal))
                    .collect();
                let slashes = segments.len().saturating_sub(1) as i64;
                // A fixed slash count keeps each `*` inside one segment.
                format!(
                    "collection >= {} AND collection < {} AND collection GLOB {} \
                     AND length(collection) - length(replace(collection, '/', '')) = {}",
                    self.bind(SqlValue::Text(prefix)),
                    self.bind(SqlValue::Text(upper)),
                    self.bind(SqlValue::Text(segments.join("/"))),
                    self.bind(SqlValue::Integer(slashes)),
                )
            }
        }
    }

    fn filter(&mut self, field: &str, op: FilterOp, value: &Value) -> Option<String> {
        let path = json_path(field)?;
        let (e, t) = (extract(&path), json_type(&path));
        let scalar = Scalar::from_json(value)?;

        let clause = match (&scalar, op) {
            (Scalar::Null, FilterOp::Eq) => format!("({} IS NULL OR {} = 'null')", t, t),
            (Scalar::Null, FilterOp::Ne) => format!("{} <> 'null'", t),
            (Scalar::Null, _) => return None,
            (Scalar::Bool(b), FilterOp::Eq) => format!(
                "({} = {} AND {} = '{}')",
                e,
                self.bind(scalar.sql_value()),
                t,
                b
            ),
            (Scalar::Bool(b), FilterOp::Ne) => format!("{} IS NOT '{}'", t, b),
            (Scalar::Bool(_), _) => return None,
            (_, FilterOp::Ne) => format!(
                "({t} IS NULL OR {t} NOT IN ({names}) OR {e} <> {v})",
                t = t,
                names = scalar.type_names(),
                e = e,
                v = self.bind(scalar.sql_value())
            ),
            (_, op) => {
                let operator = match op {
                    FilterOp::Eq => "=",
                    FilterOp::Lt => "<",
                    FilterOp::Le => "<=",
                    FilterOp::Gt => ">",
                    FilterOp::Ge => ">=",
                    FilterOp::Ne => "<>",
                };
                format!(
                    "({} {} {} AND {} IN ({}))",
                    e,
                    operator,
                    self.bind(scalar.sql_value()),
                    t,
                    scalar.type_names()
                )
            }
        };
        Some(clause)
    }

    /// Rows strictly after `cursor`, or `None` when a cursor value has no
    /// exact SQL form.
    fn cursor(
        &mut self,
        cursor: &Cursor,
        order: &[(&str, String, Direction)],
        typed: &HashMap<&str, u8>,
        tie_break: Direction,
    ) -> Option<String> {
        let values = order
            .iter()
            .enumerate()
            .map(|(idx, _)| Scalar::from_json(cursor.values.get(idx).unwrap_or(&Value::Null)))
            .collect::<Option<Vec<_>>>()?;

        // (k1 > c1) OR (k1 = c1 AND k2 > c2) OR ... OR (all equal AND path > p)
        let mut alternatives = Vec::with_capacity(order.len() + 1);
        for idx in 0..=order.len() {
            let mut terms = Vec::with_capacity(idx + 1);
            for ((field, path, _), value) in order.iter().zip(&values).take(idx) {
                terms.push(self.equal(path, value, typed.get(field).copied()));
            }
            match order.get(idx) {
                Some((field, path, direction)) => {
                    terms.push(self.beyond(path, &values[idx], typed.get(field).copied(), *direction))
                }
                None => {
                    let op = match tie_break {
                        Direction::Asc => ">",
                        Direction::Desc => "<",
                    };
                    terms.push(format!(
                        "path {} {}",
                        op,
                        self.bind(SqlValue::Text(cursor.path.as_str().to_string()))
                    ));
                }
            }
            alternatives.push(format!("({})", terms.join(" AND ")));
        }
        Some(format!("({})", alternatives.join(" OR ")))
    }

    fn equal(&mut self, path: &str, value: &Scalar, typed: Option<u8>) -> String {
        match value {
            Scalar::Null => format!("{} = 0", rank_expr(path)),
            _ if typed == Some(value.rank()) => {
                format!("{} = {}", extract(path), self.bind(value.sql_value()))
            }
            _ => format!(
                "({} = {} AND {} = {})",
                rank_expr(path),
                value.rank(),
                extract(path),
                self.bind(value.sql_value())
            ),
        }
    }

    fn beyond(&mut self, path: &str, value: &Scalar, typed: Option<u8>, direction: Direction) -> String {
        let op = match direction {
            Direction::Asc => ">",
            Direction::Desc => "<",
        };
        match value {
            Scalar::Null => match direction {
                Direction::Asc => format!("{} > 0", rank_expr(path)),
                Direction::Desc => "0".to_string(),
            },
            _ if typed == Some(value.rank()) => {
                format!("{} {} {}", extract(path), op, self.bind(value.sql_value()))
            }
            _ => format!(
                "({rank} {op} {r} OR ({rank} = {r} AND {e} {op} {v}))",
                rank = rank_expr(path),
                r = value.rank(),
                e = extract(path),
                op = op,
                v = self.bind(value.sql_value())
            ),
        }
    }
}

/// Escape GLOB metacharacters in a literal segment.
fn glob_literal(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '*' | '?' | '[' => {
                out.push('[');
                out.push(c);
                out.push(']');
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_core::{DocPath, PathTemplate};

    #[test]
    fn test_json_path_accepts_plain_identifiers() {
        assert_eq!(json_path("metadata.updatedAt").as_deref(), Some("$.metadata.updatedAt"));
        assert_eq!(json_path("a b"), None);
        assert_eq!(json_path("it's"), None);
        assert_eq!(json_path("1st"), None);
        assert_eq!(json_path("a..b"), None);
    }

    #[test]
    fn test_exact_query_pushes_limit() {
        let query = Query::collection("c/x/events")
            .filter("metadata.processed", FilterOp::Eq, false)
            .filter("metadata.updatedAt", FilterOp::Le, 100)
            .order_by("metadata.updatedAt", Direction::Asc)
            .start_after(Cursor {
                values: vec![json!(5)],
                path: DocPath::parse("c/x/events/e1").unwrap(),
            })
            .limit(10);
        let plan = SqlPlan::build(&query, true);
        assert!(plan.limited);
        assert!(plan.rank_sorted.is_empty());
        assert!(plan.sql.contains("json_extract(data, '$.metadata.processed') = ?2"));
        assert!(plan
            .sql
            .ends_with("ORDER BY json_extract(data, '$.metadata.updatedAt') ASC, path ASC LIMIT ?7"));
        assert_eq!(plan.params.len(), 7);
        assert_eq!(plan.params[1], SqlValue::Integer(0));
    }

    #[test]
    fn test_inexact_filter_keeps_limit_in_rust() {
        let query = Query::collection("c")
            .filter("tags", FilterOp::Eq, json!(["a"]))
            .order_by("n", Direction::Asc)
            .limit(3);
        let plan = SqlPlan::build(&query, true);
        assert!(!plan.limited);
        assert!(!plan.sql.contains("LIMIT"));
    }

    #[test]
    fn test_untyped_order_sorts_by_rank() {
        let query = Query::collection("c").order_by("n", Direction::Desc).limit(3);
        let plan = SqlPlan::build(&query, true);
        assert!(plan.limited);
        assert_eq!(plan.rank_sorted, vec!["n".to_string()]);
        let page = vec![Document::new(
            DocPath::parse("c/1").unwrap(),
            json!({"n": [1, 2]}),
            1,
        )];
        assert!(plan.page_needs_full_read(&page));
    }

    #[test]
    fn test_group_scope_is_a_range() {
        let template = PathTemplate::parse("referrals/{code}/events").unwrap();
        let plan = SqlPlan::build(&Query::group(template), true);
        assert!(plan.sql.contains("collection >= ?1 AND collection < ?2"));
        assert!(!plan.sql.contains("substr"));
        assert_eq!(plan.params[0], SqlValue::Text("referrals".into()));
        assert_eq!(plan.params[2], SqlValue::Text("referrals/*/events".into()));
        assert_eq!(plan.params[3], SqlValue::Integer(2));
    }

    #[test]
    fn test_glob_literal_escapes() {
        assert_eq!(glob_literal("a*b?[c"), "a[*]b[?][[]c");
    }
}
