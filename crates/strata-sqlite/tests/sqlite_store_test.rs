//! SQLite store: durability and optimistic transaction behaviour

use serde_json::json;
use strata_core::{
    Direction, DocPath, DocumentStore, FilterOp, PathTemplate, Query, StoreConfig, StoreTxn,
    StrataError, WriteOp, MAX_BATCH_WRITES,
};
use strata_sqlite::SqliteStore;
use tempfile::TempDir;

fn path(p: &str) -> DocPath {
    DocPath::parse(p).unwrap()
}

fn open() -> (TempDir, SqliteStore) {
    let temp_dir = tempfile::tempdir().unwrap();
    let store = SqliteStore::open(temp_dir.path().join("strata.db")).unwrap();
    (temp_dir, store)
}

#[test]
fn test_documents_survive_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("strata.db");
    {
        let store = SqliteStore::open(&db_path).unwrap();
        store
            .commit_batch(vec![WriteOp::upsert(
                path("referrals/abc"),
                json!({"totalReferrals": 3}),
            )])
            .unwrap();
    }

    let store = SqliteStore::with_config(&StoreConfig::sqlite(&db_path)).unwrap();
    let doc = store.get(&path("referrals/abc")).unwrap().unwrap();
    assert_eq!(doc.data, json!({"totalReferrals": 3}));
    assert_eq!(doc.version, 1);
    assert_eq!(store.sequence().unwrap(), 1);
}

#[test]
fn test_memory_backend_config_rejected() {
    assert!(matches!(
        SqliteStore::with_config(&StoreConfig::memory()),
        Err(StrataError::Config(_))
    ));
}

#[test]
fn test_update_and_delete() {
    let (_dir, store) = open();
    store
        .commit_batch(vec![WriteOp::upsert(
            path("events/e1"),
            json!({"metadata": {"processed": false, "id": "e1"}}),
        )])
        .unwrap();
    store
        .commit_batch(vec![WriteOp::update(
            path("events/e1"),
            [("metadata.processed", json!(true))],
        )])
        .unwrap();
    let doc = store.get(&path("events/e1")).unwrap().unwrap();
    assert_eq!(doc.data, json!({"metadata": {"processed": true, "id": "e1"}}));
    assert_eq!(doc.version, 2);

    store
        .commit_batch(vec![WriteOp::delete(path("events/e1"))])
        .unwrap();
    assert!(store.get(&path("events/e1")).unwrap().is_none());

    let missing = store.commit_batch(vec![WriteOp::update(
        path("events/e1"),
        [("metadata.processed", json!(true))],
    )]);
    assert!(matches!(missing, Err(StrataError::NotFound(_))));
}

#[test]
fn test_batch_limit() {
    let (_dir, store) = open();
    let ops: Vec<_> = (0..=MAX_BATCH_WRITES)
        .map(|i| WriteOp::upsert(path(&format!("items/{}", i)), json!({})))
        .collect();
    assert!(matches!(
        store.commit_batch(ops),
        Err(StrataError::BatchTooLarge { .. })
    ));
    assert!(store.query(&Query::collection("items")).unwrap().is_empty());
}

#[test]
fn test_group_query_with_cursor() {
    let (_dir, store) = open();
    store
        .commit_batch(vec![
            WriteOp::upsert(path("referrals/a/events/1"), json!({"t": 1, "processed": false})),
            WriteOp::upsert(path("referrals/b/events/1"), json!({"t": 2, "processed": false})),
            WriteOp::upsert(path("referrals/b/events/2"), json!({"t": 3, "processed": true})),
            WriteOp::upsert(path("referralsx/c/events/1"), json!({"t": 0, "processed": false})),
        ])
        .unwrap();

    let template = PathTemplate::parse("referrals/{code}/events").unwrap();
    let query = Query::group(template)
        .filter("processed", FilterOp::Eq, false)
        .order_by("t", Direction::Asc)
        .limit(1);
    let first = store.query(&query).unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].path.as_str(), "referrals/a/events/1");

    let next = query.clone().start_after(query.cursor_for(&first[0]));
    let second = store.query(&next).unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].path.as_str(), "referrals/b/events/1");

    let last = query.clone().start_after(query.cursor_for(&second[0]));
    assert!(store.query(&last).unwrap().is_empty());
}

#[test]
fn test_transaction_conflict_and_retry() {
    let (_dir, store) = open();
    store
        .commit_batch(vec![WriteOp::upsert(path("counters/c"), json!({"n": 0}))])
        .unwrap();

    let mut stale = store.begin().unwrap();
    stale.get(&path("counters/c")).unwrap();
    store
        .commit_batch(vec![WriteOp::upsert(path("counters/c"), json!({"n": 5}))])
        .unwrap();
    stale
        .update(path("counters/c"), vec![("n".into(), json!(1))])
        .unwrap();
    assert!(matches!(stale.commit(), Err(StrataError::Conflict(_))));

    let mut attempts = 0;
    store
        .run_transaction(|txn| {
            attempts += 1;
            let n = txn
                .get(&path("counters/c"))?
                .and_then(|d| d.field("n").and_then(|v| v.as_i64()))
                .unwrap_or(0);
            if attempts == 1 {
                // A concurrent writer lands between read and commit.
                store.commit_batch(vec![WriteOp::upsert(path("counters/c"), json!({"n": 10}))])?;
            }
            txn.update(path("counters/c"), vec![("n".into(), json!(n + 1))])
        })
        .unwrap();

    assert_eq!(attempts, 2);
    let doc = store.get(&path("counters/c")).unwrap().unwrap();
    assert_eq!(doc.data, json!({"n": 11}));
}

fn write_events(store: &SqliteStore, collection: &str, count: usize) {
    let ops: Vec<WriteOp> = (0..count)
        .map(|i| {
            WriteOp::upsert(
                path(&format!("{}/e{:04}", collection, i)),
                json!({
                    "data": {"count": 1},
                    "metadata": {"id": format!("e{:04}", i), "processed": i % 3 == 0, "updatedAt": i as i64},
                }),
            )
        })
        .collect();
    for chunk in ops.chunks(MAX_BATCH_WRITES) {
        store.commit_batch(chunk.to_vec()).unwrap();
    }
}

#[test]
fn test_event_page_reads_only_page_rows() {
    let (_dir, store) = open();
    write_events(&store, "counters/hot/events", 1_200);
    write_events(&store, "counters/cold/events", 300);

    let query = Query::collection("counters/hot/events")
        .filter("metadata.processed", FilterOp::Eq, false)
        .filter("metadata.updatedAt", FilterOp::Le, 10_000)
        .order_by("metadata.updatedAt", Direction::Asc)
        .limit(25);

    let before = store.rows_read();
    let first = store.query(&query).unwrap();
    assert_eq!(first.len(), 25);
    assert_eq!(store.rows_read() - before, 25);
    assert_eq!(first[0].path.as_str(), "counters/hot/events/e0001");

    let before = store.rows_read();
    let next = query.clone().start_after(query.cursor_for(&first[24]));
    let second = store.query(&next).unwrap();
    assert_eq!(store.rows_read() - before, 25);
    assert!(second
        .iter()
        .all(|doc| doc.field("metadata.processed") == Some(&json!(false))));
    assert!(
        second[0].field("metadata.updatedAt").unwrap().as_i64()
            > first[24].field("metadata.updatedAt").unwrap().as_i64()
    );

    // Group scope is just as narrow.
    let template = PathTemplate::parse("counters/{code}/events").unwrap();
    let group = Query::group(template)
        .filter("metadata.processed", FilterOp::Eq, false)
        .order_by("metadata.updatedAt", Direction::Desc)
        .limit(10);
    let before = store.rows_read();
    assert_eq!(store.query(&group).unwrap().len(), 10);
    assert_eq!(store.rows_read() - before, 10);
}

#[test]
fn test_mixed_type_order_pages_like_full_read() {
    let (_dir, store) = open();
    let values = [
        json!(null),
        json!([2]),
        json!(true),
        json!(3),
        json!("x"),
        json!({"a": 1}),
        json!(2.5),
        json!([1, 0]),
        json!(false),
        json!("b"),
    ];
    let ops = values
        .iter()
        .enumerate()
        .map(|(i, v)| WriteOp::upsert(path(&format!("mixed/d{}", i)), json!({ "n": v })))
        .chain(std::iter::once(WriteOp::upsert(path("mixed/missing"), json!({}))))
        .collect();
    store.commit_batch(ops).unwrap();

    for direction in [Direction::Asc, Direction::Desc] {
        let base = Query::collection("mixed").order_by("n", direction);
        let expected = store.query(&base).unwrap();
        assert_eq!(expected.len(), 11);

        let mut paged = Vec::new();
        let mut query = base.clone().limit(3);
        loop {
            let page = store.query(&query).unwrap();
            match page.last() {
                Some(last) => query = base.clone().limit(3).start_after(query.cursor_for(last)),
                None => break,
            }
            paged.extend(page);
        }
        assert_eq!(paged, expected, "{:?}", direction);
    }
}

#[test]
fn test_pending_index_serves_event_cursor() {
    let (dir, store) = open();
    write_events(&store, "counters/hot/events", 50);
    drop(store);

    let conn = rusqlite::Connection::open(dir.path().join("strata.db")).unwrap();
    let sql = "EXPLAIN QUERY PLAN SELECT path FROM documents \
               WHERE collection = ?1 \
               AND json_extract(data, '$.metadata.processed') = 0 \
               AND json_extract(data, '$.metadata.updatedAt') <= ?2 \
               ORDER BY json_extract(data, '$.metadata.updatedAt') ASC";
    let mut stmt = conn.prepare(sql).unwrap();
    let details: Vec<String> = stmt
        .query_map(rusqlite::params!["counters/hot/events", 100], |row| row.get(3))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert!(
        details.iter().any(|d| d.contains("documents_pending")),
        "{:?}",
        details
    );
}
