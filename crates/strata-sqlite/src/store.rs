use crate::plan::SqlPlan;
use crate::schema;
use crate::txn::SqliteTxn;
use parking_lot::Mutex;
use rusqlite::{
    params, params_from_iter, Connection, ErrorCode, OpenFlags, OptionalExtension,
    TransactionBehavior,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use strata_core::{
    resolve_writes, CommitInfo, DocPath, Document, DocumentStore, OptimisticState, Query,
    Result, StoreBackend, StoreConfig, StrataError, WriteOp, MAX_BATCH_WRITES,
};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Map a SQLite error into the store taxonomy.
///
/// Busy and locked databases are transient.
pub(crate) fn db_err(e: rusqlite::Error) -> StrataError {
    match e.sqlite_error_code() {
        Some(ErrorCode::DatabaseBusy) | Some(ErrorCode::DatabaseLocked) => {
            StrataError::Unavailable(e.to_string())
        }
        _ => StrataError::Database(e.to_string()),
    }
}

/// SQLite-backed document store
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: PathBuf,
    max_txn_attempts: usize,
    rows_read: AtomicU64,
}

impl SqliteStore {
    /// Open (or create) a store at `path` with default settings
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_attempts(path, StoreConfig::memory().max_txn_attempts)
    }

    /// Open the store a [`StoreConfig`] points at
    pub fn with_config(config: &StoreConfig) -> Result<Self> {
        match &config.backend {
            StoreBackend::Sqlite { path } => Self::open_with_attempts(path, config.max_txn_attempts),
            StoreBackend::Memory => Err(StrataError::Config(
                "store backend is 'memory', not 'sqlite'".into(),
            )),
        }
    }

    fn open_with_attempts(path: impl AsRef<Path>, max_txn_attempts: usize) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        )
        .map_err(db_err)?;
        Self::configure_connection(&conn)?;
        schema::init(&conn)?;

        tracing::debug!(path = %path.display(), "Opened sqlite document store");
        Ok(Self {
            conn: Mutex::new(conn),
            path: path.to_path_buf(),
            max_txn_attempts,
            rows_read: AtomicU64::new(0),
        })
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| StrataError::Config(e.to_string()))?;
        conn.pragma_update(None, "synchronous", "NORMAL")
            .map_err(|e| StrataError::Config(e.to_string()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| StrataError::Config(e.to_string()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Documents decoded by queries since the store was opened
    pub fn rows_read(&self) -> u64 {
        self.rows_read.load(Ordering::Relaxed)
    }

    /// Last assigned commit sequence
    pub fn sequence(&self) -> Result<u64> {
        schema::sequence(&self.conn.lock())
    }

    /// Validate a transaction's reads and apply its writes atomically.
    pub(crate) fn commit_txn(&self, state: OptimisticState) -> Result<CommitInfo> {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        state.validate(
            |path| read_doc(&tx, path),
            |query| run_query(&tx, query, &self.rows_read),
        )?;

        let ops = state.into_writes();
        if ops.is_empty() {
            let version = schema::sequence(&tx)?;
            tx.commit().map_err(db_err)?;
            return Ok(CommitInfo { writes: 0, version });
        }
        let info = apply(&tx, &ops)?;
        tx.commit().map_err(db_err)?;
        Ok(info)
    }
}

fn read_doc(conn: &Connection, path: &DocPath) -> Result<Option<Document>> {
    let row: Option<(String, i64)> = conn
        .query_row(
            "SELECT data, version FROM documents WHERE path = ?1",
            [path.as_str()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(db_err)?;
    match row {
        Some((data, version)) => Ok(Some(Document::new(
            path.clone(),
            serde_json::from_str(&data)?,
            version as u64,
        ))),
        None => Ok(None),
    }
}

fn run_query(conn: &Connection, query: &Query, rows_read: &AtomicU64) -> Result<Vec<Document>> {
    let plan = SqlPlan::build(query, true);
    let docs = fetch(conn, &plan, rows_read)?;
    if plan.page_needs_full_read(&docs) {
        tracing::trace!(sql = %plan.sql, "Page order not exact in SQL, reading scope");
        let docs = fetch(conn, &SqlPlan::build(query, false), rows_read)?;
        return Ok(query.evaluate(docs));
    }
    Ok(query.evaluate(docs))
}

fn fetch(conn: &Connection, plan: &SqlPlan, rows_read: &AtomicU64) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare_cached(&plan.sql).map_err(db_err)?;
    let rows = stmt
        .query_map(params_from_iter(plan.params.iter()), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })
        .map_err(db_err)?;

    let mut docs = Vec::new();
    for row in rows {
        let (path, data, version) = row.map_err(db_err)?;
        docs.push(Document::new(
            DocPath::parse(path)?,
            serde_json::from_str(&data)?,
            version as u64,
        ));
    }
    rows_read.fetch_add(docs.len() as u64, Ordering::Relaxed);
    Ok(docs)
}

fn apply(conn: &Connection, ops: &[WriteOp]) -> Result<CommitInfo> {
    let resolved = resolve_writes(ops, |path| Ok(read_doc(conn, path)?.map(|d| d.data)))?;
    let version = schema::sequence(conn)? + 1;

    for (path, data) in resolved {
        match data {
            Some(data) => {
                conn.execute(
                    "INSERT INTO documents (path, collection, data, version)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(path) DO UPDATE SET data = excluded.data, version = excluded.version",
                    params![
                        path.as_str(),
                        path.collection(),
                        serde_json::to_string(&data)?,
                        version as i64
                    ],
                )
                .map_err(db_err)?;
            }
            None => {
                conn.execute("DELETE FROM documents WHERE path = ?1", [path.as_str()])
                    .map_err(db_err)?;
            }
        }
    }
    schema::set_sequence(conn, version)?;

    Ok(CommitInfo {
        writes: ops.len(),
        version,
    })
}

impl DocumentStore for SqliteStore {
    type Txn<'a> = SqliteTxn<'a>;

    fn begin(&self) -> Result<Self::Txn<'_>> {
        Ok(SqliteTxn::new(self))
    }

    fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        read_doc(&self.conn.lock(), path)
    }

    fn query(&self, query: &Query) -> Result<Vec<Document>> {
        run_query(&self.conn.lock(), query, &self.rows_read)
    }

    fn commit_batch(&self, ops: Vec<WriteOp>) -> Result<CommitInfo> {
        if ops.len() > MAX_BATCH_WRITES {
            return Err(StrataError::BatchTooLarge {
                size: ops.len(),
                max: MAX_BATCH_WRITES,
            });
        }
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;
        let info = apply(&tx, &ops)?;
        tx.commit().map_err(db_err)?;
        tracing::trace!(writes = info.writes, version = info.version, "Committed batch");
        Ok(info)
    }

    fn max_txn_attempts(&self) -> usize {
        self.max_txn_attempts
    }
}
