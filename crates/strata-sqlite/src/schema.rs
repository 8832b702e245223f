use crate::plan::{extract, PENDING_INDEX_FIELDS};
use crate::store::db_err;
use rusqlite::Connection;
use strata_core::{Result, StrataError};

/// Current on-disk layout
pub const SCHEMA_VERSION: u32 = 1;

/// Create tables if needed and check the stored layout version.
pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS documents (
            path TEXT PRIMARY KEY,
            collection TEXT NOT NULL,
            data TEXT NOT NULL,
            version INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS documents_collection ON documents (collection);
        CREATE TABLE IF NOT EXISTS store_meta (
            id INTEGER PRIMARY KEY CHECK (id = 0),
            sequence INTEGER NOT NULL DEFAULT 0,
            schema_version INTEGER NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(db_err)?;
    conn.execute_batch(&pending_index_sql()).map_err(db_err)?;

    conn.execute(
        "INSERT OR IGNORE INTO store_meta (id, sequence, schema_version) VALUES (0, 0, ?1)",
        [SCHEMA_VERSION as i64],
    )
    .map_err(db_err)?;

    let version = schema_version(conn)?;
    if version != SCHEMA_VERSION {
        return Err(StrataError::Database(format!(
            "unsupported schema version {} (expected {})",
            version, SCHEMA_VERSION
        )));
    }
    Ok(())
}

/// Expression index serving the event cursor: unprocessed events of one
/// collection in `updatedAt` order.
fn pending_index_sql() -> String {
    let columns: Vec<String> = PENDING_INDEX_FIELDS
        .iter()
        .map(|field| extract(&format!("$.{}", field)))
        .collect();
    format!(
        "CREATE INDEX IF NOT EXISTS documents_pending ON documents (collection, {});",
        columns.join(", ")
    )
}

pub fn schema_version(conn: &Connection) -> Result<u32> {
    let version: i64 = conn
        .query_row("SELECT schema_version FROM store_meta WHERE id = 0", [], |row| {
            row.get(0)
        })
        .map_err(db_err)?;
    Ok(version as u32)
}

/// Last assigned commit sequence
pub fn sequence(conn: &Connection) -> Result<u64> {
    let sequence: i64 = conn
        .query_row("SELECT sequence FROM store_meta WHERE id = 0", [], |row| row.get(0))
        .map_err(db_err)?;
    Ok(sequence as u64)
}

pub fn set_sequence(conn: &Connection, sequence: u64) -> Result<()> {
    conn.execute(
        "UPDATE store_meta SET sequence = ?1, updated_at = datetime('now') WHERE id = 0",
        [sequence as i64],
    )
    .map_err(db_err)?;
    Ok(())
}
