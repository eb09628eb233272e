//! Local relational store backing the caching catalogs.
//!
//! Each remote source owns one SQLite database holding its entity tables,
//! grouping tables (many-to-many relations) and a `timestamps` table of
//! collection lifetimes. All access goes through [`Store::transaction`]
//! so a refetch updates rows and lifetime atomically.

use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use thiserror::Error;
use tracing::debug;

/// Errors from the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create store directory: {0}")]
    Io(#[from] std::io::Error),
}

/// SQLite connection guarded for use from worker threads.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Opens (or creates) the database at `path` and applies `schema`.
    pub fn open(path: &Path, schema: &str) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!(path = %path.display(), "Opened catalog store");
        Self::with_connection(conn, schema)
    }

    /// Opens a private in-memory database with `schema`.
    pub fn open_in_memory(schema: &str) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, schema)
    }

    fn with_connection(conn: Connection, schema: &str) -> Result<Self, StoreError> {
        conn.execute_batch(TIMESTAMPS_SCHEMA)?;
        conn.execute_batch(schema)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Runs `f` inside a transaction.
    ///
    /// The transaction commits when `f` returns `Ok` and rolls back when it
    /// returns `Err`, leaving rows and lifetimes untouched.
    pub fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<StoreError>,
    {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(StoreError::from)?;
        let value = f(&tx)?;
        tx.commit().map_err(StoreError::from)?;
        Ok(value)
    }

    /// Runs a read-only closure against the connection.
    pub fn read<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    {
        let conn = self.conn.lock();
        Ok(f(&conn)?)
    }

    /// Number of rows in `table`.
    pub fn count(&self, table: &str) -> Result<u64, StoreError> {
        self.read(|conn| {
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|n| n as u64)
        })
    }
}

// =============================================================================
// Timestamps
// =============================================================================

const TIMESTAMPS_SCHEMA: &str =
    "CREATE TABLE IF NOT EXISTS timestamps (_id TEXT PRIMARY KEY, stamp INTEGER NOT NULL);";

/// Last update time of a collection, in seconds since the epoch.
pub fn read_timestamp(tx: &Connection, key: &str) -> Result<Option<i64>, StoreError> {
    Ok(tx
        .query_row(
            "SELECT stamp FROM timestamps WHERE _id = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?)
}

/// Records `stamp` as the last update time of a collection.
pub fn write_timestamp(tx: &Connection, key: &str, stamp: i64) -> Result<(), StoreError> {
    tx.execute(
        "INSERT OR REPLACE INTO timestamps (_id, stamp) VALUES (?1, ?2)",
        params![key, stamp],
    )?;
    Ok(())
}

// =============================================================================
// Groupings
// =============================================================================

/// Many-to-many relation table keyed by `(group << 32) | item`.
///
/// The synthetic key makes repeated inserts of the same pair idempotent.
#[derive(Debug, Clone, Copy)]
pub struct Grouping {
    table: &'static str,
}

impl Grouping {
    pub const fn new(table: &'static str) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    /// DDL creating the table.
    pub fn schema(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (hash INTEGER PRIMARY KEY, \
             group_id INTEGER NOT NULL, item_id INTEGER NOT NULL);\
             CREATE INDEX IF NOT EXISTS {}_group ON {} (group_id);",
            self.table, self.table, self.table
        )
    }

    /// Synthetic key of a pair.
    pub fn hash(group: u32, item: u32) -> i64 {
        (((group as u64) << 32) | item as u64) as i64
    }

    /// Adds `item` to `group`.
    pub fn add(&self, tx: &Connection, group: u32, item: u32) -> Result<(), StoreError> {
        tx.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (hash, group_id, item_id) VALUES (?1, ?2, ?3)",
                self.table
            ),
            params![Self::hash(group, item), group, item],
        )?;
        Ok(())
    }

    /// Subquery selecting the item ids of `?1`'s group.
    pub fn items_subquery(&self) -> String {
        format!("SELECT item_id FROM {} WHERE group_id = ?1", self.table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GROUPING: Grouping = Grouping::new("author_tracks");

    fn store() -> Store {
        let schema = format!(
            "CREATE TABLE IF NOT EXISTS tracks (_id INTEGER PRIMARY KEY, title TEXT);{}",
            GROUPING.schema()
        );
        Store::open_in_memory(&schema).unwrap()
    }

    #[test]
    fn test_grouping_hash() {
        assert_eq!(Grouping::hash(1, 2), (1i64 << 32) | 2);
        assert_ne!(Grouping::hash(1, 2), Grouping::hash(2, 1));
    }

    #[test]
    fn test_grouping_idempotent() {
        let store = store();
        for _ in 0..3 {
            store
                .transaction(|tx| GROUPING.add(tx, 7, 42))
                .unwrap();
        }
        assert_eq!(store.count("author_tracks").unwrap(), 1);
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let store = store();
        store
            .transaction(|tx| {
                assert_eq!(read_timestamp(tx, "authors")?, None);
                write_timestamp(tx, "authors", 1000)?;
                write_timestamp(tx, "authors", 2000)
            })
            .unwrap();
        let stamp = store.read(|conn| {
            conn.query_row("SELECT stamp FROM timestamps WHERE _id='authors'", [], |r| {
                r.get::<_, i64>(0)
            })
        });
        assert_eq!(stamp.unwrap(), 2000);
    }

    #[test]
    fn test_rollback_on_error() {
        let store = store();
        let result: Result<(), StoreError> = store.transaction(|tx| {
            tx.execute("INSERT INTO tracks (_id, title) VALUES (1, 'a')", [])?;
            Err(StoreError::Io(std::io::Error::other("boom")))
        });
        assert!(result.is_err());
        assert_eq!(store.count("tracks").unwrap(), 0);
    }

    #[test]
    fn test_open_on_disk() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("nested/zxart.db");
        {
            let store = Store::open(&path, "CREATE TABLE IF NOT EXISTS t (x INTEGER);").unwrap();
            store
                .transaction(|tx| write_timestamp(tx, "k", 5))
                .unwrap();
        }
        let store = Store::open(&path, "CREATE TABLE IF NOT EXISTS t (x INTEGER);").unwrap();
        assert_eq!(store.count("timestamps").unwrap(), 1);
    }
}
