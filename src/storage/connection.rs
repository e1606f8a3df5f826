//! `SQLite` handle shared by the vector store.
//!
//! A single connection guarded by a `parking_lot::Mutex`. Writers take an
//! immediate transaction so concurrent upsert batches queue on the lock
//! rather than failing with `SQLITE_BUSY` halfway through.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, TransactionBehavior};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::VectorStoreError;
use crate::Result;

const IN_MEMORY: &str = ":memory:";

/// Shared `SQLite` handle; clones point at the same connection.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    location: Arc<str>,
}

impl Database {
    /// Open (or create) the store file at `path`. Missing parent
    /// directories are created.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or the pragmas fail.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|e| VectorStoreError::database("open", e))?;
        Self::from_connection(conn, &path.to_string_lossy(), busy_timeout)
    }

    /// Private in-memory store, used by tests and benches.
    ///
    /// # Errors
    ///
    /// Returns an error if `SQLite` cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| VectorStoreError::database("open in-memory", e))?;
        Self::from_connection(conn, IN_MEMORY, Duration::from_secs(5))
    }

    fn from_connection(conn: Connection, location: &str, busy_timeout: Duration) -> Result<Self> {
        conn.busy_timeout(busy_timeout)
            .map_err(|e| VectorStoreError::database("busy_timeout", e))?;

        let journal: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(|e| VectorStoreError::database("journal_mode", e))?;
        for (pragma, value) in [
            ("synchronous", "NORMAL"),
            ("temp_store", "MEMORY"),
            ("foreign_keys", "ON"),
        ] {
            conn.pragma_update(None, pragma, value)
                .map_err(|e| VectorStoreError::database(pragma, e))?;
        }

        tracing::debug!(location, journal = %journal, "Vector store connection ready");
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            location: Arc::from(location),
        })
    }

    /// Run `f` while holding the connection.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        f(&self.conn.lock())
    }

    /// Run `f` inside an immediate transaction. Nothing `f` wrote survives
    /// if it returns an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction cannot begin or commit, or if `f` fails.
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| VectorStoreError::database("begin", e))?;
        let value = f(&tx)?;
        tx.commit()
            .map_err(|e| VectorStoreError::database("commit", e))?;
        Ok(value)
    }

    /// [`Self::with_conn`] on the blocking pool, so only the calling task waits.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`, or reports a task that panicked.
    pub async fn call<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_conn(f))
            .await
            .map_err(|e| crate::Error::internal(format!("store task failed: {e}")))?
    }

    /// [`Self::with_transaction`] on the blocking pool.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`, or reports a task that panicked.
    pub async fn call_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || db.with_transaction(f))
            .await
            .map_err(|e| crate::Error::internal(format!("store task failed: {e}")))?
    }

    /// File path, or `:memory:`.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.location
    }

    /// Round-trip a trivial query.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection is unusable.
    pub fn health_check(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| VectorStoreError::database("health check", e).into())
        })
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Database").field(&self.location).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn table_rows(db: &Database) -> i64 {
        db.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
                .map_err(|e| VectorStoreError::database("count", e).into())
        })
        .unwrap()
    }

    fn with_table() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)", [])
                .map_err(|e| VectorStoreError::database("create", e))?;
            Ok(())
        })
        .unwrap();
        db
    }

    #[test]
    fn test_in_memory_location() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.path(), IN_MEMORY);
        db.health_check().unwrap();
    }

    #[test]
    fn test_open_file_uses_wal() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a").join("b").join("index.db");

        let db = Database::open(&path, Duration::from_millis(500)).unwrap();
        assert!(path.exists());
        let mode: String = db
            .with_conn(|conn| {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
                    .map_err(|e| VectorStoreError::database("pragma", e).into())
            })
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_transaction_commits() {
        let db = with_table();
        db.with_transaction(|conn| {
            conn.execute("INSERT INTO t (id) VALUES (1), (2)", [])
                .map_err(|e| VectorStoreError::database("insert", e))?;
            Ok(())
        })
        .unwrap();
        assert_eq!(table_rows(&db), 2);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = with_table();
        let result: Result<()> = db.with_transaction(|conn| {
            conn.execute("INSERT INTO t (id) VALUES (1)", [])
                .map_err(|e| VectorStoreError::database("insert", e))?;
            Err(crate::Error::internal("abort"))
        });
        assert!(result.is_err());
        assert_eq!(table_rows(&db), 0);
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_call_runs_off_the_runtime_thread() {
        let db = with_table();
        let caller = std::thread::current().id();
        let worker = db
            .call_transaction(|conn| {
                conn.execute("INSERT INTO t (id) VALUES (3)", [])
                    .map_err(|e| VectorStoreError::database("insert", e))?;
                Ok(std::thread::current().id())
            })
            .await
            .unwrap();
        assert_ne!(worker, caller);

        let rows: i64 = db
            .call(|conn| {
                conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
                    .map_err(|e| VectorStoreError::database("count", e).into())
            })
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[test]
    fn test_clones_share_connection() {
        let db = with_table();
        let other = db.clone();
        other
            .with_conn(|conn| {
                conn.execute("INSERT INTO t (id) VALUES (7)", [])
                    .map_err(|e| VectorStoreError::database("insert", e))?;
                Ok(())
            })
            .unwrap();
        assert_eq!(table_rows(&db), 1);
    }
}
