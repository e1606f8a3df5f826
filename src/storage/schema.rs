//! Vector store schema and its migrations.

use rusqlite::Connection;

use crate::error::VectorStoreError;
use crate::Result;

/// Ordered migrations: version, description, SQL.
const MIGRATIONS: &[(i32, &str, &str)] = &[(
    1,
    "collections and entries",
    "
    CREATE TABLE IF NOT EXISTS collections (
        name TEXT PRIMARY KEY,
        created_at INTEGER NOT NULL
    );

    -- embedding: little-endian f32 blob, metadata: flat JSON object
    CREATE TABLE IF NOT EXISTS entries (
        collection TEXT NOT NULL REFERENCES collections(name) ON DELETE CASCADE,
        id TEXT NOT NULL,
        embedding BLOB NOT NULL,
        dimension INTEGER NOT NULL,
        metadata TEXT NOT NULL,
        document TEXT NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (collection, id)
    );

    CREATE INDEX IF NOT EXISTS idx_entries_file_path
        ON entries(collection, json_extract(metadata, '$.filePath'));
    ",
)];

/// Latest schema version.
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub const SCHEMA_VERSION: i32 = MIGRATIONS.len() as i32;

fn migration_err(context: &str, e: impl std::fmt::Display) -> VectorStoreError {
    VectorStoreError::Migration(format!("{context}: {e}"))
}

/// Bring the schema up to [`SCHEMA_VERSION`]. Already applied steps are skipped.
///
/// # Errors
///
/// Returns an error if a migration step fails.
pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
    )
    .map_err(|e| migration_err("schema_migrations", e))?;

    let applied = current_version(conn)?;
    for &(version, description, sql) in MIGRATIONS.iter().filter(|(v, _, _)| *v > applied) {
        tracing::info!(version, description, "Applying store migration");
        conn.execute_batch(sql)
            .map_err(|e| migration_err(&format!("v{version}"), e))?;
        conn.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            rusqlite::params![version, chrono::Utc::now().timestamp()],
        )
        .map_err(|e| migration_err("record version", e))?;
    }
    Ok(())
}

fn current_version(conn: &Connection) -> Result<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| migration_err("read version", e).into())
}

/// Fail unless every table the store reads is present.
///
/// # Errors
///
/// Returns an error naming the first missing table.
pub fn verify_schema(conn: &Connection) -> Result<()> {
    for table in ["schema_migrations", "collections", "entries"] {
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
                [table],
                |row| row.get(0),
            )
            .map_err(|e| migration_err("inspect schema", e))?;
        if !exists {
            return Err(VectorStoreError::Migration(format!("missing table '{table}'")).into());
        }
    }
    Ok(())
}
