//! `SQLite`-backed [`VectorStore`].
//!
//! Metadata filters compile to `json_extract(metadata, '$."key"') = ?`
//! terms. Similarity is computed in Rust over the filtered rows.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::{Map, Value};

use super::schema::{migrate, verify_schema};
use super::vector::{blob_to_vector, cosine_distance, vector_to_blob};
use super::{Database, MetadataFilter, QueryMatch, VectorEntry, VectorStore};
use crate::error::VectorStoreError;
use crate::Result;

/// Vector store persisted in a local `SQLite` database.
#[derive(Debug, Clone)]
pub struct SqliteVectorStore {
    db: Database,
}

impl SqliteVectorStore {
    /// Open (or create) the store at `path` and apply migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self> {
        Self::from_database(Database::open(path, busy_timeout)?)
    }

    /// In-memory store for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        Self::from_database(Database::open_in_memory()?)
    }

    /// Wrap an open database, applying migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub fn from_database(db: Database) -> Result<Self> {
        db.with_conn(|conn| {
            migrate(conn)?;
            verify_schema(conn)
        })?;
        Ok(Self { db })
    }

    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }
}

fn collection_exists(conn: &Connection, collection: &str) -> Result<bool> {
    conn.query_row(
        "SELECT 1 FROM collections WHERE name = ?",
        [collection],
        |_| Ok(()),
    )
    .optional()
    .map(|row| row.is_some())
    .map_err(|e| VectorStoreError::database("failed to look up collection", e).into())
}

fn require_collection(conn: &Connection, collection: &str) -> Result<()> {
    if collection_exists(conn, collection)? {
        Ok(())
    } else {
        Err(VectorStoreError::CollectionNotFound(collection.to_string()).into())
    }
}

/// Convert a JSON scalar into the value `json_extract` yields for it.
fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => n.as_i64().map_or_else(
            || SqlValue::Real(n.as_f64().unwrap_or_default()),
            SqlValue::Integer,
        ),
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}

/// `AND`-joined SQL predicate plus its bound parameters.
fn compile_filter(filter: &MetadataFilter) -> Result<(String, Vec<SqlValue>)> {
    let mut clauses = Vec::new();
    let mut values = Vec::new();
    for (key, value) in filter.terms() {
        if key.is_empty() || key.contains(|c| c == '"' || c == '\\') {
            return Err(VectorStoreError::InvalidFilterKey(key.to_string()).into());
        }
        values.push(SqlValue::Text(format!("$.\"{key}\"")));
        if value.is_null() {
            clauses.push("json_extract(metadata, ?) IS NULL".to_string());
        } else {
            clauses.push("json_extract(metadata, ?) = ?".to_string());
            values.push(to_sql_value(value));
        }
    }
    Ok((clauses.join(" AND "), values))
}

fn decode_metadata(raw: &str) -> Result<Map<String, Value>> {
    serde_json::from_str(raw)
        .map_err(|e| VectorStoreError::Serialization(format!("bad metadata: {e}")).into())
}

/// Load entries of `collection`, optionally restricted by `filter`.
fn select_entries(
    conn: &Connection,
    collection: &str,
    filter: Option<&MetadataFilter>,
) -> Result<Vec<VectorEntry>> {
    let mut sql =
        "SELECT id, embedding, metadata, document FROM entries WHERE collection = ?".to_string();
    let mut values = vec![SqlValue::Text(collection.to_string())];
    if let Some(filter) = filter.filter(|f| !f.is_empty()) {
        let (clause, filter_values) = compile_filter(filter)?;
        sql.push_str(" AND ");
        sql.push_str(&clause);
        values.extend(filter_values);
    }
    sql.push_str(" ORDER BY id");

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| VectorStoreError::database("failed to prepare select", e))?;
    let rows = stmt
        .query_map(params_from_iter(values), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Vec<u8>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })
        .map_err(|e| VectorStoreError::database("failed to select entries", e))?;

    let mut entries = Vec::new();
    for row in rows {
        let (id, blob, metadata, document) =
            row.map_err(|e| VectorStoreError::database("failed to read entry", e))?;
        entries.push(VectorEntry {
            id,
            embedding: blob_to_vector(&blob),
            metadata: decode_metadata(&metadata)?,
            document,
        });
    }
    Ok(entries)
}

/// Row ready for the upsert statement.
struct EncodedEntry {
    id: String,
    blob: Vec<u8>,
    dimension: i64,
    metadata: String,
    document: String,
}

fn encode_entry(entry: &VectorEntry) -> Result<EncodedEntry> {
    let metadata = serde_json::to_string(&entry.metadata)
        .map_err(|e| VectorStoreError::Serialization(format!("entry '{}': {e}", entry.id)))?;
    Ok(EncodedEntry {
        id: entry.id.clone(),
        blob: vector_to_blob(&entry.embedding),
        dimension: i64::try_from(entry.embedding.len()).unwrap_or(i64::MAX),
        metadata,
        document: entry.document.clone(),
    })
}

// Every call runs on the blocking pool via `Database::call*`.
#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn ensure_collection(&self, collection: &str) -> Result<()> {
        let name = collection.to_string();
        let created = self
            .db
            .call(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO collections (name, created_at) VALUES (?, ?)",
                    params![name, chrono::Utc::now().timestamp()],
                )
                .map_err(|e| VectorStoreError::database("failed to create collection", e).into())
            })
            .await?;
        if created > 0 {
            tracing::info!(collection, "Created collection");
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        if let Some(bad) = entries.iter().find(|e| e.embedding.is_empty()) {
            return Err(VectorStoreError::InvalidEntry {
                id: bad.id.clone(),
                reason: "empty embedding".to_string(),
            }
            .into());
        }

        let rows = entries.iter().map(encode_entry).collect::<Result<Vec<_>>>()?;
        let collection = collection.to_string();
        let now = chrono::Utc::now().timestamp();
        self.db
            .call_transaction(move |conn| {
                require_collection(conn, &collection)?;
                let mut stmt = conn
                    .prepare_cached(
                        "INSERT INTO entries
                            (collection, id, embedding, dimension, metadata, document, updated_at)
                         VALUES (?, ?, ?, ?, ?, ?, ?)
                         ON CONFLICT(collection, id) DO UPDATE SET
                            embedding = excluded.embedding,
                            dimension = excluded.dimension,
                            metadata = excluded.metadata,
                            document = excluded.document,
                            updated_at = excluded.updated_at",
                    )
                    .map_err(|e| VectorStoreError::database("failed to prepare upsert", e))?;

                for row in &rows {
                    stmt.execute(params![
                        collection,
                        row.id,
                        row.blob,
                        row.dimension,
                        row.metadata,
                        row.document,
                        now,
                    ])
                    .map_err(|e| VectorStoreError::database("failed to upsert entry", e))?;
                }
                Ok(rows.len())
            })
            .await
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>> {
        let name = collection.to_string();
        let filter = filter.cloned();
        let candidates = self
            .db
            .call(move |conn| {
                require_collection(conn, &name)?;
                select_entries(conn, &name, filter.as_ref())
            })
            .await?;

        let mut matches: Vec<QueryMatch> = candidates
            .into_iter()
            .filter_map(|entry| {
                cosine_distance(embedding, &entry.embedding)
                    .map(|distance| QueryMatch { entry, distance })
            })
            .collect();
        matches.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| a.entry.id.cmp(&b.entry.id))
        });
        matches.truncate(k);
        Ok(matches)
    }

    async fn get(&self, collection: &str, filter: &MetadataFilter) -> Result<Vec<VectorEntry>> {
        let name = collection.to_string();
        let filter = filter.clone();
        self.db
            .call(move |conn| {
                require_collection(conn, &name)?;
                select_entries(conn, &name, Some(&filter))
            })
            .await
    }

    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let name = collection.to_string();
        let ids = ids.to_vec();
        self.db
            .call_transaction(move |conn| {
                require_collection(conn, &name)?;
                let mut stmt = conn
                    .prepare_cached("DELETE FROM entries WHERE collection = ? AND id = ?")
                    .map_err(|e| VectorStoreError::database("failed to prepare delete", e))?;
                let mut removed = 0;
                for id in &ids {
                    removed += stmt
                        .execute(params![name, id])
                        .map_err(|e| VectorStoreError::database("failed to delete entry", e))?;
                }
                Ok(removed)
            })
            .await
    }

    async fn delete_by_metadata(&self, collection: &str, filter: &MetadataFilter) -> Result<usize> {
        if filter.is_empty() {
            return Err(VectorStoreError::EmptyFilter.into());
        }
        let (clause, filter_values) = compile_filter(filter)?;
        let sql = format!("DELETE FROM entries WHERE collection = ? AND {clause}");
        let name = collection.to_string();
        let mut values = vec![SqlValue::Text(name.clone())];
        values.extend(filter_values);

        let removed = self
            .db
            .call_transaction(move |conn| {
                require_collection(conn, &name)?;
                conn.execute(&sql, params_from_iter(values))
                    .map_err(|e| VectorStoreError::database("failed to delete by metadata", e).into())
            })
            .await?;
        tracing::debug!(collection, removed, "Deleted entries by metadata");
        Ok(removed)
    }

    async fn count(&self, collection: &str) -> Result<i64> {
        let name = collection.to_string();
        self.db
            .call(move |conn| {
                require_collection(conn, &name)?;
                conn.query_row(
                    "SELECT COUNT(*) FROM entries WHERE collection = ?",
                    [&name],
                    |row| row.get(0),
                )
                .map_err(|e| VectorStoreError::database("failed to count entries", e).into())
            })
            .await
    }
}
