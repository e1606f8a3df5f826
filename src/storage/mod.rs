//! Vector store abstraction and its `SQLite` implementation.
//!
//! This module provides:
//! - [`VectorEntry`], the persisted projection of a code segment
//! - The [`VectorStore`] trait the pipelines write through
//! - [`SqliteVectorStore`], which keeps collections in a local database

mod connection;
mod entries;
mod schema;
mod vector;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub use connection::Database;
pub use entries::SqliteVectorStore;
pub use schema::{migrate, verify_schema, SCHEMA_VERSION};
pub use vector::{blob_to_vector, cosine_distance, vector_to_blob};

use crate::Result;

/// Metadata key holding the file path relative to the indexed root.
pub const FILE_PATH_KEY: &str = "filePath";

/// One stored vector with its metadata and source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: Map<String, Value>,
    pub document: String,
}

/// Equality terms over entry metadata, combined with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFilter {
    terms: BTreeMap<String, Value>,
}

impl MetadataFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `key == value` term.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.terms.insert(key.into(), value.into());
        self
    }

    /// Filter matching every entry of one source file.
    #[must_use]
    pub fn file_path(relative_path: &str) -> Self {
        Self::new().with(FILE_PATH_KEY, relative_path)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.terms.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Whether `metadata` satisfies every term.
    #[must_use]
    pub fn matches(&self, metadata: &Map<String, Value>) -> bool {
        self.terms
            .iter()
            .all(|(key, value)| metadata.get(key) == Some(value))
    }
}

/// A query hit and its distance from the query vector.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryMatch {
    pub entry: VectorEntry,
    /// Cosine distance; smaller is closer.
    pub distance: f32,
}

/// Collection lifecycle, batched upsert, similarity search and deletion.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the collection if it does not exist.
    async fn ensure_collection(&self, collection: &str) -> Result<()>;

    /// Insert or replace entries by id. Returns the number written.
    async fn upsert(&self, collection: &str, entries: &[VectorEntry]) -> Result<usize>;

    /// Up to `k` nearest entries, closest first.
    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<QueryMatch>>;

    /// All entries matching `filter`, without ranking.
    async fn get(&self, collection: &str, filter: &MetadataFilter) -> Result<Vec<VectorEntry>>;

    /// Delete entries by id. Returns the number removed.
    async fn delete_by_ids(&self, collection: &str, ids: &[String]) -> Result<usize>;

    /// Delete entries matching `filter`. An empty filter is rejected.
    async fn delete_by_metadata(&self, collection: &str, filter: &MetadataFilter) -> Result<usize>;

    /// Number of entries in the collection.
    async fn count(&self, collection: &str) -> Result<i64>;
}
