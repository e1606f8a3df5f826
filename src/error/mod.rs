//! Error types and Result aliases for codeindex.
//!
//! Each subsystem has its own error enum which converts into the
//! crate-level [`Error`] via `#[from]`. File- and segment-level problems
//! are absorbed close to where they happen and never surface here; only
//! stage-level failures are propagated.

use thiserror::Error;

/// Result type alias using the crate's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for codeindex operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Source file could not be read.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// Embedding backend error.
    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Vector store error.
    #[error("vector store error: {0}")]
    VectorStore(#[from] VectorStoreError),

    /// Full reindex error.
    #[error("indexing error: {0}")]
    Indexing(#[from] IndexingError),

    /// File watching error.
    #[error("watcher error: {0}")]
    Watcher(#[from] WatcherError),

    /// Server/API error.
    #[error("server error: {0}")]
    Server(#[from] ServerError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Segmentation errors. Syntax problems are not errors; they yield no segments.
#[derive(Error, Debug)]
pub enum ParseError {
    /// The file could not be read.
    #[error("failed to read '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The grammar could not be loaded into the parser.
    #[error("grammar error: {0}")]
    Language(String),
}

/// Embedding backend errors.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Transport-level failure.
    #[error("request failed: {0}")]
    Http(String),

    /// Non-success status from the backend.
    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Body could not be decoded or had the wrong shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

/// Vector store errors.
#[derive(Error, Debug)]
pub enum VectorStoreError {
    /// `SQLite` database error.
    #[error("database error: {0}")]
    Database(String),

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Collection has not been created.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// A metadata delete was attempted without any filter terms.
    #[error("refusing to delete with an empty metadata filter")]
    EmptyFilter,

    /// Filter key that cannot be addressed as a metadata field.
    #[error("invalid metadata key '{0}'")]
    InvalidFilterKey(String),

    /// Entry rejected before it reached the database.
    #[error("invalid entry '{id}': {reason}")]
    InvalidEntry { id: String, reason: String },

    /// Metadata could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Full reindex errors.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// A reindex is already running.
    #[error("indexing already in progress")]
    AlreadyInProgress,

    /// The requested base path is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The embedding backend returned a different number of vectors than requested.
    #[error("embedding count mismatch: submitted {expected}, received {actual}")]
    EmbeddingCountMismatch { expected: usize, actual: usize },

    /// A worker task panicked or was cancelled.
    #[error("worker task failed: {0}")]
    Task(String),
}

/// File watcher errors.
#[derive(Error, Debug)]
pub enum WatcherError {
    /// Failed to watch path.
    #[error("failed to watch path '{path}': {reason}")]
    WatchFailed { path: String, reason: String },

    /// The watch root is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),

    /// The underlying notification backend could not be created.
    #[error("failed to initialise watcher: {0}")]
    Init(String),
}

/// Server/API errors.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Failed to bind to address.
    #[error("failed to bind to {address}: {reason}")]
    BindFailed { address: String, reason: String },

    /// Server loop failure.
    #[error("server runtime error: {0}")]
    Runtime(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether this error is the "already in progress" rejection.
    #[must_use]
    pub const fn is_already_in_progress(&self) -> bool {
        matches!(self, Self::Indexing(IndexingError::AlreadyInProgress))
    }
}

impl VectorStoreError {
    /// Wrap a `rusqlite` error with some context.
    pub fn database(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Database(format!("{context}: {err}"))
    }
}

#[cfg(test)]
mod tests;
