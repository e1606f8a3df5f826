//! codeindex
//!
//! Indexes a Java source tree into a vector store and keeps it current
//! as files change. Source files are split into semantic segments,
//! embedded, and upserted with enough metadata to trace every entry back
//! to its file, line range and enclosing declaration.
//!
//! The two entry points are [`indexing::IndexingOrchestrator`] for a full
//! reindex and [`watcher::FileWatcher`] feeding
//! [`watcher::UpdateOrchestrator`] for incremental updates.

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod embeddings;
pub mod error;
pub mod indexing;
pub mod pool;
pub mod segment;
pub mod server;
pub mod storage;
pub mod watcher;

pub use config::Config;
pub use error::{Error, Result};
