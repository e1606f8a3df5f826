//! Full reindex: discovery, segmentation, embedding and batched upsert.
//!
//! This module provides:
//! - [`SourceDiscovery`], the eligible-file walk
//! - Segment to [`VectorEntry`](crate::storage::VectorEntry) projection
//! - [`IndexingOrchestrator`], the mutually exclusive reindex driver

pub mod discovery;
pub mod entries;
pub mod orchestrator;
pub mod source;

pub use discovery::{relative_path, DiscoveredFile, DiscoveryStatsSnapshot, SourceDiscovery};
pub use entries::{entry_metadata, pair_embeddings, to_entry};
pub use orchestrator::{
    IndexReport, IndexState, IndexStatus, IndexingOrchestrator, LastRun, RunGuard,
};
pub use source::{segment_file, FileOutcome};
