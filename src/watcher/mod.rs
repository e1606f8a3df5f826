//! File system watching and incremental updates.
//!
//! This module provides:
//! - [`FileWatcher`], a notify-based watch loop on its own thread
//! - [`ChangeDispatcher`], per-path debounce onto the watch pool
//! - [`UpdateOrchestrator`], the single-file update path

pub mod dispatch;
pub mod events;
pub mod update;
#[allow(clippy::module_inception)]
pub mod watcher;

pub use dispatch::ChangeDispatcher;
pub use events::{ChangeKind, FileChange};
pub use update::{UpdateOrchestrator, UpdateOutcome};
pub use watcher::{ChangeSink, FileWatcher, WatcherStats, WatcherStatsSnapshot};
