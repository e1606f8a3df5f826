//! File system watcher using notify-rs.
//!
//! Every non-excluded directory is registered non-recursively so that
//! newly created subtrees can be picked up and deleted ones dropped. One
//! dedicated thread blocks on the notify channel and hands classified
//! changes to a [`ChangeSink`] without waiting on them.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{select, unbounded, Receiver, Sender};
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde::Serialize;
use walkdir::WalkDir;

use super::events::{classify, classify_rename_both, ChangeKind, FileChange};
use crate::error::WatcherError;
use crate::indexing::relative_path;
use crate::segment::EligibilityRules;
use crate::server::metrics;
use crate::Result;

/// Receives changes from the watch loop. Must not block.
pub trait ChangeSink: Send + Sync {
    fn submit(&self, change: FileChange);
}

/// Watcher counters.
#[derive(Debug, Default)]
pub struct WatcherStats {
    pub events_seen: AtomicU64,
    pub changes_dispatched: AtomicU64,
    pub events_ignored: AtomicU64,
    pub overflows: AtomicU64,
    pub directories_registered: AtomicU64,
}

impl WatcherStats {
    #[must_use]
    pub fn snapshot(&self) -> WatcherStatsSnapshot {
        WatcherStatsSnapshot {
            events_seen: self.events_seen.load(Ordering::Relaxed),
            changes_dispatched: self.changes_dispatched.load(Ordering::Relaxed),
            events_ignored: self.events_ignored.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            directories_registered: self.directories_registered.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of watcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WatcherStatsSnapshot {
    pub events_seen: u64,
    pub changes_dispatched: u64,
    pub events_ignored: u64,
    pub overflows: u64,
    pub directories_registered: u64,
}

struct ActiveWatch {
    stop_tx: Sender<()>,
    thread: JoinHandle<()>,
}

/// Watches one directory tree and feeds a [`ChangeSink`].
pub struct FileWatcher {
    root: Mutex<PathBuf>,
    rules: EligibilityRules,
    sink: Arc<dyn ChangeSink>,
    stats: Arc<WatcherStats>,
    running: Arc<AtomicBool>,
    active: Mutex<Option<ActiveWatch>>,
}

impl std::fmt::Debug for FileWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileWatcher")
            .field("root", &*self.root.lock())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl FileWatcher {
    /// Watcher for `root`. Only files with a supported extension are reported.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, rules: EligibilityRules, sink: Arc<dyn ChangeSink>) -> Self {
        Self {
            root: Mutex::new(root.into()),
            rules,
            sink,
            stats: Arc::new(WatcherStats::default()),
            running: Arc::new(AtomicBool::new(false)),
            active: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn root(&self) -> PathBuf {
        self.root.lock().clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn stats(&self) -> WatcherStatsSnapshot {
        self.stats.snapshot()
    }

    /// Register the tree and start the watch thread. No-op when running.
    ///
    /// # Errors
    ///
    /// Returns an error if the root is not a directory or the backend
    /// cannot be created.
    pub fn start(&self) -> Result<()> {
        let mut active = self.active.lock();
        if active.is_some() && self.is_running() {
            return Ok(());
        }
        if let Some(stale) = active.take() {
            join_loop(stale.thread);
        }

        let root = self.root();
        if !root.is_dir() {
            return Err(WatcherError::NotADirectory(root.display().to_string()).into());
        }

        let (event_tx, event_rx) = unbounded::<notify::Result<Event>>();
        let watcher = RecommendedWatcher::new(
            move |res| {
                let _ = event_tx.send(res);
            },
            notify::Config::default(),
        )
        .map_err(|e| WatcherError::Init(e.to_string()))?;

        let mut state = LoopState {
            root: root.clone(),
            rules: self.rules.clone(),
            sink: Arc::clone(&self.sink),
            stats: Arc::clone(&self.stats),
            watcher,
            registered: HashSet::new(),
        };
        state.register_tree(&root, false);
        if state.registered.is_empty() {
            return Err(WatcherError::WatchFailed {
                path: root.display().to_string(),
                reason: "no directory could be registered".to_string(),
            }
            .into());
        }

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let running = Arc::clone(&self.running);
        running.store(true, Ordering::Release);
        let thread = std::thread::Builder::new()
            .name("codeindex-watch".to_string())
            .spawn(move || {
                state.run(&event_rx, &stop_rx);
                running.store(false, Ordering::Release);
            })
            .map_err(|e| {
                self.running.store(false, Ordering::Release);
                WatcherError::Init(e.to_string())
            })?;

        tracing::info!(path = %root.display(), "File watcher started");
        *active = Some(ActiveWatch { stop_tx, thread });
        Ok(())
    }

    /// Stop the watch thread and release all registrations. No-op when stopped.
    ///
    /// Changes already handed to the sink are not cancelled.
    pub fn stop(&self) {
        let Some(active) = self.active.lock().take() else {
            return;
        };
        let _ = active.stop_tx.send(());
        join_loop(active.thread);
        tracing::info!(path = %self.root().display(), "File watcher stopped");
    }

    /// Stop, switch to `root`, and start again.
    ///
    /// # Errors
    ///
    /// Returns an error if the new root cannot be watched.
    pub fn restart_at(&self, root: impl Into<PathBuf>) -> Result<()> {
        self.stop();
        *self.root.lock() = root.into();
        self.start()
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn join_loop(thread: JoinHandle<()>) {
    if thread.join().is_err() {
        tracing::error!("Watch thread panicked");
    }
}

/// State owned by the watch thread.
struct LoopState {
    root: PathBuf,
    rules: EligibilityRules,
    sink: Arc<dyn ChangeSink>,
    stats: Arc<WatcherStats>,
    watcher: RecommendedWatcher,
    registered: HashSet<PathBuf>,
}

impl LoopState {
    fn run(&mut self, events: &Receiver<notify::Result<Event>>, stop: &Receiver<()>) {
        loop {
            select! {
                recv(stop) -> _ => break,
                recv(events) -> msg => match msg {
                    Ok(Ok(event)) => self.handle_event(event),
                    Ok(Err(e)) => tracing::warn!(error = %e, "Watch error"),
                    Err(_) => break,
                },
            }
            if self.registered.is_empty() {
                tracing::warn!(path = %self.root.display(), "No valid watch registrations left");
                break;
            }
        }

        for dir in std::mem::take(&mut self.registered) {
            let _ = self.watcher.unwatch(&dir);
        }
    }

    fn handle_event(&mut self, event: Event) {
        self.stats.events_seen.fetch_add(1, Ordering::Relaxed);

        if event.need_rescan() {
            self.stats.overflows.fetch_add(1, Ordering::Relaxed);
            metrics::WATCH_OVERFLOWS.inc();
            tracing::warn!(
                path = %self.root.display(),
                "Watch overflow: some events were dropped; run a full reindex to reconcile"
            );
        }

        if matches!(event.kind, EventKind::Modify(ModifyKind::Name(RenameMode::Both))) {
            for (path, kind) in classify_rename_both(&event.paths) {
                self.handle_path(path, kind);
            }
            return;
        }

        for path in event.paths {
            match classify(&event.kind, &path) {
                Some(kind) => self.handle_path(path, kind),
                None => {
                    self.stats.events_ignored.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    fn handle_path(&mut self, path: PathBuf, kind: ChangeKind) {
        match kind {
            ChangeKind::Delete if self.registered.contains(&path) => {
                self.drop_tree(&path);
                return;
            }
            ChangeKind::Create if path.is_dir() => {
                if is_skipped_dir(&path) {
                    self.stats.events_ignored.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.register_tree(&path, true);
                }
                return;
            }
            _ => {}
        }

        if path.is_dir() || !self.rules.has_supported_extension(&path) {
            self.stats.events_ignored.fetch_add(1, Ordering::Relaxed);
            return;
        }
        self.dispatch(path, kind);
    }

    fn dispatch(&self, path: PathBuf, kind: ChangeKind) {
        let Some(relative) = relative_path(&self.root, &path) else {
            self.stats.events_ignored.fetch_add(1, Ordering::Relaxed);
            return;
        };
        tracing::debug!(path = %relative, change = %kind, "File change");
        self.stats.changes_dispatched.fetch_add(1, Ordering::Relaxed);
        self.sink.submit(FileChange {
            root: self.root.clone(),
            path,
            relative,
            kind,
        });
    }

    /// Register `dir` and its non-excluded subdirectories. `dir` itself is
    /// always registered, so callers screen it first.
    ///
    /// With `announce`, supported files already present are reported as
    /// created, since they may predate the registration.
    fn register_tree(&mut self, dir: &Path, announce: bool) {
        let walker = WalkDir::new(dir)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_type().is_dir() || !is_skipped_dir(e.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping unreadable path");
                    continue;
                }
            };
            let path = entry.path();
            if entry.file_type().is_dir() {
                if self.registered.contains(path) {
                    continue;
                }
                match self.watcher.watch(path, RecursiveMode::NonRecursive) {
                    Ok(()) => {
                        self.registered.insert(path.to_path_buf());
                        self.stats
                            .directories_registered
                            .fetch_add(1, Ordering::Relaxed);
                        tracing::trace!(path = %path.display(), "Watching directory");
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "Failed to watch directory");
                    }
                }
            } else if announce && self.rules.has_supported_extension(path) {
                self.dispatch(path.to_path_buf(), ChangeKind::Create);
            }
        }
    }

    /// Forget `dir` and everything registered below it.
    fn drop_tree(&mut self, dir: &Path) {
        let gone: Vec<PathBuf> = self
            .registered
            .iter()
            .filter(|p| p.starts_with(dir))
            .cloned()
            .collect();
        for path in gone {
            let _ = self.watcher.unwatch(&path);
            self.registered.remove(&path);
        }
        tracing::debug!(path = %dir.display(), "Dropped watch registration");
    }
}

fn is_skipped_dir(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.starts_with('.') || EligibilityRules::is_excluded_dir(name))
}
