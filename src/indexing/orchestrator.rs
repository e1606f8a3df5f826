//! Full reindex pipeline.
//!
//! `ensure collection -> discover -> segment -> embed -> upsert`, each stage
//! finishing before the next begins. A single compare-and-set state guards
//! entry; a second request while one run is active is rejected, not queued.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::Instrument;

use super::discovery::{DiscoveredFile, SourceDiscovery};
use super::entries::pair_embeddings;
use super::source::{segment_file, FileOutcome};
use crate::config::{Config, PoolConfig, SegmentationConfig};
use crate::embeddings::EmbeddingGateway;
use crate::error::IndexingError;
use crate::pool::StagePool;
use crate::segment::{CodeSegment, EligibilityRules, SegmentationEngine};
use crate::server::metrics;
use crate::server::observability::spans;
use crate::storage::{VectorEntry, VectorStore};
use crate::Result;

/// Reindex lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexState {
    Idle,
    Running,
}

const IDLE: u8 = 0;
const RUNNING: u8 = 1;

/// The single in-progress flag, shared with any guard it hands out.
#[derive(Debug, Default)]
struct StateCell(AtomicU8);

impl StateCell {
    fn load(&self) -> IndexState {
        if self.0.load(Ordering::Acquire) == RUNNING {
            IndexState::Running
        } else {
            IndexState::Idle
        }
    }
}

/// Holds the state at `Running`; dropping it always returns to `Idle`.
#[derive(Debug)]
pub struct RunGuard {
    cell: Arc<StateCell>,
}

impl RunGuard {
    fn acquire(cell: &Arc<StateCell>) -> Result<Self> {
        cell.0
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| IndexingError::AlreadyInProgress)?;
        metrics::INDEXING_IN_PROGRESS.set(1);
        Ok(Self {
            cell: Arc::clone(cell),
        })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.cell.0.store(IDLE, Ordering::Release);
        metrics::INDEXING_IN_PROGRESS.set(0);
    }
}

/// Counts for one full reindex.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub run_id: String,
    pub path: String,
    pub files_found: usize,
    pub files_parsed: usize,
    pub files_failed: usize,
    pub segments_parsed: usize,
    pub embeddings_missing: usize,
    pub entries_upserted: usize,
    pub batches_failed: usize,
    pub duration_ms: u64,
}

/// Outcome of the most recent run, kept for status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastRun {
    pub report: IndexReport,
    /// Cause of failure; `None` when the run completed.
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// Status snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    pub state: IndexState,
    pub last_run: Option<LastRun>,
}

/// Drives full reindex runs.
pub struct IndexingOrchestrator {
    state: Arc<StateCell>,
    engine: SegmentationEngine,
    segmentation: SegmentationConfig,
    embedder: Arc<dyn EmbeddingGateway>,
    store: Arc<dyn VectorStore>,
    collection: String,
    parse_pool: StagePool,
    store_pool: StagePool,
    parse_batch_size: usize,
    upsert_batch_size: usize,
    last_run: Mutex<Option<LastRun>>,
}

impl std::fmt::Debug for IndexingOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexingOrchestrator")
            .field("state", &self.state())
            .field("collection", &self.collection)
            .field("model", &self.embedder.model_name())
            .finish_non_exhaustive()
    }
}

impl IndexingOrchestrator {
    #[must_use]
    pub fn new(
        config: &Config,
        embedder: Arc<dyn EmbeddingGateway>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        let pools: &PoolConfig = &config.pools;
        Self {
            state: Arc::new(StateCell::default()),
            engine: SegmentationEngine::new(&config.segmentation),
            segmentation: config.segmentation.clone(),
            embedder,
            store,
            collection: config.collection.clone(),
            parse_pool: StagePool::new("parse", pools.parse_workers, pools.parse_workers),
            store_pool: StagePool::new("store", pools.store_workers, pools.store_queue),
            parse_batch_size: pools.parse_batch_size.max(1),
            upsert_batch_size: pools.upsert_batch_size.max(1),
            last_run: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn state(&self) -> IndexState {
        self.state.load()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == IndexState::Running
    }

    #[must_use]
    pub fn status(&self) -> IndexStatus {
        IndexStatus {
            state: self.state(),
            last_run: self.last_run.lock().clone(),
        }
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Run a full reindex of `base` on the caller's task.
    ///
    /// # Errors
    ///
    /// Returns [`IndexingError::AlreadyInProgress`] if a run is active, or the
    /// stage error that aborted this run.
    pub async fn run(&self, base: &Path) -> Result<IndexReport> {
        let guard = match RunGuard::acquire(&self.state) {
            Ok(guard) => guard,
            Err(e) => {
                metrics::REINDEX_RUNS.with_label_values(&["rejected"]).inc();
                return Err(e);
            }
        };
        self.run_guarded(guard, base.to_path_buf()).await
    }

    /// Start a full reindex in the background.
    ///
    /// The state check happens before this returns, so a rejection is
    /// immediate.
    ///
    /// # Errors
    ///
    /// Returns [`IndexingError::AlreadyInProgress`] if a run is active.
    pub fn start(self: &Arc<Self>, base: PathBuf) -> Result<JoinHandle<Result<IndexReport>>> {
        let guard = match RunGuard::acquire(&self.state) {
            Ok(guard) => guard,
            Err(e) => {
                metrics::REINDEX_RUNS.with_label_values(&["rejected"]).inc();
                return Err(e);
            }
        };
        let this = Arc::clone(self);
        Ok(tokio::spawn(
            async move { this.run_guarded(guard, base).await },
        ))
    }

    async fn run_guarded(&self, guard: RunGuard, base: PathBuf) -> Result<IndexReport> {
        let mut report = IndexReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            path: base.display().to_string(),
            ..IndexReport::default()
        };
        let span = spans::reindex_span(&report.run_id, &report.path);
        let started = Instant::now();

        let result = self.pipeline(&base, &mut report).instrument(span.clone()).await;

        report.duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        metrics::REINDEX_DURATION.observe(started.elapsed().as_secs_f64());
        let error = span.in_scope(|| match &result {
            Ok(()) => {
                metrics::REINDEX_RUNS.with_label_values(&["completed"]).inc();
                tracing::info!(
                    files = report.files_found,
                    segments = report.segments_parsed,
                    upserted = report.entries_upserted,
                    batches_failed = report.batches_failed,
                    duration_ms = report.duration_ms,
                    "Full reindex complete"
                );
                None
            }
            Err(e) => {
                metrics::REINDEX_RUNS.with_label_values(&["failed"]).inc();
                tracing::error!(
                    error = %e,
                    files = report.files_found,
                    segments = report.segments_parsed,
                    upserted = report.entries_upserted,
                    "Full reindex failed"
                );
                Some(e.to_string())
            }
        });
        *self.last_run.lock() = Some(LastRun {
            report: report.clone(),
            error,
            finished_at: Utc::now(),
        });
        drop(guard);

        result.map(|()| report)
    }

    async fn pipeline(&self, base: &Path, report: &mut IndexReport) -> Result<()> {
        if !base.is_dir() {
            return Err(IndexingError::NotADirectory(base.display().to_string()).into());
        }
        tracing::info!("Starting full reindex");

        self.store.ensure_collection(&self.collection).await?;

        let rules = EligibilityRules::new(&self.segmentation).with_gitignore(base);
        let files = self.discover(base, rules.clone()).await?;
        report.files_found = files.len();
        metrics::FILES_DISCOVERED.inc_by(files.len() as u64);

        let segments = self.segment_all(files, rules, report).await?;
        report.segments_parsed = segments.len();
        metrics::SEGMENTS_PARSED.inc_by(segments.len() as u64);
        if segments.is_empty() {
            tracing::info!("No segments to index");
            return Ok(());
        }

        let entries = self.embed_all(&segments, report).await?;
        drop(segments);

        self.upsert_all(entries, report).await;
        Ok(())
    }

    async fn discover(&self, base: &Path, rules: EligibilityRules) -> Result<Vec<DiscoveredFile>> {
        let root = base.to_path_buf();
        let (files, _stats) =
            tokio::task::spawn_blocking(move || SourceDiscovery::new(rules).discover(&root))
                .await
                .map_err(|e| IndexingError::Task(format!("discovery: {e}")))?;
        Ok(files)
    }

    /// Segment files in fixed-size batches on the parse pool.
    ///
    /// Batches run in parallel; results are collected in discovery order.
    async fn segment_all(
        &self,
        files: Vec<DiscoveredFile>,
        rules: EligibilityRules,
        report: &mut IndexReport,
    ) -> Result<Vec<CodeSegment>> {
        let rules = Arc::new(rules);
        let mut handles = Vec::new();
        for batch in files.chunks(self.parse_batch_size) {
            let batch = batch.to_vec();
            let engine = self.engine;
            let rules = Arc::clone(&rules);
            let handle = self
                .parse_pool
                .spawn(async move {
                    tokio::task::spawn_blocking(move || {
                        batch
                            .iter()
                            .map(|file| segment_file(&engine, &rules, &file.path, &file.relative))
                            .collect::<Vec<_>>()
                    })
                    .await
                })
                .await;
            handles.push(handle);
        }

        let mut segments = Vec::new();
        for handle in handles {
            let outcomes = handle
                .await
                .map_err(|e| IndexingError::Task(format!("parse batch: {e}")))?
                .map_err(|e| IndexingError::Task(format!("parse batch: {e}")))?;
            for outcome in outcomes {
                match outcome {
                    FileOutcome::Segmented(found) => {
                        report.files_parsed += 1;
                        segments.extend(found);
                    }
                    FileOutcome::Skipped(_) => {}
                    FileOutcome::Missing => {
                        tracing::debug!("File vanished during reindex");
                    }
                    FileOutcome::Failed(e) => {
                        tracing::warn!(error = %e, "Failed to segment file");
                        report.files_failed += 1;
                    }
                }
            }
        }
        Ok(segments)
    }

    /// Embed every segment in one gateway call.
    ///
    /// A count mismatch aborts the run; empty vectors only drop their segment.
    async fn embed_all(
        &self,
        segments: &[CodeSegment],
        report: &mut IndexReport,
    ) -> Result<Vec<VectorEntry>> {
        let texts: Vec<String> = segments.iter().map(|s| s.content.clone()).collect();
        tracing::info!(
            segments = texts.len(),
            model = self.embedder.model_name(),
            "Embedding segments"
        );
        let embeddings = self.embedder.embed_batch(&texts).await;
        if embeddings.len() != segments.len() {
            return Err(IndexingError::EmbeddingCountMismatch {
                expected: segments.len(),
                actual: embeddings.len(),
            }
            .into());
        }

        let (entries, missing) = pair_embeddings(segments, embeddings);
        report.embeddings_missing = missing;
        if missing > 0 {
            tracing::warn!(missing, "Segments without embeddings were skipped");
        }
        Ok(entries)
    }

    /// Upsert in independent batches; a failed batch is logged and counted.
    async fn upsert_all(&self, entries: Vec<VectorEntry>, report: &mut IndexReport) {
        let mut handles = Vec::new();
        let mut remaining = entries;
        while !remaining.is_empty() {
            let rest = remaining.split_off(self.upsert_batch_size.min(remaining.len()));
            let batch = std::mem::replace(&mut remaining, rest);
            let store = Arc::clone(&self.store);
            let collection = self.collection.clone();
            let handle = self
                .store_pool
                .spawn(async move {
                    let size = batch.len();
                    store.upsert(&collection, &batch).await.map_err(|e| (size, e))
                })
                .await;
            handles.push(handle);
        }

        let results = futures::future::join_all(handles).await;
        for (index, result) in results.into_iter().enumerate() {
            match result {
                Ok(Ok(written)) => {
                    report.entries_upserted += written;
                    metrics::ENTRIES_UPSERTED.inc_by(written as u64);
                }
                Ok(Err((size, e))) => {
                    tracing::error!(batch = index, size, error = %e, "Upsert batch failed");
                    report.batches_failed += 1;
                    metrics::UPSERT_BATCH_FAILURES.inc();
                }
                Err(e) => {
                    tracing::error!(batch = index, error = %e, "Upsert task failed");
                    report.batches_failed += 1;
                    metrics::UPSERT_BATCH_FAILURES.inc();
                }
            }
        }
    }
}
