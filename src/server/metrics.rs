//! Prometheus metrics definitions.

use once_cell::sync::Lazy;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};

/// Files accepted by source discovery.
pub static FILES_DISCOVERED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "codeindex_files_discovered_total",
        "Total number of eligible source files discovered"
    )
    .expect("files_discovered metric registers once")
});

/// Segments produced by the segmentation engine.
pub static SEGMENTS_PARSED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "codeindex_segments_parsed_total",
        "Total number of code segments parsed"
    )
    .expect("segments_parsed metric registers once")
});

/// Entries written to the vector store.
pub static ENTRIES_UPSERTED: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "codeindex_entries_upserted_total",
        "Total number of vector entries upserted"
    )
    .expect("entries_upserted metric registers once")
});

/// Upsert batches that failed during a full reindex.
pub static UPSERT_BATCH_FAILURES: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "codeindex_upsert_batch_failures_total",
        "Total number of failed upsert batches"
    )
    .expect("upsert_batch_failures metric registers once")
});

/// Full reindex runs by outcome (`completed`, `failed`, `rejected`).
pub static REINDEX_RUNS: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "codeindex_reindex_runs_total",
        "Total number of full reindex requests by outcome",
        &["outcome"]
    )
    .expect("reindex_runs metric registers once")
});

/// Full reindex wall-clock duration.
pub static REINDEX_DURATION: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "codeindex_reindex_duration_seconds",
        "Full reindex duration in seconds",
        vec![0.1, 0.5, 1.0, 5.0, 15.0, 60.0, 300.0, 900.0]
    )
    .expect("reindex_duration metric registers once")
});

/// Incremental updates by change kind.
pub static FILE_UPDATES: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "codeindex_file_updates_total",
        "Total number of incremental file updates by change kind",
        &["change"]
    )
    .expect("file_updates metric registers once")
});

/// Watch overflow notifications.
pub static WATCH_OVERFLOWS: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(
        "codeindex_watch_overflows_total",
        "Total number of file watch overflow notifications"
    )
    .expect("watch_overflows metric registers once")
});

/// 1 while a full reindex is running.
pub static INDEXING_IN_PROGRESS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!(
        "codeindex_indexing_in_progress",
        "Whether a full reindex is currently running"
    )
    .expect("indexing_in_progress metric registers once")
});

/// Initialize all metrics (call once at startup).
pub fn init_metrics() {
    Lazy::force(&FILES_DISCOVERED);
    Lazy::force(&SEGMENTS_PARSED);
    Lazy::force(&ENTRIES_UPSERTED);
    Lazy::force(&UPSERT_BATCH_FAILURES);
    Lazy::force(&REINDEX_RUNS);
    Lazy::force(&REINDEX_DURATION);
    Lazy::force(&FILE_UPDATES);
    Lazy::force(&WATCH_OVERFLOWS);
    Lazy::force(&INDEXING_IN_PROGRESS);

    tracing::debug!("Prometheus metrics initialized");
}
