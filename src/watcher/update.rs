//! Incremental update for one changed file.

use std::sync::Arc;

use tracing::Instrument;

use super::events::{ChangeKind, FileChange};
use crate::config::{Config, SegmentationConfig};
use crate::embeddings::EmbeddingGateway;
use crate::indexing::{pair_embeddings, segment_file, FileOutcome, IndexingOrchestrator};
use crate::segment::{EligibilityRules, SegmentationEngine};
use crate::server::metrics;
use crate::server::observability::spans;
use crate::storage::{MetadataFilter, VectorStore};
use crate::Result;

/// What an update did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Upserted { entries: usize, replaced: usize },
    Deleted { entries: usize },
    /// Nothing was written; stale entries may have been purged.
    Skipped { reason: String, purged: usize },
    Failed(String),
}

/// Applies single-file changes to the vector store.
pub struct UpdateOrchestrator {
    engine: SegmentationEngine,
    segmentation: SegmentationConfig,
    embedder: Arc<dyn EmbeddingGateway>,
    store: Arc<dyn VectorStore>,
    collection: String,
    replace_on_modify: bool,
    indexing: Option<Arc<IndexingOrchestrator>>,
}

impl std::fmt::Debug for UpdateOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateOrchestrator")
            .field("collection", &self.collection)
            .field("replace_on_modify", &self.replace_on_modify)
            .finish_non_exhaustive()
    }
}

impl UpdateOrchestrator {
    #[must_use]
    pub fn new(
        config: &Config,
        embedder: Arc<dyn EmbeddingGateway>,
        store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            engine: SegmentationEngine::new(&config.segmentation),
            segmentation: config.segmentation.clone(),
            embedder,
            store,
            collection: config.collection.clone(),
            replace_on_modify: config.updates.replace_on_modify,
            indexing: None,
        }
    }

    /// Note updates that race a full reindex in the logs.
    #[must_use]
    pub fn with_indexing(mut self, indexing: Arc<IndexingOrchestrator>) -> Self {
        self.indexing = Some(indexing);
        self
    }

    /// Apply one change. Errors are logged, never returned.
    pub async fn handle_change(&self, change: &FileChange) -> UpdateOutcome {
        let span = spans::update_span(change.kind.as_str(), &change.relative);
        async {
            metrics::FILE_UPDATES
                .with_label_values(&[change.kind.as_str()])
                .inc();
            if self.indexing.as_ref().is_some_and(|i| i.is_running()) {
                tracing::debug!("Full reindex in progress; applying update anyway");
            }

            let outcome = match self.apply(change).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    tracing::error!(error = %e, "File update failed");
                    UpdateOutcome::Failed(e.to_string())
                }
            };
            tracing::debug!(?outcome, "File update applied");
            outcome
        }
        .instrument(span)
        .await
    }

    async fn apply(&self, change: &FileChange) -> Result<UpdateOutcome> {
        self.store.ensure_collection(&self.collection).await?;

        if change.kind == ChangeKind::Delete || !change.path.exists() {
            let entries = self.purge(&change.relative).await?;
            return Ok(UpdateOutcome::Deleted { entries });
        }

        let engine = self.engine;
        let rules = EligibilityRules::new(&self.segmentation).with_gitignore(&change.root);
        let path = change.path.clone();
        let relative = change.relative.clone();
        let outcome =
            tokio::task::spawn_blocking(move || segment_file(&engine, &rules, &path, &relative))
                .await
                .map_err(|e| crate::Error::internal(format!("parse task failed: {e}")))?;

        let segments = match outcome {
            FileOutcome::Segmented(segments) if !segments.is_empty() => segments,
            FileOutcome::Segmented(_) => return self.skip(change, "no segments".into()).await,
            FileOutcome::Skipped(verdict) => {
                return self.skip(change, format!("{verdict:?}")).await;
            }
            FileOutcome::Missing => {
                let entries = self.purge(&change.relative).await?;
                return Ok(UpdateOutcome::Deleted { entries });
            }
            FileOutcome::Failed(e) => return Err(e.into()),
        };

        let texts: Vec<String> = segments.iter().map(|s| s.content.clone()).collect();
        let embeddings = self.embedder.embed_batch(&texts).await;
        if embeddings.len() != segments.len() {
            tracing::error!(
                expected = segments.len(),
                actual = embeddings.len(),
                "Embedding count mismatch; file not updated"
            );
            return Ok(UpdateOutcome::Failed(format!(
                "embedding count mismatch: submitted {}, received {}",
                segments.len(),
                embeddings.len()
            )));
        }
        let (entries, missing) = pair_embeddings(&segments, embeddings);
        if missing > 0 {
            tracing::warn!(missing, "Segments without embeddings were skipped");
        }

        let replaced = if self.replace_on_modify {
            self.purge(&change.relative).await?
        } else {
            0
        };
        let written = self.store.upsert(&self.collection, &entries).await?;
        metrics::SEGMENTS_PARSED.inc_by(segments.len() as u64);
        metrics::ENTRIES_UPSERTED.inc_by(written as u64);
        Ok(UpdateOutcome::Upserted {
            entries: written,
            replaced,
        })
    }

    async fn skip(&self, change: &FileChange, reason: String) -> Result<UpdateOutcome> {
        let purged = if self.replace_on_modify {
            self.purge(&change.relative).await?
        } else {
            0
        };
        Ok(UpdateOutcome::Skipped { reason, purged })
    }

    async fn purge(&self, relative: &str) -> Result<usize> {
        self.store
            .delete_by_metadata(&self.collection, &MetadataFilter::file_path(relative))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::PlaceholderEmbedder;
    use crate::error::EmbeddingError;
    use crate::storage::SqliteVectorStore;
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;

    const V1: &str = "package demo;\n\npublic class Cart {\n    public int size() {\n        return 0;\n    }\n}\n";
    const V2: &str = "package demo;\n\npublic class Cart {\n    public int size() {\n        return 1;\n    }\n\n    public void clear() {\n    }\n}\n";

    struct Fixture {
        dir: TempDir,
        store: Arc<SqliteVectorStore>,
        update: UpdateOrchestrator,
    }

    fn fixture_with(replace_on_modify: bool, embedder: Arc<dyn EmbeddingGateway>) -> Fixture {
        let mut config = Config::default();
        config.collection = "test".to_string();
        config.updates.replace_on_modify = replace_on_modify;
        let store = Arc::new(SqliteVectorStore::in_memory().unwrap());
        let update = UpdateOrchestrator::new(&config, embedder, store.clone());
        Fixture {
            dir: TempDir::new().unwrap(),
            store,
            update,
        }
    }

    fn fixture(replace_on_modify: bool) -> Fixture {
        fixture_with(replace_on_modify, Arc::new(PlaceholderEmbedder::new(8)))
    }

    impl Fixture {
        fn change(&self, relative: &str, kind: ChangeKind) -> FileChange {
            FileChange {
                root: self.dir.path().to_path_buf(),
                path: self.dir.path().join(relative),
                relative: relative.to_string(),
                kind,
            }
        }

        fn write(&self, relative: &str, content: &str) {
            let path = self.dir.path().join(relative);
            std::fs::create_dir_all(path.parent().unwrap_or(Path::new("."))).unwrap();
            std::fs::write(path, content).unwrap();
        }

        async fn entries(&self, relative: &str) -> usize {
            self.store
                .get("test", &MetadataFilter::file_path(relative))
                .await
                .unwrap()
                .len()
        }
    }

    #[tokio::test]
    async fn test_create_upserts_segments() {
        let fx = fixture(true);
        fx.write("src/Cart.java", V1);

        let outcome = fx
            .update
            .handle_change(&fx.change("src/Cart.java", ChangeKind::Create))
            .await;
        assert_eq!(
            outcome,
            UpdateOutcome::Upserted {
                entries: 2,
                replaced: 0
            }
        );
        assert_eq!(fx.entries("src/Cart.java").await, 2);
    }

    #[tokio::test]
    async fn test_modify_replaces_stale_entries() {
        let fx = fixture(true);
        fx.write("src/Cart.java", V1);
        fx.update
            .handle_change(&fx.change("src/Cart.java", ChangeKind::Create))
            .await;

        fx.write("src/Cart.java", V2);
        let outcome = fx
            .update
            .handle_change(&fx.change("src/Cart.java", ChangeKind::Modify))
            .await;
        assert_eq!(
            outcome,
            UpdateOutcome::Upserted {
                entries: 3,
                replaced: 2
            }
        );
        assert_eq!(fx.entries("src/Cart.java").await, 3);
    }

    #[tokio::test]
    async fn test_modify_without_replace_leaves_orphans() {
        let fx = fixture(false);
        fx.write("src/Cart.java", V1);
        fx.update
            .handle_change(&fx.change("src/Cart.java", ChangeKind::Create))
            .await;

        fx.write("src/Cart.java", V2);
        fx.update
            .handle_change(&fx.change("src/Cart.java", ChangeKind::Modify))
            .await;
        // The old class and method ids survive next to the three new ones.
        assert_eq!(fx.entries("src/Cart.java").await, 5);
    }

    #[tokio::test]
    async fn test_delete_removes_all_file_entries() {
        let fx = fixture(true);
        fx.write("src/Cart.java", V1);
        fx.update
            .handle_change(&fx.change("src/Cart.java", ChangeKind::Create))
            .await;

        std::fs::remove_file(fx.dir.path().join("src/Cart.java")).unwrap();
        let outcome = fx
            .update
            .handle_change(&fx.change("src/Cart.java", ChangeKind::Delete))
            .await;
        assert_eq!(outcome, UpdateOutcome::Deleted { entries: 2 });
        assert_eq!(fx.entries("src/Cart.java").await, 0);
    }

    #[tokio::test]
    async fn test_modify_of_missing_file_is_a_delete() {
        let fx = fixture(true);
        fx.write("src/Cart.java", V1);
        fx.update
            .handle_change(&fx.change("src/Cart.java", ChangeKind::Create))
            .await;
        std::fs::remove_file(fx.dir.path().join("src/Cart.java")).unwrap();

        let outcome = fx
            .update
            .handle_change(&fx.change("src/Cart.java", ChangeKind::Modify))
            .await;
        assert_eq!(outcome, UpdateOutcome::Deleted { entries: 2 });
    }

    #[tokio::test]
    async fn test_ineligible_file_purges_when_replacing() {
        let fx = fixture(true);
        fx.write("src/Cart.java", V1);
        fx.update
            .handle_change(&fx.change("src/Cart.java", ChangeKind::Create))
            .await;

        fx.write("src/Cart.java", "// emptied\n");
        let outcome = fx
            .update
            .handle_change(&fx.change("src/Cart.java", ChangeKind::Modify))
            .await;
        assert_eq!(
            outcome,
            UpdateOutcome::Skipped {
                reason: "no segments".to_string(),
                purged: 2
            }
        );
        assert_eq!(fx.entries("src/Cart.java").await, 0);
    }

    #[tokio::test]
    async fn test_zero_segments_without_replace_is_a_no_op() {
        let fx = fixture(false);
        fx.write("src/Cart.java", V1);
        fx.update
            .handle_change(&fx.change("src/Cart.java", ChangeKind::Create))
            .await;

        fx.write("src/Cart.java", "// emptied\n");
        fx.update
            .handle_change(&fx.change("src/Cart.java", ChangeKind::Modify))
            .await;
        assert_eq!(fx.entries("src/Cart.java").await, 2);
    }

    struct CountMismatch;

    #[async_trait]
    impl EmbeddingGateway for CountMismatch {
        async fn embed(&self, _text: &str) -> std::result::Result<Vec<f32>, EmbeddingError> {
            Ok(vec![1.0])
        }

        async fn embed_batch(&self, _texts: &[String]) -> Vec<Vec<f32>> {
            vec![vec![1.0]]
        }

        fn model_name(&self) -> &str {
            "mismatch"
        }
    }

    #[tokio::test]
    async fn test_count_mismatch_aborts_file_update() {
        let fx = fixture_with(true, Arc::new(CountMismatch));
        fx.write("src/Cart.java", V1);

        let outcome = fx
            .update
            .handle_change(&fx.change("src/Cart.java", ChangeKind::Create))
            .await;
        assert!(matches!(outcome, UpdateOutcome::Failed(ref msg) if msg.contains("mismatch")));
        assert_eq!(fx.entries("src/Cart.java").await, 0);
    }
}
