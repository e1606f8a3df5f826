//! Source discovery for a full reindex.
//!
//! Walks a directory respecting .gitignore and returns the files that pass
//! the eligibility rules, in walk order.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use ignore::WalkBuilder;

use crate::segment::{Eligibility, EligibilityRules};

/// Discovery statistics.
#[derive(Debug, Default)]
pub struct DiscoveryStats {
    pub files_seen: AtomicU64,
    pub files_eligible: AtomicU64,
    pub files_skipped: AtomicU64,
    pub errors: AtomicU64,
}

impl DiscoveryStats {
    #[must_use]
    pub fn snapshot(&self) -> DiscoveryStatsSnapshot {
        DiscoveryStatsSnapshot {
            files_seen: self.files_seen.load(Ordering::Relaxed),
            files_eligible: self.files_eligible.load(Ordering::Relaxed),
            files_skipped: self.files_skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of discovery stats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryStatsSnapshot {
    pub files_seen: u64,
    pub files_eligible: u64,
    pub files_skipped: u64,
    pub errors: u64,
}

/// A file accepted by discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    /// Path below the root, `/`-separated.
    pub relative: String,
    pub size: u64,
}

/// Walks a source tree and applies the eligibility path and size rules.
///
/// The content scan happens later, when the file is read for parsing.
#[derive(Debug, Clone)]
pub struct SourceDiscovery {
    rules: EligibilityRules,
}

impl SourceDiscovery {
    #[must_use]
    pub const fn new(rules: EligibilityRules) -> Self {
        Self { rules }
    }

    #[must_use]
    pub const fn rules(&self) -> &EligibilityRules {
        &self.rules
    }

    /// Collect every eligible file below `root`.
    #[must_use]
    pub fn discover(&self, root: &Path) -> (Vec<DiscoveredFile>, DiscoveryStatsSnapshot) {
        let stats = DiscoveryStats::default();
        let mut files = Vec::new();

        tracing::info!(path = %root.display(), "Starting source discovery");

        let walker = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(false)
            .git_exclude(true)
            .ignore(true)
            .parents(false)
            .require_git(false)
            .sort_by_file_path(|a, b| a.cmp(b))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "Error walking directory");
                    stats.errors.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            stats.files_seen.fetch_add(1, Ordering::Relaxed);

            let path = entry.path();
            let Some(relative) = relative_path(root, path) else {
                stats.files_skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            };

            let verdict = self.rules.check_path(Path::new(&relative));
            if !verdict.is_eligible() {
                if verdict != Eligibility::UnsupportedExtension {
                    tracing::debug!(path = %relative, reason = ?verdict, "Skipping file");
                }
                stats.files_skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            let size = match entry.metadata() {
                Ok(meta) => meta.len(),
                Err(e) => {
                    tracing::warn!(path = %relative, error = %e, "Failed to stat file");
                    stats.errors.fetch_add(1, Ordering::Relaxed);
                    continue;
                }
            };
            if let verdict @ Eligibility::TooLarge { .. } = self.rules.check_size(size) {
                tracing::debug!(path = %relative, reason = ?verdict, "Skipping file");
                stats.files_skipped.fetch_add(1, Ordering::Relaxed);
                continue;
            }

            stats.files_eligible.fetch_add(1, Ordering::Relaxed);
            files.push(DiscoveredFile {
                path: path.to_path_buf(),
                relative,
                size,
            });
        }

        let snapshot = stats.snapshot();
        tracing::info!(
            path = %root.display(),
            seen = snapshot.files_seen,
            eligible = snapshot.files_eligible,
            skipped = snapshot.files_skipped,
            errors = snapshot.errors,
            "Source discovery complete"
        );
        (files, snapshot)
    }
}

/// `path` relative to `root` with `/` separators, or `None` if it is not below `root`.
#[must_use]
pub fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}
