//! Eligibility pre-filter applied before a file reaches the segmentation engine.
//!
//! Rejects tests, generated sources, build artifacts, oversized files and
//! files whose head uses syntax the engine does not segment.

use std::path::{Component, Path};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::SegmentationConfig;

/// Directory names whose contents are never indexed.
const EXCLUDED_DIRS: &[&str] = &["target", "build", ".git", ".idea", "node_modules"];

/// Directory names that hold test sources.
const TEST_DIRS: &[&str] = &["test", "tests"];

/// Lines inspected by the unsupported-syntax scan.
const SYNTAX_SCAN_LINES: usize = 50;

/// Tokens that mark newer language features.
const UNSUPPORTED_TOKENS: &[&str] = &["record ", "sealed ", "permits ", "yield "];

/// Unnamed variable or pattern (`_`) used as an identifier.
static UNNAMED_VARIABLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b_\s*[,;)]").expect("unnamed-variable pattern is valid"));

/// Outcome of an eligibility check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// Extension outside the supported set.
    UnsupportedExtension,
    /// Test, generated, ignored or build-artifact path.
    ExcludedPath(&'static str),
    TooLarge { size: u64, limit: u64 },
    /// Head of the file uses syntax the engine skips.
    UnsupportedSyntax(&'static str),
}

impl Eligibility {
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }
}

/// Rules shared by discovery and incremental updates.
#[derive(Debug, Clone)]
pub struct EligibilityRules {
    max_file_size: u64,
    extensions: Vec<String>,
    gitignore: Option<Gitignore>,
}

impl EligibilityRules {
    #[must_use]
    pub fn new(config: &SegmentationConfig) -> Self {
        Self {
            max_file_size: config.max_file_size,
            extensions: config
                .extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
            gitignore: None,
        }
    }

    /// Also honor the `.gitignore` at `root`, if there is one.
    #[must_use]
    pub fn with_gitignore(mut self, root: &Path) -> Self {
        let gitignore_path = root.join(".gitignore");
        if gitignore_path.exists() {
            let mut builder = GitignoreBuilder::new(root);
            if builder.add(&gitignore_path).is_none() {
                self.gitignore = builder.build().ok();
            }
        }
        self
    }

    /// Whether the extension is in the supported set.
    #[must_use]
    pub fn has_supported_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| *e == ext.to_lowercase()))
    }

    /// Path-only checks. `relative` is the path below the indexed root.
    #[must_use]
    pub fn check_path(&self, relative: &Path) -> Eligibility {
        if !self.has_supported_extension(relative) {
            return Eligibility::UnsupportedExtension;
        }

        if let Some(name) = relative.file_name().and_then(|n| n.to_str()) {
            if name.contains("Test") || name.contains("test") {
                return Eligibility::ExcludedPath("test source");
            }
            if name.starts_with("Generated") {
                return Eligibility::ExcludedPath("generated source");
            }
        }

        let dirs = relative
            .parent()
            .into_iter()
            .flat_map(Path::components)
            .filter_map(|c| match c {
                Component::Normal(part) => part.to_str(),
                _ => None,
            });
        for dir in dirs {
            if TEST_DIRS.contains(&dir) {
                return Eligibility::ExcludedPath("test source");
            }
            if Self::is_excluded_dir(dir) {
                return Eligibility::ExcludedPath("build artifact or tool directory");
            }
        }

        if let Some(gi) = &self.gitignore {
            if gi.matched_path_or_any_parents(relative, false).is_ignore() {
                return Eligibility::ExcludedPath("gitignored");
            }
        }

        Eligibility::Eligible
    }

    /// Whether a directory with this name is skipped entirely.
    #[must_use]
    pub fn is_excluded_dir(name: &str) -> bool {
        EXCLUDED_DIRS.contains(&name)
    }

    #[must_use]
    pub const fn check_size(&self, size: u64) -> Eligibility {
        if size > self.max_file_size {
            Eligibility::TooLarge {
                size,
                limit: self.max_file_size,
            }
        } else {
            Eligibility::Eligible
        }
    }

    /// Heuristic token scan of the first lines of a file.
    #[must_use]
    pub fn check_content(content: &str) -> Eligibility {
        let head: Vec<&str> = content.lines().take(SYNTAX_SCAN_LINES).collect();
        let head = head.join("\n");

        if let Some(token) = UNSUPPORTED_TOKENS.iter().find(|t| head.contains(*t)) {
            return Eligibility::UnsupportedSyntax(token.trim_end());
        }
        if head.contains("switch (") && head.contains("->") {
            return Eligibility::UnsupportedSyntax("switch expression");
        }
        if UNNAMED_VARIABLE.is_match(&head) {
            return Eligibility::UnsupportedSyntax("unnamed variable");
        }
        Eligibility::Eligible
    }

    /// Path and size checks, then the content scan.
    #[must_use]
    pub fn check(&self, relative: &Path, size: u64, content: &str) -> Eligibility {
        match self.check_path(relative) {
            Eligibility::Eligible => {}
            other => return other,
        }
        match self.check_size(size) {
            Eligibility::Eligible => Self::check_content(content),
            other => other,
        }
    }
}
