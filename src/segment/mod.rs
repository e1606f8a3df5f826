//! Structural segmentation of Java sources.
//!
//! [`SegmentationEngine::parse`] turns one compilation unit into an
//! ordered list of [`CodeSegment`]s with content-addressed ids, parent
//! links and size-bounded chunks. It holds no shared state, so a single
//! engine can be used from any number of worker threads.
//!
//! Eligibility ([`EligibilityRules`]) is the caller's job: the engine
//! segments whatever it is given.

pub mod chunking;
pub mod context;
pub mod eligibility;
pub mod identity;
mod java;
pub mod model;

use std::path::Path;

use chrono::{DateTime, Utc};

pub use context::TraversalContext;
pub use eligibility::{Eligibility, EligibilityRules};
pub use model::{
    AnnotationInfo, ChunkInfo, CodeSegment, ModuleDirective, SegmentDetails, SegmentKind,
    SegmentMetadata,
};

use crate::config::SegmentationConfig;
use crate::error::ParseError;
use java::{segment_java, ChunkLimits};

/// Parses source files into segments.
#[derive(Debug, Clone, Copy)]
pub struct SegmentationEngine {
    limits: ChunkLimits,
}

impl Default for SegmentationEngine {
    fn default() -> Self {
        Self::new(&SegmentationConfig::default())
    }
}

impl SegmentationEngine {
    #[must_use]
    pub fn new(config: &SegmentationConfig) -> Self {
        Self::with_limits(config.max_segment_length, config.overlap_chars)
    }

    /// Engine with explicit chunking limits, in characters.
    #[must_use]
    pub const fn with_limits(max_segment_length: usize, overlap_chars: usize) -> Self {
        Self {
            limits: ChunkLimits {
                max_len: max_segment_length,
                overlap: overlap_chars,
            },
        }
    }

    #[must_use]
    pub const fn max_segment_length(&self) -> usize {
        self.limits.max_len
    }

    /// Segment `content`, which lives at `relative_path` below the indexed root.
    ///
    /// Files with syntax errors, or with no declarations, produce an empty list.
    #[must_use]
    pub fn parse(
        &self,
        content: &str,
        relative_path: &str,
        last_modified: Option<DateTime<Utc>>,
    ) -> Vec<CodeSegment> {
        match segment_java(content, relative_path, last_modified, self.limits) {
            Ok(segments) => {
                tracing::trace!(
                    path = relative_path,
                    segments = segments.len(),
                    "Segmented file"
                );
                segments
            }
            Err(e) => {
                tracing::error!(path = relative_path, error = %e, "Segmentation unavailable");
                Vec::new()
            }
        }
    }

    /// Read `path` and segment it.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::Read`] if the file cannot be read.
    pub fn parse_file(
        &self,
        path: &Path,
        relative_path: &str,
    ) -> Result<Vec<CodeSegment>, ParseError> {
        let read_err = |source| ParseError::Read {
            path: path.display().to_string(),
            source,
        };
        let content = std::fs::read_to_string(path).map_err(read_err)?;
        let last_modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .map(DateTime::<Utc>::from);
        Ok(self.parse(&content, relative_path, last_modified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    const SERVICE: &str = r#"package com.acme.shop;

import java.util.List;
import java.util.Map;
import java.util.concurrent.*;

public class OrderService {
    private final Map<String, String> orders;

    public OrderService(Map<String, String> orders) {
        this.orders = orders;
    }

    public List<String> ids() {
        return List.copyOf(orders.keySet());
    }
}
"#;

    #[test]
    fn test_parse_is_deterministic() {
        let engine = SegmentationEngine::default();
        let first = engine.parse(SERVICE, "src/OrderService.java", None);
        let second = engine.parse(SERVICE, "src/OrderService.java", None);

        assert_eq!(first.len(), 4);
        let ids: Vec<_> = first.iter().map(|s| s.id.clone()).collect();
        let again: Vec<_> = second.iter().map(|s| s.id.clone()).collect();
        assert_eq!(ids, again);
        assert_eq!(ids.iter().collect::<HashSet<_>>().len(), ids.len());
    }

    #[test]
    fn test_content_change_changes_only_that_id() {
        let engine = SegmentationEngine::default();
        let before = engine.parse(SERVICE, "src/OrderService.java", None);
        let edited = SERVICE.replace("List.copyOf", "List.<String>copyOf");
        let after = engine.parse(&edited, "src/OrderService.java", None);

        let find = |segments: &[CodeSegment], name: &str| {
            segments
                .iter()
                .find(|s| s.entity_name.as_deref() == Some(name))
                .map(|s| s.id.clone())
                .unwrap()
        };
        assert_eq!(find(&before, "orders"), find(&after, "orders"));
        assert_ne!(find(&before, "ids"), find(&after, "ids"));
    }

    #[test]
    fn test_comment_only_file_is_empty() {
        let engine = SegmentationEngine::default();
        let source = "// nothing here\n/* still nothing */\n";
        assert!(engine.parse(source, "src/Empty.java", None).is_empty());
    }

    #[test]
    fn test_syntax_error_is_empty() {
        let engine = SegmentationEngine::default();
        let source = "public class Broken { void f( { }";
        assert!(engine.parse(source, "src/Broken.java", None).is_empty());
    }

    #[test]
    fn test_parse_file_reads_mtime() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("OrderService.java");
        std::fs::write(&path, SERVICE).unwrap();

        let engine = SegmentationEngine::default();
        let segments = engine.parse_file(&path, "OrderService.java").unwrap();
        assert_eq!(segments.len(), 4);
        assert!(segments.iter().all(|s| s.last_modified.is_some()));
        assert!(segments.iter().all(|s| s.relative_path == "OrderService.java"));
    }

    #[test]
    fn test_parse_file_missing() {
        let dir = TempDir::new().unwrap();
        let engine = SegmentationEngine::default();
        let err = engine
            .parse_file(&dir.path().join("Missing.java"), "Missing.java")
            .unwrap_err();
        assert!(matches!(err, ParseError::Read { .. }));
    }

    #[test]
    fn test_limits_from_config() {
        let config = SegmentationConfig {
            max_segment_length: 1200,
            ..Default::default()
        };
        assert_eq!(SegmentationEngine::new(&config).max_segment_length(), 1200);
    }
}
