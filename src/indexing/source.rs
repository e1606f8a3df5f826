//! Reading and segmenting a single source file.
//!
//! Shared by the full reindex and incremental updates so both apply the
//! same eligibility rules.

use std::io::ErrorKind;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::error::ParseError;
use crate::segment::{CodeSegment, Eligibility, EligibilityRules, SegmentationEngine};

/// Result of segmenting one file.
#[derive(Debug)]
pub enum FileOutcome {
    Segmented(Vec<CodeSegment>),
    /// Rejected by the eligibility rules.
    Skipped(Eligibility),
    /// The file disappeared before it could be read.
    Missing,
    Failed(ParseError),
}

impl FileOutcome {
    /// Segments produced, if any.
    #[must_use]
    pub fn into_segments(self) -> Vec<CodeSegment> {
        match self {
            Self::Segmented(segments) => segments,
            _ => Vec::new(),
        }
    }
}

/// Read `path`, apply the eligibility rules, then segment it.
#[must_use]
pub fn segment_file(
    engine: &SegmentationEngine,
    rules: &EligibilityRules,
    path: &Path,
    relative: &str,
) -> FileOutcome {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return FileOutcome::Missing,
        Err(source) => {
            return FileOutcome::Failed(ParseError::Read {
                path: path.display().to_string(),
                source,
            })
        }
    };

    let size = u64::try_from(content.len()).unwrap_or(u64::MAX);
    let verdict = rules.check(Path::new(relative), size, &content);
    if !verdict.is_eligible() {
        tracing::debug!(path = relative, reason = ?verdict, "File not eligible");
        return FileOutcome::Skipped(verdict);
    }

    let last_modified = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);
    FileOutcome::Segmented(engine.parse(&content, relative, last_modified))
}
