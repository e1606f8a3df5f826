//! File change events.

use std::fmt;
use std::path::{Path, PathBuf};

use notify::event::{ModifyKind, RenameMode};
use notify::EventKind;
use serde::Serialize;

/// Kind of change observed for one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Create,
    Modify,
    Delete,
}

impl ChangeKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Modify => "MODIFY",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A change to one file below a watched root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    /// Watched root the change was observed under.
    pub root: PathBuf,
    pub path: PathBuf,
    /// `path` relative to `root`, `/`-separated.
    pub relative: String,
    pub kind: ChangeKind,
}

/// Map a notify event kind onto a change for `path`.
///
/// Renames become a delete of the old name and a create of the new one.
/// Access and unclassified events yield `None`.
#[must_use]
pub fn classify(kind: &EventKind, path: &Path) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Create),
        EventKind::Remove(_) => Some(ChangeKind::Delete),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => Some(ChangeKind::Delete),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => Some(ChangeKind::Create),
        EventKind::Modify(ModifyKind::Name(_)) => Some(if path.exists() {
            ChangeKind::Create
        } else {
            ChangeKind::Delete
        }),
        EventKind::Modify(ModifyKind::Metadata(_)) | EventKind::Access(_) | EventKind::Other => {
            None
        }
        EventKind::Modify(_) | EventKind::Any => Some(ChangeKind::Modify),
    }
}

/// Changes carried by a rename event that lists both paths.
#[must_use]
pub fn classify_rename_both(paths: &[PathBuf]) -> Vec<(PathBuf, ChangeKind)> {
    match paths {
        [from, to] => vec![
            (from.clone(), ChangeKind::Delete),
            (to.clone(), ChangeKind::Create),
        ],
        _ => Vec::new(),
    }
}
