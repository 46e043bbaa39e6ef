//! Domain event definitions

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────
// Dev Server Events
// ─────────────────────────────────────────────────────────

/// Raw output and lifecycle events from the dev server child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A line of stdout (without the trailing newline)
    Stdout(String),
    /// A line of stderr
    Stderr(String),
    /// The process exited; `None` when terminated by a signal
    Exited { code: Option<i32> },
}

impl ServerEvent {
    pub fn is_exit(&self) -> bool {
        matches!(self, ServerEvent::Exited { .. })
    }
}

// ─────────────────────────────────────────────────────────
// File Change Events
// ─────────────────────────────────────────────────────────

/// Kind of a file-system change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Changed,
    Created,
    Deleted,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Changed => write!(f, "changed"),
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// A single file-change notification.
///
/// Consumed immediately by the reload coordinator, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }

    pub fn changed(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Changed)
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Created)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(path, ChangeKind::Deleted)
    }

    /// Path relative to `root`, or the path unchanged if it lies elsewhere
    pub fn relative_to(&self, root: &Path) -> PathBuf {
        self.path
            .strip_prefix(root)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| self.path.clone())
    }
}
