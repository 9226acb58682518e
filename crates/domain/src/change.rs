//! File-change events consumed by incremental indexing.

use crate::primitives::RelativePath;
use serde::{Deserialize, Serialize};

/// Kind of change observed for a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileChangeKind {
    /// The file appeared.
    Created,
    /// The file content or metadata changed.
    Modified,
    /// The file is gone.
    Deleted,
}

/// A change notification for one workspace file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChangeEvent {
    /// Workspace-relative path.
    pub path: RelativePath,
    /// What happened.
    pub kind: FileChangeKind,
}

impl FileChangeEvent {
    /// Build an event.
    #[must_use]
    pub const fn new(path: RelativePath, kind: FileChangeKind) -> Self {
        Self { path, kind }
    }
}
