//! Filesystem boundary contract.

use crate::BoxFuture;
use code_index_domain::RelativePath;
use code_index_shared::{RequestContext, Result};
use std::path::PathBuf;

/// File system entry kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileSystemEntryKind {
    /// Regular file.
    File,
    /// Directory.
    Directory,
    /// Symlink, socket or anything else.
    Other,
}

/// A directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemDirEntry {
    /// Entry name (single path segment).
    pub name: Box<str>,
    /// Entry kind.
    pub kind: FileSystemEntryKind,
}

/// File metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSystemStat {
    /// Kind of the entry.
    pub kind: FileSystemEntryKind,
    /// Size in bytes.
    pub size_bytes: u64,
    /// Modification time as milliseconds since the epoch.
    pub mtime_ms: u64,
}

/// Boundary contract for filesystem access below a workspace root.
///
/// `root` is the absolute workspace root; `None` as a directory means the
/// root itself.
pub trait FileSystemPort: Send + Sync {
    /// List directory entries.
    fn read_dir(
        &self,
        ctx: &RequestContext,
        root: PathBuf,
        dir: Option<RelativePath>,
    ) -> BoxFuture<'_, Result<Vec<FileSystemDirEntry>>>;

    /// Read a file as UTF-8 text.
    fn read_file_text(
        &self,
        ctx: &RequestContext,
        root: PathBuf,
        file: RelativePath,
    ) -> BoxFuture<'_, Result<String>>;

    /// Read file metadata.
    fn stat(
        &self,
        ctx: &RequestContext,
        root: PathBuf,
        path: RelativePath,
    ) -> BoxFuture<'_, Result<FileSystemStat>>;
}
