//! Local filesystem adapter.

use code_index_ports::{
    BoxFuture, FileSystemDirEntry, FileSystemEntryKind, FileSystemPort, FileSystemStat,
    RelativePath,
};
use code_index_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::fs::FileType;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

/// Local filesystem adapter using async IO.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    /// Build a filesystem adapter.
    pub const fn new() -> Self {
        Self
    }
}

impl FileSystemPort for LocalFileSystem {
    fn read_dir(
        &self,
        ctx: &RequestContext,
        root: PathBuf,
        dir: Option<RelativePath>,
    ) -> BoxFuture<'_, Result<Vec<FileSystemDirEntry>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("fs.read_dir")?;
            let full_path = dir.map_or_else(|| root.clone(), |dir| dir.to_path(&root));
            let mut read_dir = tokio::fs::read_dir(&full_path).await?;
            let mut entries = Vec::new();
            while let Some(entry) = read_dir.next_entry().await? {
                let kind = entry_kind(entry.file_type().await?);
                let name = entry.file_name().to_string_lossy().into_owned().into_boxed_str();
                entries.push(FileSystemDirEntry { name, kind });
            }
            entries.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(entries)
        })
    }

    fn read_file_text(
        &self,
        ctx: &RequestContext,
        root: PathBuf,
        file: RelativePath,
    ) -> BoxFuture<'_, Result<String>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("fs.read_file_text")?;
            let bytes = tokio::fs::read(file.to_path(&root)).await?;
            String::from_utf8(bytes).map_err(|_| {
                ErrorEnvelope::expected(
                    ErrorCode::new("fs", "not_utf8"),
                    "file is not valid UTF-8 text",
                )
                .with_metadata("path", file.as_str())
            })
        })
    }

    fn stat(
        &self,
        ctx: &RequestContext,
        root: PathBuf,
        path: RelativePath,
    ) -> BoxFuture<'_, Result<FileSystemStat>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("fs.stat")?;
            let metadata = tokio::fs::metadata(path.to_path(&root)).await?;
            let mtime_ms = metadata
                .modified()
                .ok()
                .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
                .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
            Ok(FileSystemStat {
                kind: entry_kind(metadata.file_type()),
                size_bytes: metadata.len(),
                mtime_ms,
            })
        })
    }
}

fn entry_kind(file_type: FileType) -> FileSystemEntryKind {
    if file_type.is_file() {
        FileSystemEntryKind::File
    } else if file_type.is_dir() {
        FileSystemEntryKind::Directory
    } else {
        FileSystemEntryKind::Other
    }
}
