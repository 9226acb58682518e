//! Pull-based workspace scanner.
//!
//! Walks the workspace breadth-first with entries sorted by name and yields
//! candidate files one at a time, so the caller decides how far to read.

use code_index_domain::RelativePath;
use code_index_domain::constants::{
    DEFAULT_IGNORED_DIRS, DEFAULT_MAX_FILES, DEFAULT_SUPPORTED_EXTENSIONS, MAX_FILE_SIZE_BYTES,
};
use code_index_ports::{
    FileSystemEntryKind, FileSystemPort, IgnoreMatchInput, IgnorePort, LoggerPort, log_fields,
};
use code_index_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;

/// Scan filters and limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerOptions {
    /// Stop after this many candidates.
    pub max_files: usize,
    /// Files above this size are skipped.
    pub max_file_size_bytes: u64,
    /// Skip entries whose name starts with `.`.
    pub skip_hidden: bool,
    /// Directory names never descended into.
    pub ignored_dirs: Vec<Box<str>>,
    /// Allowed extensions, without the dot. Empty allows everything.
    pub extensions: Vec<Box<str>>,
}

impl Default for ScannerOptions {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            max_file_size_bytes: MAX_FILE_SIZE_BYTES,
            skip_hidden: true,
            ignored_dirs: DEFAULT_IGNORED_DIRS.iter().map(|dir| (*dir).into()).collect(),
            extensions: DEFAULT_SUPPORTED_EXTENSIONS
                .iter()
                .map(|ext| (*ext).into())
                .collect(),
        }
    }
}

/// Ports the scanner reads through.
#[derive(Clone)]
pub struct ScannerDeps {
    /// Workspace filesystem.
    pub filesystem: Arc<dyn FileSystemPort>,
    /// Ignore rules loaded from the workspace.
    pub ignore: Arc<dyn IgnorePort>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

/// A candidate file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedFile {
    /// Workspace-relative path.
    pub path: RelativePath,
    /// Size when it was scanned.
    pub size_bytes: u64,
}

/// A directory or file the scan could not read.
#[derive(Debug, Clone)]
pub struct ScanError {
    /// Offending path.
    pub path: RelativePath,
    /// Underlying error, code `index:scan_dir_unreadable`.
    pub error: ErrorEnvelope,
}

/// What the scan saw so far.
#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    /// Candidates yielded.
    pub files_yielded: u64,
    /// Candidates above the size ceiling.
    pub files_skipped: u64,
    /// The scan stopped at `max_files` with candidates left.
    pub truncated: bool,
    /// Unreadable entries, in discovery order.
    pub errors: Vec<ScanError>,
}

/// Breadth-first scanner over one workspace root.
pub struct Scanner {
    deps: ScannerDeps,
    root: PathBuf,
    options: ScannerOptions,
    extensions: HashSet<Box<str>>,
    ignored_dirs: HashSet<Box<str>>,
    dirs: VecDeque<Option<RelativePath>>,
    files: VecDeque<RelativePath>,
    report: ScanReport,
}

impl Scanner {
    /// Scanner positioned at `root`.
    pub fn new(deps: ScannerDeps, root: PathBuf, options: ScannerOptions) -> Self {
        let extensions = options
            .extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .map(String::into_boxed_str)
            .collect();
        let ignored_dirs = options.ignored_dirs.iter().cloned().collect();
        Self {
            deps,
            root,
            options,
            extensions,
            ignored_dirs,
            dirs: VecDeque::from([None]),
            files: VecDeque::new(),
            report: ScanReport::default(),
        }
    }

    /// Report of the scan so far.
    pub const fn report(&self) -> &ScanReport {
        &self.report
    }

    /// Consume the scanner and keep its report.
    pub fn into_report(self) -> ScanReport {
        self.report
    }

    /// Next candidate file, or `None` once the scan is exhausted.
    ///
    /// Fails when the root cannot be listed or `ctx` is cancelled.
    pub async fn next_file(&mut self, ctx: &RequestContext) -> Result<Option<ScannedFile>> {
        loop {
            ctx.ensure_not_cancelled("index.scan")?;

            if let Some(path) = self.files.pop_front() {
                let limit = u64::try_from(self.options.max_files).unwrap_or(u64::MAX);
                if self.report.files_yielded >= limit {
                    self.report.truncated = true;
                    self.files.clear();
                    self.dirs.clear();
                    return Ok(None);
                }
                if let Some(file) = self.admit(ctx, path).await? {
                    self.report.files_yielded += 1;
                    return Ok(Some(file));
                }
                continue;
            }

            let Some(dir) = self.dirs.pop_front() else {
                return Ok(None);
            };
            self.expand(ctx, dir).await?;
        }
    }

    /// Drain the remaining candidates.
    pub async fn collect_all(&mut self, ctx: &RequestContext) -> Result<Vec<ScannedFile>> {
        let mut files = Vec::new();
        while let Some(file) = self.next_file(ctx).await? {
            files.push(file);
        }
        Ok(files)
    }

    /// Whether a changed path passes the scan filters (hidden entries,
    /// ignored directories, extensions and ignore rules).
    pub fn is_candidate(&self, path: &RelativePath) -> bool {
        let segments: Vec<&str> = path.as_str().split('/').collect();
        let Some((name, parents)) = segments.split_last() else {
            return false;
        };
        if self.options.skip_hidden && segments.iter().any(|segment| segment.starts_with('.')) {
            return false;
        }
        if parents.iter().any(|dir| self.ignored_dirs.contains(*dir)) {
            return false;
        }
        self.has_allowed_extension(name) && !self.is_ignored(path, false)
    }

    async fn admit(
        &mut self,
        ctx: &RequestContext,
        path: RelativePath,
    ) -> Result<Option<ScannedFile>> {
        let stat = match self.deps.filesystem.stat(ctx, self.root.clone(), path.clone()).await {
            Ok(stat) => stat,
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => {
                self.skip_unreadable(path, error);
                return Ok(None);
            },
        };
        if stat.size_bytes > self.options.max_file_size_bytes {
            self.report.files_skipped += 1;
            if let Some(logger) = self.deps.logger.as_ref() {
                logger.debug(
                    "index.scan.file_too_large",
                    "skipping file above the size ceiling",
                    Some(log_fields! {
                        "file" => path.as_str(),
                        "sizeBytes" => stat.size_bytes,
                        "maxBytes" => self.options.max_file_size_bytes,
                    }),
                );
            }
            return Ok(None);
        }
        Ok(Some(ScannedFile {
            path,
            size_bytes: stat.size_bytes,
        }))
    }

    async fn expand(&mut self, ctx: &RequestContext, dir: Option<RelativePath>) -> Result<()> {
        let listed = self
            .deps
            .filesystem
            .read_dir(ctx, self.root.clone(), dir.clone())
            .await;
        let mut entries = match (listed, dir.as_ref()) {
            (Ok(entries), _) => entries,
            (Err(error), _) if error.is_cancelled() => return Err(error),
            (Err(error), None) => {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::new("index", "scan_root_unreadable"),
                    format!("cannot read workspace root: {}", error.message),
                )
                .with_metadata("root", self.root.display().to_string())
                .with_metadata("cause", error.code.to_string()));
            },
            (Err(error), Some(path)) => {
                self.skip_unreadable(path.clone(), error);
                return Ok(());
            },
        };
        entries.sort_by(|a, b| a.name.cmp(&b.name));

        for entry in entries {
            let name = entry.name.as_ref();
            if self.options.skip_hidden && name.starts_with('.') {
                continue;
            }
            let joined = match dir.as_ref() {
                Some(parent) => format!("{}/{name}", parent.as_str()),
                None => name.to_owned(),
            };
            let Ok(path) = RelativePath::parse(&joined) else {
                continue;
            };
            match entry.kind {
                FileSystemEntryKind::Directory => {
                    if self.ignored_dirs.contains(name) || self.is_ignored(&path, true) {
                        continue;
                    }
                    self.dirs.push_back(Some(path));
                },
                FileSystemEntryKind::File => {
                    if self.has_allowed_extension(name) && !self.is_ignored(&path, false) {
                        self.files.push_back(path);
                    }
                },
                FileSystemEntryKind::Other => {},
            }
        }
        Ok(())
    }

    fn is_ignored(&self, path: &RelativePath, is_dir: bool) -> bool {
        self.deps.ignore.is_ignored(IgnoreMatchInput {
            relative_path: path.as_str(),
            is_dir,
        })
    }

    fn has_allowed_extension(&self, name: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        name.rsplit_once('.')
            .filter(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
            .is_some_and(|(_, ext)| self.extensions.contains(ext.to_ascii_lowercase().as_str()))
    }

    fn skip_unreadable(&mut self, path: RelativePath, cause: ErrorEnvelope) {
        let error = ErrorEnvelope::expected(
            ErrorCode::new("index", "scan_dir_unreadable"),
            format!("cannot read {}: {}", path.as_str(), cause.message),
        )
        .with_metadata("path", path.as_str())
        .with_metadata("cause", cause.code.to_string());
        if let Some(logger) = self.deps.logger.as_ref() {
            logger.warn(
                "index.scan.dir_unreadable",
                "skipping unreadable entry",
                Some(log_fields! {
                    "path" => path.as_str(),
                    "code" => cause.code.to_string(),
                }),
            );
        }
        self.report.errors.push(ScanError { path, error });
    }
}
