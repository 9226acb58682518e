//! Polling file-change notifier.
//!
//! Takes a size and mtime fingerprint of every candidate file on each poll
//! and emits the difference to the previous poll.

use code_index_domain::constants::DEFAULT_IGNORED_DIRS;
use code_index_ports::{
    BoxFuture, FileChangeEvent, FileChangeKind, FileChangeNotifierPort, FileChangeStream,
    IgnoreMatchInput, IgnorePort, RelativePath,
};
use code_index_shared::{ErrorEnvelope, RequestContext, Result};
use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tokio::sync::mpsc;

const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    size_bytes: u64,
    mtime_ms: u64,
}

type Snapshot = BTreeMap<RelativePath, Fingerprint>;

/// Notifier diffing periodic directory snapshots.
#[derive(Clone)]
pub struct PollingChangeNotifier {
    poll_interval: Duration,
    ignore: Arc<dyn IgnorePort>,
    skip_hidden: bool,
    channel_capacity: usize,
}

impl PollingChangeNotifier {
    /// Notifier polling every `poll_interval`, skipping paths `ignore` rejects.
    pub fn new(poll_interval: Duration, ignore: Arc<dyn IgnorePort>) -> Self {
        Self {
            poll_interval,
            ignore,
            skip_hidden: true,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Whether entries with a leading `.` are skipped.
    #[must_use]
    pub const fn with_skip_hidden(mut self, skip_hidden: bool) -> Self {
        self.skip_hidden = skip_hidden;
        self
    }
}

impl FileChangeNotifierPort for PollingChangeNotifier {
    fn watch(
        &self,
        ctx: &RequestContext,
        root: PathBuf,
    ) -> BoxFuture<'_, Result<FileChangeStream>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("change_notifier.watch")?;
            let mut previous =
                take_snapshot(&root, self.ignore.as_ref(), self.skip_hidden).await?;
            let (sender, receiver) = mpsc::channel(self.channel_capacity.max(1));
            let ignore = Arc::clone(&self.ignore);
            let skip_hidden = self.skip_hidden;
            let interval = self.poll_interval;
            tracing::debug!(
                root = %root.display(),
                files = previous.len(),
                "change notifier started"
            );
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        () = ctx.cancelled() => break,
                        () = tokio::time::sleep(interval) => {},
                    }
                    let current = match take_snapshot(&root, ignore.as_ref(), skip_hidden).await {
                        Ok(snapshot) => snapshot,
                        Err(error) => {
                            tracing::warn!(code = %error.code, "change notifier poll failed");
                            continue;
                        },
                    };
                    for event in diff_snapshots(&previous, &current) {
                        if sender.send(event).await.is_err() {
                            return;
                        }
                    }
                    previous = current;
                }
                tracing::debug!("change notifier stopped");
            });
            Ok(receiver)
        })
    }
}

fn diff_snapshots(previous: &Snapshot, current: &Snapshot) -> Vec<FileChangeEvent> {
    let mut events = Vec::new();
    for (path, fingerprint) in current {
        match previous.get(path) {
            None => events.push(FileChangeEvent::new(path.clone(), FileChangeKind::Created)),
            Some(before) if before != fingerprint => {
                events.push(FileChangeEvent::new(path.clone(), FileChangeKind::Modified));
            },
            Some(_) => {},
        }
    }
    for path in previous.keys() {
        if !current.contains_key(path) {
            events.push(FileChangeEvent::new(path.clone(), FileChangeKind::Deleted));
        }
    }
    events
}

/// Breadth-first walk; unreadable subdirectories are skipped, an unreadable
/// root is an error.
async fn take_snapshot(
    root: &Path,
    ignore: &dyn IgnorePort,
    skip_hidden: bool,
) -> Result<Snapshot> {
    let mut snapshot = Snapshot::new();
    let mut queue: VecDeque<PathBuf> = VecDeque::from([root.to_path_buf()]);
    while let Some(dir) = queue.pop_front() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(error) if dir.as_path() == root => return Err(ErrorEnvelope::from(error)),
            Err(error) => {
                tracing::debug!(dir = %dir.display(), %error, "skipping unreadable directory");
                continue;
            },
        };
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if skip_hidden && name.starts_with('.') {
                continue;
            }
            let path = entry.path();
            let Ok(relative) = RelativePath::from_root(root, &path) else {
                continue;
            };
            let file_type = entry.file_type().await?;
            let is_dir = file_type.is_dir();
            if is_dir && DEFAULT_IGNORED_DIRS.contains(&name.as_str()) {
                continue;
            }
            if ignore.is_ignored(IgnoreMatchInput {
                relative_path: relative.as_str(),
                is_dir,
            }) {
                continue;
            }
            if is_dir {
                queue.push_back(path);
            } else if file_type.is_file() {
                let metadata = entry.metadata().await?;
                let mtime_ms = metadata
                    .modified()
                    .ok()
                    .and_then(|modified| modified.duration_since(UNIX_EPOCH).ok())
                    .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
                snapshot.insert(
                    relative,
                    Fingerprint {
                        size_bytes: metadata.len(),
                        mtime_ms,
                    },
                );
            }
        }
    }
    Ok(snapshot)
}
