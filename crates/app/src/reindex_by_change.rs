//! Incremental reindexing from file-change events.
//!
//! Events are coalesced per path (the latest kind wins) and released as a
//! segment once `segment_threshold` paths are pending or no event arrived
//! for the debounce period.

use crate::index_codebase::Indexer;
use crate::run_summary::RunReport;
use code_index_domain::constants::{BATCH_SEGMENT_THRESHOLD, DEFAULT_WATCH_DEBOUNCE_MS};
use code_index_domain::{FileChangeEvent, FileChangeKind, RelativePath};
use code_index_ports::{FileChangeNotifierPort, FileChangeStream};
use code_index_shared::{ErrorEnvelope, RequestContext, Result};
use std::collections::BTreeMap;
use std::time::Duration;

/// Segment release settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchOptions {
    /// Quiet period after the last event.
    pub debounce: Duration,
    /// Pending paths that release a segment immediately.
    pub segment_threshold: usize,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(DEFAULT_WATCH_DEBOUNCE_MS),
            segment_threshold: BATCH_SEGMENT_THRESHOLD,
        }
    }
}

/// Latest change kind per path.
#[derive(Debug, Default)]
pub struct ChangeCoalescer {
    pending: BTreeMap<RelativePath, FileChangeKind>,
}

impl ChangeCoalescer {
    /// Empty coalescer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `event`, replacing any earlier kind for its path.
    pub fn push(&mut self, event: FileChangeEvent) {
        self.pending.insert(event.path, event.kind);
    }

    /// Pending paths.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Take every pending event, ordered by path.
    pub fn drain(&mut self) -> Vec<FileChangeEvent> {
        std::mem::take(&mut self.pending)
            .into_iter()
            .map(|(path, kind)| FileChangeEvent::new(path, kind))
            .collect()
    }
}

/// Coalesce a finite list of events.
pub fn coalesce_changes(events: impl IntoIterator<Item = FileChangeEvent>) -> Vec<FileChangeEvent> {
    let mut coalescer = ChangeCoalescer::new();
    for event in events {
        coalescer.push(event);
    }
    coalescer.drain()
}

/// Turns a change stream into coalesced segments.
pub struct ChangeWatcher {
    stream: FileChangeStream,
    options: WatchOptions,
    coalescer: ChangeCoalescer,
    closed: bool,
}

impl ChangeWatcher {
    /// Watcher reading `stream`.
    pub fn new(stream: FileChangeStream, options: WatchOptions) -> Self {
        Self {
            stream,
            options,
            coalescer: ChangeCoalescer::new(),
            closed: false,
        }
    }

    /// Wait for the next segment; `None` once the stream closed and nothing
    /// is pending. Pending events are dropped when `ctx` is cancelled.
    pub async fn next_segment(
        &mut self,
        ctx: &RequestContext,
    ) -> Result<Option<Vec<FileChangeEvent>>> {
        let threshold = self.options.segment_threshold.max(1);
        loop {
            if self.closed {
                return Ok(self.take());
            }
            let received = if self.coalescer.is_empty() {
                tokio::select! {
                    () = ctx.cancelled() => return Err(watch_cancelled()),
                    event = self.stream.recv() => event,
                }
            } else {
                tokio::select! {
                    () = ctx.cancelled() => return Err(watch_cancelled()),
                    event = self.stream.recv() => event,
                    () = tokio::time::sleep(self.options.debounce) => return Ok(self.take()),
                }
            };
            match received {
                Some(event) => {
                    self.coalescer.push(event);
                    if self.coalescer.len() >= threshold {
                        return Ok(self.take());
                    }
                },
                None => self.closed = true,
            }
        }
    }

    fn take(&mut self) -> Option<Vec<FileChangeEvent>> {
        if self.coalescer.is_empty() {
            None
        } else {
            Some(self.coalescer.drain())
        }
    }
}

fn watch_cancelled() -> ErrorEnvelope {
    ErrorEnvelope::cancelled("operation cancelled").with_metadata("operation", "index.watch")
}

/// Watch the indexer's root and apply every segment until the stream ends.
///
/// Each segment's report is handed to `on_report`. Fails with `core:cancelled`
/// when `ctx` is cancelled.
pub async fn watch_and_reindex(
    ctx: &RequestContext,
    indexer: &Indexer,
    notifier: &dyn FileChangeNotifierPort,
    options: WatchOptions,
    mut on_report: impl FnMut(&RunReport),
) -> Result<()> {
    let stream = notifier.watch(ctx, indexer.options().root.clone()).await?;
    let mut watcher = ChangeWatcher::new(stream, options);
    while let Some(segment) = watcher.next_segment(ctx).await? {
        let report = indexer.apply_changes(ctx, segment).await;
        on_report(&report);
        if let Some(error) = report.error.filter(ErrorEnvelope::is_cancelled) {
            return Err(error);
        }
    }
    Ok(())
}
