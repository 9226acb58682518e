//! Full and incremental indexing runs.
//!
//! A run moves `Idle -> Scanning -> Processing -> Completed | Failed`. While
//! scanning it prepares the collection and lists the root; processing reads
//! and chunks files on a parse pool and pushes blocks through the batcher to a
//! batch pool bounded by the pending-batch tracker.

mod file_task;
mod pipeline;
mod types;

pub use types::{IndexerDeps, IndexerOptions, ProgressCallback};

use crate::reindex_by_change::coalesce_changes;
use crate::run_summary::{FailureKind, FailureRecord, RunReport, RunSummary, as_count};
use crate::scanner::{ScanReport, Scanner};
use code_index_domain::{
    CollectionName, FileChangeEvent, FileChangeKind, IndexerState, ProgressEvent, RelativePath,
};
use code_index_ports::log_fields;
use code_index_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use pipeline::{FileSource, Pipeline};
use std::collections::VecDeque;

/// Indexes one workspace into one collection.
pub struct Indexer {
    deps: IndexerDeps,
    options: IndexerOptions,
    on_progress: Option<ProgressCallback>,
}

struct RunState {
    state: IndexerState,
    summary: RunSummary,
    on_progress: Option<ProgressCallback>,
}

impl RunState {
    fn new(on_progress: Option<ProgressCallback>) -> Self {
        Self {
            state: IndexerState::Idle,
            summary: RunSummary::default(),
            on_progress,
        }
    }

    fn enter(&mut self, next: IndexerState) -> Result<()> {
        self.state = self.state.transition(next)?;
        self.emit(next);
        Ok(())
    }

    fn emit(&self, state: IndexerState) {
        if let Some(on_progress) = self.on_progress.as_ref() {
            on_progress(ProgressEvent::State { state });
        }
    }

    fn finish(mut self, result: Result<()>) -> RunReport {
        match result.and_then(|()| self.enter(IndexerState::Completed)) {
            Ok(()) => RunReport::completed(self.summary),
            Err(error) => {
                if self.state.can_transition_to(IndexerState::Failed) {
                    self.state = IndexerState::Failed;
                }
                self.emit(IndexerState::Failed);
                RunReport::failed(self.summary, error)
            },
        }
    }
}

impl Indexer {
    /// Indexer over `deps` with `options`.
    pub fn new(deps: IndexerDeps, options: IndexerOptions) -> Self {
        Self {
            deps,
            options,
            on_progress: None,
        }
    }

    /// Receive state changes and per-file progress.
    #[must_use]
    pub fn with_progress(mut self, on_progress: ProgressCallback) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Run settings.
    pub const fn options(&self) -> &IndexerOptions {
        &self.options
    }

    /// Scan the whole workspace and bring the collection up to date.
    ///
    /// Files the ledger knows but the scan no longer yields are purged, unless
    /// the scan was truncated or cancelled.
    #[tracing::instrument(skip_all, fields(collection = self.options.collection.as_str()))]
    pub async fn run(&self, ctx: &RequestContext) -> RunReport {
        let mut run = RunState::new(self.on_progress.clone());
        let result = self.run_full(ctx, &mut run).await;
        self.log_finished("index.run.finished", &run, result.as_ref().err());
        run.finish(result)
    }

    /// Apply coalesced file-change events; other files are left untouched.
    #[tracing::instrument(skip_all, fields(collection = self.options.collection.as_str()))]
    pub async fn apply_changes(
        &self,
        ctx: &RequestContext,
        events: Vec<FileChangeEvent>,
    ) -> RunReport {
        let mut run = RunState::new(self.on_progress.clone());
        let result = self.run_changes(ctx, &mut run, events).await;
        self.log_finished("index.changes.finished", &run, result.as_ref().err());
        run.finish(result)
    }

    async fn run_full(&self, ctx: &RequestContext, run: &mut RunState) -> Result<()> {
        run.enter(IndexerState::Scanning)?;
        self.prepare_collection(ctx).await?;

        let mut scanner = Scanner::new(
            self.deps.scanner_deps(),
            self.options.root.clone(),
            self.options.scanner.clone(),
        );
        let first = scanner.next_file(ctx).await?;
        run.enter(IndexerState::Processing)?;

        let mut pipeline = Pipeline::new(ctx, &self.deps, &self.options, self.on_progress.clone())?;
        let mut source = FileSource::Scan {
            scanner: &mut scanner,
            first,
        };
        let mut result = pipeline.drive(&mut source).await;
        drop(source);

        let report = scanner.into_report();
        if result.is_ok() && !report.truncated && !ctx.is_cancelled() {
            result = self.purge_vanished(ctx, &mut pipeline, &report).await;
        }
        let summary = pipeline.shutdown().await;
        run.summary = merge_scan(summary, &report);
        self.flush_ledger(ctx, &mut run.summary).await;
        result
    }

    async fn run_changes(
        &self,
        ctx: &RequestContext,
        run: &mut RunState,
        events: Vec<FileChangeEvent>,
    ) -> Result<()> {
        run.enter(IndexerState::Scanning)?;
        self.prepare_collection(ctx).await?;

        let filter = Scanner::new(
            self.deps.scanner_deps(),
            self.options.root.clone(),
            self.options.scanner.clone(),
        );
        let mut removals = Vec::new();
        let mut upserts = VecDeque::new();
        let mut skipped = 0u64;
        for event in coalesce_changes(events) {
            ctx.ensure_not_cancelled("index.changes")?;
            match event.kind {
                FileChangeKind::Deleted => removals.push(event.path),
                FileChangeKind::Created | FileChangeKind::Modified => {
                    if !filter.is_candidate(&event.path) {
                        continue;
                    }
                    match self.check_size(ctx, &event.path).await? {
                        SizeCheck::Fits => upserts.push_back(event.path),
                        SizeCheck::Missing => removals.push(event.path),
                        SizeCheck::TooLarge => {
                            skipped += 1;
                            removals.push(event.path);
                        },
                    }
                },
            }
        }
        run.enter(IndexerState::Processing)?;

        let scanned = as_count(upserts.len());
        let mut pipeline = Pipeline::new(ctx, &self.deps, &self.options, self.on_progress.clone())?;
        let mut result = Ok(());
        for path in &removals {
            result = pipeline.remove_file(path).await;
            if result.is_err() {
                break;
            }
        }
        if result.is_ok() {
            result = pipeline.drive(&mut FileSource::Listed(upserts)).await;
        }
        let mut summary = pipeline.shutdown().await;
        summary.files_scanned = scanned;
        summary.files_skipped = skipped;
        run.summary = summary;
        self.flush_ledger(ctx, &mut run.summary).await;
        result
    }

    async fn prepare_collection(&self, ctx: &RequestContext) -> Result<()> {
        let collection = self.options.collection.clone();
        let dimension = self
            .deps
            .embedding
            .detect_dimension(ctx)
            .await
            .map_err(|error| collection_error(&collection, error))?;
        self.deps
            .vector_store
            .ensure_collection(ctx, collection.clone(), dimension)
            .await
            .map_err(|error| collection_error(&collection, error))
    }

    async fn check_size(&self, ctx: &RequestContext, path: &RelativePath) -> Result<SizeCheck> {
        let stat = self
            .deps
            .filesystem
            .stat(ctx, self.options.root.clone(), path.clone())
            .await;
        match stat {
            Ok(stat) if stat.size_bytes > self.options.scanner.max_file_size_bytes => {
                Ok(SizeCheck::TooLarge)
            },
            Ok(_) => Ok(SizeCheck::Fits),
            Err(error) if error.code == ErrorCode::not_found() => Ok(SizeCheck::Missing),
            Err(error) if error.is_cancelled() => Err(error),
            // The parse task reports the read failure.
            Err(_) => Ok(SizeCheck::Fits),
        }
    }

    async fn purge_vanished(
        &self,
        ctx: &RequestContext,
        pipeline: &mut Pipeline<'_>,
        report: &ScanReport,
    ) -> Result<()> {
        let listed = self
            .deps
            .ledger
            .list_files(ctx, self.options.collection.clone())
            .await;
        let known = match listed {
            Ok(known) => known,
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => {
                pipeline
                    .summary
                    .record(FailureRecord::new(FailureKind::Ledger, &error));
                return Ok(());
            },
        };
        let vanished: Vec<RelativePath> = known
            .into_iter()
            .filter(|path| !pipeline.seen().contains(path))
            .filter(|path| {
                !report
                    .errors
                    .iter()
                    .any(|error| path.starts_with(error.path.as_str()))
            })
            .collect();
        for path in &vanished {
            pipeline.remove_file(path).await?;
        }
        Ok(())
    }

    async fn flush_ledger(&self, ctx: &RequestContext, summary: &mut RunSummary) {
        let collection = self.options.collection.clone();
        match self.deps.ledger.flush(ctx, collection).await {
            Ok(()) => {},
            Err(error) if error.is_cancelled() => {},
            Err(error) => {
                if let Some(logger) = self.deps.logger.as_ref() {
                    logger.error(
                        "index.ledger.flush_failed",
                        "cannot persist the identity ledger",
                        Some(log_fields! { "code" => error.code.to_string() }),
                    );
                }
                summary.record(FailureRecord::new(FailureKind::Ledger, &error));
            },
        }
    }

    fn log_finished(&self, event: &str, run: &RunState, error: Option<&ErrorEnvelope>) {
        let Some(logger) = self.deps.logger.as_ref() else {
            return;
        };
        let summary = &run.summary;
        let fields = log_fields! {
            "filesScanned" => summary.files_scanned,
            "filesIndexed" => summary.files_indexed,
            "filesRemoved" => summary.files_removed,
            "blocksUpserted" => summary.blocks_upserted,
            "blocksDeleted" => summary.blocks_deleted,
            "failures" => summary.failures.len(),
            "peakPendingBatches" => summary.peak_pending_batches,
        };
        match error {
            None => logger.info(event, "indexing run completed", Some(fields)),
            Some(error) if error.is_cancelled() => {
                logger.warn(event, "indexing run cancelled", Some(fields));
            },
            Some(error) => logger.error(event, &error.message, Some(fields)),
        }
    }
}

enum SizeCheck {
    Fits,
    Missing,
    TooLarge,
}

fn merge_scan(mut summary: RunSummary, report: &ScanReport) -> RunSummary {
    summary.files_scanned = report.files_yielded;
    summary.files_skipped = report.files_skipped;
    summary.scan_truncated = report.truncated;
    for scan_error in &report.errors {
        summary.record(
            FailureRecord::new(FailureKind::DirUnreadable, &scan_error.error)
                .with_path(scan_error.path.clone()),
        );
    }
    summary
}

fn collection_error(collection: &CollectionName, error: ErrorEnvelope) -> ErrorEnvelope {
    if error.is_cancelled() {
        return error;
    }
    error.with_metadata("collection", collection.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::Harness;
    use std::sync::{Arc, Mutex};

    const LIB_RS: &str = "pub fn add(a: i32, b: i32) -> i32 {\n    a + b\n}\n";
    const MAIN_PY: &str = "def main():\n    print('hello')\n";
    const README: &str = "# Title\n\nSome words about the project.\n";

    fn workspace() -> Harness {
        Harness::new([
            ("src/lib.rs", LIB_RS),
            ("app/main.py", MAIN_PY),
            ("README.md", README),
            ("generated/out.rs", LIB_RS),
            ("notes.txt", "not indexed"),
        ])
    }

    #[tokio::test]
    async fn full_run_indexes_candidates_and_reruns_are_idempotent() {
        let harness = workspace();
        let ctx = RequestContext::new_request();

        let first = harness.indexer().run(&ctx).await;
        assert_eq!(first.state, IndexerState::Completed);
        assert_eq!(first.summary.files_scanned, 3);
        assert_eq!(first.summary.files_indexed, 3);
        assert!(first.summary.blocks_upserted >= 3);
        assert!(first.summary.failures.is_empty());
        assert_eq!(
            harness.stored_paths().await,
            vec!["README.md", "app/main.py", "src/lib.rs"]
        );

        let second = harness.indexer().run(&ctx).await;
        assert_eq!(second.state, IndexerState::Completed);
        assert_eq!(second.summary.blocks_upserted, 0);
        assert_eq!(second.summary.blocks_deleted, 0);
        assert_eq!(second.summary.files_unchanged, 3);
        assert_eq!(second.summary.blocks_unchanged, first.summary.blocks_upserted);
        assert_eq!(second.summary.batches_dispatched, 0);
    }

    #[tokio::test]
    async fn force_reupserts_every_block() {
        let harness = workspace();
        let ctx = RequestContext::new_request();
        let first = harness.indexer().run(&ctx).await;

        let forced = Indexer::new(harness.deps(), harness.options().with_force(true))
            .run(&ctx)
            .await;
        assert_eq!(forced.state, IndexerState::Completed);
        assert_eq!(forced.summary.blocks_upserted, first.summary.blocks_upserted);
        assert_eq!(forced.summary.blocks_unchanged, 0);
    }

    #[tokio::test]
    async fn vanished_files_are_purged_on_the_next_full_run() {
        let harness = workspace();
        let ctx = RequestContext::new_request();
        harness.indexer().run(&ctx).await;

        harness.fs.remove("app/main.py");
        let report = harness.indexer().run(&ctx).await;

        assert_eq!(report.state, IndexerState::Completed);
        assert_eq!(report.summary.files_removed, 1);
        assert!(report.summary.blocks_deleted >= 1);
        assert_eq!(harness.stored_paths().await, vec!["README.md", "src/lib.rs"]);
        assert_eq!(harness.ledger_paths().await, vec!["README.md", "src/lib.rs"]);
    }

    #[tokio::test]
    async fn changes_touch_only_the_listed_files() {
        let harness = workspace();
        let ctx = RequestContext::new_request();
        harness.indexer().run(&ctx).await;
        let reads_before = harness.fs.reads();

        harness.fs.write("src/lib.rs", "pub fn sub(a: i32, b: i32) -> i32 {\n    a - b\n}\n");
        harness.fs.remove("README.md");
        let events = vec![
            FileChangeEvent::new(
                RelativePath::parse("src/lib.rs").expect("path"),
                FileChangeKind::Modified,
            ),
            FileChangeEvent::new(
                RelativePath::parse("README.md").expect("path"),
                FileChangeKind::Deleted,
            ),
        ];
        let report = harness.indexer().apply_changes(&ctx, events).await;

        assert_eq!(report.state, IndexerState::Completed);
        assert_eq!(harness.fs.reads() - reads_before, 1);
        assert_eq!(report.summary.files_scanned, 1);
        assert_eq!(report.summary.files_indexed, 1);
        assert_eq!(report.summary.files_removed, 1);
        assert_eq!(harness.stored_paths().await, vec!["app/main.py", "src/lib.rs"]);
        assert_eq!(harness.ledger_paths().await, vec!["app/main.py", "src/lib.rs"]);
    }

    #[tokio::test]
    async fn changes_to_non_candidates_are_ignored() {
        let harness = workspace();
        let ctx = RequestContext::new_request();
        harness.indexer().run(&ctx).await;
        let reads_before = harness.fs.reads();

        let events = vec![
            FileChangeEvent::new(
                RelativePath::parse("notes.txt").expect("path"),
                FileChangeKind::Modified,
            ),
            FileChangeEvent::new(
                RelativePath::parse("generated/out.rs").expect("path"),
                FileChangeKind::Created,
            ),
        ];
        let report = harness.indexer().apply_changes(&ctx, events).await;

        assert_eq!(report.state, IndexerState::Completed);
        assert_eq!(harness.fs.reads(), reads_before);
        assert_eq!(report.summary.files_scanned, 0);
    }

    #[tokio::test]
    async fn progress_reports_state_changes_and_files() {
        let harness = workspace();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let indexer = harness
            .indexer()
            .with_progress(Arc::new(move |event| sink.lock().expect("events").push(event)));

        let report = indexer.run(&RequestContext::new_request()).await;
        assert_eq!(report.state, IndexerState::Completed);

        let events = events.lock().expect("events");
        let states: Vec<IndexerState> = events
            .iter()
            .filter_map(|event| match event {
                ProgressEvent::State { state } => Some(*state),
                ProgressEvent::FileIndexed { .. } => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![IndexerState::Scanning, IndexerState::Processing, IndexerState::Completed]
        );
        let last_files_done = events.iter().rev().find_map(|event| match event {
            ProgressEvent::FileIndexed { files_done, .. } => Some(*files_done),
            ProgressEvent::State { .. } => None,
        });
        assert_eq!(last_files_done, Some(3));
    }

    #[tokio::test]
    async fn unreadable_root_fails_the_run() {
        let harness = workspace();
        harness.fs.deny("");
        let report = harness.indexer().run(&RequestContext::new_request()).await;

        assert_eq!(report.state, IndexerState::Failed);
        let error = report.error.expect("error");
        assert_eq!(error.code, ErrorCode::new("index", "scan_root_unreadable"));
        assert!(harness.ledger_paths().await.is_empty());
    }

    #[tokio::test]
    async fn cancelled_run_ends_failed_and_keeps_the_index() {
        let harness = workspace();
        let ctx = RequestContext::new_request();
        harness.indexer().run(&ctx).await;

        let cancelled = RequestContext::new_request();
        cancelled.cancel();
        harness.fs.remove("app/main.py");
        let report = harness.indexer().run(&cancelled).await;

        assert_eq!(report.state, IndexerState::Failed);
        assert!(report.is_cancelled());
        assert_eq!(
            harness.ledger_paths().await,
            vec!["README.md", "app/main.py", "src/lib.rs"]
        );
    }
}
