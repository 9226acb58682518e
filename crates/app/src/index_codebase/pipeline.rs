//! Parse pool feeding the batcher, and the backpressured batch pool behind it.

use super::file_task::FileTask;
use super::types::{
    BatchItem, BatchOutcome, FileDiff, FilePlan, FileProgress, IndexerDeps, IndexerOptions,
    ProgressCallback,
};
use crate::batcher::Batcher;
use crate::chunker::Chunker;
use crate::embedding_client::EmbeddingClient;
use crate::run_summary::{FailureKind, FailureRecord, RunSummary, as_count};
use crate::scanner::{ScannedFile, Scanner};
use crate::vector_writer::{PendingBatchTracker, PendingSlot, VectorWriter};
use code_index_domain::{BlockHashes, EmbeddingBatch, ProgressEvent, RelativePath};
use code_index_ports::log_fields;
use code_index_shared::{
    ErrorEnvelope, RequestContext, Result, TaskTicket, WorkerPool, WorkerPoolOptions,
};
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Where the pipeline pulls file paths from.
pub(crate) enum FileSource<'a> {
    /// A full scan; `first` was pulled while the run was still scanning.
    Scan {
        scanner: &'a mut Scanner,
        first: Option<ScannedFile>,
    },
    /// Paths from coalesced change events.
    Listed(VecDeque<RelativePath>),
}

impl FileSource<'_> {
    async fn next(&mut self, ctx: &RequestContext) -> Result<Option<RelativePath>> {
        match self {
            Self::Scan { scanner, first } => match first.take() {
                Some(file) => Ok(Some(file.path)),
                None => Ok(scanner.next_file(ctx).await?.map(|file| file.path)),
            },
            Self::Listed(paths) => Ok(paths.pop_front()),
        }
    }
}

struct BatchTask {
    ctx: RequestContext,
    client: EmbeddingClient,
    writer: VectorWriter,
    batch: EmbeddingBatch,
    slot: PendingSlot,
}

impl BatchTask {
    async fn run(self) -> Result<BatchOutcome> {
        let Self {
            ctx,
            client,
            writer,
            batch,
            slot,
        } = self;
        let _slot = slot;
        let items: Vec<BatchItem> = batch
            .items
            .iter()
            .map(|block| BatchItem {
                path: block.file_path.clone(),
                identity: block.identity,
                hash: block.content_hash.clone(),
            })
            .collect();
        let path = shared_path(&items);
        let blocks = as_count(items.len());
        let failed = |kind: FailureKind, error: &ErrorEnvelope| {
            let record = FailureRecord::new(kind, error).with_blocks(blocks);
            Some(match path.clone() {
                Some(path) => record.with_path(path),
                None => record,
            })
        };

        let embedded = match client.embed(&ctx, &batch).await {
            Ok(embedded) => embedded,
            Err(failure) if failure.kind == FailureKind::Cancelled => return Err(failure.error),
            Err(failure) => {
                return Ok(BatchOutcome {
                    failure: failed(failure.kind, &failure.error),
                    items,
                    truncated_items: 0,
                });
            },
        };
        let failure = match writer.upsert(&ctx, embedded.vectors).await {
            Ok(()) => None,
            Err(write) if write.error.is_cancelled() => return Err(write.error),
            Err(write) => failed(FailureKind::VectorStore, &write.error),
        };
        Ok(BatchOutcome {
            items,
            truncated_items: embedded.truncated_items,
            failure,
        })
    }
}

fn shared_path(items: &[BatchItem]) -> Option<RelativePath> {
    let first = items.first()?;
    items
        .iter()
        .all(|item| item.path == first.path)
        .then(|| first.path.clone())
}

/// One processing phase: parse pool, batcher, batch pool and the per-file
/// bookkeeping that turns batch acknowledgements into ledger entries.
pub(crate) struct Pipeline<'a> {
    ctx: &'a RequestContext,
    deps: &'a IndexerDeps,
    options: &'a IndexerOptions,
    on_progress: Option<ProgressCallback>,
    chunker: Chunker,
    client: EmbeddingClient,
    writer: VectorWriter,
    parse_pool: WorkerPool,
    batch_pool: WorkerPool,
    tracker: Arc<PendingBatchTracker>,
    batcher: Batcher,
    outcomes: FuturesUnordered<TaskTicket<BatchOutcome>>,
    files: HashMap<RelativePath, FileProgress>,
    seen: HashSet<RelativePath>,
    files_done: u64,
    blocks_written: u64,
    pub(crate) summary: RunSummary,
}

impl<'a> Pipeline<'a> {
    pub(crate) fn new(
        ctx: &'a RequestContext,
        deps: &'a IndexerDeps,
        options: &'a IndexerOptions,
        on_progress: Option<ProgressCallback>,
    ) -> Result<Self> {
        let parsing = options.parsing_concurrency.max(1);
        let batching = options.batch_concurrency.max(1);
        let parse_pool = WorkerPool::new(
            ctx.clone(),
            WorkerPoolOptions {
                concurrency: parsing,
                queue_capacity: Some(parsing.saturating_mul(2)),
            },
        )?;
        let batch_pool = WorkerPool::new(
            ctx.clone(),
            WorkerPoolOptions {
                concurrency: batching,
                queue_capacity: Some(options.max_pending_batches.max(1)),
            },
        )?;
        let writer = VectorWriter::new(
            Arc::clone(&deps.vector_store),
            options.collection.clone(),
            deps.logger.clone(),
        )
        .with_retry(options.write_retry);

        Ok(Self {
            ctx,
            deps,
            options,
            on_progress,
            chunker: Chunker::new(Arc::clone(&deps.structure), options.chunker),
            client: EmbeddingClient::new(
                Arc::clone(&deps.embedding),
                options.embedding,
                deps.logger.clone(),
            ),
            writer,
            parse_pool,
            batch_pool,
            tracker: Arc::new(PendingBatchTracker::new(options.max_pending_batches)),
            batcher: Batcher::new(deps.embedding.limits()),
            outcomes: FuturesUnordered::new(),
            files: HashMap::new(),
            seen: HashSet::new(),
            files_done: 0,
            blocks_written: 0,
            summary: RunSummary::default(),
        })
    }

    /// Process every file of `source`, then wait for all batches.
    pub(crate) async fn drive(&mut self, source: &mut FileSource<'_>) -> Result<()> {
        let prefetch = self.options.parsing_concurrency.max(1).saturating_mul(2);
        let mut parsing: VecDeque<TaskTicket<FilePlan>> = VecDeque::new();
        let mut exhausted = false;

        loop {
            while !exhausted && parsing.len() < prefetch {
                match source.next(self.ctx).await? {
                    Some(path) => {
                        self.seen.insert(path.clone());
                        parsing.push_back(self.dispatch_file(path).await?);
                    },
                    None => exhausted = true,
                }
            }
            let Some(ticket) = parsing.pop_front() else {
                break;
            };
            let plan = ticket.await?;
            self.accept(plan).await?;
            self.absorb_ready().await?;
        }

        if let Some(batch) = self.batcher.flush() {
            self.dispatch_batch(batch).await?;
        }
        while let Some(outcome) = self.outcomes.next().await {
            self.absorb(outcome?).await?;
        }
        Ok(())
    }

    /// Paths pulled from the source so far.
    pub(crate) const fn seen(&self) -> &HashSet<RelativePath> {
        &self.seen
    }

    /// Delete every vector of `path` and drop its ledger entry.
    pub(crate) async fn remove_file(&mut self, path: &RelativePath) -> Result<()> {
        let collection = self.options.collection.clone();
        let previous = match self.deps.ledger.load_file(self.ctx, collection, path.clone()).await {
            Ok(previous) => previous,
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => {
                let failure = FailureRecord::new(FailureKind::Ledger, &error);
                self.summary.record(failure.with_path(path.clone()));
                return Ok(());
            },
        };

        let Some(hashes) = previous else {
            return match self.writer.delete_by_file(self.ctx, path).await {
                Ok(()) => {
                    self.summary.files_removed += 1;
                    Ok(())
                },
                Err(error) if error.is_cancelled() => Err(error),
                Err(error) => {
                    let failure = FailureRecord::new(FailureKind::VectorStore, &error);
                    self.summary.record(failure.with_path(path.clone()));
                    Ok(())
                },
            };
        };

        let identities: Vec<_> = hashes.keys().copied().collect();
        let count = as_count(identities.len());
        match self.writer.delete(self.ctx, identities).await {
            Ok(()) => {},
            Err(failure) if failure.error.is_cancelled() => return Err(failure.error),
            Err(failure) => {
                self.summary.record(
                    FailureRecord::new(FailureKind::VectorStore, &failure.error)
                        .with_path(path.clone())
                        .with_blocks(count),
                );
                return Ok(());
            },
        }
        self.summary.blocks_deleted += count;
        self.summary.files_removed += 1;
        self.store_ledger(path.clone(), BlockHashes::new()).await?;
        if let Some(logger) = self.deps.logger.as_ref() {
            logger.debug(
                "index.file.removed",
                "removed vectors of a deleted file",
                Some(log_fields! { "file" => path.as_str(), "blocks" => count }),
            );
        }
        Ok(())
    }

    /// Stop both pools; queued work is dropped.
    pub(crate) async fn shutdown(self) -> RunSummary {
        let Self {
            parse_pool,
            batch_pool,
            tracker,
            deps,
            mut summary,
            ..
        } = self;
        summary.peak_pending_batches = summary
            .peak_pending_batches
            .max(as_count(tracker.peak()));
        for (name, pool) in [("parse", parse_pool), ("batch", batch_pool)] {
            if let Err(error) = pool.shutdown().await
                && let Some(logger) = deps.logger.as_ref()
            {
                logger.warn(
                    "index.pool.shutdown_failed",
                    "worker pool did not stop cleanly",
                    Some(log_fields! { "pool" => name, "code" => error.code.to_string() }),
                );
            }
        }
        summary
    }

    async fn dispatch_file(&self, path: RelativePath) -> Result<TaskTicket<FilePlan>> {
        let task = FileTask {
            ctx: self.ctx.clone(),
            filesystem: Arc::clone(&self.deps.filesystem),
            ledger: Arc::clone(&self.deps.ledger),
            chunker: self.chunker.clone(),
            writer: self.writer.clone(),
            logger: self.deps.logger.clone(),
            root: self.options.root.clone(),
            collection: self.options.collection.clone(),
            path,
            force: self.options.force,
        };
        self.parse_pool.dispatch(move || task.run()).await
    }

    async fn accept(&mut self, plan: FilePlan) -> Result<()> {
        match plan {
            FilePlan::Vanished(path) => self.remove_file(&path).await,
            FilePlan::Unreadable(failure) => {
                self.summary.record(failure);
                Ok(())
            },
            FilePlan::Diffed(diff) => self.accept_diff(diff).await,
        }
    }

    async fn accept_diff(&mut self, diff: FileDiff) -> Result<()> {
        let FileDiff {
            path,
            previous,
            retained,
            to_embed,
            unchanged,
            deleted,
            failures,
        } = diff;
        self.summary.blocks_unchanged += unchanged;
        self.summary.blocks_deleted += deleted;
        for failure in failures {
            self.summary.record(failure);
        }

        let progress = FileProgress {
            remaining: to_embed.len(),
            hashes: retained,
            previous,
            touched: deleted > 0 || !to_embed.is_empty(),
        };
        if to_embed.is_empty() {
            return self.finish_file(path, progress).await;
        }
        self.files.insert(path, progress);
        for block in to_embed {
            for batch in self.batcher.push(block) {
                self.dispatch_batch(batch).await?;
            }
        }
        Ok(())
    }

    async fn dispatch_batch(&mut self, batch: EmbeddingBatch) -> Result<()> {
        let slot = loop {
            if let Some(slot) = self.tracker.try_acquire() {
                break slot;
            }
            match self.outcomes.next().await {
                Some(outcome) => self.absorb(outcome?).await?,
                None => break self.tracker.acquire_slot(self.ctx).await?,
            }
        };
        self.summary.batches_dispatched += 1;
        let task = BatchTask {
            ctx: self.ctx.clone(),
            client: self.client.clone(),
            writer: self.writer.clone(),
            batch,
            slot,
        };
        let ticket = self.batch_pool.dispatch(move || task.run()).await?;
        self.outcomes.push(ticket);
        Ok(())
    }

    async fn absorb_ready(&mut self) -> Result<()> {
        while let Some(Some(outcome)) = self.outcomes.next().now_or_never() {
            self.absorb(outcome?).await?;
        }
        Ok(())
    }

    async fn absorb(&mut self, outcome: BatchOutcome) -> Result<()> {
        let BatchOutcome {
            items,
            truncated_items,
            failure,
        } = outcome;
        let succeeded = failure.is_none();
        let blocks = as_count(items.len());
        self.summary.truncated_items += truncated_items;
        match failure {
            None => {
                self.summary.blocks_upserted += blocks;
                self.blocks_written += blocks;
            },
            Some(failure) => {
                self.summary.batches_failed += 1;
                self.log_batch_failure(&failure);
                self.summary.record(failure);
            },
        }

        for item in items {
            let Some(progress) = self.files.get_mut(&item.path) else {
                continue;
            };
            if succeeded {
                progress.hashes.insert(item.identity, item.hash);
            } else if let Some(hash) = progress
                .previous
                .as_ref()
                .and_then(|previous| previous.get(&item.identity))
            {
                // The store may still hold the old vector under this identity.
                progress.hashes.insert(item.identity, hash.clone());
            }
            progress.remaining = progress.remaining.saturating_sub(1);
            if progress.remaining == 0
                && let Some(progress) = self.files.remove(&item.path)
            {
                self.finish_file(item.path, progress).await?;
            }
        }
        Ok(())
    }

    async fn finish_file(&mut self, path: RelativePath, progress: FileProgress) -> Result<()> {
        let FileProgress {
            hashes,
            previous,
            touched,
            ..
        } = progress;
        self.files_done += 1;
        if touched {
            self.summary.files_indexed += 1;
        } else {
            self.summary.files_unchanged += 1;
        }
        let unchanged_entry = match previous.as_ref() {
            Some(previous) => *previous == hashes,
            None => hashes.is_empty(),
        };
        if !unchanged_entry {
            self.store_ledger(path, hashes).await?;
        }
        if let Some(on_progress) = self.on_progress.as_ref() {
            on_progress(ProgressEvent::FileIndexed {
                files_done: self.files_done,
                blocks_written: self.blocks_written,
            });
        }
        Ok(())
    }

    async fn store_ledger(&mut self, path: RelativePath, hashes: BlockHashes) -> Result<()> {
        let collection = self.options.collection.clone();
        match self
            .deps
            .ledger
            .store_file(self.ctx, collection, path.clone(), hashes)
            .await
        {
            Ok(()) => Ok(()),
            Err(error) if error.is_cancelled() => Err(error),
            Err(error) => {
                self.summary
                    .record(FailureRecord::new(FailureKind::Ledger, &error).with_path(path));
                Ok(())
            },
        }
    }

    fn log_batch_failure(&self, failure: &FailureRecord) {
        let Some(logger) = self.deps.logger.as_ref() else {
            return;
        };
        let fields = log_fields! {
            "kind" => failure.kind,
            "code" => failure.code.as_str(),
            "blocks" => failure.blocks,
            "file" => failure.path.as_ref().map(RelativePath::as_str),
        };
        match failure.kind {
            FailureKind::Fatal | FailureKind::RateLimited => {
                logger.error("index.batch.failed", &failure.message, Some(fields));
            },
            _ => logger.warn("index.batch.failed", &failure.message, Some(fields)),
        }
    }
}
