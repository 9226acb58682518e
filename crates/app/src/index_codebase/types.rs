//! Dependencies, options and per-file records of an indexing run.

use crate::chunker::ChunkerOptions;
use crate::embedding_client::EmbeddingClientOptions;
use crate::run_summary::FailureRecord;
use crate::scanner::{ScannerDeps, ScannerOptions};
use code_index_domain::constants::{
    BATCH_PROCESSING_CONCURRENCY, INITIAL_RETRY_DELAY_MS, MAX_BATCH_RETRIES, MAX_PENDING_BATCHES,
    PARSING_CONCURRENCY,
};
use code_index_domain::{
    BlockHashes, BlockIdentity, CodeBlock, CollectionName, ContentHash, ProgressEvent,
    RelativePath,
};
use code_index_ports::{
    EmbeddingPort, FileSystemPort, IdentityLedgerPort, IgnorePort, LoggerPort,
    StructureParserPort, VectorStorePort,
};
use code_index_shared::RetryPolicy;
use std::path::PathBuf;
use std::sync::Arc;

/// Callback receiving progress events.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Ports used by an indexing run.
#[derive(Clone)]
pub struct IndexerDeps {
    /// Workspace filesystem.
    pub filesystem: Arc<dyn FileSystemPort>,
    /// Ignore rules.
    pub ignore: Arc<dyn IgnorePort>,
    /// Syntax boundaries for the chunker.
    pub structure: Arc<dyn StructureParserPort>,
    /// Embedding provider.
    pub embedding: Arc<dyn EmbeddingPort>,
    /// Vector store.
    pub vector_store: Arc<dyn VectorStorePort>,
    /// Per-file identity ledger.
    pub ledger: Arc<dyn IdentityLedgerPort>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

impl IndexerDeps {
    pub(crate) fn scanner_deps(&self) -> ScannerDeps {
        ScannerDeps {
            filesystem: Arc::clone(&self.filesystem),
            ignore: Arc::clone(&self.ignore),
            logger: self.logger.clone(),
        }
    }
}

/// Settings of an indexing run.
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    /// Absolute workspace root.
    pub root: PathBuf,
    /// Target collection.
    pub collection: CollectionName,
    /// Scan filters and limits.
    pub scanner: ScannerOptions,
    /// Block size bounds.
    pub chunker: ChunkerOptions,
    /// Embedding retries and oversized-item policy.
    pub embedding: EmbeddingClientOptions,
    /// Backoff for vector store writes.
    pub write_retry: RetryPolicy,
    /// Files read and chunked concurrently.
    pub parsing_concurrency: usize,
    /// Batches embedded and written concurrently.
    pub batch_concurrency: usize,
    /// Batches in flight between dispatch and acknowledgement.
    pub max_pending_batches: usize,
    /// Ignore the ledger and re-upsert every block.
    pub force: bool,
}

impl IndexerOptions {
    /// Defaults for `root` and `collection`.
    pub fn new(root: PathBuf, collection: CollectionName) -> Self {
        Self {
            root,
            collection,
            scanner: ScannerOptions::default(),
            chunker: ChunkerOptions::default(),
            embedding: EmbeddingClientOptions::default(),
            write_retry: RetryPolicy::exponential(MAX_BATCH_RETRIES, INITIAL_RETRY_DELAY_MS),
            parsing_concurrency: PARSING_CONCURRENCY,
            batch_concurrency: BATCH_PROCESSING_CONCURRENCY,
            max_pending_batches: MAX_PENDING_BATCHES,
            force: false,
        }
    }

    /// Same options with `force` set.
    #[must_use]
    pub const fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }
}

/// Result of reading, chunking and diffing one file.
pub(crate) enum FilePlan {
    Diffed(FileDiff),
    /// The file disappeared before it could be read.
    Vanished(RelativePath),
    /// Reading failed; the ledger entry is left alone.
    Unreadable(FailureRecord),
}

pub(crate) struct FileDiff {
    pub path: RelativePath,
    pub previous: Option<BlockHashes>,
    /// Unchanged blocks plus stale identities whose delete failed.
    pub retained: BlockHashes,
    pub to_embed: Vec<CodeBlock>,
    pub unchanged: u64,
    pub deleted: u64,
    pub failures: Vec<FailureRecord>,
}

/// A file whose blocks are still in flight.
pub(crate) struct FileProgress {
    pub remaining: usize,
    pub hashes: BlockHashes,
    pub previous: Option<BlockHashes>,
    pub touched: bool,
}

/// One block of a dispatched batch.
pub(crate) struct BatchItem {
    pub path: RelativePath,
    pub identity: BlockIdentity,
    pub hash: ContentHash,
}

/// Acknowledgement of a dispatched batch.
pub(crate) struct BatchOutcome {
    pub items: Vec<BatchItem>,
    pub truncated_items: u64,
    pub failure: Option<FailureRecord>,
}
