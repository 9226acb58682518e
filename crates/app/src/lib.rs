//! # code-index-app
//!
//! Application use cases: full and incremental indexing, watch, search and
//! clear. This crate depends on `ports`, `domain`, and `shared`.

pub mod batcher;
pub mod chunker;
pub mod clear_index;
pub mod embedding_client;
pub mod index_codebase;
pub mod reindex_by_change;
pub mod run_summary;
pub mod scanner;
pub mod semantic_search;
pub mod vector_writer;

#[cfg(test)]
mod test_support;

pub use batcher::{Batcher, batch_blocks};
pub use chunker::{ChunkedFile, Chunker, ChunkerOptions, CutSource};
pub use clear_index::{ClearIndexDeps, clear_index};
pub use embedding_client::{BatchFailure, EmbeddedBatch, EmbeddingClient, EmbeddingClientOptions};
pub use index_codebase::{Indexer, IndexerDeps, IndexerOptions, ProgressCallback};
pub use reindex_by_change::{
    ChangeCoalescer, ChangeWatcher, WatchOptions, coalesce_changes, watch_and_reindex,
};
pub use run_summary::{FailureKind, FailureRecord, RunReport, RunSummary};
pub use scanner::{ScanError, ScanReport, ScannedFile, Scanner, ScannerDeps, ScannerOptions};
pub use semantic_search::{SemanticSearchDeps, SemanticSearchInput, semantic_search};
pub use vector_writer::{PendingBatchTracker, PendingSlot, VectorWriter, WriteFailure};
