//! # code-index-domain
//!
//! Domain model of the code-indexing pipeline, free of I/O:
//!
//! - **Primitives**: `CollectionName`, `RelativePath`, `EmbeddingProviderId`
//! - **Blocks**: `CodeBlock`, `BlockIdentity`, `ContentHash`
//! - **Batches**: `EmbeddingBatch`, `EmbeddingLimits`, `OversizedItemPolicy`
//! - **Vectors and search**: `IndexedVector`, `SearchRequest`, `SearchResult`
//! - **Runs**: `IndexerState`, `ProgressEvent`, file-change events
//! - **Constants**: pipeline defaults
//!
//! Depends only on the shared crate.

pub mod batch;
pub mod block;
pub mod change;
pub mod constants;
pub mod primitives;
pub mod search;
pub mod spans;
pub mod states;
pub mod vector;

pub use batch::{EmbeddingBatch, EmbeddingLimits, OversizedItemPolicy};
pub use block::{
    BlockHashes, BlockIdentity, CodeBlock, ContentHash, derive_block_identity, estimate_tokens,
};
pub use change::{FileChangeEvent, FileChangeKind};
pub use primitives::{
    CollectionName, EmbeddingProviderId, PrimitiveError, RelativePath, derive_collection_name,
};
pub use search::{SearchRequest, SearchResult, compare_search_results};
pub use spans::{Language, LineSpan};
pub use states::{IndexerState, ProgressEvent};
pub use vector::{BlockPayload, IndexedVector};
