//! Vector store boundary contract.

use crate::BoxFuture;
use code_index_domain::{BlockIdentity, BlockPayload, CollectionName, IndexedVector, RelativePath};
use code_index_shared::{RequestContext, Result};

/// Provider descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorStoreProviderInfo {
    /// Stable provider identifier (`qdrant`, `local`).
    pub id: Box<str>,
    /// Human-readable provider name.
    pub name: Box<str>,
}

/// Nearest-neighbour query.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorQuery {
    /// Query embedding.
    pub vector: Vec<f32>,
    /// Maximum number of matches.
    pub top_k: usize,
    /// Matches scoring below this are not returned.
    pub score_threshold: Option<f32>,
}

/// A stored vector returned by a query.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorMatch {
    /// Identity of the stored block.
    pub identity: BlockIdentity,
    /// Cosine similarity.
    pub score: f32,
    /// Stored payload.
    pub payload: BlockPayload,
}

/// Boundary contract for vector storage and retrieval.
///
/// `upsert` overwrites by identity and deleting an unknown identity is a
/// no-op, so every write can be retried safely.
pub trait VectorStorePort: Send + Sync {
    /// Provider info for this implementation.
    fn provider(&self) -> &VectorStoreProviderInfo;

    /// Create the collection when missing.
    fn ensure_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        dimension: u32,
    ) -> BoxFuture<'_, Result<()>>;

    /// Return true when the collection exists.
    fn has_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
    ) -> BoxFuture<'_, Result<bool>>;

    /// Drop the collection; dropping a missing collection succeeds.
    fn drop_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
    ) -> BoxFuture<'_, Result<()>>;

    /// Insert or overwrite vectors keyed by identity.
    fn upsert(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        vectors: Vec<IndexedVector>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Delete vectors by identity.
    fn delete(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        identities: Vec<BlockIdentity>,
    ) -> BoxFuture<'_, Result<()>>;

    /// Delete every vector whose payload `filePath` equals `file_path`.
    fn delete_by_file(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        file_path: RelativePath,
    ) -> BoxFuture<'_, Result<()>>;

    /// Nearest-neighbour search ordered by descending score.
    fn query(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        query: VectorQuery,
    ) -> BoxFuture<'_, Result<Vec<VectorMatch>>>;
}
