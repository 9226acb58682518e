//! Fixtures shared by the integration tests.
#![allow(dead_code)]

use code_index_adapters::{
    HashingEmbedding, IgnoreMatcher, LocalFileSystem, LocalVectorStore, TreeSitterStructureParser,
};
use code_index_app::{IndexerDeps, IndexerOptions};
use code_index_domain::{
    BlockIdentity, CollectionName, EmbeddingLimits, IndexedVector, RelativePath,
};
use code_index_ports::{
    BoxFuture, EmbedBatchRequest, EmbeddingPort, EmbeddingProviderInfo, EmbeddingVector,
    IdentityLedgerPort, VectorMatch, VectorQuery, VectorStorePort, VectorStoreProviderInfo,
};
use code_index_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub const DIMENSION: u32 = 32;

/// A workspace directory plus a sibling state directory, removed on drop.
pub struct TempWorkspace {
    pub root: PathBuf,
    pub state: PathBuf,
}

impl TempWorkspace {
    pub fn new(label: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos())
            .unwrap_or(0);
        let base = std::env::temp_dir().join(format!(
            "cidx-{label}-{}-{nanos}",
            std::process::id()
        ));
        let root = base.join("workspace");
        let state = base.join("state");
        std::fs::create_dir_all(&root).expect("create workspace");
        std::fs::create_dir_all(&state).expect("create state");
        Self { root, state }
    }

    pub fn write(&self, relative: &str, text: &str) {
        let path = self.root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent");
        }
        std::fs::write(path, text).expect("write file");
    }

    pub fn remove(&self, relative: &str) {
        std::fs::remove_file(self.root.join(relative)).expect("remove file");
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        if let Some(base) = self.root.parent() {
            let _ = std::fs::remove_dir_all(base);
        }
    }
}

pub fn collection() -> CollectionName {
    CollectionName::parse("code_chunks_it").expect("collection")
}

pub fn hashing(limits: EmbeddingLimits) -> Arc<HashingEmbedding> {
    Arc::new(HashingEmbedding::new(DIMENSION, limits).expect("hashing embedding"))
}

pub fn deps(
    embedding: Arc<dyn EmbeddingPort>,
    vector_store: Arc<dyn VectorStorePort>,
    ledger: Arc<dyn IdentityLedgerPort>,
) -> IndexerDeps {
    IndexerDeps {
        filesystem: Arc::new(LocalFileSystem::new()),
        ignore: Arc::new(IgnoreMatcher::new(Vec::<String>::new())),
        structure: Arc::new(TreeSitterStructureParser::new()),
        embedding,
        vector_store,
        ledger,
        logger: None,
    }
}

pub fn options(root: &Path) -> IndexerOptions {
    IndexerOptions::new(root.to_path_buf(), collection())
}

/// Every stored vector of the test collection.
pub async fn stored(store: &dyn VectorStorePort) -> Vec<VectorMatch> {
    let ctx = RequestContext::new_request();
    if !store
        .has_collection(&ctx, collection())
        .await
        .expect("has collection")
    {
        return Vec::new();
    }
    let query = VectorQuery {
        vector: vec![1.0; DIMENSION as usize],
        top_k: 100_000,
        score_threshold: None,
    };
    store
        .query(&ctx, collection(), query)
        .await
        .expect("query")
}

/// Stored blocks of `path`, ordered by start line.
pub async fn stored_file(store: &dyn VectorStorePort, path: &str) -> Vec<VectorMatch> {
    let mut blocks: Vec<VectorMatch> = stored(store)
        .await
        .into_iter()
        .filter(|hit| hit.payload.file_path.as_str() == path)
        .collect();
    blocks.sort_by_key(|hit| hit.payload.start_line);
    blocks
}

#[derive(Debug, Default, Clone)]
pub struct Recorded {
    pub upserted: Vec<String>,
    pub deleted: usize,
}

/// Local store that records writes, optionally stalls upserts and tracks how
/// many upserts run at once.
pub struct RecordingStore {
    inner: LocalVectorStore,
    upsert_delay: Duration,
    recorded: Mutex<Recorded>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingStore {
    pub fn new(inner: LocalVectorStore) -> Self {
        Self::stalled(inner, Duration::ZERO)
    }

    pub fn stalled(inner: LocalVectorStore, upsert_delay: Duration) -> Self {
        Self {
            inner,
            upsert_delay,
            recorded: Mutex::new(Recorded::default()),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub fn take(&self) -> Recorded {
        std::mem::take(&mut *self.recorded.lock().expect("recorded"))
    }

    pub fn peak_concurrent_upserts(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl VectorStorePort for RecordingStore {
    fn provider(&self) -> &VectorStoreProviderInfo {
        self.inner.provider()
    }

    fn ensure_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        dimension: u32,
    ) -> BoxFuture<'_, Result<()>> {
        self.inner.ensure_collection(ctx, collection, dimension)
    }

    fn has_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
    ) -> BoxFuture<'_, Result<bool>> {
        self.inner.has_collection(ctx, collection)
    }

    fn drop_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        self.inner.drop_collection(ctx, collection)
    }

    fn upsert(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        vectors: Vec<IndexedVector>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            if !self.upsert_delay.is_zero() {
                tokio::time::sleep(self.upsert_delay).await;
            }
            let paths = vectors
                .iter()
                .map(|vector| vector.payload.file_path.as_str().to_owned());
            self.recorded.lock().expect("recorded").upserted.extend(paths);
            let result = self.inner.upsert(&ctx, collection, vectors).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            result
        })
    }

    fn delete(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        identities: Vec<BlockIdentity>,
    ) -> BoxFuture<'_, Result<()>> {
        self.recorded.lock().expect("recorded").deleted += identities.len();
        self.inner.delete(ctx, collection, identities)
    }

    fn delete_by_file(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        file_path: RelativePath,
    ) -> BoxFuture<'_, Result<()>> {
        self.inner.delete_by_file(ctx, collection, file_path)
    }

    fn query(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        query: VectorQuery,
    ) -> BoxFuture<'_, Result<Vec<VectorMatch>>> {
        self.inner.query(ctx, collection, query)
    }
}

/// Hashing embedder that rejects any batch containing `marker`.
pub struct MarkerFailingEmbedding {
    inner: HashingEmbedding,
    marker: &'static str,
}

impl MarkerFailingEmbedding {
    pub fn new(marker: &'static str) -> Self {
        Self {
            inner: HashingEmbedding::new(DIMENSION, EmbeddingLimits::default())
                .expect("hashing embedding"),
            marker,
        }
    }
}

impl EmbeddingPort for MarkerFailingEmbedding {
    fn provider(&self) -> &EmbeddingProviderInfo {
        self.inner.provider()
    }

    fn limits(&self) -> EmbeddingLimits {
        self.inner.limits()
    }

    fn embed_batch(
        &self,
        ctx: &RequestContext,
        request: EmbedBatchRequest,
    ) -> BoxFuture<'_, Result<Vec<EmbeddingVector>>> {
        if request.texts.iter().any(|text| text.contains(self.marker)) {
            let error = ErrorEnvelope::expected(
                ErrorCode::new("embedding", "invalid_request"),
                "rejected by test embedder",
            );
            return Box::pin(async move { Err(error) });
        }
        self.inner.embed_batch(ctx, request)
    }

    fn detect_dimension(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<u32>> {
        self.inner.detect_dimension(ctx)
    }
}
