//! Local vector store persisted as one JSON snapshot per collection.
//!
//! Exhaustive cosine scan; suitable for small workspaces and offline runs.
//! Without a storage directory the store is purely in memory.

use code_index_ports::{
    BlockIdentity, BlockPayload, BoxFuture, CollectionName, IndexedVector, RelativePath,
    VectorMatch, VectorQuery, VectorStorePort, VectorStoreProviderInfo,
};
use code_index_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

const LOCAL_SNAPSHOT_VERSION: u32 = 1;

/// Local vector store adapter.
#[derive(Clone)]
pub struct LocalVectorStore {
    provider: VectorStoreProviderInfo,
    storage_dir: Option<PathBuf>,
    collections: Arc<RwLock<HashMap<CollectionName, LocalCollection>>>,
    // Serializes mutate-then-persist so snapshots are written in order.
    write_lock: Arc<Mutex<()>>,
}

impl LocalVectorStore {
    /// Store persisting snapshots under `storage_dir`.
    #[must_use]
    pub fn persistent(storage_dir: PathBuf) -> Self {
        Self::with_storage(Some(storage_dir))
    }

    /// Store that never touches the filesystem.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::with_storage(None)
    }

    fn with_storage(storage_dir: Option<PathBuf>) -> Self {
        Self {
            provider: VectorStoreProviderInfo {
                id: "local".into(),
                name: "Local".into(),
            },
            storage_dir,
            collections: Arc::new(RwLock::new(HashMap::new())),
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    fn snapshot_path(&self, collection: &CollectionName) -> Option<PathBuf> {
        self.storage_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.json", collection.as_str())))
    }

    async fn ensure_loaded(&self, collection: &CollectionName) -> Result<bool> {
        if self.collections.read().await.contains_key(collection) {
            return Ok(true);
        }
        let Some(snapshot) = self.read_snapshot(collection).await? else {
            return Ok(false);
        };
        if snapshot.version != LOCAL_SNAPSHOT_VERSION {
            return Err(ErrorEnvelope::expected(
                ErrorCode::new("vector", "snapshot_version_mismatch"),
                "unsupported local snapshot version",
            )
            .with_metadata("version", snapshot.version.to_string()));
        }
        self.collections
            .write()
            .await
            .entry(collection.clone())
            .or_insert(snapshot.collection);
        Ok(true)
    }

    async fn read_snapshot(
        &self,
        collection: &CollectionName,
    ) -> Result<Option<CollectionSnapshot>> {
        let Some(path) = self.snapshot_path(collection) else {
            return Ok(None);
        };
        match tokio::fs::read(&path).await {
            Ok(payload) => serde_json::from_slice(&payload).map(Some).map_err(|error| {
                snapshot_error("snapshot_parse_failed", "failed to parse snapshot", &error)
            }),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(ErrorEnvelope::from(error)),
        }
    }

    async fn persist(&self, collection: &CollectionName) -> Result<()> {
        let Some(path) = self.snapshot_path(collection) else {
            return Ok(());
        };
        let payload = {
            let guard = self.collections.read().await;
            let Some(state) = guard.get(collection) else {
                return Ok(());
            };
            serde_json::to_vec(&SnapshotRef {
                version: LOCAL_SNAPSHOT_VERSION,
                collection: state,
            })
            .map_err(|error| {
                snapshot_error("snapshot_serialize_failed", "failed to serialize snapshot", &error)
            })?
        };
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, payload).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(())
    }

    /// Apply `mutate` to a loaded collection, then persist it.
    async fn mutate<F>(&self, collection: &CollectionName, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut LocalCollection) -> Result<()> + Send,
    {
        let _write = self.write_lock.lock().await;
        if !self.ensure_loaded(collection).await? {
            return Err(collection_missing(collection));
        }
        {
            let mut guard = self.collections.write().await;
            let state = guard
                .get_mut(collection)
                .ok_or_else(|| collection_missing(collection))?;
            mutate(state)?;
        }
        self.persist(collection).await
    }
}

impl VectorStorePort for LocalVectorStore {
    fn provider(&self) -> &VectorStoreProviderInfo {
        &self.provider
    }

    fn ensure_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        dimension: u32,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("local_vector_store.ensure_collection")?;
            if dimension == 0 {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::invalid_input(),
                    "collection dimension must be positive",
                ));
            }
            if self.ensure_loaded(&collection).await? {
                let guard = self.collections.read().await;
                let existing = guard.get(&collection).map(|state| state.dimension);
                drop(guard);
                if let Some(existing) = existing
                    && existing != dimension
                {
                    return Err(dimension_mismatch(existing, dimension));
                }
                return Ok(());
            }
            let _write = self.write_lock.lock().await;
            self.collections
                .write()
                .await
                .entry(collection.clone())
                .or_insert_with(|| LocalCollection::new(dimension));
            self.persist(&collection).await
        })
    }

    fn has_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
    ) -> BoxFuture<'_, Result<bool>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("local_vector_store.has_collection")?;
            self.ensure_loaded(&collection).await
        })
    }

    fn drop_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("local_vector_store.drop_collection")?;
            let _write = self.write_lock.lock().await;
            self.collections.write().await.remove(&collection);
            let Some(path) = self.snapshot_path(&collection) else {
                return Ok(());
            };
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(error) => Err(ErrorEnvelope::from(error)),
            }
        })
    }

    fn upsert(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        vectors: Vec<IndexedVector>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("local_vector_store.upsert")?;
            if vectors.is_empty() {
                return Ok(());
            }
            self.mutate(&collection, move |state| state.upsert(vectors)).await
        })
    }

    fn delete(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        identities: Vec<BlockIdentity>,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("local_vector_store.delete")?;
            if identities.is_empty() || !self.ensure_loaded(&collection).await? {
                return Ok(());
            }
            self.mutate(&collection, move |state| {
                for identity in &identities {
                    state.points.remove(identity);
                }
                Ok(())
            })
            .await
        })
    }

    fn delete_by_file(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        file_path: RelativePath,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("local_vector_store.delete_by_file")?;
            if !self.ensure_loaded(&collection).await? {
                return Ok(());
            }
            self.mutate(&collection, move |state| {
                state.points.retain(|_, point| point.payload.file_path != file_path);
                Ok(())
            })
            .await
        })
    }

    fn query(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        query: VectorQuery,
    ) -> BoxFuture<'_, Result<Vec<VectorMatch>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("local_vector_store.query")?;
            if !self.ensure_loaded(&collection).await? {
                return Err(collection_missing(&collection));
            }
            let guard = self.collections.read().await;
            let state = guard
                .get(&collection)
                .ok_or_else(|| collection_missing(&collection))?;
            if query.vector.len() != state.dimension as usize {
                return Err(dimension_mismatch(
                    state.dimension,
                    u32::try_from(query.vector.len()).unwrap_or(u32::MAX),
                ));
            }
            Ok(state.query(&query))
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LocalCollection {
    dimension: u32,
    points: BTreeMap<BlockIdentity, StoredPoint>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredPoint {
    vector: Vec<f32>,
    payload: BlockPayload,
}

impl LocalCollection {
    const fn new(dimension: u32) -> Self {
        Self {
            dimension,
            points: BTreeMap::new(),
        }
    }

    fn upsert(&mut self, vectors: Vec<IndexedVector>) -> Result<()> {
        if let Some(bad) = vectors
            .iter()
            .find(|vector| vector.embedding.len() != self.dimension as usize)
        {
            return Err(dimension_mismatch(
                self.dimension,
                u32::try_from(bad.embedding.len()).unwrap_or(u32::MAX),
            ));
        }
        for vector in vectors {
            self.points.insert(
                vector.identity,
                StoredPoint {
                    vector: vector.embedding,
                    payload: vector.payload,
                },
            );
        }
        Ok(())
    }

    /// Descending score; ties keep identity order.
    fn query(&self, query: &VectorQuery) -> Vec<VectorMatch> {
        let query_norm = norm(&query.vector);
        let mut matches: Vec<VectorMatch> = self
            .points
            .iter()
            .filter_map(|(identity, point)| {
                let score = cosine(&query.vector, query_norm, &point.vector);
                if query.score_threshold.is_some_and(|threshold| score < threshold) {
                    return None;
                }
                Some(VectorMatch {
                    identity: *identity,
                    score,
                    payload: point.payload.clone(),
                })
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(query.top_k);
        matches
    }
}

#[derive(Deserialize)]
struct CollectionSnapshot {
    version: u32,
    collection: LocalCollection,
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    collection: &'a LocalCollection,
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

fn cosine(query: &[f32], query_norm: f32, candidate: &[f32]) -> f32 {
    let denominator = query_norm * norm(candidate);
    if denominator <= f32::EPSILON {
        return 0.0;
    }
    let dot: f32 = query.iter().zip(candidate).map(|(a, b)| a * b).sum();
    dot / denominator
}

fn collection_missing(collection: &CollectionName) -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::new("vector", "collection_not_found"),
        "collection not found",
    )
    .with_metadata("collection", collection.as_str())
}

fn dimension_mismatch(expected: u32, actual: u32) -> ErrorEnvelope {
    ErrorEnvelope::expected(
        ErrorCode::new("vector", "dimension_mismatch"),
        "vector dimension does not match the collection",
    )
    .with_metadata("expected", expected.to_string())
    .with_metadata("actual", actual.to_string())
}

fn snapshot_error(code: &'static str, message: &str, error: &serde_json::Error) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new("vector", code),
        format!("{message}: {error}"),
        ErrorClass::NonRetriable,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use code_index_domain::{CodeBlock, LineSpan};
    use std::time::{SystemTime, UNIX_EPOCH};

    fn collection() -> Result<CollectionName> {
        CollectionName::parse("ws_0123456789abcdef").map_err(ErrorEnvelope::from)
    }

    fn vector(path: &str, start: u32, embedding: Vec<f32>) -> Result<IndexedVector> {
        let file_path = RelativePath::parse(path).map_err(ErrorEnvelope::from)?;
        let span = LineSpan::new(start, start + 1).map_err(ErrorEnvelope::from)?;
        let block = CodeBlock::new(file_path, span, format!("block {start}\n"), false);
        Ok(IndexedVector::new(&block, embedding))
    }

    fn query(vector: Vec<f32>, top_k: usize, score_threshold: Option<f32>) -> VectorQuery {
        VectorQuery {
            vector,
            top_k,
            score_threshold,
        }
    }

    fn temp_dir(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_nanos());
        std::env::temp_dir().join(format!("cidx-{label}-{}-{nanos}", std::process::id()))
    }

    #[tokio::test]
    async fn query_orders_by_score_and_applies_threshold() -> Result<()> {
        let store = LocalVectorStore::in_memory();
        let ctx = RequestContext::new_request();
        let name = collection()?;
        store.ensure_collection(&ctx, name.clone(), 2).await?;
        store
            .upsert(
                &ctx,
                name.clone(),
                vec![
                    vector("src/a.rs", 1, vec![1.0, 0.0])?,
                    vector("src/b.rs", 1, vec![0.6, 0.8])?,
                    vector("src/c.rs", 1, vec![0.0, 1.0])?,
                ],
            )
            .await?;

        let matches = store.query(&ctx, name, query(vec![1.0, 0.0], 10, Some(0.4))).await?;
        let paths: Vec<&str> = matches.iter().map(|m| m.payload.file_path.as_str()).collect();
        assert_eq!(paths, vec!["src/a.rs", "src/b.rs"]);
        assert!(matches.windows(2).all(|pair| pair[0].score >= pair[1].score));
        Ok(())
    }

    #[tokio::test]
    async fn upsert_overwrites_and_deletes_are_idempotent() -> Result<()> {
        let store = LocalVectorStore::in_memory();
        let ctx = RequestContext::new_request();
        let name = collection()?;
        store.ensure_collection(&ctx, name.clone(), 2).await?;
        let first = vector("src/a.rs", 1, vec![1.0, 0.0])?;
        let identity = first.identity;
        store.upsert(&ctx, name.clone(), vec![first]).await?;
        store.upsert(&ctx, name.clone(), vec![vector("src/a.rs", 1, vec![0.0, 1.0])?]).await?;

        let matches = store.query(&ctx, name.clone(), query(vec![0.0, 1.0], 10, None)).await?;
        assert_eq!(matches.len(), 1);
        assert!((matches[0].score - 1.0).abs() < 1e-6);

        store.delete(&ctx, name.clone(), vec![identity]).await?;
        store.delete(&ctx, name.clone(), vec![identity]).await?;
        assert!(store.query(&ctx, name, query(vec![0.0, 1.0], 10, None)).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn delete_by_file_removes_only_that_file() -> Result<()> {
        let store = LocalVectorStore::in_memory();
        let ctx = RequestContext::new_request();
        let name = collection()?;
        store.ensure_collection(&ctx, name.clone(), 2).await?;
        store
            .upsert(
                &ctx,
                name.clone(),
                vec![
                    vector("src/a.rs", 1, vec![1.0, 0.0])?,
                    vector("src/a.rs", 3, vec![1.0, 0.1])?,
                    vector("src/b.rs", 1, vec![1.0, 0.2])?,
                ],
            )
            .await?;
        let target = RelativePath::parse("src/a.rs").map_err(ErrorEnvelope::from)?;
        store.delete_by_file(&ctx, name.clone(), target).await?;

        let matches = store.query(&ctx, name, query(vec![1.0, 0.0], 10, None)).await?;
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].payload.file_path.as_str(), "src/b.rs");
        Ok(())
    }

    #[tokio::test]
    async fn snapshots_survive_a_new_store_instance() -> Result<()> {
        let dir = temp_dir("local-store");
        let ctx = RequestContext::new_request();
        let name = collection()?;
        {
            let store = LocalVectorStore::persistent(dir.clone());
            store.ensure_collection(&ctx, name.clone(), 2).await?;
            store.upsert(&ctx, name.clone(), vec![vector("src/a.rs", 1, vec![1.0, 0.0])?]).await?;
        }

        let reopened = LocalVectorStore::persistent(dir.clone());
        assert!(reopened.has_collection(&ctx, name.clone()).await?);
        let hits = reopened.query(&ctx, name.clone(), query(vec![1.0, 0.0], 5, None)).await?;
        assert_eq!(hits.len(), 1);

        reopened.drop_collection(&ctx, name.clone()).await?;
        assert!(!reopened.has_collection(&ctx, name).await?);
        let _ = std::fs::remove_dir_all(dir);
        Ok(())
    }

    #[tokio::test]
    async fn dimension_changes_are_rejected() -> Result<()> {
        let store = LocalVectorStore::in_memory();
        let ctx = RequestContext::new_request();
        let name = collection()?;
        store.ensure_collection(&ctx, name.clone(), 2).await?;
        let Err(error) = store.ensure_collection(&ctx, name.clone(), 3).await else {
            panic!("dimension change must fail");
        };
        assert_eq!(error.code, ErrorCode::new("vector", "dimension_mismatch"));

        let Err(error) = store.upsert(&ctx, name, vec![vector("src/a.rs", 1, vec![1.0])?]).await
        else {
            panic!("wrong-sized vector must fail");
        };
        assert_eq!(error.metadata_value("actual"), Some("1"));
        Ok(())
    }
}
