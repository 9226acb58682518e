//! Qdrant REST vector store adapter.
//!
//! Points are keyed by the block identity UUID and carry the block payload
//! (`filePath`, `startLine`, `endLine`, `content`, `contentHash`). A keyword
//! index on `filePath` backs delete-by-file.

use crate::http::{self, HttpSurface};
use code_index_config::VectorStoreConfig;
use code_index_ports::{
    BlockIdentity, BlockPayload, BoxFuture, CollectionName, IndexedVector, RelativePath,
    VectorMatch, VectorQuery, VectorStorePort, VectorStoreProviderInfo,
};
use code_index_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, SecretString,
};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::json;

const HEADER_API_KEY: &str = "api-key";
const FILE_PATH_FIELD: &str = "filePath";

const SURFACE: HttpSurface = HttpSurface {
    namespace: "vector",
    provider: "Qdrant",
    rate_limit_class: ErrorClass::Retriable,
};

/// Qdrant adapter configuration.
#[derive(Debug, Clone)]
pub struct QdrantVectorStoreConfig {
    /// Base URL, e.g. `http://localhost:6333`.
    pub url: Box<str>,
    /// Optional API key sent as `api-key`.
    pub api_key: Option<SecretString>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl QdrantVectorStoreConfig {
    /// Build from the shared vector store config plus an optional API key.
    #[must_use]
    pub fn from_vector_store_config(
        api_key: Option<SecretString>,
        config: &VectorStoreConfig,
    ) -> Self {
        Self {
            url: config.url.clone(),
            api_key,
            timeout_ms: config.timeout_ms,
        }
    }
}

/// Qdrant REST adapter.
pub struct QdrantVectorStore {
    provider: VectorStoreProviderInfo,
    client: reqwest::Client,
    base_url: Box<str>,
}

impl QdrantVectorStore {
    /// Create a new Qdrant adapter.
    pub fn new(config: &QdrantVectorStoreConfig) -> Result<Self> {
        let base_url = config.url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "qdrant url must be non-empty",
            ));
        }

        let mut headers = HeaderMap::new();
        if let Some(api_key) = config.api_key.as_ref().filter(|key| !key.is_blank()) {
            let mut value = HeaderValue::from_str(api_key.expose().trim()).map_err(|_| {
                ErrorEnvelope::expected(
                    ErrorCode::invalid_input(),
                    "api key contains invalid header characters",
                )
            })?;
            value.set_sensitive(true);
            headers.insert(HEADER_API_KEY, value);
        }

        Ok(Self {
            provider: VectorStoreProviderInfo {
                id: "qdrant".into(),
                name: "Qdrant".into(),
            },
            client: http::build_client(SURFACE, config.timeout_ms, headers)?,
            base_url: base_url.into(),
        })
    }

    fn collection_url(&self, collection: &CollectionName) -> String {
        format!("{}/collections/{}", self.base_url, collection.as_str())
    }

    /// `None` when the collection does not exist.
    async fn collection_dimension(
        &self,
        ctx: &RequestContext,
        collection: &CollectionName,
    ) -> Result<Option<u64>> {
        let reply = http::send(
            ctx,
            SURFACE,
            self.client.get(self.collection_url(collection)),
            "qdrant.get_collection",
        )
        .await?;
        if reply.status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let info: QdrantEnvelope<CollectionInfo> = reply.decode(SURFACE)?;
        Ok(Some(info.result.config.params.vectors.size))
    }

    async fn delete_points(
        &self,
        ctx: &RequestContext,
        collection: &CollectionName,
        selector: serde_json::Value,
        operation: &'static str,
    ) -> Result<()> {
        let reply = http::send(
            ctx,
            SURFACE,
            self.client
                .post(format!("{}/points/delete?wait=true", self.collection_url(collection)))
                .json(&selector),
            operation,
        )
        .await?;
        // Deleting from a missing collection leaves nothing behind.
        if reply.status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        reply.ensure_success(SURFACE)
    }
}

impl VectorStorePort for QdrantVectorStore {
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
            if let Some(existing) = self.collection_dimension(&ctx, &collection).await? {
                if existing != u64::from(dimension) {
                    return Err(ErrorEnvelope::expected(
                        ErrorCode::new("vector", "dimension_mismatch"),
                        "existing collection has a different vector size",
                    )
                    .with_metadata("collection", collection.as_str())
                    .with_metadata("expected", dimension.to_string())
                    .with_metadata("actual", existing.to_string()));
                }
                return Ok(());
            }

            let create = json!({ "vectors": { "size": dimension, "distance": "Cosine" } });
            let reply = http::send(
                &ctx,
                SURFACE,
                self.client.put(self.collection_url(&collection)).json(&create),
                "qdrant.create_collection",
            )
            .await?;
            // Another writer may have created it between the check and the create.
            if reply.status != StatusCode::CONFLICT {
                reply.ensure_success(SURFACE)?;
            }

            let index = json!({ "field_name": FILE_PATH_FIELD, "field_schema": "keyword" });
            http::send(
                &ctx,
                SURFACE,
                self.client
                    .put(format!("{}/index?wait=true", self.collection_url(&collection)))
                    .json(&index),
                "qdrant.create_payload_index",
            )
            .await?
            .ensure_success(SURFACE)
        })
    }

    fn has_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
    ) -> BoxFuture<'_, Result<bool>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            Ok(self.collection_dimension(&ctx, &collection).await?.is_some())
        })
    }

    fn drop_collection(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let reply = http::send(
                &ctx,
                SURFACE,
                self.client.delete(self.collection_url(&collection)),
                "qdrant.drop_collection",
            )
            .await?;
            if reply.status == StatusCode::NOT_FOUND {
                return Ok(());
            }
            reply.ensure_success(SURFACE)
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
            if vectors.is_empty() {
                return Ok(());
            }
            let body = UpsertPoints {
                points: vectors
                    .iter()
                    .map(|vector| PointStruct {
                        id: vector.identity.to_string(),
                        vector: &vector.embedding,
                        payload: &vector.payload,
                    })
                    .collect(),
            };
            http::send(
                &ctx,
                SURFACE,
                self.client
                    .put(format!("{}/points?wait=true", self.collection_url(&collection)))
                    .json(&body),
                "qdrant.upsert",
            )
            .await?
            .ensure_success(SURFACE)
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
            if identities.is_empty() {
                return Ok(());
            }
            let ids: Vec<String> = identities.iter().map(ToString::to_string).collect();
            self.delete_points(&ctx, &collection, json!({ "points": ids }), "qdrant.delete")
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
            let selector = json!({
                "filter": {
                    "must": [{ "key": FILE_PATH_FIELD, "match": { "value": file_path.as_str() } }]
                }
            });
            self.delete_points(&ctx, &collection, selector, "qdrant.delete_by_file")
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
            let body = SearchPoints {
                vector: &query.vector,
                limit: query.top_k,
                score_threshold: query.score_threshold,
                with_payload: true,
            };
            let response: QdrantEnvelope<Vec<ScoredPoint>> = http::send_json(
                &ctx,
                SURFACE,
                self.client
                    .post(format!("{}/points/search", self.collection_url(&collection)))
                    .json(&body),
                "qdrant.search",
            )
            .await?;
            response
                .result
                .into_iter()
                .map(ScoredPoint::into_match)
                .collect()
        })
    }
}

#[derive(Debug, Serialize)]
struct UpsertPoints<'a> {
    points: Vec<PointStruct<'a>>,
}

#[derive(Debug, Serialize)]
struct PointStruct<'a> {
    id: String,
    vector: &'a [f32],
    payload: &'a BlockPayload,
}

#[derive(Debug, Serialize)]
struct SearchPoints<'a> {
    vector: &'a [f32],
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    score_threshold: Option<f32>,
    with_payload: bool,
}

#[derive(Debug, Deserialize)]
struct QdrantEnvelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct CollectionInfo {
    config: CollectionConfig,
}

#[derive(Debug, Deserialize)]
struct CollectionConfig {
    params: CollectionParams,
}

#[derive(Debug, Deserialize)]
struct CollectionParams {
    vectors: VectorParams,
}

#[derive(Debug, Deserialize)]
struct VectorParams {
    size: u64,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: serde_json::Value,
    score: f32,
    payload: Option<BlockPayload>,
}

impl ScoredPoint {
    fn into_match(self) -> Result<VectorMatch> {
        let invalid = |message: &str| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("vector", "invalid_response"),
                message.to_owned(),
                ErrorClass::NonRetriable,
            )
        };
        let id = self
            .id
            .as_str()
            .ok_or_else(|| invalid("qdrant point id is not a UUID string"))?;
        let identity = BlockIdentity::parse(id).map_err(ErrorEnvelope::from)?;
        let payload = self
            .payload
            .ok_or_else(|| invalid("qdrant point has no payload"))?;
        Ok(VectorMatch {
            identity,
            score: self.score,
            payload,
        })
    }
}
