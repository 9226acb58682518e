//! Ollama embedding adapter.

use super::{
    check_vectors, ensure_non_empty, limits_from_config, normalize_base_url,
    normalize_optional_required, sanitize_texts,
};
use crate::http::{self, HttpSurface};
use code_index_config::EmbeddingConfig;
use code_index_domain::constants::MAX_ITEM_TOKENS;
use code_index_ports::{
    BoxFuture, EmbedBatchRequest, EmbeddingLimits, EmbeddingPort, EmbeddingProviderId,
    EmbeddingProviderInfo, EmbeddingVector,
};
use code_index_shared::{ErrorClass, ErrorEnvelope, RequestContext, Result};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "http://localhost:11434";
const DEFAULT_MODEL: &str = "embeddinggemma";
const EMBED_PATH: &str = "/api/embed";

const SURFACE: HttpSurface = HttpSurface {
    namespace: "embedding",
    provider: "Ollama",
    rate_limit_class: ErrorClass::NonRetriable,
};

/// Ollama embedding adapter configuration.
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingConfig {
    /// Embedding model name (defaults to `embeddinggemma`).
    pub model: Option<Box<str>>,
    /// Base URL override (defaults to `http://localhost:11434`).
    pub base_url: Option<Box<str>>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Optional output dimension override.
    pub dimension: Option<u32>,
    /// Ask the server to truncate inputs that exceed the model context.
    pub truncate: bool,
    /// Batching limits reported to the pipeline.
    pub limits: EmbeddingLimits,
}

impl OllamaEmbeddingConfig {
    /// Build from the shared embedding config.
    #[must_use]
    pub fn from_embedding_config(config: &EmbeddingConfig) -> Self {
        Self {
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            timeout_ms: config.timeout_ms,
            dimension: config.dimension.and_then(|value| u32::try_from(value).ok()),
            truncate: false,
            limits: limits_from_config(config, MAX_ITEM_TOKENS),
        }
    }
}

/// Ollama embedding adapter implementation.
pub struct OllamaEmbedding {
    provider: EmbeddingProviderInfo,
    client: reqwest::Client,
    endpoint: Box<str>,
    model: Box<str>,
    dimension_override: Option<u32>,
    truncate: bool,
    limits: EmbeddingLimits,
}

impl OllamaEmbedding {
    /// Create a new Ollama embedding adapter.
    pub fn new(config: &OllamaEmbeddingConfig) -> Result<Self> {
        let model = normalize_optional_required("model", config.model.as_deref())?
            .unwrap_or_else(|| DEFAULT_MODEL.into());
        let base_url = normalize_base_url(config.base_url.as_deref(), DEFAULT_BASE_URL)?;
        let client = http::build_client(SURFACE, config.timeout_ms, HeaderMap::new())?;
        let provider = EmbeddingProviderInfo {
            id: EmbeddingProviderId::parse("ollama").map_err(ErrorEnvelope::from)?,
            name: "Ollama".into(),
            model: model.clone(),
        };

        Ok(Self {
            provider,
            client,
            endpoint: format!("{base_url}{EMBED_PATH}").into_boxed_str(),
            model,
            dimension_override: config.dimension,
            truncate: config.truncate,
            limits: config.limits,
        })
    }

    async fn embed_many(
        &self,
        ctx: &RequestContext,
        texts: Vec<String>,
    ) -> Result<Vec<EmbeddingVector>> {
        ensure_non_empty(&texts)?;
        let expected_count = texts.len();
        let request = OllamaEmbeddingRequest {
            model: &self.model,
            input: sanitize_texts(texts),
            dimensions: self.dimension_override,
            truncate: self.truncate.then_some(true),
        };
        let response: OllamaEmbeddingResponse = http::send_json(
            ctx,
            SURFACE,
            self.client.post(self.endpoint.as_ref()).json(&request),
            "ollama_embedding.embed_batch",
        )
        .await?;
        check_vectors(response.embeddings, expected_count, self.dimension_override)
    }
}

impl EmbeddingPort for OllamaEmbedding {
    fn provider(&self) -> &EmbeddingProviderInfo {
        &self.provider
    }

    fn limits(&self) -> EmbeddingLimits {
        self.limits
    }

    fn embed_batch(
        &self,
        ctx: &RequestContext,
        request: EmbedBatchRequest,
    ) -> BoxFuture<'_, Result<Vec<EmbeddingVector>>> {
        let ctx = ctx.clone();
        Box::pin(async move { self.embed_many(&ctx, request.texts).await })
    }
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    truncate: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}
