//! OpenAI-compatible embedding adapter.

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
use code_index_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, SecretString,
};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "text-embedding-3-small";

const SURFACE: HttpSurface = HttpSurface {
    namespace: "embedding",
    provider: "OpenAI",
    rate_limit_class: ErrorClass::NonRetriable,
};

/// OpenAI embedding adapter configuration.
#[derive(Debug, Clone)]
pub struct OpenAiEmbeddingConfig {
    /// API key used for bearer authentication.
    pub api_key: SecretString,
    /// Embedding model name (defaults to `text-embedding-3-small`).
    pub model: Option<Box<str>>,
    /// Base URL override (defaults to `https://api.openai.com/v1`).
    pub base_url: Option<Box<str>>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Optional output dimension override.
    pub dimension: Option<u32>,
    /// Batching limits reported to the pipeline.
    pub limits: EmbeddingLimits,
}

impl OpenAiEmbeddingConfig {
    /// Build from the shared embedding config plus an API key.
    #[must_use]
    pub fn from_embedding_config(api_key: SecretString, config: &EmbeddingConfig) -> Self {
        Self {
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            timeout_ms: config.timeout_ms,
            dimension: config.dimension.and_then(|value| u32::try_from(value).ok()),
            limits: limits_from_config(config, MAX_ITEM_TOKENS),
        }
    }
}

/// OpenAI embedding adapter implementation.
pub struct OpenAiEmbedding {
    provider: EmbeddingProviderInfo,
    client: reqwest::Client,
    endpoint: Box<str>,
    model: Box<str>,
    dimension_override: Option<u32>,
    limits: EmbeddingLimits,
}

impl OpenAiEmbedding {
    /// Create a new OpenAI embedding adapter.
    pub fn new(config: &OpenAiEmbeddingConfig) -> Result<Self> {
        if config.api_key.is_blank() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "api key must be set",
            ));
        }
        let model = normalize_optional_required("model", config.model.as_deref())?
            .unwrap_or_else(|| DEFAULT_MODEL.into());
        let base_url = normalize_base_url(config.base_url.as_deref(), DEFAULT_BASE_URL)?;

        let mut headers = HeaderMap::new();
        let mut auth_header =
            HeaderValue::from_str(&format!("Bearer {}", config.api_key.expose().trim())).map_err(
                |_| {
                    ErrorEnvelope::expected(
                        ErrorCode::invalid_input(),
                        "api key contains invalid header characters",
                    )
                },
            )?;
        auth_header.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_header);

        let client = http::build_client(SURFACE, config.timeout_ms, headers)?;
        let provider = EmbeddingProviderInfo {
            id: EmbeddingProviderId::parse("openai").map_err(ErrorEnvelope::from)?,
            name: "OpenAI".into(),
            model: model.clone(),
        };

        Ok(Self {
            provider,
            client,
            endpoint: format!("{base_url}/embeddings").into_boxed_str(),
            model,
            dimension_override: config.dimension,
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
        let request = OpenAiEmbeddingRequest {
            model: &self.model,
            input: sanitize_texts(texts),
            dimensions: self.dimension_override,
        };
        let response: OpenAiEmbeddingResponse = http::send_json(
            ctx,
            SURFACE,
            self.client.post(self.endpoint.as_ref()).json(&request),
            "openai_embedding.embed_batch",
        )
        .await?;
        check_vectors(
            order_by_index(response, expected_count)?,
            expected_count,
            self.dimension_override,
        )
    }
}

impl EmbeddingPort for OpenAiEmbedding {
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

    fn detect_dimension(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<u32>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            if let Some(dimension) = self.dimension_override {
                return Ok(dimension);
            }
            let vectors = self.embed_many(&ctx, vec!["dimension probe".to_owned()]).await?;
            let dimension = vectors.first().map_or(0, EmbeddingVector::dimension);
            u32::try_from(dimension).map_err(|_| {
                ErrorEnvelope::unexpected(
                    ErrorCode::internal(),
                    "embedding dimension overflow",
                    ErrorClass::NonRetriable,
                )
            })
        })
    }
}

#[derive(Debug, Serialize)]
struct OpenAiEmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingResponse {
    data: Vec<OpenAiEmbeddingDatum>,
}

#[derive(Debug, Deserialize)]
struct OpenAiEmbeddingDatum {
    embedding: Vec<f32>,
    index: usize,
}

/// The API may return data out of order; `index` is authoritative.
fn order_by_index(
    response: OpenAiEmbeddingResponse,
    expected_count: usize,
) -> Result<Vec<Vec<f32>>> {
    if response.data.len() != expected_count {
        return Ok(response.data.into_iter().map(|datum| datum.embedding).collect());
    }
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected_count];
    for datum in response.data {
        let slot = slots.get_mut(datum.index).ok_or_else(|| {
            ErrorEnvelope::unexpected(
                ErrorCode::new("embedding", "invalid_response"),
                "embedding response index out of range",
                ErrorClass::NonRetriable,
            )
            .with_metadata("index", datum.index.to_string())
        })?;
        if slot.replace(datum.embedding).is_some() {
            return Err(ErrorEnvelope::unexpected(
                ErrorCode::new("embedding", "invalid_response"),
                "embedding response index duplicated",
                ErrorClass::NonRetriable,
            ));
        }
    }
    Ok(slots.into_iter().flatten().collect())
}
