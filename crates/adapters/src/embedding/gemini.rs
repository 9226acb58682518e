//! Gemini embedding adapter.
//!
//! Uses `batchEmbedContents`. Gemini models accept far shorter inputs than
//! the OpenAI family, so the per-item ceiling defaults to
//! [`GEMINI_MAX_ITEM_TOKENS`].

use super::{
    check_vectors, ensure_non_empty, limits_from_config, normalize_base_url,
    normalize_optional_required, sanitize_texts,
};
use crate::http::{self, HttpSurface};
use code_index_config::EmbeddingConfig;
use code_index_domain::constants::GEMINI_MAX_ITEM_TOKENS;
use code_index_ports::{
    BoxFuture, EmbedBatchRequest, EmbeddingLimits, EmbeddingPort, EmbeddingProviderId,
    EmbeddingProviderInfo, EmbeddingVector,
};
use code_index_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, SecretString,
};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-embedding-001";
const HEADER_API_KEY: &str = "x-goog-api-key";

const SURFACE: HttpSurface = HttpSurface {
    namespace: "embedding",
    provider: "Gemini",
    rate_limit_class: ErrorClass::NonRetriable,
};

/// Gemini embedding adapter configuration.
#[derive(Debug, Clone)]
pub struct GeminiEmbeddingConfig {
    /// API key sent in the `x-goog-api-key` header.
    pub api_key: SecretString,
    /// Embedding model name (defaults to `gemini-embedding-001`).
    pub model: Option<Box<str>>,
    /// Base URL override.
    pub base_url: Option<Box<str>>,
    /// Request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Optional output dimensionality.
    pub dimension: Option<u32>,
    /// Batching limits reported to the pipeline.
    pub limits: EmbeddingLimits,
}

impl GeminiEmbeddingConfig {
    /// Build from the shared embedding config plus an API key.
    #[must_use]
    pub fn from_embedding_config(api_key: SecretString, config: &EmbeddingConfig) -> Self {
        Self {
            api_key,
            model: config.model.clone(),
            base_url: config.base_url.clone(),
            timeout_ms: config.timeout_ms,
            dimension: config.dimension.and_then(|value| u32::try_from(value).ok()),
            limits: limits_from_config(config, GEMINI_MAX_ITEM_TOKENS),
        }
    }
}

/// Gemini embedding adapter implementation.
pub struct GeminiEmbedding {
    provider: EmbeddingProviderInfo,
    client: reqwest::Client,
    batch_endpoint: Box<str>,
    model_resource: Box<str>,
    dimension_override: Option<u32>,
    limits: EmbeddingLimits,
}

impl GeminiEmbedding {
    /// Create a new Gemini embedding adapter.
    pub fn new(config: &GeminiEmbeddingConfig) -> Result<Self> {
        if config.api_key.is_blank() {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "api key must be set",
            ));
        }
        let model = normalize_optional_required("model", config.model.as_deref())?
            .unwrap_or_else(|| DEFAULT_MODEL.into());
        let model_resource = model_resource(&model);
        let base_url = normalize_base_url(config.base_url.as_deref(), DEFAULT_BASE_URL)?;

        let mut headers = HeaderMap::new();
        let mut key_header =
            HeaderValue::from_str(config.api_key.expose().trim()).map_err(|_| {
                ErrorEnvelope::expected(
                    ErrorCode::invalid_input(),
                    "api key contains invalid header characters",
                )
            })?;
        key_header.set_sensitive(true);
        headers.insert(HEADER_API_KEY, key_header);

        let client = http::build_client(SURFACE, config.timeout_ms, headers)?;
        let provider = EmbeddingProviderInfo {
            id: EmbeddingProviderId::parse("gemini").map_err(ErrorEnvelope::from)?,
            name: "Gemini".into(),
            model,
        };

        Ok(Self {
            provider,
            client,
            batch_endpoint: format!("{base_url}/{model_resource}:batchEmbedContents")
                .into_boxed_str(),
            model_resource,
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
        let request = GeminiBatchEmbedRequest {
            requests: sanitize_texts(texts)
                .into_iter()
                .map(|text| GeminiBatchRequestItem {
                    model: &self.model_resource,
                    content: GeminiContent {
                        parts: vec![GeminiPart { text }],
                    },
                    output_dimensionality: self.dimension_override,
                })
                .collect(),
        };
        let response: GeminiBatchEmbedResponse = http::send_json(
            ctx,
            SURFACE,
            self.client.post(self.batch_endpoint.as_ref()).json(&request),
            "gemini_embedding.embed_batch",
        )
        .await?;
        let vectors = response.embeddings.into_iter().map(|item| item.values).collect();
        check_vectors(vectors, expected_count, self.dimension_override)
    }
}

impl EmbeddingPort for GeminiEmbedding {
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
struct GeminiBatchEmbedRequest<'a> {
    requests: Vec<GeminiBatchRequestItem<'a>>,
}

#[derive(Debug, Serialize)]
struct GeminiBatchRequestItem<'a> {
    model: &'a str,
    content: GeminiContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<u32>,
}

#[derive(Debug, Serialize)]
struct GeminiContent {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiBatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<GeminiEmbeddingValues>,
}

#[derive(Debug, Deserialize)]
struct GeminiEmbeddingValues {
    values: Vec<f32>,
}

fn model_resource(model: &str) -> Box<str> {
    if model.starts_with("models/") {
        model.into()
    } else {
        format!("models/{model}").into_boxed_str()
    }
}
