//! Embedding boundary contract.

use crate::BoxFuture;
use code_index_domain::{EmbeddingLimits, EmbeddingProviderId};
use code_index_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};

/// A dense embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingVector(Vec<f32>);

impl EmbeddingVector {
    /// Wrap an owned vector.
    #[must_use]
    pub const fn new(values: Vec<f32>) -> Self {
        Self(values)
    }

    /// Borrow the values.
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Vector dimensionality.
    #[must_use]
    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    /// Consume and return the values.
    #[must_use]
    pub fn into_inner(self) -> Vec<f32> {
        self.0
    }
}

impl From<Vec<f32>> for EmbeddingVector {
    fn from(values: Vec<f32>) -> Self {
        Self(values)
    }
}

/// Provider descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingProviderInfo {
    /// Stable provider identifier (`openai`, `ollama`, `gemini`, `hashing`).
    pub id: EmbeddingProviderId,
    /// Human-readable provider name.
    pub name: Box<str>,
    /// Model used for requests.
    pub model: Box<str>,
}

/// Owned request to embed a batch of texts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedBatchRequest {
    /// Texts to embed, in order.
    pub texts: Vec<String>,
}

impl From<Vec<String>> for EmbedBatchRequest {
    fn from(texts: Vec<String>) -> Self {
        Self { texts }
    }
}

/// Boundary contract for embedding generation.
///
/// Implementations map provider failures onto the shared error model:
/// rate limits use `core:rate_limited`, auth failures
/// `core:permission_denied`, and network errors, timeouts and server
/// errors are `Retriable`.
pub trait EmbeddingPort: Send + Sync {
    /// Provider info for this implementation.
    fn provider(&self) -> &EmbeddingProviderInfo;

    /// Token and item budgets of this provider.
    fn limits(&self) -> EmbeddingLimits;

    /// Embed texts; the result holds one vector per input, in input order.
    fn embed_batch(
        &self,
        ctx: &RequestContext,
        request: EmbedBatchRequest,
    ) -> BoxFuture<'_, Result<Vec<EmbeddingVector>>>;

    /// Detect the vector dimension by embedding a probe text.
    fn detect_dimension(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<u32>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            let vectors = self
                .embed_batch(&ctx, EmbedBatchRequest::from(vec!["dimension probe".to_owned()]))
                .await?;
            let dimension = vectors.first().map_or(0, EmbeddingVector::dimension);
            if dimension == 0 {
                return Err(ErrorEnvelope::unexpected(
                    ErrorCode::new("embedding", "empty_vector"),
                    "provider returned no vector for the dimension probe",
                    ErrorClass::NonRetriable,
                ));
            }
            u32::try_from(dimension).map_err(|_| {
                ErrorEnvelope::unexpected(
                    ErrorCode::new("embedding", "dimension_overflow"),
                    "embedding dimension does not fit in u32",
                    ErrorClass::NonRetriable,
                )
            })
        })
    }
}
