//! Deterministic local embedder.
//!
//! Feature-hashes identifier-like tokens into a fixed number of buckets and
//! L2-normalizes the result. Texts sharing vocabulary land close together
//! under cosine similarity, which is enough for offline use and tests. No
//! network is involved, so the adapter never fails transiently.

use code_index_config::EmbeddingConfig;
use code_index_domain::constants::MAX_ITEM_TOKENS;
use code_index_ports::{
    BoxFuture, EmbedBatchRequest, EmbeddingLimits, EmbeddingPort, EmbeddingProviderId,
    EmbeddingProviderInfo, EmbeddingVector,
};
use code_index_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use sha2::{Digest, Sha256};

/// Dimension used when the config does not set one.
pub const DEFAULT_HASHING_DIMENSION: u32 = 384;
const MODEL_NAME: &str = "feature-hash-v1";

/// Deterministic feature-hashing embedder.
#[derive(Debug, Clone)]
pub struct HashingEmbedding {
    provider: EmbeddingProviderInfo,
    dimension: u32,
    limits: EmbeddingLimits,
}

impl HashingEmbedding {
    /// Build an embedder producing vectors of `dimension` components.
    pub fn new(dimension: u32, limits: EmbeddingLimits) -> Result<Self> {
        if dimension == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "embedding dimension must be positive",
            ));
        }
        let provider = EmbeddingProviderInfo {
            id: EmbeddingProviderId::parse("hashing").map_err(ErrorEnvelope::from)?,
            name: "Hashing".into(),
            model: MODEL_NAME.into(),
        };
        Ok(Self {
            provider,
            dimension,
            limits,
        })
    }

    /// Build from the shared embedding config.
    pub fn from_embedding_config(config: &EmbeddingConfig) -> Result<Self> {
        let dimension = match config.dimension {
            Some(value) => u32::try_from(value).map_err(|_| {
                ErrorEnvelope::expected(
                    ErrorCode::invalid_input(),
                    "embedding dimension out of range",
                )
            })?,
            None => DEFAULT_HASHING_DIMENSION,
        };
        Self::new(dimension, super::limits_from_config(config, MAX_ITEM_TOKENS))
    }

    fn vector_for(&self, text: &str) -> Vec<f32> {
        let dimension = self.dimension as usize;
        let mut vector = vec![0.0_f32; dimension];
        for token in tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let bucket_bytes: [u8; 8] = digest
                .get(..8)
                .and_then(|bytes| bytes.try_into().ok())
                .unwrap_or_default();
            let bucket = u64::from_le_bytes(bucket_bytes) % u64::from(self.dimension);
            let sign = if digest.get(8).copied().unwrap_or(0) & 1 == 0 { 1.0 } else { -1.0 };
            let slot = usize::try_from(bucket).ok().and_then(|index| vector.get_mut(index));
            if let Some(slot) = slot {
                *slot += sign;
            }
        }
        normalize(&mut vector);
        vector
    }
}

impl EmbeddingPort for HashingEmbedding {
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
        Box::pin(async move {
            ctx.ensure_not_cancelled("hashing_embedding.embed_batch")?;
            Ok(request
                .texts
                .iter()
                .map(|text| EmbeddingVector::new(self.vector_for(text)))
                .collect())
        })
    }

    fn detect_dimension(&self, ctx: &RequestContext) -> BoxFuture<'_, Result<u32>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("hashing_embedding.detect_dimension")?;
            Ok(self.dimension)
        })
    }
}

/// Lowercased alphanumeric runs, plus camelCase and snake_case parts.
fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .flat_map(|word| {
            let mut parts = split_camel(word);
            if parts.len() > 1 {
                parts.push(word.to_lowercase());
            }
            parts
        })
}

fn split_camel(word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut previous_lower = false;
    for ch in word.chars() {
        if ch.is_uppercase() && previous_lower && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
        }
        previous_lower = ch.is_lowercase() || ch.is_ascii_digit();
        current.extend(ch.to_lowercase());
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

/// Unit length; text without tokens maps to the first basis vector so that
/// cosine similarity stays defined.
fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    } else if let Some(first) = vector.first_mut() {
        *first = 1.0;
    }
}
