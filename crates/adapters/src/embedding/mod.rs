//! Embedding adapters.
//!
//! Each provider is one [`EmbeddingPort`](code_index_ports::EmbeddingPort)
//! implementation reporting its own [`EmbeddingLimits`]; the batcher never
//! branches on provider identity.

#[cfg(feature = "gemini")]
pub mod gemini;
pub mod hashing;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;

use code_index_config::EmbeddingConfig;
use code_index_domain::EmbeddingLimits;
#[cfg(feature = "http")]
use code_index_ports::EmbeddingVector;
#[cfg(feature = "http")]
use code_index_shared::ErrorClass;
use code_index_shared::{ErrorCode, ErrorEnvelope, Result};

/// Provider limits with config overrides applied on top of the provider's
/// own per-item ceiling.
#[must_use]
pub fn limits_from_config(
    config: &EmbeddingConfig,
    provider_max_item_tokens: usize,
) -> EmbeddingLimits {
    let max_item_tokens = config
        .max_item_tokens
        .and_then(|value| usize::try_from(value).ok())
        .unwrap_or(provider_max_item_tokens);
    EmbeddingLimits {
        max_item_tokens,
        max_batch_tokens: usize::try_from(config.max_batch_tokens).unwrap_or(usize::MAX),
        max_items_per_batch: usize::try_from(config.max_items_per_batch).unwrap_or(usize::MAX),
    }
}

pub(crate) fn normalize_optional_required(
    label: &str,
    value: Option<&str>,
) -> Result<Option<Box<str>>> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            format!("{label} must be non-empty"),
        ));
    }
    Ok(Some(trimmed.into()))
}

#[cfg(feature = "http")]
pub(crate) fn normalize_base_url(value: Option<&str>, default: &str) -> Result<Box<str>> {
    let base_url =
        normalize_optional_required("base url", value)?.unwrap_or_else(|| default.into());
    let base_url = base_url.trim_end_matches('/');
    if base_url.is_empty() {
        return Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            "base url must be non-empty",
        ));
    }
    Ok(base_url.into())
}

/// Providers reject empty strings; a single space embeds as near-noise.
#[cfg(feature = "http")]
pub(crate) fn sanitize_texts(texts: Vec<String>) -> Vec<String> {
    texts
        .into_iter()
        .map(|text| if text.is_empty() { " ".to_owned() } else { text })
        .collect()
}

#[cfg(feature = "http")]
pub(crate) fn ensure_non_empty(texts: &[String]) -> Result<()> {
    if texts.is_empty() {
        return Err(ErrorEnvelope::expected(
            ErrorCode::invalid_input(),
            "embedding input must be non-empty",
        ));
    }
    Ok(())
}

/// One vector per input, each matching the configured dimension.
#[cfg(feature = "http")]
pub(crate) fn check_vectors(
    vectors: Vec<Vec<f32>>,
    expected_count: usize,
    expected_dimension: Option<u32>,
) -> Result<Vec<EmbeddingVector>> {
    if vectors.len() != expected_count {
        return Err(ErrorEnvelope::unexpected(
            ErrorCode::new("embedding", "vector_count_mismatch"),
            format!(
                "embedding response count mismatch (expected {expected_count}, got {})",
                vectors.len()
            ),
            ErrorClass::Retriable,
        ));
    }
    vectors
        .into_iter()
        .map(|values| {
            if values.is_empty() {
                return Err(ErrorEnvelope::unexpected(
                    ErrorCode::new("embedding", "empty_vector"),
                    "provider returned an empty vector",
                    ErrorClass::Retriable,
                ));
            }
            if let Some(expected) = expected_dimension
                && u32::try_from(values.len()).ok() != Some(expected)
            {
                return Err(ErrorEnvelope::expected(
                    ErrorCode::new("embedding", "dimension_mismatch"),
                    "embedding dimension mismatch",
                )
                .with_metadata("expected", expected.to_string())
                .with_metadata("actual", values.len().to_string()));
            }
            Ok(EmbeddingVector::new(values))
        })
        .collect()
}
