//! Embedding adapter selection.

use crate::InfraResult;
use code_index_adapters::HashingEmbedding;
use code_index_adapters::embedding::gemini::{GeminiEmbedding, GeminiEmbeddingConfig};
use code_index_adapters::embedding::ollama::{OllamaEmbedding, OllamaEmbeddingConfig};
use code_index_adapters::embedding::openai::{OpenAiEmbedding, OpenAiEmbeddingConfig};
use code_index_config::{CodeIndexEnv, EmbeddingProviderKind, ValidatedConfig};
use code_index_ports::EmbeddingPort;
use code_index_shared::{ErrorCode, ErrorEnvelope, SecretString};
use std::sync::Arc;

/// Build the embedding port named by `embedding.provider`.
pub fn build_embedding_port(
    config: &ValidatedConfig,
    env: &CodeIndexEnv,
) -> InfraResult<Arc<dyn EmbeddingPort>> {
    let embedding = &config.embedding;
    let port: Arc<dyn EmbeddingPort> = match embedding.provider {
        EmbeddingProviderKind::Hashing => {
            Arc::new(HashingEmbedding::from_embedding_config(embedding)?)
        },
        EmbeddingProviderKind::OpenAi => {
            let api_key = require_api_key(env, EmbeddingProviderKind::OpenAi)?;
            let adapter_config = OpenAiEmbeddingConfig::from_embedding_config(api_key, embedding);
            Arc::new(OpenAiEmbedding::new(&adapter_config)?)
        },
        EmbeddingProviderKind::Gemini => {
            let api_key = require_api_key(env, EmbeddingProviderKind::Gemini)?;
            let adapter_config = GeminiEmbeddingConfig::from_embedding_config(api_key, embedding);
            Arc::new(GeminiEmbedding::new(&adapter_config)?)
        },
        EmbeddingProviderKind::Ollama => {
            let adapter_config = OllamaEmbeddingConfig::from_embedding_config(embedding);
            Arc::new(OllamaEmbedding::new(&adapter_config)?)
        },
    };
    tracing::debug!(
        provider = %embedding.provider,
        model = %port.provider().model,
        "embedding port ready"
    );
    Ok(port)
}

fn require_api_key(
    env: &CodeIndexEnv,
    provider: EmbeddingProviderKind,
) -> InfraResult<SecretString> {
    env.embedding_api_key_for(provider)
        .filter(|key| !key.is_blank())
        .ok_or_else(|| {
            ErrorEnvelope::expected(
                ErrorCode::new("config", "missing_api_key"),
                format!(
                    "{provider} API key is required; set {} or CIDX_EMBEDDING_API_KEY",
                    provider_key_var(provider)
                ),
            )
            .with_metadata("provider", provider.as_str())
        })
}

const fn provider_key_var(provider: EmbeddingProviderKind) -> &'static str {
    match provider {
        EmbeddingProviderKind::Gemini => "GEMINI_API_KEY",
        EmbeddingProviderKind::OpenAi
        | EmbeddingProviderKind::Ollama
        | EmbeddingProviderKind::Hashing => "OPENAI_API_KEY",
    }
}
