//! Integration tests for env parsing and env-to-config merging.

use code_index_config::{
    CodeIndexConfig, CodeIndexEnv, EmbeddingProviderKind, EnvParseError,
    VectorStoreProviderKind, apply_env_overrides,
};
use code_index_shared::{ErrorCode, ErrorEnvelope};
use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::Path;

fn read_env_map(name: &str) -> Result<BTreeMap<String, String>, Box<dyn Error>> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name);
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

#[test]
fn env_fixture_merges_into_effective_config() -> Result<(), Box<dyn Error>> {
    let env = CodeIndexEnv::from_map(&read_env_map("env.valid.json")?)?;
    let config = apply_env_overrides(CodeIndexConfig::default(), &env)?;

    assert_eq!(config.embedding.provider, EmbeddingProviderKind::OpenAi);
    assert_eq!(config.embedding.base_url.as_deref(), Some("https://example.com/v1"));
    assert_eq!(config.embedding.dimension, Some(1536));
    assert_eq!(config.vector_store.provider, VectorStoreProviderKind::Local);
    assert_eq!(config.search.max_results, 10);

    let extensions: Vec<&str> = config.index.extensions.iter().map(AsRef::as_ref).collect();
    assert_eq!(extensions, vec!["rs", "ts", "tsx"]);
    let patterns: Vec<&str> = config.index.ignore_patterns.iter().map(AsRef::as_ref).collect();
    assert_eq!(patterns, vec!["dist/", "target/"]);

    let key = env.embedding_api_key_for(EmbeddingProviderKind::OpenAi);
    assert_eq!(key.map(|secret| secret.expose().to_owned()).as_deref(), Some("sk-test"));
    Ok(())
}

#[test]
fn invalid_env_fixture_is_rejected() -> Result<(), Box<dyn Error>> {
    let error = CodeIndexEnv::from_map(&read_env_map("env.invalid.json")?).err();
    assert!(matches!(error, Some(EnvParseError::InvalidUrl { .. })));

    let envelope: ErrorEnvelope = error.ok_or("expected invalid env error")?.into();
    assert_eq!(envelope.code, ErrorCode::new("config", "invalid_env_url"));
    Ok(())
}
