//! Environment variable parsing and env-to-config merging.
//!
//! Env parsing is strict (invalid values fail fast), deterministic (CSV
//! lists normalize to sorted, deduped values) and never echoes secrets.

use crate::schema::{
    CodeIndexConfig, EmbeddingProviderKind, ValidatedConfig, VectorStoreProviderKind,
    normalize_extensions, normalize_ignore_patterns,
};
use code_index_shared::{ErrorCode, ErrorEnvelope, SecretString, redact_if_secret};
use std::collections::BTreeMap;
use std::fmt;
use url::Url;

/// Env var: embedding provider identifier.
pub const ENV_EMBEDDING_PROVIDER: &str = "CIDX_EMBEDDING_PROVIDER";
/// Env var: embedding model override.
pub const ENV_EMBEDDING_MODEL: &str = "CIDX_EMBEDDING_MODEL";
/// Env var: embedding base URL.
pub const ENV_EMBEDDING_BASE_URL: &str = "CIDX_EMBEDDING_BASE_URL";
/// Env var: embedding dimension override.
pub const ENV_EMBEDDING_DIMENSION: &str = "CIDX_EMBEDDING_DIMENSION";
/// Env var: embedding timeout in milliseconds.
pub const ENV_EMBEDDING_TIMEOUT_MS: &str = "CIDX_EMBEDDING_TIMEOUT_MS";
/// Env var: embedding API key (secret), any provider.
pub const ENV_EMBEDDING_API_AUTH: &str = "CIDX_EMBEDDING_API_KEY";
/// Env var: OpenAI API key (secret).
pub const ENV_OPENAI_API_AUTH: &str = "OPENAI_API_KEY";
/// Env var: Gemini API key (secret).
pub const ENV_GEMINI_API_AUTH: &str = "GEMINI_API_KEY";
/// Env var: Ollama host URL.
pub const ENV_OLLAMA_HOST: &str = "OLLAMA_HOST";

/// Env var: vector store provider identifier.
pub const ENV_VECTOR_STORE_PROVIDER: &str = "CIDX_VECTOR_STORE_PROVIDER";
/// Env var: vector store URL.
pub const ENV_VECTOR_STORE_URL: &str = "CIDX_VECTOR_STORE_URL";
/// Env var: vector store timeout in milliseconds.
pub const ENV_VECTOR_STORE_TIMEOUT_MS: &str = "CIDX_VECTOR_STORE_TIMEOUT_MS";
/// Env var: vector store API key (secret).
pub const ENV_VECTOR_STORE_API_AUTH: &str = "CIDX_VECTOR_STORE_API_KEY";

/// Env var: index extension allow-list as CSV.
pub const ENV_INDEX_EXTENSIONS: &str = "CIDX_INDEX_EXTENSIONS";
/// Env var: extra ignore patterns as CSV.
pub const ENV_INDEX_IGNORE_PATTERNS: &str = "CIDX_INDEX_IGNORE_PATTERNS";
/// Env var: maximum number of files per scan.
pub const ENV_INDEX_MAX_FILES: &str = "CIDX_INDEX_MAX_FILES";
/// Env var: state directory.
pub const ENV_INDEX_STATE_DIR: &str = "CIDX_INDEX_STATE_DIR";

/// Env var: search minimum score.
pub const ENV_SEARCH_MIN_SCORE: &str = "CIDX_SEARCH_MIN_SCORE";
/// Env var: search result cap.
pub const ENV_SEARCH_MAX_RESULTS: &str = "CIDX_SEARCH_MAX_RESULTS";

const ALL_VARS: &[&str] = &[
    ENV_EMBEDDING_PROVIDER,
    ENV_EMBEDDING_MODEL,
    ENV_EMBEDDING_BASE_URL,
    ENV_EMBEDDING_DIMENSION,
    ENV_EMBEDDING_TIMEOUT_MS,
    ENV_EMBEDDING_API_AUTH,
    ENV_OPENAI_API_AUTH,
    ENV_GEMINI_API_AUTH,
    ENV_OLLAMA_HOST,
    ENV_VECTOR_STORE_PROVIDER,
    ENV_VECTOR_STORE_URL,
    ENV_VECTOR_STORE_TIMEOUT_MS,
    ENV_VECTOR_STORE_API_AUTH,
    ENV_INDEX_EXTENSIONS,
    ENV_INDEX_IGNORE_PATTERNS,
    ENV_INDEX_MAX_FILES,
    ENV_INDEX_STATE_DIR,
    ENV_SEARCH_MIN_SCORE,
    ENV_SEARCH_MAX_RESULTS,
];

const MAX_CSV_ITEMS: usize = 10_000;

/// Typed env-derived overrides and secrets.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CodeIndexEnv {
    /// Override for `embedding.provider`.
    pub embedding_provider: Option<EmbeddingProviderKind>,
    /// Override for `embedding.model`.
    pub embedding_model: Option<Box<str>>,
    /// Override for `embedding.baseUrl`.
    pub embedding_base_url: Option<Box<str>>,
    /// Override for `embedding.dimension`.
    pub embedding_dimension: Option<u64>,
    /// Override for `embedding.timeoutMs`.
    pub embedding_timeout_ms: Option<u64>,
    /// Secret: provider-agnostic embedding API key.
    pub embedding_api_key: Option<SecretString>,
    /// Secret: OpenAI API key.
    pub openai_api_key: Option<SecretString>,
    /// Secret: Gemini API key.
    pub gemini_api_key: Option<SecretString>,
    /// Ollama host, used as base URL when none is configured.
    pub ollama_host: Option<Box<str>>,

    /// Override for `vectorStore.provider`.
    pub vector_store_provider: Option<VectorStoreProviderKind>,
    /// Override for `vectorStore.url`.
    pub vector_store_url: Option<Box<str>>,
    /// Override for `vectorStore.timeoutMs`.
    pub vector_store_timeout_ms: Option<u64>,
    /// Secret: vector store API key.
    pub vector_store_api_key: Option<SecretString>,

    /// Override for `index.extensions` (full replacement).
    pub index_extensions: Option<Vec<Box<str>>>,
    /// Override for `index.ignorePatterns` (full replacement).
    pub index_ignore_patterns: Option<Vec<Box<str>>>,
    /// Override for `index.maxFiles`.
    pub index_max_files: Option<u64>,
    /// Override for `index.stateDir`.
    pub index_state_dir: Option<Box<str>>,

    /// Override for `search.minScore`.
    pub search_min_score: Option<f32>,
    /// Override for `search.maxResults`.
    pub search_max_results: Option<u64>,
}

impl CodeIndexEnv {
    /// Parse env overrides from a key/value map (useful for tests).
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, EnvParseError> {
        Ok(Self {
            embedding_provider: parse_optional_enum(
                map,
                ENV_EMBEDDING_PROVIDER,
                EmbeddingProviderKind::parse,
            )?,
            embedding_model: parse_optional_trimmed_string(map, ENV_EMBEDDING_MODEL)?,
            embedding_base_url: parse_optional_url(map, ENV_EMBEDDING_BASE_URL)?,
            embedding_dimension: parse_optional_u64(map, ENV_EMBEDDING_DIMENSION)?,
            embedding_timeout_ms: parse_optional_u64(map, ENV_EMBEDDING_TIMEOUT_MS)?,
            embedding_api_key: parse_optional_secret(map, ENV_EMBEDDING_API_AUTH)?,
            openai_api_key: parse_optional_secret(map, ENV_OPENAI_API_AUTH)?,
            gemini_api_key: parse_optional_secret(map, ENV_GEMINI_API_AUTH)?,
            ollama_host: parse_optional_url(map, ENV_OLLAMA_HOST)?,
            vector_store_provider: parse_optional_enum(
                map,
                ENV_VECTOR_STORE_PROVIDER,
                VectorStoreProviderKind::parse,
            )?,
            vector_store_url: parse_optional_url(map, ENV_VECTOR_STORE_URL)?,
            vector_store_timeout_ms: parse_optional_u64(map, ENV_VECTOR_STORE_TIMEOUT_MS)?,
            vector_store_api_key: parse_optional_secret(map, ENV_VECTOR_STORE_API_AUTH)?,
            index_extensions: parse_optional_csv(map, ENV_INDEX_EXTENSIONS, CsvKind::Extensions)?,
            index_ignore_patterns: parse_optional_csv(
                map,
                ENV_INDEX_IGNORE_PATTERNS,
                CsvKind::IgnorePatterns,
            )?,
            index_max_files: parse_optional_u64(map, ENV_INDEX_MAX_FILES)?,
            index_state_dir: parse_optional_trimmed_string(map, ENV_INDEX_STATE_DIR)?,
            search_min_score: parse_optional_f32(map, ENV_SEARCH_MIN_SCORE)?,
            search_max_results: parse_optional_u64(map, ENV_SEARCH_MAX_RESULTS)?,
        })
    }

    /// Parse env overrides from the current process environment.
    pub fn from_std_env() -> Result<Self, EnvParseError> {
        let map = ALL_VARS
            .iter()
            .filter_map(|name| std::env::var(name).ok().map(|value| ((*name).to_owned(), value)))
            .collect();
        Self::from_map(&map)
    }

    /// API key for `provider`: the provider-specific variable wins over the
    /// generic one.
    #[must_use]
    pub fn embedding_api_key_for(&self, provider: EmbeddingProviderKind) -> Option<SecretString> {
        let specific = match provider {
            EmbeddingProviderKind::OpenAi => self.openai_api_key.clone(),
            EmbeddingProviderKind::Gemini => self.gemini_api_key.clone(),
            EmbeddingProviderKind::Ollama | EmbeddingProviderKind::Hashing => None,
        };
        specific.or_else(|| self.embedding_api_key.clone())
    }
}

/// Apply env overrides to a base config (env wins over file and defaults),
/// then validate.
pub fn apply_env_overrides(
    mut config: CodeIndexConfig,
    env: &CodeIndexEnv,
) -> Result<ValidatedConfig, ErrorEnvelope> {
    let embedding = &mut config.embedding;
    set(&mut embedding.provider, env.embedding_provider);
    set_opt(&mut embedding.model, env.embedding_model.as_ref());
    set_opt(&mut embedding.base_url, env.embedding_base_url.as_ref());
    if embedding.base_url.is_none() && embedding.provider == EmbeddingProviderKind::Ollama {
        embedding.base_url.clone_from(&env.ollama_host);
    }
    if env.embedding_dimension.is_some() {
        embedding.dimension = env.embedding_dimension;
    }
    set(&mut embedding.timeout_ms, env.embedding_timeout_ms);

    let store = &mut config.vector_store;
    set(&mut store.provider, env.vector_store_provider);
    if let Some(url) = env.vector_store_url.as_ref() {
        store.url.clone_from(url);
    }
    set(&mut store.timeout_ms, env.vector_store_timeout_ms);

    let index = &mut config.index;
    if let Some(extensions) = env.index_extensions.as_ref() {
        index.extensions.clone_from(extensions);
    }
    if let Some(patterns) = env.index_ignore_patterns.as_ref() {
        index.ignore_patterns.clone_from(patterns);
    }
    set(&mut index.max_files, env.index_max_files);
    if let Some(state_dir) = env.index_state_dir.as_ref() {
        index.state_dir.clone_from(state_dir);
    }

    set(&mut config.search.min_score, env.search_min_score);
    set(&mut config.search.max_results, env.search_max_results);

    config.validate_and_normalize().map_err(ErrorEnvelope::from)
}

fn set<T: Copy>(field: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *field = value;
    }
}

fn set_opt(field: &mut Option<Box<str>>, value: Option<&Box<str>>) {
    if let Some(value) = value {
        *field = Some(value.clone());
    }
}

/// Typed env parsing errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnvParseError {
    /// An env var was present but empty after trimming.
    EmptyValue {
        /// Env var name.
        var: &'static str,
    },
    /// Integer env var had an invalid value.
    InvalidInt {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// Float env var had an invalid value.
    InvalidFloat {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// URL env var had an invalid value.
    InvalidUrl {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// Enum env var had an invalid value.
    InvalidEnum {
        /// Env var name.
        var: &'static str,
        /// Raw input value.
        value: String,
    },
    /// CSV list exceeds a safety limit.
    CsvTooLarge {
        /// Env var name.
        var: &'static str,
        /// Number of parsed items.
        len: usize,
        /// Maximum allowed.
        max: usize,
    },
    /// CSV contained an invalid entry.
    InvalidCsvEntry {
        /// Env var name.
        var: &'static str,
        /// Invalid entry.
        entry: String,
    },
}

impl EnvParseError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::EmptyValue { .. } => ErrorCode::new("config", "empty_env_var"),
            Self::InvalidInt { .. } => ErrorCode::new("config", "invalid_env_int"),
            Self::InvalidFloat { .. } => ErrorCode::new("config", "invalid_env_float"),
            Self::InvalidUrl { .. } => ErrorCode::new("config", "invalid_env_url"),
            Self::InvalidEnum { .. } => ErrorCode::new("config", "invalid_env_enum"),
            Self::CsvTooLarge { .. } | Self::InvalidCsvEntry { .. } => {
                ErrorCode::new("config", "invalid_env_csv")
            },
        }
    }
}

impl fmt::Display for EnvParseError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyValue { var } => write!(formatter, "{var} must be non-empty"),
            Self::InvalidInt { var, .. } => write!(formatter, "{var} must be an integer"),
            Self::InvalidFloat { var, .. } => write!(formatter, "{var} must be a number"),
            Self::InvalidUrl { var, .. } => write!(formatter, "{var} must be a valid http(s) URL"),
            Self::InvalidEnum { var, .. } => write!(formatter, "{var} has an unsupported value"),
            Self::CsvTooLarge { var, len, max } => {
                write!(formatter, "{var} is too large ({len} items, max {max})")
            },
            Self::InvalidCsvEntry { var, entry } => {
                write!(formatter, "{var} contains an invalid entry: {entry:?}")
            },
        }
    }
}

impl std::error::Error for EnvParseError {}

impl From<EnvParseError> for ErrorEnvelope {
    fn from(error: EnvParseError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());

        match error {
            EnvParseError::EmptyValue { var } => envelope.with_metadata("env_var", var),
            EnvParseError::InvalidInt { var, value }
            | EnvParseError::InvalidFloat { var, value }
            | EnvParseError::InvalidUrl { var, value }
            | EnvParseError::InvalidEnum { var, value } => envelope
                .with_metadata("env_var", var)
                .with_metadata("value", redact_if_secret(var, &value)),
            EnvParseError::CsvTooLarge { var, len, max } => envelope
                .with_metadata("env_var", var)
                .with_metadata("len", len.to_string())
                .with_metadata("max", max.to_string()),
            EnvParseError::InvalidCsvEntry { var, entry } => envelope
                .with_metadata("env_var", var)
                .with_metadata("entry", entry),
        }
    }
}

fn parse_present<'a>(
    map: &'a BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<&'a str>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(EnvParseError::EmptyValue { var });
    }
    Ok(Some(trimmed))
}

fn parse_optional_trimmed_string(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Box<str>>, EnvParseError> {
    Ok(parse_present(map, var)?.map(Box::from))
}

fn parse_optional_secret(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<SecretString>, EnvParseError> {
    Ok(parse_present(map, var)?.map(SecretString::new))
}

fn parse_optional_u64(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<u64>, EnvParseError> {
    parse_present(map, var)?
        .map(|value| {
            value.parse::<u64>().map_err(|_| EnvParseError::InvalidInt {
                var,
                value: value.to_owned(),
            })
        })
        .transpose()
}

fn parse_optional_f32(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<f32>, EnvParseError> {
    parse_present(map, var)?
        .map(|value| match value.parse::<f32>() {
            Ok(parsed) if parsed.is_finite() => Ok(parsed),
            _ => Err(EnvParseError::InvalidFloat {
                var,
                value: value.to_owned(),
            }),
        })
        .transpose()
}

fn parse_optional_enum<T>(
    map: &BTreeMap<String, String>,
    var: &'static str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<Option<T>, EnvParseError> {
    parse_present(map, var)?
        .map(|value| {
            parse(value).ok_or_else(|| EnvParseError::InvalidEnum {
                var,
                value: value.to_owned(),
            })
        })
        .transpose()
}

fn parse_optional_url(
    map: &BTreeMap<String, String>,
    var: &'static str,
) -> Result<Option<Box<str>>, EnvParseError> {
    parse_present(map, var)?
        .map(|value| {
            let valid = Url::parse(value)
                .is_ok_and(|url| url.scheme() == "http" || url.scheme() == "https");
            if valid {
                Ok(Box::from(value))
            } else {
                Err(EnvParseError::InvalidUrl {
                    var,
                    value: value.to_owned(),
                })
            }
        })
        .transpose()
}

#[derive(Clone, Copy)]
enum CsvKind {
    Extensions,
    IgnorePatterns,
}

fn parse_optional_csv(
    map: &BTreeMap<String, String>,
    var: &'static str,
    kind: CsvKind,
) -> Result<Option<Vec<Box<str>>>, EnvParseError> {
    let Some(raw) = map.get(var) else {
        return Ok(None);
    };
    let items: Vec<Box<str>> = raw
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(Box::from)
        .collect();
    if items.len() > MAX_CSV_ITEMS {
        return Err(EnvParseError::CsvTooLarge {
            var,
            len: items.len(),
            max: MAX_CSV_ITEMS,
        });
    }

    let normalized = match kind {
        CsvKind::Extensions => normalize_extensions(&items),
        CsvKind::IgnorePatterns => normalize_ignore_patterns(&items),
    };
    normalized.map(Some).map_err(|error| EnvParseError::InvalidCsvEntry {
        var,
        entry: error.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    fn env_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
            .collect()
    }

    #[test]
    fn missing_vars_yield_no_overrides() -> Result<(), Box<dyn Error>> {
        let env = CodeIndexEnv::from_map(&BTreeMap::new())?;
        assert_eq!(env, CodeIndexEnv::default());
        Ok(())
    }

    #[test]
    fn csv_extensions_are_normalized_deterministically() -> Result<(), Box<dyn Error>> {
        let env =
            CodeIndexEnv::from_map(&env_map(&[(ENV_INDEX_EXTENSIONS, " TSX , .rs,ts,*.RS")]))?;
        let values: Vec<&str> = env
            .index_extensions
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(AsRef::as_ref)
            .collect();
        assert_eq!(values, vec!["rs", "ts", "tsx"]);
        Ok(())
    }

    #[test]
    fn url_validation_rejects_other_schemes() {
        let error = CodeIndexEnv::from_map(&env_map(&[(ENV_VECTOR_STORE_URL, "ftp://example.com")]))
            .err();
        assert!(matches!(error, Some(EnvParseError::InvalidUrl { .. })));
    }

    #[test]
    fn unknown_provider_is_an_enum_error() {
        let error =
            CodeIndexEnv::from_map(&env_map(&[(ENV_EMBEDDING_PROVIDER, "voyage")])).err();
        assert!(matches!(error, Some(EnvParseError::InvalidEnum { .. })));
    }

    #[test]
    fn empty_secret_is_rejected_without_echoing_it() {
        let error = CodeIndexEnv::from_map(&env_map(&[(ENV_OPENAI_API_AUTH, "   ")])).err();
        let Some(error) = error else {
            panic!("expected an empty-value error");
        };
        let envelope = ErrorEnvelope::from(error);
        assert_eq!(envelope.code, ErrorCode::new("config", "empty_env_var"));
        assert_eq!(envelope.metadata_value("env_var"), Some(ENV_OPENAI_API_AUTH));
        assert_eq!(envelope.metadata_value("value"), None);
    }

    #[test]
    fn provider_specific_key_wins() -> Result<(), Box<dyn Error>> {
        let env = CodeIndexEnv::from_map(&env_map(&[
            (ENV_EMBEDDING_API_AUTH, "generic"),
            (ENV_GEMINI_API_AUTH, "gemini-key"),
        ]))?;
        let gemini = env.embedding_api_key_for(EmbeddingProviderKind::Gemini);
        let openai = env.embedding_api_key_for(EmbeddingProviderKind::OpenAi);
        assert_eq!(gemini.as_ref().map(SecretString::expose), Some("gemini-key"));
        assert_eq!(openai.as_ref().map(SecretString::expose), Some("generic"));
        Ok(())
    }

    #[test]
    fn overrides_are_applied_and_validated() -> Result<(), Box<dyn Error>> {
        let env = CodeIndexEnv::from_map(&env_map(&[
            (ENV_EMBEDDING_PROVIDER, "ollama"),
            (ENV_OLLAMA_HOST, "http://127.0.0.1:11434"),
            (ENV_SEARCH_MIN_SCORE, "0.25"),
            (ENV_VECTOR_STORE_PROVIDER, "local"),
        ]))?;
        let config = apply_env_overrides(CodeIndexConfig::default(), &env)?;
        assert_eq!(config.embedding.provider, EmbeddingProviderKind::Ollama);
        assert_eq!(config.embedding.base_url.as_deref(), Some("http://127.0.0.1:11434"));
        assert_eq!(config.vector_store.provider, VectorStoreProviderKind::Local);
        assert!((config.search.min_score - 0.25).abs() < f32::EPSILON);

        let invalid = env_map(&[(ENV_SEARCH_MAX_RESULTS, "500")]);
        let env = CodeIndexEnv::from_map(&invalid)?;
        let error = apply_env_overrides(CodeIndexConfig::default(), &env).err();
        assert_eq!(
            error.map(|envelope| envelope.code),
            Some(ErrorCode::new("config", "invalid_limit"))
        );
        Ok(())
    }
}
