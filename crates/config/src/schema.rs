//! Configuration schema, defaults, validation, and normalization.
//!
//! - Deserialization uses `serde` (TOML or JSON).
//! - Validation is manual and returns typed errors mapped to `ErrorEnvelope`.
//! - Normalization enforces stable ordering for list fields.

use code_index_domain::constants::{
    BATCH_PROCESSING_CONCURRENCY, BATCH_SEGMENT_THRESHOLD, DEFAULT_EMBEDDING_TIMEOUT_MS,
    DEFAULT_MAX_FILES, DEFAULT_MAX_SEARCH_RESULTS, DEFAULT_SEARCH_MIN_SCORE,
    DEFAULT_SUPPORTED_EXTENSIONS, DEFAULT_VECTOR_STORE_TIMEOUT_MS, DEFAULT_WATCH_DEBOUNCE_MS,
    DEFAULT_WATCH_POLL_INTERVAL_MS, INITIAL_RETRY_DELAY_MS, MAX_BATCH_RETRIES, MAX_BATCH_TOKENS,
    MAX_BLOCK_CHARS, MAX_FILE_SIZE_BYTES, MAX_PENDING_BATCHES, MIN_BLOCK_CHARS,
    PARSING_CONCURRENCY,
};
use code_index_domain::OversizedItemPolicy;
use code_index_shared::{ErrorCode, ErrorEnvelope};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

/// Current supported configuration schema version.
pub const CURRENT_CONFIG_VERSION: u32 = 1;

/// Default Qdrant REST endpoint.
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";

/// Default directory (relative to the workspace root) for local state.
pub const DEFAULT_STATE_DIR: &str = ".code-index";

const INDEX_MAX_FILES_MIN: u64 = 1;
const INDEX_MAX_FILES_MAX: u64 = 10_000_000;
const INDEX_MAX_FILE_SIZE_MIN_BYTES: u64 = 1;
const INDEX_MAX_FILE_SIZE_MAX_BYTES: u64 = 100_000_000;
const INDEX_MAX_BLOCK_CHARS_MIN: u64 = 2 * MIN_BLOCK_CHARS as u64;
const INDEX_MAX_BLOCK_CHARS_MAX: u64 = 20_000;
const INDEX_CONCURRENCY_MIN: u64 = 1;
const INDEX_CONCURRENCY_MAX: u64 = 256;
const INDEX_PENDING_BATCHES_MIN: u64 = 1;
const INDEX_PENDING_BATCHES_MAX: u64 = 1_024;
const INDEX_EXTENSIONS_MAX: usize = 128;
const INDEX_IGNORE_PATTERNS_MAX: usize = 512;

const EMBEDDING_TIMEOUT_MIN_MS: u64 = 1_000;
const EMBEDDING_TIMEOUT_MAX_MS: u64 = 1_200_000;
const EMBEDDING_DIMENSION_MIN: u64 = 1;
const EMBEDDING_DIMENSION_MAX: u64 = 65_536;
const EMBEDDING_ITEM_TOKENS_MIN: u64 = 1;
const EMBEDDING_ITEM_TOKENS_MAX: u64 = 1_000_000;
const EMBEDDING_BATCH_TOKENS_MIN: u64 = 1;
const EMBEDDING_BATCH_TOKENS_MAX: u64 = 10_000_000;
const EMBEDDING_BATCH_ITEMS_MIN: u64 = 1;
const EMBEDDING_BATCH_ITEMS_MAX: u64 = 8_192;
const EMBEDDING_RETRIES_MAX: u64 = 10;
const EMBEDDING_RETRY_DELAY_MIN_MS: u64 = 1;
const EMBEDDING_RETRY_DELAY_MAX_MS: u64 = 60_000;

const VECTOR_STORE_TIMEOUT_MIN_MS: u64 = 1_000;
const VECTOR_STORE_TIMEOUT_MAX_MS: u64 = 1_200_000;

const WATCH_DEBOUNCE_MIN_MS: u64 = 10;
const WATCH_DEBOUNCE_MAX_MS: u64 = 600_000;
const WATCH_POLL_MIN_MS: u64 = 50;
const WATCH_POLL_MAX_MS: u64 = 600_000;
const WATCH_SEGMENT_MIN: u64 = 1;
const WATCH_SEGMENT_MAX: u64 = 100_000;

/// Strips credentials from a URL before it is placed in an error message.
fn sanitize_url_for_error(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() || !parsed.username().is_empty() {
                if parsed.set_username("").is_err() || parsed.set_password(None).is_err() {
                    return "[invalid url: credentials]".to_owned();
                }
            }
            parsed.to_string()
        },
        Err(error) => format!("[invalid url: {error}]"),
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct CodeIndexConfig {
    /// Schema version for forward-compatible migrations.
    pub version: u32,
    /// Scanning, chunking and pipeline settings.
    pub index: IndexConfig,
    /// Embedding provider settings.
    pub embedding: EmbeddingConfig,
    /// Vector store settings.
    pub vector_store: VectorStoreConfig,
    /// Search defaults.
    pub search: SearchConfig,
    /// Incremental watch settings.
    pub watch: WatchConfig,
}

impl Default for CodeIndexConfig {
    fn default() -> Self {
        Self {
            version: CURRENT_CONFIG_VERSION,
            index: IndexConfig::default(),
            embedding: EmbeddingConfig::default(),
            vector_store: VectorStoreConfig::default(),
            search: SearchConfig::default(),
            watch: WatchConfig::default(),
        }
    }
}

impl CodeIndexConfig {
    /// Validate and normalize the config.
    pub fn validate_and_normalize(mut self) -> Result<ValidatedConfig, ConfigSchemaError> {
        if self.version != CURRENT_CONFIG_VERSION {
            return Err(ConfigSchemaError::UnsupportedVersion {
                found: self.version,
                supported: CURRENT_CONFIG_VERSION,
            });
        }

        self.index.normalize_and_validate()?;
        self.embedding.normalize();
        self.embedding.validate()?;
        self.vector_store.normalize();
        self.vector_store.validate()?;
        self.search.validate()?;
        self.watch.validate()?;

        Ok(ValidatedConfig { raw: self })
    }
}

/// Config that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    raw: CodeIndexConfig,
}

impl ValidatedConfig {
    /// Borrow the raw config.
    #[must_use]
    pub const fn as_ref(&self) -> &CodeIndexConfig {
        &self.raw
    }

    /// Consume the wrapper and return the raw config.
    #[must_use]
    pub fn into_inner(self) -> CodeIndexConfig {
        self.raw
    }
}

impl AsRef<CodeIndexConfig> for ValidatedConfig {
    fn as_ref(&self) -> &CodeIndexConfig {
        &self.raw
    }
}

impl std::ops::Deref for ValidatedConfig {
    type Target = CodeIndexConfig;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

/// Scanning, chunking and pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct IndexConfig {
    /// Allow-list of file extensions (no leading dot).
    pub extensions: Vec<Box<str>>,
    /// Extra ignore patterns, in `.gitignore` syntax.
    pub ignore_patterns: Vec<Box<str>>,
    /// Skip entries whose name starts with `.`.
    pub skip_hidden: bool,
    /// Maximum number of files enumerated per scan.
    pub max_files: u64,
    /// Files larger than this are skipped.
    pub max_file_size_bytes: u64,
    /// Target block size in characters.
    pub max_block_chars: u64,
    /// File parse workers.
    pub parsing_concurrency: u64,
    /// Embedding and write workers.
    pub batch_concurrency: u64,
    /// Upper bound on in-flight batches.
    pub max_pending_batches: u64,
    /// Directory for the identity ledger and local vectors, relative to the root
    /// unless absolute.
    pub state_dir: Box<str>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_SUPPORTED_EXTENSIONS.iter().map(|ext| Box::from(*ext)).collect(),
            ignore_patterns: Vec::new(),
            skip_hidden: true,
            max_files: DEFAULT_MAX_FILES as u64,
            max_file_size_bytes: MAX_FILE_SIZE_BYTES,
            max_block_chars: MAX_BLOCK_CHARS as u64,
            parsing_concurrency: PARSING_CONCURRENCY as u64,
            batch_concurrency: BATCH_PROCESSING_CONCURRENCY as u64,
            max_pending_batches: MAX_PENDING_BATCHES as u64,
            state_dir: DEFAULT_STATE_DIR.into(),
        }
    }
}

impl IndexConfig {
    fn normalize_and_validate(&mut self) -> Result<(), ConfigSchemaError> {
        self.extensions = normalize_extensions(&self.extensions)?;
        self.ignore_patterns = normalize_ignore_patterns(&self.ignore_patterns)?;
        normalize_boxed_str(&mut self.state_dir);

        if self.extensions.len() > INDEX_EXTENSIONS_MAX {
            return Err(ConfigSchemaError::ListTooLarge {
                section: "index",
                field: "extensions",
                len: self.extensions.len(),
                max: INDEX_EXTENSIONS_MAX,
            });
        }
        if self.ignore_patterns.len() > INDEX_IGNORE_PATTERNS_MAX {
            return Err(ConfigSchemaError::ListTooLarge {
                section: "index",
                field: "ignorePatterns",
                len: self.ignore_patterns.len(),
                max: INDEX_IGNORE_PATTERNS_MAX,
            });
        }
        if self.state_dir.is_empty() {
            return Err(ConfigSchemaError::InvalidValue {
                section: "index",
                field: "stateDir",
                reason: "must not be empty".to_owned(),
            });
        }

        validate_limit(
            "index",
            "maxFiles",
            self.max_files,
            INDEX_MAX_FILES_MIN,
            INDEX_MAX_FILES_MAX,
        )?;
        validate_limit(
            "index",
            "maxFileSizeBytes",
            self.max_file_size_bytes,
            INDEX_MAX_FILE_SIZE_MIN_BYTES,
            INDEX_MAX_FILE_SIZE_MAX_BYTES,
        )?;
        validate_limit(
            "index",
            "maxBlockChars",
            self.max_block_chars,
            INDEX_MAX_BLOCK_CHARS_MIN,
            INDEX_MAX_BLOCK_CHARS_MAX,
        )?;
        validate_limit(
            "index",
            "parsingConcurrency",
            self.parsing_concurrency,
            INDEX_CONCURRENCY_MIN,
            INDEX_CONCURRENCY_MAX,
        )?;
        validate_limit(
            "index",
            "batchConcurrency",
            self.batch_concurrency,
            INDEX_CONCURRENCY_MIN,
            INDEX_CONCURRENCY_MAX,
        )?;
        validate_limit(
            "index",
            "maxPendingBatches",
            self.max_pending_batches,
            INDEX_PENDING_BATCHES_MIN,
            INDEX_PENDING_BATCHES_MAX,
        )?;
        Ok(())
    }
}

/// Supported embedding providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    /// OpenAI-compatible `/embeddings` API.
    #[default]
    OpenAi,
    /// Ollama `/api/embed`.
    Ollama,
    /// Google Gemini `batchEmbedContents`.
    Gemini,
    /// Deterministic local hashing embedder.
    Hashing,
}

impl EmbeddingProviderKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            Self::Gemini => "gemini",
            Self::Hashing => "hashing",
        }
    }

    /// Parse a provider identifier (case-insensitive).
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAi),
            "ollama" => Some(Self::Ollama),
            "gemini" => Some(Self::Gemini),
            "hashing" => Some(Self::Hashing),
            _ => None,
        }
    }

    /// Providers that need an API key.
    #[must_use]
    pub const fn requires_api_key(self) -> bool {
        matches!(self, Self::OpenAi | Self::Gemini)
    }
}

impl fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Oversized-item handling as written in config files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OversizedItemSetting {
    /// Fail the item without calling the provider.
    #[default]
    Reject,
    /// Truncate the item to the provider ceiling.
    Truncate,
}

impl From<OversizedItemSetting> for OversizedItemPolicy {
    fn from(value: OversizedItemSetting) -> Self {
        match value {
            OversizedItemSetting::Reject => Self::Reject,
            OversizedItemSetting::Truncate => Self::Truncate,
        }
    }
}

/// Embedding provider configuration.
///
/// API keys are not part of the file schema; they are read from the
/// environment (see [`crate::CodeIndexEnv`]).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct EmbeddingConfig {
    /// Provider used for indexing and queries.
    pub provider: EmbeddingProviderKind,
    /// Model override; providers fall back to their default model.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<Box<str>>,
    /// Base URL override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<Box<str>>,
    /// Vector dimension override; detected with a probe request when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dimension: Option<u64>,
    /// Timeout of one provider request.
    pub timeout_ms: u64,
    /// Per-item token ceiling override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_item_tokens: Option<u64>,
    /// Token budget of one request.
    pub max_batch_tokens: u64,
    /// Item cap of one request.
    pub max_items_per_batch: u64,
    /// Handling of blocks above the per-item ceiling.
    pub oversized_item_policy: OversizedItemSetting,
    /// Retries after the first attempt.
    pub max_retries: u64,
    /// First backoff delay; doubles per retry.
    pub initial_retry_delay_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model: None,
            base_url: None,
            dimension: None,
            timeout_ms: DEFAULT_EMBEDDING_TIMEOUT_MS,
            max_item_tokens: None,
            max_batch_tokens: MAX_BATCH_TOKENS as u64,
            max_items_per_batch: BATCH_SEGMENT_THRESHOLD as u64,
            oversized_item_policy: OversizedItemSetting::default(),
            max_retries: u64::from(MAX_BATCH_RETRIES),
            initial_retry_delay_ms: INITIAL_RETRY_DELAY_MS,
        }
    }
}

impl EmbeddingConfig {
    fn normalize(&mut self) {
        normalize_optional_trimmed(&mut self.model);
        normalize_optional_trimmed(&mut self.base_url);
    }

    fn validate(&self) -> Result<(), ConfigSchemaError> {
        validate_timeout_ms(
            "embedding",
            "timeoutMs",
            self.timeout_ms,
            EMBEDDING_TIMEOUT_MIN_MS,
            EMBEDDING_TIMEOUT_MAX_MS,
        )?;
        if let Some(dimension) = self.dimension {
            validate_limit(
                "embedding",
                "dimension",
                dimension,
                EMBEDDING_DIMENSION_MIN,
                EMBEDDING_DIMENSION_MAX,
            )?;
        }
        if let Some(max_item_tokens) = self.max_item_tokens {
            validate_limit(
                "embedding",
                "maxItemTokens",
                max_item_tokens,
                EMBEDDING_ITEM_TOKENS_MIN,
                EMBEDDING_ITEM_TOKENS_MAX,
            )?;
        }
        validate_limit(
            "embedding",
            "maxBatchTokens",
            self.max_batch_tokens,
            EMBEDDING_BATCH_TOKENS_MIN,
            EMBEDDING_BATCH_TOKENS_MAX,
        )?;
        validate_limit(
            "embedding",
            "maxItemsPerBatch",
            self.max_items_per_batch,
            EMBEDDING_BATCH_ITEMS_MIN,
            EMBEDDING_BATCH_ITEMS_MAX,
        )?;
        validate_limit("embedding", "maxRetries", self.max_retries, 0, EMBEDDING_RETRIES_MAX)?;
        validate_timeout_ms(
            "embedding",
            "initialRetryDelayMs",
            self.initial_retry_delay_ms,
            EMBEDDING_RETRY_DELAY_MIN_MS,
            EMBEDDING_RETRY_DELAY_MAX_MS,
        )?;
        if let Some(base_url) = self.base_url.as_deref() {
            validate_http_url("embedding", "baseUrl", base_url)?;
        }
        Ok(())
    }
}

/// Supported vector stores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VectorStoreProviderKind {
    /// Qdrant over REST.
    #[default]
    Qdrant,
    /// JSON snapshot under the state directory.
    Local,
}

impl VectorStoreProviderKind {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Qdrant => "qdrant",
            Self::Local => "local",
        }
    }

    /// Parse a provider identifier (case-insensitive).
    #[must_use]
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "qdrant" => Some(Self::Qdrant),
            "local" => Some(Self::Local),
            _ => None,
        }
    }
}

impl fmt::Display for VectorStoreProviderKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Vector store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct VectorStoreConfig {
    /// Store implementation.
    pub provider: VectorStoreProviderKind,
    /// Qdrant REST endpoint.
    pub url: Box<str>,
    /// Timeout of one store request.
    pub timeout_ms: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            provider: VectorStoreProviderKind::default(),
            url: DEFAULT_QDRANT_URL.into(),
            timeout_ms: DEFAULT_VECTOR_STORE_TIMEOUT_MS,
        }
    }
}

impl VectorStoreConfig {
    fn normalize(&mut self) {
        normalize_boxed_str(&mut self.url);
    }

    fn validate(&self) -> Result<(), ConfigSchemaError> {
        validate_timeout_ms(
            "vectorStore",
            "timeoutMs",
            self.timeout_ms,
            VECTOR_STORE_TIMEOUT_MIN_MS,
            VECTOR_STORE_TIMEOUT_MAX_MS,
        )?;
        if self.provider == VectorStoreProviderKind::Qdrant {
            validate_http_url("vectorStore", "url", &self.url)?;
        }
        Ok(())
    }
}

/// Search defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct SearchConfig {
    /// Results scoring below this are discarded.
    pub min_score: f32,
    /// Result cap per query.
    pub max_results: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            min_score: DEFAULT_SEARCH_MIN_SCORE,
            max_results: DEFAULT_MAX_SEARCH_RESULTS as u64,
        }
    }
}

impl SearchConfig {
    fn validate(&self) -> Result<(), ConfigSchemaError> {
        if !(0.0..=1.0).contains(&self.min_score) {
            return Err(ConfigSchemaError::InvalidValue {
                section: "search",
                field: "minScore",
                reason: format!("must be within [0, 1] (got {})", self.min_score),
            });
        }
        let max_results = DEFAULT_MAX_SEARCH_RESULTS as u64;
        validate_limit("search", "maxResults", self.max_results, 1, max_results)
    }
}

/// Incremental watch configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct WatchConfig {
    /// Quiet period before coalesced changes are processed.
    pub debounce_ms: u64,
    /// Poll interval of the change notifier.
    pub poll_interval_ms: u64,
    /// Pending paths that force an immediate flush.
    pub segment_threshold: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_WATCH_DEBOUNCE_MS,
            poll_interval_ms: DEFAULT_WATCH_POLL_INTERVAL_MS,
            segment_threshold: BATCH_SEGMENT_THRESHOLD as u64,
        }
    }
}

impl WatchConfig {
    fn validate(&self) -> Result<(), ConfigSchemaError> {
        validate_timeout_ms(
            "watch",
            "debounceMs",
            self.debounce_ms,
            WATCH_DEBOUNCE_MIN_MS,
            WATCH_DEBOUNCE_MAX_MS,
        )?;
        validate_timeout_ms(
            "watch",
            "pollIntervalMs",
            self.poll_interval_ms,
            WATCH_POLL_MIN_MS,
            WATCH_POLL_MAX_MS,
        )?;
        validate_limit(
            "watch",
            "segmentThreshold",
            self.segment_threshold,
            WATCH_SEGMENT_MIN,
            WATCH_SEGMENT_MAX,
        )
    }
}

/// Parse and validate a JSON config document.
pub fn parse_config_json(input: &str) -> Result<ValidatedConfig, ErrorEnvelope> {
    let config: CodeIndexConfig = serde_json::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_json"),
            format!("invalid config JSON: {error}"),
        )
    })?;
    config.validate_and_normalize().map_err(ErrorEnvelope::from)
}

/// Parse and validate a TOML config document.
pub fn parse_config_toml(input: &str) -> Result<ValidatedConfig, ErrorEnvelope> {
    let config: CodeIndexConfig = toml::from_str(input).map_err(|error| {
        ErrorEnvelope::expected(
            ErrorCode::new("config", "invalid_toml"),
            format!("invalid config TOML: {error}"),
        )
    })?;
    config.validate_and_normalize().map_err(ErrorEnvelope::from)
}

/// Typed validation errors for the configuration schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSchemaError {
    /// The config version is not supported by this binary.
    UnsupportedVersion {
        /// Version found in the config.
        found: u32,
        /// Version supported by this crate.
        supported: u32,
    },
    /// A timeout or interval is out of bounds.
    TimeoutOutOfRange {
        /// Schema section (e.g. `embedding`).
        section: &'static str,
        /// Field name in the config file (e.g. `timeoutMs`).
        field: &'static str,
        /// Value provided (ms).
        value_ms: u64,
        /// Minimum allowed value (ms).
        min_ms: u64,
        /// Maximum allowed value (ms).
        max_ms: u64,
    },
    /// A numeric limit is out of bounds.
    LimitOutOfRange {
        /// Schema section.
        section: &'static str,
        /// Field name in the config file.
        field: &'static str,
        /// Value provided.
        value: u64,
        /// Minimum allowed value.
        min: u64,
        /// Maximum allowed value.
        max: u64,
    },
    /// A list field exceeds the maximum allowed size.
    ListTooLarge {
        /// Schema section.
        section: &'static str,
        /// Field name in the config file.
        field: &'static str,
        /// Number of entries after normalization.
        len: usize,
        /// Maximum allowed number of entries.
        max: usize,
    },
    /// A file extension entry is invalid.
    InvalidExtension {
        /// Invalid extension value.
        extension: String,
    },
    /// An ignore pattern entry is invalid.
    InvalidIgnorePattern {
        /// Invalid ignore pattern value.
        pattern: String,
    },
    /// A URL entry is invalid.
    InvalidUrl {
        /// Schema section.
        section: &'static str,
        /// Field name in the config file.
        field: &'static str,
        /// Invalid URL value.
        url: String,
    },
    /// Any other invalid value.
    InvalidValue {
        /// Schema section.
        section: &'static str,
        /// Field name in the config file.
        field: &'static str,
        /// Human readable reason.
        reason: String,
    },
}

impl ConfigSchemaError {
    fn error_code(&self) -> ErrorCode {
        match self {
            Self::UnsupportedVersion { .. } => ErrorCode::new("config", "unsupported_version"),
            Self::TimeoutOutOfRange { .. } => ErrorCode::new("config", "invalid_timeout"),
            Self::LimitOutOfRange { .. } => ErrorCode::new("config", "invalid_limit"),
            Self::ListTooLarge { .. } => ErrorCode::new("config", "list_too_large"),
            Self::InvalidExtension { .. } => ErrorCode::new("config", "invalid_extension"),
            Self::InvalidIgnorePattern { .. } => ErrorCode::new("config", "invalid_ignore_pattern"),
            Self::InvalidUrl { .. } => ErrorCode::new("config", "invalid_url"),
            Self::InvalidValue { .. } => ErrorCode::new("config", "invalid_value"),
        }
    }
}

impl fmt::Display for ConfigSchemaError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedVersion { found, supported } => write!(
                formatter,
                "unsupported config version: {found} (supported: {supported})"
            ),
            Self::TimeoutOutOfRange {
                section,
                field,
                value_ms,
                min_ms,
                max_ms,
            } => write!(
                formatter,
                "{section}.{field} must be within [{min_ms}, {max_ms}] ms (got {value_ms})"
            ),
            Self::LimitOutOfRange {
                section,
                field,
                value,
                min,
                max,
            } => write!(
                formatter,
                "{section}.{field} must be within [{min}, {max}] (got {value})"
            ),
            Self::ListTooLarge {
                section,
                field,
                len,
                max,
            } => write!(
                formatter,
                "{section}.{field} must have at most {max} entries (got {len})"
            ),
            Self::InvalidExtension { extension } => {
                write!(formatter, "invalid extension entry: {extension}")
            },
            Self::InvalidIgnorePattern { pattern } => {
                write!(formatter, "invalid ignore pattern entry: {pattern:?}")
            },
            Self::InvalidUrl { section, field, .. } => {
                write!(formatter, "invalid URL for {section}.{field}")
            },
            Self::InvalidValue {
                section,
                field,
                reason,
            } => write!(formatter, "invalid value for {section}.{field}: {reason}"),
        }
    }
}

impl std::error::Error for ConfigSchemaError {}

impl From<ConfigSchemaError> for ErrorEnvelope {
    fn from(error: ConfigSchemaError) -> Self {
        let envelope = Self::expected(error.error_code(), error.to_string());

        match error {
            ConfigSchemaError::UnsupportedVersion { found, supported } => envelope
                .with_metadata("found", found.to_string())
                .with_metadata("supported", supported.to_string()),
            ConfigSchemaError::TimeoutOutOfRange {
                section,
                field,
                value_ms,
                min_ms,
                max_ms,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("value_ms", value_ms.to_string())
                .with_metadata("min_ms", min_ms.to_string())
                .with_metadata("max_ms", max_ms.to_string()),
            ConfigSchemaError::LimitOutOfRange {
                section,
                field,
                value,
                min,
                max,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("value", value.to_string())
                .with_metadata("min", min.to_string())
                .with_metadata("max", max.to_string()),
            ConfigSchemaError::ListTooLarge {
                section,
                field,
                len,
                max,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("len", len.to_string())
                .with_metadata("max", max.to_string()),
            ConfigSchemaError::InvalidExtension { extension } => {
                envelope.with_metadata("extension", extension)
            },
            ConfigSchemaError::InvalidIgnorePattern { pattern } => {
                envelope.with_metadata("pattern", pattern)
            },
            ConfigSchemaError::InvalidUrl {
                section,
                field,
                url,
            } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field)
                .with_metadata("url", sanitize_url_for_error(&url)),
            ConfigSchemaError::InvalidValue { section, field, .. } => envelope
                .with_metadata("section", section)
                .with_metadata("field", field),
        }
    }
}

const fn validate_timeout_ms(
    section: &'static str,
    field: &'static str,
    value_ms: u64,
    min_ms: u64,
    max_ms: u64,
) -> Result<(), ConfigSchemaError> {
    if value_ms < min_ms || value_ms > max_ms {
        return Err(ConfigSchemaError::TimeoutOutOfRange {
            section,
            field,
            value_ms,
            min_ms,
            max_ms,
        });
    }
    Ok(())
}

const fn validate_limit(
    section: &'static str,
    field: &'static str,
    value: u64,
    min: u64,
    max: u64,
) -> Result<(), ConfigSchemaError> {
    if value < min || value > max {
        return Err(ConfigSchemaError::LimitOutOfRange {
            section,
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

fn validate_http_url(
    section: &'static str,
    field: &'static str,
    value: &str,
) -> Result<(), ConfigSchemaError> {
    let invalid = || ConfigSchemaError::InvalidUrl {
        section,
        field,
        url: value.to_owned(),
    };
    let parsed = Url::parse(value).map_err(|_| invalid())?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(invalid());
    }
    Ok(())
}

fn normalize_optional_trimmed(value: &mut Option<Box<str>>) {
    let Some(raw) = value.take() else {
        return;
    };
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        *value = Some(trimmed.into());
    }
}

fn normalize_boxed_str(value: &mut Box<str>) {
    let trimmed = value.trim();
    if trimmed != value.as_ref() {
        *value = trimmed.into();
    }
}

pub(crate) fn normalize_extensions(
    input: &[Box<str>],
) -> Result<Vec<Box<str>>, ConfigSchemaError> {
    let mut normalized = Vec::with_capacity(input.len());
    for ext in input {
        let trimmed = ext.trim();
        let trimmed = trimmed.strip_prefix("*.").unwrap_or(trimmed);
        let trimmed = trimmed.strip_prefix('.').unwrap_or(trimmed);
        let candidate = trimmed.to_ascii_lowercase();

        if candidate.is_empty() || !candidate.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(ConfigSchemaError::InvalidExtension {
                extension: trimmed.to_owned(),
            });
        }
        normalized.push(candidate.into_boxed_str());
    }

    normalized.sort_unstable();
    normalized.dedup();
    Ok(normalized)
}

pub(crate) fn normalize_ignore_patterns(
    input: &[Box<str>],
) -> Result<Vec<Box<str>>, ConfigSchemaError> {
    let mut normalized = Vec::with_capacity(input.len());
    for pattern in input {
        let raw = pattern.trim();
        if raw.is_empty() {
            return Err(ConfigSchemaError::InvalidIgnorePattern {
                pattern: pattern.to_string(),
            });
        }
        normalized.push(collapse_forward_slashes(&raw.replace('\\', "/")).into_boxed_str());
    }

    normalized.sort_unstable();
    normalized.dedup();
    Ok(normalized)
}

fn collapse_forward_slashes(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut previous_was_slash = false;
    for ch in input.chars() {
        if ch == '/' && previous_was_slash {
            continue;
        }
        previous_was_slash = ch == '/';
        output.push(ch);
    }
    output
}
