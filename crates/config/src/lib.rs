//! # code-index-config
//!
//! Configuration schema, env overrides and validation for `cidx`.
//! This crate depends on `domain` and `shared` only.

/// Environment variable parsing and merging.
pub mod env;
/// JSON Schema export.
pub mod json_schema;
/// Config loading helpers (file + env).
pub mod load;
/// Configuration schema types and helpers.
pub mod schema;

pub use env::{CodeIndexEnv, EnvParseError, apply_env_overrides};
pub use json_schema::config_json_schema;
pub use load::{load_config_from_path, load_config_std_env, to_pretty_json, to_pretty_toml};
pub use schema::{
    CURRENT_CONFIG_VERSION, CodeIndexConfig, ConfigSchemaError, DEFAULT_QDRANT_URL,
    DEFAULT_STATE_DIR, EmbeddingConfig, EmbeddingProviderKind, IndexConfig, OversizedItemSetting,
    SearchConfig, ValidatedConfig, VectorStoreConfig, VectorStoreProviderKind, WatchConfig,
    parse_config_json, parse_config_toml,
};
