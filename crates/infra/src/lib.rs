//! # code-index-infra
//!
//! Infrastructure wiring and runtime composition.
//! This crate depends on `app`, `adapters`, `config`, and `shared`.

/// Embedding adapter selection.
mod embedding_factory;
/// Local command entry points.
pub mod local;
/// Vector store adapter selection.
mod vector_store_factory;
/// Workspace resolution and adapter composition.
pub mod workspace;

pub use embedding_factory::build_embedding_port;
pub use local::{
    ConfigRenderFormat, render_effective_config, run_clear_local, run_index_local,
    run_search_local, run_watch_local,
};
pub use vector_store_factory::{LOCAL_VECTORS_DIR, build_vector_store_port};
pub use workspace::{DEFAULT_CONFIG_FILES, LEDGER_DIR, Services, Workspace};

/// Infra-level error type (shared error envelope).
pub type InfraError = code_index_shared::ErrorEnvelope;

/// Infra-level result type.
pub type InfraResult<T> = Result<T, InfraError>;

#[cfg(test)]
mod tests {
    fn workspace_deps() -> Vec<String> {
        let cargo_toml = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let mut deps = Vec::new();
        let mut in_deps = false;

        for raw_line in cargo_toml.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.starts_with('[') {
                in_deps = line == "[dependencies]";
                continue;
            }
            if in_deps && line.starts_with("code-index-") {
                let key = line.split('=').next().unwrap_or("").trim();
                deps.push(key.split('.').next().unwrap_or("").trim().to_owned());
            }
        }
        deps
    }

    #[test]
    fn infra_depends_on_app_adapters_config() {
        let deps = workspace_deps();
        for expected in ["code-index-app", "code-index-adapters", "code-index-config"] {
            assert!(deps.iter().any(|dep| dep == expected), "missing dependency: {expected}");
        }
    }
}
