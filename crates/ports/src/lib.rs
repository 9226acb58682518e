//! # code-index-ports
//!
//! Port traits between the application core and its adapters. Depends only
//! on `domain` and `shared`.

use std::future::Future;
use std::pin::Pin;

/// Boxed future used by port traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

pub mod change_notifier;
pub mod embedding;
pub mod filesystem;
pub mod ignore;
pub mod ledger;
pub mod logger;
pub mod structure;
pub mod vector_store;

pub use change_notifier::*;
pub use embedding::*;
pub use filesystem::*;
pub use ignore::*;
pub use ledger::*;
pub use logger::*;
pub use structure::*;
pub use vector_store::*;

#[doc(hidden)]
pub use serde_json;

// Domain types used in port signatures, so adapters can implement ports
// without naming the domain crate.
pub use code_index_domain::{
    BlockHashes, BlockIdentity, BlockPayload, CollectionName, EmbeddingLimits,
    EmbeddingProviderId, FileChangeEvent, FileChangeKind, IndexedVector, Language, RelativePath,
};

#[cfg(test)]
mod tests {
    fn workspace_deps() -> Vec<String> {
        let cargo_toml = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/Cargo.toml"));
        let mut deps = Vec::new();
        let mut in_deps = false;

        for raw_line in cargo_toml.lines() {
            let line = raw_line.split('#').next().unwrap_or("").trim();
            if line.starts_with('[') {
                in_deps = line == "[dependencies]" || line == "[dev-dependencies]";
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
    fn ports_depend_only_on_domain_and_shared() {
        let deps = workspace_deps();
        let allowed = ["code-index-domain", "code-index-shared"];

        for dep in &deps {
            assert!(allowed.contains(&dep.as_str()), "unexpected dependency: {dep}");
        }
        for expected in allowed {
            assert!(deps.iter().any(|dep| dep == expected), "missing dependency: {expected}");
        }
    }

    #[test]
    fn log_fields_macro_builds_json_values() {
        let fields = crate::log_fields! { "file" => "a.rs", "blocks" => 3 };
        assert_eq!(fields.get("blocks"), Some(&serde_json::json!(3)));
        assert_eq!(fields.get("file"), Some(&serde_json::json!("a.rs")));
    }
}
