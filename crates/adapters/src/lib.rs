//! # code-index-adapters
//!
//! Adapter implementations for the ports: embedding providers, vector stores,
//! filesystem, ignore rules, syntax structure, identity ledger, change
//! notification and logging. This crate depends on `ports`, `domain`,
//! `config` and `shared`.

/// File-change notifier adapters.
pub mod change_notifier;
/// Embedding provider adapters.
pub mod embedding;
pub mod fs;
#[cfg(feature = "http")]
mod http;
pub mod ignore;
/// Identity ledger adapters.
pub mod ledger;
pub mod logger;
pub mod structure;
/// Vector store adapters.
pub mod vector_store;

pub use change_notifier::PollingChangeNotifier;
pub use embedding::hashing::HashingEmbedding;
pub use fs::LocalFileSystem;
pub use ignore::IgnoreMatcher;
pub use ledger::{InMemoryIdentityLedger, JsonFileIdentityLedger};
pub use logger::TracingLogger;
pub use structure::TreeSitterStructureParser;
pub use vector_store::LocalVectorStore;
