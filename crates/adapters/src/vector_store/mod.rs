//! Vector store adapters.

pub mod local;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use local::LocalVectorStore;
#[cfg(feature = "qdrant")]
pub use qdrant::{QdrantVectorStore, QdrantVectorStoreConfig};
