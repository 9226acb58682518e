//! Vector store adapter selection.

use crate::InfraResult;
use code_index_adapters::LocalVectorStore;
use code_index_adapters::vector_store::{QdrantVectorStore, QdrantVectorStoreConfig};
use code_index_config::{CodeIndexEnv, ValidatedConfig, VectorStoreProviderKind};
use code_index_ports::VectorStorePort;
use std::path::Path;
use std::sync::Arc;

/// Directory under the state dir holding local vector snapshots.
pub const LOCAL_VECTORS_DIR: &str = "vectors";

/// Build the vector store named by `vectorStore.provider`.
///
/// The local store keeps its snapshots under `state_dir`.
pub fn build_vector_store_port(
    config: &ValidatedConfig,
    env: &CodeIndexEnv,
    state_dir: &Path,
) -> InfraResult<Arc<dyn VectorStorePort>> {
    let store = &config.vector_store;
    let port: Arc<dyn VectorStorePort> = match store.provider {
        VectorStoreProviderKind::Local => {
            Arc::new(LocalVectorStore::persistent(state_dir.join(LOCAL_VECTORS_DIR)))
        },
        VectorStoreProviderKind::Qdrant => {
            let adapter_config = QdrantVectorStoreConfig::from_vector_store_config(
                env.vector_store_api_key.clone(),
                store,
            );
            Arc::new(QdrantVectorStore::new(&adapter_config)?)
        },
    };
    tracing::debug!(provider = %store.provider, "vector store port ready");
    Ok(port)
}
