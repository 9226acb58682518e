//! Drop a collection together with its identity ledger.

use code_index_domain::CollectionName;
use code_index_ports::{IdentityLedgerPort, LoggerPort, VectorStorePort, log_fields};
use code_index_shared::{RequestContext, Result};
use std::sync::Arc;

/// Dependencies required by clear-index.
#[derive(Clone)]
pub struct ClearIndexDeps {
    /// Vector store holding the collection.
    pub vector_store: Arc<dyn VectorStorePort>,
    /// Ledger tracking the collection's identities.
    pub ledger: Arc<dyn IdentityLedgerPort>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

/// Drop `collection` and forget every ledger entry, so the next run indexes
/// the workspace from scratch. Clearing a missing collection succeeds.
pub async fn clear_index(
    ctx: &RequestContext,
    deps: &ClearIndexDeps,
    collection: &CollectionName,
) -> Result<()> {
    ctx.ensure_not_cancelled("clear_index.start")?;
    let existed = deps
        .vector_store
        .has_collection(ctx, collection.clone())
        .await?;
    if existed {
        deps.vector_store
            .drop_collection(ctx, collection.clone())
            .await?;
    }
    deps.ledger.clear(ctx, collection.clone()).await?;
    deps.ledger.flush(ctx, collection.clone()).await?;

    if let Some(logger) = deps.logger.as_ref() {
        logger.info(
            "clear.completed",
            "index cleared",
            Some(log_fields! {
                "collection" => collection.as_str(),
                "collectionExisted" => existed,
            }),
        );
    }
    Ok(())
}
