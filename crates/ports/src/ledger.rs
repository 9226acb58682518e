//! Identity ledger boundary contract.
//!
//! The ledger remembers, per file, which block identities are stored and
//! with which content hash. It is the only local state kept between runs.

use crate::BoxFuture;
use code_index_domain::{BlockHashes, CollectionName, RelativePath};
use code_index_shared::{RequestContext, Result};
use std::collections::BTreeMap;

/// Ledger entries of a whole collection, keyed by file.
pub type LedgerSnapshot = BTreeMap<RelativePath, BlockHashes>;

/// Boundary contract for the identity ledger.
pub trait IdentityLedgerPort: Send + Sync {
    /// Stored identities of one file; `None` when the file has no entry.
    fn load_file(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        file: RelativePath,
    ) -> BoxFuture<'_, Result<Option<BlockHashes>>>;

    /// Replace the entry of one file. An empty map removes the file.
    fn store_file(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        file: RelativePath,
        hashes: BlockHashes,
    ) -> BoxFuture<'_, Result<()>>;

    /// Files with a ledger entry.
    fn list_files(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
    ) -> BoxFuture<'_, Result<Vec<RelativePath>>>;

    /// Make pending writes durable.
    fn flush(&self, ctx: &RequestContext, collection: CollectionName)
    -> BoxFuture<'_, Result<()>>;

    /// Remove every entry of the collection.
    fn clear(&self, ctx: &RequestContext, collection: CollectionName) -> BoxFuture<'_, Result<()>>;
}
