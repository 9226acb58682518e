//! File-change notification boundary contract.

use crate::BoxFuture;
use code_index_domain::FileChangeEvent;
use code_index_shared::{RequestContext, Result};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Stream of change events; closed when the watch ends.
pub type FileChangeStream = mpsc::Receiver<FileChangeEvent>;

/// Boundary contract for file-change notification.
pub trait FileChangeNotifierPort: Send + Sync {
    /// Start watching `root`. Events are produced until `ctx` is cancelled.
    fn watch(&self, ctx: &RequestContext, root: PathBuf) -> BoxFuture<'_, Result<FileChangeStream>>;
}
