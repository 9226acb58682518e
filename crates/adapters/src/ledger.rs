//! Identity ledger adapters.
//!
//! [`InMemoryIdentityLedger`] keeps entries for the lifetime of the process.
//! [`JsonFileIdentityLedger`] caches a collection in memory after first use and
//! writes `{dir}/{collection}.json` atomically on [`IdentityLedgerPort::flush`].

use code_index_ports::{
    BlockHashes, BoxFuture, CollectionName, IdentityLedgerPort, LedgerSnapshot, RelativePath,
};
use code_index_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

const LEDGER_FILE_VERSION: u32 = 1;

/// Process-local ledger.
#[derive(Debug, Clone, Default)]
pub struct InMemoryIdentityLedger {
    collections: Arc<RwLock<HashMap<CollectionName, LedgerSnapshot>>>,
}

impl InMemoryIdentityLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every entry of `collection`.
    pub async fn snapshot(&self, collection: &CollectionName) -> LedgerSnapshot {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

impl IdentityLedgerPort for InMemoryIdentityLedger {
    fn load_file(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        file: RelativePath,
    ) -> BoxFuture<'_, Result<Option<BlockHashes>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("ledger.load_file")?;
            let guard = self.collections.read().await;
            Ok(guard
                .get(&collection)
                .and_then(|entries| entries.get(&file))
                .cloned())
        })
    }

    /// Not cancellable: a cancelled run still records the blocks it wrote.
    fn store_file(
        &self,
        _ctx: &RequestContext,
        collection: CollectionName,
        file: RelativePath,
        hashes: BlockHashes,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut guard = self.collections.write().await;
            apply_entry(guard.entry(collection).or_default(), file, hashes);
            Ok(())
        })
    }

    fn list_files(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
    ) -> BoxFuture<'_, Result<Vec<RelativePath>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("ledger.list_files")?;
            let guard = self.collections.read().await;
            Ok(guard
                .get(&collection)
                .map(|entries| entries.keys().cloned().collect())
                .unwrap_or_default())
        })
    }

    fn flush(
        &self,
        ctx: &RequestContext,
        _collection: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move { ctx.ensure_not_cancelled("ledger.flush") })
    }

    fn clear(&self, ctx: &RequestContext, collection: CollectionName) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("ledger.clear")?;
            self.collections.write().await.remove(&collection);
            Ok(())
        })
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LedgerFile {
    version: u32,
    files: LedgerSnapshot,
}

#[derive(Serialize)]
struct LedgerFileRef<'a> {
    version: u32,
    files: &'a LedgerSnapshot,
}

/// Ledger persisted as one JSON document per collection.
#[derive(Debug, Clone)]
pub struct JsonFileIdentityLedger {
    dir: PathBuf,
    cache: InMemoryIdentityLedger,
    loaded: Arc<Mutex<HashSet<CollectionName>>>,
    dirty: Arc<Mutex<HashSet<CollectionName>>>,
}

impl JsonFileIdentityLedger {
    /// Ledger storing its files under `dir`.
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            cache: InMemoryIdentityLedger::new(),
            loaded: Arc::new(Mutex::new(HashSet::new())),
            dirty: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Path of the ledger file of `collection`.
    pub fn file_path(&self, collection: &CollectionName) -> PathBuf {
        self.dir.join(format!("{}.json", collection.as_str()))
    }

    async fn ensure_loaded(&self, collection: &CollectionName) -> Result<()> {
        let mut loaded = self.loaded.lock().await;
        if loaded.contains(collection) {
            return Ok(());
        }
        let path = self.file_path(collection);
        let files = match tokio::fs::read(&path).await {
            Ok(payload) => {
                let file: LedgerFile = serde_json::from_slice(&payload).map_err(|error| {
                    ledger_error("parse_failed", "failed to parse ledger file", &error)
                        .with_metadata("path", path.display().to_string())
                })?;
                if file.version != LEDGER_FILE_VERSION {
                    return Err(ErrorEnvelope::expected(
                        ErrorCode::new("ledger", "version_mismatch"),
                        "unsupported ledger file version",
                    )
                    .with_metadata("version", file.version.to_string()));
                }
                file.files
            },
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => LedgerSnapshot::new(),
            Err(error) => return Err(ErrorEnvelope::from(error)),
        };
        self.cache
            .collections
            .write()
            .await
            .insert(collection.clone(), files);
        loaded.insert(collection.clone());
        Ok(())
    }

    async fn write_file(&self, collection: &CollectionName) -> Result<()> {
        let payload = {
            let guard = self.cache.collections.read().await;
            let empty = LedgerSnapshot::new();
            let files = guard.get(collection).unwrap_or(&empty);
            serde_json::to_vec(&LedgerFileRef {
                version: LEDGER_FILE_VERSION,
                files,
            })
            .map_err(|error| {
                ledger_error("serialize_failed", "failed to serialize ledger", &error)
            })?
        };
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.file_path(collection);
        let staging = path.with_extension("json.tmp");
        tokio::fs::write(&staging, payload).await?;
        tokio::fs::rename(&staging, &path).await?;
        Ok(())
    }
}

impl IdentityLedgerPort for JsonFileIdentityLedger {
    fn load_file(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        file: RelativePath,
    ) -> BoxFuture<'_, Result<Option<BlockHashes>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.ensure_loaded(&collection).await?;
            self.cache.load_file(&ctx, collection, file).await
        })
    }

    fn store_file(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
        file: RelativePath,
        hashes: BlockHashes,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.ensure_loaded(&collection).await?;
            self.cache
                .store_file(&ctx, collection.clone(), file, hashes)
                .await?;
            self.dirty.lock().await.insert(collection);
            Ok(())
        })
    }

    fn list_files(
        &self,
        ctx: &RequestContext,
        collection: CollectionName,
    ) -> BoxFuture<'_, Result<Vec<RelativePath>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            self.ensure_loaded(&collection).await?;
            self.cache.list_files(&ctx, collection).await
        })
    }

    /// Flushing is not cancellable: entries recorded so far describe vectors
    /// that were already written.
    fn flush(
        &self,
        _ctx: &RequestContext,
        collection: CollectionName,
    ) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut dirty = self.dirty.lock().await;
            if !dirty.contains(&collection) {
                return Ok(());
            }
            self.write_file(&collection).await?;
            dirty.remove(&collection);
            tracing::debug!(collection = collection.as_str(), "ledger flushed");
            Ok(())
        })
    }

    fn clear(&self, ctx: &RequestContext, collection: CollectionName) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("ledger.clear")?;
            let mut loaded = self.loaded.lock().await;
            self.dirty.lock().await.remove(&collection);
            match tokio::fs::remove_file(self.file_path(&collection)).await {
                Ok(()) => {},
                Err(error) if error.kind() == std::io::ErrorKind::NotFound => {},
                Err(error) => return Err(ErrorEnvelope::from(error)),
            }
            // The file is gone, so the empty cache is authoritative.
            self.cache
                .collections
                .write()
                .await
                .insert(collection.clone(), LedgerSnapshot::new());
            loaded.insert(collection);
            Ok(())
        })
    }
}

fn apply_entry(entries: &mut LedgerSnapshot, file: RelativePath, hashes: BlockHashes) {
    if hashes.is_empty() {
        entries.remove(&file);
    } else {
        entries.insert(file, hashes);
    }
}

fn ledger_error(code: &'static str, message: &str, error: &serde_json::Error) -> ErrorEnvelope {
    ErrorEnvelope::expected(ErrorCode::new("ledger", code), message)
        .with_metadata("source", error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use code_index_domain::{CodeBlock, LineSpan};
    use code_index_ports::BlockIdentity;

    fn path(value: &str) -> Result<RelativePath> {
        RelativePath::parse(value).map_err(ErrorEnvelope::from)
    }

    fn collection() -> Result<CollectionName> {
        CollectionName::parse("ws_ledger_test").map_err(ErrorEnvelope::from)
    }

    fn hashes_for(file: &str, spans: &[(u32, u32)]) -> Result<BlockHashes> {
        let mut hashes = BlockHashes::new();
        for (start, end) in spans {
            let span = LineSpan::new(*start, *end).map_err(ErrorEnvelope::from)?;
            let block = CodeBlock::new(path(file)?, span, format!("{file}:{start}"), false);
            hashes.insert(block.identity, block.content_hash.clone());
        }
        Ok(hashes)
    }

    fn temp_dir(label: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_nanos());
        std::env::temp_dir().join(format!("cidx-{label}-{}-{nanos}", std::process::id()))
    }

    #[tokio::test]
    async fn empty_store_removes_the_entry() -> Result<()> {
        let ledger = InMemoryIdentityLedger::new();
        let ctx = RequestContext::new_request();
        let hashes = hashes_for("a.rs", &[(1, 4), (5, 9)])?;
        ledger
            .store_file(&ctx, collection()?, path("a.rs")?, hashes.clone())
            .await?;
        assert_eq!(
            ledger.load_file(&ctx, collection()?, path("a.rs")?).await?,
            Some(hashes)
        );

        ledger
            .store_file(&ctx, collection()?, path("a.rs")?, BlockHashes::new())
            .await?;
        assert_eq!(ledger.load_file(&ctx, collection()?, path("a.rs")?).await?, None);
        assert!(ledger.list_files(&ctx, collection()?).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn json_ledger_round_trips_through_flush() -> Result<()> {
        let dir = temp_dir("ledger");
        let ctx = RequestContext::new_request();
        let first = JsonFileIdentityLedger::new(dir.clone());
        let hashes = hashes_for("src/lib.rs", &[(1, 20)])?;
        first
            .store_file(&ctx, collection()?, path("src/lib.rs")?, hashes.clone())
            .await?;
        first
            .store_file(
                &ctx,
                collection()?,
                path("src/main.rs")?,
                hashes_for("src/main.rs", &[(1, 3)])?,
            )
            .await?;
        first.flush(&ctx, collection()?).await?;

        let second = JsonFileIdentityLedger::new(dir.clone());
        assert_eq!(
            second.list_files(&ctx, collection()?).await?,
            vec![path("src/lib.rs")?, path("src/main.rs")?]
        );
        assert_eq!(
            second.load_file(&ctx, collection()?, path("src/lib.rs")?).await?,
            Some(hashes)
        );

        second.clear(&ctx, collection()?).await?;
        assert!(!second.file_path(&collection()?).exists());
        assert!(second.list_files(&ctx, collection()?).await?.is_empty());

        tokio::fs::remove_dir_all(&dir).await?;
        Ok(())
    }

    #[tokio::test]
    async fn unflushed_entries_are_not_persisted() -> Result<()> {
        let dir = temp_dir("ledger-unflushed");
        let ctx = RequestContext::new_request();
        let ledger = JsonFileIdentityLedger::new(dir.clone());
        ledger
            .store_file(&ctx, collection()?, path("a.rs")?, hashes_for("a.rs", &[(1, 2)])?)
            .await?;
        assert!(!ledger.file_path(&collection()?).exists());

        let identity: BlockIdentity = *hashes_for("a.rs", &[(1, 2)])?
            .keys()
            .next()
            .ok_or_else(|| ErrorEnvelope::invariant(ErrorCode::internal(), "missing identity"))?;
        let loaded = ledger.load_file(&ctx, collection()?, path("a.rs")?).await?;
        assert!(loaded.is_some_and(|entry| entry.contains_key(&identity)));
        Ok(())
    }
}
