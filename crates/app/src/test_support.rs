//! In-memory doubles shared by the unit tests of this crate.

use crate::index_codebase::{Indexer, IndexerDeps, IndexerOptions};
use code_index_adapters::{
    HashingEmbedding, IgnoreMatcher, InMemoryIdentityLedger, LocalVectorStore,
    TreeSitterStructureParser,
};
use code_index_domain::{CollectionName, EmbeddingLimits, RelativePath};
use code_index_ports::{
    BoxFuture, FileSystemDirEntry, FileSystemEntryKind, FileSystemPort, FileSystemStat,
    VectorQuery, VectorStorePort,
};
use code_index_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

/// Files keyed by relative path; directories are implied by the paths.
#[derive(Default)]
pub struct MemoryFileSystem {
    files: Mutex<BTreeMap<String, String>>,
    unreadable: Mutex<HashSet<String>>,
    reads: AtomicUsize,
}

impl MemoryFileSystem {
    pub fn with_files<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let fs = Self::default();
        for (path, text) in files {
            fs.write(path, text);
        }
        fs
    }

    pub fn write(&self, path: &str, text: &str) {
        self.files
            .lock()
            .expect("files lock")
            .insert(path.to_owned(), text.to_owned());
    }

    pub fn remove(&self, path: &str) {
        self.files.lock().expect("files lock").remove(path);
    }

    /// Make a directory (`""` for the root) fail to list.
    pub fn deny(&self, dir: &str) {
        self.unreadable
            .lock()
            .expect("unreadable lock")
            .insert(dir.to_owned());
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn list(&self, dir: &str) -> Result<Vec<FileSystemDirEntry>> {
        if self.unreadable.lock().expect("unreadable lock").contains(dir) {
            return Err(ErrorEnvelope::expected(
                ErrorCode::permission_denied(),
                format!("permission denied: {dir}"),
            ));
        }
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{dir}/")
        };
        let mut children: BTreeMap<String, FileSystemEntryKind> = BTreeMap::new();
        for path in self.files.lock().expect("files lock").keys() {
            let Some(rest) = path.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((child, _)) => {
                    children.insert(child.to_owned(), FileSystemEntryKind::Directory);
                },
                None => {
                    children.insert(rest.to_owned(), FileSystemEntryKind::File);
                },
            }
        }
        // Reverse order so callers cannot rely on listing order.
        Ok(children
            .into_iter()
            .rev()
            .map(|(name, kind)| FileSystemDirEntry {
                name: name.into_boxed_str(),
                kind,
            })
            .collect())
    }

    fn missing(path: &RelativePath) -> ErrorEnvelope {
        ErrorEnvelope::expected(ErrorCode::not_found(), format!("not found: {}", path.as_str()))
    }
}

impl FileSystemPort for MemoryFileSystem {
    fn read_dir(
        &self,
        _ctx: &RequestContext,
        _root: PathBuf,
        dir: Option<RelativePath>,
    ) -> BoxFuture<'_, Result<Vec<FileSystemDirEntry>>> {
        let dir = dir.map(|dir| dir.as_str().to_owned()).unwrap_or_default();
        let listed = self.list(&dir);
        Box::pin(async move { listed })
    }

    fn read_file_text(
        &self,
        _ctx: &RequestContext,
        _root: PathBuf,
        file: RelativePath,
    ) -> BoxFuture<'_, Result<String>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let text = self
            .files
            .lock()
            .expect("files lock")
            .get(file.as_str())
            .cloned()
            .ok_or_else(|| Self::missing(&file));
        Box::pin(async move { text })
    }

    fn stat(
        &self,
        _ctx: &RequestContext,
        _root: PathBuf,
        path: RelativePath,
    ) -> BoxFuture<'_, Result<FileSystemStat>> {
        let stat = self
            .files
            .lock()
            .expect("files lock")
            .get(path.as_str())
            .map(|text| FileSystemStat {
                kind: FileSystemEntryKind::File,
                size_bytes: text.len() as u64,
                mtime_ms: 0,
            })
            .ok_or_else(|| Self::missing(&path));
        Box::pin(async move { stat })
    }
}

pub const TEST_DIMENSION: u32 = 16;

/// In-memory workspace wired to the offline adapters.
pub struct Harness {
    pub fs: Arc<MemoryFileSystem>,
    pub store: Arc<LocalVectorStore>,
    pub ledger: Arc<InMemoryIdentityLedger>,
    pub collection: CollectionName,
}

impl Harness {
    pub fn new<'a>(files: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            fs: Arc::new(MemoryFileSystem::with_files(files)),
            store: Arc::new(LocalVectorStore::in_memory()),
            ledger: Arc::new(InMemoryIdentityLedger::new()),
            collection: CollectionName::parse("code_chunks_test").expect("collection"),
        }
    }

    pub fn deps(&self) -> IndexerDeps {
        let embedding = HashingEmbedding::new(TEST_DIMENSION, EmbeddingLimits::default())
            .expect("hashing embedding");
        IndexerDeps {
            filesystem: self.fs.clone(),
            ignore: Arc::new(IgnoreMatcher::new(["generated/"])),
            structure: Arc::new(TreeSitterStructureParser::new()),
            embedding: Arc::new(embedding),
            vector_store: self.store.clone(),
            ledger: self.ledger.clone(),
            logger: None,
        }
    }

    pub fn options(&self) -> IndexerOptions {
        IndexerOptions::new(PathBuf::from("/workspace"), self.collection.clone())
    }

    pub fn indexer(&self) -> Indexer {
        Indexer::new(self.deps(), self.options())
    }

    /// Distinct file paths with at least one stored vector.
    pub async fn stored_paths(&self) -> Vec<String> {
        let ctx = RequestContext::new_request();
        let exists = self
            .store
            .has_collection(&ctx, self.collection.clone())
            .await
            .expect("has collection");
        if !exists {
            return Vec::new();
        }
        let query = VectorQuery {
            vector: vec![1.0; TEST_DIMENSION as usize],
            top_k: 10_000,
            score_threshold: None,
        };
        let matches = self
            .store
            .query(&ctx, self.collection.clone(), query)
            .await
            .expect("query");
        let mut paths: Vec<String> = matches
            .into_iter()
            .map(|hit| hit.payload.file_path.as_str().to_owned())
            .collect();
        paths.sort();
        paths.dedup();
        paths
    }

    /// Files with a ledger entry.
    pub async fn ledger_paths(&self) -> Vec<String> {
        self.ledger
            .snapshot(&self.collection)
            .await
            .into_keys()
            .map(|path| path.as_str().to_owned())
            .collect()
    }
}
