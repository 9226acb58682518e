//! Read, chunk and diff one file against the identity ledger.

use super::types::{FileDiff, FilePlan};
use crate::chunker::Chunker;
use crate::run_summary::{FailureKind, FailureRecord, as_count};
use crate::vector_writer::VectorWriter;
use code_index_domain::{BlockHashes, CollectionName, RelativePath};
use code_index_ports::{FileSystemPort, IdentityLedgerPort, LoggerPort, log_fields};
use code_index_shared::{ErrorCode, RequestContext, Result};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Everything a parse worker needs, owned so it can run on the pool.
pub(crate) struct FileTask {
    pub ctx: RequestContext,
    pub filesystem: Arc<dyn FileSystemPort>,
    pub ledger: Arc<dyn IdentityLedgerPort>,
    pub chunker: Chunker,
    pub writer: VectorWriter,
    pub logger: Option<Arc<dyn LoggerPort>>,
    pub root: PathBuf,
    pub collection: CollectionName,
    pub path: RelativePath,
    pub force: bool,
}

impl FileTask {
    pub(crate) async fn run(self) -> Result<FilePlan> {
        let Self {
            ctx,
            filesystem,
            ledger,
            chunker,
            writer,
            logger,
            root,
            collection,
            path,
            force,
        } = self;
        ctx.ensure_not_cancelled("index.file")?;

        let text = match filesystem.read_file_text(&ctx, root, path.clone()).await {
            Ok(text) => text,
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) if error.code == ErrorCode::not_found() => {
                return Ok(FilePlan::Vanished(path));
            },
            Err(error) => {
                if let Some(logger) = logger.as_ref() {
                    logger.warn(
                        "index.file.read_failed",
                        "cannot read file; skipping",
                        Some(log_fields! {
                            "file" => path.as_str(),
                            "code" => error.code.to_string(),
                        }),
                    );
                }
                let failure = FailureRecord::new(FailureKind::FileRead, &error).with_path(path);
                return Ok(FilePlan::Unreadable(failure));
            },
        };

        let chunked = match chunker.chunk(&path, &text) {
            Ok(chunked) => chunked,
            Err(error) => {
                let failure = FailureRecord::new(FailureKind::FileRead, &error).with_path(path);
                return Ok(FilePlan::Unreadable(failure));
            },
        };
        if let Some(error) = chunked.parse_error(&path)
            && let Some(logger) = logger.as_ref()
        {
            logger.debug(
                "index.chunk.parse_failed",
                "syntax parse failed; chunking by lines",
                Some(log_fields! {
                    "file" => path.as_str(),
                    "code" => error.code.to_string(),
                }),
            );
        }

        let mut failures = Vec::new();
        let previous = match ledger.load_file(&ctx, collection, path.clone()).await {
            Ok(previous) => previous,
            Err(error) if error.is_cancelled() => return Err(error),
            Err(error) => {
                failures.push(
                    FailureRecord::new(FailureKind::Ledger, &error).with_path(path.clone()),
                );
                None
            },
        };
        let known = previous.clone().unwrap_or_default();

        let mut retained = BlockHashes::new();
        let mut to_embed = Vec::new();
        let mut unchanged = 0u64;
        let mut current = HashSet::with_capacity(chunked.blocks.len());
        for block in chunked.blocks {
            current.insert(block.identity);
            match known.get(&block.identity) {
                Some(hash) if !force && *hash == block.content_hash => {
                    retained.insert(block.identity, hash.clone());
                    unchanged += 1;
                },
                _ => to_embed.push(block),
            }
        }

        let stale: Vec<_> = known
            .keys()
            .filter(|identity| !current.contains(*identity))
            .copied()
            .collect();
        let mut deleted = 0u64;
        if !stale.is_empty() {
            let count = as_count(stale.len());
            match writer.delete(&ctx, stale).await {
                Ok(()) => deleted = count,
                Err(failure) if failure.error.is_cancelled() => return Err(failure.error),
                Err(failure) => {
                    for identity in &failure.missing {
                        if let Some(hash) = known.get(identity) {
                            retained.insert(*identity, hash.clone());
                        }
                    }
                    failures.push(
                        FailureRecord::new(FailureKind::VectorStore, &failure.error)
                            .with_path(path.clone())
                            .with_blocks(as_count(failure.missing.len())),
                    );
                },
            }
        }

        Ok(FilePlan::Diffed(FileDiff {
            path,
            previous,
            retained,
            to_embed,
            unchanged,
            deleted,
            failures,
        }))
    }
}
