//! Vector-store documents.

use crate::block::{BlockIdentity, CodeBlock, ContentHash};
use crate::primitives::RelativePath;
use serde::{Deserialize, Serialize};

/// Payload stored next to every vector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPayload {
    /// Workspace-relative source path.
    pub file_path: RelativePath,
    /// First line (1-indexed).
    pub start_line: u32,
    /// Last line (inclusive).
    pub end_line: u32,
    /// Block text.
    pub content: String,
    /// Hash of `content`.
    pub content_hash: ContentHash,
}

impl From<&CodeBlock> for BlockPayload {
    fn from(block: &CodeBlock) -> Self {
        Self {
            file_path: block.file_path.clone(),
            start_line: block.span.start_line(),
            end_line: block.span.end_line(),
            content: block.content.clone(),
            content_hash: block.content_hash.clone(),
        }
    }
}

/// An embedded block ready to upsert.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedVector {
    /// Upsert key.
    pub identity: BlockIdentity,
    /// Embedding of the block content.
    pub embedding: Vec<f32>,
    /// Stored payload.
    pub payload: BlockPayload,
}

impl IndexedVector {
    /// Pair a block with its embedding.
    #[must_use]
    pub fn new(block: &CodeBlock, embedding: Vec<f32>) -> Self {
        Self {
            identity: block.identity,
            embedding,
            payload: BlockPayload::from(block),
        }
    }
}
