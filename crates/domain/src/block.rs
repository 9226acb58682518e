//! Code blocks and their stable identities.

use crate::constants::{BLOCK_IDENTITY_NAMESPACE, CHARS_PER_TOKEN};
use crate::primitives::{PrimitiveError, RelativePath};
use crate::spans::LineSpan;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fmt::Write as _;
use uuid::Uuid;

/// Deterministic identity of a block: UUIDv5 over `"{path}:{start}:{end}"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockIdentity(Uuid);

impl BlockIdentity {
    /// Parse an identity from its hyphenated string form.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        Uuid::parse_str(raw.trim())
            .map(Self)
            .map_err(|_| PrimitiveError::InvalidBlockIdentity {
                input: raw.to_owned(),
            })
    }

    /// Underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for BlockIdentity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), formatter)
    }
}

/// Derive the identity of the block at `span` of `file_path`.
///
/// Separators are normalized to `/` before hashing, so the identity is the
/// same on every platform.
#[must_use]
pub fn derive_block_identity(namespace: &Uuid, file_path: &str, span: LineSpan) -> BlockIdentity {
    let normalized = file_path.replace('\\', "/");
    let name = format!("{normalized}:{}:{}", span.start_line(), span.end_line());
    BlockIdentity(Uuid::new_v5(namespace, name.as_bytes()))
}

/// Hex SHA-256 of block content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(Box<str>);

impl ContentHash {
    /// Hash the given content.
    #[must_use]
    pub fn of(content: &str) -> Self {
        let digest = Sha256::digest(content.as_bytes());
        let mut hex = String::with_capacity(64);
        for byte in digest.iter() {
            // Writing into a String cannot fail.
            let _ = write!(hex, "{byte:02x}");
        }
        Self(hex.into_boxed_str())
    }

    /// Wrap an already computed hex digest.
    pub fn from_hex(hex: impl Into<Box<str>>) -> Self {
        Self(hex.into())
    }

    /// Access the hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Identity to content-hash map of the blocks stored for one file.
pub type BlockHashes = BTreeMap<BlockIdentity, ContentHash>;

/// Estimated token count: `ceil(chars / CHARS_PER_TOKEN)`.
#[must_use]
pub const fn estimate_tokens(chars: usize) -> usize {
    chars.div_ceil(CHARS_PER_TOKEN)
}

/// A contiguous span of a file chosen as the unit of embedding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeBlock {
    /// Workspace-relative path of the source file.
    pub file_path: RelativePath,
    /// Covered lines.
    pub span: LineSpan,
    /// Exact text of the covered lines, terminators included.
    pub content: String,
    /// Hash of `content`.
    pub content_hash: ContentHash,
    /// Stable identity derived from path and span.
    pub identity: BlockIdentity,
    /// Set when a single line exceeds the block ceiling.
    pub oversized: bool,
}

impl CodeBlock {
    /// Build a block, deriving its hash and identity.
    #[must_use]
    pub fn new(file_path: RelativePath, span: LineSpan, content: String, oversized: bool) -> Self {
        let content_hash = ContentHash::of(&content);
        let identity = derive_block_identity(&BLOCK_IDENTITY_NAMESPACE, file_path.as_str(), span);
        Self {
            file_path,
            span,
            content,
            content_hash,
            identity,
            oversized,
        }
    }

    /// Size in Unicode scalar values.
    #[must_use]
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }

    /// Estimated token count of the content.
    #[must_use]
    pub fn token_estimate(&self) -> usize {
        estimate_tokens(self.char_len())
    }
}
