//! Domain primitives with validated constructors.

use code_index_shared::{ErrorCode, ErrorEnvelope};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path};

/// Validation failures for domain primitives and spans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimitiveError {
    /// `CollectionName` is empty after trimming.
    EmptyCollectionName {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// `CollectionName` violates the allowed pattern.
    InvalidCollectionName {
        /// Trimmed collection name that failed validation.
        input: String,
    },
    /// Derived collection name is invalid (invariant violation).
    DerivedCollectionNameInvalid {
        /// Candidate collection name that failed validation.
        candidate: String,
    },
    /// `EmbeddingProviderId` is empty after trimming.
    InvalidEmbeddingProviderId {
        /// Length of the raw input before trimming.
        input_length: usize,
    },
    /// A workspace-relative path is empty, absolute or escapes the root.
    InvalidRelativePath {
        /// Offending input.
        input: String,
    },
    /// A block identity is not a UUID.
    InvalidBlockIdentity {
        /// Offending input.
        input: String,
    },
    /// `LineSpan` start/end must be >= 1.
    LineSpanNonPositive {
        /// Starting line (1-indexed).
        start_line: u32,
        /// Ending line (1-indexed).
        end_line: u32,
    },
    /// `LineSpan` start must be <= end.
    LineSpanStartAfterEnd {
        /// Starting line (1-indexed).
        start_line: u32,
        /// Ending line (1-indexed).
        end_line: u32,
    },
}

impl PrimitiveError {
    fn error_code(&self) -> ErrorCode {
        let code = match self {
            Self::EmptyCollectionName { .. }
            | Self::InvalidCollectionName { .. }
            | Self::DerivedCollectionNameInvalid { .. } => "invalid_collection_name",
            Self::InvalidEmbeddingProviderId { .. } => "invalid_embedding_provider_id",
            Self::InvalidRelativePath { .. } => "invalid_relative_path",
            Self::InvalidBlockIdentity { .. } => "invalid_block_identity",
            Self::LineSpanNonPositive { .. } | Self::LineSpanStartAfterEnd { .. } => {
                "invalid_line_span"
            },
        };
        ErrorCode::new("domain", code)
    }
}

impl fmt::Display for PrimitiveError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCollectionName { .. } => {
                formatter.write_str("CollectionName must be non-empty")
            },
            Self::InvalidCollectionName { .. } => {
                formatter.write_str("CollectionName must match /^[a-zA-Z][a-zA-Z0-9_]*$/")
            },
            Self::DerivedCollectionNameInvalid { .. } => {
                formatter.write_str("derived collection name is invalid")
            },
            Self::InvalidEmbeddingProviderId { .. } => {
                formatter.write_str("EmbeddingProviderId must be non-empty")
            },
            Self::InvalidRelativePath { input } => {
                write!(formatter, "path must be relative to the workspace root: {input}")
            },
            Self::InvalidBlockIdentity { input } => {
                write!(formatter, "block identity must be a UUID: {input}")
            },
            Self::LineSpanNonPositive { .. } => {
                formatter.write_str("LineSpan start_line/end_line must be >= 1")
            },
            Self::LineSpanStartAfterEnd { .. } => {
                formatter.write_str("LineSpan start_line must be <= end_line")
            },
        }
    }
}

impl std::error::Error for PrimitiveError {}

impl From<PrimitiveError> for ErrorEnvelope {
    fn from(error: PrimitiveError) -> Self {
        let envelope = if matches!(error, PrimitiveError::DerivedCollectionNameInvalid { .. }) {
            Self::invariant(error.error_code(), error.to_string())
        } else {
            Self::expected(error.error_code(), error.to_string())
        };

        match error {
            PrimitiveError::EmptyCollectionName { input_length }
            | PrimitiveError::InvalidEmbeddingProviderId { input_length } => {
                envelope.with_metadata("input_length", input_length.to_string())
            },
            PrimitiveError::InvalidCollectionName { input }
            | PrimitiveError::InvalidRelativePath { input }
            | PrimitiveError::InvalidBlockIdentity { input } => {
                envelope.with_metadata("input", input)
            },
            PrimitiveError::DerivedCollectionNameInvalid { candidate } => {
                envelope.with_metadata("candidate", candidate)
            },
            PrimitiveError::LineSpanNonPositive {
                start_line,
                end_line,
            }
            | PrimitiveError::LineSpanStartAfterEnd {
                start_line,
                end_line,
            } => envelope
                .with_metadata("start_line", start_line.to_string())
                .with_metadata("end_line", end_line.to_string()),
        }
    }
}

/// Identifier for a vector collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectionName(Box<str>);

impl CollectionName {
    /// Parse a collection name that satisfies `^[a-zA-Z][a-zA-Z0-9_]*$`.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PrimitiveError::EmptyCollectionName {
                input_length: raw.len(),
            });
        }
        if !is_valid_collection_name(trimmed) {
            return Err(PrimitiveError::InvalidCollectionName {
                input: trimmed.to_owned(),
            });
        }
        Ok(Self(Box::from(trimmed)))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CollectionName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for CollectionName {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Derive the per-workspace collection name `ws_{md5(abs root)[..16]}`.
pub fn derive_collection_name(
    workspace_root: impl AsRef<Path>,
) -> Result<CollectionName, PrimitiveError> {
    let root = workspace_root.as_ref();
    let absolute = std::path::absolute(root).unwrap_or_else(|_| root.to_path_buf());
    let digest = md5::compute(absolute.to_string_lossy().as_bytes());
    let hash = format!("{digest:x}");
    let candidate = format!("ws_{}", hash.get(..16).unwrap_or(&hash));

    CollectionName::parse(candidate.as_str())
        .map_err(|_| PrimitiveError::DerivedCollectionNameInvalid { candidate })
}

fn is_valid_collection_name(candidate: &str) -> bool {
    let mut chars = candidate.chars();
    chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}

/// Identifier for an embedding provider implementation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmbeddingProviderId(Box<str>);

impl EmbeddingProviderId {
    /// Parse a non-empty provider id.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(PrimitiveError::InvalidEmbeddingProviderId {
                input_length: raw.len(),
            });
        }
        Ok(Self(Box::from(trimmed)))
    }

    /// Access the underlying string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmbeddingProviderId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Workspace-relative file path with `/` separators.
///
/// Ordering is lexicographic on the normalized string, which keeps ledgers
/// and snapshots deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RelativePath(Box<str>);

impl RelativePath {
    /// Parse a relative path, normalizing `\` to `/` and dropping `.` segments.
    pub fn parse(input: impl AsRef<str>) -> Result<Self, PrimitiveError> {
        let raw = input.as_ref();
        let replaced = raw.replace('\\', "/");
        let mut segments = Vec::new();
        for segment in replaced.split('/') {
            match segment {
                "" | "." => {},
                ".." => {
                    return Err(PrimitiveError::InvalidRelativePath {
                        input: raw.to_owned(),
                    });
                },
                other => segments.push(other),
            }
        }
        if segments.is_empty() || replaced.starts_with('/') || has_drive_prefix(&replaced) {
            return Err(PrimitiveError::InvalidRelativePath {
                input: raw.to_owned(),
            });
        }
        Ok(Self(segments.join("/").into_boxed_str()))
    }

    /// Build from a path under `root`.
    pub fn from_root(root: &Path, path: &Path) -> Result<Self, PrimitiveError> {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => segments.push(part.to_string_lossy().into_owned()),
                Component::CurDir => {},
                _ => {
                    return Err(PrimitiveError::InvalidRelativePath {
                        input: path.to_string_lossy().into_owned(),
                    });
                },
            }
        }
        Self::parse(segments.join("/"))
    }

    /// Access the normalized path.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve against a workspace root.
    #[must_use]
    pub fn to_path(&self, root: &Path) -> std::path::PathBuf {
        self.0.split('/').fold(root.to_path_buf(), |acc, part| acc.join(part))
    }

    /// Returns true when the path equals `prefix` or lies beneath it.
    #[must_use]
    pub fn starts_with(&self, prefix: &str) -> bool {
        let prefix = prefix.trim().replace('\\', "/");
        let prefix = prefix.trim_matches('/');
        if prefix.is_empty() || prefix == "." {
            return true;
        }
        self.0
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
    }
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    matches!(bytes, [letter, b':', ..] if letter.is_ascii_alphabetic())
}

impl TryFrom<String> for RelativePath {
    type Error = PrimitiveError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<RelativePath> for String {
    fn from(value: RelativePath) -> Self {
        value.0.into_string()
    }
}

impl AsRef<str> for RelativePath {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for RelativePath {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}
