//! Run summary and failure classification.

use code_index_domain::{IndexerState, RelativePath};
use code_index_shared::{ErrorCode, ErrorEnvelope};
use serde::Serialize;

/// Why a file, batch or directory was not fully processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Retries exhausted on a retriable error.
    Transient,
    /// Provider rate limit; not retried.
    RateLimited,
    /// Auth, quota or request error; not retried.
    Fatal,
    /// Item above the provider's per-item ceiling.
    Oversized,
    /// The run was cancelled.
    Cancelled,
    /// Vector store write or delete failed after retries.
    VectorStore,
    /// File could not be read or chunked.
    FileRead,
    /// Directory could not be listed.
    DirUnreadable,
    /// Identity ledger read or write failed.
    Ledger,
}

impl FailureKind {
    /// Classify an embedding failure.
    pub fn classify(error: &ErrorEnvelope) -> Self {
        if error.is_cancelled() {
            Self::Cancelled
        } else if error.code == ErrorCode::rate_limited() {
            Self::RateLimited
        } else if error.code == ErrorCode::new("embedding", "oversized_item") {
            Self::Oversized
        } else if error.is_retriable() {
            Self::Transient
        } else {
            Self::Fatal
        }
    }
}

/// One accumulated failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    /// Failure kind.
    pub kind: FailureKind,
    /// Error code, `namespace:code`.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Affected file or directory, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<RelativePath>,
    /// Blocks affected.
    pub blocks: u64,
}

impl FailureRecord {
    /// Record for `error`.
    pub fn new(kind: FailureKind, error: &ErrorEnvelope) -> Self {
        Self {
            kind,
            code: error.code.to_string(),
            message: error.message.clone(),
            path: None,
            blocks: 0,
        }
    }

    /// Attach the affected path.
    #[must_use]
    pub fn with_path(mut self, path: RelativePath) -> Self {
        self.path = Some(path);
        self
    }

    /// Attach the affected block count.
    #[must_use]
    pub const fn with_blocks(mut self, blocks: u64) -> Self {
        self.blocks = blocks;
        self
    }
}

/// Counters of one indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Candidate files yielded by the scan.
    pub files_scanned: u64,
    /// Files above the size ceiling.
    pub files_skipped: u64,
    /// Files whose ledger entry was rewritten.
    pub files_indexed: u64,
    /// Files whose blocks all matched the ledger.
    pub files_unchanged: u64,
    /// Vanished or deleted files purged from the index.
    pub files_removed: u64,
    /// Blocks embedded and written.
    pub blocks_upserted: u64,
    /// Blocks whose identity and hash matched the ledger.
    pub blocks_unchanged: u64,
    /// Stale identities deleted from the store.
    pub blocks_deleted: u64,
    /// Embedding batches dispatched.
    pub batches_dispatched: u64,
    /// Batches that failed to embed or write.
    pub batches_failed: u64,
    /// Oversized items truncated under the truncate policy.
    pub truncated_items: u64,
    /// Highest number of batches in flight at once.
    pub peak_pending_batches: u64,
    /// The scan stopped at `max_files`.
    pub scan_truncated: bool,
    /// Per-file and per-batch failures.
    pub failures: Vec<FailureRecord>,
}

impl RunSummary {
    /// Whether any per-file or per-batch failure was recorded.
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    pub(crate) fn record(&mut self, failure: FailureRecord) {
        self.failures.push(failure);
    }
}

pub(crate) fn as_count(len: usize) -> u64 {
    u64::try_from(len).unwrap_or(u64::MAX)
}

/// Terminal state of a run with its summary.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    /// `Completed` or `Failed`.
    pub state: IndexerState,
    /// Counters, partial when the run failed.
    pub summary: RunSummary,
    /// Run-fatal error, present when `state` is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorEnvelope>,
}

impl RunReport {
    pub(crate) const fn completed(summary: RunSummary) -> Self {
        Self {
            state: IndexerState::Completed,
            summary,
            error: None,
        }
    }

    pub(crate) const fn failed(summary: RunSummary, error: ErrorEnvelope) -> Self {
        Self {
            state: IndexerState::Failed,
            summary,
            error: Some(error),
        }
    }

    /// Whether the run ended because it was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.error.as_ref().is_some_and(ErrorEnvelope::is_cancelled)
    }
}
