//! Pipeline tuning constants.
//!
//! These are the defaults behind every configurable limit; the config crate
//! exposes most of them as overridable settings.

use uuid::Uuid;

/// Target upper size of a code block, in characters.
pub const MAX_BLOCK_CHARS: usize = 1000;

/// Blocks smaller than this are merged with neighbours where possible.
pub const MIN_BLOCK_CHARS: usize = 50;

/// Minimum size of the trailing block of a file.
pub const MIN_CHUNK_REMAINDER_CHARS: usize = 200;

/// Allowed overshoot above [`MAX_BLOCK_CHARS`] before a segment is split.
pub const MAX_CHARS_TOLERANCE_FACTOR: f64 = 1.15;

/// Files larger than this are skipped by the scanner.
pub const MAX_FILE_SIZE_BYTES: u64 = 1024 * 1024;

/// Maximum number of files enumerated in one scan.
pub const DEFAULT_MAX_FILES: usize = 50_000;

/// Characters per estimated token.
pub const CHARS_PER_TOKEN: usize = 4;

/// Token budget of a single embedding request.
pub const MAX_BATCH_TOKENS: usize = 100_000;

/// Per-item token ceiling for OpenAI-compatible and Ollama providers.
pub const MAX_ITEM_TOKENS: usize = 8191;

/// Per-item token ceiling for Gemini.
pub const GEMINI_MAX_ITEM_TOKENS: usize = 2048;

/// Pending change events that force a flush; also the default item cap per batch.
pub const BATCH_SEGMENT_THRESHOLD: usize = 60;

/// Retries after the first attempt of an embedding or vector-store call.
pub const MAX_BATCH_RETRIES: u32 = 3;

/// First backoff delay; doubles on each retry.
pub const INITIAL_RETRY_DELAY_MS: u64 = 500;

/// Parse worker pool size.
pub const PARSING_CONCURRENCY: usize = 10;

/// Embedding worker pool size.
pub const BATCH_PROCESSING_CONCURRENCY: usize = 10;

/// Upper bound on in-flight embedding batches.
pub const MAX_PENDING_BATCHES: usize = 20;

/// Default minimum similarity score for search results.
pub const DEFAULT_SEARCH_MIN_SCORE: f32 = 0.4;

/// Hard cap on search results per query.
pub const DEFAULT_MAX_SEARCH_RESULTS: usize = 50;

/// Timeout for one embedding request.
pub const DEFAULT_EMBEDDING_TIMEOUT_MS: u64 = 60_000;

/// Timeout for one vector-store request.
pub const DEFAULT_VECTOR_STORE_TIMEOUT_MS: u64 = 30_000;

/// Quiet period before coalesced file changes are processed.
pub const DEFAULT_WATCH_DEBOUNCE_MS: u64 = 500;

/// Poll interval of the polling change notifier.
pub const DEFAULT_WATCH_POLL_INTERVAL_MS: u64 = 2000;

/// UUIDv5 namespace for block identities.
pub const BLOCK_IDENTITY_NAMESPACE: Uuid =
    Uuid::from_u128(0xf47a_c10b_58cc_4372_a567_0e02_b2c3_d479);

/// Directory names never descended into.
pub const DEFAULT_IGNORED_DIRS: &[&str] = &[
    "node_modules",
    "__pycache__",
    "env",
    "venv",
    ".venv",
    "target",
    "dist",
    "out",
    "build",
    "bundle",
    "vendor",
    "tmp",
    "temp",
    "deps",
    "pkg",
    "Pods",
    ".git",
];

/// File extensions indexed by default (without the leading dot).
pub const DEFAULT_SUPPORTED_EXTENSIONS: &[&str] = &[
    "rs", "go", "java", "js", "jsx", "mjs", "cjs", "ts", "tsx", "py", "c", "h", "cpp", "cc",
    "cxx", "hpp", "hh", "cs", "rb", "php", "kt", "swift", "scala", "sh", "md", "markdown",
];

/// [`MAX_CHARS_TOLERANCE_FACTOR`] as an integer percentage.
pub const MAX_CHARS_TOLERANCE_PERCENT: usize = 115;

/// Ceiling used by the chunker: `max_block_chars * MAX_CHARS_TOLERANCE_FACTOR`.
#[must_use]
pub const fn max_block_ceiling(max_block_chars: usize) -> usize {
    max_block_chars.saturating_mul(MAX_CHARS_TOLERANCE_PERCENT) / 100
}
