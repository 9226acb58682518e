//! Embedding batches and the limits that shape them.

use crate::block::CodeBlock;
use crate::constants::{BATCH_SEGMENT_THRESHOLD, MAX_BATCH_TOKENS, MAX_ITEM_TOKENS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Token and item budgets of an embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingLimits {
    /// Largest estimated token count of a single input.
    pub max_item_tokens: usize,
    /// Largest summed token estimate of one request.
    pub max_batch_tokens: usize,
    /// Largest number of inputs in one request.
    pub max_items_per_batch: usize,
}

impl Default for EmbeddingLimits {
    fn default() -> Self {
        Self {
            max_item_tokens: MAX_ITEM_TOKENS,
            max_batch_tokens: MAX_BATCH_TOKENS,
            max_items_per_batch: BATCH_SEGMENT_THRESHOLD,
        }
    }
}

impl EmbeddingLimits {
    /// Same limits with a different per-item ceiling.
    #[must_use]
    pub const fn with_max_item_tokens(mut self, max_item_tokens: usize) -> Self {
        self.max_item_tokens = max_item_tokens;
        self
    }
}

/// What to do with a block whose estimate exceeds `max_item_tokens`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OversizedItemPolicy {
    /// Fail the batch without calling the provider.
    #[default]
    Reject,
    /// Truncate the text to the item ceiling and embed it.
    Truncate,
}

impl OversizedItemPolicy {
    /// Returns the canonical string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Truncate => "truncate",
        }
    }
}

impl fmt::Display for OversizedItemPolicy {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Ordered blocks sent to the embedding provider in one request.
///
/// Unless `oversized` is set, the summed estimate stays within the batch
/// budget and every item within the per-item budget. An oversized batch
/// always holds exactly one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddingBatch {
    /// Blocks in input order.
    pub items: Vec<CodeBlock>,
    /// Sum of the items' token estimates.
    pub total_token_estimate: usize,
    /// Single item over the per-item ceiling.
    pub oversized: bool,
}

impl EmbeddingBatch {
    /// Number of blocks in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns true when the batch holds no blocks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
