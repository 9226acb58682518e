//! Search request and result types.

use crate::primitives::RelativePath;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A semantic search request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    /// Natural-language or code query.
    pub query: String,
    /// Requested result count; capped at the configured maximum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    /// Minimum score override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_score: Option<f32>,
    /// Keep only results under this workspace-relative directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_prefix: Option<String>,
}

impl SearchRequest {
    /// A request with default limit and threshold.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: None,
            min_score: None,
            path_prefix: None,
        }
    }
}

/// A single search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Workspace-relative path of the matching block.
    pub file_path: RelativePath,
    /// First line of the block.
    pub start_line: u32,
    /// Last line of the block.
    pub end_line: u32,
    /// Similarity score; higher is closer.
    pub score: f32,
    /// Block text.
    pub content: String,
}

/// Ordering by descending score. Ties compare equal so a stable sort keeps
/// the store's order.
#[must_use]
pub fn compare_search_results(a: &SearchResult, b: &SearchResult) -> Ordering {
    b.score.total_cmp(&a.score)
}
