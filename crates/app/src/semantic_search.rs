//! Semantic search over an indexed collection.

use crate::embedding_client::EmbeddingClient;
use code_index_domain::constants::{DEFAULT_MAX_SEARCH_RESULTS, DEFAULT_SEARCH_MIN_SCORE};
use code_index_domain::{CollectionName, SearchRequest, SearchResult, compare_search_results};
use code_index_ports::{LoggerPort, VectorQuery, VectorStorePort, log_fields};
use code_index_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use std::sync::Arc;
use std::time::Instant;

/// Dependencies required by semantic search.
#[derive(Clone)]
pub struct SemanticSearchDeps {
    /// Query embedding path, with the same retry policy as indexing.
    pub client: EmbeddingClient,
    /// Vector store.
    pub vector_store: Arc<dyn VectorStorePort>,
    /// Optional logger.
    pub logger: Option<Arc<dyn LoggerPort>>,
}

/// Input payload for semantic search.
#[derive(Debug, Clone)]
pub struct SemanticSearchInput {
    /// Target collection.
    pub collection: CollectionName,
    /// Query, limit and filters.
    pub request: SearchRequest,
    /// Minimum score when the request carries none.
    pub default_min_score: f32,
    /// Upper bound on returned results.
    pub max_results: usize,
}

impl SemanticSearchInput {
    /// Input with the default threshold and result cap.
    pub const fn new(collection: CollectionName, request: SearchRequest) -> Self {
        Self {
            collection,
            request,
            default_min_score: DEFAULT_SEARCH_MIN_SCORE,
            max_results: DEFAULT_MAX_SEARCH_RESULTS,
        }
    }
}

/// Execute semantic search for the given input.
///
/// Results are ordered by descending score; equal scores keep the store's
/// order. A collection that was never indexed yields no results.
pub async fn semantic_search(
    ctx: &RequestContext,
    deps: &SemanticSearchDeps,
    input: SemanticSearchInput,
) -> Result<Vec<SearchResult>> {
    let started_at = Instant::now();
    let SemanticSearchInput {
        collection,
        request,
        default_min_score,
        max_results,
    } = input;

    let query = request.query.trim();
    if query.is_empty() {
        return Err(invalid("query must be non-empty"));
    }
    if request.limit == Some(0) {
        return Err(invalid("limit must be a positive number"));
    }
    let min_score = request.min_score.unwrap_or(default_min_score);
    if !min_score.is_finite() {
        return Err(invalid("minScore must be a finite number"));
    }
    let top_k = request
        .limit
        .unwrap_or(max_results)
        .min(max_results)
        .max(1);

    if !deps
        .vector_store
        .has_collection(ctx, collection.clone())
        .await?
    {
        if let Some(logger) = deps.logger.as_ref() {
            logger.info(
                "search.collection_missing",
                "collection not indexed; returning no results",
                Some(log_fields! { "collection" => collection.as_str() }),
            );
        }
        return Ok(Vec::new());
    }

    let prefix = request.path_prefix.as_deref();
    // The prefix filter runs after the store query, so fetch the full cap.
    let fetch = if prefix.is_some() {
        max_results.max(top_k)
    } else {
        top_k
    };
    let vector = deps.client.embed_query(ctx, query).await?;
    let matches = deps
        .vector_store
        .query(
            ctx,
            collection.clone(),
            VectorQuery {
                vector,
                top_k: fetch,
                score_threshold: Some(min_score),
            },
        )
        .await?;

    let mut results: Vec<SearchResult> = matches
        .into_iter()
        .filter(|hit| hit.score >= min_score)
        .filter(|hit| prefix.is_none_or(|prefix| hit.payload.file_path.starts_with(prefix)))
        .map(|hit| SearchResult {
            file_path: hit.payload.file_path,
            start_line: hit.payload.start_line,
            end_line: hit.payload.end_line,
            score: hit.score,
            content: hit.payload.content,
        })
        .collect();
    results.sort_by(compare_search_results);
    results.truncate(top_k);

    if let Some(logger) = deps.logger.as_ref() {
        logger.info(
            "search.completed",
            "semantic search completed",
            Some(log_fields! {
                "collection" => collection.as_str(),
                "results" => results.len(),
                "topK" => top_k,
                "durationMs" => u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX),
            }),
        );
    }
    Ok(results)
}

fn invalid(message: &str) -> ErrorEnvelope {
    ErrorEnvelope::expected(ErrorCode::invalid_input(), message)
}
