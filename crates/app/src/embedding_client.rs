//! Embedding client: whole-batch retries, the oversized-item policy and
//! failure classification on top of an [`EmbeddingPort`].

use crate::run_summary::FailureKind;
use code_index_domain::constants::{CHARS_PER_TOKEN, INITIAL_RETRY_DELAY_MS, MAX_BATCH_RETRIES};
use code_index_domain::{EmbeddingBatch, IndexedVector, OversizedItemPolicy};
use code_index_ports::{EmbeddingPort, EmbeddingVector, LoggerPort, log_fields};
use code_index_shared::{
    ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result, RetryPolicy,
    retry_async_with_observer,
};
use std::sync::Arc;

/// Retry and oversized-item settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbeddingClientOptions {
    /// Backoff applied to whole batches.
    pub retry: RetryPolicy,
    /// What to do with items above the per-item ceiling.
    pub oversized_policy: OversizedItemPolicy,
}

impl Default for EmbeddingClientOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::exponential(MAX_BATCH_RETRIES, INITIAL_RETRY_DELAY_MS),
            oversized_policy: OversizedItemPolicy::default(),
        }
    }
}

/// Vectors of one batch, in input order.
#[derive(Debug, Clone)]
pub struct EmbeddedBatch {
    /// One vector per batch item.
    pub vectors: Vec<IndexedVector>,
    /// Items cut down under [`OversizedItemPolicy::Truncate`].
    pub truncated_items: u64,
}

/// A batch that could not be embedded.
#[derive(Debug, Clone)]
pub struct BatchFailure {
    /// Classified failure kind.
    pub kind: FailureKind,
    /// Final error, with an `attempts` entry when retries ran.
    pub error: ErrorEnvelope,
}

impl BatchFailure {
    fn from_error(error: ErrorEnvelope) -> Self {
        Self {
            kind: FailureKind::classify(&error),
            error,
        }
    }
}

/// Embedding client shared by indexing and search.
#[derive(Clone)]
pub struct EmbeddingClient {
    embedding: Arc<dyn EmbeddingPort>,
    options: EmbeddingClientOptions,
    logger: Option<Arc<dyn LoggerPort>>,
}

impl EmbeddingClient {
    /// Client over `embedding`.
    pub fn new(
        embedding: Arc<dyn EmbeddingPort>,
        options: EmbeddingClientOptions,
        logger: Option<Arc<dyn LoggerPort>>,
    ) -> Self {
        Self {
            embedding,
            options,
            logger,
        }
    }

    /// Underlying port.
    pub fn port(&self) -> &Arc<dyn EmbeddingPort> {
        &self.embedding
    }

    /// Embed every item of `batch`.
    pub async fn embed(
        &self,
        ctx: &RequestContext,
        batch: &EmbeddingBatch,
    ) -> std::result::Result<EmbeddedBatch, BatchFailure> {
        let mut truncated_items = 0;
        let texts: Vec<String> = if batch.oversized {
            match self.options.oversized_policy {
                OversizedItemPolicy::Reject => {
                    return Err(BatchFailure {
                        kind: FailureKind::Oversized,
                        error: self.oversized_error(batch),
                    });
                },
                OversizedItemPolicy::Truncate => {
                    let max_chars = self.max_item_chars();
                    batch
                        .items
                        .iter()
                        .map(|item| match truncate_chars(&item.content, max_chars) {
                            Some(cut) => {
                                truncated_items += 1;
                                self.warn_truncated(item.file_path.as_str(), item.char_len());
                                cut.to_owned()
                            },
                            None => item.content.clone(),
                        })
                        .collect()
                },
            }
        } else {
            batch.items.iter().map(|item| item.content.clone()).collect()
        };

        let vectors = self
            .embed_texts(ctx, texts)
            .await
            .map_err(BatchFailure::from_error)?;
        let vectors = batch
            .items
            .iter()
            .zip(vectors)
            .map(|(item, vector)| IndexedVector::new(item, vector.into_inner()))
            .collect();
        Ok(EmbeddedBatch {
            vectors,
            truncated_items,
        })
    }

    /// Embed a single search query.
    pub async fn embed_query(&self, ctx: &RequestContext, query: &str) -> Result<Vec<f32>> {
        let vectors = self.embed_texts(ctx, vec![query.to_owned()]).await?;
        vectors
            .into_iter()
            .next()
            .map(EmbeddingVector::into_inner)
            .ok_or_else(|| vector_count_mismatch(1, 0))
    }

    async fn embed_texts(
        &self,
        ctx: &RequestContext,
        texts: Vec<String>,
    ) -> Result<Vec<EmbeddingVector>> {
        let expected = texts.len();
        let embedding = &self.embedding;
        let mut call = || {
            let texts = texts.clone();
            async move {
                let vectors = embedding.embed_batch(ctx, texts.into()).await?;
                if vectors.len() != expected {
                    return Err(vector_count_mismatch(expected, vectors.len()));
                }
                Ok(vectors)
            }
        };
        retry_async_with_observer(
            ctx,
            self.options.retry,
            "embedding.embed_batch",
            &mut call,
            |attempt, error, delay| {
                if let Some(logger) = self.logger.as_ref() {
                    logger.warn(
                        "embedding.batch.retry",
                        "embedding attempt failed; retrying",
                        Some(log_fields! {
                            "attempt" => attempt,
                            "code" => error.code.to_string(),
                            "delayMs" => u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "items" => expected,
                        }),
                    );
                }
            },
        )
        .await
    }

    fn max_item_chars(&self) -> usize {
        let limits = self.embedding.limits();
        limits
            .max_item_tokens
            .min(limits.max_batch_tokens)
            .saturating_mul(CHARS_PER_TOKEN)
    }

    fn oversized_error(&self, batch: &EmbeddingBatch) -> ErrorEnvelope {
        let mut error = ErrorEnvelope::expected(
            ErrorCode::new("embedding", "oversized_item"),
            "item exceeds the provider's per-item token limit",
        )
        .with_metadata("tokens", batch.total_token_estimate.to_string())
        .with_metadata("maxItemTokens", self.embedding.limits().max_item_tokens.to_string());
        if let Some(item) = batch.items.first() {
            error = error.with_metadata("path", item.file_path.as_str());
        }
        error
    }

    fn warn_truncated(&self, path: &str, chars: usize) {
        if let Some(logger) = self.logger.as_ref() {
            logger.warn(
                "embedding.item.truncated",
                "oversized item truncated before embedding",
                Some(log_fields! {
                    "path" => path,
                    "chars" => chars,
                    "maxChars" => self.max_item_chars(),
                }),
            );
        }
    }
}

/// Prefix of `text` with at most `max_chars` characters, or `None` if it
/// already fits.
fn truncate_chars(text: &str, max_chars: usize) -> Option<&str> {
    text.char_indices()
        .nth(max_chars)
        .and_then(|(byte, _)| text.get(..byte))
}

fn vector_count_mismatch(expected: usize, actual: usize) -> ErrorEnvelope {
    ErrorEnvelope::unexpected(
        ErrorCode::new("embedding", "vector_count_mismatch"),
        format!("expected {expected} vectors, provider returned {actual}"),
        ErrorClass::Retriable,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use code_index_domain::{CodeBlock, EmbeddingLimits, LineSpan, RelativePath};
    use code_index_ports::{
        BoxFuture, EmbedBatchRequest, EmbeddingProviderId, EmbeddingProviderInfo,
    };
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Embedder failing with a fixed error for the first `failures` calls.
    struct FlakyEmbedding {
        provider: EmbeddingProviderInfo,
        limits: EmbeddingLimits,
        failures: usize,
        error: ErrorEnvelope,
        calls: AtomicUsize,
        seen: Mutex<Vec<Vec<String>>>,
    }

    impl FlakyEmbedding {
        fn new(failures: usize, error: ErrorEnvelope) -> Self {
            Self {
                provider: EmbeddingProviderInfo {
                    id: EmbeddingProviderId::parse("test").expect("provider id"),
                    name: "Test".into(),
                    model: "test".into(),
                },
                limits: EmbeddingLimits::default().with_max_item_tokens(10),
                failures,
                error,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl EmbeddingPort for FlakyEmbedding {
        fn provider(&self) -> &EmbeddingProviderInfo {
            &self.provider
        }

        fn limits(&self) -> EmbeddingLimits {
            self.limits
        }

        fn embed_batch(
            &self,
            _ctx: &RequestContext,
            request: EmbedBatchRequest,
        ) -> BoxFuture<'_, Result<Vec<EmbeddingVector>>> {
            Box::pin(async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst);
                self.seen.lock().expect("seen lock").push(request.texts.clone());
                if call < self.failures {
                    return Err(self.error.clone());
                }
                Ok(request
                    .texts
                    .iter()
                    .map(|text| EmbeddingVector::new(vec![text.chars().count() as f32, 1.0]))
                    .collect())
            })
        }
    }

    fn batch(contents: &[&str], oversized: bool) -> EmbeddingBatch {
        let items: Vec<CodeBlock> = contents
            .iter()
            .enumerate()
            .map(|(index, content)| {
                let line = u32::try_from(index + 1).expect("line");
                CodeBlock::new(
                    RelativePath::parse("src/a.rs").expect("path"),
                    LineSpan::new(line, line).expect("span"),
                    (*content).to_owned(),
                    false,
                )
            })
            .collect();
        let total_token_estimate = items.iter().map(CodeBlock::token_estimate).sum();
        EmbeddingBatch {
            items,
            total_token_estimate,
            oversized,
        }
    }

    fn fast_retry() -> EmbeddingClientOptions {
        EmbeddingClientOptions {
            retry: RetryPolicy::exponential(3, 1),
            ..EmbeddingClientOptions::default()
        }
    }

    fn transient() -> ErrorEnvelope {
        ErrorEnvelope::unexpected(
            ErrorCode::new("core", "dependency_unavailable"),
            "503",
            ErrorClass::Retriable,
        )
    }

    #[tokio::test]
    async fn transient_failures_are_retried_until_success() -> Result<()> {
        let port = Arc::new(FlakyEmbedding::new(2, transient()));
        let client = EmbeddingClient::new(port.clone(), fast_retry(), None);
        let ctx = RequestContext::new_request();
        let embedded = client
            .embed(&ctx, &batch(&["ab", "abcd"], false))
            .await
            .map_err(|failure| failure.error)?;
        assert_eq!(port.calls(), 3);
        let first: Vec<f32> = embedded.vectors.iter().map(|vector| vector.embedding[0]).collect();
        assert_eq!(first, vec![2.0, 4.0]);
        assert_eq!(embedded.vectors[1].payload.start_line, 2);
        Ok(())
    }

    #[tokio::test]
    async fn rate_limit_fails_fast() {
        let rate_limited = ErrorEnvelope::unexpected(
            ErrorCode::rate_limited(),
            "429",
            ErrorClass::NonRetriable,
        );
        let port = Arc::new(FlakyEmbedding::new(usize::MAX, rate_limited));
        let client = EmbeddingClient::new(port.clone(), fast_retry(), None);
        let ctx = RequestContext::new_request();
        let Err(failure) = client.embed(&ctx, &batch(&["x"], false)).await else {
            panic!("rate limit must fail");
        };
        assert_eq!(failure.kind, FailureKind::RateLimited);
        assert_eq!(port.calls(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_are_transient_failures() {
        let port = Arc::new(FlakyEmbedding::new(usize::MAX, transient()));
        let client = EmbeddingClient::new(port.clone(), fast_retry(), None);
        let ctx = RequestContext::new_request();
        let Err(failure) = client.embed(&ctx, &batch(&["x"], false)).await else {
            panic!("always failing provider must fail");
        };
        assert_eq!(failure.kind, FailureKind::Transient);
        assert_eq!(failure.error.metadata_value("attempts"), Some("4"));
        assert_eq!(port.calls(), 4);
    }

    #[tokio::test]
    async fn oversized_batch_is_rejected_without_a_call() {
        let port = Arc::new(FlakyEmbedding::new(0, transient()));
        let client = EmbeddingClient::new(port.clone(), fast_retry(), None);
        let ctx = RequestContext::new_request();
        let Err(failure) = client.embed(&ctx, &batch(&[&"y".repeat(100)], true)).await else {
            panic!("reject policy must fail");
        };
        assert_eq!(failure.kind, FailureKind::Oversized);
        assert_eq!(failure.error.code, ErrorCode::new("embedding", "oversized_item"));
        assert_eq!(port.calls(), 0);
    }

    #[tokio::test]
    async fn truncate_policy_cuts_on_char_boundary() -> Result<()> {
        let port = Arc::new(FlakyEmbedding::new(0, transient()));
        let options = EmbeddingClientOptions {
            oversized_policy: OversizedItemPolicy::Truncate,
            ..fast_retry()
        };
        let client = EmbeddingClient::new(port.clone(), options, None);
        let ctx = RequestContext::new_request();
        let content = "é".repeat(100);
        let embedded = client
            .embed(&ctx, &batch(&[&content], true))
            .await
            .map_err(|failure| failure.error)?;
        assert_eq!(embedded.truncated_items, 1);
        let seen = port.seen.lock().expect("seen lock").clone();
        assert_eq!(seen, vec![vec!["é".repeat(40)]]);
        assert_eq!(embedded.vectors[0].payload.content, content);
        Ok(())
    }

    #[tokio::test]
    async fn query_embedding_returns_single_vector() -> Result<()> {
        let port = Arc::new(FlakyEmbedding::new(0, transient()));
        let client = EmbeddingClient::new(port, fast_retry(), None);
        let ctx = RequestContext::new_request();
        assert_eq!(client.embed_query(&ctx, "abc").await?, vec![3.0, 1.0]);
        Ok(())
    }

    #[test]
    fn truncation_keeps_short_text() {
        assert_eq!(truncate_chars("abc", 3), None);
        assert_eq!(truncate_chars("abcd", 3), Some("abc"));
    }
}
