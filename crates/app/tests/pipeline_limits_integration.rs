//! Backpressure and retry bounds of the indexing pipeline.

mod common;

use code_index_adapters::{InMemoryIdentityLedger, LocalVectorStore};
use code_index_app::{EmbeddingClient, EmbeddingClientOptions, FailureKind, Indexer};
use code_index_domain::constants::{INITIAL_RETRY_DELAY_MS, MAX_BATCH_RETRIES};
use code_index_domain::{
    CodeBlock, EmbeddingBatch, EmbeddingLimits, EmbeddingProviderId, IndexerState, LineSpan,
    RelativePath,
};
use code_index_ports::{
    BoxFuture, EmbedBatchRequest, EmbeddingPort, EmbeddingProviderInfo, EmbeddingVector,
};
use code_index_shared::{ErrorClass, ErrorCode, ErrorEnvelope, RequestContext, Result};
use common::{RecordingStore, TempWorkspace};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stalled_writer_bounds_pending_batches() {
    let workspace = TempWorkspace::new("backpressure");
    for index in 0..40 {
        workspace.write(&format!("src/f{index:02}.rs"), &format!("fn f{index}() {{}}\n"));
    }
    let limits = EmbeddingLimits {
        max_items_per_batch: 1,
        ..EmbeddingLimits::default()
    };
    let store = Arc::new(RecordingStore::stalled(
        LocalVectorStore::in_memory(),
        Duration::from_millis(10),
    ));
    let deps = common::deps(
        common::hashing(limits),
        store.clone(),
        Arc::new(InMemoryIdentityLedger::new()),
    );
    let mut options = common::options(&workspace.root);
    options.max_pending_batches = 2;
    options.batch_concurrency = 8;
    options.parsing_concurrency = 4;

    let report = Indexer::new(deps, options)
        .run(&RequestContext::new_request())
        .await;

    assert_eq!(report.state, IndexerState::Completed);
    assert_eq!(report.summary.batches_dispatched, 40);
    assert_eq!(report.summary.blocks_upserted, 40);
    assert!(report.summary.peak_pending_batches >= 1);
    assert!(report.summary.peak_pending_batches <= 2);
    assert!(store.peak_concurrent_upserts() <= 2);
    assert_eq!(store.take().upserted.len(), 40);
}

/// Fails every request with the configured error and records when it was called.
struct FailingEmbedding {
    provider: EmbeddingProviderInfo,
    error: ErrorEnvelope,
    calls: Mutex<Vec<Instant>>,
}

impl FailingEmbedding {
    fn new(error: ErrorEnvelope) -> Self {
        Self {
            provider: EmbeddingProviderInfo {
                id: EmbeddingProviderId::parse("failing").expect("provider id"),
                name: "Failing".into(),
                model: "none".into(),
            },
            error,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<Instant> {
        self.calls.lock().expect("calls").clone()
    }
}

impl EmbeddingPort for FailingEmbedding {
    fn provider(&self) -> &EmbeddingProviderInfo {
        &self.provider
    }

    fn limits(&self) -> EmbeddingLimits {
        EmbeddingLimits::default()
    }

    fn embed_batch(
        &self,
        _ctx: &RequestContext,
        _request: EmbedBatchRequest,
    ) -> BoxFuture<'_, Result<Vec<EmbeddingVector>>> {
        self.calls.lock().expect("calls").push(Instant::now());
        let error = self.error.clone();
        Box::pin(async move { Err(error) })
    }

    fn detect_dimension(&self, _ctx: &RequestContext) -> BoxFuture<'_, Result<u32>> {
        Box::pin(async { Ok(common::DIMENSION) })
    }
}

fn one_block_batch() -> EmbeddingBatch {
    let block = CodeBlock::new(
        RelativePath::parse("src/lib.rs").expect("path"),
        LineSpan::new(1, 1).expect("span"),
        "fn main() {}\n".to_owned(),
        false,
    );
    EmbeddingBatch {
        total_token_estimate: block.token_estimate(),
        items: vec![block],
        oversized: false,
    }
}

#[tokio::test(start_paused = true)]
async fn transient_failures_are_retried_with_doubling_delays() {
    let port = Arc::new(FailingEmbedding::new(ErrorEnvelope::unexpected(
        ErrorCode::timeout(),
        "request timed out",
        ErrorClass::Retriable,
    )));
    let client = EmbeddingClient::new(port.clone(), EmbeddingClientOptions::default(), None);

    let failure = client
        .embed(&RequestContext::new_request(), &one_block_batch())
        .await
        .expect_err("always failing");

    assert_eq!(failure.kind, FailureKind::Transient);
    let calls = port.calls();
    assert_eq!(calls.len(), 1 + MAX_BATCH_RETRIES as usize);
    let gaps: Vec<Duration> = calls
        .windows(2)
        .map(|pair| pair[1].duration_since(pair[0]))
        .collect();
    let mut expected = Duration::from_millis(INITIAL_RETRY_DELAY_MS);
    for gap in &gaps {
        assert!(*gap >= expected, "gap {gap:?} shorter than {expected:?}");
        assert!(*gap < expected + Duration::from_millis(50));
        expected *= 2;
    }
}

#[tokio::test(start_paused = true)]
async fn rate_limits_are_not_retried() {
    let port = Arc::new(FailingEmbedding::new(ErrorEnvelope::unexpected(
        ErrorCode::rate_limited(),
        "slow down",
        ErrorClass::NonRetriable,
    )));
    let client = EmbeddingClient::new(port.clone(), EmbeddingClientOptions::default(), None);

    let failure = client
        .embed(&RequestContext::new_request(), &one_block_batch())
        .await
        .expect_err("rate limited");

    assert_eq!(failure.kind, FailureKind::RateLimited);
    assert_eq!(port.calls().len(), 1);
}

#[tokio::test]
async fn failed_batches_are_reported_without_failing_the_run() {
    let workspace = TempWorkspace::new("fatal-batch");
    workspace.write("src/lib.rs", "fn lib() {}\n");
    let port = Arc::new(FailingEmbedding::new(ErrorEnvelope::unexpected(
        ErrorCode::permission_denied(),
        "invalid api key",
        ErrorClass::NonRetriable,
    )));
    let ledger = Arc::new(InMemoryIdentityLedger::new());
    let deps = common::deps(
        port.clone(),
        Arc::new(LocalVectorStore::in_memory()),
        ledger.clone(),
    );

    let report = Indexer::new(deps, common::options(&workspace.root))
        .run(&RequestContext::new_request())
        .await;

    assert_eq!(report.state, IndexerState::Completed);
    assert_eq!(port.calls().len(), 1);
    assert_eq!(report.summary.batches_failed, 1);
    assert_eq!(report.summary.blocks_upserted, 0);
    let failure = report.summary.failures.first().expect("failure");
    assert_eq!(failure.kind, FailureKind::Fatal);
    assert_eq!(failure.blocks, 1);
    assert!(ledger.snapshot(&common::collection()).await.is_empty());
}
