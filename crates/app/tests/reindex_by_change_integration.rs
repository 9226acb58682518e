//! Watch-driven incremental reindexing.

mod common;

use code_index_adapters::{
    IgnoreMatcher, InMemoryIdentityLedger, LocalVectorStore, PollingChangeNotifier,
};
use code_index_app::{Indexer, RunReport, WatchOptions, watch_and_reindex};
use code_index_domain::{
    EmbeddingLimits, FileChangeEvent, FileChangeKind, IndexerState, RelativePath,
};
use code_index_ports::{BoxFuture, FileChangeNotifierPort, FileChangeStream};
use code_index_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use common::TempWorkspace;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Hands out a pre-filled channel on the first watch.
struct ChannelNotifier {
    stream: Mutex<Option<FileChangeStream>>,
}

impl FileChangeNotifierPort for ChannelNotifier {
    fn watch(
        &self,
        _ctx: &RequestContext,
        _root: PathBuf,
    ) -> BoxFuture<'_, Result<FileChangeStream>> {
        let stream = self.stream.lock().expect("stream").take();
        Box::pin(async move {
            stream.ok_or_else(|| {
                ErrorEnvelope::expected(ErrorCode::invalid_input(), "already watching")
            })
        })
    }
}

fn indexer(workspace: &TempWorkspace, ledger: Arc<InMemoryIdentityLedger>) -> Indexer {
    let deps = common::deps(
        common::hashing(EmbeddingLimits::default()),
        Arc::new(LocalVectorStore::in_memory()),
        ledger,
    );
    Indexer::new(deps, common::options(&workspace.root))
}

async fn ledger_paths(ledger: &InMemoryIdentityLedger) -> Vec<String> {
    ledger
        .snapshot(&common::collection())
        .await
        .into_keys()
        .map(|path| path.as_str().to_owned())
        .collect()
}

#[tokio::test]
async fn queued_events_are_applied_when_the_stream_closes() {
    let workspace = TempWorkspace::new("watch-channel");
    workspace.write("a.rs", "fn a() {}\n");
    workspace.write("b.rs", "fn b() {}\n");
    let ledger = Arc::new(InMemoryIdentityLedger::new());
    let indexer = indexer(&workspace, ledger.clone());
    let ctx = RequestContext::new_request();
    assert_eq!(indexer.run(&ctx).await.state, IndexerState::Completed);

    workspace.write("a.rs", "fn a() { todo!() }\n");
    workspace.remove("b.rs");
    workspace.write("c.rs", "fn c() {}\n");
    let (sender, receiver) = mpsc::channel(8);
    for (path, kind) in [
        ("a.rs", FileChangeKind::Modified),
        ("b.rs", FileChangeKind::Deleted),
        ("c.rs", FileChangeKind::Created),
    ] {
        let path = RelativePath::parse(path).expect("path");
        sender
            .send(FileChangeEvent::new(path, kind))
            .await
            .expect("send");
    }
    drop(sender);
    let notifier = ChannelNotifier {
        stream: Mutex::new(Some(receiver)),
    };

    let mut reports: Vec<RunReport> = Vec::new();
    watch_and_reindex(&ctx, &indexer, &notifier, WatchOptions::default(), |report| {
        reports.push(report.clone());
    })
    .await
    .expect("watch ends with the stream");

    assert_eq!(reports.len(), 1);
    let summary = &reports[0].summary;
    assert_eq!(reports[0].state, IndexerState::Completed);
    assert_eq!(summary.files_scanned, 2);
    assert_eq!(summary.files_indexed, 2);
    assert_eq!(summary.files_removed, 1);
    assert_eq!(ledger_paths(&ledger).await, vec!["a.rs", "c.rs"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn polling_notifier_picks_up_new_files() {
    let workspace = TempWorkspace::new("watch-poll");
    workspace.write("a.rs", "fn a() {}\n");
    let ledger = Arc::new(InMemoryIdentityLedger::new());
    let indexer = indexer(&workspace, ledger.clone());
    let ctx = RequestContext::new_request();
    assert_eq!(indexer.run(&ctx).await.state, IndexerState::Completed);

    let notifier = PollingChangeNotifier::new(
        Duration::from_millis(50),
        Arc::new(IgnoreMatcher::new(Vec::<String>::new())),
    );
    let options = WatchOptions {
        debounce: Duration::from_millis(100),
        ..WatchOptions::default()
    };
    let staged = workspace.state.join("b.rs");
    let target = workspace.root.join("b.rs");
    let writer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        tokio::fs::write(&staged, "fn b() {}\n").await?;
        tokio::fs::rename(&staged, &target).await
    });

    let watch_ctx = ctx.clone();
    let mut reports: Vec<RunReport> = Vec::new();
    let watched = tokio::time::timeout(
        Duration::from_secs(10),
        watch_and_reindex(&ctx, &indexer, &notifier, options, |report| {
            reports.push(report.clone());
            watch_ctx.cancel();
        }),
    )
    .await
    .expect("a segment within the timeout");
    writer.await.expect("writer task").expect("write b.rs");

    let error = watched.expect_err("cancelled after the first segment");
    assert!(error.is_cancelled());
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].summary.files_indexed, 1);
    assert_eq!(ledger_paths(&ledger).await, vec!["a.rs", "b.rs"]);
}
