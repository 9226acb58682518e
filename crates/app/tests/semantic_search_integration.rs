//! Search over a freshly indexed workspace.

mod common;

use code_index_adapters::{InMemoryIdentityLedger, LocalVectorStore};
use code_index_app::{
    EmbeddingClient, EmbeddingClientOptions, Indexer, SemanticSearchDeps, SemanticSearchInput,
    semantic_search,
};
use code_index_domain::{EmbeddingLimits, IndexerState, SearchRequest};
use code_index_shared::{RequestContext, Result};
use common::TempWorkspace;
use std::sync::Arc;

const PARSER: &str = "pub fn parse_config(path: &str) -> Config {\n    Config::load(path)\n}\n";
const RENDER: &str = "def render_mesh(mesh, shader):\n    return shader.draw(mesh)\n";
const NOTES: &str = "# Release notes\n\nThe parser now reads config files lazily.\n";

async fn indexed_workspace() -> (TempWorkspace, SemanticSearchDeps) {
    let workspace = TempWorkspace::new("search");
    workspace.write("src/config/parser.rs", PARSER);
    workspace.write("tools/render.py", RENDER);
    workspace.write("docs/notes.md", NOTES);

    let embedding = common::hashing(EmbeddingLimits::default());
    let store = Arc::new(LocalVectorStore::in_memory());
    let deps = common::deps(
        embedding.clone(),
        store.clone(),
        Arc::new(InMemoryIdentityLedger::new()),
    );
    let report = Indexer::new(deps, common::options(&workspace.root))
        .run(&RequestContext::new_request())
        .await;
    assert_eq!(report.state, IndexerState::Completed);

    let search = SemanticSearchDeps {
        client: EmbeddingClient::new(embedding, EmbeddingClientOptions::default(), None),
        vector_store: store,
        logger: None,
    };
    (workspace, search)
}

#[tokio::test]
async fn identical_text_ranks_first() -> Result<()> {
    let (_workspace, deps) = indexed_workspace().await;
    let ctx = RequestContext::new_request();

    let results = semantic_search(
        &ctx,
        &deps,
        SemanticSearchInput::new(common::collection(), SearchRequest::new(RENDER)),
    )
    .await?;

    let top = results.first().expect("a result");
    assert_eq!(top.file_path.as_str(), "tools/render.py");
    assert!(top.score > 0.99);
    assert!(results.windows(2).all(|pair| pair[0].score >= pair[1].score));
    assert!(results.iter().all(|result| result.score >= 0.4));
    Ok(())
}

#[tokio::test]
async fn path_prefix_and_limit_narrow_the_results() -> Result<()> {
    let (_workspace, deps) = indexed_workspace().await;
    let ctx = RequestContext::new_request();
    let mut request = SearchRequest::new(PARSER);
    request.path_prefix = Some("docs".to_owned());
    request.min_score = Some(-1.0);
    request.limit = Some(1);

    let results = semantic_search(
        &ctx,
        &deps,
        SemanticSearchInput::new(common::collection(), request),
    )
    .await?;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].file_path.as_str(), "docs/notes.md");
    Ok(())
}
