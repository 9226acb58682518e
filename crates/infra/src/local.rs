//! Local command entry points over a resolved [`Workspace`].

use crate::{InfraResult, Workspace};
use code_index_app::{
    Indexer, ProgressCallback, RunReport, clear_index, semantic_search, watch_and_reindex,
};
use code_index_config::{to_pretty_json, to_pretty_toml};
use code_index_domain::{SearchRequest, SearchResult};
use code_index_shared::RequestContext;

/// Index the workspace; `force` ignores the ledger.
#[tracing::instrument(name = "cidx.index", skip_all, fields(collection = %workspace.collection()))]
pub async fn run_index_local(
    ctx: &RequestContext,
    workspace: &Workspace,
    force: bool,
    on_progress: Option<ProgressCallback>,
) -> InfraResult<RunReport> {
    let services = workspace.services(ctx).await?;
    let mut indexer = Indexer::new(services.indexer_deps(), workspace.indexer_options(force));
    if let Some(on_progress) = on_progress {
        indexer = indexer.with_progress(on_progress);
    }
    Ok(indexer.run(ctx).await)
}

/// Query the workspace index.
#[tracing::instrument(name = "cidx.search", skip_all, fields(collection = %workspace.collection()))]
pub async fn run_search_local(
    ctx: &RequestContext,
    workspace: &Workspace,
    request: SearchRequest,
) -> InfraResult<Vec<SearchResult>> {
    let services = workspace.services(ctx).await?;
    semantic_search(ctx, &services.search_deps(), workspace.search_input(request)).await
}

/// Drop the collection and the ledger of the workspace.
#[tracing::instrument(name = "cidx.clear", skip_all, fields(collection = %workspace.collection()))]
pub async fn run_clear_local(ctx: &RequestContext, workspace: &Workspace) -> InfraResult<()> {
    let services = workspace.services(ctx).await?;
    clear_index(ctx, &services.clear_deps(), workspace.collection()).await
}

/// Run one incremental pass, then reindex changed files until `ctx` is
/// cancelled. Every pass is reported through `on_report`.
#[tracing::instrument(name = "cidx.watch", skip_all, fields(collection = %workspace.collection()))]
pub async fn run_watch_local(
    ctx: &RequestContext,
    workspace: &Workspace,
    mut on_report: impl FnMut(&RunReport),
) -> InfraResult<()> {
    let services = workspace.services(ctx).await?;
    let indexer = Indexer::new(services.indexer_deps(), workspace.indexer_options(false));
    let initial = indexer.run(ctx).await;
    on_report(&initial);
    if let Some(error) = initial.error {
        return Err(error);
    }

    let notifier = workspace.notifier(&services);
    watch_and_reindex(ctx, &indexer, &notifier, workspace.watch_options(), on_report).await
}

/// Output formats of [`render_effective_config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigRenderFormat {
    /// Pretty TOML.
    Toml,
    /// Pretty JSON.
    Json,
}

/// Effective config after file and environment overrides.
pub fn render_effective_config(
    workspace: &Workspace,
    format: ConfigRenderFormat,
) -> InfraResult<String> {
    match format {
        ConfigRenderFormat::Toml => to_pretty_toml(workspace.config()),
        ConfigRenderFormat::Json => to_pretty_json(workspace.config()),
    }
}
