//! Search command handler.

use crate::CliOutput;
use crate::error::{CliError, ExitCode};
use crate::format::{OutputFormat, render_results};
use clap::Args;
use code_index_domain::SearchRequest;
use code_index_infra::{Workspace, run_search_local};
use code_index_shared::RequestContext;

/// Search flags.
#[derive(Debug, Clone, Args)]
pub struct SearchArgs {
    /// Natural-language or code query.
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,
    /// Maximum number of results (capped by `search.maxResults`).
    #[arg(long)]
    pub limit: Option<usize>,
    /// Minimum score; defaults to `search.minScore`.
    #[arg(long)]
    pub min_score: Option<f32>,
    /// Keep only results under this workspace-relative directory.
    #[arg(long)]
    pub path_prefix: Option<String>,
}

impl SearchArgs {
    fn to_request(&self) -> SearchRequest {
        let mut request = SearchRequest::new(self.query.join(" "));
        request.limit = self.limit;
        request.min_score = self.min_score;
        request.path_prefix.clone_from(&self.path_prefix);
        request
    }
}

/// Run the search command.
pub async fn run_search(
    ctx: &RequestContext,
    workspace: &Workspace,
    format: OutputFormat,
    args: &SearchArgs,
) -> Result<CliOutput, CliError> {
    let results = run_search_local(ctx, workspace, args.to_request()).await?;
    Ok(CliOutput {
        stdout: render_results(format, &results)?,
        exit_code: ExitCode::Ok,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_words_are_joined() {
        let args = SearchArgs {
            query: vec!["parse".to_owned(), "config".to_owned()],
            limit: Some(3),
            min_score: None,
            path_prefix: Some("src".to_owned()),
        };
        let request = args.to_request();
        assert_eq!(request.query, "parse config");
        assert_eq!(request.limit, Some(3));
        assert_eq!(request.min_score, None);
        assert_eq!(request.path_prefix.as_deref(), Some("src"));
    }
}
