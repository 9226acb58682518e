//! Clear command handler.

use crate::CliOutput;
use crate::error::{CliError, ExitCode};
use crate::format::OutputFormat;
use code_index_infra::{Workspace, run_clear_local};
use code_index_shared::RequestContext;

/// Run the clear command.
pub async fn run_clear(
    ctx: &RequestContext,
    workspace: &Workspace,
    format: OutputFormat,
) -> Result<CliOutput, CliError> {
    run_clear_local(ctx, workspace).await?;
    let collection = workspace.collection().as_str();
    let stdout = match format {
        OutputFormat::Json => {
            let payload = serde_json::json!({ "status": "cleared", "collection": collection });
            let mut out = serde_json::to_string(&payload)?;
            out.push('\n');
            out
        },
        OutputFormat::Text => format!("cleared collection {collection}\n"),
    };
    Ok(CliOutput {
        stdout,
        exit_code: ExitCode::Ok,
    })
}
