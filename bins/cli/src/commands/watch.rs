//! Watch command handler.

use crate::CliOutput;
use crate::commands::index::report_exit_code;
use crate::error::{CliError, ExitCode};
use crate::format::{OutputFormat, render_report};
use code_index_infra::{Workspace, run_watch_local};
use code_index_shared::RequestContext;
use std::io::Write;

/// Index once, then reindex on change until interrupted. Each pass is
/// printed as it completes.
pub async fn run_watch(
    ctx: &RequestContext,
    workspace: &Workspace,
    format: OutputFormat,
) -> Result<CliOutput, CliError> {
    let mut last_exit = ExitCode::Ok;
    let mut write_error: Option<CliError> = None;
    let outcome = run_watch_local(ctx, workspace, |report| {
        last_exit = report_exit_code(report);
        let written = render_report(format, report).and_then(|text| {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
            Ok(())
        });
        if let Err(error) = written {
            tracing::warn!(%error, "failed to print watch report");
            write_error.get_or_insert(error);
            ctx.cancel();
        }
    })
    .await;
    if let Some(error) = write_error {
        return Err(error);
    }
    outcome?;

    Ok(CliOutput {
        stdout: String::new(),
        exit_code: last_exit,
    })
}
