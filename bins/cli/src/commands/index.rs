//! Index command handler.

use crate::CliOutput;
use crate::error::{CliError, ExitCode};
use crate::format::{OutputFormat, render_report};
use code_index_app::{ProgressCallback, RunReport};
use code_index_domain::{IndexerState, ProgressEvent};
use code_index_infra::{Workspace, run_index_local};
use code_index_shared::RequestContext;
use std::sync::Arc;

/// Run the index command.
pub async fn run_index(
    ctx: &RequestContext,
    workspace: &Workspace,
    format: OutputFormat,
    force: bool,
) -> Result<CliOutput, CliError> {
    let report = run_index_local(ctx, workspace, force, Some(progress_logger())).await?;
    Ok(CliOutput {
        stdout: render_report(format, &report)?,
        exit_code: report_exit_code(&report),
    })
}

/// Exit code of a finished indexing pass.
pub fn report_exit_code(report: &RunReport) -> ExitCode {
    match (&report.error, report.state) {
        (Some(error), _) if error.is_cancelled() => ExitCode::Cancelled,
        (Some(_), _) => ExitCode::Runtime,
        (None, IndexerState::Completed) if report.summary.has_failures() => {
            ExitCode::CompletedWithFailures
        },
        (None, IndexerState::Completed) => ExitCode::Ok,
        (None, _) => ExitCode::Runtime,
    }
}

fn progress_logger() -> ProgressCallback {
    Arc::new(|event| match event {
        ProgressEvent::State { state } => {
            tracing::info!(state = state.as_str(), "index state");
        },
        ProgressEvent::FileIndexed {
            files_done,
            blocks_written,
        } => {
            tracing::debug!(files_done, blocks_written, "index progress");
        },
    })
}
