//! Config command handler.

use crate::CliOutput;
use crate::error::{CliError, ExitCode};
use crate::format::OutputFormat;
use code_index_infra::{ConfigRenderFormat, Workspace, render_effective_config};

/// Print the effective config: TOML for text output, JSON otherwise.
pub fn run_config(workspace: &Workspace, format: OutputFormat) -> Result<CliOutput, CliError> {
    let render_format = match format {
        OutputFormat::Text => ConfigRenderFormat::Toml,
        OutputFormat::Json => ConfigRenderFormat::Json,
    };
    if let Some(path) = workspace.config_path() {
        tracing::info!(path = %path.display(), "config file");
    }
    Ok(CliOutput {
        stdout: render_effective_config(workspace, render_format)?,
        exit_code: ExitCode::Ok,
    })
}
