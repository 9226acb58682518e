//! Output and log format flags, and the renderers for command results.

use crate::error::CliError;
use clap::{Args, ValueEnum};
use code_index_app::{RunReport, RunSummary};
use code_index_domain::SearchResult;
use std::fmt::Write as _;

/// Output format choices for command results on stdout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-friendly text output.
    #[default]
    Text,
    /// Machine-friendly JSON output.
    Json,
}

/// Log line format on stderr.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Compact human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

/// Output-related CLI flags.
#[derive(Debug, Clone, Copy, Args)]
pub struct OutputArgs {
    /// Output format for command results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,
    /// Log format on stderr; filtering follows `RUST_LOG`.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

pub fn render_report(format: OutputFormat, report: &RunReport) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => json_line(report),
        OutputFormat::Text => Ok(report_text(report)),
    }
}

pub fn render_results(format: OutputFormat, results: &[SearchResult]) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => json_line(&serde_json::json!({ "results": results })),
        OutputFormat::Text => Ok(results_text(results)),
    }
}

fn json_line<T: serde::Serialize>(value: &T) -> Result<String, CliError> {
    let mut out = serde_json::to_string(value)?;
    out.push('\n');
    Ok(out)
}

fn report_text(report: &RunReport) -> String {
    let summary = &report.summary;
    let mut out = String::new();
    let _ = writeln!(out, "status: {}", report.state.as_str());
    let _ = writeln!(
        out,
        "files: scanned={} indexed={} unchanged={} removed={} skipped={}",
        summary.files_scanned,
        summary.files_indexed,
        summary.files_unchanged,
        summary.files_removed,
        summary.files_skipped,
    );
    let _ = writeln!(
        out,
        "blocks: upserted={} unchanged={} deleted={} truncated={}",
        summary.blocks_upserted,
        summary.blocks_unchanged,
        summary.blocks_deleted,
        summary.truncated_items,
    );
    let _ = writeln!(
        out,
        "batches: dispatched={} failed={} peakPending={}",
        summary.batches_dispatched, summary.batches_failed, summary.peak_pending_batches,
    );
    if summary.scan_truncated {
        out.push_str("scan: stopped at maxFiles\n");
    }
    push_failures(&mut out, summary);
    if let Some(error) = &report.error {
        let _ = writeln!(out, "error: {}: {}", error.code, error.message);
    }
    out
}

fn push_failures(out: &mut String, summary: &RunSummary) {
    if summary.failures.is_empty() {
        return;
    }
    let _ = writeln!(out, "failures: {}", summary.failures.len());
    for failure in &summary.failures {
        let target = failure.path.as_ref().map_or("-", |path| path.as_str());
        let _ = writeln!(out, "  {} {target}: {}", failure.code, failure.message);
    }
}

fn results_text(results: &[SearchResult]) -> String {
    if results.is_empty() {
        return "no results\n".to_owned();
    }
    let mut out = String::new();
    for result in results {
        let _ = writeln!(
            out,
            "{}:{}-{} (score {:.3})",
            result.file_path, result.start_line, result.end_line, result.score
        );
        for line in result.content.lines().take(PREVIEW_LINES) {
            let _ = writeln!(out, "    {line}");
        }
    }
    out
}

const PREVIEW_LINES: usize = 4;
