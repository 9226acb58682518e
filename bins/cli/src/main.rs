//! CLI binary entrypoint.

mod commands;
mod error;
mod format;
mod logging;

use clap::{Parser, Subcommand};
use code_index_infra::Workspace;
use code_index_shared::RequestContext;
use commands::{SearchArgs, run_clear, run_config, run_index, run_search, run_watch};
use error::{CliError, ExitCode};
use format::OutputArgs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(
    name = "cidx",
    version,
    about = "Incremental semantic code index",
    long_about = None
)]
struct Cli {
    /// Workspace root (defaults to the current directory).
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Config file (TOML or JSON). Defaults to `cidx.toml` or `cidx.json` in the root.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    output: OutputArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Index the workspace, re-embedding only changed blocks.
    Index {
        /// Ignore the ledger and re-upsert every block.
        #[arg(long)]
        force: bool,
    },
    /// Search the index.
    Search(SearchArgs),
    /// Index, then keep the index current as files change.
    Watch,
    /// Drop the collection and the ledger.
    Clear,
    /// Print the effective config.
    Config,
}

pub(crate) struct CliOutput {
    stdout: String,
    exit_code: ExitCode,
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.output.log_format);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => return exit_with_error(&CliError::from(error)),
    };
    match runtime.block_on(run(&cli)) {
        Ok(output) => match write_output(&output) {
            Ok(()) => std::process::ExitCode::from(output.exit_code.as_u8()),
            Err(error) => exit_with_error(&error),
        },
        Err(error) => exit_with_error(&error),
    }
}

fn exit_with_error(error: &CliError) -> std::process::ExitCode {
    let _ = writeln!(io::stderr(), "error: {error}");
    std::process::ExitCode::from(error.exit_code().as_u8())
}

async fn run(cli: &Cli) -> Result<CliOutput, CliError> {
    let root = resolve_root(cli.root.as_deref())?;
    let workspace = Workspace::open(&root, cli.config.as_deref())?;
    let format = cli.output.output;

    let ctx = RequestContext::new_request();
    let interrupt = spawn_interrupt_handler(&ctx);
    let output = match &cli.command {
        Commands::Index { force } => run_index(&ctx, &workspace, format, *force).await,
        Commands::Search(args) => run_search(&ctx, &workspace, format, args).await,
        Commands::Watch => run_watch(&ctx, &workspace, format).await,
        Commands::Clear => run_clear(&ctx, &workspace, format).await,
        Commands::Config => run_config(&workspace, format),
    };
    interrupt.abort();
    output
}

/// Cancel `ctx` on the first Ctrl-C.
fn spawn_interrupt_handler(ctx: &RequestContext) -> tokio::task::JoinHandle<()> {
    let ctx = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, cancelling");
            ctx.cancel();
        }
    })
}

fn resolve_root(path: Option<&Path>) -> Result<PathBuf, CliError> {
    match path {
        Some(value) => Ok(value.to_path_buf()),
        None => Ok(std::env::current_dir()?),
    }
}

fn write_output(output: &CliOutput) -> Result<(), CliError> {
    let mut stdout = io::stdout();
    stdout.write_all(output.stdout.as_bytes())?;
    stdout.flush()?;
    Ok(())
}
