//! envtree: materialize declared environments from a clone of branches.
//!
//! # Usage
//!
//! ```text
//! envtree [--config <path>] [-v] refresh [--dry-run] [--json] [--delta <file>]
//! envtree [--config <path>] [-v] status [--json]
//! ```

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{refresh::RefreshArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "envtree",
    version,
    about = "Keep materialized environment trees in sync with their declarations",
    long_about = None,
)]
struct Cli {
    /// Settings file (defaults to $ENVTREE_CONFIG, then <config dir>/envtree/config.yaml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Log at debug level.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one reconciliation pass under the lease.
    Refresh(RefreshArgs),

    /// Show how each environment would be classified, without changing anything.
    Status(StatusArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let settings = commands::load_settings(cli.config.as_deref())?;
    match cli.command {
        Commands::Refresh(args) => args.run(&settings),
        Commands::Status(args) => args.run(&settings),
    }
}

/// Logs go to stderr so `--json` output stays parseable. Library crates log
/// through `log`, which the subscriber picks up.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
