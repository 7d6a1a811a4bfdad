//! `envtree refresh`: one reconciliation pass.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use envtree_core::{Settings, UpstreamDelta};
use envtree_sync::{EnvironmentAction, EnvironmentReport, RefreshReport};

/// Arguments for `envtree refresh`.
#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Report what would change without touching the environments or the cache.
    #[arg(long)]
    pub dry_run: bool,

    /// Emit the full report as JSON.
    #[arg(long)]
    pub json: bool,

    /// YAML upstream delta to use instead of diffing the inventory snapshot.
    #[arg(long, value_name = "FILE")]
    pub delta: Option<PathBuf>,
}

impl RefreshArgs {
    pub fn run(self, settings: &Settings) -> Result<()> {
        let upstream = self.delta.as_deref().map(load_delta).transpose()?;
        let report =
            envtree_sync::run_at(settings, self.dry_run, upstream).context("refresh failed")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize report")?
            );
            return Ok(());
        }
        print_summary(&report);
        Ok(())
    }
}

fn load_delta(path: &Path) -> Result<UpstreamDelta> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read upstream delta {}", path.display()))?;
    serde_yaml::from_str(&contents)
        .with_context(|| format!("failed to parse upstream delta {}", path.display()))
}

fn print_summary(report: &RefreshReport) {
    let prefix = if report.dry_run { "[dry-run] " } else { "" };
    if report.environments.is_empty() {
        println!("{prefix}nothing to do");
        return;
    }

    for env in &report.environments {
        print_environment(prefix, env);
    }

    let failures = report.failures().count();
    let line = format!(
        "{prefix}{} environments processed, {failures} failures, lease {}s",
        report.environments.len(),
        report.lease_seconds,
    );
    if failures > 0 {
        println!("{}", line.yellow());
    } else {
        println!("{line}");
    }
}

fn print_environment(prefix: &str, env: &EnvironmentReport) {
    let mark = if env.action == EnvironmentAction::Skipped {
        "✗".red().bold().to_string()
    } else if env.is_clean() {
        "✓".green().bold().to_string()
    } else {
        "!".yellow().bold().to_string()
    };
    println!(
        "{prefix}{mark} '{}' {} ({} operations)",
        env.name,
        action_label(env.action),
        env.operations.len()
    );
    for failure in &env.failures {
        println!("  ✗  {}: {}", failure.element, failure.message);
    }
}

fn action_label(action: EnvironmentAction) -> &'static str {
    match action {
        EnvironmentAction::Created => "created",
        EnvironmentAction::Deleted => "deleted",
        EnvironmentAction::Recreated => "recreated",
        EnvironmentAction::Refreshed => "refreshed",
        EnvironmentAction::Skipped => "skipped",
    }
}
