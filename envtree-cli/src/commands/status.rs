//! `envtree status`: classification of every environment, read-only.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use envtree_core::{EnvironmentName, Settings};
use envtree_sync::{delta, Delta, GitObjectHasher};

/// Arguments for `envtree status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, settings: &Settings) -> Result<()> {
        let delta = delta::calculate_at(settings, &GitObjectHasher)
            .context("failed to compute environment delta")?;
        let rows = build_rows(&delta);

        if self.json {
            print_json(settings, rows)?;
            return Ok(());
        }
        print_table(settings, rows);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
enum Classification {
    New,
    Changed,
    NotChanged,
    Deleted,
}

#[derive(Debug, Clone)]
struct EnvironmentStatus {
    name: EnvironmentName,
    classification: Classification,
}

#[derive(Serialize)]
struct StatusReportJson {
    summary: StatusSummaryJson,
    environments: Vec<EnvironmentStatusJson>,
}

#[derive(Serialize)]
struct StatusSummaryJson {
    environments: usize,
    pending: usize,
    mandatory_branches: Vec<String>,
}

#[derive(Serialize)]
struct EnvironmentStatusJson {
    environment: String,
    status: Classification,
    detail: &'static str,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "environment")]
    environment: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "detail")]
    detail: &'static str,
}

fn build_rows(delta: &Delta) -> Vec<EnvironmentStatus> {
    let mut rows: Vec<EnvironmentStatus> = [
        (Classification::New, &delta.new),
        (Classification::Changed, &delta.changed),
        (Classification::NotChanged, &delta.notchanged),
        (Classification::Deleted, &delta.deleted),
    ]
    .into_iter()
    .flat_map(|(classification, names)| {
        names.iter().map(move |name| EnvironmentStatus {
            name: name.clone(),
            classification,
        })
    })
    .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));
    rows
}

fn pending(rows: &[EnvironmentStatus]) -> usize {
    rows.iter()
        .filter(|row| row.classification != Classification::NotChanged)
        .count()
}

fn print_json(settings: &Settings, rows: Vec<EnvironmentStatus>) -> Result<()> {
    let payload = StatusReportJson {
        summary: StatusSummaryJson {
            environments: rows.len(),
            pending: pending(&rows),
            mandatory_branches: settings.mandatory_branches.clone(),
        },
        environments: rows
            .into_iter()
            .map(|row| EnvironmentStatusJson {
                environment: row.name.0,
                status: row.classification,
                detail: detail(row.classification),
            })
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize status JSON")?
    );
    Ok(())
}

fn print_table(settings: &Settings, rows: Vec<EnvironmentStatus>) {
    let pending = pending(&rows);
    println!(
        "envtree v{} | {} environments | {} pending | mandatory branches: {}",
        env!("CARGO_PKG_VERSION"),
        rows.len(),
        pending,
        settings.mandatory_branches.join(", "),
    );

    if rows.is_empty() {
        println!("No environments declared.");
        return;
    }

    let table_rows: Vec<StatusTableRow> = rows
        .into_iter()
        .map(|row| StatusTableRow {
            environment: row.name.0,
            status: format!("{} {}", indicator(row.classification), label(row.classification)),
            detail: detail(row.classification),
        })
        .collect();
    let mut table = Table::new(table_rows);
    table.with(Style::rounded());
    println!("{table}");

    if pending > 0 {
        println!("Run 'envtree refresh' to apply pending changes.");
    }
}

fn label(classification: Classification) -> &'static str {
    match classification {
        Classification::New => "NEW",
        Classification::Changed => "CHANGED",
        Classification::NotChanged => "CURRENT",
        Classification::Deleted => "DELETED",
    }
}

fn indicator(classification: Classification) -> String {
    match classification {
        Classification::New => "■".cyan().bold().to_string(),
        Classification::Changed => "■".yellow().bold().to_string(),
        Classification::NotChanged => "■".green().bold().to_string(),
        Classification::Deleted => "■".red().bold().to_string(),
    }
}

fn detail(classification: Classification) -> &'static str {
    match classification {
        Classification::New => "declared, not yet materialized",
        Classification::Changed => "declaration changed since last refresh",
        Classification::NotChanged => "up to date",
        Classification::Deleted => "no longer declared",
    }
}
