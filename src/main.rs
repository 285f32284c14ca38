use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod config;
mod dataset;
mod embedding;
mod filter;
mod models;
mod render;
mod report;
mod risk;
mod selection;
mod stats;
mod table;

use crate::config::DashboardConfig;
use crate::render::{Dashboard, Interaction};
use crate::selection::{SortDirection, SortMode};

#[derive(Parser)]
#[command(name = "chd-risk-explorer")]
#[command(about = "Linked-view explorer for a precomputed heart disease risk dataset", long_about = None)]
struct Cli {
    /// Directory holding risk.csv, tsne.csv and either stats.csv or framingham.csv
    #[arg(long, env = "RISK_DATA_DIR", default_value = "data", global = true)]
    data_dir: PathBuf,
    /// JSON file overriding dashboard defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Rows per table page
    #[arg(long, global = true)]
    page_size: Option<usize>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Default)]
struct ViewArgs {
    /// Sort key as COLUMN or COLUMN:asc|desc; repeat for a multi-column sort
    #[arg(long = "sort", value_name = "COLUMN:DIR")]
    sorts: Vec<String>,
    /// Filter as COLUMN:EXPR, e.g. "risk:eq 1" or "sysBP:> 140"
    #[arg(long = "filter", value_name = "COLUMN:EXPR")]
    filters: Vec<String>,
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    page: i64,
    /// Embedding point (and table row) to hover
    #[arg(long, allow_negative_numbers = true)]
    hover: Option<i64>,
    /// Embedding points to select
    #[arg(long = "select", allow_negative_numbers = true)]
    selects: Vec<i64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the descriptive statistics panel
    Stats,
    /// Print one page of the patient table
    Table {
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Print the embedding scatter payload
    Embedding {
        #[command(flatten)]
        view: ViewArgs,
    },
    /// Replay a JSON list of interactions and print the full render payload
    Replay {
        #[arg(long)]
        events: PathBuf,
    },
    /// Write a markdown summary of the dashboard
    Report {
        #[command(flatten)]
        view: ViewArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("chd_risk_explorer=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => DashboardConfig::from_file(path)?,
        None => DashboardConfig::default(),
    };
    if let Some(page_size) = cli.page_size {
        anyhow::ensure!(page_size > 0, "--page-size must be greater than zero");
        config.page_size = page_size;
    }

    let snapshot = dataset::load_dir(&cli.data_dir, &config)
        .with_context(|| format!("failed to load dataset from {}", cli.data_dir.display()))?;
    let mut dashboard = Dashboard::new(snapshot, &config);

    match cli.command {
        Commands::Stats => print_json(&dashboard.render().statistics)?,
        Commands::Table { view } => {
            apply_view(&mut dashboard, &view)?;
            print_json(&dashboard.render().table)?;
        }
        Commands::Embedding { view } => {
            apply_view(&mut dashboard, &view)?;
            print_json(&dashboard.render().embedding)?;
        }
        Commands::Replay { events } => {
            let raw = std::fs::read_to_string(&events)
                .with_context(|| format!("failed to read {}", events.display()))?;
            let interactions: Vec<Interaction> = serde_json::from_str(&raw)
                .with_context(|| format!("invalid interaction list in {}", events.display()))?;

            for interaction in interactions {
                if let Err(err) = dashboard.dispatch(interaction) {
                    tracing::warn!(%err, "interaction rejected");
                }
            }
            print_json(&dashboard.render())?;
        }
        Commands::Report { view, out } => {
            apply_view(&mut dashboard, &view)?;
            let report = report::build_report(dashboard.snapshot(), dashboard.state(), Utc::now());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn apply_view(dashboard: &mut Dashboard, view: &ViewArgs) -> anyhow::Result<()> {
    for interaction in view_interactions(view)? {
        dashboard.dispatch(interaction)?;
    }
    Ok(())
}

/// Filters go first so that the page request is clamped against the
/// filtered row count.
fn view_interactions(view: &ViewArgs) -> anyhow::Result<Vec<Interaction>> {
    let mut interactions = Vec::new();

    for raw in &view.filters {
        let (column, expression) = raw
            .split_once(':')
            .with_context(|| format!("filter '{raw}' must look like COLUMN:EXPR"))?;
        interactions.push(Interaction::Filter {
            column: column.to_string(),
            expression: Some(expression.to_string()),
        });
    }

    for (at, raw) in view.sorts.iter().enumerate() {
        let (column, direction) = match raw.split_once(':') {
            Some((column, direction)) => (
                column,
                direction
                    .parse::<SortDirection>()
                    .map_err(anyhow::Error::msg)?,
            ),
            None => (raw.as_str(), SortDirection::Asc),
        };
        interactions.push(Interaction::Sort {
            column: column.to_string(),
            direction,
            mode: if at == 0 {
                SortMode::Replace
            } else {
                SortMode::Append
            },
        });
    }

    if let Some(index) = view.hover {
        interactions.push(Interaction::PointHover { index });
    }
    for index in &view.selects {
        interactions.push(Interaction::PointClick { index: *index });
    }
    interactions.push(Interaction::Page { index: view.page });

    Ok(interactions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn view_args_become_ordered_interactions() {
        let view = ViewArgs {
            sorts: vec!["risk:desc".to_string(), "age".to_string()],
            filters: vec!["sysBP:> 140".to_string()],
            page: 1,
            hover: Some(3),
            selects: vec![0],
        };
        let interactions = view_interactions(&view).expect("interactions");
        assert_eq!(
            interactions,
            vec![
                Interaction::Filter {
                    column: "sysBP".to_string(),
                    expression: Some("> 140".to_string()),
                },
                Interaction::Sort {
                    column: "risk".to_string(),
                    direction: SortDirection::Desc,
                    mode: SortMode::Replace,
                },
                Interaction::Sort {
                    column: "age".to_string(),
                    direction: SortDirection::Asc,
                    mode: SortMode::Append,
                },
                Interaction::PointHover { index: 3 },
                Interaction::PointClick { index: 0 },
                Interaction::Page { index: 1 },
            ]
        );
    }

    #[test]
    fn malformed_view_args_are_rejected() {
        let bad_filter = ViewArgs {
            filters: vec!["risk".to_string()],
            ..ViewArgs::default()
        };
        assert!(view_interactions(&bad_filter).is_err());

        let bad_sort = ViewArgs {
            sorts: vec!["age:sideways".to_string()],
            ..ViewArgs::default()
        };
        assert!(view_interactions(&bad_sort).is_err());
    }
}
