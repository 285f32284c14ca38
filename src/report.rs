use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::dataset::DatasetSnapshot;
use crate::models::CellValue;
use crate::risk;
use crate::selection::SelectionState;
use crate::table;

fn format_cell(value: &CellValue) -> String {
    match value {
        CellValue::Id(uid) => uid.to_string(),
        CellValue::Number(number) => format!("{number}"),
        CellValue::Flag(flag) => (if *flag { "1" } else { "0" }).to_string(),
        CellValue::Missing => "NA".to_string(),
    }
}

pub fn build_report(
    snapshot: &DatasetSnapshot,
    state: &SelectionState,
    generated_at: DateTime<Utc>,
) -> String {
    let summary = risk::summarize(snapshot.patients());
    let clusters = risk::cluster_agreement(snapshot.patients(), snapshot.embedding());
    let page = table::derive(snapshot, state);

    let mut output = String::new();

    let _ = writeln!(output, "# Heart Disease Risk Dashboard");
    let _ = writeln!(output, "Generated {}", generated_at.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk Overview");
    let _ = writeln!(
        output,
        "- {} of {} patients at risk ({:.1}%)",
        summary.at_risk,
        summary.total,
        summary.share * 100.0
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Risk by Embedding Cluster");
    for cluster in &clusters {
        let _ = writeln!(
            output,
            "- cluster {}: {} points, {} labelled at risk",
            cluster.color_value, cluster.points, cluster.at_risk
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Descriptive Statistics");
    let columns = snapshot.stat_columns();
    let _ = writeln!(output, "| group | {} |", columns.join(" | "));
    let _ = writeln!(output, "|---{}|", "|---".repeat(columns.len()));
    for row in snapshot.stats() {
        let cells: Vec<String> = columns
            .iter()
            .map(|column| {
                row.metrics
                    .get(column)
                    .map_or_else(|| "NA".to_string(), |mean| format!("{mean:.2}"))
            })
            .collect();
        let _ = writeln!(output, "| {} | {} |", row.group, cells.join(" | "));
    }

    let _ = writeln!(output);
    let _ = writeln!(
        output,
        "## Patients (page {} of {}, {} matching)",
        page.page_index + 1,
        page.page_count.max(1),
        page.total_filtered
    );

    if page.rows.is_empty() {
        let _ = writeln!(output, "No patients on this page.");
    } else {
        for row in &page.rows {
            let cells: Vec<String> = row
                .cells
                .iter()
                .map(|cell| format!("{}={}", cell.column, format_cell(&cell.value)))
                .collect();
            let marker = if row.risk { " **at risk**" } else { "" };
            let _ = writeln!(output, "- {}{}", cells.join(", "), marker);
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::config::DashboardConfig;
    use crate::dataset::fixture;

    #[test]
    fn report_lists_overview_clusters_stats_and_page() {
        let snapshot = fixture();
        let state = SelectionState::new(&snapshot, &DashboardConfig::default());
        let generated_at = Utc
            .with_ymd_and_hms(2026, 2, 2, 9, 30, 0)
            .single()
            .expect("timestamp");

        let report = build_report(&snapshot, &state, generated_at);

        assert!(report.starts_with("# Heart Disease Risk Dashboard\nGenerated 2026-02-02 09:30 UTC"));
        assert!(report.contains("- 2 of 4 patients at risk (50.0%)"));
        assert!(report.contains("- cluster 0: 2 points, 0 labelled at risk"));
        assert!(report.contains("- cluster 1: 2 points, 2 labelled at risk"));
        assert!(report.contains("| group | age | sysBP |"));
        assert!(report.contains("| Female | 47.50 | 120.00 |"));
        assert!(report.contains("## Patients (page 1 of 1, 4 matching)"));
        assert!(report.contains("- UID=2, age=61, sysBP=150, risk=1 **at risk**"));
        assert!(report.contains("- UID=3, age=45, sysBP=NA, risk=0\n"));
    }

    #[test]
    fn empty_page_is_reported() {
        let snapshot = fixture();
        let state = SelectionState {
            page_index: 5,
            ..SelectionState::new(&snapshot, &DashboardConfig::default())
        };
        let report = build_report(&snapshot, &state, Utc::now());
        assert!(report.contains("No patients on this page."));
    }
}
