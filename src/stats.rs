use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::DashboardConfig;
use crate::dataset::{DatasetSnapshot, LoadError};
use crate::models::StatRow;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatisticsPayload {
    pub columns: Vec<String>,
    pub rows: Vec<StatRow>,
}

/// The statistics panel summarizes the whole population, so it takes no
/// selection state.
pub fn derive(snapshot: &DatasetSnapshot) -> StatisticsPayload {
    StatisticsPayload {
        columns: snapshot.stat_columns().to_vec(),
        rows: snapshot.stats().to_vec(),
    }
}

struct GroupAccumulator {
    key: f64,
    sums: Vec<(f64, usize)>,
}

/// Per-group mean of every column except the group column and the trailing
/// outcome column. Missing cells are skipped, rows without a group value are
/// dropped, and groups come out in ascending group value, labelled from
/// `config.group_labels` by rank.
pub fn describe_by_group(
    headers: &[String],
    rows: &[Vec<Option<f64>>],
    config: &DashboardConfig,
) -> Result<(Vec<String>, Vec<StatRow>), LoadError> {
    let group_at = headers
        .iter()
        .position(|header| header.eq_ignore_ascii_case(&config.group_column))
        .ok_or_else(|| LoadError::MalformedSchema {
            table: "raw dataset",
            detail: format!("missing group column '{}'", config.group_column),
        })?;

    let outcome_at = headers.len().saturating_sub(1);
    let metric_at: Vec<usize> = (0..outcome_at).filter(|at| *at != group_at).collect();

    let mut groups: Vec<GroupAccumulator> = Vec::new();
    for row in rows {
        let Some(key) = row.get(group_at).copied().flatten() else {
            continue;
        };

        let position = match groups.binary_search_by(|group| group.key.total_cmp(&key)) {
            Ok(position) => position,
            Err(position) => {
                groups.insert(
                    position,
                    GroupAccumulator {
                        key,
                        sums: vec![(0.0, 0); metric_at.len()],
                    },
                );
                position
            }
        };

        for (slot, at) in groups[position].sums.iter_mut().zip(&metric_at) {
            if let Some(value) = row.get(*at).copied().flatten() {
                slot.0 += value;
                slot.1 += 1;
            }
        }
    }

    let columns: Vec<String> = metric_at.iter().map(|at| headers[*at].clone()).collect();
    let stats = groups
        .into_iter()
        .enumerate()
        .map(|(rank, group)| {
            let metrics: BTreeMap<String, f64> = columns
                .iter()
                .zip(&group.sums)
                .filter(|(_, (_, count))| *count > 0)
                .map(|(column, (sum, count))| (column.clone(), sum / *count as f64))
                .collect();
            StatRow {
                group: config
                    .group_labels
                    .get(rank)
                    .cloned()
                    .unwrap_or_else(|| group.key.to_string()),
                metrics,
            }
        })
        .collect();

    Ok((columns, stats))
}
