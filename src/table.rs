use std::cmp::Ordering;
use std::ops::Range;

use serde::Serialize;

use crate::dataset::DatasetSnapshot;
use crate::filter::{self, FilterSet};
use crate::models::{CellValue, Column, PatientRecord, Uid};
use crate::selection::{SelectionState, SortDirection, SortKey};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableCell {
    pub column: String,
    pub value: CellValue,
    /// Set on the uid cell of at-risk rows.
    pub styled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    /// Row position in the loaded table, shared with the embedding point index.
    pub position: usize,
    pub uid: Uid,
    pub cells: Vec<TableCell>,
    pub risk: bool,
    pub highlighted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TablePayload {
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
    pub total_filtered: usize,
    pub page_index: usize,
    pub page_size: usize,
    pub page_count: usize,
}

/// Positions of the rows passing every active predicate, in load order.
pub fn filtered_positions(snapshot: &DatasetSnapshot, filters: &FilterSet) -> Vec<usize> {
    snapshot
        .patients()
        .iter()
        .enumerate()
        .filter(|(_, patient)| filter::passes(filters, patient))
        .map(|(position, _)| position)
        .collect()
}

/// Filtered positions in display order. Without sort keys the load order is
/// kept; with keys, rows equal on every key fall back to ascending uid.
pub fn ordered_positions(snapshot: &DatasetSnapshot, state: &SelectionState) -> Vec<usize> {
    let mut positions = filtered_positions(snapshot, &state.filter_predicates);
    if !state.sort_spec.is_empty() {
        let patients = snapshot.patients();
        positions.sort_by(|a, b| compare_records(&patients[*a], &patients[*b], &state.sort_spec));
    }
    positions
}

pub fn compare_records(a: &PatientRecord, b: &PatientRecord, sort_spec: &[SortKey]) -> Ordering {
    sort_spec
        .iter()
        .map(|key| {
            let ordering = compare_column(&key.column, a, b);
            match key.direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or_else(|| a.uid.cmp(&b.uid))
}

/// Missing values order before present ones.
fn compare_column(column: &Column, a: &PatientRecord, b: &PatientRecord) -> Ordering {
    match column {
        Column::Uid => a.uid.cmp(&b.uid),
        Column::Risk => a.risk.cmp(&b.risk),
        Column::Attribute(name) => match (a.attributes.get(name), b.attributes.get(name)) {
            (Some(left), Some(right)) => left.total_cmp(right),
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
        },
    }
}

/// Slice of a `total`-row sequence shown on `page_index`; empty past the end.
pub fn page_window(total: usize, page_index: usize, page_size: usize) -> Range<usize> {
    let start = page_index.saturating_mul(page_size).min(total);
    let end = start.saturating_add(page_size).min(total);
    start..end
}

pub fn derive(snapshot: &DatasetSnapshot, state: &SelectionState) -> TablePayload {
    let ordered = ordered_positions(snapshot, state);
    let window = page_window(ordered.len(), state.page_index, state.page_size);

    let rows = ordered[window]
        .iter()
        .map(|position| {
            let patient = &snapshot.patients()[*position];
            let cells = snapshot
                .patient_columns()
                .iter()
                .map(|(column, header)| TableCell {
                    column: header.clone(),
                    value: patient.cell(column),
                    styled: patient.risk && *column == Column::Uid,
                })
                .collect();
            TableRow {
                position: *position,
                uid: patient.uid.clone(),
                cells,
                risk: patient.risk,
                highlighted: state.hovered_index == Some(*position)
                    || state.selected_indices.contains(position),
            }
        })
        .collect();

    TablePayload {
        columns: snapshot
            .patient_columns()
            .iter()
            .map(|(_, header)| header.clone())
            .collect(),
        rows,
        total_filtered: ordered.len(),
        page_index: state.page_index,
        page_size: state.page_size,
        page_count: ordered.len().div_ceil(state.page_size),
    }
}

/// Clicking a row hovers the embedding point at the same position.
pub fn on_row_click(
    state: &SelectionState,
    snapshot: &DatasetSnapshot,
    position: usize,
) -> SelectionState {
    match i64::try_from(position) {
        Ok(index) => state.hover(snapshot, index),
        Err(_) => state.clone(),
    }
}
