use serde::Serialize;

use crate::dataset::DatasetSnapshot;
use crate::filter;
use crate::selection::SelectionState;

pub const AXIS_LABELS: [&str; 3] = ["dimension 1", "dimension 2", "dimension 3"];
pub const COLOR_LEGEND: &str = "0 is safe; 1 is at risk.";

/// Visual state of one scatter point. A filtered-out point is never shown as
/// hovered or selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PointState {
    Normal,
    Hovered,
    Selected,
    FilteredOut,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PointPayload {
    pub index: usize,
    pub coordinates: [f64; 3],
    pub color_value: f64,
    pub state: PointState,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmbeddingPayload {
    pub axis_labels: [&'static str; 3],
    pub legend: &'static str,
    pub points: Vec<PointPayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerEvent {
    Hover(i64),
    Click(i64),
}

pub fn point_state(index: usize, passes_filters: bool, state: &SelectionState) -> PointState {
    if !passes_filters {
        PointState::FilteredOut
    } else if state.hovered_index == Some(index) {
        PointState::Hovered
    } else if state.selected_indices.contains(&index) {
        PointState::Selected
    } else {
        PointState::Normal
    }
}

pub fn derive(snapshot: &DatasetSnapshot, state: &SelectionState) -> EmbeddingPayload {
    let points = snapshot
        .embedding()
        .iter()
        .zip(snapshot.patients())
        .map(|(point, patient)| PointPayload {
            index: point.index,
            coordinates: point.coordinates,
            color_value: point.color_value,
            state: point_state(
                point.index,
                filter::passes(&state.filter_predicates, patient),
                state,
            ),
        })
        .collect();

    EmbeddingPayload {
        axis_labels: AXIS_LABELS,
        legend: COLOR_LEGEND,
        points,
    }
}

pub fn on_pointer(
    state: &SelectionState,
    snapshot: &DatasetSnapshot,
    event: PointerEvent,
) -> SelectionState {
    match event {
        PointerEvent::Hover(index) => state.hover(snapshot, index),
        PointerEvent::Click(index) => state.toggle_select(snapshot, index),
    }
}
