use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::DashboardConfig;
use crate::dataset::DatasetSnapshot;
use crate::embedding::{self, EmbeddingPayload, PointerEvent};
use crate::filter::{FilterError, Predicate};
use crate::selection::{SelectionState, SortDirection, SortMode};
use crate::stats::{self, StatisticsPayload};
use crate::table::{self, TablePayload};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderPayload {
    pub embedding: EmbeddingPayload,
    pub table: TablePayload,
    pub statistics: StatisticsPayload,
    pub selection: SelectionState,
    /// Message for the last rejected filter, if the latest interaction was one.
    pub notice: Option<String>,
}

/// Every view is derived from the same state snapshot.
pub fn render(snapshot: &DatasetSnapshot, state: &SelectionState) -> RenderPayload {
    RenderPayload {
        embedding: embedding::derive(snapshot, state),
        table: table::derive(snapshot, state),
        statistics: stats::derive(snapshot),
        selection: state.clone(),
        notice: None,
    }
}

/// A user action as delivered by whatever event loop hosts the dashboard.
/// Columns are named as the user sees them and resolved against the dataset.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Interaction {
    PointHover {
        index: i64,
    },
    PointClick {
        index: i64,
    },
    RowClick {
        position: usize,
    },
    Sort {
        column: String,
        #[serde(default)]
        direction: SortDirection,
        #[serde(default)]
        mode: SortMode,
    },
    ClearSort,
    Filter {
        column: String,
        /// `None` clears the column's filter.
        expression: Option<String>,
    },
    Page {
        index: i64,
    },
}

pub struct Dashboard {
    snapshot: DatasetSnapshot,
    state: SelectionState,
    notice: Option<String>,
}

impl Dashboard {
    pub fn new(snapshot: DatasetSnapshot, config: &DashboardConfig) -> Self {
        let state = SelectionState::new(&snapshot, config);
        Self {
            snapshot,
            state,
            notice: None,
        }
    }

    pub fn snapshot(&self) -> &DatasetSnapshot {
        &self.snapshot
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    /// Applies one interaction. The state is swapped only once the transition
    /// has fully succeeded; a rejected filter keeps the previous state.
    pub fn dispatch(&mut self, interaction: Interaction) -> Result<(), FilterError> {
        debug!(?interaction, "dispatch");
        match self.transition(interaction) {
            Ok(next) => {
                self.state = next;
                self.notice = None;
                Ok(())
            }
            Err(err) => {
                self.notice = Some(err.to_string());
                Err(err)
            }
        }
    }

    pub fn render(&self) -> RenderPayload {
        RenderPayload {
            notice: self.notice.clone(),
            ..render(&self.snapshot, &self.state)
        }
    }

    fn transition(&self, interaction: Interaction) -> Result<SelectionState, FilterError> {
        let snapshot = &self.snapshot;
        let state = &self.state;

        let next = match interaction {
            Interaction::PointHover { index } => {
                embedding::on_pointer(state, snapshot, PointerEvent::Hover(index))
            }
            Interaction::PointClick { index } => {
                embedding::on_pointer(state, snapshot, PointerEvent::Click(index))
            }
            Interaction::RowClick { position } => table::on_row_click(state, snapshot, position),
            Interaction::Sort {
                column,
                direction,
                mode,
            } => match snapshot.resolve_column(&column) {
                Some(column) => state.set_sort(snapshot, column, direction, mode),
                None => {
                    debug!(%column, "sort on unknown column ignored");
                    state.clone()
                }
            },
            Interaction::ClearSort => state.clear_sort(),
            Interaction::Filter { column, expression } => {
                let resolved = snapshot
                    .resolve_column(&column)
                    .ok_or(FilterError::UnknownColumn(column))?;
                let predicate = expression
                    .as_deref()
                    .map(str::parse::<Predicate>)
                    .transpose()?;
                state.set_filter(snapshot, resolved, predicate)?
            }
            Interaction::Page { index } => state.set_page(snapshot, index),
        };
        Ok(next)
    }
}
