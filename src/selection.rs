use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DashboardConfig;
use crate::dataset::DatasetSnapshot;
use crate::filter::{FilterError, FilterSet, Predicate};
use crate::models::Column;
use crate::table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Asc),
            "desc" | "descending" => Ok(SortDirection::Desc),
            other => Err(format!("unknown sort direction '{other}'")),
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => f.write_str("asc"),
            SortDirection::Desc => f.write_str("desc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortKey {
    pub column: Column,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    /// The column becomes the only sort key.
    #[default]
    Replace,
    /// The column is added as the lowest-priority key, or its direction is
    /// updated in place when it is already a key.
    Append,
}

/// Shared hover/selection/sort/filter/page state of one dashboard session.
///
/// Every transition takes the current state by reference and returns the next
/// one; the dataset is only read, to clamp indices and count filtered rows.
/// Requests that fall outside the dataset return an unchanged copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectionState {
    pub hovered_index: Option<usize>,
    pub selected_indices: BTreeSet<usize>,
    pub sort_spec: Vec<SortKey>,
    pub filter_predicates: FilterSet,
    pub page_index: usize,
    pub page_size: usize,
}

impl SelectionState {
    pub fn new(snapshot: &DatasetSnapshot, config: &DashboardConfig) -> Self {
        Self {
            hovered_index: config
                .initial_hover
                .filter(|index| *index < snapshot.len()),
            selected_indices: BTreeSet::new(),
            sort_spec: Vec::new(),
            filter_predicates: FilterSet::new(),
            page_index: 0,
            page_size: config.page_size.max(1),
        }
    }

    pub fn hover(&self, snapshot: &DatasetSnapshot, index: i64) -> Self {
        let Some(position) = snapshot.position(index) else {
            debug!(index, "hover outside dataset ignored");
            return self.clone();
        };

        debug!(index = position, "hover");
        Self {
            hovered_index: Some(position),
            ..self.clone()
        }
    }

    pub fn toggle_select(&self, snapshot: &DatasetSnapshot, index: i64) -> Self {
        let Some(position) = snapshot.position(index) else {
            debug!(index, "selection outside dataset ignored");
            return self.clone();
        };

        let mut next = self.clone();
        if !next.selected_indices.remove(&position) {
            next.selected_indices.insert(position);
        }
        debug!(index = position, selected = next.selected_indices.len(), "toggle select");
        next
    }

    pub fn set_sort(
        &self,
        snapshot: &DatasetSnapshot,
        column: Column,
        direction: SortDirection,
        mode: SortMode,
    ) -> Self {
        if !snapshot.has_column(&column) {
            debug!(%column, "sort on unknown column ignored");
            return self.clone();
        }

        let mut next = self.clone();
        match mode {
            SortMode::Replace => {
                next.sort_spec = vec![SortKey { column, direction }];
            }
            SortMode::Append => {
                match next.sort_spec.iter_mut().find(|key| key.column == column) {
                    Some(key) => key.direction = direction,
                    None => next.sort_spec.push(SortKey { column, direction }),
                }
            }
        }
        debug!(keys = next.sort_spec.len(), "sort updated");
        next
    }

    pub fn clear_sort(&self) -> Self {
        Self {
            sort_spec: Vec::new(),
            ..self.clone()
        }
    }

    /// Adds, replaces or (with `None`) clears the predicate for `column`.
    /// An invalid predicate leaves the state untouched and reports why.
    pub fn set_filter(
        &self,
        snapshot: &DatasetSnapshot,
        column: Column,
        predicate: Option<Predicate>,
    ) -> Result<Self, FilterError> {
        if !snapshot.has_column(&column) {
            warn!(%column, "filter on unknown column rejected");
            return Err(FilterError::UnknownColumn(column.to_string()));
        }

        let mut next = self.clone();
        match predicate {
            Some(predicate) => {
                if let Err(err) = predicate.check(&column) {
                    warn!(%column, %predicate, "filter rejected");
                    return Err(err);
                }
                debug!(%column, %predicate, "filter set");
                next.filter_predicates.insert(column, predicate);
            }
            None => {
                debug!(%column, "filter cleared");
                next.filter_predicates.remove(&column);
            }
        }

        next.page_index = next.clamp_page(snapshot, next.page_index as i64);
        Ok(next)
    }

    pub fn set_page(&self, snapshot: &DatasetSnapshot, index: i64) -> Self {
        let page_index = self.clamp_page(snapshot, index);
        debug!(requested = index, page = page_index, "page");
        Self {
            page_index,
            ..self.clone()
        }
    }

    /// Number of pages over the filtered rows; zero when nothing passes.
    pub fn page_count(&self, snapshot: &DatasetSnapshot) -> usize {
        let filtered = table::filtered_positions(snapshot, &self.filter_predicates).len();
        filtered.div_ceil(self.page_size)
    }

    fn clamp_page(&self, snapshot: &DatasetSnapshot, index: i64) -> usize {
        let last = self.page_count(snapshot).saturating_sub(1);
        usize::try_from(index).unwrap_or(0).min(last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixture;

    fn initial(snapshot: &DatasetSnapshot) -> SelectionState {
        SelectionState::new(snapshot, &DashboardConfig::default())
    }

    fn risk_only(snapshot: &DatasetSnapshot, state: &SelectionState) -> SelectionState {
        state
            .set_filter(snapshot, Column::Risk, Some("eq true".parse().expect("predicate")))
            .expect("valid filter")
    }

    #[test]
    fn starts_hovering_the_first_point() {
        let snapshot = fixture();
        let state = initial(&snapshot);
        assert_eq!(state.hovered_index, Some(0));
        assert_eq!(state.page_index, 0);
        assert_eq!(state.page_size, 10);
        assert!(state.selected_indices.is_empty());
    }

    #[test]
    fn hover_sets_every_valid_index() {
        let snapshot = fixture();
        let state = initial(&snapshot);
        for index in 0..snapshot.len() as i64 {
            assert_eq!(state.hover(&snapshot, index).hovered_index, Some(index as usize));
        }
    }

    #[test]
    fn hover_out_of_range_is_a_no_op() {
        let snapshot = fixture();
        let state = initial(&snapshot).hover(&snapshot, 3);
        assert_eq!(state.hover(&snapshot, -1), state);
        assert_eq!(state.hover(&snapshot, 4), state);
    }

    #[test]
    fn hover_select_then_invalid_hover_keeps_both() {
        let snapshot = fixture();
        let state = initial(&snapshot)
            .hover(&snapshot, 2)
            .toggle_select(&snapshot, 2)
            .hover(&snapshot, -1);
        assert_eq!(state.hovered_index, Some(2));
        assert_eq!(state.selected_indices, BTreeSet::from([2]));
    }

    #[test]
    fn toggle_select_adds_then_removes() {
        let snapshot = fixture();
        let once = initial(&snapshot).toggle_select(&snapshot, 1);
        assert!(once.selected_indices.contains(&1));
        let twice = once.toggle_select(&snapshot, 1);
        assert!(twice.selected_indices.is_empty());
        assert_eq!(twice.toggle_select(&snapshot, 9), twice);
    }

    #[test]
    fn sort_replace_and_append() {
        let snapshot = fixture();
        let age = Column::Attribute("age".to_string());
        let state = initial(&snapshot)
            .set_sort(&snapshot, age.clone(), SortDirection::Asc, SortMode::Replace)
            .set_sort(&snapshot, Column::Uid, SortDirection::Desc, SortMode::Append)
            .set_sort(&snapshot, age.clone(), SortDirection::Desc, SortMode::Append);
        assert_eq!(
            state.sort_spec,
            vec![
                SortKey {
                    column: age.clone(),
                    direction: SortDirection::Desc
                },
                SortKey {
                    column: Column::Uid,
                    direction: SortDirection::Desc
                },
            ]
        );

        let replaced = state.set_sort(&snapshot, Column::Risk, SortDirection::Asc, SortMode::Replace);
        assert_eq!(replaced.sort_spec.len(), 1);
        assert!(replaced.clear_sort().sort_spec.is_empty());
    }

    #[test]
    fn sort_on_unknown_column_is_ignored() {
        let snapshot = fixture();
        let state = initial(&snapshot);
        let next = state.set_sort(
            &snapshot,
            Column::Attribute("glucose".to_string()),
            SortDirection::Asc,
            SortMode::Replace,
        );
        assert_eq!(next, state);
    }

    #[test]
    fn invalid_filter_keeps_previous_filters() {
        let snapshot = fixture();
        let state = risk_only(&snapshot, &initial(&snapshot));

        let err = state
            .set_filter(&snapshot, Column::Risk, Some("gt 3".parse().expect("predicate")))
            .expect_err("type mismatch");
        assert!(matches!(err, FilterError::TypeMismatch { .. }));

        let err = state
            .set_filter(&snapshot, Column::Attribute("glucose".into()), None)
            .expect_err("unknown column");
        assert_eq!(err, FilterError::UnknownColumn("glucose".to_string()));
        assert_eq!(state.filter_predicates.len(), 1);
    }

    #[test]
    fn clearing_a_filter_removes_it() {
        let snapshot = fixture();
        let state = risk_only(&snapshot, &initial(&snapshot));
        let cleared = state.set_filter(&snapshot, Column::Risk, None).expect("clear");
        assert!(cleared.filter_predicates.is_empty());
    }

    #[test]
    fn set_page_clamps_to_filtered_page_range() {
        let snapshot = fixture();
        let state = SelectionState {
            page_size: 1,
            ..initial(&snapshot)
        };
        let state = risk_only(&snapshot, &state);
        assert_eq!(state.page_count(&snapshot), 2);
        assert_eq!(state.set_page(&snapshot, 1).page_index, 1);
        assert_eq!(state.set_page(&snapshot, 2).page_index, 1);
        assert_eq!(state.set_page(&snapshot, -5).page_index, 0);
    }

    #[test]
    fn narrowing_filter_pulls_page_back_into_range() {
        let snapshot = fixture();
        let state = SelectionState {
            page_size: 1,
            ..initial(&snapshot)
        }
        .set_page(&snapshot, 3);
        assert_eq!(state.page_index, 3);
        let filtered = risk_only(&snapshot, &state);
        assert_eq!(filtered.page_index, 1);
    }
}
