//! Cell, row and column selection over a composed view.
//!
//! Cell ranges live in view coordinates: row = view index, column = visible
//! column index. Row and column pick lists are independent of cell ranges
//! and keyed by record identity / field so they survive re-sorting.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;
use tracing::debug;

use crate::data::column_model::{ColumnDescriptor, ColumnModel};
use crate::data::data_view::ComposedView;
use crate::data::datatable::{DataTable, DataValue, RowId};
use crate::data::index_map::{self, ExpansionState};
use crate::data::value_format::display_value;

/// A cell in view coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellPosition {
    pub row: usize,
    /// Visible column index
    pub column: usize,
}

impl CellPosition {
    pub fn new(row: usize, column: usize) -> Self {
        Self { row, column }
    }
}

/// Inclusive rectangle of cells
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CellRange {
    pub row_start: usize,
    pub row_end: usize,
    pub column_start: usize,
    pub column_end: usize,
}

impl CellRange {
    pub fn new(row_start: usize, row_end: usize, column_start: usize, column_end: usize) -> Self {
        Self {
            row_start: row_start.min(row_end),
            row_end: row_start.max(row_end),
            column_start: column_start.min(column_end),
            column_end: column_start.max(column_end),
        }
    }

    /// Rectangle spanned by two corners
    pub fn spanning(a: CellPosition, b: CellPosition) -> Self {
        Self::new(a.row, b.row, a.column, b.column)
    }

    pub fn cell(at: CellPosition) -> Self {
        Self::spanning(at, at)
    }

    pub fn contains(&self, cell: CellPosition) -> bool {
        (self.row_start..=self.row_end).contains(&cell.row)
            && (self.column_start..=self.column_end).contains(&cell.column)
    }

    pub fn contains_range(&self, other: &CellRange) -> bool {
        self.row_start <= other.row_start
            && self.row_end >= other.row_end
            && self.column_start <= other.column_start
            && self.column_end >= other.column_end
    }

    pub fn row_count(&self) -> usize {
        self.row_end - self.row_start + 1
    }

    pub fn column_count(&self) -> usize {
        self.column_end - self.column_start + 1
    }

    /// The union when it is itself a rectangle and the two overlap
    fn coalesce(&self, other: &CellRange) -> Option<CellRange> {
        if self.contains_range(other) {
            return Some(*self);
        }
        if other.contains_range(self) {
            return Some(*other);
        }
        let rows_overlap = self.row_start <= other.row_end && other.row_start <= self.row_end;
        let cols_overlap = self.column_start <= other.column_end && other.column_start <= self.column_end;
        let same_rows = self.row_start == other.row_start && self.row_end == other.row_end;
        let same_cols = self.column_start == other.column_start && self.column_end == other.column_end;

        if (same_rows && cols_overlap) || (same_cols && rows_overlap) {
            Some(CellRange::new(
                self.row_start.min(other.row_start),
                self.row_end.max(other.row_end),
                self.column_start.min(other.column_start),
                self.column_end.max(other.column_end),
            ))
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    None,
    Single,
    #[default]
    Multiple,
}

/// Pointer/keyboard state for cell selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PointerState {
    #[default]
    None,
    Anchored { anchor: CellPosition },
    Extending { anchor: CellPosition, active: CellPosition },
    Committed { anchor: CellPosition, active: CellPosition },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractOptions {
    /// Emit display values instead of raw values
    pub include_formatters: bool,
    /// Key rows by column header instead of field
    pub include_headers: bool,
}

/// Tabular projection of a selection, ready for clipboard serialization
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub rows: Vec<Map<String, JsonValue>>,
    /// Column keys in display order
    pub keys: Vec<String>,
}

impl Extraction {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub struct SelectionManager {
    mode: SelectionMode,
    row_mode: SelectionMode,
    pointer: PointerState,
    ranges: Vec<CellRange>,
    active_cell: Option<CellPosition>,
    selected_rows: BTreeSet<RowId>,
    selected_columns: BTreeSet<String>,
}

impl Default for SelectionManager {
    fn default() -> Self {
        Self::new(SelectionMode::Multiple)
    }
}

impl SelectionManager {
    pub fn new(mode: SelectionMode) -> Self {
        Self {
            mode,
            row_mode: SelectionMode::Multiple,
            pointer: PointerState::None,
            ranges: Vec::new(),
            active_cell: None,
            selected_rows: BTreeSet::new(),
            selected_columns: BTreeSet::new(),
        }
    }

    pub fn mode(&self) -> SelectionMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SelectionMode) {
        self.mode = mode;
        self.clear();
    }

    pub fn row_mode(&self) -> SelectionMode {
        self.row_mode
    }

    pub fn set_row_mode(&mut self, row_mode: SelectionMode) {
        self.row_mode = row_mode;
        self.selected_rows.clear();
    }

    pub fn pointer_state(&self) -> PointerState {
        self.pointer
    }

    pub fn active_cell(&self) -> Option<CellPosition> {
        self.active_cell
    }

    /// Focus a cell without selecting a range
    pub fn set_active_cell(&mut self, cell: Option<CellPosition>) {
        self.active_cell = cell;
    }

    /// Pointer or key down on a cell. Without `additive` existing ranges are
    /// dropped.
    pub fn begin(&mut self, cell: CellPosition, additive: bool) {
        if self.mode == SelectionMode::None {
            return;
        }
        if !additive || self.mode == SelectionMode::Single {
            self.ranges.clear();
        }
        self.pointer = PointerState::Anchored { anchor: cell };
        self.active_cell = Some(cell);
        debug!(target: "selection", "Anchored at {:?}", cell);
    }

    /// Drag or shift+navigate to `cell`. Returns false when no selection is
    /// in progress.
    pub fn extend(&mut self, cell: CellPosition) -> bool {
        let anchor = match self.pointer {
            PointerState::Anchored { anchor } | PointerState::Extending { anchor, .. } => anchor,
            PointerState::None | PointerState::Committed { .. } => return false,
        };
        self.active_cell = Some(cell);
        self.pointer = if self.mode == SelectionMode::Single {
            PointerState::Anchored { anchor: cell }
        } else {
            PointerState::Extending { anchor, active: cell }
        };
        true
    }

    /// Pointer or key up; the pending range is committed
    pub fn commit(&mut self) -> Option<CellRange> {
        let (anchor, active) = match self.pointer {
            PointerState::Anchored { anchor } => (anchor, anchor),
            PointerState::Extending { anchor, active } => (anchor, active),
            PointerState::None | PointerState::Committed { .. } => return None,
        };
        self.pointer = PointerState::Committed { anchor, active };
        let range = CellRange::spanning(anchor, active);
        self.select_range(range);
        Some(range)
    }

    /// Range being dragged, if any
    pub fn pending_range(&self) -> Option<CellRange> {
        match self.pointer {
            PointerState::Anchored { anchor } => Some(CellRange::cell(anchor)),
            PointerState::Extending { anchor, active } => Some(CellRange::spanning(anchor, active)),
            _ => None,
        }
    }

    /// Add a range, coalescing with the ranges it overlaps
    pub fn select_range(&mut self, range: CellRange) {
        let mut range = match self.mode {
            SelectionMode::None => return,
            SelectionMode::Single => {
                self.ranges.clear();
                CellRange::cell(CellPosition::new(range.row_start, range.column_start))
            }
            SelectionMode::Multiple => range,
        };

        loop {
            let merged = self
                .ranges
                .iter()
                .position(|existing| existing.coalesce(&range).is_some());
            match merged {
                Some(pos) => {
                    let existing = self.ranges.remove(pos);
                    range = existing.coalesce(&range).unwrap_or(range);
                }
                None => break,
            }
        }
        self.ranges.push(range);
        debug!(target: "selection", "Selected {:?} ({} ranges)", range, self.ranges.len());
    }

    pub fn get_ranges(&self) -> &[CellRange] {
        &self.ranges
    }

    pub fn is_cell_selected(&self, cell: CellPosition) -> bool {
        self.ranges.iter().any(|r| r.contains(cell))
    }

    /// Drop cell ranges and pointer state
    pub fn clear(&mut self) {
        self.ranges.clear();
        self.pointer = PointerState::None;
    }

    /// Add rows to the pick list. In single row mode the last id replaces
    /// the current pick.
    pub fn select_rows<I: IntoIterator<Item = RowId>>(&mut self, ids: I) {
        match self.row_mode {
            SelectionMode::None => {}
            SelectionMode::Single => {
                if let Some(last) = ids.into_iter().last() {
                    self.selected_rows.clear();
                    self.selected_rows.insert(last);
                }
            }
            SelectionMode::Multiple => self.selected_rows.extend(ids),
        }
    }

    pub fn deselect_rows<'a, I: IntoIterator<Item = &'a RowId>>(&mut self, ids: I) {
        for id in ids {
            self.selected_rows.remove(id);
        }
    }

    pub fn is_row_selected(&self, id: &RowId) -> bool {
        self.selected_rows.contains(id)
    }

    pub fn selected_rows(&self) -> &BTreeSet<RowId> {
        &self.selected_rows
    }

    pub fn clear_rows(&mut self) {
        self.selected_rows.clear();
    }

    /// Select every filtered row on every page, or every record of the
    /// table when `unfiltered`
    pub fn select_all_rows(&mut self, view: &ComposedView, table: &DataTable, unfiltered: bool) {
        if self.row_mode != SelectionMode::Multiple {
            return;
        }
        if unfiltered {
            let ids = (0..table.row_count()).filter_map(|idx| table.row_id(idx));
            self.selected_rows.extend(ids);
        }
        // Uncommitted additions only exist in the view
        self.selected_rows.extend(view.filtered_ids().iter().cloned());
        debug!(target: "selection", "Row pick list now holds {}", self.selected_rows.len());
    }

    pub fn select_columns<I: IntoIterator<Item = String>>(&mut self, fields: I) {
        self.selected_columns.extend(fields);
    }

    pub fn deselect_columns<'a, I: IntoIterator<Item = &'a str>>(&mut self, fields: I) {
        for field in fields {
            self.selected_columns.remove(field);
        }
    }

    pub fn selected_columns(&self) -> &BTreeSet<String> {
        &self.selected_columns
    }

    pub fn clear_columns(&mut self) {
        self.selected_columns.clear();
    }

    /// Project the selection onto `view`: cell ranges first, then whole
    /// selected columns, then the active cell. Selected rows that no longer
    /// exist in the view are skipped.
    pub fn extract(
        &self,
        view: &ComposedView,
        table: &DataTable,
        columns: &ColumnModel,
        expansion: &ExpansionState,
        options: ExtractOptions,
    ) -> Extraction {
        let visible: Vec<&ColumnDescriptor> = columns
            .visible_leaves()
            .into_iter()
            .filter_map(|idx| columns.get(idx))
            .collect();

        // (row, visible columns of that row); cell ranges and the active
        // cell are in selection coordinates, whole columns walk the view
        let (plan, from_selection): (Vec<(usize, Vec<usize>)>, bool) = if !self.ranges.is_empty() {
            let rows: BTreeSet<usize> = self
                .ranges
                .iter()
                .flat_map(|r| r.row_start..=r.row_end)
                .collect();
            let plan = rows
                .into_iter()
                .map(|row| {
                    let cols: BTreeSet<usize> = self
                        .ranges
                        .iter()
                        .filter(|r| (r.row_start..=r.row_end).contains(&row))
                        .flat_map(|r| r.column_start..=r.column_end)
                        .collect();
                    (row, cols.into_iter().collect())
                })
                .collect();
            (plan, true)
        } else if !self.selected_columns.is_empty() {
            let cols: Vec<usize> = visible
                .iter()
                .enumerate()
                .filter(|(_, c)| self.selected_columns.contains(&c.field))
                .map(|(idx, _)| idx)
                .collect();
            ((0..view.len()).map(|pos| (pos, cols.clone())).collect(), false)
        } else if let Some(cell) = self.active_cell {
            (vec![(cell.row, vec![cell.column])], true)
        } else {
            (Vec::new(), false)
        };

        let key_of = |column: &ColumnDescriptor| {
            if options.include_headers {
                column.header_text().to_string()
            } else {
                column.field.clone()
            }
        };

        let mut key_columns: BTreeSet<usize> = BTreeSet::new();
        let mut rows = Vec::with_capacity(plan.len());
        let mapping = view.mapping();
        for (row, cols) in plan {
            let position = if from_selection {
                match index_map::selection_to_source(row, expansion, &mapping) {
                    Some(position) => position,
                    None => continue,
                }
            } else {
                row
            };
            if position >= view.len() {
                continue;
            }

            let mut object = Map::new();
            for col in cols {
                let Some(column) = visible.get(col) else {
                    continue;
                };
                let value = table
                    .get_column_index(&column.field)
                    .and_then(|table_col| view.value(table, position, table_col))
                    .unwrap_or(&DataValue::Null);
                let json = if options.include_formatters {
                    JsonValue::String(display_value(value, column.format.as_ref()))
                } else {
                    value.to_json()
                };
                object.insert(key_of(column), json);
                key_columns.insert(col);
            }
            rows.push(object);
        }

        let keys = key_columns
            .into_iter()
            .filter_map(|col| visible.get(col).map(|c| key_of(c)))
            .collect();

        debug!(target: "selection", "Extracted {} rows", rows.len());
        Extraction { rows, keys }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_ranges_coalesce() {
        let mut sel = SelectionManager::default();
        sel.select_range(CellRange::new(0, 2, 0, 1));
        sel.select_range(CellRange::new(1, 4, 0, 1));
        assert_eq!(sel.get_ranges(), &[CellRange::new(0, 4, 0, 1)]);

        // Contained range is absorbed
        sel.select_range(CellRange::new(2, 3, 1, 1));
        assert_eq!(sel.get_ranges().len(), 1);

        // Disjoint range is kept separately
        sel.select_range(CellRange::new(7, 8, 3, 3));
        assert_eq!(sel.get_ranges().len(), 2);

        // Overlap whose union is not rectangular stays separate
        sel.select_range(CellRange::new(4, 5, 1, 2));
        assert_eq!(sel.get_ranges().len(), 3);
    }

    #[test]
    fn test_pointer_state_machine() {
        let mut sel = SelectionManager::default();
        assert!(!sel.extend(CellPosition::new(1, 1)));

        sel.begin(CellPosition::new(0, 0), false);
        assert!(matches!(sel.pointer_state(), PointerState::Anchored { .. }));
        assert!(sel.extend(CellPosition::new(1, 1)));
        assert!(sel.extend(CellPosition::new(2, 1)));
        assert!(matches!(sel.pointer_state(), PointerState::Extending { .. }));

        let range = sel.commit().unwrap();
        assert_eq!(range, CellRange::new(0, 2, 0, 1));
        assert!(matches!(sel.pointer_state(), PointerState::Committed { .. }));
        // Committed is terminal until the next anchor
        assert!(!sel.extend(CellPosition::new(5, 5)));
        assert!(sel.commit().is_none());
    }

    #[test]
    fn test_single_mode_collapses_extension() {
        let mut sel = SelectionManager::new(SelectionMode::Single);
        sel.begin(CellPosition::new(0, 0), false);
        sel.extend(CellPosition::new(3, 2));
        assert_eq!(
            sel.pointer_state(),
            PointerState::Anchored {
                anchor: CellPosition::new(3, 2)
            }
        );
        sel.commit();
        assert_eq!(sel.get_ranges(), &[CellRange::new(3, 3, 2, 2)]);
    }

    #[test]
    fn test_mode_none_ignores_ranges() {
        let mut sel = SelectionManager::new(SelectionMode::None);
        sel.begin(CellPosition::new(0, 0), false);
        sel.select_range(CellRange::new(0, 1, 0, 1));
        assert!(sel.get_ranges().is_empty());
        assert_eq!(sel.pointer_state(), PointerState::None);
    }

    #[test]
    fn test_pick_lists() {
        let mut sel = SelectionManager::default();
        sel.select_rows([RowId::new("a"), RowId::new("b")]);
        sel.deselect_rows([&RowId::new("a")]);
        assert!(sel.is_row_selected(&RowId::new("b")));
        assert!(!sel.is_row_selected(&RowId::new("a")));

        sel.select_columns(["price".to_string()]);
        sel.deselect_columns(["price"]);
        assert!(sel.selected_columns().is_empty());
    }

    #[test]
    fn test_single_row_mode_keeps_last_pick() {
        let mut sel = SelectionManager::default();
        sel.set_row_mode(SelectionMode::Single);
        sel.select_rows([RowId::new("a"), RowId::new("b")]);
        sel.select_rows([RowId::new("c")]);
        assert_eq!(sel.selected_rows().len(), 1);
        assert!(sel.is_row_selected(&RowId::new("c")));

        sel.set_row_mode(SelectionMode::None);
        sel.select_rows([RowId::new("d")]);
        assert!(sel.selected_rows().is_empty());
    }
}
