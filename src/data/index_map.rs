//! Logical-to-physical row index mapping.
//!
//! Every translation between a row position the user sees and a position in
//! some backing array goes through here: page slicing, the offset of a
//! remote data window, the compression caused by expanded ancestor rows, and
//! ghost detection for pinned records.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::ops::Range;

use crate::data::datatable::RowId;
use crate::data::pinning::RowPinRegistry;

/// Where the row array behind the view starts, logically
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexMapping {
    /// The array holds every record; index 0 is logical row 0
    #[default]
    Local,
    /// The array holds one window of a remote result starting at `offset`
    Remote { offset: usize },
}

impl IndexMapping {
    pub fn offset(&self) -> usize {
        match self {
            IndexMapping::Local => 0,
            IndexMapping::Remote { offset } => *offset,
        }
    }

    /// Array index for a logical row, if the row lies inside the array
    pub fn to_physical(&self, logical: usize) -> Option<usize> {
        logical.checked_sub(self.offset())
    }

    pub fn to_logical(&self, physical: usize) -> usize {
        physical + self.offset()
    }
}

/// One page of the unpinned body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingWindow {
    /// Zero based
    pub page: usize,
    pub page_size: usize,
}

impl PagingWindow {
    pub fn new(page: usize, page_size: usize) -> Self {
        Self { page, page_size }
    }

    pub fn offset(&self) -> usize {
        self.page.saturating_mul(self.page_size)
    }

    pub fn page_count(&self, total: usize) -> usize {
        if self.page_size == 0 {
            return 1;
        }
        total.div_ceil(self.page_size).max(1)
    }

    /// Slice bounds of this page over `total` rows. A page past the end is
    /// clamped to the last page.
    pub fn bounds(&self, total: usize) -> Range<usize> {
        if self.page_size == 0 {
            return 0..total;
        }
        let last_page = self.page_count(total) - 1;
        let start = self.page.min(last_page) * self.page_size;
        let end = (start + self.page_size).min(total);
        start.min(total)..end
    }
}

/// Row positions of expanded rows (rows showing a nested child grid)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpansionState {
    expanded: BTreeSet<usize>,
}

impl ExpansionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn expand(&mut self, row: usize) -> bool {
        self.expanded.insert(row)
    }

    pub fn collapse(&mut self, row: usize) -> bool {
        self.expanded.remove(&row)
    }

    pub fn is_expanded(&self, row: usize) -> bool {
        self.expanded.contains(&row)
    }

    pub fn clear(&mut self) {
        self.expanded.clear();
    }

    pub fn len(&self) -> usize {
        self.expanded.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expanded.is_empty()
    }

    /// Number of expanded rows strictly before `index`
    pub fn expanded_before(&self, index: usize) -> usize {
        self.expanded.range(..index).count()
    }
}

/// Remove the compression caused by expanded rows: one is subtracted for
/// every expanded row positioned before `index`. All expansions present in
/// `state` are treated as already applied, whatever order they happened in.
pub fn adjust_for_expansion(index: usize, state: &ExpansionState) -> usize {
    index.saturating_sub(state.expanded_before(index))
}

/// Source index for a selected row: expansion compression first, then the
/// remote offset. `None` when the row is not backed by the current array.
pub fn selection_to_source(
    row: usize,
    state: &ExpansionState,
    mapping: &IndexMapping,
) -> Option<usize> {
    mapping.to_physical(adjust_for_expansion(row, state))
}

/// A pinned record absent from the materialized pinned slice
pub fn is_ghost(registry: &RowPinRegistry, id: &RowId, windowed_pinned: &HashSet<RowId>) -> bool {
    registry.is_pinned(id) && !windowed_pinned.contains(id)
}
