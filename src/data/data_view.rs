use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::ops::Range;
use tracing::debug;

use crate::core::generation::Generation;
use crate::data::datatable::{DataRow, DataTable, DataValue, RowId};
use crate::data::filtering::{DefaultFilteringStrategy, FilterTree, FilteringStrategy};
use crate::data::index_map::{self, IndexMapping, PagingWindow};
use crate::data::pending_edits::{ChangeKind, PendingEditLog};
use crate::data::pinning::{partition_rows, PinPosition, RowPinRegistry};
use crate::data::sorting::{DefaultSortingStrategy, SortExpression, SortingStrategy};

/// Where a composed row's values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowSource {
    /// Raw index into the data table
    Data(usize),
    /// Index into the view's uncommitted added rows
    Added(usize),
}

/// One row of the composed view
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewRow {
    pub id: RowId,
    pub source: RowSource,
    pub pinned: bool,
    /// Deleted but not yet committed; only present when ghosts are shown
    pub deleted: bool,
}

/// Everything a composition depends on
pub struct ComposeRequest<'a> {
    pub table: &'a DataTable,
    pub filter: Option<&'a FilterTree>,
    pub sort: &'a [SortExpression],
    pub pins: &'a RowPinRegistry,
    pub paging: Option<PagingWindow>,
    pub mapping: IndexMapping,
    pub edits: Option<&'a dyn PendingEditLog>,
    /// Keep uncommitted deletions in the sequence, flagged as deleted
    pub show_deleted: bool,
}

impl<'a> ComposeRequest<'a> {
    pub fn new(table: &'a DataTable, pins: &'a RowPinRegistry) -> Self {
        Self {
            table,
            filter: None,
            sort: &[],
            pins,
            paging: None,
            mapping: IndexMapping::Local,
            edits: None,
            show_deleted: false,
        }
    }
}

/// The ordered pinned + unpinned row sequence
#[derive(Debug, Clone, PartialEq)]
pub struct ComposedView {
    rows: Vec<ViewRow>,
    pinned_count: usize,
    position: PinPosition,
    mapping: IndexMapping,
    added: Vec<DataRow>,
    deleted: HashSet<RowId>,
    data_to_view: HashMap<usize, usize>,
    id_to_view: HashMap<RowId, usize>,
    /// Unpinned rows before page slicing
    unpinned_total: usize,
    /// Every row passing the filter, across all pages
    filtered_ids: Vec<RowId>,
    generation: Generation,
}

impl Default for ComposedView {
    fn default() -> Self {
        Self::empty(Generation::INITIAL)
    }
}

impl ComposedView {
    pub fn empty(generation: Generation) -> Self {
        Self {
            rows: Vec::new(),
            pinned_count: 0,
            position: PinPosition::Start,
            mapping: IndexMapping::Local,
            added: Vec::new(),
            deleted: HashSet::new(),
            data_to_view: HashMap::new(),
            id_to_view: HashMap::new(),
            unpinned_total: 0,
            filtered_ids: Vec::new(),
            generation,
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn rows(&self) -> &[ViewRow] {
        &self.rows
    }

    /// Row at a position of the composed array (not a logical index)
    pub fn row(&self, position: usize) -> Option<&ViewRow> {
        self.rows.get(position)
    }

    pub fn pinned_count(&self) -> usize {
        self.pinned_count
    }

    pub fn pin_position(&self) -> PinPosition {
        self.position
    }

    pub fn mapping(&self) -> IndexMapping {
        self.mapping
    }

    /// Unpinned row count before paging
    pub fn unpinned_total(&self) -> usize {
        self.unpinned_total
    }

    /// Ids of every filtered row in composed order, ignoring paging.
    /// Uncommitted additions are included.
    pub fn filtered_ids(&self) -> &[RowId] {
        &self.filtered_ids
    }

    pub fn pinned_range(&self) -> Range<usize> {
        match self.position {
            PinPosition::Start => 0..self.pinned_count,
            PinPosition::End => self.rows.len() - self.pinned_count..self.rows.len(),
        }
    }

    pub fn unpinned_range(&self) -> Range<usize> {
        match self.position {
            PinPosition::Start => self.pinned_count..self.rows.len(),
            PinPosition::End => 0..self.rows.len() - self.pinned_count,
        }
    }

    /// View index of a raw data index
    pub fn to_view_index(&self, data_index: usize) -> Option<usize> {
        self.data_to_view
            .get(&data_index)
            .map(|&position| self.mapping.to_logical(position))
    }

    /// Raw data index behind a view index; `None` for added rows
    pub fn to_data_index(&self, view_index: usize) -> Option<usize> {
        let position = self.mapping.to_physical(view_index)?;
        match self.rows.get(position)?.source {
            RowSource::Data(idx) => Some(idx),
            RowSource::Added(_) => None,
        }
    }

    pub fn view_index_of(&self, id: &RowId) -> Option<usize> {
        self.id_to_view
            .get(id)
            .map(|&position| self.mapping.to_logical(position))
    }

    pub fn id_at(&self, view_index: usize) -> Option<&RowId> {
        let position = self.mapping.to_physical(view_index)?;
        self.rows.get(position).map(|r| &r.id)
    }

    /// Cell value at a composed position, resolving added rows
    pub fn value<'t>(&'t self, table: &'t DataTable, position: usize, column: usize) -> Option<&'t DataValue> {
        match self.rows.get(position)?.source {
            RowSource::Data(idx) => table.get_value(idx, column),
            RowSource::Added(idx) => self.added.get(idx)?.get(column),
        }
    }

    pub fn added_rows(&self) -> &[DataRow] {
        &self.added
    }

    /// Deleted but uncommitted, whether or not it is shown
    pub fn is_deleted(&self, id: &RowId) -> bool {
        self.deleted.contains(id)
    }

    /// Ids of the pinned rows inside a window of composed positions
    pub fn pinned_in(&self, window: Range<usize>) -> HashSet<RowId> {
        let pinned = self.pinned_range();
        let start = window.start.max(pinned.start);
        let end = window.end.min(pinned.end);
        if start >= end {
            return HashSet::new();
        }
        self.rows[start..end].iter().map(|r| r.id.clone()).collect()
    }

    /// Pinned record not present in the materialized pinned slice
    pub fn is_ghost(&self, position: usize, windowed_pinned: &HashSet<RowId>, pins: &RowPinRegistry) -> bool {
        self.rows
            .get(position)
            .map(|row| index_map::is_ghost(pins, &row.id, windowed_pinned))
            .unwrap_or(false)
    }
}

impl fmt::Display for ComposedView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.rows.iter().map(|r| r.id.as_str()).collect();
        write!(
            f,
            "ComposedView[{} rows, {} pinned]: {}",
            self.rows.len(),
            self.pinned_count,
            ids.join(", ")
        )
    }
}

/// Builds composed views, delegating filtering and sorting to collaborators
pub struct ViewComposer {
    filtering: Box<dyn FilteringStrategy>,
    sorting: Box<dyn SortingStrategy>,
}

impl Default for ViewComposer {
    fn default() -> Self {
        Self::new(Box::new(DefaultFilteringStrategy), Box::new(DefaultSortingStrategy))
    }
}

impl ViewComposer {
    pub fn new(filtering: Box<dyn FilteringStrategy>, sorting: Box<dyn SortingStrategy>) -> Self {
        Self { filtering, sorting }
    }

    fn filter_and_sort(&self, request: &ComposeRequest<'_>, rows: Vec<usize>) -> Result<Vec<usize>> {
        if rows.is_empty() {
            return Ok(rows);
        }
        let rows = match request.filter {
            Some(tree) => self.filtering.filter(request.table, rows, tree)?,
            None => rows,
        };
        if request.sort.is_empty() {
            return Ok(rows);
        }
        self.sorting.sort(request.table, rows, request.sort)
    }

    pub fn compose(&self, request: &ComposeRequest<'_>, generation: Generation) -> Result<ComposedView> {
        let table = request.table;
        let id_index = table.id_index();
        let changes = request
            .edits
            .map(|log| log.get_aggregated_changes())
            .unwrap_or_default();

        let deleted: HashSet<RowId> = changes
            .iter()
            .filter(|c| c.kind == ChangeKind::Delete)
            .map(|c| c.id.clone())
            .collect();

        let all: Vec<usize> = (0..table.row_count()).collect();
        let mut partition = partition_rows(request.pins, &id_index, &all);
        if !request.show_deleted && !deleted.is_empty() {
            let is_live = |idx: &usize| {
                table
                    .row_id(*idx)
                    .map(|id| !deleted.contains(&id))
                    .unwrap_or(true)
            };
            partition.pinned.retain(is_live);
            partition.unpinned.retain(is_live);
        }

        // Pinned and unpinned slices are filtered and sorted independently
        let pinned = self.filter_and_sort(request, partition.pinned)?;
        let unpinned = self.filter_and_sort(request, partition.unpinned)?;
        let unpinned_total = unpinned.len();

        let page = match request.paging {
            Some(paging) => paging.bounds(unpinned.len()),
            None => 0..unpinned.len(),
        };

        let to_row = |idx: usize, is_pinned: bool| -> Option<ViewRow> {
            let id = table.row_id(idx)?;
            let is_deleted = deleted.contains(&id);
            Some(ViewRow {
                id,
                source: RowSource::Data(idx),
                pinned: is_pinned,
                deleted: is_deleted,
            })
        };

        let pinned_rows: Vec<ViewRow> = pinned.into_iter().filter_map(|idx| to_row(idx, true)).collect();
        let mut body: Vec<ViewRow> = unpinned[page]
            .iter()
            .filter_map(|&idx| to_row(idx, false))
            .collect();

        // Uncommitted additions are spliced into the current page body
        let mut added = Vec::new();
        for change in &changes {
            if let ChangeKind::Add { index } = change.kind {
                let Some(value) = change.value.clone() else {
                    continue;
                };
                let at = index.unwrap_or(0).min(body.len());
                body.insert(
                    at,
                    ViewRow {
                        id: change.id.clone(),
                        source: RowSource::Added(added.len()),
                        pinned: false,
                        deleted: false,
                    },
                );
                added.push(value);
            }
        }

        let pinned_count = pinned_rows.len();
        let position = request.pins.position();

        let pinned_ids = pinned_rows.iter().map(|r| r.id.clone());
        let body_ids: Vec<RowId> = body
            .iter()
            .filter(|r| matches!(r.source, RowSource::Added(_)))
            .map(|r| r.id.clone())
            .chain(unpinned.iter().filter_map(|&idx| table.row_id(idx)))
            .collect();
        let filtered_ids: Vec<RowId> = match position {
            PinPosition::Start => pinned_ids.chain(body_ids).collect(),
            PinPosition::End => body_ids.into_iter().chain(pinned_ids).collect(),
        };

        let rows: Vec<ViewRow> = match position {
            PinPosition::Start => pinned_rows.into_iter().chain(body).collect(),
            PinPosition::End => body.into_iter().chain(pinned_rows).collect(),
        };

        let mut data_to_view = HashMap::with_capacity(rows.len());
        let mut id_to_view = HashMap::with_capacity(rows.len());
        for (position, row) in rows.iter().enumerate() {
            if let RowSource::Data(idx) = row.source {
                data_to_view.insert(idx, position);
            }
            id_to_view.insert(row.id.clone(), position);
        }

        debug!(
            target: "data_view",
            "Composed {} rows ({} pinned, {} unpinned of {}, {} added, {} deleted) at generation {}",
            rows.len(),
            pinned_count,
            rows.len() - pinned_count,
            unpinned_total,
            added.len(),
            deleted.len(),
            generation.value()
        );

        Ok(ComposedView {
            rows,
            pinned_count,
            position,
            mapping: request.mapping,
            added,
            deleted,
            data_to_view,
            id_to_view,
            unpinned_total,
            filtered_ids,
            generation,
        })
    }
}
