//! The grid engine: owns the column model, pin registry, query state and
//! pending edits, and composes them into a committed view on `flush()`.
//!
//! Mutations only mark the engine dirty. Many mutations inside one host
//! tick collapse into a single recompute when the host calls `flush()`.
//! Reads always see the last committed view.

use anyhow::{anyhow, bail, Context, Result};
use std::collections::HashSet;
use std::ops::Range;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::GridConfig;
use crate::core::generation::{GenerationCache, GenerationCounter};
use crate::core::search_manager::{MatchRecord, SearchManager, SearchOptions};
use crate::core::selection_manager::{
    CellPosition, CellRange, ExtractOptions, Extraction, SelectionManager,
};
use crate::data::column_model::{ColumnModel, ColumnSpec, ColumnWidth};
use crate::data::data_view::{ComposeRequest, ComposedView, ViewComposer};
use crate::data::datatable::{DataRow, DataTable, RowId};
use crate::data::filtering::FilterTree;
use crate::data::index_map::{ExpansionState, IndexMapping, PagingWindow};
use crate::data::pending_edits::{ChangeKind, PendingEditLog, TransactionLog};
use crate::data::pinning::{self, DropPosition, PinPosition, RowPinRegistry};
use crate::data::sorting::SortExpression;
use crate::state::dispatcher::{GridDispatcher, GridSubscriber};
use crate::state::events::{Cancel, GridChange, GridEvent};
use crate::state::persistence::GridStateSnapshot;
use crate::ui::viewport::column_width_calculator::{ColumnWidthCalculator, ContainerWidth, ResolvedWidths};
use crate::ui::viewport_manager::{RecycledRow, RestoreOutcome, ViewportManager, WindowChange};

/// Outcome of a cancelable operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// Change committed; a recompute was requested if anything moved
    Done,
    /// Nothing to do (already in the requested state)
    Unchanged,
    /// A subscriber vetoed the change
    Vetoed(Cancel),
}

impl Applied {
    pub fn is_done(&self) -> bool {
        matches!(self, Applied::Done)
    }
}

pub struct GridEngine {
    config: GridConfig,
    table: DataTable,
    columns: ColumnModel,
    pins: RowPinRegistry,
    filter: Option<FilterTree>,
    sort: Vec<SortExpression>,
    paging: Option<PagingWindow>,
    mapping: IndexMapping,
    edits: TransactionLog,
    expansion: ExpansionState,
    next_added: usize,

    composer: ViewComposer,
    view: Arc<ComposedView>,
    view_generation: GenerationCounter,
    dirty: bool,

    viewport: ViewportManager,
    widths: ColumnWidthCalculator,
    search: SearchManager,
    selection: SelectionManager,
    dispatcher: GridDispatcher,

    /// Windowed pinned ids, keyed by window and pin registry generation
    ghost_cache: GenerationCache<(Range<usize>, u64), HashSet<RowId>>,
}

impl GridEngine {
    /// Engine over `table` with columns inferred from it and default config
    pub fn from_table(table: DataTable) -> Self {
        let columns = ColumnModel::infer_from(&table);
        Self::with_columns(table, columns, GridConfig::default())
    }

    /// Engine with declared columns and explicit config
    pub fn from_config(table: DataTable, specs: &[ColumnSpec], config: GridConfig) -> Result<Self> {
        let columns = if specs.is_empty() {
            ColumnModel::infer_from(&table)
        } else {
            ColumnModel::from_specs(specs)?
        };
        Ok(Self::with_columns(table, columns, config))
    }

    fn with_columns(table: DataTable, mut columns: ColumnModel, config: GridConfig) -> Self {
        columns.set_pin_position(config.pinning.column_position);
        columns.set_max_pinned(config.pinning.max_pinned_columns);
        pinning::normalize_column_pins(&mut columns);

        let mut selection = SelectionManager::new(config.selection.cell_mode);
        selection.set_row_mode(config.selection.row_mode);

        let mut search = SearchManager::with_options(config.search.options());
        search.set_scroll_into_view(config.search.scroll_into_view);

        info!(
            target: "grid",
            "GridEngine over '{}': {} rows, {} columns",
            table.name,
            table.row_count(),
            columns.visible_leaves().len()
        );

        let mut engine = Self {
            pins: RowPinRegistry::new(config.rows.pin_position),
            paging: config.paging.initial_window(),
            viewport: ViewportManager::new(config.rows.chunk_size),
            widths: ColumnWidthCalculator::new(config.columns.width_settings()),
            config,
            table,
            columns,
            filter: None,
            sort: Vec::new(),
            mapping: IndexMapping::Local,
            edits: TransactionLog::new(),
            expansion: ExpansionState::new(),
            next_added: 0,
            composer: ViewComposer::default(),
            view: Arc::new(ComposedView::default()),
            view_generation: GenerationCounter::new(),
            dirty: false,
            search,
            selection,
            dispatcher: GridDispatcher::new(),
            ghost_cache: GenerationCache::new(),
        };
        engine.request_recompute();
        engine
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn table(&self) -> &DataTable {
        &self.table
    }

    pub fn columns(&self) -> &ColumnModel {
        &self.columns
    }

    pub fn pins(&self) -> &RowPinRegistry {
        &self.pins
    }

    pub fn viewport(&self) -> &ViewportManager {
        &self.viewport
    }

    pub fn selection(&self) -> &SelectionManager {
        &self.selection
    }

    pub fn search_state(&self) -> &SearchManager {
        &self.search
    }

    pub fn filter(&self) -> Option<&FilterTree> {
        self.filter.as_ref()
    }

    pub fn sort(&self) -> &[SortExpression] {
        &self.sort
    }

    pub fn paging(&self) -> Option<PagingWindow> {
        self.paging
    }

    pub fn expansion(&self) -> &ExpansionState {
        &self.expansion
    }

    /// The last committed view
    pub fn view(&self) -> Arc<ComposedView> {
        Arc::clone(&self.view)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn subscribe(&mut self, subscriber: Box<dyn GridSubscriber>) {
        self.dispatcher.subscribe(subscriber);
    }

    /// Queued rendering signals, oldest first
    pub fn drain_signals(&mut self) -> Vec<GridEvent> {
        self.dispatcher.drain_signals()
    }

    pub fn event_history(&self) -> &[GridEvent] {
        self.dispatcher.get_event_history()
    }

    // ----- two-phase recompute -----

    /// Mark the view stale. Cheap and idempotent: only the first call of a
    /// batch emits `RecomputeRequested`.
    pub fn request_recompute(&mut self) {
        if self.dirty {
            return;
        }
        self.dirty = true;
        self.dispatcher.dispatch(GridEvent::RecomputeRequested);
    }

    /// Compose and commit a new view if anything changed. Returns whether a
    /// new generation was committed. On error the previous view stays.
    pub fn flush(&mut self) -> Result<bool> {
        if !self.dirty {
            return Ok(false);
        }

        let next = self.view_generation.current().next();
        let request = ComposeRequest {
            table: &self.table,
            filter: self.filter.as_ref(),
            sort: &self.sort,
            pins: &self.pins,
            paging: self.paging,
            mapping: self.mapping,
            edits: Some(&self.edits),
            show_deleted: self.config.editing.show_deleted_rows,
        };

        let composed = match self.composer.compose(&request, next) {
            Ok(view) => view,
            Err(e) => {
                warn!(target: "grid", "Recompute failed, keeping generation {}: {}", self.view_generation.current(), e);
                self.dirty = false;
                return Err(e);
            }
        };

        let generation = self.view_generation.bump();
        let rows = composed.len();
        self.view = Arc::new(composed);
        self.dirty = false;

        self.viewport.on_view_len_changed(rows);

        if self.search.has_active_search() {
            let text = self.search.text().to_string();
            self.rebuild_search(&text, self.search.options());
        }

        debug!(target: "grid", "Committed generation {} with {} rows", generation, rows);
        self.dispatcher.dispatch(GridEvent::ViewComposed { generation, rows });
        self.dispatcher.dispatch(GridEvent::RepaintRequested { generation });
        Ok(true)
    }

    fn veto(&mut self, change: GridChange) -> Option<Cancel> {
        self.dispatcher.check(&change).err()
    }

    // ----- row pinning -----

    /// Pin a record, optionally at a position within the pin order
    pub fn pin_row(&mut self, id: RowId, at: Option<usize>) -> Applied {
        if self.pins.is_pinned(&id) {
            return Applied::Unchanged;
        }
        if let Some(cancel) = self.veto(GridChange::PinRow { id: id.clone(), at }) {
            return Applied::Vetoed(cancel);
        }
        self.pins.pin(id.clone(), at);
        self.dispatcher.dispatch(GridEvent::RowPinned { id });
        self.request_recompute();
        Applied::Done
    }

    pub fn unpin_row(&mut self, id: &RowId) -> Applied {
        if !self.pins.is_pinned(id) {
            return Applied::Unchanged;
        }
        if let Some(cancel) = self.veto(GridChange::UnpinRow { id: id.clone() }) {
            return Applied::Vetoed(cancel);
        }
        self.pins.unpin(id);
        self.dispatcher.dispatch(GridEvent::RowUnpinned { id: id.clone() });
        self.request_recompute();
        Applied::Done
    }

    pub fn set_row_pin_position(&mut self, position: PinPosition) {
        if self.pins.position() != position {
            self.pins.set_position(position);
            self.request_recompute();
        }
    }

    // ----- columns -----

    /// Pin or unpin a column (and its whole top-level group)
    pub fn set_column_pinned(&mut self, field: &str, pinned: bool) -> Result<Applied> {
        self.columns.require(field)?;
        let change = if pinned {
            GridChange::PinColumn { field: field.to_string() }
        } else {
            GridChange::UnpinColumn { field: field.to_string() }
        };
        if let Some(cancel) = self.veto(change) {
            return Ok(Applied::Vetoed(cancel));
        }

        let outcome = pinning::set_column_pinned(&mut self.columns, field, pinned)?;
        if !outcome.applied {
            return Ok(Applied::Unchanged);
        }

        if outcome.affected.is_empty() {
            // Only a stray member flag was repaired
            self.dispatcher.dispatch(GridEvent::PinStateNormalized {
                fields: vec![field.to_string()],
            });
            return Ok(Applied::Done);
        }

        let event = if pinned {
            GridEvent::ColumnPinned {
                field: field.to_string(),
                affected: outcome.affected.clone(),
            }
        } else {
            GridEvent::ColumnUnpinned {
                field: field.to_string(),
                affected: outcome.affected.clone(),
            }
        };
        self.dispatcher.dispatch(event);
        if outcome.group_adjusted {
            self.dispatcher.dispatch(GridEvent::PinStateNormalized {
                fields: outcome.affected,
            });
        }
        self.widths.mark_dirty();
        self.refresh_search_columns();
        Ok(Applied::Done)
    }

    pub fn pin_column(&mut self, field: &str) -> Result<Applied> {
        self.set_column_pinned(field, true)
    }

    pub fn unpin_column(&mut self, field: &str) -> Result<Applied> {
        self.set_column_pinned(field, false)
    }

    /// Drag `source` before/after `target`
    pub fn move_column(&mut self, source: &str, target: &str, position: DropPosition) -> Result<bool> {
        let outcome = pinning::move_column(&mut self.columns, source, target, position)?;
        if !outcome.moved {
            return Ok(false);
        }
        self.dispatcher.dispatch(GridEvent::ColumnMoved {
            field: source.to_string(),
            target: target.to_string(),
            pin_changed: outcome.pin_changed,
        });
        if outcome.normalized {
            self.dispatcher.dispatch(GridEvent::PinStateNormalized {
                fields: vec![source.to_string()],
            });
        }
        self.refresh_search_columns();
        Ok(true)
    }

    pub fn hide_column(&mut self, field: &str) -> Result<()> {
        self.columns.set_hidden(field, true)?;
        self.refresh_search_columns();
        Ok(())
    }

    pub fn show_column(&mut self, field: &str) -> Result<()> {
        self.columns.set_hidden(field, false)?;
        self.refresh_search_columns();
        Ok(())
    }

    pub fn resize_column(&mut self, field: &str, width: Option<ColumnWidth>) -> Result<()> {
        self.columns.set_width(field, width)
    }

    // Visible columns changed under an active search
    fn refresh_search_columns(&mut self) {
        if self.search.has_active_search() {
            let text = self.search.text().to_string();
            self.rebuild_search(&text, self.search.options());
        }
    }

    /// Resolve column widths for a container, feeding the viewport
    pub fn layout(&mut self, container: ContainerWidth) -> &ResolvedWidths {
        let feature_width = self.widths.settings().feature_width;
        let resolved = self.widths.get_widths(&self.columns, container);
        self.viewport.set_column_widths(resolved.widths());
        // Data columns share what the feature columns leave over
        if let Some(width) = container.container.or(container.rendered) {
            self.viewport.set_viewport_width(width.saturating_sub(feature_width));
        }
        resolved
    }

    pub fn width_recompute_count(&self) -> u64 {
        self.widths.recompute_count()
    }

    // ----- query state -----

    pub fn set_filter(&mut self, filter: Option<FilterTree>) {
        self.filter = filter;
        self.request_recompute();
    }

    pub fn set_sort(&mut self, sort: Vec<SortExpression>) {
        self.sort = sort;
        self.request_recompute();
    }

    pub fn set_paging(&mut self, paging: Option<PagingWindow>) {
        self.paging = paging;
        self.request_recompute();
    }

    /// Move to another page of the unpinned rows
    pub fn go_to_page(&mut self, page: usize) -> Result<()> {
        let window = self
            .paging
            .ok_or_else(|| anyhow!("Paging is not enabled"))?;
        self.set_paging(Some(PagingWindow::new(page, window.page_size)));
        Ok(())
    }

    /// Logical start of a remote data window; `None` for local data
    pub fn set_remote_offset(&mut self, offset: Option<usize>) {
        self.mapping = match offset {
            Some(offset) => IndexMapping::Remote { offset },
            None => IndexMapping::Local,
        };
        self.request_recompute();
    }

    pub fn expand_row(&mut self, row: usize) -> bool {
        self.expansion.expand(row)
    }

    pub fn collapse_row(&mut self, row: usize) -> bool {
        self.expansion.collapse(row)
    }

    // ----- pending edits -----

    fn check_arity(&self, values: &DataRow) -> Result<()> {
        let expected = self.table.column_count();
        if values.len() != expected {
            bail!(
                "Record has {} value(s) but table '{}' has {} column(s)",
                values.len(),
                self.table.name,
                expected
            );
        }
        Ok(())
    }

    /// Stage a new record at `index` within the current page (first when
    /// `None`). Returns the id it was staged under.
    pub fn add_record(&mut self, values: DataRow, index: Option<usize>) -> Result<RowId> {
        self.check_arity(&values)?;
        self.next_added += 1;
        let id = RowId::new(format!("new-{}", self.next_added));
        self.edits.add(id.clone(), values, index);
        self.request_recompute();
        Ok(id)
    }

    pub fn update_record(&mut self, id: RowId, values: DataRow) -> Result<()> {
        self.check_arity(&values)?;
        self.edits.update(id, values);
        self.request_recompute();
        Ok(())
    }

    pub fn delete_record(&mut self, id: RowId) {
        self.edits.delete(id);
        self.request_recompute();
    }

    pub fn pending_edit_count(&self) -> usize {
        self.edits.len()
    }

    /// Apply staged edits to the table. Every change is checked first; on
    /// error the table, pins, selection and staged edits are left as they were.
    pub fn commit_edits(&mut self) -> Result<usize> {
        let changes = self.edits.get_aggregated_changes();
        if changes.is_empty() {
            return Ok(0);
        }

        let ids = self.table.id_index();
        let mut adds = Vec::new();
        let mut updates = Vec::new();
        let mut deletes = Vec::new();
        for change in &changes {
            match (&change.kind, &change.value) {
                (ChangeKind::Add { .. }, Some(values)) => {
                    self.check_arity(values)
                        .with_context(|| format!("Cannot add record {}", change.id))?;
                    adds.push(values.clone());
                }
                (ChangeKind::Update, Some(values)) => {
                    let &idx = ids
                        .get(&change.id)
                        .ok_or_else(|| anyhow!("Cannot update unknown record {}", change.id))?;
                    self.check_arity(values)
                        .with_context(|| format!("Cannot update record {}", change.id))?;
                    updates.push((idx, values.clone()));
                }
                (ChangeKind::Delete, _) => {
                    let &idx = ids
                        .get(&change.id)
                        .ok_or_else(|| anyhow!("Cannot delete unknown record {}", change.id))?;
                    deletes.push((idx, change.id.clone()));
                }
                _ => {}
            }
        }

        self.edits.clear();
        for (idx, values) in updates {
            self.table.rows[idx] = values;
        }
        for (_, id) in &deletes {
            self.pins.unpin(id);
            self.selection.deselect_rows([id]);
        }
        let mut removed: Vec<usize> = deletes.into_iter().map(|(idx, _)| idx).collect();
        removed.sort_unstable();
        for idx in removed.into_iter().rev() {
            self.table.rows.remove(idx);
        }
        // Arity was checked above
        self.table.rows.extend(adds);

        info!(target: "pending_edits", "Committed {} change(s) to '{}'", changes.len(), self.table.name);
        self.request_recompute();
        Ok(changes.len())
    }

    pub fn discard_edits(&mut self) {
        if !self.edits.is_empty() {
            self.edits.clear();
            self.request_recompute();
        }
    }

    // ----- search -----

    fn rebuild_search(&mut self, text: &str, options: SearchOptions) -> usize {
        let before = self.search.rebuild_count();
        let count = self.search.build(text, options, &self.view, &self.table, &self.columns);
        if self.search.rebuild_count() != before {
            self.dispatcher.dispatch(GridEvent::SearchRebuilt {
                text: text.to_string(),
                matches: count,
            });
        }
        count
    }

    /// Build the match list over the committed view
    pub fn search(&mut self, text: &str, options: SearchOptions) -> usize {
        self.rebuild_search(text, options)
    }

    /// Search with the configured default options
    pub fn search_text(&mut self, text: &str) -> usize {
        self.rebuild_search(text, self.config.search.options())
    }

    /// Move to the next/previous match, scrolling unpinned hits into view
    /// unless suppressed
    pub fn advance_search(&mut self, delta: isize) -> Option<MatchRecord> {
        let hit = self.search.advance(delta)?.clone();
        if self.search.needs_scroll(&hit) {
            let change = self.viewport.scroll_into_view(hit.row, self.view.len());
            if change.viewport_changed {
                debug!(target: "search", "Scrolled window to {} for match at row {}", change.window.start_index, hit.row);
            }
        }
        // Selection works in logical view indices, the match in composed positions
        let view_index = self.view.mapping().to_logical(hit.row);
        self.selection.set_active_cell(Some(CellPosition::new(view_index, hit.column)));
        Some(hit)
    }

    pub fn clear_search(&mut self) {
        self.search.clear();
    }

    // ----- selection -----

    pub fn begin_selection(&mut self, cell: CellPosition, additive: bool) {
        self.selection.begin(cell, additive);
        self.dispatcher.dispatch(GridEvent::SelectionChanged);
    }

    pub fn extend_selection(&mut self, cell: CellPosition) -> bool {
        let extended = self.selection.extend(cell);
        if extended {
            self.dispatcher.dispatch(GridEvent::SelectionChanged);
        }
        extended
    }

    pub fn commit_selection(&mut self) -> Option<CellRange> {
        let range = self.selection.commit();
        if range.is_some() {
            self.dispatcher.dispatch(GridEvent::SelectionChanged);
        }
        range
    }

    pub fn select_range(&mut self, range: CellRange) {
        self.selection.select_range(range);
        self.dispatcher.dispatch(GridEvent::SelectionChanged);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
        self.selection.clear_rows();
        self.selection.clear_columns();
        self.dispatcher.dispatch(GridEvent::SelectionChanged);
    }

    pub fn select_rows<I: IntoIterator<Item = RowId>>(&mut self, ids: I) {
        self.selection.select_rows(ids);
        self.dispatcher.dispatch(GridEvent::SelectionChanged);
    }

    pub fn deselect_rows<'a, I: IntoIterator<Item = &'a RowId>>(&mut self, ids: I) {
        self.selection.deselect_rows(ids);
        self.dispatcher.dispatch(GridEvent::SelectionChanged);
    }

    /// Select the filtered rows, or every record when `unfiltered`
    pub fn select_all_rows(&mut self, unfiltered: bool) {
        self.selection.select_all_rows(&self.view, &self.table, unfiltered);
        self.dispatcher.dispatch(GridEvent::SelectionChanged);
    }

    pub fn select_columns<I: IntoIterator<Item = String>>(&mut self, fields: I) {
        self.selection.select_columns(fields);
        self.dispatcher.dispatch(GridEvent::SelectionChanged);
    }

    /// Project the selection onto the committed view
    pub fn extract(&self, options: ExtractOptions) -> Extraction {
        self.selection
            .extract(&self.view, &self.table, &self.columns, &self.expansion, options)
    }

    /// Extract with the configured copy options
    pub fn copy_selection(&self) -> Extraction {
        self.extract(ExtractOptions {
            include_formatters: self.config.selection.copy_formatted,
            include_headers: self.config.selection.copy_headers,
        })
    }

    // ----- viewport -----

    pub fn window_range(&self) -> Range<usize> {
        self.viewport.materialized(self.view.len())
    }

    pub fn scroll_to(&mut self, start_index: usize) -> WindowChange {
        self.viewport.set_window_start(start_index, self.view.len())
    }

    pub fn scroll_by(&mut self, delta: isize) -> WindowChange {
        self.viewport.scroll_by(delta, self.view.len())
    }

    /// Size the window for a viewport height in pixels
    pub fn set_viewport_height(&mut self, height: u32) -> WindowChange {
        let row_height = self.config.rows.row_height.max(1);
        let rows = height.div_ceil(row_height) as usize;
        self.viewport.set_chunk_size(rows, self.view.len())
    }

    pub fn set_scroll_left(&mut self, scroll_left: u32) {
        self.viewport.set_scroll_left(scroll_left);
    }

    /// Reconcile a recycled row with the current horizontal scroll
    pub fn restore_row(&mut self, row: RecycledRow) -> RestoreOutcome {
        self.viewport.restore(row, self.view.len())
    }

    /// Whether the record at composed `position` is pinned but outside the
    /// materialized pinned slice
    pub fn is_ghost(&mut self, position: usize) -> bool {
        let window = self.viewport.materialized(self.view.len());
        let key = (window, self.pins.generation().value());
        let view = Arc::clone(&self.view);
        let windowed = self
            .ghost_cache
            .get_or_compute(view.generation(), key, |(window, _)| view.pinned_in(window.clone()));
        view.is_ghost(position, windowed, &self.pins)
    }

    // ----- persistence -----

    pub fn save_state(&self) -> GridStateSnapshot {
        GridStateSnapshot {
            columns: self.columns.to_state(),
            pinned_rows: self.pins.pinned_ids().to_vec(),
            row_pin_position: self.pins.position(),
            sort: self.sort.clone(),
            filter: self.filter.clone(),
            paging: self.paging,
        }
    }

    /// Replace the user's arrangement with a saved one
    pub fn restore_state(&mut self, snapshot: GridStateSnapshot) {
        self.columns.apply_state(&snapshot.columns);
        if pinning::normalize_column_pins(&mut self.columns) {
            self.dispatcher.dispatch(GridEvent::PinStateNormalized {
                fields: self
                    .columns
                    .leaves_in_order()
                    .into_iter()
                    .filter_map(|idx| self.columns.get(idx).map(|c| c.field.clone()))
                    .collect(),
            });
        }

        self.pins.clear();
        self.pins.set_position(snapshot.row_pin_position);
        for id in snapshot.pinned_rows {
            self.pins.pin(id, None);
        }
        self.sort = snapshot.sort;
        self.filter = snapshot.filter;
        self.paging = snapshot.paging;

        info!(target: "grid", "Restored state: {} pinned rows, {} sort keys", self.pins.len(), self.sort.len());
        self.request_recompute();
    }
}
