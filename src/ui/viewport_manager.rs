/// ViewportManager - the materialized window over a composed view
///
/// Only a bounded slice of the composed row sequence is rendered at a time.
/// This tracks that slice (the window), the horizontal scroll position and
/// the column window it implies, and reconciles rows recycled from a render
/// cache with the current scroll state.
///
/// Architecture:
/// DataTable (immutable storage)
///     → ComposedView (pinned + filtered/sorted/paged rows)
///         → ViewportManager (materialized window)
///             → Renderer (external)
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, trace};

/// Default number of rows materialized at once
pub const DEFAULT_CHUNK_SIZE: usize = 50;

/// Contiguous slice of the composed view that is materialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowState {
    pub start_index: usize,
    pub chunk_size: usize,
}

impl Default for WindowState {
    fn default() -> Self {
        Self {
            start_index: 0,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl WindowState {
    pub fn new(start_index: usize, chunk_size: usize) -> Self {
        Self {
            start_index,
            chunk_size,
        }
    }

    /// Materialized positions for a view of `len` rows
    pub fn range(&self, len: usize) -> Range<usize> {
        let start = self.start_index.min(len);
        start..(start + self.chunk_size).min(len)
    }

    /// Keep `start_index + chunk_size <= len` where possible. Returns true
    /// when the start moved.
    pub fn clamp_to(&mut self, len: usize) -> bool {
        let max_start = len.saturating_sub(self.chunk_size);
        if self.start_index > max_start {
            self.start_index = max_start;
            return true;
        }
        false
    }
}

/// Result of a vertical window operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowChange {
    pub window: WindowState,
    /// Whether the materialized slice moved
    pub viewport_changed: bool,
}

/// A row taken back from the render cache, with the horizontal offset it
/// was rendered under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecycledRow {
    pub view_index: usize,
    pub recorded_offset: i64,
}

/// What the renderer must do with a recycled row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreOutcome {
    /// Content fits the viewport; nothing to reconcile
    NoHorizontalScroll,
    /// Recorded offset already matches
    InSync { view_index: usize, offset: i64 },
    /// Re-render this row only, at the corrected offset
    Rerender { view_index: usize, expected_offset: i64 },
    /// The view has no rows
    Empty,
}

impl RestoreOutcome {
    pub fn needs_rerender(&self) -> bool {
        matches!(self, RestoreOutcome::Rerender { .. })
    }
}

pub struct ViewportManager {
    window: WindowState,
    /// Global horizontal scroll position in pixels
    scroll_left: u32,
    viewport_width: u32,
    /// Widths of the visible columns in display order
    column_widths: Vec<u32>,
    /// First column of the horizontal column window
    column_start: usize,
}

impl Default for ViewportManager {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ViewportManager {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            window: WindowState::new(0, chunk_size),
            scroll_left: 0,
            viewport_width: 0,
            column_widths: Vec::new(),
            column_start: 0,
        }
    }

    pub fn window(&self) -> WindowState {
        self.window
    }

    pub fn materialized(&self, view_len: usize) -> Range<usize> {
        self.window.range(view_len)
    }

    pub fn set_chunk_size(&mut self, chunk_size: usize, view_len: usize) -> WindowChange {
        let before = self.window;
        self.window.chunk_size = chunk_size.max(1);
        self.window.clamp_to(view_len);
        self.change_from(before)
    }

    fn change_from(&self, before: WindowState) -> WindowChange {
        WindowChange {
            window: self.window,
            viewport_changed: before != self.window,
        }
    }

    /// Move the window to start at `start_index`, clamped to the view
    pub fn set_window_start(&mut self, start_index: usize, view_len: usize) -> WindowChange {
        let before = self.window;
        self.window.start_index = start_index;
        self.window.clamp_to(view_len);
        debug!(target: "viewport", "Window start {} -> {}", before.start_index, self.window.start_index);
        self.change_from(before)
    }

    pub fn scroll_by(&mut self, row_delta: isize, view_len: usize) -> WindowChange {
        let start = self.window.start_index.saturating_add_signed(row_delta);
        self.set_window_start(start, view_len)
    }

    /// Composed view length changed (recompute, filter, paging)
    pub fn on_view_len_changed(&mut self, view_len: usize) -> WindowChange {
        let before = self.window;
        if self.window.clamp_to(view_len) {
            debug!(
                target: "viewport",
                "View shrank to {} rows; window start clamped {} -> {}",
                view_len,
                before.start_index,
                self.window.start_index
            );
        }
        self.change_from(before)
    }

    /// Shift the window just enough to materialize `view_position`
    pub fn scroll_into_view(&mut self, view_position: usize, view_len: usize) -> WindowChange {
        if view_len == 0 {
            return self.change_from(self.window);
        }
        let target = view_position.min(view_len - 1);
        let range = self.window.range(view_len);
        if range.contains(&target) {
            return self.change_from(self.window);
        }
        let start = if target < range.start {
            target
        } else {
            (target + 1).saturating_sub(self.window.chunk_size)
        };
        self.set_window_start(start, view_len)
    }

    pub fn set_viewport_width(&mut self, width: u32) {
        self.viewport_width = width;
        self.set_scroll_left(self.scroll_left);
    }

    pub fn viewport_width(&self) -> u32 {
        self.viewport_width
    }

    pub fn set_column_widths(&mut self, widths: Vec<u32>) {
        self.column_widths = widths;
        self.set_scroll_left(self.scroll_left);
    }

    pub fn content_width(&self) -> u32 {
        self.column_widths.iter().sum()
    }

    pub fn can_scroll_horizontally(&self) -> bool {
        self.content_width() > self.viewport_width
    }

    pub fn scroll_left(&self) -> u32 {
        self.scroll_left
    }

    /// Update the global horizontal scroll position and the column window
    pub fn set_scroll_left(&mut self, scroll_left: u32) {
        let max_scroll = self.content_width().saturating_sub(self.viewport_width);
        self.scroll_left = scroll_left.min(max_scroll);

        let mut edge = 0u32;
        self.column_start = 0;
        for (idx, width) in self.column_widths.iter().enumerate() {
            edge += width;
            if edge > self.scroll_left {
                self.column_start = idx;
                break;
            }
            self.column_start = idx + 1;
        }
        self.column_start = self.column_start.min(self.column_widths.len().saturating_sub(1));
        trace!(
            target: "viewport",
            "scroll_left={} column window starts at {}",
            self.scroll_left,
            self.column_start
        );
    }

    pub fn column_start(&self) -> usize {
        self.column_start
    }

    /// Total width of the columns before the column window
    pub fn width_before_column_start(&self) -> u32 {
        self.column_widths.iter().take(self.column_start).sum()
    }

    /// Offset a row rendered now would carry
    pub fn expected_row_offset(&self) -> i64 {
        self.scroll_left as i64 - self.width_before_column_start() as i64
    }

    /// Reconcile a recycled row with the current scroll state. The window is
    /// clamped first if the view shrank under it.
    pub fn restore(&mut self, row: RecycledRow, view_len: usize) -> RestoreOutcome {
        self.window.clamp_to(view_len);
        if view_len == 0 {
            return RestoreOutcome::Empty;
        }
        if !self.can_scroll_horizontally() {
            return RestoreOutcome::NoHorizontalScroll;
        }

        let view_index = row.view_index.min(view_len - 1);
        let expected_offset = self.expected_row_offset();
        if expected_offset == row.recorded_offset {
            return RestoreOutcome::InSync {
                view_index,
                offset: expected_offset,
            };
        }

        debug!(
            target: "viewport",
            "Row {} offset {} is stale, re-rendering at {}",
            view_index,
            row.recorded_offset,
            expected_offset
        );
        RestoreOutcome::Rerender {
            view_index,
            expected_offset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide() -> ViewportManager {
        let mut vm = ViewportManager::new(10);
        vm.set_viewport_width(300);
        vm.set_column_widths(vec![100, 150, 200, 100]);
        vm
    }

    #[test]
    fn test_window_clamps_on_shrink() {
        let mut vm = ViewportManager::new(10);
        vm.set_window_start(80, 100);
        assert_eq!(vm.window().start_index, 80);

        let change = vm.on_view_len_changed(40);
        assert!(change.viewport_changed);
        assert_eq!(vm.window().start_index, 30);
        assert_eq!(vm.materialized(40), 30..40);

        vm.on_view_len_changed(4);
        assert_eq!(vm.materialized(4), 0..4);
    }

    #[test]
    fn test_scroll_into_view() {
        let mut vm = ViewportManager::new(10);
        assert!(!vm.scroll_into_view(5, 100).viewport_changed);
        assert_eq!(vm.scroll_into_view(25, 100).window.start_index, 16);
        assert_eq!(vm.scroll_into_view(3, 100).window.start_index, 3);
        assert_eq!(vm.scroll_by(-10, 100).window.start_index, 0);
    }

    #[test]
    fn test_column_window_follows_scroll_left() {
        let mut vm = wide();
        vm.set_scroll_left(120);
        assert_eq!(vm.column_start(), 1);
        assert_eq!(vm.expected_row_offset(), 20);

        vm.set_scroll_left(250);
        assert_eq!(vm.column_start(), 2);
        assert_eq!(vm.expected_row_offset(), 0);

        // Clamped to content - viewport
        vm.set_scroll_left(10_000);
        assert_eq!(vm.scroll_left(), 250);
    }

    #[test]
    fn test_restore_rerenders_stale_rows() {
        let mut vm = wide();
        vm.set_scroll_left(120);

        let stale = vm.restore(
            RecycledRow {
                view_index: 3,
                recorded_offset: 0,
            },
            50,
        );
        assert_eq!(
            stale,
            RestoreOutcome::Rerender {
                view_index: 3,
                expected_offset: 20
            }
        );

        let fresh = vm.restore(
            RecycledRow {
                view_index: 3,
                recorded_offset: 20,
            },
            50,
        );
        assert!(!fresh.needs_rerender());
    }

    #[test]
    fn test_restore_is_noop_without_horizontal_scroll() {
        let mut vm = ViewportManager::new(10);
        vm.set_viewport_width(1000);
        vm.set_column_widths(vec![100, 100]);
        let outcome = vm.restore(
            RecycledRow {
                view_index: 0,
                recorded_offset: 42,
            },
            5,
        );
        assert_eq!(outcome, RestoreOutcome::NoHorizontalScroll);
    }

    #[test]
    fn test_restore_clamps_out_of_range_rows() {
        let mut vm = wide();
        vm.set_window_start(90, 100);
        vm.set_scroll_left(120);
        let outcome = vm.restore(
            RecycledRow {
                view_index: 95,
                recorded_offset: 0,
            },
            12,
        );
        assert_eq!(vm.window().start_index, 2);
        assert_eq!(
            outcome,
            RestoreOutcome::Rerender {
                view_index: 11,
                expected_offset: 20
            }
        );
        assert_eq!(vm.restore(RecycledRow { view_index: 0, recorded_offset: 0 }, 0), RestoreOutcome::Empty);
    }
}
