use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

use crate::core::generation::GenerationCache;
use crate::data::column_model::{ColumnDescriptor, ColumnModel, ColumnWidth};

pub const DEFAULT_COL_WIDTH: u32 = 150;
/// Hard floor for auto-sized columns
pub const MIN_COL_WIDTH: u32 = 136;
/// Width reported when no column is visible
pub const ZERO_WIDTH: u32 = 0;

/// Global sizing settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WidthSettings {
    pub default_width: u32,
    pub min_width: u32,
    /// Reserved for selector/drag-handle/expander columns
    pub feature_width: u32,
    /// Max for columns that declare none
    pub default_max_width: Option<u32>,
}

impl Default for WidthSettings {
    fn default() -> Self {
        Self {
            default_width: DEFAULT_COL_WIDTH,
            min_width: MIN_COL_WIDTH,
            feature_width: 0,
            default_max_width: None,
        }
    }
}

/// Horizontal space offered to the grid
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ContainerWidth {
    /// Laid-out container width; `None` when auto or not laid out yet
    pub container: Option<u32>,
    /// The grid element's own rendered width, used when the container is unknown
    pub rendered: Option<u32>,
}

impl ContainerWidth {
    pub fn fixed(width: u32) -> Self {
        Self {
            container: Some(width),
            rendered: None,
        }
    }

    pub fn auto() -> Self {
        Self::default()
    }

    fn resolve(&self) -> Option<u32> {
        self.container.or(self.rendered)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedWidth {
    /// Arena index in the column model
    pub column: usize,
    pub field: String,
    pub width: u32,
    /// Width of one layout track when the column spans several
    pub track_width: u32,
}

/// Pixel widths of the visible leaf columns, in display order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedWidths {
    entries: Vec<ResolvedWidth>,
    total: u32,
}

impl ResolvedWidths {
    pub fn entries(&self) -> &[ResolvedWidth] {
        &self.entries
    }

    pub fn get(&self, field: &str) -> Option<u32> {
        self.entries.iter().find(|e| e.field == field).map(|e| e.width)
    }

    /// Widths by visible column index
    pub fn widths(&self) -> Vec<u32> {
        self.entries.iter().map(|e| e.width).collect()
    }

    pub fn as_map(&self) -> HashMap<String, u32> {
        self.entries
            .iter()
            .map(|e| (e.field.clone(), e.width))
            .collect()
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the widths of the first `count` visible columns
    pub fn width_before(&self, count: usize) -> u32 {
        self.entries.iter().take(count).map(|e| e.width).sum()
    }
}

/// Apply a column's own min/max; min wins over an inconsistent max
fn clamp_to_column(width: u32, column: &ColumnDescriptor, default_max: Option<u32>) -> u32 {
    let mut width = width;
    if let Some(min) = column.min_width {
        width = width.max(min);
    }
    if let Some(max) = column.max_width.or(default_max) {
        width = width.min(max.max(column.min_width.unwrap_or(0)));
    }
    width
}

/// Distribute `container` across the visible leaf columns of `model`
pub fn compute_widths(model: &ColumnModel, container: ContainerWidth, settings: &WidthSettings) -> ResolvedWidths {
    let leaves: Vec<(usize, &ColumnDescriptor)> = model
        .visible_leaves()
        .into_iter()
        .filter_map(|idx| model.get(idx).map(|column| (idx, column)))
        .collect();

    if leaves.is_empty() {
        debug!(target: "columns", "No visible columns; width resolves to {}", ZERO_WIDTH);
        return ResolvedWidths {
            entries: Vec::new(),
            total: ZERO_WIDTH,
        };
    }

    let available = container
        .resolve()
        .map(|w| w.saturating_sub(settings.feature_width));

    let mut widths: Vec<u32> = vec![0; leaves.len()];
    let mut fixed_total: u32 = 0;
    let mut auto: Vec<usize> = Vec::new();
    let mut auto_units: u32 = 0;

    for (pos, (_, column)) in leaves.iter().enumerate() {
        match (column.width, available) {
            (Some(spec), Some(avail)) => {
                let resolved = spec.resolve(avail);
                widths[pos] = resolved;
                fixed_total = fixed_total.saturating_add(resolved);
            }
            (Some(spec), None) => {
                // Percentages need a container; degrade to the minimum
                widths[pos] = match spec {
                    ColumnWidth::Pixels(px) => px,
                    ColumnWidth::Percent(_) => settings.min_width,
                };
            }
            (None, _) => {
                auto.push(pos);
                auto_units += column.span.max(1);
            }
        }
    }

    if !auto.is_empty() {
        let per_unit = match available {
            Some(avail) => {
                let remaining = avail.saturating_sub(fixed_total);
                (remaining / auto_units).max(settings.min_width)
            }
            // Unresolvable container: every column sized on its own
            None => settings.default_width.max(settings.min_width),
        };
        for &pos in &auto {
            widths[pos] = per_unit.saturating_mul(leaves[pos].1.span.max(1));
        }
    }

    let entries: Vec<ResolvedWidth> = leaves
        .iter()
        .zip(widths)
        .map(|((idx, column), width)| {
            let width = clamp_to_column(width, column, settings.default_max_width);
            let span = column.span.max(1);
            trace!(target: "columns", "Column '{}' -> {}px (span {})", column.field, width, span);
            ResolvedWidth {
                column: *idx,
                field: column.field.clone(),
                width,
                track_width: width / span,
            }
        })
        .collect();

    let total = entries.iter().map(|e| e.width).sum();
    debug!(
        target: "columns",
        "Resolved {} column widths (available {:?}, total {})",
        entries.len(),
        available,
        total
    );

    ResolvedWidths { entries, total }
}

/// Caches resolved widths against the column model generation
pub struct ColumnWidthCalculator {
    settings: WidthSettings,
    cache: GenerationCache<(ContainerWidth, WidthSettings), ResolvedWidths>,
}

impl Default for ColumnWidthCalculator {
    fn default() -> Self {
        Self::new(WidthSettings::default())
    }
}

impl ColumnWidthCalculator {
    pub fn new(settings: WidthSettings) -> Self {
        Self {
            settings,
            cache: GenerationCache::new(),
        }
    }

    pub fn settings(&self) -> &WidthSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: WidthSettings) {
        self.settings = settings;
    }

    /// Resolved widths, recomputed only when the model or inputs changed
    pub fn get_widths(&mut self, model: &ColumnModel, container: ContainerWidth) -> &ResolvedWidths {
        let settings = self.settings;
        self.cache
            .get_or_compute(model.generation(), (container, settings), |(container, settings)| {
                compute_widths(model, *container, settings)
            })
    }

    pub fn recompute_count(&self) -> u64 {
        self.cache.recompute_count()
    }

    pub fn mark_dirty(&mut self) {
        self.cache.invalidate();
    }
}
