//! Column model: every column descriptor lives in one flat arena, with
//! explicit parent/children indices for column groups.
//!
//! Leaf columns carry data; group columns only carry headers. Descriptors are
//! never removed, only hidden, so arena indices stay valid for the lifetime
//! of the model.

use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::core::generation::{Generation, GenerationCounter};
use crate::data::datatable::DataTable;
use crate::data::pinning::{self, PinPosition};
use crate::data::value_format::ValueFormat;

/// Caller-specified column width
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnWidth {
    Pixels(u32),
    /// Percentage of the available container width
    Percent(f32),
}

impl ColumnWidth {
    /// Resolve against a container width in pixels
    pub fn resolve(&self, container: u32) -> u32 {
        match self {
            ColumnWidth::Pixels(px) => *px,
            ColumnWidth::Percent(pct) => ((*pct / 100.0) * container as f32).floor().max(0.0) as u32,
        }
    }
}

impl FromStr for ColumnWidth {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(pct) = s.strip_suffix('%') {
            let value: f32 = pct.trim().parse()?;
            return Ok(ColumnWidth::Percent(value));
        }
        let px = s.strip_suffix("px").unwrap_or(s);
        Ok(ColumnWidth::Pixels(px.trim().parse()?))
    }
}

impl fmt::Display for ColumnWidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnWidth::Pixels(px) => write!(f, "{}px", px),
            ColumnWidth::Percent(pct) => write!(f, "{}%", pct),
        }
    }
}

/// One column (leaf or group) in the arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub field: String,
    pub header: Option<String>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub pinned: bool,
    pub hidden: bool,
    pub width: Option<ColumnWidth>,
    pub min_width: Option<u32>,
    pub max_width: Option<u32>,
    pub format: Option<ValueFormat>,
    pub searchable: bool,
    /// Number of layout tracks this column spans in a multi-column block
    pub span: u32,
}

impl ColumnDescriptor {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            header: None,
            parent: None,
            children: Vec::new(),
            pinned: false,
            hidden: false,
            width: None,
            min_width: None,
            max_width: None,
            format: None,
            searchable: true,
            span: 1,
        }
    }

    pub fn is_group(&self) -> bool {
        !self.children.is_empty()
    }

    /// Header text, falling back to the field name
    pub fn header_text(&self) -> &str {
        self.header.as_deref().unwrap_or(&self.field)
    }
}

fn default_true() -> bool {
    true
}

fn default_span() -> u32 {
    1
}

/// Declarative column configuration, as written by the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub field: String,
    #[serde(default)]
    pub header: Option<String>,
    #[serde(default)]
    pub width: Option<ColumnWidth>,
    #[serde(default)]
    pub min_width: Option<u32>,
    #[serde(default)]
    pub max_width: Option<u32>,
    #[serde(default)]
    pub pinned: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(default)]
    pub format: Option<ValueFormat>,
    #[serde(default = "default_true")]
    pub searchable: bool,
    #[serde(default = "default_span")]
    pub span: u32,
    #[serde(default)]
    pub children: Vec<ColumnSpec>,
}

impl ColumnSpec {
    pub fn new(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            searchable: true,
            span: 1,
            ..Default::default()
        }
    }

    pub fn header(mut self, header: impl Into<String>) -> Self {
        self.header = Some(header.into());
        self
    }

    pub fn width(mut self, width: ColumnWidth) -> Self {
        self.width = Some(width);
        self
    }

    pub fn min_max(mut self, min: Option<u32>, max: Option<u32>) -> Self {
        self.min_width = min;
        self.max_width = max;
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = pinned;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn format(mut self, format: ValueFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn span(mut self, span: u32) -> Self {
        self.span = span.max(1);
        self
    }

    pub fn group(field: impl Into<String>, children: Vec<ColumnSpec>) -> Self {
        Self {
            children,
            ..Self::new(field)
        }
    }
}

/// Persistable per-column state (order, width, pin, visibility)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnState {
    pub field: String,
    /// Position among its siblings
    pub order: usize,
    pub pinned: bool,
    pub hidden: bool,
    pub width: Option<ColumnWidth>,
}

/// Owner of all column descriptors
#[derive(Debug, Clone)]
pub struct ColumnModel {
    columns: Vec<ColumnDescriptor>,
    roots: Vec<usize>,
    pin_position: PinPosition,
    max_pinned: Option<usize>,
    generation: GenerationCounter,
}

impl Default for ColumnModel {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnModel {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            roots: Vec::new(),
            pin_position: PinPosition::Start,
            max_pinned: None,
            generation: GenerationCounter::new(),
        }
    }

    /// Build from declarative configuration
    pub fn from_specs(specs: &[ColumnSpec]) -> Result<Self> {
        let mut model = Self::new();
        let mut seen = HashSet::new();
        for spec in specs {
            model.insert_spec(spec, None, &mut seen)?;
        }
        // Declared pin flags may contradict their group; settle them now.
        pinning::normalize_column_pins(&mut model);
        debug!(target: "columns", "Built column model with {} descriptors", model.columns.len());
        Ok(model)
    }

    /// One leaf column per table column, in table order
    pub fn infer_from(table: &DataTable) -> Self {
        let mut model = Self::new();
        for column in &table.columns {
            let idx = model.columns.len();
            model.columns.push(ColumnDescriptor::new(column.name.clone()));
            model.roots.push(idx);
        }
        model
    }

    fn insert_spec(
        &mut self,
        spec: &ColumnSpec,
        parent: Option<usize>,
        seen: &mut HashSet<String>,
    ) -> Result<usize> {
        if !seen.insert(spec.field.clone()) {
            bail!("Duplicate column field '{}'", spec.field);
        }

        let idx = self.columns.len();
        self.columns.push(ColumnDescriptor {
            field: spec.field.clone(),
            header: spec.header.clone(),
            parent,
            children: Vec::new(),
            pinned: spec.pinned,
            hidden: spec.hidden,
            width: spec.width,
            min_width: spec.min_width,
            max_width: spec.max_width,
            format: spec.format.clone(),
            searchable: spec.searchable,
            span: spec.span.max(1),
        });

        match parent {
            Some(p) => self.columns[p].children.push(idx),
            None => self.roots.push(idx),
        }

        for child in &spec.children {
            self.insert_spec(child, Some(idx), seen)?;
        }
        Ok(idx)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn generation(&self) -> Generation {
        self.generation.current()
    }

    /// Record a mutation; cached widths and partitions become stale
    pub(crate) fn touch(&mut self) {
        self.generation.bump();
    }

    pub fn get(&self, idx: usize) -> Option<&ColumnDescriptor> {
        self.columns.get(idx)
    }

    pub(crate) fn get_mut(&mut self, idx: usize) -> Option<&mut ColumnDescriptor> {
        self.columns.get_mut(idx)
    }

    pub fn descriptors(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn roots(&self) -> &[usize] {
        &self.roots
    }

    pub fn index_of(&self, field: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.field == field)
    }

    pub(crate) fn require(&self, field: &str) -> Result<usize> {
        self.index_of(field)
            .ok_or_else(|| anyhow!("Unknown column '{}'", field))
    }

    pub fn pin_position(&self) -> PinPosition {
        self.pin_position
    }

    pub fn set_pin_position(&mut self, position: PinPosition) {
        if self.pin_position != position {
            self.pin_position = position;
            self.touch();
        }
    }

    pub fn max_pinned(&self) -> Option<usize> {
        self.max_pinned
    }

    pub fn set_max_pinned(&mut self, max: Option<usize>) {
        self.max_pinned = max;
    }

    /// Walk up to the top-level group containing `idx`
    pub fn top_level_ancestor(&self, mut idx: usize) -> usize {
        while let Some(parent) = self.columns.get(idx).and_then(|c| c.parent) {
            idx = parent;
        }
        idx
    }

    /// `idx` and everything below it, depth first
    pub fn subtree(&self, idx: usize) -> Vec<usize> {
        let mut out = Vec::new();
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            out.push(current);
            if let Some(column) = self.columns.get(current) {
                stack.extend(column.children.iter().rev());
            }
        }
        out
    }

    /// Sibling list containing `idx` (the root list for top-level columns)
    pub(crate) fn siblings_mut(&mut self, idx: usize) -> &mut Vec<usize> {
        match self.columns[idx].parent {
            Some(parent) => &mut self.columns[parent].children,
            None => &mut self.roots,
        }
    }

    pub fn siblings(&self, idx: usize) -> &[usize] {
        match self.columns.get(idx).and_then(|c| c.parent) {
            Some(parent) => &self.columns[parent].children,
            None => &self.roots,
        }
    }

    /// Leaf columns in declaration/display order, ignoring pin partitions
    pub fn leaves_in_order(&self) -> Vec<usize> {
        let mut out = Vec::new();
        for &root in &self.roots {
            for idx in self.subtree(root) {
                if !self.columns[idx].is_group() {
                    out.push(idx);
                }
            }
        }
        out
    }

    /// Visible leaf columns in display order (pinned partition placed per
    /// the pin position). Selection coordinates index into this list.
    pub fn visible_leaves(&self) -> Vec<usize> {
        let partition = pinning::partition_columns(self);
        partition
            .display_order(self.pin_position)
            .into_iter()
            .filter(|&idx| !self.columns[idx].hidden)
            .collect()
    }

    /// Resolve a visible-column index back to its descriptor
    pub fn visible_column(&self, visible_idx: usize) -> Option<&ColumnDescriptor> {
        self.visible_leaves()
            .get(visible_idx)
            .and_then(|&idx| self.columns.get(idx))
    }

    pub fn visible_index_of(&self, field: &str) -> Option<usize> {
        let idx = self.index_of(field)?;
        self.visible_leaves().iter().position(|&i| i == idx)
    }

    /// Hide or show a column; groups apply to every leaf below them
    pub fn set_hidden(&mut self, field: &str, hidden: bool) -> Result<()> {
        let idx = self.require(field)?;
        for member in self.subtree(idx) {
            self.columns[member].hidden = hidden;
        }
        debug!(target: "columns", "Column '{}' hidden={}", field, hidden);
        self.touch();
        Ok(())
    }

    pub fn unhide_all(&mut self) {
        for column in &mut self.columns {
            column.hidden = false;
        }
        self.touch();
    }

    pub fn hidden_fields(&self) -> Vec<String> {
        self.leaves_in_order()
            .into_iter()
            .filter(|&idx| self.columns[idx].hidden)
            .map(|idx| self.columns[idx].field.clone())
            .collect()
    }

    /// Resize a column
    pub fn set_width(&mut self, field: &str, width: Option<ColumnWidth>) -> Result<()> {
        let idx = self.require(field)?;
        self.columns[idx].width = width;
        self.touch();
        Ok(())
    }

    pub fn set_format(&mut self, field: &str, format: Option<ValueFormat>) -> Result<()> {
        let idx = self.require(field)?;
        self.columns[idx].format = format;
        self.touch();
        Ok(())
    }

    /// Snapshot of per-column state for persistence
    pub fn to_state(&self) -> Vec<ColumnState> {
        self.columns
            .iter()
            .enumerate()
            .map(|(idx, column)| ColumnState {
                field: column.field.clone(),
                order: self.siblings(idx).iter().position(|&s| s == idx).unwrap_or(0),
                pinned: column.pinned,
                hidden: column.hidden,
                width: column.width,
            })
            .collect()
    }

    /// Restore persisted state. Unknown fields are skipped; sibling order is
    /// rebuilt from the recorded positions.
    pub fn apply_state(&mut self, states: &[ColumnState]) {
        for state in states {
            let Some(idx) = self.index_of(&state.field) else {
                debug!(target: "columns", "Skipping state for unknown column '{}'", state.field);
                continue;
            };
            let column = &mut self.columns[idx];
            column.pinned = state.pinned;
            column.hidden = state.hidden;
            column.width = state.width;
        }

        let order_of = |field: &str| {
            states
                .iter()
                .find(|s| s.field == field)
                .map(|s| s.order)
                .unwrap_or(usize::MAX)
        };

        let mut roots = std::mem::take(&mut self.roots);
        roots.sort_by_key(|&idx| order_of(&self.columns[idx].field));
        self.roots = roots;

        for group in 0..self.columns.len() {
            let mut children = std::mem::take(&mut self.columns[group].children);
            children.sort_by_key(|&idx| order_of(&self.columns[idx].field));
            self.columns[group].children = children;
        }

        pinning::normalize_column_pins(self);
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grouped_specs() -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("id"),
            ColumnSpec::group(
                "contact",
                vec![ColumnSpec::new("name"), ColumnSpec::new("email")],
            ),
            ColumnSpec::new("price").header("Price"),
        ]
    }

    #[test]
    fn test_arena_layout() {
        let model = ColumnModel::from_specs(&grouped_specs()).unwrap();
        assert_eq!(model.len(), 5);
        assert_eq!(model.roots(), &[0, 1, 4]);

        let contact = model.get(1).unwrap();
        assert!(contact.is_group());
        assert_eq!(contact.children, vec![2, 3]);
        assert_eq!(model.get(3).unwrap().parent, Some(1));
        assert_eq!(model.top_level_ancestor(3), 1);

        assert_eq!(model.leaves_in_order(), vec![0, 2, 3, 4]);
        assert_eq!(model.get(4).unwrap().header_text(), "Price");
        assert_eq!(model.get(0).unwrap().header_text(), "id");
    }

    #[test]
    fn test_duplicate_fields_rejected() {
        let specs = vec![ColumnSpec::new("id"), ColumnSpec::new("id")];
        assert!(ColumnModel::from_specs(&specs).is_err());
    }

    #[test]
    fn test_hiding_group_hides_children() {
        let mut model = ColumnModel::from_specs(&grouped_specs()).unwrap();
        let before = model.generation();

        model.set_hidden("contact", true).unwrap();
        assert!(model.generation() > before);

        let visible: Vec<_> = model
            .visible_leaves()
            .into_iter()
            .map(|idx| model.get(idx).unwrap().field.clone())
            .collect();
        assert_eq!(visible, vec!["id", "price"]);
        assert_eq!(model.hidden_fields(), vec!["name", "email"]);

        model.unhide_all();
        assert_eq!(model.visible_leaves().len(), 4);
        assert!(model.set_hidden("nope", true).is_err());
    }

    #[test]
    fn test_visible_index_resolution() {
        let model = ColumnModel::from_specs(&grouped_specs()).unwrap();
        assert_eq!(model.visible_column(1).unwrap().field, "name");
        assert_eq!(model.visible_index_of("price"), Some(3));
        assert_eq!(model.visible_index_of("contact"), None);
        assert!(model.visible_column(10).is_none());
    }

    #[test]
    fn test_width_parsing() {
        assert_eq!("120px".parse::<ColumnWidth>().unwrap(), ColumnWidth::Pixels(120));
        assert_eq!("80".parse::<ColumnWidth>().unwrap(), ColumnWidth::Pixels(80));
        assert_eq!("25%".parse::<ColumnWidth>().unwrap(), ColumnWidth::Percent(25.0));
        assert!("wide".parse::<ColumnWidth>().is_err());
        assert_eq!(ColumnWidth::Percent(25.0).resolve(460), 115);
    }

    #[test]
    fn test_state_round_trip_restores_order() {
        let mut model = ColumnModel::from_specs(&grouped_specs()).unwrap();
        let mut state = model.to_state();

        // Swap id and price among the roots
        for s in &mut state {
            match s.field.as_str() {
                "id" => s.order = 2,
                "price" => {
                    s.order = 0;
                    s.width = Some(ColumnWidth::Pixels(99));
                }
                _ => {}
            }
        }

        model.apply_state(&state);
        assert_eq!(model.roots(), &[4, 1, 0]);
        assert_eq!(model.get(4).unwrap().width, Some(ColumnWidth::Pixels(99)));
    }

    #[test]
    fn test_infer_from_table() {
        use crate::data::datatable::DataColumn;

        let mut table = DataTable::new("t");
        table.add_column(DataColumn::new("a"));
        table.add_column(DataColumn::new("b"));

        let model = ColumnModel::infer_from(&table);
        assert_eq!(model.leaves_in_order(), vec![0, 1]);
        assert_eq!(model.get(1).unwrap().field, "b");
    }
}
