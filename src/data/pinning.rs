//! Pin partitioning for columns and rows.
//!
//! Column pin state lives on the descriptors of the column model and is kept
//! closed under the group hierarchy: a column is pinned exactly when its
//! top-level ancestor is. Row pin state is an ordered registry of record ids,
//! independent of sorting and filtering.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;

use crate::core::generation::{Generation, GenerationCounter};
use crate::data::column_model::ColumnModel;
use crate::data::datatable::RowId;

/// Where the pinned partition goes: `Start` is top for rows and left for
/// columns, `End` is bottom/right.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinPosition {
    #[default]
    Start,
    End,
}

/// Drop position relative to a move target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPosition {
    Before,
    After,
}

/// Leaf columns split by pin state, each in full-collection order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnPartition {
    pub pinned: Vec<usize>,
    pub unpinned: Vec<usize>,
}

impl ColumnPartition {
    pub fn display_order(&self, position: PinPosition) -> Vec<usize> {
        let (first, second) = match position {
            PinPosition::Start => (&self.pinned, &self.unpinned),
            PinPosition::End => (&self.unpinned, &self.pinned),
        };
        first.iter().chain(second.iter()).copied().collect()
    }
}

/// Split leaf columns into pinned/unpinned, preserving collection order
pub fn partition_columns(model: &ColumnModel) -> ColumnPartition {
    let mut partition = ColumnPartition::default();
    for idx in model.leaves_in_order() {
        let pinned = model.get(idx).map(|c| c.pinned).unwrap_or(false);
        if pinned {
            partition.pinned.push(idx);
        } else {
            partition.unpinned.push(idx);
        }
    }
    partition
}

/// Force every column's pin flag to match its top-level ancestor.
///
/// Returns true when anything had to be corrected, so callers can refresh
/// pin affordances.
pub fn normalize_column_pins(model: &mut ColumnModel) -> bool {
    let mut changed = false;
    for root in model.roots().to_vec() {
        let root_pinned = model.get(root).map(|c| c.pinned).unwrap_or(false);
        for member in model.subtree(root) {
            if let Some(column) = model.get_mut(member) {
                if column.pinned != root_pinned {
                    debug!(target: "pinning",
                        "Normalizing '{}' pinned {} -> {}",
                        column.field, column.pinned, root_pinned
                    );
                    column.pinned = root_pinned;
                    changed = true;
                }
            }
        }
    }
    if changed {
        model.touch();
    }
    changed
}

/// Result of a column pin/unpin request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColumnPinOutcome {
    /// State actually changed
    pub applied: bool,
    /// Request was widened to the whole top-level group
    pub group_adjusted: bool,
    /// Leaf fields whose pin state changed
    pub affected: Vec<String>,
}

fn pinned_leaf_count(model: &ColumnModel) -> usize {
    partition_columns(model).pinned.len()
}

fn leaf_fields(model: &ColumnModel, root: usize) -> Vec<String> {
    model
        .subtree(root)
        .into_iter()
        .filter_map(|idx| model.get(idx))
        .filter(|c| !c.is_group())
        .map(|c| c.field.clone())
        .collect()
}

fn set_subtree_pinned(model: &mut ColumnModel, root: usize, pinned: bool) {
    for member in model.subtree(root) {
        if let Some(column) = model.get_mut(member) {
            column.pinned = pinned;
        }
    }
}

fn check_pin_limit(model: &ColumnModel, root: usize) -> Result<()> {
    if let Some(max) = model.max_pinned() {
        let adding = leaf_fields(model, root).len();
        let current = pinned_leaf_count(model);
        if current + adding > max {
            bail!(
                "Cannot pin {} more column(s): limit of {} pinned columns reached",
                adding,
                max
            );
        }
    }
    Ok(())
}

/// Pin or unpin a column. Members of a group always move with their
/// top-level group.
pub fn set_column_pinned(
    model: &mut ColumnModel,
    field: &str,
    pinned: bool,
) -> Result<ColumnPinOutcome> {
    let idx = model.require(field)?;
    let root = model.top_level_ancestor(idx);
    let group_adjusted = idx != root;

    let root_pinned = model.get(root).map(|c| c.pinned).unwrap_or(false);
    if root_pinned == pinned {
        // Already there; a stray member flag may still need repair.
        let normalized = normalize_column_pins(model);
        return Ok(ColumnPinOutcome {
            applied: normalized,
            group_adjusted,
            affected: Vec::new(),
        });
    }

    if pinned {
        check_pin_limit(model, root)?;
    }

    set_subtree_pinned(model, root, pinned);
    model.touch();

    let affected = leaf_fields(model, root);
    debug!(target: "pinning",
        "Column '{}' pinned={} (group adjusted: {}, affected: {:?})",
        field, pinned, group_adjusted, affected
    );

    Ok(ColumnPinOutcome {
        applied: true,
        group_adjusted,
        affected,
    })
}

/// Result of a column move
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoveOutcome {
    pub moved: bool,
    /// The move crossed the pinned boundary and changed pin state
    pub pin_changed: bool,
    /// The consistency pass corrected something
    pub normalized: bool,
}

/// Move `source` next to `target`. Only siblings can be reordered, anything
/// else is an error. A move across the pinned/unpinned boundary takes on the
/// target's pin state.
pub fn move_column(
    model: &mut ColumnModel,
    source: &str,
    target: &str,
    position: DropPosition,
) -> Result<MoveOutcome> {
    let src = model.require(source)?;
    let dst = model.require(target)?;

    if src == dst {
        return Ok(MoveOutcome::default());
    }

    let (src_parent, src_pinned) = model
        .get(src)
        .map(|c| (c.parent, c.pinned))
        .unwrap_or((None, false));
    let (dst_parent, dst_pinned) = model
        .get(dst)
        .map(|c| (c.parent, c.pinned))
        .unwrap_or((None, false));

    if src_parent != dst_parent {
        bail!(
            "Cannot move '{}' next to '{}': columns belong to different groups",
            source,
            target
        );
    }

    let pin_changed = src_pinned != dst_pinned;
    if pin_changed {
        if dst_pinned {
            check_pin_limit(model, src)?;
        }
        set_subtree_pinned(model, src, dst_pinned);
    }

    let siblings = model.siblings_mut(src);
    siblings.retain(|&i| i != src);
    let target_pos = siblings.iter().position(|&i| i == dst).unwrap_or(siblings.len());
    let insert_at = match position {
        DropPosition::Before => target_pos,
        DropPosition::After => (target_pos + 1).min(siblings.len()),
    };
    siblings.insert(insert_at, src);

    let normalized = normalize_column_pins(model);
    model.touch();

    debug!(target: "pinning",
        "Moved '{}' {:?} '{}' (pin changed: {})", source, position, target, pin_changed
    );

    Ok(MoveOutcome {
        moved: true,
        pin_changed,
        normalized,
    })
}

/// Ordered list of user-pinned row ids
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RowPinRegistry {
    pinned: Vec<RowId>,
    position: PinPosition,
    #[serde(skip)]
    generation: GenerationCounter,
}

impl PartialEq for RowPinRegistry {
    fn eq(&self, other: &Self) -> bool {
        self.pinned == other.pinned && self.position == other.position
    }
}

impl RowPinRegistry {
    pub fn new(position: PinPosition) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn position(&self) -> PinPosition {
        self.position
    }

    pub fn set_position(&mut self, position: PinPosition) {
        if self.position != position {
            self.position = position;
            self.generation.bump();
        }
    }

    pub fn generation(&self) -> Generation {
        self.generation.current()
    }

    /// Pin a row, optionally at a position in pin order. Returns false when
    /// the row was already pinned.
    pub fn pin(&mut self, id: RowId, at: Option<usize>) -> bool {
        if self.is_pinned(&id) {
            return false;
        }
        let at = at.unwrap_or(self.pinned.len()).min(self.pinned.len());
        self.pinned.insert(at, id);
        self.generation.bump();
        true
    }

    pub fn unpin(&mut self, id: &RowId) -> bool {
        let before = self.pinned.len();
        self.pinned.retain(|p| p != id);
        let removed = self.pinned.len() != before;
        if removed {
            self.generation.bump();
        }
        removed
    }

    pub fn is_pinned(&self, id: &RowId) -> bool {
        self.pinned.contains(id)
    }

    pub fn pinned_ids(&self) -> &[RowId] {
        &self.pinned
    }

    pub fn len(&self) -> usize {
        self.pinned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pinned.is_empty()
    }

    pub fn clear(&mut self) {
        if !self.pinned.is_empty() {
            self.pinned.clear();
            self.generation.bump();
        }
    }
}

/// Raw row indices split by pin state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowPartition {
    /// In pin order
    pub pinned: Vec<usize>,
    /// In the order given
    pub unpinned: Vec<usize>,
}

/// Split `rows` into pinned (registry order) and unpinned (input order).
/// Pinned ids that are not among `rows` are dropped.
pub fn partition_rows(
    registry: &RowPinRegistry,
    id_index: &HashMap<RowId, usize>,
    rows: &[usize],
) -> RowPartition {
    let candidates: HashSet<usize> = rows.iter().copied().collect();

    let pinned: Vec<usize> = registry
        .pinned_ids()
        .iter()
        .filter_map(|id| id_index.get(id).copied())
        .filter(|idx| candidates.contains(idx))
        .collect();

    let pinned_set: HashSet<usize> = pinned.iter().copied().collect();
    let unpinned = rows
        .iter()
        .copied()
        .filter(|idx| !pinned_set.contains(idx))
        .collect();

    RowPartition { pinned, unpinned }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::column_model::ColumnSpec;

    fn model() -> ColumnModel {
        ColumnModel::from_specs(&[
            ColumnSpec::new("id"),
            ColumnSpec::group(
                "contact",
                vec![ColumnSpec::new("name"), ColumnSpec::new("email")],
            ),
            ColumnSpec::new("price"),
            ColumnSpec::new("qty"),
        ])
        .unwrap()
    }

    fn fields(model: &ColumnModel, idxs: &[usize]) -> Vec<String> {
        idxs.iter()
            .map(|&i| model.get(i).unwrap().field.clone())
            .collect()
    }

    #[test]
    fn test_pinning_preserves_collection_order() {
        let mut m = model();
        set_column_pinned(&mut m, "qty", true).unwrap();
        set_column_pinned(&mut m, "id", true).unwrap();

        let partition = partition_columns(&m);
        assert_eq!(fields(&m, &partition.pinned), vec!["id", "qty"]);
        assert_eq!(
            fields(&m, &partition.display_order(PinPosition::Start)),
            vec!["id", "qty", "name", "email", "price"]
        );
        assert_eq!(
            fields(&m, &partition.display_order(PinPosition::End)),
            vec!["name", "email", "price", "id", "qty"]
        );
    }

    #[test]
    fn test_pinning_child_pins_whole_group() {
        let mut m = model();
        let outcome = set_column_pinned(&mut m, "email", true).unwrap();
        assert!(outcome.applied);
        assert!(outcome.group_adjusted);
        assert_eq!(outcome.affected, vec!["name", "email"]);

        assert!(m.get(m.index_of("contact").unwrap()).unwrap().pinned);
        assert!(m.get(m.index_of("name").unwrap()).unwrap().pinned);

        let outcome = set_column_pinned(&mut m, "name", false).unwrap();
        assert!(outcome.applied);
        assert!(!m.get(m.index_of("email").unwrap()).unwrap().pinned);
    }

    #[test]
    fn test_declared_child_pin_forced_unpinned() {
        let m = ColumnModel::from_specs(&[ColumnSpec::group(
            "g",
            vec![ColumnSpec::new("a").pinned(true), ColumnSpec::new("b")],
        )])
        .unwrap();
        assert!(!m.get(m.index_of("a").unwrap()).unwrap().pinned);
    }

    #[test]
    fn test_normalize_reports_changes() {
        let mut m = model();
        let email = m.index_of("email").unwrap();
        m.get_mut(email).unwrap().pinned = true;
        assert!(normalize_column_pins(&mut m));
        assert!(!m.get(email).unwrap().pinned);
        assert!(!normalize_column_pins(&mut m));
    }

    #[test]
    fn test_pin_limit() {
        let mut m = model();
        m.set_max_pinned(Some(2));
        set_column_pinned(&mut m, "id", true).unwrap();
        // contact has two leaves: would make three
        assert!(set_column_pinned(&mut m, "contact", true).is_err());
        set_column_pinned(&mut m, "price", true).unwrap();
        assert_eq!(partition_columns(&m).pinned.len(), 2);
    }

    #[test]
    fn test_move_within_partition() {
        let mut m = model();
        let outcome = move_column(&mut m, "qty", "id", DropPosition::Before).unwrap();
        assert!(outcome.moved);
        assert!(!outcome.pin_changed);
        assert_eq!(
            fields(&m, &m.leaves_in_order()),
            vec!["qty", "id", "name", "email", "price"]
        );

        move_column(&mut m, "name", "email", DropPosition::After).unwrap();
        assert_eq!(
            fields(&m, &m.leaves_in_order()),
            vec!["qty", "id", "email", "name", "price"]
        );
    }

    #[test]
    fn test_move_across_pin_boundary_pins_implicitly() {
        let mut m = model();
        set_column_pinned(&mut m, "id", true).unwrap();

        let outcome = move_column(&mut m, "price", "id", DropPosition::After).unwrap();
        assert!(outcome.moved);
        assert!(outcome.pin_changed);

        let partition = partition_columns(&m);
        assert_eq!(fields(&m, &partition.pinned), vec!["id", "price"]);

        // And back out again
        let outcome = move_column(&mut m, "price", "qty", DropPosition::Before).unwrap();
        assert!(outcome.pin_changed);
        assert_eq!(fields(&m, &partition_columns(&m).pinned), vec!["id"]);
    }

    #[test]
    fn test_move_between_different_parents_is_refused() {
        let mut m = model();
        let before = m.leaves_in_order();
        let err = move_column(&mut m, "name", "price", DropPosition::Before).unwrap_err();
        assert!(err.to_string().contains("different groups"));
        assert_eq!(m.leaves_in_order(), before);
        assert!(move_column(&mut m, "nope", "price", DropPosition::Before).is_err());
    }

    #[test]
    fn test_row_registry() {
        let mut registry = RowPinRegistry::new(PinPosition::Start);
        let g0 = registry.generation();

        assert!(registry.pin(RowId::new("7"), None));
        assert!(registry.pin(RowId::new("3"), Some(0)));
        assert!(!registry.pin(RowId::new("3"), None));
        assert_eq!(registry.pinned_ids(), &[RowId::new("3"), RowId::new("7")]);
        assert!(registry.generation() > g0);

        assert!(registry.unpin(&RowId::new("3")));
        assert!(!registry.unpin(&RowId::new("3")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_partition_rows() {
        let mut registry = RowPinRegistry::new(PinPosition::Start);
        registry.pin(RowId::new("7"), None);
        registry.pin(RowId::new("3"), None);
        registry.pin(RowId::new("99"), None);

        let id_index: HashMap<RowId, usize> =
            (0..10).map(|i| (RowId::new((i + 1).to_string()), i)).collect();
        let rows: Vec<usize> = (0..10).collect();

        let partition = partition_rows(&registry, &id_index, &rows);
        assert_eq!(partition.pinned, vec![6, 2]);
        assert_eq!(partition.unpinned, vec![0, 1, 3, 4, 5, 7, 8, 9]);
    }
}
