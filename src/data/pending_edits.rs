//! Pending (uncommitted) edits.
//!
//! The view composer only consumes the aggregated change list: added records
//! are spliced into the composed view, deleted records are excluded (or shown
//! as ghosts). Updates are carried for the host's benefit.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::generation::{Generation, GenerationCounter};
use crate::data::datatable::{DataRow, RowId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// `index` is a position among unpinned rows; `None` means first
    Add { index: Option<usize> },
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingChange {
    pub id: RowId,
    pub kind: ChangeKind,
    pub value: Option<DataRow>,
}

/// Source of uncommitted changes consulted once per composition
pub trait PendingEditLog {
    fn get_aggregated_changes(&self) -> Vec<PendingChange>;

    /// Bumped whenever the aggregated change list may have changed
    fn generation(&self) -> Generation;
}

/// In-memory transaction log
#[derive(Debug, Clone, Default)]
pub struct TransactionLog {
    entries: Vec<PendingChange>,
    generation: GenerationCounter,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, change: PendingChange) {
        debug!(target: "pending_edits", "Recording {:?} for row {}", change.kind, change.id);
        self.entries.push(change);
        self.generation.bump();
    }

    pub fn add(&mut self, id: RowId, value: DataRow, index: Option<usize>) {
        self.push(PendingChange {
            id,
            kind: ChangeKind::Add { index },
            value: Some(value),
        });
    }

    pub fn update(&mut self, id: RowId, value: DataRow) {
        self.push(PendingChange {
            id,
            kind: ChangeKind::Update,
            value: Some(value),
        });
    }

    pub fn delete(&mut self, id: RowId) {
        self.push(PendingChange {
            id,
            kind: ChangeKind::Delete,
            value: None,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hand back the aggregated changes and start a fresh log
    pub fn commit(&mut self) -> Vec<PendingChange> {
        let changes = self.get_aggregated_changes();
        self.clear();
        changes
    }

    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            self.entries.clear();
            self.generation.bump();
        }
    }
}

impl PendingEditLog for TransactionLog {
    /// One change per record, in order of first appearance:
    /// add+update stays an add with the latest value, add+delete vanishes,
    /// update+delete becomes a delete, repeated updates keep the last value.
    fn get_aggregated_changes(&self) -> Vec<PendingChange> {
        let mut aggregated: Vec<PendingChange> = Vec::new();

        for change in &self.entries {
            let existing = aggregated.iter().position(|c| c.id == change.id);
            match existing {
                None => aggregated.push(change.clone()),
                Some(pos) => {
                    let merged = match (&aggregated[pos].kind, &change.kind) {
                        (ChangeKind::Add { .. }, ChangeKind::Delete) => None,
                        (ChangeKind::Add { index }, ChangeKind::Update) => Some(PendingChange {
                            id: change.id.clone(),
                            kind: ChangeKind::Add { index: *index },
                            value: change.value.clone(),
                        }),
                        _ => Some(change.clone()),
                    };
                    match merged {
                        Some(merged) => aggregated[pos] = merged,
                        None => {
                            aggregated.remove(pos);
                        }
                    }
                }
            }
        }

        aggregated
    }

    fn generation(&self) -> Generation {
        self.generation.current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::datatable::DataValue;

    fn row(v: i64) -> DataRow {
        DataRow::new(vec![DataValue::Integer(v)])
    }

    #[test]
    fn test_aggregation_rules() {
        let mut log = TransactionLog::new();
        log.add(RowId::new("new-1"), row(1), None);
        log.update(RowId::new("new-1"), row(2));
        log.add(RowId::new("new-2"), row(3), Some(4));
        log.delete(RowId::new("new-2"));
        log.update(RowId::new("5"), row(9));
        log.delete(RowId::new("5"));
        log.update(RowId::new("6"), row(1));
        log.update(RowId::new("6"), row(7));

        let changes = log.get_aggregated_changes();
        assert_eq!(changes.len(), 3);

        assert_eq!(changes[0].id, RowId::new("new-1"));
        assert_eq!(changes[0].kind, ChangeKind::Add { index: None });
        assert_eq!(changes[0].value, Some(row(2)));

        assert_eq!(changes[1].id, RowId::new("5"));
        assert_eq!(changes[1].kind, ChangeKind::Delete);

        assert_eq!(changes[2].kind, ChangeKind::Update);
        assert_eq!(changes[2].value, Some(row(7)));
    }

    #[test]
    fn test_commit_clears_and_bumps_generation() {
        let mut log = TransactionLog::new();
        let g0 = log.generation();
        log.delete(RowId::new("1"));
        let g1 = log.generation();
        assert!(g1 > g0);

        let committed = log.commit();
        assert_eq!(committed.len(), 1);
        assert!(log.is_empty());
        assert!(log.generation() > g1);
    }
}
