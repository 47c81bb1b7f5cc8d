//! Serializable grid state for saving and restoring sessions

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::data::column_model::ColumnState;
use crate::data::datatable::RowId;
use crate::data::filtering::FilterTree;
use crate::data::index_map::PagingWindow;
use crate::data::pinning::PinPosition;
use crate::data::sorting::SortExpression;

/// Everything the user arranged, as plain data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridStateSnapshot {
    #[serde(default)]
    pub columns: Vec<ColumnState>,
    #[serde(default)]
    pub pinned_rows: Vec<RowId>,
    #[serde(default)]
    pub row_pin_position: PinPosition,
    #[serde(default)]
    pub sort: Vec<SortExpression>,
    #[serde(default)]
    pub filter: Option<FilterTree>,
    #[serde(default)]
    pub paging: Option<PagingWindow>,
}

impl GridStateSnapshot {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize grid state")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse grid state")
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)
            .with_context(|| format!("Failed to write grid state to {:?}", path))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read grid state from {:?}", path))?;
        Self::from_json(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filtering::FilterOperator;

    #[test]
    fn test_snapshot_file_round_trip() -> Result<()> {
        let snapshot = GridStateSnapshot {
            pinned_rows: vec![RowId::new("7"), RowId::new("3")],
            sort: vec![SortExpression::descending("price")],
            filter: Some(FilterTree::condition("name", FilterOperator::Contains, "a")),
            paging: Some(PagingWindow::new(2, 25)),
            ..GridStateSnapshot::default()
        };

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("state").join("grid.json");
        snapshot.save_to(&path)?;
        assert_eq!(GridStateSnapshot::load_from(&path)?, snapshot);
        Ok(())
    }

    #[test]
    fn test_missing_sections_default() -> Result<()> {
        let snapshot = GridStateSnapshot::from_json(r#"{"pinned_rows": ["a"]}"#)?;
        assert_eq!(snapshot.pinned_rows, vec![RowId::new("a")]);
        assert!(snapshot.columns.is_empty());
        assert!(snapshot.filter.is_none());
        Ok(())
    }
}
