//! Default sorting collaborator: stable, multi-key sort of raw row indices.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::data::datatable::{DataTable, DataValue};
use crate::data::datavalue_compare::{compare_datavalues, compare_datavalues_ignore_case};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortExpression {
    pub field: String,
    #[serde(default)]
    pub direction: SortDirection,
    #[serde(default)]
    pub ignore_case: bool,
}

impl SortExpression {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Ascending,
            ignore_case: false,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Descending,
            ignore_case: false,
        }
    }

    pub fn ignoring_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }
}

/// Sorting collaborator consumed by the view composer
pub trait SortingStrategy {
    /// Order `rows` by `expressions`; ties keep their incoming order
    fn sort(&self, table: &DataTable, rows: Vec<usize>, expressions: &[SortExpression]) -> Result<Vec<usize>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSortingStrategy;

impl SortingStrategy for DefaultSortingStrategy {
    fn sort(
        &self,
        table: &DataTable,
        mut rows: Vec<usize>,
        expressions: &[SortExpression],
    ) -> Result<Vec<usize>> {
        if expressions.is_empty() {
            return Ok(rows);
        }

        let keys: Vec<(usize, &SortExpression)> = expressions
            .iter()
            .map(|expr| {
                table
                    .get_column_index(&expr.field)
                    .map(|idx| (idx, expr))
                    .ok_or_else(|| anyhow!("Sort references unknown field '{}'", expr.field))
            })
            .collect::<Result<_>>()?;

        let null = DataValue::Null;
        rows.sort_by(|&a, &b| {
            for (column, expr) in &keys {
                let va = table.get_value(a, *column).unwrap_or(&null);
                let vb = table.get_value(b, *column).unwrap_or(&null);
                let ordering = if expr.ignore_case {
                    compare_datavalues_ignore_case(va, vb)
                } else {
                    compare_datavalues(va, vb)
                };
                let ordering = match expr.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        Ok(rows)
    }
}
