//! Default filtering collaborator.
//!
//! A serializable filter tree is compiled once per call into a predicate
//! (field names resolved, regexes built) and then applied to a slice of raw
//! row indices. Compilation failures are configuration errors and leave the
//! caller's state untouched.

use anyhow::{anyhow, Context, Result};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::data::datatable::{DataTable, DataValue};
use crate::data::datavalue_compare::compare_datavalues;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Contains,
    DoesNotContain,
    StartsWith,
    EndsWith,
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    IsEmpty,
    NotEmpty,
    Fuzzy,
    Regex,
}

fn default_ignore_case() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: String,
    #[serde(default = "default_ignore_case")]
    pub ignore_case: bool,
}

impl FilterCondition {
    pub fn new(field: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
            ignore_case: true,
        }
    }

    pub fn case_sensitive(mut self) -> Self {
        self.ignore_case = false;
        self
    }
}

/// Boolean tree of filter conditions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "operands", rename_all = "snake_case")]
pub enum FilterTree {
    Condition(FilterCondition),
    And(Vec<FilterTree>),
    Or(Vec<FilterTree>),
    Not(Box<FilterTree>),
}

impl FilterTree {
    pub fn condition(field: impl Into<String>, operator: FilterOperator, value: impl Into<String>) -> Self {
        FilterTree::Condition(FilterCondition::new(field, operator, value))
    }
}

/// Filtering collaborator consumed by the view composer
pub trait FilteringStrategy {
    /// Keep the rows matching `tree`, preserving their order
    fn filter(&self, table: &DataTable, rows: Vec<usize>, tree: &FilterTree) -> Result<Vec<usize>>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultFilteringStrategy;

impl FilteringStrategy for DefaultFilteringStrategy {
    fn filter(&self, table: &DataTable, rows: Vec<usize>, tree: &FilterTree) -> Result<Vec<usize>> {
        let predicate = CompiledFilter::compile(table, tree)?;
        Ok(rows
            .into_iter()
            .filter(|&row| predicate.matches(table, row))
            .collect())
    }
}

enum CompiledNode {
    Condition {
        column: usize,
        operator: FilterOperator,
        needle: String,
        typed: DataValue,
        ignore_case: bool,
        regex: Option<Regex>,
    },
    And(Vec<CompiledNode>),
    Or(Vec<CompiledNode>),
    Not(Box<CompiledNode>),
}

/// A filter tree with field references resolved against one table
pub struct CompiledFilter {
    root: CompiledNode,
    matcher: SkimMatcherV2,
}

impl CompiledFilter {
    pub fn compile(table: &DataTable, tree: &FilterTree) -> Result<Self> {
        Ok(Self {
            root: compile_node(table, tree)?,
            matcher: SkimMatcherV2::default(),
        })
    }

    pub fn matches(&self, table: &DataTable, row: usize) -> bool {
        self.eval(&self.root, table, row)
    }

    fn eval(&self, node: &CompiledNode, table: &DataTable, row: usize) -> bool {
        match node {
            CompiledNode::And(nodes) => nodes.iter().all(|n| self.eval(n, table, row)),
            CompiledNode::Or(nodes) => nodes.iter().any(|n| self.eval(n, table, row)),
            CompiledNode::Not(inner) => !self.eval(inner, table, row),
            CompiledNode::Condition {
                column,
                operator,
                needle,
                typed,
                ignore_case,
                regex,
            } => {
                let value = table.get_value(row, *column).unwrap_or(&DataValue::Null);
                let text = if *ignore_case {
                    value.to_string().to_lowercase()
                } else {
                    value.to_string()
                };

                match operator {
                    FilterOperator::Contains => text.contains(needle.as_str()),
                    FilterOperator::DoesNotContain => !text.contains(needle.as_str()),
                    FilterOperator::StartsWith => text.starts_with(needle.as_str()),
                    FilterOperator::EndsWith => text.ends_with(needle.as_str()),
                    FilterOperator::Equals => text == *needle,
                    FilterOperator::NotEquals => text != *needle,
                    FilterOperator::GreaterThan => compare(value, typed) == Some(Ordering::Greater),
                    FilterOperator::GreaterThanOrEqual => {
                        matches!(compare(value, typed), Some(Ordering::Greater | Ordering::Equal))
                    }
                    FilterOperator::LessThan => compare(value, typed) == Some(Ordering::Less),
                    FilterOperator::LessThanOrEqual => {
                        matches!(compare(value, typed), Some(Ordering::Less | Ordering::Equal))
                    }
                    FilterOperator::IsEmpty => text.trim().is_empty(),
                    FilterOperator::NotEmpty => !text.trim().is_empty(),
                    FilterOperator::Fuzzy => self.matcher.fuzzy_match(&text, needle).is_some(),
                    FilterOperator::Regex => regex
                        .as_ref()
                        .map(|re| re.is_match(&value.to_string()))
                        .unwrap_or(false),
                }
            }
        }
    }
}

/// Ordering comparisons skip nulls
fn compare(value: &DataValue, typed: &DataValue) -> Option<Ordering> {
    if value.is_null() {
        return None;
    }
    Some(compare_datavalues(value, typed))
}

/// Interpret a filter operand as the most specific value type it parses as
fn typed_operand(raw: &str) -> DataValue {
    if let Ok(i) = raw.trim().parse::<i64>() {
        DataValue::Integer(i)
    } else if let Ok(f) = raw.trim().parse::<f64>() {
        DataValue::Float(f)
    } else if raw.len() >= 10 && raw.as_bytes().get(4) == Some(&b'-') {
        DataValue::DateTime(raw.to_string())
    } else {
        DataValue::String(raw.to_string())
    }
}

fn compile_node(table: &DataTable, tree: &FilterTree) -> Result<CompiledNode> {
    Ok(match tree {
        FilterTree::And(nodes) => CompiledNode::And(
            nodes
                .iter()
                .map(|n| compile_node(table, n))
                .collect::<Result<_>>()?,
        ),
        FilterTree::Or(nodes) => CompiledNode::Or(
            nodes
                .iter()
                .map(|n| compile_node(table, n))
                .collect::<Result<_>>()?,
        ),
        FilterTree::Not(inner) => CompiledNode::Not(Box::new(compile_node(table, inner)?)),
        FilterTree::Condition(condition) => {
            let column = table
                .get_column_index(&condition.field)
                .ok_or_else(|| anyhow!("Filter references unknown field '{}'", condition.field))?;

            let regex = if condition.operator == FilterOperator::Regex {
                let pattern = if condition.ignore_case {
                    format!("(?i){}", condition.value)
                } else {
                    condition.value.clone()
                };
                Some(
                    Regex::new(&pattern)
                        .with_context(|| format!("Invalid filter regex '{}'", condition.value))?,
                )
            } else {
                None
            };

            let needle = if condition.ignore_case {
                condition.value.to_lowercase()
            } else {
                condition.value.clone()
            };

            CompiledNode::Condition {
                column,
                operator: condition.operator,
                needle,
                typed: typed_operand(&condition.value),
                ignore_case: condition.ignore_case,
                regex,
            }
        }
    })
}
