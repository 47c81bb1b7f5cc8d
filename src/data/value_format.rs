//! Per-column display formatting.
//!
//! A column's display value is what search compares against and what
//! `extract(include_formatters = true)` hands to the clipboard.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::data::datatable::DataValue;

const DATETIME_INPUTS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValueFormat {
    Number { decimals: usize },
    Currency { symbol: String, decimals: usize },
    Percent { decimals: usize },
    /// chrono strftime pattern, e.g. `%d/%m/%Y`
    Date { pattern: String },
    Uppercase,
    Lowercase,
}

impl ValueFormat {
    /// Render a value for display. Values the format cannot interpret are
    /// rendered unformatted.
    pub fn apply(&self, value: &DataValue) -> String {
        if value.is_null() {
            return String::new();
        }

        match self {
            ValueFormat::Number { decimals } => match value.as_f64() {
                Some(n) => format!("{:.*}", decimals, n),
                None => value.to_string(),
            },
            ValueFormat::Currency { symbol, decimals } => match value.as_f64() {
                Some(n) if n < 0.0 => format!("-{}{:.*}", symbol, decimals, n.abs()),
                Some(n) => format!("{}{:.*}", symbol, decimals, n),
                None => value.to_string(),
            },
            ValueFormat::Percent { decimals } => match value.as_f64() {
                Some(n) => format!("{:.*}%", decimals, n * 100.0),
                None => value.to_string(),
            },
            ValueFormat::Date { pattern } => {
                let text = value.to_string();
                format_date(&text, pattern).unwrap_or(text)
            }
            ValueFormat::Uppercase => value.to_string().to_uppercase(),
            ValueFormat::Lowercase => value.to_string().to_lowercase(),
        }
    }
}

fn format_date(text: &str, pattern: &str) -> Option<String> {
    for input in DATETIME_INPUTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, input) {
            return Some(dt.format(pattern).to_string());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .map(|d| d.format(pattern).to_string())
}

/// Display value of a cell: formatted when the column carries a format
pub fn display_value(value: &DataValue, format: Option<&ValueFormat>) -> String {
    match format {
        Some(format) => format.apply(value),
        None => value.to_string(),
    }
}
