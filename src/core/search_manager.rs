//! SearchManager - text-match cache over a composed view
//!
//! Matches are computed against what the user sees: every visible leaf
//! column's display value (after its formatter) for every row of the
//! filtered+sorted view, not just the materialized window. The cache is only
//! rebuilt when the search inputs or the view/column generations change;
//! otherwise navigation just moves a wrapping cursor.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::generation::Generation;
use crate::data::column_model::ColumnModel;
use crate::data::data_view::ComposedView;
use crate::data::datatable::{DataTable, RowId};
use crate::data::value_format::display_value;

/// One located occurrence of the search text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchRecord {
    /// Position in the composed view
    pub row: usize,
    /// Visible column index
    pub column: usize,
    pub field: String,
    /// Occurrence within the cell, 0-based
    pub occurrence: usize,
    /// Row comes from the pinned partition
    pub pinned: bool,
    pub row_id: RowId,
    /// Byte range of the hit within the display value
    pub highlight_range: (usize, usize),
}

/// Options that invalidate the cache when they change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SearchOptions {
    pub case_sensitive: bool,
    /// Whole-value comparison, at most one match per cell
    pub exact_match: bool,
    pub use_regex: bool,
}

#[derive(Debug, Clone, PartialEq)]
struct BuildKey {
    text: String,
    options: SearchOptions,
    view: Generation,
    columns: Generation,
}

enum Matcher {
    Exact { needle: String, case_sensitive: bool },
    Substring(String),
    Pattern(Regex),
}

impl Matcher {
    fn new(text: &str, options: &SearchOptions) -> Option<Self> {
        if options.exact_match && !options.use_regex {
            return Some(Matcher::Exact {
                needle: text.to_string(),
                case_sensitive: options.case_sensitive,
            });
        }
        if options.case_sensitive && !options.use_regex {
            return Some(Matcher::Substring(text.to_string()));
        }

        // Case-insensitive substrings go through an escaped pattern so hit
        // offsets refer to the displayed value, not a lowercased copy
        let body = if options.use_regex {
            text.to_string()
        } else {
            regex::escape(text)
        };
        let pattern = if options.case_sensitive {
            body
        } else {
            format!("(?i){}", body)
        };
        match Regex::new(&pattern) {
            Ok(regex) => Some(Matcher::Pattern(regex)),
            Err(e) => {
                warn!(target: "search", "Invalid regex pattern: {}", e);
                None
            }
        }
    }

    /// Byte ranges of non-overlapping hits in `value`
    fn find_all(&self, value: &str) -> Vec<(usize, usize)> {
        match self {
            Matcher::Exact {
                needle,
                case_sensitive,
            } => {
                let hit = if *case_sensitive {
                    value == needle
                } else {
                    value.to_lowercase() == needle.to_lowercase()
                };
                if hit {
                    vec![(0, value.len())]
                } else {
                    Vec::new()
                }
            }
            Matcher::Substring(needle) => value
                .match_indices(needle.as_str())
                .map(|(start, hit)| (start, start + hit.len()))
                .collect(),
            Matcher::Pattern(regex) => regex
                .find_iter(value)
                .filter(|m| !m.as_str().is_empty())
                .map(|m| (m.start(), m.end()))
                .collect(),
        }
    }
}

/// Manages search state and provides iteration through matches
pub struct SearchManager {
    text: String,
    options: SearchOptions,
    matches: Vec<MatchRecord>,
    /// Active match; `None` until the first advance
    current: Option<usize>,
    built_for: Option<BuildKey>,
    rebuilds: u64,
    /// Whether advancing should bring the match into view
    scroll_into_view: bool,
}

impl Default for SearchManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchManager {
    pub fn new() -> Self {
        Self::with_options(SearchOptions::default())
    }

    pub fn with_options(options: SearchOptions) -> Self {
        Self {
            text: String::new(),
            options,
            matches: Vec::new(),
            current: None,
            built_for: None,
            rebuilds: 0,
            scroll_into_view: true,
        }
    }

    pub fn options(&self) -> SearchOptions {
        self.options
    }

    pub fn set_scroll_into_view(&mut self, enabled: bool) {
        self.scroll_into_view = enabled;
    }

    pub fn scroll_into_view(&self) -> bool {
        self.scroll_into_view
    }

    /// Build (or reuse) the match list. Returns the number of matches.
    pub fn build(
        &mut self,
        text: &str,
        options: SearchOptions,
        view: &ComposedView,
        table: &DataTable,
        columns: &ColumnModel,
    ) -> usize {
        if text.is_empty() {
            self.clear();
            return 0;
        }

        let key = BuildKey {
            text: text.to_string(),
            options,
            view: view.generation(),
            columns: columns.generation(),
        };
        if self.built_for.as_ref() == Some(&key) {
            return self.matches.len();
        }

        let previous = self.current_match().map(|m| (m.row_id.clone(), m.field.clone(), m.occurrence));

        self.text = text.to_string();
        self.options = options;
        self.matches.clear();
        self.current = None;
        self.built_for = Some(key);
        self.rebuilds += 1;

        let Some(matcher) = Matcher::new(text, &options) else {
            return 0;
        };

        // (visible index, descriptor, table column)
        let searchable: Vec<_> = columns
            .visible_leaves()
            .into_iter()
            .enumerate()
            .filter_map(|(visible_idx, arena_idx)| {
                let column = columns.get(arena_idx)?;
                if !column.searchable {
                    return None;
                }
                let table_col = table.get_column_index(&column.field)?;
                Some((visible_idx, column, table_col))
            })
            .collect();

        for (position, row) in view.rows().iter().enumerate() {
            for (visible_idx, column, table_col) in &searchable {
                let Some(value) = view.value(table, position, *table_col) else {
                    continue;
                };
                let shown = display_value(value, column.format.as_ref());
                for (occurrence, range) in matcher.find_all(&shown).into_iter().enumerate() {
                    self.matches.push(MatchRecord {
                        row: position,
                        column: *visible_idx,
                        field: column.field.clone(),
                        occurrence,
                        pinned: row.pinned,
                        row_id: row.id.clone(),
                        highlight_range: range,
                    });
                }
            }
        }

        // Keep the user's place when the same hit still exists
        if let Some((row_id, field, occurrence)) = previous {
            self.current = self
                .matches
                .iter()
                .position(|m| m.row_id == row_id && m.field == field && m.occurrence == occurrence);
        }

        debug!(
            target: "search",
            "Search '{}' ({:?}) found {} matches over {} rows",
            text,
            options,
            self.matches.len(),
            view.len()
        );
        self.matches.len()
    }

    /// Move the cursor by `delta`, wrapping at both ends. From no active
    /// match, +1 lands on the first and -1 on the last.
    pub fn advance(&mut self, delta: isize) -> Option<&MatchRecord> {
        let len = self.matches.len();
        if len == 0 {
            return None;
        }
        let next = match self.current {
            Some(current) => (current as isize + delta).rem_euclid(len as isize) as usize,
            None if delta < 0 => (len as isize + delta).rem_euclid(len as isize) as usize,
            None => ((delta - 1).max(0) as usize) % len,
        };
        self.current = Some(next);
        self.matches.get(next)
    }

    pub fn next_match(&mut self) -> Option<&MatchRecord> {
        self.advance(1)
    }

    pub fn previous_match(&mut self) -> Option<&MatchRecord> {
        self.advance(-1)
    }

    /// Jump to a specific match index
    pub fn jump_to_match(&mut self, index: usize) -> Option<&MatchRecord> {
        if index < self.matches.len() {
            self.current = Some(index);
            self.current_match()
        } else {
            None
        }
    }

    pub fn current_match(&self) -> Option<&MatchRecord> {
        self.current.and_then(|idx| self.matches.get(idx))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Get current match index (1-based for display)
    pub fn current_match_number(&self) -> usize {
        self.current.map(|idx| idx + 1).unwrap_or(0)
    }

    pub fn all_matches(&self) -> &[MatchRecord] {
        &self.matches
    }

    pub fn match_count(&self) -> usize {
        self.matches.len()
    }

    /// Number of times the match list was rebuilt
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    pub fn clear(&mut self) {
        self.text.clear();
        self.matches.clear();
        self.current = None;
        self.built_for = None;
    }

    pub fn has_active_search(&self) -> bool {
        !self.text.is_empty()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Pinned rows are always rendered, so only unpinned hits need a scroll
    pub fn needs_scroll(&self, hit: &MatchRecord) -> bool {
        self.scroll_into_view && !hit.pinned
    }

    /// Calculate scroll offset needed to show a match in viewport
    pub fn calculate_scroll_offset(
        &self,
        hit: &MatchRecord,
        viewport_height: usize,
        current_offset: usize,
    ) -> usize {
        let row = hit.row;

        // If match is above current view, scroll up to it
        if row < current_offset {
            row
        }
        // If match is below current view, center it
        else if row >= current_offset + viewport_height {
            row.saturating_sub(viewport_height / 2)
        } else {
            current_offset
        }
    }

    /// First match at or after the given cell, wrapping to the start
    pub fn find_next_from(&self, row: usize, column: usize) -> Option<&MatchRecord> {
        self.matches
            .iter()
            .find(|m| (m.row, m.column) >= (row, column))
            .or_else(|| self.matches.first())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::column_model::ColumnSpec;
    use crate::data::data_view::{ComposeRequest, ViewComposer};
    use crate::data::datatable::{DataColumn, DataRow, DataValue};
    use crate::data::pinning::{PinPosition, RowPinRegistry};
    use crate::data::value_format::ValueFormat;

    fn fixture() -> (DataTable, ColumnModel, ComposedView) {
        let mut table = DataTable::new("fruit");
        table.add_column(DataColumn::new("name"));
        table.add_column(DataColumn::new("price"));
        for (name, price) in [("banana", 1.5), ("apple", 2.0), ("Banana split", 4.25)] {
            table
                .add_row(DataRow::new(vec![
                    DataValue::String(name.to_string()),
                    DataValue::Float(price),
                ]))
                .unwrap();
        }
        let model = ColumnModel::from_specs(&[
            ColumnSpec::new("name"),
            ColumnSpec::new("price").format(ValueFormat::Currency {
                symbol: "$".to_string(),
                decimals: 2,
            }),
        ])
        .unwrap();
        let mut pins = RowPinRegistry::new(PinPosition::Start);
        pins.pin(RowId::new("2"), None);
        let view = ViewComposer::default()
            .compose(&ComposeRequest::new(&table, &pins), Generation::INITIAL)
            .unwrap();
        (table, model, view)
    }

    #[test]
    fn test_substring_counts_every_occurrence() {
        let (table, model, view) = fixture();
        let mut search = SearchManager::new();
        // "Banana split" (3) + "banana" (3) + "apple" (1)
        assert_eq!(search.build("a", SearchOptions::default(), &view, &table, &model), 7);

        let banana: Vec<_> = search
            .all_matches()
            .iter()
            .filter(|m| m.row_id == RowId::new("0"))
            .map(|m| m.occurrence)
            .collect();
        assert_eq!(banana, vec![0, 1, 2]);
        assert!(search.all_matches()[0].pinned);
    }

    #[test]
    fn test_exact_and_case_sensitive_modes() {
        let (table, model, view) = fixture();
        let mut search = SearchManager::new();
        let exact = SearchOptions {
            exact_match: true,
            ..SearchOptions::default()
        };
        assert_eq!(search.build("BANANA", exact, &view, &table, &model), 1);

        let sensitive = SearchOptions {
            case_sensitive: true,
            ..SearchOptions::default()
        };
        assert_eq!(search.build("Ban", sensitive, &view, &table, &model), 1);
    }

    #[test]
    fn test_formatted_values_are_searched() {
        let (table, model, view) = fixture();
        let mut search = SearchManager::new();
        assert_eq!(search.build("$4.25", SearchOptions::default(), &view, &table, &model), 1);
        assert_eq!(search.build("4.250", SearchOptions::default(), &view, &table, &model), 0);
    }

    #[test]
    fn test_highlight_ranges_index_the_shown_value() {
        let mut table = DataTable::new("cities");
        table.add_column(DataColumn::new("name"));
        let city = "İstanbul kapı";
        table
            .add_row(DataRow::new(vec![DataValue::String(city.to_string())]))
            .unwrap();
        let model = ColumnModel::infer_from(&table);
        let pins = RowPinRegistry::new(PinPosition::Start);
        let view = ViewComposer::default()
            .compose(&ComposeRequest::new(&table, &pins), Generation::INITIAL)
            .unwrap();

        let mut search = SearchManager::new();
        assert_eq!(search.build("KAP", SearchOptions::default(), &view, &table, &model), 1);
        let (start, end) = search.all_matches()[0].highlight_range;
        assert_eq!(&city[start..end], "kap");

        let exact = SearchOptions {
            exact_match: true,
            ..SearchOptions::default()
        };
        assert_eq!(search.build(city, exact, &view, &table, &model), 1);
        assert_eq!(search.all_matches()[0].highlight_range, (0, city.len()));
    }

    #[test]
    fn test_regex_mode() {
        let (table, model, view) = fixture();
        let mut search = SearchManager::new();
        let options = SearchOptions {
            use_regex: true,
            ..SearchOptions::default()
        };
        assert_eq!(search.build("^b", options, &view, &table, &model), 2);
        assert_eq!(search.build("(", options, &view, &table, &model), 0);
    }

    #[test]
    fn test_advance_wraps_and_cycles() {
        let (table, model, view) = fixture();
        let mut search = SearchManager::new();
        let count = search.build("an", SearchOptions::default(), &view, &table, &model);
        assert_eq!(count, 4);

        assert_eq!(search.advance(-1).map(|m| m.row), Some(1));
        assert_eq!(search.current_index(), Some(3));
        let start = search.current_index();
        for _ in 0..count {
            search.advance(1);
        }
        assert_eq!(search.current_index(), start);
        assert_eq!(search.advance(1).map(|m| m.row), Some(0));
    }

    #[test]
    fn test_rebuild_only_when_inputs_change() {
        let (table, model, view) = fixture();
        let mut search = SearchManager::new();
        search.build("a", SearchOptions::default(), &view, &table, &model);
        search.build("a", SearchOptions::default(), &view, &table, &model);
        assert_eq!(search.rebuild_count(), 1);

        search.advance(1);
        search.advance(1);
        let active = search.current_match().cloned();

        // A newer view generation rebuilds but keeps the active hit
        let mut pins = RowPinRegistry::new(PinPosition::Start);
        pins.pin(RowId::new("2"), None);
        let newer = ViewComposer::default()
            .compose(&ComposeRequest::new(&table, &pins), Generation::INITIAL.next())
            .unwrap();
        search.build("a", SearchOptions::default(), &newer, &table, &model);
        assert_eq!(search.rebuild_count(), 2);
        assert_eq!(search.current_match().cloned(), active);
    }

    #[test]
    fn test_empty_text_clears() {
        let (table, model, view) = fixture();
        let mut search = SearchManager::new();
        search.build("a", SearchOptions::default(), &view, &table, &model);
        assert_eq!(search.build("", SearchOptions::default(), &view, &table, &model), 0);
        assert!(search.advance(1).is_none());
        assert!(!search.has_active_search());
    }

    #[test]
    fn test_scroll_offset() {
        let search = SearchManager::new();
        let hit = MatchRecord {
            row: 40,
            column: 0,
            field: "name".to_string(),
            occurrence: 0,
            pinned: false,
            row_id: RowId::new("40"),
            highlight_range: (0, 1),
        };
        assert_eq!(search.calculate_scroll_offset(&hit, 10, 0), 35);
        assert_eq!(search.calculate_scroll_offset(&hit, 10, 50), 40);
        assert_eq!(search.calculate_scroll_offset(&hit, 10, 35), 35);
        assert!(search.needs_scroll(&hit));
    }
}
