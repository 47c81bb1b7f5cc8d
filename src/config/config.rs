use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::core::search_manager::SearchOptions;
use crate::core::selection_manager::SelectionMode;
use crate::data::index_map::PagingWindow;
use crate::data::pinning::PinPosition;
use crate::ui::viewport::column_width_calculator::{WidthSettings, DEFAULT_COL_WIDTH, MIN_COL_WIDTH};
use crate::ui::viewport_manager::DEFAULT_CHUNK_SIZE;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub columns: ColumnsConfig,
    pub rows: RowsConfig,
    pub pinning: PinningConfig,
    pub selection: SelectionConfig,
    pub search: SearchConfig,
    pub paging: PagingConfig,
    pub editing: EditingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnsConfig {
    /// Width of a column sized without a container
    pub default_width: u32,

    /// Floor for auto-sized columns
    pub min_width: u32,

    /// Space reserved for selector/drag-handle/expander columns
    pub feature_column_width: u32,

    /// Upper bound applied to columns without their own max
    pub default_max_width: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RowsConfig {
    /// Where pinned rows go: "start" (top) or "end" (bottom)
    pub pin_position: PinPosition,

    pub row_height: u32,

    /// Rows materialized at once
    pub chunk_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PinningConfig {
    /// Where pinned columns go: "start" (left) or "end" (right)
    pub column_position: PinPosition,

    /// Maximum pinned leaf columns; unlimited when absent
    pub max_pinned_columns: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// "none", "single" or "multiple"
    pub cell_mode: SelectionMode,

    /// "none", "single" or "multiple"
    pub row_mode: SelectionMode,

    /// Copy display values rather than raw values
    pub copy_formatted: bool,

    /// Copy headers as keys
    pub copy_headers: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub case_sensitive: bool,
    pub exact_match: bool,
    pub use_regex: bool,

    /// Scroll the active match into view when navigating
    pub scroll_into_view: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PagingConfig {
    pub enabled: bool,
    pub page_size: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditingConfig {
    /// Keep deleted-but-uncommitted rows visible as ghosts
    pub show_deleted_rows: bool,
}

impl Default for ColumnsConfig {
    fn default() -> Self {
        Self {
            default_width: DEFAULT_COL_WIDTH,
            min_width: MIN_COL_WIDTH,
            feature_column_width: 0,
            default_max_width: None,
        }
    }
}

impl Default for RowsConfig {
    fn default() -> Self {
        Self {
            pin_position: PinPosition::Start,
            row_height: 28,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            cell_mode: SelectionMode::Multiple,
            row_mode: SelectionMode::Multiple,
            copy_formatted: false,
            copy_headers: true,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            case_sensitive: false,
            exact_match: false,
            use_regex: false,
            scroll_into_view: true,
        }
    }
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            page_size: 100,
        }
    }
}

impl ColumnsConfig {
    pub fn width_settings(&self) -> WidthSettings {
        WidthSettings {
            default_width: self.default_width,
            min_width: self.min_width,
            feature_width: self.feature_column_width,
            default_max_width: self.default_max_width,
        }
    }
}

impl SearchConfig {
    pub fn options(&self) -> SearchOptions {
        SearchOptions {
            case_sensitive: self.case_sensitive,
            exact_match: self.exact_match,
            use_regex: self.use_regex,
        }
    }
}

impl PagingConfig {
    /// First page when paging is enabled
    pub fn initial_window(&self) -> Option<PagingWindow> {
        self.enabled.then(|| PagingWindow::new(0, self.page_size.max(1)))
    }
}

impl GridConfig {
    /// Load config from the default location, writing defaults if absent
    pub fn load() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            let default_config = Self::default();
            default_config.save()?;
            info!(target: "config", "Created default config at {:?}", config_path);
            return Ok(default_config);
        }

        Self::load_from(&config_path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: GridConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        debug!(target: "config", "Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;

        Ok(())
    }

    /// Get the default config file path
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("grid-view").join("config.toml"))
    }

    /// Create a default config file with comments
    pub fn create_default_with_comments() -> String {
        r#"# Grid View Configuration File
# Location: ~/.config/grid-view/config.toml (Linux)
#           ~/Library/Application Support/grid-view/config.toml (macOS)
#           %APPDATA%\grid-view\config.toml (Windows)

[columns]
# Width (px) given to auto-sized columns when the container width is unknown
default_width = 150

# Auto-sized columns never get less than this (px)
min_width = 136

# Space reserved for selector / drag-handle / expander columns (px)
feature_column_width = 0

# Upper bound for columns without their own max width
# default_max_width = 600

[rows]
# Pinned rows go to the "start" (top) or "end" (bottom)
pin_position = "start"

# Row height in px
row_height = 28

# Number of rows materialized at once
chunk_size = 50

[pinning]
# Pinned columns go to the "start" (left) or "end" (right)
column_position = "start"

# Maximum number of pinned leaf columns (leave commented for no limit)
# max_pinned_columns = 3

[selection]
# Cell selection: "none", "single" or "multiple"
cell_mode = "multiple"

# Row selection: "none", "single" or "multiple"
row_mode = "multiple"

# Copy formatted values instead of raw values
copy_formatted = false

# Use column headers as keys when copying
copy_headers = true

[search]
case_sensitive = false

# Match whole cell values only
exact_match = false

# Treat the search text as a regular expression
use_regex = false

# Scroll to the active match when moving between matches
scroll_into_view = true

[paging]
enabled = false
page_size = 100

[editing]
# Keep deleted-but-uncommitted rows visible (flagged) until commit
show_deleted_rows = false
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GridConfig::default();
        assert_eq!(config.columns.min_width, 136);
        assert_eq!(config.rows.pin_position, PinPosition::Start);
        assert_eq!(config.selection.cell_mode, SelectionMode::Multiple);
        assert!(config.paging.initial_window().is_none());
    }

    #[test]
    fn test_config_serialization() {
        let config = GridConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: GridConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_commented_default_parses() {
        let parsed: GridConfig = toml::from_str(&GridConfig::create_default_with_comments()).unwrap();
        assert_eq!(parsed, GridConfig::default());
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "[rows]\npin_position = \"end\"\n\n[pinning]\nmax_pinned_columns = 2\n",
        )?;

        let config = GridConfig::load_from(&path)?;
        assert_eq!(config.rows.pin_position, PinPosition::End);
        assert_eq!(config.rows.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.pinning.max_pinned_columns, Some(2));
        assert!(config.search.scroll_into_view);

        let saved = dir.path().join("nested").join("saved.toml");
        config.save_to(&saved)?;
        assert_eq!(GridConfig::load_from(&saved)?, config);
        Ok(())
    }
}
