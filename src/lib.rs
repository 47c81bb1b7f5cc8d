pub mod config;
pub mod core;
pub mod data;
pub mod state;
pub mod ui;
pub mod utils;

pub use crate::core::grid_engine::GridEngine;
pub use crate::data::data_view::ComposedView;
pub use crate::data::datatable::{DataTable, RowId};
