//! Core engine components
//!
//! Generation caches, the search match cache, cell/row/column selection and
//! the engine that composes them over a data table.

pub mod generation;
pub mod grid_engine;
pub mod search_manager;
pub mod selection_manager;
