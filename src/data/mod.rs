//! Data layer: record storage, column model, pinning and view composition
//!
//! Storage (`DataTable`) is never modified by the view; everything the user
//! sees is derived from it through the `ViewComposer`.

// Core data modules
pub mod data_view;
pub mod datatable;
pub mod datatable_loaders;
pub mod datavalue_compare;

// Column geometry and pin partitions
pub mod column_model;
pub mod pinning;

// Collaborators consumed by the composer
pub mod filtering;
pub mod pending_edits;
pub mod sorting;

pub mod index_map;
pub mod value_format;
