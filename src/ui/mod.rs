//! Rendering-facing state
//!
//! The window of materialized rows, horizontal scroll reconciliation and
//! column width allocation. Nothing here draws; a renderer reads these.

pub mod viewport;
pub mod viewport_manager;
