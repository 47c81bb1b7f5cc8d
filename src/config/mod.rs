//! Configuration module
//!
//! Grid defaults loaded from `~/.config/grid-view/config.toml`.

pub mod config;

pub use config::GridConfig;
