//! State management components
//!
//! Events flowing out of the grid engine, the pre-change hooks that may veto
//! them, and the persisted form of the user's arrangement.

pub mod dispatcher;
pub mod events;
pub mod persistence;
