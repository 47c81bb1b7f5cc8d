//! Grid events and cancelable changes

use crate::core::generation::Generation;
use crate::data::datatable::RowId;

/// Notifications emitted after state has changed
#[derive(Debug, Clone, PartialEq)]
pub enum GridEvent {
    /// Something changed; the host should schedule a flush
    RecomputeRequested,

    /// A new composed view was committed; the renderer should repaint
    RepaintRequested { generation: Generation },

    RowPinned { id: RowId },
    RowUnpinned { id: RowId },

    ColumnPinned { field: String, affected: Vec<String> },
    ColumnUnpinned { field: String, affected: Vec<String> },

    /// Pin flags were auto-corrected to match their group ancestor
    PinStateNormalized { fields: Vec<String> },

    ColumnMoved {
        field: String,
        target: String,
        pin_changed: bool,
    },

    ViewComposed { generation: Generation, rows: usize },

    SearchRebuilt { text: String, matches: usize },

    SelectionChanged,
}

impl GridEvent {
    /// Signals the rendering layer consumes, as opposed to informational events
    pub fn is_signal(&self) -> bool {
        matches!(
            self,
            GridEvent::RecomputeRequested | GridEvent::RepaintRequested { .. }
        )
    }
}

/// A change about to be applied; subscribers may veto it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GridChange {
    PinRow { id: RowId, at: Option<usize> },
    UnpinRow { id: RowId },
    PinColumn { field: String },
    UnpinColumn { field: String },
}

/// Pre-hook verdict: go ahead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Proceed;

/// Pre-hook verdict: veto, with the reason logged
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancel {
    pub reason: String,
}

impl Cancel {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

pub type HookResult = Result<Proceed, Cancel>;
