//! Modal stack for managing overlays

/// A modal overlay drawn on top of the table view
#[derive(Debug, Clone, PartialEq)]
pub enum Modal {
    /// Quit confirmation dialog
    QuitConfirm,
    /// Keyboard shortcut reference
    Help,
    /// Format, scope and flatten policy for an export
    Export,
    /// Column visibility toggles
    Columns,
    /// Text input for pasting a shared location
    Location,
    /// Date range and column filter inputs
    Filters,
}

/// A stack of modal overlays
///
/// Only the top modal receives input events.
#[derive(Debug, Default)]
pub struct ModalStack {
    stack: Vec<Modal>,
}

impl ModalStack {
    pub fn new() -> Self {
        Self { stack: Vec::new() }
    }

    pub fn push(&mut self, modal: Modal) {
        self.stack.push(modal);
    }

    pub fn pop(&mut self) -> Option<Modal> {
        self.stack.pop()
    }

    pub fn top(&self) -> Option<&Modal> {
        self.stack.last()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }
}
