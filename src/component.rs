//! Component trait - Interface for UI components
//!
//! Each component encapsulates its own view state, event handling, and
//! rendering. Components communicate through Actions rather than direct
//! state mutation.

use crate::action::Action;
use anyhow::Result;
use crossterm::event::KeyEvent;
use ratatui::{layout::Rect, Frame};

/// Trait for UI components
///
/// 1. `handle_key_event` - Convert key events to Actions
/// 2. `update` - Process Actions and update state
/// 3. `draw` - Render the component
pub trait Component {
    /// Called once before the first draw
    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Handle a key event, returning an optional Action
    fn handle_key_event(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        let _ = key;
        Ok(None)
    }

    /// Update state for an Action, optionally returning a follow-up Action
    fn update(&mut self, action: Action) -> Result<Option<Action>> {
        let _ = action;
        Ok(None)
    }

    /// Render into `area`
    fn draw(&mut self, frame: &mut Frame, area: Rect) -> Result<()>;
}
