//! Column visibility dialog

use crate::action::Action;
use crate::component::Component;
use crate::components::centered_popup;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

/// One column as listed in the dialog
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnEntry {
    pub id: String,
    pub header: String,
    pub visible: bool,
    /// Pinned columns are listed but cannot be hidden
    pub hideable: bool,
}

#[derive(Default)]
pub struct ColumnDialog {
    pub selected_index: usize,
    entries: Vec<ColumnEntry>,
}

impl ColumnDialog {
    /// Refresh the listed columns, keeping the cursor in range
    pub fn set_columns(&mut self, entries: Vec<ColumnEntry>) {
        self.entries = entries;
        self.selected_index = self
            .selected_index
            .min(self.entries.len().saturating_sub(1));
    }
}

impl Component for ColumnDialog {
    fn handle_key_event(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        let action = match key.code {
            KeyCode::Char('j') | KeyCode::Down => {
                if self.selected_index + 1 < self.entries.len() {
                    self.selected_index += 1;
                }
                None
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.selected_index = self.selected_index.saturating_sub(1);
                None
            }
            KeyCode::Char(' ') | KeyCode::Enter => self
                .entries
                .get(self.selected_index)
                .filter(|e| e.hideable)
                .map(|e| Action::ToggleColumnVisibility(e.id.clone())),
            KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('c') => Some(Action::CloseModal),
            _ => None,
        };
        Ok(action)
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect) -> Result<()> {
        let popup_area = centered_popup(area, 44, self.entries.len() as u16 + 6);
        frame.render_widget(Clear, popup_area);

        let mut content = vec![Line::from("")];
        for (i, entry) in self.entries.iter().enumerate() {
            let prefix = if i == self.selected_index { "▶ " } else { "  " };
            let checkbox = if entry.visible { "[x]" } else { "[ ]" };
            let checkbox_style = if !entry.hideable {
                Style::default().fg(Color::DarkGray)
            } else if entry.visible {
                Style::default().fg(Color::Green)
            } else {
                Style::default().fg(Color::DarkGray)
            };
            let label_style = if i == self.selected_index {
                Style::default()
                    .fg(Color::Yellow)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::White)
            };

            let mut spans = vec![
                Span::raw(format!(" {}", prefix)),
                Span::styled(checkbox, checkbox_style),
                Span::styled(format!(" {}", entry.header), label_style),
            ];
            if !entry.hideable {
                spans.push(Span::styled(
                    " (pinned)",
                    Style::default().fg(Color::DarkGray),
                ));
            }
            content.push(Line::from(spans));
        }

        content.push(Line::from(""));
        content.push(Line::from(vec![
            Span::styled(
                " Space ",
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("Show/hide  "),
            Span::styled(
                " Esc ",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ),
            Span::raw("Close"),
        ]));

        let paragraph = Paragraph::new(content).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Magenta))
                .title(" Columns ")
                .title_style(
                    Style::default()
                        .fg(Color::Magenta)
                        .add_modifier(Modifier::BOLD),
                ),
        );

        frame.render_widget(paragraph, popup_area);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::KeyModifiers;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn entry(id: &str, hideable: bool) -> ColumnEntry {
        ColumnEntry {
            id: id.to_string(),
            header: id.to_uppercase(),
            visible: true,
            hideable,
        }
    }

    #[test]
    fn test_pinned_column_cannot_be_toggled() {
        let mut dialog = ColumnDialog::default();
        dialog.set_columns(vec![entry("id", false), entry("status", true)]);

        assert_eq!(dialog.handle_key_event(key(KeyCode::Char(' '))).unwrap(), None);

        dialog.handle_key_event(key(KeyCode::Down)).unwrap();
        assert_eq!(
            dialog.handle_key_event(key(KeyCode::Enter)).unwrap(),
            Some(Action::ToggleColumnVisibility("status".to_string()))
        );
    }

    #[test]
    fn test_cursor_stays_in_range() {
        let mut dialog = ColumnDialog::default();
        dialog.set_columns(vec![entry("a", true), entry("b", true)]);
        for _ in 0..5 {
            dialog.handle_key_event(key(KeyCode::Char('j'))).unwrap();
        }
        assert_eq!(dialog.selected_index, 1);

        dialog.set_columns(vec![entry("a", true)]);
        assert_eq!(dialog.selected_index, 0);
    }
}
