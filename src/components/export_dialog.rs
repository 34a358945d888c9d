//! Export dialog component
//!
//! Three-section dialog:
//! 1. File format (CSV, XLSX)
//! 2. Scope (selected rows, current page, all pages)
//! 3. How child rows are written

use crate::action::Action;
use crate::component::Component;
use crate::components::centered_popup;
use crate::services::export::{ExportFormat, ExportScope, FlattenPolicy};
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

const FORMATS: [ExportFormat; 2] = [ExportFormat::Csv, ExportFormat::Xlsx];

/// Focus section in the export dialog
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ExportFocus {
    #[default]
    Format,
    Scope,
    Flatten,
}

impl ExportFocus {
    fn next(self) -> Self {
        match self {
            ExportFocus::Format => ExportFocus::Scope,
            ExportFocus::Scope => ExportFocus::Flatten,
            ExportFocus::Flatten => ExportFocus::Format,
        }
    }

    fn prev(self) -> Self {
        match self {
            ExportFocus::Format => ExportFocus::Flatten,
            ExportFocus::Scope => ExportFocus::Format,
            ExportFocus::Flatten => ExportFocus::Scope,
        }
    }
}

#[derive(Default)]
pub struct ExportDialog {
    pub focus: ExportFocus,
    pub format_index: usize,
    pub scope_index: usize,
    pub flatten_index: usize,
    /// Scopes on offer; all pages only when the source can return everything
    scopes: Vec<ExportScope>,
    policies: Vec<FlattenPolicy>,
    selected_count: usize,
}

impl ExportDialog {
    /// Reset the dialog for a fresh export
    pub fn open(
        &mut self,
        format: ExportFormat,
        policies: Vec<FlattenPolicy>,
        supports_full_retrieval: bool,
        selected_count: usize,
    ) {
        self.focus = ExportFocus::Format;
        self.format_index = FORMATS.iter().position(|f| *f == format).unwrap_or(0);

        self.scopes = vec![ExportScope::Selected, ExportScope::CurrentPage];
        if supports_full_retrieval {
            self.scopes.push(ExportScope::AllPages);
        }
        // Nothing selected: the current page is the useful default
        self.scope_index = if selected_count > 0 { 0 } else { 1 };

        self.policies = policies;
        self.flatten_index = 0;
        self.selected_count = selected_count;
    }

    pub fn format(&self) -> ExportFormat {
        FORMATS[self.format_index.min(FORMATS.len() - 1)]
    }

    pub fn scope(&self) -> ExportScope {
        self.scopes
            .get(self.scope_index)
            .copied()
            .unwrap_or_default()
    }

    pub fn flatten(&self) -> FlattenPolicy {
        self.policies
            .get(self.flatten_index)
            .cloned()
            .unwrap_or_default()
    }

    fn move_within_section(&mut self, down: bool) {
        let (index, len) = match self.focus {
            ExportFocus::Format => (&mut self.format_index, FORMATS.len()),
            ExportFocus::Scope => (&mut self.scope_index, self.scopes.len()),
            ExportFocus::Flatten => (&mut self.flatten_index, self.policies.len()),
        };
        if len == 0 {
            return;
        }
        *index = if down {
            (*index + 1) % len
        } else {
            (*index + len - 1) % len
        };
    }

    fn section_header(&self, title: &str, section: ExportFocus) -> Line<'static> {
        let style = if self.focus == section {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        Line::from(Span::styled(format!("─ {} ─", title), style))
    }

    fn option_line(&self, label: String, selected: bool, section: ExportFocus) -> Line<'static> {
        let prefix = if selected && self.focus == section {
            "▶ "
        } else if selected {
            "● "
        } else {
            "  "
        };
        let style = if selected {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(Color::White)
        };
        Line::from(vec![
            Span::raw("  "),
            Span::styled(format!("{}{}", prefix, label), style),
        ])
    }
}

impl Component for ExportDialog {
    fn handle_key_event(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        let action = match key.code {
            KeyCode::Tab => {
                self.focus = self.focus.next();
                None
            }
            KeyCode::BackTab => {
                self.focus = self.focus.prev();
                None
            }
            KeyCode::Char('j') | KeyCode::Down => {
                self.move_within_section(true);
                None
            }
            KeyCode::Char('k') | KeyCode::Up => {
                self.move_within_section(false);
                None
            }
            KeyCode::Enter => Some(Action::RunExport),
            KeyCode::Esc | KeyCode::Char('q') => Some(Action::CloseModal),
            _ => None,
        };
        Ok(action)
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect) -> Result<()> {
        let height = (FORMATS.len() + self.scopes.len() + self.policies.len()) as u16 + 10;
        let popup_area = centered_popup(area, 52, height);
        frame.render_widget(Clear, popup_area);

        let mut content = vec![Line::from("")];

        content.push(self.section_header("Format", ExportFocus::Format));
        for (i, format) in FORMATS.iter().enumerate() {
            content.push(self.option_line(
                format.extension().to_uppercase(),
                i == self.format_index,
                ExportFocus::Format,
            ));
        }
        content.push(Line::from(""));

        content.push(self.section_header("Rows", ExportFocus::Scope));
        for (i, scope) in self.scopes.iter().enumerate() {
            let label = match scope {
                ExportScope::Selected => format!("{} ({})", scope.label(), self.selected_count),
                _ => scope.label().to_string(),
            };
            content.push(self.option_line(label, i == self.scope_index, ExportFocus::Scope));
        }
        content.push(Line::from(""));

        content.push(self.section_header("Child rows", ExportFocus::Flatten));
        for (i, policy) in self.policies.iter().enumerate() {
            content.push(self.option_line(
                policy.label().to_string(),
                i == self.flatten_index,
                ExportFocus::Flatten,
            ));
        }
        content.push(Line::from(""));

        content.push(Line::from(vec![
            Span::styled(
                " Tab ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("Switch  "),
            Span::styled(
                " Enter ",
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("Export  "),
            Span::styled(
                " Esc ",
                Style::default()
                    .fg(Color::Red)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("Cancel"),
        ]));

        let paragraph = Paragraph::new(content).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan))
                .title(" Export ")
                .title_style(
                    Style::default()
                        .fg(Color::Cyan)
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

    fn policies() -> Vec<FlattenPolicy> {
        vec![
            FlattenPolicy::Skip,
            FlattenPolicy::FlattenWithIndent {
                indent: "  ".to_string(),
                max_depth: 3,
            },
            FlattenPolicy::SeparateGroups { kind_field: None },
        ]
    }

    #[test]
    fn test_default_scope_follows_selection() {
        let mut dialog = ExportDialog::default();
        dialog.open(ExportFormat::Csv, policies(), true, 0);
        assert_eq!(dialog.scope(), ExportScope::CurrentPage);

        dialog.open(ExportFormat::Xlsx, policies(), true, 3);
        assert_eq!(dialog.scope(), ExportScope::Selected);
        assert_eq!(dialog.format(), ExportFormat::Xlsx);
    }

    #[test]
    fn test_all_pages_requires_full_retrieval() {
        let mut dialog = ExportDialog::default();
        dialog.open(ExportFormat::Csv, policies(), false, 0);
        dialog.handle_key_event(key(KeyCode::Tab)).unwrap();
        dialog.handle_key_event(key(KeyCode::Down)).unwrap();
        // Wraps back to the first scope
        assert_eq!(dialog.scope(), ExportScope::Selected);

        dialog.open(ExportFormat::Csv, policies(), true, 0);
        dialog.handle_key_event(key(KeyCode::Tab)).unwrap();
        dialog.handle_key_event(key(KeyCode::Down)).unwrap();
        assert_eq!(dialog.scope(), ExportScope::AllPages);
    }

    #[test]
    fn test_sections_are_independent() {
        let mut dialog = ExportDialog::default();
        dialog.open(ExportFormat::Csv, policies(), true, 1);

        dialog.handle_key_event(key(KeyCode::Char('j'))).unwrap();
        assert_eq!(dialog.format(), ExportFormat::Xlsx);

        dialog.handle_key_event(key(KeyCode::BackTab)).unwrap();
        assert_eq!(dialog.focus, ExportFocus::Flatten);
        dialog.handle_key_event(key(KeyCode::Char('k'))).unwrap();
        assert_eq!(dialog.flatten(), FlattenPolicy::SeparateGroups { kind_field: None });
        assert_eq!(dialog.scope(), ExportScope::Selected);
    }

    #[test]
    fn test_enter_runs_export() {
        let mut dialog = ExportDialog::default();
        dialog.open(ExportFormat::Csv, policies(), true, 0);
        assert_eq!(
            dialog.handle_key_event(key(KeyCode::Enter)).unwrap(),
            Some(Action::RunExport)
        );
        assert_eq!(
            dialog.handle_key_event(key(KeyCode::Esc)).unwrap(),
            Some(Action::CloseModal)
        );
    }
}
