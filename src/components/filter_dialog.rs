//! Filter dialog: date range plus a value filter on the focused column

use crate::action::Action;
use crate::component::Component;
use crate::components::centered_popup;
use crate::model::query::parse_iso_date;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum FilterField {
    #[default]
    FromDate,
    ToDate,
    ColumnValue,
}

#[derive(Default)]
pub struct FilterDialog {
    pub focus: FilterField,
    pub from_date: String,
    pub to_date: String,
    pub value: String,
    column_id: String,
    column_header: String,
    /// Set when Enter was pressed with a malformed date
    invalid: bool,
}

impl FilterDialog {
    /// Prefill from the current query
    pub fn open(
        &mut self,
        from_date: &str,
        to_date: &str,
        column_id: &str,
        column_header: &str,
        value: &str,
    ) {
        self.focus = FilterField::FromDate;
        self.from_date = from_date.to_string();
        self.to_date = to_date.to_string();
        self.column_id = column_id.to_string();
        self.column_header = column_header.to_string();
        self.value = value.to_string();
        self.invalid = false;
    }

    fn focused_input(&mut self) -> &mut String {
        match self.focus {
            FilterField::FromDate => &mut self.from_date,
            FilterField::ToDate => &mut self.to_date,
            FilterField::ColumnValue => &mut self.value,
        }
    }

    fn dates_valid(&self) -> bool {
        [&self.from_date, &self.to_date]
            .iter()
            .all(|d| d.is_empty() || parse_iso_date(d).is_some())
    }

    fn field_line(&self, label: &str, value: &str, field: FilterField) -> Line<'static> {
        let focused = self.focus == field;
        let prefix = if focused { "▶ " } else { "  " };
        let shown = if focused {
            format!("{}_", value)
        } else if value.is_empty() {
            "(any)".to_string()
        } else {
            value.to_string()
        };
        let style = if focused {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD)
        } else if value.is_empty() {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default().fg(Color::Green)
        };
        Line::from(vec![
            Span::raw(format!(" {}", prefix)),
            Span::styled(format!("{:<14}", label), Style::default().fg(Color::Cyan)),
            Span::styled(shown, style),
        ])
    }
}

impl Component for FilterDialog {
    fn handle_key_event(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        let action = match key.code {
            KeyCode::Esc => Some(Action::CloseModal),
            KeyCode::Tab | KeyCode::Down => {
                self.focus = match self.focus {
                    FilterField::FromDate => FilterField::ToDate,
                    FilterField::ToDate => FilterField::ColumnValue,
                    FilterField::ColumnValue => FilterField::FromDate,
                };
                None
            }
            KeyCode::BackTab | KeyCode::Up => {
                self.focus = match self.focus {
                    FilterField::FromDate => FilterField::ColumnValue,
                    FilterField::ToDate => FilterField::FromDate,
                    FilterField::ColumnValue => FilterField::ToDate,
                };
                None
            }
            KeyCode::Enter => {
                if self.dates_valid() {
                    Some(Action::ApplyFilters {
                        from_date: self.from_date.trim().to_string(),
                        to_date: self.to_date.trim().to_string(),
                        column_id: self.column_id.clone(),
                        value: self.value.trim().to_string(),
                    })
                } else {
                    self.invalid = true;
                    None
                }
            }
            KeyCode::Backspace => {
                self.focused_input().pop();
                self.invalid = false;
                None
            }
            KeyCode::Char(c) => {
                self.focused_input().push(c);
                self.invalid = false;
                None
            }
            _ => None,
        };
        Ok(action)
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect) -> Result<()> {
        let popup_area = centered_popup(area, 56, 12);
        frame.render_widget(Clear, popup_area);

        let column_label = format!("{} is", self.column_header);
        let mut content = vec![
            Line::from(""),
            self.field_line("From date", &self.from_date, FilterField::FromDate),
            self.field_line("To date", &self.to_date, FilterField::ToDate),
            self.field_line(&column_label, &self.value, FilterField::ColumnValue),
            Line::from(""),
        ];

        if self.invalid {
            content.push(Line::from(Span::styled(
                " Dates must look like 2024-01-31",
                Style::default().fg(Color::Red),
            )));
        } else {
            content.push(Line::from(Span::styled(
                " Leave a field empty to clear it",
                Style::default().fg(Color::DarkGray),
            )));
        }
        content.push(Line::from(""));
        content.push(Line::from(vec![
            Span::styled(
                " Tab ",
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("Next field  "),
            Span::styled(
                " Enter ",
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            ),
            Span::raw("Apply  "),
            Span::styled(
                " Esc ",
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            ),
            Span::raw("Cancel"),
        ]));

        let paragraph = Paragraph::new(content).block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow))
                .title(" Filters ")
                .title_style(
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::BOLD),
                ),
        );

        frame.render_widget(paragraph, popup_area);
        Ok(())
    }
}
