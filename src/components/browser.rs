//! Table view
//!
//! Draws the query header, the row grid, the status line with the shareable
//! location and the help bar. Row and column cursors live here; everything
//! that changes the query goes through the table controller.

use crate::action::Action;
use crate::component::Component;
use crate::components::layout::calculate_browser_layout;
use crate::controller::TableController;
use crate::model::column::ColumnDef;
use crate::model::query::{QueryState, SortOrder};
use crate::model::row::RowNode;
use crate::services::layout_store::LayoutBackend;
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState, Wrap},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Width of the leading checkbox + expand marker column
const MARKER_WIDTH: u16 = 6;

// ═══════════════════════════════════════════════════════════════════════════════
// Component State
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct BrowserComponent {
    /// Index into the render rows
    pub cursor: usize,
    /// Index into the visible columns
    pub focused_column: usize,
    pub search_mode: bool,
    /// Text being typed; committed to the query through the debounced search
    pub search_input: String,
    table_state: TableState,
}

impl BrowserComponent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_row(&mut self, row_count: usize) {
        if row_count > 0 {
            self.cursor = (self.cursor + 1).min(row_count - 1);
        }
    }

    pub fn prev_row(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn last_row(&mut self, row_count: usize) {
        self.cursor = row_count.saturating_sub(1);
    }

    /// Keep both cursors inside the current rows and columns
    pub fn clamp(&mut self, row_count: usize, column_count: usize) {
        self.cursor = self.cursor.min(row_count.saturating_sub(1));
        self.focused_column = self.focused_column.min(column_count.saturating_sub(1));
    }

    pub fn focus_next_column(&mut self, column_count: usize) {
        if column_count > 0 {
            self.focused_column = (self.focused_column + 1).min(column_count - 1);
        }
    }

    pub fn focus_prev_column(&mut self) {
        self.focused_column = self.focused_column.saturating_sub(1);
    }

    /// Follow a column that was moved by `delta` positions
    pub fn follow_moved_column(&mut self, delta: isize, column_count: usize) {
        let target = self.focused_column as isize + delta;
        let max = column_count.saturating_sub(1) as isize;
        self.focused_column = target.clamp(0, max) as usize;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Component Implementation
// ═══════════════════════════════════════════════════════════════════════════════

impl Component for BrowserComponent {
    fn handle_key_event(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        let action = match key.code {
            // Rows
            KeyCode::Char('j') | KeyCode::Down => Some(Action::NextRow),
            KeyCode::Char('k') | KeyCode::Up => Some(Action::PrevRow),
            KeyCode::Char('g') => Some(Action::FirstRow),
            KeyCode::Char('G') => Some(Action::LastRow),

            // Paging
            KeyCode::Char('n') | KeyCode::PageDown => Some(Action::NextPage),
            KeyCode::Char('p') | KeyCode::PageUp => Some(Action::PrevPage),
            KeyCode::Home => Some(Action::FirstPage),
            KeyCode::End => Some(Action::LastPage),
            KeyCode::Char('z') => Some(Action::CyclePageSize),

            // Columns
            KeyCode::Char('h') | KeyCode::Left => Some(Action::FocusPrevColumn),
            KeyCode::Char('l') | KeyCode::Right => Some(Action::FocusNextColumn),
            KeyCode::Char('s') => Some(Action::ToggleSort),
            KeyCode::Char('+') | KeyCode::Char('=') => Some(Action::ResizeColumn(2)),
            KeyCode::Char('-') => Some(Action::ResizeColumn(-2)),
            KeyCode::Char('<') => Some(Action::MoveColumn(-1)),
            KeyCode::Char('>') => Some(Action::MoveColumn(1)),
            KeyCode::Char('0') => Some(Action::ResetLayout),

            // Rows: expansion and selection
            KeyCode::Enter | KeyCode::Char('o') => Some(Action::ToggleExpand),
            KeyCode::Char('E') => Some(Action::ExpandAll),
            KeyCode::Char('C') => Some(Action::CollapseAll),
            KeyCode::Char(' ') => Some(Action::ToggleRowSelection),
            KeyCode::Char('a') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Action::TogglePageSelection)
            }
            KeyCode::Esc => Some(Action::ClearSelection),

            // Query
            KeyCode::Char('/') => Some(Action::EnterSearchMode),
            KeyCode::Char('X') => Some(Action::ResetAll),
            KeyCode::Char('r') => Some(Action::Retry),

            // Modals
            KeyCode::Char('x') => Some(Action::OpenExportDialog),
            KeyCode::Char('c') => Some(Action::OpenColumnDialog),
            KeyCode::Char('L') => Some(Action::OpenLocationDialog),
            KeyCode::Char('f') => Some(Action::OpenFilterDialog),
            KeyCode::Char('?') => Some(Action::OpenHelp),
            KeyCode::Char('q') => Some(Action::OpenQuitDialog),

            _ => None,
        };
        Ok(action)
    }

    fn draw(&mut self, _frame: &mut Frame, _area: Rect) -> Result<()> {
        // Drawing needs the controller; see draw_browser
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Rendering Functions
// ═══════════════════════════════════════════════════════════════════════════════

/// Messages shown in the status line
pub struct BrowserRenderContext<'a> {
    pub rows: &'a [RowNode],
    pub error: Option<&'a str>,
    pub status_message: Option<&'a str>,
}

/// Draw the table screen
pub fn draw_browser<B: LayoutBackend>(
    frame: &mut Frame,
    area: Rect,
    browser: &mut BrowserComponent,
    controller: &TableController<B>,
    ctx: &BrowserRenderContext,
) -> Result<()> {
    let layout = calculate_browser_layout(area);

    render_header(frame, layout.header, browser, controller);
    render_table(frame, layout.table, browser, controller, ctx.rows);
    render_status_bar(frame, layout.status, controller, ctx);
    render_help_bar(frame, layout.help, browser, controller.selected_count());

    Ok(())
}

fn render_header<B: LayoutBackend>(
    frame: &mut Frame,
    area: Rect,
    browser: &BrowserComponent,
    controller: &TableController<B>,
) {
    let query = controller.query();
    let mut spans = vec![Span::styled(" Search: ", Style::default().fg(Color::DarkGray))];

    if browser.search_mode {
        spans.push(Span::styled(
            format!("{}▏", browser.search_input),
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
        ));
    } else if query.search.is_empty() {
        spans.push(Span::styled("(none)", Style::default().fg(Color::DarkGray)));
    } else {
        spans.push(Span::styled(
            query.search.clone(),
            Style::default().fg(Color::White),
        ));
    }

    for (label, value) in query_summary(query) {
        spans.push(Span::styled(
            format!("  {}: ", label),
            Style::default().fg(Color::DarkGray),
        ));
        spans.push(Span::styled(value, Style::default().fg(Color::Yellow)));
    }

    let paragraph = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(if browser.search_mode {
                Color::Cyan
            } else {
                Color::DarkGray
            }))
            .title(format!(" {} ", controller.table_id()))
            .title_style(
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
    );
    frame.render_widget(paragraph, area);
}

/// Label/value pairs describing the non-search parts of the query
pub fn query_summary(query: &QueryState) -> Vec<(&'static str, String)> {
    let mut summary = vec![
        ("Sort", format!("{} {}", query.sort_by, query.sort_order.arrow())),
        ("Page size", query.page_size.to_string()),
    ];
    if !query.date_range.is_empty() {
        summary.push((
            "Dates",
            format!("{}..{}", query.date_range.from_date, query.date_range.to_date),
        ));
    }
    if !query.column_filters.is_empty() {
        summary.push(("Filters", query.column_filters.len().to_string()));
    }
    summary
}

fn render_table<B: LayoutBackend>(
    frame: &mut Frame,
    area: Rect,
    browser: &mut BrowserComponent,
    controller: &TableController<B>,
    rows: &[RowNode],
) {
    let state = controller.fetch_state();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray));

    if state.is_error {
        let message = state
            .error
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown error".to_string());
        let content = vec![
            Line::from(""),
            Line::from(Span::styled(
                format!("  Failed to load rows: {}", message),
                Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
            )),
            Line::from(""),
            Line::from(vec![
                Span::raw("  Press "),
                Span::styled(
                    " r ",
                    Style::default()
                        .fg(Color::Green)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::raw("to retry"),
            ]),
        ];
        frame.render_widget(
            Paragraph::new(content).block(block).wrap(Wrap { trim: false }),
            area,
        );
        return;
    }

    if rows.is_empty() {
        let text = if state.is_loading {
            "  Loading…"
        } else {
            "  No rows match the current query"
        };
        frame.render_widget(
            Paragraph::new(vec![
                Line::from(""),
                Line::from(Span::styled(text, Style::default().fg(Color::DarkGray))),
            ])
            .block(block),
            area,
        );
        return;
    }

    let columns = controller.visible_columns();
    let query = controller.query();
    let selection = controller.selection();

    let page_len = controller.page_entities().len();
    let page_selected = controller.page_local_selection().len();
    let page_marker = if page_selected == 0 {
        "[ ]"
    } else if page_selected == page_len {
        "[x]"
    } else {
        "[-]"
    };

    let mut header_cells = vec![Cell::from(page_marker)];
    for (i, column) in columns.iter().enumerate() {
        let mut style = Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD);
        if i == browser.focused_column {
            style = style.bg(Color::DarkGray);
        }
        let label = header_label(column, &query.sort_by, query.sort_order);
        let width = controller.column_width(column) as usize;
        header_cells.push(Cell::from(fit_to_width(&label, width)).style(style));
    }

    let body: Vec<Row> = rows
        .iter()
        .map(|row| {
            let selected = selection.is_selected(&row.id);
            let marker = format!("{} {}", selection_marker(selected), expand_marker(row));
            let mut cells = vec![Cell::from(marker)];
            for (i, column) in columns.iter().enumerate() {
                let width = controller.column_width(column) as usize;
                let mut text = row.data.text(&column.id);
                if i == 0 && row.depth > 0 {
                    text = format!("{}└ {}", "  ".repeat(row.depth - 1), text);
                }
                cells.push(Cell::from(fit_to_width(&text, width)));
            }
            let style = if selected {
                Style::default().fg(Color::Green)
            } else if row.depth > 0 {
                Style::default().fg(Color::Gray)
            } else {
                Style::default()
            };
            Row::new(cells).style(style)
        })
        .collect();

    let mut widths = vec![Constraint::Length(MARKER_WIDTH)];
    widths.extend(
        columns
            .iter()
            .map(|c| Constraint::Length(controller.column_width(c))),
    );

    let table = Table::new(body, widths)
        .header(Row::new(header_cells).bottom_margin(0))
        .block(block)
        .highlight_style(
            Style::default()
                .bg(Color::Blue)
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        )
        .highlight_symbol("▶ ");

    browser.table_state.select(Some(browser.cursor));
    frame.render_stateful_widget(table, area, &mut browser.table_state);
}

fn render_status_bar<B: LayoutBackend>(
    frame: &mut Frame,
    area: Rect,
    controller: &TableController<B>,
    ctx: &BrowserRenderContext,
) {
    let mut spans = vec![];
    let query = controller.query();

    let (page, total_pages, total_items) = match controller.pagination() {
        Some(p) => (p.page, p.total_pages.max(1), p.total_items),
        None => (query.page, 1, 0),
    };
    spans.push(Span::styled(
        format!(" Page {} of {} ", page, total_pages),
        Style::default()
            .fg(Color::Black)
            .bg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    ));
    spans.push(Span::raw(format!(" {} rows ", total_items)));

    let selected = controller.selected_count();
    if selected > 0 {
        spans.push(Span::styled(
            format!(" {} selected ", selected),
            Style::default()
                .fg(Color::Black)
                .bg(Color::Magenta)
                .add_modifier(Modifier::BOLD),
        ));
    }

    if controller.fetch_state().is_loading {
        spans.push(Span::styled(" loading ", Style::default().fg(Color::Yellow)));
    }

    let location = controller.shareable_location();
    spans.push(Span::styled(
        if location.is_empty() {
            " (default view)".to_string()
        } else {
            format!(" {}", location)
        },
        Style::default().fg(Color::DarkGray),
    ));

    if let Some(error) = ctx.error {
        spans.clear();
        spans.push(Span::styled(
            format!(" Error: {} ", error),
            Style::default().fg(Color::Red),
        ));
    } else if let Some(status) = ctx.status_message {
        spans.push(Span::styled(
            format!("  {} ", status),
            Style::default().fg(Color::Yellow),
        ));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn render_help_bar(frame: &mut Frame, area: Rect, browser: &BrowserComponent, selected: usize) {
    let key = |label: &str, color: Color| {
        Span::styled(
            format!(" {} ", label),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        )
    };

    let help_spans = if browser.search_mode {
        vec![
            key("Esc/Enter", Color::Yellow),
            Span::raw("Done  "),
            key("Backspace", Color::Red),
            Span::raw("Delete  "),
            Span::styled(
                "Results update as you type",
                Style::default().fg(Color::DarkGray),
            ),
        ]
    } else if selected > 0 {
        vec![
            key("Space", Color::Green),
            Span::raw("Toggle  "),
            key("Esc", Color::Yellow),
            Span::raw("Clear  "),
            key("x", Color::Green),
            Span::raw("Export  "),
            Span::styled(
                format!("{} selected", selected),
                Style::default().fg(Color::Cyan),
            ),
        ]
    } else {
        vec![
            key("q", Color::Yellow),
            Span::raw("Quit "),
            key("/", Color::Green),
            Span::raw("Search "),
            key("n/p", Color::Green),
            Span::raw("Page "),
            key("s", Color::Green),
            Span::raw("Sort "),
            key("Enter", Color::Green),
            Span::raw("Expand "),
            key("Space", Color::Green),
            Span::raw("Select "),
            key("c", Color::Magenta),
            Span::raw("Columns "),
            key("x", Color::Magenta),
            Span::raw("Export "),
            key("?", Color::Cyan),
            Span::raw("Help"),
        ]
    };

    let paragraph = Paragraph::new(Line::from(help_spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    frame.render_widget(paragraph, area);
}

// ═══════════════════════════════════════════════════════════════════════════════
// Cell Helpers
// ═══════════════════════════════════════════════════════════════════════════════

pub fn selection_marker(selected: bool) -> &'static str {
    if selected {
        "[x]"
    } else {
        "[ ]"
    }
}

pub fn expand_marker(row: &RowNode) -> &'static str {
    match (row.can_expand, row.is_expanded) {
        (true, true) => "▾",
        (true, false) => "▸",
        (false, _) => " ",
    }
}

/// Column header with the sort arrow when the column drives the sort
pub fn header_label(column: &ColumnDef, sort_by: &str, sort_order: SortOrder) -> String {
    if column.id == sort_by {
        format!("{} {}", column.header, sort_order.arrow())
    } else {
        column.header.clone()
    }
}

/// Truncate to `width` display columns, marking the cut with an ellipsis
pub fn fit_to_width(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    if width == 0 {
        return String::new();
    }

    let mut out = String::new();
    let mut used = 0;
    for c in text.chars() {
        let w = c.width().unwrap_or(0);
        if used + w > width - 1 {
            break;
        }
        out.push(c);
        used += w;
    }
    out.push('…');
    out
}
