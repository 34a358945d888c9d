//! Root application component
//!
//! The App implements the Component trait as the root component. It routes
//! key events to the browser or the top modal and applies the resulting
//! actions to the table controller, which owns all table state.

use crate::action::Action;
use crate::component::Component;
use crate::components::{
    draw_browser, BrowserComponent, BrowserRenderContext, ColumnDialog, ColumnEntry, ExportDialog,
    FilterDialog, HelpDialog, LocationDialog, QuitDialog,
};
use crate::config::Config;
use crate::controller::TableController;
use crate::model::entity::value_text;
use crate::model::modal::{Modal, ModalStack};
use crate::model::query::DateRange;
use crate::model::{ColumnDef, RowNode};
use crate::services::{ExportOutcome, LayoutBackend, Location};
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{layout::Rect, Frame};
use serde_json::Value;
use std::time::Instant;

// ═══════════════════════════════════════════════════════════════════════════════
// App Struct
// ═══════════════════════════════════════════════════════════════════════════════

pub struct App<B: LayoutBackend> {
    pub controller: TableController<B>,
    pub config: Config,

    /// Modal overlay stack
    pub modals: ModalStack,

    /// Flag to indicate the app should quit
    pub should_quit: bool,

    /// Error message to display
    pub error: Option<String>,

    /// Status message to display
    pub status_message: Option<String>,

    // ─────────────────────────────────────────────────────────────────────────
    // Child Components
    // ─────────────────────────────────────────────────────────────────────────
    pub browser: BrowserComponent,
    pub quit_dialog: QuitDialog,
    pub help_dialog: HelpDialog,
    pub export_dialog: ExportDialog,
    pub column_dialog: ColumnDialog,
    pub location_dialog: LocationDialog,
    pub filter_dialog: FilterDialog,
}

impl<B: LayoutBackend> App<B> {
    pub fn new(controller: TableController<B>, config: Config) -> Self {
        Self {
            controller,
            config,
            modals: ModalStack::new(),
            should_quit: false,
            error: None,
            status_message: None,
            browser: BrowserComponent::new(),
            quit_dialog: QuitDialog,
            help_dialog: HelpDialog::default(),
            export_dialog: ExportDialog::default(),
            column_dialog: ColumnDialog::default(),
            location_dialog: LocationDialog::default(),
            filter_dialog: FilterDialog::default(),
        }
    }

    fn current_row(&self) -> Option<RowNode> {
        self.controller
            .render_rows()
            .into_iter()
            .nth(self.browser.cursor)
    }

    fn focused_column(&self) -> Option<ColumnDef> {
        self.controller
            .visible_columns()
            .get(self.browser.focused_column)
            .map(|c| (*c).clone())
    }

    fn column_entries(&self) -> Vec<ColumnEntry> {
        let query = self.controller.query();
        self.controller
            .column_layout()
            .ordered(self.controller.columns())
            .into_iter()
            .map(|c| ColumnEntry {
                id: c.id.clone(),
                header: c.header.clone(),
                visible: !c.hideable || query.is_column_visible(&c.id),
                hideable: c.hideable,
            })
            .collect()
    }

    fn clamp_cursors(&mut self) {
        let rows = self.controller.render_rows().len();
        let columns = self.controller.visible_columns().len();
        self.browser.clamp(rows, columns);
    }

    /// The configured page size after the current one
    fn next_page_size(&self) -> u32 {
        let options = &self.config.page_size_options;
        let current = self.controller.query().page_size;
        match options.iter().position(|size| *size == current) {
            Some(i) => options[(i + 1) % options.len()],
            None => options.first().copied().unwrap_or(current),
        }
    }

    fn apply_location(&mut self, query: &str) {
        let location = Location::parse(query);
        tracing::info!(location = %location, "opening shared location");
        if self.controller.location_sender().send(location).is_err() {
            self.error = Some("Could not open location".to_string());
            return;
        }
        self.browser.cursor = 0;
        self.browser.search_input.clear();
        self.status_message = Some("Opened shared location".to_string());
    }

    fn run_export(&mut self) {
        let scope = self.export_dialog.scope();
        let format = self.export_dialog.format();
        let flatten = self.export_dialog.flatten();

        match self.controller.export(scope, format, flatten) {
            Ok(ExportOutcome::Written {
                paths,
                rows,
                warning,
                ..
            }) => {
                let target = match paths.as_slice() {
                    [single] => single.display().to_string(),
                    many => format!("{} files", many.len()),
                };
                let mut message = format!("Exported {} rows to {}", rows, target);
                if let Some(warning) = warning {
                    message.push_str(&format!(" ({})", warning));
                }
                self.status_message = Some(message);
            }
            Ok(ExportOutcome::NoData) => {
                self.status_message = Some("Nothing to export".to_string());
            }
            Err(err) => {
                tracing::error!(error = %err, "export failed");
                self.error = Some(format!("Export failed: {}", err));
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Component Implementation
// ═══════════════════════════════════════════════════════════════════════════════

impl<B: LayoutBackend> Component for App<B> {
    fn handle_key_event(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        if let Some(modal) = self.modals.top().cloned() {
            self.handle_modal_key_event(&modal, key)
        } else if self.browser.search_mode {
            self.handle_search_key_event(key)
        } else {
            self.browser.handle_key_event(key)
        }
    }

    fn update(&mut self, action: Action) -> Result<Option<Action>> {
        if !matches!(action, Action::Tick | Action::Resize(..)) {
            tracing::debug!(%action, "action");
            self.error = None;
        }

        match action {
            // ─────────────────────────────────────────────────────────────────
            // App Lifecycle
            // ─────────────────────────────────────────────────────────────────
            Action::Tick => {
                self.controller.tick(Instant::now());
                if let Some(warning) = self.controller.take_warning() {
                    self.status_message = Some(warning);
                }
                self.clamp_cursors();
            }
            Action::Resize(_, _) => {}
            Action::ForceQuit => {
                self.controller.flush();
                if let Some(warning) = self.controller.take_warning() {
                    tracing::warn!(%warning, "shutting down with unsaved state");
                }
                self.should_quit = true;
            }

            // ─────────────────────────────────────────────────────────────────
            // Row cursor
            // ─────────────────────────────────────────────────────────────────
            Action::NextRow => {
                let rows = self.controller.render_rows().len();
                self.browser.next_row(rows);
            }
            Action::PrevRow => self.browser.prev_row(),
            Action::FirstRow => self.browser.cursor = 0,
            Action::LastRow => {
                let rows = self.controller.render_rows().len();
                self.browser.last_row(rows);
            }

            // ─────────────────────────────────────────────────────────────────
            // Paging
            // ─────────────────────────────────────────────────────────────────
            Action::NextPage => {
                self.controller.next_page();
                self.browser.cursor = 0;
            }
            Action::PrevPage => {
                self.controller.previous_page();
                self.browser.cursor = 0;
            }
            Action::FirstPage => {
                self.controller.first_page();
                self.browser.cursor = 0;
            }
            Action::LastPage => {
                self.controller.last_page();
                self.browser.cursor = 0;
            }
            Action::CyclePageSize => {
                let size = self.next_page_size();
                self.controller.set_page_size(size);
                self.browser.cursor = 0;
                self.status_message = Some(format!("{} rows per page", size));
            }

            // ─────────────────────────────────────────────────────────────────
            // Search
            // ─────────────────────────────────────────────────────────────────
            Action::EnterSearchMode => {
                self.browser.search_mode = true;
                self.browser.search_input = self.controller.query().search.clone();
            }
            Action::ExitSearchMode => {
                self.browser.search_mode = false;
            }
            Action::SearchInput(c) => {
                self.browser.search_input.push(c);
                self.controller
                    .set_search(&self.browser.search_input, Instant::now());
                self.browser.cursor = 0;
            }
            Action::SearchBackspace => {
                self.browser.search_input.pop();
                self.controller
                    .set_search(&self.browser.search_input, Instant::now());
                self.browser.cursor = 0;
            }

            // ─────────────────────────────────────────────────────────────────
            // Columns
            // ─────────────────────────────────────────────────────────────────
            Action::FocusNextColumn => {
                let columns = self.controller.visible_columns().len();
                self.browser.focus_next_column(columns);
            }
            Action::FocusPrevColumn => self.browser.focus_prev_column(),
            Action::ToggleSort => {
                if let Some(column) = self.focused_column() {
                    if column.sortable {
                        self.controller.sort_by(&column.id);
                        self.browser.cursor = 0;
                    } else {
                        self.status_message =
                            Some(format!("{} cannot be sorted", column.header));
                    }
                }
            }
            Action::ResizeColumn(delta) => {
                if let Some(column) = self.focused_column() {
                    self.controller
                        .resize_column(&column.id, delta, Instant::now());
                }
            }
            Action::MoveColumn(delta) => {
                if let Some(column) = self.focused_column() {
                    self.controller.move_column(&column.id, delta, Instant::now());
                    let columns = self.controller.visible_columns().len();
                    self.browser.follow_moved_column(delta, columns);
                }
            }
            Action::ResetLayout => {
                self.controller.reset_layout();
                self.browser.focused_column = 0;
                self.status_message = Some("Column layout reset".to_string());
            }

            // ─────────────────────────────────────────────────────────────────
            // Rows
            // ─────────────────────────────────────────────────────────────────
            Action::ToggleExpand => {
                if let Some(row) = self.current_row() {
                    if row.can_expand {
                        self.controller.toggle_expanded(&row.id);
                    }
                }
            }
            Action::ExpandAll => self.controller.set_expand_all(true),
            Action::CollapseAll => {
                self.controller.set_expand_all(false);
                self.clamp_cursors();
            }
            Action::ToggleRowSelection => {
                if let Some(row) = self.current_row() {
                    self.controller.toggle_row_selection(&row);
                }
            }
            Action::TogglePageSelection => self.controller.toggle_page_selection(),
            Action::ClearSelection => self.controller.clear_selection(),

            // ─────────────────────────────────────────────────────────────────
            // Query
            // ─────────────────────────────────────────────────────────────────
            Action::ResetAll => {
                self.controller.reset_all();
                self.browser.cursor = 0;
                self.browser.search_input.clear();
                self.status_message = Some("Reset to defaults".to_string());
            }
            Action::Retry => self.controller.retry(),
            Action::ApplyLocation(query) => {
                self.modals.pop();
                self.apply_location(&query);
            }
            Action::ApplyFilters {
                from_date,
                to_date,
                column_id,
                value,
            } => {
                self.modals.pop();
                self.controller
                    .set_date_range(DateRange::new(from_date, to_date));
                if !column_id.is_empty() {
                    self.controller
                        .set_column_filter(&column_id, Value::String(value));
                }
                self.browser.cursor = 0;
            }

            // ─────────────────────────────────────────────────────────────────
            // Modals
            // ─────────────────────────────────────────────────────────────────
            Action::OpenQuitDialog => self.modals.push(Modal::QuitConfirm),
            Action::OpenHelp => {
                self.help_dialog.scroll_offset = 0;
                self.modals.push(Modal::Help);
            }
            Action::OpenExportDialog => {
                self.export_dialog.open(
                    self.config.export_format,
                    self.config.flatten_policies(),
                    self.controller.supports_full_retrieval(),
                    self.controller.selected_count(),
                );
                self.modals.push(Modal::Export);
            }
            Action::OpenColumnDialog => {
                let entries = self.column_entries();
                self.column_dialog.set_columns(entries);
                self.modals.push(Modal::Columns);
            }
            Action::OpenLocationDialog => {
                self.location_dialog.open();
                self.modals.push(Modal::Location);
            }
            Action::OpenFilterDialog => {
                let query = self.controller.query();
                let (column_id, header) = self
                    .focused_column()
                    .map(|c| (c.id, c.header))
                    .unwrap_or_default();
                let value = query
                    .column_filters
                    .iter()
                    .find(|f| f.id == column_id)
                    .map(|f| value_text(&f.value))
                    .unwrap_or_default();
                self.filter_dialog.open(
                    &query.date_range.from_date,
                    &query.date_range.to_date,
                    &column_id,
                    &header,
                    &value,
                );
                self.modals.push(Modal::Filters);
            }
            Action::CloseModal => {
                self.modals.pop();
            }
            Action::ToggleColumnVisibility(column_id) => {
                self.controller.toggle_column_visibility(&column_id);
                let entries = self.column_entries();
                self.column_dialog.set_columns(entries);
                self.clamp_cursors();
            }
            Action::RunExport => {
                self.modals.pop();
                self.run_export();
            }
        }
        Ok(None)
    }

    fn draw(&mut self, frame: &mut Frame, area: Rect) -> Result<()> {
        let rows = self.controller.render_rows();
        let ctx = BrowserRenderContext {
            rows: &rows,
            error: self.error.as_deref(),
            status_message: self.status_message.as_deref(),
        };
        draw_browser(frame, area, &mut self.browser, &self.controller, &ctx)?;

        if let Some(modal) = self.modals.top().cloned() {
            self.draw_modal(frame, area, &modal)?;
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Helper Methods
// ═══════════════════════════════════════════════════════════════════════════════

impl<B: LayoutBackend> App<B> {
    fn handle_modal_key_event(&mut self, modal: &Modal, key: KeyEvent) -> Result<Option<Action>> {
        match modal {
            Modal::QuitConfirm => self.quit_dialog.handle_key_event(key),
            Modal::Help => self.help_dialog.handle_key_event(key),
            Modal::Export => self.export_dialog.handle_key_event(key),
            Modal::Columns => self.column_dialog.handle_key_event(key),
            Modal::Location => self.location_dialog.handle_key_event(key),
            Modal::Filters => self.filter_dialog.handle_key_event(key),
        }
    }

    fn handle_search_key_event(&mut self, key: KeyEvent) -> Result<Option<Action>> {
        let action = match key.code {
            KeyCode::Esc | KeyCode::Enter => Some(Action::ExitSearchMode),
            KeyCode::Backspace => Some(Action::SearchBackspace),
            KeyCode::Char(c) => Some(Action::SearchInput(c)),
            _ => None,
        };
        Ok(action)
    }

    fn draw_modal(&mut self, frame: &mut Frame, area: Rect, modal: &Modal) -> Result<()> {
        match modal {
            Modal::QuitConfirm => self.quit_dialog.draw(frame, area)?,
            Modal::Help => self.help_dialog.draw(frame, area)?,
            Modal::Export => self.export_dialog.draw(frame, area)?,
            Modal::Columns => self.column_dialog.draw(frame, area)?,
            Modal::Location => self.location_dialog.draw(frame, area)?,
            Modal::Filters => self.filter_dialog.draw(frame, area)?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::TableOptions;
    use crate::services::data_source::MemorySource;
    use crate::services::fetch::FetchStrategy;
    use crate::services::layout_store::MemoryBackend;
    use crossterm::event::KeyModifiers;
    use std::sync::Arc;
    use std::time::Duration;

    fn columns() -> Vec<ColumnDef> {
        vec![
            ColumnDef::new("id", "Order", 10).pinned(),
            ColumnDef::new("name", "Customer", 18),
            ColumnDef::new("status", "Status", 10),
            ColumnDef::new("total", "Total", 10),
            ColumnDef::new("created_at", "Created", 12),
        ]
    }

    fn app_with(options: TableOptions) -> App<MemoryBackend> {
        let controller = TableController::mount(
            options,
            Arc::new(MemorySource::sample()),
            MemoryBackend::default(),
            Location::new(),
        );
        App::new(controller, Config::default())
    }

    fn app() -> App<MemoryBackend> {
        let mut options = TableOptions::new("orders", columns());
        options.strategy = FetchStrategy::Call;
        options.quiet_period = Duration::ZERO;
        app_with(options)
    }

    fn press(app: &mut App<MemoryBackend>, code: KeyCode) {
        let key = KeyEvent::new(code, KeyModifiers::NONE);
        let mut current = app.handle_key_event(key).unwrap();
        while let Some(action) = current {
            current = app.update(action).unwrap();
        }
    }

    #[test]
    fn test_paging_keys_update_the_location() {
        let mut app = app();
        press(&mut app, KeyCode::Char('n'));
        press(&mut app, KeyCode::Char('n'));
        app.update(Action::Tick).unwrap();

        assert_eq!(app.controller.query().page, 3);
        assert_eq!(app.controller.shareable_location(), "?page=3");

        press(&mut app, KeyCode::Home);
        app.update(Action::Tick).unwrap();
        assert_eq!(app.controller.shareable_location(), "");
    }

    #[test]
    fn test_search_mode_types_into_query() {
        let mut app = app();
        press(&mut app, KeyCode::Char('/'));
        assert!(app.browser.search_mode);

        for c in "ada".chars() {
            press(&mut app, KeyCode::Char(c));
        }
        // Keys go to the search box, not the browser
        assert_eq!(app.controller.query().page, 1);
        press(&mut app, KeyCode::Enter);
        assert!(!app.browser.search_mode);

        app.update(Action::Tick).unwrap();
        assert_eq!(app.controller.query().search, "ada");
        assert!(app.controller.shareable_location().contains("search=ada"));
    }

    #[test]
    fn test_page_size_cycles_through_options() {
        let mut app = app();
        press(&mut app, KeyCode::Char('z'));
        assert_eq!(app.controller.query().page_size, 20);
        app.controller.set_page_size(100);
        press(&mut app, KeyCode::Char('z'));
        assert_eq!(app.controller.query().page_size, 10);
    }

    #[test]
    fn test_selection_and_clear() {
        let mut app = app();
        press(&mut app, KeyCode::Char(' '));
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Char(' '));
        assert_eq!(app.controller.selected_count(), 2);

        press(&mut app, KeyCode::Esc);
        assert_eq!(app.controller.selected_count(), 0);
    }

    #[test]
    fn test_column_dialog_hides_focused_column() {
        let mut app = app();
        press(&mut app, KeyCode::Char('c'));
        assert_eq!(app.modals.top(), Some(&Modal::Columns));

        // Second entry is "name"; the first is pinned
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Char(' '));
        press(&mut app, KeyCode::Esc);

        assert!(app.modals.is_empty());
        assert!(!app.controller.query().is_column_visible("name"));
        assert_eq!(app.controller.visible_columns().len(), 4);
    }

    #[test]
    fn test_pasted_location_is_applied_on_tick() {
        let mut app = app();
        app.update(Action::OpenLocationDialog).unwrap();
        app.update(Action::ApplyLocation("page=2&pageSize=20".to_string()))
            .unwrap();
        assert!(app.modals.is_empty());

        app.update(Action::Tick).unwrap();
        assert_eq!(app.controller.query().page, 2);
        assert_eq!(app.controller.query().page_size, 20);
    }

    #[test]
    fn test_filters_reset_page() {
        let mut app = app();
        press(&mut app, KeyCode::Char('n'));
        press(&mut app, KeyCode::Char('l'));
        press(&mut app, KeyCode::Char('l'));
        app.update(Action::OpenFilterDialog).unwrap();
        app.update(Action::ApplyFilters {
            from_date: String::new(),
            to_date: String::new(),
            column_id: "status".to_string(),
            value: "paid".to_string(),
        })
        .unwrap();

        assert_eq!(app.controller.query().page, 1);
        assert_eq!(app.controller.query().column_filters.len(), 1);
    }

    #[test]
    fn test_export_reports_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut options = TableOptions::new("orders", columns());
        options.strategy = FetchStrategy::Call;
        options.export_dir = dir.path().to_path_buf();
        let mut app = app_with(options);

        press(&mut app, KeyCode::Char('x'));
        assert_eq!(app.modals.top(), Some(&Modal::Export));
        press(&mut app, KeyCode::Enter);

        assert!(app.modals.is_empty());
        let status = app.status_message.clone().unwrap();
        assert!(status.starts_with("Exported 10 rows to"), "{}", status);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_force_quit_flushes() {
        let mut app = app();
        press(&mut app, KeyCode::Char('q'));
        assert_eq!(app.modals.top(), Some(&Modal::QuitConfirm));
        press(&mut app, KeyCode::Char('y'));
        assert!(app.should_quit);
    }
}
