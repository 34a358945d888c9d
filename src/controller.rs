//! Table controller
//!
//! Owns every store for one table identity and exposes the operations a
//! table view needs. The controller is UI-agnostic: a view calls the
//! operations in response to input and calls `tick` regularly, then renders
//! from `fetch_state`, `render_rows` and friends.
//!
//! State flows one way per tick: external location changes are adopted,
//! pending location writes are committed, and once the location has settled
//! the page for the current query is requested.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::error::{ExportError, StoreError};
use crate::model::column::{ColumnDef, ColumnLayout};
use crate::model::entity::{Entity, Pagination};
use crate::model::query::{DateRange, Expanded, QueryState, SortOrder, PARAM_PAGE, PARAM_SEARCH};
use crate::model::row::RowNode;
use crate::services::data_source::DataSource;
use crate::services::export::{
    resolve_scope, run_export, ExportFormat, ExportOutcome, ExportRequest, ExportScope,
    FlattenPolicy, RowTransform, ScopeInputs,
};
use crate::services::fetch::{FetchOrchestrator, FetchState, FetchStrategy};
use crate::services::hierarchy::{expandable_ids, materialize, RowIdentity};
use crate::services::layout_store::{ColumnLayoutStore, LayoutBackend};
use crate::services::location::Location;
use crate::services::selection::{SelectionManager, SelectionPolicy};
use crate::services::url_state::{ChannelSink, UrlStateStore};

/// Per-table configuration
#[derive(Debug, Clone)]
pub struct TableOptions {
    /// Identity used for the durable layout
    pub table_id: String,
    pub columns: Vec<ColumnDef>,
    pub quiet_period: Duration,
    pub strategy: FetchStrategy,
    pub selection: SelectionPolicy,
    pub export_dir: PathBuf,
}

impl TableOptions {
    pub fn new(table_id: &str, columns: Vec<ColumnDef>) -> Self {
        Self {
            table_id: table_id.to_string(),
            columns,
            quiet_period: Duration::from_millis(400),
            strategy: FetchStrategy::default(),
            selection: SelectionPolicy::default(),
            export_dir: PathBuf::from("."),
        }
    }
}

pub struct TableController<B: LayoutBackend> {
    options: TableOptions,
    url: UrlStateStore,
    /// Location changes reported by the host, our own echoes included
    location_rx: Receiver<Location>,
    location_tx: Sender<Location>,
    query: QueryState,
    fetch: FetchOrchestrator,
    selection: SelectionManager,
    identity: RowIdentity,
    layout: ColumnLayoutStore<B>,
    transform: Option<Box<RowTransform>>,
    warning: Option<String>,
}

impl<B: LayoutBackend> TableController<B> {
    /// Create the controller and request the first page
    pub fn mount(
        options: TableOptions,
        source: Arc<dyn DataSource>,
        backend: B,
        initial: Location,
    ) -> Self {
        let (location_tx, location_rx) = mpsc::channel();
        let url = UrlStateStore::new(
            initial,
            Box::new(ChannelSink::new(location_tx.clone())),
            options.quiet_period,
        );
        let query = QueryState::read_from(&url);
        let layout = ColumnLayoutStore::open(&options.table_id, backend, options.quiet_period);
        let fetch = FetchOrchestrator::new(source, options.strategy);
        let selection = SelectionManager::new(options.selection);

        tracing::info!(
            table_id = %options.table_id,
            location = %url.location(),
            "mounted table"
        );

        let mut controller = Self {
            options,
            url,
            location_rx,
            location_tx,
            query,
            fetch,
            selection,
            identity: RowIdentity::new(),
            layout,
            transform: None,
            warning: None,
        };
        controller.ensure_fetched();
        controller
    }

    pub fn with_identity(mut self, identity: RowIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_export_transform(mut self, transform: Box<RowTransform>) -> Self {
        self.transform = Some(transform);
        self
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Accessors
    // ───────────────────────────────────────────────────────────────────────────

    pub fn table_id(&self) -> &str {
        &self.options.table_id
    }

    pub fn query(&self) -> &QueryState {
        &self.query
    }

    pub fn fetch_state(&self) -> &FetchState {
        self.fetch.state()
    }

    pub fn pagination(&self) -> Option<Pagination> {
        self.fetch.state().pagination
    }

    pub fn page_entities(&self) -> &[Entity] {
        &self.fetch.state().data
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.options.columns
    }

    pub fn column_layout(&self) -> &ColumnLayout {
        self.layout.layout()
    }

    pub fn selection(&self) -> &SelectionManager {
        &self.selection
    }

    pub fn selected_count(&self) -> usize {
        self.selection.len()
    }

    /// The shareable location as last committed
    pub fn shareable_location(&self) -> String {
        self.url.committed().to_query_string()
    }

    /// Channel on which the host reports location changes (e.g. a pasted link)
    pub fn location_sender(&self) -> Sender<Location> {
        self.location_tx.clone()
    }

    pub fn supports_full_retrieval(&self) -> bool {
        self.fetch.source().supports_full_retrieval()
    }

    /// Warning raised since the last call, if any
    pub fn take_warning(&mut self) -> Option<String> {
        self.warning.take()
    }

    /// Flat render list for the current page and expansion
    pub fn render_rows(&self) -> Vec<RowNode> {
        materialize(&self.fetch.state().data, &self.query.expanded, &self.identity)
    }

    /// Page-relative selection flags for the grid
    pub fn page_local_selection(&self) -> BTreeMap<usize, bool> {
        self.selection.page_local_selection(&self.fetch.state().data)
    }

    /// Columns to draw, in layout order, hidden ones skipped
    pub fn visible_columns(&self) -> Vec<&ColumnDef> {
        self.layout
            .layout()
            .ordered(&self.options.columns)
            .into_iter()
            .filter(|c| !c.hideable || self.query.is_column_visible(&c.id))
            .collect()
    }

    pub fn column_width(&self, column: &ColumnDef) -> u16 {
        self.layout.layout().width_of(column)
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Tick
    // ───────────────────────────────────────────────────────────────────────────

    /// Advance time-driven work; returns whether anything visible changed
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut changed = self.fetch.poll();
        changed |= self.drain_location_changes();

        if self.url.tick(now) {
            // Our own write comes straight back through the sink
            self.drain_location_changes();
            changed = true;
        }

        if !self.url.has_pending() {
            changed |= self.ensure_fetched();
        }
        changed |= self.clamp_page_to_total();

        match self.layout.tick(now) {
            Ok(_) => {}
            Err(err) => self.store_failed(err),
        }
        changed
    }

    /// Commit every pending write (used before shutdown)
    pub fn flush(&mut self) {
        if self.url.flush() {
            self.drain_location_changes();
        }
        if let Err(err) = self.layout.flush() {
            self.store_failed(err);
        }
    }

    fn store_failed(&mut self, err: StoreError) {
        tracing::warn!(error = %err, "failed to persist column layout");
        self.warning = Some(format!("Column layout not saved: {}", err));
    }

    fn drain_location_changes(&mut self) -> bool {
        let mut adopted = false;
        while let Ok(location) = self.location_rx.try_recv() {
            if self.url.observe_external(location) {
                self.query = QueryState::read_from(&self.url);
                adopted = true;
            }
        }
        adopted
    }

    fn ensure_fetched(&mut self) -> bool {
        let request = self.query.page_request();
        self.fetch.request(&request).is_some()
    }

    /// A page past the end (e.g. after a filter shrank the result) moves back
    fn clamp_page_to_total(&mut self) -> bool {
        let Some(pagination) = self.fetch.state().pagination else {
            return false;
        };
        if self.fetch.state().is_loading || pagination.page != self.query.page {
            return false;
        }
        let last = pagination.total_pages.max(1);
        if self.query.page <= last {
            return false;
        }
        tracing::debug!(page = self.query.page, last, "page out of range; clamping");
        self.query.page = last;
        self.commit_query();
        true
    }

    /// Write the whole query into the location; committed on the next tick
    fn commit_query(&mut self) {
        self.query.write_to(&mut self.url);
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Query operations
    // ───────────────────────────────────────────────────────────────────────────

    pub fn go_to_page(&mut self, page: u32) {
        let last = self.pagination().map_or(u32::MAX, |p| p.total_pages.max(1));
        let page = page.clamp(1, last);
        if page != self.query.page {
            self.query.page = page;
            self.commit_query();
        }
    }

    pub fn next_page(&mut self) {
        self.go_to_page(self.query.page.saturating_add(1));
    }

    pub fn previous_page(&mut self) {
        self.go_to_page(self.query.page.saturating_sub(1));
    }

    pub fn first_page(&mut self) {
        self.go_to_page(1);
    }

    pub fn last_page(&mut self) {
        if let Some(p) = self.pagination() {
            self.go_to_page(p.total_pages);
        }
    }

    pub fn set_page_size(&mut self, page_size: u32) {
        let page_size = page_size.max(1);
        if page_size != self.query.page_size {
            self.query.page_size = page_size;
            self.query.page = 1;
            self.commit_query();
        }
    }

    /// Update the search text; the location write waits for typing to pause
    pub fn set_search(&mut self, search: &str, now: Instant) {
        if search == self.query.search {
            return;
        }
        let defaults = QueryState::default();
        self.query.search = search.to_string();
        self.query.page = 1;
        self.url
            .set_debounced(PARAM_SEARCH, &self.query.search, &defaults.search, now);
        self.url
            .set_debounced(PARAM_PAGE, &self.query.page, &defaults.page, now);
    }

    /// Sort by a column; the current sort column flips direction
    pub fn sort_by(&mut self, column_id: &str) {
        let sortable = self
            .options
            .columns
            .iter()
            .any(|c| c.id == column_id && c.sortable);
        if !sortable {
            return;
        }
        if self.query.sort_by == column_id {
            self.query.sort_order = self.query.sort_order.toggled();
        } else {
            self.query.sort_by = column_id.to_string();
            self.query.sort_order = SortOrder::Asc;
        }
        self.query.page = 1;
        self.commit_query();
    }

    pub fn set_date_range(&mut self, range: DateRange) {
        if range != self.query.date_range {
            self.query.date_range = range;
            self.query.page = 1;
            self.commit_query();
        }
    }

    pub fn set_column_filter(&mut self, column_id: &str, value: Value) {
        let before = self.query.column_filters.clone();
        self.query.set_column_filter(column_id, value);
        if self.query.column_filters != before {
            self.query.page = 1;
            self.commit_query();
        }
    }

    /// Show or hide a column; pinned columns are always visible
    pub fn toggle_column_visibility(&mut self, column_id: &str) {
        let hideable = self
            .options
            .columns
            .iter()
            .any(|c| c.id == column_id && c.hideable);
        if !hideable {
            return;
        }
        if self.query.is_column_visible(column_id) {
            self.query
                .column_visibility
                .insert(column_id.to_string(), false);
        } else {
            self.query.column_visibility.remove(column_id);
        }
        self.commit_query();
    }

    pub fn toggle_expanded(&mut self, row_id: &str) {
        let expandable = expandable_ids(&self.fetch.state().data, &self.identity);
        if !expandable.iter().any(|id| id == row_id) {
            return;
        }
        self.query.expanded.toggle(row_id, &expandable);
        self.commit_query();
    }

    pub fn set_expand_all(&mut self, expanded: bool) {
        self.query.expanded = if expanded {
            Expanded::All(true)
        } else {
            Expanded::default()
        };
        self.commit_query();
    }

    /// Back to defaults: query, location and selection
    pub fn reset_all(&mut self) {
        tracing::info!(table_id = %self.options.table_id, "resetting table state");
        self.query = QueryState::default();
        self.url.replace_all(Location::new());
        self.selection.clear();
    }

    /// Re-issue the current request, e.g. after an error
    pub fn retry(&mut self) {
        self.fetch.refetch();
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Selection
    // ───────────────────────────────────────────────────────────────────────────

    pub fn toggle_row_selection(&mut self, row: &RowNode) -> bool {
        let child_ids: Vec<String> = row
            .children()
            .iter()
            .enumerate()
            .map(|(position, child)| self.identity.child_id(&row.id, position, child))
            .collect();
        self.selection.toggle_row(row, &child_ids)
    }

    pub fn toggle_page_selection(&mut self) {
        self.selection.toggle_page(&self.fetch.state().data);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Column layout
    // ───────────────────────────────────────────────────────────────────────────

    /// Widen or narrow a column by `delta` characters
    pub fn resize_column(&mut self, column_id: &str, delta: i32, now: Instant) {
        let Some(column) = self.options.columns.iter().find(|c| c.id == column_id) else {
            return;
        };
        let current = self.layout.layout().width_of(column) as i32;
        let width = (current + delta).clamp(0, u16::MAX as i32) as u16;
        self.layout.resize_column(column_id, width, now);
    }

    /// Move a column left (`-1`) or right (`+1`) in the display order
    pub fn move_column(&mut self, column_id: &str, delta: isize, now: Instant) {
        let current: Vec<String> = self
            .layout
            .layout()
            .ordered_ids(&self.options.columns)
            .into_iter()
            .map(String::from)
            .collect();
        self.layout.move_column(&current, column_id, delta, now);
    }

    pub fn reset_layout(&mut self) {
        if let Err(err) = self.layout.reset() {
            self.store_failed(err);
        }
    }

    // ───────────────────────────────────────────────────────────────────────────
    // Export
    // ───────────────────────────────────────────────────────────────────────────

    /// Export the given scope of rows into `export_dir`
    pub fn export(
        &self,
        scope: ExportScope,
        format: ExportFormat,
        flatten: FlattenPolicy,
    ) -> Result<ExportOutcome, ExportError> {
        self.export_to(scope, format, flatten, &self.options.export_dir)
    }

    pub fn export_to(
        &self,
        scope: ExportScope,
        format: ExportFormat,
        flatten: FlattenPolicy,
        dir: &Path,
    ) -> Result<ExportOutcome, ExportError> {
        let visible = self.visible_columns();
        let columns: Vec<String> = visible.iter().map(|c| c.id.clone()).collect();
        let display_names: HashMap<String, String> = visible
            .iter()
            .map(|c| (c.id.clone(), c.header.clone()))
            .collect();
        let widths: BTreeMap<String, u16> = visible
            .iter()
            .filter_map(|c| {
                self.layout
                    .layout()
                    .sizing
                    .get(&c.id)
                    .map(|w| (c.id.clone(), *w))
            })
            .collect();

        let request = self.query.page_request();
        let inputs = ScopeInputs {
            page: &self.fetch.state().data,
            selection: &self.selection,
            identity: &self.identity,
            source: self.fetch.source().as_ref(),
            request: &request,
            columns: &columns,
        };
        let (entities, warning) = resolve_scope(scope, &inputs)?;

        tracing::info!(
            table_id = %self.options.table_id,
            scope = ?scope,
            rows = entities.len(),
            "exporting"
        );

        let export_request = ExportRequest {
            columns,
            display_names,
            flatten,
            transform: self.transform.as_deref(),
            format,
            widths,
            file_stem: self.options.table_id.clone(),
        };
        run_export(&entities, &export_request, dir, warning)
    }
}
