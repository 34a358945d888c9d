//! Query state - everything that parameterizes a page request
//!
//! The query state is what gets encoded into the shareable location. Every
//! field has a declared default, and a key absent from the location means
//! "use the default".

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::services::url_state::UrlStateStore;

// ═══════════════════════════════════════════════════════════════════════════════
// Parameter Keys & Defaults
// ═══════════════════════════════════════════════════════════════════════════════

pub const PARAM_PAGE: &str = "page";
pub const PARAM_PAGE_SIZE: &str = "pageSize";
pub const PARAM_SEARCH: &str = "search";
pub const PARAM_DATE_RANGE: &str = "dateRange";
pub const PARAM_SORT_BY: &str = "sortBy";
pub const PARAM_SORT_ORDER: &str = "sortOrder";
pub const PARAM_COLUMN_VISIBILITY: &str = "columnVisibility";
pub const PARAM_COLUMN_FILTERS: &str = "columnFilters";
pub const PARAM_EXPANDED: &str = "expanded";

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const DEFAULT_SORT_BY: &str = "created_at";

// ═══════════════════════════════════════════════════════════════════════════════
// Field Types
// ═══════════════════════════════════════════════════════════════════════════════

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }

    pub fn parse(raw: &str) -> Option<SortOrder> {
        match raw {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }

    pub fn toggled(&self) -> SortOrder {
        match self {
            SortOrder::Asc => SortOrder::Desc,
            SortOrder::Desc => SortOrder::Asc,
        }
    }

    pub fn arrow(&self) -> &'static str {
        match self {
            SortOrder::Asc => "▲",
            SortOrder::Desc => "▼",
        }
    }
}

/// Inclusive date window on the `created_at` field; empty bounds are open
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DateRange {
    #[serde(default)]
    pub from_date: String,
    #[serde(default)]
    pub to_date: String,
}

impl DateRange {
    pub fn new(from_date: impl Into<String>, to_date: impl Into<String>) -> Self {
        Self {
            from_date: from_date.into(),
            to_date: to_date.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.from_date.is_empty() && self.to_date.is_empty()
    }

    /// Parsed bounds; a bound that is empty or not an ISO date is open
    pub fn bounds(&self) -> (Option<NaiveDate>, Option<NaiveDate>) {
        (parse_iso_date(&self.from_date), parse_iso_date(&self.to_date))
    }

    /// Whether a date falls inside the window
    pub fn contains(&self, date: NaiveDate) -> bool {
        let (from, to) = self.bounds();
        from.map_or(true, |f| date >= f) && to.map_or(true, |t| date <= t)
    }
}

/// Parse the date part of an ISO date or datetime string
pub fn parse_iso_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.get(..10)?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

/// A per-column filter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnFilter {
    pub id: String,
    pub value: Value,
}

/// Expansion state: either a per-row map or a blanket flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expanded {
    All(bool),
    Rows(BTreeMap<String, bool>),
}

impl Default for Expanded {
    fn default() -> Self {
        Expanded::Rows(BTreeMap::new())
    }
}

impl Expanded {
    pub fn is_expanded(&self, row_id: &str) -> bool {
        match self {
            Expanded::All(all) => *all,
            Expanded::Rows(rows) => rows.get(row_id).copied().unwrap_or(false),
        }
    }

    /// Flip one row's flag
    ///
    /// `expandable_ids` are the rows currently able to expand; they are needed
    /// to turn a blanket `true` into an explicit map when one row collapses.
    pub fn toggle(&mut self, row_id: &str, expandable_ids: &[String]) {
        match self {
            Expanded::All(true) => {
                let rows = expandable_ids
                    .iter()
                    .filter(|id| id.as_str() != row_id)
                    .map(|id| (id.clone(), true))
                    .collect();
                *self = Expanded::Rows(rows);
            }
            Expanded::All(false) => {
                let mut rows = BTreeMap::new();
                rows.insert(row_id.to_string(), true);
                *self = Expanded::Rows(rows);
            }
            Expanded::Rows(rows) => {
                if rows.get(row_id).copied().unwrap_or(false) {
                    rows.remove(row_id);
                } else {
                    rows.insert(row_id.to_string(), true);
                }
            }
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Query State
// ═══════════════════════════════════════════════════════════════════════════════

/// The full table query, as encoded in the shareable location
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState {
    pub page: u32,
    pub page_size: u32,
    pub search: String,
    pub date_range: DateRange,
    pub sort_by: String,
    pub sort_order: SortOrder,
    pub column_visibility: BTreeMap<String, bool>,
    pub column_filters: Vec<ColumnFilter>,
    pub expanded: Expanded,
}

impl Default for QueryState {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            page_size: DEFAULT_PAGE_SIZE,
            search: String::new(),
            date_range: DateRange::default(),
            sort_by: DEFAULT_SORT_BY.to_string(),
            sort_order: SortOrder::default(),
            column_visibility: BTreeMap::new(),
            column_filters: Vec::new(),
            expanded: Expanded::default(),
        }
    }
}

impl QueryState {
    /// Derive the query from the store, falling back to defaults per key
    pub fn read_from(store: &UrlStateStore) -> Self {
        let defaults = QueryState::default();
        Self {
            page: store.get_valid(PARAM_PAGE, defaults.page, |p: &u32| *p >= 1),
            page_size: store.get_valid(PARAM_PAGE_SIZE, defaults.page_size, |p: &u32| *p >= 1),
            search: store.get(PARAM_SEARCH, defaults.search),
            date_range: store.get(PARAM_DATE_RANGE, defaults.date_range),
            sort_by: store.get_valid(PARAM_SORT_BY, defaults.sort_by, |s: &String| {
                !s.is_empty()
            }),
            sort_order: store.get(PARAM_SORT_ORDER, defaults.sort_order),
            column_visibility: store.get(PARAM_COLUMN_VISIBILITY, defaults.column_visibility),
            column_filters: store.get(PARAM_COLUMN_FILTERS, defaults.column_filters),
            expanded: store.get(PARAM_EXPANDED, defaults.expanded),
        }
    }

    /// Write every field into the store; unchanged fields are no-ops
    pub fn write_to(&self, store: &mut UrlStateStore) {
        let defaults = QueryState::default();
        store.set(PARAM_PAGE, &self.page, &defaults.page);
        store.set(PARAM_PAGE_SIZE, &self.page_size, &defaults.page_size);
        store.set(PARAM_SEARCH, &self.search, &defaults.search);
        store.set(PARAM_DATE_RANGE, &self.date_range, &defaults.date_range);
        store.set(PARAM_SORT_BY, &self.sort_by, &defaults.sort_by);
        store.set(PARAM_SORT_ORDER, &self.sort_order, &defaults.sort_order);
        store.set(
            PARAM_COLUMN_VISIBILITY,
            &self.column_visibility,
            &defaults.column_visibility,
        );
        store.set(PARAM_COLUMN_FILTERS, &self.column_filters, &defaults.column_filters);
        store.set(PARAM_EXPANDED, &self.expanded, &defaults.expanded);
    }

    /// Whether a column is visible (columns are visible unless hidden explicitly)
    pub fn is_column_visible(&self, column_id: &str) -> bool {
        self.column_visibility.get(column_id).copied().unwrap_or(true)
    }

    /// Set or clear the filter for one column; empty strings clear it
    pub fn set_column_filter(&mut self, column_id: &str, value: Value) {
        self.column_filters.retain(|f| f.id != column_id);
        let empty = matches!(&value, Value::Null) || value.as_str() == Some("");
        if !empty {
            self.column_filters.push(ColumnFilter {
                id: column_id.to_string(),
                value,
            });
        }
    }

    /// Parameters for the data source
    pub fn page_request(&self) -> PageRequest {
        PageRequest {
            page: self.page,
            limit: self.page_size,
            search: self.search.clone(),
            from_date: self.date_range.from_date.clone(),
            to_date: self.date_range.to_date.clone(),
            sort_by: self.sort_by.clone(),
            sort_order: self.sort_order,
            filters: self.column_filters.clone(),
        }
    }
}

/// The parameters a data source receives for one page
#[derive(Debug, Clone, PartialEq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
    pub search: String,
    pub from_date: String,
    pub to_date: String,
    pub sort_by: String,
    pub sort_order: SortOrder,
    pub filters: Vec<ColumnFilter>,
}

impl PageRequest {
    pub fn date_range(&self) -> DateRange {
        DateRange::new(self.from_date.clone(), self.to_date.clone())
    }
}
