//! Data-source collaborator
//!
//! The table talks to its backend through `DataSource`. A real deployment
//! would put an HTTP or RPC client behind it; `MemorySource` implements the
//! same contract over an in-memory dataset (loaded from JSON or generated) and
//! does the server-side work: search, date range, column filters, sorting, and
//! pagination.

use chrono::{Duration as ChronoDuration, NaiveDate};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::FetchError;
use crate::model::entity::{value_text, Entity, PageResponse, Pagination};
use crate::model::query::{parse_iso_date, ColumnFilter, PageRequest, SortOrder};

/// Field holding the row's creation date, used by the date range filter
pub const DATE_FIELD: &str = "created_at";

/// Backend contract for a server-paginated table
pub trait DataSource: Send + Sync {
    fn fetch_page(&self, request: &PageRequest) -> Result<PageResponse, FetchError>;

    /// Batch lookup by stable id; unknown ids are simply absent from the result
    fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Entity>, FetchError>;

    fn supports_full_retrieval(&self) -> bool {
        false
    }

    /// Every row matching the request's filters, ignoring pagination
    fn fetch_all(&self, _request: &PageRequest) -> Result<Vec<Entity>, FetchError> {
        Err(FetchError::FullRetrievalUnsupported)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-Memory Source
// ═══════════════════════════════════════════════════════════════════════════════

/// A `DataSource` over a fixed set of entities
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    entities: Vec<Entity>,
}

impl MemorySource {
    pub fn new(entities: Vec<Entity>) -> Self {
        Self { entities }
    }

    /// Load entities from a JSON array file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
        let entities: Vec<Entity> = serde_json::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?;
        tracing::info!(path = %path.display(), rows = entities.len(), "loaded dataset");
        Ok(Self::new(entities))
    }

    /// Generated orders with line items, for running without a dataset
    pub fn sample() -> Self {
        const CUSTOMERS: [&str; 8] = [
            "Ada Lovelace",
            "Grace Hopper",
            "Alan Turing",
            "Edsger Dijkstra",
            "Barbara Liskov",
            "Donald Knuth",
            "Frances Allen",
            "Ken Thompson",
        ];
        const STATUSES: [&str; 4] = ["pending", "paid", "shipped", "refunded"];
        const PRODUCTS: [(&str, f64); 5] = [
            ("Keyboard", 49.0),
            ("Monitor", 199.0),
            ("Cable", 9.5),
            ("Mouse", 25.0),
            ("Dock", 129.0),
        ];

        let base = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
        let entities = (0..57)
            .map(|n: usize| {
                let created = base + ChronoDuration::days((n * 3) as i64);
                let items: Vec<Entity> = (0..(n % 4))
                    .map(|i| {
                        let (product, price) = PRODUCTS[(n + i) % PRODUCTS.len()];
                        let qty = (i % 3 + 1) as u64;
                        Entity::new("")
                            .with_kind("line_item")
                            .with("name", product)
                            .with("quantity", qty)
                            .with("total", price * qty as f64)
                    })
                    .collect();
                let total: f64 = items
                    .iter()
                    .filter_map(|item| item.field("total").and_then(Value::as_f64))
                    .sum();
                Entity::new(format!("ORD-{:04}", n + 1))
                    .with_kind("order")
                    .with("name", CUSTOMERS[n % CUSTOMERS.len()])
                    .with("status", STATUSES[n % STATUSES.len()])
                    .with("total", total)
                    .with(DATE_FIELD, created.format("%Y-%m-%d").to_string())
                    .with_children(items)
            })
            .collect();
        Self::new(entities)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Rows matching search, date range and column filters, sorted
    fn matching(&self, request: &PageRequest) -> Vec<&Entity> {
        let needle = request.search.trim().to_lowercase();
        let range = request.date_range();

        let mut rows: Vec<&Entity> = self
            .entities
            .iter()
            .filter(|e| needle.is_empty() || matches_search(e, &needle))
            .filter(|e| {
                range.is_empty()
                    || e.field(DATE_FIELD)
                        .and_then(Value::as_str)
                        .and_then(parse_iso_date)
                        .is_some_and(|d| range.contains(d))
            })
            .filter(|e| request.filters.iter().all(|f| matches_filter(e, f)))
            .collect();

        rows.sort_by(|a, b| {
            let ordering = compare_fields(a.field(&request.sort_by), b.field(&request.sort_by))
                .then_with(|| a.id.cmp(&b.id));
            match request.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        rows
    }
}

impl DataSource for MemorySource {
    fn fetch_page(&self, request: &PageRequest) -> Result<PageResponse, FetchError> {
        let rows = self.matching(request);
        let limit = request.limit.max(1);
        let total_items = rows.len() as u64;
        let total_pages = (rows.len() as u32).div_ceil(limit);
        let start = (request.page.saturating_sub(1) as usize).saturating_mul(limit as usize);

        let data = rows
            .into_iter()
            .skip(start)
            .take(limit as usize)
            .cloned()
            .collect();

        Ok(PageResponse {
            success: true,
            data,
            pagination: Pagination {
                page: request.page,
                limit,
                total_pages,
                total_items,
            },
            message: None,
        })
    }

    fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Entity>, FetchError> {
        let by_id: HashMap<&str, &Entity> =
            self.entities.iter().map(|e| (e.id.as_str(), e)).collect();
        Ok(ids
            .iter()
            .filter_map(|id| by_id.get(id.as_str()).map(|e| (*e).clone()))
            .collect())
    }

    fn supports_full_retrieval(&self) -> bool {
        true
    }

    fn fetch_all(&self, request: &PageRequest) -> Result<Vec<Entity>, FetchError> {
        Ok(self.matching(request).into_iter().cloned().collect())
    }
}

fn matches_search(entity: &Entity, needle: &str) -> bool {
    entity.id.to_lowercase().contains(needle)
        || entity
            .fields
            .values()
            .filter(|v| v.is_string() || v.is_number())
            .any(|v| value_text(v).to_lowercase().contains(needle))
}

/// String filters match case-insensitively by substring; others by equality.
/// Array filter values match any of their members.
fn matches_filter(entity: &Entity, filter: &ColumnFilter) -> bool {
    let Some(actual) = entity.field(&filter.id) else {
        return false;
    };
    match &filter.value {
        Value::Array(options) => options.iter().any(|option| value_matches(actual, option)),
        expected => value_matches(actual, expected),
    }
}

fn value_matches(actual: &Value, expected: &Value) -> bool {
    match expected {
        Value::String(s) => value_text(actual)
            .to_lowercase()
            .contains(&s.to_lowercase()),
        other => actual == other,
    }
}

/// Numbers compare numerically, everything else by display text; missing last
fn compare_fields(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => value_text(a).cmp(&value_text(b)),
        },
    }
}
