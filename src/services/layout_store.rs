//! Column layout store
//!
//! Keeps one table's column widths and order in memory and persists them
//! through a `LayoutBackend`. Sizing and order are written on independent
//! debounce streams, so a drag-resize burst produces a single write.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use crate::error::StoreError;
use crate::model::column::{ColumnLayout, MIN_COLUMN_WIDTH};
use crate::services::debounce::Debouncer;

/// Durable storage for column layouts, keyed by table identity
pub trait LayoutBackend {
    fn load(&self, table_id: &str) -> Result<Option<ColumnLayout>, StoreError>;
    fn save(&mut self, table_id: &str, layout: &ColumnLayout) -> Result<(), StoreError>;
    fn remove(&mut self, table_id: &str) -> Result<(), StoreError>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// Backends
// ═══════════════════════════════════════════════════════════════════════════════

/// One pretty-printed JSON file per table identity
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    dir: PathBuf,
}

impl JsonFileBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File for a table identity; anything outside `[A-Za-z0-9_-]` becomes `_`
    pub fn path_for(&self, table_id: &str) -> PathBuf {
        let name: String = table_id
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let name = if name.is_empty() { "_".to_string() } else { name };
        self.dir.join(format!("{}.json", name))
    }
}

impl LayoutBackend for JsonFileBackend {
    fn load(&self, table_id: &str) -> Result<Option<ColumnLayout>, StoreError> {
        let path = self.path_for(table_id);
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&mut self, table_id: &str, layout: &ColumnLayout) -> Result<(), StoreError> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
                path: self.dir.clone(),
                source,
            })?;
        }
        let path = self.path_for(table_id);
        let json = serde_json::to_string_pretty(layout)?;
        fs::write(&path, json).map_err(|source| StoreError::Io { path, source })
    }

    fn remove(&mut self, table_id: &str) -> Result<(), StoreError> {
        let path = self.path_for(table_id);
        if !path.exists() {
            return Ok(());
        }
        fs::remove_file(&path).map_err(|source| StoreError::Io { path, source })
    }
}

/// In-memory backend that counts writes
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    pub records: HashMap<String, ColumnLayout>,
    pub writes: usize,
}

impl LayoutBackend for MemoryBackend {
    fn load(&self, table_id: &str) -> Result<Option<ColumnLayout>, StoreError> {
        Ok(self.records.get(table_id).cloned())
    }

    fn save(&mut self, table_id: &str, layout: &ColumnLayout) -> Result<(), StoreError> {
        self.writes += 1;
        self.records.insert(table_id.to_string(), layout.clone());
        Ok(())
    }

    fn remove(&mut self, table_id: &str) -> Result<(), StoreError> {
        self.records.remove(table_id);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════════════

pub struct ColumnLayoutStore<B: LayoutBackend> {
    table_id: String,
    backend: B,
    layout: ColumnLayout,
    /// What the backend currently holds
    persisted: ColumnLayout,
    sizing_writes: Debouncer<BTreeMap<String, u16>>,
    order_writes: Debouncer<Vec<String>>,
}

impl<B: LayoutBackend> ColumnLayoutStore<B> {
    /// Bind to a table identity, loading whatever the backend has for it
    pub fn open(table_id: &str, backend: B, quiet: Duration) -> Self {
        let layout = match backend.load(table_id) {
            Ok(Some(layout)) => layout,
            Ok(None) => ColumnLayout::default(),
            Err(err) => {
                tracing::warn!(table_id, error = %err, "could not load column layout; using defaults");
                ColumnLayout::default()
            }
        };
        tracing::debug!(
            table_id,
            sized = layout.sizing.len(),
            ordered = layout.order.len(),
            "opened column layout"
        );
        Self {
            table_id: table_id.to_string(),
            backend,
            persisted: layout.clone(),
            layout,
            sizing_writes: Debouncer::new(quiet),
            order_writes: Debouncer::new(quiet),
        }
    }

    pub fn layout(&self) -> &ColumnLayout {
        &self.layout
    }

    #[cfg(test)]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn set_sizing(&mut self, sizing: BTreeMap<String, u16>, now: Instant) {
        if sizing == self.layout.sizing {
            return;
        }
        self.layout.sizing = sizing.clone();
        self.sizing_writes.push(sizing, now);
    }

    /// Set one column's width, clamped to the minimum
    pub fn resize_column(&mut self, column_id: &str, width: u16, now: Instant) {
        let mut sizing = self.layout.sizing.clone();
        sizing.insert(column_id.to_string(), width.max(MIN_COLUMN_WIDTH));
        self.set_sizing(sizing, now);
    }

    pub fn set_order(&mut self, order: Vec<String>, now: Instant) {
        if order == self.layout.order {
            return;
        }
        self.layout.order = order.clone();
        self.order_writes.push(order, now);
    }

    /// Move a column one step within `current` (the effective display order)
    pub fn move_column(&mut self, current: &[String], column_id: &str, delta: isize, now: Instant) {
        let Some(from) = current.iter().position(|id| id == column_id) else {
            return;
        };
        let to = from as isize + delta;
        if to < 0 || to as usize >= current.len() {
            return;
        }
        let mut order = current.to_vec();
        let column = order.remove(from);
        order.insert(to as usize, column);
        self.set_order(order, now);
    }

    /// Perform writes whose quiet period has elapsed; returns how many ran
    pub fn tick(&mut self, now: Instant) -> Result<usize, StoreError> {
        let sizing = self.sizing_writes.poll(now);
        let order = self.order_writes.poll(now);
        self.write(sizing, order, now)
    }

    /// Perform every pending write now
    pub fn flush(&mut self) -> Result<usize, StoreError> {
        let sizing = self.sizing_writes.flush();
        let order = self.order_writes.flush();
        self.write(sizing, order, Instant::now())
    }

    /// Save each stream on its own; a value that fails to save is queued
    /// again so a later tick or flush retries it
    fn write(
        &mut self,
        sizing: Option<BTreeMap<String, u16>>,
        order: Option<Vec<String>>,
        now: Instant,
    ) -> Result<usize, StoreError> {
        let mut writes = 0;
        let mut failure = None;
        // Each stream writes only its own half over what is already durable
        if let Some(sizing) = sizing {
            let mut record = self.persisted.clone();
            record.sizing = sizing;
            match self.backend.save(&self.table_id, &record) {
                Ok(()) => {
                    self.persisted = record;
                    writes += 1;
                }
                Err(err) => {
                    self.sizing_writes.push(record.sizing, now);
                    failure = failure.or(Some(err));
                }
            }
        }
        if let Some(order) = order {
            let mut record = self.persisted.clone();
            record.order = order;
            match self.backend.save(&self.table_id, &record) {
                Ok(()) => {
                    self.persisted = record;
                    writes += 1;
                }
                Err(err) => {
                    self.order_writes.push(record.order, now);
                    failure = failure.or(Some(err));
                }
            }
        }
        if writes > 0 {
            tracing::debug!(table_id = %self.table_id, writes, "persisted column layout");
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(writes),
        }
    }

    /// Drop pending writes and clear both memory and durable state
    pub fn reset(&mut self) -> Result<(), StoreError> {
        self.sizing_writes.cancel();
        self.order_writes.cancel();
        self.layout = ColumnLayout::default();
        self.persisted = ColumnLayout::default();
        self.backend.remove(&self.table_id)?;
        tracing::info!(table_id = %self.table_id, "column layout reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_millis(300);

    fn ms(start: Instant, millis: u64) -> Instant {
        start + Duration::from_millis(millis)
    }

    #[test]
    fn test_resize_burst_writes_once_with_final_width() {
        let start = Instant::now();
        let mut store = ColumnLayoutStore::open("orders", MemoryBackend::default(), QUIET);

        store.resize_column("name", 20, start);
        store.resize_column("name", 25, ms(start, 50));
        store.resize_column("name", 31, ms(start, 100));

        assert_eq!(store.layout().sizing["name"], 31);
        assert_eq!(store.tick(ms(start, 200)).unwrap(), 0);
        assert_eq!(store.tick(ms(start, 400)).unwrap(), 1);
        assert_eq!(store.tick(ms(start, 900)).unwrap(), 0);

        let backend = store.backend();
        assert_eq!(backend.writes, 1);
        assert_eq!(backend.records["orders"].sizing["name"], 31);
    }

    #[test]
    fn test_sizing_and_order_debounce_independently() {
        let start = Instant::now();
        let mut store = ColumnLayoutStore::open("orders", MemoryBackend::default(), QUIET);

        store.resize_column("name", 20, start);
        store.set_order(vec!["total".to_string(), "name".to_string()], ms(start, 250));

        assert_eq!(store.tick(ms(start, 320)).unwrap(), 1);
        assert!(store.backend().records["orders"].order.is_empty());
        assert_eq!(store.tick(ms(start, 560)).unwrap(), 1);

        let record = &store.backend().records["orders"];
        assert_eq!(record.sizing["name"], 20);
        assert_eq!(record.order, vec!["total", "name"]);
    }

    #[test]
    fn test_move_column_within_bounds() {
        let start = Instant::now();
        let mut store = ColumnLayoutStore::open("t", MemoryBackend::default(), QUIET);
        let current: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();

        store.move_column(&current, "a", -1, start);
        assert!(store.layout().order.is_empty());

        store.move_column(&current, "a", 1, start);
        assert_eq!(store.layout().order, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_resize_clamps_to_minimum() {
        let mut store = ColumnLayoutStore::open("t", MemoryBackend::default(), QUIET);
        store.resize_column("a", 1, Instant::now());
        assert_eq!(store.layout().sizing["a"], MIN_COLUMN_WIDTH);
    }

    #[test]
    fn test_reset_cancels_pending_and_clears_backend() {
        let start = Instant::now();
        let mut backend = MemoryBackend::default();
        backend.records.insert(
            "t".to_string(),
            ColumnLayout {
                sizing: BTreeMap::from([("a".to_string(), 9)]),
                order: vec![],
            },
        );
        let mut store = ColumnLayoutStore::open("t", backend, QUIET);
        assert_eq!(store.layout().sizing["a"], 9);

        store.resize_column("a", 12, start);
        store.reset().unwrap();

        assert_eq!(store.flush().unwrap(), 0);
        assert!(store.layout().is_empty());
        assert!(!store.backend().records.contains_key("t"));
    }

    #[test]
    fn test_identities_do_not_collide() {
        let start = Instant::now();
        let mut first = ColumnLayoutStore::open("first", MemoryBackend::default(), QUIET);
        first.resize_column("a", 30, start);
        first.flush().unwrap();

        let backend = first.backend().clone();
        let second = ColumnLayoutStore::open("second", backend, QUIET);
        assert!(second.layout().is_empty());
    }

    #[test]
    fn test_json_backend_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let start = Instant::now();

        let mut store =
            ColumnLayoutStore::open("orders/main", JsonFileBackend::new(dir.path()), QUIET);
        store.resize_column("name", 22, start);
        store.set_order(vec!["name".to_string()], start);
        assert_eq!(store.flush().unwrap(), 2);

        let path = store.backend().path_for("orders/main");
        assert_eq!(path.file_name().unwrap(), "orders_main.json");
        assert!(path.exists());

        let reopened =
            ColumnLayoutStore::open("orders/main", JsonFileBackend::new(dir.path()), QUIET);
        assert_eq!(reopened.layout().sizing["name"], 22);
        assert_eq!(reopened.layout().order, vec!["name"]);
    }

    #[test]
    fn test_corrupt_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path());
        fs::write(backend.path_for("t"), "not json").unwrap();

        let store = ColumnLayoutStore::open("t", backend, QUIET);
        assert!(store.layout().is_empty());
    }

    /// Backend whose first `failures` saves fail
    #[derive(Default)]
    struct FlakyBackend {
        failures: usize,
        inner: MemoryBackend,
    }

    impl LayoutBackend for FlakyBackend {
        fn load(&self, table_id: &str) -> Result<Option<ColumnLayout>, StoreError> {
            self.inner.load(table_id)
        }

        fn save(&mut self, table_id: &str, layout: &ColumnLayout) -> Result<(), StoreError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(StoreError::Io {
                    path: PathBuf::from("layouts"),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.inner.save(table_id, layout)
        }

        fn remove(&mut self, table_id: &str) -> Result<(), StoreError> {
            self.inner.remove(table_id)
        }
    }

    #[test]
    fn test_failed_save_keeps_both_streams_queued() {
        let start = Instant::now();
        let backend = FlakyBackend {
            failures: 1,
            ..FlakyBackend::default()
        };
        let mut store = ColumnLayoutStore::open("t", backend, QUIET);
        store.resize_column("a", 20, start);
        store.set_order(vec!["b".to_string(), "a".to_string()], start);

        assert!(store.tick(ms(start, 300)).is_err());
        assert!(store.sizing_writes.is_pending());
        assert!(!store.order_writes.is_pending());
        assert_eq!(store.backend().inner.records["t"].order, vec!["b", "a"]);

        assert_eq!(store.flush().unwrap(), 1);
        let record = &store.backend().inner.records["t"];
        assert_eq!(record.sizing["a"], 20);
        assert_eq!(record.order, vec!["b", "a"]);
    }
}
