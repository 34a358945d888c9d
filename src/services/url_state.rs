//! URL state store
//!
//! Maps named parameters to and from the shareable `Location`. Reads are
//! type-directed and never fail; writes are compared against the current value,
//! drop keys that equal their default, and are committed to a `LocationSink`
//! with replace-in-place semantics.
//!
//! Every commit remembers the query string it wrote. When the sink's owner
//! reports that same location back as a change, `observe_external` recognises
//! the echo and skips it, so state is never re-derived from its own write.

use std::collections::BTreeMap;
use std::sync::mpsc::Sender;
use std::time::{Duration, Instant};

use crate::model::query::{ColumnFilter, DateRange, Expanded, SortOrder};
use crate::services::debounce::Debouncer;
use crate::services::location::Location;

// ═══════════════════════════════════════════════════════════════════════════════
// Parameter Coercion
// ═══════════════════════════════════════════════════════════════════════════════

/// A value that can live in a location parameter
pub trait UrlParam: Sized + Clone + PartialEq {
    /// Decode a raw parameter; `None` on parse failure or shape mismatch
    fn decode(raw: &str) -> Option<Self>;

    fn encode(&self) -> String;
}

impl UrlParam for String {
    fn decode(raw: &str) -> Option<Self> {
        Some(raw.to_string())
    }

    fn encode(&self) -> String {
        self.clone()
    }
}

impl UrlParam for bool {
    fn decode(raw: &str) -> Option<Self> {
        match raw.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        }
    }

    fn encode(&self) -> String {
        self.to_string()
    }
}

macro_rules! number_url_param {
    ($($ty:ty),*) => {
        $(
            impl UrlParam for $ty {
                fn decode(raw: &str) -> Option<Self> {
                    raw.trim().parse().ok()
                }

                fn encode(&self) -> String {
                    self.to_string()
                }
            }
        )*
    };
}

number_url_param!(u32, u64, i64, f64);

impl UrlParam for SortOrder {
    fn decode(raw: &str) -> Option<Self> {
        SortOrder::parse(raw.trim())
    }

    fn encode(&self) -> String {
        self.as_str().to_string()
    }
}

macro_rules! json_url_param {
    ($($ty:ty),*) => {
        $(
            impl UrlParam for $ty {
                fn decode(raw: &str) -> Option<Self> {
                    serde_json::from_str(raw).ok()
                }

                fn encode(&self) -> String {
                    serde_json::to_string(self).unwrap_or_default()
                }
            }
        )*
    };
}

json_url_param!(
    DateRange,
    Expanded,
    Vec<ColumnFilter>,
    BTreeMap<String, bool>,
    serde_json::Value
);

// ═══════════════════════════════════════════════════════════════════════════════
// Location Sinks
// ═══════════════════════════════════════════════════════════════════════════════

/// Where committed locations go (the address bar of the host)
pub trait LocationSink {
    /// Replace the current location without creating a history entry
    fn replace(&mut self, location: &Location);
}

/// Sink that broadcasts every replaced location as a change notification
///
/// This mirrors a router that emits a change event for programmatic
/// navigation: the notifications come back through `observe_external`.
pub struct ChannelSink {
    tx: Sender<Location>,
}

impl ChannelSink {
    pub fn new(tx: Sender<Location>) -> Self {
        Self { tx }
    }
}

impl LocationSink for ChannelSink {
    fn replace(&mut self, location: &Location) {
        if self.tx.send(location.clone()).is_err() {
            tracing::debug!("location listener dropped; change notification lost");
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Typed access to the shareable location
pub struct UrlStateStore {
    /// Location as callers observe it (includes uncommitted writes)
    location: Location,
    /// Location last handed to the sink
    committed: Location,
    sink: Box<dyn LocationSink>,
    /// Query string of our last commit, until its echo is observed
    echo: Option<String>,
    /// A write is waiting for the next flush or tick
    immediate: bool,
    /// A write is waiting for a quiet period
    deferred: Debouncer<()>,
}

impl UrlStateStore {
    pub fn new(initial: Location, sink: Box<dyn LocationSink>, quiet: Duration) -> Self {
        Self {
            committed: initial.clone(),
            location: initial,
            sink,
            echo: None,
            immediate: false,
            deferred: Debouncer::new(quiet),
        }
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn committed(&self) -> &Location {
        &self.committed
    }

    /// Decode a parameter, or return `default` if absent or malformed
    pub fn get<T: UrlParam>(&self, key: &str, default: T) -> T {
        match self.location.get(key) {
            None => default,
            Some(raw) => T::decode(raw).unwrap_or_else(|| {
                tracing::debug!(key, raw, "malformed location parameter; using default");
                default
            }),
        }
    }

    /// Like `get`, but decoded values failing `valid` also fall back
    pub fn get_valid<T: UrlParam>(&self, key: &str, default: T, valid: impl Fn(&T) -> bool) -> T {
        match self.location.get(key).and_then(T::decode) {
            Some(value) if valid(&value) => value,
            Some(_) => {
                tracing::debug!(key, "location parameter out of range; using default");
                default
            }
            None => default,
        }
    }

    /// Write a parameter; committed on the next `flush` or `tick`
    ///
    /// Returns `false` when the value equals the current one.
    pub fn set<T: UrlParam>(&mut self, key: &str, value: &T, default: &T) -> bool {
        let changed = self.apply(key, value, default);
        if changed {
            self.immediate = true;
        }
        changed
    }

    /// Write a parameter; committed once writes stop for the quiet period
    pub fn set_debounced<T: UrlParam>(
        &mut self,
        key: &str,
        value: &T,
        default: &T,
        now: Instant,
    ) -> bool {
        let changed = self.apply(key, value, default);
        if changed {
            self.deferred.push((), now);
        }
        changed
    }

    fn apply<T: UrlParam>(&mut self, key: &str, value: &T, default: &T) -> bool {
        // Defaults are never spelled out, even when the raw value is junk
        if value == default {
            return self.location.remove(key);
        }
        if self.location.get(key).and_then(T::decode).as_ref() == Some(value) {
            return false;
        }
        self.location.set(key, value.encode());
        true
    }

    /// Replace every parameter at once (used by resets)
    pub fn replace_all(&mut self, location: Location) {
        if location != self.location {
            self.location = location;
            self.immediate = true;
        }
    }

    /// Whether a write is waiting to be committed
    pub fn has_pending(&self) -> bool {
        self.immediate || self.deferred.is_pending()
    }

    /// Commit pending writes that are due; returns whether the sink was written
    pub fn tick(&mut self, now: Instant) -> bool {
        let deferred_due = self.deferred.poll(now).is_some();
        if self.immediate || deferred_due {
            if self.immediate {
                self.deferred.cancel();
            }
            return self.commit();
        }
        false
    }

    /// Commit every pending write now
    pub fn flush(&mut self) -> bool {
        let pending = self.deferred.flush().is_some();
        if self.immediate || pending {
            return self.commit();
        }
        false
    }

    fn commit(&mut self) -> bool {
        self.immediate = false;
        if self.location == self.committed {
            return false;
        }
        let query = self.location.to_query_string();
        tracing::debug!(location = %query, "replacing shareable location");
        self.echo = Some(query);
        self.committed = self.location.clone();
        self.sink.replace(&self.committed);
        true
    }

    /// Report a location change seen by the host
    ///
    /// Returns `true` when the change came from outside and state must be
    /// re-derived; `false` for echoes of our own writes and no-op changes.
    pub fn observe_external(&mut self, location: Location) -> bool {
        if let Some(echo) = self.echo.take() {
            if echo == location.to_query_string() {
                tracing::trace!("skipping echo of own location write");
                return false;
            }
        }
        if location == self.location {
            return false;
        }
        tracing::debug!(location = %location, "adopting external location");
        self.immediate = false;
        self.deferred.cancel();
        self.committed = location.clone();
        self.location = location;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Records every replaced location
    #[derive(Clone, Default)]
    struct RecordingSink {
        writes: Rc<RefCell<Vec<String>>>,
    }

    impl LocationSink for RecordingSink {
        fn replace(&mut self, location: &Location) {
            self.writes.borrow_mut().push(location.to_query_string());
        }
    }

    fn store_with(query: &str) -> (UrlStateStore, RecordingSink) {
        let sink = RecordingSink::default();
        let store = UrlStateStore::new(
            Location::parse(query),
            Box::new(sink.clone()),
            Duration::from_millis(300),
        );
        (store, sink)
    }

    #[test]
    fn test_get_falls_back_on_malformed_values() {
        let (store, _) = store_with("page=abc&dateRange=%7Bnot-json&sortOrder=sideways");
        assert_eq!(store.get("page", 1u32), 1);
        assert_eq!(store.get("dateRange", DateRange::default()), DateRange::default());
        assert_eq!(store.get("sortOrder", SortOrder::Desc), SortOrder::Desc);
    }

    #[test]
    fn test_get_valid_rejects_out_of_range() {
        let (store, _) = store_with("page=0&pageSize=25");
        assert_eq!(store.get_valid("page", 1u32, |p| *p >= 1), 1);
        assert_eq!(store.get_valid("pageSize", 10u32, |p| *p >= 1), 25);
    }

    #[test]
    fn test_set_default_removes_key() {
        let (mut store, sink) = store_with("page=3");
        assert!(store.set("page", &1u32, &1u32));
        assert!(store.flush());
        assert!(store.location().get("page").is_none());
        assert_eq!(sink.writes.borrow().as_slice(), &["".to_string()]);
    }

    #[test]
    fn test_set_default_over_malformed_value_removes_key() {
        let (mut store, sink) = store_with("page=abc&search=x");
        assert!(store.set("page", &1u32, &1u32));
        assert!(store.flush());
        assert_eq!(store.location().get("page"), None);
        assert_eq!(sink.writes.borrow().as_slice(), &["?search=x".to_string()]);
    }

    #[test]
    fn test_set_equal_value_is_noop() {
        let (mut store, sink) = store_with("page=3");
        assert!(!store.set("page", &3u32, &1u32));
        assert!(!store.flush());
        assert!(sink.writes.borrow().is_empty());
    }

    #[test]
    fn test_set_json_value_deep_compares() {
        let (mut store, _) = store_with("");
        let range = DateRange::new("2024-01-01", "2024-02-01");
        assert!(store.set("dateRange", &range, &DateRange::default()));
        assert!(!store.set("dateRange", &range.clone(), &DateRange::default()));
        assert_eq!(store.get("dateRange", DateRange::default()), range);
    }

    #[test]
    fn test_writes_visible_before_commit() {
        let (mut store, sink) = store_with("");
        store.set("search", &"abc".to_string(), &String::new());
        assert_eq!(store.get("search", String::new()), "abc");
        assert!(sink.writes.borrow().is_empty());
        assert!(store.has_pending());
    }

    #[test]
    fn test_many_sets_commit_once() {
        let (mut store, sink) = store_with("");
        store.set("page", &2u32, &1u32);
        store.set("sortBy", &"name".to_string(), &"created_at".to_string());
        store.set("sortOrder", &SortOrder::Asc, &SortOrder::Desc);
        store.flush();
        assert_eq!(
            sink.writes.borrow().as_slice(),
            &["?page=2&sortBy=name&sortOrder=asc".to_string()]
        );
    }

    #[test]
    fn test_debounced_writes_coalesce() {
        let (mut store, sink) = store_with("");
        let start = Instant::now();
        for (i, text) in ["j", "jo", "john"].iter().enumerate() {
            let at = start + Duration::from_millis(30 * i as u64);
            store.set_debounced("search", &text.to_string(), &String::new(), at);
        }

        assert!(!store.tick(start + Duration::from_millis(100)));
        assert!(store.tick(start + Duration::from_millis(400)));
        assert_eq!(sink.writes.borrow().as_slice(), &["?search=john".to_string()]);
    }

    #[test]
    fn test_echo_of_own_write_is_skipped() {
        let (mut store, _) = store_with("");
        store.set("page", &4u32, &1u32);
        store.flush();

        let echo = store.committed().clone();
        assert!(!store.observe_external(echo));
        assert_eq!(store.get("page", 1u32), 4);
    }

    #[test]
    fn test_external_change_is_adopted() {
        let (mut store, _) = store_with("page=2");
        store.set("page", &3u32, &1u32);
        store.flush();

        assert!(store.observe_external(Location::parse("page=7&search=x")));
        assert_eq!(store.get("page", 1u32), 7);
        assert_eq!(store.get("search", String::new()), "x");
        assert!(!store.has_pending());
    }

    #[test]
    fn test_external_change_cancels_pending_debounce() {
        let (mut store, sink) = store_with("");
        let now = Instant::now();
        store.set_debounced("search", &"draft".to_string(), &String::new(), now);
        assert!(store.observe_external(Location::parse("search=shared")));
        assert!(!store.tick(now + Duration::from_secs(5)));
        assert!(sink.writes.borrow().is_empty());
        assert_eq!(store.get("search", String::new()), "shared");
    }

    #[test]
    fn test_channel_sink_delivers_notifications() {
        let (tx, rx) = std::sync::mpsc::channel();
        let mut store = UrlStateStore::new(
            Location::new(),
            Box::new(ChannelSink::new(tx)),
            Duration::from_millis(300),
        );
        store.set("page", &2u32, &1u32);
        store.flush();

        let notified = rx.try_recv().unwrap();
        assert!(!store.observe_external(notified));
    }

    proptest! {
        #[test]
        fn prop_search_round_trips(search in ".*") {
            let (mut store, _) = store_with("");
            store.set("search", &search, &String::new());
            store.flush();

            let reparsed = Location::parse(&store.committed().to_query_string());
            let (store2, _) = store_with(&reparsed.to_query_string());
            prop_assert_eq!(store2.get("search", String::new()), search.clone());
            prop_assert_eq!(store2.location().get("search").is_some(), !search.is_empty());
        }

        #[test]
        fn prop_page_round_trips(page in 1u32..10_000) {
            let (mut store, _) = store_with("");
            store.set("page", &page, &1u32);
            store.flush();

            let (store2, _) = store_with(&store.committed().to_query_string());
            prop_assert_eq!(store2.get("page", 1u32), page);
            prop_assert_eq!(store2.location().get("page").is_some(), page != 1);
        }
    }
}
