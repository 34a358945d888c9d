//! Data fetch orchestrator
//!
//! Issues page requests for the current query and exposes one result
//! contract whichever way the request runs:
//!
//! - `FetchStrategy::Call` runs the request inline.
//! - `FetchStrategy::Subscription` runs it on a worker thread; the result
//!   comes back over a channel that the UI loop drains on every tick.
//!
//! Each request gets a ticket. Only the response carrying the latest ticket is
//! applied, so a slow answer to an old query never overwrites a newer one.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;

use serde::{Deserialize, Serialize};

use crate::error::FetchError;
use crate::model::entity::{Entity, PageResponse, Pagination};
use crate::model::query::PageRequest;
use crate::services::data_source::DataSource;

/// How page requests are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStrategy {
    Call,
    #[default]
    Subscription,
}

/// What the table renders from
#[derive(Debug, Clone, Default)]
pub struct FetchState {
    pub is_loading: bool,
    pub is_error: bool,
    pub error: Option<FetchError>,
    pub data: Vec<Entity>,
    pub pagination: Option<Pagination>,
}

/// A worker's answer to one ticket
struct FetchMessage {
    ticket: u64,
    result: Result<PageResponse, FetchError>,
}

pub struct FetchOrchestrator {
    source: Arc<dyn DataSource>,
    strategy: FetchStrategy,
    /// Ticket of the most recently issued request
    latest: u64,
    last_request: Option<PageRequest>,
    tx: Sender<FetchMessage>,
    rx: Receiver<FetchMessage>,
    state: FetchState,
}

impl FetchOrchestrator {
    pub fn new(source: Arc<dyn DataSource>, strategy: FetchStrategy) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            source,
            strategy,
            latest: 0,
            last_request: None,
            tx,
            rx,
            state: FetchState::default(),
        }
    }

    pub fn state(&self) -> &FetchState {
        &self.state
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    pub fn last_request(&self) -> Option<&PageRequest> {
        self.last_request.as_ref()
    }

    /// Request a page unless this exact request is already current
    ///
    /// Returns the ticket of the issued request, or `None` if nothing changed.
    pub fn request(&mut self, request: &PageRequest) -> Option<u64> {
        if self.last_request.as_ref() == Some(request) && !self.state.is_error {
            return None;
        }
        Some(self.issue(request.clone()))
    }

    /// Re-issue the last request (e.g. after an error)
    pub fn refetch(&mut self) -> Option<u64> {
        let request = self.last_request.clone()?;
        Some(self.issue(request))
    }

    fn issue(&mut self, request: PageRequest) -> u64 {
        let ticket = self.begin(request.clone());
        tracing::debug!(ticket, page = request.page, strategy = ?self.strategy, "issuing page request");

        match self.strategy {
            FetchStrategy::Call => {
                let result = self.source.fetch_page(&request);
                self.apply(ticket, result);
            }
            FetchStrategy::Subscription => {
                let source = Arc::clone(&self.source);
                let tx = self.tx.clone();
                let spawned = thread::Builder::new()
                    .name("gridstate-fetch".to_string())
                    .spawn(move || {
                        let result = source.fetch_page(&request);
                        // The orchestrator may be gone; nothing to report to then
                        let _ = tx.send(FetchMessage { ticket, result });
                    });
                if let Err(err) = spawned {
                    let message = format!("could not start fetch worker: {}", err);
                    self.apply(ticket, Err(FetchError::Unavailable(message)));
                }
            }
        }
        ticket
    }

    /// Register a new request and mark the state as loading
    pub fn begin(&mut self, request: PageRequest) -> u64 {
        self.latest += 1;
        self.last_request = Some(request);
        self.state.is_loading = true;
        self.latest
    }

    /// Apply a response; stale tickets are discarded
    pub fn apply(&mut self, ticket: u64, result: Result<PageResponse, FetchError>) -> bool {
        if ticket != self.latest {
            tracing::debug!(ticket, latest = self.latest, "discarding stale page response");
            return false;
        }

        self.state.is_loading = false;
        match result {
            Ok(response) if response.success => {
                tracing::debug!(ticket, rows = response.data.len(), "applied page response");
                self.state.is_error = false;
                self.state.error = None;
                self.state.data = response.data;
                self.state.pagination = Some(response.pagination);
            }
            Ok(response) => {
                let message = response
                    .message
                    .unwrap_or_else(|| "unsuccessful response".to_string());
                self.fail(FetchError::Rejected(message));
            }
            Err(err) => self.fail(err),
        }
        true
    }

    fn fail(&mut self, err: FetchError) {
        tracing::warn!(error = %err, "page request failed");
        self.state.is_error = true;
        self.state.error = Some(err);
    }

    /// Drain worker results; returns whether the state changed
    pub fn poll(&mut self) -> bool {
        let mut changed = false;
        loop {
            match self.rx.try_recv() {
                Ok(message) => changed |= self.apply(message.ticket, message.result),
                Err(TryRecvError::Empty) => break,
                // We hold a sender ourselves, so this only happens on teardown
                Err(TryRecvError::Disconnected) => {
                    if self.state.is_loading {
                        self.state.is_loading = false;
                        self.fail(FetchError::Disconnected);
                        changed = true;
                    }
                    break;
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::query::QueryState;
    use crate::services::data_source::MemorySource;
    use std::time::{Duration, Instant};

    fn page_of(ids: &[&str]) -> PageResponse {
        PageResponse {
            success: true,
            data: ids.iter().map(|id| Entity::new(*id)).collect(),
            pagination: Pagination {
                page: 1,
                limit: 10,
                total_pages: 1,
                total_items: ids.len() as u64,
            },
            message: None,
        }
    }

    fn request_for_page(page: u32) -> PageRequest {
        let mut query = QueryState::default();
        query.page = page;
        query.page_request()
    }

    fn sample_source() -> Arc<dyn DataSource> {
        Arc::new(MemorySource::sample())
    }

    #[test]
    fn test_late_response_for_older_query_is_discarded() {
        let mut fetch = FetchOrchestrator::new(sample_source(), FetchStrategy::Subscription);
        let first = fetch.begin(request_for_page(1));
        let second = fetch.begin(request_for_page(2));

        assert!(fetch.apply(second, Ok(page_of(&["new"]))));
        assert!(!fetch.apply(first, Ok(page_of(&["old"]))));

        assert_eq!(fetch.state().data[0].id, "new");
        assert!(!fetch.state().is_loading);
    }

    #[test]
    fn test_stale_error_does_not_flag_state() {
        let mut fetch = FetchOrchestrator::new(sample_source(), FetchStrategy::Subscription);
        let first = fetch.begin(request_for_page(1));
        let second = fetch.begin(request_for_page(2));

        fetch.apply(second, Ok(page_of(&["ok"])));
        fetch.apply(first, Err(FetchError::Unavailable("timeout".to_string())));

        assert!(!fetch.state().is_error);
    }

    #[test]
    fn test_failure_is_captured_not_thrown() {
        let mut fetch = FetchOrchestrator::new(sample_source(), FetchStrategy::Call);
        let ticket = fetch.begin(request_for_page(1));
        fetch.apply(ticket, Err(FetchError::Unavailable("down".to_string())));

        let state = fetch.state();
        assert!(state.is_error);
        assert_eq!(state.error, Some(FetchError::Unavailable("down".to_string())));
        assert!(!state.is_loading);
    }

    #[test]
    fn test_unsuccessful_response_becomes_error() {
        let mut fetch = FetchOrchestrator::new(sample_source(), FetchStrategy::Call);
        let ticket = fetch.begin(request_for_page(1));
        let mut response = page_of(&[]);
        response.success = false;
        response.message = Some("invalid sort".to_string());
        fetch.apply(ticket, Ok(response));

        assert_eq!(
            fetch.state().error,
            Some(FetchError::Rejected("invalid sort".to_string()))
        );
    }

    #[test]
    fn test_loading_keeps_previous_data() {
        let mut fetch = FetchOrchestrator::new(sample_source(), FetchStrategy::Subscription);
        let ticket = fetch.begin(request_for_page(1));
        fetch.apply(ticket, Ok(page_of(&["a"])));
        fetch.begin(request_for_page(2));

        assert!(fetch.state().is_loading);
        assert_eq!(fetch.state().data.len(), 1);
    }

    #[test]
    fn test_call_strategy_applies_inline() {
        let mut fetch = FetchOrchestrator::new(sample_source(), FetchStrategy::Call);
        fetch.request(&request_for_page(1));

        assert!(!fetch.state().is_loading);
        assert_eq!(fetch.state().data.len(), 10);
        assert!(fetch.request(&request_for_page(1)).is_none());
    }

    /// Source whose first page answers slowly
    struct SlowFirstPage(MemorySource);

    impl DataSource for SlowFirstPage {
        fn fetch_page(&self, request: &PageRequest) -> Result<PageResponse, FetchError> {
            if request.page == 1 {
                thread::sleep(Duration::from_millis(150));
            }
            self.0.fetch_page(request)
        }

        fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Entity>, FetchError> {
            self.0.fetch_by_ids(ids)
        }
    }

    #[test]
    fn test_subscription_applies_by_recency_not_arrival() {
        let source = Arc::new(SlowFirstPage(MemorySource::sample()));
        let mut fetch = FetchOrchestrator::new(source, FetchStrategy::Subscription);
        fetch.request(&request_for_page(1));
        fetch.request(&request_for_page(2));

        // Wait until both workers have answered
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            fetch.poll();
            if !fetch.state().is_loading {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        thread::sleep(Duration::from_millis(300));
        fetch.poll();

        let state = fetch.state();
        assert!(!state.is_loading);
        assert_eq!(state.pagination.map(|p| p.page), Some(2));
    }
}
