//! Tick-driven debouncer
//!
//! Values are pushed with the instant they arrived and released once no new
//! value has arrived for the quiet period. The UI loop drives it from its
//! regular tick, so nothing here spawns timers.

use std::time::{Duration, Instant};

/// Coalesces a burst of values into the last one
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    quiet: Duration,
    pending: Option<(T, Instant)>,
}

impl<T> Debouncer<T> {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            pending: None,
        }
    }

    /// Replace the pending value and restart the quiet period
    pub fn push(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now));
    }

    /// Take the pending value if the quiet period has elapsed
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let due = self
            .pending
            .as_ref()
            .is_some_and(|(_, at)| now.saturating_duration_since(*at) >= self.quiet);
        if due {
            self.pending.take().map(|(value, _)| value)
        } else {
            None
        }
    }

    /// Take the pending value regardless of the quiet period
    pub fn flush(&mut self) -> Option<T> {
        self.pending.take().map(|(value, _)| value)
    }

    /// Drop the pending value without delivering it
    pub fn cancel(&mut self) {
        self.pending = None;
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
