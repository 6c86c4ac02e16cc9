use crate::config::CrawlerConfig;
use std::time::{Duration, Instant};

/// Tracks the state of a host during crawling
///
/// This structure maintains per-host information needed for rate limiting:
/// spacing between requests, the number of in-flight fetches, and any pause
/// imposed after the host rate-limited us.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    /// Timestamp of the last dispatched request to this host
    pub last_request_time: Option<Instant>,

    /// Fetches to this host currently in flight
    pub in_flight: u32,

    /// Requests to this host in the current run
    pub request_count: u64,

    /// No dispatches to this host before this deadline (set on HTTP 429)
    pub paused_until: Option<Instant>,
}

impl HostState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks whether a request may be dispatched to this host
    ///
    /// Enforces the rate-limit pause, the per-host in-flight cap, and the
    /// minimum spacing between requests. Takes `now` explicitly so tests
    /// can inject time.
    pub fn can_dispatch(&self, config: &CrawlerConfig, now: Instant) -> bool {
        if let Some(until) = self.paused_until {
            if now < until {
                return false;
            }
        }

        if self.in_flight >= config.max_host_in_flight {
            return false;
        }

        if let Some(last) = self.last_request_time {
            let min_delay = Duration::from_millis(config.min_host_interval);
            if now.duration_since(last) < min_delay {
                return false;
            }
        }

        true
    }

    /// Calculates the time until this host is ready for another dispatch
    ///
    /// Returns None if a request can be dispatched now, or if the host is
    /// only blocked on its in-flight cap (readiness then depends on a
    /// completion, not on the clock).
    pub fn time_until_ready(&self, config: &CrawlerConfig, now: Instant) -> Option<Duration> {
        let mut wait = Duration::ZERO;

        if let Some(until) = self.paused_until {
            if now < until {
                wait = until - now;
            }
        }

        if let Some(last) = self.last_request_time {
            let min_delay = Duration::from_millis(config.min_host_interval);
            let elapsed = now.duration_since(last);
            if elapsed < min_delay {
                wait = wait.max(min_delay - elapsed);
            }
        }

        if wait.is_zero() {
            None
        } else {
            Some(wait)
        }
    }

    /// Records that a request was dispatched to this host
    pub fn record_dispatch(&mut self, now: Instant) {
        self.last_request_time = Some(now);
        self.in_flight += 1;
        self.request_count += 1;
    }

    /// Records that an in-flight request to this host finished
    pub fn record_completion(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Pauses dispatches to this host until the given deadline
    ///
    /// A later existing pause is kept.
    pub fn pause_until(&mut self, until: Instant) {
        self.paused_until = Some(match self.paused_until {
            Some(existing) => existing.max(until),
            None => until,
        });
    }
}
