//! Fetch scheduler
//!
//! The scheduler decides what to fetch next and when. It maintains:
//! - A priority queue over pending targets, FIFO within a priority class
//! - Global pacing (minimum interval between any two dispatches) and
//!   per-host pacing and in-flight caps
//! - The retry policy: exponential backoff with jitter, honoring a server
//!   backoff hint when one was given, up to the configured retry cap
//! - The in-flight set, guaranteeing at most one concurrent fetch per target
//!
//! All time-dependent decisions take an explicit `Instant` so tests can
//! inject time. The scheduler never sleeps; it tells the caller how long to
//! wait instead.

mod backoff;

pub use backoff::backoff_delay;

use crate::config::CrawlerConfig;
use crate::state::{HostState, Target, TargetId, TargetState};
use crate::transport::FailureKind;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::{Duration, Instant};

/// Floor for Wait durations so pollers do not spin
const MIN_WAIT: Duration = Duration::from_millis(10);

/// Wait used when the queue is empty but fetches are still in flight
const IN_FLIGHT_WAIT: Duration = Duration::from_millis(50);

/// A target queued for dispatch
#[derive(Debug, Clone)]
struct QueuedTarget {
    target: Target,

    /// Insertion sequence; preserves FIFO order within a priority class
    seq: u64,

    /// Dispatch no earlier than this (deferred targets)
    not_before: Option<Instant>,
}

// Lower priority values and lower sequence numbers come out first.
impl Ord for QueuedTarget {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .target
            .priority
            .cmp(&self.target.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for QueuedTarget {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedTarget {
    fn eq(&self, other: &Self) -> bool {
        self.target.priority == other.target.priority && self.seq == other.seq
    }
}

impl Eq for QueuedTarget {}

/// What the scheduler wants the calling worker to do
#[derive(Debug, Clone)]
pub enum Dispatch {
    /// Fetch this target now
    Fetch(Target),

    /// Nothing is ready; check back after this long
    Wait(Duration),

    /// No pending work and nothing in flight; the crawl is drained
    Exhausted,
}

/// Outcome of one fetch attempt, reported exactly once per dispatch
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Fetch and extraction succeeded and the commit is durable
    Success,

    /// Fetch or extraction failed with the given classification
    Failure(FailureKind),
}

/// The transition the scheduler applied for a report
///
/// The caller persists this to the checkpoint store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportOutcome {
    /// Target is done
    Completed,

    /// Target was re-queued; it will not dispatch before the delay elapses
    Deferred { retry_count: u32, delay: Duration },

    /// Retries exhausted or failure was terminal
    Failed { retry_count: u32 },
}

/// Scheduler over the crawl frontier
pub struct Scheduler {
    config: CrawlerConfig,
    queue: BinaryHeap<QueuedTarget>,
    in_flight: HashMap<TargetId, Target>,
    host_states: HashMap<String, HostState>,
    known_urls: HashSet<String>,
    last_dispatch: Option<Instant>,
    seq: u64,
    completed: u64,
    failed: u64,
}

impl Scheduler {
    pub fn new(config: CrawlerConfig) -> Self {
        Self {
            config,
            queue: BinaryHeap::new(),
            in_flight: HashMap::new(),
            host_states: HashMap::new(),
            known_urls: HashSet::new(),
            last_dispatch: None,
            seq: 0,
            completed: 0,
            failed: 0,
        }
    }

    /// Adds a pending target to the queue
    ///
    /// Returns false if the URL is already known to this scheduler (queued,
    /// in flight, or previously reported), in which case nothing is added.
    pub fn enqueue(&mut self, target: Target) -> bool {
        if !self.known_urls.insert(target.url.clone()) {
            return false;
        }
        self.push(target, None);
        true
    }

    /// Registers a URL as known without queuing it
    ///
    /// Used when loading a checkpoint: terminal targets must not be fetched
    /// again, but they still occupy the duplicate-detection set.
    pub fn mark_known(&mut self, url: &str) {
        self.known_urls.insert(url.to_string());
    }

    fn push(&mut self, target: Target, not_before: Option<Instant>) {
        let seq = self.seq;
        self.seq += 1;
        self.queue.push(QueuedTarget {
            target,
            seq,
            not_before,
        });
    }

    /// Picks the next action for a worker
    ///
    /// Scans the queue in priority order for a target whose deferral
    /// deadline has passed and whose host is ready, under global pacing.
    pub fn next(&mut self, now: Instant) -> Dispatch {
        if self.queue.is_empty() {
            if self.in_flight.is_empty() {
                return Dispatch::Exhausted;
            }
            // In-flight fetches may still discover new targets
            return Dispatch::Wait(IN_FLIGHT_WAIT);
        }

        // Global pacing gate
        if let Some(last) = self.last_dispatch {
            let min_interval = Duration::from_millis(self.config.min_request_interval);
            let elapsed = now.duration_since(last);
            if elapsed < min_interval {
                return Dispatch::Wait((min_interval - elapsed).max(MIN_WAIT));
            }
        }

        let mut not_ready = Vec::new();
        let mut found = None;

        while let Some(queued) = self.queue.pop() {
            if self.is_ready(&queued, now) {
                found = Some(queued);
                break;
            }
            not_ready.push(queued);
        }

        for queued in not_ready {
            self.queue.push(queued);
        }

        match found {
            Some(queued) => {
                let mut target = queued.target;
                target.state = TargetState::InFlight;

                self.host_states
                    .entry(target.host.clone())
                    .or_default()
                    .record_dispatch(now);
                self.last_dispatch = Some(now);
                self.in_flight.insert(target.id, target.clone());

                tracing::debug!(url = %target.url, retry = target.retry_count, "Dispatching target");
                Dispatch::Fetch(target)
            }
            None => Dispatch::Wait(self.minimum_wait(now)),
        }
    }

    fn is_ready(&self, queued: &QueuedTarget, now: Instant) -> bool {
        if let Some(not_before) = queued.not_before {
            if now < not_before {
                return false;
            }
        }

        match self.host_states.get(&queued.target.host) {
            Some(state) => state.can_dispatch(&self.config, now),
            None => true,
        }
    }

    /// Shortest time until any queued target could become ready
    fn minimum_wait(&self, now: Instant) -> Duration {
        let mut min_wait = Duration::from_millis(100);

        for queued in self.queue.iter() {
            let mut wait = Duration::ZERO;

            if let Some(not_before) = queued.not_before {
                if now < not_before {
                    wait = not_before - now;
                }
            }

            if let Some(state) = self.host_states.get(&queued.target.host) {
                if let Some(host_wait) = state.time_until_ready(&self.config, now) {
                    wait = wait.max(host_wait);
                }
            }

            if wait < min_wait {
                min_wait = wait;
            }
        }

        min_wait.max(MIN_WAIT)
    }

    /// Reports the outcome of a dispatched fetch
    ///
    /// Applies the retry policy and returns the transition for the caller
    /// to persist. Reporting an id that is not in flight is a no-op that
    /// returns None, so a double report cannot corrupt the queue.
    pub fn report(&mut self, id: TargetId, outcome: Outcome, now: Instant) -> Option<ReportOutcome> {
        let mut target = self.in_flight.remove(&id)?;

        if let Some(state) = self.host_states.get_mut(&target.host) {
            state.record_completion();
        }

        match outcome {
            Outcome::Success => {
                self.completed += 1;
                Some(ReportOutcome::Completed)
            }
            Outcome::Failure(kind) => {
                // A rate-limited response pauses the whole host, not just
                // this target.
                if let FailureKind::RateLimited { retry_after } = &kind {
                    let pause = retry_after
                        .unwrap_or(Duration::from_secs(self.config.default_rate_limit_backoff));
                    if let Some(state) = self.host_states.get_mut(&target.host) {
                        state.pause_until(now + pause);
                    }
                }

                if kind.is_retryable() && target.retry_count < self.config.max_retries {
                    let delay = kind
                        .backoff_hint()
                        .unwrap_or_else(|| self.failure_delay(&kind, target.retry_count));

                    target.retry_count += 1;
                    target.state = TargetState::Deferred;
                    let retry_count = target.retry_count;

                    tracing::debug!(
                        url = %target.url,
                        retry = retry_count,
                        ?delay,
                        "Deferring target after {}", kind
                    );
                    self.push(target, Some(now + delay));

                    Some(ReportOutcome::Deferred { retry_count, delay })
                } else {
                    self.failed += 1;
                    tracing::warn!(
                        url = %target.url,
                        retries = target.retry_count,
                        "Target failed terminally: {}", kind
                    );
                    Some(ReportOutcome::Failed {
                        retry_count: target.retry_count,
                    })
                }
            }
        }
    }

    /// Delay for a retryable failure without a server hint
    fn failure_delay(&self, kind: &FailureKind, retries: u32) -> Duration {
        match kind {
            FailureKind::RateLimited { .. } => {
                Duration::from_secs(self.config.default_rate_limit_backoff)
            }
            _ => backoff_delay(&self.config, retries),
        }
    }

    /// Number of targets waiting in the queue
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Number of fetches currently in flight
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Targets completed in this run
    pub fn completed(&self) -> u64 {
        self.completed
    }

    /// Targets terminally failed in this run
    pub fn failed(&self) -> u64 {
        self.failed
    }

    /// True when no work remains: queue empty and nothing in flight
    pub fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.in_flight.is_empty()
    }
}
