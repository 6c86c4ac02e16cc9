//! Retry backoff policy
//!
//! Delays grow exponentially with the retry count and are jittered so that
//! targets deferred at the same moment do not return in a thundering herd.

use crate::config::CrawlerConfig;
use rand::Rng;
use std::time::Duration;

/// Computes the delay before the next retry attempt
///
/// `retries` is the number of failed attempts so far. The raw delay is
/// `backoff-base * 2^retries`, capped at `backoff-cap`; the returned value
/// is drawn uniformly from the upper half of that range (equal jitter).
pub fn backoff_delay(config: &CrawlerConfig, retries: u32) -> Duration {
    let raw = raw_delay(config, retries);
    let millis = raw.as_millis() as u64;
    if millis < 2 {
        return raw;
    }
    let half = millis / 2;
    Duration::from_millis(half + rand::thread_rng().gen_range(0..=millis - half))
}

/// The un-jittered exponential delay
fn raw_delay(config: &CrawlerConfig, retries: u32) -> Duration {
    let cap = Duration::from_secs(config.backoff_cap);
    let multiplier = 2u64.saturating_pow(retries);
    Duration::from_millis(config.backoff_base.saturating_mul(multiplier)).min(cap)
}
