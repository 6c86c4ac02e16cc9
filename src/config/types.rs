use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Main configuration structure for mp-harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub session: SessionConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default, rename = "account")]
    pub accounts: Vec<AccountEntry>,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Number of parallel fetch workers
    pub workers: u32,

    /// Maximum retry attempts for a target before it is marked failed
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// Minimum time between any two requests, globally (milliseconds)
    #[serde(rename = "min-request-interval")]
    pub min_request_interval: u64,

    /// Minimum time between requests to the same host (milliseconds)
    #[serde(rename = "min-host-interval")]
    pub min_host_interval: u64,

    /// Maximum concurrent in-flight fetches per host
    #[serde(rename = "max-host-in-flight")]
    pub max_host_in_flight: u32,

    /// First retry delay (milliseconds); doubles per attempt with jitter
    #[serde(rename = "backoff-base")]
    pub backoff_base: u64,

    /// Upper bound on any computed backoff delay (seconds)
    #[serde(rename = "backoff-cap")]
    pub backoff_cap: u64,

    /// Backoff applied on rate limiting when the server gives no hint (seconds)
    #[serde(rename = "default-rate-limit-backoff")]
    pub default_rate_limit_backoff: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout")]
    pub request_timeout: u64,
}

/// Session and endpoint configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Path to the TOML credentials file holding token and cookie
    #[serde(rename = "credentials-path")]
    pub credentials_path: String,

    /// Base URL of the platform API (list and search endpoints)
    #[serde(rename = "api-base")]
    pub api_base: String,

    /// User-Agent header sent with every request
    #[serde(rename = "user-agent")]
    pub user_agent: String,
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite checkpoint database
    #[serde(rename = "database-path")]
    pub database_path: String,
}

/// Extraction tuning
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractionConfig {
    /// CSS selector for article body text
    #[serde(rename = "content-selector", default = "default_content_selector")]
    pub content_selector: String,

    /// Articles per list page (the platform serves 5)
    #[serde(rename = "list-page-size", default = "default_list_page_size")]
    pub list_page_size: u32,
}

fn default_content_selector() -> String {
    "p".to_string()
}

fn default_list_page_size() -> u32 {
    5
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            content_selector: default_content_selector(),
            list_page_size: default_list_page_size(),
        }
    }
}

/// Publication time window; articles outside it are not fetched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindowConfig {
    /// Oldest publication time to harvest (inclusive)
    pub since: Option<DateTime<Utc>>,

    /// Newest publication time to harvest (inclusive)
    pub until: Option<DateTime<Utc>>,
}

impl WindowConfig {
    /// Whether a publication timestamp falls inside the window
    pub fn contains(&self, published_at: DateTime<Utc>) -> bool {
        if let Some(since) = self.since {
            if published_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if published_at > until {
                return false;
            }
        }
        true
    }

    /// Whether a timestamp is older than the window's lower bound
    pub fn is_before(&self, published_at: DateTime<Utc>) -> bool {
        matches!(self.since, Some(since) if published_at < since)
    }
}

/// One official account to harvest
#[derive(Debug, Clone, Deserialize)]
pub struct AccountEntry {
    /// Display name, used to search for the account when fakeid is absent
    pub name: String,

    /// Platform-internal account id; resolved via the search endpoint if unset
    pub fakeid: Option<String>,
}
