//! mp-harvest: a resumable article crawler for WeChat official accounts
//!
//! This crate implements a rate-limited crawler that paginates an account's
//! article-list API, fetches the discovered article pages, extracts normalized
//! article records, and checkpoints all progress in SQLite so an interrupted
//! run resumes without re-fetching completed work.

pub mod checkpoint;
pub mod config;
pub mod crawler;
pub mod extract;
pub mod scheduler;
pub mod state;
pub mod transport;

use thiserror::Error;

/// Main error type for mp-harvest operations
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store error: {0}")]
    Store(#[from] checkpoint::StoreError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
///
/// These abort the run at startup with a non-zero exit code, before any
/// worker is spawned.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid credentials file: {0}")]
    InvalidCredentials(String),
}

/// Result type alias for mp-harvest operations
pub type Result<T> = std::result::Result<T, HarvestError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use state::{Target, TargetKind, TargetState};
