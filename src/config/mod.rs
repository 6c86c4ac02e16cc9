//! Configuration module for mp-harvest
//!
//! This module handles loading, parsing, and validating TOML configuration
//! files. Validation failures are fatal and stop the run before any worker
//! starts.

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    AccountEntry, Config, CrawlerConfig, ExtractionConfig, OutputConfig, SessionConfig,
    WindowConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash};
