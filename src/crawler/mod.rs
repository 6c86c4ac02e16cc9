//! Crawl orchestration
//!
//! This module contains the worker pool and the crawl loop that ties the
//! scheduler, transport, extraction, and checkpoint store together.

mod coordinator;
mod summary;

pub use coordinator::{run_crawl, Coordinator, CrawlContext};
pub use summary::{load_summary, print_summary, RunSummary};

use crate::config::Config;
use crate::HarvestError;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open (or create) the checkpoint database
/// 2. Resume an interrupted run or start a new one
/// 3. Seed the configured accounts
/// 4. Drive the worker pool until the frontier drains or ctrl-c fires
/// 5. Flush the checkpoint and emit the run summary
pub async fn crawl(
    config: Config,
    config_hash: &str,
    fresh: bool,
) -> Result<RunSummary, HarvestError> {
    run_crawl(config, config_hash, fresh).await
}
