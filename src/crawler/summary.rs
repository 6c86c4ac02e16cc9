//! End-of-run summary
//!
//! A completed or cancelled run reports how far the crawl got: target
//! counts per state and record totals, read back from the checkpoint store.

use crate::checkpoint::{Store, StoreResult};
use crate::state::TargetState;

/// Counts describing the state of the crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub targets_total: u64,
    pub done: u64,
    pub failed: u64,
    pub deferred: u64,
    pub pending: u64,
    pub records: u64,
    pub records_with_body: u64,
}

/// Builds a summary from the checkpoint store
pub fn load_summary(store: &dyn Store) -> StoreResult<RunSummary> {
    Ok(RunSummary {
        targets_total: store.count_targets()?,
        done: store.count_targets_by_state(TargetState::Done)?,
        failed: store.count_targets_by_state(TargetState::Failed)?,
        deferred: store.count_targets_by_state(TargetState::Deferred)?,
        pending: store.count_targets_by_state(TargetState::Pending)?,
        records: store.count_records()?,
        records_with_body: store.count_records_with_body()?,
    })
}

/// Prints a summary to stdout
pub fn print_summary(summary: &RunSummary) {
    println!("=== Harvest Summary ===");
    println!(
        "Targets: {} total ({} done, {} failed, {} deferred, {} pending)",
        summary.targets_total, summary.done, summary.failed, summary.deferred, summary.pending
    );
    println!(
        "Records: {} ({} with extracted content)",
        summary.records, summary.records_with_body
    );
}
