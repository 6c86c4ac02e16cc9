//! Store trait and error types

use crate::checkpoint::{CommitBatch, CommitOutcome, CrawlState, RunRecord};
use crate::state::{TargetId, TargetSeed, TargetState};
use thiserror::Error;

/// Errors that can occur during checkpoint operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Target not found: {0}")]
    TargetNotFound(i64),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for checkpoint operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Trait for checkpoint store backends
///
/// The store is the single durable source of truth for crawl progress.
/// `commit` is all-or-nothing: a crash between its writes must never leave
/// a target marked done with its records missing, or vice versa.
pub trait Store {
    // ===== Run Management =====

    /// Creates a new crawl run and returns its id
    fn create_run(&mut self, config_hash: &str) -> StoreResult<i64>;

    /// Gets the most recent run, if any
    fn get_latest_run(&self) -> StoreResult<Option<RunRecord>>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> StoreResult<()>;

    /// Marks a run as interrupted (cancellation or crash cleanup)
    fn interrupt_run(&mut self, run_id: i64) -> StoreResult<()>;

    // ===== Target Management =====

    /// Inserts a seed target unless its URL is already known
    ///
    /// Returns the freshly inserted target, or None if the URL exists.
    fn insert_seed(&mut self, seed: &TargetSeed, run_id: i64) -> StoreResult<Option<crate::state::Target>>;

    /// Records that a target's fetch has started
    fn mark_in_flight(&mut self, target_id: TargetId) -> StoreResult<()>;

    // ===== Checkpoint Commit =====

    /// Atomically applies one worker cycle's results
    ///
    /// State transitions, new records, and newly discovered targets are
    /// written in a single transaction. Records whose fingerprint already
    /// exists and targets whose URL already exists are skipped, not errors.
    fn commit(
        &mut self,
        run_id: i64,
        source: TargetId,
        batch: CommitBatch,
    ) -> StoreResult<CommitOutcome>;

    /// Loads the last durable crawl state
    ///
    /// Targets found `in_flight` belong to a crashed run and are returned
    /// demoted to `pending` so the scheduler fetches them again.
    fn load(&self) -> StoreResult<CrawlState>;

    // ===== Statistics =====

    /// Counts targets in a given state
    fn count_targets_by_state(&self, state: TargetState) -> StoreResult<u64>;

    /// Total number of targets
    fn count_targets(&self) -> StoreResult<u64>;

    /// Total number of records
    fn count_records(&self) -> StoreResult<u64>;

    /// Number of records carrying extracted body text
    fn count_records_with_body(&self) -> StoreResult<u64>;
}
