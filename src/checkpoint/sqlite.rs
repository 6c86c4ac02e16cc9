//! SQLite checkpoint store implementation

use crate::checkpoint::schema::initialize_schema;
use crate::checkpoint::traits::{Store, StoreError, StoreResult};
use crate::checkpoint::{CommitBatch, CommitOutcome, CrawlState, RunRecord, RunStatus};
use crate::state::{Target, TargetId, TargetKind, TargetSeed, TargetState};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

/// SQLite checkpoint backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens or creates the checkpoint database at the given path
    pub fn new(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;

        // Configure SQLite for durability under concurrent commits
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn row_to_target(row: &rusqlite::Row<'_>) -> rusqlite::Result<(Target, String)> {
        let kind_raw: String = row.get(3)?;
        let state_raw: String = row.get(5)?;
        let target = Target {
            id: row.get(0)?,
            url: row.get(1)?,
            host: row.get(2)?,
            // Placeholder; the caller parses kind_raw and rejects bad rows
            kind: TargetKind::Article {
                account: String::new(),
            },
            priority: row.get(4)?,
            state: TargetState::from_db_string(&state_raw).unwrap_or(TargetState::Failed),
            retry_count: row.get(6)?,
            discovered_from: row.get(7)?,
        };
        Ok((target, kind_raw))
    }
}

const TARGET_COLUMNS: &str =
    "id, url, host, kind, priority, state, retry_count, discovered_from";

impl Store for SqliteStore {
    // ===== Run Management =====

    fn create_run(&mut self, config_hash: &str) -> StoreResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn get_latest_run(&self) -> StoreResult<Option<RunRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, config_hash, status
             FROM runs ORDER BY id DESC LIMIT 1",
        )?;

        let run = stmt
            .query_row([], |row| {
                Ok(RunRecord {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    config_hash: row.get(3)?,
                    status: RunStatus::from_db_string(&row.get::<_, String>(4)?)
                        .unwrap_or(RunStatus::Running),
                })
            })
            .optional()?;

        Ok(run)
    }

    fn complete_run(&mut self, run_id: i64) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![RunStatus::Completed.to_db_string(), now, run_id],
        )?;
        Ok(())
    }

    fn interrupt_run(&mut self, run_id: i64) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2 WHERE id = ?3",
            params![RunStatus::Interrupted.to_db_string(), now, run_id],
        )?;
        Ok(())
    }

    // ===== Target Management =====

    fn insert_seed(&mut self, seed: &TargetSeed, run_id: i64) -> StoreResult<Option<Target>> {
        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT id FROM targets WHERE url = ?1",
                params![seed.url],
                |row| row.get(0),
            )
            .optional()?;

        if existing.is_some() {
            return Ok(None);
        }

        let host = match seed.host() {
            Some(h) => h,
            None => {
                return Err(StoreError::ConstraintViolation(format!(
                    "seed URL has no host: {}",
                    seed.url
                )))
            }
        };

        let now = Utc::now().to_rfc3339();
        let priority = seed.kind.priority();
        self.conn.execute(
            "INSERT INTO targets (url, host, kind, priority, state, retry_count,
             discovered_from, discovered_run, discovered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, NULL, ?6, ?7)",
            params![
                seed.url,
                host,
                seed.kind.to_db_string(),
                priority,
                TargetState::Pending.to_db_string(),
                run_id,
                now
            ],
        )?;

        Ok(Some(Target {
            id: self.conn.last_insert_rowid(),
            url: seed.url.clone(),
            host,
            kind: seed.kind.clone(),
            priority,
            state: TargetState::Pending,
            retry_count: 0,
            discovered_from: None,
        }))
    }

    fn mark_in_flight(&mut self, target_id: TargetId) -> StoreResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE targets SET state = ?1, visited_at = ?2 WHERE id = ?3",
            params![TargetState::InFlight.to_db_string(), now, target_id],
        )?;
        if updated == 0 {
            return Err(StoreError::TargetNotFound(target_id));
        }
        Ok(())
    }

    // ===== Checkpoint Commit =====

    fn commit(
        &mut self,
        run_id: i64,
        source: TargetId,
        batch: CommitBatch,
    ) -> StoreResult<CommitOutcome> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut outcome = CommitOutcome::default();

        for transition in &batch.transitions {
            tx.execute(
                "UPDATE targets SET state = ?1, retry_count = ?2, visited_at = ?3,
                 error_message = ?4 WHERE id = ?5",
                params![
                    transition.state.to_db_string(),
                    transition.retry_count,
                    now,
                    transition.error,
                    transition.target_id
                ],
            )?;
        }

        for record in &batch.records {
            if record.fingerprint.is_empty() {
                // Aborting here drops the transaction and rolls back every
                // write above; the store never holds a half-applied batch.
                return Err(StoreError::ConstraintViolation(format!(
                    "record '{}' has an empty fingerprint",
                    record.title
                )));
            }

            let inserted = tx.execute(
                "INSERT OR IGNORE INTO records
                 (fingerprint, target_id, account, title, url, published_at, body,
                  extracted_run, extracted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.fingerprint,
                    source,
                    record.account,
                    record.title,
                    record.url,
                    record.published_at.map(|t| t.to_rfc3339()),
                    record.body,
                    run_id,
                    now
                ],
            )?;

            if inserted > 0 {
                outcome.new_records += 1;
            } else {
                outcome.duplicate_records += 1;
            }
        }

        for seed in &batch.discovered {
            let existing: Option<i64> = tx
                .query_row(
                    "SELECT id FROM targets WHERE url = ?1",
                    params![seed.url],
                    |row| row.get(0),
                )
                .optional()?;

            if existing.is_some() {
                continue;
            }

            let host = match seed.host() {
                Some(h) => h,
                None => {
                    tracing::warn!(url = %seed.url, "Discovered target has no host, skipping");
                    continue;
                }
            };

            let priority = seed.kind.priority();
            tx.execute(
                "INSERT INTO targets (url, host, kind, priority, state, retry_count,
                 discovered_from, discovered_run, discovered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8)",
                params![
                    seed.url,
                    host,
                    seed.kind.to_db_string(),
                    priority,
                    TargetState::Pending.to_db_string(),
                    source,
                    run_id,
                    now
                ],
            )?;

            outcome.inserted_targets.push(Target {
                id: tx.last_insert_rowid(),
                url: seed.url.clone(),
                host,
                kind: seed.kind.clone(),
                priority,
                state: TargetState::Pending,
                retry_count: 0,
                discovered_from: Some(source),
            });
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn load(&self) -> StoreResult<CrawlState> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {} FROM targets ORDER BY id", TARGET_COLUMNS))?;

        let rows = stmt.query_map([], SqliteStore::row_to_target)?;

        let mut targets = Vec::new();
        for row in rows {
            let (mut target, kind_raw) = row?;

            target.kind = match TargetKind::from_db_string(&kind_raw) {
                Some(kind) => kind,
                None => {
                    tracing::warn!(
                        url = %target.url,
                        "Skipping target with unreadable kind '{}'", kind_raw
                    );
                    continue;
                }
            };

            // A crashed run leaves in_flight rows behind; they were never
            // committed as done, so they must be fetched again.
            if target.state == TargetState::InFlight {
                target.state = TargetState::Pending;
            }

            targets.push(target);
        }

        let mut stmt = self.conn.prepare("SELECT fingerprint FROM records")?;
        let fingerprints = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CrawlState {
            targets,
            fingerprints,
        })
    }

    // ===== Statistics =====

    fn count_targets_by_state(&self, state: TargetState) -> StoreResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM targets WHERE state = ?1",
            params![state.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn count_targets(&self) -> StoreResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM targets", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_records(&self) -> StoreResult<u64> {
        let count: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn count_records_with_body(&self) -> StoreResult<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE body IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
