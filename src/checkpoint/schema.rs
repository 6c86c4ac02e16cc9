//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the checkpoint
//! database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL
);

-- All crawl targets; rows are state-transitioned, never deleted
CREATE TABLE IF NOT EXISTS targets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL UNIQUE,
    host TEXT NOT NULL,
    kind TEXT NOT NULL,
    priority INTEGER NOT NULL,
    state TEXT NOT NULL,
    retry_count INTEGER NOT NULL DEFAULT 0,
    discovered_from INTEGER REFERENCES targets(id),
    discovered_run INTEGER NOT NULL REFERENCES runs(id),
    discovered_at TEXT NOT NULL,
    visited_at TEXT,
    error_message TEXT
);

CREATE INDEX IF NOT EXISTS idx_targets_state ON targets(state);
CREATE INDEX IF NOT EXISTS idx_targets_host ON targets(host);

-- Extracted records, deduplicated by content fingerprint
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    fingerprint TEXT NOT NULL UNIQUE,
    target_id INTEGER NOT NULL REFERENCES targets(id),
    account TEXT NOT NULL,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    published_at TEXT,
    body TEXT,
    extracted_run INTEGER NOT NULL REFERENCES runs(id),
    extracted_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_account ON records(account);
CREATE INDEX IF NOT EXISTS idx_records_url ON records(url);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
