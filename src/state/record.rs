//! Normalized extracted records
//!
//! A record is one extracted article entity. Records are deduplicated by a
//! stable SHA-256 content fingerprint: within a run through the in-memory
//! dedup index, across runs through the UNIQUE constraint in the store.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// A normalized extracted article
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Stable content fingerprint (hex SHA-256)
    pub fingerprint: String,

    /// Account the article belongs to
    pub account: String,

    /// Article title
    pub title: String,

    /// Canonical article URL
    pub url: String,

    /// Publication time as reported by the platform
    pub published_at: Option<DateTime<Utc>>,

    /// Extracted body text; None for list-stub records awaiting content
    pub body: Option<String>,
}

impl Record {
    /// Builds a record, computing its fingerprint from the identifying fields
    pub fn new(
        account: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        published_at: Option<DateTime<Utc>>,
        body: Option<String>,
    ) -> Self {
        let account = account.into();
        let title = title.into();
        let url = url.into();
        let fingerprint = fingerprint(&account, &title, &url, body.as_deref());
        Self {
            fingerprint,
            account,
            title,
            url,
            published_at,
            body,
        }
    }
}

/// Computes the content fingerprint for a record
///
/// Fields are length-prefixed before hashing so that no concatenation of
/// different field values can collide.
pub fn fingerprint(account: &str, title: &str, url: &str, body: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    for part in [account, title, url, body.unwrap_or("")] {
        hasher.update((part.len() as u64).to_le_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}

/// In-memory fingerprint index for within-run deduplication
///
/// Loaded from the checkpoint store at startup so resumed runs do not
/// re-emit records already persisted.
#[derive(Debug, Default)]
pub struct DedupIndex {
    seen: std::collections::HashSet<String>,
}

impl DedupIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the index from fingerprints already in the store
    pub fn from_fingerprints(fingerprints: impl IntoIterator<Item = String>) -> Self {
        Self {
            seen: fingerprints.into_iter().collect(),
        }
    }

    /// Returns true if the fingerprint was new and is now registered
    pub fn insert(&mut self, fingerprint: &str) -> bool {
        self.seen.insert(fingerprint.to_string())
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.seen.contains(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
