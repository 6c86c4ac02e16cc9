//! Target definitions for tracking crawl work
//!
//! A target is one unit of crawl work: a URL plus the metadata the scheduler
//! and checkpoint store need. Targets are never deleted, only
//! state-transitioned, so the checkpoint preserves full crawl history.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Database id of a target row
pub type TargetId = i64;

/// What kind of document a target points at, and what its extraction yields
///
/// The variants mirror the three document shapes the platform serves: the
/// account-search response, one page of the paginated article list, and an
/// article content page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TargetKind {
    /// Resolve an account name to its platform id via the search endpoint
    AccountSearch { account: String },

    /// One page of an account's article list (`begin = page * page_size`)
    ArticleList {
        account: String,
        fakeid: String,
        page: u32,
    },

    /// One article content page
    Article { account: String },
}

impl TargetKind {
    /// Priority class for the scheduler; lower values dispatch first.
    ///
    /// Search and list pages outrank articles so discovery stays ahead of
    /// content fetching.
    pub fn priority(&self) -> u32 {
        match self {
            Self::AccountSearch { .. } => 0,
            Self::ArticleList { .. } => 1,
            Self::Article { .. } => 2,
        }
    }

    /// The account this target belongs to
    pub fn account(&self) -> &str {
        match self {
            Self::AccountSearch { account }
            | Self::ArticleList { account, .. }
            | Self::Article { account } => account,
        }
    }

    /// Serializes the kind for the `targets.kind` column
    pub fn to_db_string(&self) -> String {
        serde_json::to_string(self).expect("target kind serializes")
    }

    /// Parses a kind from its database representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}

/// Represents the current state of a target in the crawl process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetState {
    /// Waiting in the queue to be fetched
    Pending,

    /// Currently being fetched by a worker
    InFlight,

    /// Fetched and extracted; terminal
    Done,

    /// Retries exhausted or failure was non-retryable; terminal
    Failed,

    /// Failed retryably; re-enters the queue after its backoff deadline
    Deferred,
}

impl TargetState {
    /// Returns true if no further processing will happen for this target
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Deferred => "deferred",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_flight" => Some(Self::InFlight),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            "deferred" => Some(Self::Deferred),
            _ => None,
        }
    }

    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Pending,
            Self::InFlight,
            Self::Done,
            Self::Failed,
            Self::Deferred,
        ]
    }
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// One unit of crawl work
#[derive(Debug, Clone)]
pub struct Target {
    /// Database id
    pub id: TargetId,

    /// The URL to fetch
    pub url: String,

    /// Host component of the URL, for per-host rate limiting
    pub host: String,

    /// Document kind; selects the extractor
    pub kind: TargetKind,

    /// Priority class (lower dispatches first)
    pub priority: u32,

    /// Current state
    pub state: TargetState,

    /// Fetch attempts that failed retryably so far
    pub retry_count: u32,

    /// Target that discovered this one; None for seeds
    pub discovered_from: Option<TargetId>,
}

/// A discovered target that has not been persisted yet
///
/// Produced by extraction; the checkpoint store assigns ids and drops
/// URLs it has already seen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSeed {
    pub url: String,
    pub kind: TargetKind,
}

impl TargetSeed {
    pub fn new(url: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            url: url.into(),
            kind,
        }
    }

    /// Host component of the seed URL, if it parses
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
    }
}
