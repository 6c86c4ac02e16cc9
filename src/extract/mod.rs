//! Extraction pipeline
//!
//! Extraction is a pure function of one fetch result plus configuration:
//! no network, no filesystem. The [`Extractor`] enum is a closed set of
//! capabilities selected by the target's kind; each variant implements the
//! same contract and returns the records it produced plus any newly
//! discovered targets. Malformed input yields a structured [`ParseError`],
//! never a panic; the caller decides whether the underlying fetch is
//! retried.

mod article;
mod list;

pub use article::ArticleExtractor;
pub use list::{list_url, search_url, ListExtractor, SearchExtractor};

use crate::config::Config;
use crate::state::{Record, TargetKind, TargetSeed};
use crate::transport::FetchResult;
use thiserror::Error;

/// Structured parse failure; the target stays retry-eligible
#[derive(Debug, Clone, Error)]
pub enum ParseError {
    #[error("invalid JSON: {0}")]
    Json(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("invalid content selector: {0}")]
    Selector(String),

    #[error("document has no extractable content")]
    EmptyDocument,
}

/// Output of one extraction: records in document order plus discovered targets
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub records: Vec<Record>,
    pub discovered: Vec<TargetSeed>,
}

/// Closed set of extraction capabilities, selected by target kind
#[derive(Debug, Clone)]
pub enum Extractor {
    AccountSearch(SearchExtractor),
    ArticleList(ListExtractor),
    Article(ArticleExtractor),
}

impl Extractor {
    /// Selects the extractor for a target kind under the given configuration
    pub fn for_kind(config: &Config, kind: &TargetKind) -> Self {
        match kind {
            TargetKind::AccountSearch { account } => Self::AccountSearch(SearchExtractor {
                account: account.clone(),
                api_base: config.session.api_base.clone(),
                page_size: config.extraction.list_page_size,
            }),
            TargetKind::ArticleList {
                account,
                fakeid,
                page,
            } => Self::ArticleList(ListExtractor {
                account: account.clone(),
                fakeid: fakeid.clone(),
                page: *page,
                api_base: config.session.api_base.clone(),
                page_size: config.extraction.list_page_size,
                window: config.window.clone(),
            }),
            TargetKind::Article { account } => Self::Article(ArticleExtractor {
                account: account.clone(),
                content_selector: config.extraction.content_selector.clone(),
            }),
        }
    }

    /// Extracts records and discovered targets from a fetch result
    ///
    /// Records produced from the same document keep their document order;
    /// duplicate fingerprints within the document are dropped.
    pub fn extract(&self, fetch: &FetchResult) -> Result<Extraction, ParseError> {
        let mut extraction = match self {
            Self::AccountSearch(e) => e.extract(&fetch.body)?,
            Self::ArticleList(e) => e.extract(&fetch.body)?,
            Self::Article(e) => e.extract(&fetch.url, &fetch.body)?,
        };

        dedup_in_place(&mut extraction.records);
        Ok(extraction)
    }
}

/// Drops records repeating an earlier fingerprint, preserving order
fn dedup_in_place(records: &mut Vec<Record>) {
    let mut seen = std::collections::HashSet::new();
    records.retain(|r| seen.insert(r.fingerprint.clone()));
}
