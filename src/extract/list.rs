//! Extraction for the platform's JSON endpoints
//!
//! Two document shapes live here: the account-search response
//! (`searchbiz`), which resolves an account name to its fakeid, and one
//! page of the paginated article list (`appmsg`). The list endpoint serves
//! `page_size` articles per page with `begin = page * page_size`; paging
//! from 0 walks from the newest article backwards in time.

use crate::config::WindowConfig;
use crate::extract::{Extraction, ParseError};
use crate::state::{Record, TargetKind, TargetSeed};
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

/// Builds the search endpoint URL for an account name
pub fn search_url(api_base: &str, account: &str) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("action", "search_biz")
        .append_pair("begin", "0")
        .append_pair("count", "5")
        .append_pair("query", account)
        .append_pair("lang", "zh_CN")
        .append_pair("f", "json")
        .append_pair("ajax", "1")
        .finish();
    format!("{}/cgi-bin/searchbiz?{}", api_base.trim_end_matches('/'), query)
}

/// Builds the article-list endpoint URL for one page
pub fn list_url(api_base: &str, fakeid: &str, page: u32, page_size: u32) -> String {
    let query = url::form_urlencoded::Serializer::new(String::new())
        .append_pair("action", "list_ex")
        .append_pair("begin", &(page * page_size).to_string())
        .append_pair("count", &page_size.to_string())
        .append_pair("fakeid", fakeid)
        .append_pair("type", "9")
        .append_pair("query", "")
        .append_pair("lang", "zh_CN")
        .append_pair("f", "json")
        .append_pair("ajax", "1")
        .finish();
    format!("{}/cgi-bin/appmsg?{}", api_base.trim_end_matches('/'), query)
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    list: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    fakeid: String,
    #[serde(default)]
    nickname: String,
}

/// Extractor for the account-search response
#[derive(Debug, Clone)]
pub struct SearchExtractor {
    pub account: String,
    pub api_base: String,
    pub page_size: u32,
}

impl SearchExtractor {
    /// Resolves the account and discovers its first list page
    ///
    /// Prefers the entry whose nickname matches the configured account name
    /// exactly; falls back to the first result, as the search endpoint
    /// orders by relevance.
    pub fn extract(&self, body: &str) -> Result<Extraction, ParseError> {
        let response: SearchResponse =
            serde_json::from_str(body).map_err(|e| ParseError::Json(e.to_string()))?;

        if response.list.is_empty() {
            return Err(ParseError::AccountNotFound(self.account.clone()));
        }

        let entry = response
            .list
            .iter()
            .find(|e| e.nickname == self.account)
            .unwrap_or(&response.list[0]);

        if entry.fakeid.is_empty() {
            return Err(ParseError::MissingField("fakeid"));
        }

        let seed = TargetSeed::new(
            list_url(&self.api_base, &entry.fakeid, 0, self.page_size),
            TargetKind::ArticleList {
                account: self.account.clone(),
                fakeid: entry.fakeid.clone(),
                page: 0,
            },
        );

        Ok(Extraction {
            records: Vec::new(),
            discovered: vec![seed],
        })
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    app_msg_list: Vec<ListEntry>,
}

#[derive(Debug, Deserialize)]
struct ListEntry {
    #[serde(default)]
    title: String,
    #[serde(default)]
    link: String,
    update_time: Option<i64>,
}

/// Extractor for one page of the article list
#[derive(Debug, Clone)]
pub struct ListExtractor {
    pub account: String,
    pub fakeid: String,
    pub page: u32,
    pub api_base: String,
    pub page_size: u32,
    pub window: WindowConfig,
}

impl ListExtractor {
    /// Emits one stub record per listed article, an article target for each
    /// entry inside the publication window, and the next list page while
    /// this page is full and not yet past the window's lower bound.
    pub fn extract(&self, body: &str) -> Result<Extraction, ParseError> {
        let response: ListResponse =
            serde_json::from_str(body).map_err(|e| ParseError::Json(e.to_string()))?;

        let mut records = Vec::new();
        let mut discovered = Vec::new();
        let mut oldest: Option<DateTime<Utc>> = None;

        for entry in &response.app_msg_list {
            if entry.link.is_empty() {
                continue;
            }

            let published_at = entry.update_time.and_then(parse_timestamp);
            if let Some(ts) = published_at {
                oldest = Some(match oldest {
                    Some(current) => current.min(ts),
                    None => ts,
                });
            }

            // Entries outside the window are recorded in listing order but
            // their content is never fetched.
            let in_window = published_at.map(|ts| self.window.contains(ts)).unwrap_or(true);

            records.push(Record::new(
                self.account.clone(),
                entry.title.clone(),
                entry.link.clone(),
                published_at,
                None,
            ));

            if in_window {
                discovered.push(TargetSeed::new(
                    entry.link.clone(),
                    TargetKind::Article {
                        account: self.account.clone(),
                    },
                ));
            }
        }

        let page_full = response.app_msg_list.len() as u32 >= self.page_size;
        let past_window = oldest.map(|ts| self.window.is_before(ts)).unwrap_or(false);

        if page_full && !past_window {
            let next_page = self.page + 1;
            discovered.push(TargetSeed::new(
                list_url(&self.api_base, &self.fakeid, next_page, self.page_size),
                TargetKind::ArticleList {
                    account: self.account.clone(),
                    fakeid: self.fakeid.clone(),
                    page: next_page,
                },
            ));
        }

        Ok(Extraction {
            records,
            discovered,
        })
    }
}

/// Converts a platform unix timestamp to UTC; out-of-range values are dropped
fn parse_timestamp(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}
