//! HTTP transport for the crawler
//!
//! This module owns everything between a target and its bytes:
//! - Building the HTTP client with the configured identity
//! - Attaching session credentials (token query parameter, cookie header)
//! - Transparent credential refresh on auth expiry, retrying the original
//!   fetch exactly once
//! - Failure classification into retryable and terminal kinds
//!
//! Every call to [`Transport::fetch`] produces exactly one [`FetchResult`],
//! which the worker loop turns into exactly one scheduler report.

mod session;

pub use session::{CredentialSource, Credentials, FileCredentials, Session};

use crate::config::SessionConfig;
use crate::state::{Target, TargetKind};
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use std::time::{Duration, Instant};

/// Classified failure of one fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// Request timed out
    Timeout,

    /// Connection could not be established
    Connect,

    /// Other transport-level error
    Network(String),

    /// HTTP 429 or platform freq-control; carries the server's backoff hint
    RateLimited { retry_after: Option<Duration> },

    /// Session credentials rejected (after the in-transport refresh retry)
    AuthExpired,

    /// Client error other than auth or rate limiting; terminal
    Client(u16),

    /// Server error; retryable up to the cap
    Server(u16),

    /// Platform API returned a non-zero error code in the body
    Api { ret: i64 },

    /// Response document could not be parsed; target stays retry-eligible
    Parse(String),
}

impl FailureKind {
    /// Whether the scheduler should retry the target (subject to the cap)
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout
            | Self::Connect
            | Self::Network(_)
            | Self::RateLimited { .. }
            | Self::Server(_)
            | Self::Parse(_) => true,
            Self::AuthExpired | Self::Client(_) | Self::Api { .. } => false,
        }
    }

    /// The server-requested backoff, if this failure carries one
    pub fn backoff_hint(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "request timeout"),
            Self::Connect => write!(f, "connection failed"),
            Self::Network(msg) => write!(f, "network error: {}", msg),
            Self::RateLimited { retry_after } => match retry_after {
                Some(d) => write!(f, "rate limited (retry after {:?})", d),
                None => write!(f, "rate limited"),
            },
            Self::AuthExpired => write!(f, "session credentials expired"),
            Self::Client(code) => write!(f, "HTTP {}", code),
            Self::Server(code) => write!(f, "HTTP {}", code),
            Self::Api { ret } => write!(f, "platform error ret={}", ret),
            Self::Parse(msg) => write!(f, "parse error: {}", msg),
        }
    }
}

/// Outcome of one fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchDisposition {
    Success,
    Failure(FailureKind),
}

/// Immutable record of one fetch attempt
///
/// Owned by the transport layer, consumed once by the extraction pipeline.
#[derive(Debug, Clone)]
pub struct FetchResult {
    /// The fetched URL
    pub url: String,

    /// HTTP status, when a response was received at all
    pub status: Option<u16>,

    /// Raw response body; empty when the request never completed
    pub body: String,

    /// When the attempt finished
    pub fetched_at: DateTime<Utc>,

    /// Wall time the attempt took
    pub elapsed: Duration,

    /// Success or classified failure
    pub disposition: FetchDisposition,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        matches!(self.disposition, FetchDisposition::Success)
    }

    pub fn failure(&self) -> Option<&FailureKind> {
        match &self.disposition {
            FetchDisposition::Failure(kind) => Some(kind),
            FetchDisposition::Success => None,
        }
    }
}

/// Platform API code for an invalidated session
const RET_SESSION_INVALID: i64 = -6;

/// Platform API code for request frequency control
const RET_FREQ_CONTROL: i64 = 200013;

/// Builds an HTTP client with the configured identity and timeouts
pub fn build_http_client(
    config: &SessionConfig,
    request_timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.clone())
        .timeout(request_timeout)
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Authenticated fetcher shared by all workers
pub struct Transport {
    client: Client,
    session: Session,
}

impl Transport {
    pub fn new(
        config: &SessionConfig,
        request_timeout: Duration,
        source: Box<dyn CredentialSource>,
    ) -> crate::Result<Self> {
        let client = build_http_client(config, request_timeout)?;
        let session = Session::new(source)?;
        Ok(Self { client, session })
    }

    /// Fetches a target under the session's credentials
    ///
    /// On an auth-expiry response the session is refreshed and the fetch is
    /// retried once; the retried attempt's result is returned either way.
    pub async fn fetch(&self, target: &Target) -> FetchResult {
        let first = self.attempt(target).await;

        if !matches!(
            first.disposition,
            FetchDisposition::Failure(FailureKind::AuthExpired)
        ) {
            return first;
        }

        tracing::warn!(url = %target.url, "Auth expired, refreshing credentials");
        match self.session.refresh() {
            Ok(_) => self.attempt(target).await,
            Err(e) => {
                tracing::error!("Credential refresh failed: {}", e);
                first
            }
        }
    }

    /// Performs one wire attempt with no refresh logic
    async fn attempt(&self, target: &Target) -> FetchResult {
        let started = Instant::now();

        let mut request = self
            .client
            .get(&target.url)
            .header(reqwest::header::COOKIE, self.session.cookie());

        // API endpoints authenticate with the token; article pages only
        // need the cookie.
        if is_api_kind(&target.kind) {
            request = request.query(&[("token", self.session.token())]);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                return FetchResult {
                    url: target.url.clone(),
                    status: None,
                    body: String::new(),
                    fetched_at: Utc::now(),
                    elapsed: started.elapsed(),
                    disposition: FetchDisposition::Failure(classify_request_error(&e)),
                };
            }
        };

        let status = response.status();
        let retry_after = parse_retry_after(&response);

        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                return FetchResult {
                    url: target.url.clone(),
                    status: Some(status.as_u16()),
                    body: String::new(),
                    fetched_at: Utc::now(),
                    elapsed: started.elapsed(),
                    disposition: FetchDisposition::Failure(FailureKind::Network(e.to_string())),
                };
            }
        };

        let mut disposition = match classify_status(status, retry_after) {
            Some(kind) => FetchDisposition::Failure(kind),
            None => FetchDisposition::Success,
        };

        // A 200 from an API endpoint can still carry a platform error code.
        if matches!(disposition, FetchDisposition::Success) && is_api_kind(&target.kind) {
            if let Some(kind) = classify_api_body(&body) {
                disposition = FetchDisposition::Failure(kind);
            }
        }

        FetchResult {
            url: target.url.clone(),
            status: Some(status.as_u16()),
            body,
            fetched_at: Utc::now(),
            elapsed: started.elapsed(),
            disposition,
        }
    }
}

/// Whether a target hits the token-authenticated API
fn is_api_kind(kind: &TargetKind) -> bool {
    matches!(
        kind,
        TargetKind::AccountSearch { .. } | TargetKind::ArticleList { .. }
    )
}

/// Maps an HTTP status to a failure kind; None means success
fn classify_status(status: StatusCode, retry_after: Option<Duration>) -> Option<FailureKind> {
    if status.is_success() {
        return None;
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Some(FailureKind::AuthExpired);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some(FailureKind::RateLimited { retry_after });
    }

    if status.is_client_error() {
        return Some(FailureKind::Client(status.as_u16()));
    }

    if status.is_server_error() {
        return Some(FailureKind::Server(status.as_u16()));
    }

    Some(FailureKind::Network(format!("unexpected HTTP {}", status)))
}

/// Inspects an API response body for platform error codes
///
/// `base_resp.ret` of 0 is success; -6 means the session is invalid and
/// 200013 means frequency control kicked in. A body that is not JSON at all
/// is left for the extractor to reject.
fn classify_api_body(body: &str) -> Option<FailureKind> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let ret = value.get("base_resp")?.get("ret")?.as_i64()?;

    match ret {
        0 => None,
        RET_SESSION_INVALID => Some(FailureKind::AuthExpired),
        RET_FREQ_CONTROL => Some(FailureKind::RateLimited { retry_after: None }),
        other => Some(FailureKind::Api { ret: other }),
    }
}

/// Classifies a reqwest error into a failure kind
fn classify_request_error(e: &reqwest::Error) -> FailureKind {
    if e.is_timeout() {
        FailureKind::Timeout
    } else if e.is_connect() {
        FailureKind::Connect
    } else {
        FailureKind::Network(e.to_string())
    }
}

/// Parses a Retry-After header given in seconds
fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
