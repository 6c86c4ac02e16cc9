//! Session state and credential refresh
//!
//! The platform authenticates requests with an access token (query
//! parameter) and a cookie header. Both come from a [`CredentialSource`],
//! which is the pluggable seam for whatever login flow produced them: the
//! provided implementation re-reads a credentials file that an external
//! login tool keeps fresh.

use crate::{ConfigError, HarvestError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Token and cookie pair authenticating a session
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Credentials {
    /// Access token appended to API requests
    pub token: String,

    /// Cookie header value sent with every request
    pub cookie: String,
}

/// Source of session credentials
///
/// `load` is called once at startup and again whenever the transport layer
/// sees an auth-expiry response and needs fresh credentials.
pub trait CredentialSource: Send + Sync {
    fn load(&self) -> crate::Result<Credentials>;
}

/// Credential source backed by a TOML file
///
/// The file holds `token = "..."` and `cookie = "..."` and is expected to be
/// rewritten by the external login tool when the session expires.
pub struct FileCredentials {
    path: PathBuf,
}

impl FileCredentials {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialSource for FileCredentials {
    fn load(&self) -> crate::Result<Credentials> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            HarvestError::Config(ConfigError::InvalidCredentials(format!(
                "cannot read {}: {}",
                self.path.display(),
                e
            )))
        })?;

        let creds: Credentials = toml::from_str(&content).map_err(|e| {
            HarvestError::Config(ConfigError::InvalidCredentials(format!(
                "cannot parse {}: {}",
                self.path.display(),
                e
            )))
        })?;

        if creds.token.is_empty() || creds.cookie.is_empty() {
            return Err(HarvestError::Config(ConfigError::InvalidCredentials(
                format!("{} has an empty token or cookie", self.path.display()),
            )));
        }

        Ok(creds)
    }
}

/// Authenticated session state shared by all workers
///
/// Holds the current credentials behind a read-write lock; `refresh`
/// replaces them from the source when the platform reports expiry.
pub struct Session {
    credentials: RwLock<Credentials>,
    source: Box<dyn CredentialSource>,
}

impl Session {
    /// Creates a session by loading initial credentials from the source
    pub fn new(source: Box<dyn CredentialSource>) -> crate::Result<Self> {
        let credentials = source.load()?;
        Ok(Self {
            credentials: RwLock::new(credentials),
            source,
        })
    }

    /// Current access token
    pub fn token(&self) -> String {
        self.credentials.read().unwrap().token.clone()
    }

    /// Current cookie header value
    pub fn cookie(&self) -> String {
        self.credentials.read().unwrap().cookie.clone()
    }

    /// Reloads credentials from the source
    ///
    /// Returns true if the credentials actually changed, so the caller can
    /// tell a useful refresh from a stale source.
    pub fn refresh(&self) -> crate::Result<bool> {
        let fresh = self.source.load()?;
        let mut current = self.credentials.write().unwrap();
        let changed = *current != fresh;
        if changed {
            tracing::info!("Session credentials refreshed");
        } else {
            tracing::warn!("Credential source returned unchanged credentials");
        }
        *current = fresh;
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::NamedTempFile;

    fn write_credentials_file(token: &str, cookie: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "token = \"{}\"\ncookie = \"{}\"", token, cookie).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_file_credentials_load() {
        let file = write_credentials_file("tok123", "wxuin=1; slave_sid=abc");
        let source = FileCredentials::new(file.path());

        let creds = source.load().unwrap();
        assert_eq!(creds.token, "tok123");
        assert_eq!(creds.cookie, "wxuin=1; slave_sid=abc");
    }

    #[test]
    fn test_file_credentials_missing_file() {
        let source = FileCredentials::new("/nonexistent/credentials.toml");
        assert!(source.load().is_err());
    }

    #[test]
    fn test_file_credentials_empty_token_rejected() {
        let file = write_credentials_file("", "cookie");
        let source = FileCredentials::new(file.path());
        assert!(source.load().is_err());
    }

    struct CountingSource {
        loads: AtomicU32,
    }

    impl CredentialSource for CountingSource {
        fn load(&self) -> crate::Result<Credentials> {
            let n = self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(Credentials {
                token: format!("token-{}", n),
                cookie: "cookie".to_string(),
            })
        }
    }

    #[test]
    fn test_session_refresh_replaces_credentials() {
        let session = Session::new(Box::new(CountingSource {
            loads: AtomicU32::new(0),
        }))
        .unwrap();

        assert_eq!(session.token(), "token-0");

        let changed = session.refresh().unwrap();
        assert!(changed);
        assert_eq!(session.token(), "token-1");
    }

    struct StaticSource;

    impl CredentialSource for StaticSource {
        fn load(&self) -> crate::Result<Credentials> {
            Ok(Credentials {
                token: "same".to_string(),
                cookie: "same".to_string(),
            })
        }
    }

    #[test]
    fn test_session_refresh_detects_stale_source() {
        let session = Session::new(Box::new(StaticSource)).unwrap();
        let changed = session.refresh().unwrap();
        assert!(!changed);
    }
}
