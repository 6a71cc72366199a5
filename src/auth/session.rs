//! Session credential providers.
//!
//! The pipeline never manages credentials itself: it asks a
//! [`CredentialProvider`] to make sure a valid session is attached to the
//! requests that follow.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::cookie::Jar;
use thiserror::Error;
use tracing::{info, instrument, warn};

use super::cookies::{CookieError, add_cookies_to_jar, parse_netscape_cookies};

/// Errors raised when no usable session is available.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The cookie export could not be opened.
    #[error("cannot open cookie file '{path}': {source}")]
    Unreadable {
        /// Path of the export.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: std::io::Error,
    },

    /// The cookie export could not be parsed.
    #[error("invalid cookie file '{path}': {source}")]
    Invalid {
        /// Path of the export.
        path: PathBuf,
        /// Parser failure.
        #[source]
        source: CookieError,
    },

    /// The export holds no cookie that is still valid.
    #[error("no active session in '{path}': export your browser cookies after signing in")]
    NoSession {
        /// Path of the export.
        path: PathBuf,
    },
}

/// Capability that attaches valid session credentials to later requests.
///
/// `refresh` must be idempotent; it may be called from inside a retry loop.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Ensures a valid session is in place.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] describing why no valid session exists.
    async fn refresh(&self) -> Result<(), SessionError>;
}

/// Provider for hosts that attach credentials on their own.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticSession;

#[async_trait]
impl CredentialProvider for StaticSession {
    async fn refresh(&self) -> Result<(), SessionError> {
        Ok(())
    }
}

/// Provider that reloads a browser cookie export into a shared jar.
///
/// The jar is the one handed to
/// [`ReqwestTransport`](crate::fetch::ReqwestTransport), so every refresh
/// is visible to subsequent requests.
#[derive(Debug, Clone)]
pub struct CookieFileSession {
    path: PathBuf,
    jar: Arc<Jar>,
}

impl CookieFileSession {
    /// Creates a provider for `path` with a fresh jar.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            jar: Arc::new(Jar::default()),
        }
    }

    /// Jar to hand to the HTTP transport.
    #[must_use]
    pub fn jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    /// Path of the cookie export.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the export and loads every unexpired cookie into the jar.
    ///
    /// Returns the number of cookies loaded.
    ///
    /// # Errors
    ///
    /// See [`SessionError`].
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn load(&self) -> Result<usize, SessionError> {
        let contents = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SessionError::Unreadable {
                path: self.path.clone(),
                source,
            })?;
        let parsed = parse_netscape_cookies(contents.as_slice()).map_err(|source| {
            SessionError::Invalid {
                path: self.path.clone(),
                source,
            }
        })?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs());
        let (live, expired): (Vec<_>, Vec<_>) = parsed
            .cookies
            .into_iter()
            .partition(|cookie| !cookie.is_expired(now));
        if !expired.is_empty() {
            warn!(expired = expired.len(), "ignoring expired cookies");
        }
        if live.is_empty() {
            return Err(SessionError::NoSession {
                path: self.path.clone(),
            });
        }

        let loaded = add_cookies_to_jar(&self.jar, &live);
        if loaded == 0 {
            return Err(SessionError::NoSession {
                path: self.path.clone(),
            });
        }
        info!(cookies = loaded, "session cookies loaded");
        Ok(loaded)
    }
}

#[async_trait]
impl CredentialProvider for CookieFileSession {
    async fn refresh(&self) -> Result<(), SessionError> {
        self.load().await.map(|_| ())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write;

    use reqwest::cookie::CookieStore;

    use super::*;

    fn export(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_refresh_loads_cookies_into_shared_jar() {
        let file = export(".example.com\tTRUE\t/\tFALSE\t0\tsessionid\tabc\n");
        let session = CookieFileSession::new(file.path());
        let jar = session.jar();
        session.refresh().await.unwrap();
        let header = jar
            .cookies(&"http://example.com/".parse::<url::Url>().unwrap())
            .unwrap();
        assert!(header.to_str().unwrap().contains("sessionid=abc"));
    }

    #[tokio::test]
    async fn test_missing_file_is_unreadable() {
        let session = CookieFileSession::new("/nonexistent/cookies.txt");
        let err = session.refresh().await.unwrap_err();
        assert!(matches!(err, SessionError::Unreadable { .. }));
        assert!(err.to_string().contains("/nonexistent/cookies.txt"));
    }

    #[tokio::test]
    async fn test_empty_export_has_no_session() {
        let file = export("# Netscape HTTP Cookie File\n");
        let err = CookieFileSession::new(file.path()).refresh().await.unwrap_err();
        assert!(matches!(err, SessionError::NoSession { .. }));
    }

    #[tokio::test]
    async fn test_only_expired_cookies_has_no_session() {
        let file = export(".example.com\tTRUE\t/\tFALSE\t1000\tsessionid\tabc\n");
        let err = CookieFileSession::new(file.path()).refresh().await.unwrap_err();
        assert!(matches!(err, SessionError::NoSession { .. }));
    }

    #[tokio::test]
    async fn test_garbage_export_is_invalid() {
        let file = export("this is not a cookie file\n");
        let err = CookieFileSession::new(file.path()).refresh().await.unwrap_err();
        assert!(matches!(err, SessionError::Invalid { .. }));
    }

    #[tokio::test]
    async fn test_load_reports_cookie_count() {
        let file = export(
            ".example.com\tTRUE\t/\tFALSE\t0\tsessionid\tabc\n\
             .example.com\tTRUE\t/\tFALSE\t0\tcsrftoken\tdef\n",
        );
        let loaded = CookieFileSession::new(file.path()).load().await.unwrap();
        assert_eq!(loaded, 2);
    }

    #[tokio::test]
    async fn test_static_session_always_succeeds() {
        assert!(StaticSession.refresh().await.is_ok());
    }
}
