//! Error types for the fetch module.

use thiserror::Error;

/// Failure raised by a [`Transport`](super::Transport) before any HTTP status was received.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request timed out.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// Connection, TLS, or body read failure.
    #[error("network error requesting {url}: {message}")]
    Network {
        /// The URL that failed.
        url: String,
        /// Description of the underlying failure.
        message: String,
    },

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Build(String),
}

impl TransportError {
    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates a network error.
    pub fn network(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Network {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Maps a reqwest error, keeping timeouts distinct.
    pub fn from_reqwest(url: impl Into<String>, error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::timeout(url)
        } else {
            Self::network(url, error.to_string())
        }
    }
}

/// Errors surfaced by the session-aware fetch client.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Every attempt failed before a response arrived.
    #[error("request to {url} failed after {attempts} attempt(s): {source}")]
    Transport {
        /// The requested URL.
        url: String,
        /// Attempts made.
        attempts: u32,
        /// Last transport failure.
        #[source]
        source: TransportError,
    },

    /// The final response carried a non-success status.
    #[error("HTTP {status} requesting {url}")]
    HttpStatus {
        /// The requested URL.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// A JSON body did not match the expected shape.
    #[error("invalid JSON from {url}: {source}")]
    Decode {
        /// The requested URL.
        url: String,
        /// Parser failure.
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// Creates an exhausted-transport error.
    pub fn transport(url: impl Into<String>, attempts: u32, source: TransportError) -> Self {
        Self::Transport {
            url: url.into(),
            attempts,
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a JSON decode error.
    pub fn decode(url: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            url: url.into(),
            source,
        }
    }

    /// HTTP status of the failure, `None` for transport and decode errors.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}
