use thiserror::Error;

use crate::fetch::FetchError;

/// Errors raised while resolving a book's metadata and chapter list.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The login check was rejected.
    #[error("authentication failed (status {status}) when accessing {url}")]
    Authentication {
        /// Profile URL that was checked.
        url: String,
        /// Status of the final response.
        status: u16,
    },

    /// The session belongs to an expired subscription.
    #[error("authentication issue: account subscription expired")]
    SubscriptionExpired,

    /// Book metadata carries no chapter list URL.
    #[error("missing chapter list URL in book metadata")]
    MissingChapterList,

    /// A chapter list page had no `results` array.
    #[error("chapter response from {url} is missing a results array")]
    MissingResults {
        /// Page URL.
        url: String,
    },

    /// A chapter record had no content URL.
    #[error("chapter '{title}' has no content URL")]
    MissingContentUrl {
        /// Chapter title.
        title: String,
    },

    /// A payload had an unexpected shape.
    #[error("malformed metadata from {url}: {reason}")]
    Malformed {
        /// Source URL.
        url: String,
        /// What was wrong.
        reason: String,
    },

    /// A required request failed.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl MetadataError {
    /// Creates a malformed-payload error.
    pub fn malformed(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Malformed {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error means the session is not usable.
    #[must_use]
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::SubscriptionExpired)
    }
}
