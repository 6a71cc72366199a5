use thiserror::Error;

use crate::archive::ArchiveError;
use crate::auth::SessionError;
use crate::fetch::FetchError;
use crate::metadata::MetadataError;
use crate::output::OutputError;
use crate::transform::TransformError;

/// Fatal conversion failures. Recoverable asset failures are
/// [`AssetWarning`](crate::assets::AssetWarning)s instead.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// No book identifier was supplied.
    #[error("missing book ID")]
    MissingBookId,

    /// Login check failed, the subscription expired, or no session exists.
    #[error("{0}")]
    Authentication(String),

    /// Metadata or the chapter list was missing or malformed.
    #[error(transparent)]
    Metadata(MetadataError),

    /// A chapter could not be transformed.
    #[error("{0}")]
    Transform(String),

    /// A required request failed after all retries.
    #[error(transparent)]
    Network(FetchError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Output(#[from] OutputError),
}

impl ConvertError {
    /// Short category name for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingBookId => "input",
            Self::Authentication(_) => "authentication",
            Self::Metadata(_) => "metadata",
            Self::Transform(_) => "transform",
            Self::Network(_) => "network",
            Self::Archive(_) => "archive",
            Self::Output(_) => "output",
        }
    }
}

impl From<SessionError> for ConvertError {
    fn from(error: SessionError) -> Self {
        Self::Authentication(error.to_string())
    }
}

impl From<MetadataError> for ConvertError {
    fn from(error: MetadataError) -> Self {
        if error.is_authentication() {
            return Self::Authentication(error.to_string());
        }
        match error {
            MetadataError::Fetch(fetch) => Self::Network(fetch),
            other => Self::Metadata(other),
        }
    }
}

impl From<TransformError> for ConvertError {
    fn from(error: TransformError) -> Self {
        match error {
            TransformError::Fetch(fetch) => Self::Network(fetch),
            other @ TransformError::MissingContentRoot { .. } => Self::Transform(other.to_string()),
        }
    }
}

impl From<FetchError> for ConvertError {
    fn from(error: FetchError) -> Self {
        Self::Network(error)
    }
}
