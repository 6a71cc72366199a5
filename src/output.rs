//! Persisting finished artifacts.

use std::io;
use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors raised while persisting an artifact.
#[derive(Debug, Error)]
pub enum OutputError {
    /// The suggested path would escape the output root.
    #[error("refusing to write outside the output directory: {path}")]
    UnsafePath {
        /// Suggested relative path.
        path: String,
    },

    /// Filesystem failure.
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Destination for finished EPUB files.
#[async_trait]
pub trait OutputSink: Send + Sync {
    /// Stores `bytes` under the suggested `relative_path` and returns where it landed.
    async fn persist(&self, relative_path: &str, bytes: &[u8]) -> Result<PathBuf, OutputError>;
}

/// Writes artifacts beneath a root directory, creating parents as needed.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    root: PathBuf,
}

impl DirectorySink {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Joins `relative_path` onto the root, rejecting absolute and `..` paths.
    ///
    /// # Errors
    ///
    /// Returns [`OutputError::UnsafePath`] for paths that are empty or not
    /// plain relative paths.
    pub fn target(&self, relative_path: &str) -> Result<PathBuf, OutputError> {
        let relative = Path::new(relative_path);
        let plain = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_) | Component::CurDir));
        if relative_path.is_empty() || !plain {
            return Err(OutputError::UnsafePath {
                path: relative_path.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl OutputSink for DirectorySink {
    #[instrument(skip(self, bytes), fields(bytes = bytes.len()))]
    async fn persist(&self, relative_path: &str, bytes: &[u8]) -> Result<PathBuf, OutputError> {
        let target = self.target(relative_path)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| OutputError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&target, bytes)
            .await
            .map_err(|source| OutputError::Io {
                path: target.clone(),
                source,
            })?;
        debug!(path = %target.display(), "artifact written");
        Ok(target)
    }
}
