//! Advisory progress events.
//!
//! The pipeline reports what it is doing through a [`ProgressSink`].
//! Events serialize as `{"stage": "...", ...}` objects with camelCase
//! fields so a host can relay them across a process boundary unchanged.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "kebab-case")]
pub enum ProgressEvent {
    #[serde(rename_all = "camelCase")]
    Starting {
        book_id: String,
    },
    SessionCheck,
    SessionOk,
    Metadata {
        title: String,
    },
    #[serde(rename_all = "camelCase")]
    ChaptersDiscovered {
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    ChapterStart {
        /// One-based position.
        index: usize,
        total: usize,
        title: String,
    },
    #[serde(rename_all = "camelCase")]
    ImagesStart {
        total: usize,
        concurrency: usize,
    },
    #[serde(rename_all = "camelCase")]
    ImagesProgress {
        completed: usize,
        total: usize,
        elapsed_seconds: f64,
    },
    #[serde(rename_all = "camelCase")]
    ImagesComplete {
        completed: usize,
    },
    #[serde(rename_all = "camelCase")]
    CssImagesStart {
        total: usize,
    },
    #[serde(rename_all = "camelCase")]
    PackagingComplete {
        duration_ms: u64,
    },
    DownloadStart,
    Complete,
}

/// Receiver of progress events. Delivery is best effort.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Forwards events into a tokio channel; a closed channel drops them.
impl ProgressSink for UnboundedSender<ProgressEvent> {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.send(event);
    }
}
