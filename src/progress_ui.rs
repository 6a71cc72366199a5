//! Progress UI (spinner and image bar) for conversion runs.

use std::time::Duration;

use epub_downloader_core::ProgressEvent;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;

/// Spawns the progress UI when requested.
///
/// The task drains `events` and exits once every sender is dropped. When
/// `use_spinner` is false the events are still drained so senders never
/// accumulate a backlog.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    mut events: UnboundedReceiver<ProgressEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if !use_spinner {
            while events.recv().await.is_some() {}
            return;
        }

        let bar = ProgressBar::new_spinner();
        bar.set_style(spinner_style());
        bar.enable_steady_tick(Duration::from_millis(100));

        while let Some(event) = events.recv().await {
            match &event {
                ProgressEvent::ImagesStart { total, .. } => {
                    bar.set_style(bar_style());
                    bar.set_length(*total as u64);
                    bar.set_position(0);
                }
                ProgressEvent::ImagesProgress { completed, .. } => {
                    bar.set_position(*completed as u64);
                }
                ProgressEvent::ImagesComplete { .. } => {
                    bar.set_style(spinner_style());
                }
                _ => {}
            }
            if let Some(message) = describe(&event) {
                bar.set_message(message);
            }
        }

        bar.finish_and_clear();
    })
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template("{spinner} {msg} [{bar:30}] {pos}/{len}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

/// One-line status for an event; `None` keeps the current message.
fn describe(event: &ProgressEvent) -> Option<String> {
    let message = match event {
        ProgressEvent::Starting { book_id } => format!("Starting {book_id}..."),
        ProgressEvent::SessionCheck => "Verifying session...".to_string(),
        ProgressEvent::SessionOk => "Session verified".to_string(),
        ProgressEvent::Metadata { title } => format!("Resolved \"{title}\""),
        ProgressEvent::ChaptersDiscovered { total } => format!("{total} chapters found"),
        ProgressEvent::ChapterStart { index, total, title } => {
            format!("[{index}/{total}] {title}")
        }
        ProgressEvent::ImagesStart { .. } => "Downloading images".to_string(),
        ProgressEvent::CssImagesStart { total } => format!("Downloading {total} stylesheet images"),
        ProgressEvent::PackagingComplete { .. } => "Packaging complete".to_string(),
        ProgressEvent::DownloadStart => "Saving EPUB...".to_string(),
        ProgressEvent::ImagesProgress { .. }
        | ProgressEvent::ImagesComplete { .. }
        | ProgressEvent::Complete => return None,
    };
    Some(message)
}
