//! Downloads every registered asset in four sequential stages.

use std::time::Instant;

use tracing::{debug, info, instrument, warn};

use super::css::{CssAssetKind, scan_stylesheet};
use super::fallback::fallback_candidates;
use super::registry::{AssetRegistry, AssetSlot};
use super::AssetWarning;
use crate::convert::SiteConfig;
use crate::fetch::{ContentKind, FetchRequest, SessionClient};
use crate::metadata::BookMetadata;
use crate::progress::{ProgressEvent, ProgressSink};

/// Requests are serialized through one gate.
const IMAGE_CONCURRENCY: usize = 1;

/// Fetches stylesheets, fonts, page images, and stylesheet images.
///
/// Every failure here is recoverable: the asset is left out of the
/// package and an [`AssetWarning`] is recorded.
pub struct AssetCollector<'a> {
    client: &'a SessionClient,
    metadata: &'a BookMetadata,
    site: &'a SiteConfig,
    progress: &'a dyn ProgressSink,
    warnings: Vec<AssetWarning>,
}

impl<'a> AssetCollector<'a> {
    #[must_use]
    pub fn new(
        client: &'a SessionClient,
        metadata: &'a BookMetadata,
        site: &'a SiteConfig,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            client,
            metadata,
            site,
            progress,
            warnings: Vec::new(),
        }
    }

    /// Runs all stages in order and returns the accumulated warnings.
    ///
    /// Font and image URLs are only known once stylesheets are fetched,
    /// so the order is fixed.
    pub async fn collect(mut self, registry: &mut AssetRegistry) -> Vec<AssetWarning> {
        self.fetch_stylesheets(registry).await;
        self.fetch_fonts(registry).await;
        self.fetch_images(registry).await;
        self.fetch_css_images(registry).await;
        self.warnings
    }

    fn warn(&mut self, url: &str, reason: impl Into<String>) {
        let warning = AssetWarning::new(url, reason);
        warn!(url = %warning.url, reason = %warning.reason, "asset skipped");
        self.warnings.push(warning);
    }

    /// Fetches one optional asset, recording a warning on failure.
    async fn fetch_optional(&mut self, url: &str, kind: ContentKind) -> Option<Vec<u8>> {
        match self.client.fetch(&FetchRequest::new(url, kind)).await {
            Ok(response) if response.is_success() => Some(response.body),
            Ok(response) => {
                self.warn(url, format!("status {}", response.status));
                None
            }
            Err(error) => {
                self.warn(url, error.to_string());
                None
            }
        }
    }

    /// Stage 1: stylesheets, which also register fonts and stylesheet images.
    #[instrument(skip_all, fields(count = registry.css_sources().len()))]
    pub async fn fetch_stylesheets(&mut self, registry: &mut AssetRegistry) {
        for position in 0..registry.css_sources().len() {
            let source = &registry.css_sources()[position];
            if source.content.is_some() {
                continue;
            }
            let url = source.url.clone();
            let Some(body) = self.fetch_optional(&url, ContentKind::Css).await else {
                continue;
            };
            let scanned = scan_stylesheet(&url, &String::from_utf8_lossy(&body));
            for reference in scanned.references {
                match reference.kind {
                    CssAssetKind::Font => registry.register_font(&reference.path, &reference.url),
                    CssAssetKind::Image => {
                        registry.register_css_asset(&reference.path, &reference.url)
                    }
                };
            }
            registry.set_css_content(position, scanned.content);
            debug!(url = %url, "stylesheet fetched");
        }
    }

    /// Stage 2: fonts, skipping paths already claimed by a stylesheet image.
    #[instrument(skip_all, fields(count = registry.fonts().len()))]
    pub async fn fetch_fonts(&mut self, registry: &mut AssetRegistry) {
        for (path, url) in registry.fonts().pending() {
            if registry.is_image_path(&path) {
                debug!(path = %path, "font path already claimed by an image");
                continue;
            }
            let slot = match self.fetch_optional(&url, ContentKind::Font).await {
                Some(data) => AssetSlot::Fetched(data),
                None => AssetSlot::Failed,
            };
            registry.fonts_mut().set_slot(&path, slot);
        }
    }

    /// Stage 3: page images, trying fallbacks for each failure.
    #[instrument(skip_all, fields(count = registry.images().len()))]
    pub async fn fetch_images(&mut self, registry: &mut AssetRegistry) {
        let pending = registry.images().pending();
        let total = pending.len();
        self.progress.emit(ProgressEvent::ImagesStart {
            total,
            concurrency: IMAGE_CONCURRENCY,
        });

        let started = Instant::now();
        let mut completed = 0;
        for (relative, primary) in pending {
            let slot = match self.fetch_image_with_fallback(&relative, &primary).await {
                Some(data) => {
                    completed += 1;
                    AssetSlot::Fetched(data)
                }
                None => AssetSlot::Failed,
            };
            registry.images_mut().set_slot(&relative, slot);
            self.progress.emit(ProgressEvent::ImagesProgress {
                completed,
                total,
                elapsed_seconds: started.elapsed().as_secs_f64(),
            });
        }

        info!(completed, total, "images fetched");
        self.progress.emit(ProgressEvent::ImagesComplete { completed });
    }

    async fn fetch_image_with_fallback(&mut self, relative: &str, primary: &str) -> Option<Vec<u8>> {
        let mut attempts = Vec::new();
        let candidates = std::iter::once(primary.to_string()).chain(fallback_candidates(
            relative,
            primary,
            self.metadata,
            self.site,
        ));

        for candidate in candidates {
            let request = FetchRequest::new(&candidate, ContentKind::Image);
            match self.client.fetch(&request).await {
                Ok(response) if response.is_success() => {
                    if candidate != primary {
                        info!(path = %relative, url = %candidate, "image fetched via fallback");
                    }
                    return Some(response.body);
                }
                Ok(response) => attempts.push(format!("{candidate} (status {})", response.status)),
                Err(error) => attempts.push(format!("{candidate} ({error})")),
            }
        }

        self.warn(primary, format!("attempts: {}", attempts.join("; ")));
        None
    }

    /// Stage 4: stylesheet images still lacking bytes.
    #[instrument(skip_all, fields(count = registry.css_assets().len()))]
    pub async fn fetch_css_images(&mut self, registry: &mut AssetRegistry) {
        let pending = registry.css_assets().pending();
        self.progress.emit(ProgressEvent::CssImagesStart {
            total: pending.len(),
        });
        for (path, url) in pending {
            let slot = match self.fetch_optional(&url, ContentKind::Image).await {
                Some(data) => AssetSlot::Fetched(data),
                None => AssetSlot::Failed,
            };
            registry.css_assets_mut().set_slot(&path, slot);
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::progress::NoopProgress;
    use crate::test_support::{RouteTransport, client};

    fn site() -> SiteConfig {
        SiteConfig::new("https://learning.example.com")
    }

    // ==================== Stylesheet Stage Tests ====================

    #[tokio::test]
    async fn test_stylesheet_registers_font_and_image() {
        let transport = Arc::new(
            RouteTransport::new()
                .ok(
                    "https://host/Styles/theme.css",
                    "@font-face{src:url(fonts/a.woff2)} p{display:none;background:url(img/b.png)}",
                )
                .ok("https://host/Styles/fonts/a.woff2", vec![0u8, 1])
                .ok("https://host/Styles/img/b.png", vec![2u8]),
        );
        let client = client(transport.clone());
        let metadata = BookMetadata::default();
        let site = site();
        let mut registry = AssetRegistry::new();
        registry.register_css("https://host/Styles/theme.css");

        let warnings = AssetCollector::new(&client, &metadata, &site, &NoopProgress)
            .collect(&mut registry)
            .await;

        assert!(warnings.is_empty());
        assert_eq!(registry.fonts().len(), 1);
        assert_eq!(
            registry.fonts().get("Styles/fonts/a.woff2").unwrap().data(),
            Some(&[0u8, 1][..])
        );
        assert_eq!(registry.css_assets().len(), 1);
        assert!(registry.css_assets().get("Styles/img/b.png").unwrap().data().is_some());
        let content = registry.css_sources()[0].content.as_deref().unwrap();
        assert!(content.contains("visibility: hidden"));
    }

    #[tokio::test]
    async fn test_failed_stylesheet_is_a_warning() {
        let transport = Arc::new(RouteTransport::new().route("https://host/a.css", 500, ""));
        let client = client(transport);
        let metadata = BookMetadata::default();
        let site = site();
        let mut registry = AssetRegistry::new();
        registry.register_css("https://host/a.css");

        let warnings = AssetCollector::new(&client, &metadata, &site, &NoopProgress)
            .collect(&mut registry)
            .await;

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].url, "https://host/a.css");
        assert!(registry.css_sources()[0].content.is_none());
    }

    // ==================== Font Collision Tests ====================

    #[tokio::test]
    async fn test_font_yields_to_existing_image_claim() {
        let transport = Arc::new(RouteTransport::new().ok("https://host/x.svg", vec![1u8]));
        let client = client(transport.clone());
        let metadata = BookMetadata::default();
        let site = site();
        let mut registry = AssetRegistry::new();
        registry.register_css_asset("Styles/x.svg", "https://host/x.svg");
        registry.register_font("Styles/x.svg", "https://host/font/x.svg");

        AssetCollector::new(&client, &metadata, &site, &NoopProgress)
            .collect(&mut registry)
            .await;

        assert_eq!(transport.count("https://host/font/x.svg"), 0);
        assert!(registry.css_assets().get("Styles/x.svg").unwrap().data().is_some());
    }

    #[tokio::test]
    async fn test_stylesheet_image_in_images_reuses_page_image() {
        let transport = Arc::new(
            RouteTransport::new()
                .ok(
                    "https://host/book/Styles/s.css",
                    ".a{background:url(../Images/bg.jpg)} .b{background:url(../Images/tile.png)}",
                )
                .ok("https://host/book/files/Images/bg.jpg", vec![1u8])
                .ok("https://host/book/Images/bg.jpg", vec![2u8])
                .ok("https://host/book/Images/tile.png", vec![3u8]),
        );
        let client = client(transport.clone());
        let metadata = BookMetadata::default();
        let site = site();
        let mut registry = AssetRegistry::new();
        registry.register_image("bg.jpg", "https://host/book/files/Images/bg.jpg");
        registry.register_css("https://host/book/Styles/s.css");

        let warnings = AssetCollector::new(&client, &metadata, &site, &NoopProgress)
            .collect(&mut registry)
            .await;

        assert!(warnings.is_empty());
        assert_eq!(registry.images().get("bg.jpg").unwrap().data(), Some(&[1u8][..]));
        assert_eq!(registry.images().get("tile.png").unwrap().data(), Some(&[3u8][..]));
        assert!(registry.css_assets().is_empty());
        assert_eq!(transport.count("https://host/book/Images/bg.jpg"), 0);
    }

    // ==================== Image Stage Tests ====================

    #[tokio::test]
    async fn test_image_falls_back_to_lowercase_directory() {
        let transport = Arc::new(
            RouteTransport::new().ok("https://host/book/files/images/fig.png", vec![9u8]),
        );
        let client = client(transport.clone());
        let metadata = BookMetadata::default();
        let site = site();
        let mut registry = AssetRegistry::new();
        registry.register_image("fig.png", "https://host/book/files/Images/fig.png");

        let warnings = AssetCollector::new(&client, &metadata, &site, &NoopProgress)
            .collect(&mut registry)
            .await;

        assert!(warnings.is_empty());
        assert_eq!(registry.images().get("fig.png").unwrap().data(), Some(&[9u8][..]));
    }

    #[tokio::test]
    async fn test_exhausted_fallbacks_leave_image_unfetched() {
        let transport = Arc::new(RouteTransport::new());
        let client = client(transport.clone());
        let metadata = BookMetadata::default();
        let site = site();
        let mut registry = AssetRegistry::new();
        registry.register_image("a.png", "https://host/a.png");

        let warnings = AssetCollector::new(&client, &metadata, &site, &NoopProgress)
            .collect(&mut registry)
            .await;

        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].reason.contains("status 404"));
        assert_eq!(
            registry.images().get("a.png").unwrap().slot,
            AssetSlot::Failed
        );
        assert_eq!(transport.count("https://host/a.png"), 1);
    }

    #[tokio::test]
    async fn test_image_progress_events() {
        let transport = Arc::new(RouteTransport::new().ok("https://host/a.png", vec![1u8]));
        let client = client(transport);
        let metadata = BookMetadata::default();
        let site = site();
        let mut registry = AssetRegistry::new();
        registry.register_image("a.png", "https://host/a.png");
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        AssetCollector::new(&client, &metadata, &site, &tx)
            .collect(&mut registry)
            .await;
        drop(tx);

        let mut stages = Vec::new();
        while let Some(event) = rx.recv().await {
            stages.push(serde_json::to_value(&event).unwrap()["stage"].clone());
        }
        assert_eq!(
            stages,
            vec!["images-start", "images-progress", "images-complete", "css-images-start"]
        );
    }
}
