//! Asset graph: registration, stylesheet scanning, and downloading.
//!
//! Chapters register stylesheets and page images while they are
//! transformed. Once every chapter is done the [`AssetCollector`] fetches
//! stylesheets (discovering fonts and stylesheet images), then fonts, page
//! images, and stylesheet images, always through the shared session client.

mod collector;
pub mod css;
pub mod fallback;
mod registry;

use serde::Serialize;

pub use collector::AssetCollector;
pub use css::{CssAssetKind, CssReference, ScannedStylesheet, scan_stylesheet};
pub use fallback::fallback_candidates;
pub use registry::{AssetEntry, AssetMap, AssetRegistry, AssetSlot, CssSource};

/// An optional asset that could not be fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetWarning {
    pub url: String,
    pub reason: String,
}

impl AssetWarning {
    pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for AssetWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unable to fetch {}: {}", self.url, self.reason)
    }
}
