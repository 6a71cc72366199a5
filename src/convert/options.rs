//! Conversion options and site URL layout.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default reader host.
pub const DEFAULT_SITE_URL: &str = "https://learning.oreilly.com";

/// Cover CDN width variants, tried in order before the bare cover URL.
const COVER_SIZES: [&str; 3] = ["600w", "400w", "250w"];

/// Reader theme applied to every chapter document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    /// No theme stylesheet; documents keep the white wrapper class.
    #[default]
    None,
    White,
    Sepia,
    Black,
}

impl Theme {
    /// Wrapper class suffix (`ucvMode-{mode}`).
    #[must_use]
    pub fn mode(self) -> &'static str {
        match self {
            Self::None | Self::White => "white",
            Self::Sepia => "sepia",
            Self::Black => "black",
        }
    }

    /// Lowercase name as accepted by [`FromStr`].
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::White => "white",
            Self::Sepia => "sepia",
            Self::Black => "black",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for an unrecognized theme name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown theme '{0}' (expected none, white, sepia, or black)")]
pub struct ParseThemeError(String);

impl FromStr for Theme {
    type Err = ParseThemeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "white" => Ok(Self::White),
            "sepia" => Ok(Self::Sepia),
            "black" => Ok(Self::Black),
            _ => Err(ParseThemeError(s.to_string())),
        }
    }
}

/// Per-run rendering options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConversionOptions {
    pub theme: Theme,
    /// Adds the reflow stylesheet for e-ink readers.
    pub kindle: bool,
}

/// URL layout of the reader site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteConfig {
    base_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self::new(DEFAULT_SITE_URL)
    }
}

impl SiteConfig {
    /// Creates a layout rooted at `base_url` (trailing slashes ignored).
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url }
    }

    /// Site root without a trailing slash.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Page used to verify the session.
    #[must_use]
    pub fn profile_url(&self) -> String {
        format!("{}/profile/", self.base_url)
    }

    /// Primary metadata document.
    #[must_use]
    pub fn primary_metadata_url(&self, book_id: &str) -> String {
        format!("{}/api/v2/epubs/urn:orm:book:{book_id}/", self.base_url)
    }

    /// Secondary metadata document.
    #[must_use]
    pub fn secondary_metadata_url(&self, book_id: &str) -> String {
        format!("{}/api/v1/book/{book_id}/", self.base_url)
    }

    /// Reader page used as the initial referrer.
    #[must_use]
    pub fn library_url(&self, book_id: &str) -> String {
        format!("{}/library/view/{book_id}/", self.base_url)
    }

    /// Cover CDN candidates for an ISBN-like key, largest first.
    #[must_use]
    pub fn cover_urls(&self, isbn: &str) -> Vec<String> {
        COVER_SIZES
            .iter()
            .map(|size| format!("{}/library/cover/{isbn}/{size}/", self.base_url))
            .chain(std::iter::once(format!(
                "{}/library/cover/{isbn}/",
                self.base_url
            )))
            .collect()
    }
}
