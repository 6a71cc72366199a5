//! Stylesheet scanning.
//!
//! Fetched stylesheets are stored under `Styles/`. Their `url(...)`
//! references are classified as fonts or images and mapped to package
//! paths rooted at `Styles/`. Absolute references are rewritten in the
//! stylesheet text so they point at the packaged copy.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

use crate::naming::{has_font_extension, has_image_extension, resolve_styles_relative_path, strip_query};
use crate::transform::resolve_url;

#[allow(clippy::expect_used)]
static HIDDEN_RULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)display\s*:\s*none").expect("hidden rule regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)url\(([^)]+)\)").expect("css url regex is valid") // Static pattern, safe to panic
});

/// Kind of asset referenced from a stylesheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssAssetKind {
    Font,
    Image,
}

/// An asset referenced by `url(...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssReference {
    pub kind: CssAssetKind,
    /// Package path, starting at `Styles/` unless `..` escaped it.
    pub path: String,
    /// Absolute source URL.
    pub url: String,
}

/// A stylesheet ready for packaging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedStylesheet {
    pub content: String,
    pub references: Vec<CssReference>,
}

/// Rewrites `display: none` to `visibility: hidden` so hidden assets are kept.
#[must_use]
pub fn neutralize_hidden_rules(css: &str) -> String {
    HIDDEN_RULE.replace_all(css, "visibility: hidden").into_owned()
}

/// Neutralizes hidden rules and collects font and image references.
///
/// `source_url` is the stylesheet's own URL; references resolve against
/// its directory.
#[must_use]
pub fn scan_stylesheet(source_url: &str, css: &str) -> ScannedStylesheet {
    let neutralized = neutralize_hidden_rules(css);
    let mut references = Vec::new();

    let content = CSS_URL.replace_all(&neutralized, |caps: &Captures<'_>| {
        let whole = caps[0].to_string();
        let raw = caps[1].trim().trim_matches(|c| c == '"' || c == '\'');
        if raw.is_empty() || raw.starts_with("data:") || raw.starts_with("about:") {
            return whole;
        }
        let kind = if has_font_extension(raw) {
            CssAssetKind::Font
        } else if has_image_extension(raw) {
            CssAssetKind::Image
        } else {
            return whole;
        };

        let url = resolve_url(raw, source_url);
        let (relative, rewrite) = match absolute_relative_path(raw, &url) {
            Some(host_path) => (host_path, true),
            None => {
                let stripped = strip_query(raw);
                (stripped.to_string(), stripped.len() != raw.len())
            }
        };
        let path = resolve_styles_relative_path(&relative);
        references.push(CssReference { kind, path, url });

        if rewrite {
            format!("url(\"{relative}\")")
        } else {
            whole
        }
    });

    ScannedStylesheet {
        content: content.into_owned(),
        references,
    }
}

/// `{host}/{path}` for references that name their own host.
fn absolute_relative_path(raw: &str, resolved: &str) -> Option<String> {
    if !(raw.starts_with("//") || Url::parse(raw).is_ok()) {
        return None;
    }
    let parsed = Url::parse(resolved).ok()?;
    let host = parsed.host_str()?;
    Some(format!("{host}/{}", parsed.path().trim_start_matches('/')))
}
