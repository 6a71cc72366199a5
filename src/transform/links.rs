//! Link rewriting into package-relative references.

use url::Url;

use crate::assets::AssetRegistry;
use crate::naming::{
    has_image_extension, is_absolute_url, is_doc_link, is_image_link, last_segment, strip_query,
    to_xhtml_name,
};

/// Directory prefixes dropped from image paths (first match only).
const IMAGE_DIR_PREFIXES: [&str; 3] = ["images/", "graphics/", "assets/"];

/// Where a book lives on the remote host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookLocation {
    book_url: String,
    files_marker: String,
}

impl BookLocation {
    /// Creates a location from the book URL (trailing slashes ignored).
    #[must_use]
    pub fn new(book_url: &str) -> Self {
        let book_url = book_url.trim_end_matches('/').to_string();
        let id_segment = book_url.rsplit('/').next().unwrap_or_default();
        let files_marker = format!("{id_segment}/files/");
        Self {
            book_url,
            files_marker,
        }
    }

    /// Book URL without a trailing slash.
    #[must_use]
    pub fn book_url(&self) -> &str {
        &self.book_url
    }

    /// Base against which relative asset links resolve.
    #[must_use]
    pub fn files_base(&self) -> String {
        format!("{}/files/", self.book_url)
    }

    /// Resolves `link` against the book's `files/` directory.
    #[must_use]
    pub fn resolve_asset(&self, link: &str) -> String {
        resolve_url(link, &self.files_base())
    }

    /// Package-relative image path (under `Images/`) for an absolute URL.
    ///
    /// Returns `None` when the URL has no file name.
    #[must_use]
    pub fn local_image_path(&self, url: &str) -> Option<String> {
        let normalized = strip_query(url);
        let candidate = if !self.book_url.is_empty() && normalized.contains(&self.files_marker) {
            normalized.rsplit(&self.files_marker).next().unwrap_or(normalized)
        } else {
            last_segment(normalized)
        };
        let mut relative = candidate.trim_start_matches('/');
        for prefix in IMAGE_DIR_PREFIXES {
            if relative.len() >= prefix.len()
                && relative.is_char_boundary(prefix.len())
                && relative[..prefix.len()].eq_ignore_ascii_case(prefix)
            {
                relative = &relative[prefix.len()..];
                break;
            }
        }
        if last_segment(relative).is_empty() {
            None
        } else {
            Some(relative.to_string())
        }
    }

    /// Registers an image by URL and returns its `Images/...` reference.
    ///
    /// Relative URLs resolve against the book's `files/` directory.
    pub fn register_image(&self, url: &str, registry: &mut AssetRegistry) -> Option<String> {
        if url.is_empty() {
            return None;
        }
        let absolute = if is_absolute_url(url) {
            url.to_string()
        } else {
            self.resolve_asset(url)
        };
        let relative = self.local_image_path(&absolute)?;
        Some(registry.register_image(&relative, &absolute))
    }

    /// Rewrites one `href`/`src` value.
    ///
    /// Asset links are registered and become `Images/...` references,
    /// relative document links shrink to their file name with an `.xhtml`
    /// extension, and links into the book itself are made relative first.
    /// `mailto:` and foreign links pass through.
    pub fn rewrite_link(&self, link: &str, registry: &mut AssetRegistry) -> String {
        if link.is_empty() || link.starts_with("mailto") {
            return link.to_string();
        }
        if !is_absolute_url(link) {
            if !is_doc_link(link)
                && is_image_link(link)
                && let Some(local) = self.register_image(link, registry)
            {
                return local;
            }
            let rewritten = to_xhtml_name(last_segment(link));
            return if rewritten.is_empty() {
                link.to_string()
            } else {
                rewritten
            };
        }
        if !is_doc_link(link) && has_image_extension(link) {
            if let Some(local) = self.register_image(link, registry) {
                return local;
            }
        } else if !self.book_url.is_empty() && link.contains(&self.book_url) {
            let partial = link.replacen(&self.book_url, "", 1);
            let partial = partial.trim_start_matches('/');
            if !partial.is_empty() {
                return self.rewrite_link(partial, registry);
            }
        }
        link.to_string()
    }
}

/// Resolves `link` against `base`, returning `link` unchanged if either is unusable.
#[must_use]
pub fn resolve_url(link: &str, base: &str) -> String {
    Url::parse(base)
        .and_then(|base| base.join(link))
        .map_or_else(|_| link.to_string(), |url| url.to_string())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const BOOK: &str = "https://learning.example.com/api/v1/book/9781098100001/";

    fn location() -> BookLocation {
        BookLocation::new(BOOK)
    }

    // ==================== Local Path Tests ====================

    #[test]
    fn test_local_path_strips_files_marker_and_image_dir() {
        let loc = location();
        assert_eq!(
            loc.local_image_path(
                "https://learning.example.com/api/v1/book/9781098100001/files/images/ch01/fig1.png?v=2"
            ),
            Some("ch01/fig1.png".to_string())
        );
        assert_eq!(
            loc.local_image_path("https://cdn.example.com/x/Graphics/fig2.jpg"),
            Some("fig2.jpg".to_string())
        );
        assert_eq!(
            loc.local_image_path(
                "https://learning.example.com/api/v1/book/9781098100001/files/Assets/logo.svg"
            ),
            Some("logo.svg".to_string())
        );
    }

    #[test]
    fn test_local_path_requires_file_name() {
        assert_eq!(location().local_image_path("https://cdn.example.com/dir/"), None);
    }

    // ==================== Rewrite Tests ====================

    #[test]
    fn test_relative_image_is_registered_once() {
        let loc = location();
        let mut registry = AssetRegistry::new();
        assert_eq!(loc.rewrite_link("images/fig1.png", &mut registry), "Images/fig1.png");
        assert_eq!(loc.rewrite_link("images/fig1.png", &mut registry), "Images/fig1.png");
        assert_eq!(registry.images().len(), 1);
        assert_eq!(
            registry.images().get("fig1.png").unwrap().url,
            "https://learning.example.com/api/v1/book/9781098100001/files/images/fig1.png"
        );
    }

    #[test]
    fn test_relative_document_link_becomes_xhtml_file_name() {
        let mut registry = AssetRegistry::new();
        assert_eq!(
            location().rewrite_link("../text/ch02.html#sec1", &mut registry),
            "ch02.xhtml#sec1"
        );
        assert!(registry.images().is_empty());
    }

    #[test]
    fn test_book_links_are_made_relative() {
        let mut registry = AssetRegistry::new();
        assert_eq!(
            location().rewrite_link(
                "https://learning.example.com/api/v1/book/9781098100001/ch03.html",
                &mut registry
            ),
            "ch03.xhtml"
        );
    }

    #[test]
    fn test_absolute_image_is_registered() {
        let mut registry = AssetRegistry::new();
        assert_eq!(
            location().rewrite_link("https://cdn.example.com/covers/cover.jpg", &mut registry),
            "Images/cover.jpg"
        );
    }

    #[test]
    fn test_passthrough_links() {
        let loc = location();
        let mut registry = AssetRegistry::new();
        assert_eq!(loc.rewrite_link("mailto:a@b.c", &mut registry), "mailto:a@b.c");
        assert_eq!(
            loc.rewrite_link("https://www.rust-lang.org/learn", &mut registry),
            "https://www.rust-lang.org/learn"
        );
        assert_eq!(loc.rewrite_link("#note1", &mut registry), "#note1");
        assert!(registry.images().is_empty());
    }

    #[test]
    fn test_resolve_url() {
        assert_eq!(
            resolve_url("../img/a.png", "https://host/Styles/css/theme.css"),
            "https://host/Styles/img/a.png"
        );
        assert_eq!(resolve_url("x", "not a url"), "x");
    }
}
