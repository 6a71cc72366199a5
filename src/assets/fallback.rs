//! Alternate URLs for page images that fail to download.

use std::sync::LazyLock;

use regex::Regex;

use crate::convert::SiteConfig;
use crate::metadata::BookMetadata;

/// Cover file names guessed inside an `Images/` directory.
const COVER_GUESSES: [&str; 4] = ["cover.jpg", "cover.jpeg", "cover.png", "cover-large.jpg"];

#[allow(clippy::expect_used)]
static IMAGES_LEAF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Images/[^/]*$").expect("images leaf regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static ISBN_IMAGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)Images/(\d{10,13})\.(jpg|jpeg|png|gif)$").expect("isbn image regex is valid") // Static pattern, safe to panic
});

/// Ordered, deduplicated fallback URLs for an image, excluding `primary`.
///
/// Candidates come from, in order: `/Images/` and `/images/` case
/// variants, cover file guesses under `files/Images/`, the cover CDN for an
/// ISBN-like file name, and the metadata cover URLs.
#[must_use]
pub fn fallback_candidates(
    relative: &str,
    primary: &str,
    metadata: &BookMetadata,
    site: &SiteConfig,
) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if !candidate.is_empty() && candidate != primary && !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    };

    if primary.contains("/Images/") {
        push(primary.replacen("/Images/", "/images/", 1));
    }
    if primary.contains("/images/") {
        push(primary.replacen("/images/", "/Images/", 1));
    }

    if primary.contains("/files/Images/") {
        let base = IMAGES_LEAF.replace(primary, "Images/");
        for guess in COVER_GUESSES {
            push(format!("{base}{guess}"));
        }
    }

    if let Some(caps) = ISBN_IMAGE.captures(primary) {
        for url in site.cover_urls(&caps[1]) {
            push(url);
        }
    }

    if let Some(cover) = metadata.cover() {
        push(cover.to_string());
    }
    if !relative.is_empty()
        && let Some(cover_url) = metadata.cover_url.as_deref()
    {
        push(cover_url.to_string());
    }

    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteConfig {
        SiteConfig::new("https://learning.example.com")
    }

    #[test]
    fn test_case_variants_and_cover_guesses() {
        let primary = "https://h/book/files/Images/fig.png";
        let candidates = fallback_candidates("fig.png", primary, &BookMetadata::default(), &site());
        assert_eq!(
            candidates,
            vec![
                "https://h/book/files/images/fig.png",
                "https://h/book/files/Images/cover.jpg",
                "https://h/book/files/Images/cover.jpeg",
                "https://h/book/files/Images/cover.png",
                "https://h/book/files/Images/cover-large.jpg",
            ]
        );
    }

    #[test]
    fn test_isbn_file_names_try_cover_cdn() {
        let primary = "https://h/x/Images/9781492052593.jpg";
        let metadata = BookMetadata {
            cover: Some("https://h/meta-cover.jpg".into()),
            cover_url: Some("https://h/meta-cover.jpg".into()),
            ..BookMetadata::default()
        };
        let candidates = fallback_candidates("9781492052593.jpg", primary, &metadata, &site());
        assert_eq!(
            candidates,
            vec![
                "https://h/x/images/9781492052593.jpg",
                "https://learning.example.com/library/cover/9781492052593/600w/",
                "https://learning.example.com/library/cover/9781492052593/400w/",
                "https://learning.example.com/library/cover/9781492052593/250w/",
                "https://learning.example.com/library/cover/9781492052593/",
                "https://h/meta-cover.jpg",
            ]
        );
    }

    #[test]
    fn test_primary_is_never_a_candidate() {
        let metadata = BookMetadata {
            cover: Some("https://h/cover.jpg".into()),
            ..BookMetadata::default()
        };
        assert!(fallback_candidates("cover.jpg", "https://h/cover.jpg", &metadata, &site()).is_empty());
    }
}
