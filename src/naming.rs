//! Name and path utilities shared across the conversion pipeline.
//!
//! This module turns human titles into filesystem-safe names, classifies
//! URLs by the kind of asset they point at, resolves stylesheet-relative
//! references against the virtual `Styles/` root, and produces valid XML
//! identifiers for package documents.

use std::sync::LazyLock;

use regex::Regex;

/// Characters that are never allowed in generated folder or file names.
#[allow(clippy::expect_used)]
static RESERVED_NAME_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[~#%&*{}\\<>?/`'"|+:]"#).expect("reserved char regex is valid") // Static pattern, safe to panic
});

/// Runs of whitespace, collapsed to a single space.
#[allow(clippy::expect_used)]
static WHITESPACE_RUN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\s+").expect("whitespace regex is valid") // Static pattern, safe to panic
});

/// Image extensions recognized for page and CSS-referenced images.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "svg", "webp"];

/// Font extensions recognized in stylesheet `url(...)` references.
pub const FONT_EXTENSIONS: &[&str] = &["otf", "ttf", "woff", "woff2", "eot"];

/// Name used when every segment of a file name cleans down to nothing.
const EMPTY_FILE_NAME: &str = "download";

/// A colon past this character index truncates the title instead of being replaced.
const SUBTITLE_COLON_INDEX: usize = 15;

/// Cleans a human title into a filesystem-safe name.
///
/// A colon that appears late in the title (past character 15) marks a
/// subtitle which is dropped; earlier colons become commas. Reserved
/// characters are replaced with `_` and whitespace is collapsed.
///
/// # Example
///
/// ```
/// use epub_downloader_core::naming::clean_name;
///
/// assert_eq!(clean_name("Programming Rust Safely: Fast code"), "Programming Rust Safely");
/// assert_eq!(clean_name("C++: A Tour"), "C__, A Tour");
/// ```
#[must_use]
pub fn clean_name(name: &str) -> String {
    let mut cleaned = name.to_string();
    if let Some(byte_index) = cleaned.find(':') {
        let char_index = cleaned[..byte_index].chars().count();
        if char_index > SUBTITLE_COLON_INDEX {
            cleaned.truncate(byte_index);
        } else {
            cleaned = cleaned.replace(':', ",");
        }
    }
    let replaced = RESERVED_NAME_CHARS.replace_all(&cleaned, "_");
    WHITESPACE_RUN.replace_all(&replaced, " ").trim().to_string()
}

/// Builds the output folder name: the first two comma parts of the title plus the book id.
#[must_use]
pub fn book_folder_name(title: &str, book_id: &str) -> String {
    let cleaned = clean_name(title);
    let prefix = cleaned.split(',').take(2).collect::<Vec<_>>().join(",");
    let prefix = if prefix.is_empty() { cleaned } else { prefix };
    format!("{prefix} ({book_id})").trim().to_string()
}

/// Joins cleaned name segments with ` - `, skipping the ones that clean to nothing.
#[must_use]
pub fn book_file_stem(segments: &[&str]) -> String {
    let cleaned: Vec<String> = segments
        .iter()
        .map(|segment| clean_name(segment))
        .filter(|segment| !segment.is_empty())
        .collect();

    if cleaned.is_empty() {
        return EMPTY_FILE_NAME.to_string();
    }

    let joined = cleaned.join(" - ");
    WHITESPACE_RUN.replace_all(&joined, " ").trim().to_string()
}

/// Relative path of the produced artifact:
/// `<title> (<id>)/<title> - <authors> - <id>.epub`.
#[must_use]
pub fn artifact_path(title: &str, authors: &[String], book_id: &str) -> String {
    let folder = book_folder_name(title, book_id);
    let authors = authors.join(", ");
    let stem = book_file_stem(&[title, &authors, book_id]);
    format!("{folder}/{stem}.epub")
}

/// Escapes the five XML special characters.
#[must_use]
pub fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Returns true when `link` parses as a URL with a scheme.
#[must_use]
pub fn is_absolute_url(link: &str) -> bool {
    url::Url::parse(link).is_ok()
}

/// Returns true for links pointing at documents rather than assets.
#[must_use]
pub fn is_doc_link(link: &str) -> bool {
    [".html", ".xhtml", ".pdf"].iter().any(|ext| link.contains(ext))
}

/// Returns true for links that look like images, either by path hint or extension.
#[must_use]
pub fn is_image_link(link: &str) -> bool {
    let lowered = link.to_ascii_lowercase();
    if ["cover", "images", "graphics"]
        .iter()
        .any(|hint| lowered.contains(hint))
    {
        return true;
    }
    lowered
        .rsplit('.')
        .next()
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext))
}

/// Lowercased extension of the last path segment, ignoring query and fragment.
#[must_use]
pub fn link_extension(link: &str) -> Option<String> {
    let path = strip_query(link);
    let last = path.rsplit('/').next().unwrap_or(path);
    let (_, ext) = last.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext.to_ascii_lowercase())
    }
}

/// Returns true when the link's extension is a known image extension.
#[must_use]
pub fn has_image_extension(link: &str) -> bool {
    link_extension(link).is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Returns true when the link's extension is a known font extension.
#[must_use]
pub fn has_font_extension(link: &str) -> bool {
    link_extension(link).is_some_and(|ext| FONT_EXTENSIONS.contains(&ext.as_str()))
}

/// Drops any query string and fragment from a link.
#[must_use]
pub fn strip_query(link: &str) -> &str {
    let end = link.find(['?', '#']).unwrap_or(link.len());
    &link[..end]
}

/// Last `/`-separated segment of a link.
#[must_use]
pub fn last_segment(link: &str) -> &str {
    link.rsplit('/').next().unwrap_or(link)
}

/// Replaces the first `.html` with `.xhtml`.
#[must_use]
pub fn to_xhtml_name(name: &str) -> String {
    name.replacen(".html", ".xhtml", 1)
}

/// Resolves a stylesheet-relative reference against the virtual `Styles/` root.
///
/// `.` segments are skipped; `..` first pops resolved segments, then the
/// `Styles` root itself, and is ignored beyond that.
///
/// # Example
///
/// ```
/// use epub_downloader_core::naming::resolve_styles_relative_path;
///
/// assert_eq!(resolve_styles_relative_path("fonts/a.woff2"), "Styles/fonts/a.woff2");
/// assert_eq!(resolve_styles_relative_path("../Images/b.png"), "Images/b.png");
/// ```
#[must_use]
pub fn resolve_styles_relative_path(relative: &str) -> String {
    let mut base = vec!["Styles"];
    let mut resolved: Vec<&str> = Vec::new();
    for segment in relative.split('/').filter(|segment| !segment.is_empty()) {
        match segment {
            "." => {}
            ".." => {
                if resolved.pop().is_none() {
                    base.pop();
                }
            }
            other => resolved.push(other),
        }
    }
    base.extend(resolved);
    base.join("/")
}

/// Turns an arbitrary string into a valid XML name.
///
/// Non-word characters become `_`; a leading digit gets an `_` prefix.
#[must_use]
pub fn make_valid_id(value: &str) -> String {
    let mut id: String = value
        .chars()
        .map(|ch| {
            if ch.is_alphanumeric() || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if id.chars().next().is_some_and(|ch| ch.is_ascii_digit()) {
        id.insert(0, '_');
    }
    id
}

/// Normalizes Windows-style separators to forward slashes.
#[must_use]
pub fn ensure_forward_slashes(path: &str) -> String {
    path.replace('\\', "/")
}
