//! Book metadata and chapter model.
//!
//! The remote API describes a book through two JSON documents (a primary
//! and a secondary surface) and a paginated chapter list. The types here
//! deserialize those payloads leniently: `null` where a list is expected
//! is an empty list, and contributors may be plain strings or objects with
//! a `name` field.
//!
//! [`resolver`] performs the requests; [`Chapter`] is the normalized form
//! consumed by the transformer.

mod error;
pub mod resolver;

use serde::{Deserialize, Deserializer};

use crate::naming::{is_absolute_url, last_segment};

pub use error::MetadataError;
pub use resolver::MetadataResolver;

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawContributor {
    Plain(String),
    Named {
        #[serde(default)]
        name: Option<String>,
    },
}

/// An author, subject, topic, or publisher entry.
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "RawContributor")]
pub struct Contributor {
    /// Display name; may be empty when the API omitted it.
    pub name: String,
}

impl From<RawContributor> for Contributor {
    fn from(raw: RawContributor) -> Self {
        let name = match raw {
            RawContributor::Plain(name) => name,
            RawContributor::Named { name } => name.unwrap_or_default(),
        };
        Self { name }
    }
}

impl From<&str> for Contributor {
    fn from(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

/// One node of the book's nested table of contents.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TocEntry {
    pub href: Option<String>,
    pub ourn: Option<String>,
    pub fragment: Option<String>,
    pub reference_id: Option<String>,
    pub title: Option<String>,
    pub label: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub depth: u32,
    #[serde(deserialize_with = "nullable")]
    pub children: Vec<TocEntry>,
}

/// Merged book metadata. Immutable once resolved.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BookMetadata {
    #[serde(deserialize_with = "nullable")]
    pub title: String,
    #[serde(deserialize_with = "nullable")]
    pub authors: Vec<Contributor>,
    #[serde(deserialize_with = "nullable")]
    pub subjects: Vec<Contributor>,
    #[serde(deserialize_with = "nullable")]
    pub topics: Vec<Contributor>,
    #[serde(deserialize_with = "nullable")]
    pub publishers: Vec<Contributor>,
    pub rights: Option<String>,
    pub isbn: Option<String>,
    #[serde(alias = "issued")]
    pub publication_date: Option<String>,
    /// Cover image URL.
    pub cover: Option<String>,
    /// Secondary cover image URL.
    pub cover_url: Option<String>,
    /// Book URL on the API host; anchors `files/` asset paths.
    pub url: Option<String>,
    /// Canonical reader URL.
    pub web_url: Option<String>,
    /// First page of the chapter list.
    pub chapters: Option<String>,
    /// Descriptions keyed by MIME type.
    pub descriptions: serde_json::Value,
    pub description: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub table_of_contents: Vec<TocEntry>,
}

impl BookMetadata {
    /// Non-empty author names, in order.
    #[must_use]
    pub fn author_names(&self) -> Vec<String> {
        names(&self.authors)
    }

    /// Non-empty subject names, in order.
    #[must_use]
    pub fn subject_names(&self) -> Vec<String> {
        names(&self.subjects)
    }

    /// Non-empty publisher names, in order.
    #[must_use]
    pub fn publisher_names(&self) -> Vec<String> {
        names(&self.publishers)
    }

    /// Plain-text description, if any.
    #[must_use]
    pub fn plain_description(&self) -> &str {
        self.descriptions
            .get("text/plain")
            .and_then(serde_json::Value::as_str)
            .filter(|text| !text.is_empty())
            .or(self.description.as_deref())
            .unwrap_or_default()
    }

    /// Book URL used to resolve `files/` assets, without a trailing slash.
    #[must_use]
    pub fn book_url(&self) -> &str {
        non_empty(self.url.as_deref())
            .or(non_empty(self.web_url.as_deref()))
            .unwrap_or_default()
            .trim_end_matches('/')
    }

    /// Canonical page URL: `web_url`, else `url`.
    #[must_use]
    pub fn canonical_url(&self) -> &str {
        non_empty(self.web_url.as_deref())
            .or(non_empty(self.url.as_deref()))
            .unwrap_or_default()
    }

    /// Package identifier: the ISBN, else `book_id`.
    #[must_use]
    pub fn identifier<'a>(&'a self, book_id: &'a str) -> &'a str {
        non_empty(self.isbn.as_deref()).unwrap_or(book_id)
    }

    /// Metadata cover URL, if present.
    #[must_use]
    pub fn cover(&self) -> Option<&str> {
        non_empty(self.cover.as_deref())
    }
}

fn names(contributors: &[Contributor]) -> Vec<String> {
    contributors
        .iter()
        .map(|c| c.name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Asset references declared by a chapter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelatedAssets {
    #[serde(deserialize_with = "nullable")]
    pub images: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub stylesheets: Vec<String>,
    #[serde(deserialize_with = "nullable")]
    pub site_styles: Vec<String>,
}

/// A chapter as listed by the API.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ChapterRecord {
    pub title: Option<String>,
    pub content_url: Option<String>,
    pub ourn: Option<String>,
    pub filename: Option<String>,
    #[serde(deserialize_with = "nullable")]
    pub related_assets: RelatedAssets,
}

/// A chapter ready for transformation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    /// Zero-based position in the spine.
    pub index: usize,
    pub title: String,
    pub content_url: String,
    /// Package filename, always ending in `.xhtml`.
    pub filename: String,
    /// Absolute image URLs declared by the API.
    pub images: Vec<String>,
    /// Absolute stylesheet URLs (chapter styles, then site styles).
    pub stylesheets: Vec<String>,
}

impl Chapter {
    /// Normalizes an API record.
    ///
    /// `base_url` is the canonical book URL: images resolve under
    /// `{base_url}/files/`, stylesheets directly against it.
    ///
    /// # Errors
    ///
    /// Returns [`MetadataError::MissingContentUrl`] when the record has no
    /// content URL.
    pub fn from_record(
        index: usize,
        record: &ChapterRecord,
        base_url: &str,
    ) -> Result<Self, MetadataError> {
        let title = record
            .title
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("Chapter {}", index + 1));
        let content_url = record
            .content_url
            .clone()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| MetadataError::MissingContentUrl {
                title: title.clone(),
            })?;

        let assets = &record.related_assets;
        let images = assets
            .images
            .iter()
            .map(|img| {
                if is_absolute_url(img) {
                    img.clone()
                } else {
                    format!("{base_url}/files/{img}")
                }
            })
            .collect();
        let stylesheets = assets
            .stylesheets
            .iter()
            .chain(&assets.site_styles)
            .map(|css| {
                if is_absolute_url(css) {
                    css.clone()
                } else {
                    format!("{base_url}{css}")
                }
            })
            .collect();

        Ok(Self {
            index,
            filename: chapter_filename(record),
            title,
            content_url,
            images,
            stylesheets,
        })
    }
}

/// Trailing file component of an opaque resource URN.
#[must_use]
pub fn ourn_filename(ourn: &str) -> &str {
    let after_chapter = ourn.rsplit("chapter:").next().unwrap_or(ourn);
    after_chapter.rsplit("%2f").next().unwrap_or(after_chapter)
}

/// Package filename for a chapter record.
///
/// Taken from the URN, else the declared filename, else the title; `.html`
/// becomes `.xhtml` and other names get `.xhtml` appended.
#[must_use]
pub fn chapter_filename(record: &ChapterRecord) -> String {
    let raw = match (&record.ourn, &record.filename) {
        (Some(ourn), _) if !ourn.is_empty() => ourn_filename(ourn).to_string(),
        (_, Some(filename)) if !filename.is_empty() => last_segment(filename).to_string(),
        _ => format!(
            "{}.xhtml",
            record.title.as_deref().filter(|t| !t.is_empty()).unwrap_or("chapter")
        ),
    };
    let name = raw.replacen(".html", ".xhtml", 1);
    if name.to_ascii_lowercase().ends_with(".xhtml") {
        name
    } else {
        format!("{name}.xhtml")
    }
}
