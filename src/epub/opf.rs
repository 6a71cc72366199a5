//! Manifest, spine, and `content.opf` generation.

use std::collections::HashSet;
use std::fmt::Write as _;

use crate::assets::AssetRegistry;
use crate::metadata::BookMetadata;
use crate::naming::{FONT_EXTENSIONS, IMAGE_EXTENSIONS, escape_xml, link_extension, make_valid_id};
use crate::transform::{ChapterDocument, Cover};

/// Manifest ID reserved for the NCX.
pub const NCX_ID: &str = "ncx";

/// Hands out valid, unique XML IDs.
#[derive(Debug, Default)]
pub struct IdAllocator {
    used: HashSet<String>,
}

impl IdAllocator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator with `ids` already taken.
    #[must_use]
    pub fn with_reserved<'a>(ids: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            used: ids.into_iter().map(str::to_string).collect(),
        }
    }

    /// Sanitizes `candidate` and suffixes `_2`, `_3`, … until it is unused.
    ///
    /// Returns `None` when nothing usable is left after sanitizing.
    pub fn try_allocate(&mut self, candidate: &str) -> Option<String> {
        let base = make_valid_id(candidate);
        if base.is_empty() {
            return None;
        }
        Some(self.claim(&base))
    }

    /// Like [`try_allocate`](Self::try_allocate), falling back to `item`.
    pub fn allocate(&mut self, candidate: &str) -> String {
        self.try_allocate(candidate)
            .unwrap_or_else(|| self.claim("item"))
    }

    /// Claims an already valid `id`, suffixing it when taken.
    pub fn claim(&mut self, id: &str) -> String {
        let mut unique = id.to_string();
        let mut suffix = 2;
        while self.used.contains(&unique) {
            unique = format!("{id}_{suffix}");
            suffix += 1;
        }
        self.used.insert(unique.clone());
        unique
    }
}

/// One `<item>` of the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    pub href: String,
    pub media_type: String,
}

/// The package manifest and reading order.
///
/// Every href appears at most once; the first item claiming it wins.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub items: Vec<ManifestItem>,
    /// Manifest IDs of the chapter documents, in reading order.
    pub spine: Vec<String>,
    /// Manifest ID of the cover image, when it was fetched.
    pub cover_id: Option<String>,
    hrefs: HashSet<String>,
}

impl Manifest {
    /// Builds the manifest from the documents and every fetched asset.
    #[must_use]
    pub fn build(
        documents: &[ChapterDocument],
        registry: &AssetRegistry,
        cover: Option<&Cover>,
    ) -> Self {
        let mut ids = IdAllocator::with_reserved([NCX_ID]);
        let mut manifest = Self::default();

        for document in documents {
            if manifest.claims(&document.filename) {
                continue;
            }
            let stem = strip_xhtml_suffix(&document.filename);
            let id = ids.allocate(stem);
            manifest.push(&id, &document.filename, "application/xhtml+xml");
            manifest.spine.push(id);
        }

        for (relative, _) in registry.images().fetched() {
            let href = format!("Images/{relative}");
            let Some(media_type) = image_media_type(relative) else {
                continue;
            };
            if manifest.claims(&href) {
                continue;
            }
            let id = ids.allocate(&image_id(relative));
            if cover.is_some_and(|c| c.path == href) {
                manifest.cover_id = Some(id.clone());
            }
            manifest.push(&id, &href, &media_type);
        }

        for source in registry.css_sources() {
            let href = format!("Styles/{}", source.filename);
            if source.content.is_some() && !manifest.claims(&href) {
                let id = ids.allocate(&source.filename);
                manifest.push(&id, &href, "text/css");
            }
        }

        for (path, _) in registry.fonts().fetched() {
            if let Some(media_type) = font_media_type(path)
                && !manifest.claims(path)
            {
                let id = ids.allocate(&path.replace(['/', '\\'], "_"));
                manifest.push(&id, path, &media_type);
            }
        }
        for (path, _) in registry.css_assets().fetched() {
            if let Some(media_type) = image_media_type(path)
                && !manifest.claims(path)
            {
                let id = ids.allocate(&path.replace(['/', '\\'], "_"));
                manifest.push(&id, path, &media_type);
            }
        }

        manifest
    }

    /// Whether an item with `href` was already emitted.
    fn claims(&self, href: &str) -> bool {
        self.hrefs.contains(href)
    }

    fn push(&mut self, id: &str, href: &str, media_type: &str) {
        self.hrefs.insert(href.to_string());
        self.items.push(ManifestItem {
            id: id.to_string(),
            href: href.to_string(),
            media_type: media_type.to_string(),
        });
    }
}

fn strip_xhtml_suffix(filename: &str) -> &str {
    let cut = filename.len().saturating_sub(".xhtml".len());
    if filename.is_char_boundary(cut) && filename[cut..].eq_ignore_ascii_case(".xhtml") {
        &filename[..cut]
    } else {
        filename
    }
}

/// `img_` + the relative path up to its first `.`, with separators as `_`.
#[must_use]
pub fn image_id(relative: &str) -> String {
    let stem = relative.split('.').next().unwrap_or(relative);
    format!("img_{}", stem.replace(['/', '\\'], "_"))
}

/// Media type for an image path; `None` for non-image extensions.
#[must_use]
pub fn image_media_type(path: &str) -> Option<String> {
    let ext = link_extension(path)?;
    if !IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        return None;
    }
    Some(match ext.as_str() {
        e if e.contains("jp") => "image/jpeg".to_string(),
        "svg" => "image/svg+xml".to_string(),
        other => format!("image/{other}"),
    })
}

/// Media type for a font path; `None` for non-font extensions.
#[must_use]
pub fn font_media_type(path: &str) -> Option<String> {
    let ext = link_extension(path)?;
    FONT_EXTENSIONS
        .contains(&ext.as_str())
        .then(|| format!("font/{ext}"))
}

/// Renders `content.opf` (OPF 2.0).
#[must_use]
pub fn content_opf(
    metadata: &BookMetadata,
    book_id: &str,
    manifest: &Manifest,
    first_document: Option<&str>,
) -> String {
    let mut creators = String::new();
    for author in metadata.author_names() {
        let author = escape_xml(&author);
        let _ = writeln!(
            creators,
            r#"<dc:creator opf:file-as="{author}" opf:role="aut">{author}</dc:creator>"#
        );
    }
    let mut subjects = String::new();
    for subject in metadata.subject_names() {
        let _ = writeln!(subjects, "<dc:subject>{}</dc:subject>", escape_xml(&subject));
    }
    let publishers = metadata
        .publisher_names()
        .iter()
        .map(|p| escape_xml(p))
        .collect::<Vec<_>>()
        .join(", ");
    let cover_meta = manifest
        .cover_id
        .as_deref()
        .map(|id| format!("<meta name=\"cover\" content=\"{}\"/>\n", escape_xml(id)))
        .unwrap_or_default();

    let mut items = String::new();
    for item in &manifest.items {
        let _ = writeln!(
            items,
            r#"<item id="{}" href="{}" media-type="{}"/>"#,
            escape_xml(&item.id),
            escape_xml(&item.href),
            item.media_type
        );
    }
    let mut itemrefs = String::new();
    for id in &manifest.spine {
        let _ = writeln!(itemrefs, r#"<itemref idref="{}"/>"#, escape_xml(id));
    }
    let guide_href = escape_xml(first_document.unwrap_or("chapter.xhtml"));

    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="bookid" version="2.0">
<metadata xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:opf="http://www.idpf.org/2007/opf">
<dc:title>{title}</dc:title>
{creators}<dc:description>{description}</dc:description>
{subjects}<dc:publisher>{publishers}</dc:publisher>
<dc:rights>{rights}</dc:rights>
<dc:language>en-US</dc:language>
<dc:date>{date}</dc:date>
<dc:identifier id="bookid">{identifier}</dc:identifier>
{cover_meta}</metadata>
<manifest>
<item id="{NCX_ID}" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
{items}</manifest>
<spine toc="{NCX_ID}">
{itemrefs}</spine>
<guide><reference href="{guide_href}" title="Cover" type="cover"/></guide>
</package>"#,
        title = escape_xml(&metadata.title),
        description = escape_xml(metadata.plain_description()),
        rights = escape_xml(metadata.rights.as_deref().unwrap_or_default()),
        date = escape_xml(metadata.publication_date.as_deref().unwrap_or_default()),
        identifier = escape_xml(metadata.identifier(book_id)),
    )
}
