//! `toc.ncx` navigation document (NCX 2005-1).

use std::fmt::Write as _;

use super::opf::IdAllocator;
use crate::metadata::{BookMetadata, TocEntry, ourn_filename};
use crate::naming::{escape_xml, to_xhtml_name};
use crate::transform::ChapterDocument;

/// Walks a table of contents, numbering nav points in pre-order.
struct NavMapBuilder<'a> {
    fallback_href: &'a str,
    play_order: usize,
    max_depth: u32,
    ids: IdAllocator,
    out: String,
}

impl<'a> NavMapBuilder<'a> {
    fn new(fallback_href: &'a str) -> Self {
        Self {
            fallback_href,
            play_order: 0,
            max_depth: 0,
            ids: IdAllocator::new(),
            out: String::new(),
        }
    }

    fn next_id(&mut self, candidate: Option<&str>) -> String {
        let fallback = format!("navPoint-{}", self.play_order);
        candidate
            .and_then(|c| self.ids.try_allocate(c))
            .unwrap_or_else(|| self.ids.claim(&fallback))
    }

    fn push_point(&mut self, id: &str, label: &str, src: &str) {
        let _ = write!(
            self.out,
            r#"<navPoint id="{}" playOrder="{}"><navLabel><text>{}</text></navLabel><content src="{}"/>"#,
            escape_xml(id),
            self.play_order,
            escape_xml(label),
            escape_xml(src)
        );
    }

    fn walk(&mut self, entries: &[TocEntry], level: u32) {
        for entry in entries {
            self.play_order += 1;
            self.max_depth = self.max_depth.max(entry.depth).max(level);

            let candidate = non_empty(entry.fragment.as_deref())
                .or_else(|| non_empty(entry.reference_id.as_deref()));
            let id = self.next_id(candidate);
            let label = non_empty(entry.title.as_deref())
                .or_else(|| non_empty(entry.label.as_deref()))
                .unwrap_or("Chapter");
            let src = self.entry_href(entry);
            self.push_point(&id, label, &src);

            self.walk(&entry.children, level + 1);
            self.out.push_str("</navPoint>");
        }
    }

    /// Explicit href, else the URN's file component, else the first document.
    fn entry_href(&self, entry: &TocEntry) -> String {
        if let Some(href) = non_empty(entry.href.as_deref()) {
            return to_xhtml_name(href);
        }
        if let Some(ourn) = non_empty(entry.ourn.as_deref()) {
            return to_xhtml_name(ourn_filename(ourn));
        }
        self.fallback_href.to_string()
    }

    fn from_documents(&mut self, documents: &[ChapterDocument]) {
        for document in documents {
            self.play_order += 1;
            self.max_depth = self.max_depth.max(1);
            let id = self.next_id(None);
            self.push_point(&id, &document.title, &document.filename);
            self.out.push_str("</navPoint>");
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

/// Renders `toc.ncx`.
///
/// The metadata's table of contents is used when present; otherwise one
/// nav point per document is emitted in spine order.
#[must_use]
pub fn toc_ncx(metadata: &BookMetadata, book_id: &str, documents: &[ChapterDocument]) -> String {
    let fallback_href = documents
        .first()
        .map_or("chapter.xhtml", |doc| doc.filename.as_str());
    let mut builder = NavMapBuilder::new(fallback_href);
    if metadata.table_of_contents.is_empty() {
        builder.from_documents(documents);
    } else {
        builder.walk(&metadata.table_of_contents, 1);
    }

    let authors = metadata.author_names().join(", ");
    let mut head = String::new();
    for (name, content) in [
        ("dtb:uid", format!("ID:ISBN:{}", metadata.identifier(book_id))),
        ("dtb:depth", builder.max_depth.to_string()),
        ("dtb:totalPageCount", "0".to_string()),
        ("dtb:maxPageNumber", "0".to_string()),
    ] {
        let _ = writeln!(head, r#"<meta content="{}" name="{name}"/>"#, escape_xml(&content));
    }

    format!(
        r#"<?xml version="1.0" encoding="utf-8" standalone="no"?>
<!DOCTYPE ncx PUBLIC "-//NISO//DTD ncx 2005-1//EN" "http://www.daisy.org/z3986/2005/ncx-2005-1.dtd">
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
<head>
{head}</head>
<docTitle><text>{title}</text></docTitle>
<docAuthor><text>{authors}</text></docAuthor>
<navMap>{nav_map}</navMap>
</ncx>"#,
        title = escape_xml(&metadata.title),
        authors = escape_xml(&authors),
        nav_map = builder.out,
    )
}
