//! EPUB 2 packaging.
//!
//! The archive layout is fixed:
//!
//! ```text
//! mimetype
//! META-INF/container.xml
//! OEBPS/content.opf
//! OEBPS/toc.ncx
//! OEBPS/<chapter>.xhtml ...
//! OEBPS/Styles/StyleNN.css ...
//! OEBPS/Styles/<font or stylesheet image> ...
//! OEBPS/Images/<page image> ...
//! ```
//!
//! Only assets whose bytes were fetched are packaged.

pub mod ncx;
pub mod opf;

use tracing::{debug, instrument};

use crate::archive::{ArchiveError, StoredZip};
use crate::assets::AssetRegistry;
use crate::metadata::BookMetadata;
use crate::transform::{ChapterDocument, Cover};

pub use ncx::toc_ncx;
pub use opf::{IdAllocator, Manifest, ManifestItem, content_opf};

/// EPUB media type, stored as the first archive entry.
pub const MIMETYPE: &str = "application/epub+zip";

/// Static container document pointing at the package.
pub const CONTAINER_XML: &str = r#"<?xml version="1.0"?><container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container"><rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#;

/// Everything needed to assemble one book.
#[derive(Debug, Clone, Copy)]
pub struct BookPackage<'a> {
    pub book_id: &'a str,
    pub metadata: &'a BookMetadata,
    /// Documents in spine order.
    pub documents: &'a [ChapterDocument],
    pub registry: &'a AssetRegistry,
    pub cover: Option<&'a Cover>,
}

impl BookPackage<'_> {
    /// Declares every archive entry in layout order.
    #[must_use]
    pub fn archive(&self) -> StoredZip {
        let manifest = Manifest::build(self.documents, self.registry, self.cover);
        let first_document = self.documents.first().map(|doc| doc.filename.as_str());

        let mut zip = StoredZip::new();
        zip.add_file("mimetype", MIMETYPE.as_bytes().to_vec());
        zip.add_file("META-INF/container.xml", CONTAINER_XML.as_bytes().to_vec());
        zip.add_file(
            "OEBPS/content.opf",
            content_opf(self.metadata, self.book_id, &manifest, first_document).into_bytes(),
        );
        zip.add_file(
            "OEBPS/toc.ncx",
            toc_ncx(self.metadata, self.book_id, self.documents).into_bytes(),
        );

        let mut add = |path: String, data: &[u8]| {
            if zip.contains(&path) {
                debug!(path = %path, "duplicate archive path skipped");
            } else {
                zip.add_file(path, data.to_vec());
            }
        };
        for document in self.documents {
            add(format!("OEBPS/{}", document.filename), document.xhtml.as_bytes());
        }
        for source in self.registry.css_sources() {
            if let Some(content) = &source.content {
                add(format!("OEBPS/Styles/{}", source.filename), content.as_bytes());
            }
        }
        for (path, data) in self.registry.fonts().fetched() {
            add(format!("OEBPS/{path}"), data);
        }
        for (path, data) in self.registry.css_assets().fetched() {
            add(format!("OEBPS/{path}"), data);
        }
        for (relative, data) in self.registry.images().fetched() {
            add(format!("OEBPS/Images/{relative}"), data);
        }
        zip
    }

    /// Assembles the book into EPUB bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ArchiveError`] when an entry exceeds the ZIP field limits.
    #[instrument(skip(self), fields(book_id = %self.book_id, documents = self.documents.len()))]
    pub fn build(&self) -> Result<Vec<u8>, ArchiveError> {
        self.archive().finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::assets::AssetSlot;

    fn document(filename: &str) -> ChapterDocument {
        ChapterDocument {
            title: filename.to_string(),
            filename: filename.to_string(),
            css_markup: String::new(),
            xhtml: format!("<html>{filename}</html>"),
        }
    }

    // ==================== Layout Tests ====================

    #[test]
    fn test_archive_layout_order() {
        let mut registry = AssetRegistry::new();
        registry.register_image("fig.png", "https://h/fig.png");
        registry.images_mut().set_slot("fig.png", AssetSlot::Fetched(vec![1]));
        registry.register_image("lost.png", "https://h/lost.png");
        registry.register_css("https://h/a.css");
        registry.set_css_content(0, "p{}".into());
        registry.register_font("Styles/f.woff", "https://h/f.woff");
        registry.fonts_mut().set_slot("Styles/f.woff", AssetSlot::Fetched(vec![2]));
        registry.register_css_asset("Styles/bg.png", "https://h/bg.png");
        registry.css_assets_mut().set_slot("Styles/bg.png", AssetSlot::Fetched(vec![3]));

        let metadata = BookMetadata::default();
        let documents = [document("ch01.xhtml"), document("ch02.xhtml"), document("ch01.xhtml")];
        let zip = BookPackage {
            book_id: "42",
            metadata: &metadata,
            documents: &documents,
            registry: &registry,
            cover: None,
        }
        .archive();

        let paths: Vec<_> = zip.entries().iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "mimetype",
                "META-INF/container.xml",
                "OEBPS/content.opf",
                "OEBPS/toc.ncx",
                "OEBPS/ch01.xhtml",
                "OEBPS/ch02.xhtml",
                "OEBPS/Styles/Style00.css",
                "OEBPS/Styles/f.woff",
                "OEBPS/Styles/bg.png",
                "OEBPS/Images/fig.png",
            ]
        );
        assert_eq!(zip.entries()[0].data, MIMETYPE.as_bytes());
    }

    #[test]
    fn test_build_produces_zip_bytes() {
        let registry = AssetRegistry::new();
        let metadata = BookMetadata::default();
        let documents = [document("ch01.xhtml")];
        let bytes = BookPackage {
            book_id: "42",
            metadata: &metadata,
            documents: &documents,
            registry: &registry,
            cover: None,
        }
        .build()
        .unwrap();
        assert_eq!(&bytes[..4], &[0x50, 0x4b, 0x03, 0x04]);
        assert_eq!(&bytes[30..38], b"mimetype");
    }
}
