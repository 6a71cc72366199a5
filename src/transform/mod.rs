//! HTML-to-XHTML chapter transformation.
//!
//! Each chapter's markup is parsed, its `#sbo-rt-content` node copied into
//! an owned [`dom::Element`] tree, and then:
//!
//! 1. stylesheets (declared, linked, and inline) are collected, with
//!    external ones registered as `Styles/StyleNN.css`
//! 2. `<svg><image>` pairs gain an `<img>` sibling for non-SVG readers
//! 3. every `href`/`src` is rewritten through [`BookLocation`]
//! 4. images sized by inline style lose their width/height attributes
//! 5. the first chapter is searched for a cover image
//!
//! The result is wrapped in the themed shell from [`template`].

pub mod dom;
mod links;
pub mod template;

use std::sync::LazyLock;

use scraper::{Html, Selector};
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::assets::AssetRegistry;
use crate::convert::ConversionOptions;
use crate::fetch::{ContentKind, FetchError, FetchRequest, SessionClient};
use crate::metadata::Chapter;

pub use dom::{Element, Node};
pub use links::{BookLocation, resolve_url};
pub use template::{build_xhtml, cover_page};

/// Filename of the synthesized cover document.
pub const COVER_FILENAME: &str = "default_cover.xhtml";

/// Attributes inspected when looking for a cover image.
const COVER_HINT_ATTRS: [&str; 5] = ["id", "class", "name", "src", "alt"];

#[allow(clippy::expect_used)]
static CONTENT_ROOT: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("#sbo-rt-content").expect("content root selector is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static STYLESHEET_LINKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"link[rel="stylesheet"]"#).expect("stylesheet selector is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static STYLE_BLOCKS: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("style").expect("style selector is valid") // Static pattern, safe to panic
});

/// Errors that abort a conversion during chapter transformation.
#[derive(Debug, Error)]
pub enum TransformError {
    /// The chapter markup has no content root.
    #[error("chapter '{title}' at {url} is missing the #sbo-rt-content node")]
    MissingContentRoot {
        /// Chapter title.
        title: String,
        /// Chapter content URL.
        url: String,
    },

    /// The chapter markup could not be downloaded.
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

/// A packaged content document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChapterDocument {
    pub title: String,
    /// Package filename, ending in `.xhtml`.
    pub filename: String,
    /// Stylesheet markup placed in the head.
    pub css_markup: String,
    /// Complete serialized document.
    pub xhtml: String,
}

/// Output of transforming one chapter.
#[derive(Debug, Clone)]
pub struct TransformedChapter {
    pub document: ChapterDocument,
    /// Raw `src` of the cover candidate, first chapter only.
    pub detected_cover: Option<String>,
}

/// The book's cover image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cover {
    /// Package path under `Images/`.
    pub path: String,
    /// True when no chapter yielded a cover and metadata supplied it.
    pub from_metadata: bool,
}

/// Transforms chapters for one book.
#[derive(Debug, Clone)]
pub struct ChapterTransformer {
    location: BookLocation,
    page_base: String,
    options: ConversionOptions,
}

impl ChapterTransformer {
    /// Creates a transformer.
    ///
    /// `page_base` is the canonical book page; linked stylesheets resolve
    /// against it.
    #[must_use]
    pub fn new(location: BookLocation, page_base: impl Into<String>, options: ConversionOptions) -> Self {
        Self {
            location,
            page_base: page_base.into(),
            options,
        }
    }

    #[must_use]
    pub fn location(&self) -> &BookLocation {
        &self.location
    }

    /// Registers the chapter's declared images, downloads its markup, and transforms it.
    ///
    /// # Errors
    ///
    /// [`TransformError::Fetch`] if the markup cannot be downloaded,
    /// [`TransformError::MissingContentRoot`] if it has no content node.
    #[instrument(skip(self, client, registry), fields(index = chapter.index, url = %chapter.content_url))]
    pub async fn load(
        &self,
        client: &SessionClient,
        chapter: &Chapter,
        registry: &mut AssetRegistry,
    ) -> Result<TransformedChapter, TransformError> {
        for image in &chapter.images {
            self.location.register_image(image, registry);
        }
        let html = client
            .fetch_text(&FetchRequest::new(&chapter.content_url, ContentKind::Document))
            .await?;
        self.transform(chapter, &html, registry)
    }

    /// Transforms already-downloaded chapter markup.
    ///
    /// # Errors
    ///
    /// [`TransformError::MissingContentRoot`] if the markup has no content node.
    pub fn transform(
        &self,
        chapter: &Chapter,
        html: &str,
        registry: &mut AssetRegistry,
    ) -> Result<TransformedChapter, TransformError> {
        let document = Html::parse_document(html);
        let Some(content) = document.select(&CONTENT_ROOT).next() else {
            return Err(TransformError::MissingContentRoot {
                title: chapter.title.clone(),
                url: chapter.content_url.clone(),
            });
        };
        let mut root = Element::from_html(content);
        let css_markup = self.collect_styles(&document, chapter, registry);

        supplement_svg_images(&mut root);
        root.walk_mut(&mut |element: &mut Element| {
            for (name, value) in &mut element.attrs {
                if name == "href" || name == "src" || name.ends_with(":href") {
                    *value = self.location.rewrite_link(value, registry);
                }
            }
        });
        fix_overconstrained_images(&mut root);

        let detected_cover = if chapter.index == 0 {
            detect_cover_image(&root)
        } else {
            None
        };
        debug!(filename = %chapter.filename, cover = ?detected_cover, "chapter transformed");

        let xhtml = build_xhtml(&chapter.title, &css_markup, &root.to_xhtml(), self.options);
        Ok(TransformedChapter {
            document: ChapterDocument {
                title: chapter.title.clone(),
                filename: chapter.filename.clone(),
                css_markup,
                xhtml,
            },
            detected_cover,
        })
    }

    fn collect_styles(&self, document: &Html, chapter: &Chapter, registry: &mut AssetRegistry) -> String {
        let mut blocks: Vec<String> = Vec::new();
        let mut push = |block: String| {
            if !blocks.contains(&block) {
                blocks.push(block);
            }
        };

        let mut urls: Vec<String> = chapter.stylesheets.clone();
        for link in document.select(&STYLESHEET_LINKS) {
            let Some(href) = link.value().attr("href").filter(|h| !h.is_empty()) else {
                continue;
            };
            urls.push(if href.starts_with("//") {
                format!("https:{href}")
            } else {
                resolve_url(href, &self.page_base)
            });
        }
        for url in urls {
            let filename = registry.register_css(&url);
            push(format!(
                r#"<link href="Styles/{filename}" rel="stylesheet" type="text/css"/>"#
            ));
        }

        for style in document.select(&STYLE_BLOCKS) {
            let mut element = Element::from_html(style);
            if let Some(template) = element.attr("data-template").map(str::to_string) {
                element.remove_attr("data-template");
                element.children = vec![Node::Text(template)];
            }
            push(element.to_xhtml());
        }
        blocks.join("\n")
    }

    /// Settles the cover image after all chapters are transformed.
    ///
    /// A cover detected in the first chapter wins; otherwise the metadata
    /// cover URL is registered.
    pub fn resolve_cover(
        &self,
        detected: Option<&str>,
        metadata_cover: Option<&str>,
        registry: &mut AssetRegistry,
    ) -> Option<Cover> {
        if let Some(src) = detected {
            let registered = src
                .strip_prefix("Images/")
                .filter(|relative| registry.images().contains(relative))
                .map(|_| src.to_string())
                .or_else(|| self.location.register_image(src, registry));
            if let Some(path) = registered {
                return Some(Cover {
                    path,
                    from_metadata: false,
                });
            }
        }
        let url = metadata_cover?;
        info!(url = %url, "falling back to metadata cover image");
        self.location.register_image(url, registry).map(|path| Cover {
            path,
            from_metadata: true,
        })
    }

    /// Prepends a cover document when the cover came from metadata and no
    /// chapter already looks like a cover page.
    pub fn finalize_documents(&self, documents: &mut Vec<ChapterDocument>, cover: Option<&Cover>) {
        let Some(cover) = cover.filter(|c| c.from_metadata) else {
            return;
        };
        if has_cover_document(documents) {
            return;
        }
        documents.insert(
            0,
            ChapterDocument {
                title: "Cover".to_string(),
                filename: COVER_FILENAME.to_string(),
                css_markup: String::new(),
                xhtml: cover_page(&cover.path, self.options),
            },
        );
    }
}

/// Whether any document's filename or title mentions a cover.
#[must_use]
pub fn has_cover_document(documents: &[ChapterDocument]) -> bool {
    documents.iter().any(|doc| {
        doc.filename.to_lowercase().contains("cover") || doc.title.to_lowercase().contains("cover")
    })
}

/// Appends an `<img>` to the grandparent of every SVG `<image>` with an href.
fn supplement_svg_images(element: &mut Element) {
    for child in &mut element.children {
        if let Node::Element(inner) = child {
            supplement_svg_images(inner);
        }
    }
    if element.foreign {
        return;
    }
    let additions: Vec<Node> = element
        .child_elements()
        .flat_map(Element::child_elements)
        .filter(|image| image.foreign && image.name == "image")
        .filter_map(|image| image.attr("href"))
        .map(|href| Node::Element(Element::new("img").with_attr("src", href)))
        .collect();
    element.children.extend(additions);
}

/// Drops width/height attributes from images that are sized by inline style.
fn fix_overconstrained_images(root: &mut Element) {
    root.walk_mut(&mut |element: &mut Element| {
        if element.name != "img" {
            return;
        }
        let constrained = element
            .attr("style")
            .is_some_and(|style| style.contains("width") || style.contains("height"));
        if constrained {
            element.remove_attr("width");
            element.remove_attr("height");
        }
    });
}

/// `src` of the first image hinting at a cover, else of the first image.
fn detect_cover_image(root: &Element) -> Option<String> {
    let is_img = |element: &Element| element.name == "img";
    let hints_cover = |element: &Element| {
        is_img(element)
            && COVER_HINT_ATTRS.iter().any(|attr| {
                element
                    .attr(attr)
                    .is_some_and(|value| value.to_lowercase().contains("cover"))
            })
    };
    root.find(&hints_cover)
        .or_else(|| root.find(&is_img))
        .and_then(|image| image.attr("src"))
        .map(str::to_string)
}
