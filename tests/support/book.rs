//! A mock reader site serving one book.
//!
//! Mirrors the remote layout: a profile page, two metadata documents, a
//! paginated chapter list, chapter pages, and assets under the book URL.

use std::io::{Cursor, Read};
use std::sync::Arc;
use std::time::Duration;

use epub_downloader_core::{
    ConversionOptions, Converter, FetchSettings, ReqwestTransport, SiteConfig, StaticSession,
};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use zip::ZipArchive;

pub const BOOK_ID: &str = "9781098100001";
pub const TITLE: &str = "Rust in Practice";

pub fn primary_path() -> String {
    format!("/api/v2/epubs/urn:orm:book:{BOOK_ID}/")
}

pub fn secondary_path() -> String {
    format!("/api/v1/book/{BOOK_ID}/")
}

pub fn chapter_list_path() -> String {
    format!("{}chapters/", primary_path())
}

/// Path of a chapter page.
pub fn chapter_path(filename: &str) -> String {
    format!("{}files/{filename}", primary_path())
}

/// Path under the book's `files/` directory, where relative images resolve.
pub fn files_path(relative: &str) -> String {
    format!("{}files/{relative}", secondary_path())
}

/// Path under the canonical reader URL, where declared stylesheets resolve.
pub fn reader_path(relative: &str) -> String {
    format!("/library/view/rust-in-practice/{BOOK_ID}/{relative}")
}

/// Minimal chapter page with `inner` as the content root.
pub fn chapter_page(inner: &str) -> String {
    format!(r#"<html><head></head><body><div id="sbo-rt-content">{inner}</div></body></html>"#)
}

/// Chapter list record.
pub fn chapter_record(server: &MockServer, filename: &str, title: &str, stylesheets: &[&str]) -> Value {
    json!({
        "title": title,
        "filename": filename,
        "content_url": format!("{}{}", server.uri(), chapter_path(filename)),
        "related_assets": {"images": [], "stylesheets": stylesheets, "site_styles": []},
    })
}

pub async fn mount_ok(server: &MockServer, route: &str, body: impl Into<Vec<u8>>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.into()))
        .mount(server)
        .await;
}

pub async fn mount_status(server: &MockServer, route: &str, status: u16) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

/// Mounts the profile page and both metadata documents.
///
/// `extra` is merged into the primary document.
pub async fn mount_book(server: &MockServer, extra: Value) {
    let base = server.uri();
    mount_ok(server, "/profile/", r#"{"user_type":"Member"}"#).await;

    let mut primary = json!({
        "title": TITLE,
        "authors": [{"name": "Ann Author"}],
        "subjects": [{"name": "Programming"}],
        "isbn": BOOK_ID,
        "chapters": format!("{base}{}", chapter_list_path()),
        "descriptions": {"text/plain": "A practical guide."},
    });
    if let (Value::Object(target), Value::Object(source)) = (&mut primary, extra) {
        target.extend(source);
    }
    let secondary = json!({
        "url": format!("{base}{}", secondary_path()),
        "web_url": format!("{base}{}", reader_path("")),
        "publishers": [{"name": "Example Press"}],
    });
    mount_ok(server, &primary_path(), primary.to_string()).await;
    mount_ok(server, &secondary_path(), secondary.to_string()).await;
}

/// Mounts a single-page chapter list.
pub async fn mount_chapter_list(server: &MockServer, records: Vec<Value>) {
    let page = json!({"results": records, "next": null});
    mount_ok(server, &chapter_list_path(), page.to_string()).await;
}

/// Settings that keep tests fast: no pacing, one retry without delay.
pub fn fast_settings() -> FetchSettings {
    FetchSettings {
        base_spacing: Duration::ZERO,
        max_attempts: 2,
        retry_base_delay: Duration::ZERO,
        retry_max_delay: Duration::ZERO,
        refresh_cooldown: Duration::ZERO,
    }
}

/// Converter over a real HTTP transport pointed at `server`.
pub fn converter(server: &MockServer, options: ConversionOptions) -> Converter {
    let jar = Arc::new(reqwest::cookie::Jar::default());
    let transport = Arc::new(ReqwestTransport::new(jar).expect("transport should build"));
    Converter::new(
        transport,
        Arc::new(StaticSession),
        &fast_settings(),
        SiteConfig::new(server.uri()),
        options,
    )
}

/// Opened EPUB archive.
pub struct Epub {
    archive: ZipArchive<Cursor<Vec<u8>>>,
}

impl Epub {
    pub fn open(bytes: Vec<u8>) -> Self {
        let archive = ZipArchive::new(Cursor::new(bytes)).expect("epub should be a valid zip");
        Self { archive }
    }

    /// Entry names in archive order.
    pub fn names(&mut self) -> Vec<String> {
        (0..self.archive.len())
            .map(|i| {
                self.archive
                    .by_index(i)
                    .expect("entry should be readable")
                    .name()
                    .to_string()
            })
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.archive.index_for_name(name).is_some()
    }

    pub fn bytes(&mut self, name: &str) -> Vec<u8> {
        let mut entry = self
            .archive
            .by_name(name)
            .unwrap_or_else(|e| panic!("missing entry {name}: {e}"));
        let mut buf = Vec::new();
        entry.read_to_end(&mut buf).expect("entry should be readable");
        buf
    }

    pub fn text(&mut self, name: &str) -> String {
        String::from_utf8(self.bytes(name)).expect("entry should be utf-8")
    }

    /// `idref` values of the spine, in order.
    pub fn spine(&mut self) -> Vec<String> {
        self.text("OEBPS/content.opf")
            .lines()
            .filter_map(|line| line.strip_prefix(r#"<itemref idref=""#))
            .filter_map(|rest| rest.split('"').next())
            .map(str::to_string)
            .collect()
    }
}
