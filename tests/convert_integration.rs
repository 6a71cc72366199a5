//! End-to-end conversions against a mock reader site.
//!
//! Each test serves a small book over HTTP, runs the full pipeline through
//! the reqwest transport, and inspects the resulting archive.

mod support;

use epub_downloader_core::{ConversionOptions, ConversionOutcome, DirectorySink, Theme};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use support::book::{
    self, BOOK_ID, Epub, chapter_page, chapter_path, chapter_record, converter, files_path,
    mount_book, mount_chapter_list, mount_ok, mount_status, reader_path,
};
use support::socket_guard::start_mock_server_or_skip;
use tempfile::TempDir;

const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A];

// ==================== Layout Tests ====================

#[tokio::test]
async fn test_three_chapter_book_with_cover_in_first_chapter() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_book(&server, json!({})).await;
    mount_chapter_list(
        &server,
        vec![
            chapter_record(&server, "ch01.html", "Front Matter", &[]),
            chapter_record(&server, "ch02.html", "Chapter Two", &[]),
            chapter_record(&server, "ch03.html", "Chapter Three", &[]),
        ],
    )
    .await;
    mount_ok(
        &server,
        &chapter_path("ch01.html"),
        chapter_page(r#"<img src="Images/cover.jpg" alt="Cover art"/>"#),
    )
    .await;
    mount_ok(
        &server,
        &chapter_path("ch02.html"),
        chapter_page(r#"<p>See <a href="ch03.html#s1">next</a>.</p><img src="Images/fig.png"/>"#),
    )
    .await;
    mount_ok(
        &server,
        &chapter_path("ch03.html"),
        chapter_page(r#"<h1 id="s1">Three</h1>"#),
    )
    .await;
    mount_ok(&server, &files_path("Images/cover.jpg"), JPEG).await;
    mount_ok(&server, &files_path("Images/fig.png"), PNG).await;

    let artifact = converter(&server, ConversionOptions::default())
        .convert(BOOK_ID)
        .await
        .expect("conversion should succeed");
    assert_eq!(artifact.documents, 3);
    assert!(artifact.warnings.is_empty(), "{:?}", artifact.warnings);

    let mut epub = Epub::open(artifact.bytes);
    let names = epub.names();
    assert_eq!(names[0], "mimetype");
    assert_eq!(names[1], "META-INF/container.xml");
    assert_eq!(epub.text("mimetype"), "application/epub+zip");
    assert!(!epub.contains("OEBPS/default_cover.xhtml"));
    assert_eq!(epub.spine(), vec!["ch01", "ch02", "ch03"]);
    assert_eq!(epub.bytes("OEBPS/Images/cover.jpg"), JPEG);
    assert_eq!(epub.bytes("OEBPS/Images/fig.png"), PNG);

    let opf = epub.text("OEBPS/content.opf");
    assert!(opf.contains("<dc:title>Rust in Practice</dc:title>"));
    assert!(opf.contains(r#"<meta name="cover" content="img_cover"/>"#));
    assert!(opf.contains(r#"<item id="img_fig" href="Images/fig.png" media-type="image/png"/>"#));
    assert!(opf.contains("<dc:publisher>Example Press</dc:publisher>"));

    let ch02 = epub.text("OEBPS/ch02.xhtml");
    assert!(ch02.contains(r#"href="ch03.xhtml#s1""#));
    assert!(ch02.contains(r#"src="Images/fig.png""#));

    let ncx = epub.text("OEBPS/toc.ncx");
    assert!(ncx.contains("<text>Chapter Two</text>"));
    assert!(ncx.contains(r#"<content src="ch03.xhtml"/>"#));
}

#[tokio::test]
async fn test_metadata_cover_adds_cover_page_first() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    let cover_url = format!("{}/covers/cover-art.jpg", server.uri());
    mount_book(&server, json!({ "cover": cover_url })).await;
    mount_chapter_list(
        &server,
        vec![
            chapter_record(&server, "ch01.html", "Preface", &[]),
            chapter_record(&server, "ch02.html", "Basics", &[]),
            chapter_record(&server, "ch03.html", "Advanced", &[]),
        ],
    )
    .await;
    for filename in ["ch01.html", "ch02.html", "ch03.html"] {
        mount_ok(&server, &chapter_path(filename), chapter_page("<p>text</p>")).await;
    }
    mount_ok(&server, "/covers/cover-art.jpg", JPEG).await;

    let artifact = converter(&server, ConversionOptions::default())
        .convert(BOOK_ID)
        .await
        .expect("conversion should succeed");
    assert_eq!(artifact.documents, 4);

    let mut epub = Epub::open(artifact.bytes);
    assert_eq!(epub.spine(), vec!["default_cover", "ch01", "ch02", "ch03"]);
    assert!(epub.text("OEBPS/default_cover.xhtml").contains("Images/cover-art.jpg"));
    assert_eq!(epub.bytes("OEBPS/Images/cover-art.jpg"), JPEG);
    assert!(
        epub.text("OEBPS/content.opf")
            .contains(r#"<meta name="cover" content="img_cover_art"/>"#)
    );
}

// ==================== Stylesheet Tests ====================

#[tokio::test]
async fn test_stylesheet_fonts_and_images_are_packaged() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_book(&server, json!({})).await;
    mount_chapter_list(
        &server,
        vec![chapter_record(&server, "ch01.html", "Intro", &["/css/book.css"])],
    )
    .await;
    mount_ok(
        &server,
        &chapter_path("ch01.html"),
        chapter_page("<p>styled</p>"),
    )
    .await;
    mount_ok(
        &server,
        &reader_path("css/book.css"),
        "@font-face{font-family:A;src:url(fonts/a.woff2)} .aside{display:none} p{background:url(img/b.png)}",
    )
    .await;
    mount_ok(&server, &reader_path("css/fonts/a.woff2"), vec![0x77u8, 0x4F, 0x46, 0x32]).await;
    mount_ok(&server, &reader_path("css/img/b.png"), PNG).await;

    let artifact = converter(
        &server,
        ConversionOptions {
            theme: Theme::Sepia,
            kindle: true,
        },
    )
    .convert(BOOK_ID)
    .await
    .expect("conversion should succeed");

    let mut epub = Epub::open(artifact.bytes);
    let css = epub.text("OEBPS/Styles/Style00.css");
    assert!(css.contains("visibility: hidden"));
    assert!(!css.contains("display:none"));
    assert_eq!(epub.bytes("OEBPS/Styles/fonts/a.woff2"), vec![0x77u8, 0x4F, 0x46, 0x32]);
    assert_eq!(epub.bytes("OEBPS/Styles/img/b.png"), PNG);

    let chapter = epub.text("OEBPS/ch01.xhtml");
    assert!(chapter.contains(r#"<link href="Styles/Style00.css" rel="stylesheet" type="text/css"/>"#));

    let opf = epub.text("OEBPS/content.opf");
    assert!(opf.contains(r#"href="Styles/Style00.css" media-type="text/css""#));
    assert!(opf.contains(r#"href="Styles/fonts/a.woff2" media-type="font/woff2""#));
    assert!(opf.contains(r#"href="Styles/img/b.png" media-type="image/png""#));
}

#[tokio::test]
async fn test_missing_stylesheet_is_only_a_warning() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_book(&server, json!({})).await;
    mount_chapter_list(
        &server,
        vec![chapter_record(&server, "ch01.html", "Intro", &["/css/gone.css"])],
    )
    .await;
    mount_ok(&server, &chapter_path("ch01.html"), chapter_page("<p>x</p>")).await;
    mount_status(&server, &reader_path("css/gone.css"), 404).await;

    let artifact = converter(&server, ConversionOptions::default())
        .convert(BOOK_ID)
        .await
        .expect("optional assets must not fail the run");
    assert_eq!(artifact.warnings.len(), 1);
    assert!(artifact.warnings[0].url.ends_with("css/gone.css"));

    let epub = Epub::open(artifact.bytes);
    assert!(!epub.contains("OEBPS/Styles/Style00.css"));
}

// ==================== Shared Asset Tests ====================

async fn mount_once(server: &MockServer, route: &str, body: impl Into<Vec<u8>>) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(body.into()))
        .expect(1)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_assets_shared_between_chapters_are_fetched_once() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_book(&server, json!({})).await;
    let shared_image = format!("{}{}", server.uri(), files_path("Images/shared.png"));
    let mut first = chapter_record(&server, "ch01.html", "One", &["/css/book.css"]);
    first["related_assets"]["images"] = json!([shared_image]);
    let second = chapter_record(&server, "ch02.html", "Two", &["/css/book.css"]);
    mount_chapter_list(&server, vec![first, second]).await;
    for filename in ["ch01.html", "ch02.html"] {
        mount_ok(
            &server,
            &chapter_path(filename),
            chapter_page(r#"<p>Shared</p><img src="Images/shared.png"/>"#),
        )
        .await;
    }
    mount_once(&server, &files_path("Images/shared.png"), PNG).await;
    mount_once(
        &server,
        &reader_path("css/book.css"),
        "p{background:url(img/b.png)} h1{background:url(img/b.png)}",
    )
    .await;
    mount_once(&server, &reader_path("css/img/b.png"), PNG).await;

    let artifact = converter(&server, ConversionOptions::default())
        .convert(BOOK_ID)
        .await
        .expect("conversion should succeed");
    assert!(artifact.warnings.is_empty(), "{:?}", artifact.warnings);

    let mut epub = Epub::open(artifact.bytes);
    assert_eq!(epub.bytes("OEBPS/Images/shared.png"), PNG);
    assert!(!epub.contains("OEBPS/Styles/Style01.css"));
    let opf = epub.text("OEBPS/content.opf");
    assert_eq!(opf.matches(r#"href="Images/shared.png""#).count(), 1);
    assert_eq!(opf.matches(r#"href="Styles/img/b.png""#).count(), 1);

    server.verify().await;
}

// ==================== Image Fallback Tests ====================

#[tokio::test]
async fn test_image_falls_back_to_lowercase_directory() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_book(&server, json!({})).await;
    mount_chapter_list(&server, vec![chapter_record(&server, "ch01.html", "Intro", &[])]).await;
    mount_ok(
        &server,
        &chapter_path("ch01.html"),
        chapter_page(r#"<p>Figure</p><img src="Images/lost.png"/>"#),
    )
    .await;
    mount_status(&server, &files_path("Images/lost.png"), 404).await;
    mount_ok(&server, &files_path("images/lost.png"), PNG).await;

    let artifact = converter(&server, ConversionOptions::default())
        .convert(BOOK_ID)
        .await
        .expect("conversion should succeed");
    assert!(artifact.warnings.is_empty(), "{:?}", artifact.warnings);

    let mut epub = Epub::open(artifact.bytes);
    assert_eq!(epub.bytes("OEBPS/Images/lost.png"), PNG);
}

#[tokio::test]
async fn test_unrecoverable_image_is_left_out() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_book(&server, json!({})).await;
    mount_chapter_list(&server, vec![chapter_record(&server, "ch01.html", "Intro", &[])]).await;
    mount_ok(
        &server,
        &chapter_path("ch01.html"),
        chapter_page(r#"<p>Figure</p><img src="Images/void.png"/>"#),
    )
    .await;

    let artifact = converter(&server, ConversionOptions::default())
        .convert(BOOK_ID)
        .await
        .expect("missing images must not fail the run");
    assert_eq!(artifact.warnings.len(), 1);

    let mut epub = Epub::open(artifact.bytes);
    assert!(!epub.contains("OEBPS/Images/void.png"));
    assert!(!epub.text("OEBPS/content.opf").contains("Images/void.png"));
}

// ==================== Failure Tests ====================

#[tokio::test]
async fn test_rejected_session_fails_before_metadata() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_status(&server, "/profile/", 401).await;

    let dir = TempDir::new().unwrap();
    let outcome = converter(&server, ConversionOptions::default())
        .run(BOOK_ID, &DirectorySink::new(dir.path()))
        .await;
    assert!(!outcome.ok);
    assert!(outcome.error.unwrap().contains("authentication failed (status 401)"));

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() == "/profile/"));
}

#[tokio::test]
async fn test_chapter_without_content_root_fails_run() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_book(&server, json!({})).await;
    mount_chapter_list(&server, vec![chapter_record(&server, "ch01.html", "Intro", &[])]).await;
    mount_ok(&server, &chapter_path("ch01.html"), "<html><body><p>teaser</p></body></html>").await;

    let dir = TempDir::new().unwrap();
    let outcome = converter(&server, ConversionOptions::default())
        .run(BOOK_ID, &DirectorySink::new(dir.path()))
        .await;
    assert!(!outcome.ok);
    assert!(outcome.error.unwrap().contains("sbo-rt-content"));
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_run_persists_epub_under_book_folder() {
    let Some(server) = start_mock_server_or_skip().await else {
        return;
    };
    mount_book(&server, json!({})).await;
    mount_chapter_list(&server, vec![chapter_record(&server, "ch01.html", "Intro", &[])]).await;
    mount_ok(&server, &chapter_path("ch01.html"), chapter_page("<p>hello</p>")).await;

    let dir = TempDir::new().unwrap();
    let outcome = converter(&server, ConversionOptions::default())
        .run(BOOK_ID, &DirectorySink::new(dir.path()))
        .await;
    assert_eq!(outcome, ConversionOutcome::success());

    let saved = dir
        .path()
        .join(format!("{} ({BOOK_ID})", book::TITLE))
        .join(format!("{} - Ann Author - {BOOK_ID}.epub", book::TITLE));
    let bytes = std::fs::read(&saved).expect("epub should be written");
    let mut epub = Epub::open(bytes);
    assert!(epub.text("OEBPS/ch01.xhtml").contains("hello"));
}
