//! End-to-end conversion of one book.
//!
//! [`Converter::convert`] runs the pipeline strictly in sequence:
//!
//! 1. refresh credentials and verify the session
//! 2. resolve metadata and the chapter list
//! 3. transform each chapter in spine order
//! 4. settle the cover and collect assets
//! 5. package the EPUB
//!
//! All traffic of a run goes through one [`SessionClient`], so requests are
//! never concurrent. The client and the asset registries live only for the
//! duration of one call.

mod error;
mod options;

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{error, info, instrument};

use crate::assets::{AssetCollector, AssetRegistry, AssetWarning};
use crate::auth::CredentialProvider;
use crate::epub::BookPackage;
use crate::fetch::{FetchSettings, SessionClient, Transport};
use crate::metadata::{Chapter, MetadataResolver};
use crate::naming::artifact_path;
use crate::output::OutputSink;
use crate::progress::{NoopProgress, ProgressEvent, ProgressSink};
use crate::transform::{BookLocation, ChapterTransformer};

pub use error::ConvertError;
pub use options::{ConversionOptions, DEFAULT_SITE_URL, ParseThemeError, SiteConfig, Theme};

/// Author shown in the file name when the metadata lists none.
pub const UNKNOWN_AUTHOR: &str = "Unknown Author";

/// A finished EPUB, not yet persisted.
#[derive(Debug, Clone)]
pub struct EpubArtifact {
    /// Suggested path: `<title> (<id>)/<title> - <authors> - <id>.epub`.
    pub relative_path: String,
    pub bytes: Vec<u8>,
    pub title: String,
    /// Number of documents in the spine.
    pub documents: usize,
    /// Optional assets that were left out.
    pub warnings: Vec<AssetWarning>,
}

/// Final result of [`Converter::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConversionOutcome {
    #[must_use]
    pub fn success() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn failure(error: impl ToString) -> Self {
        Self {
            ok: false,
            error: Some(error.to_string()),
        }
    }
}

/// Converts books into EPUB files.
///
/// Each call to [`convert`](Self::convert) builds its own [`SessionClient`],
/// so pacing penalties, refresh cooldown, and referrer never carry over from
/// one book to the next.
pub struct Converter {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    settings: FetchSettings,
    site: SiteConfig,
    options: ConversionOptions,
    progress: Arc<dyn ProgressSink>,
}

impl std::fmt::Debug for Converter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Converter")
            .field("site", &self.site)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl Converter {
    /// Creates a converter over `transport`.
    ///
    /// `credentials` is refreshed once at the start of every run and again
    /// by the fetch client when the host answers 401/403 and the refresh
    /// cooldown has elapsed.
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        settings: &FetchSettings,
        site: SiteConfig,
        options: ConversionOptions,
    ) -> Self {
        Self {
            transport,
            credentials,
            settings: settings.clone(),
            site,
            options,
            progress: Arc::new(NoopProgress),
        }
    }

    /// Routes progress events to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Fresh client for one run.
    fn session_client(&self) -> SessionClient {
        SessionClient::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.credentials),
            &self.settings,
            format!("{}/", self.site.base_url()),
        )
    }

    fn emit(&self, event: ProgressEvent) {
        self.progress.emit(event);
    }

    /// Converts `book_id` and returns the packaged artifact.
    ///
    /// # Errors
    ///
    /// Any [`ConvertError`]; no partial artifact is returned.
    #[instrument(skip(self), fields(theme = %self.options.theme, kindle = self.options.kindle))]
    pub async fn convert(&self, book_id: &str) -> Result<EpubArtifact, ConvertError> {
        let book_id = book_id.trim();
        if book_id.is_empty() {
            return Err(ConvertError::MissingBookId);
        }
        let started = Instant::now();
        self.emit(ProgressEvent::Starting {
            book_id: book_id.to_string(),
        });

        let client = self.session_client();
        client.start_session().await?;
        client.update_referrer(&self.site.library_url(book_id));

        let resolver = MetadataResolver::new(&client, &self.site);
        self.emit(ProgressEvent::SessionCheck);
        resolver.check_login().await?;
        self.emit(ProgressEvent::SessionOk);

        let metadata = resolver.fetch_book_info(book_id).await?;
        self.emit(ProgressEvent::Metadata {
            title: metadata.title.clone(),
        });
        let canonical = metadata.canonical_url().to_string();
        client.update_referrer(&canonical);

        let records = resolver.fetch_chapters(metadata.chapters.as_deref()).await?;
        let base_url = canonical.trim_end_matches('/');
        let chapters = records
            .iter()
            .enumerate()
            .map(|(index, record)| Chapter::from_record(index, record, base_url))
            .collect::<Result<Vec<_>, _>>()?;
        let total = chapters.len();
        info!(total, "chapters discovered");
        self.emit(ProgressEvent::ChaptersDiscovered { total });

        let transformer = ChapterTransformer::new(
            BookLocation::new(metadata.book_url()),
            canonical.clone(),
            self.options,
        );
        let mut registry = AssetRegistry::new();
        let mut documents = Vec::with_capacity(total + 1);
        let mut detected_cover = None;
        for chapter in &chapters {
            self.emit(ProgressEvent::ChapterStart {
                index: chapter.index + 1,
                total,
                title: chapter.title.clone(),
            });
            let transformed = transformer.load(&client, chapter, &mut registry).await?;
            if detected_cover.is_none() {
                detected_cover = transformed.detected_cover;
            }
            documents.push(transformed.document);
        }

        let cover = transformer.resolve_cover(
            detected_cover.as_deref(),
            metadata.cover(),
            &mut registry,
        );
        transformer.finalize_documents(&mut documents, cover.as_ref());

        let warnings = AssetCollector::new(&client, &metadata, &self.site, self.progress.as_ref())
            .collect(&mut registry)
            .await;

        let bytes = BookPackage {
            book_id,
            metadata: &metadata,
            documents: &documents,
            registry: &registry,
            cover: cover.as_ref(),
        }
        .build()?;
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.emit(ProgressEvent::PackagingComplete { duration_ms });

        let mut authors = metadata.author_names();
        if authors.is_empty() {
            authors.push(UNKNOWN_AUTHOR.to_string());
        }
        let relative_path = artifact_path(&metadata.title, &authors, book_id);
        info!(
            path = %relative_path,
            bytes = bytes.len(),
            documents = documents.len(),
            warnings = warnings.len(),
            "epub assembled"
        );
        Ok(EpubArtifact {
            relative_path,
            bytes,
            title: metadata.title.clone(),
            documents: documents.len(),
            warnings,
        })
    }

    /// Converts `book_id`, persists the result through `sink`, and reports
    /// the outcome instead of an error.
    pub async fn run(&self, book_id: &str, sink: &dyn OutputSink) -> ConversionOutcome {
        let result = async {
            let artifact = self.convert(book_id).await?;
            self.emit(ProgressEvent::DownloadStart);
            let path = sink.persist(&artifact.relative_path, &artifact.bytes).await?;
            info!(path = %path.display(), "epub saved");
            self.emit(ProgressEvent::Complete);
            Ok::<_, ConvertError>(())
        }
        .await;

        match result {
            Ok(()) => ConversionOutcome::success(),
            Err(err) => {
                error!(book_id, kind = err.kind(), error = %err, "conversion failed");
                ConversionOutcome::failure(err)
            }
        }
    }
}
