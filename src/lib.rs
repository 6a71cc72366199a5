//! EPUB Downloader Core Library
//!
//! Converts a book served as paginated HTML by a reader site into a
//! self-contained EPUB 2 file.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetch`] - Paced, retrying, session-aware HTTP client
//! - [`auth`] - Cookie file parsing and credential refresh
//! - [`metadata`] - Book metadata and chapter list resolution
//! - [`transform`] - HTML-to-XHTML chapter rewriting
//! - [`assets`] - Stylesheet, font, and image collection
//! - [`epub`] - OPF/NCX generation and archive layout
//! - [`archive`] - Store-only ZIP writer
//! - [`convert`] - Pipeline orchestration and error taxonomy
//! - [`progress`] / [`output`] - Event and artifact sinks
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use epub_downloader_core::{
//!     ConversionOptions, Converter, CookieFileSession, DirectorySink, FetchSettings,
//!     ReqwestTransport, SiteConfig,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Arc::new(CookieFileSession::new("cookies.txt"));
//! let transport = Arc::new(ReqwestTransport::new(session.jar())?);
//! let converter = Converter::new(
//!     transport,
//!     session,
//!     &FetchSettings::default(),
//!     SiteConfig::default(),
//!     ConversionOptions::default(),
//! );
//! let outcome = converter.run("9781098100001", &DirectorySink::new("books")).await;
//! assert!(outcome.ok, "{:?}", outcome.error);
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod archive;
pub mod assets;
pub mod auth;
pub mod convert;
pub mod epub;
pub mod fetch;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod progress;
pub mod transform;
pub mod user_agent;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use assets::AssetWarning;
pub use auth::{CookieFileSession, CredentialProvider, SessionError, StaticSession};
pub use convert::{
    ConversionOptions, ConversionOutcome, ConvertError, Converter, EpubArtifact, SiteConfig, Theme,
};
pub use fetch::{FetchError, FetchSettings, ReqwestTransport, SessionClient, Transport};
pub use output::{DirectorySink, OutputError, OutputSink};
pub use progress::{NoopProgress, ProgressEvent, ProgressSink};
