//! Resilient, session-aware fetching.
//!
//! This module wraps a raw [`Transport`] with the behavior every request of
//! a conversion needs:
//!
//! - Pacing through a single [`RateLimiter`] gate (no concurrent requests)
//! - Escalating penalties after throttling, auth, and gateway failures
//! - Exponential backoff with jitter via [`RetryPolicy`]
//! - Credential refresh on 401/403 behind a cooldown
//! - Default `Accept`, `Accept-Language`, marker, and `Referer` headers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use epub_downloader_core::auth::StaticSession;
//! use epub_downloader_core::fetch::{
//!     ContentKind, FetchRequest, FetchSettings, ReqwestTransport, SessionClient,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let jar = Arc::new(reqwest::cookie::Jar::default());
//! let transport = Arc::new(ReqwestTransport::new(jar)?);
//! let client = SessionClient::new(
//!     transport,
//!     Arc::new(StaticSession),
//!     &FetchSettings::default(),
//!     "https://example.com/",
//! );
//! let html = client
//!     .fetch_text(&FetchRequest::new("https://example.com/ch01.html", ContentKind::Document))
//!     .await?;
//! println!("{} bytes", html.len());
//! # Ok(())
//! # }
//! ```

mod client;
pub mod constants;
mod error;
pub mod rate_limiter;
mod retry;
mod transport;

use std::time::Duration;

pub use client::{ContentKind, FetchRequest, SessionClient};
pub use constants::{DEFAULT_BASE_SPACING, DEFAULT_MAX_ATTEMPTS};
pub use error::{FetchError, TransportError};
pub use rate_limiter::{ExecutionState, RateLimiter, next_penalty};
pub use retry::{RetryDecision, RetryPolicy, is_retryable_status};
pub use transport::{HttpRequest, HttpResponse, Method, ReqwestTransport, Transport};

/// Tunables for the session client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchSettings {
    /// Spacing added after every request.
    pub base_spacing: Duration,
    /// Attempts per request, including the first.
    pub max_attempts: u32,
    /// Base of the exponential retry delay.
    pub retry_base_delay: Duration,
    /// Cap of the retry delay.
    pub retry_max_delay: Duration,
    /// Minimum time between credential refreshes.
    pub refresh_cooldown: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            base_spacing: constants::DEFAULT_BASE_SPACING,
            max_attempts: constants::DEFAULT_MAX_ATTEMPTS,
            retry_base_delay: constants::DEFAULT_RETRY_BASE,
            retry_max_delay: constants::DEFAULT_RETRY_CAP,
            refresh_cooldown: constants::DEFAULT_REFRESH_COOLDOWN,
        }
    }
}
