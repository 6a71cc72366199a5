//! User-Agent string for all outbound requests.
//!
//! The remote reader serves browser sessions, so the agent starts with a
//! browser-compatible token and then identifies the tool and its version.

/// Browser-compatible prefix accepted by the remote reader.
const BROWSER_COMPAT: &str = "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Default User-Agent: browser prefix plus `epub-downloader/<version>`.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{BROWSER_COMPAT} epub-downloader/{version}")
}
