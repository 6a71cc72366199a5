//! Session credentials.
//!
//! This module provides the [`CredentialProvider`] capability consumed by
//! the fetch client, a provider that reloads a Netscape-format browser
//! cookie export into the shared reqwest jar, and a no-op provider for
//! hosts that inject credentials themselves.

mod cookies;
mod session;

pub use cookies::{
    CookieError, CookieLine, ParsedCookies, add_cookies_to_jar, parse_netscape_cookies,
};
pub use session::{CookieFileSession, CredentialProvider, SessionError, StaticSession};
