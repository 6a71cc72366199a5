//! Netscape cookie file parsing for browser session export.
//!
//! Browsers and extensions export sessions as Netscape cookie files: one
//! cookie per line, 7 TAB-separated fields. Lines prefixed `#HttpOnly_`
//! carry HttpOnly cookies and are kept; every other `#` line is a comment.

use std::fmt;
use std::io::BufRead;
use std::time::{Duration, UNIX_EPOCH};

use reqwest::cookie::Jar;
use tracing::{debug, instrument, warn};

/// Prefix curl and most exporters put in front of HttpOnly cookie lines.
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// One cookie from a session export.
///
/// `Debug` never prints the value.
#[derive(Clone)]
pub struct CookieLine {
    /// Cookie domain, e.g. `.example.com`.
    pub domain: String,
    /// Whether subdomains match.
    pub include_subdomains: bool,
    /// Path scope.
    pub path: String,
    /// HTTPS only.
    pub secure: bool,
    /// Whether the line carried the `#HttpOnly_` marker.
    pub http_only: bool,
    /// Unix expiry, 0 for a session cookie.
    pub expires: u64,
    /// Cookie name.
    pub name: String,
    value: String,
}

impl CookieLine {
    /// Returns the cookie value. Never log it.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether the cookie expired before `now_unix`.
    #[must_use]
    pub fn is_expired(&self, now_unix: u64) -> bool {
        self.expires != 0 && self.expires <= now_unix
    }

    fn set_cookie_header(&self) -> String {
        let mut header = format!("{}={}; Domain={}; Path={}", self.name, self.value, self.domain, self.path);
        if self.secure {
            header.push_str("; Secure");
        }
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        if self.expires > 0 {
            match UNIX_EPOCH.checked_add(Duration::from_secs(self.expires)) {
                Some(time) => {
                    header.push_str("; Expires=");
                    header.push_str(&httpdate::fmt_http_date(time));
                }
                None => warn!(
                    name = %self.name,
                    expires = self.expires,
                    "cookie expiry out of range; keeping it as a session cookie"
                ),
            }
        }
        header
    }

    fn origin(&self) -> Option<url::Url> {
        let scheme = if self.secure { "https" } else { "http" };
        let host = self.domain.trim_start_matches('.');
        url::Url::parse(&format!("{scheme}://{host}{}", self.path)).ok()
    }
}

impl fmt::Debug for CookieLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieLine")
            .field("domain", &self.domain)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("http_only", &self.http_only)
            .field("expires", &self.expires)
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

/// Errors raised while reading a cookie export.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    /// A data line could not be parsed.
    #[error("line {line}: {reason}")]
    InvalidLine {
        /// 1-based line number.
        line: usize,
        /// What was wrong (never includes the value).
        reason: String,
    },

    /// The export could not be read.
    #[error("failed to read cookie file: {0}")]
    Io(#[from] std::io::Error),

    /// The export had data lines but none of them parsed.
    #[error("no valid cookies found ({malformed} malformed line(s))")]
    NoCookiesFound {
        /// Number of malformed lines.
        malformed: usize,
    },
}

/// Cookies parsed from an export plus per-line warnings.
#[derive(Debug, Default)]
pub struct ParsedCookies {
    /// Parsed cookies in file order.
    pub cookies: Vec<CookieLine>,
    /// Malformed lines as `(line number, reason)`.
    pub warnings: Vec<(usize, String)>,
}

/// Parses a Netscape cookie export.
///
/// Malformed lines are skipped and reported in
/// [`ParsedCookies::warnings`].
///
/// # Errors
///
/// Returns [`CookieError::Io`] on read failure and
/// [`CookieError::NoCookiesFound`] when data lines exist but none parse.
#[instrument(level = "debug", skip(reader))]
pub fn parse_netscape_cookies(reader: impl BufRead) -> Result<ParsedCookies, CookieError> {
    let mut parsed = ParsedCookies::default();
    let mut data_lines = 0;

    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line?;
        let line = line.trim_end_matches(['\r', '\n']);

        let (body, http_only) = match line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => (rest, true),
            None if line.trim().is_empty() || line.starts_with('#') => continue,
            None => (line, false),
        };
        data_lines += 1;

        match parse_line(body, http_only) {
            Ok(cookie) => {
                debug!(line = line_number, domain = %cookie.domain, name = %cookie.name, "parsed cookie");
                parsed.cookies.push(cookie);
            }
            Err(reason) => {
                warn!(line = line_number, reason = %reason, "skipping malformed cookie line");
                parsed.warnings.push((line_number, reason));
            }
        }
    }

    if parsed.cookies.is_empty() && data_lines > 0 {
        return Err(CookieError::NoCookiesFound {
            malformed: parsed.warnings.len(),
        });
    }
    Ok(parsed)
}

fn parse_line(line: &str, http_only: bool) -> Result<CookieLine, String> {
    let fields: Vec<&str> = line.split('\t').collect();
    let [domain, subdomains, path, secure, expires, name, value] = fields[..] else {
        return Err(format!(
            "expected 7 TAB-separated fields, found {}",
            fields.len()
        ));
    };

    if domain.is_empty() {
        return Err("domain field is empty".to_string());
    }
    if name.is_empty() {
        return Err("cookie name field is empty".to_string());
    }

    Ok(CookieLine {
        domain: domain.to_string(),
        include_subdomains: parse_flag(subdomains, "include_subdomains")?,
        path: if path.is_empty() { "/".to_string() } else { path.to_string() },
        secure: parse_flag(secure, "secure")?,
        http_only,
        expires: expires
            .parse::<u64>()
            .map_err(|_| format!("expires must be a non-negative integer, got '{expires}'"))?,
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(value: &str, field: &str) -> Result<bool, String> {
    match value {
        "TRUE" => Ok(true),
        "FALSE" => Ok(false),
        other => Err(format!("{field} must be TRUE or FALSE, got '{other}'")),
    }
}

/// Adds `cookies` to an existing jar and returns how many were accepted.
///
/// Cookies whose domain cannot form a URL are skipped with a warning.
#[instrument(level = "debug", skip_all, fields(count = cookies.len()))]
pub fn add_cookies_to_jar(jar: &Jar, cookies: &[CookieLine]) -> usize {
    let mut added = 0;
    for cookie in cookies {
        let Some(origin) = cookie.origin() else {
            warn!(domain = %cookie.domain, name = %cookie.name, "skipping cookie with unusable domain");
            continue;
        };
        jar.add_cookie_str(&cookie.set_cookie_header(), &origin);
        added += 1;
    }
    added
}
