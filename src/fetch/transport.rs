//! Raw HTTP capability consumed by the session client.
//!
//! The pipeline never talks to reqwest directly: it issues [`HttpRequest`]s
//! through a [`Transport`], so hosts can inject their own networking and
//! tests can script responses.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::cookie::Jar;
use reqwest::{Client, ClientBuilder};
use tracing::{debug, instrument};

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::TransportError;
use crate::user_agent;

/// HTTP method subset used by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    /// `GET`
    Get,
    /// `HEAD`
    Head,
}

/// A request handed to a [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method.
    pub method: Method,
    /// Absolute URL.
    pub url: String,
    /// Header name/value pairs, in order.
    pub headers: Vec<(String, String)>,
    /// Whether session credentials (cookies) should be attached.
    pub include_credentials: bool,
}

impl HttpRequest {
    /// Creates a credentialed `GET` request with no headers.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            url: url.into(),
            headers: Vec::new(),
            include_credentials: true,
        }
    }

    /// Appends a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Returns the first header value with this name (case-insensitive).
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A response returned by a [`Transport`].
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers, names lowercased.
    pub headers: Vec<(String, String)>,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response with no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Whether the status is 2xx.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Returns the first header value with this name (case-insensitive).
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Performs one HTTP exchange.
///
/// Implementations return `Ok` for every response that carries a status,
/// including 4xx/5xx; `Err` means no status was received.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the full response.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// [`Transport`] backed by reqwest.
///
/// Credentialed requests go through a client sharing the session cookie
/// jar; the others use a jar-less client.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    with_credentials: Client,
    anonymous: Client,
}

impl ReqwestTransport {
    /// Builds a transport around `jar` with the default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Build`] when reqwest rejects the configuration.
    pub fn new(jar: Arc<Jar>) -> Result<Self, TransportError> {
        Self::with_timeouts(jar, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Builds a transport with explicit connect/read timeouts in seconds.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Build`] when reqwest rejects the configuration.
    pub fn with_timeouts(
        jar: Arc<Jar>,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, TransportError> {
        let with_credentials = base_client_builder(connect_timeout_secs, read_timeout_secs)
            .cookie_provider(jar)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        let anonymous = base_client_builder(connect_timeout_secs, read_timeout_secs)
            .build()
            .map_err(|e| TransportError::Build(e.to_string()))?;
        Ok(Self {
            with_credentials,
            anonymous,
        })
    }
}

fn base_client_builder(connect_timeout_secs: u64, read_timeout_secs: u64) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(read_timeout_secs))
        .gzip(true)
        .user_agent(user_agent::default_user_agent())
}

#[async_trait]
impl Transport for ReqwestTransport {
    #[instrument(level = "debug", skip(self, request), fields(url = %request.url))]
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let client = if request.include_credentials {
            &self.with_credentials
        } else {
            &self.anonymous
        };

        let mut builder = match request.method {
            Method::Get => client.get(&request.url),
            Method::Head => client.head(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::from_reqwest(&request.url, &e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::from_reqwest(&request.url, &e))?
            .to_vec();

        debug!(status, bytes = body.len(), "response received");
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}
