//! Session-aware HTTP client with pacing, retry, and credential refresh.
//!
//! Every network operation of a conversion goes through one
//! [`SessionClient`]. It attaches the default headers and the current
//! referrer, waits on the [`RateLimiter`] gate, records each outcome, and
//! retries according to the [`RetryPolicy`].

use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use super::constants::{ACCEPT_LANGUAGE, REQUESTED_WITH};
use super::error::FetchError;
use super::rate_limiter::{ExecutionState, RateLimiter};
use super::retry::{RetryDecision, RetryPolicy};
use super::transport::{HttpRequest, HttpResponse, Transport};
use super::FetchSettings;
use crate::auth::{CredentialProvider, SessionError};

/// What a request expects back; selects the `Accept` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    /// HTML chapter or page.
    Document,
    /// API payload.
    Json,
    /// Stylesheet.
    Css,
    /// Web font.
    Font,
    /// Page or stylesheet image.
    Image,
}

impl ContentKind {
    /// `Accept` header value for this kind.
    #[must_use]
    pub fn accept(self) -> &'static str {
        match self {
            Self::Document => "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            Self::Json => "application/json, text/plain, */*",
            Self::Css => "text/css,*/*;q=0.1",
            Self::Font => "font/woff2,application/font-woff,application/octet-stream,*/*",
            Self::Image => "image/avif,image/webp,image/apng,image/svg+xml,image/*,*/*;q=0.8",
        }
    }
}

/// A request as seen by the session client.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    /// Absolute URL.
    pub url: String,
    /// Expected content.
    pub kind: ContentKind,
    /// Whether 401/403 responses are retried (after a credential refresh).
    pub retry_on_forbidden: bool,
    /// Per-request attempt limit overriding the policy.
    pub max_attempts: Option<u32>,
}

impl FetchRequest {
    /// Creates a request with default retry behavior.
    #[must_use]
    pub fn new(url: impl Into<String>, kind: ContentKind) -> Self {
        Self {
            url: url.into(),
            kind,
            retry_on_forbidden: true,
            max_attempts: None,
        }
    }

    /// Disables retries on 401/403.
    #[must_use]
    pub fn without_forbidden_retry(mut self) -> Self {
        self.retry_on_forbidden = false;
        self
    }

    /// Overrides the attempt limit for this request.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// HTTP client scoped to one conversion run.
pub struct SessionClient {
    transport: Arc<dyn Transport>,
    credentials: Arc<dyn CredentialProvider>,
    limiter: RateLimiter,
    policy: RetryPolicy,
    referrer: Mutex<String>,
}

impl std::fmt::Debug for SessionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionClient")
            .field("limiter", &self.limiter)
            .field("policy", &self.policy)
            .field("referrer", &self.referrer())
            .finish_non_exhaustive()
    }
}

impl SessionClient {
    /// Creates a client with fresh pacing state.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        credentials: Arc<dyn CredentialProvider>,
        settings: &FetchSettings,
        referrer: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials,
            limiter: RateLimiter::new(settings.base_spacing, settings.refresh_cooldown),
            policy: RetryPolicy::new(
                settings.max_attempts,
                settings.retry_base_delay,
                settings.retry_max_delay,
            ),
            referrer: Mutex::new(referrer.into()),
        }
    }

    /// Current referrer.
    #[must_use]
    pub fn referrer(&self) -> String {
        self.referrer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces the referrer with `url` if it is an http(s) URL.
    pub fn update_referrer(&self, url: &str) {
        if url.starts_with("http") {
            *self.referrer.lock().unwrap_or_else(PoisonError::into_inner) = url.to_string();
        }
    }

    /// Asks the credential provider to refresh, honoring the cooldown unless `force`.
    ///
    /// Returns true if a refresh ran and succeeded. Failures are logged.
    pub async fn ensure_session_refreshed(&self, force: bool) -> bool {
        let mut state = self.limiter.lock().await;
        self.refresh_locked(&mut state, force).await
    }

    /// Refreshes credentials at the start of a run and starts the cooldown.
    ///
    /// # Errors
    ///
    /// Propagates the provider's [`SessionError`].
    pub async fn start_session(&self) -> Result<(), SessionError> {
        let mut state = self.limiter.lock().await;
        state.mark_refreshed(Instant::now());
        self.credentials.refresh().await
    }

    async fn refresh_locked(&self, state: &mut ExecutionState, force: bool) -> bool {
        if !state.refresh_due(Instant::now(), force) {
            debug!("credential refresh skipped (cooldown)");
            return false;
        }
        state.mark_refreshed(Instant::now());
        match self.credentials.refresh().await {
            Ok(()) => {
                debug!("credentials refreshed");
                true
            }
            Err(error) => {
                warn!(error = %error, "unable to refresh session credentials");
                false
            }
        }
    }

    fn build_request(&self, request: &FetchRequest) -> HttpRequest {
        HttpRequest::get(&request.url)
            .header("Accept", request.kind.accept())
            .header(REQUESTED_WITH.0, REQUESTED_WITH.1)
            .header("Accept-Language", ACCEPT_LANGUAGE)
            .header("Referer", self.referrer())
    }

    /// Performs `request` with pacing and retries.
    ///
    /// Returns the first successful response, or the last response once
    /// retries are exhausted or the status is not retryable.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Transport`] when the final attempt failed
    /// without receiving a response.
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn fetch(&self, request: &FetchRequest) -> Result<HttpResponse, FetchError> {
        let policy = match request.max_attempts {
            Some(max) => self.policy.with_max_attempts(max),
            None => self.policy.clone(),
        };

        let mut attempt = 0;
        loop {
            let mut state = self.limiter.acquire().await;
            let outcome = self.transport.send(self.build_request(request)).await;
            let now = Instant::now();

            match outcome {
                Ok(response) => {
                    let penalty = state.record_outcome(response.status, now);
                    debug!(
                        status = response.status,
                        attempt,
                        penalty_ms = penalty.as_millis(),
                        "request completed"
                    );
                    if response.is_success() {
                        return Ok(response);
                    }
                    match policy.should_retry(response.status, attempt, request.retry_on_forbidden)
                    {
                        RetryDecision::DoNotRetry { reason } => {
                            debug!(status = response.status, reason = %reason, "not retrying");
                            return Ok(response);
                        }
                        RetryDecision::Retry {
                            delay,
                            attempt: next,
                            refresh_credentials,
                        } => {
                            if refresh_credentials {
                                self.refresh_locked(&mut state, false).await;
                            }
                            state.defer_until(Instant::now() + delay);
                            attempt = next;
                        }
                    }
                }
                Err(error) => {
                    state.record_outcome(0, now);
                    match policy.should_retry(0, attempt, request.retry_on_forbidden) {
                        RetryDecision::DoNotRetry { .. } => {
                            return Err(FetchError::transport(&request.url, attempt + 1, error));
                        }
                        RetryDecision::Retry {
                            delay,
                            attempt: next,
                            ..
                        } => {
                            warn!(error = %error, attempt, "request failed, retrying");
                            state.defer_until(now + delay);
                            attempt = next;
                        }
                    }
                }
            }
        }
    }

    /// Like [`fetch`](Self::fetch) but turns a non-2xx final status into an error.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::HttpStatus`] for a non-success final response.
    pub async fn fetch_success(&self, request: &FetchRequest) -> Result<HttpResponse, FetchError> {
        let response = self.fetch(request).await?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(FetchError::http_status(&request.url, response.status))
        }
    }

    /// Fetches a successful response and returns its body as text.
    ///
    /// # Errors
    ///
    /// See [`fetch_success`](Self::fetch_success).
    pub async fn fetch_text(&self, request: &FetchRequest) -> Result<String, FetchError> {
        Ok(self.fetch_success(request).await?.text())
    }

    /// Fetches a JSON document and deserializes it.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Decode`] when the body does not match `T`.
    pub async fn fetch_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let response = self
            .fetch_success(&FetchRequest::new(url, ContentKind::Json))
            .await?;
        serde_json::from_slice(&response.body).map_err(|e| FetchError::decode(url, e))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::fetch::TransportError;

    /// Replays a fixed sequence of statuses (`None` = network failure).
    struct ScriptedTransport {
        script: Mutex<VecDeque<Option<u16>>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        fn new(script: &[Option<u16>]) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.iter().copied().collect()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let url = request.url.clone();
            self.requests.lock().unwrap().push(request);
            match self.script.lock().unwrap().pop_front().flatten() {
                Some(status) => Ok(HttpResponse::new(status, format!("status {status}"))),
                None => Err(TransportError::network(url, "connection reset")),
            }
        }
    }

    #[derive(Default)]
    struct CountingCredentials {
        refreshes: AtomicUsize,
    }

    #[async_trait]
    impl CredentialProvider for CountingCredentials {
        async fn refresh(&self) -> Result<(), SessionError> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn client(transport: Arc<ScriptedTransport>) -> (SessionClient, Arc<CountingCredentials>) {
        let credentials = Arc::new(CountingCredentials::default());
        let client = SessionClient::new(
            transport,
            credentials.clone(),
            &FetchSettings::default(),
            "https://example.com/library/view/1/",
        );
        (client, credentials)
    }

    fn doc(url: &str) -> FetchRequest {
        FetchRequest::new(url, ContentKind::Document)
    }

    // ==================== Retry Sequence Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_retries_through_503s_until_success() {
        let transport = ScriptedTransport::new(&[Some(503), Some(503), Some(200)]);
        let (client, _) = client(transport.clone());
        let response = client.fetch(&doc("https://example.com/a")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_404_is_returned_without_retry() {
        let transport = ScriptedTransport::new(&[Some(404), Some(200)]);
        let (client, _) = client(transport.clone());
        let response = client.fetch(&doc("https://example.com/a")).await.unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_return_last_response() {
        let transport = ScriptedTransport::new(&[Some(500); 6]);
        let (client, _) = client(transport.clone());
        let response = client.fetch(&doc("https://example.com/a")).await.unwrap();
        assert_eq!(response.status, 500);
        assert_eq!(transport.request_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_propagates_after_last_attempt() {
        let transport = ScriptedTransport::new(&[None, None]);
        let (client, _) = client(transport.clone());
        let err = client
            .fetch(&doc("https://example.com/a").with_max_attempts(2))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport { attempts: 2, .. }));
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failure_then_success() {
        let transport = ScriptedTransport::new(&[None, Some(200)]);
        let (client, _) = client(transport.clone());
        let response = client.fetch(&doc("https://example.com/a")).await.unwrap();
        assert_eq!(response.status, 200);
    }

    // ==================== Credential Refresh Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_forbidden_retry_refreshes_credentials_once_per_cooldown() {
        let transport = ScriptedTransport::new(&[Some(403), Some(401), Some(200)]);
        let (client, credentials) = client(transport.clone());
        let response = client.fetch(&doc("https://example.com/a")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(credentials.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forbidden_without_retry_returns_immediately() {
        let transport = ScriptedTransport::new(&[Some(403), Some(200)]);
        let (client, credentials) = client(transport.clone());
        let response = client
            .fetch(&doc("https://example.com/a").without_forbidden_retry())
            .await
            .unwrap();
        assert_eq!(response.status, 403);
        assert_eq!(transport.request_count(), 1);
        assert_eq!(credentials.refreshes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_refresh_bypasses_cooldown() {
        let transport = ScriptedTransport::new(&[]);
        let (client, credentials) = client(transport);
        assert!(client.ensure_session_refreshed(false).await);
        assert!(!client.ensure_session_refreshed(false).await);
        assert!(client.ensure_session_refreshed(true).await);
        assert_eq!(credentials.refreshes.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_session_counts_toward_cooldown() {
        let transport = ScriptedTransport::new(&[Some(401), Some(200)]);
        let (client, credentials) = client(transport.clone());
        client.start_session().await.unwrap();
        let response = client.fetch(&doc("https://example.com/a")).await.unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(transport.request_count(), 2);
        assert_eq!(credentials.refreshes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_session_propagates_refresh_failure() {
        struct NoSession;

        #[async_trait]
        impl CredentialProvider for NoSession {
            async fn refresh(&self) -> Result<(), SessionError> {
                Err(SessionError::NoSession {
                    path: "cookies.txt".into(),
                })
            }
        }

        let client = SessionClient::new(
            ScriptedTransport::new(&[]),
            Arc::new(NoSession),
            &FetchSettings::default(),
            "https://example.com/",
        );
        let err = client.start_session().await.unwrap_err();
        assert!(matches!(err, SessionError::NoSession { .. }));
    }

    // ==================== Header and Pacing Tests ====================

    #[tokio::test(start_paused = true)]
    async fn test_default_headers_and_referrer() {
        let transport = ScriptedTransport::new(&[Some(200), Some(200)]);
        let (client, _) = client(transport.clone());
        client
            .fetch(&FetchRequest::new("https://example.com/s.css", ContentKind::Css))
            .await
            .unwrap();
        client.update_referrer("https://example.com/library/view/book/1/");
        client.update_referrer("not-a-url");
        client.fetch(&doc("https://example.com/ch1.html")).await.unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests[0].header_value("Accept"), Some("text/css,*/*;q=0.1"));
        assert_eq!(requests[0].header_value("X-Requested-With"), Some("XMLHttpRequest"));
        assert_eq!(requests[0].header_value("Accept-Language"), Some("en-US,en;q=0.9"));
        assert_eq!(
            requests[0].header_value("Referer"),
            Some("https://example.com/library/view/1/")
        );
        assert_eq!(
            requests[1].header_value("Referer"),
            Some("https://example.com/library/view/book/1/")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_consecutive_requests_are_spaced() {
        let transport = ScriptedTransport::new(&[Some(200); 5]);
        let (client, _) = client(transport);
        let start = Instant::now();
        for _ in 0..5 {
            client.fetch(&doc("https://example.com/a")).await.unwrap();
        }
        assert!(start.elapsed() >= Duration::from_millis(200) * 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_success_maps_status_to_error() {
        let transport = ScriptedTransport::new(&[Some(404)]);
        let (client, _) = client(transport);
        let err = client
            .fetch_success(&doc("https://example.com/missing"))
            .await
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_json_decode_error() {
        let transport = ScriptedTransport::new(&[Some(200)]);
        let (client, _) = client(transport);
        let err = client
            .fetch_json::<serde_json::Value>("https://example.com/api")
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Decode { .. }));
    }
}
