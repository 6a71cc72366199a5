//! In-memory transport for unit tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::auth::StaticSession;
use crate::fetch::{
    FetchSettings, HttpRequest, HttpResponse, SessionClient, Transport, TransportError,
};

/// Serves canned responses keyed by exact URL; anything else is a 404.
#[derive(Default)]
pub(crate) struct RouteTransport {
    routes: HashMap<String, (u16, Vec<u8>)>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl RouteTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn route(mut self, url: &str, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.routes.insert(url.to_string(), (status, body.into()));
        self
    }

    pub(crate) fn ok(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.route(url, 200, body)
    }

    pub(crate) fn requested_urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .map(|request| request.url.clone())
            .collect()
    }

    pub(crate) fn count(&self, url: &str) -> usize {
        self.requested_urls().iter().filter(|u| *u == url).count()
    }
}

#[async_trait]
impl Transport for RouteTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let response = match self.routes.get(&request.url) {
            Some((status, body)) => HttpResponse::new(*status, body.clone()),
            None => HttpResponse::new(404, "not found"),
        };
        self.requests
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request);
        Ok(response)
    }
}

/// Settings with no pacing and a single attempt, so tests run instantly.
pub(crate) fn instant_settings() -> FetchSettings {
    FetchSettings {
        base_spacing: Duration::ZERO,
        max_attempts: 1,
        retry_base_delay: Duration::ZERO,
        retry_max_delay: Duration::ZERO,
        refresh_cooldown: Duration::ZERO,
    }
}

/// Session client over `transport` without credentials or pacing.
pub(crate) fn client(transport: Arc<RouteTransport>) -> SessionClient {
    SessionClient::new(
        transport,
        Arc::new(StaticSession),
        &instant_settings(),
        "https://learning.example.com/",
    )
}
