//! Constants for the fetch module (pacing, retry, headers).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (2 minutes; chapters and images are small).
pub const READ_TIMEOUT_SECS: u64 = 120;

/// Minimum spacing between two consecutive requests.
pub const DEFAULT_BASE_SPACING: Duration = Duration::from_millis(200);

/// Default maximum attempts per request, including the first one.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 4;

/// Base delay for exponential retry backoff.
pub const DEFAULT_RETRY_BASE: Duration = Duration::from_millis(750);

/// Cap applied to the exponential part of the retry delay.
pub const DEFAULT_RETRY_CAP: Duration = Duration::from_millis(8000);

/// Minimum time between two credential refreshes.
pub const DEFAULT_REFRESH_COOLDOWN: Duration = Duration::from_secs(30);

/// Upper bound of the random jitter added to retry delays.
pub const MAX_JITTER_MS: u64 = 250;

/// Flat surcharge for 429/503 retries.
pub const THROTTLE_SURCHARGE: Duration = Duration::from_millis(1000);

/// Statuses that grow the pacing penalty. 0 stands for a network failure.
pub const PENALIZED_STATUSES: &[u16] = &[0, 401, 403, 429, 500, 502, 503, 504];

/// Statuses retried regardless of the forbidden-retry flag.
pub const RETRYABLE_STATUSES: &[u16] = &[0, 429, 500, 502, 503, 504];

/// Floor of the doubling penalty for throttling statuses (ms).
pub const THROTTLE_PENALTY_FLOOR_MS: u64 = 500;

/// Ceiling of the doubling penalty for throttling statuses (ms).
pub const THROTTLE_PENALTY_CAP_MS: u64 = 8000;

/// Step added for other penalized statuses (ms).
pub const PENALTY_STEP_MS: u64 = 250;

/// Ceiling of the stepped penalty (ms).
pub const PENALTY_STEP_CAP_MS: u64 = 6000;

/// Marker header sent with every request.
pub const REQUESTED_WITH: (&str, &str) = ("X-Requested-With", "XMLHttpRequest");

/// Language preference sent with every request.
pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";
