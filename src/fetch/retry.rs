//! Retry decisions and exponential backoff for session requests.
//!
//! This module provides the [`RetryPolicy`] used by the
//! [`SessionClient`](super::SessionClient). A request outcome is reduced to
//! a status code (0 for a network failure) and the policy decides whether
//! another attempt is worth making and how long to wait before it.
//!
//! # Delay Calculation
//!
//! ```text
//! growth = min(cap, base * 2^attempt)
//! delay  = min(cap, growth + surcharge + jitter)
//! ```
//!
//! `surcharge` is 1s for 429/503, `jitter` is uniform in `0..=250ms`, and
//! `attempt` is zero-based.
//!
//! # Example
//!
//! ```
//! use epub_downloader_core::fetch::{RetryDecision, RetryPolicy};
//!
//! let policy = RetryPolicy::default();
//! match policy.should_retry(503, 0, true) {
//!     RetryDecision::Retry { delay, .. } => assert!(delay.as_millis() >= 1750),
//!     RetryDecision::DoNotRetry { reason } => panic!("unexpected: {reason}"),
//! }
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{debug, instrument};

use super::constants::{
    DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_BASE, DEFAULT_RETRY_CAP, MAX_JITTER_MS,
    RETRYABLE_STATUSES, THROTTLE_SURCHARGE,
};

/// Decision on whether to retry a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Zero-based index of the next attempt.
        attempt: u32,
        /// Whether credentials should be refreshed first (401/403).
        refresh_credentials: bool,
    },

    /// Do not retry the request.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Configuration for retry behavior with exponential backoff.
///
/// # Default Values
///
/// - `max_attempts`: 4
/// - `base_delay`: 750ms
/// - `max_delay`: 8s
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts (including the initial attempt).
    max_attempts: u32,

    /// Base delay for the first retry.
    base_delay: Duration,

    /// Maximum delay cap.
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_RETRY_BASE,
            max_delay: DEFAULT_RETRY_CAP,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom settings.
    ///
    /// `max_attempts` is clamped to at least 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }

    /// Returns a copy of this policy with a different attempt limit.
    #[must_use]
    pub fn with_max_attempts(&self, max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..self.clone()
        }
    }

    /// Returns the maximum number of attempts configured.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides whether the attempt that just produced `status` should be retried.
    ///
    /// `attempt` is zero-based; `status` 0 stands for a network failure.
    /// 401/403 are retried only when `retry_on_forbidden` is set.
    #[instrument(level = "debug", skip(self), fields(max_attempts = self.max_attempts))]
    pub fn should_retry(&self, status: u16, attempt: u32, retry_on_forbidden: bool) -> RetryDecision {
        if attempt + 1 >= self.max_attempts {
            debug!(attempt, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts),
            };
        }

        let forbidden = matches!(status, 401 | 403);
        if !is_retryable_status(status) && !(forbidden && retry_on_forbidden) {
            return RetryDecision::DoNotRetry {
                reason: format!("status {status} is not retryable"),
            };
        }

        let delay = self.backoff(attempt, status) + calculate_jitter();
        let delay = delay.min(self.max_delay);

        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
            refresh_credentials: forbidden,
        }
    }

    /// Deterministic part of the retry delay (no jitter).
    ///
    /// `min(cap, base * 2^attempt)` plus the throttle surcharge for 429/503,
    /// capped again at `max_delay`.
    #[must_use]
    pub fn backoff(&self, attempt: u32, status: u16) -> Duration {
        let factor = 2_u32.checked_pow(attempt).unwrap_or(u32::MAX);
        let growth = self
            .base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);
        let surcharge = if matches!(status, 429 | 503) {
            THROTTLE_SURCHARGE
        } else {
            Duration::ZERO
        };
        (growth + surcharge).min(self.max_delay)
    }
}

/// Returns true for statuses retried regardless of the forbidden-retry flag.
#[must_use]
pub fn is_retryable_status(status: u16) -> bool {
    RETRYABLE_STATUSES.contains(&status)
}

/// Generates random jitter between 0 and 250ms.
fn calculate_jitter() -> Duration {
    let mut rng = rand::thread_rng();
    Duration::from_millis(rng.gen_range(0..=MAX_JITTER_MS))
}
