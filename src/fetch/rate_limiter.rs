//! Request pacing with escalating penalties.
//!
//! This module provides [`ExecutionState`], the per-conversion scheduler
//! state, and [`RateLimiter`], the single gate every request of a conversion
//! passes through.
//!
//! # Overview
//!
//! Every outcome adjusts a penalty: penalized statuses (network failure,
//! 401/403, 429, 5xx gateway errors) grow it, anything else halves it. The
//! next request may start no earlier than `now + base_spacing + penalty`.
//! The state functions take the current [`Instant`] as an argument so they
//! can be exercised without a clock.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use epub_downloader_core::fetch::next_penalty;
//!
//! assert_eq!(next_penalty(Duration::ZERO, 429), Duration::from_millis(500));
//! assert_eq!(next_penalty(Duration::from_millis(500), 500), Duration::from_millis(750));
//! assert_eq!(next_penalty(Duration::from_millis(750), 200), Duration::from_millis(375));
//! ```

use std::time::Duration;

use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::{debug, instrument};

use super::constants::{
    PENALIZED_STATUSES, PENALTY_STEP_CAP_MS, PENALTY_STEP_MS, THROTTLE_PENALTY_CAP_MS,
    THROTTLE_PENALTY_FLOOR_MS,
};

/// Computes the penalty that follows an outcome with `status`.
///
/// - 429/503: doubled, clamped to `[500ms, 8000ms]`
/// - other penalized statuses: `+250ms`, capped at `6000ms`
/// - everything else: halved (floored)
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn next_penalty(current: Duration, status: u16) -> Duration {
    let current_ms = current.as_millis() as u64;
    let next_ms = if PENALIZED_STATUSES.contains(&status) {
        if matches!(status, 429 | 503) {
            current_ms
                .saturating_mul(2)
                .max(THROTTLE_PENALTY_FLOOR_MS)
                .min(THROTTLE_PENALTY_CAP_MS)
        } else {
            current_ms
                .saturating_add(PENALTY_STEP_MS)
                .min(PENALTY_STEP_CAP_MS)
        }
    } else {
        current_ms / 2
    };
    Duration::from_millis(next_ms)
}

/// Scheduler state owned by one conversion run.
#[derive(Debug, Clone)]
pub struct ExecutionState {
    /// Earliest instant the next request may start.
    next_permitted: Instant,
    /// Current escalating penalty.
    penalty: Duration,
    /// Spacing added after every request.
    base_spacing: Duration,
    /// When credentials were last refreshed.
    last_refresh: Option<Instant>,
    /// Minimum time between two refreshes.
    refresh_cooldown: Duration,
}

impl ExecutionState {
    /// Creates a fresh state that permits a request at `now`.
    #[must_use]
    pub fn new(base_spacing: Duration, refresh_cooldown: Duration, now: Instant) -> Self {
        Self {
            next_permitted: now,
            penalty: Duration::ZERO,
            base_spacing,
            last_refresh: None,
            refresh_cooldown,
        }
    }

    /// Current penalty.
    #[must_use]
    pub fn penalty(&self) -> Duration {
        self.penalty
    }

    /// Earliest instant the next request may start.
    #[must_use]
    pub fn next_permitted(&self) -> Instant {
        self.next_permitted
    }

    /// How long a request issued at `now` has to wait.
    #[must_use]
    pub fn wait_time(&self, now: Instant) -> Duration {
        self.next_permitted.saturating_duration_since(now)
    }

    /// Applies an outcome and returns the new penalty.
    pub fn record_outcome(&mut self, status: u16, now: Instant) -> Duration {
        self.penalty = next_penalty(self.penalty, status);
        self.next_permitted = now + self.base_spacing + self.penalty;
        self.penalty
    }

    /// Pushes the next permitted instant out to `target` if it is later.
    pub fn defer_until(&mut self, target: Instant) {
        if target > self.next_permitted {
            self.next_permitted = target;
        }
    }

    /// Whether a credential refresh may run at `now`.
    #[must_use]
    pub fn refresh_due(&self, now: Instant, force: bool) -> bool {
        if force {
            return true;
        }
        match self.last_refresh {
            Some(last) => now.saturating_duration_since(last) >= self.refresh_cooldown,
            None => true,
        }
    }

    /// Records a refresh attempt at `now`.
    pub fn mark_refreshed(&mut self, now: Instant) {
        self.last_refresh = Some(now);
    }
}

/// The single request gate of a conversion.
///
/// [`acquire`](Self::acquire) waits until the next permitted instant and
/// returns the locked state; holding it across the request keeps traffic
/// strictly serialized.
#[derive(Debug)]
pub struct RateLimiter {
    state: Mutex<ExecutionState>,
}

impl RateLimiter {
    /// Creates a rate limiter with the given spacing and refresh cooldown.
    #[must_use]
    #[instrument(skip_all, fields(spacing_ms = base_spacing.as_millis()))]
    pub fn new(base_spacing: Duration, refresh_cooldown: Duration) -> Self {
        debug!("creating rate limiter");
        Self {
            state: Mutex::new(ExecutionState::new(
                base_spacing,
                refresh_cooldown,
                Instant::now(),
            )),
        }
    }

    /// Waits for the gate and returns exclusive access to the state.
    pub async fn acquire(&self) -> MutexGuard<'_, ExecutionState> {
        let state = self.state.lock().await;
        let wait = state.wait_time(Instant::now());
        if !wait.is_zero() {
            debug!(
                delay_ms = wait.as_millis(),
                penalty_ms = state.penalty().as_millis(),
                "applying request spacing"
            );
            tokio::time::sleep(wait).await;
        }
        state
    }

    /// Locks the state without waiting for the next permitted instant.
    pub async fn lock(&self) -> MutexGuard<'_, ExecutionState> {
        self.state.lock().await
    }
}
