//! Fixed-window rate limiting.
//!
//! Windows are aligned to the clock: window `n` for a policy with window
//! length `W` covers `[n * W, (n + 1) * W)`. Every request is counted,
//! including rejected ones, so a client hammering past its budget stays
//! rejected until the window boundary. A client may send up to twice its
//! budget across a boundary.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::clock::{Clock, SystemClock};
use crate::error::{GateError, StoreError};
use crate::timeout::with_timeout;

use super::{CounterStore, RateLimitDecision, RateLimitPolicy};

/// Default bound on a counter store round trip.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_millis(50);

const KEY_PREFIX: &str = "ratelimit";

/// Per-key fixed-window rate limiter over an injected [`CounterStore`].
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    /// Count a request against `key` and decide whether it may proceed.
    ///
    /// `Ok` with `allowed == false` is a normal rejection. `Err` means the
    /// store could not be reached in time and no decision was made.
    pub async fn check(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitDecision, StoreError> {
        let window = policy.window_seconds();
        let bucket = self.clock.now_unix() / window;
        let storage_key = format!("{}:{}:{}", KEY_PREFIX, key, bucket);

        let (count, _ttl) = with_timeout(
            self.store_timeout,
            self.store
                .increment_and_get_ttl(&storage_key, Duration::from_secs(window)),
        )
        .await
        .map_err(|e| {
            error!(key = %key, error = %e, "Rate limit store failure");
            e
        })?;

        let limit = policy.limit();
        let decision = RateLimitDecision {
            allowed: count <= limit,
            limit,
            remaining: limit.saturating_sub(count),
            reset_at: (bucket + 1).saturating_mul(window),
        };

        debug!(
            key = %key,
            count,
            allowed = decision.allowed,
            remaining = decision.remaining,
            reset_at = decision.reset_at,
            "Rate limit checked"
        );

        Ok(decision)
    }

    /// Like [`check`](Self::check) with an ad-hoc budget.
    ///
    /// Zero `limit` or `window_seconds` is a [`GateError::Config`].
    pub async fn check_with(
        &self,
        key: &str,
        limit: u64,
        window_seconds: u64,
    ) -> Result<RateLimitDecision, GateError> {
        let policy = RateLimitPolicy::new(limit, window_seconds)?;
        Ok(self.check(key, &policy).await?)
    }
}
