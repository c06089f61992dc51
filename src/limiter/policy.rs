//! Rate limit budgets and decisions.

use serde::Serialize;

use crate::error::GateError;

/// Longest accepted window: one leap year.
pub const MAX_WINDOW_SECONDS: u64 = 366 * 24 * 60 * 60;

/// A validated request budget: at most `limit` requests per
/// `window_seconds`-long clock-aligned window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitPolicy {
    limit: u64,
    window_seconds: u64,
}

impl RateLimitPolicy {
    /// Build a policy. Zero limits, and windows that are zero or longer than
    /// [`MAX_WINDOW_SECONDS`], are configuration errors.
    pub fn new(limit: u64, window_seconds: u64) -> Result<Self, GateError> {
        if limit == 0 {
            return Err(GateError::config("Rate limit must be greater than zero"));
        }
        if window_seconds == 0 {
            return Err(GateError::config(
                "Rate limit window must be greater than zero seconds",
            ));
        }
        if window_seconds > MAX_WINDOW_SECONDS {
            return Err(GateError::config(format!(
                "Rate limit window of {} seconds exceeds the maximum of {}",
                window_seconds, MAX_WINDOW_SECONDS
            )));
        }
        Ok(Self {
            limit,
            window_seconds,
        })
    }

    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }
}

/// Outcome of a single rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub limit: u64,
    pub remaining: u64,
    /// Unix time (seconds) at which the current window ends.
    pub reset_at: u64,
}

impl RateLimitDecision {
    /// Seconds until the window resets, as seen from `now`.
    pub fn retry_after(&self, now: u64) -> u64 {
        self.reset_at.saturating_sub(now)
    }

    /// `X-RateLimit-*` response headers describing this decision.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("X-RateLimit-Limit", self.limit.to_string()),
            ("X-RateLimit-Remaining", self.remaining.to_string()),
            ("X-RateLimit-Reset", self.reset_at.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_values_rejected() {
        assert!(matches!(
            RateLimitPolicy::new(0, 60),
            Err(GateError::Config { .. })
        ));
        assert!(matches!(
            RateLimitPolicy::new(5, 0),
            Err(GateError::Config { .. })
        ));
        let policy = RateLimitPolicy::new(5, 60).unwrap();
        assert_eq!((policy.limit(), policy.window_seconds()), (5, 60));
    }

    #[test]
    fn test_window_is_capped() {
        assert!(RateLimitPolicy::new(5, MAX_WINDOW_SECONDS).is_ok());
        assert!(matches!(
            RateLimitPolicy::new(5, MAX_WINDOW_SECONDS + 1),
            Err(GateError::Config { .. })
        ));
        assert!(RateLimitPolicy::new(5, i64::MAX as u64).is_err());
    }

    #[test]
    fn test_headers() {
        let decision = RateLimitDecision {
            allowed: true,
            limit: 5,
            remaining: 3,
            reset_at: 120,
        };
        assert_eq!(
            decision.headers(),
            vec![
                ("X-RateLimit-Limit", "5".to_string()),
                ("X-RateLimit-Remaining", "3".to_string()),
                ("X-RateLimit-Reset", "120".to_string()),
            ]
        );
        assert_eq!(decision.retry_after(100), 20);
        assert_eq!(decision.retry_after(500), 0);
    }
}
