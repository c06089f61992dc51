//! Structured rejections returned to the transport layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AuthError, StoreError};
use crate::limiter::RateLimitDecision;

pub const RATE_LIMITED: &str = "RATE_LIMITED";
pub const SERVICE_UNAVAILABLE: &str = "SERVICE_UNAVAILABLE";

/// Client-facing text for each code.
///
/// Detailed reasons stay in the server log so that rejections never disclose
/// which check or which store failed.
fn sanitize_error_message(code: &str) -> &'static str {
    match code {
        "TOKEN_MALFORMED" | "TOKEN_INVALID_SIGNATURE" | "TOKEN_WRONG_KIND" => {
            "Invalid credentials"
        }
        "TOKEN_EXPIRED" => "Credentials expired",
        "SESSION_REVOKED" => "Session is no longer valid",
        "PRINCIPAL_UNKNOWN" | "PRINCIPAL_INACTIVE" => "Account is not permitted",
        RATE_LIMITED => "Too many requests",
        SERVICE_UNAVAILABLE => "Service temporarily unavailable",
        _ => "Request rejected",
    }
}

/// JSON body of a rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub request_id: Uuid,
}

/// A request refused by the gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub request_id: Uuid,
    /// HTTP status code.
    pub status: u16,
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Sanitized message safe to show to the client.
    pub message: &'static str,
    pub headers: Vec<(&'static str, String)>,
}

impl Rejection {
    /// Rejection for a failed credential check.
    pub fn from_auth(request_id: Uuid, error: &AuthError) -> Self {
        let code = error.code();
        let headers = match error {
            AuthError::Store(_) => Vec::new(),
            AuthError::Expired { .. } => vec![(
                "WWW-Authenticate",
                r#"Bearer error="invalid_token", error_description="expired""#.to_string(),
            )],
            _ => vec![(
                "WWW-Authenticate",
                r#"Bearer error="invalid_token""#.to_string(),
            )],
        };

        Self {
            request_id,
            status: error.status(),
            code,
            message: sanitize_error_message(code),
            headers,
        }
    }

    /// Rejection for an exhausted budget.
    pub fn rate_limited(request_id: Uuid, decision: &RateLimitDecision, now: u64) -> Self {
        let mut headers = decision.headers();
        headers.push(("Retry-After", decision.retry_after(now).to_string()));
        Self {
            request_id,
            status: 429,
            code: RATE_LIMITED,
            message: sanitize_error_message(RATE_LIMITED),
            headers,
        }
    }

    /// Rejection when a required store could not be consulted.
    pub fn unavailable(request_id: Uuid, error: &StoreError) -> Self {
        Self {
            request_id,
            status: error.status(),
            code: error.code(),
            message: sanitize_error_message(error.code()),
            headers: Vec::new(),
        }
    }

    pub fn body(&self) -> ErrorBody {
        ErrorBody {
            code: self.code.to_string(),
            message: self.message.to_string(),
            request_id: self.request_id,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}
