//! Admission Gate Library
//!
//! Request admission for HTTP services: bearer credentials are verified and
//! resolved to a [`auth::Principal`], then the request is counted against a
//! fixed-window budget keyed by subject or client IP.
//!
//! The gate holds no request state of its own. Counters, sessions and
//! identities live in external stores injected through the
//! [`limiter::CounterStore`], [`auth::SessionStore`] and
//! [`auth::IdentityStore`] traits; in-memory implementations are provided.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod limiter;
pub mod logging;
pub mod timeout;

pub use auth::{Principal, TokenIssuer, TokenVerifier};
pub use error::{AuthError, GateError, GateResult, StoreError};
pub use gate::{Admission, AdmissionGate, AdmissionRequest, Rejection};
pub use limiter::{RateLimitDecision, RateLimitPolicy, RateLimiter};
