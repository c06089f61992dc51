//! Error types for the admission gate.

use thiserror::Error;

/// Main error type for the crate.
///
/// Request-level rejections are carried as [`AuthError`] and [`StoreError`]
/// values. `Config` is reserved for precondition violations detected when
/// building policies or loading settings.
#[derive(Error, Debug)]
pub enum GateError {
    /// Configuration-related errors.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Credential verification errors.
    #[error("Authentication error: {kind}")]
    Auth { kind: AuthError },

    /// Counter/session/identity store errors.
    #[error("Store error: {kind}")]
    Store { kind: StoreError },

    /// Credential encoding errors.
    #[error("Token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

impl GateError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        GateError::Config {
            message: message.into(),
        }
    }
}

impl From<AuthError> for GateError {
    fn from(kind: AuthError) -> Self {
        GateError::Auth { kind }
    }
}

impl From<StoreError> for GateError {
    fn from(kind: StoreError) -> Self {
        GateError::Store { kind }
    }
}

/// Reasons a credential is rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Credential is malformed")]
    Malformed,

    #[error("Invalid signature")]
    InvalidSignature,

    #[error("Credential expired at {expired_at}")]
    Expired { expired_at: u64 },

    #[error("Session has been revoked or does not exist")]
    RevokedSession,

    #[error("Wrong token kind: expected {expected}")]
    WrongTokenKind { expected: &'static str },

    #[error("Subject is not known to the identity store")]
    UnknownSubject,

    #[error("Principal is inactive")]
    InactivePrincipal,

    #[error("Lookup failed: {0}")]
    Store(StoreError),
}

impl AuthError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::Malformed => "TOKEN_MALFORMED",
            AuthError::InvalidSignature => "TOKEN_INVALID_SIGNATURE",
            AuthError::Expired { .. } => "TOKEN_EXPIRED",
            AuthError::RevokedSession => "SESSION_REVOKED",
            AuthError::WrongTokenKind { .. } => "TOKEN_WRONG_KIND",
            AuthError::UnknownSubject => "PRINCIPAL_UNKNOWN",
            AuthError::InactivePrincipal => "PRINCIPAL_INACTIVE",
            AuthError::Store(kind) => kind.code(),
        }
    }

    /// HTTP status the transport layer should answer with.
    pub fn status(&self) -> u16 {
        match self {
            AuthError::Store(kind) => kind.status(),
            _ => 401,
        }
    }
}

/// Failures talking to an external store.
///
/// Distinct from a "not allowed" decision: the caller picks fail-open or
/// fail-closed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Store operation timed out after {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        "SERVICE_UNAVAILABLE"
    }

    pub fn status(&self) -> u16 {
        503
    }
}

/// Result type alias for gate operations.
pub type GateResult<T> = Result<T, GateError>;
