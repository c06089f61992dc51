//! Authentication module.
//!
//! Handles credential signing and verification, session revocation checks,
//! and identity resolution.

mod issuer;
mod key;
mod principal;
mod session;
mod token;
mod verifier;

pub use issuer::{IssuedToken, TokenIssuer, TokenPair};
pub use key::{load_secret, SigningKey, MIN_SECRET_LEN};
pub use principal::{
    IdentityRecord, IdentityStore, InMemoryIdentityStore, Principal, PrincipalCache,
};
pub use session::{InMemorySessionStore, SessionStore};
pub use token::{Claims, TokenKind};
pub use verifier::{TokenVerifier, DEFAULT_LOOKUP_TIMEOUT};
