//! Credential issuing.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::{AuthConfig, Settings};
use crate::error::GateError;

use super::token::{self, Claims, TokenKind};
use super::SigningKey;

/// A freshly signed credential.
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub jti: String,
    pub kind: TokenKind,
    pub expires_at: u64,
}

/// Access and refresh credentials issued together for one session.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: IssuedToken,
    pub refresh: IssuedToken,
}

/// Signs credentials with the gate's key.
pub struct TokenIssuer {
    key: SigningKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenIssuer {
    pub fn new(key: SigningKey, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            key,
            access_ttl,
            refresh_ttl,
            clock: Arc::new(SystemClock),
        }
    }

    /// Build an issuer from `[auth]` settings, loading the key from disk.
    pub fn from_settings(settings: &Settings) -> Result<Self, GateError> {
        let key = SigningKey::from_file(&settings.auth.secret_path)?;
        Ok(Self::from_config(&settings.auth, key))
    }

    /// Build an issuer with the configured lifetimes and an already loaded key.
    pub fn from_config(config: &AuthConfig, key: SigningKey) -> Self {
        Self::new(
            key,
            Duration::from_secs(config.access_token_ttl_seconds),
            Duration::from_secs(config.refresh_token_ttl_seconds),
        )
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sign a credential of `kind` for `subject`.
    pub fn issue(
        &self,
        subject: &str,
        kind: TokenKind,
        session_id: Option<&str>,
        roles: &[String],
    ) -> Result<IssuedToken, GateError> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let now = self.clock.now_unix();
        let claims = Claims {
            sub: subject.to_string(),
            iat: now,
            exp: now.saturating_add(ttl.as_secs()),
            jti: Uuid::new_v4().to_string(),
            sid: session_id.map(str::to_string),
            kind,
            roles: roles.to_vec(),
        };
        let token = token::encode(&claims, &self.key)?;

        debug!(
            subject = %subject,
            kind = kind.as_str(),
            jti = %claims.jti,
            expires_at = claims.exp,
            "Issued credential"
        );

        Ok(IssuedToken {
            token,
            jti: claims.jti,
            kind,
            expires_at: claims.exp,
        })
    }

    pub fn issue_access(
        &self,
        subject: &str,
        session_id: Option<&str>,
        roles: &[String],
    ) -> Result<IssuedToken, GateError> {
        self.issue(subject, TokenKind::Access, session_id, roles)
    }

    pub fn issue_refresh(
        &self,
        subject: &str,
        session_id: Option<&str>,
    ) -> Result<IssuedToken, GateError> {
        self.issue(subject, TokenKind::Refresh, session_id, &[])
    }

    /// Issue an access/refresh pair bound to the same session.
    pub fn issue_pair(
        &self,
        subject: &str,
        session_id: Option<&str>,
        roles: &[String],
    ) -> Result<TokenPair, GateError> {
        Ok(TokenPair {
            access: self.issue_access(subject, session_id, roles)?,
            refresh: self.issue_refresh(subject, session_id)?,
        })
    }
}
