//! Combined credential and rate limit check applied before a handler runs.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::{Principal, SigningKey, TokenVerifier};
use crate::clock::{Clock, SystemClock};
use crate::config::{FailurePolicy, RateLimitConfig, Settings};
use crate::error::{AuthError, GateResult};
use crate::limiter::{RateLimitDecision, RateLimitPolicy, RateLimiter};

use super::{GateStores, Rejection};

/// Inbound request as seen by the gate.
///
/// Credential extraction (header or cookie) is done by the transport layer.
#[derive(Debug, Clone)]
pub struct AdmissionRequest {
    pub credential: Option<String>,
    pub client_ip: IpAddr,
}

impl AdmissionRequest {
    pub fn anonymous(client_ip: IpAddr) -> Self {
        Self {
            credential: None,
            client_ip,
        }
    }

    pub fn bearer(credential: impl Into<String>, client_ip: IpAddr) -> Self {
        Self {
            credential: Some(credential.into()),
            client_ip,
        }
    }
}

/// A request let through by the gate.
#[derive(Debug, Clone)]
pub struct Admission {
    pub request_id: Uuid,
    /// `None` for anonymous requests.
    pub principal: Option<Principal>,
    /// `None` when the counter store failed and the gate fails open.
    pub decision: Option<RateLimitDecision>,
}

impl Admission {
    /// Headers to attach to the eventual response.
    pub fn rate_limit_headers(&self) -> Vec<(&'static str, String)> {
        self.decision.map(|d| d.headers()).unwrap_or_default()
    }
}

/// Budgets and policies the gate applies.
#[derive(Debug, Clone, Copy)]
pub struct GateOptions {
    pub user: RateLimitPolicy,
    pub ip: RateLimitPolicy,
    pub allow_anonymous: bool,
    pub failure_policy: FailurePolicy,
}

impl GateOptions {
    pub fn from_config(config: &RateLimitConfig) -> GateResult<Self> {
        Ok(Self {
            user: config.user.policy()?,
            ip: config.ip.policy()?,
            allow_anonymous: config.allow_anonymous,
            failure_policy: config.failure_policy,
        })
    }
}

/// Verifies credentials, then counts the request against the caller's budget.
pub struct AdmissionGate {
    verifier: TokenVerifier,
    limiter: RateLimiter,
    options: GateOptions,
    clock: Arc<dyn Clock>,
}

impl AdmissionGate {
    pub fn new(verifier: TokenVerifier, limiter: RateLimiter, options: GateOptions) -> Self {
        Self {
            verifier,
            limiter,
            options,
            clock: Arc::new(SystemClock),
        }
    }

    /// Clock used for `Retry-After`; should match the limiter's.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Build a gate from settings, loading the signing key from disk.
    pub fn from_settings(settings: &Settings, stores: GateStores) -> GateResult<Self> {
        let key = SigningKey::from_file(&settings.auth.secret_path)?;
        Self::from_settings_with_key(settings, key, stores, Arc::new(SystemClock))
    }

    /// Build a gate from settings with an already loaded key and the clock
    /// shared by the verifier, the limiter and the gate.
    ///
    /// When identity caching is enabled this starts the cache cleanup task,
    /// so it must then be called from within a tokio runtime.
    pub fn from_settings_with_key(
        settings: &Settings,
        key: SigningKey,
        stores: GateStores,
        clock: Arc<dyn Clock>,
    ) -> GateResult<Self> {
        let options = GateOptions::from_config(&settings.rate_limit)?;

        let mut verifier = TokenVerifier::new(key)
            .with_clock(Arc::clone(&clock))
            .with_lookup_timeout(Duration::from_millis(settings.auth.lookup_timeout_ms));
        if settings.auth.verify_sessions {
            if let Some(sessions) = stores.sessions {
                verifier = verifier.with_session_store(sessions);
            }
        }
        if let Some(identities) = stores.identities {
            verifier = verifier.with_identity_store(
                identities,
                Duration::from_secs(settings.auth.principal_cache_ttl_seconds),
            );
            verifier.start_cache_cleanup(Duration::from_secs(
                settings.auth.principal_cache_cleanup_interval_seconds,
            ));
        }

        let limiter = RateLimiter::new(stores.counters)
            .with_clock(Arc::clone(&clock))
            .with_store_timeout(Duration::from_millis(settings.rate_limit.store_timeout_ms));

        info!(
            user_limit = options.user.limit(),
            ip_limit = options.ip.limit(),
            allow_anonymous = options.allow_anonymous,
            failure_policy = ?options.failure_policy,
            "Admission gate configured"
        );

        Ok(Self::new(verifier, limiter, options).with_clock(clock))
    }

    pub fn verifier(&self) -> &TokenVerifier {
        &self.verifier
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Decide whether `request` may reach its handler.
    pub async fn admit(&self, request: &AdmissionRequest) -> Result<Admission, Rejection> {
        let request_id = Uuid::new_v4();
        let start_time = Instant::now();

        let (principal, key, policy) = match request.credential.as_deref() {
            Some(raw) => {
                let principal = self.verifier.verify(raw).await.map_err(|e| {
                    self.log_auth_failure(request_id, request.client_ip, &e);
                    Rejection::from_auth(request_id, &e)
                })?;
                let key = format!("user:{}", principal.subject);
                (Some(principal), key, self.options.user)
            }
            None if self.options.allow_anonymous => {
                (None, format!("ip:{}", request.client_ip), self.options.ip)
            }
            None => {
                let e = AuthError::Malformed;
                self.log_auth_failure(request_id, request.client_ip, &e);
                return Err(Rejection::from_auth(request_id, &e));
            }
        };

        let decision = match self.limiter.check(&key, &policy).await {
            Ok(decision) if decision.allowed => Some(decision),
            Ok(decision) => {
                warn!(
                    request_id = %request_id,
                    key = %key,
                    limit = decision.limit,
                    reset_at = decision.reset_at,
                    "Rate limit exceeded"
                );
                return Err(Rejection::rate_limited(
                    request_id,
                    &decision,
                    self.clock.now_unix(),
                ));
            }
            Err(e) => match self.options.failure_policy {
                FailurePolicy::Open => {
                    warn!(
                        request_id = %request_id,
                        key = %key,
                        error = %e,
                        "Rate limit store failed, admitting request"
                    );
                    None
                }
                FailurePolicy::Closed => {
                    warn!(
                        request_id = %request_id,
                        key = %key,
                        error = %e,
                        "Rate limit store failed, rejecting request"
                    );
                    return Err(Rejection::unavailable(request_id, &e));
                }
            },
        };

        debug!(
            request_id = %request_id,
            key = %key,
            remaining = decision.map(|d| d.remaining),
            duration_us = start_time.elapsed().as_micros() as u64,
            "Request admitted"
        );

        Ok(Admission {
            request_id,
            principal,
            decision,
        })
    }

    fn log_auth_failure(&self, request_id: Uuid, client_ip: IpAddr, error: &AuthError) {
        match error {
            AuthError::InvalidSignature => warn!(
                request_id = %request_id,
                client_ip = %client_ip,
                "Credential failed signature check"
            ),
            AuthError::Store(e) => warn!(
                request_id = %request_id,
                error = %e,
                "Credential lookup store failed"
            ),
            _ => debug!(
                request_id = %request_id,
                client_ip = %client_ip,
                code = error.code(),
                reason = %error,
                "Credential rejected"
            ),
        }
    }
}
