//! Bearer credential verification.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::error::AuthError;
use crate::timeout::with_timeout;

use super::principal::{IdentityRecord, IdentityStore, Principal, PrincipalCache};
use super::session::SessionStore;
use super::token::{self, Claims, TokenKind};
use super::SigningKey;

/// Default bound on a single session/identity lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_millis(50);

/// Resolves credentials to principals.
///
/// Stateless between calls apart from the optional principal cache.
pub struct TokenVerifier {
    key: SigningKey,
    clock: Arc<dyn Clock>,
    sessions: Option<Arc<dyn SessionStore>>,
    identities: Option<Arc<dyn IdentityStore>>,
    cache: Option<Arc<PrincipalCache>>,
    lookup_timeout: Duration,
}

impl TokenVerifier {
    pub fn new(key: SigningKey) -> Self {
        Self {
            key,
            clock: Arc::new(SystemClock),
            sessions: None,
            identities: None,
            cache: None,
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Check `sid` claims against `store` for revocation.
    pub fn with_session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = Some(store);
        self
    }

    /// Resolve subjects against `store`, caching found records for
    /// `cache_ttl` when it is non-zero.
    pub fn with_identity_store(mut self, store: Arc<dyn IdentityStore>, cache_ttl: Duration) -> Self {
        self.identities = Some(store);
        self.cache = (!cache_ttl.is_zero())
            .then(|| Arc::new(PrincipalCache::new(cache_ttl)));
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    /// Periodically purge expired identity cache entries. No-op when caching
    /// is disabled. Must be called from within a tokio runtime.
    pub fn start_cache_cleanup(&self, interval: Duration) {
        if let Some(cache) = self.cache.as_ref() {
            cache.start_cleanup_task(interval);
        }
    }

    /// Verify an access credential.
    ///
    /// Checks, in order: structure, expiry, signature, token kind, session
    /// liveness (when the token names a session and a store is configured),
    /// and the identity record (when an identity store is configured).
    pub async fn verify(&self, raw: &str) -> Result<Principal, AuthError> {
        self.verify_kind(raw, TokenKind::Access).await
    }

    /// Verify a refresh credential.
    pub async fn verify_refresh(&self, raw: &str) -> Result<Principal, AuthError> {
        self.verify_kind(raw, TokenKind::Refresh).await
    }

    /// Verify a credential and return its claims without any store lookups.
    ///
    /// Pure: depends only on the token, the key and the clock. Rejections
    /// are returned, not logged; callers log them with request context.
    pub fn decode_claims(&self, raw: &str) -> Result<Claims, AuthError> {
        let unverified = token::peek(raw)?;

        let now = self.clock.now_unix();
        if unverified.exp <= now {
            return Err(AuthError::Expired {
                expired_at: unverified.exp,
            });
        }

        token::verify(raw, &self.key)
    }

    async fn verify_kind(&self, raw: &str, expected: TokenKind) -> Result<Principal, AuthError> {
        let claims = self.decode_claims(raw)?;

        if claims.kind != expected {
            return Err(AuthError::WrongTokenKind {
                expected: expected.as_str(),
            });
        }

        if let (Some(sid), Some(sessions)) = (claims.sid.as_deref(), self.sessions.as_ref()) {
            let active = with_timeout(self.lookup_timeout, sessions.is_active(sid))
                .await
                .map_err(AuthError::Store)?;
            if !active {
                return Err(AuthError::RevokedSession);
            }
        }

        let mut principal = Principal {
            subject: claims.sub,
            active: true,
            roles: claims.roles.into_iter().collect(),
            session_id: claims.sid,
        };

        if let Some(record) = self.lookup_identity(&principal.subject).await? {
            if !record.active {
                return Err(AuthError::InactivePrincipal);
            }
            principal.roles.extend(record.roles);
        }

        Ok(principal)
    }

    /// Cache-aside identity lookup. `Ok(None)` when no identity store is
    /// configured.
    async fn lookup_identity(&self, subject: &str) -> Result<Option<IdentityRecord>, AuthError> {
        let Some(identities) = self.identities.as_ref() else {
            return Ok(None);
        };

        if let Some(record) = self.cache.as_ref().and_then(|c| c.get(subject)) {
            return Ok(Some(record));
        }

        let record = with_timeout(self.lookup_timeout, identities.find(subject))
            .await
            .map_err(AuthError::Store)?
            .ok_or(AuthError::UnknownSubject)?;

        if let Some(cache) = self.cache.as_ref() {
            cache.insert(subject, record.clone());
        }
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::principal::InMemoryIdentityStore;
    use crate::auth::session::InMemorySessionStore;
    use crate::auth::TokenIssuer;
    use crate::clock::ManualClock;
    use crate::error::StoreError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const SECRET: &[u8] = b"test-secret-key-32-bytes-long!!!";
    const NOW: u64 = 1_700_000_000;

    fn key() -> SigningKey {
        SigningKey::new(SECRET).unwrap()
    }

    fn setup() -> (TokenIssuer, TokenVerifier, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(NOW));
        let issuer = TokenIssuer::new(key(), Duration::from_secs(60), Duration::from_secs(3600))
            .with_clock(clock.clone());
        let verifier = TokenVerifier::new(key()).with_clock(clock.clone());
        (issuer, verifier, clock)
    }

    #[tokio::test]
    async fn test_valid_token_resolves_subject() {
        let (issuer, verifier, _) = setup();
        let token = issuer.issue_access("user-42", None, &[]).unwrap();

        let principal = verifier.verify(&token.token).await.unwrap();
        assert_eq!(principal.subject, "user-42");
        assert!(principal.active);
    }

    #[tokio::test]
    async fn test_empty_token_is_malformed() {
        let (_, verifier, _) = setup();
        assert_eq!(verifier.verify("").await, Err(AuthError::Malformed));
    }

    #[tokio::test]
    async fn test_foreign_key_is_invalid_signature() {
        let (_, verifier, clock) = setup();
        let other = SigningKey::new(b"another-secret-key-32-bytes-long").unwrap();
        let foreign = TokenIssuer::new(other, Duration::from_secs(60), Duration::from_secs(60))
            .with_clock(clock);
        let token = foreign.issue_access("user-42", None, &[]).unwrap();

        assert_eq!(
            verifier.verify(&token.token).await,
            Err(AuthError::InvalidSignature)
        );
    }

    #[tokio::test]
    async fn test_expiry_is_strict() {
        let (issuer, verifier, clock) = setup();
        let token = issuer.issue_access("user-42", None, &[]).unwrap();

        clock.set(token.expires_at - 1);
        assert!(verifier.verify(&token.token).await.is_ok());

        clock.set(token.expires_at);
        assert_eq!(
            verifier.verify(&token.token).await,
            Err(AuthError::Expired {
                expired_at: token.expires_at
            })
        );
    }

    #[tokio::test]
    async fn test_expired_wins_over_bad_signature() {
        let (issuer, verifier, clock) = setup();
        let token = issuer.issue_access("user-42", None, &[]).unwrap();
        let (unsigned, _) = token.token.rsplit_once('.').unwrap();
        let tampered = format!("{}.AAAA", unsigned);

        clock.advance(3600);
        assert!(matches!(
            verifier.verify(&tampered).await,
            Err(AuthError::Expired { .. })
        ));
    }

    #[tokio::test]
    async fn test_every_signature_bit_flip_is_rejected() {
        let (issuer, verifier, _) = setup();
        let token = issuer.issue_access("user-42", None, &[]).unwrap().token;
        let sig_start = token.rfind('.').unwrap() + 1;

        for pos in sig_start..token.len() {
            for bit in 0..7 {
                let mut bytes = token.clone().into_bytes();
                bytes[pos] ^= 1 << bit;
                let mutated = String::from_utf8(bytes).unwrap();
                assert_eq!(
                    verifier.verify(&mutated).await,
                    Err(AuthError::InvalidSignature),
                    "flip of bit {} at byte {} accepted",
                    bit,
                    pos
                );
            }
        }
    }

    #[tokio::test]
    async fn test_refresh_token_rejected_as_access() {
        let (issuer, verifier, _) = setup();
        let pair = issuer.issue_pair("user-42", None, &[]).unwrap();

        assert_eq!(
            verifier.verify(&pair.refresh.token).await,
            Err(AuthError::WrongTokenKind { expected: "access" })
        );
        assert!(verifier.verify_refresh(&pair.refresh.token).await.is_ok());
        assert!(verifier.verify_refresh(&pair.access.token).await.is_err());
    }

    #[tokio::test]
    async fn test_revoked_session() {
        let (issuer, verifier, _) = setup();
        let sessions = Arc::new(InMemorySessionStore::new(Duration::from_secs(3600)));
        let verifier = verifier.with_session_store(sessions.clone());

        let sid = sessions.create("user-42");
        let token = issuer.issue_access("user-42", Some(&sid), &[]).unwrap();
        let principal = verifier.verify(&token.token).await.unwrap();
        assert_eq!(principal.session_id.as_deref(), Some(sid.as_str()));

        sessions.revoke(&sid);
        assert_eq!(
            verifier.verify(&token.token).await,
            Err(AuthError::RevokedSession)
        );

        let unknown = issuer.issue_access("user-42", Some("missing"), &[]).unwrap();
        assert_eq!(
            verifier.verify(&unknown.token).await,
            Err(AuthError::RevokedSession)
        );
    }

    struct HangingSessions;

    #[async_trait]
    impl SessionStore for HangingSessions {
        async fn is_active(&self, _session_id: &str) -> Result<bool, StoreError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_session_lookup_timeout_is_store_error() {
        let (issuer, verifier, _) = setup();
        let verifier = verifier
            .with_session_store(Arc::new(HangingSessions))
            .with_lookup_timeout(Duration::from_millis(10));
        let token = issuer.issue_access("user-42", Some("sid"), &[]).unwrap();

        assert_eq!(
            verifier.verify(&token.token).await,
            Err(AuthError::Store(StoreError::Timeout { timeout_ms: 10 }))
        );
    }

    #[tokio::test]
    async fn test_identity_store_roles_and_status() {
        let (issuer, verifier, _) = setup();
        let identities = Arc::new(InMemoryIdentityStore::new());
        identities.insert("alice", IdentityRecord::active(["admin"]));
        identities.insert("mallory", IdentityRecord::inactive());
        let verifier = verifier.with_identity_store(identities, Duration::ZERO);

        let alice = issuer
            .issue_access("alice", None, &["reader".to_string()])
            .unwrap();
        let principal = verifier.verify(&alice.token).await.unwrap();
        assert!(principal.has_role("admin"));
        assert!(principal.has_role("reader"));

        let mallory = issuer.issue_access("mallory", None, &[]).unwrap();
        assert_eq!(
            verifier.verify(&mallory.token).await,
            Err(AuthError::InactivePrincipal)
        );

        let ghost = issuer.issue_access("ghost", None, &[]).unwrap();
        assert_eq!(
            verifier.verify(&ghost.token).await,
            Err(AuthError::UnknownSubject)
        );
    }

    struct CountingIdentities {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl IdentityStore for CountingIdentities {
        async fn find(&self, _subject: &str) -> Result<Option<IdentityRecord>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(Some(IdentityRecord::active(["member"])))
        }
    }

    #[tokio::test]
    async fn test_identity_lookup_is_cached() {
        let (issuer, verifier, _) = setup();
        let identities = Arc::new(CountingIdentities {
            calls: AtomicUsize::new(0),
        });
        let verifier = verifier.with_identity_store(identities.clone(), Duration::from_secs(30));
        let token = issuer.issue_access("alice", None, &[]).unwrap();

        for _ in 0..3 {
            assert!(verifier.verify(&token.token).await.is_ok());
        }
        assert_eq!(identities.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_cleanup_forces_fresh_lookup() {
        let (issuer, verifier, _) = setup();
        let identities = Arc::new(CountingIdentities {
            calls: AtomicUsize::new(0),
        });
        let verifier = verifier.with_identity_store(identities.clone(), Duration::from_secs(30));
        verifier.start_cache_cleanup(Duration::from_secs(10));
        let token = issuer.issue_access("alice", None, &[]).unwrap();

        assert!(verifier.verify(&token.token).await.is_ok());
        tokio::time::sleep(Duration::from_secs(45)).await;
        assert!(verifier.cache.as_ref().unwrap().is_empty());

        assert!(verifier.verify(&token.token).await.is_ok());
        assert_eq!(identities.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unbounded_cache_ttl_does_not_overflow() {
        let (issuer, verifier, _) = setup();
        let identities = Arc::new(InMemoryIdentityStore::new());
        identities.insert("alice", IdentityRecord::active(["admin"]));
        let verifier = verifier.with_identity_store(identities, Duration::from_secs(u64::MAX));
        let token = issuer.issue_access("alice", None, &[]).unwrap();

        for _ in 0..2 {
            assert!(verifier.verify(&token.token).await.is_ok());
        }
    }
}
