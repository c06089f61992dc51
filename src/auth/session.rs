//! Session liveness lookups for credential revocation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::error::StoreError;

/// Read-only view of session liveness used by the verifier.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Returns `true` if the session exists and has not been revoked.
    async fn is_active(&self, session_id: &str) -> Result<bool, StoreError>;
}

#[derive(Debug, Clone)]
struct SessionEntry {
    subject: String,
    /// `None` for sessions whose TTL cannot be represented.
    expires_at: Option<Instant>,
}

impl SessionEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Thread-safe in-memory session store with TTL-based expiry.
pub struct InMemorySessionStore {
    /// Map of session id -> entry.
    sessions: Mutex<HashMap<String, SessionEntry>>,
    /// Lifetime of a session from creation.
    ttl: Duration,
}

impl InMemorySessionStore {
    /// Create a new session store with the given TTL.
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    /// Open a session for `subject` and return its id.
    pub fn create(&self, subject: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let entry = SessionEntry {
            subject: subject.to_string(),
            expires_at: Instant::now().checked_add(self.ttl),
        };
        self.lock().insert(id.clone(), entry);
        debug!(session_id = %id, subject = %subject, "Session created");
        id
    }

    /// Revoke a session. Returns `false` if it was not present.
    pub fn revoke(&self, session_id: &str) -> bool {
        let removed = self.lock().remove(session_id).is_some();
        if removed {
            debug!(session_id = %session_id, "Session revoked");
        }
        removed
    }

    /// Revoke every session belonging to `subject`. Returns how many were removed.
    pub fn revoke_subject(&self, subject: &str) -> usize {
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, entry| entry.subject != subject);
        before - sessions.len()
    }

    /// Get the current number of stored sessions (for monitoring).
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Force cleanup of expired sessions.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let mut sessions = self.lock();
        let before = sessions.len();
        sessions.retain(|_, entry| entry.is_live(now));

        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, remaining = sessions.len(), "Purged expired sessions");
        }
    }

    /// Start a background cleanup task.
    ///
    /// This spawns a tokio task that periodically removes expired sessions.
    /// Must be called from within a tokio runtime.
    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            loop {
                interval_timer.tick().await;
                store.cleanup();
            }
        });
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, SessionEntry>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn is_active(&self, session_id: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        Ok(self
            .lock()
            .get(session_id)
            .map(|entry| entry.is_live(now))
            .unwrap_or(false))
    }
}
