//! Resolved identities and the identity-store collaborator.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use crate::error::StoreError;

/// Identity resolved from a verified credential.
///
/// Built per request and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub subject: String,
    pub active: bool,
    pub roles: BTreeSet<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl Principal {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// What the identity store knows about a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub active: bool,
    pub roles: BTreeSet<String>,
}

impl IdentityRecord {
    pub fn active<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            active: true,
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn inactive() -> Self {
        Self {
            active: false,
            roles: BTreeSet::new(),
        }
    }
}

/// Lookup of subjects in an external user directory.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn find(&self, subject: &str) -> Result<Option<IdentityRecord>, StoreError>;
}

/// Identity store backed by a map.
#[derive(Default)]
pub struct InMemoryIdentityStore {
    records: Mutex<HashMap<String, IdentityRecord>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, subject: impl Into<String>, record: IdentityRecord) {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(subject.into(), record);
    }

    pub fn remove(&self, subject: &str) -> Option<IdentityRecord> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(subject)
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn find(&self, subject: &str) -> Result<Option<IdentityRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(subject)
            .cloned())
    }
}

/// Short-lived cache of identity lookups.
///
/// Callers use it cache-aside: `get`, on miss query the store, then `insert`.
/// Only found records are cached.
pub struct PrincipalCache {
    /// Subject -> record and its expiry (`None` if the TTL overflows).
    entries: Mutex<HashMap<String, (IdentityRecord, Option<Instant>)>>,
    ttl: Duration,
}

fn is_live(expires_at: Option<Instant>, now: Instant) -> bool {
    expires_at.map_or(true, |at| at > now)
}

impl PrincipalCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub fn get(&self, subject: &str) -> Option<IdentityRecord> {
        let mut entries = self.lock();
        match entries.get(subject) {
            Some((record, expires_at)) if is_live(*expires_at, Instant::now()) => {
                Some(record.clone())
            }
            Some(_) => {
                entries.remove(subject);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, subject: &str, record: IdentityRecord) {
        let expires_at = Instant::now().checked_add(self.ttl);
        self.lock().insert(subject.to_string(), (record, expires_at));
    }

    pub fn invalidate(&self, subject: &str) {
        self.lock().remove(subject);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries, including those never looked up again.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, (_, expires_at)| is_live(*expires_at, now));

        let removed = before - entries.len();
        if removed > 0 {
            debug!(
                removed,
                remaining = entries.len(),
                "Purged expired identity cache entries"
            );
        }
    }

    /// Start a background cleanup task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_cleanup_task(self: &Arc<Self>, interval: Duration) {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(interval);
            loop {
                interval_timer.tick().await;
                cache.cleanup();
            }
        });
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, (IdentityRecord, Option<Instant>)>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}
