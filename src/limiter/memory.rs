//! In-process counter store.
//!
//! Suitable for a single gate instance. Deployments with several instances
//! need a shared store behind the same [`CounterStore`] interface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::debug;

use crate::error::StoreError;

use super::CounterStore;

#[derive(Debug, Clone, Copy)]
struct Counter {
    count: u64,
    /// `None` when the TTL runs past the end of representable time.
    expires_at: Option<Instant>,
}

impl Counter {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Mutex-guarded map of counters with lazy TTL expiry.
///
/// The lock is held across the read-modify-write, which makes the increment
/// and the TTL assignment atomic.
#[derive(Default)]
pub struct InMemoryCounterStore {
    counters: Mutex<HashMap<String, Counter>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn increment(&self, key: &str, ttl: Duration) -> (u64, Duration) {
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();

        let fresh = Counter {
            count: 0,
            expires_at: now.checked_add(ttl),
        };
        let counter = counters.entry(key.to_string()).or_insert(fresh);

        // An expired key counts as absent
        if counter.is_expired(now) {
            *counter = fresh;
        }

        counter.count = counter.count.saturating_add(1);
        let remaining = counter
            .expires_at
            .map_or(ttl, |at| at.saturating_duration_since(now));
        (counter.count, remaining)
    }

    /// Periodically clean up expired counters.
    ///
    /// This should be called periodically to prevent unbounded memory growth.
    pub fn cleanup(&self) {
        let now = Instant::now();
        let mut counters = self.counters.lock().unwrap_or_else(|e| e.into_inner());
        let before = counters.len();
        counters.retain(|_, counter| !counter.is_expired(now));

        let removed = before - counters.len();
        if removed > 0 {
            debug!(removed, remaining = counters.len(), "Purged expired counters");
        }
    }

    /// Get the number of keys being tracked.
    pub fn tracked_keys(&self) -> usize {
        self.counters
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Start a background cleanup task.
    ///
    /// This spawns a tokio task that periodically removes expired counters.
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
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn increment_and_get_ttl(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<(u64, Duration), StoreError> {
        Ok(self.increment(key, ttl))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_counts_increase_per_key() {
        let store = InMemoryCounterStore::new();
        let ttl = Duration::from_secs(60);

        assert_eq!(store.increment("a", ttl).0, 1);
        assert_eq!(store.increment("a", ttl).0, 2);
        assert_eq!(store.increment("b", ttl).0, 1);
        assert_eq!(store.tracked_keys(), 2);
    }

    #[test]
    fn test_ttl_set_on_first_increment_only() {
        let store = InMemoryCounterStore::new();

        let (_, first) = store.increment("a", Duration::from_secs(60));
        let (_, second) = store.increment("a", Duration::from_secs(600));
        assert!(first <= Duration::from_secs(60));
        assert!(second <= first);
    }

    #[test]
    fn test_expired_counter_restarts() {
        let store = InMemoryCounterStore::new();
        let ttl = Duration::from_millis(20);

        store.increment("a", ttl);
        store.increment("a", ttl);
        thread::sleep(Duration::from_millis(40));

        assert_eq!(store.increment("a", ttl).0, 1);
    }

    #[test]
    fn test_cleanup_removes_expired() {
        let store = InMemoryCounterStore::new();
        store.increment("a", Duration::from_millis(10));
        store.increment("b", Duration::from_millis(10));
        store.increment("c", Duration::from_secs(60));

        thread::sleep(Duration::from_millis(30));
        store.cleanup();
        assert_eq!(store.tracked_keys(), 1);
    }

    #[test]
    fn test_unbounded_ttl_never_expires() {
        let store = InMemoryCounterStore::new();
        let ttl = Duration::from_secs(u64::MAX);

        assert_eq!(store.increment("a", ttl), (1, ttl));
        assert_eq!(store.increment("a", ttl), (2, ttl));
        store.cleanup();
        assert_eq!(store.tracked_keys(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_task_purges_expired_counters() {
        let store = Arc::new(InMemoryCounterStore::new());
        store.increment("short", Duration::from_secs(60));
        store.increment("long", Duration::from_secs(600));
        store.start_cleanup_task(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(45)).await;
        assert_eq!(store.tracked_keys(), 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(store.tracked_keys(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_increments_are_distinct() {
        let store = Arc::new(InMemoryCounterStore::new());
        let mut handles = Vec::new();
        for _ in 0..50 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .increment_and_get_ttl("k", Duration::from_secs(60))
                    .await
                    .unwrap()
                    .0
            }));
        }

        let mut counts = Vec::new();
        for handle in handles {
            counts.push(handle.await.unwrap());
        }
        counts.sort_unstable();
        assert_eq!(counts, (1..=50).collect::<Vec<_>>());
    }
}
