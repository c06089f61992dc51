//! Stores the gate talks to.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::auth::{IdentityStore, InMemoryIdentityStore, InMemorySessionStore, SessionStore};
use crate::config::Settings;
use crate::limiter::{CounterStore, InMemoryCounterStore};

/// External stores the gate talks to.
#[derive(Clone)]
pub struct GateStores {
    pub counters: Arc<dyn CounterStore>,
    pub sessions: Option<Arc<dyn SessionStore>>,
    pub identities: Option<Arc<dyn IdentityStore>>,
}

/// Concrete in-memory stores, kept so callers can open sessions and
/// register identities.
#[derive(Clone)]
pub struct InMemoryStores {
    pub counters: Arc<InMemoryCounterStore>,
    pub sessions: Arc<InMemorySessionStore>,
    pub identities: Arc<InMemoryIdentityStore>,
}

impl InMemoryStores {
    /// Build the stores and start purging expired counters and sessions at
    /// the configured intervals.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(settings: &Settings) -> Self {
        let counters = Arc::new(InMemoryCounterStore::new());
        let sessions = Arc::new(InMemorySessionStore::new(Duration::from_secs(
            settings.session.ttl_seconds,
        )));
        let identities = Arc::new(InMemoryIdentityStore::new());

        let counter_interval = Duration::from_secs(settings.rate_limit.cleanup_interval_seconds);
        let session_interval = Duration::from_secs(settings.session.cleanup_interval_seconds);
        counters.start_cleanup_task(counter_interval);
        sessions.start_cleanup_task(session_interval);

        info!(
            session_ttl_secs = settings.session.ttl_seconds,
            counter_cleanup_secs = counter_interval.as_secs(),
            session_cleanup_secs = session_interval.as_secs(),
            "In-memory stores started"
        );

        Self {
            counters,
            sessions,
            identities,
        }
    }

    /// Trait-object view for [`AdmissionGate`](super::AdmissionGate).
    ///
    /// The identity store is consulted for every credential, so subjects
    /// must be registered in `identities` before they can be admitted.
    pub fn gate_stores(&self) -> GateStores {
        GateStores {
            counters: self.counters.clone(),
            sessions: Some(self.sessions.clone() as Arc<dyn SessionStore>),
            identities: Some(self.identities.clone() as Arc<dyn IdentityStore>),
        }
    }
}
