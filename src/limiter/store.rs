//! Counter store interface.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// Shared key-value store providing atomic increment-with-TTL.
///
/// Implementations must apply the increment and, for a key that did not
/// exist, the TTL as one atomic step. Concurrent callers on the same key must
/// each observe a distinct post-increment count.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` and return `(count, remaining_ttl)` after the increment.
    ///
    /// A key created by this call expires `ttl` from now. Existing keys keep
    /// their original expiry.
    async fn increment_and_get_ttl(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<(u64, Duration), StoreError>;
}
