//! Timeout handling for store round trips.

use std::future::Future;
use std::time::Duration;

use crate::error::StoreError;

/// Run a store operation, failing with [`StoreError::Timeout`] if it does not
/// complete within `timeout`.
pub async fn with_timeout<F, T>(timeout: Duration, operation: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}
