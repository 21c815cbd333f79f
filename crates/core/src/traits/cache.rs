//! Result cache traits.

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;
use crate::types::{CacheKey, ExecutionResult};

/// Default validity window of a cache entry.
pub const DEFAULT_RESULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Key/value store holding previously produced execution results.
///
/// Implementations must be safe to share between concurrent requests.
/// Expiry is enforced by the store: an expired entry reads as `None`.
#[async_trait]
pub trait ResultCache: Send + Sync {
    /// Look up a result. Never mutates the store.
    async fn get(&self, key: &CacheKey) -> Result<Option<ExecutionResult>>;

    /// Store a result for `ttl`, replacing any existing entry.
    async fn put(&self, key: &CacheKey, result: &ExecutionResult, ttl: Duration) -> Result<()>;

    /// Release the underlying connection. Later calls fail with a storage error.
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
