//! In-memory result cache using DashMap.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use qpu_core::{
    traits::ResultCache,
    types::{CacheKey, ExecutionResult},
    Error, Result,
};

/// Serialized result with its expiry deadline.
#[derive(Debug, Clone)]
struct StoredResult {
    /// Serialized `ExecutionResult`, exactly as a remote store would hold it.
    payload: Vec<u8>,
    /// Deadline on the tokio clock.
    expires_at: Instant,
}

/// In-memory result cache for development and tests.
///
/// Expiry follows the tokio clock, so a paused test runtime can advance
/// past the TTL without sleeping.
#[derive(Debug, Default)]
pub struct InMemoryResultCache {
    data: DashMap<CacheKey, StoredResult>,
    closed: AtomicBool,
}

impl InMemoryResultCache {
    /// Create a new in-memory cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included until they are read.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Drop every expired entry.
    pub fn cleanup(&self) {
        let now = Instant::now();
        self.data.retain(|_, v| v.expires_at > now);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::storage("in-memory cache is closed"));
        }
        Ok(())
    }
}

#[async_trait]
impl ResultCache for InMemoryResultCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<ExecutionResult>> {
        self.ensure_open()?;
        let now = Instant::now();

        // Copy out before touching the map again; a live Ref would deadlock remove.
        let payload = match self.data.get(key) {
            Some(entry) if entry.expires_at > now => Some(entry.payload.clone()),
            Some(_) => None,
            None => return Ok(None),
        };

        match payload {
            Some(bytes) => {
                let result = serde_json::from_slice(&bytes).map_err(|e| {
                    Error::storage(format!("Failed to deserialize cached result: {}", e))
                })?;
                Ok(Some(result))
            }
            None => {
                self.data.remove_if(key, |_, v| v.expires_at <= now);
                tracing::debug!(cache_key = %key, "Cache entry expired");
                Ok(None)
            }
        }
    }

    async fn put(&self, key: &CacheKey, result: &ExecutionResult, ttl: Duration) -> Result<()> {
        self.ensure_open()?;
        let payload = serde_json::to_vec(result)?;
        self.data.insert(
            *key,
            StoredResult {
                payload,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.data.clear();
        Ok(())
    }
}
