//! Redis implementation of ResultCache.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands, Client};
use std::time::Duration;
use tokio::sync::RwLock;

use qpu_core::{
    traits::ResultCache,
    types::{CacheKey, ExecutionResult},
    Error, Result,
};

/// Redis-backed result cache.
///
/// Holds one long-lived, auto-reconnecting connection for the whole process.
/// Entries are written with `SET key value EX ttl` so Redis enforces expiry.
pub struct RedisResultCache {
    conn: RwLock<Option<ConnectionManager>>,
    prefix: String,
}

impl RedisResultCache {
    /// Connect to Redis and verify the connection with `PING`.
    pub async fn connect(url: &str, prefix: &str) -> Result<Self> {
        let client = Client::open(url)
            .map_err(|e| Error::storage(format!("Invalid Redis URL: {}", e)))?;

        let mut conn = ConnectionManager::new(client)
            .await
            .map_err(|e| Error::storage(format!("Failed to connect to Redis: {}", e)))?;

        let pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::storage(format!("Redis ping failed: {}", e)))?;
        tracing::debug!(reply = %pong, "Redis connection verified");

        Ok(Self {
            conn: RwLock::new(Some(conn)),
            prefix: prefix.to_string(),
        })
    }

    fn key(&self, key: &CacheKey) -> String {
        storage_key(&self.prefix, key)
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or_else(|| Error::storage("Redis connection is closed"))
    }
}

fn storage_key(prefix: &str, key: &CacheKey) -> String {
    format!("{}:{}", prefix, key.to_hex())
}

/// Whole seconds for `EX`, rounded up so an entry never outlives nothing.
fn ttl_seconds(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}

#[async_trait]
impl ResultCache for RedisResultCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<ExecutionResult>> {
        let mut conn = self.connection().await?;

        let data: Option<String> = conn
            .get(self.key(key))
            .await
            .map_err(|e| Error::storage(format!("Redis get error: {}", e)))?;

        match data {
            Some(json) => {
                let result = serde_json::from_str(&json).map_err(|e| {
                    Error::storage(format!("Failed to deserialize cached result: {}", e))
                })?;
                Ok(Some(result))
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &CacheKey, result: &ExecutionResult, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;

        let json = serde_json::to_string(result)
            .map_err(|e| Error::storage(format!("Failed to serialize result: {}", e)))?;

        let _: () = conn
            .set_ex(self.key(key), json, ttl_seconds(ttl))
            .await
            .map_err(|e| Error::storage(format!("Redis set error: {}", e)))?;

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if self.conn.write().await.take().is_some() {
            tracing::info!("Redis result cache connection closed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_layout() {
        let key = CacheKey::from_bytes([0x0f; 32]);
        let stored = storage_key("qpu:result", &key);
        assert_eq!(stored, format!("qpu:result:{}", "0f".repeat(32)));
    }

    #[test]
    fn test_ttl_rounding() {
        assert_eq!(ttl_seconds(Duration::from_secs(86400)), 86400);
        assert_eq!(ttl_seconds(Duration::from_millis(1500)), 2);
        assert_eq!(ttl_seconds(Duration::ZERO), 1);
    }

    /// Needs a live server: `REDIS_URL=redis://localhost:6379 cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn test_live_round_trip_and_close() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".into());
        let cache = RedisResultCache::connect(&url, "qpu:test").await.unwrap();
        let key = CacheKey::from_bytes([7; 32]);
        let result = ExecutionResult::new(vec![1, 0, 1]);

        cache.put(&key, &result, Duration::from_secs(5)).await.unwrap();
        assert_eq!(cache.get(&key).await.unwrap(), Some(result));

        cache.close().await.unwrap();
        assert!(matches!(cache.get(&key).await, Err(Error::Storage(_))));
    }
}
