use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

use crate::error::{Error, Result};

/// Width of a cache key in bytes (SHA-256).
pub const CACHE_KEY_LEN: usize = 32;

/// Content-addressed fingerprint of an [`ExecutionRequest`](super::ExecutionRequest).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey([u8; CACHE_KEY_LEN]);

impl CacheKey {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; CACHE_KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse the 64-character hex form.
    pub fn from_hex(s: &str) -> Result<Self> {
        let mut bytes = [0u8; CACHE_KEY_LEN];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| Error::invalid_request(format!("invalid cache key '{}': {}", s, e)))?;
        Ok(Self(bytes))
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; CACHE_KEY_LEN] {
        &self.0
    }

    /// Lowercase hex form, as stored in the cache.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CacheKey({})", self.to_hex())
    }
}

impl Serialize for CacheKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for CacheKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        CacheKey::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
