//! Mock implementations of core traits for testing.
//!
//! Used across the workspace for unit and integration tests of the
//! gateway's hit/miss logic.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::{
    traits::{ExecutionForwarder, ResultCache},
    types::{CacheKey, ExecutionRequest, ExecutionResult},
    Error, Result,
};

// =============================================================================
// Mock Forwarder
// =============================================================================

/// What a [`MockForwarder`] answers with.
#[derive(Debug, Clone)]
pub enum ForwarderBehavior {
    /// Return this readout.
    Succeed(Vec<i32>),
    /// Fail as if the provider were down.
    Unreachable,
    /// Fail as if the provider refused the program.
    Reject(String),
    /// Fail as if the provider took too long.
    Timeout,
}

/// Forwarder that records every request it receives.
pub struct MockForwarder {
    behavior: Mutex<ForwarderBehavior>,
    calls: Mutex<Vec<ExecutionRequest>>,
}

impl MockForwarder {
    pub fn new(behavior: ForwarderBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Forwarder that always returns `ro`.
    pub fn returning(ro: Vec<i32>) -> Self {
        Self::new(ForwarderBehavior::Succeed(ro))
    }

    /// Forwarder that always fails with `behavior`.
    pub fn failing(behavior: ForwarderBehavior) -> Self {
        Self::new(behavior)
    }

    /// Change behavior for subsequent calls.
    pub fn set_behavior(&self, behavior: ForwarderBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    /// Number of execute calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Requests received so far.
    pub fn calls(&self) -> Vec<ExecutionRequest> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExecutionForwarder for MockForwarder {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        self.calls.lock().unwrap().push(request.clone());
        let behavior = self.behavior.lock().unwrap().clone();
        match behavior {
            ForwarderBehavior::Succeed(ro) => Ok(ExecutionResult::new(ro)),
            ForwarderBehavior::Unreachable => {
                Err(Error::upstream_unreachable("connection refused"))
            }
            ForwarderBehavior::Reject(reason) => Err(Error::upstream_rejected(reason)),
            ForwarderBehavior::Timeout => Err(Error::upstream_timeout("no reply")),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// =============================================================================
// Mock Result Cache
// =============================================================================

/// A recorded `put` call.
#[derive(Debug, Clone, PartialEq)]
pub struct PutCall {
    pub key: CacheKey,
    pub result: ExecutionResult,
    pub ttl: Duration,
}

/// Map-backed cache with failure injection. Has no notion of expiry.
#[derive(Default)]
pub struct MockResultCache {
    entries: Mutex<HashMap<CacheKey, ExecutionResult>>,
    puts: Mutex<Vec<PutCall>>,
    gets: Mutex<usize>,
    fail_get: Mutex<bool>,
    fail_put: Mutex<bool>,
}

impl MockResultCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with preset entries.
    pub fn with_entries(entries: Vec<(CacheKey, ExecutionResult)>) -> Self {
        let cache = Self::new();
        {
            let mut map = cache.entries.lock().unwrap();
            for (k, v) in entries {
                map.insert(k, v);
            }
        }
        cache
    }

    /// Make every `get` fail.
    pub fn fail_gets(&self, fail: bool) {
        *self.fail_get.lock().unwrap() = fail;
    }

    /// Make every `put` fail.
    pub fn fail_puts(&self, fail: bool) {
        *self.fail_put.lock().unwrap() = fail;
    }

    /// Recorded `put` calls, including failed ones.
    pub fn puts(&self) -> Vec<PutCall> {
        self.puts.lock().unwrap().clone()
    }

    /// Number of `get` calls, including failed ones.
    pub fn get_count(&self) -> usize {
        *self.gets.lock().unwrap()
    }

    /// Current value for a key.
    pub fn peek(&self, key: &CacheKey) -> Option<ExecutionResult> {
        self.entries.lock().unwrap().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultCache for MockResultCache {
    async fn get(&self, key: &CacheKey) -> Result<Option<ExecutionResult>> {
        *self.gets.lock().unwrap() += 1;
        if *self.fail_get.lock().unwrap() {
            return Err(Error::storage("mock get failure"));
        }
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn put(&self, key: &CacheKey, result: &ExecutionResult, ttl: Duration) -> Result<()> {
        self.puts.lock().unwrap().push(PutCall {
            key: *key,
            result: result.clone(),
            ttl,
        });
        if *self.fail_put.lock().unwrap() {
            return Err(Error::storage("mock put failure"));
        }
        self.entries.lock().unwrap().insert(*key, result.clone());
        Ok(())
    }
}

// Tests for these mocks live with their users in the gateway crate.
