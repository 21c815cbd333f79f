#![deny(unused)]
//! Result cache stores for the QPU gateway.
//!
//! Redis is the shared production store; the in-memory store backs local
//! development and tests.

pub mod memory;
pub mod redis;

pub use memory::InMemoryResultCache;
pub use self::redis::RedisResultCache;
