#![deny(unused)]
//! Core types, traits, and error definitions for the QPU gateway.
//!
//! This crate provides the building blocks shared by the cache, provider
//! and gateway crates, including the request fingerprint.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod mocks;
pub mod traits;
pub mod types;

pub use error::{Error, ErrorClass, Result};
pub use fingerprint::derive;
pub use traits::*;
pub use types::*;
