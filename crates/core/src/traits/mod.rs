//! Collaborator traits for the QPU gateway.
//!
//! - `cache`: Result Cache Client (ResultCache)
//! - `forwarder`: Execution Forwarder (ExecutionForwarder)

pub mod cache;
pub mod forwarder;

pub use cache::*;
pub use forwarder::*;
