#![deny(unused)]
//! Execution forwarders for the QPU gateway.
//!
//! Forwarders submit programs to the external execution provider and
//! normalize its replies into `ExecutionResult`s.

pub mod http;

pub use http::{normalize_readout, HttpForwarder};
