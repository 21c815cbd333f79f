//! Core type definitions for the QPU gateway.
//!
//! Broken down into submodules for better maintainability.

pub mod key;
pub mod request;
pub mod result;

pub use key::*;
pub use request::*;
pub use result::*;
