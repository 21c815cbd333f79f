#![deny(unused)]
//! HTTPS entry point for the QPU gateway.
//!
//! Accepts Quil execution requests over mutual TLS, answers repeats from the
//! result cache and forwards everything else to the execution provider.

pub mod server;
pub mod service;
pub mod tls;

pub use server::{AppState, ErrorResponse, GatewayConfig, GatewayServer, RunQuilRequest};
pub use service::{Execution, GatewayService, ResultStream};
pub use tls::build_server_config;
