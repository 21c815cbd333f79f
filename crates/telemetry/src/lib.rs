#![deny(unused)]
//! Observability for the QPU gateway.
//!
//! This crate provides:
//! - Structured logging and optional OpenTelemetry export
//! - Prometheus metrics for cache outcomes and provider latency

pub mod metrics;
pub mod tracing_layer;

pub use self::metrics::{
    setup_metrics_recorder, track_cache_degraded, track_forwarder_latency, track_request,
};
pub use tracing_layer::{configure_tracing, otlp_tracer_provider, TelemetryGuard};
