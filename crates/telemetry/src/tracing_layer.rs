//! Tracing subscriber configuration.

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::KeyValue;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{runtime, trace as sdktrace, Resource};
use qpu_core::{config::TelemetryConfig, Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

/// Default filter when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "info,qpu_gateway=debug";

/// Keeps the OTLP exporter alive; call [`TelemetryGuard::shutdown`] before
/// exit so batched spans are flushed.
#[derive(Debug, Default)]
pub struct TelemetryGuard {
    provider: Option<sdktrace::TracerProvider>,
}

impl TelemetryGuard {
    /// Whether an OTLP exporter is installed.
    pub fn exports_spans(&self) -> bool {
        self.provider.is_some()
    }

    /// Flush pending spans and stop the exporter.
    pub fn shutdown(self) {
        if let Some(provider) = self.provider {
            for result in provider.force_flush() {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Failed to flush spans");
                }
            }
            if let Err(e) = provider.shutdown() {
                tracing::warn!(error = %e, "Failed to shut down OTLP exporter");
            }
        }
    }
}

/// Build the batch OTLP tracer provider. Must run inside a tokio runtime.
pub fn otlp_tracer_provider(endpoint: &str, service_name: &str) -> Result<sdktrace::TracerProvider> {
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint.to_string()),
        )
        .with_trace_config(
            sdktrace::Config::default().with_resource(Resource::new(vec![KeyValue::new(
                "service.name",
                service_name.to_string(),
            )])),
        )
        .install_batch(runtime::Tokio)
        .map_err(|e| Error::telemetry(format!("Failed to install OTLP pipeline: {}", e)))
}

/// Install the global subscriber: env filter, text or JSON logs, and an
/// OTLP exporter when `otlp_endpoint` is configured.
pub fn configure_tracing(config: &TelemetryConfig) -> Result<TelemetryGuard> {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_FILTER.into()),
    );

    let fmt_layer = if config.json_logs {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if let Some(endpoint) = &config.otlp_endpoint {
        let provider = otlp_tracer_provider(endpoint, &config.service_name)?;
        let tracer = provider.tracer(config.service_name.clone());
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);

        registry
            .with(otel_layer)
            .try_init()
            .map_err(|e| Error::telemetry(format!("Failed to install subscriber: {}", e)))?;
        tracing::info!(endpoint = %endpoint, "OpenTelemetry tracing enabled");

        Ok(TelemetryGuard {
            provider: Some(provider),
        })
    } else {
        registry
            .try_init()
            .map_err(|e| Error::telemetry(format!("Failed to install subscriber: {}", e)))?;
        Ok(TelemetryGuard::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::Registry;

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_otlp_provider_feeds_the_tracing_layer() {
        let provider = otlp_tracer_provider("http://127.0.0.1:4317", "qpu-gateway-test").unwrap();
        let tracer = provider.tracer("qpu-gateway-test");
        let _layer = tracing_opentelemetry::layer::<Registry>().with_tracer(tracer);

        let guard = TelemetryGuard {
            provider: Some(provider),
        };
        assert!(guard.exports_spans());
        guard.shutdown();
    }

    #[test]
    fn test_guard_without_exporter_is_a_no_op() {
        let guard = TelemetryGuard::default();
        assert!(!guard.exports_spans());
        guard.shutdown();
    }
}
