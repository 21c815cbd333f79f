//! Axum-based HTTPS server for the gateway.

use axum::{
    extract::{rejection::JsonRejection, Json, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use axum_extra::json_lines::JsonLines;
use axum_server::tls_rustls::RustlsConfig;
use futures::StreamExt;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use qpu_core::{
    config::{AppConfig, ServerConfig, TlsConfig},
    types::{ExecutionRequest, RequestMetadata},
    Error, ErrorClass, Result,
};
use qpu_telemetry::track_request;

use crate::service::GatewayService;
use crate::tls::build_server_config;

/// Header reporting whether the result came from the cache.
pub const CACHE_STATUS_HEADER: &str = "x-cache";
/// Header carrying the hex cache key.
pub const CACHE_KEY_HEADER: &str = "x-cache-key";
/// Header echoing the request's trace ID.
pub const TRACE_ID_HEADER: &str = "x-trace-id";
/// Standard content type header.
pub const CONTENT_TYPE_HEADER: &str = "content-type";
/// Media type of the streamed result frames.
pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Listener settings.
    pub server: ServerConfig,
    /// TLS material and protocol floor.
    pub tls: TlsConfig,
    /// Backend used when a request does not name one.
    pub default_backend: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self::from(&AppConfig::default())
    }
}

impl From<&AppConfig> for GatewayConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            server: config.server.clone(),
            tls: config.tls.clone(),
            default_backend: config.provider.default_backend.clone(),
        }
    }
}

/// Shared application state.
pub struct AppState {
    /// Cache-aside execution pipeline.
    pub service: Arc<GatewayService>,
    /// Backend used when a request does not name one.
    pub default_backend: String,
}

/// Gateway server.
pub struct GatewayServer {
    config: GatewayConfig,
    state: Arc<AppState>,
    metrics_handle: Option<PrometheusHandle>,
}

impl GatewayServer {
    /// Create a new gateway server.
    pub fn new(config: GatewayConfig, service: Arc<GatewayService>) -> Self {
        let state = Arc::new(AppState {
            service,
            default_backend: config.default_backend.clone(),
        });
        Self {
            config,
            state,
            metrics_handle: None,
        }
    }

    /// Set metrics handle.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Build the Axum router.
    pub fn build_router(&self) -> Router {
        let mut router = Router::new()
            .route("/health", get(health_handler))
            .route("/v1/quantum/run-quil", post(run_quil_handler))
            .with_state(self.state.clone());

        if let Some(handle) = &self.metrics_handle {
            let handle = handle.clone();
            router = router.route("/metrics", get(move || async move { handle.render() }));
        }

        router.layer(TraceLayer::new_for_http())
    }

    /// Serve over mutual TLS until `shutdown` resolves.
    ///
    /// In-flight requests get `shutdown_grace_secs` to finish afterwards.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let host_port = format!("{}:{}", self.config.server.host, self.config.server.port);
        let addr = tokio::net::lookup_host(&host_port)
            .await
            .map_err(|e| Error::gateway(format!("Failed to resolve {}: {}", host_port, e)))?
            .next()
            .ok_or_else(|| Error::gateway(format!("No address for {}", host_port)))?;

        let tls = build_server_config(&self.config.tls)?;
        let rustls_config = RustlsConfig::from_config(Arc::new(tls));

        let handle: axum_server::Handle<std::net::SocketAddr> = axum_server::Handle::new();
        let grace = Duration::from_secs(self.config.server.shutdown_grace_secs);
        let shutdown_handle = handle.clone();
        tokio::spawn(async move {
            shutdown.await;
            tracing::info!(grace_secs = grace.as_secs(), "Shutdown signal received, draining");
            shutdown_handle.graceful_shutdown(Some(grace));
        });

        tracing::info!(
            addr = %addr,
            min_tls = ?self.config.tls.min_version,
            "Gateway server starting"
        );

        axum_server::bind_rustls(addr, rustls_config)
            .handle(handle)
            .serve(self.build_router().into_make_service())
            .await
            .map_err(|e| Error::gateway(format!("Server error: {}", e)))?;

        tracing::info!("Gateway server stopped");
        Ok(())
    }
}

// =============================================================================
// Request/Response Types
// =============================================================================

/// Body of `POST /v1/quantum/run-quil`.
#[derive(Debug, Deserialize)]
pub struct RunQuilRequest {
    /// Quil program text.
    pub program: String,
    /// Number of shots.
    pub shots: u32,
    /// Parametric memory values.
    #[serde(default)]
    pub params: BTreeMap<String, f64>,
    /// Target backend; the configured default when omitted.
    pub backend: Option<String>,
    /// Submitting client identity.
    pub client_id: Option<String>,
    /// Caller-chosen trace ID.
    pub trace_id: Option<String>,
}

impl RunQuilRequest {
    /// Convert to a domain request, resolving the backend.
    pub fn into_execution_request(self, default_backend: &str, trace_id: String) -> ExecutionRequest {
        ExecutionRequest {
            program: self.program,
            params: self.params,
            shots: self.shots,
            backend: self.backend.unwrap_or_else(|| default_backend.to_string()),
            metadata: RequestMetadata {
                client_id: self.client_id,
                trace_id: Some(trace_id),
            },
        }
    }
}

/// Health response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status.
    pub status: String,
    /// Version.
    pub version: String,
}

/// Error response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Trace ID.
    pub trace_id: String,
}

fn status_for(e: &Error) -> StatusCode {
    match e {
        Error::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        Error::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ if e.class() == ErrorClass::Upstream => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(e: &Error, trace_id: String) -> Response {
    // Internal details stay in the logs.
    let message = match e.class() {
        ErrorClass::Client | ErrorClass::Upstream => e.to_string(),
        ErrorClass::CacheDegraded | ErrorClass::Internal => "internal error".to_string(),
    };
    (
        status_for(e),
        Json(ErrorResponse {
            code: e.code().to_string(),
            message,
            trace_id,
        }),
    )
        .into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Use the caller's trace ID when it can be echoed in a header, else mint one.
fn resolve_trace_id(supplied: Option<String>) -> String {
    match supplied {
        Some(id) if !id.trim().is_empty() && HeaderValue::from_str(&id).is_ok() => id,
        Some(id) if !id.trim().is_empty() => {
            let minted = Uuid::new_v4().to_string();
            tracing::warn!(
                trace_id = %minted,
                supplied = ?id,
                "Supplied trace ID is not a valid header value, replacing it"
            );
            minted
        }
        _ => Uuid::new_v4().to_string(),
    }
}

/// Execute a Quil program, serving from the cache when possible.
///
/// Replies with newline-delimited JSON frames of readout values.
async fn run_quil_handler(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<RunQuilRequest>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            track_request("client_error");
            let trace_id = Uuid::new_v4().to_string();
            tracing::info!(trace_id = %trace_id, error = %rejection.body_text(), "Malformed request");
            return error_response(&Error::invalid_request(rejection.body_text()), trace_id);
        }
    };

    let trace_id = resolve_trace_id(payload.trace_id.clone());
    let request = payload.into_execution_request(&state.default_backend, trace_id.clone());

    tracing::info!(
        trace_id = %trace_id,
        client_id = request.metadata.client_id.as_deref().unwrap_or("-"),
        backend = %request.backend,
        shots = request.shots,
        program_len = request.program.len(),
        stage = "received",
        "Processing run-quil request"
    );

    match state.service.run(request).await {
        Ok(execution) => {
            let headers = [
                (CONTENT_TYPE_HEADER, NDJSON_CONTENT_TYPE.to_string()),
                (CACHE_STATUS_HEADER, execution.source.as_str().to_string()),
                (CACHE_KEY_HEADER, execution.key.to_hex()),
                (TRACE_ID_HEADER, trace_id),
            ];
            let frames = execution.into_stream().map(Ok::<_, Infallible>);
            (StatusCode::OK, headers, JsonLines::new(frames)).into_response()
        }
        Err(e) => error_response(&e, trace_id),
    }
}
