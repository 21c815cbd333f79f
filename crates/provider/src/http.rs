//! HTTP execution provider client.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

use qpu_core::{
    config::ProviderConfig,
    traits::ExecutionForwarder,
    types::{ExecutionRequest, ExecutionResult},
    Error, Result,
};

/// Job submission body sent to the provider.
#[derive(Debug, Serialize)]
struct JobRequest<'a> {
    program: &'a str,
    shots: u32,
    parameters: &'a BTreeMap<String, f64>,
    backend: &'a str,
}

/// Successful provider reply: one readout row per shot.
#[derive(Debug, Deserialize)]
struct JobResponse {
    ro: Vec<Vec<i32>>,
}

/// Error body some providers attach to non-2xx replies.
#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Forwarder that submits jobs to a provider over HTTP.
///
/// One job per call; no retries. A configured timeout bounds the whole
/// exchange and surfaces as `UpstreamTimeout`.
pub struct HttpForwarder {
    client: reqwest::Client,
    jobs_url: Url,
    api_token: Option<SecretString>,
}

impl HttpForwarder {
    /// Create a forwarder from provider configuration.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let mut base = Url::parse(&config.endpoint).map_err(|e| {
            Error::config(format!("Invalid provider endpoint '{}': {}", config.endpoint, e))
        })?;
        // Url::join drops the last segment unless the base ends with '/'.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let jobs_url = base
            .join("v1/jobs")
            .map_err(|e| Error::config(format!("Invalid provider endpoint: {}", e)))?;

        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            jobs_url,
            api_token: config.api_token.clone(),
        })
    }

    /// Full URL jobs are posted to.
    pub fn jobs_url(&self) -> &Url {
        &self.jobs_url
    }
}

#[async_trait]
impl ExecutionForwarder for HttpForwarder {
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        let body = JobRequest {
            program: &request.program,
            shots: request.shots,
            parameters: &request.params,
            backend: &request.backend,
        };

        let mut req = self.client.post(self.jobs_url.clone()).json(&body);
        if let Some(token) = &self.api_token {
            req = req.bearer_auth(token.expose_secret());
        }

        tracing::debug!(
            url = %self.jobs_url,
            backend = %request.backend,
            shots = request.shots,
            "Submitting job to execution provider"
        );

        let response = req.send().await.map_err(classify_transport_error)?;
        let status = response.status();

        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let reason = error_reason(&text).unwrap_or_else(|| status.to_string());
            tracing::warn!(status = %status, reason = %reason, "Execution provider returned an error");
            return Err(match status.as_u16() {
                408 | 504 => Error::upstream_timeout(reason),
                _ if status.is_client_error() => Error::upstream_rejected(reason),
                _ => Error::upstream_unreachable(format!("{}: {}", status, reason)),
            });
        }

        let bytes = response.bytes().await.map_err(classify_transport_error)?;
        let job: JobResponse = serde_json::from_slice(&bytes).map_err(|e| {
            Error::upstream_invalid_response(format!("Failed to decode job result: {}", e))
        })?;

        normalize_readout(job.ro, request.shots)
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn classify_transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::upstream_timeout(e.to_string())
    } else {
        Error::upstream_unreachable(e.to_string())
    }
}

fn error_reason(body: &str) -> Option<String> {
    if let Ok(parsed) = serde_json::from_str::<ProviderErrorBody>(body) {
        if let Some(reason) = parsed.error.or(parsed.message) {
            return Some(reason);
        }
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.chars().take(512).collect())
    }
}

/// Flatten per-shot readout rows into a single shot-major sequence.
///
/// Rows must all have the same width and there must be one row per shot.
pub fn normalize_readout(rows: Vec<Vec<i32>>, shots: u32) -> Result<ExecutionResult> {
    if rows.len() != shots as usize {
        return Err(Error::upstream_invalid_response(format!(
            "expected {} readout rows, got {}",
            shots,
            rows.len()
        )));
    }

    let width = rows.first().map(Vec::len).unwrap_or(0);
    if let Some(pos) = rows.iter().position(|row| row.len() != width) {
        return Err(Error::upstream_invalid_response(format!(
            "readout row {} has width {}, expected {}",
            pos,
            rows[pos].len(),
            width
        )));
    }

    Ok(ExecutionResult::new(rows.into_iter().flatten().collect()))
}
