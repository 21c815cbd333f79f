use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::config::LimitsConfig;
use crate::error::{Error, Result};

// =============================================================================
// Request Types
// =============================================================================

/// A Quil program submitted for execution.
///
/// Everything except `metadata` is semantic: it changes what the provider
/// would measure, and therefore participates in the cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Quil program text.
    pub program: String,

    /// Values for parametric memory references, keyed by name (`theta[0]`).
    #[serde(default)]
    pub params: BTreeMap<String, f64>,

    /// Number of shots to run.
    pub shots: u32,

    /// Target backend (QPU or simulator identifier).
    pub backend: String,

    /// Transport-level metadata; never part of the fingerprint.
    #[serde(default)]
    pub metadata: RequestMetadata,
}

/// Metadata associated with a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestMetadata {
    /// Identity of the submitting client.
    pub client_id: Option<String>,

    /// Caller-supplied or gateway-assigned trace ID.
    pub trace_id: Option<String>,
}

impl ExecutionRequest {
    /// Create a request with no parameters.
    pub fn new(program: impl Into<String>, shots: u32, backend: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            params: BTreeMap::new(),
            shots,
            backend: backend.into(),
            metadata: RequestMetadata::default(),
        }
    }

    /// Add a parameter value.
    pub fn with_param(mut self, name: impl Into<String>, value: f64) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Check the request against gateway limits.
    ///
    /// Runs before fingerprinting; a rejected request never reaches the
    /// cache or the provider.
    pub fn validate(&self, limits: &LimitsConfig) -> Result<()> {
        if self.program.trim().is_empty() {
            return Err(Error::invalid_request("program must not be empty"));
        }
        if self.program.len() > limits.max_program_bytes {
            return Err(Error::invalid_request(format!(
                "program is {} bytes, limit is {}",
                self.program.len(),
                limits.max_program_bytes
            )));
        }
        if self.shots == 0 {
            return Err(Error::invalid_request("shots must be > 0"));
        }
        if self.shots > limits.max_shots {
            return Err(Error::invalid_request(format!(
                "shots {} exceeds limit {}",
                self.shots, limits.max_shots
            )));
        }
        if self.backend.trim().is_empty() {
            return Err(Error::invalid_request("backend must not be empty"));
        }
        if self.params.len() > limits.max_params {
            return Err(Error::invalid_request(format!(
                "{} parameters exceeds limit {}",
                self.params.len(),
                limits.max_params
            )));
        }
        for (name, value) in &self.params {
            if name.trim().is_empty() {
                return Err(Error::invalid_request("parameter names must not be empty"));
            }
            if !value.is_finite() {
                return Err(Error::invalid_request(format!(
                    "parameter '{}' must be finite",
                    name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> LimitsConfig {
        LimitsConfig {
            max_program_bytes: 64,
            max_shots: 1000,
            max_params: 2,
        }
    }

    #[test]
    fn test_valid_request() {
        let req = ExecutionRequest::new("H 0\nMEASURE 0 ro[0]", 10, "Aspen-M-3")
            .with_param("theta[0]", 0.5);
        assert!(req.validate(&limits()).is_ok());
    }

    #[test]
    fn test_rejects_bad_requests() {
        let cases = vec![
            ExecutionRequest::new("   ", 10, "qvm"),
            ExecutionRequest::new("H 0", 0, "qvm"),
            ExecutionRequest::new("H 0", 1001, "qvm"),
            ExecutionRequest::new("H 0", 1, ""),
            ExecutionRequest::new("H 0".repeat(30), 1, "qvm"),
            ExecutionRequest::new("H 0", 1, "qvm").with_param("", 1.0),
            ExecutionRequest::new("H 0", 1, "qvm").with_param("theta[0]", f64::NAN),
            ExecutionRequest::new("H 0", 1, "qvm").with_param("theta[0]", f64::INFINITY),
            ExecutionRequest::new("H 0", 1, "qvm")
                .with_param("a", 1.0)
                .with_param("b", 1.0)
                .with_param("c", 1.0),
        ];

        for req in cases {
            let err = req.validate(&limits()).unwrap_err();
            assert!(matches!(err, Error::InvalidRequest(_)), "{:?}", req);
        }
    }
}
