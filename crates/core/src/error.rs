//! Error types for the QPU gateway.

use thiserror::Error;

/// Result type alias using the gateway's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the QPU gateway.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Client Errors
    // =========================================================================
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // =========================================================================
    // Cache Errors (absorbed as degraded mode by the gateway)
    // =========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    // =========================================================================
    // Upstream Errors (execution provider)
    // =========================================================================
    #[error("Execution provider unreachable: {0}")]
    UpstreamUnreachable(String),

    #[error("Execution provider rejected the program: {0}")]
    UpstreamRejected(String),

    #[error("Execution provider timed out: {0}")]
    UpstreamTimeout(String),

    #[error("Execution provider returned an invalid response: {0}")]
    UpstreamInvalidResponse(String),

    // =========================================================================
    // Process Errors
    // =========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Telemetry error: {0}")]
    Telemetry(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification used to pick the reply status for a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The request itself is at fault; no collaborator was touched.
    Client,
    /// The cache store misbehaved. Never surfaced to clients.
    CacheDegraded,
    /// The execution provider failed; nothing is deliverable.
    Upstream,
    /// Anything else.
    Internal,
}

impl Error {
    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an upstream unreachable error.
    pub fn upstream_unreachable(msg: impl Into<String>) -> Self {
        Self::UpstreamUnreachable(msg.into())
    }

    /// Create an upstream rejection error.
    pub fn upstream_rejected(msg: impl Into<String>) -> Self {
        Self::UpstreamRejected(msg.into())
    }

    /// Create an upstream timeout error.
    pub fn upstream_timeout(msg: impl Into<String>) -> Self {
        Self::UpstreamTimeout(msg.into())
    }

    /// Create an invalid upstream response error.
    pub fn upstream_invalid_response(msg: impl Into<String>) -> Self {
        Self::UpstreamInvalidResponse(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a TLS error.
    pub fn tls(msg: impl Into<String>) -> Self {
        Self::Tls(msg.into())
    }

    /// Create a gateway error.
    pub fn gateway(msg: impl Into<String>) -> Self {
        Self::Gateway(msg.into())
    }

    /// Create a telemetry error.
    pub fn telemetry(msg: impl Into<String>) -> Self {
        Self::Telemetry(msg.into())
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Classify this error.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::InvalidRequest(_) => ErrorClass::Client,
            Self::Storage(_) => ErrorClass::CacheDegraded,
            Self::UpstreamUnreachable(_)
            | Self::UpstreamRejected(_)
            | Self::UpstreamTimeout(_)
            | Self::UpstreamInvalidResponse(_) => ErrorClass::Upstream,
            _ => ErrorClass::Internal,
        }
    }

    /// Stable machine-readable code sent to clients.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::UpstreamUnreachable(_) => "UPSTREAM_UNREACHABLE",
            Self::UpstreamRejected(_) => "UPSTREAM_REJECTED",
            Self::UpstreamTimeout(_) => "UPSTREAM_TIMEOUT",
            Self::UpstreamInvalidResponse(_) => "UPSTREAM_INVALID_RESPONSE",
            _ => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert_eq!(Error::invalid_request("x").class(), ErrorClass::Client);
        assert_eq!(Error::storage("x").class(), ErrorClass::CacheDegraded);
        assert_eq!(Error::upstream_timeout("x").class(), ErrorClass::Upstream);
        assert_eq!(Error::upstream_rejected("x").class(), ErrorClass::Upstream);
        assert_eq!(Error::internal("x").class(), ErrorClass::Internal);
    }

    #[test]
    fn test_codes_are_distinct_per_upstream_failure() {
        let codes = [
            Error::upstream_unreachable("x").code(),
            Error::upstream_rejected("x").code(),
            Error::upstream_timeout("x").code(),
            Error::upstream_invalid_response("x").code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
        // Cache problems never leak a dedicated code to clients.
        assert_eq!(Error::storage("x").code(), "INTERNAL_ERROR");
    }
}
