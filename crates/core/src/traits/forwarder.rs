//! Execution forwarder traits.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ExecutionRequest, ExecutionResult};

/// Runs a program on the external execution provider.
///
/// Failures are reported as one of the `Upstream*` error variants.
/// Implementations do not retry.
#[async_trait]
pub trait ExecutionForwarder: Send + Sync {
    /// Execute the request and return its normalized readout.
    async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult>;

    /// Human-readable provider name for logs.
    fn name(&self) -> &str {
        "provider"
    }
}
