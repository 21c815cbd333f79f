use serde::{Deserialize, Serialize};

/// Readout values produced by running a program.
///
/// Values are flattened shot-major: every register bit of shot 0, then shot 1,
/// and so on. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Readout register values.
    pub ro: Vec<i32>,
}

impl ExecutionResult {
    /// Create a result from readout values.
    pub fn new(ro: Vec<i32>) -> Self {
        Self { ro }
    }

    /// Number of readout values.
    pub fn len(&self) -> usize {
        self.ro.len()
    }

    /// Whether there are no readout values.
    pub fn is_empty(&self) -> bool {
        self.ro.is_empty()
    }
}

/// Where a delivered result came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSource {
    /// Served from the result cache.
    Cache,
    /// Freshly produced by the execution provider.
    Provider,
}

impl ResultSource {
    /// Label used in headers, logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "hit",
            Self::Provider => "miss",
        }
    }
}
