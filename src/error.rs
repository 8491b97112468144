use thiserror::Error;

use crate::types::AgentId;

/// Result type for Plutus operations
pub type Result<T> = std::result::Result<T, PlutusError>;

/// Main error type for the Plutus training core
#[derive(Debug, Clone, Error)]
pub enum PlutusError {
    /// Invalid dimensions for operations
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: String,
        actual: String,
    },

    /// Invalid parameter value
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter {
        name: String,
        reason: String,
    },

    /// Algorithm tag that no learner implements
    #[error("Unknown algorithm '{0}'")]
    UnknownAlgorithm(String),

    /// Optimizer tag that no optimizer implements
    #[error("Unknown optimizer '{0}'")]
    UnknownOptimizer(String),

    /// Agent id not registered with the component
    #[error("Unknown agent {0}")]
    UnknownAgent(AgentId),

    /// The environment offered no action to choose from
    #[error("Agent {agent} has no available actions")]
    EmptyActionSet {
        agent: AgentId,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Numerical computation errors
    #[error("Numerical error: {0}")]
    NumericalError(String),

    /// Failure reported by the environment adapter itself
    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<serde_json::Error> for PlutusError {
    fn from(err: serde_json::Error) -> Self {
        PlutusError::Serialization(err.to_string())
    }
}

// Helper functions for common error patterns
impl PlutusError {
    pub fn dimension_mismatch<S: Into<String>>(expected: S, actual: S) -> Self {
        PlutusError::DimensionMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(name: S, reason: S) -> Self {
        PlutusError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}
