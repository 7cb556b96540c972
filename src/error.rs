//! Error types for topo-gnn.
//!
//! Configuration problems are reported at construction time, batch and
//! shape problems at the first call that sees them. Topologically trivial
//! inputs (no edges, no cycles, single nodes) are never errors.

use thiserror::Error;

/// Unified error type for all topo-gnn operations.
#[derive(Error, Debug)]
pub enum TopoError {
    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Batched graph violates its slice/edge invariants
    #[error("Invalid batch: {0}")]
    InvalidBatch(String),

    /// Tensor or buffer shape disagrees with what a component was built for
    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    /// Persistence routine received input outside its contract
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Errors bubbled up from candle
    #[error("Tensor error: {0}")]
    Tensor(#[from] candle_core::Error),

    /// Config (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors (config files)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TopoError {
    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        TopoError::Config(message.into())
    }

    /// Creates a batch validation error.
    pub fn invalid_batch(message: impl Into<String>) -> Self {
        TopoError::InvalidBatch(message.into())
    }

    /// Creates a shape mismatch error.
    pub fn shape(
        context: impl Into<String>,
        expected: impl std::fmt::Display,
        actual: impl std::fmt::Display,
    ) -> Self {
        TopoError::ShapeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    /// Creates a persistence contract error.
    pub fn persistence(message: impl Into<String>) -> Self {
        TopoError::Persistence(message.into())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, TopoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_message() {
        let err = TopoError::shape("filtration input", "[N, 8]", "[N, 4]");
        assert_eq!(
            err.to_string(),
            "Shape mismatch in filtration input: expected [N, 8], got [N, 4]"
        );
    }

    #[test]
    fn test_candle_error_converts() {
        fn fails() -> Result<()> {
            Err(candle_core::Error::Msg("boom".into()))?;
            Ok(())
        }
        assert!(matches!(fails(), Err(TopoError::Tensor(_))));
    }
}
