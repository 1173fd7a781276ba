//! Error types for the Kolosal search engine

use thiserror::Error;

/// Result type alias for Kolosal operations
pub type Result<T> = std::result::Result<T, KolosalError>;

/// Main error type for the search engine.
///
/// Only [`KolosalError::Setup`] and [`KolosalError::InvalidState`] escape a
/// running search; everything raised while evaluating a candidate is folded
/// into that candidate's trial result.
#[derive(Error, Debug)]
pub enum KolosalError {
    #[error("Setup error: {0}")]
    Setup(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Fold {fold} failed: {reason}")]
    FoldEvaluation { fold: usize, reason: String },

    #[error("Candidate failed: {0}")]
    CandidateFailure(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Computation error: {0}")]
    ComputationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl KolosalError {
    /// Shorthand for an [`KolosalError::InvalidParameter`] error
    pub fn invalid_param(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        KolosalError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether this error must be surfaced to the caller of a search
    pub fn is_fatal(&self) -> bool {
        matches!(self, KolosalError::Setup(_) | KolosalError::InvalidState(_))
    }
}

impl From<polars::error::PolarsError> for KolosalError {
    fn from(err: polars::error::PolarsError) -> Self {
        KolosalError::DataError(err.to_string())
    }
}

impl From<serde_json::Error> for KolosalError {
    fn from(err: serde_json::Error) -> Self {
        KolosalError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_errors() {
        assert!(KolosalError::Setup("bad objective".into()).is_fatal());
        assert!(KolosalError::InvalidState("already ran".into()).is_fatal());
        assert!(!KolosalError::CandidateFailure("fit".into()).is_fatal());
        assert!(!KolosalError::FoldEvaluation { fold: 1, reason: "nan".into() }.is_fatal());
    }

    #[test]
    fn test_invalid_param_message() {
        let err = KolosalError::invalid_param("n_neighbors", 0, "must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid parameter: n_neighbors = 0, must be positive"
        );
    }
}
