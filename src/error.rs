//! Error types for tail risk analytics

use thiserror::Error;

/// Errors that can occur in tail risk calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TailRiskError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid confidence level: {0} (must be between 0 and 1)")]
    InvalidConfidenceLevel(f64),

    #[error("Distribution fit failed: {0}")]
    FitFailure(String),

    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Background computation failed: {0}")]
    TaskFailed(String),
}

impl From<serde_yaml::Error> for TailRiskError {
    fn from(err: serde_yaml::Error) -> Self {
        TailRiskError::Configuration(err.to_string())
    }
}

impl From<serde_json::Error> for TailRiskError {
    fn from(err: serde_json::Error) -> Self {
        TailRiskError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for TailRiskError {
    fn from(err: std::io::Error) -> Self {
        TailRiskError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TailRiskError>;

/// Reject confidence levels outside the open interval (0, 1)
pub(crate) fn check_confidence(confidence_level: f64) -> Result<()> {
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(TailRiskError::InvalidConfidenceLevel(confidence_level));
    }
    Ok(())
}
