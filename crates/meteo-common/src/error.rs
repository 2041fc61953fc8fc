//! Error types shared by every crate of the engine.

use thiserror::Error;

/// Result type alias using MeteoError.
pub type MeteoResult<T> = Result<T, MeteoError>;

/// Primary error type for configuration, validity and packing operations.
#[derive(Debug, Error)]
pub enum MeteoError {
    // === Usage Errors ===
    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Invalid validity: {0}")]
    InvalidValidity(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    // === Data Errors ===
    #[error("Packing error: {0}")]
    Packing(String),

    // === Infrastructure Errors ===
    #[error("I/O error: {0}")]
    Io(String),
}

impl MeteoError {
    /// Create an InvalidParameter error.
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a Packing error.
    pub fn packing(msg: impl Into<String>) -> Self {
        Self::Packing(msg.into())
    }
}

impl From<std::io::Error> for MeteoError {
    fn from(err: std::io::Error) -> Self {
        MeteoError::Io(err.to_string())
    }
}

impl From<serde_yaml::Error> for MeteoError {
    fn from(err: serde_yaml::Error) -> Self {
        MeteoError::Config(format!("YAML error: {}", err))
    }
}
