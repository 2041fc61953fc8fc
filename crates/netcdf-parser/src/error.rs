//! Error types for netCDF decoding and encoding.

use thiserror::Error;

/// Result type for netCDF operations.
pub type NetCdfResult<T> = Result<T, NetCdfError>;

#[derive(Error, Debug)]
pub enum NetCdfError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Missing required dimension, variable or attribute
    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// Definitions that contradict each other
    #[error("Inconsistent dataset: {0}")]
    Inconsistent(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Failure reported by the native netCDF library
    #[error("netCDF library error: {0}")]
    Library(String),
}

impl NetCdfError {
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }
}
