//! Error types for spectral geometries and transforms.

use thiserror::Error;

/// Errors that can occur in spectral transforms.
#[derive(Error, Debug)]
pub enum SpectralError {
    /// A legendre transform would exhaust system memory.
    #[error(
        "Legendre spectral transforms need {needed_mb:.1} MB memory, while only {total_mb:.1} MB is available: SWAPPING prevented"
    )]
    SwappingPrevented { needed_mb: f64, total_mb: f64 },

    /// The operation is not available in this spectral space.
    #[error("unsupported in {space} space: {message}")]
    UnsupportedSpace { space: String, message: String },

    /// The transform service failed or is missing a capability.
    #[error("transform service '{service}': {message}")]
    Service { service: String, message: String },

    /// Data size does not match the truncation or the grid.
    #[error("inconsistent size: expected {expected} values, got {got}")]
    InconsistentSize { expected: usize, got: usize },

    /// Invalid truncation or grid description.
    #[error("invalid spectral parameter: {0}")]
    InvalidParameter(String),

    /// Spectrum file or arithmetic problem.
    #[error("spectrum error: {0}")]
    Spectrum(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpectralError {
    /// Create an UnsupportedSpace error.
    pub fn unsupported(space: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnsupportedSpace {
            space: space.into(),
            message: message.into(),
        }
    }

    /// Create a Service error.
    pub fn service(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Service {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidParameter error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a Spectrum error.
    pub fn spectrum(msg: impl Into<String>) -> Self {
        Self::Spectrum(msg.into())
    }

    /// Check a data length.
    pub fn check_size(expected: usize, got: usize) -> Result<()> {
        if expected == got {
            Ok(())
        } else {
            Err(Self::InconsistentSize { expected, got })
        }
    }
}

/// Result type for spectral operations.
pub type Result<T> = std::result::Result<T, SpectralError>;
