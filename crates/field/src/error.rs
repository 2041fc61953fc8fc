//! Error types for field operations.

use geometry::GeometryError;
use meteo_common::MeteoError;
use spectral::SpectralError;
use thiserror::Error;

/// Errors that can occur when manipulating fields.
#[derive(Error, Debug)]
pub enum FieldError {
    /// Operands do not share geometry, validity or representation.
    #[error("incompatible fields: {0}")]
    Incompatible(String),

    /// The operation needs a spectral geometry the field does not have.
    #[error("field '{fid}' has no spectral geometry")]
    MissingSpectralGeometry { fid: String },

    /// The operation needs gridpoint data.
    #[error("field '{fid}' is spectral; transform it to gridpoint first")]
    SpectralData { fid: String },

    /// Data does not fit the geometry.
    #[error("invalid field data: {0}")]
    InvalidData(String),

    /// The operation is not available for this kind of field.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Geometry error.
    #[error(transparent)]
    Geometry(#[from] GeometryError),

    /// Spectral transform error.
    #[error(transparent)]
    Spectral(#[from] SpectralError),

    /// Validity or configuration error.
    #[error(transparent)]
    Meteo(#[from] MeteoError),
}

impl FieldError {
    /// Create an Incompatible error.
    pub fn incompatible(msg: impl Into<String>) -> Self {
        Self::Incompatible(msg.into())
    }

    /// Create an InvalidData error.
    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    /// Create an Unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }
}

/// Result type for field operations.
pub type Result<T> = std::result::Result<T, FieldError>;
