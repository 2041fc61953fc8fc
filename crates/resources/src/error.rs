//! Error types for the resources crate.

use thiserror::Error;

use field::FieldError;
use geometry::GeometryError;
use grib2_parser::Grib2Error;
use lfi_parser::LfiError;
use meteo_common::MeteoError;
use netcdf_parser::NetCdfError;
use spectral::SpectralError;

/// Errors that can occur when opening, reading, writing or extracting from a resource.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// Wrong open mode, mismatched geometry, bad arguments.
    #[error("usage error: {0}")]
    Usage(String),

    #[error("field not found: {0}")]
    NotFound(String),

    #[error("unknown format: {0}")]
    UnknownFormat(String),

    #[error("not supported: {0}")]
    Unsupported(String),

    /// Candidate fields of a subdomain extraction span several level types.
    #[error("no majority level type among {0}")]
    AmbiguousLevelType(String),

    /// A vertical-coordinate conversion needs a field the resource does not hold.
    #[error("field '{field}' is needed to {purpose}")]
    MissingAuxiliary { field: String, purpose: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Meteo(#[from] MeteoError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Spectral(#[from] SpectralError),

    #[error(transparent)]
    Field(#[from] FieldError),

    #[error(transparent)]
    Grib2(#[from] Grib2Error),

    #[error(transparent)]
    Lfi(#[from] LfiError),

    #[error(transparent)]
    NetCdf(#[from] NetCdfError),
}

impl ResourceError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self::Usage(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn missing_auxiliary(field: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self::MissingAuxiliary {
            field: field.into(),
            purpose: purpose.into(),
        }
    }
}

/// Result type for resource operations.
pub type Result<T> = std::result::Result<T, ResourceError>;
