//! Error types for geometry operations.

use projection::ProjectionError;
use thiserror::Error;

/// Errors that can occur when describing or querying a geometry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// The requested zone does not exist for this kind of grid.
    #[error("subzone '{subzone}' is not defined for a '{name}' geometry")]
    UndefinedSubzone { subzone: String, name: String },

    /// A target point lies outside a limited-area domain.
    #[error("point (lon={lon}, lat={lat}) is outside the domain")]
    OutsideDomain { lon: f64, lat: f64 },

    /// The operation is not available for this geometry.
    #[error("unsupported operation: {0}")]
    Unsupported(String),

    /// Dimensions are inconsistent with each other or with data.
    #[error("inconsistent dimensions: {0}")]
    InconsistentDimensions(String),

    /// A parameter of the geometry is invalid.
    #[error("invalid geometry parameter: {0}")]
    InvalidParameter(String),

    /// Vertical coordinate conversion failed.
    #[error("vertical coordinate error: {0}")]
    Vertical(String),

    /// Projection error.
    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),
}

impl GeometryError {
    /// Create an UndefinedSubzone error.
    pub fn undefined_subzone(subzone: impl Into<String>, name: impl Into<String>) -> Self {
        Self::UndefinedSubzone {
            subzone: subzone.into(),
            name: name.into(),
        }
    }

    /// Create an Unsupported error.
    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::Unsupported(msg.into())
    }

    /// Create an InconsistentDimensions error.
    pub fn inconsistent(msg: impl Into<String>) -> Self {
        Self::InconsistentDimensions(msg.into())
    }

    /// Create an InvalidParameter error.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }

    /// Create a Vertical error.
    pub fn vertical(msg: impl Into<String>) -> Self {
        Self::Vertical(msg.into())
    }
}

/// Result type for geometry operations.
pub type Result<T> = std::result::Result<T, GeometryError>;
