//! Error types for GRIB2 decoding and encoding.

use thiserror::Error;

pub type Grib2Result<T> = Result<T, Grib2Error>;

#[derive(Debug, Error)]
pub enum Grib2Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid GRIB2 format: {0}")]
    InvalidFormat(String),

    #[error("Invalid section {section}: {reason}")]
    InvalidSection { section: u8, reason: String },

    #[error("Unsupported {what} template {number}")]
    UnsupportedTemplate { what: &'static str, number: u16 },

    #[error("Unpacking error: {0}")]
    UnpackingError(String),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

impl Grib2Error {
    pub fn section(section: u8, reason: impl Into<String>) -> Self {
        Self::InvalidSection {
            section,
            reason: reason.into(),
        }
    }
}

impl From<meteo_common::MeteoError> for Grib2Error {
    fn from(err: meteo_common::MeteoError) -> Self {
        Grib2Error::UnpackingError(err.to_string())
    }
}
