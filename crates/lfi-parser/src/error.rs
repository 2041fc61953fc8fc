//! Error types for archive operations.

use meteo_common::OpenMode;
use thiserror::Error;

/// Result type for LFI and LFA operations.
pub type LfiResult<T> = Result<T, LfiError>;

#[derive(Debug, Error)]
pub enum LfiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid archive format: {0}")]
    InvalidFormat(String),

    #[error("Article '{0}' not found")]
    NotFound(String),

    #[error("Invalid article name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Checksum mismatch on article '{name}': stored {stored:08x}, computed {computed:08x}")]
    Checksum {
        name: String,
        stored: u32,
        computed: u32,
    },

    #[error("Cannot {operation} in open mode '{mode}'")]
    Mode { mode: OpenMode, operation: String },

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Archive limit exceeded: {0}")]
    Limit(String),
}

impl LfiError {
    pub fn invalid_format(msg: impl Into<String>) -> Self {
        Self::InvalidFormat(msg.into())
    }

    pub fn invalid_data(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    pub fn mode(mode: OpenMode, operation: impl Into<String>) -> Self {
        Self::Mode {
            mode,
            operation: operation.into(),
        }
    }
}
