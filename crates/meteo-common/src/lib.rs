//! Common types and utilities shared across the meteorological resource engine.

pub mod bbox;
pub mod config;
pub mod constants;
pub mod error;
pub mod openmode;
pub mod packing;
pub mod validity;

pub use bbox::BoundingBox;
pub use config::{CoefficientOrder, EngineConfig, FaCompression};
pub use error::{MeteoError, MeteoResult};
pub use openmode::OpenMode;
pub use packing::SimplePacking;
pub use validity::{FieldValidity, FieldValidityList};
