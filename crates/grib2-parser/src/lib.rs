//! GRIB2 codec (WMO FM 92 GRIB Edition 2).
//!
//! Pure Rust decoding and encoding of single-field messages: grid templates
//! 3.0, 3.10, 3.20, 3.30 and 3.40, product templates 4.0 and 4.8 and simple
//! packing (5.0) with bitmap.

pub mod error;
pub mod message;
pub mod reader;
pub mod sections;
pub mod tables;
pub mod unpacking;

pub use error::{Grib2Error, Grib2Result};
pub use message::Grib2Message;
pub use reader::{decompress_gzip, is_grib2, read_file, Grib2Reader, Grib2Writer};
pub use sections::grid::{GaussianGrid, LambertGrid, LatLonGrid, ProjectedGrid, SCAN_I_NEGATIVE, SCAN_J_POSITIVE};
pub use sections::product::time_unit_seconds;
pub use sections::{
    DataRepresentation, EarthShape, FixedSurface, GridDefinition, GridTemplate, Identification,
    ProductDefinition, StatisticalProcess,
};
pub use tables::{Grib2Tables, LevelDescription, Parameter};
pub use unpacking::PackedField;
