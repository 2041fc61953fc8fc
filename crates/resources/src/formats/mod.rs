//! Format drivers.

pub mod fa;
pub mod grib;
pub mod lfa;
pub mod lfi;
pub mod mesonh;
pub mod mnh;
pub mod netcdf;

pub use fa::{FaHeader, FaOptions, FaResource};
pub use grib::GribResource;
pub use lfa::LfaResource;
pub use lfi::LfiResource;
pub use mnh::MnhResource;
pub use netcdf::NetCdfResource;
