//! netCDF codec.
//!
//! Pure Rust reading and writing of the classic (CDF-1) and 64-bit offset
//! (CDF-2) formats into an in-memory [`Dataset`]. netCDF-4 files are read
//! through the native library when the `native` feature is enabled.

pub mod classic;
pub mod error;
pub mod model;
#[cfg(feature = "native")]
pub mod native;

use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::debug;

pub use classic::ClassicFormat;
pub use error::{NetCdfError, NetCdfResult};
pub use model::{Attribute, Dataset, Dimension, NcType, NcValues, Variable};

const HDF5_MAGIC: &[u8; 8] = b"\x89HDF\r\n\x1a\n";

/// Does `path` look like a netCDF file (classic, 64-bit offset or HDF5)?
pub fn is_netcdf(path: &Path) -> bool {
    let mut magic = [0u8; 8];
    let read = fs::File::open(path).and_then(|mut f| f.read_exact(&mut magic));
    read.is_ok() && (classic::is_classic(&magic) || &magic == HDF5_MAGIC)
}

/// Read a whole file.
pub fn read_dataset(path: &Path) -> NetCdfResult<Dataset> {
    let data = fs::read(path)?;
    if classic::is_classic(&data) {
        let ds = classic::decode(&data)?;
        debug!(
            path = %path.display(),
            dimensions = ds.dimensions.len(),
            variables = ds.variables.len(),
            "Read netCDF classic file"
        );
        return Ok(ds);
    }
    if data.starts_with(HDF5_MAGIC) {
        return read_hdf5(path);
    }
    Err(NetCdfError::invalid_format(format!(
        "{} is not a netCDF file",
        path.display()
    )))
}

#[cfg(feature = "native")]
fn read_hdf5(path: &Path) -> NetCdfResult<Dataset> {
    native::read_dataset(path)
}

#[cfg(not(feature = "native"))]
fn read_hdf5(path: &Path) -> NetCdfResult<Dataset> {
    Err(NetCdfError::Unsupported(format!(
        "{} is netCDF-4; enable the `native` feature to read it",
        path.display()
    )))
}

/// Write a whole dataset.
pub fn write_dataset(path: &Path, ds: &Dataset, format: ClassicFormat) -> NetCdfResult<()> {
    fs::write(path, classic::encode(ds, format)?)?;
    debug!(path = %path.display(), variables = ds.variables.len(), "Wrote netCDF file");
    Ok(())
}
