//! Reading netCDF-4 (HDF5) files through the native netCDF library.
//!
//! Enabled by the `native` feature. System requirements: libhdf5-dev
//! libnetcdf-dev. Variables are read as doubles into the in-memory model.

use std::path::Path;
use std::sync::Once;
use tracing::debug;

use crate::error::{NetCdfError, NetCdfResult};
use crate::model::{Attribute, Dataset, NcValues};

/// Silence HDF5's automatic error printing to stderr.
///
/// HDF5 reports every probe for an absent attribute on stderr even though
/// the caller handles it. Safe to call several times.
pub fn silence_hdf5_errors() {
    static INIT: Once = Once::new();

    INIT.call_once(|| {
        // SAFETY: H5Eset_auto2 is thread-safe; null handlers disable printing.
        unsafe {
            hdf5_metno_sys::h5e::H5Eset_auto2(hdf5_metno_sys::h5e::H5E_DEFAULT, None, std::ptr::null_mut());
        }
    });
}

fn library(e: netcdf::Error) -> NetCdfError {
    NetCdfError::Library(e.to_string())
}

fn convert_attribute(attr: &netcdf::Attribute) -> Option<Attribute> {
    use netcdf::AttributeValue as A;
    let value = match attr.value().ok()? {
        A::Str(s) => NcValues::text(&s),
        A::Schar(v) => NcValues::Byte(vec![v]),
        A::Schars(v) => NcValues::Byte(v),
        A::Uchar(v) => NcValues::Short(vec![v as i16]),
        A::Uchars(v) => NcValues::Short(v.into_iter().map(i16::from).collect()),
        A::Short(v) => NcValues::Short(vec![v]),
        A::Shorts(v) => NcValues::Short(v),
        A::Int(v) => NcValues::Int(vec![v]),
        A::Ints(v) => NcValues::Int(v),
        A::Float(v) => NcValues::Float(vec![v]),
        A::Floats(v) => NcValues::Float(v),
        A::Double(v) => NcValues::Double(vec![v]),
        A::Doubles(v) => NcValues::Double(v),
        A::Longlong(v) => NcValues::Double(vec![v as f64]),
        A::Longlongs(v) => NcValues::Double(v.into_iter().map(|x| x as f64).collect()),
        _ => return None,
    };
    Some(Attribute {
        name: attr.name().to_string(),
        value,
    })
}

/// Read a whole file (any format the library understands).
pub fn read_dataset(path: &Path) -> NetCdfResult<Dataset> {
    silence_hdf5_errors();
    let file = netcdf::open(path).map_err(library)?;
    let mut ds = Dataset::new();
    for dim in file.dimensions() {
        ds.add_dimension(&dim.name(), dim.len(), dim.is_unlimited())?;
    }
    ds.attributes = file.attributes().filter_map(|a| convert_attribute(&a)).collect();
    for var in file.variables() {
        let dims: Vec<String> = var.dimensions().iter().map(|d| d.name()).collect();
        let dims: Vec<&str> = dims.iter().map(String::as_str).collect();
        let data: Vec<f64> = var.get_values::<f64, _>(..).map_err(library)?;
        let attributes = var.attributes().filter_map(|a| convert_attribute(&a)).collect();
        ds.put_variable(&var.name(), &dims, attributes, NcValues::Double(data))?;
    }
    debug!(
        path = %path.display(),
        dimensions = ds.dimensions.len(),
        variables = ds.variables.len(),
        "Read netCDF file with the native library"
    );
    Ok(ds)
}
