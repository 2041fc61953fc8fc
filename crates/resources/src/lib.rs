//! Multi-format meteorological resources.
//!
//! Opens files of the supported formats (FA, LFI, LFA, GRIB2, netCDF and
//! its Meso-NH flavour) behind a single [`FormatResource`] interface:
//! listing and reading fields, writing them back, and extracting profiles,
//! sections and subdomains through the geometry of the resource.
//!
//! # Example
//!
//! ```no_run
//! use meteo_common::OpenMode;
//! use resources::{resource, FormatResource, ProfileTarget};
//!
//! let mut r = resource("ICMSHAROM+0012".as_ref(), OpenMode::Read, None)?;
//! let profile = r.extractprofile("S*TEMPERATURE", ProfileTarget::LonLat(2.0, 45.0), &Default::default())?;
//! # Ok::<(), resources::ResourceError>(())
//! ```

pub mod error;
pub mod extraction;
pub mod fa_names;
pub mod field_dict;
pub mod formats;
pub mod glob;
pub mod resource;

use std::path::Path;

use serde_json::Value;
use tracing::{debug, info};

use field::fid::{compact_keys, GENERIC};
use field::FormatFid;
use meteo_common::OpenMode;

pub use error::{ResourceError, Result};
pub use extraction::ExtractOptions;
pub use field_dict::{field_dict, DictEntry, DictFormat, FieldDict, FieldType, MergePolicy, Nature};
pub use formats::{
    FaHeader, FaOptions, FaResource, GribResource, LfaResource, LfiResource, MnhResource, NetCdfResource,
};
pub use glob::Glob;
pub use resource::{Format, FormatResource, ProfileTarget, Resource, SectionTarget, Seed};

/// Cheap signature check of `path` for `format`.
fn looks_like(path: &Path, format: Format) -> bool {
    match format {
        Format::NetCdfMnh => formats::mnh::is_mesonh(path),
        Format::NetCdf => netcdf_parser::is_netcdf(path),
        Format::Grib => grib2_parser::is_grib2(path),
        Format::Lfa => lfi_parser::is_lfa(path),
        Format::Fa | Format::Lfi => lfi_parser::is_lfi(path),
    }
}

/// Format of an existing file: the first of [`Format::GUESS_ORDER`] whose
/// driver opens it, `None` when none does.
pub fn guess(path: &Path) -> Option<Format> {
    for format in Format::GUESS_ORDER {
        if !looks_like(path, format) {
            continue;
        }
        match Resource::open(path, OpenMode::Read, format) {
            Ok(_) => {
                debug!(path = %path.display(), format = %format, "Guessed format");
                return Some(format);
            }
            Err(e) => debug!(path = %path.display(), format = %format, error = %e, "Format rejected"),
        }
    }
    None
}

/// Open `path` with the driver of `format`, guessed from the file when reading.
pub fn resource(path: &Path, mode: OpenMode, format: Option<Format>) -> Result<Resource> {
    let format = match (format, mode) {
        (Some(f), _) => f,
        (None, OpenMode::Write) => {
            return Err(ResourceError::usage(format!(
                "the format of {} must be given to create it",
                path.display()
            )));
        }
        (None, _) => guess(path).ok_or_else(|| ResourceError::UnknownFormat(path.display().to_string()))?,
    };
    info!(path = %path.display(), format = %format, mode = %mode.as_str(), "Opening resource");
    Resource::open(path, mode, format)
}

fn key_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Identifier of `initial` (known in `initial_fmt`) in `target_fmt`.
///
/// Generic identifiers are GRIB2 identifiers. GRIB identifiers become netCDF
/// variable names: the key values joined with `-` when `grib_short_fid`,
/// the compact key text otherwise.
pub fn fid_converter(initial: &FormatFid, initial_fmt: &str, target_fmt: &str, grib_short_fid: bool) -> Result<FormatFid> {
    let unsupported = || ResourceError::unsupported(format!("fid conversion from {} to {}", initial_fmt, target_fmt));
    match (initial_fmt, target_fmt) {
        (GENERIC, "GRIB2" | "GRIB") => Ok(initial.clone()),
        ("GRIB" | "GRIB2", "netCDF") => {
            let keys = initial.as_keys().ok_or_else(unsupported)?;
            let name = if grib_short_fid {
                keys.values().map(key_text).collect::<Vec<_>>().join("-")
            } else {
                compact_keys(keys).replace('"', "").replace('{', "_")
            };
            Ok(FormatFid::Name(name))
        }
        _ => Err(unsupported()),
    }
}
