//! The interface shared by every format resource.
//!
//! A resource is one file of one format, opened in read, append or write
//! mode and closed on drop. [`FormatResource`] holds what every driver
//! implements plus the operations built on top of it (field search,
//! batch reads and writes, extraction, summaries). [`Resource`] is the
//! closed set of drivers.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::debug;

use field::{Field, FormatFid, GenericFid, GeoField};
use geometry::{Geometry, InterpolationMethod};
use meteo_common::{FieldValidityList, OpenMode};

use crate::error::{ResourceError, Result};
use crate::extraction::{self, ExtractOptions};
use crate::field_dict::FieldType;
use crate::formats::{FaResource, GribResource, LfaResource, LfiResource, MnhResource, NetCdfResource};
use crate::glob::Glob;

// ============================================================================
// Formats
// ============================================================================

/// Supported formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Format {
    Fa,
    Lfi,
    Lfa,
    Grib,
    NetCdf,
    NetCdfMnh,
}

impl Format {
    /// Trial order of [`crate::guess`]: specific formats before generic ones.
    pub const GUESS_ORDER: [Format; 6] = [
        Format::NetCdfMnh,
        Format::NetCdf,
        Format::Grib,
        Format::Lfa,
        Format::Fa,
        Format::Lfi,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fa => "FA",
            Self::Lfi => "LFI",
            Self::Lfa => "LFA",
            Self::Grib => "GRIB",
            Self::NetCdf => "netCDF",
            Self::NetCdfMnh => "netCDFMNH",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = ResourceError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "FA" => Ok(Self::Fa),
            "LFI" => Ok(Self::Lfi),
            "LFA" => Ok(Self::Lfa),
            "GRIB" | "GRIB2" => Ok(Self::Grib),
            "netCDF" => Ok(Self::NetCdf),
            "netCDFMNH" => Ok(Self::NetCdfMnh),
            other => Err(ResourceError::UnknownFormat(other.to_string())),
        }
    }
}

// ============================================================================
// Seeds
// ============================================================================

/// Selection of fields by name: everything, one pattern, or a union of patterns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Seed {
    #[default]
    All,
    Pattern(String),
    List(Vec<String>),
}

impl Seed {
    /// Compiled patterns; `None` selects everything.
    pub fn globs(&self) -> Option<Vec<Glob>> {
        match self {
            Self::All => None,
            Self::Pattern(p) => Some(vec![Glob::new(p)]),
            Self::List(l) => Some(l.iter().map(|p| Glob::new(p)).collect()),
        }
    }
}

impl fmt::Display for Seed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("*"),
            Self::Pattern(p) => f.write_str(p),
            Self::List(l) => write!(f, "[{}]", l.join(", ")),
        }
    }
}

impl From<&str> for Seed {
    fn from(s: &str) -> Self {
        Self::Pattern(s.to_string())
    }
}

impl From<String> for Seed {
    fn from(s: String) -> Self {
        Self::Pattern(s)
    }
}

impl From<Vec<String>> for Seed {
    fn from(l: Vec<String>) -> Self {
        Self::List(l)
    }
}

impl From<&[&str]> for Seed {
    fn from(l: &[&str]) -> Self {
        Self::List(l.iter().map(|s| s.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for Seed {
    fn from(l: [&str; N]) -> Self {
        Self::List(l.iter().map(|s| s.to_string()).collect())
    }
}

/// Where to extract a vertical profile.
#[derive(Debug, Clone, PartialEq)]
pub enum ProfileTarget {
    /// A point, the profile geometry is built from the resource geometry.
    LonLat(f64, f64),
    /// A ready-made single-point multi-level geometry.
    Geometry(Geometry),
}

/// Where to extract a vertical section.
#[derive(Debug, Clone, PartialEq)]
pub enum SectionTarget {
    /// Great-circle section between two (lon, lat) ends.
    Ends {
        end1: (f64, f64),
        end2: (f64, f64),
        points_number: Option<usize>,
        resolution: Option<f64>,
    },
    Geometry(Geometry),
}

impl SectionTarget {
    pub fn ends(end1: (f64, f64), end2: (f64, f64)) -> Self {
        Self::Ends {
            end1,
            end2,
            points_number: None,
            resolution: None,
        }
    }
}

// ============================================================================
// Shared interface
// ============================================================================

/// Operations of an open resource.
pub trait FormatResource {
    fn format(&self) -> Format;

    fn path(&self) -> &Path;

    fn openmode(&self) -> OpenMode;

    fn is_open(&self) -> bool;

    fn close(&mut self) -> Result<()>;

    /// Identifiers of every field, in file order.
    fn listfields(&self) -> Result<Vec<FormatFid>>;

    fn field_type(&self, fid: &FormatFid) -> FieldType;

    fn generic_fid(&self, fid: &FormatFid) -> Option<GenericFid>;

    fn readfield(&mut self, fid: &FormatFid) -> Result<Field>;

    fn writefield(&mut self, field: &Field) -> Result<()>;

    /// Geometry shared by the gridded fields, once known.
    fn geometry(&self) -> Option<&Geometry>;

    /// Validity of resources holding a single one.
    fn validity(&self) -> Option<&FieldValidityList>;

    /// Does `fid` match a name pattern?
    fn matches(&self, pattern: &Glob, fid: &FormatFid) -> bool {
        pattern.matches(&fid.to_string())
    }

    /// Fields matching any pattern of `seed`, in file order and without
    /// duplicates, restricted to `fieldtypes` unless empty.
    fn find_fields_in_resource(&self, seed: &Seed, fieldtypes: &[FieldType]) -> Result<Vec<FormatFid>> {
        let globs = seed.globs();
        let found: Vec<FormatFid> = self
            .listfields()?
            .into_iter()
            .filter(|fid| {
                globs
                    .as_ref()
                    .map_or(true, |gs| gs.iter().any(|g| self.matches(g, fid)))
            })
            .filter(|fid| fieldtypes.is_empty() || fieldtypes.contains(&self.field_type(fid)))
            .collect();
        if found.is_empty() {
            return Err(ResourceError::not_found(format!(
                "no field matching '{}' in {}",
                seed,
                self.path().display()
            )));
        }
        debug!(seed = %seed, found = found.len(), "Found fields in resource");
        Ok(found)
    }

    /// [`FormatResource::find_fields_in_resource`] with each field's generic identifier.
    fn find_fields_with_generic(
        &self,
        seed: &Seed,
        fieldtypes: &[FieldType],
    ) -> Result<Vec<(FormatFid, Option<GenericFid>)>> {
        Ok(self
            .find_fields_in_resource(seed, fieldtypes)?
            .into_iter()
            .map(|fid| {
                let generic = self.generic_fid(&fid);
                (fid, generic)
            })
            .collect())
    }

    fn readfields(&mut self, seed: &Seed) -> Result<Vec<Field>> {
        self.find_fields_in_resource(seed, &[])?
            .iter()
            .map(|fid| self.readfield(fid))
            .collect()
    }

    /// Write several fields; a gridded one goes first while the geometry is unknown.
    fn writefields(&mut self, fields: &[Field]) -> Result<()> {
        let mut order: Vec<&Field> = fields.iter().collect();
        if self.geometry().is_none() {
            if let Some(k) = order.iter().position(|f| f.geometry().is_some()) {
                let first = order.remove(k);
                order.insert(0, first);
            }
        }
        for field in order {
            self.writefield(field)?;
        }
        Ok(())
    }

    /// Fields grouped by kind.
    fn sortfields(&self) -> Result<BTreeMap<String, Vec<FormatFid>>> {
        let mut groups: BTreeMap<String, Vec<FormatFid>> = BTreeMap::new();
        for fid in self.listfields()? {
            let group = match self.field_type(&fid) {
                FieldType::D3 => "3D fields",
                FieldType::H2D => "2D fields",
                FieldType::Misc => "Misc-fields",
            };
            groups.entry(group.to_string()).or_default().push(fid);
        }
        Ok(groups)
    }

    /// Vertical profile of the fields matching `pseudoname` at one point.
    fn extractprofile(
        &mut self,
        pseudoname: &str,
        target: ProfileTarget,
        options: &ExtractOptions<'_>,
    ) -> Result<GeoField> {
        let geometry = match target {
            ProfileTarget::LonLat(lon, lat) => self
                .geometry()
                .ok_or_else(|| ResourceError::usage("resource has no geometry yet"))?
                .make_profile_geometry(lon, lat)?,
            ProfileTarget::Geometry(g) => {
                if g.dimensions.x * g.dimensions.y != 1 {
                    return Err(ResourceError::usage(format!(
                        "a profile geometry has one point, not {}x{}",
                        g.dimensions.x, g.dimensions.y
                    )));
                }
                g
            }
        };
        let options = ExtractOptions {
            interpolation: Some(options.interpolation_or(InterpolationMethod::Nearest)),
            ..options.clone()
        };
        self.extract_subdomain(pseudoname, &geometry, &options)
    }

    /// Vertical section of the fields matching `pseudoname`.
    fn extractsection(
        &mut self,
        pseudoname: &str,
        target: SectionTarget,
        options: &ExtractOptions<'_>,
    ) -> Result<GeoField> {
        let geometry = match target {
            SectionTarget::Ends {
                end1,
                end2,
                points_number,
                resolution,
            } => self
                .geometry()
                .ok_or_else(|| ResourceError::usage("resource has no geometry yet"))?
                .make_section_geometry(end1, end2, points_number, resolution)?,
            SectionTarget::Geometry(g) => {
                if g.dimensions.y != 1 || g.dimensions.x < 2 {
                    return Err(ResourceError::usage(format!(
                        "a section geometry is a line of points, not {}x{}",
                        g.dimensions.x, g.dimensions.y
                    )));
                }
                g
            }
        };
        self.extract_subdomain(pseudoname, &geometry, options)
    }

    /// The fields matching `pseudoname`, stacked on their majority level
    /// type and interpolated on `geometry`, optionally converted to another
    /// vertical coordinate.
    fn extract_subdomain(
        &mut self,
        pseudoname: &str,
        geometry: &Geometry,
        options: &ExtractOptions<'_>,
    ) -> Result<GeoField> {
        extraction::extract_subdomain(self, pseudoname, geometry, options)
    }

    /// Textual summary of the resource.
    fn what(&mut self, sortfields: bool) -> Result<String> {
        let mut out = vec![
            format!("### FORMAT: {}", self.format()),
            format!("### PATH: {}", self.path().display()),
        ];
        if let Some(validity) = self.validity() {
            for v in validity {
                out.push(format!("### VALIDITY: {}", v.describe()));
            }
        }
        if let Some(g) = self.geometry() {
            out.push(format!(
                "### GEOMETRY: {} {}x{}, vertical type {} ({} level(s))",
                g.name,
                g.dimensions.x,
                g.dimensions.y,
                g.vcoordinate.typeoffirstfixedsurface,
                g.vcoordinate.levels.len()
            ));
        }
        out.push(list_section(self, sortfields)?);
        Ok(out.join("\n"))
    }
}

/// `### LIST OF FIELDS ###` block, flat or grouped.
pub(crate) fn list_section<R: FormatResource + ?Sized>(resource: &R, sortfields: bool) -> Result<String> {
    let mut out = vec!["### LIST OF FIELDS ###".to_string()];
    let fields = resource.listfields()?;
    out.push(format!("Number: {}", fields.len()));
    if sortfields {
        for (group, fids) in resource.sortfields()? {
            out.push(format!("--- {} ---", group));
            out.extend(fids.iter().map(|f| f.to_string()));
        }
    } else {
        out.extend(fields.iter().map(|f| f.to_string()));
    }
    Ok(out.join("\n"))
}

// ============================================================================
// Closed set of drivers
// ============================================================================

/// An open resource of any supported format.
#[derive(Debug)]
pub enum Resource {
    Fa(FaResource),
    Lfi(LfiResource),
    Lfa(LfaResource),
    Grib(GribResource),
    NetCdf(NetCdfResource),
    NetCdfMnh(MnhResource),
}

impl Resource {
    /// Open `path` with the driver of `format`.
    pub fn open(path: &Path, mode: OpenMode, format: Format) -> Result<Self> {
        Ok(match format {
            Format::Fa => Self::Fa(FaResource::open(path, mode)?),
            Format::Lfi => Self::Lfi(LfiResource::open(path, mode)?),
            Format::Lfa => Self::Lfa(LfaResource::open(path, mode)?),
            Format::Grib => Self::Grib(GribResource::open(path, mode)?),
            Format::NetCdf => Self::NetCdf(NetCdfResource::open(path, mode)?),
            Format::NetCdfMnh => Self::NetCdfMnh(MnhResource::open(path, mode)?),
        })
    }

    pub fn as_dyn(&self) -> &dyn FormatResource {
        match self {
            Self::Fa(r) => r,
            Self::Lfi(r) => r,
            Self::Lfa(r) => r,
            Self::Grib(r) => r,
            Self::NetCdf(r) => r,
            Self::NetCdfMnh(r) => r,
        }
    }

    pub fn as_dyn_mut(&mut self) -> &mut dyn FormatResource {
        match self {
            Self::Fa(r) => r,
            Self::Lfi(r) => r,
            Self::Lfa(r) => r,
            Self::Grib(r) => r,
            Self::NetCdf(r) => r,
            Self::NetCdfMnh(r) => r,
        }
    }

    pub fn as_fa_mut(&mut self) -> Option<&mut FaResource> {
        match self {
            Self::Fa(r) => Some(r),
            _ => None,
        }
    }
}

impl FormatResource for Resource {
    fn format(&self) -> Format {
        self.as_dyn().format()
    }

    fn path(&self) -> &Path {
        self.as_dyn().path()
    }

    fn openmode(&self) -> OpenMode {
        self.as_dyn().openmode()
    }

    fn is_open(&self) -> bool {
        self.as_dyn().is_open()
    }

    fn close(&mut self) -> Result<()> {
        self.as_dyn_mut().close()
    }

    fn listfields(&self) -> Result<Vec<FormatFid>> {
        self.as_dyn().listfields()
    }

    fn field_type(&self, fid: &FormatFid) -> FieldType {
        self.as_dyn().field_type(fid)
    }

    fn generic_fid(&self, fid: &FormatFid) -> Option<GenericFid> {
        self.as_dyn().generic_fid(fid)
    }

    fn readfield(&mut self, fid: &FormatFid) -> Result<Field> {
        self.as_dyn_mut().readfield(fid)
    }

    fn writefield(&mut self, field: &Field) -> Result<()> {
        self.as_dyn_mut().writefield(field)
    }

    fn geometry(&self) -> Option<&Geometry> {
        self.as_dyn().geometry()
    }

    fn validity(&self) -> Option<&FieldValidityList> {
        self.as_dyn().validity()
    }

    fn matches(&self, pattern: &Glob, fid: &FormatFid) -> bool {
        self.as_dyn().matches(pattern, fid)
    }

    fn find_fields_in_resource(&self, seed: &Seed, fieldtypes: &[FieldType]) -> Result<Vec<FormatFid>> {
        self.as_dyn().find_fields_in_resource(seed, fieldtypes)
    }

    fn sortfields(&self) -> Result<BTreeMap<String, Vec<FormatFid>>> {
        self.as_dyn().sortfields()
    }

    fn extract_subdomain(
        &mut self,
        pseudoname: &str,
        geometry: &Geometry,
        options: &ExtractOptions<'_>,
    ) -> Result<GeoField> {
        self.as_dyn_mut().extract_subdomain(pseudoname, geometry, options)
    }

    fn what(&mut self, sortfields: bool) -> Result<String> {
        self.as_dyn_mut().what(sortfields)
    }
}
