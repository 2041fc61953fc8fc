//! netCDF files following the CF conventions.
//!
//! The whole dataset is held in memory: read at open, written back at close
//! when fields were written. Dimensions are recognised through the aliases
//! of the configuration (`X`, `Y`, `Z`, `T`, `N`), a variable carrying a
//! `grid_mapping` attribute is on a projected grid, and variables spanning
//! no horizontal dimension are Misc fields.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use field::{Field, FieldId, FormatFid, GenericFid, GeoField, MiscField, MiscValue};
use geometry::{
    Dimensions, Geometry, GeometryName, Grid, HybridCoefficients, ProjectionParams, RectangularGrid,
    Secant, VCoordinate, VPosition,
};
use meteo_common::constants::surface;
use meteo_common::validity::parse_datetime;
use meteo_common::{EngineConfig, FieldValidity, FieldValidityList, OpenMode};
use netcdf_parser::{Attribute, ClassicFormat, Dataset, NcType, NcValues, Variable};

use crate::error::{ResourceError, Result};
use crate::field_dict::{FieldType, Nature};
use crate::resource::{Format, FormatResource};

const MAPPING_VARIABLE: &str = "projection";
const EPSILON: f64 = 1e-9;

/// Axis (`X`, `Y`, `Z`, `T`, `N`) of a dimension name, from the configured aliases.
pub fn netcdf_axis_of(dimension: &str) -> Option<&'static str> {
    EngineConfig::global().netcdf_axis_of(dimension)
}

/// `seconds since <date>` units of a time axis based at `basis`.
pub fn time_units(basis: DateTime<Utc>) -> String {
    format!("seconds since {} +0:00", basis.format("%Y-%m-%d %H:%M:%S"))
}

/// Origin and unit length in seconds of `<unit> since <date>` units.
pub fn parse_time_units(units: &str) -> Result<(DateTime<Utc>, f64)> {
    let (unit, date) = units
        .split_once(" since ")
        .ok_or_else(|| ResourceError::usage(format!("time units '{}' lack 'since'", units)))?;
    let seconds = match unit.trim() {
        "seconds" | "second" | "s" => 1.0,
        "minutes" | "minute" => 60.0,
        "hours" | "hour" | "h" => 3600.0,
        "days" | "day" => 86400.0,
        other => return Err(ResourceError::unsupported(format!("time unit '{}'", other))),
    };
    let date = date.trim();
    let origin = parse_datetime(date).or_else(|_| parse_datetime(date.get(..19).unwrap_or(date)))?;
    Ok((origin, seconds))
}

// ============================================================================
// Misc values
// ============================================================================

/// netCDF values of a Misc value; classic files have no 64-bit integers nor booleans.
pub fn misc_to_nc(value: &MiscValue) -> NcValues {
    match value {
        MiscValue::Int(v) => NcValues::Int(vec![*v as i32]),
        MiscValue::IntArray(v) => NcValues::Int(v.iter().map(|x| *x as i32).collect()),
        MiscValue::Float(v) => NcValues::Double(vec![*v]),
        MiscValue::FloatArray(v) => NcValues::Double(v.clone()),
        MiscValue::Bool(v) => NcValues::Byte(vec![*v as i8]),
        MiscValue::BoolArray(v) => NcValues::Byte(v.iter().map(|b| *b as i8).collect()),
        MiscValue::Str(s) => NcValues::text(s),
        MiscValue::StrArray(v) => NcValues::text(&v.join("\n")),
    }
}

/// Misc value of variable data, typed by `nature` when known, by the netCDF type otherwise.
pub fn nc_to_misc(data: &NcValues, scalar: bool, nature: Option<Nature>) -> MiscValue {
    let nature = nature.unwrap_or(match data.nc_type() {
        NcType::Char => Nature::Str,
        NcType::Byte | NcType::Short | NcType::Int => Nature::Int,
        NcType::Float | NcType::Double => Nature::Float,
    });
    let numbers = data.to_f64();
    let scalar = scalar && numbers.len() == 1;
    match nature {
        Nature::Str => {
            let text = data.as_text().unwrap_or_else(|| {
                numbers.iter().filter_map(|c| char::from_u32(*c as u32)).collect()
            });
            if scalar || data.nc_type() == NcType::Char {
                MiscValue::Str(text)
            } else {
                MiscValue::StrArray(text.split('\n').map(str::to_string).collect())
            }
        }
        Nature::Int if scalar => MiscValue::Int(numbers[0] as i64),
        Nature::Int => MiscValue::IntArray(numbers.iter().map(|v| *v as i64).collect()),
        Nature::Bool if scalar => MiscValue::Bool(numbers[0] != 0.0),
        Nature::Bool => MiscValue::BoolArray(numbers.iter().map(|v| *v != 0.0).collect()),
        Nature::Float if scalar => MiscValue::Float(numbers[0]),
        Nature::Float => MiscValue::FloatArray(numbers),
    }
}

fn text_attribute(variable: &Variable, name: &str) -> Option<String> {
    variable.attribute(name).and_then(NcValues::as_text)
}

fn number_attribute(variable: &Variable, name: &str) -> Option<f64> {
    variable.attribute(name).and_then(NcValues::scalar)
}

fn attribute(name: &str, value: NcValues) -> Attribute {
    Attribute {
        name: name.to_string(),
        value,
    }
}

// ============================================================================
// In-memory dataset shared by the netCDF drivers
// ============================================================================

/// A dataset read at open and written back at close if modified.
#[derive(Debug)]
pub(crate) struct NcStore {
    pub(crate) path: PathBuf,
    pub(crate) mode: OpenMode,
    pub(crate) dataset: Dataset,
    dirty: bool,
    open: bool,
}

impl NcStore {
    pub(crate) fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let dataset = if mode.readable() {
            netcdf_parser::read_dataset(path)?
        } else {
            if path.exists() && EngineConfig::global().protect_unhappy_writes {
                return Err(ResourceError::usage(format!(
                    "{} exists and overwriting is protected",
                    path.display()
                )));
            }
            Dataset::new()
        };
        Ok(Self {
            path: path.to_path_buf(),
            mode,
            dataset,
            dirty: !mode.readable(),
            open: true,
        })
    }

    pub(crate) fn is_open(&self) -> bool {
        self.open
    }

    pub(crate) fn close(&mut self) -> Result<()> {
        if self.open && self.dirty && self.mode.writable() {
            netcdf_parser::write_dataset(&self.path, &self.dataset, ClassicFormat::Offset64)?;
            self.dirty = false;
        }
        self.open = false;
        Ok(())
    }

    pub(crate) fn check_writable(&self) -> Result<()> {
        if !self.mode.writable() || !self.open {
            return Err(ResourceError::usage(format!(
                "cannot write fields in {} opened in {} mode",
                self.path.display(),
                self.mode.as_str()
            )));
        }
        Ok(())
    }

    pub(crate) fn check_readable(&self) -> Result<()> {
        if !self.mode.readable() {
            return Err(ResourceError::usage(format!(
                "cannot read fields from {} opened in write mode",
                self.path.display()
            )));
        }
        Ok(())
    }

    pub(crate) fn variable(&self, name: &str) -> Result<&Variable> {
        self.dataset
            .variable(name)
            .ok_or_else(|| ResourceError::not_found(format!("'{}' in {}", name, self.path.display())))
    }

    /// Add or replace a variable, logging overwrites.
    pub(crate) fn put(
        &mut self,
        name: &str,
        dimensions: &[&str],
        attributes: Vec<Attribute>,
        data: NcValues,
    ) -> Result<()> {
        if self.dataset.variable(name).is_some() {
            info!(field = %name, path = %self.path.display(), "Overwriting field");
        }
        self.dataset.put_variable(name, dimensions, attributes, data)?;
        self.dirty = true;
        Ok(())
    }

    pub(crate) fn dimension(&mut self, name: &str, len: usize) -> Result<()> {
        self.dataset.add_dimension(name, len, false)?;
        Ok(())
    }

    /// Write a Misc value; arrays get a dimension named after their length.
    pub(crate) fn put_misc(&mut self, name: &str, value: &MiscValue, comment: Option<&str>) -> Result<()> {
        let data = misc_to_nc(value);
        let dimension = match value {
            MiscValue::Str(_) | MiscValue::StrArray(_) => Some(format!("char{}", data.len())),
            v if v.is_scalar() => None,
            _ => Some(format!("size{}", data.len())),
        };
        let mut dims: Vec<&str> = Vec::new();
        if let Some(d) = &dimension {
            self.dimension(d, data.len())?;
            dims.push(d);
        }
        let attributes = comment
            .map(|c| vec![attribute("comment", NcValues::text(c))])
            .unwrap_or_default();
        self.put(name, &dims, attributes, data)
    }

    pub(crate) fn read_misc(&self, name: &str, format: Format, nature: Option<Nature>) -> Result<MiscField> {
        let variable = self.variable(name)?;
        let value = nc_to_misc(&variable.data, variable.dimensions.is_empty(), nature);
        let mut misc = MiscField::new(FieldId::named(format.as_str(), name), value);
        if let Some(comment) = text_attribute(variable, "comment") {
            misc = misc.with_comment(comment);
        }
        Ok(misc)
    }
}

// ============================================================================
// Geometry decoding
// ============================================================================

/// Horizontal dimensions of a variable by axis.
#[derive(Debug, Default)]
struct Axes {
    x: Option<String>,
    y: Option<String>,
    z: Option<String>,
    t: Option<String>,
    n: Option<String>,
}

impl Axes {
    fn of(dataset: &Dataset, variable: &Variable) -> Self {
        let mut axes = Self::default();
        for name in dataset.dimension_names(variable) {
            let slot = match netcdf_axis_of(&name) {
                Some("X") => &mut axes.x,
                Some("Y") => &mut axes.y,
                Some("Z") => &mut axes.z,
                Some("T") => &mut axes.t,
                Some("N") => &mut axes.n,
                _ => continue,
            };
            *slot = Some(name);
        }
        axes
    }

    fn horizontal(&self) -> bool {
        self.x.is_some() || self.y.is_some() || self.n.is_some()
    }
}

fn coordinate(dataset: &Dataset, name: &str) -> Result<Vec<f64>> {
    dataset
        .variable(name)
        .map(|v| v.data.to_f64())
        .ok_or_else(|| ResourceError::missing_auxiliary(name, "locate the grid"))
}

fn resolution(values: &[f64], name: &str) -> Result<f64> {
    match values {
        [a, b, ..] => Ok(b - a),
        [_] => Ok(0.0),
        [] => Err(ResourceError::usage(format!("empty coordinate '{}'", name))),
    }
}

fn projection_of(mapping: &Variable) -> Result<(GeometryName, ProjectionParams)> {
    let kind = text_attribute(mapping, "grid_mapping_name").unwrap_or_default();
    let parallels = mapping
        .attribute("standard_parallel")
        .map(NcValues::to_f64)
        .unwrap_or_default();
    let lat_origin = number_attribute(mapping, "latitude_of_projection_origin");
    Ok(match kind.as_str() {
        "lambert_conformal_conic" => {
            let lon = number_attribute(mapping, "longitude_of_central_meridian").unwrap_or(0.0);
            let p = match parallels.as_slice() {
                [l1, l2] if (l1 - l2).abs() > EPSILON => {
                    let mut p = ProjectionParams::tangent(lon, lat_origin.unwrap_or(*l1));
                    p.secant = Secant::Two(*l1, *l2);
                    p
                }
                [l1, ..] => ProjectionParams::tangent(lon, *l1),
                [] => ProjectionParams::tangent(lon, lat_origin.unwrap_or(45.0)),
            };
            (GeometryName::Lambert, p)
        }
        "mercator" => {
            let lon = number_attribute(mapping, "longitude_of_projection_origin").unwrap_or(0.0);
            let mut p = ProjectionParams::tangent(lon, lat_origin.unwrap_or(0.0));
            if let Some(lat_ts) = parallels.first() {
                p.secant = Secant::One(*lat_ts);
            }
            (GeometryName::Mercator, p)
        }
        "polar_stereographic" => {
            let lon = number_attribute(mapping, "straight_vertical_longitude_from_pole").unwrap_or(0.0);
            let mut p = ProjectionParams::tangent(lon, lat_origin.unwrap_or(90.0));
            if let Some(lat_ts) = parallels.first() {
                p.secant = Secant::One(*lat_ts);
            }
            (GeometryName::PolarStereographic, p)
        }
        other => {
            return Err(ResourceError::unsupported(format!("grid mapping '{}'", other)));
        }
    })
}

fn mapping_attributes(name: GeometryName, p: &ProjectionParams) -> Vec<Attribute> {
    let number = |n: &str, v: f64| attribute(n, NcValues::Double(vec![v]));
    match (name, p.secant) {
        (GeometryName::Lambert, secant) => {
            let parallels = match secant {
                Secant::Two(l1, l2) => vec![l1, l2],
                _ => vec![p.reference_lat],
            };
            vec![
                attribute("grid_mapping_name", NcValues::text("lambert_conformal_conic")),
                number("longitude_of_central_meridian", p.reference_lon),
                number("latitude_of_projection_origin", p.reference_lat),
                attribute("standard_parallel", NcValues::Double(parallels)),
            ]
        }
        (GeometryName::Mercator, secant) => {
            let mut a = vec![
                attribute("grid_mapping_name", NcValues::text("mercator")),
                number("longitude_of_projection_origin", p.reference_lon),
                number("latitude_of_projection_origin", p.reference_lat),
            ];
            if let Secant::One(lat_ts) = secant {
                a.push(number("standard_parallel", lat_ts));
            }
            a
        }
        (_, secant) => {
            let mut a = vec![
                attribute("grid_mapping_name", NcValues::text("polar_stereographic")),
                number("straight_vertical_longitude_from_pole", p.reference_lon),
                number("latitude_of_projection_origin", p.reference_lat),
            ];
            if let Secant::One(lat_ts) = secant {
                a.push(number("standard_parallel", lat_ts));
            }
            a
        }
    }
}

/// Vertical coordinate of a variable: its `Z` axis or its level attributes.
fn vcoordinate_of(dataset: &Dataset, variable: &Variable, z: Option<&str>) -> Result<VCoordinate> {
    let Some(z) = z else {
        let code = number_attribute(variable, "typeOfFirstFixedSurface").map_or(surface::UNKNOWN, |v| v as u16);
        let level = number_attribute(variable, "level").unwrap_or(0.0);
        return Ok(VCoordinate::single(code, level));
    };
    let levels = match dataset.variable(z) {
        Some(v) => v.data.to_f64(),
        None => {
            let len = dataset.dimension(z).map_or(1, |d| d.len);
            (1..=len).map(|l| l as f64).collect()
        }
    };
    let Some(zvar) = dataset.variable(z) else {
        return Ok(VCoordinate::single(surface::UNKNOWN, 0.0).with_levels(levels));
    };
    let code = match number_attribute(zvar, "typeOfFirstFixedSurface") {
        Some(c) => c as u16,
        None => match text_attribute(zvar, "units").as_deref() {
            Some("hPa") => surface::ISOBARIC,
            Some("m") if text_attribute(zvar, "standard_name").as_deref() == Some("altitude") => {
                surface::ALTITUDE
            }
            Some("m") => surface::HEIGHT,
            _ => surface::UNKNOWN,
        },
    };
    let grid = match (zvar.attribute("hybrid_a"), zvar.attribute("hybrid_b")) {
        (Some(a), Some(b)) => Some(HybridCoefficients::new(a.to_f64(), b.to_f64(), VPosition::Flux)?),
        _ => None,
    };
    Ok(VCoordinate {
        typeoffirstfixedsurface: code,
        position_on_grid: if grid.is_some() { VPosition::Mass } else { VPosition::Unknown },
        grid,
        levels,
        column_levels: None,
    })
}

fn validity_of(dataset: &Dataset, variable: &Variable, t: Option<&str>) -> Result<FieldValidityList> {
    let cumulation = number_attribute(variable, "cumulativeduration").map(|s| Duration::seconds(s as i64));
    let with_cumulation = |v: FieldValidity| match cumulation {
        Some(c) => v.with_cumulativeduration(c),
        None => v,
    };
    let time = t.and_then(|t| dataset.variable(t));
    let Some(time) = time else {
        debug!(field = %variable.name, "No time axis, validity set at the epoch");
        return Ok(FieldValidityList::new(with_cumulation(FieldValidity::analysis(DateTime::UNIX_EPOCH))));
    };
    let units = text_attribute(time, "units")
        .ok_or_else(|| ResourceError::usage(format!("time variable '{}' without units", time.name)))?;
    let (origin, unit) = parse_time_units(&units)?;
    let validities = time
        .data
        .to_f64()
        .into_iter()
        .map(|v| with_cumulation(FieldValidity::new(origin, Duration::milliseconds((v * unit * 1000.0).round() as i64))))
        .collect();
    Ok(FieldValidityList::from_vec(validities)?)
}

/// Reverse the rows of each `x * y` slice.
pub(crate) fn flip_rows(values: &mut [f64], x: usize, y: usize) {
    for slice in values.chunks_mut(x * y) {
        for j in 0..y / 2 {
            let (top, bottom) = slice.split_at_mut((y - 1 - j) * x);
            top[j * x..(j + 1) * x].swap_with_slice(&mut bottom[..x]);
        }
    }
}

/// Horizontal geometry of a variable, and whether its rows run north to south.
fn horizontal_geometry(dataset: &Dataset, variable: &Variable, axes: &Axes) -> Result<(Geometry, bool)> {
    if axes.x.is_none() && axes.y.is_none() {
        let names = text_attribute(variable, "coordinates").unwrap_or_default();
        let mut names = names.split_whitespace();
        let (Some(lon), Some(lat)) = (names.next(), names.next()) else {
            return Err(ResourceError::missing_auxiliary("coordinates", format!("locate the points of '{}'", variable.name)));
        };
        let geometry = Geometry::unstructured(coordinate(dataset, lon)?, coordinate(dataset, lat)?)?;
        return Ok((geometry, false));
    }
    let x_name = axes.x.clone().unwrap_or_default();
    let xs = coordinate(dataset, &x_name)?;
    let ys = match &axes.y {
        Some(y) => coordinate(dataset, y)?,
        None => vec![0.0],
    };
    let dimensions = Dimensions::rectangular(xs.len(), ys.len());
    let (dx, dy) = (resolution(&xs, "X")?, resolution(&ys, "Y")?);

    if let Some(mapping) = text_attribute(variable, "grid_mapping") {
        let mapping = dataset
            .variable(&mapping)
            .ok_or_else(|| ResourceError::missing_auxiliary(mapping.clone(), "build the projection"))?;
        let (name, projection) = projection_of(mapping)?;
        let provisional = RectangularGrid {
            x_resolution: dx,
            y_resolution: dy,
            input_lon: projection.reference_lon,
            input_lat: projection.reference_lat,
            input_position: (0.0, 0.0),
            lamzone: None,
        };
        let g = Geometry::projected(name, dimensions.clone(), provisional.clone(), projection)?;
        let (input_lon, input_lat) = g.conformal()?.unproject(xs[0], ys[0]);
        let grid = RectangularGrid {
            input_lon,
            input_lat,
            ..provisional
        };
        return Ok((Geometry::projected(name, dimensions, grid, projection)?, false));
    }

    let units = dataset
        .variable(&x_name)
        .and_then(|v| text_attribute(v, "units"))
        .unwrap_or_default();
    if units == "m" || units == "km" {
        let scale = if units == "km" { 1000.0 } else { 1.0 };
        let grid = RectangularGrid {
            x_resolution: dx * scale,
            y_resolution: dy * scale,
            input_lon: 0.0,
            input_lat: 0.0,
            input_position: (0.0, 0.0),
            lamzone: None,
        };
        return Ok((Geometry::academic(dimensions, grid)?, false));
    }
    let flipped = dy < 0.0;
    let grid = RectangularGrid {
        x_resolution: dx,
        y_resolution: dy.abs(),
        input_lon: xs[0],
        input_lat: if flipped { ys[ys.len() - 1] } else { ys[0] },
        input_position: (0.0, 0.0),
        lamzone: None,
    };
    Ok((Geometry::regular_lonlat(dimensions, grid)?, flipped))
}

// ============================================================================
// Resource
// ============================================================================

/// A netCDF file.
#[derive(Debug)]
pub struct NetCdfResource {
    store: NcStore,
    geometry: Option<Geometry>,
}

impl NetCdfResource {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let store = NcStore::open(path, mode)?;
        let mut resource = Self { store, geometry: None };
        if mode.readable() {
            resource.geometry = resource.first_geometry();
        }
        debug!(
            path = %path.display(),
            mode = %mode.as_str(),
            variables = resource.store.dataset.variables.len(),
            "Opened netCDF file"
        );
        Ok(resource)
    }

    /// Geometry of the first gridded variable that has a readable one.
    fn first_geometry(&self) -> Option<Geometry> {
        for fid in self.listfields().ok()? {
            if self.field_type(&fid) == FieldType::Misc {
                continue;
            }
            let name = fid.as_name()?;
            match self.variable_geometry(name) {
                Ok((g, _)) => return Some(g),
                Err(e) => warn!(field = %name, error = %e, "Unreadable netCDF geometry"),
            }
        }
        None
    }

    fn variable_geometry(&self, name: &str) -> Result<(Geometry, bool)> {
        let ds = &self.store.dataset;
        let variable = self.store.variable(name)?;
        let axes = Axes::of(ds, variable);
        let (horizontal, flipped) = horizontal_geometry(ds, variable, &axes)?;
        let vcoordinate = vcoordinate_of(ds, variable, axes.z.as_deref())?;
        Ok((horizontal.with_vcoordinate(vcoordinate), flipped))
    }

    /// Variables that only describe others: coordinates and grid mappings.
    fn auxiliary_variables(&self) -> HashSet<String> {
        let ds = &self.store.dataset;
        let mut aux = HashSet::new();
        for v in &ds.variables {
            if let Some(m) = text_attribute(v, "grid_mapping") {
                aux.insert(m);
            }
            if let Some(c) = text_attribute(v, "coordinates") {
                aux.extend(c.split_whitespace().map(str::to_string));
            }
            let dims = ds.dimension_names(v);
            if dims.len() == 1 && dims[0] == v.name {
                aux.insert(v.name.clone());
            }
        }
        aux
    }

    fn put_time(&mut self, validity: &FieldValidityList) -> Result<()> {
        let basis = validity.first().basis;
        let terms: Vec<f64> = validity.iter().map(|v| (v.get() - basis).num_milliseconds() as f64 / 1000.0).collect();
        let units = time_units(basis);
        if let Some(existing) = self.store.dataset.variable("time") {
            let same = existing.data.to_f64() == terms && text_attribute(existing, "units").as_deref() == Some(units.as_str());
            if !same {
                return Err(ResourceError::usage(format!(
                    "{} holds a single time axis, fields of another validity cannot be added",
                    self.store.path.display()
                )));
            }
            return Ok(());
        }
        self.store.dimension("time", terms.len())?;
        self.store.put(
            "time",
            &["time"],
            vec![attribute("units", NcValues::text(&units))],
            NcValues::Double(terms),
        )
    }

    fn put_level(&mut self, vcoordinate: &VCoordinate) -> Result<()> {
        let levels = vcoordinate.levels.clone();
        if let Some(existing) = self.store.dataset.variable("level") {
            if existing.data.to_f64() != levels {
                return Err(ResourceError::usage("fields with different level axes in one netCDF file"));
            }
            return Ok(());
        }
        let mut attributes = vec![attribute(
            "typeOfFirstFixedSurface",
            NcValues::Int(vec![vcoordinate.typeoffirstfixedsurface as i32]),
        )];
        if let Some(grid) = &vcoordinate.grid {
            attributes.push(attribute("hybrid_a", NcValues::Double(grid.a.clone())));
            attributes.push(attribute("hybrid_b", NcValues::Double(grid.b.clone())));
        }
        self.store.dimension("level", levels.len())?;
        self.store.put("level", &["level"], attributes, NcValues::Double(levels))
    }

    /// Coordinate variables of a horizontal grid; returns the field dimensions
    /// and attributes it needs.
    fn put_horizontal(&mut self, geometry: &Geometry) -> Result<(Vec<&'static str>, Vec<Attribute>)> {
        let d = &geometry.dimensions;
        match geometry.name {
            GeometryName::RegularLonlat => {
                let lons = (0..d.x).map(|i| geometry.ij2ll(i as f64, 0.0).map(|p| p.0)).collect::<std::result::Result<Vec<_>, _>>()?;
                let lats = (0..d.y).map(|j| geometry.ij2ll(0.0, j as f64).map(|p| p.1)).collect::<std::result::Result<Vec<_>, _>>()?;
                self.store.dimension("lon", d.x)?;
                self.store.dimension("lat", d.y)?;
                self.store.put("lon", &["lon"], vec![attribute("units", NcValues::text("degrees_east"))], NcValues::Double(lons))?;
                self.store.put("lat", &["lat"], vec![attribute("units", NcValues::text("degrees_north"))], NcValues::Double(lats))?;
                Ok((vec!["lat", "lon"], Vec::new()))
            }
            GeometryName::Lambert | GeometryName::Mercator | GeometryName::PolarStereographic | GeometryName::Academic => {
                let projection = geometry.projection;
                if projection.is_some_and(|p| p.rotation.abs() > EPSILON) {
                    return Err(ResourceError::unsupported("rotated projections in netCDF"));
                }
                let xs = (0..d.x).map(|i| geometry.ij2xy(i as f64, 0.0).map(|p| p.0)).collect::<std::result::Result<Vec<_>, _>>()?;
                let ys = (0..d.y).map(|j| geometry.ij2xy(0.0, j as f64).map(|p| p.1)).collect::<std::result::Result<Vec<_>, _>>()?;
                self.store.dimension("x", d.x)?;
                self.store.dimension("y", d.y)?;
                self.store.put("x", &["x"], vec![attribute("units", NcValues::text("m"))], NcValues::Double(xs))?;
                self.store.put("y", &["y"], vec![attribute("units", NcValues::text("m"))], NcValues::Double(ys))?;
                let mut attributes = Vec::new();
                if let Some(p) = &projection {
                    self.store.put(MAPPING_VARIABLE, &[], mapping_attributes(geometry.name, p), NcValues::Int(vec![0]))?;
                    let (lons, lats) = geometry.get_lonlat_grid(None)?;
                    self.store.put("longitude", &["y", "x"], vec![attribute("units", NcValues::text("degrees_east"))], NcValues::Double(lons))?;
                    self.store.put("latitude", &["y", "x"], vec![attribute("units", NcValues::text("degrees_north"))], NcValues::Double(lats))?;
                    attributes.push(attribute("grid_mapping", NcValues::text(MAPPING_VARIABLE)));
                    attributes.push(attribute("coordinates", NcValues::text("longitude latitude")));
                }
                Ok((vec!["y", "x"], attributes))
            }
            GeometryName::Unstructured => {
                let (lons, lats) = match &geometry.grid {
                    Grid::Unstructured(g) => (g.longitudes.clone(), g.latitudes.clone()),
                    _ => return Err(ResourceError::unsupported("unstructured geometry without points")),
                };
                self.store.dimension("obs", lons.len())?;
                self.store.put("lon", &["obs"], vec![attribute("units", NcValues::text("degrees_east"))], NcValues::Double(lons))?;
                self.store.put("lat", &["obs"], vec![attribute("units", NcValues::text("degrees_north"))], NcValues::Double(lats))?;
                Ok((vec!["obs"], vec![attribute("coordinates", NcValues::text("lon lat"))]))
            }
            GeometryName::ReducedGauss | GeometryName::RotatedReducedGauss => Err(ResourceError::unsupported(
                "Gaussian grids cannot be written to netCDF",
            )),
        }
    }

    fn write_geo(&mut self, name: &str, geo: &GeoField) -> Result<()> {
        if geo.is_spectral() {
            return Err(ResourceError::unsupported(format!(
                "'{}': spectral fields cannot be written to netCDF",
                name
            )));
        }
        match &self.geometry {
            Some(own) if !own.same_horizontal_grid(&geo.geometry) => {
                return Err(ResourceError::usage(format!(
                    "'{}': field geometry differs from the file's ({} {}x{})",
                    name, own.name, own.dimensions.x, own.dimensions.y
                )));
            }
            Some(_) => {}
            None => self.geometry = Some(geo.geometry.clone()),
        }
        let (horizontal, mut attributes) = self.put_horizontal(&geo.geometry)?;
        self.put_time(&geo.validity)?;
        let mut dims: Vec<&str> = vec!["time"];
        let vc = &geo.geometry.vcoordinate;
        if vc.levels.len() > 1 {
            self.put_level(vc)?;
            dims.push("level");
        } else {
            attributes.push(attribute("typeOfFirstFixedSurface", NcValues::Int(vec![vc.typeoffirstfixedsurface as i32])));
            attributes.push(attribute("level", NcValues::Double(vec![vc.levels.first().copied().unwrap_or(0.0)])));
        }
        dims.extend(horizontal);

        let fill = NcType::Double.default_fill();
        attributes.push(attribute("_FillValue", NcValues::Double(vec![fill])));
        if let Some(c) = geo.validity.first().cumulativeduration {
            attributes.push(attribute("cumulativeduration", NcValues::Double(vec![c.num_seconds() as f64])));
        }
        if let Some(g) = &geo.fid.generic {
            attributes.push(attribute("discipline", NcValues::Int(vec![g.discipline as i32])));
            attributes.push(attribute("parameterCategory", NcValues::Int(vec![g.parameter_category as i32])));
            attributes.push(attribute("parameterNumber", NcValues::Int(vec![g.parameter_number as i32])));
        }
        if let Some(comment) = &geo.comment {
            attributes.push(attribute("comment", NcValues::text(comment)));
        }
        let data: Vec<f64> = geo.values().iter().map(|v| if v.is_finite() { *v } else { fill }).collect();
        self.store.put(name, &dims, attributes, NcValues::Double(data))?;
        debug!(field = %name, levels = geo.levels_number(), "Wrote netCDF field");
        Ok(())
    }
}

impl FormatResource for NetCdfResource {
    fn format(&self) -> Format {
        Format::NetCdf
    }

    fn path(&self) -> &Path {
        &self.store.path
    }

    fn openmode(&self) -> OpenMode {
        self.store.mode
    }

    fn is_open(&self) -> bool {
        self.store.is_open()
    }

    fn close(&mut self) -> Result<()> {
        self.store.close()
    }

    fn listfields(&self) -> Result<Vec<FormatFid>> {
        let aux = self.auxiliary_variables();
        Ok(self
            .store
            .dataset
            .variables
            .iter()
            .filter(|v| !aux.contains(&v.name))
            .map(|v| FormatFid::Name(v.name.clone()))
            .collect())
    }

    fn field_type(&self, fid: &FormatFid) -> FieldType {
        let ds = &self.store.dataset;
        let Some(variable) = fid.as_name().and_then(|n| ds.variable(n)) else {
            return FieldType::Misc;
        };
        let axes = Axes::of(ds, variable);
        if !axes.horizontal() {
            return FieldType::Misc;
        }
        let levels = axes.z.as_deref().and_then(|z| ds.dimension(z)).map_or(1, |d| d.len);
        if levels > 1 {
            FieldType::D3
        } else {
            FieldType::H2D
        }
    }

    fn generic_fid(&self, fid: &FormatFid) -> Option<GenericFid> {
        let variable = self.store.dataset.variable(fid.as_name()?)?;
        let code = |n: &str| number_attribute(variable, n).map(|v| v as u8);
        let generic = GenericFid::new(code("discipline")?, code("parameterCategory")?, code("parameterNumber")?);
        let surface = number_attribute(variable, "typeOfFirstFixedSurface").map_or(surface::UNKNOWN, |v| v as u16);
        Some(generic.at_level(surface, number_attribute(variable, "level").unwrap_or(0.0)))
    }

    fn readfield(&mut self, fid: &FormatFid) -> Result<Field> {
        self.store.check_readable()?;
        let name = fid
            .as_name()
            .ok_or_else(|| ResourceError::usage(format!("'{}' is not a netCDF variable name", fid)))?;
        if self.field_type(fid) == FieldType::Misc {
            return Ok(Field::Misc(self.store.read_misc(name, Format::NetCdf, None)?));
        }
        let (geometry, flipped) = self.variable_geometry(name)?;
        let ds = &self.store.dataset;
        let variable = self.store.variable(name)?;
        let axes = Axes::of(ds, variable);
        let validity = validity_of(ds, variable, axes.t.as_deref())?;
        let mut values = variable.values();
        if flipped {
            flip_rows(&mut values, geometry.dimensions.x, geometry.dimensions.y);
        }
        let mut id = FieldId::named(Format::NetCdf.as_str(), name);
        if let Some(g) = self.generic_fid(fid) {
            id = id.with_generic(g);
        }
        let mut geo = GeoField::new(id, geometry, validity, values)?;
        if let Some(comment) = text_attribute(variable, "comment") {
            geo = geo.with_comment(comment);
        }
        debug!(field = %name, flipped, "Read netCDF field");
        Ok(Field::from_geo(geo))
    }

    fn writefield(&mut self, field: &Field) -> Result<()> {
        self.store.check_writable()?;
        let name = field
            .fid()
            .get(Format::NetCdf.as_str())
            .and_then(FormatFid::as_name)
            .ok_or_else(|| ResourceError::usage(format!("field '{}' has no netCDF name", field.fid().display_name())))?
            .to_string();
        match field {
            Field::Misc(misc) => self.store.put_misc(&name, &misc.value, misc.comment.as_deref()),
            Field::H2D(geo) | Field::D3(geo) => self.write_geo(&name, geo),
            Field::Vector(_) => Err(ResourceError::usage("write the components of a vector field separately")),
        }
    }

    fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    fn validity(&self) -> Option<&FieldValidityList> {
        None
    }

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
}

impl Drop for NetCdfResource {
    fn drop(&mut self) {
        if let Err(e) = self.store.close() {
            warn!(path = %self.store.path.display(), error = %e, "Failed to close netCDF file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_aliases() {
        assert_eq!(netcdf_axis_of("longitude"), Some("X"));
        assert_eq!(netcdf_axis_of("Nbre_lat"), Some("Y"));
        assert_eq!(netcdf_axis_of("level"), Some("Z"));
        assert_eq!(netcdf_axis_of("validity"), Some("T"));
        assert_eq!(netcdf_axis_of("transect"), Some("N"));
        assert_eq!(netcdf_axis_of("char12"), None);
    }

    #[test]
    fn test_time_units() {
        let basis = parse_datetime("2024-01-15T00:00:00Z").unwrap();
        let units = time_units(basis);
        assert_eq!(units, "seconds since 2024-01-15 00:00:00 +0:00");
        assert_eq!(parse_time_units(&units).unwrap(), (basis, 1.0));
        assert_eq!(parse_time_units("hours since 2024-01-15 00:00:00").unwrap().1, 3600.0);
        assert!(parse_time_units("fortnights since 2024-01-15").is_err());
    }

    #[test]
    fn test_misc_values() {
        let v = nc_to_misc(&misc_to_nc(&MiscValue::Int(42)), true, None);
        assert_eq!(v, MiscValue::Int(42));
        let v = nc_to_misc(&misc_to_nc(&MiscValue::Bool(true)), true, Some(Nature::Bool));
        assert_eq!(v, MiscValue::Bool(true));
        let v = nc_to_misc(&misc_to_nc(&MiscValue::Str("AROME".into())), false, None);
        assert_eq!(v, MiscValue::Str("AROME".into()));
        let v = nc_to_misc(&NcValues::Float(vec![1.5, 2.5]), false, None);
        assert_eq!(v, MiscValue::FloatArray(vec![1.5, 2.5]));
    }

    #[test]
    fn test_flip_rows() {
        let mut values = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        flip_rows(&mut values, 2, 3);
        assert_eq!(values, vec![5.0, 6.0, 3.0, 4.0, 1.0, 2.0]);
    }
}
