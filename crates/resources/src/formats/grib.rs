//! GRIB edition 2 files.
//!
//! One message is one horizontal field. Fields are identified by their
//! GRIB2 keys (discipline, category, number, surface, level, templates) plus
//! `shortName` and `name` when the parameter tables know them. Messages
//! sharing all keys are read together as a field with several validities.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::Duration;
use serde_json::Value;
use tracing::{debug, info, warn};

use field::{Field, FieldId, FormatFid, GenericFid, GeoField};
use geometry::{
    Dimensions, GaussGrid, Geoid, Geometry, GeometryName, HybridCoefficients, ProjectionParams,
    RectangularGrid, Secant, VCoordinate, VPosition,
};
use grib2_parser::{
    EarthShape, FixedSurface, GaussianGrid, Grib2Message, Grib2Reader, Grib2Tables, Grib2Writer, GridDefinition,
    GridTemplate, Identification, LambertGrid, LatLonGrid, ProductDefinition, ProjectedGrid, StatisticalProcess,
    SCAN_J_POSITIVE,
};
use meteo_common::constants::surface;
use meteo_common::{EngineConfig, FieldValidity, FieldValidityList, OpenMode};

use crate::error::{ResourceError, Result};
use crate::field_dict::FieldType;
use crate::formats::netcdf::flip_rows;
use crate::glob::Glob;
use crate::resource::{Format, FormatResource};

const EPSILON: f64 = 1e-9;

/// Statistical process written when a cumulated field does not name one (accumulation).
const DEFAULT_STATISTICAL_PROCESS: u8 = 1;

fn tables() -> &'static Grib2Tables {
    static TABLES: OnceLock<Grib2Tables> = OnceLock::new();
    TABLES.get_or_init(Grib2Tables::builtin)
}

/// Isobaric levels are hPa in identifiers, Pa in messages.
fn level_to_grib(type_of_surface: u16, level: f64) -> f64 {
    if type_of_surface == surface::ISOBARIC {
        level * 100.0
    } else {
        level
    }
}

fn level_from_grib(type_of_surface: u16, value: f64) -> f64 {
    if type_of_surface == surface::ISOBARIC {
        value / 100.0
    } else {
        value
    }
}

// ============================================================================
// Identifiers
// ============================================================================

/// Generic identifier of a message.
pub fn message_generic(message: &Grib2Message) -> GenericFid {
    let first = &message.product.first_surface;
    let type_of_surface = first.type_of_surface as u16;
    let level = first
        .value()
        .map_or(0.0, |v| level_from_grib(type_of_surface, v));
    let mut generic = GenericFid::new(
        message.discipline,
        message.product.parameter_category,
        message.product.parameter_number,
    )
    .at_level(type_of_surface, level);
    generic.product_definition_template_number = Some(message.product.template_number() as u8);
    generic.type_of_statistical_processing = message
        .product
        .statistics
        .as_ref()
        .map(|s| s.type_of_statistical_processing);
    generic
}

/// GRIB keys of a message: generic keys plus parameter names when known.
pub fn message_keys(message: &Grib2Message) -> BTreeMap<String, Value> {
    let generic = message_generic(message);
    let mut keys = generic.to_keys();
    if let Some(p) = tables().parameter(generic.discipline, generic.parameter_category, generic.parameter_number) {
        keys.insert("shortName".to_string(), Value::from(p.short_name.clone()));
        keys.insert("name".to_string(), Value::from(p.name.clone()));
    }
    keys
}

/// Whether every key of `request` has the same value in `keys`.
fn keys_match(request: &BTreeMap<String, Value>, keys: &BTreeMap<String, Value>) -> bool {
    request.iter().all(|(k, v)| match (keys.get(k), v) {
        (Some(Value::Number(a)), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Some(a), b) => a == b,
        (None, _) => false,
    })
}

/// Generic identifier to write a field under: its GRIB keys, its generic
/// identifier, or the codes of its `shortName`.
fn write_generic(fid: &FieldId) -> Result<GenericFid> {
    let keys = fid.get(Format::Grib.as_str()).and_then(FormatFid::as_keys);
    if let Some(g) = keys.and_then(GenericFid::from_keys) {
        return Ok(g);
    }
    if let Some(g) = &fid.generic {
        return Ok(g.clone());
    }
    let short_name = keys.and_then(|k| k.get("shortName")).and_then(Value::as_str);
    if let Some((d, c, n)) = short_name.and_then(|s| tables().parameter_by_short_name(s)) {
        return Ok(GenericFid::new(d, c, n));
    }
    Err(ResourceError::usage(format!(
        "field '{}' has neither GRIB keys nor a generic identifier",
        fid.display_name()
    )))
}

// ============================================================================
// Geometry decoding
// ============================================================================

/// Horizontal geometry of a message, and whether its rows must be reversed
/// to run from south to north.
fn decode_geometry(grid: &GridDefinition) -> Result<(Geometry, bool)> {
    let flip = !grid.rows_south_to_north();
    let first_row = |ny: u32| if flip { (ny.max(1) - 1) as f64 } else { 0.0 };
    let rectangular = |nx: u32, ny: u32, dx: f64, dy: f64, lo1: f64, la1: f64| RectangularGrid {
        x_resolution: dx,
        y_resolution: dy,
        input_lon: lo1,
        input_lat: la1,
        input_position: (0.0, first_row(ny)),
        lamzone: None,
    };
    let (geometry, flip) = match &grid.template {
        GridTemplate::LatLon(g) => {
            let dims = Dimensions::rectangular(g.ni as usize, g.nj as usize);
            let r = rectangular(g.ni, g.nj, g.di, g.dj.abs(), g.lo1, g.la1);
            (Geometry::regular_lonlat(dims, r)?, flip)
        }
        GridTemplate::Mercator(g) => {
            let mut p = ProjectionParams::tangent(g.lo1, 0.0);
            if g.lad.abs() > EPSILON {
                p.secant = Secant::One(g.lad);
            }
            let dims = Dimensions::rectangular(g.nx as usize, g.ny as usize);
            let r = rectangular(g.nx, g.ny, g.dx, g.dy, g.lo1, g.la1);
            (Geometry::projected(GeometryName::Mercator, dims, r, p)?, flip)
        }
        GridTemplate::PolarStereographic(g) => {
            let pole = if g.south_pole { -90.0 } else { 90.0 };
            let mut p = ProjectionParams::tangent(g.lov, pole);
            if (g.lad.abs() - 90.0).abs() > EPSILON {
                p.secant = Secant::One(g.lad);
            }
            let dims = Dimensions::rectangular(g.nx as usize, g.ny as usize);
            let r = rectangular(g.nx, g.ny, g.dx, g.dy, g.lo1, g.la1);
            (Geometry::projected(GeometryName::PolarStereographic, dims, r, p)?, flip)
        }
        GridTemplate::Lambert(l) => {
            let g = &l.grid;
            let mut p = ProjectionParams::tangent(g.lov, l.latin1);
            if (l.latin1 - l.latin2).abs() > EPSILON {
                p.reference_lat = g.lad;
                p.secant = Secant::Two(l.latin1, l.latin2);
            }
            let dims = Dimensions::rectangular(g.nx as usize, g.ny as usize);
            let r = rectangular(g.nx, g.ny, g.dx, g.dy, g.lo1, g.la1);
            (Geometry::projected(GeometryName::Lambert, dims, r, p)?, flip)
        }
        GridTemplate::Gaussian(g) => {
            if !flip {
                return Err(ResourceError::unsupported("Gaussian grids scanned from south to north"));
            }
            let pl: Vec<usize> = match (&g.pl, g.ni) {
                (Some(pl), _) => pl.iter().map(|n| *n as usize).collect(),
                (None, Some(ni)) => vec![ni as usize; g.nj as usize],
                (None, None) => {
                    return Err(ResourceError::unsupported("Gaussian grid without points per parallel"));
                }
            };
            let gauss = GaussGrid {
                latitudes: projection::gaussian_latitudes(g.nj as usize),
                pole_lon: 0.0,
                pole_lat: 90.0,
                dilatation_coef: 1.0,
            };
            (Geometry::reduced_gauss(pl, gauss)?, false)
        }
    };
    let geoid = match grid.earth.radius() {
        Some(radius) => Geoid::Sphere { radius },
        None => match grid.earth.axes() {
            Some((a, b)) => Geoid::Ellipsoid { a, b },
            None => Geoid::default(),
        },
    };
    Ok((geometry.with_geoid(geoid), flip))
}

fn vcoordinate_of(product: &ProductDefinition) -> Result<VCoordinate> {
    let first = &product.first_surface;
    let code = first.type_of_surface as u16;
    let level = first.value().map_or(0.0, |v| level_from_grib(code, v));
    let mut vc = VCoordinate::single(code, level);
    let pv = &product.vertical_coordinates;
    if !pv.is_empty() && pv.len() % 2 == 0 {
        let (a, b) = pv.split_at(pv.len() / 2);
        let to_f64 = |s: &[f32]| s.iter().map(|v| *v as f64).collect::<Vec<_>>();
        vc.grid = Some(HybridCoefficients::new(to_f64(a), to_f64(b), VPosition::Flux)?);
        vc.position_on_grid = VPosition::Mass;
    }
    Ok(vc)
}

fn validity_of(message: &Grib2Message) -> FieldValidity {
    let basis = message.reference_time();
    match &message.product.statistics {
        Some(s) => FieldValidity::new(basis, s.end_of_interval - basis)
            .with_cumulativeduration(s.length)
            .with_statistical_process(s.type_of_statistical_processing),
        None => FieldValidity::new(basis, message.product.forecast_time),
    }
}

// ============================================================================
// Geometry encoding
// ============================================================================

fn encode_grid(geometry: &Geometry) -> Result<GridDefinition> {
    let radius = match geometry.geoid {
        Geoid::Sphere { radius } => radius,
        Geoid::Ellipsoid { .. } => {
            warn!("Ellipsoidal geoid written as the configured sphere");
            EngineConfig::global().geoid_radius
        }
    };
    let d = &geometry.dimensions;
    let corner = |i: usize, j: usize| geometry.ij2ll(i as f64, j as f64);
    let projected = |p: &ProjectionParams, lad: f64| -> Result<ProjectedGrid> {
        if p.rotation.abs() > EPSILON {
            return Err(ResourceError::unsupported("rotated projections in GRIB2"));
        }
        let r = geometry.rectangular_grid()?;
        let (lo1, la1) = corner(0, 0)?;
        Ok(ProjectedGrid {
            nx: d.x as u32,
            ny: d.y as u32,
            la1,
            lo1,
            lad,
            lov: p.reference_lon,
            dx: r.x_resolution,
            dy: r.y_resolution,
            south_pole: p.reference_lat < 0.0,
        })
    };
    let (template, scanning_mode, resolution_flags) = match (geometry.name, &geometry.projection) {
        (GeometryName::RegularLonlat, _) => {
            let r = geometry.rectangular_grid()?;
            let (lo1, la1) = corner(0, 0)?;
            let (lo2, la2) = corner(d.x - 1, d.y - 1)?;
            let g = LatLonGrid {
                ni: d.x as u32,
                nj: d.y as u32,
                la1,
                lo1,
                la2,
                lo2,
                di: r.x_resolution,
                dj: r.y_resolution,
            };
            (GridTemplate::LatLon(g), SCAN_J_POSITIVE, 0x30)
        }
        (GeometryName::Lambert, Some(p)) => {
            let (latin1, latin2) = match p.secant {
                Secant::Two(l1, l2) => (l1, l2),
                _ => (p.reference_lat, p.reference_lat),
            };
            let g = LambertGrid {
                grid: projected(p, latin1)?,
                latin1,
                latin2,
                lat_south_pole: -90.0,
                lon_south_pole: 0.0,
            };
            (GridTemplate::Lambert(g), SCAN_J_POSITIVE, 0x08)
        }
        (GeometryName::Mercator, Some(p)) => {
            let lad = match p.secant {
                Secant::One(l) => l,
                _ => p.reference_lat,
            };
            (GridTemplate::Mercator(projected(p, lad)?), SCAN_J_POSITIVE, 0x08)
        }
        (GeometryName::PolarStereographic, Some(p)) => {
            let lad = match p.secant {
                Secant::One(l) => l,
                _ => 90f64.copysign(p.reference_lat),
            };
            (GridTemplate::PolarStereographic(projected(p, lad)?), SCAN_J_POSITIVE, 0x08)
        }
        (GeometryName::ReducedGauss, _) => {
            let grid = geometry.gauss_grid()?;
            let pl: Vec<u32> = geometry.lon_number_by_lat()?.iter().map(|n| *n as u32).collect();
            let max = pl.iter().copied().max().unwrap_or(1).max(1);
            let regular = pl.iter().all(|n| *n == max);
            let g = GaussianGrid {
                ni: regular.then_some(max),
                nj: pl.len() as u32,
                la1: grid.latitudes.first().copied().unwrap_or(90.0),
                lo1: 0.0,
                la2: grid.latitudes.last().copied().unwrap_or(-90.0),
                lo2: 360.0 - 360.0 / max as f64,
                n: (pl.len() / 2) as u32,
                pl: (!regular).then_some(pl),
            };
            (GridTemplate::Gaussian(g), 0, 0)
        }
        (name, _) => {
            return Err(ResourceError::unsupported(format!("{} grids in GRIB2", name)));
        }
    };
    Ok(GridDefinition {
        num_data_points: geometry.packed_size() as u32,
        earth: EarthShape::sphere(radius),
        resolution_flags,
        scanning_mode,
        template,
    })
}

// ============================================================================
// Resource
// ============================================================================

/// A GRIB2 file.
#[derive(Debug)]
pub struct GribResource {
    path: PathBuf,
    mode: OpenMode,
    open: bool,
    messages: Vec<Grib2Message>,
    geometry: Option<Geometry>,
}

impl GribResource {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        let messages = if mode.readable() {
            Grib2Reader::open(path)?.collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            if path.exists() && EngineConfig::global().protect_unhappy_writes {
                return Err(ResourceError::usage(format!(
                    "{} exists and overwriting is protected",
                    path.display()
                )));
            }
            Grib2Writer::open(path, false)?.flush()?;
            Vec::new()
        };
        let geometry = match messages.first() {
            Some(m) => Some(decode_geometry(&m.grid)?.0),
            None => None,
        };
        debug!(path = %path.display(), mode = %mode.as_str(), messages = messages.len(), "Opened GRIB2 file");
        Ok(Self {
            path: path.to_path_buf(),
            mode,
            open: true,
            messages,
            geometry,
        })
    }

    /// Number of messages in the file.
    pub fn messages_number(&self) -> usize {
        self.messages.len()
    }

    /// Messages whose keys contain `request`.
    fn matching(&self, request: &BTreeMap<String, Value>) -> Vec<&Grib2Message> {
        self.messages
            .iter()
            .filter(|m| keys_match(request, &message_keys(m)))
            .collect()
    }

    fn messages_of(&self, geo: &GeoField, generic: &GenericFid) -> Result<Vec<Grib2Message>> {
        let config = &EngineConfig::global().grib;
        let grid = encode_grid(&geo.geometry)?;
        let vc = &geo.geometry.vcoordinate;
        let type_of_surface = if vc.typeoffirstfixedsurface != surface::UNKNOWN {
            vc.typeoffirstfixedsurface
        } else {
            generic.type_of_first_fixed_surface
        };
        let levels = if vc.levels.len() == geo.levels_number() {
            vc.levels.clone()
        } else {
            vec![generic.level]
        };
        let vertical_coordinates: Vec<f32> = match &vc.grid {
            Some(g) => g.a.iter().chain(&g.b).map(|v| *v as f32).collect(),
            None => Vec::new(),
        };
        let level_size = geo.level_size();
        let mut messages = Vec::with_capacity(geo.validity.len() * levels.len());
        for (t, validity) in geo.validity.iter().enumerate() {
            let identification = Identification {
                center: config.centre,
                sub_center: 0,
                table_version: config.tables_version,
                local_table_version: 0,
                significance_of_reference_time: 1,
                reference_time: validity.basis,
                production_status: config.production_status,
                data_type: config.type_of_processed_data,
            };
            let cumulation = validity.cumulativeduration.filter(|c| *c > Duration::zero());
            let statistics = cumulation.map(|length| StatisticalProcess {
                end_of_interval: validity.get(),
                missing_values: 0,
                type_of_statistical_processing: validity
                    .statistical_process_on_duration
                    .or(generic.type_of_statistical_processing)
                    .unwrap_or(DEFAULT_STATISTICAL_PROCESS),
                type_of_time_increment: 2,
                length,
                increment: Duration::zero(),
            });
            for (k, level) in levels.iter().enumerate() {
                let product = ProductDefinition {
                    parameter_category: generic.parameter_category,
                    parameter_number: generic.parameter_number,
                    type_of_generating_process: geo
                        .processtype
                        .and_then(|p| u8::try_from(p).ok())
                        .unwrap_or(config.type_of_generating_process),
                    background_process: 255,
                    generating_process_identifier: config.generating_process_identifier,
                    forecast_time: validity.term - cumulation.unwrap_or_else(Duration::zero),
                    first_surface: FixedSurface::from_value(
                        type_of_surface as u8,
                        level_to_grib(type_of_surface, *level),
                    ),
                    second_surface: FixedSurface::missing(),
                    statistics: statistics.clone(),
                    vertical_coordinates: vertical_coordinates.clone(),
                };
                let offset = (t * levels.len() + k) * level_size;
                let values = &geo.values()[offset..offset + level_size];
                messages.push(Grib2Message::from_values(
                    generic.discipline,
                    identification.clone(),
                    grid.clone(),
                    product,
                    values,
                    config.bits_per_value,
                    0,
                )?);
            }
        }
        Ok(messages)
    }
}

impl FormatResource for GribResource {
    fn format(&self) -> Format {
        Format::Grib
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn openmode(&self) -> OpenMode {
        self.mode
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn listfields(&self) -> Result<Vec<FormatFid>> {
        let mut fids: Vec<FormatFid> = Vec::new();
        for m in &self.messages {
            let fid = FormatFid::Keys(message_keys(m));
            if !fids.contains(&fid) {
                fids.push(fid);
            }
        }
        Ok(fids)
    }

    fn field_type(&self, _fid: &FormatFid) -> FieldType {
        FieldType::H2D
    }

    fn generic_fid(&self, fid: &FormatFid) -> Option<GenericFid> {
        GenericFid::from_keys(fid.as_keys()?)
    }

    /// Key patterns are JSON objects (`{"shortName":"t","level":850}`);
    /// other patterns match the short name, the name or the key text.
    fn matches(&self, pattern: &Glob, fid: &FormatFid) -> bool {
        let Some(keys) = fid.as_keys() else {
            return pattern.matches(&fid.to_string());
        };
        if pattern.as_str().starts_with('{') {
            return serde_json::from_str::<BTreeMap<String, Value>>(pattern.as_str())
                .is_ok_and(|request| keys_match(&request, keys));
        }
        ["shortName", "name"]
            .iter()
            .filter_map(|k| keys.get(*k).and_then(Value::as_str))
            .any(|n| pattern.matches(n))
            || pattern.matches(&fid.to_string())
    }

    fn readfield(&mut self, fid: &FormatFid) -> Result<Field> {
        if !self.mode.readable() {
            return Err(ResourceError::usage(format!(
                "cannot read fields from {} opened in write mode",
                self.path.display()
            )));
        }
        let request = fid
            .as_keys()
            .ok_or_else(|| ResourceError::usage(format!("'{}' is not a GRIB key map", fid)))?;
        let mut found = self.matching(request);
        found.sort_by_key(|m| validity_of(m).get());
        let Some(first) = found.first().copied() else {
            return Err(ResourceError::not_found(format!("{} in {}", fid, self.path.display())));
        };
        let keys = message_keys(first);
        if found.iter().any(|m| message_keys(m) != keys) {
            return Err(ResourceError::usage(format!(
                "'{}' matches several different fields in {}",
                fid,
                self.path.display()
            )));
        }

        let (horizontal, flip) = decode_geometry(&first.grid)?;
        let geometry = horizontal.with_vcoordinate(vcoordinate_of(&first.product)?);
        let (x, y) = (geometry.dimensions.x, geometry.dimensions.y);
        let mut values = Vec::with_capacity(found.len() * geometry.packed_size());
        let mut validities = Vec::with_capacity(found.len());
        for m in &found {
            if decode_geometry(&m.grid)?.0 != horizontal {
                return Err(ResourceError::usage(format!("'{}' spans several grids", fid)));
            }
            let mut v = m.values()?;
            if flip {
                flip_rows(&mut v, x, y);
            }
            values.extend(v);
            validities.push(validity_of(m).with_multi(found.len() > 1));
        }
        let processtype = first.product.type_of_generating_process as i64;
        let generic = message_generic(first);
        let id = FieldId::new(Format::Grib.as_str(), FormatFid::Keys(keys)).with_generic(generic);
        let geo = GeoField::new(id, geometry, FieldValidityList::from_vec(validities)?, values)?
            .with_processtype(processtype);
        debug!(field = %fid, validities = geo.validity.len(), flip, "Read GRIB2 field");
        Ok(Field::H2D(geo))
    }

    fn writefield(&mut self, field: &Field) -> Result<()> {
        if !self.mode.writable() || !self.open {
            return Err(ResourceError::usage(format!(
                "cannot write fields in {} opened in {} mode",
                self.path.display(),
                self.mode.as_str()
            )));
        }
        let geo = match field {
            Field::H2D(geo) | Field::D3(geo) => geo,
            Field::Misc(_) | Field::Vector(_) => {
                return Err(ResourceError::unsupported(format!(
                    "'{}': GRIB2 holds gridded scalar fields only",
                    field.fid().display_name()
                )));
            }
        };
        if geo.is_spectral() {
            return Err(ResourceError::unsupported("spectral fields in GRIB2"));
        }
        let generic = write_generic(&geo.fid)?;
        let messages = self.messages_of(geo, &generic)?;
        let existing = messages
            .iter()
            .filter(|m| self.messages.iter().any(|o| message_keys(o) == message_keys(m) && validity_of(o) == validity_of(m)))
            .count();
        if existing > 0 {
            info!(field = %geo.fid.display_name(), messages = existing, "Appending messages already present");
        }
        let mut writer = Grib2Writer::open(&self.path, true)?;
        for m in &messages {
            writer.write(m)?;
        }
        writer.flush()?;
        if self.geometry.is_none() {
            self.geometry = Some(geo.geometry.clone());
        }
        debug!(field = %geo.fid.display_name(), messages = messages.len(), "Wrote GRIB2 field");
        self.messages.extend(messages);
        Ok(())
    }

    fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    fn validity(&self) -> Option<&FieldValidityList> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_match_numbers() {
        let keys: BTreeMap<String, Value> =
            serde_json::from_str(r#"{"shortName":"t","level":850,"discipline":0}"#).unwrap();
        let request: BTreeMap<String, Value> = serde_json::from_str(r#"{"level":850.0}"#).unwrap();
        assert!(keys_match(&request, &keys));
        let request: BTreeMap<String, Value> = serde_json::from_str(r#"{"shortName":"u"}"#).unwrap();
        assert!(!keys_match(&request, &keys));
    }

    #[test]
    fn test_isobaric_levels_in_pa() {
        assert_eq!(level_to_grib(surface::ISOBARIC, 850.0), 85000.0);
        assert_eq!(level_from_grib(surface::ISOBARIC, 50000.0), 500.0);
        assert_eq!(level_to_grib(surface::HEIGHT, 2.0), 2.0);
    }

    #[test]
    fn test_write_generic_from_short_name() {
        let mut keys = BTreeMap::new();
        keys.insert("shortName".to_string(), Value::from("u"));
        let fid = FieldId::new("GRIB", FormatFid::Keys(keys));
        let g = write_generic(&fid).unwrap();
        assert_eq!((g.discipline, g.parameter_category, g.parameter_number), (0, 2, 2));
        assert!(write_generic(&FieldId::named("FA", "SURFTEMPERATURE")).is_err());
    }
}
