//! Subdomain extraction with vertical-coordinate conversion.
//!
//! The fields matching a pseudoname (`S*TEMPERATURE`) are stacked into one
//! multi-level field on their prevailing level type, interpolated on the
//! target geometry and, on request, given another vertical coordinate:
//!
//! | from                | to                    | auxiliaries                                  |
//! |---------------------|-----------------------|----------------------------------------------|
//! | hybrid pressure 119 | pressure 100          | `SURFPRESSION` (ln Ps)                       |
//! | hybrid pressure 119 | altitude 102 / height 103 | + temperature, humidity, hydrometeors, Phi_s |
//! | pressure 100        | altitude 102 / height 103 | temperature, humidity, hydrometeors, Phi_s   |
//! | hybrid height 118   | altitude 102 / height 103 | `ZS`                                         |
//! | hybrid height 118   | pressure 100          | `PABSM` or `PABST`                           |
//!
//! Converted levels vary horizontally: a target with several points gets
//! per-point levels, with their horizontal mean as its nominal levels.

use std::collections::BTreeMap;
use tracing::debug;

use field::{ExternalDistance, FieldId, FormatFid, GeoField};
use geometry::vertical::{self, VerticalMean};
use geometry::{with_vcoordinate, Geometry, HybridCoefficients, InterpolationMethod, VCoordinate};
use meteo_common::constants::surface;
use meteo_common::EngineConfig;

use crate::error::{ResourceError, Result};
use crate::field_dict::FieldType;
use crate::resource::{FormatResource, Seed};

/// Options of profile, section and subdomain extraction.
#[derive(Debug, Clone)]
pub struct ExtractOptions<'a> {
    /// Type of surface (GRIB2 code table 4.5) of the requested vertical coordinate.
    pub vertical_coordinate: Option<u16>,
    /// Horizontal interpolation; nearest for profiles and linear otherwise when unset.
    pub interpolation: Option<InterpolationMethod>,
    /// Compute heights without hydrometeors nor non-hydrostatic pressure departure.
    pub cheap_height: bool,
    /// Pick among neighbouring gridpoints the one whose value in another
    /// field is closest to a target (nearest interpolation only).
    pub external_distance: Option<ExternalDistance<'a>>,
}

impl Default for ExtractOptions<'_> {
    fn default() -> Self {
        Self {
            vertical_coordinate: None,
            interpolation: None,
            cheap_height: true,
            external_distance: None,
        }
    }
}

impl<'a> ExtractOptions<'a> {
    pub fn with_vertical_coordinate(mut self, typeoffirstfixedsurface: u16) -> Self {
        self.vertical_coordinate = Some(typeoffirstfixedsurface);
        self
    }

    pub fn with_interpolation(mut self, method: InterpolationMethod) -> Self {
        self.interpolation = Some(method);
        self
    }

    pub fn with_cheap_height(mut self, cheap_height: bool) -> Self {
        self.cheap_height = cheap_height;
        self
    }

    pub fn with_external_distance(mut self, external_distance: ExternalDistance<'a>) -> Self {
        self.external_distance = Some(external_distance);
        self
    }

    pub fn interpolation_or(&self, default: InterpolationMethod) -> InterpolationMethod {
        self.interpolation.unwrap_or(default)
    }
}

/// Auxiliary profiles of height computations, in reading order.
const SIDE_PROFILES: [(&str, &str); 8] = [
    ("t", "*TEMPERATURE"),
    ("q", "*HUMI.SPECIFI"),
    ("qs", "*SNOW"),
    ("qr", "*RAIN"),
    ("ql", "*CLOUD_WATER"),
    ("qi", "*ICE_CRYSTAL"),
    ("qg", "*GRAUPEL"),
    ("pdep", "*PRESS.DEPART"),
];

/// Horizontal sampling shared by every field of one extraction.
struct Sampling<'g, 'a> {
    target: &'g Geometry,
    lons: Vec<f64>,
    lats: Vec<f64>,
    method: InterpolationMethod,
    external_distance: Option<ExternalDistance<'a>>,
}

impl Sampling<'_, '_> {
    /// Values of the first slice of `field` at the target points.
    fn surface_values(&self, field: &GeoField) -> Result<Vec<f64>> {
        let rows = field.getvalue_ll(&self.lons, &self.lats, self.method, self.external_distance)?;
        rows.into_iter()
            .next()
            .ok_or_else(|| ResourceError::usage(format!("field '{}' holds no data", field.fid)))
    }
}

/// See [`FormatResource::extract_subdomain`].
pub(crate) fn extract_subdomain<R: FormatResource + ?Sized>(
    resource: &mut R,
    pseudoname: &str,
    target: &Geometry,
    options: &ExtractOptions<'_>,
) -> Result<GeoField> {
    let (lons, lats) = target.get_lonlat_grid(None)?;
    let sampling = Sampling {
        target,
        lons,
        lats,
        method: options.interpolation_or(InterpolationMethod::Linear),
        external_distance: options.external_distance,
    };
    let mut subdomain = extract_stacked(resource, pseudoname, &sampling)?;

    let source = subdomain.geometry.vcoordinate.typeoffirstfixedsurface;
    let Some(requested) = options.vertical_coordinate.filter(|t| *t != source) else {
        return Ok(subdomain);
    };
    let per_point = convert_levels(resource, pseudoname, &subdomain, requested, &sampling, options)?;
    let npoints = per_point.len();
    let base = VCoordinate {
        typeoffirstfixedsurface: requested,
        grid: None,
        ..subdomain.geometry.vcoordinate.clone()
    };
    let vcoordinate = match per_point.as_slice() {
        [column] => base.with_levels(column.clone()),
        _ => base.with_column_levels(transpose(&per_point)?, npoints)?,
    };
    debug!(
        pseudoname = pseudoname,
        from = source,
        to = requested,
        levels = vcoordinate.levels.len(),
        points = npoints,
        "Converted vertical coordinate"
    );
    subdomain.geometry = with_vcoordinate(&subdomain.geometry, vcoordinate);
    Ok(subdomain)
}

// ============================================================================
// Stacking
// ============================================================================

/// Read the matching fields of the prevailing level type, stack and interpolate them.
fn extract_stacked<R: FormatResource + ?Sized>(
    resource: &mut R,
    pseudoname: &str,
    sampling: &Sampling<'_, '_>,
) -> Result<GeoField> {
    let fids = resource.find_fields_in_resource(&Seed::from(pseudoname), &[FieldType::H2D, FieldType::D3])?;
    let mut fields = Vec::with_capacity(fids.len());
    for fid in &fids {
        let mut field = resource.readfield(fid)?.into_geo()?;
        field.sp2gp()?;
        fields.push(field);
    }

    let leveltype = prevailing_level_type(&fields)?;
    fields.retain(|f| f.geometry.vcoordinate.typeoffirstfixedsurface == leveltype);
    let id = FieldId::named(resource.format().as_str(), pseudoname);
    let field3d = stack_levels(id, fields)?;

    match sampling.external_distance {
        None => Ok(field3d.extract_subdomain(sampling.target, sampling.method, true)?),
        Some(external) => {
            let rows = field3d.getvalue_ll(&sampling.lons, &sampling.lats, sampling.method, Some(external))?;
            let geometry = with_vcoordinate(sampling.target, field3d.geometry.vcoordinate.clone());
            let mut out = GeoField::new(field3d.fid.clone(), geometry, field3d.validity.clone(), rows.concat())?;
            out.processtype = field3d.processtype;
            out.exclude_extralevels()?;
            Ok(out)
        }
    }
}

/// Level type shared by most fields; several tied types are an error.
fn prevailing_level_type(fields: &[GeoField]) -> Result<u16> {
    let mut counts: BTreeMap<u16, usize> = BTreeMap::new();
    for f in fields {
        *counts.entry(f.geometry.vcoordinate.typeoffirstfixedsurface).or_default() += 1;
    }
    let max = counts.values().copied().max().unwrap_or(0);
    let winners: Vec<u16> = counts
        .iter()
        .filter(|(_, n)| **n == max)
        .map(|(t, _)| *t)
        .collect();
    match winners.as_slice() {
        [t] => Ok(*t),
        _ => Err(ResourceError::AmbiguousLevelType(format!("{:?}", winners))),
    }
}

/// One field with the levels of all `fields`, sorted by level.
fn stack_levels(fid: FieldId, mut fields: Vec<GeoField>) -> Result<GeoField> {
    if fields.len() == 1 {
        let mut only = fields.remove(0);
        only.fid = fid;
        return Ok(only);
    }
    fields.sort_by(|a, b| first_level(a).total_cmp(&first_level(b)));
    let first = fields
        .first()
        .ok_or_else(|| ResourceError::not_found(format!("no field to stack for '{}'", fid)))?;
    let nvalidities = first.validity.len();
    for f in &fields[1..] {
        if !f.geometry.same_horizontal_grid(&first.geometry) || f.validity.len() != nvalidities {
            return Err(ResourceError::usage(format!(
                "'{}' and '{}' cannot be stacked: different grids or validities",
                first.fid, f.fid
            )));
        }
    }

    let levels: Vec<f64> = fields
        .iter()
        .flat_map(|f| f.geometry.vcoordinate.levels.iter().copied())
        .collect();
    let mut values = Vec::with_capacity(nvalidities * levels.len() * first.geometry.packed_size());
    for t in 0..nvalidities {
        for f in &fields {
            for k in 0..f.levels_number() {
                values.extend_from_slice(f.level(t, k)?);
            }
        }
    }
    let vcoordinate = first.geometry.vcoordinate.clone().with_levels(levels);
    let geometry = with_vcoordinate(&first.geometry, vcoordinate);
    let mut stacked = GeoField::new(fid, geometry, first.validity.clone(), values)?;
    stacked.processtype = first.processtype;
    Ok(stacked)
}

fn first_level(field: &GeoField) -> f64 {
    field.geometry.vcoordinate.levels.first().copied().unwrap_or(0.0)
}

// ============================================================================
// Vertical conversion
// ============================================================================

/// Levels of each target point in the `requested` vertical coordinate, `[point][level]`.
fn convert_levels<R: FormatResource + ?Sized>(
    resource: &mut R,
    pseudoname: &str,
    subdomain: &GeoField,
    requested: u16,
    sampling: &Sampling<'_, '_>,
    options: &ExtractOptions<'_>,
) -> Result<Vec<Vec<f64>>> {
    let vcoord = &subdomain.geometry.vcoordinate;
    let physics = &EngineConfig::global().physics;
    let mean = if has_field(resource, "S001PRESS.DEPART")? {
        VerticalMean::Geometric
    } else {
        VerticalMean::Arithmetic
    };
    let npoints = sampling.lons.len();

    match (vcoord.typeoffirstfixedsurface, requested) {
        (surface::HYBRID_PRESSURE, surface::ISOBARIC) => {
            let table = hybrid_table(vcoord)?;
            let ps = surface_pressure(resource, sampling)?;
            (0..npoints)
                .map(|p| {
                    let pressure = vertical::hybridp_to_pressure(table, ps[p], mean)?;
                    select_levels(&pressure, &vcoord.levels)
                        .map(|levels| levels.iter().map(|pa| pa / 100.0).collect())
                })
                .collect::<Result<Vec<Vec<f64>>>>()
        }
        (surface::HYBRID_PRESSURE, surface::ALTITUDE | surface::HEIGHT) => {
            let table = hybrid_table(vcoord)?;
            let nlev = table.len().saturating_sub(1);
            let ps = surface_pressure(resource, sampling)?;
            let phis = surface_geopotential(resource, requested, sampling)?;
            let side = side_profiles(resource, pseudoname, subdomain, sampling, options.cheap_height)?;
            (0..npoints)
                .map(|p| {
                    let column = |name: &str| side.full_column(name, p, nlev);
                    let t = column("t")?;
                    let r = gas_constants(physics, &side, p, nlev)?;
                    let pdep = if side.has("pdep") { Some(column("pdep")?) } else { None };
                    let altitude = vertical::hybridp_to_altitude(
                        table,
                        ps[p],
                        phis[p],
                        &t,
                        &r,
                        pdep.as_deref(),
                        mean,
                        physics,
                    )?;
                    select_levels(&altitude, &vcoord.levels)
                })
                .collect::<Result<Vec<Vec<f64>>>>()
        }
        (surface::ISOBARIC, surface::ALTITUDE | surface::HEIGHT) => {
            let phis = surface_geopotential(resource, requested, sampling)?;
            let side = side_profiles(resource, pseudoname, subdomain, sampling, options.cheap_height)?;
            let pressure: Vec<f64> = vcoord.levels.iter().map(|hpa| hpa * 100.0).collect();
            (0..npoints)
                .map(|p| {
                    let t = side.matching_column("t", p, &vcoord.levels)?;
                    let q = side.matching_column("q", p, &vcoord.levels)?;
                    let condensates = side.condensates_matching(p, &vcoord.levels)?;
                    let r: Vec<f64> = q
                        .iter()
                        .enumerate()
                        .map(|(k, q)| vertical::moist_gas_constant(physics, *q, &condensates[k]))
                        .collect();
                    let pdep = if side.has("pdep") {
                        Some(side.matching_column("pdep", p, &vcoord.levels)?)
                    } else {
                        None
                    };
                    Ok(vertical::pressure_to_altitude(
                        &pressure,
                        &t,
                        &r,
                        pdep.as_deref(),
                        phis[p],
                        mean,
                        physics,
                    )?)
                })
                .collect::<Result<Vec<Vec<f64>>>>()
        }
        (surface::HYBRID_HEIGHT, surface::ALTITUDE | surface::HEIGHT) => {
            let table = hybrid_table(vcoord)?;
            let mass = vertical::hybridh_mass_coefficients(table)?;
            let zs_fid = named_fid(resource, "ZS")?
                .ok_or_else(|| ResourceError::missing_auxiliary("ZS", "compute altitudes of hybrid-height levels"))?;
            let mut zs_field = resource.readfield(&zs_fid)?.into_geo()?;
            zs_field.sp2gp()?;
            let zs = sampling.surface_values(&zs_field)?;
            (0..npoints)
                .map(|p| {
                    let altitude = vertical::hybridh_to_altitude(&mass, &vcoord.levels, zs[p])?;
                    Ok(if requested == surface::HEIGHT {
                        vertical::altitude_to_height(&altitude, zs[p])
                    } else {
                        altitude
                    })
                })
                .collect::<Result<Vec<Vec<f64>>>>()
        }
        (surface::HYBRID_HEIGHT, surface::ISOBARIC) => {
            let name = if has_field(resource, "PABSM")? {
                "PABSM"
            } else if has_field(resource, "PABST")? {
                "PABST"
            } else {
                return Err(ResourceError::missing_auxiliary(
                    "PABSM",
                    "compute pressures of hybrid-height levels",
                ));
            };
            let pressure = extract_stacked(resource, name, sampling)?;
            (0..npoints)
                .map(|p| {
                    (0..pressure.levels_number())
                        .map(|k| Ok(pressure.level(0, k)?[p] / 100.0))
                        .collect::<Result<Vec<f64>>>()
                })
                .collect()
        }
        (from, to) => Err(ResourceError::unsupported(format!(
            "vertical coordinate conversion from {} to {}",
            from, to
        ))),
    }
}

fn hybrid_table(vcoord: &VCoordinate) -> Result<&HybridCoefficients> {
    vcoord.grid.as_ref().ok_or_else(|| {
        ResourceError::usage(format!(
            "vertical coordinate {} has no hybrid coefficients",
            vcoord.typeoffirstfixedsurface
        ))
    })
}

/// Entries of a table over levels `1..=n` at the given level numbers.
fn select_levels(table: &[f64], levels: &[f64]) -> Result<Vec<f64>> {
    levels
        .iter()
        .map(|l| {
            (*l as usize)
                .checked_sub(1)
                .and_then(|k| table.get(k))
                .copied()
                .ok_or_else(|| ResourceError::usage(format!("level {} outside hybrid table", l)))
        })
        .collect()
}

/// `[point][level]` to `[level][point]`.
fn transpose(per_point: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let nlev = per_point.first().map_or(0, Vec::len);
    if per_point.iter().any(|column| column.len() != nlev) {
        return Err(ResourceError::usage("converted columns differ in number of levels"));
    }
    Ok((0..nlev)
        .map(|k| per_point.iter().map(|column| column[k]).collect())
        .collect())
}

fn named_fid<R: FormatResource + ?Sized>(resource: &R, name: &str) -> Result<Option<FormatFid>> {
    Ok(resource
        .listfields()?
        .into_iter()
        .find(|fid| fid.as_name() == Some(name)))
}

fn has_field<R: FormatResource + ?Sized>(resource: &R, name: &str) -> Result<bool> {
    Ok(named_fid(resource, name)?.is_some())
}

/// Surface pressure (Pa) at the target points, from `SURFPRESSION` stored as ln(Ps).
fn surface_pressure<R: FormatResource + ?Sized>(resource: &mut R, sampling: &Sampling<'_, '_>) -> Result<Vec<f64>> {
    let fid = named_fid(resource, "SURFPRESSION")?
        .ok_or_else(|| ResourceError::missing_auxiliary("SURFPRESSION", "compute hybrid-pressure levels"))?;
    let mut field = resource.readfield(&fid)?.into_geo()?;
    field.sp2gp()?;
    Ok(sampling.surface_values(&field)?.into_iter().map(f64::exp).collect())
}

/// Surface geopotential at the target points; zero for heights.
fn surface_geopotential<R: FormatResource + ?Sized>(
    resource: &mut R,
    requested: u16,
    sampling: &Sampling<'_, '_>,
) -> Result<Vec<f64>> {
    if requested != surface::ALTITUDE {
        return Ok(vec![0.0; sampling.lons.len()]);
    }
    let fid = match named_fid(resource, "SPECSURFGEOPOTEN")? {
        Some(fid) => fid,
        None => named_fid(resource, "SURFGEOPOTENTIEL")?.ok_or_else(|| {
            ResourceError::missing_auxiliary("SURFGEOPOTENTIEL", "compute altitudes")
        })?,
    };
    let mut field = resource.readfield(&fid)?.into_geo()?;
    field.sp2gp()?;
    sampling.surface_values(&field)
}

// ============================================================================
// Auxiliary profiles
// ============================================================================

/// Auxiliary subdomains by short name; absent optional ones count as zero.
struct SideProfiles {
    profiles: BTreeMap<&'static str, GeoField>,
}

impl SideProfiles {
    fn has(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Column of point `p` over levels `1..=nlev`, zero where absent.
    fn full_column(&self, name: &str, p: usize, nlev: usize) -> Result<Vec<f64>> {
        let mut column = vec![0.0; nlev];
        let Some(profile) = self.profiles.get(name) else {
            return Ok(column);
        };
        let mut covered = 0;
        for (k, level) in profile.geometry.vcoordinate.levels.iter().enumerate() {
            if let Some(slot) = (*level as usize).checked_sub(1).and_then(|i| column.get_mut(i)) {
                *slot = profile.level(0, k)?[p];
                covered += 1;
            }
        }
        if covered < nlev {
            return Err(ResourceError::usage(format!(
                "'{}' covers {} of the {} hybrid levels",
                profile.fid, covered, nlev
            )));
        }
        Ok(column)
    }

    /// Column of point `p` on the given levels, zero where absent.
    fn matching_column(&self, name: &str, p: usize, levels: &[f64]) -> Result<Vec<f64>> {
        let Some(profile) = self.profiles.get(name) else {
            return Ok(vec![0.0; levels.len()]);
        };
        let own = &profile.geometry.vcoordinate.levels;
        levels
            .iter()
            .map(|level| {
                let k = own
                    .iter()
                    .position(|l| (l - level).abs() < 1e-9)
                    .ok_or_else(|| ResourceError::usage(format!("'{}' has no level {}", profile.fid, level)))?;
                Ok(profile.level(0, k)?[p])
            })
            .collect()
    }

    /// Hydrometeor contents of point `p`, per level.
    fn condensates_matching(&self, p: usize, levels: &[f64]) -> Result<Vec<Vec<f64>>> {
        let columns = HYDROMETEORS
            .iter()
            .map(|name| self.matching_column(name, p, levels))
            .collect::<Result<Vec<_>>>()?;
        Ok((0..levels.len())
            .map(|k| columns.iter().map(|c| c[k]).collect())
            .collect())
    }
}

const HYDROMETEORS: [&str; 5] = ["ql", "qi", "qr", "qs", "qg"];

/// Moist gas constant of point `p` on levels `1..=nlev`.
fn gas_constants(
    physics: &meteo_common::config::PhysicsConfig,
    side: &SideProfiles,
    p: usize,
    nlev: usize,
) -> Result<Vec<f64>> {
    let q = side.full_column("q", p, nlev)?;
    let condensates = HYDROMETEORS
        .iter()
        .map(|name| side.full_column(name, p, nlev))
        .collect::<Result<Vec<_>>>()?;
    Ok((0..nlev)
        .map(|k| {
            let c: Vec<f64> = condensates.iter().map(|col| col[k]).collect();
            vertical::moist_gas_constant(physics, q[k], &c)
        })
        .collect())
}

/// Seed of an auxiliary profile on the level kind of `pseudoname` (`P*` for `P*TEMPERATURE`).
fn side_seed(pseudoname: &str, generic_seed: &str) -> String {
    let kind = pseudoname.split_once('*').map_or("", |(kind, _)| kind);
    format!("{}{}", kind, generic_seed)
}

/// Temperature, humidity and the optional profiles on the target points.
///
/// `cheap_height` skips everything but temperature and humidity.
fn side_profiles<R: FormatResource + ?Sized>(
    resource: &mut R,
    pseudoname: &str,
    subdomain: &GeoField,
    sampling: &Sampling<'_, '_>,
    cheap_height: bool,
) -> Result<SideProfiles> {
    let mut profiles = BTreeMap::new();
    for (short, generic_seed) in SIDE_PROFILES {
        let seed = side_seed(pseudoname, generic_seed);
        let mandatory = matches!(short, "t" | "q");
        if pseudoname == seed {
            profiles.insert(short, subdomain.clone());
            continue;
        }
        if cheap_height && !mandatory {
            continue;
        }
        match extract_stacked(resource, &seed, sampling) {
            Ok(profile) => {
                profiles.insert(short, profile);
            }
            Err(ResourceError::NotFound(_)) if !mandatory => {
                debug!(seed = %seed, "Optional profile absent, taken as zero");
            }
            Err(ResourceError::NotFound(_)) => {
                return Err(ResourceError::missing_auxiliary(&seed, "compute heights"));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(SideProfiles { profiles })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_levels() {
        let table = [10.0, 20.0, 30.0];
        assert_eq!(select_levels(&table, &[1.0, 3.0]).unwrap(), vec![10.0, 30.0]);
        assert!(select_levels(&table, &[0.0]).is_err());
        assert!(select_levels(&table, &[4.0]).is_err());
    }

    #[test]
    fn test_transpose() {
        let levels = transpose(&[vec![1.0, 10.0], vec![3.0, 20.0]]).unwrap();
        assert_eq!(levels, vec![vec![1.0, 3.0], vec![10.0, 20.0]]);
        assert!(transpose(&[]).unwrap().is_empty());
        assert!(transpose(&[vec![1.0], vec![]]).is_err());
    }

    #[test]
    fn test_side_seed_keeps_level_kind() {
        assert_eq!(side_seed("P*TEMPERATURE", "*HUMI.SPECIFI"), "P*HUMI.SPECIFI");
        assert_eq!(side_seed("*TEMPERATURE", "*PRESS.DEPART"), "*PRESS.DEPART");
    }

    #[test]
    fn test_default_options() {
        let options = ExtractOptions::default();
        assert!(options.cheap_height);
        assert_eq!(options.interpolation_or(InterpolationMethod::Linear), InterpolationMethod::Linear);
        let options = options.with_interpolation(InterpolationMethod::Cubic);
        assert_eq!(options.interpolation_or(InterpolationMethod::Linear), InterpolationMethod::Cubic);
    }
}
