//! Meso-NH conventions shared by the LFI and netCDF-MNH drivers.
//!
//! Meso-NH files describe their grid with a set of header variables
//! (`IMAX`, `JMAX`, `XHAT`, `ZHAT`, `RPK`...) and tag every field with a
//! grid indicator telling where its points sit in the C-grid cell.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Utc};

use field::MiscValue;
use geometry::{
    Dimensions, Geoid, Geometry, GeometryName, GridPosition, HybridCoefficients, LamZones,
    ProjectionParams, RectangularGrid, Secant, Subzone, VCoordinate, VPosition,
};
use meteo_common::constants::surface;
use meteo_common::EngineConfig;

use crate::error::{ResourceError, Result};

const EPSILON: f64 = 1e-10;

/// Grid indicator codes: horizontal and vertical position of the points.
pub const GRID_INDICATORS: [(GridPosition, VPosition); 9] = [
    (GridPosition::Unknown, VPosition::Unknown),
    (GridPosition::Center, VPosition::Mass),
    (GridPosition::CenterLeft, VPosition::Mass),
    (GridPosition::LowerCenter, VPosition::Mass),
    (GridPosition::Center, VPosition::Flux),
    (GridPosition::LowerLeft, VPosition::Mass),
    (GridPosition::CenterLeft, VPosition::Flux),
    (GridPosition::LowerCenter, VPosition::Flux),
    (GridPosition::LowerLeft, VPosition::Flux),
];

/// Positions of a grid indicator; unknown codes give unknown positions.
pub fn grid_indicator(code: i64) -> (GridPosition, VPosition) {
    usize::try_from(code)
        .ok()
        .and_then(|k| GRID_INDICATORS.get(k).copied())
        .unwrap_or(GRID_INDICATORS[0])
}

pub fn grid_indicator_code(horizontal: GridPosition, vertical: VPosition) -> i64 {
    GRID_INDICATORS
        .iter()
        .position(|p| *p == (horizontal, vertical))
        .unwrap_or(0) as i64
}

/// `RPK` of a Lambert projection secant at `latin1` and `latin2` (degrees).
pub fn lambert_rpk(latin1: f64, latin2: f64) -> f64 {
    projection::lambert::cone_constant(latin1, latin2)
}

/// Secant latitudes of a Lambert projection from its first latitude and cone constant.
pub fn secant_latitudes(lat0: f64, rpk: f64) -> Result<(f64, f64)> {
    projection::lambert::secant_latitudes_from_cone(lat0, rpk)
        .map_err(|e| ResourceError::usage(format!("Meso-NH Lambert header: {}", e)))
}

/// Date stored as `[year, month, day]` plus seconds in the day.
pub fn date_parts(date: DateTime<Utc>) -> (Vec<i64>, f64) {
    (
        vec![date.year() as i64, date.month() as i64, date.day() as i64],
        date.num_seconds_from_midnight() as f64,
    )
}

pub fn date_from_parts(tdate: &[f64], time: f64) -> Result<DateTime<Utc>> {
    let [y, m, d] = match tdate {
        [y, m, d, ..] => [*y, *m, *d],
        _ => return Err(ResourceError::usage(format!("invalid Meso-NH date {:?}", tdate))),
    };
    let day = Utc
        .with_ymd_and_hms(y as i32, m as u32, d as u32, 0, 0, 0)
        .single()
        .ok_or_else(|| ResourceError::usage(format!("invalid Meso-NH date {}-{}-{}", y, m, d)))?;
    Ok(day + Duration::milliseconds((time * 1000.0).round() as i64))
}

// ============================================================================
// Header
// ============================================================================

/// Geometry variables of a Meso-NH file.
#[derive(Debug, Clone, PartialEq)]
pub struct MesoNhHeader {
    pub cartesian: bool,
    pub imax: usize,
    pub jmax: usize,
    /// `KMAX`, 0 for 2D files.
    pub kmax: usize,
    pub xhat: Vec<f64>,
    pub yhat: Vec<f64>,
    pub zhat: Vec<f64>,
    pub lat0: f64,
    pub lon0: f64,
    pub lat_origin: f64,
    pub lon_origin: f64,
    pub rpk: f64,
    pub beta: f64,
    pub sleve: bool,
}

impl MesoNhHeader {
    /// Header from a variable reader returning the values of a variable, if present.
    pub fn read(mut get: impl FnMut(&str) -> Result<Option<Vec<f64>>>) -> Result<Self> {
        let mut require = |name: &str| -> Result<Vec<f64>> {
            get(name)?.ok_or_else(|| ResourceError::missing_auxiliary(name, "build the Meso-NH geometry"))
        };
        let first = |v: Vec<f64>| v.first().copied().unwrap_or(0.0);

        let cartesian = require("CARTESIAN").map(|v| first(v) != 0.0).unwrap_or(false);
        let imax = first(require("IMAX")?) as usize;
        let jmax = first(require("JMAX")?) as usize;
        let xhat = require("XHAT")?;
        let yhat = require("YHAT")?;
        let kmax = require("KMAX").map(|v| first(v) as usize).unwrap_or(0);
        let zhat = if kmax > 1 { require("ZHAT")? } else { Vec::new() };
        let sleve = require("SLEVE").map(|v| first(v) != 0.0).unwrap_or(false);
        let lat0 = require("LAT0").map(first).unwrap_or(0.0);
        let lon0 = require("LON0").map(first).unwrap_or(0.0);

        let (lat_origin, lon_origin, rpk, beta) = if cartesian {
            (0.0, 0.0, 0.0, 0.0)
        } else {
            let lat = require("LATORI").or_else(|_| require("LATOR"))?;
            let lon = require("LONORI").or_else(|_| require("LONOR"))?;
            (first(lat), first(lon), first(require("RPK")?), first(require("BETA")?))
        };
        Ok(Self {
            cartesian,
            imax,
            jmax,
            kmax,
            xhat,
            yhat,
            zhat,
            lat0,
            lon0,
            lat_origin,
            lon_origin,
            rpk,
            beta,
            sleve,
        })
    }

    fn resolution(hat: &[f64], axis: &str) -> Result<f64> {
        match hat {
            [a, b, ..] => Ok(b - a),
            _ => Err(ResourceError::usage(format!("{}HAT holds fewer than 2 values", axis))),
        }
    }

    /// 3D geometry: C+I zone of `IMAX x JMAX` points inside a one-point extension.
    pub fn geometry(&self) -> Result<Geometry> {
        let x = self.imax + 2;
        let y = if self.cartesian && self.jmax == 1 {
            1
        } else {
            self.jmax + 2
        };
        let zones = LamZones {
            x_cizone: self.imax,
            y_cizone: self.jmax,
            x_czone: self.imax,
            y_czone: self.jmax,
            x_iwidth: 0,
            y_iwidth: 0,
            x_cioffset: 1,
            y_cioffset: if y == 1 { 0 } else { 1 },
        };
        let dimensions = Dimensions::lam(x, y, zones);
        let x_resolution = Self::resolution(&self.xhat, "X")?;
        let y_resolution = if self.yhat.len() >= 2 {
            Self::resolution(&self.yhat, "Y")?
        } else {
            x_resolution
        };

        let horizontal = if self.cartesian {
            let grid = RectangularGrid {
                x_resolution,
                y_resolution,
                input_lon: 0.0,
                input_lat: 0.0,
                input_position: (0.0, 0.0),
                lamzone: Some(Subzone::CIE),
            };
            Geometry::academic(dimensions, grid)?
        } else {
            let mut projection = ProjectionParams::tangent(self.lon0, self.lat0);
            projection.rotation = self.beta;
            if (self.rpk - self.lat0.to_radians().sin()).abs() > EPSILON {
                if self.rpk.abs() <= EPSILON || (self.rpk.abs() - 1.0).abs() <= EPSILON {
                    projection.reference_lat = 90f64.copysign(self.lat0);
                    projection.secant = Secant::One(self.lat0);
                } else {
                    let (latin1, latin2) = secant_latitudes(self.lat0, self.rpk)?;
                    projection.secant = Secant::Two(latin1, latin2);
                }
            }
            let name = if self.rpk.abs() <= EPSILON {
                GeometryName::Mercator
            } else if (1.0 - self.rpk.abs()).abs() <= EPSILON {
                GeometryName::PolarStereographic
            } else {
                GeometryName::Lambert
            };
            let grid = RectangularGrid {
                x_resolution,
                y_resolution,
                input_lon: self.lon_origin,
                input_lat: self.lat_origin,
                input_position: (0.0, 0.0),
                lamzone: Some(Subzone::CIE),
            };
            Geometry::projected(name, dimensions, grid, projection)?
        };

        let radius = EngineConfig::global().geoid_radius;
        Ok(horizontal
            .with_vcoordinate(self.vcoordinate()?)
            .with_geoid(Geoid::Sphere { radius })
            .with_position(GridPosition::Center))
    }

    /// Hybrid-height coordinate: `A = ZHAT[1..]`, `B = 1 - ZHAT[1..] / H`.
    fn vcoordinate(&self) -> Result<VCoordinate> {
        if self.kmax <= 1 || self.zhat.len() < 2 {
            return Ok(VCoordinate {
                typeoffirstfixedsurface: surface::UNKNOWN,
                position_on_grid: VPosition::Unknown,
                grid: None,
                levels: vec![255.0],
                column_levels: None,
            });
        }
        let top = self.zhat[self.zhat.len() - 1];
        let a: Vec<f64> = self.zhat[1..].to_vec();
        let b: Vec<f64> = a.iter().map(|z| 1.0 - z / top).collect();
        let nlev = a.len() + 1;
        Ok(VCoordinate {
            typeoffirstfixedsurface: if self.sleve {
                surface::UNKNOWN
            } else {
                surface::HYBRID_HEIGHT
            },
            position_on_grid: VPosition::Mass,
            grid: Some(HybridCoefficients::new(a, b, VPosition::Flux)?),
            levels: (0..nlev).map(|l| l as f64).collect(),
            column_levels: None,
        })
    }

    /// Number of levels of the 3D fields.
    pub fn levels_number(&self) -> usize {
        if self.kmax > 1 {
            self.zhat.len()
        } else {
            1
        }
    }

    /// Header describing `geometry`, for a new file.
    pub fn from_geometry(geometry: &Geometry) -> Result<Self> {
        let d = &geometry.dimensions;
        if d.x < 3 {
            return Err(ResourceError::usage(format!(
                "Meso-NH grids have at least 3 points along X, got {}",
                d.x
            )));
        }
        let grid = geometry.rectangular_grid()?;
        let hat = |resolution: f64, n: usize| -> Vec<f64> {
            let n = if n == 1 { 3 } else { n };
            (0..n).map(|k| -resolution / 2.0 + k as f64 * resolution).collect()
        };

        let vc = &geometry.vcoordinate;
        let (kmax, zhat, sleve) = match &vc.grid {
            Some(g) if g.len() >= 2
                && matches!(vc.typeoffirstfixedsurface, surface::HYBRID_HEIGHT | surface::UNKNOWN) =>
            {
                if g.ab_grid_position != VPosition::Flux {
                    return Err(ResourceError::unsupported(
                        "hybrid-height coefficients must be given on flux levels",
                    ));
                }
                let mut zhat = vec![-g.a[1]];
                zhat.extend(g.a.iter().copied());
                (g.a.len() - 1, zhat, vc.typeoffirstfixedsurface != surface::HYBRID_HEIGHT)
            }
            _ => (0, Vec::new(), false),
        };

        let mut header = Self {
            cartesian: geometry.name == GeometryName::Academic,
            imax: d.x - 2,
            jmax: if d.y == 1 { 1 } else { d.y.saturating_sub(2) },
            kmax,
            xhat: hat(grid.x_resolution, d.x),
            yhat: hat(grid.y_resolution, d.y),
            zhat,
            lat0: 0.0,
            lon0: 0.0,
            lat_origin: 0.0,
            lon_origin: 0.0,
            rpk: 0.0,
            beta: 0.0,
            sleve,
        };
        if let Some(p) = &geometry.projection {
            header.beta = p.rotation;
            header.lon0 = p.reference_lon;
            match p.secant {
                Secant::Tangent => {
                    header.lat0 = p.reference_lat;
                    header.rpk = p.reference_lat.to_radians().sin();
                }
                Secant::One(lat) => {
                    header.lat0 = lat;
                    header.rpk = if geometry.name == GeometryName::Mercator {
                        0.0
                    } else {
                        1f64.copysign(lat)
                    };
                }
                Secant::Two(latin1, latin2) => {
                    header.lat0 = latin1;
                    header.rpk = lambert_rpk(latin1, latin2);
                }
            }
            let (lon, lat) = if grid.input_position == (0.0, 0.0) {
                (grid.input_lon, grid.input_lat)
            } else {
                geometry.ij2ll(0.0, 0.0)?
            };
            header.lon_origin = lon;
            header.lat_origin = lat;
        }
        Ok(header)
    }

    /// Header variables as Misc values, in writing order.
    pub fn records(&self) -> Vec<(&'static str, MiscValue)> {
        let mut out = vec![
            ("IMAX", MiscValue::Int(self.imax as i64)),
            ("JMAX", MiscValue::Int(self.jmax as i64)),
            ("XHAT", MiscValue::FloatArray(self.xhat.clone())),
            ("YHAT", MiscValue::FloatArray(self.yhat.clone())),
            ("CARTESIAN", MiscValue::Bool(self.cartesian)),
            ("LAT0", MiscValue::Float(self.lat0)),
            ("LON0", MiscValue::Float(self.lon0)),
            ("BETA", MiscValue::Float(self.beta)),
        ];
        if self.kmax > 0 {
            out.push(("KMAX", MiscValue::Int(self.kmax as i64)));
            out.push(("ZHAT", MiscValue::FloatArray(self.zhat.clone())));
            out.push(("SLEVE", MiscValue::Bool(self.sleve)));
        }
        if !self.cartesian {
            out.push(("RPK", MiscValue::Float(self.rpk)));
            out.push(("LATOR", MiscValue::Float(self.lat_origin)));
            out.push(("LONOR", MiscValue::Float(self.lon_origin)));
            out.push(("LATORI", MiscValue::Float(self.lat_origin)));
            out.push(("LONORI", MiscValue::Float(self.lon_origin)));
        }
        out
    }
}

/// Names of the header variables, never listed as data fields by writers.
pub const HEADER_VARIABLES: [&str; 18] = [
    "IMAX", "JMAX", "KMAX", "XHAT", "YHAT", "ZHAT", "LAT0", "LON0", "LATORI", "LATOR", "LONORI",
    "LONOR", "RPK", "BETA", "CARTESIAN", "SLEVE", "DTEXP", "DTCUR",
];
