//! Core types describing horizontal grids.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GeometryError;

/// Horizontal shape of a geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryName {
    RegularLonlat,
    ReducedGauss,
    RotatedReducedGauss,
    Lambert,
    Mercator,
    PolarStereographic,
    Academic,
    Unstructured,
}

impl GeometryName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RegularLonlat => "regular_lonlat",
            Self::ReducedGauss => "reduced_gauss",
            Self::RotatedReducedGauss => "rotated_reduced_gauss",
            Self::Lambert => "lambert",
            Self::Mercator => "mercator",
            Self::PolarStereographic => "polar_stereographic",
            Self::Academic => "academic",
            Self::Unstructured => "unstructured",
        }
    }

    /// Grids whose points are laid out as X columns by Y rows.
    pub fn is_rectangular(&self) -> bool {
        !self.is_gauss()
    }

    pub fn is_gauss(&self) -> bool {
        matches!(self, Self::ReducedGauss | Self::RotatedReducedGauss)
    }

    pub fn is_projected(&self) -> bool {
        matches!(self, Self::Lambert | Self::Mercator | Self::PolarStereographic)
    }
}

impl fmt::Display for GeometryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GeometryName {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "regular_lonlat" => Self::RegularLonlat,
            "reduced_gauss" => Self::ReducedGauss,
            "rotated_reduced_gauss" => Self::RotatedReducedGauss,
            "lambert" => Self::Lambert,
            "mercator" => Self::Mercator,
            "polar_stereographic" => Self::PolarStereographic,
            "academic" => Self::Academic,
            "unstructured" => Self::Unstructured,
            other => return Err(GeometryError::invalid(format!("unknown geometry name '{}'", other))),
        })
    }
}

/// Geometric structure, from the horizontal extent and the number of levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Structure {
    /// One point, one level.
    Point,
    /// One point, several levels (vertical profile).
    V1D,
    /// Points along a line, one level.
    H1D,
    /// Points along a line, several levels (vertical section).
    V2D,
    /// Horizontal grid, one level.
    H2D,
    /// Horizontal grid, several levels.
    #[serde(rename = "3D")]
    D3,
}

impl fmt::Display for Structure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Point => "Point",
            Self::V1D => "V1D",
            Self::H1D => "H1D",
            Self::V2D => "V2D",
            Self::H2D => "H2D",
            Self::D3 => "3D",
        };
        f.write_str(s)
    }
}

// ============================================================================
// Limited-area zones
// ============================================================================

/// Nested zones of a limited-area grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subzone {
    /// Core
    C,
    /// Core + Interface
    CI,
    /// Core + Interface + Extension
    CIE,
}

impl fmt::Display for Subzone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::C => "C",
            Self::CI => "CI",
            Self::CIE => "CIE",
        };
        f.write_str(s)
    }
}

impl FromStr for Subzone {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "C" => Ok(Self::C),
            "CI" => Ok(Self::CI),
            "CIE" => Ok(Self::CIE),
            other => Err(GeometryError::invalid(format!("unknown subzone '{}'", other))),
        }
    }
}

/// Extents of the nested zones of a limited-area grid.
///
/// `C = CI - 2 * Iwidth`; the CI zone starts at `CIoffset` inside CIE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LamZones {
    pub x_cizone: usize,
    pub y_cizone: usize,
    pub x_czone: usize,
    pub y_czone: usize,
    pub x_iwidth: usize,
    pub y_iwidth: usize,
    pub x_cioffset: usize,
    pub y_cioffset: usize,
}

impl LamZones {
    /// Zones of a CI grid with `iwidth` interface points and no extension.
    pub fn from_ci(x_ci: usize, y_ci: usize, x_iwidth: usize, y_iwidth: usize) -> Self {
        Self {
            x_cizone: x_ci,
            y_cizone: y_ci,
            x_czone: x_ci.saturating_sub(2 * x_iwidth),
            y_czone: y_ci.saturating_sub(2 * y_iwidth),
            x_iwidth,
            y_iwidth,
            x_cioffset: 0,
            y_cioffset: 0,
        }
    }

    pub fn with_offset(mut self, x_cioffset: usize, y_cioffset: usize) -> Self {
        self.x_cioffset = x_cioffset;
        self.y_cioffset = y_cioffset;
        self
    }
}

/// Grid dimensions.
///
/// For Gaussian grids `x` is the maximum number of longitudes and `y` the
/// number of latitudes; `lon_number_by_lat` gives each row's length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dimensions {
    pub x: usize,
    pub y: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zones: Option<LamZones>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon_number_by_lat: Option<Vec<usize>>,
}

impl Dimensions {
    pub fn rectangular(x: usize, y: usize) -> Self {
        Self {
            x,
            y,
            zones: None,
            lon_number_by_lat: None,
        }
    }

    pub fn lam(x: usize, y: usize, zones: LamZones) -> Self {
        Self {
            x,
            y,
            zones: Some(zones),
            lon_number_by_lat: None,
        }
    }

    pub fn gauss(lon_number_by_lat: Vec<usize>) -> Self {
        let max_lon_number = lon_number_by_lat.iter().copied().max().unwrap_or(0);
        Self {
            x: max_lon_number,
            y: lon_number_by_lat.len(),
            zones: None,
            lon_number_by_lat: Some(lon_number_by_lat),
        }
    }

    pub fn lat_number(&self) -> usize {
        self.y
    }

    pub fn max_lon_number(&self) -> usize {
        self.x
    }
}

// ============================================================================
// Grid descriptions
// ============================================================================

/// Position of the points inside their horizontal grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GridPosition {
    #[default]
    Center,
    CenterLeft,
    LowerCenter,
    LowerLeft,
    #[serde(rename = "__unknown__")]
    Unknown,
}

impl GridPosition {
    /// Index shift of the points relative to cell centers.
    pub fn offset(&self) -> (f64, f64) {
        match self {
            Self::Center | Self::Unknown => (0.0, 0.0),
            Self::CenterLeft => (-0.5, 0.0),
            Self::LowerCenter => (0.0, -0.5),
            Self::LowerLeft => (-0.5, -0.5),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Center => "center",
            Self::CenterLeft => "center-left",
            Self::LowerCenter => "lower-center",
            Self::LowerLeft => "lower-left",
            Self::Unknown => "__unknown__",
        }
    }
}

/// Grid of rectangular geometries (regular lon-lat, projected, academic).
///
/// Resolutions are in degrees for regular lon-lat grids, meters otherwise.
/// `input_position` is the (possibly fractional) index of the point whose
/// coordinates are `input_lon`, `input_lat`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RectangularGrid {
    pub x_resolution: f64,
    pub y_resolution: f64,
    pub input_lon: f64,
    pub input_lat: f64,
    pub input_position: (f64, f64),
    /// Zone covered by the data of a limited-area grid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lamzone: Option<Subzone>,
}

/// Grid of Gaussian geometries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussGrid {
    /// Latitudes in degrees, north to south.
    pub latitudes: Vec<f64>,
    #[serde(default = "default_pole_lon")]
    pub pole_lon: f64,
    #[serde(default = "default_pole_lat")]
    pub pole_lat: f64,
    #[serde(default = "default_dilatation")]
    pub dilatation_coef: f64,
}

fn default_pole_lon() -> f64 {
    0.0
}

fn default_pole_lat() -> f64 {
    90.0
}

fn default_dilatation() -> f64 {
    1.0
}

/// Grid of unstructured geometries: explicit point coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnstructuredGrid {
    pub longitudes: Vec<f64>,
    pub latitudes: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Grid {
    Rectangular(RectangularGrid),
    Gauss(GaussGrid),
    Unstructured(UnstructuredGrid),
}

/// Secant latitudes of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub enum Secant {
    #[default]
    Tangent,
    /// Mercator / polar stereographic true-scale latitude.
    One(f64),
    /// Lambert secant latitudes.
    Two(f64, f64),
}

/// Projection parameters of projected geometries (degrees).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProjectionParams {
    pub reference_lon: f64,
    pub reference_lat: f64,
    #[serde(default)]
    pub rotation: f64,
    #[serde(default)]
    pub secant: Secant,
}

impl ProjectionParams {
    pub fn tangent(reference_lon: f64, reference_lat: f64) -> Self {
        Self {
            reference_lon,
            reference_lat,
            rotation: 0.0,
            secant: Secant::Tangent,
        }
    }

    pub fn is_secant(&self) -> bool {
        self.secant != Secant::Tangent
    }
}

/// Figure of the Earth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Geoid {
    Sphere { radius: f64 },
    Ellipsoid { a: f64, b: f64 },
}

impl Geoid {
    /// Radius used by spherical computations.
    pub fn radius(&self) -> f64 {
        match self {
            Self::Sphere { radius } => *radius,
            Self::Ellipsoid { a, b } => (2.0 * a + b) / 3.0,
        }
    }
}

impl Default for Geoid {
    fn default() -> Self {
        Self::Sphere {
            radius: meteo_common::constants::EARTH_RADIUS,
        }
    }
}

/// Interpolation kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMethod {
    /// Nearest neighbor (1 point).
    #[default]
    Nearest,
    /// Bilinear (4 points).
    Linear,
    /// Bicubic (16 points).
    Cubic,
}

impl InterpolationMethod {
    /// Number of neighbours the kernel uses.
    pub fn points_number(&self) -> usize {
        match self {
            Self::Nearest => 1,
            Self::Linear => 4,
            Self::Cubic => 16,
        }
    }
}

impl FromStr for InterpolationMethod {
    type Err = GeometryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nearest" => Ok(Self::Nearest),
            "linear" | "bilinear" => Ok(Self::Linear),
            "cubic" | "bicubic" => Ok(Self::Cubic),
            other => Err(GeometryError::invalid(format!(
                "unknown interpolation '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for InterpolationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => write!(f, "nearest"),
            Self::Linear => write!(f, "linear"),
            Self::Cubic => write!(f, "cubic"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpolation_method_from_str() {
        assert_eq!("nearest".parse::<InterpolationMethod>().unwrap(), InterpolationMethod::Nearest);
        assert_eq!("BILINEAR".parse::<InterpolationMethod>().unwrap(), InterpolationMethod::Linear);
        assert_eq!("cubic".parse::<InterpolationMethod>().unwrap(), InterpolationMethod::Cubic);
        assert!("spline".parse::<InterpolationMethod>().is_err());
    }

    #[test]
    fn test_geometry_name_roundtrip() {
        for name in [
            GeometryName::RegularLonlat,
            GeometryName::RotatedReducedGauss,
            GeometryName::PolarStereographic,
            GeometryName::Academic,
        ] {
            assert_eq!(name.as_str().parse::<GeometryName>().unwrap(), name);
        }
        assert!(GeometryName::Lambert.is_projected());
        assert!(GeometryName::ReducedGauss.is_gauss());
        assert!(!GeometryName::ReducedGauss.is_rectangular());
    }

    #[test]
    fn test_zones_from_ci() {
        let z = LamZones::from_ci(5, 5, 1, 1);
        assert_eq!((z.x_czone, z.y_czone), (3, 3));
    }

    #[test]
    fn test_gauss_dimensions() {
        let d = Dimensions::gauss(vec![4, 8, 8, 4]);
        assert_eq!(d.lat_number(), 4);
        assert_eq!(d.max_lon_number(), 8);
    }
}
