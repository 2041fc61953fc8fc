//! Vertical coordinates.

use serde::{Deserialize, Serialize};

use meteo_common::constants::surface;

use crate::error::{GeometryError, Result};

/// Position of levels (or of hybrid coefficients) on the vertical grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VPosition {
    Mass,
    Flux,
    #[default]
    #[serde(rename = "__unknown__")]
    Unknown,
}

impl VPosition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mass => "mass",
            Self::Flux => "flux",
            Self::Unknown => "__unknown__",
        }
    }
}

/// Hybrid coefficients (A, B) of hybrid-pressure or hybrid-height grids.
///
/// For hybrid pressure, `a` is in Pa and half-level pressure is `A + B Ps`.
/// For hybrid height, `a` is in m and altitude is `A + B zs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridCoefficients {
    pub a: Vec<f64>,
    pub b: Vec<f64>,
    pub ab_grid_position: VPosition,
}

impl HybridCoefficients {
    pub fn new(a: Vec<f64>, b: Vec<f64>, ab_grid_position: VPosition) -> Result<Self> {
        if a.len() != b.len() {
            return Err(GeometryError::inconsistent(format!(
                "A and B coefficient tables differ in length: {} vs {}",
                a.len(),
                b.len()
            )));
        }
        Ok(Self {
            a,
            b,
            ab_grid_position,
        })
    }

    pub fn len(&self) -> usize {
        self.a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }

    /// Max absolute difference with another table of the same length.
    pub fn max_difference(&self, other: &HybridCoefficients) -> Option<f64> {
        if self.len() != other.len() {
            return None;
        }
        let da = self.a.iter().zip(&other.a).map(|(x, y)| (x - y).abs());
        let db = self.b.iter().zip(&other.b).map(|(x, y)| (x - y).abs());
        Some(da.chain(db).fold(0.0, f64::max))
    }
}

/// Vertical coordinate: type of surface, optional hybrid table and levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VCoordinate {
    /// GRIB2 code table 4.5 type of first fixed surface.
    pub typeoffirstfixedsurface: u16,
    pub position_on_grid: VPosition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid: Option<HybridCoefficients>,
    pub levels: Vec<f64>,
    /// Levels of each horizontal point, indexed `[level][point]`, when
    /// they vary horizontally; `levels` then holds their horizontal mean.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_levels: Option<Vec<Vec<f64>>>,
}

impl VCoordinate {
    /// A single level of the given surface type.
    pub fn single(typeoffirstfixedsurface: u16, level: f64) -> Self {
        Self {
            typeoffirstfixedsurface,
            position_on_grid: VPosition::Unknown,
            grid: None,
            levels: vec![level],
            column_levels: None,
        }
    }

    /// Unknown vertical coordinate (code 255, level 0).
    pub fn unknown() -> Self {
        Self::single(surface::UNKNOWN, 0.0)
    }

    /// Hybrid-pressure coordinate on mass levels `1..=A.len()-1`.
    pub fn hybrid_pressure(a: Vec<f64>, b: Vec<f64>) -> Result<Self> {
        let coefficients = HybridCoefficients::new(a, b, VPosition::Flux)?;
        let nlev = coefficients.len().saturating_sub(1);
        Ok(Self {
            typeoffirstfixedsurface: surface::HYBRID_PRESSURE,
            position_on_grid: VPosition::Mass,
            grid: Some(coefficients),
            levels: (1..=nlev).map(|l| l as f64).collect(),
            column_levels: None,
        })
    }

    /// Replace the levels; per-point levels are dropped.
    pub fn with_levels(mut self, levels: Vec<f64>) -> Self {
        self.levels = levels;
        self.column_levels = None;
        self
    }

    /// Levels varying over `npoints` horizontal points, indexed `[level][point]`.
    ///
    /// `levels` is set to the horizontal mean of each level.
    pub fn with_column_levels(mut self, column_levels: Vec<Vec<f64>>, npoints: usize) -> Result<Self> {
        if let Some(k) = column_levels.iter().position(|l| l.len() != npoints) {
            return Err(GeometryError::inconsistent(format!(
                "level {} holds {} points instead of {}",
                k + 1,
                column_levels[k].len(),
                npoints
            )));
        }
        self.levels = column_levels
            .iter()
            .map(|l| l.iter().sum::<f64>() / npoints.max(1) as f64)
            .collect();
        self.column_levels = Some(column_levels);
        Ok(self)
    }

    /// Levels of horizontal point `p`, per-point ones when present.
    pub fn point_levels(&self, p: usize) -> Option<Vec<f64>> {
        match &self.column_levels {
            Some(columns) => columns.iter().map(|l| l.get(p).copied()).collect(),
            None => Some(self.levels.clone()),
        }
    }

    pub fn levels_number(&self) -> usize {
        self.levels.len()
    }

    /// Check that a hybrid-pressure table has one more entry than levels.
    ///
    /// Only levels that are indices into the table are checked.
    pub fn validate(&self) -> Result<()> {
        if let Some(columns) = &self.column_levels {
            if columns.len() != self.levels.len() {
                return Err(GeometryError::inconsistent(format!(
                    "{} per-point levels for {} levels",
                    columns.len(),
                    self.levels.len()
                )));
            }
        }
        if self.typeoffirstfixedsurface == surface::HYBRID_PRESSURE {
            if let Some(grid) = &self.grid {
                let max_level = self.levels.iter().fold(0.0_f64, |m, l| m.max(*l));
                if (max_level as usize) + 1 > grid.len() {
                    return Err(GeometryError::inconsistent(format!(
                        "hybrid table of length {} cannot hold level {}",
                        grid.len(),
                        max_level
                    )));
                }
            }
        }
        Ok(())
    }

    /// Two coordinates describe the same vertical grid (levels ignored).
    pub fn same_grid(&self, other: &VCoordinate, tolerance: f64) -> bool {
        if self.typeoffirstfixedsurface != other.typeoffirstfixedsurface {
            return false;
        }
        match (&self.grid, &other.grid) {
            (Some(a), Some(b)) => a.max_difference(b).map_or(false, |d| d < tolerance),
            (None, None) => true,
            _ => false,
        }
    }
}

impl Default for VCoordinate {
    fn default() -> Self {
        Self::unknown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hybrid_pressure_levels() {
        let v = VCoordinate::hybrid_pressure(vec![0.0, 100.0, 0.0], vec![0.0, 0.5, 1.0]).unwrap();
        assert_eq!(v.levels, vec![1.0, 2.0]);
        assert_eq!(v.grid.as_ref().map(|g| g.len()), Some(v.levels_number() + 1));
        assert!(v.validate().is_ok());
    }

    #[test]
    fn test_inconsistent_table() {
        assert!(HybridCoefficients::new(vec![0.0], vec![0.0, 1.0], VPosition::Flux).is_err());
        let v = VCoordinate::hybrid_pressure(vec![0.0, 0.0], vec![0.0, 1.0])
            .unwrap()
            .with_levels(vec![1.0, 2.0, 3.0]);
        assert!(v.validate().is_err());
    }

    #[test]
    fn test_column_levels() {
        let v = VCoordinate::single(surface::ISOBARIC, 0.0)
            .with_column_levels(vec![vec![900.0, 800.0], vec![500.0, 400.0]], 2)
            .unwrap();
        assert_eq!(v.levels, vec![850.0, 450.0]);
        assert_eq!(v.point_levels(1), Some(vec![800.0, 400.0]));
        assert_eq!(v.point_levels(2), None);
        assert!(v.validate().is_ok());
        assert!(v.clone().with_levels(vec![1.0]).column_levels.is_none());
        assert!(VCoordinate::unknown().with_column_levels(vec![vec![1.0]], 2).is_err());
    }

    #[test]
    fn test_same_grid_tolerance() {
        let a = VCoordinate::hybrid_pressure(vec![0.0, 1.0], vec![0.0, 1.0]).unwrap();
        let b = VCoordinate::hybrid_pressure(vec![0.0, 1.0 + 1e-12], vec![0.0, 1.0]).unwrap();
        assert!(a.same_grid(&b, 1e-10));
        assert!(!a.same_grid(&VCoordinate::unknown(), 1e-10));
    }
}
