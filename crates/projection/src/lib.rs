//! Map projections and spherical geometry on the geoid sphere.
//!
//! Lambert conformal conic, Mercator and polar stereographic projections,
//! plus great circle helpers, pole rotation and Gaussian latitudes.

pub mod gauss;
pub mod geographic;
pub mod lambert;
pub mod mercator;
pub mod polar;

pub use gauss::gaussian_latitudes;
pub use geographic::{azimuth, distance, great_circle_points, PoleRotation};
pub use lambert::LambertConformal;
pub use mercator::Mercator;
pub use polar::PolarStereographic;

use std::f64::consts::PI;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("Invalid projection parameters: {0}")]
    InvalidParameters(String),

    #[error("No convergence: {0}")]
    NoConvergence(String),
}

/// Bring an angle in radians into `(-pi, pi]`.
pub fn wrap_pi(angle: f64) -> f64 {
    let mut a = angle;
    while a > PI {
        a -= 2.0 * PI;
    }
    while a <= -PI {
        a += 2.0 * PI;
    }
    a
}

/// One of the conformal projections used by limited-area grids.
#[derive(Debug, Clone, PartialEq)]
pub enum ConformalProjection {
    Lambert(LambertConformal),
    Mercator(Mercator),
    PolarStereographic(PolarStereographic),
}

impl ConformalProjection {
    /// Geographic (degrees) to plane coordinates (meters).
    pub fn project(&self, lon: f64, lat: f64) -> (f64, f64) {
        match self {
            Self::Lambert(p) => p.project(lon, lat),
            Self::Mercator(p) => p.project(lon, lat),
            Self::PolarStereographic(p) => p.project(lon, lat),
        }
    }

    /// Plane coordinates (meters) to geographic (degrees).
    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        match self {
            Self::Lambert(p) => p.unproject(x, y),
            Self::Mercator(p) => p.unproject(x, y),
            Self::PolarStereographic(p) => p.unproject(x, y),
        }
    }

    pub fn map_factor(&self, lat: f64) -> f64 {
        match self {
            Self::Lambert(p) => p.map_factor(lat),
            Self::Mercator(p) => p.map_factor(lat),
            Self::PolarStereographic(p) => p.map_factor(lat),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_pi() {
        assert!((wrap_pi(3.0 * PI) - PI).abs() < 1e-12);
        assert!((wrap_pi(-PI) - PI).abs() < 1e-12);
        assert!((wrap_pi(0.5) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_dispatch_roundtrip() {
        let projections = vec![
            ConformalProjection::Lambert(LambertConformal::tangent(0.0, 45.0, 6_371_229.0).unwrap()),
            ConformalProjection::Mercator(Mercator::new(0.0, 0.0, 6_371_229.0).unwrap()),
            ConformalProjection::PolarStereographic(PolarStereographic::new(0.0, 90.0, 6_371_229.0)),
        ];
        for p in projections {
            let (x, y) = p.project(5.0, 50.0);
            let (lon, lat) = p.unproject(x, y);
            assert!((lon - 5.0).abs() < 1e-9, "{:?}", p);
            assert!((lat - 50.0).abs() < 1e-9, "{:?}", p);
        }
    }
}
