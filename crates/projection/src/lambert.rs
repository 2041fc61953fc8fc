//! Lambert Conformal Conic projection on a sphere.
//!
//! Maps a cone tangent or secant to the sphere onto a plane. Plane
//! coordinates are metres with the origin at the cone apex:
//! `x = rho sin(theta)`, `y = -rho cos(theta)`, `theta = n (lon - lon0)`.
//!
//! The projection parameters include:
//! - Reference longitude (lon0): the central meridian
//! - Reference latitude: tangency latitude when there is no secant
//! - Secant latitudes latin1 and latin2 for a secant cone

use std::f64::consts::PI;

use crate::{wrap_pi, ProjectionError};

/// Lambert Conformal Conic projection parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct LambertConformal {
    /// Central meridian in radians
    pub lon0: f64,
    /// First standard parallel in radians
    pub latin1: f64,
    /// Second standard parallel in radians
    pub latin2: f64,
    /// Sphere radius (meters)
    pub earth_radius: f64,
    /// Cone constant (n)
    n: f64,
    /// F constant
    f: f64,
}

impl LambertConformal {
    /// Tangent cone touching the sphere at `reference_lat_deg`.
    pub fn tangent(
        reference_lon_deg: f64,
        reference_lat_deg: f64,
        earth_radius: f64,
    ) -> Result<Self, ProjectionError> {
        Self::secant(
            reference_lon_deg,
            reference_lat_deg,
            reference_lat_deg,
            earth_radius,
        )
    }

    /// Cone secant to the sphere at `latin1_deg` and `latin2_deg`.
    pub fn secant(
        reference_lon_deg: f64,
        latin1_deg: f64,
        latin2_deg: f64,
        earth_radius: f64,
    ) -> Result<Self, ProjectionError> {
        let latin1 = latin1_deg.to_radians();
        let latin2 = latin2_deg.to_radians();

        let n = if (latin1 - latin2).abs() < 1e-10 {
            latin1.sin()
        } else {
            cone_constant(latin1_deg, latin2_deg)
        };
        if n.abs() < 1e-10 || !n.is_finite() {
            return Err(ProjectionError::InvalidParameters(format!(
                "degenerate Lambert cone for secant latitudes {} / {}",
                latin1_deg, latin2_deg
            )));
        }

        let f = (latin1.cos() * (PI / 4.0 + latin1 / 2.0).tan().powf(n)) / n;

        Ok(Self {
            lon0: reference_lon_deg.to_radians(),
            latin1,
            latin2,
            earth_radius,
            n,
            f,
        })
    }

    /// Cone constant n.
    pub fn cone_constant(&self) -> f64 {
        self.n
    }

    /// True when the cone is secant (two distinct standard parallels).
    pub fn is_secant(&self) -> bool {
        (self.latin1 - self.latin2).abs() >= 1e-10
    }

    fn rho(&self, lat: f64) -> f64 {
        self.earth_radius * self.f / (PI / 4.0 + lat / 2.0).tan().powf(self.n)
    }

    /// Geographic (degrees) to plane coordinates (meters).
    pub fn project(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let lat = lat_deg.to_radians();
        let dlon = wrap_pi(lon_deg.to_radians() - self.lon0);

        let rho = self.rho(lat);
        let theta = self.n * dlon;
        (rho * theta.sin(), -rho * theta.cos())
    }

    /// Plane coordinates (meters) to geographic (degrees).
    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        let sign = self.n.signum();
        let rho = sign * (x * x + y * y).sqrt();
        let theta = (sign * x).atan2(-sign * y);

        let lat = if rho == 0.0 {
            sign * PI / 2.0
        } else {
            2.0 * ((self.earth_radius * self.f / rho).powf(1.0 / self.n)).atan() - PI / 2.0
        };
        let lon = self.lon0 + theta / self.n;

        (wrap_pi(lon).to_degrees(), lat.to_degrees())
    }

    /// Scale factor of the map at `lat_deg`.
    pub fn map_factor(&self, lat_deg: f64) -> f64 {
        let lat = lat_deg.to_radians();
        self.n * self.rho(lat) / (self.earth_radius * lat.cos())
    }
}

/// Cone constant of a secant cone `(ln m1 - ln m2) / (ln t1 - ln t2)`.
pub fn cone_constant(latin1_deg: f64, latin2_deg: f64) -> f64 {
    let (m1, t1) = m_t(latin1_deg);
    let (m2, t2) = m_t(latin2_deg);
    (m1.ln() - m2.ln()) / (t1.ln() - t2.ln())
}

fn m_t(lat_deg: f64) -> (f64, f64) {
    let lat = lat_deg.to_radians();
    (lat.cos(), (PI / 4.0 - lat / 2.0).tan())
}

/// Recover the two secant latitudes from the first one and the cone constant.
///
/// Secant-method search for `latin2` such that `cone_constant(lat0, latin2) = rpk`,
/// started from `deg(2 asin(rpk)) - lat0`.
pub fn secant_latitudes_from_cone(lat0_deg: f64, rpk: f64) -> Result<(f64, f64), ProjectionError> {
    let k = |latin2: f64| cone_constant(lat0_deg, latin2) - rpk;

    let x0 = (2.0 * rpk.asin()).to_degrees() - lat0_deg;
    let (mut x1, mut x2) = (x0 + 1.0, x0);
    let (mut y1, mut y2) = (k(x1), k(x2));
    let mut iterations = 0;
    while y2.abs() > 1e-19 && y2.abs() != y1.abs() {
        if iterations > 200 || !y2.is_finite() || y2 == y1 {
            break;
        }
        let next = x2 - (x2 - x1) / (y2 - y1) * y2;
        x1 = x2;
        x2 = next;
        y1 = y2;
        y2 = k(x2);
        iterations += 1;
    }

    if !x2.is_finite() || y2.abs() > 1e-8 {
        return Err(ProjectionError::NoConvergence(format!(
            "secant latitude for lat0={} rpk={}",
            lat0_deg, rpk
        )));
    }
    Ok((lat0_deg, x2))
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: f64 = 6_371_229.0;

    #[test]
    fn test_tangent_roundtrip() {
        let proj = LambertConformal::tangent(2.0, 46.0, R).unwrap();
        for (lon, lat) in [(2.0, 46.0), (-5.0, 42.0), (9.5, 51.2)] {
            let (x, y) = proj.project(lon, lat);
            let (lon2, lat2) = proj.unproject(x, y);
            assert!((lon - lon2).abs() < 1e-9, "lon {} vs {}", lon, lon2);
            assert!((lat - lat2).abs() < 1e-9, "lat {} vs {}", lat, lat2);
        }
    }

    #[test]
    fn test_map_factor_one_on_tangency() {
        let proj = LambertConformal::tangent(0.0, 45.0, R).unwrap();
        assert!((proj.map_factor(45.0) - 1.0).abs() < 1e-12);
        assert!(proj.map_factor(30.0) > 1.0);
    }

    #[test]
    fn test_southern_cone_roundtrip() {
        let proj = LambertConformal::secant(150.0, -30.0, -60.0, R).unwrap();
        assert!(proj.cone_constant() < 0.0);
        let (x, y) = proj.project(145.0, -40.0);
        let (lon, lat) = proj.unproject(x, y);
        assert!((lon - 145.0).abs() < 1e-9);
        assert!((lat + 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_secant_solver() {
        let rpk = cone_constant(30.0, 60.0);
        let (l1, l2) = secant_latitudes_from_cone(30.0, rpk).unwrap();
        assert!((l1 - 30.0).abs() < 1e-12);
        assert!((l2 - 60.0).abs() < 1e-6, "latin2 = {}", l2);
    }

    #[test]
    fn test_equator_tangent_is_rejected() {
        assert!(LambertConformal::tangent(0.0, 0.0, R).is_err());
    }
}
