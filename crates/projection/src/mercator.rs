//! Mercator projection on a sphere.
//!
//! `x = k0 R (lon - lon0)`, `y = k0 R ln(tan(pi/4 + lat/2))` with
//! `k0 = cos(lat_ts)`, `lat_ts` the latitude of true scale.

use std::f64::consts::PI;

use crate::{wrap_pi, ProjectionError};

#[derive(Debug, Clone, PartialEq)]
pub struct Mercator {
    /// Central meridian in radians
    pub lon0: f64,
    /// Latitude of true scale in radians
    pub lat_ts: f64,
    pub earth_radius: f64,
    k0: f64,
}

impl Mercator {
    pub fn new(reference_lon_deg: f64, true_scale_lat_deg: f64, earth_radius: f64) -> Result<Self, ProjectionError> {
        if true_scale_lat_deg.abs() >= 90.0 {
            return Err(ProjectionError::InvalidParameters(format!(
                "Mercator true-scale latitude must lie in (-90, 90), got {}",
                true_scale_lat_deg
            )));
        }
        let lat_ts = true_scale_lat_deg.to_radians();
        Ok(Self {
            lon0: reference_lon_deg.to_radians(),
            lat_ts,
            earth_radius,
            k0: lat_ts.cos(),
        })
    }

    pub fn project(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let lat = lat_deg.to_radians().clamp(-PI / 2.0 + 1e-12, PI / 2.0 - 1e-12);
        let dlon = wrap_pi(lon_deg.to_radians() - self.lon0);
        let r = self.k0 * self.earth_radius;
        (r * dlon, r * (PI / 4.0 + lat / 2.0).tan().ln())
    }

    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        let r = self.k0 * self.earth_radius;
        let lon = self.lon0 + x / r;
        let lat = 2.0 * (y / r).exp().atan() - PI / 2.0;
        (wrap_pi(lon).to_degrees(), lat.to_degrees())
    }

    pub fn map_factor(&self, lat_deg: f64) -> f64 {
        self.k0 / lat_deg.to_radians().cos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mercator_roundtrip() {
        let proj = Mercator::new(-60.0, 15.0, 6_371_229.0).unwrap();
        let (x, y) = proj.project(-55.0, 12.0);
        let (lon, lat) = proj.unproject(x, y);
        assert!((lon + 55.0).abs() < 1e-9);
        assert!((lat - 12.0).abs() < 1e-9);
        assert!((proj.map_factor(15.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_equator_maps_to_zero() {
        let proj = Mercator::new(0.0, 0.0, 6_371_229.0).unwrap();
        let (x, y) = proj.project(0.0, 0.0);
        assert!(x.abs() < 1e-9 && y.abs() < 1e-9);
    }
}
