//! Polar stereographic projection on a sphere.
//!
//! North-polar aspect: `x = rho sin(dlon)`, `y = -rho cos(dlon)` with
//! `rho = R (1 + sin(lat_ts)) tan(pi/4 - lat/2)`. The south-polar aspect
//! is the mirror image through the equator.

use std::f64::consts::PI;

use crate::wrap_pi;

#[derive(Debug, Clone, PartialEq)]
pub struct PolarStereographic {
    /// Central meridian in radians
    pub lon0: f64,
    /// Latitude of true scale in radians, sign selects the hemisphere
    pub lat_ts: f64,
    pub earth_radius: f64,
    /// 1 for the north-polar aspect, -1 for the south-polar one
    hemisphere: f64,
}

impl PolarStereographic {
    pub fn new(reference_lon_deg: f64, true_scale_lat_deg: f64, earth_radius: f64) -> Self {
        let hemisphere = if true_scale_lat_deg >= 0.0 { 1.0 } else { -1.0 };
        Self {
            lon0: reference_lon_deg.to_radians(),
            lat_ts: true_scale_lat_deg.to_radians(),
            earth_radius,
            hemisphere,
        }
    }

    pub fn is_north(&self) -> bool {
        self.hemisphere > 0.0
    }

    fn k(&self) -> f64 {
        self.earth_radius * (1.0 + (self.hemisphere * self.lat_ts).sin())
    }

    pub fn project(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let h = self.hemisphere;
        let lat = h * lat_deg.to_radians();
        let dlon = wrap_pi(h * (lon_deg.to_radians() - self.lon0));
        let rho = self.k() * (PI / 4.0 - lat / 2.0).tan();
        (h * rho * dlon.sin(), -h * rho * dlon.cos())
    }

    pub fn unproject(&self, x: f64, y: f64) -> (f64, f64) {
        let h = self.hemisphere;
        let (x, y) = (h * x, h * y);
        let rho = (x * x + y * y).sqrt();
        let lat = PI / 2.0 - 2.0 * (rho / self.k()).atan();
        let dlon = if rho == 0.0 { 0.0 } else { x.atan2(-y) };
        let lon = self.lon0 + h * dlon;
        (wrap_pi(lon).to_degrees(), (h * lat).to_degrees())
    }

    pub fn map_factor(&self, lat_deg: f64) -> f64 {
        let lat = self.hemisphere * lat_deg.to_radians();
        (1.0 + (self.hemisphere * self.lat_ts).sin()) / (1.0 + lat.sin())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_north_roundtrip() {
        let proj = PolarStereographic::new(-45.0, 60.0, 6_371_229.0);
        let (x, y) = proj.project(10.0, 70.0);
        let (lon, lat) = proj.unproject(x, y);
        assert!((lon - 10.0).abs() < 1e-9);
        assert!((lat - 70.0).abs() < 1e-9);
        assert!((proj.map_factor(60.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_south_roundtrip() {
        let proj = PolarStereographic::new(0.0, -90.0, 6_371_229.0);
        assert!(!proj.is_north());
        let (x, y) = proj.project(120.0, -75.0);
        let (lon, lat) = proj.unproject(x, y);
        assert!((lon - 120.0).abs() < 1e-9);
        assert!((lat + 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_pole_is_origin() {
        let proj = PolarStereographic::new(0.0, 90.0, 6_371_229.0);
        let (x, y) = proj.project(33.0, 90.0);
        assert!(x.abs() < 1e-6 && y.abs() < 1e-6);
    }
}
