//! Spherical geometry helpers: great circles, azimuths and pole rotation.

use nalgebra::{Rotation3, Unit, Vector3};
use std::f64::consts::PI;

/// Unit vector of a lon/lat point (degrees).
pub fn to_cartesian(lon_deg: f64, lat_deg: f64) -> Vector3<f64> {
    let (lon, lat) = (lon_deg.to_radians(), lat_deg.to_radians());
    Vector3::new(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
}

/// Lon/lat (degrees) of a non-null vector.
pub fn from_cartesian(v: &Vector3<f64>) -> (f64, f64) {
    let n = v.norm();
    let lat = (v.z / n).clamp(-1.0, 1.0).asin();
    let lon = v.y.atan2(v.x);
    (lon.to_degrees(), lat.to_degrees())
}

/// Great-circle distance in meters between two lon/lat points.
pub fn distance(end1: (f64, f64), end2: (f64, f64), radius: f64) -> f64 {
    let (lon1, lat1) = (end1.0.to_radians(), end1.1.to_radians());
    let (lon2, lat2) = (end2.0.to_radians(), end2.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * radius * a.sqrt().min(1.0).asin()
}

/// Initial bearing from `end1` to `end2`, degrees clockwise from north in [0, 360).
pub fn azimuth(end1: (f64, f64), end2: (f64, f64)) -> f64 {
    let (lon1, lat1) = (end1.0.to_radians(), end1.1.to_radians());
    let (lon2, lat2) = (end2.0.to_radians(), end2.1.to_radians());
    let dlon = lon2 - lon1;
    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

/// `n` points equally spaced along the great circle from `end1` to `end2`, ends included.
pub fn great_circle_points(end1: (f64, f64), end2: (f64, f64), n: usize) -> Vec<(f64, f64)> {
    if n == 0 {
        return Vec::new();
    }
    if n == 1 {
        return vec![end1];
    }
    let a = to_cartesian(end1.0, end1.1);
    let b = to_cartesian(end2.0, end2.1);
    let omega = a.dot(&b).clamp(-1.0, 1.0).acos();

    (0..n)
        .map(|k| {
            let t = k as f64 / (n - 1) as f64;
            if k == 0 {
                return end1;
            }
            if k == n - 1 {
                return end2;
            }
            if omega.abs() < 1e-12 {
                return end1;
            }
            let p = a * (((1.0 - t) * omega).sin() / omega.sin()) + b * ((t * omega).sin() / omega.sin());
            from_cartesian(&p)
        })
        .collect()
}

/// Rotation moving the geographic north pole onto `(pole_lon, pole_lat)`.
///
/// Its inverse brings geographic coordinates into the rotated frame whose
/// north pole is the given point.
#[derive(Debug, Clone)]
pub struct PoleRotation {
    rotation: Rotation3<f64>,
}

impl PoleRotation {
    pub fn new(pole_lon_deg: f64, pole_lat_deg: f64) -> Self {
        let z = Vector3::z();
        let target = to_cartesian(pole_lon_deg, pole_lat_deg);
        let rotation = match Unit::try_new(z.cross(&target), 1e-12) {
            Some(axis) => {
                let angle = z.dot(&target).clamp(-1.0, 1.0).acos();
                let spin = Rotation3::from_axis_angle(&Vector3::z_axis(), pole_lon_deg.to_radians());
                Rotation3::from_axis_angle(&axis, angle) * spin
            }
            None if target.z > 0.0 => Rotation3::identity(),
            None => Rotation3::from_axis_angle(&Vector3::x_axis(), PI),
        };
        Self { rotation }
    }

    /// Rotated-frame lon/lat to geographic lon/lat (degrees).
    pub fn to_geographic(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        from_cartesian(&(self.rotation * to_cartesian(lon_deg, lat_deg)))
    }

    /// Geographic lon/lat to rotated-frame lon/lat (degrees).
    pub fn to_rotated(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        from_cartesian(&(self.rotation.inverse() * to_cartesian(lon_deg, lat_deg)))
    }
}

/// Schmidt stretching: geographic-frame latitude to computational latitude.
///
/// `tan(pi/4 - phi_c/2) = c tan(pi/4 - phi/2)`; `c = 1` is the identity.
pub fn schmidt_stretch(lat_deg: f64, dilatation: f64) -> f64 {
    let lat = lat_deg.to_radians();
    let t = dilatation * (PI / 4.0 - lat / 2.0).tan();
    (PI / 2.0 - 2.0 * t.atan()).to_degrees()
}

/// Inverse of [`schmidt_stretch`].
pub fn schmidt_unstretch(lat_deg: f64, dilatation: f64) -> f64 {
    schmidt_stretch(lat_deg, 1.0 / dilatation)
}

#[cfg(test)]
mod tests {
    use super::*;

    const R: f64 = 6_371_229.0;

    #[test]
    fn test_distance_quarter_meridian() {
        let d = distance((0.0, 0.0), (0.0, 90.0), R);
        assert!((d - PI / 2.0 * R).abs() < 1e-6);
    }

    #[test]
    fn test_azimuth_cardinal() {
        assert!((azimuth((0.0, 0.0), (0.0, 10.0)) - 0.0).abs() < 1e-9);
        assert!((azimuth((0.0, 0.0), (10.0, 0.0)) - 90.0).abs() < 1e-9);
        assert!((azimuth((0.0, 10.0), (0.0, 0.0)) - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_great_circle_points_equator() {
        let pts = great_circle_points((0.0, 0.0), (30.0, 0.0), 4);
        assert_eq!(pts.len(), 4);
        for (k, (lon, lat)) in pts.iter().enumerate() {
            assert!((lon - 10.0 * k as f64).abs() < 1e-9);
            assert!(lat.abs() < 1e-9);
        }
    }

    #[test]
    fn test_pole_rotation_roundtrip() {
        let rot = PoleRotation::new(-170.0, 40.0);
        let (lon, lat) = rot.to_geographic(0.0, 90.0);
        assert!((lat - 40.0).abs() < 1e-9);
        assert!((lon + 170.0).abs() < 1e-9);

        let (rlon, rlat) = rot.to_rotated(12.0, 47.0);
        let (glon, glat) = rot.to_geographic(rlon, rlat);
        assert!((glon - 12.0).abs() < 1e-9);
        assert!((glat - 47.0).abs() < 1e-9);
    }

    #[test]
    fn test_schmidt_identity_and_inverse() {
        assert!((schmidt_stretch(33.0, 1.0) - 33.0).abs() < 1e-12);
        let s = schmidt_stretch(33.0, 2.4);
        assert!((schmidt_unstretch(s, 2.4) - 33.0).abs() < 1e-9);
    }
}
