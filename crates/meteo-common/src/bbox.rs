//! Lon/lat bounding boxes used to zoom fields.

use serde::{Deserialize, Serialize};

/// A geographic bounding box in degrees.
///
/// When `lonmin > lonmax` the box crosses the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub lonmin: f64,
    pub latmin: f64,
    pub lonmax: f64,
    pub latmax: f64,
}

impl BoundingBox {
    /// Create a new bounding box from corner coordinates.
    pub fn new(lonmin: f64, latmin: f64, lonmax: f64, latmax: f64) -> Self {
        Self {
            lonmin,
            latmin,
            lonmax,
            latmax,
        }
    }

    /// Parse a "lonmin,latmin,lonmax,latmax" string.
    pub fn from_str_list(s: &str) -> Result<Self, BboxParseError> {
        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 4 {
            return Err(BboxParseError::InvalidFormat(s.to_string()));
        }
        let parse = |p: &str| -> Result<f64, BboxParseError> {
            p.parse()
                .map_err(|_| BboxParseError::InvalidNumber(p.to_string()))
        };

        let bbox = Self::new(
            parse(parts[0])?,
            parse(parts[1])?,
            parse(parts[2])?,
            parse(parts[3])?,
        );
        if bbox.latmin > bbox.latmax {
            return Err(BboxParseError::InvalidFormat(format!(
                "{} (latmin > latmax)",
                s
            )));
        }
        Ok(bbox)
    }

    /// True if the box spans the antimeridian.
    pub fn crosses_antimeridian(&self) -> bool {
        self.lonmin > self.lonmax
    }

    /// Longitudinal extent in degrees.
    pub fn width(&self) -> f64 {
        if self.crosses_antimeridian() {
            self.lonmax + 360.0 - self.lonmin
        } else {
            self.lonmax - self.lonmin
        }
    }

    /// Latitudinal extent in degrees.
    pub fn height(&self) -> f64 {
        self.latmax - self.latmin
    }

    /// Check if a point is contained within this box.
    ///
    /// Longitudes are compared modulo 360.
    pub fn contains_point(&self, lon: f64, lat: f64) -> bool {
        if lat < self.latmin || lat > self.latmax {
            return false;
        }
        let lon = normalize_lon(lon, self.lonmin);
        let lonmax = normalize_lon(self.lonmax, self.lonmin);
        if self.crosses_antimeridian() || lonmax < self.lonmin {
            lon >= self.lonmin && lon <= lonmax + 360.0
        } else {
            lon >= self.lonmin && lon <= lonmax
        }
    }

    /// Check if this box intersects another one (antimeridian-naive).
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        self.lonmin < other.lonmax
            && self.lonmax > other.lonmin
            && self.latmin < other.latmax
            && self.latmax > other.latmin
    }
}

/// Bring `lon` into `[reference, reference + 360)`.
pub fn normalize_lon(lon: f64, reference: f64) -> f64 {
    let mut l = lon;
    while l < reference {
        l += 360.0;
    }
    while l >= reference + 360.0 {
        l -= 360.0;
    }
    l
}

/// Bring `lon` into `[-180, 180)`.
pub fn degrees_nearest_mod(lon: f64) -> f64 {
    normalize_lon(lon, -180.0)
}

#[derive(Debug, thiserror::Error)]
pub enum BboxParseError {
    #[error("Invalid bounding box: {0}. Expected 'lonmin,latmin,lonmax,latmax'")]
    InvalidFormat(String),

    #[error("Invalid number in bounding box: {0}")]
    InvalidNumber(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bbox() {
        let bbox = BoundingBox::from_str_list("-5.0,42.0,8.5,51.0").unwrap();
        assert_eq!(bbox.lonmin, -5.0);
        assert_eq!(bbox.latmin, 42.0);
        assert_eq!(bbox.lonmax, 8.5);
        assert_eq!(bbox.latmax, 51.0);
    }

    #[test]
    fn test_contains_across_antimeridian() {
        let bbox = BoundingBox::new(170.0, -10.0, -170.0, 10.0);
        assert!(bbox.crosses_antimeridian());
        assert!(bbox.contains_point(175.0, 0.0));
        assert!(bbox.contains_point(-175.0, 0.0));
        assert!(!bbox.contains_point(0.0, 0.0));
        assert!((bbox.width() - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_lon() {
        assert!((degrees_nearest_mod(190.0) - (-170.0)).abs() < 1e-12);
        assert!((normalize_lon(-10.0, 0.0) - 350.0).abs() < 1e-12);
    }
}
