//! Common test fixtures for meteo-resources tests.
//!
//! Plain-data descriptions of small geometries and dates used across the
//! crates' tests. Crates build their own typed objects from these.

/// Small limited-area grid: 5x5 points, CI zone 5x5, C zone 3x3.
pub mod lam {
    pub const X: usize = 5;
    pub const Y: usize = 5;
    pub const X_CIZONE: usize = 5;
    pub const Y_CIZONE: usize = 5;
    pub const IWIDTH: usize = 1;
    /// Grid spacing in meters for projected variants.
    pub const RESOLUTION_M: f64 = 2500.0;
    /// Grid spacing in degrees for lon-lat variants.
    pub const RESOLUTION_DEG: f64 = 0.5;
    /// Center point (lon, lat) of the domain.
    pub const CENTER: (f64, f64) = (2.0, 45.0);
    /// Reference latitude / longitude for Lambert variants.
    pub const REFERENCE: (f64, f64) = (2.0, 45.0);
}

/// Regular lon-lat grids.
pub mod lonlat {
    /// Global 1-degree grid, first point at (0E, 90N).
    pub const GLOBAL_1DEG: GridSpec = GridSpec {
        width: 360,
        height: 181,
        first_lon: 0.0,
        first_lat: 90.0,
        dx: 1.0,
        dy: -1.0,
    };

    /// Coarse global grid, handy for wrap-around checks.
    pub const GLOBAL_45DEG: GridSpec = GridSpec {
        width: 8,
        height: 5,
        first_lon: 0.0,
        first_lat: 90.0,
        dx: 45.0,
        dy: -45.0,
    };

    /// Simple 10x10 regional grid over France.
    pub const FRANCE_10X10: GridSpec = GridSpec {
        width: 10,
        height: 10,
        first_lon: -2.0,
        first_lat: 42.0,
        dx: 1.0,
        dy: 1.0,
    };

    /// Regular lon-lat grid specification.
    #[derive(Debug, Clone, Copy)]
    pub struct GridSpec {
        pub width: usize,
        pub height: usize,
        pub first_lon: f64,
        pub first_lat: f64,
        pub dx: f64,
        pub dy: f64,
    }

    impl GridSpec {
        /// Returns the total number of gridpoints.
        pub fn size(&self) -> usize {
            self.width * self.height
        }

        /// Returns (lon, lat) of the last gridpoint.
        pub fn last_point(&self) -> (f64, f64) {
            (
                self.first_lon + (self.width - 1) as f64 * self.dx,
                self.first_lat + (self.height - 1) as f64 * self.dy,
            )
        }
    }
}

/// Tiny reduced Gaussian grid.
pub mod gauss {
    /// Longitudes per latitude row, north to south.
    pub const LON_NUMBER_BY_LAT: [usize; 4] = [8, 12, 12, 8];

    /// Total number of gridpoints.
    pub fn size() -> usize {
        LON_NUMBER_BY_LAT.iter().sum()
    }
}

/// Common dates for validity tests.
pub mod time {
    /// Reference basis (2024-01-15T00:00:00Z).
    pub const BASIS: &str = "2024-01-15T00:00:00Z";

    /// Compact form of the basis.
    pub const BASIS_COMPACT: &str = "20240115000000";

    /// Common forecast terms in hours.
    pub const TERMS_HOURS: [u32; 6] = [0, 1, 3, 6, 12, 24];
}

/// Field identifiers by format.
pub mod fields {
    pub const FA_SURFACE_TEMPERATURE: &str = "SURFTEMPERATURE";
    pub const FA_T2M: &str = "CLSTEMPERATURE";
    pub const FA_HYBRID_TEMPERATURE: &str = "S090TEMPERATURE";
    pub const FA_ISOBARIC_WIND: &str = "P85000VENT_ZONAL";
    pub const LFI_FIELD: (&str, u32) = ("UT", 0);
    pub const NETCDF_VARIABLE: &str = "temperature";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_spec_size() {
        assert_eq!(lonlat::GLOBAL_1DEG.size(), 360 * 181);
        assert_eq!(lonlat::FRANCE_10X10.size(), 100);
    }

    #[test]
    fn test_grid_spec_last_point() {
        let (lon, lat) = lonlat::GLOBAL_1DEG.last_point();
        assert!((lon - 359.0).abs() < 1e-12);
        assert!((lat + 90.0).abs() < 1e-12);
    }

    #[test]
    fn test_lam_zones_fit() {
        assert_eq!(lam::X_CIZONE - 2 * lam::IWIDTH, 3);
        assert!(lam::X_CIZONE <= lam::X);
    }

    #[test]
    fn test_gauss_size() {
        assert_eq!(gauss::size(), 40);
    }
}
