//! Physical constants and WMO code values.

/// Standard gravity (m s-2).
pub const G0: f64 = 9.80665;
/// Specific heat of dry air at constant pressure (J kg-1 K-1).
pub const CPD: f64 = 1004.709;
/// Gas constant of dry air (J kg-1 K-1).
pub const RD: f64 = 287.059;
/// Gas constant of water vapour (J kg-1 K-1).
pub const RV: f64 = 461.524;
/// Radius of the spherical geoid (m).
pub const EARTH_RADIUS: f64 = 6_371_229.0;
/// Reference pressure of FA hybrid coefficients (Pa).
pub const FA_REFERENCE_PRESSURE: f64 = 101_325.0;
/// Value given to gridpoints outside the domain or in reduced-grid padding.
pub const MASK_OUTSIDE: f64 = 1e19;

/// Type-of-surface codes (GRIB2 code table 4.5) used by vertical coordinates.
pub mod surface {
    pub const GROUND: u16 = 1;
    pub const CLOUD_BASE: u16 = 2;
    pub const ISOTHERM_ZERO: u16 = 4;
    pub const TROPOPAUSE: u16 = 7;
    pub const TOP_OF_ATMOSPHERE: u16 = 8;
    pub const SEA_BOTTOM: u16 = 9;
    pub const POTENTIAL_VORTICITY: u16 = 109;
    pub const ISOBARIC: u16 = 100;
    pub const MEAN_SEA_LEVEL: u16 = 101;
    pub const ALTITUDE: u16 = 102;
    pub const HEIGHT: u16 = 103;
    pub const HYBRID_HEIGHT: u16 = 118;
    pub const HYBRID_PRESSURE: u16 = 119;
    pub const ISOTHERMAL: u16 = 20;
    pub const UNKNOWN: u16 = 255;
}

/// Process type codes stored in FA date arrays.
pub mod processtype {
    pub const ANALYSIS: i64 = 0;
    pub const INITIALIZATION: i64 = 1;
    pub const FORCINGS: i64 = 9;
    pub const FORECAST: i64 = 10;
    pub const UNKNOWN: i64 = 255;
}
