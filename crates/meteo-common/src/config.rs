//! Engine configuration.
//!
//! Loaded once per process from `$CONFIG_DIR/engine.yaml` (falling back to
//! `config/engine.yaml`). A missing file means defaults; every key is
//! optional so a user file only needs to list what it overrides.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{debug, error, warn};

use crate::constants;
use crate::error::{MeteoError, MeteoResult};

static GLOBAL_CONFIG: OnceLock<EngineConfig> = OnceLock::new();

/// Directory holding `engine.yaml` and user field dictionaries.
pub fn config_dir() -> PathBuf {
    if let Ok(config_dir) = env::var("CONFIG_DIR") {
        PathBuf::from(config_dir)
    } else {
        PathBuf::from("config")
    }
}

/// Directory holding user field dictionaries (`<format>.csv`).
pub fn field_dicts_dir() -> PathBuf {
    config_dir().join("field_dicts")
}

// ============================================================================
// Sections
// ============================================================================

/// Physical constants used by vertical-coordinate conversions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PhysicsConfig {
    pub g0: f64,
    pub cpd: f64,
    pub rd: f64,
    pub rv: f64,
}

impl Default for PhysicsConfig {
    fn default() -> Self {
        Self {
            g0: constants::G0,
            cpd: constants::CPD,
            rd: constants::RD,
            rv: constants::RV,
        }
    }
}

/// Ordering of spectral coefficients handed to the transform service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CoefficientOrder {
    /// Order used internally by the model.
    #[default]
    Model,
    /// Order used on disk by FA files.
    #[serde(rename = "FA")]
    Fa,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectralConfig {
    /// Maximum number of resolutions handled by the transform service.
    pub knummaxresol: i32,
    /// Fraction of total memory a legendre transform may claim.
    pub prevent_swapping_legendre: f64,
    pub coeff_order: CoefficientOrder,
}

impl Default for SpectralConfig {
    fn default() -> Self {
        Self {
            knummaxresol: 10,
            prevent_swapping_legendre: 0.75,
            coeff_order: CoefficientOrder::Model,
        }
    }
}

/// FA compression parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FaCompression {
    /// 0: no packing, otherwise packed.
    #[serde(rename = "KNGRIB")]
    pub kngrib: i64,
    /// Bits per gridpoint value.
    #[serde(rename = "KNBPDG")]
    pub knbpdg: i64,
    /// Bits per spectral coefficient.
    #[serde(rename = "KNBCSP")]
    pub knbcsp: i64,
    /// Truncation below which spectral coefficients are not packed.
    #[serde(rename = "KSTRON")]
    pub kstron: i64,
    /// Laplacian power used for spectral packing.
    #[serde(rename = "KPUILA")]
    pub kpuila: i64,
    #[serde(rename = "KDMOPL")]
    pub kdmopl: i64,
}

impl Default for FaCompression {
    fn default() -> Self {
        Self {
            kngrib: 2,
            knbpdg: 16,
            knbcsp: 16,
            kstron: 0,
            kpuila: 0,
            kdmopl: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FaConfig {
    pub default_compression: FaCompression,
    pub reference_pressure: f64,
    /// Store dates with second precision.
    pub fandax: bool,
}

impl Default for FaConfig {
    fn default() -> Self {
        Self {
            default_compression: FaCompression::default(),
            reference_pressure: constants::FA_REFERENCE_PRESSURE,
            fandax: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LfaConfig {
    pub max_num_fields: usize,
    pub maxstrlen: usize,
}

impl Default for LfaConfig {
    fn default() -> Self {
        Self {
            max_num_fields: 1000,
            maxstrlen: 200,
        }
    }
}

/// Production parameters written in GRIB2 sections 1 and 4.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GribConfig {
    pub tables_version: u8,
    pub centre: u16,
    pub generating_process_identifier: u8,
    pub production_status: u8,
    pub type_of_processed_data: u8,
    pub type_of_generating_process: u8,
    pub bits_per_value: u8,
}

impl Default for GribConfig {
    fn default() -> Self {
        Self {
            tables_version: 14,
            centre: 85,
            generating_process_identifier: 254,
            production_status: 2,
            type_of_processed_data: 2,
            type_of_generating_process: 2,
            bits_per_value: 16,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetCdfConfig {
    /// Logical axis (X, Y, Z, T, N) to the dimension names recognised for it.
    pub dimension_aliases: BTreeMap<String, Vec<String>>,
    pub default_compression: u8,
}

impl Default for NetCdfConfig {
    fn default() -> Self {
        let aliases = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        let mut dimension_aliases = BTreeMap::new();
        dimension_aliases.insert(
            "X".to_string(),
            aliases(&[
                "xx",
                "x",
                "X",
                "LON",
                "lon",
                "Nbre_lon",
                "longitude",
                "max_lon_number",
            ]),
        );
        dimension_aliases.insert(
            "Y".to_string(),
            aliases(&[
                "yy", "y", "Y", "LAT", "lat", "Nbre_lat", "latitude", "lat_number",
            ]),
        );
        dimension_aliases.insert("Z".to_string(), aliases(&["zz", "z", "Z", "level"]));
        dimension_aliases.insert("T".to_string(), aliases(&["time", "validity"]));
        dimension_aliases.insert(
            "N".to_string(),
            aliases(&["transect", "obs", "profile"]),
        );
        Self {
            dimension_aliases,
            default_compression: 4,
        }
    }
}

// ============================================================================
// Engine configuration
// ============================================================================

/// Process-wide configuration of the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub physics: PhysicsConfig,
    pub spectral: SpectralConfig,
    #[serde(rename = "FA")]
    pub fa: FaConfig,
    #[serde(rename = "LFA")]
    pub lfa: LfaConfig,
    #[serde(rename = "GRIB")]
    pub grib: GribConfig,
    #[serde(rename = "netCDF")]
    pub netcdf: NetCdfConfig,
    /// Radius of the spherical geoid (m).
    pub geoid_radius: f64,
    /// Value given to points outside the domain.
    pub mask_outside: f64,
    /// Refuse to overwrite an existing file opened in write mode.
    pub protect_unhappy_writes: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            physics: PhysicsConfig::default(),
            spectral: SpectralConfig::default(),
            fa: FaConfig::default(),
            lfa: LfaConfig::default(),
            grib: GribConfig::default(),
            netcdf: NetCdfConfig::default(),
            geoid_radius: constants::EARTH_RADIUS,
            mask_outside: constants::MASK_OUTSIDE,
            protect_unhappy_writes: false,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration file.
    pub fn load_from(path: &Path) -> MeteoResult<Self> {
        let content = fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        debug!(path = ?path, "Loaded engine configuration");
        Ok(config)
    }

    /// Configuration from the configuration directory, or defaults.
    pub fn load() -> MeteoResult<Self> {
        let path = config_dir().join("engine.yaml");
        if !path.exists() {
            debug!(path = ?path, "No engine configuration file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Process-wide configuration, loaded on first access.
    ///
    /// An unreadable or invalid file is reported and replaced by defaults.
    pub fn global() -> &'static EngineConfig {
        GLOBAL_CONFIG.get_or_init(|| match Self::load() {
            Ok(config) => config,
            Err(e) => {
                error!(error = %e, "Invalid engine configuration, falling back to defaults");
                Self::default()
            }
        })
    }

    /// Install a configuration before first use. Returns false if one was already set.
    pub fn install(config: EngineConfig) -> bool {
        let installed = GLOBAL_CONFIG.set(config).is_ok();
        if !installed {
            warn!("Engine configuration already initialized, ignoring install");
        }
        installed
    }

    fn validate(&self) -> MeteoResult<()> {
        if !(0.0..=1.0).contains(&self.spectral.prevent_swapping_legendre) {
            return Err(MeteoError::config(format!(
                "prevent_swapping_legendre must lie in [0, 1], got {}",
                self.spectral.prevent_swapping_legendre
            )));
        }
        if self.geoid_radius <= 0.0 {
            return Err(MeteoError::config("geoid_radius must be positive"));
        }
        for bits in [
            self.fa.default_compression.knbpdg,
            self.fa.default_compression.knbcsp,
        ] {
            if !(0..=32).contains(&bits) {
                return Err(MeteoError::config(format!(
                    "FA packing bits must lie in [0, 32], got {}",
                    bits
                )));
            }
        }
        Ok(())
    }

    /// Find which logical axis a netCDF dimension name stands for.
    pub fn netcdf_axis_of(&self, dimension: &str) -> Option<&str> {
        self.netcdf
            .dimension_aliases
            .iter()
            .find(|(_, names)| names.iter().any(|n| n == dimension))
            .map(|(axis, _)| axis.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!((config.physics.g0 - 9.80665).abs() < 1e-12);
        assert_eq!(config.spectral.knummaxresol, 10);
        assert_eq!(config.fa.default_compression.kngrib, 2);
        assert_eq!(config.grib.centre, 85);
        assert_eq!(config.netcdf_axis_of("longitude"), Some("X"));
        assert_eq!(config.netcdf_axis_of("level"), Some("Z"));
        assert_eq!(config.netcdf_axis_of("foo"), None);
    }

    #[test]
    fn test_partial_file_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "spectral:\n  coeff_order: FA\nFA:\n  default_compression:\n    KNBPDG: 24\ngeoid_radius: 6371000.0"
        )
        .unwrap();

        let config = EngineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.spectral.coeff_order, CoefficientOrder::Fa);
        assert_eq!(config.fa.default_compression.knbpdg, 24);
        assert_eq!(config.fa.default_compression.knbcsp, 16);
        assert!((config.geoid_radius - 6371000.0).abs() < 1e-9);
        assert_eq!(config.spectral.knummaxresol, 10);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "spectral:\n  prevent_swapping_legendre: 2.0").unwrap();
        assert!(matches!(
            EngineConfig::load_from(file.path()),
            Err(MeteoError::Config(_))
        ));
    }
}
