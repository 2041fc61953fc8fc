//! GRIB2 parameter and level lookup tables.
//!
//! Built-in tables cover the WMO parameters most commonly exchanged; more
//! can be registered at run time.

use std::collections::HashMap;

/// Lookup key for parameter: (discipline, category, number)
pub type ParamKey = (u8, u8, u8);

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub short_name: String,
    pub name: String,
    pub units: String,
}

/// Level description - either static text or a template with {value} placeholder
#[derive(Debug, Clone)]
pub enum LevelDescription {
    Static(String),
    /// `{value}` is the level; `{value_hpa}` the level converted from Pa.
    Template(String),
}

impl LevelDescription {
    pub fn format(&self, value: f64) -> String {
        match self {
            LevelDescription::Static(s) => s.clone(),
            LevelDescription::Template(t) => t
                .replace("{value}", &value.to_string())
                .replace("{value_hpa}", &(value / 100.0).to_string()),
        }
    }
}

const PARAMETERS: &[(ParamKey, &str, &str, &str)] = &[
    ((0, 0, 0), "t", "Temperature", "K"),
    ((0, 0, 6), "dpt", "Dew point temperature", "K"),
    ((0, 1, 0), "q", "Specific humidity", "kg kg-1"),
    ((0, 1, 1), "r", "Relative humidity", "%"),
    ((0, 1, 8), "tp", "Total precipitation", "kg m-2"),
    ((0, 1, 83), "clwc", "Specific cloud liquid water content", "kg kg-1"),
    ((0, 1, 84), "ciwc", "Specific cloud ice water content", "kg kg-1"),
    ((0, 1, 85), "crwc", "Specific rain water content", "kg kg-1"),
    ((0, 1, 86), "cswc", "Specific snow water content", "kg kg-1"),
    ((0, 1, 32), "grle", "Graupel", "kg kg-1"),
    ((0, 2, 2), "u", "U component of wind", "m s-1"),
    ((0, 2, 3), "v", "V component of wind", "m s-1"),
    ((0, 2, 8), "w", "Vertical velocity", "Pa s-1"),
    ((0, 2, 22), "fg", "Wind speed (gust)", "m s-1"),
    ((0, 3, 0), "pres", "Pressure", "Pa"),
    ((0, 3, 1), "prmsl", "Pressure reduced to MSL", "Pa"),
    ((0, 3, 4), "z", "Geopotential", "m2 s-2"),
    ((0, 3, 5), "gh", "Geopotential height", "gpm"),
    ((0, 6, 1), "tcc", "Total cloud cover", "%"),
    ((0, 19, 0), "vis", "Visibility", "m"),
    ((2, 0, 0), "lsm", "Land cover (1 = land, 0 = sea)", "Proportion"),
    ((10, 3, 0), "sst", "Sea surface temperature", "K"),
];

const LEVELS: &[(u16, &str, bool)] = &[
    (1, "surface", false),
    (8, "top of atmosphere", false),
    (100, "{value_hpa} hPa", true),
    (101, "mean sea level", false),
    (102, "{value} m above mean sea level", true),
    (103, "{value} m above ground", true),
    (105, "hybrid level {value}", true),
    (118, "hybrid height level {value}", true),
    (119, "hybrid pressure level {value}", true),
];

/// GRIB2 parameter and level lookup tables.
#[derive(Debug, Clone, Default)]
pub struct Grib2Tables {
    parameters: HashMap<ParamKey, Parameter>,
    levels: HashMap<u16, LevelDescription>,
}

impl Grib2Tables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables filled with the built-in parameters and levels.
    pub fn builtin() -> Self {
        let mut tables = Self::new();
        for ((d, c, n), short_name, name, units) in PARAMETERS {
            tables.add_parameter(
                *d,
                *c,
                *n,
                Parameter {
                    short_name: short_name.to_string(),
                    name: name.to_string(),
                    units: units.to_string(),
                },
            );
        }
        for (level_type, text, template) in LEVELS {
            let description = if *template {
                LevelDescription::Template(text.to_string())
            } else {
                LevelDescription::Static(text.to_string())
            };
            tables.add_level(*level_type, description);
        }
        tables
    }

    pub fn add_parameter(&mut self, discipline: u8, category: u8, number: u8, parameter: Parameter) {
        self.parameters.insert((discipline, category, number), parameter);
    }

    pub fn add_level(&mut self, level_type: u16, description: LevelDescription) {
        self.levels.insert(level_type, description);
    }

    pub fn parameter(&self, discipline: u8, category: u8, number: u8) -> Option<&Parameter> {
        self.parameters.get(&(discipline, category, number))
    }

    /// Codes of a short name, if registered.
    pub fn parameter_by_short_name(&self, short_name: &str) -> Option<ParamKey> {
        let mut keys: Vec<_> = self
            .parameters
            .iter()
            .filter(|(_, p)| p.short_name == short_name)
            .map(|(k, _)| *k)
            .collect();
        keys.sort_unstable();
        keys.into_iter().next()
    }

    /// Short name, or "P{discipline}_{category}_{number}" if unknown.
    pub fn get_parameter_name(&self, discipline: u8, category: u8, number: u8) -> String {
        self.parameter(discipline, category, number)
            .map(|p| p.short_name.clone())
            .unwrap_or_else(|| format!("P{}_{}_{}", discipline, category, number))
    }

    pub fn get_level_description(&self, level_type: u16, level_value: f64) -> String {
        match self.levels.get(&level_type) {
            Some(desc) => desc.format(level_value),
            None => format!("Level type {} value {}", level_type, level_value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_parameters() {
        let tables = Grib2Tables::builtin();
        assert_eq!(tables.get_parameter_name(0, 0, 0), "t");
        assert_eq!(tables.parameter(0, 2, 2).unwrap().units, "m s-1");
        assert_eq!(tables.get_parameter_name(0, 250, 1), "P0_250_1");
        assert_eq!(tables.parameter_by_short_name("v"), Some((0, 2, 3)));
        assert_eq!(tables.parameter_by_short_name("nope"), None);
    }

    #[test]
    fn test_level_descriptions() {
        let tables = Grib2Tables::builtin();
        assert_eq!(tables.get_level_description(100, 85000.0), "850 hPa");
        assert_eq!(tables.get_level_description(103, 2.0), "2 m above ground");
        assert_eq!(tables.get_level_description(1, 0.0), "surface");
        assert_eq!(tables.get_level_description(7, 0.0), "Level type 7 value 0");
    }
}
