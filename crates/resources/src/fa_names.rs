//! Conventions encoded in FA field names.
//!
//! The level of a field is part of its name (`S090TEMPERATURE` is level 90
//! of the hybrid-pressure coordinate, `P85000TEMPERATURE` the 850 hPa
//! isobaric level) and simulated satellite channels carry their
//! satellite, sensor and channel (`C062_METEOSAT_09`).

use meteo_common::constants::surface;

use crate::error::{ResourceError, Result};

/// Local GRIB2 parameter categories of simulated satellites.
const SATELLITES: [(&str, u8); 6] = [
    ("METEOSAT7", 192),
    ("METEOSAT8", 193),
    ("METEOSAT9", 194),
    ("GOES11", 195),
    ("GOES12", 196),
    ("MTSAT1", 197),
];

/// Local GRIB2 parameter numbers of simulated sensors.
const SENSORS: [(&str, u8); 3] = [("MVIRI", 192), ("SEVIRI", 193), ("IMAGER", 194)];

fn digits(name: &str, start: usize, end: usize) -> Option<f64> {
    name.get(start..end)?.trim().parse::<i64>().ok().map(|v| v as f64)
}

/// Level of a field of surface type `typeoffirstfixedsurface`, from its name.
pub fn level_from_name(name: &str, typeoffirstfixedsurface: u16) -> f64 {
    match typeoffirstfixedsurface {
        surface::HYBRID_PRESSURE => digits(name, 1, 4).unwrap_or(0.0),
        surface::ISOBARIC => {
            // 5 digits of Pa: 1000 hPa overflows to 00000
            let pa = match digits(name, 1, 6) {
                Some(p) if p == 0.0 => 100_000.0,
                Some(p) => p,
                None => 0.0,
            };
            pa / 100.0
        }
        surface::HEIGHT => digits(name, 1, 6).unwrap_or(255.0),
        surface::POTENTIAL_VORTICITY => digits(name, 1, 4).map_or(0.0, |v| v / 10.0),
        surface::ISOTHERMAL => {
            if name.starts_with("KT") {
                digits(name, 2, 5).unwrap_or(0.0)
            } else if name.starts_with('T') {
                digits(name, 1, 4).unwrap_or(0.0)
            } else {
                0.0
            }
        }
        _ => 0.0,
    }
}

/// Satellite channel of a simulated-image field: (category, number, channel).
pub fn satellite_channel(name: &str) -> Option<(u8, u8, f64)> {
    if !name.starts_with('C') {
        return None;
    }
    let name = name.trim();
    let channel = digits(name, 1, 4)?;
    let (satellite, sensor) = if name.contains("METEOSAT") {
        let number = digits(name, name.len().checked_sub(2)?, name.len())? as i64;
        let sensor = if number <= 7 { "MVIRI" } else { "SEVIRI" };
        (format!("METEOSAT{}", number), sensor)
    } else if name.contains("GOES") {
        (format!("GOES{}", digits(name, 10, 12)? as i64), "IMAGER")
    } else if name.contains("MTSAT") {
        (format!("MTSAT{}", digits(name, 11, 13)? as i64), "IMAGER")
    } else {
        return None;
    };
    let category = SATELLITES.iter().find(|(s, _)| *s == satellite)?.1;
    let number = SENSORS.iter().find(|(s, _)| *s == sensor)?.1;
    Some((category, number, channel))
}

/// Substrings that tell the U and V components of the fields of a wind seed.
///
/// `first` is the first field matching the seed; `CLS` seeds are ambiguous
/// between mean wind and gusts without it.
pub fn uv_markers(seed: &str, first: Option<&str>) -> Result<(&'static str, &'static str)> {
    let first = first.unwrap_or("");
    if seed.starts_with('S') {
        Ok(("WIND.U.PHYS", "WIND.V.PHYS"))
    } else if seed.starts_with(['P', 'H', 'V']) {
        Ok(("VENT_ZONAL", "VENT_MERID"))
    } else if seed.starts_with("CLS") && first.contains("VENT") {
        if seed.starts_with("CLSVENTNEUTRE") {
            Ok(("CLSVENTNEUTRE.U", "CLSVENTNEUTRE.V"))
        } else {
            Ok(("VENT.ZONAL", "VENT.MERIDIEN"))
        }
    } else if seed.starts_with("CLS") && first.contains("RAF") {
        Ok(("CLSU", "CLSV"))
    } else {
        Err(ResourceError::unsupported(format!(
            "cannot split '{}' into wind components",
            seed
        )))
    }
}

/// Physical parameter of a level-dependent name: `S090TEMPERATURE` -> `TEMPERATURE`.
pub fn parameter_of(name: &str) -> String {
    name.chars().skip(1).filter(|c| !c.is_ascii_digit()).collect()
}

/// Term in hours of a MOCAGE multi-term surface field (`SF`, `EM`, `DV` + 2 digits).
pub fn mocage_term_hours(name: &str) -> Option<i64> {
    let prefix = name.get(0..2)?;
    if !matches!(prefix, "SF" | "EM" | "DV") {
        return None;
    }
    digits(name, 2, 4).map(|h| h as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hybrid_level() {
        assert_eq!(level_from_name("S090TEMPERATURE", surface::HYBRID_PRESSURE), 90.0);
    }

    #[test]
    fn test_isobaric_level() {
        assert_eq!(level_from_name("P85000TEMPERATURE", surface::ISOBARIC), 850.0);
        assert_eq!(level_from_name("P00000TEMPERATURE", surface::ISOBARIC), 1000.0);
        assert_eq!(level_from_name("P00500TEMPERATURE", surface::ISOBARIC), 5.0);
    }

    #[test]
    fn test_height_level() {
        assert_eq!(level_from_name("H00020TEMPERATURE", surface::HEIGHT), 20.0);
        assert_eq!(level_from_name("CLSTEMPERATURE", surface::HEIGHT), 255.0);
    }

    #[test]
    fn test_pv_and_isothermal_levels() {
        assert_eq!(level_from_name("V015TEMPERATURE", surface::POTENTIAL_VORTICITY), 1.5);
        assert_eq!(level_from_name("KT273ISOT_ALTIT", surface::ISOTHERMAL), 273.0);
        assert_eq!(level_from_name("T263ISOT_ALTIT", surface::ISOTHERMAL), 263.0);
        assert_eq!(level_from_name("SURFTEMPERATURE", surface::GROUND), 0.0);
    }

    #[test]
    fn test_satellite_channels() {
        assert_eq!(satellite_channel("C062_METEOSAT_09"), Some((194, 193, 62.0)));
        assert_eq!(satellite_channel("C011_METEOSAT_07"), Some((192, 192, 11.0)));
        assert_eq!(satellite_channel("C004_GOES_12_IMA"), Some((196, 194, 4.0)));
        assert_eq!(satellite_channel("C001_MTSAT_01_IMA"), Some((197, 194, 1.0)));
        assert_eq!(satellite_channel("CLSTEMPERATURE"), None);
    }

    #[test]
    fn test_uv_markers() {
        assert_eq!(uv_markers("S0", None).unwrap(), ("WIND.U.PHYS", "WIND.V.PHYS"));
        assert_eq!(uv_markers("P850", None).unwrap(), ("VENT_ZONAL", "VENT_MERID"));
        assert_eq!(
            uv_markers("CLSVENTNEUTRE", Some("CLSVENTNEUTRE.U")).unwrap(),
            ("CLSVENTNEUTRE.U", "CLSVENTNEUTRE.V")
        );
        assert_eq!(
            uv_markers("CLS", Some("CLSVENT.MERIDIEN")).unwrap(),
            ("VENT.ZONAL", "VENT.MERIDIEN")
        );
        assert_eq!(uv_markers("CLS", Some("CLSU.RAF.MOD.XFU")).unwrap(), ("CLSU", "CLSV"));
        assert!(uv_markers("SURF", None).is_ok());
        assert!(uv_markers("MSL", None).is_err());
    }

    #[test]
    fn test_parameter_and_mocage() {
        assert_eq!(parameter_of("S090TEMPERATURE"), "TEMPERATURE");
        assert_eq!(parameter_of("P85000VENT_ZONAL"), "VENT_ZONAL");
        assert_eq!(mocage_term_hours("SF03O3"), Some(3));
        assert_eq!(mocage_term_hours("SURFTEMPERATURE"), None);
    }
}
