//! Column-wise vertical coordinate conversions.
//!
//! Level order follows the hybrid tables: index 0 is the model top.
//! Pressures are in Pa, geopotentials in m2/s2, altitudes in m.

use serde::{Deserialize, Serialize};

use meteo_common::config::PhysicsConfig;

use crate::error::{GeometryError, Result};
use crate::vcoord::{HybridCoefficients, VPosition};

/// How mass-level pressure is derived from the two surrounding half levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalMean {
    #[default]
    Arithmetic,
    Geometric,
}

/// Half-level pressures `A + B ps`, top to bottom.
pub fn hybridp_half_levels(coefficients: &HybridCoefficients, surface_pressure: f64) -> Vec<f64> {
    coefficients
        .a
        .iter()
        .zip(&coefficients.b)
        .map(|(a, b)| a + b * surface_pressure)
        .collect()
}

/// Pressure of a mass level between half levels `p_above` and `p_below`.
fn mass_pressure(p_above: f64, p_below: f64, mean: VerticalMean) -> f64 {
    match mean {
        VerticalMean::Arithmetic => 0.5 * (p_above + p_below),
        VerticalMean::Geometric => {
            if p_above <= 0.0 {
                // top layer: ln(0) is undefined
                0.5 * (p_above + p_below)
            } else if (p_below - p_above).abs() < f64::EPSILON * p_below {
                p_below
            } else {
                ((p_below * p_below.ln() - p_above * p_above.ln()) / (p_below - p_above) - 1.0).exp()
            }
        }
    }
}

/// Mass-level pressures of hybrid-pressure levels `1..=n`, top to bottom.
pub fn hybridp_to_pressure(
    coefficients: &HybridCoefficients,
    surface_pressure: f64,
    mean: VerticalMean,
) -> Result<Vec<f64>> {
    if coefficients.len() < 2 {
        return Err(GeometryError::vertical("hybrid table needs at least 2 half levels"));
    }
    let half = hybridp_half_levels(coefficients, surface_pressure);
    Ok(half.windows(2).map(|w| mass_pressure(w[0], w[1], mean)).collect())
}

/// Gas constant of moist air with condensates.
///
/// `R = Rd + (Rv - Rd) q - Rd (ql + qi + qr + qs + qg)`; specific contents in kg/kg.
pub fn moist_gas_constant(physics: &PhysicsConfig, q: f64, condensates: &[f64]) -> f64 {
    let hydrometeors: f64 = condensates.iter().sum();
    physics.rd + (physics.rv - physics.rd) * q - physics.rd * hydrometeors
}

/// Altitude of hybrid-pressure mass levels by hydrostatic integration.
///
/// `temperature` and `gas_constant` are given per mass level (top to
/// bottom). `pressure_departure` (non-hydrostatic `p - pi`) scales each
/// layer by `pi / (pi + pdep)`.
#[allow(clippy::too_many_arguments)]
pub fn hybridp_to_altitude(
    coefficients: &HybridCoefficients,
    surface_pressure: f64,
    surface_geopotential: f64,
    temperature: &[f64],
    gas_constant: &[f64],
    pressure_departure: Option<&[f64]>,
    mean: VerticalMean,
    physics: &PhysicsConfig,
) -> Result<Vec<f64>> {
    let nlev = coefficients.len().saturating_sub(1);
    if temperature.len() != nlev || gas_constant.len() != nlev {
        return Err(GeometryError::vertical(format!(
            "{} levels in hybrid table, {} temperatures, {} gas constants",
            nlev,
            temperature.len(),
            gas_constant.len()
        )));
    }
    if let Some(pdep) = pressure_departure {
        if pdep.len() != nlev {
            return Err(GeometryError::vertical(format!(
                "{} pressure departures for {} levels",
                pdep.len(),
                nlev
            )));
        }
    }
    let half = hybridp_half_levels(coefficients, surface_pressure);
    let mut altitude = vec![0.0; nlev];
    // geopotential at the bottom half level of the current layer
    let mut phi_half = surface_geopotential;
    for k in (0..nlev).rev() {
        let (p_above, p_below) = (half[k], half[k + 1]);
        let p_mass = mass_pressure(p_above, p_below, mean);
        if p_mass <= 0.0 {
            return Err(GeometryError::vertical(format!("non-positive pressure at level {}", k + 1)));
        }
        let factor = match pressure_departure {
            Some(pdep) => p_mass / (p_mass + pdep[k]),
            None => 1.0,
        };
        let rt = factor * gas_constant[k] * temperature[k];
        altitude[k] = (phi_half + rt * (p_below / p_mass).ln()) / physics.g0;
        if p_above > 0.0 {
            phi_half += rt * (p_below / p_above).ln();
        }
    }
    Ok(altitude)
}

/// Altitude of pressure levels by hydrostatic integration.
///
/// The highest-pressure level is anchored at the surface altitude; each
/// layer above adds `<R T> / g0 * ln(p_low / p_up)`, the layer value being
/// the arithmetic or geometric mean of its two levels. `pressure_departure`
/// (non-hydrostatic `p - pi`) scales each level by `pi / (pi + pdep)`.
/// Output follows input order.
pub fn pressure_to_altitude(
    pressure: &[f64],
    temperature: &[f64],
    gas_constant: &[f64],
    pressure_departure: Option<&[f64]>,
    surface_geopotential: f64,
    mean: VerticalMean,
    physics: &PhysicsConfig,
) -> Result<Vec<f64>> {
    let n = pressure.len();
    if temperature.len() != n || gas_constant.len() != n {
        return Err(GeometryError::vertical(format!(
            "{} pressures, {} temperatures, {} gas constants",
            n,
            temperature.len(),
            gas_constant.len()
        )));
    }
    if let Some(pdep) = pressure_departure {
        if pdep.len() != n {
            return Err(GeometryError::vertical(format!(
                "{} pressure departures for {} levels",
                pdep.len(),
                n
            )));
        }
    }
    if pressure.iter().any(|p| *p <= 0.0) {
        return Err(GeometryError::vertical("pressure levels must be positive"));
    }
    let rt: Vec<f64> = (0..n)
        .map(|k| {
            let factor = match pressure_departure {
                Some(pdep) => pressure[k] / (pressure[k] + pdep[k]),
                None => 1.0,
            };
            factor * gas_constant[k] * temperature[k]
        })
        .collect();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|a, b| pressure[*b].total_cmp(&pressure[*a]));

    let mut altitude = vec![0.0; n];
    let mut previous: Option<usize> = None;
    for k in order {
        altitude[k] = match previous {
            None => surface_geopotential / physics.g0,
            Some(low) => {
                let layer = match mean {
                    VerticalMean::Arithmetic => 0.5 * (rt[low] + rt[k]),
                    VerticalMean::Geometric => (rt[low] * rt[k]).max(0.0).sqrt(),
                };
                altitude[low] + layer / physics.g0 * (pressure[low] / pressure[k]).ln()
            }
        };
        previous = Some(k);
    }
    Ok(altitude)
}

/// Hybrid-height coefficients on mass levels.
///
/// Flux tables (first entry at ground level) are extended one level below
/// ground by symmetry, then averaged pairwise; the last mass level lies
/// half a layer above the top flux level.
pub fn hybridh_mass_coefficients(coefficients: &HybridCoefficients) -> Result<HybridCoefficients> {
    if coefficients.ab_grid_position != VPosition::Flux {
        return Ok(coefficients.clone());
    }
    let n = coefficients.len();
    if n < 2 {
        return Err(GeometryError::vertical("hybrid-height table needs at least 2 flux levels"));
    }
    let (a, b) = (&coefficients.a, &coefficients.b);
    let mut ea = Vec::with_capacity(n + 1);
    let mut eb = Vec::with_capacity(n + 1);
    ea.push(2.0 * a[0] - a[1]);
    eb.push(2.0 * b[0] - b[1]);
    ea.extend_from_slice(a);
    eb.extend_from_slice(b);

    let mut ma: Vec<f64> = ea.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
    let mut mb: Vec<f64> = eb.windows(2).map(|w| 0.5 * (w[0] + w[1])).collect();
    ma.push(a[n - 1] + 0.5 * (a[n - 1] - a[n - 2]));
    mb.push(b[n - 1] + 0.5 * (b[n - 1] - b[n - 2]));
    HybridCoefficients::new(ma, mb, VPosition::Mass)
}

/// Altitude `A + B zs` of hybrid-height levels (indices into the table).
pub fn hybridh_to_altitude(
    coefficients: &HybridCoefficients,
    levels: &[f64],
    surface_altitude: f64,
) -> Result<Vec<f64>> {
    levels
        .iter()
        .map(|level| {
            let k = *level as usize;
            match (coefficients.a.get(k), coefficients.b.get(k)) {
                (Some(a), Some(b)) if *level >= 0.0 => Ok(a + b * surface_altitude),
                _ => Err(GeometryError::vertical(format!(
                    "level {} outside hybrid-height table of length {}",
                    level,
                    coefficients.len()
                ))),
            }
        })
        .collect()
}

/// Height above ground from altitude.
pub fn altitude_to_height(altitude: &[f64], surface_altitude: f64) -> Vec<f64> {
    altitude.iter().map(|z| z - surface_altitude).collect()
}

/// Altitude from height above ground.
pub fn height_to_altitude(height: &[f64], surface_altitude: f64) -> Vec<f64> {
    height.iter().map(|h| h + surface_altitude).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn physics() -> PhysicsConfig {
        PhysicsConfig::default()
    }

    fn sigma_table() -> HybridCoefficients {
        HybridCoefficients::new(vec![0.0, 0.0, 0.0], vec![0.0, 0.5, 1.0], VPosition::Flux).unwrap()
    }

    #[test]
    fn test_hybridp_to_pressure_means() {
        let arith = hybridp_to_pressure(&sigma_table(), 100000.0, VerticalMean::Arithmetic).unwrap();
        assert_eq!(arith, vec![25000.0, 75000.0]);
        let geom = hybridp_to_pressure(&sigma_table(), 100000.0, VerticalMean::Geometric).unwrap();
        // top layer falls back to the arithmetic mean
        assert_eq!(geom[0], 25000.0);
        assert!(geom[1] > 50000.0 && geom[1] < 100000.0);
    }

    #[test]
    fn test_moist_gas_constant_dry() {
        let p = physics();
        assert_eq!(moist_gas_constant(&p, 0.0, &[]), p.rd);
        assert!(moist_gas_constant(&p, 0.01, &[]) > p.rd);
        assert!(moist_gas_constant(&p, 0.0, &[0.001]) < p.rd);
    }

    #[test]
    fn test_hybridp_altitude_increases_upward() {
        let p = physics();
        let z = hybridp_to_altitude(
            &sigma_table(),
            100000.0,
            0.0,
            &[250.0, 280.0],
            &[p.rd, p.rd],
            None,
            VerticalMean::Arithmetic,
            &p,
        )
        .unwrap();
        assert!(z[0] > z[1]);
        let expected = p.rd * 280.0 * (100000.0f64 / 75000.0).ln() / p.g0;
        assert!((z[1] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_pressure_to_altitude_anchor() {
        let p = physics();
        let z = pressure_to_altitude(
            &[50000.0, 100000.0],
            &[250.0, 250.0],
            &[p.rd, p.rd],
            None,
            p.g0 * 100.0,
            VerticalMean::Arithmetic,
            &p,
        )
        .unwrap();
        assert!((z[1] - 100.0).abs() < 1e-9);
        let dz = p.rd * 250.0 / p.g0 * 2.0f64.ln();
        assert!((z[0] - 100.0 - dz).abs() < 1e-6);
    }

    #[test]
    fn test_pressure_to_altitude_mean_and_departure() {
        let p = physics();
        let pressure = [50000.0, 100000.0];
        let t = [220.0, 280.0];
        let r = [p.rd, p.rd];
        let arithmetic = pressure_to_altitude(&pressure, &t, &r, None, 0.0, VerticalMean::Arithmetic, &p).unwrap();
        let geometric = pressure_to_altitude(&pressure, &t, &r, None, 0.0, VerticalMean::Geometric, &p).unwrap();
        let ln2 = 2.0f64.ln();
        assert!((arithmetic[0] - p.rd * 250.0 / p.g0 * ln2).abs() < 1e-6);
        assert!((geometric[0] - p.rd * (220.0f64 * 280.0).sqrt() / p.g0 * ln2).abs() < 1e-6);
        assert!(geometric[0] < arithmetic[0]);

        // a positive departure makes layers thinner
        let pdep = [500.0, 1000.0];
        let nh = pressure_to_altitude(&pressure, &t, &r, Some(&pdep), 0.0, VerticalMean::Arithmetic, &p).unwrap();
        assert!(nh[0] < arithmetic[0]);
        assert!(pressure_to_altitude(&pressure, &t, &r, Some(&[1.0]), 0.0, VerticalMean::Arithmetic, &p).is_err());
    }

    #[test]
    fn test_hybridh_mass_levels() {
        let flux = HybridCoefficients::new(vec![0.0, 100.0, 300.0], vec![1.0, 0.9, 0.7], VPosition::Flux).unwrap();
        let mass = hybridh_mass_coefficients(&flux).unwrap();
        assert_eq!(mass.len(), 4);
        assert_eq!(mass.a, vec![-50.0, 50.0, 200.0, 400.0]);
        let z = hybridh_to_altitude(&mass, &[1.0], 1000.0).unwrap();
        assert!((z[0] - (50.0 + 0.95 * 1000.0)).abs() < 1e-9);
    }
}
