//! Spectral space and truncation of spectral fields.

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use geometry::{Geometry, GeometryName};
use meteo_common::config::{CoefficientOrder, EngineConfig};

use crate::error::{Result, SpectralError};
use crate::memory::total_system_memory;
use crate::service::{transform_service, GaussTransform, LamTransform, TransformService};

/// Spectral space of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpectralSpace {
    /// Spherical harmonics of global Gaussian grids.
    #[serde(rename = "legendre")]
    Legendre,
    /// Double Fourier series of limited-area grids.
    #[serde(rename = "bi-fourier")]
    BiFourier,
    /// Fourier series of 1-D grids.
    #[serde(rename = "fourier")]
    Fourier,
}

impl SpectralSpace {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legendre => "legendre",
            Self::BiFourier => "bi-fourier",
            Self::Fourier => "fourier",
        }
    }
}

impl fmt::Display for SpectralSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Spectral truncation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "lowercase")]
pub enum Truncation {
    /// Global triangular truncation.
    Triangular {
        max: usize,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max_zonal_wavenumber_by_lat: Option<Vec<usize>>,
    },
    /// Limited-area (or 1-D) elliptic truncation.
    Elliptic { in_x: usize, in_y: usize },
}

/// Gridpoint dimensions handed to the transform service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GpDims {
    pub x: usize,
    pub y: usize,
    pub x_cizone: usize,
    pub y_cizone: usize,
    pub x_resolution: f64,
    pub y_resolution: f64,
    pub lat_number: usize,
    pub lon_number_by_lat: Vec<usize>,
}

impl GpDims {
    /// Dimensions of a gridpoint geometry.
    pub fn from_geometry(geometry: &Geometry) -> Result<Self> {
        let d = &geometry.dimensions;
        if geometry.name.is_gauss() {
            let rows = geometry
                .lon_number_by_lat()
                .map_err(|e| SpectralError::invalid(e.to_string()))?;
            return Ok(Self {
                x: d.x,
                y: d.y,
                lat_number: d.y,
                lon_number_by_lat: rows.to_vec(),
                ..Default::default()
            });
        }
        let grid = geometry
            .rectangular_grid()
            .map_err(|e| SpectralError::invalid(e.to_string()))?;
        let (x_cizone, y_cizone) = d.zones.map_or((d.x, d.y), |z| (z.x_cizone, z.y_cizone));
        Ok(Self {
            x: d.x,
            y: d.y,
            x_cizone,
            y_cizone,
            x_resolution: grid.x_resolution,
            y_resolution: grid.y_resolution,
            ..Default::default()
        })
    }

    fn gridpoints(&self) -> usize {
        if self.lon_number_by_lat.is_empty() {
            self.x * self.y
        } else {
            self.lon_number_by_lat.iter().sum()
        }
    }
}

/// Spectral space and truncation of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectralGeometry {
    pub space: SpectralSpace,
    pub truncation: Truncation,
}

impl SpectralGeometry {
    /// Build a spectral geometry; legendre ones are checked against memory.
    pub fn new(space: SpectralSpace, truncation: Truncation) -> Result<Self> {
        match (space, &truncation) {
            (SpectralSpace::Legendre, Truncation::Triangular { .. }) => {}
            (SpectralSpace::BiFourier | SpectralSpace::Fourier, Truncation::Elliptic { .. }) => {}
            (space, t) => {
                return Err(SpectralError::invalid(format!(
                    "truncation {:?} does not fit {} space",
                    t, space
                )))
            }
        }
        let sg = Self { space, truncation };
        sg.prevent_swapping()?;
        Ok(sg)
    }

    pub fn legendre(max: usize) -> Result<Self> {
        Self::new(
            SpectralSpace::Legendre,
            Truncation::Triangular {
                max,
                max_zonal_wavenumber_by_lat: None,
            },
        )
    }

    pub fn bi_fourier(in_x: usize, in_y: usize) -> Result<Self> {
        Self::new(SpectralSpace::BiFourier, Truncation::Elliptic { in_x, in_y })
    }

    pub fn fourier(in_y: usize) -> Result<Self> {
        Self::new(SpectralSpace::Fourier, Truncation::Elliptic { in_x: 0, in_y })
    }

    /// Memory needed by legendre transforms, in bytes.
    pub fn needed_memory(&self) -> Option<f64> {
        match (&self.space, &self.truncation) {
            (SpectralSpace::Legendre, Truncation::Triangular { max, .. }) => {
                Some((*max as f64).powi(3) / 2.0 * 8.0)
            }
            _ => None,
        }
    }

    /// Fail if a legendre transform would claim too much memory.
    pub fn check_memory(&self, total_memory: u64, fraction: f64) -> Result<()> {
        if let Some(needed) = self.needed_memory() {
            if needed >= fraction * total_memory as f64 {
                return Err(SpectralError::SwappingPrevented {
                    needed_mb: needed / (1024.0 * 1024.0),
                    total_mb: total_memory as f64 / (1024.0 * 1024.0),
                });
            }
        }
        Ok(())
    }

    fn prevent_swapping(&self) -> Result<()> {
        if self.space != SpectralSpace::Legendre {
            return Ok(());
        }
        let fraction = EngineConfig::global().spectral.prevent_swapping_legendre;
        self.check_memory(total_system_memory(), fraction)
    }

    fn elliptic(&self) -> Result<(usize, usize)> {
        match self.truncation {
            Truncation::Elliptic { in_x, in_y } => Ok((in_x, in_y)),
            _ => Err(SpectralError::invalid("expected an elliptic truncation")),
        }
    }

    fn triangular_max(&self) -> Result<usize> {
        match self.truncation {
            Truncation::Triangular { max, .. } => Ok(max),
            _ => Err(SpectralError::invalid("expected a triangular truncation")),
        }
    }

    fn lam_request(&self, gpdims: &GpDims, order: CoefficientOrder) -> Result<LamTransform> {
        let (in_x, in_y) = self.elliptic()?;
        Ok(LamTransform {
            x: gpdims.x,
            y: gpdims.y,
            x_cizone: gpdims.x_cizone,
            y_cizone: gpdims.y_cizone,
            in_x,
            in_y,
            knummaxresol: EngineConfig::global().spectral.knummaxresol,
            fa_order: order != CoefficientOrder::Model,
            x_resolution: gpdims.x_resolution,
            y_resolution: gpdims.y_resolution,
        })
    }

    fn gauss_request(&self, gpdims: &GpDims, order: CoefficientOrder) -> Result<GaussTransform> {
        Ok(GaussTransform {
            lat_number: gpdims.lat_number,
            truncation: self.triangular_max()?,
            knummaxresol: EngineConfig::global().spectral.knummaxresol,
            lon_number_by_lat: gpdims.lon_number_by_lat.clone(),
            fa_order: order != CoefficientOrder::Model,
        })
    }

    /// Spectral to gridpoint transform with the process-wide service.
    pub fn sp2gp(&self, data: &[f64], gpdims: &GpDims, order: CoefficientOrder) -> Result<Vec<f64>> {
        self.sp2gp_with(transform_service(), data, gpdims, order)
    }

    /// Spectral to gridpoint transform.
    ///
    /// Input and output are 1-D, in storage order.
    pub fn sp2gp_with(
        &self,
        service: &dyn TransformService,
        data: &[f64],
        gpdims: &GpDims,
        order: CoefficientOrder,
    ) -> Result<Vec<f64>> {
        self.prevent_swapping()?;
        debug!(space = %self.space, service = service.name(), coefficients = data.len(), "sp2gp");
        match self.space {
            SpectralSpace::BiFourier => {
                let request = self.lam_request(gpdims, order)?;
                Ok(service.spec2gpt_lam(&request, data, false)?.values)
            }
            SpectralSpace::Legendre => {
                let request = self.gauss_request(gpdims, order)?;
                Ok(service.spec2gpt_gauss(&request, data, false)?.values)
            }
            SpectralSpace::Fourier => {
                let (_, in_y) = self.elliptic()?;
                let points = gpdims.gridpoints();
                if in_y > 1 {
                    service.spec2gpt_fft1d(in_y, data, points)
                } else {
                    let first = data
                        .first()
                        .ok_or_else(|| SpectralError::invalid("empty spectral data"))?;
                    Ok(vec![*first; points])
                }
            }
        }
    }

    /// Gridpoint to spectral transform with the process-wide service.
    pub fn gp2sp(&self, data: &[f64], gpdims: &GpDims, order: CoefficientOrder) -> Result<Vec<f64>> {
        self.gp2sp_with(transform_service(), data, gpdims, order)
    }

    /// Gridpoint to spectral transform.
    pub fn gp2sp_with(
        &self,
        service: &dyn TransformService,
        data: &[f64],
        gpdims: &GpDims,
        order: CoefficientOrder,
    ) -> Result<Vec<f64>> {
        self.prevent_swapping()?;
        SpectralError::check_size(gpdims.gridpoints(), data.len())?;
        debug!(space = %self.space, service = service.name(), gridpoints = data.len(), "gp2sp");
        match self.space {
            SpectralSpace::BiFourier => {
                let request = self.lam_request(gpdims, order)?;
                service.gpt2spec_lam(&request, data)
            }
            SpectralSpace::Legendre => {
                let request = self.gauss_request(gpdims, order)?;
                service.gpt2spec_gauss(&request, data)
            }
            SpectralSpace::Fourier => {
                let (_, in_y) = self.elliptic()?;
                if in_y > 1 {
                    service.gpt2spec_fft1d(in_y, data)
                } else {
                    let mut spdata = vec![0.0; 2 * (in_y + 1)];
                    spdata[0] = data.iter().sum::<f64>() / data.len().max(1) as f64;
                    Ok(spdata)
                }
            }
        }
    }

    /// Gridpoint derivatives `(d/dx, d/dy)` of spectral data, with the process-wide service.
    pub fn compute_xy_spderivatives(
        &self,
        data: &[f64],
        gpdims: &GpDims,
        order: CoefficientOrder,
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        self.compute_xy_spderivatives_with(transform_service(), data, gpdims, order)
    }

    pub fn compute_xy_spderivatives_with(
        &self,
        service: &dyn TransformService,
        data: &[f64],
        gpdims: &GpDims,
        order: CoefficientOrder,
    ) -> Result<(Vec<f64>, Vec<f64>)> {
        self.prevent_swapping()?;
        let output = match self.space {
            SpectralSpace::BiFourier => {
                let request = self.lam_request(gpdims, order)?;
                service.spec2gpt_lam(&request, data, true)?
            }
            SpectralSpace::Legendre => {
                let request = self.gauss_request(gpdims, order)?;
                service.spec2gpt_gauss(&request, data, true)?
            }
            SpectralSpace::Fourier => {
                return Err(SpectralError::unsupported("fourier", "derivatives of 1-D spectral fields"))
            }
        };
        match (output.d_dx, output.d_dy) {
            (Some(dx), Some(dy)) => Ok((dx, dy)),
            _ => Err(SpectralError::service(service.name(), "no derivatives returned")),
        }
    }

    /// Number of spectral coefficients for a grid.
    pub fn spectral_size(&self, gpdims: &GpDims, order: CoefficientOrder) -> Result<usize> {
        self.spectral_size_with(transform_service(), gpdims, order)
    }

    pub fn spectral_size_with(
        &self,
        service: &dyn TransformService,
        gpdims: &GpDims,
        order: CoefficientOrder,
    ) -> Result<usize> {
        match self.space {
            SpectralSpace::BiFourier => service.lam_spectral_size(&self.lam_request(gpdims, order)?),
            SpectralSpace::Legendre => service.gauss_spectral_size(&self.gauss_request(gpdims, order)?),
            SpectralSpace::Fourier => Ok(2 * (self.elliptic()?.1 + 1)),
        }
    }
}

/// Spectral space matching a gridpoint geometry.
pub fn space_for(geometry: &Geometry) -> SpectralSpace {
    match geometry.name {
        GeometryName::ReducedGauss | GeometryName::RotatedReducedGauss => SpectralSpace::Legendre,
        _ if geometry.dimensions.y == 1 || geometry.dimensions.x == 1 => SpectralSpace::Fourier,
        _ => SpectralSpace::BiFourier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needed_memory() {
        let sg = SpectralGeometry {
            space: SpectralSpace::Legendre,
            truncation: Truncation::Triangular {
                max: 1198,
                max_zonal_wavenumber_by_lat: None,
            },
        };
        let needed = sg.needed_memory().unwrap();
        assert_eq!(needed, 1198f64.powi(3) / 2.0 * 8.0);
        assert!(sg.check_memory(1 << 40, 0.75).is_ok());
        assert!(matches!(
            sg.check_memory(1 << 30, 0.75),
            Err(SpectralError::SwappingPrevented { .. })
        ));
    }

    #[test]
    fn test_space_truncation_mismatch() {
        assert!(SpectralGeometry::new(SpectralSpace::Legendre, Truncation::Elliptic { in_x: 2, in_y: 2 }).is_err());
        assert!(SpectralGeometry::bi_fourier(4, 3).is_ok());
    }

    #[test]
    fn test_fourier_constant() {
        let sg = SpectralGeometry::fourier(1).unwrap();
        let dims = GpDims {
            x: 5,
            y: 1,
            ..Default::default()
        };
        let sp = sg.gp2sp(&[1.0, 2.0, 3.0, 4.0, 5.0], &dims, CoefficientOrder::Model).unwrap();
        assert_eq!(sp[0], 3.0);
        let gp = sg.sp2gp(&sp, &dims, CoefficientOrder::Model).unwrap();
        assert_eq!(gp, vec![3.0; 5]);
        assert!(sg.compute_xy_spderivatives(&sp, &dims, CoefficientOrder::Model).is_err());
    }
}
