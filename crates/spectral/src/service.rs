//! The transform service contract.
//!
//! Spectral <-> gridpoint transforms are delegated to a [`TransformService`].
//! A process-wide service is installed once; without one, the pure-Rust
//! [`ReferenceTransforms`](crate::reference::ReferenceTransforms) handles
//! bi-Fourier and Fourier spaces.

use std::sync::OnceLock;

use tracing::{debug, warn};

use crate::error::{Result, SpectralError};
use crate::reference::ReferenceTransforms;

/// Arguments of a limited-area (bi-Fourier) transform.
#[derive(Debug, Clone, PartialEq)]
pub struct LamTransform {
    pub x: usize,
    pub y: usize,
    pub x_cizone: usize,
    pub y_cizone: usize,
    pub in_x: usize,
    pub in_y: usize,
    pub knummaxresol: i32,
    /// Coefficients are in FA order rather than model order.
    pub fa_order: bool,
    pub x_resolution: f64,
    pub y_resolution: f64,
}

/// Arguments of a global (legendre) transform.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GaussTransform {
    pub lat_number: usize,
    pub truncation: usize,
    pub knummaxresol: i32,
    pub lon_number_by_lat: Vec<usize>,
    pub fa_order: bool,
}

/// Gridpoint output of an inverse transform, with optional derivatives.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GridpointOutput {
    pub values: Vec<f64>,
    pub d_dx: Option<Vec<f64>>,
    pub d_dy: Option<Vec<f64>>,
}

/// Forward, inverse and derivative transforms plus size inquiry.
///
/// Legendre methods default to an error: only external services provide them.
pub trait TransformService: Send + Sync {
    fn name(&self) -> &str;

    /// Number of real spectral coefficients of a LAM truncation.
    fn lam_spectral_size(&self, request: &LamTransform) -> Result<usize>;

    fn spec2gpt_lam(&self, request: &LamTransform, data: &[f64], derivatives: bool) -> Result<GridpointOutput>;

    fn gpt2spec_lam(&self, request: &LamTransform, data: &[f64]) -> Result<Vec<f64>>;

    /// Inverse 1-D Fourier transform on `points` gridpoints.
    fn spec2gpt_fft1d(&self, in_y: usize, data: &[f64], points: usize) -> Result<Vec<f64>>;

    fn gpt2spec_fft1d(&self, in_y: usize, data: &[f64]) -> Result<Vec<f64>>;

    /// Number of real spectral coefficients of a global truncation.
    fn gauss_spectral_size(&self, _request: &GaussTransform) -> Result<usize> {
        Err(legendre_unavailable(self.name()))
    }

    fn spec2gpt_gauss(&self, _request: &GaussTransform, _data: &[f64], _derivatives: bool) -> Result<GridpointOutput> {
        Err(legendre_unavailable(self.name()))
    }

    fn gpt2spec_gauss(&self, _request: &GaussTransform, _data: &[f64]) -> Result<Vec<f64>> {
        Err(legendre_unavailable(self.name()))
    }
}

fn legendre_unavailable(service: &str) -> SpectralError {
    SpectralError::service(
        service,
        "legendre transforms require an external transform service; install one with install_transform_service()",
    )
}

static SERVICE: OnceLock<Box<dyn TransformService>> = OnceLock::new();

/// Install the process-wide transform service. Returns false if one was already set.
pub fn install_transform_service(service: Box<dyn TransformService>) -> bool {
    let name = service.name().to_string();
    let installed = SERVICE.set(service).is_ok();
    if installed {
        debug!(service = %name, "Transform service installed");
    } else {
        warn!(service = %name, "Transform service already initialized, ignoring install");
    }
    installed
}

/// The process-wide transform service.
pub fn transform_service() -> &'static dyn TransformService {
    SERVICE
        .get_or_init(|| Box::new(ReferenceTransforms::default()))
        .as_ref()
}
