//! Spectral geometries, transforms and variance spectra.
//!
//! A [`SpectralGeometry`] pairs a spectral space with its truncation and
//! converts field data between spectral and gridpoint representations.
//! Transforms go through a [`TransformService`]: the built-in
//! [`ReferenceTransforms`] covers bi-Fourier and 1-D Fourier spaces, while
//! legendre transforms need an external service registered with
//! [`install_transform_service`].
//!
//! The [`spectra`] module computes variance spectra of gridpoint (DCT) and
//! spherical-harmonic data.

pub mod error;
pub mod memory;
pub mod reference;
pub mod service;
pub mod spectra;
pub mod spectral_geometry;

pub use error::{Result, SpectralError};
pub use reference::{elliptic_waves, ReferenceTransforms};
pub use service::{
    install_transform_service, transform_service, GaussTransform, GridpointOutput, LamTransform,
    TransformService,
};
pub use spectra::{dct_spectrum, global_spectrum, lam_spectrum, read_spectrum, sort_spectra, Spectrum};
pub use spectral_geometry::{space_for, GpDims, SpectralGeometry, SpectralSpace, Truncation};
