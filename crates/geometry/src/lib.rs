//! Geometries of meteorological fields.
//!
//! A [`Geometry`] combines a horizontal grid (regular lon-lat, projected,
//! academic, reduced Gaussian or unstructured points), a vertical
//! coordinate and a figure of the Earth. It answers the questions field
//! extraction needs:
//!
//! - **Coordinates**: index <-> lon/lat transforms for every grid kind
//! - **Zones**: corners of the C, CI and CIE zones of limited-area grids
//! - **Derived geometries**: points, profiles, sections and sub-arrays
//! - **Interpolation**: nearest, bilinear and bicubic values at a point
//! - **Vertical**: hybrid-pressure, pressure and hybrid-height conversions
//!
//! # Example
//!
//! ```ignore
//! use geometry::{Geometry, Dimensions, RectangularGrid, InterpolationMethod};
//!
//! let g = Geometry::regular_lonlat(Dimensions::rectangular(360, 181), grid)?;
//! let (i, j) = g.ll2ij(2.35, 48.85)?;
//! let value = geometry::interpolate(&g, &data, 2.35, 48.85, InterpolationMethod::Linear)?;
//! ```

pub mod error;
pub mod geometry;
pub mod interpolation;
pub mod types;
pub mod vcoord;
pub mod vertical;

pub use error::{GeometryError, Result};
pub use geometry::{with_vcoordinate, Corners, CornersLL, Geometry};
pub use interpolation::{interpolate, nearest_points};
pub use types::{
    Dimensions, GaussGrid, Geoid, GeometryName, Grid, GridPosition, InterpolationMethod,
    LamZones, ProjectionParams, RectangularGrid, Secant, Structure, Subzone, UnstructuredGrid,
};
pub use vcoord::{HybridCoefficients, VCoordinate, VPosition};
pub use vertical::VerticalMean;
