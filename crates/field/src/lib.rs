//! Meteorological fields.
//!
//! A [`Field`] is one of:
//!
//! - **Misc**: a scalar or array with no geography ([`MiscField`])
//! - **H2D**: one level on a horizontal geometry ([`GeoField`])
//! - **3D**: several levels on a geometry ([`GeoField`])
//! - **Vector**: a (U, V) pair of geographical fields ([`VectorField`])
//!
//! Geographical fields carry their geometry and validity, convert between
//! spectral and gridpoint representations, compute statistics and support
//! arithmetic and extraction (points, sections, subdomains, zooms).

pub mod error;
pub mod fid;
pub mod field;
pub mod geofield;
pub mod misc;
pub mod vector;

pub use error::{FieldError, Result};
pub use fid::{compact_keys, FieldId, FormatFid, GenericFid};
pub use field::Field;
pub use geofield::{ExternalDistance, FieldOperand, GeoField, Stats};
pub use misc::{MiscField, MiscGeometry, MiscValue};
pub use vector::VectorField;
