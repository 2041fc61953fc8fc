//! The field union.

use serde::{Deserialize, Serialize};

use geometry::{Geometry, Structure};
use meteo_common::FieldValidityList;

use crate::error::{FieldError, Result};
use crate::fid::FieldId;
use crate::geofield::GeoField;
use crate::misc::{MiscField, MiscValue};
use crate::vector::VectorField;

/// Any field a resource can hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum Field {
    Misc(MiscField),
    H2D(GeoField),
    #[serde(rename = "3D")]
    D3(GeoField),
    Vector(VectorField),
}

impl Field {
    /// Wrap a geographical field, as H2D or 3D according to its geometry.
    pub fn from_geo(field: GeoField) -> Self {
        match field.structure() {
            Structure::Point | Structure::H1D | Structure::H2D => Self::H2D(field),
            Structure::V1D | Structure::V2D | Structure::D3 => Self::D3(field),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Misc(_) => "Misc",
            Self::H2D(_) => "H2D",
            Self::D3(_) => "3D",
            Self::Vector(_) => "Vector",
        }
    }

    pub fn fid(&self) -> &FieldId {
        match self {
            Self::Misc(f) => &f.fid,
            Self::H2D(f) | Self::D3(f) => &f.fid,
            Self::Vector(f) => &f.fid,
        }
    }

    pub fn fid_mut(&mut self) -> &mut FieldId {
        match self {
            Self::Misc(f) => &mut f.fid,
            Self::H2D(f) | Self::D3(f) => &mut f.fid,
            Self::Vector(f) => &mut f.fid,
        }
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        match self {
            Self::Misc(_) => None,
            Self::H2D(f) | Self::D3(f) => Some(&f.geometry),
            Self::Vector(f) => Some(&f.u().geometry),
        }
    }

    pub fn validity(&self) -> Option<&FieldValidityList> {
        match self {
            Self::Misc(_) => None,
            Self::H2D(f) | Self::D3(f) => Some(&f.validity),
            Self::Vector(f) => Some(&f.u().validity),
        }
    }

    pub fn is_spectral(&self) -> bool {
        match self {
            Self::Misc(_) => false,
            Self::H2D(f) | Self::D3(f) => f.is_spectral(),
            Self::Vector(f) => f.is_spectral(),
        }
    }

    pub fn as_misc(&self) -> Option<&MiscValue> {
        match self {
            Self::Misc(f) => Some(&f.value),
            _ => None,
        }
    }

    pub fn as_geo(&self) -> Option<&GeoField> {
        match self {
            Self::H2D(f) | Self::D3(f) => Some(f),
            _ => None,
        }
    }

    pub fn as_geo_mut(&mut self) -> Option<&mut GeoField> {
        match self {
            Self::H2D(f) | Self::D3(f) => Some(f),
            _ => None,
        }
    }

    /// The geographical field inside, or an error naming the actual kind.
    pub fn into_geo(self) -> Result<GeoField> {
        match self {
            Self::H2D(f) | Self::D3(f) => Ok(f),
            other => Err(FieldError::unsupported(format!(
                "'{}' is a {} field, not a geographical one",
                other.fid(),
                other.kind()
            ))),
        }
    }

    /// Transform to gridpoint space; no-op on misc and gridpoint fields.
    pub fn sp2gp(&mut self) -> Result<()> {
        match self {
            Self::Misc(_) => Ok(()),
            Self::H2D(f) | Self::D3(f) => f.sp2gp(),
            Self::Vector(f) => f.sp2gp(),
        }
    }

    pub fn what(&self) -> String {
        match self {
            Self::Misc(f) => f.what(),
            Self::H2D(f) | Self::D3(f) => format!("[{}]\n{}", self.kind(), f.what()),
            Self::Vector(f) => f.what(),
        }
    }
}

impl From<MiscField> for Field {
    fn from(f: MiscField) -> Self {
        Self::Misc(f)
    }
}

impl From<GeoField> for Field {
    fn from(f: GeoField) -> Self {
        Self::from_geo(f)
    }
}

impl From<VectorField> for Field {
    fn from(f: VectorField) -> Self {
        Self::Vector(f)
    }
}
