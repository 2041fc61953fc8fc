//! Vector fields: a pair of (U, V) components on the same geometry.

use serde::{Deserialize, Serialize};

use spectral::SpectralGeometry;

use crate::error::{FieldError, Result};
use crate::fid::FieldId;
use crate::geofield::GeoField;

/// Two-component vector field, typically wind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorField {
    pub fid: FieldId,
    pub components: [GeoField; 2],
}

impl VectorField {
    pub fn new(fid: FieldId, u: GeoField, v: GeoField) -> Result<Self> {
        if !u.geometry.same_horizontal_grid(&v.geometry)
            || u.values().len() != v.values().len()
            || u.is_spectral() != v.is_spectral()
        {
            return Err(FieldError::incompatible(format!(
                "vector components '{}' and '{}' differ in grid or representation",
                u.fid, v.fid
            )));
        }
        Ok(Self {
            fid,
            components: [u, v],
        })
    }

    pub fn u(&self) -> &GeoField {
        &self.components[0]
    }

    pub fn v(&self) -> &GeoField {
        &self.components[1]
    }

    pub fn is_spectral(&self) -> bool {
        self.components[0].is_spectral()
    }

    pub fn sp2gp(&mut self) -> Result<()> {
        for c in &mut self.components {
            c.sp2gp()?;
        }
        Ok(())
    }

    pub fn gp2sp(&mut self, spectral_geometry: SpectralGeometry) -> Result<()> {
        for c in &mut self.components {
            c.gp2sp(spectral_geometry.clone())?;
        }
        Ok(())
    }

    fn combine(&self, name: &str, f: impl Fn(f64, f64) -> f64) -> Result<GeoField> {
        let (u, v) = (self.u(), self.v());
        if self.is_spectral() {
            return Err(FieldError::SpectralData {
                fid: self.fid.to_string(),
            });
        }
        let values = u.values().iter().zip(v.values()).map(|(a, b)| f(*a, *b)).collect();
        let mut out = GeoField::new(
            self.fid.decorated(|n| format!("{}({})", name, n)),
            u.geometry.clone(),
            u.validity.clone(),
            values,
        )?;
        out.processtype = u.processtype;
        Ok(out)
    }

    /// Norm of the vector.
    pub fn to_module(&self) -> Result<GeoField> {
        self.combine("module", |u, v| u.hypot(v))
    }

    /// Direction the vector comes from, in degrees clockwise from north.
    pub fn compute_direction(&self) -> Result<GeoField> {
        self.combine("direction", |u, v| {
            if u == 0.0 && v == 0.0 {
                0.0
            } else {
                ((-u).atan2(-v).to_degrees() + 360.0) % 360.0
            }
        })
    }

    pub fn what(&self) -> String {
        format!(
            "{}: Vector\n  U:\n{}\n  V:\n{}",
            self.fid,
            indent(&self.u().what()),
            indent(&self.v().what())
        )
    }
}

fn indent(text: &str) -> String {
    text.lines().map(|l| format!("    {}", l)).collect::<Vec<_>>().join("\n")
}
