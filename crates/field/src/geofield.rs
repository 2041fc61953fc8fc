//! Fields on a geographical geometry: horizontal (H2D) and multi-level (3D).
//!
//! Values are stored flat in `[validity][level][point]` order. A field is
//! either gridpoint (one value per point of the geometry) or spectral (one
//! set of coefficients per level, `spectral_geometry` set).

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use geometry::{
    interpolate, nearest_points, with_vcoordinate, Geometry, InterpolationMethod, Structure, Subzone,
};
use meteo_common::bbox::BoundingBox;
use meteo_common::constants::surface;
use meteo_common::{EngineConfig, FieldValidityList};
use spectral::{space_for, GpDims, SpectralGeometry};

use crate::error::{FieldError, Result};
use crate::fid::FieldId;

/// Statistics over the unmasked values of a field.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
    /// Root mean square.
    pub quadmean: f64,
    /// Number of non-zero values.
    pub nonzero: usize,
}

impl Stats {
    /// Statistics of `values`, skipping NaN and values at or above `mask`.
    pub fn compute(values: impl IntoIterator<Item = f64>, mask: f64) -> Self {
        let (mut n, mut sum, mut sum2, mut nonzero) = (0usize, 0.0, 0.0, 0usize);
        let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
        for v in values {
            if !v.is_finite() || v >= mask {
                continue;
            }
            n += 1;
            sum += v;
            sum2 += v * v;
            min = min.min(v);
            max = max.max(v);
            if v != 0.0 {
                nonzero += 1;
            }
        }
        if n == 0 {
            return Self {
                min: f64::NAN,
                max: f64::NAN,
                mean: f64::NAN,
                std: f64::NAN,
                quadmean: f64::NAN,
                nonzero: 0,
            };
        }
        let mean = sum / n as f64;
        let quad = sum2 / n as f64;
        Self {
            min,
            max,
            mean,
            std: (quad - mean * mean).max(0.0).sqrt(),
            quadmean: quad.sqrt(),
            nonzero,
        }
    }
}

/// Picks the gridpoint, among the 4 nearest, whose value in `field` is
/// closest to `target_value`.
#[derive(Debug, Clone, Copy)]
pub struct ExternalDistance<'a> {
    pub target_value: f64,
    pub field: &'a GeoField,
}

/// Second operand of field arithmetic.
#[derive(Debug, Clone, Copy)]
pub enum FieldOperand<'a> {
    Field(&'a GeoField),
    Scalar(f64),
}

impl<'a> From<&'a GeoField> for FieldOperand<'a> {
    fn from(f: &'a GeoField) -> Self {
        Self::Field(f)
    }
}

impl From<f64> for FieldOperand<'_> {
    fn from(v: f64) -> Self {
        Self::Scalar(v)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

impl Op {
    fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            Op::Add => a + b,
            Op::Sub => a - b,
            Op::Mul => a * b,
            Op::Div => a / b,
        }
    }

    fn symbol(self) -> char {
        match self {
            Op::Add => '+',
            Op::Sub => '-',
            Op::Mul => '*',
            Op::Div => '/',
        }
    }
}

/// A field on a geographical geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoField {
    pub fid: FieldId,
    pub geometry: Geometry,
    pub validity: FieldValidityList,
    /// Present iff the values are spectral coefficients.
    #[serde(default)]
    pub spectral_geometry: Option<SpectralGeometry>,
    #[serde(default)]
    pub comment: Option<String>,
    /// Kind of process that produced the field (analysis, forecast...).
    #[serde(default)]
    pub processtype: Option<i64>,
    values: Vec<f64>,
}

impl GeoField {
    /// Gridpoint field; `values` in `[validity][level][point]` order.
    pub fn new(
        fid: FieldId,
        geometry: Geometry,
        validity: impl Into<FieldValidityList>,
        values: Vec<f64>,
    ) -> Result<Self> {
        let field = Self {
            fid,
            geometry,
            validity: validity.into(),
            spectral_geometry: None,
            comment: None,
            processtype: None,
            values,
        };
        field.check_values(&field.values)?;
        Ok(field)
    }

    /// Spectral field; `coefficients` hold one equal-size set per level.
    pub fn new_spectral(
        fid: FieldId,
        geometry: Geometry,
        validity: impl Into<FieldValidityList>,
        spectral_geometry: SpectralGeometry,
        coefficients: Vec<f64>,
    ) -> Result<Self> {
        let field = Self {
            fid,
            geometry,
            validity: validity.into(),
            spectral_geometry: Some(spectral_geometry),
            comment: None,
            processtype: None,
            values: coefficients,
        };
        field.check_values(&field.values)?;
        Ok(field)
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    pub fn with_processtype(mut self, processtype: i64) -> Self {
        self.processtype = Some(processtype);
        self
    }

    fn check_values(&self, values: &[f64]) -> Result<()> {
        self.check_values_as(values, self.is_spectral())
    }

    /// Check `values` as spectral coefficients or as gridpoint values.
    fn check_values_as(&self, values: &[f64], spectral: bool) -> Result<()> {
        let chunks = self.chunks_number();
        let ok = if spectral {
            values.len() % chunks == 0 && !values.is_empty()
        } else {
            values.len() == chunks * self.geometry.packed_size()
        };
        if ok {
            Ok(())
        } else {
            Err(FieldError::invalid_data(format!(
                "{} values for {} validities x {} levels of a {} geometry ({} points)",
                values.len(),
                self.validity.len(),
                self.levels_number(),
                self.geometry.name,
                self.geometry.packed_size()
            )))
        }
    }

    pub fn is_spectral(&self) -> bool {
        self.spectral_geometry.is_some()
    }

    pub fn levels_number(&self) -> usize {
        self.geometry.vcoordinate.levels.len().max(1)
    }

    /// Number of (validity, level) slices.
    pub fn chunks_number(&self) -> usize {
        self.validity.len() * self.levels_number()
    }

    /// Values per (validity, level) slice: gridpoints or coefficients.
    pub fn level_size(&self) -> usize {
        self.values.len() / self.chunks_number().max(1)
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn into_values(self) -> Vec<f64> {
        self.values
    }

    /// Replace values, keeping the current representation.
    pub fn set_values(&mut self, values: Vec<f64>) -> Result<()> {
        self.check_values(&values)?;
        self.values = values;
        Ok(())
    }

    /// Values of one (validity, level) slice.
    pub fn level(&self, validity: usize, level: usize) -> Result<&[f64]> {
        if validity >= self.validity.len() || level >= self.levels_number() {
            return Err(FieldError::invalid_data(format!(
                "no slice (validity {}, level {}) in field '{}'",
                validity, level, self.fid
            )));
        }
        let size = self.level_size();
        let start = (validity * self.levels_number() + level) * size;
        Ok(&self.values[start..start + size])
    }

    /// Geometric structure of the field (H2D, 3D, V1D...).
    pub fn structure(&self) -> Structure {
        self.geometry.structure()
    }

    fn check_gridpoint(&self) -> Result<()> {
        if self.is_spectral() {
            Err(FieldError::SpectralData {
                fid: self.fid.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// Spectral transforms
// ============================================================================

impl GeoField {
    /// Transform to gridpoint space in place; no-op on gridpoint fields.
    pub fn sp2gp(&mut self) -> Result<()> {
        let Some(sg) = self.spectral_geometry.clone() else {
            debug!(fid = %self.fid, "Field already gridpoint");
            return Ok(());
        };
        let gpdims = GpDims::from_geometry(&self.geometry)?;
        let order = EngineConfig::global().spectral.coeff_order;
        let size = self.level_size();
        let mut out = Vec::with_capacity(self.chunks_number() * self.geometry.packed_size());
        for chunk in self.values.chunks(size) {
            out.extend(sg.sp2gp(chunk, &gpdims, order)?);
        }
        self.check_values_as(&out, false)?;
        debug!(fid = %self.fid, space = %sg.space, "sp2gp");
        self.spectral_geometry = None;
        self.values = out;
        Ok(())
    }

    /// Transform to spectral space in place; no-op on spectral fields.
    pub fn gp2sp(&mut self, spectral_geometry: SpectralGeometry) -> Result<()> {
        if self.is_spectral() {
            debug!(fid = %self.fid, "Field already spectral");
            return Ok(());
        }
        let expected = space_for(&self.geometry);
        if spectral_geometry.space != expected {
            return Err(FieldError::incompatible(format!(
                "a {} geometry transforms to {} space, not {}",
                self.geometry.name, expected, spectral_geometry.space
            )));
        }
        let gpdims = GpDims::from_geometry(&self.geometry)?;
        let order = EngineConfig::global().spectral.coeff_order;
        let size = self.geometry.packed_size();
        let mut out = Vec::new();
        for chunk in self.values.chunks(size) {
            out.extend(spectral_geometry.gp2sp(chunk, &gpdims, order)?);
        }
        self.check_values_as(&out, true)?;
        debug!(fid = %self.fid, space = %spectral_geometry.space, "gp2sp");
        self.spectral_geometry = Some(spectral_geometry);
        self.values = out;
        Ok(())
    }

    /// Gridpoint x and y derivatives of a spectral field.
    pub fn compute_xy_spderivatives(&self) -> Result<(GeoField, GeoField)> {
        let sg = self
            .spectral_geometry
            .as_ref()
            .ok_or_else(|| FieldError::MissingSpectralGeometry {
                fid: self.fid.to_string(),
            })?;
        let gpdims = GpDims::from_geometry(&self.geometry)?;
        let order = EngineConfig::global().spectral.coeff_order;
        let (mut dx, mut dy) = (Vec::new(), Vec::new());
        for chunk in self.values.chunks(self.level_size()) {
            let (x, y) = sg.compute_xy_spderivatives(chunk, &gpdims, order)?;
            dx.extend(x);
            dy.extend(y);
        }
        let derived = |fid: FieldId, values: Vec<f64>| {
            let mut f = GeoField::new(fid, self.geometry.clone(), self.validity.clone(), values)?;
            f.processtype = self.processtype;
            Ok::<_, FieldError>(f)
        };
        Ok((
            derived(self.fid.decorated(|n| format!("d({})/dx", n)), dx)?,
            derived(self.fid.decorated(|n| format!("d({})/dy", n)), dy)?,
        ))
    }
}

// ============================================================================
// Statistics and arithmetic
// ============================================================================

impl GeoField {
    /// Statistics over a zone (all validities and levels).
    pub fn stats(&self, subzone: Option<Subzone>) -> Result<Stats> {
        self.check_gridpoint()?;
        let indices = self.geometry.subzone_indices(subzone)?;
        let size = self.level_size();
        let values = self
            .values
            .chunks(size)
            .flat_map(|chunk| indices.iter().map(move |k| chunk[*k]));
        Ok(Stats::compute(values, EngineConfig::global().mask_outside))
    }

    pub fn min(&self, subzone: Option<Subzone>) -> Result<f64> {
        Ok(self.stats(subzone)?.min)
    }

    pub fn max(&self, subzone: Option<Subzone>) -> Result<f64> {
        Ok(self.stats(subzone)?.max)
    }

    pub fn mean(&self, subzone: Option<Subzone>) -> Result<f64> {
        Ok(self.stats(subzone)?.mean)
    }

    pub fn std(&self, subzone: Option<Subzone>) -> Result<f64> {
        Ok(self.stats(subzone)?.std)
    }

    fn operate(&self, other: FieldOperand<'_>, op: Op) -> Result<GeoField> {
        let mut out = self.clone();
        match other {
            FieldOperand::Field(o) => {
                if !self.geometry.same_horizontal_grid(&o.geometry) {
                    return Err(FieldError::incompatible(format!(
                        "'{}' and '{}' are on different grids",
                        self.fid, o.fid
                    )));
                }
                if self.values.len() != o.values.len() || self.is_spectral() != o.is_spectral() {
                    return Err(FieldError::incompatible(format!(
                        "'{}' and '{}' differ in shape or representation",
                        self.fid, o.fid
                    )));
                }
                if self.is_spectral() && matches!(op, Op::Mul | Op::Div) {
                    return Err(FieldError::unsupported(
                        "products of spectral fields: transform to gridpoint first",
                    ));
                }
                out.values = self
                    .values
                    .iter()
                    .zip(&o.values)
                    .map(|(a, b)| op.apply(*a, *b))
                    .collect();
                out.fid = self.fid.compose_with(op.symbol(), &o.fid);
            }
            FieldOperand::Scalar(x) => {
                if self.is_spectral() && matches!(op, Op::Add | Op::Sub) {
                    return Err(FieldError::unsupported(
                        "adding a scalar to a spectral field: transform to gridpoint first",
                    ));
                }
                out.values = self.values.iter().map(|a| op.apply(*a, x)).collect();
                out.fid = self.fid.compose(op.symbol(), &x.to_string());
            }
        }
        Ok(out)
    }

    pub fn plus<'a>(&self, other: impl Into<FieldOperand<'a>>) -> Result<GeoField> {
        self.operate(other.into(), Op::Add)
    }

    pub fn minus<'a>(&self, other: impl Into<FieldOperand<'a>>) -> Result<GeoField> {
        self.operate(other.into(), Op::Sub)
    }

    pub fn times<'a>(&self, other: impl Into<FieldOperand<'a>>) -> Result<GeoField> {
        self.operate(other.into(), Op::Mul)
    }

    pub fn divided_by<'a>(&self, other: impl Into<FieldOperand<'a>>) -> Result<GeoField> {
        self.operate(other.into(), Op::Div)
    }
}

// ============================================================================
// Point values
// ============================================================================

impl GeoField {
    /// Value at gridpoint `(i, j)` of one (validity, level) slice.
    pub fn getvalue_ij(&self, i: usize, j: usize, validity: usize, level: usize) -> Result<f64> {
        self.check_gridpoint()?;
        let k = self.geometry.flat_index(i, j)?;
        Ok(self.level(validity, level)?[k])
    }

    /// Values at lon/lat points, one row per (validity, level) slice.
    pub fn getvalue_ll(
        &self,
        lons: &[f64],
        lats: &[f64],
        method: InterpolationMethod,
        external_distance: Option<ExternalDistance<'_>>,
    ) -> Result<Vec<Vec<f64>>> {
        self.check_gridpoint()?;
        if lons.len() != lats.len() {
            return Err(FieldError::invalid_data(format!(
                "{} longitudes for {} latitudes",
                lons.len(),
                lats.len()
            )));
        }
        let Some(external) = external_distance else {
            return self
                .values
                .chunks(self.level_size())
                .map(|chunk| {
                    lons.iter()
                        .zip(lats)
                        .map(|(lon, lat)| {
                            interpolate(&self.geometry, chunk, *lon, *lat, method).map_err(FieldError::from)
                        })
                        .collect()
                })
                .collect();
        };

        if method != InterpolationMethod::Nearest {
            return Err(FieldError::unsupported(
                "external distance only applies to nearest-point values",
            ));
        }
        external.field.check_gridpoint()?;
        if !external.field.geometry.same_horizontal_grid(&self.geometry) {
            return Err(FieldError::incompatible(
                "external distance field must share the field's grid",
            ));
        }
        let reference = external.field.level(0, 0)?;
        let mut selected = Vec::with_capacity(lons.len());
        for (lon, lat) in lons.iter().zip(lats) {
            let mut best: Option<(f64, usize)> = None;
            for (i, j) in nearest_points(&self.geometry, *lon, *lat, InterpolationMethod::Linear)? {
                let k = self.geometry.flat_index(i, j)?;
                let d = (reference[k] - external.target_value).abs();
                if best.map_or(true, |(bd, _)| d < bd) {
                    best = Some((d, k));
                }
            }
            let (_, k) = best.ok_or_else(|| FieldError::invalid_data("no neighbouring gridpoint"))?;
            selected.push(k);
        }
        Ok(self
            .values
            .chunks(self.level_size())
            .map(|chunk| selected.iter().map(|k| chunk[*k]).collect())
            .collect())
    }
}

// ============================================================================
// Extraction
// ============================================================================

impl GeoField {
    /// Values on every point of `target`, level by level.
    ///
    /// The result carries `target`'s horizontal grid and this field's
    /// vertical coordinate.
    pub fn extract_subdomain(
        &self,
        target: &Geometry,
        method: InterpolationMethod,
        exclude_extralevels: bool,
    ) -> Result<GeoField> {
        self.check_gridpoint()?;
        let (lons, lats) = target.get_lonlat_grid(None)?;
        let chunks: Vec<&[f64]> = self.values.chunks(self.level_size()).collect();
        let levels: Vec<Vec<f64>> = chunks
            .par_iter()
            .map(|chunk| {
                lons.iter()
                    .zip(&lats)
                    .map(|(lon, lat)| {
                        interpolate(&self.geometry, chunk, *lon, *lat, method).map_err(FieldError::from)
                    })
                    .collect::<Result<Vec<f64>>>()
            })
            .collect::<Result<_>>()?;
        debug!(
            fid = %self.fid,
            target = %target.name,
            points = lons.len(),
            levels = levels.len(),
            "Extracted subdomain"
        );
        let geometry = with_vcoordinate(target, self.geometry.vcoordinate.clone());
        let mut out = GeoField {
            geometry,
            values: levels.concat(),
            ..self.clone()
        };
        if exclude_extralevels {
            out.exclude_extralevels()?;
        }
        Ok(out)
    }

    /// Drop the first and last levels of a hybrid-height field (Meso-NH padding).
    pub fn exclude_extralevels(&mut self) -> Result<()> {
        let vcoord = &self.geometry.vcoordinate;
        if vcoord.typeoffirstfixedsurface != surface::HYBRID_HEIGHT || vcoord.levels.len() <= 2 {
            return Ok(());
        }
        let nlev = vcoord.levels.len();
        let size = self.level_size();
        let mut values = Vec::with_capacity(self.validity.len() * (nlev - 2) * size);
        for t in 0..self.validity.len() {
            for k in 1..nlev - 1 {
                values.extend_from_slice(self.level(t, k)?);
            }
        }
        let levels = vcoord.levels[1..nlev - 1].to_vec();
        let columns = vcoord
            .column_levels
            .as_ref()
            .and_then(|c| c.get(1..nlev - 1))
            .map(<[Vec<f64>]>::to_vec);
        self.geometry.vcoordinate.levels = levels;
        self.geometry.vcoordinate.column_levels = columns;
        self.values = values;
        Ok(())
    }

    /// Crop to the gridpoints inside a lon/lat box.
    pub fn extract_zoom(&self, bbox: &BoundingBox) -> Result<GeoField> {
        self.check_gridpoint()?;
        let (imin, imax, jmin, jmax) = self.geometry.bbox_index_range(bbox)?;
        let geometry = self.geometry.subarray_geometry(imin, imax, jmin, jmax)?;
        let x = self.geometry.dimensions.x;
        let mut values = Vec::with_capacity(self.chunks_number() * geometry.packed_size());
        for chunk in self.values.chunks(self.level_size()) {
            for j in jmin..=jmax {
                values.extend_from_slice(&chunk[j * x + imin..=j * x + imax]);
            }
        }
        GeoField::new(self.fid.clone(), geometry, self.validity.clone(), values).map(|f| GeoField {
            comment: self.comment.clone(),
            processtype: self.processtype,
            ..f
        })
    }

    /// Move the first column of a global lon-lat field `longitude_shift` degrees east.
    pub fn global_shift_center(&mut self, longitude_shift: f64) -> Result<()> {
        self.check_gridpoint()?;
        let dx = self.geometry.rectangular_grid()?.x_resolution;
        let steps = longitude_shift / dx;
        if (steps - steps.round()).abs() > 1e-6 {
            return Err(FieldError::invalid_data(format!(
                "shift {} is not a multiple of the resolution {}",
                longitude_shift, dx
            )));
        }
        let x = self.geometry.dimensions.x;
        let columns = (steps.round() as i64).rem_euclid(x as i64) as usize;
        let geometry = self.geometry.shifted_columns(columns)?;
        for row in self.values.chunks_mut(x) {
            row.rotate_left(columns);
        }
        self.geometry = geometry;
        Ok(())
    }

    /// Multi-line textual summary.
    pub fn what(&self) -> String {
        let mut lines = vec![
            format!("fid: {}", self.fid),
            format!(
                "structure: {} ({} geometry, {} x {}, {} level(s))",
                self.structure(),
                self.geometry.name,
                self.geometry.dimensions.x,
                self.geometry.dimensions.y,
                self.levels_number()
            ),
            format!(
                "vertical: type {} levels {:?}",
                self.geometry.vcoordinate.typeoffirstfixedsurface, self.geometry.vcoordinate.levels
            ),
        ];
        for v in &self.validity {
            lines.push(format!("validity: {}", v.describe()));
        }
        match &self.spectral_geometry {
            Some(sg) => lines.push(format!("spectral: {} {:?}", sg.space, sg.truncation)),
            None => {
                if let Ok(s) = self.stats(None) {
                    lines.push(format!(
                        "stats: min {:.6} max {:.6} mean {:.6} std {:.6} quadmean {:.6} nonzero {}",
                        s.min, s.max, s.mean, s.std, s.quadmean, s.nonzero
                    ));
                }
            }
        }
        if let Some(c) = &self.comment {
            lines.push(format!("comment: {}", c));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_skip_masked() {
        let s = Stats::compute([1.0, f64::NAN, 3.0, 1e20, 0.0], 1e19);
        assert_eq!(s.min, 0.0);
        assert_eq!(s.max, 3.0);
        assert!((s.mean - 4.0 / 3.0).abs() < 1e-12);
        assert!((s.quadmean - (10.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(s.nonzero, 2);
    }

    #[test]
    fn test_stats_of_nothing() {
        let s = Stats::compute([f64::NAN], 1e19);
        assert!(s.mean.is_nan());
        assert_eq!(s.nonzero, 0);
    }
}
