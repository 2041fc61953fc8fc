//! GRIB2 simple packing (data representation template 5.0) with bitmap.
//!
//! Only present values are packed; missing points are flagged in the
//! bitmap and decode to NaN.

use meteo_common::packing::{make_bitmap, read_bitmap, SimplePacking};

use crate::error::{Grib2Error, Grib2Result};
use crate::sections::DataRepresentation;

/// Data, representation and optional bitmap of a packed field.
#[derive(Debug, Clone, PartialEq)]
pub struct PackedField {
    pub representation: DataRepresentation,
    pub bitmap: Option<Vec<u8>>,
    pub data: Vec<u8>,
}

fn packing_of(repr: &DataRepresentation) -> SimplePacking {
    SimplePacking {
        reference_value: repr.reference_value,
        binary_scale_factor: repr.binary_scale_factor,
        decimal_scale_factor: repr.decimal_scale_factor,
        bits_per_value: repr.bits_per_value,
    }
}

/// Unpack simple packed GRIB2 data onto `num_points` grid points.
pub fn unpack_simple(
    repr: &DataRepresentation,
    packed: &[u8],
    bitmap: Option<&[u8]>,
    num_points: usize,
) -> Grib2Result<Vec<f64>> {
    let packing = packing_of(repr);
    let count = repr.num_data_points as usize;
    if packing.packed_len(count) > packed.len() {
        return Err(Grib2Error::UnpackingError(format!(
            "{} values of {} bits need {} bytes, data section holds {}",
            count,
            repr.bits_per_value,
            packing.packed_len(count),
            packed.len()
        )));
    }
    let present_values = packing.unpack(packed, count)?;

    let Some(bitmap) = bitmap else {
        if count != num_points {
            return Err(Grib2Error::UnpackingError(format!(
                "{} packed values for {} grid points without bitmap",
                count, num_points
            )));
        }
        return Ok(present_values);
    };

    let present = read_bitmap(bitmap, num_points)?;
    let n_present = present.iter().filter(|p| **p).count();
    if n_present != count {
        return Err(Grib2Error::UnpackingError(format!(
            "bitmap flags {} points, {} values are packed",
            n_present, count
        )));
    }
    let mut packed_values = present_values.into_iter();
    Ok(present
        .into_iter()
        .map(|p| if p { packed_values.next().unwrap_or(f64::NAN) } else { f64::NAN })
        .collect())
}

/// Pack `values` on `bits_per_value` bits; non-finite values go to the bitmap.
pub fn pack_simple(
    values: &[f64],
    bits_per_value: u8,
    decimal_scale_factor: i16,
) -> Grib2Result<PackedField> {
    let has_missing = values.iter().any(|v| !v.is_finite());
    let present: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let packing = SimplePacking::compute(&present, bits_per_value, decimal_scale_factor)
        .map_err(|e| Grib2Error::EncodingError(e.to_string()))?;
    let bitmap = has_missing.then(|| make_bitmap(values.iter().map(|v| v.is_finite())));

    Ok(PackedField {
        representation: DataRepresentation {
            num_data_points: present.len() as u32,
            packing_method: 0,
            original_data_type: 0,
            reference_value: packing.reference_value,
            binary_scale_factor: packing.binary_scale_factor,
            decimal_scale_factor: packing.decimal_scale_factor,
            bits_per_value: packing.bits_per_value,
        },
        bitmap,
        data: packing.pack(&present),
    })
}
