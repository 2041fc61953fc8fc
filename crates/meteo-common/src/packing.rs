//! Simple bit packing shared by the GRIB2 and FA codecs.
//!
//! Simple packing formula:
//! `value = (reference_value + packed_value * 2^E) * 10^(-D)`
//! with packed values stored MSB first on `bits_per_value` bits.

use serde::{Deserialize, Serialize};

use crate::error::{MeteoError, MeteoResult};

/// Parameters of a simple-packed array.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimplePacking {
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
}

impl SimplePacking {
    /// Choose reference and binary scale so that `values` fit on `bits_per_value` bits.
    pub fn compute(values: &[f64], bits_per_value: u8, decimal_scale_factor: i16) -> MeteoResult<Self> {
        if bits_per_value > 32 {
            return Err(MeteoError::packing(format!(
                "invalid number of bits: {}",
                bits_per_value
            )));
        }
        let dscale = 10f64.powi(decimal_scale_factor as i32);
        let (mut min, mut max) = (f64::INFINITY, f64::NEG_INFINITY);
        for v in values.iter().filter(|v| v.is_finite()) {
            min = min.min(*v * dscale);
            max = max.max(*v * dscale);
        }
        if !min.is_finite() {
            min = 0.0;
            max = 0.0;
        }

        let reference_value = f32_not_above(min);
        let range = max - reference_value as f64;
        let binary_scale_factor = if bits_per_value == 0 || range <= 0.0 {
            0
        } else {
            let maxint = ((1u64 << bits_per_value) - 1) as f64;
            let mut e = (range / maxint).log2().ceil() as i32;
            // guard against log2 rounding leaving the max out of range
            while range / 2f64.powi(e) > maxint {
                e += 1;
            }
            e as i16
        };

        Ok(Self {
            reference_value,
            binary_scale_factor,
            decimal_scale_factor,
            bits_per_value,
        })
    }

    /// Number of bytes needed to hold `count` packed values.
    pub fn packed_len(&self, count: usize) -> usize {
        (count * self.bits_per_value as usize + 7) / 8
    }

    /// Pack finite values. Non-finite values are packed as the reference.
    pub fn pack(&self, values: &[f64]) -> Vec<u8> {
        if self.bits_per_value == 0 {
            return Vec::new();
        }
        let dscale = 10f64.powi(self.decimal_scale_factor as i32);
        let bscale = 2f64.powi(self.binary_scale_factor as i32);
        let maxint = ((1u64 << self.bits_per_value) - 1) as f64;
        let reference = self.reference_value as f64;

        let mut writer = BitWriter::with_capacity(self.packed_len(values.len()));
        for v in values {
            let x = if v.is_finite() {
                ((v * dscale - reference) / bscale).round().clamp(0.0, maxint)
            } else {
                0.0
            };
            writer.write(x as u32, self.bits_per_value as usize);
        }
        writer.finish()
    }

    /// Unpack `count` values.
    pub fn unpack(&self, packed: &[u8], count: usize) -> MeteoResult<Vec<f64>> {
        let dscale = 10f64.powi(-(self.decimal_scale_factor as i32));
        let reference = self.reference_value as f64;
        if self.bits_per_value == 0 {
            return Ok(vec![reference * dscale; count]);
        }
        let bscale = 2f64.powi(self.binary_scale_factor as i32);
        let nbits = self.bits_per_value as usize;

        let mut values = Vec::with_capacity(count);
        for i in 0..count {
            let x = extract_bits(packed, i * nbits, nbits)?;
            values.push((reference + x as f64 * bscale) * dscale);
        }
        Ok(values)
    }
}

/// Largest f32 that is not greater than `v`.
fn f32_not_above(v: f64) -> f32 {
    let f = v as f32;
    if (f as f64) <= v {
        return f;
    }
    if f == 0.0 {
        return -f32::MIN_POSITIVE;
    }
    let bits = f.to_bits();
    if f > 0.0 {
        f32::from_bits(bits - 1)
    } else {
        f32::from_bits(bits + 1)
    }
}

/// Extract `num_bits` bits starting at `start_bit` (MSB first).
pub fn extract_bits(data: &[u8], start_bit: usize, num_bits: usize) -> MeteoResult<u32> {
    if num_bits > 32 || num_bits == 0 {
        return Err(MeteoError::packing(format!(
            "invalid number of bits: {}",
            num_bits
        )));
    }
    if (start_bit + num_bits + 7) / 8 > data.len() {
        return Err(MeteoError::packing("not enough data to extract bits"));
    }

    let mut result = 0u32;
    for i in 0..num_bits {
        let absolute_bit = start_bit + i;
        let bit = (data[absolute_bit / 8] >> (7 - (absolute_bit % 8))) & 1;
        result = (result << 1) | bit as u32;
    }
    Ok(result)
}

/// MSB-first bit stream writer.
#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    nbits: usize,
}

impl BitWriter {
    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            nbits: 0,
        }
    }

    /// Append the `num_bits` low bits of `value`.
    pub fn write(&mut self, value: u32, num_bits: usize) {
        for i in (0..num_bits).rev() {
            if self.nbits % 8 == 0 {
                self.bytes.push(0);
            }
            let bit = ((value >> i) & 1) as u8;
            if let Some(last) = self.bytes.last_mut() {
                *last |= bit << (7 - (self.nbits % 8));
            }
            self.nbits += 1;
        }
    }

    pub fn finish(self) -> Vec<u8> {
        self.bytes
    }
}

/// Bitmap of present values (1 = present), MSB first.
pub fn make_bitmap(present: impl IntoIterator<Item = bool>) -> Vec<u8> {
    let mut writer = BitWriter::default();
    for p in present {
        writer.write(p as u32, 1);
    }
    writer.finish()
}

/// Read `count` presence flags from a bitmap.
pub fn read_bitmap(bitmap: &[u8], count: usize) -> MeteoResult<Vec<bool>> {
    if (count + 7) / 8 > bitmap.len() {
        return Err(MeteoError::packing("bitmap shorter than number of points"));
    }
    Ok((0..count)
        .map(|i| (bitmap[i / 8] >> (7 - (i % 8))) & 1 == 1)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_bits() {
        let data = vec![0b10110101];
        assert_eq!(extract_bits(&data, 0, 2).unwrap(), 0b10);
        assert_eq!(extract_bits(&data, 2, 2).unwrap(), 0b11);
        assert_eq!(extract_bits(&data, 0, 8).unwrap(), 0b10110101);
        assert!(extract_bits(&data, 4, 8).is_err());
    }

    #[test]
    fn test_bit_writer() {
        let mut w = BitWriter::default();
        w.write(0b101, 3);
        w.write(0b11111, 5);
        w.write(1, 1);
        assert_eq!(w.finish(), vec![0b10111111, 0b10000000]);
    }

    #[test]
    fn test_simple_packing_precision() {
        let values: Vec<f64> = (0..100).map(|i| 250.0 + i as f64 * 0.37).collect();
        let packing = SimplePacking::compute(&values, 16, 0).unwrap();
        let packed = packing.pack(&values);
        assert_eq!(packed.len(), packing.packed_len(values.len()));

        let back = packing.unpack(&packed, values.len()).unwrap();
        let step = 2f64.powi(packing.binary_scale_factor as i32);
        for (a, b) in values.iter().zip(&back) {
            assert!((a - b).abs() <= step, "{} vs {}", a, b);
        }
    }

    #[test]
    fn test_constant_field_packing() {
        let values = vec![3.5; 10];
        let packing = SimplePacking::compute(&values, 0, 0).unwrap();
        assert!(packing.pack(&values).is_empty());
        let back = packing.unpack(&[], 10).unwrap();
        assert!(back.iter().all(|v| (v - 3.5).abs() < 1e-6));
    }

    #[test]
    fn test_bitmap() {
        let bm = make_bitmap([true, false, true, true, false, false, false, false, true]);
        assert_eq!(bm.len(), 2);
        let flags = read_bitmap(&bm, 9).unwrap();
        assert_eq!(flags, vec![true, false, true, true, false, false, false, false, true]);
    }
}
