//! Section 4: product definition, templates 4.0 and 4.8.

use bytes::BufMut;
use chrono::{DateTime, Datelike, Duration, NaiveDate, Timelike, Utc};

use super::{find_section, i32_at, put_i32, require, u16_at, u32_at, write_section};
use crate::error::{Grib2Error, Grib2Result};

const MISSING_U8: u8 = 0xFF;
const MISSING_U32: u32 = 0xFFFF_FFFF;

/// Seconds in a time unit of code table 4.4.
pub fn time_unit_seconds(unit: u8) -> Option<i64> {
    match unit {
        0 => Some(60),
        1 => Some(3600),
        2 => Some(86400),
        10 => Some(3 * 3600),
        11 => Some(6 * 3600),
        12 => Some(12 * 3600),
        13 => Some(1),
        _ => None,
    }
}

/// Coarsest of hours, minutes or seconds that represents `d` exactly.
fn encode_duration(d: Duration) -> (u8, i32) {
    let s = d.num_seconds();
    if s % 3600 == 0 {
        (1, (s / 3600) as i32)
    } else if s % 60 == 0 {
        (0, (s / 60) as i32)
    } else {
        (13, s as i32)
    }
}

fn decode_duration(unit: u8, value: i64) -> Grib2Result<Duration> {
    time_unit_seconds(unit)
        .map(|s| Duration::seconds(s * value))
        .ok_or_else(|| Grib2Error::section(4, format!("unsupported time unit {}", unit)))
}

// ============================================================================
// Fixed surfaces
// ============================================================================

/// A fixed surface: type (code table 4.5) and scaled value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedSurface {
    pub type_of_surface: u8,
    pub scale_factor: i8,
    /// `None` when the value is missing.
    pub scaled_value: Option<i32>,
}

impl FixedSurface {
    pub fn missing() -> Self {
        Self {
            type_of_surface: MISSING_U8,
            scale_factor: 0,
            scaled_value: None,
        }
    }

    /// Surface of the given type holding `value`, with the smallest decimal
    /// scale factor that keeps it exact (up to 6 decimals).
    pub fn from_value(type_of_surface: u8, value: f64) -> Self {
        let scale = (0..=6)
            .find(|s| {
                let scaled = value * 10f64.powi(*s);
                (scaled - scaled.round()).abs() < 1e-9 * scaled.abs().max(1.0)
            })
            .unwrap_or(6);
        Self {
            type_of_surface,
            scale_factor: scale as i8,
            scaled_value: Some((value * 10f64.powi(scale)).round() as i32),
        }
    }

    pub fn is_missing(&self) -> bool {
        self.type_of_surface == MISSING_U8
    }

    pub fn value(&self) -> Option<f64> {
        self.scaled_value
            .map(|v| v as f64 / 10f64.powi(self.scale_factor as i32))
    }

    fn parse(t: &[u8]) -> Self {
        let scaled_value = if u32_at(t, 2) == MISSING_U32 {
            None
        } else {
            Some(i32_at(t, 2))
        };
        let scale = t[1];
        Self {
            type_of_surface: t[0],
            scale_factor: if scale == MISSING_U8 {
                0
            } else if scale & 0x80 != 0 {
                -((scale & 0x7F) as i8)
            } else {
                scale as i8
            },
            scaled_value,
        }
    }

    fn write(&self, b: &mut Vec<u8>) {
        b.put_u8(self.type_of_surface);
        match self.scaled_value {
            Some(v) => {
                let s = self.scale_factor;
                b.put_u8(if s < 0 { 0x80 | s.unsigned_abs() } else { s as u8 });
                put_i32(b, v);
            }
            None => {
                b.put_u8(MISSING_U8);
                b.put_u32(MISSING_U32);
            }
        }
    }
}

// ============================================================================
// Product definition
// ============================================================================

/// Statistical processing over a time range (template 4.8).
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticalProcess {
    pub end_of_interval: DateTime<Utc>,
    pub missing_values: u32,
    /// Code table 4.10: 0 average, 1 accumulation, 2 maximum, 3 minimum...
    pub type_of_statistical_processing: u8,
    pub type_of_time_increment: u8,
    pub length: Duration,
    pub increment: Duration,
}

/// Section 4: Product Definition Section
#[derive(Debug, Clone, PartialEq)]
pub struct ProductDefinition {
    pub parameter_category: u8,
    pub parameter_number: u8,
    pub type_of_generating_process: u8,
    pub background_process: u8,
    pub generating_process_identifier: u8,
    pub forecast_time: Duration,
    pub first_surface: FixedSurface,
    pub second_surface: FixedSurface,
    pub statistics: Option<StatisticalProcess>,
    /// Vertical coordinate parameters; hybrid A values then B values.
    pub vertical_coordinates: Vec<f32>,
}

impl ProductDefinition {
    pub fn template_number(&self) -> u16 {
        if self.statistics.is_some() {
            8
        } else {
            0
        }
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        write_section(buf, 4, |b| {
            b.put_u16(self.vertical_coordinates.len() as u16);
            b.put_u16(self.template_number());
            b.put_u8(self.parameter_category);
            b.put_u8(self.parameter_number);
            b.put_u8(self.type_of_generating_process);
            b.put_u8(self.background_process);
            b.put_u8(self.generating_process_identifier);
            b.put_u16(0);
            b.put_u8(0);
            let (unit, value) = encode_duration(self.forecast_time);
            b.put_u8(unit);
            put_i32(b, value);
            self.first_surface.write(b);
            self.second_surface.write(b);
            if let Some(stat) = &self.statistics {
                let end = stat.end_of_interval;
                b.put_u16(end.year() as u16);
                b.put_u8(end.month() as u8);
                b.put_u8(end.day() as u8);
                b.put_u8(end.hour() as u8);
                b.put_u8(end.minute() as u8);
                b.put_u8(end.second() as u8);
                b.put_u8(1);
                b.put_u32(stat.missing_values);
                b.put_u8(stat.type_of_statistical_processing);
                b.put_u8(stat.type_of_time_increment);
                let (unit, value) = encode_duration(stat.length);
                b.put_u8(unit);
                put_i32(b, value);
                let (unit, value) = encode_duration(stat.increment);
                b.put_u8(unit);
                put_i32(b, value);
            }
            for v in &self.vertical_coordinates {
                b.put_f32(*v);
            }
        });
    }
}

/// Parse Section 4 (Product Definition)
pub fn parse_product_definition(data: &[u8]) -> Grib2Result<ProductDefinition> {
    let section_offset = find_section(data, 4)?;
    let section_length = u32_at(data, section_offset) as usize;
    let sec = &data[section_offset..section_offset + section_length];
    require(4, sec, 9)?;

    let nv = u16_at(sec, 5) as usize;
    let template_number = u16_at(sec, 7);
    let t = &sec[9..];
    let template_length = match template_number {
        0 => 25,
        8 => {
            require(4, t, 37)?;
            37 + 12 * t[32] as usize
        }
        number => {
            return Err(Grib2Error::UnsupportedTemplate {
                what: "product definition",
                number,
            })
        }
    };
    require(4, t, template_length + 4 * nv)?;

    let statistics = if template_number == 8 {
        let ranges = t[32];
        if ranges == 0 {
            return Err(Grib2Error::section(4, "statistical template without time range"));
        }
        if ranges > 1 {
            tracing::debug!(ranges, "Only the first statistical time range is used");
        }
        let year = u16_at(t, 25) as i32;
        let end_of_interval = NaiveDate::from_ymd_opt(year, t[27] as u32, t[28] as u32)
            .and_then(|d| d.and_hms_opt(t[29] as u32, t[30] as u32, t[31] as u32))
            .ok_or_else(|| Grib2Error::section(4, "invalid end of statistical interval"))?
            .and_utc();
        Some(StatisticalProcess {
            end_of_interval,
            missing_values: u32_at(t, 33),
            type_of_statistical_processing: t[37],
            type_of_time_increment: t[38],
            length: decode_duration(t[39], i32_at(t, 40) as i64)?,
            increment: decode_duration(t[44], i32_at(t, 45) as i64)?,
        })
    } else {
        None
    };

    let vertical_coordinates = t[template_length..template_length + 4 * nv]
        .chunks_exact(4)
        .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]]))
        .collect();

    Ok(ProductDefinition {
        parameter_category: t[0],
        parameter_number: t[1],
        type_of_generating_process: t[2],
        background_process: t[3],
        generating_process_identifier: t[4],
        forecast_time: decode_duration(t[8], i32_at(t, 9) as i64)?,
        first_surface: FixedSurface::parse(&t[13..19]),
        second_surface: FixedSurface::parse(&t[19..25]),
        statistics,
        vertical_coordinates,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn message_with(product: &ProductDefinition) -> Vec<u8> {
        let mut msg = vec![0u8; 16];
        product.write(&mut msg);
        msg.extend_from_slice(b"7777");
        msg
    }

    fn temperature() -> ProductDefinition {
        ProductDefinition {
            parameter_category: 0,
            parameter_number: 0,
            type_of_generating_process: 2,
            background_process: 255,
            generating_process_identifier: 255,
            forecast_time: Duration::hours(6),
            first_surface: FixedSurface::from_value(100, 85000.0),
            second_surface: FixedSurface::missing(),
            statistics: None,
            vertical_coordinates: Vec::new(),
        }
    }

    #[test]
    fn test_fixed_surface_scaling() {
        let s = FixedSurface::from_value(103, 2.5);
        assert_eq!(s.scale_factor, 1);
        assert_eq!(s.scaled_value, Some(25));
        assert_eq!(s.value(), Some(2.5));
        assert!(FixedSurface::missing().value().is_none());
        assert_eq!(FixedSurface::from_value(1, 0.0).scale_factor, 0);
    }

    #[test]
    fn test_instantaneous_roundtrip() {
        let product = temperature();
        let parsed = parse_product_definition(&message_with(&product)).unwrap();
        assert_eq!(parsed, product);
        assert_eq!(parsed.template_number(), 0);
        assert_eq!(parsed.first_surface.value(), Some(85000.0));
    }

    #[test]
    fn test_statistical_roundtrip_with_hybrid_coefficients() {
        let mut product = temperature();
        product.parameter_category = 1;
        product.parameter_number = 8;
        product.forecast_time = Duration::minutes(90);
        product.first_surface = FixedSurface::from_value(1, 0.0);
        product.statistics = Some(StatisticalProcess {
            end_of_interval: Utc.with_ymd_and_hms(2024, 1, 1, 3, 0, 0).unwrap(),
            missing_values: 0,
            type_of_statistical_processing: 1,
            type_of_time_increment: 2,
            length: Duration::minutes(90),
            increment: Duration::zero(),
        });
        product.vertical_coordinates = vec![0.0, 100.0, 0.0, 1.0];
        let parsed = parse_product_definition(&message_with(&product)).unwrap();
        assert_eq!(parsed.template_number(), 8);
        assert_eq!(parsed, product);
    }

    #[test]
    fn test_unknown_time_unit_rejected() {
        let mut msg = message_with(&temperature());
        // time unit octet: 16 + 9 + 8
        msg[33] = 7;
        assert!(parse_product_definition(&msg).is_err());
    }
}
