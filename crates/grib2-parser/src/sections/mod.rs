//! GRIB2 section parsing and writing.
//!
//! Each GRIB2 message consists of numbered sections:
//! 0 indicator, 1 identification, 3 grid definition, 4 product definition,
//! 5 data representation, 6 bitmap, 7 data and the `7777` end marker.
//! Section 2 (local use) is skipped when present.
//!
//! Signed integers are stored as sign and magnitude, not two's complement.

pub mod grid;
pub mod product;

use bytes::{BufMut, Bytes};
use chrono::{DateTime, Datelike, NaiveDate, Timelike, Utc};

use crate::error::{Grib2Error, Grib2Result};

pub use grid::{EarthShape, GridDefinition, GridTemplate};
pub use product::{FixedSurface, ProductDefinition, StatisticalProcess};

/// Section 0: Indicator Section (16 bytes)
#[derive(Debug, Clone)]
pub struct Indicator {
    pub discipline: u8,
    pub edition: u8,
    pub message_length: u64,
}

/// Section 1: Identification Section
#[derive(Debug, Clone, PartialEq)]
pub struct Identification {
    pub center: u16,
    pub sub_center: u16,
    pub table_version: u8,
    pub local_table_version: u8,
    pub significance_of_reference_time: u8,
    pub reference_time: DateTime<Utc>,
    pub production_status: u8,
    pub data_type: u8,
}

/// Section 5: Data Representation Section (template 5.0, simple packing)
#[derive(Debug, Clone, PartialEq)]
pub struct DataRepresentation {
    /// Number of packed values (missing points excluded).
    pub num_data_points: u32,
    pub packing_method: u16,
    pub original_data_type: u8,
    pub reference_value: f32,
    pub binary_scale_factor: i16,
    pub decimal_scale_factor: i16,
    pub bits_per_value: u8,
}

/// Section 6: Bitmap Section
#[derive(Debug, Clone)]
pub struct Bitmap {
    pub indicator: u8,
    pub data: Bytes,
}

/// Section 7: Data Section
#[derive(Debug, Clone)]
pub struct DataSection {
    pub data: Bytes,
}

// ============================================================================
// Octet helpers
// ============================================================================

pub(crate) fn u16_at(d: &[u8], i: usize) -> u16 {
    u16::from_be_bytes([d[i], d[i + 1]])
}

pub(crate) fn u32_at(d: &[u8], i: usize) -> u32 {
    u32::from_be_bytes([d[i], d[i + 1], d[i + 2], d[i + 3]])
}

pub(crate) fn i16_at(d: &[u8], i: usize) -> i16 {
    let raw = u16_at(d, i);
    let magnitude = (raw & 0x7FFF) as i16;
    if raw & 0x8000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

pub(crate) fn i32_at(d: &[u8], i: usize) -> i32 {
    let raw = u32_at(d, i);
    let magnitude = (raw & 0x7FFF_FFFF) as i32;
    if raw & 0x8000_0000 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

pub(crate) fn put_i16(buf: &mut Vec<u8>, v: i16) {
    let magnitude = v.unsigned_abs() & 0x7FFF;
    buf.put_u16(if v < 0 { magnitude | 0x8000 } else { magnitude });
}

pub(crate) fn put_i32(buf: &mut Vec<u8>, v: i32) {
    let magnitude = v.unsigned_abs() & 0x7FFF_FFFF;
    buf.put_u32(if v < 0 { magnitude | 0x8000_0000 } else { magnitude });
}

/// Write a section: length, number, then the body.
pub(crate) fn write_section(buf: &mut Vec<u8>, number: u8, body: impl FnOnce(&mut Vec<u8>)) {
    let start = buf.len();
    buf.put_u32(0);
    buf.put_u8(number);
    body(buf);
    let length = (buf.len() - start) as u32;
    buf[start..start + 4].copy_from_slice(&length.to_be_bytes());
}

/// Check that a section holds at least `needed` bytes.
pub(crate) fn require(section: u8, data: &[u8], needed: usize) -> Grib2Result<()> {
    if data.len() < needed {
        return Err(Grib2Error::section(
            section,
            format!("needs at least {} bytes, got {}", needed, data.len()),
        ));
    }
    Ok(())
}

// ===== Parsing Functions =====

/// Parse Section 0 (Indicator) from start of message
pub fn parse_indicator(data: &[u8]) -> Result<Indicator, Grib2Error> {
    if data.len() < 16 {
        return Err(Grib2Error::InvalidFormat(
            "Not enough data for indicator section".to_string(),
        ));
    }

    if &data[0..4] != b"GRIB" {
        return Err(Grib2Error::InvalidFormat(
            "Invalid GRIB magic bytes".to_string(),
        ));
    }

    // Octets 5-6 reserved, 7 discipline, 8 edition, 9-16 total length
    let discipline = data[6];
    let edition = data[7];
    let message_length = u64::from_be_bytes([
        data[8], data[9], data[10], data[11], data[12], data[13], data[14], data[15],
    ]);

    if edition != 2 {
        return Err(Grib2Error::InvalidFormat(format!(
            "Expected GRIB edition 2, got {}",
            edition
        )));
    }

    Ok(Indicator {
        discipline,
        edition,
        message_length,
    })
}

/// Parse Section 1 (Identification), located at offset 16 in the message
pub fn parse_identification(data: &[u8]) -> Result<Identification, Grib2Error> {
    let section_offset = find_section(data, 1)?;
    let sec = &data[section_offset..];
    require(1, sec, 21)?;

    let year = u16_at(sec, 12);
    let (month, day, hour, minute, second) = (sec[14], sec[15], sec[16], sec[17], sec[18]);
    let reference_time = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
        .and_then(|date| date.and_hms_opt(hour as u32, minute as u32, second as u32))
        .ok_or_else(|| {
            Grib2Error::section(
                1,
                format!(
                    "Invalid date: {}-{:02}-{:02} {:02}:{:02}:{:02}",
                    year, month, day, hour, minute, second
                ),
            )
        })?;

    Ok(Identification {
        center: u16_at(sec, 5),
        sub_center: u16_at(sec, 7),
        table_version: sec[9],
        local_table_version: sec[10],
        significance_of_reference_time: sec[11],
        reference_time: DateTime::<Utc>::from_naive_utc_and_offset(reference_time, Utc),
        production_status: sec[19],
        data_type: sec[20],
    })
}

/// Parse Section 5 (Data Representation)
pub fn parse_data_representation(data: &[u8]) -> Result<DataRepresentation, Grib2Error> {
    let section_offset = find_section(data, 5)?;
    let sec = &data[section_offset..];
    require(5, sec, 11)?;

    let packing_method = u16_at(sec, 9);
    if packing_method != 0 {
        return Err(Grib2Error::UnsupportedTemplate {
            what: "data representation",
            number: packing_method,
        });
    }
    require(5, sec, 21)?;

    Ok(DataRepresentation {
        num_data_points: u32_at(sec, 5),
        packing_method,
        reference_value: f32::from_be_bytes([sec[11], sec[12], sec[13], sec[14]]),
        binary_scale_factor: i16_at(sec, 15),
        decimal_scale_factor: i16_at(sec, 17),
        bits_per_value: sec[19],
        original_data_type: sec[20],
    })
}

/// Parse Section 6 (Bitmap); `None` when the message has no bitmap.
pub fn parse_bitmap(data: &[u8]) -> Result<Option<Bitmap>, Grib2Error> {
    let section_offset = find_section(data, 6)?;
    let section_length = u32_at(data, section_offset) as usize;
    let sec = &data[section_offset..section_offset + section_length];
    require(6, sec, 6)?;

    let indicator = sec[5];
    match indicator {
        255 => Ok(None),
        0 => Ok(Some(Bitmap {
            indicator,
            data: Bytes::copy_from_slice(&sec[6..]),
        })),
        other => Err(Grib2Error::section(
            6,
            format!("predefined bitmap {} is not supported", other),
        )),
    }
}

/// Parse Section 7 (Data)
pub fn parse_data_section(data: &[u8]) -> Result<DataSection, Grib2Error> {
    let section_offset = find_section(data, 7)?;
    let sec = &data[section_offset..];
    require(7, sec, 5)?;

    let section_length = u32_at(sec, 0) as usize;
    if section_length > sec.len() {
        return Err(Grib2Error::section(7, "Section length exceeds available data"));
    }
    Ok(DataSection {
        data: Bytes::copy_from_slice(&sec[5..section_length]),
    })
}

// ===== Writing Functions =====

pub fn write_indicator(buf: &mut Vec<u8>, discipline: u8, message_length: u64) {
    buf.put_slice(b"GRIB");
    buf.put_u16(0);
    buf.put_u8(discipline);
    buf.put_u8(2);
    buf.put_u64(message_length);
}

impl Identification {
    pub fn write(&self, buf: &mut Vec<u8>) {
        write_section(buf, 1, |b| {
            let t = &self.reference_time;
            b.put_u16(self.center);
            b.put_u16(self.sub_center);
            b.put_u8(self.table_version);
            b.put_u8(self.local_table_version);
            b.put_u8(self.significance_of_reference_time);
            b.put_u16(t.year() as u16);
            b.put_u8(t.month() as u8);
            b.put_u8(t.day() as u8);
            b.put_u8(t.hour() as u8);
            b.put_u8(t.minute() as u8);
            b.put_u8(t.second() as u8);
            b.put_u8(self.production_status);
            b.put_u8(self.data_type);
        });
    }
}

impl DataRepresentation {
    pub fn write(&self, buf: &mut Vec<u8>) {
        write_section(buf, 5, |b| {
            b.put_u32(self.num_data_points);
            b.put_u16(self.packing_method);
            b.put_f32(self.reference_value);
            put_i16(b, self.binary_scale_factor);
            put_i16(b, self.decimal_scale_factor);
            b.put_u8(self.bits_per_value);
            b.put_u8(self.original_data_type);
        });
    }
}

/// Write Section 6, with or without a bitmap.
pub fn write_bitmap(buf: &mut Vec<u8>, bitmap: Option<&[u8]>) {
    write_section(buf, 6, |b| match bitmap {
        Some(bits) => {
            b.put_u8(0);
            b.put_slice(bits);
        }
        None => b.put_u8(255),
    });
}

pub fn write_data_section(buf: &mut Vec<u8>, packed: &[u8]) {
    write_section(buf, 7, |b| b.put_slice(packed));
}

// ===== Helper Functions =====

/// Find a section by number within a message
pub(crate) fn find_section(data: &[u8], section_num: u8) -> Result<usize, Grib2Error> {
    let mut offset = 16; // After Section 0

    loop {
        if offset + 5 > data.len() {
            return Err(Grib2Error::section(section_num, "Section not found"));
        }
        if &data[offset..offset + 4] == b"7777" {
            return Err(Grib2Error::section(
                section_num,
                "Reached end of message without finding section",
            ));
        }

        let section_length = u32_at(data, offset) as usize;
        if section_length < 5 || offset + section_length > data.len() {
            return Err(Grib2Error::section(section_num, "Invalid section length"));
        }

        if data[offset + 4] == section_num {
            return Ok(offset);
        }
        offset += section_length;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sign_magnitude() {
        let mut buf = Vec::new();
        put_i32(&mut buf, -45_000_000);
        put_i16(&mut buf, -3);
        assert_eq!(buf[0] & 0x80, 0x80);
        assert_eq!(i32_at(&buf, 0), -45_000_000);
        assert_eq!(i16_at(&buf, 4), -3);
    }

    #[test]
    fn test_identification_roundtrip() {
        let id = Identification {
            center: 85,
            sub_center: 0,
            table_version: 14,
            local_table_version: 0,
            significance_of_reference_time: 1,
            reference_time: Utc.with_ymd_and_hms(2024, 1, 15, 6, 30, 0).unwrap(),
            production_status: 2,
            data_type: 2,
        };
        let mut msg = vec![0u8; 16];
        id.write(&mut msg);
        assert_eq!(msg.len(), 16 + 21);
        msg.extend_from_slice(b"7777");
        assert_eq!(parse_identification(&msg).unwrap(), id);
        assert!(find_section(&msg, 3).is_err());
    }

    #[test]
    fn test_indicator_rejects_edition_1() {
        let mut buf = Vec::new();
        write_indicator(&mut buf, 0, 16);
        assert_eq!(parse_indicator(&buf).unwrap().message_length, 16);
        buf[7] = 1;
        assert!(parse_indicator(&buf).is_err());
        assert!(parse_indicator(b"BUFR").is_err());
    }
}
