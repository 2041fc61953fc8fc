//! Meso-NH LFI files.
//!
//! A plain LFI archive where every record starts with a two-word prefix
//! (the grid indicator and the length of a comment), then the comment, one
//! character per word, then the values. Values are typed by the LFI field
//! dictionary; gridded fields live on the Meso-NH grid described by the
//! header records (`IMAX`, `XHAT`, `ZHAT`...).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::Duration;
use tracing::{debug, info};

use field::{Field, FieldId, FormatFid, GenericFid, GeoField, MiscField, MiscValue};
use geometry::{Geometry, VCoordinate, VPosition};
use lfi_parser::{words, LfiError, LfiFile};
use meteo_common::{EngineConfig, FieldValidity, FieldValidityList, OpenMode};

use crate::error::{ResourceError, Result};
use crate::field_dict::{field_dict, DictEntry, DictFormat, FieldType, Nature};
use crate::formats::mesonh::{self, MesoNhHeader};
use crate::resource::{Format, FormatResource};

const PREFIX_WORDS: usize = 2;

/// Date records: (day record, seconds record) of the experiment start and current date.
const DTEXP: (&str, &str) = ("DTEXP%TDATE", "DTEXP%TIME");
const DTCUR: (&str, &str) = ("DTCUR%TDATE", "DTCUR%TIME");

/// Decoded record: grid indicator, comment, raw value words.
#[derive(Debug, Clone, PartialEq)]
pub struct LfiRecord {
    pub grid: i64,
    pub comment: String,
    pub data: Vec<u8>,
}

impl LfiRecord {
    pub fn encode(&self) -> Vec<u8> {
        let chars: Vec<i64> = self.comment.chars().map(|c| c as i64).collect();
        let mut out = words::i64s_to_bytes(&[self.grid, chars.len() as i64]);
        out.extend(words::i64s_to_bytes(&chars));
        out.extend_from_slice(&self.data);
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let prefix_bytes = PREFIX_WORDS * words::WORD_BYTES;
        let prefix = bytes
            .get(..prefix_bytes)
            .ok_or_else(|| corrupt("LFI record shorter than its prefix"))?;
        let prefix = words::bytes_to_i64s(prefix)?;
        let (grid, comment_len) = (prefix[0], prefix[1].max(0) as usize);
        let data_start = prefix_bytes + comment_len * words::WORD_BYTES;
        let comment_words = bytes
            .get(prefix_bytes..data_start)
            .ok_or_else(|| corrupt("LFI record comment runs past its end"))?;
        let comment = words::bytes_to_i64s(comment_words)?
            .into_iter()
            .filter_map(|c| char::from_u32(c as u32))
            .collect();
        Ok(Self {
            grid,
            comment,
            data: bytes[data_start..].to_vec(),
        })
    }
}

fn corrupt(msg: impl Into<String>) -> ResourceError {
    ResourceError::Lfi(LfiError::invalid_data(msg))
}

fn chars_to_string(codes: &[i64]) -> String {
    codes.iter().filter_map(|c| char::from_u32(*c as u32)).collect()
}

fn string_words(s: &str) -> Vec<u8> {
    words::i64s_to_bytes(&s.chars().map(|c| c as i64).collect::<Vec<_>>())
}

/// Value words of a Misc value.
fn encode_value(value: &MiscValue) -> Vec<u8> {
    match value {
        MiscValue::Int(v) => words::i64s_to_bytes(&[*v]),
        MiscValue::IntArray(v) => words::i64s_to_bytes(v),
        MiscValue::Float(v) => words::f64s_to_bytes(&[*v]),
        MiscValue::FloatArray(v) => words::f64s_to_bytes(v),
        MiscValue::Bool(v) => words::i64s_to_bytes(&[*v as i64]),
        MiscValue::BoolArray(v) => {
            words::i64s_to_bytes(&v.iter().map(|b| *b as i64).collect::<Vec<_>>())
        }
        MiscValue::Str(s) => string_words(s),
        MiscValue::StrArray(v) => string_words(&v.join("\n")),
    }
}

fn decode_value(data: &[u8], entry: &DictEntry) -> Result<MiscValue> {
    let scalar = entry.dimension == 0;
    Ok(match entry.nature {
        Nature::Int => {
            let v = words::bytes_to_i64s(data)?;
            match (scalar, v.as_slice()) {
                (true, [x]) => MiscValue::Int(*x),
                _ => MiscValue::IntArray(v),
            }
        }
        Nature::Bool => {
            let v: Vec<bool> = words::bytes_to_i64s(data)?.into_iter().map(|x| x != 0).collect();
            match (scalar, v.as_slice()) {
                (true, [x]) => MiscValue::Bool(*x),
                _ => MiscValue::BoolArray(v),
            }
        }
        Nature::Float => {
            let v = words::bytes_to_f64s(data)?;
            match (scalar, v.as_slice()) {
                (true, [x]) => MiscValue::Float(*x),
                _ => MiscValue::FloatArray(v),
            }
        }
        Nature::Str => {
            let s = chars_to_string(&words::bytes_to_i64s(data)?);
            if scalar {
                MiscValue::Str(s)
            } else {
                MiscValue::StrArray(s.split('\n').map(str::to_string).collect())
            }
        }
    })
}

fn entry(name: &str) -> DictEntry {
    field_dict(DictFormat::Lfi)
        .find(name)
        .cloned()
        .unwrap_or_else(|| DictEntry::fallback(name))
}

/// Numeric values of record `name`, if present.
fn read_numbers(lfi: &mut LfiFile, name: &str) -> Result<Option<Vec<f64>>> {
    if !lfi.contains(name) {
        return Ok(None);
    }
    let record = LfiRecord::decode(&lfi.read(name)?)?;
    let value = decode_value(&record.data, &entry(name))?;
    Ok(value.as_f64s())
}

/// An LFI file.
#[derive(Debug)]
pub struct LfiResource {
    path: PathBuf,
    mode: OpenMode,
    lfi: Option<LfiFile>,
    header: Option<MesoNhHeader>,
    geometry: Option<Geometry>,
    validity: Option<FieldValidityList>,
}

impl LfiResource {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        if mode == OpenMode::Write && path.exists() && EngineConfig::global().protect_unhappy_writes {
            return Err(ResourceError::usage(format!(
                "{} exists and overwriting is protected",
                path.display()
            )));
        }
        let mut lfi = LfiFile::open(path, mode)?;
        let mut resource = Self {
            path: path.to_path_buf(),
            mode,
            lfi: None,
            header: None,
            geometry: None,
            validity: None,
        };
        if mode.readable() {
            if lfi.contains("IMAX") {
                let header = MesoNhHeader::read(|name| read_numbers(&mut lfi, name))?;
                resource.geometry = Some(header.geometry()?);
                resource.header = Some(header);
            }
            resource.validity = Self::read_validity(&mut lfi)?;
        }
        resource.lfi = Some(lfi);
        debug!(
            path = %path.display(),
            mode = %mode.as_str(),
            gridded = resource.geometry.is_some(),
            "Opened LFI file"
        );
        Ok(resource)
    }

    fn read_date(lfi: &mut LfiFile, (day, time): (&str, &str)) -> Result<Option<chrono::DateTime<chrono::Utc>>> {
        let (Some(tdate), Some(seconds)) = (read_numbers(lfi, day)?, read_numbers(lfi, time)?) else {
            return Ok(None);
        };
        let seconds = seconds.first().copied().unwrap_or(0.0);
        mesonh::date_from_parts(&tdate, seconds).map(Some)
    }

    fn read_validity(lfi: &mut LfiFile) -> Result<Option<FieldValidityList>> {
        let Some(basis) = Self::read_date(lfi, DTEXP)? else {
            return Ok(None);
        };
        let current = Self::read_date(lfi, DTCUR)?.unwrap_or(basis);
        let validity = FieldValidity::from_dates(basis, current).with_cumulativeduration(Duration::zero());
        Ok(Some(FieldValidityList::new(validity)))
    }

    fn lfi_mut(&mut self) -> Result<&mut LfiFile> {
        self.lfi
            .as_mut()
            .ok_or_else(|| ResourceError::usage(format!("{} is not open", self.path.display())))
    }

    fn write_record(&mut self, name: &str, record: &LfiRecord) -> Result<()> {
        if self.lfi.as_ref().is_some_and(|l| l.contains(name)) {
            info!(field = %name, path = %self.path.display(), "Overwriting field");
        }
        self.lfi_mut()?.write(name, &record.encode())?;
        Ok(())
    }

    fn write_misc(&mut self, name: &str, value: &MiscValue, comment: &str) -> Result<()> {
        let record = LfiRecord {
            grid: 0,
            comment: comment.to_string(),
            data: encode_value(value),
        };
        self.write_record(name, &record)
    }

    /// Header and date records written with the first gridded field.
    fn write_specials(&mut self, geometry: &Geometry, validity: &FieldValidityList) -> Result<()> {
        let header = MesoNhHeader::from_geometry(geometry)?;
        for (name, value) in header.records() {
            self.write_misc(name, &value, "")?;
        }
        let v = validity.single()?;
        for ((day, time), date) in [(DTEXP, v.basis), (DTCUR, v.get())] {
            let (tdate, seconds) = mesonh::date_parts(date);
            self.write_misc(day, &MiscValue::IntArray(tdate), "")?;
            self.write_misc(time, &MiscValue::Float(seconds), "")?;
        }
        self.geometry = Some(header.geometry()?);
        self.header = Some(header);
        self.validity = Some(validity.clone());
        debug!(path = %self.path.display(), "Wrote Meso-NH header records");
        Ok(())
    }

    /// Geometry of a field of `entry` with points at grid indicator `grid`.
    fn field_geometry(&self, name: &str, entry: &DictEntry, grid: i64) -> Result<Geometry> {
        let own = self
            .geometry
            .as_ref()
            .ok_or_else(|| ResourceError::missing_auxiliary("IMAX", format!("read gridded field '{}'", name)))?;
        let (hpos, vpos) = mesonh::grid_indicator(grid);
        let mut vcoordinate = match entry.field_type {
            FieldType::D3 => own.vcoordinate.clone(),
            _ => VCoordinate::single(entry.type_of_first_fixed_surface, entry.level.unwrap_or(0.0)),
        };
        if vpos != VPosition::Unknown {
            vcoordinate.position_on_grid = vpos;
        }
        Ok(own.with_vcoordinate(vcoordinate).with_position(hpos))
    }

    fn write_geo(&mut self, name: &str, geo: &GeoField, comment: Option<&str>) -> Result<()> {
        if geo.is_spectral() {
            return Err(ResourceError::unsupported(format!(
                "'{}': LFI holds gridpoint fields only",
                name
            )));
        }
        if geo.validity.len() != 1 {
            return Err(ResourceError::usage(format!(
                "'{}': LFI fields hold one validity",
                name
            )));
        }
        match &self.geometry {
            None => {
                let (geometry, validity) = (geo.geometry.clone(), geo.validity.clone());
                self.write_specials(&geometry, &validity)?;
            }
            Some(own) => {
                if !own.same_horizontal_grid(&geo.geometry) {
                    return Err(ResourceError::usage(format!(
                        "'{}': field geometry differs from the file's ({} {}x{})",
                        name, own.name, own.dimensions.x, own.dimensions.y
                    )));
                }
                let levels = geo.levels_number();
                if levels > 1 && levels != own.vcoordinate.levels.len() {
                    return Err(ResourceError::usage(format!(
                        "'{}': {} levels on a file of {}",
                        name,
                        levels,
                        own.vcoordinate.levels.len()
                    )));
                }
            }
        }
        let record = LfiRecord {
            grid: mesonh::grid_indicator_code(
                geo.geometry.position_on_horizontal_grid,
                geo.geometry.vcoordinate.position_on_grid,
            ),
            comment: comment.unwrap_or_default().to_string(),
            data: words::f64s_to_bytes(geo.values()),
        };
        self.write_record(name, &record)?;
        debug!(field = %name, levels = geo.levels_number(), "Wrote LFI field");
        Ok(())
    }

    /// Header of the Meso-NH grid, when the file has one.
    pub fn header(&self) -> Option<&MesoNhHeader> {
        self.header.as_ref()
    }
}

impl FormatResource for LfiResource {
    fn format(&self) -> Format {
        Format::Lfi
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn openmode(&self) -> OpenMode {
        self.mode
    }

    fn is_open(&self) -> bool {
        self.lfi.as_ref().is_some_and(LfiFile::is_open)
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut lfi) = self.lfi.take() {
            lfi.close()?;
        }
        Ok(())
    }

    fn listfields(&self) -> Result<Vec<FormatFid>> {
        let Some(lfi) = &self.lfi else {
            return Ok(Vec::new());
        };
        Ok(lfi
            .listnames()
            .into_iter()
            .map(|name| FormatFid::Record { name, time: 0 })
            .collect())
    }

    fn field_type(&self, fid: &FormatFid) -> FieldType {
        fid.as_name().map_or(FieldType::Misc, |n| entry(n).field_type)
    }

    fn generic_fid(&self, fid: &FormatFid) -> Option<GenericFid> {
        let e = entry(fid.as_name()?);
        match e.field_type {
            FieldType::Misc => None,
            FieldType::H2D => e.generic(0.0),
            FieldType::D3 => {
                let mut g = e.generic(0.0)?;
                if let Some(own) = &self.geometry {
                    g.type_of_first_fixed_surface = own.vcoordinate.typeoffirstfixedsurface;
                }
                Some(g)
            }
        }
    }

    fn readfield(&mut self, fid: &FormatFid) -> Result<Field> {
        if !self.mode.readable() {
            return Err(ResourceError::usage(format!(
                "cannot read fields from {} opened in write mode",
                self.path.display()
            )));
        }
        let name = fid
            .as_name()
            .ok_or_else(|| ResourceError::usage(format!("'{}' is not an LFI record name", fid)))?
            .to_string();
        if !self.lfi.as_ref().is_some_and(|l| l.contains(&name)) {
            return Err(ResourceError::not_found(format!("'{}' in {}", name, self.path.display())));
        }
        let record = LfiRecord::decode(&self.lfi_mut()?.read(&name)?)?;
        let entry = field_dict(DictFormat::Lfi).inquire(&name);
        let mut id = FieldId::new(Format::Lfi.as_str(), FormatFid::Record { name: name.clone(), time: 0 });
        if let Some(g) = self.generic_fid(fid) {
            id = id.with_generic(g);
        }

        if entry.field_type == FieldType::Misc {
            let value = decode_value(&record.data, &entry)?;
            let mut misc = MiscField::new(id, value);
            if !record.comment.is_empty() {
                misc = misc.with_comment(record.comment);
            }
            return Ok(Field::Misc(misc));
        }

        let geometry = self.field_geometry(&name, &entry, record.grid)?;
        let validity = self
            .validity
            .clone()
            .ok_or_else(|| ResourceError::missing_auxiliary(DTCUR.0, format!("date field '{}'", name)))?;
        let values = words::bytes_to_f64s(&record.data)?;
        let mut geo = GeoField::new(id, geometry, validity, values)?;
        if !record.comment.is_empty() {
            geo = geo.with_comment(record.comment);
        }
        debug!(field = %name, grid = record.grid, "Read LFI field");
        Ok(match entry.field_type {
            FieldType::D3 => Field::D3(geo),
            _ => Field::H2D(geo),
        })
    }

    fn writefield(&mut self, field: &Field) -> Result<()> {
        if !self.mode.writable() {
            return Err(ResourceError::usage(format!(
                "cannot write fields in {} opened in read mode",
                self.path.display()
            )));
        }
        let name = field
            .fid()
            .get(Format::Lfi.as_str())
            .and_then(FormatFid::as_name)
            .ok_or_else(|| ResourceError::usage(format!("field '{}' has no LFI name", field.fid().display_name())))?
            .to_string();
        match field {
            Field::Misc(misc) => {
                let comment = misc.comment.clone().unwrap_or_default();
                self.write_misc(&name, &misc.value, &comment)?;
                debug!(field = %name, "Wrote LFI Misc field");
                Ok(())
            }
            Field::H2D(geo) | Field::D3(geo) => self.write_geo(&name, geo, geo.comment.as_deref()),
            Field::Vector(_) => Err(ResourceError::usage("write the components of a vector field separately")),
        }
    }

    fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    fn validity(&self) -> Option<&FieldValidityList> {
        self.validity.as_ref()
    }

    fn sortfields(&self) -> Result<BTreeMap<String, Vec<FormatFid>>> {
        let mut groups: BTreeMap<String, Vec<FormatFid>> = BTreeMap::new();
        for fid in self.listfields()? {
            let group = match self.field_type(&fid) {
                FieldType::D3 => "3D fields",
                FieldType::H2D => "2D fields",
                FieldType::Misc if fid.as_name().is_some_and(|n| mesonh::HEADER_VARIABLES.contains(&n)) => {
                    "Header"
                }
                FieldType::Misc => "Misc-fields",
            };
            groups.entry(group.to_string()).or_default().push(fid);
        }
        Ok(groups)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_prefix_roundtrip() {
        let record = LfiRecord {
            grid: 4,
            comment: "X_Y_Z_U component of wind (m/s)".to_string(),
            data: words::f64s_to_bytes(&[1.5, -2.0]),
        };
        let back = LfiRecord::decode(&record.encode()).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_truncated_record() {
        let mut bytes = words::i64s_to_bytes(&[1, 30]);
        bytes.extend(words::i64s_to_bytes(&[65, 66]));
        assert!(LfiRecord::decode(&bytes).is_err());
        assert!(LfiRecord::decode(&bytes[..8]).is_err());
    }

    #[test]
    fn test_values_follow_dictionary_nature() {
        let imax = entry("IMAX");
        assert_eq!(decode_value(&encode_value(&MiscValue::Int(3)), &imax).unwrap(), MiscValue::Int(3));

        let tdate = entry("DTEXP%TDATE");
        let v = MiscValue::IntArray(vec![2024, 1, 15]);
        assert_eq!(decode_value(&encode_value(&v), &tdate).unwrap(), v);

        let program = entry("PROGRAM");
        let v = MiscValue::Str("MESONH".to_string());
        assert_eq!(decode_value(&encode_value(&v), &program).unwrap(), v);
        assert_eq!(
            decode_value(&encode_value(&MiscValue::Bool(true)), &entry("CARTESIAN")).unwrap(),
            MiscValue::Bool(true)
        );
    }
}
