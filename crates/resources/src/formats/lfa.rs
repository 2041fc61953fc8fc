//! LFA list archives: named arrays of integers, reals or strings.
//!
//! Every entry is a Misc field.

use std::path::{Path, PathBuf};

use tracing::debug;

use field::{Field, FieldId, FormatFid, GenericFid, MiscField, MiscValue};
use geometry::Geometry;
use lfi_parser::{LfaData, LfaFile};
use meteo_common::{EngineConfig, FieldValidityList, OpenMode};

use crate::error::{ResourceError, Result};
use crate::field_dict::FieldType;
use crate::resource::{Format, FormatResource};

/// LFA data of a Misc value; booleans are stored as integers.
fn to_lfa(value: &MiscValue) -> LfaData {
    match value {
        MiscValue::Int(v) => LfaData::Int(vec![*v]),
        MiscValue::IntArray(v) => LfaData::Int(v.clone()),
        MiscValue::Float(v) => LfaData::Real(vec![*v]),
        MiscValue::FloatArray(v) => LfaData::Real(v.clone()),
        MiscValue::Bool(v) => LfaData::Int(vec![*v as i64]),
        MiscValue::BoolArray(v) => LfaData::Int(v.iter().map(|b| *b as i64).collect()),
        MiscValue::Str(s) => LfaData::Char(vec![s.clone()]),
        MiscValue::StrArray(v) => LfaData::Char(v.clone()),
    }
}

/// Single-element entries read back as scalars.
fn from_lfa(data: &LfaData) -> MiscValue {
    match data {
        LfaData::Int(v) if v.len() == 1 => MiscValue::Int(v[0]),
        LfaData::Int(v) => MiscValue::IntArray(v.clone()),
        LfaData::Real(v) if v.len() == 1 => MiscValue::Float(v[0]),
        LfaData::Real(v) => MiscValue::FloatArray(v.clone()),
        LfaData::Char(v) if v.len() == 1 => MiscValue::Str(v[0].clone()),
        LfaData::Char(v) => MiscValue::StrArray(v.clone()),
    }
}

/// An LFA archive.
#[derive(Debug)]
pub struct LfaResource {
    path: PathBuf,
    mode: OpenMode,
    lfa: Option<LfaFile>,
}

impl LfaResource {
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self> {
        if mode == OpenMode::Write && path.exists() && EngineConfig::global().protect_unhappy_writes {
            return Err(ResourceError::usage(format!(
                "{} exists and overwriting is protected",
                path.display()
            )));
        }
        let lfa = LfaFile::open(path, mode)?;
        Ok(Self {
            path: path.to_path_buf(),
            mode,
            lfa: Some(lfa),
        })
    }

    fn lfa(&self) -> Result<&LfaFile> {
        self.lfa
            .as_ref()
            .ok_or_else(|| ResourceError::usage(format!("{} is not open", self.path.display())))
    }

    /// Type code (`I`, `R`, `C`) and length of an entry.
    pub fn fieldtype(&self, name: &str) -> Option<(char, usize)> {
        self.lfa.as_ref()?.fieldtype(name)
    }
}

impl FormatResource for LfaResource {
    fn format(&self) -> Format {
        Format::Lfa
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn openmode(&self) -> OpenMode {
        self.mode
    }

    fn is_open(&self) -> bool {
        self.lfa.is_some()
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut lfa) = self.lfa.take() {
            lfa.close()?;
        }
        Ok(())
    }

    fn listfields(&self) -> Result<Vec<FormatFid>> {
        Ok(self
            .lfa
            .as_ref()
            .map(|l| l.listfields().into_iter().map(FormatFid::Name).collect())
            .unwrap_or_default())
    }

    fn field_type(&self, _fid: &FormatFid) -> FieldType {
        FieldType::Misc
    }

    fn generic_fid(&self, _fid: &FormatFid) -> Option<GenericFid> {
        None
    }

    fn readfield(&mut self, fid: &FormatFid) -> Result<Field> {
        let name = fid
            .as_name()
            .ok_or_else(|| ResourceError::usage(format!("'{}' is not an LFA entry name", fid)))?;
        let value = from_lfa(self.lfa()?.read(name)?);
        debug!(field = %name, kind = value.type_name(), "Read LFA entry");
        Ok(Field::Misc(MiscField::new(FieldId::named(Format::Lfa.as_str(), name), value)))
    }

    fn writefield(&mut self, field: &Field) -> Result<()> {
        let Field::Misc(misc) = field else {
            return Err(ResourceError::unsupported(format!(
                "'{}': LFA archives hold Misc fields only",
                field.fid().display_name()
            )));
        };
        let name = field
            .fid()
            .get(Format::Lfa.as_str())
            .and_then(FormatFid::as_name)
            .ok_or_else(|| ResourceError::usage(format!("field '{}' has no LFA name", field.fid().display_name())))?
            .to_string();
        let path = self.path.clone();
        self.lfa
            .as_mut()
            .ok_or_else(|| ResourceError::usage(format!("{} is not open", path.display())))?
            .write(&name, to_lfa(&misc.value))?;
        debug!(field = %name, "Wrote LFA entry");
        Ok(())
    }

    fn geometry(&self) -> Option<&Geometry> {
        None
    }

    fn validity(&self) -> Option<&FieldValidityList> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_misc_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("list.lfa");
        let entries = [
            ("NSTEP", MiscValue::Int(12)),
            ("ZLEV", MiscValue::FloatArray(vec![10.0, 2.5])),
            ("CNAME", MiscValue::StrArray(vec!["A".into(), "BB".into()])),
        ];
        {
            let mut w = LfaResource::open(&path, OpenMode::Write).unwrap();
            for (name, value) in &entries {
                let field = Field::Misc(MiscField::new(FieldId::named("LFA", *name), value.clone()));
                w.writefield(&field).unwrap();
            }
            w.close().unwrap();
            assert!(!w.is_open());
        }
        let mut r = LfaResource::open(&path, OpenMode::Read).unwrap();
        assert_eq!(r.listfields().unwrap().len(), 3);
        assert_eq!(r.fieldtype("ZLEV"), Some(('R', 2)));
        for (name, value) in entries {
            let field = r.readfield(&FormatFid::name(name)).unwrap();
            assert_eq!(field.as_misc(), Some(&value));
        }
    }

    #[test]
    fn test_booleans_become_integers() {
        assert_eq!(from_lfa(&to_lfa(&MiscValue::Bool(true))), MiscValue::Int(1));
    }
}
