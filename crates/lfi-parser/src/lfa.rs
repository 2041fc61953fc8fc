//! LFA list archives: named arrays of integers, reals or strings.
//!
//! Layout, big-endian:
//!
//! ```text
//! "LFA_LIST" | u64 entry count | entries...
//! entry: u16 name length | name | type (b'I', b'R' or b'C') | u64 count | payload
//! ```
//!
//! Integers and reals are 8-byte words; strings are a u32 length and bytes.
//! The whole list is held in memory and written back on close.

use bytes::{Buf, BufMut};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use meteo_common::config::{EngineConfig, LfaConfig};
use meteo_common::OpenMode;

use crate::error::{LfiError, LfiResult};

pub const LFA_MAGIC: &[u8; 8] = b"LFA_LIST";

/// Contents of one LFA entry.
#[derive(Debug, Clone, PartialEq)]
pub enum LfaData {
    Int(Vec<i64>),
    Real(Vec<f64>),
    Char(Vec<String>),
}

impl LfaData {
    /// One-letter type code: I, R or C.
    pub fn type_code(&self) -> char {
        match self {
            Self::Int(_) => 'I',
            Self::Real(_) => 'R',
            Self::Char(_) => 'C',
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Int(v) => v.len(),
            Self::Real(v) => v.len(),
            Self::Char(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LfaEntry {
    pub name: String,
    pub data: LfaData,
}

/// Is `path` an LFA archive?
pub fn is_lfa(path: &Path) -> bool {
    let mut magic = [0u8; 8];
    fs::File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map(|_| &magic == LFA_MAGIC)
        .unwrap_or(false)
}

/// An open LFA archive. Written back on drop when modified.
#[derive(Debug)]
pub struct LfaFile {
    path: PathBuf,
    mode: OpenMode,
    limits: LfaConfig,
    entries: Vec<LfaEntry>,
    modified: bool,
    open: bool,
}

impl LfaFile {
    /// Open with the limits of the engine configuration.
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> LfiResult<Self> {
        Self::open_with(path, mode, EngineConfig::global().lfa.clone())
    }

    pub fn open_with(path: impl AsRef<Path>, mode: OpenMode, limits: LfaConfig) -> LfiResult<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = match mode {
            OpenMode::Write => Vec::new(),
            OpenMode::Read | OpenMode::Append => decode(&fs::read(&path)?)?,
        };
        debug!(path = %path.display(), mode = %mode, entries = entries.len(), "Opened LFA archive");
        Ok(Self {
            path,
            mode,
            limits,
            entries,
            modified: mode == OpenMode::Write,
            open: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn listfields(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.name.clone()).collect()
    }

    /// Type code and length of an entry.
    pub fn fieldtype(&self, name: &str) -> Option<(char, usize)> {
        self.entry(name).map(|e| (e.data.type_code(), e.data.len()))
    }

    fn entry(&self, name: &str) -> Option<&LfaEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub fn read(&self, name: &str) -> LfiResult<&LfaData> {
        if !self.mode.readable() {
            return Err(LfiError::mode(self.mode, "read an entry"));
        }
        self.entry(name)
            .map(|e| &e.data)
            .ok_or_else(|| LfiError::NotFound(name.to_string()))
    }

    /// Add or replace an entry.
    pub fn write(&mut self, name: &str, data: LfaData) -> LfiResult<()> {
        if !self.mode.writable() {
            return Err(LfiError::mode(self.mode, "write an entry"));
        }
        if name.is_empty() || name.len() > self.limits.maxstrlen {
            return Err(LfiError::InvalidName {
                name: name.to_string(),
                reason: format!("length must lie in 1..={}", self.limits.maxstrlen),
            });
        }
        if let LfaData::Char(strings) = &data {
            if let Some(s) = strings.iter().find(|s| s.len() > self.limits.maxstrlen) {
                return Err(LfiError::Limit(format!(
                    "string of {} characters in '{}' exceeds {}",
                    s.len(),
                    name,
                    self.limits.maxstrlen
                )));
            }
        }
        match self.entries.iter_mut().find(|e| e.name == name) {
            Some(entry) => entry.data = data,
            None => {
                if self.entries.len() >= self.limits.max_num_fields {
                    return Err(LfiError::Limit(format!(
                        "an LFA archive holds at most {} fields",
                        self.limits.max_num_fields
                    )));
                }
                self.entries.push(LfaEntry {
                    name: name.to_string(),
                    data,
                });
            }
        }
        self.modified = true;
        Ok(())
    }

    pub fn close(&mut self) -> LfiResult<()> {
        if !self.open {
            return Ok(());
        }
        if self.modified {
            fs::write(&self.path, encode(&self.entries))?;
            self.modified = false;
        }
        self.open = false;
        debug!(path = %self.path.display(), "Closed LFA archive");
        Ok(())
    }
}

impl Drop for LfaFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), error = %e, "Failed to close LFA archive");
        }
    }
}

// ============================================================================
// Codec
// ============================================================================

fn encode(entries: &[LfaEntry]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.put_slice(LFA_MAGIC);
    buf.put_u64(entries.len() as u64);
    for e in entries {
        buf.put_u16(e.name.len() as u16);
        buf.put_slice(e.name.as_bytes());
        buf.put_u8(e.data.type_code() as u8);
        buf.put_u64(e.data.len() as u64);
        match &e.data {
            LfaData::Int(v) => v.iter().for_each(|x| buf.put_i64(*x)),
            LfaData::Real(v) => v.iter().for_each(|x| buf.put_f64(*x)),
            LfaData::Char(v) => v.iter().for_each(|s| {
                buf.put_u32(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }),
        }
    }
    buf
}

fn need(buf: &[u8], n: usize, what: &str) -> LfiResult<()> {
    if buf.remaining() < n {
        return Err(LfiError::invalid_format(format!("truncated LFA archive reading {}", what)));
    }
    Ok(())
}

fn take_string(buf: &mut &[u8], n: usize, what: &str) -> LfiResult<String> {
    need(buf, n, what)?;
    let s = std::str::from_utf8(&buf[..n])
        .map_err(|_| LfiError::invalid_format(format!("non UTF-8 {}", what)))?
        .to_string();
    buf.advance(n);
    Ok(s)
}

fn decode(data: &[u8]) -> LfiResult<Vec<LfaEntry>> {
    let mut buf = data;
    need(buf, 16, "header")?;
    if &buf[..8] != LFA_MAGIC {
        return Err(LfiError::invalid_format("missing LFA_LIST magic"));
    }
    buf.advance(8);
    let count = buf.get_u64() as usize;
    let mut entries = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        need(buf, 2, "name length")?;
        let name_len = buf.get_u16() as usize;
        let name = take_string(&mut buf, name_len, "entry name")?;
        need(buf, 9, "entry type")?;
        let type_code = buf.get_u8();
        let n = buf.get_u64() as usize;
        let data = match type_code {
            b'I' => {
                need(buf, n.saturating_mul(8), &name)?;
                LfaData::Int((0..n).map(|_| buf.get_i64()).collect())
            }
            b'R' => {
                need(buf, n.saturating_mul(8), &name)?;
                LfaData::Real((0..n).map(|_| buf.get_f64()).collect())
            }
            b'C' => {
                let mut strings = Vec::with_capacity(n.min(4096));
                for _ in 0..n {
                    need(buf, 4, &name)?;
                    let len = buf.get_u32() as usize;
                    strings.push(take_string(&mut buf, len, &name)?);
                }
                LfaData::Char(strings)
            }
            other => {
                return Err(LfiError::invalid_format(format!(
                    "unknown type code {:?} for entry '{}'",
                    other as char, name
                )))
            }
        };
        entries.push(LfaEntry { name, data });
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_keeps_order_and_types() {
        let entries = vec![
            LfaEntry {
                name: "NLEV".to_string(),
                data: LfaData::Int(vec![90]),
            },
            LfaEntry {
                name: "PRESSURE".to_string(),
                data: LfaData::Real(vec![1000.0, 850.0]),
            },
            LfaEntry {
                name: "NAMES".to_string(),
                data: LfaData::Char(vec!["T".to_string(), "".to_string()]),
            },
        ];
        assert_eq!(decode(&encode(&entries)).unwrap(), entries);
    }

    #[test]
    fn test_truncated_archive_rejected() {
        let mut bytes = encode(&[LfaEntry {
            name: "X".to_string(),
            data: LfaData::Real(vec![1.0, 2.0]),
        }]);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(decode(&bytes), Err(LfiError::InvalidFormat(_))));
        assert!(decode(b"LFI_FILE\0\0\0\0\0\0\0\0").is_err());
    }
}
