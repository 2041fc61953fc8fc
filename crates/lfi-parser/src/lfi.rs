//! LFI record archives.
//!
//! An LFI file is a sequence of physical records of [`RECORD_WORDS`]
//! 8-byte big-endian words. Record 0 holds the header:
//!
//! | word | content                                |
//! |------|----------------------------------------|
//! | 0    | magic `LFI_FILE`                        |
//! | 1    | format version                          |
//! | 2    | words per record                        |
//! | 3    | number of articles                      |
//! | 4    | first record of the index               |
//! | 5    | length of the index, in words           |
//! | 6    | next free record                        |
//!
//! Every article starts on a record boundary and spans as many records as
//! its length needs. The index is written after the last article when the
//! archive is closed; each entry is 5 words: the name (16 bytes, space
//! padded), the first record, the length in words and a CRC-32 of the data.

use bytes::{Buf, BufMut};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use meteo_common::OpenMode;

use crate::error::{LfiError, LfiResult};
use crate::words::{self, WORD_BYTES};

pub const MAGIC: &[u8; 8] = b"LFI_FILE";
pub const FORMAT_VERSION: u64 = 1;
pub const RECORD_WORDS: usize = 512;
pub const RECORD_BYTES: usize = RECORD_WORDS * WORD_BYTES;
pub const MAX_NAME_LEN: usize = 16;

const HEADER_WORDS: usize = 7;
const INDEX_ENTRY_WORDS: usize = 5;

/// An entry of the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Article {
    pub name: String,
    pub first_record: u64,
    /// Length in words.
    pub length: usize,
    pub checksum: u32,
}

impl Article {
    fn records(&self) -> u64 {
        records_for(self.length)
    }
}

fn records_for(words: usize) -> u64 {
    words.div_ceil(RECORD_WORDS) as u64
}

/// Check an article name: 1 to 16 printable ASCII characters, no padding.
pub fn check_name(name: &str) -> LfiResult<()> {
    let reason = if name.is_empty() {
        Some("empty name")
    } else if name.len() > MAX_NAME_LEN {
        Some("longer than 16 characters")
    } else if !name.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
        Some("non printable character")
    } else if name.ends_with(' ') || name.starts_with(' ') {
        Some("leading or trailing blanks")
    } else {
        None
    };
    match reason {
        Some(reason) => Err(LfiError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

/// Is `path` an LFI archive?
pub fn is_lfi(path: &Path) -> bool {
    let mut magic = [0u8; 8];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .map(|_| &magic == MAGIC)
        .unwrap_or(false)
}

/// An open LFI archive. Closed (index flushed) on drop.
#[derive(Debug)]
pub struct LfiFile {
    path: PathBuf,
    mode: OpenMode,
    file: Option<File>,
    articles: Vec<Article>,
    next_record: u64,
    modified: bool,
}

impl LfiFile {
    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> LfiResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut archive = match mode {
            OpenMode::Write => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(&path)?;
                Self {
                    path,
                    mode,
                    file: Some(file),
                    articles: Vec::new(),
                    next_record: 1,
                    modified: true,
                }
            }
            OpenMode::Read | OpenMode::Append => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(mode == OpenMode::Append)
                    .open(&path)?;
                let mut archive = Self {
                    path,
                    mode,
                    file: Some(file),
                    articles: Vec::new(),
                    next_record: 1,
                    modified: false,
                };
                archive.read_index()?;
                archive
            }
        };
        if mode == OpenMode::Write {
            archive.write_header(0, 0)?;
        }
        debug!(
            path = %archive.path.display(),
            mode = %mode,
            articles = archive.articles.len(),
            "Opened LFI archive"
        );
        Ok(archive)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Article names, in writing order.
    pub fn listnames(&self) -> Vec<String> {
        self.articles.iter().map(|a| a.name.clone()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn article(&self, name: &str) -> Option<&Article> {
        self.position(name).map(|k| &self.articles[k])
    }

    /// Length of an article, in words.
    pub fn article_length(&self, name: &str) -> LfiResult<usize> {
        self.article(name)
            .map(|a| a.length)
            .ok_or_else(|| LfiError::NotFound(name.to_string()))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.articles.iter().position(|a| a.name == name)
    }

    fn file(&mut self) -> LfiResult<&mut File> {
        let path = &self.path;
        self.file
            .as_mut()
            .ok_or_else(|| LfiError::invalid_format(format!("{} is closed", path.display())))
    }

    fn check_writable(&self, operation: &str) -> LfiResult<()> {
        if self.mode.writable() {
            Ok(())
        } else {
            Err(LfiError::mode(self.mode, operation))
        }
    }

    // ========================================================================
    // Articles
    // ========================================================================

    /// Raw bytes of an article, checked against the stored CRC.
    pub fn read(&mut self, name: &str) -> LfiResult<Vec<u8>> {
        let article = self
            .article(name)
            .cloned()
            .ok_or_else(|| LfiError::NotFound(name.to_string()))?;
        let mut data = vec![0u8; article.length * WORD_BYTES];
        let file = self.file()?;
        file.seek(SeekFrom::Start(article.first_record * RECORD_BYTES as u64))?;
        file.read_exact(&mut data)?;
        let computed = crc32fast::hash(&data);
        if computed != article.checksum {
            return Err(LfiError::Checksum {
                name: name.to_string(),
                stored: article.checksum,
                computed,
            });
        }
        Ok(data)
    }

    pub fn read_i64s(&mut self, name: &str) -> LfiResult<Vec<i64>> {
        words::bytes_to_i64s(&self.read(name)?)
    }

    pub fn read_f64s(&mut self, name: &str) -> LfiResult<Vec<f64>> {
        words::bytes_to_f64s(&self.read(name)?)
    }

    /// Write an article; an existing one is overwritten, in place if it fits.
    pub fn write(&mut self, name: &str, data: &[u8]) -> LfiResult<()> {
        self.check_writable("write an article")?;
        check_name(name)?;
        if data.len() % WORD_BYTES != 0 {
            return Err(LfiError::invalid_data(format!(
                "article '{}' is {} bytes, not a whole number of words",
                name,
                data.len()
            )));
        }
        let length = data.len() / WORD_BYTES;
        let existing = self.position(name);
        let first_record = match existing.map(|k| &self.articles[k]) {
            Some(old) if old.records() >= records_for(length) && old.records() > 0 => old.first_record,
            _ => {
                let first = self.next_record;
                self.next_record += records_for(length);
                first
            }
        };

        let padding = records_for(length) as usize * RECORD_BYTES - data.len();
        let file = self.file()?;
        file.seek(SeekFrom::Start(first_record * RECORD_BYTES as u64))?;
        file.write_all(data)?;
        file.write_all(&vec![0u8; padding])?;

        let article = Article {
            name: name.to_string(),
            first_record,
            length,
            checksum: crc32fast::hash(data),
        };
        match existing {
            Some(k) => {
                debug!(name = %name, "Overwriting LFI article");
                self.articles[k] = article;
            }
            None => self.articles.push(article),
        }
        self.modified = true;
        Ok(())
    }

    pub fn write_i64s(&mut self, name: &str, values: &[i64]) -> LfiResult<()> {
        self.write(name, &words::i64s_to_bytes(values))
    }

    pub fn write_f64s(&mut self, name: &str, values: &[f64]) -> LfiResult<()> {
        self.write(name, &words::f64s_to_bytes(values))
    }

    /// Remove an article from the index. Its records are not reclaimed.
    pub fn delete(&mut self, name: &str) -> LfiResult<()> {
        self.check_writable("delete an article")?;
        let k = self.position(name).ok_or_else(|| LfiError::NotFound(name.to_string()))?;
        self.articles.remove(k);
        self.modified = true;
        Ok(())
    }

    pub fn rename(&mut self, name: &str, new_name: &str) -> LfiResult<()> {
        self.check_writable("rename an article")?;
        check_name(new_name)?;
        if self.contains(new_name) {
            return Err(LfiError::InvalidName {
                name: new_name.to_string(),
                reason: "already present".to_string(),
            });
        }
        let k = self.position(name).ok_or_else(|| LfiError::NotFound(name.to_string()))?;
        self.articles[k].name = new_name.to_string();
        self.modified = true;
        Ok(())
    }

    // ========================================================================
    // Header and index
    // ========================================================================

    fn read_index(&mut self) -> LfiResult<()> {
        let file = self.file()?;
        let mut header = vec![0u8; HEADER_WORDS * WORD_BYTES];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header).map_err(|_| {
            LfiError::invalid_format("file too short for an LFI header")
        })?;
        if &header[..8] != MAGIC {
            return Err(LfiError::invalid_format("missing LFI_FILE magic"));
        }
        let mut h = &header[8..];
        let version = h.get_u64();
        let record_words = h.get_u64() as usize;
        let count = h.get_u64() as usize;
        let index_record = h.get_u64();
        let index_words = h.get_u64() as usize;
        let next_record = h.get_u64();
        if version != FORMAT_VERSION || record_words != RECORD_WORDS {
            return Err(LfiError::invalid_format(format!(
                "unsupported LFI version {} with {} words per record",
                version, record_words
            )));
        }
        if index_words != count * INDEX_ENTRY_WORDS {
            return Err(LfiError::invalid_format(format!(
                "index of {} words cannot hold {} articles",
                index_words, count
            )));
        }

        let mut index = vec![0u8; index_words * WORD_BYTES];
        file.seek(SeekFrom::Start(index_record * RECORD_BYTES as u64))?;
        file.read_exact(&mut index)
            .map_err(|_| LfiError::invalid_format("truncated LFI index"))?;
        let mut buf = &index[..];
        let mut articles = Vec::with_capacity(count);
        for _ in 0..count {
            let mut raw = [0u8; MAX_NAME_LEN];
            buf.copy_to_slice(&mut raw);
            let name = std::str::from_utf8(&raw)
                .map_err(|_| LfiError::invalid_format("non UTF-8 article name"))?
                .trim_end()
                .to_string();
            let first_record = buf.get_u64();
            let length = buf.get_u64() as usize;
            let checksum = buf.get_u64() as u32;
            articles.push(Article {
                name,
                first_record,
                length,
                checksum,
            });
        }
        self.articles = articles;
        self.next_record = next_record;
        Ok(())
    }

    fn write_header(&mut self, index_record: u64, index_words: usize) -> LfiResult<()> {
        let mut header = Vec::with_capacity(RECORD_BYTES);
        header.put_slice(MAGIC);
        header.put_u64(FORMAT_VERSION);
        header.put_u64(RECORD_WORDS as u64);
        header.put_u64(self.articles.len() as u64);
        header.put_u64(index_record);
        header.put_u64(index_words as u64);
        header.put_u64(self.next_record);
        header.resize(RECORD_BYTES, 0);
        let file = self.file()?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&header)?;
        Ok(())
    }

    fn write_index(&mut self) -> LfiResult<()> {
        let mut index = Vec::with_capacity(self.articles.len() * INDEX_ENTRY_WORDS * WORD_BYTES);
        for a in &self.articles {
            let mut raw = [b' '; MAX_NAME_LEN];
            raw[..a.name.len()].copy_from_slice(a.name.as_bytes());
            index.put_slice(&raw);
            index.put_u64(a.first_record);
            index.put_u64(a.length as u64);
            index.put_u64(a.checksum as u64);
        }
        let index_record = self.next_record;
        let index_words = index.len() / WORD_BYTES;
        let end = index_record * RECORD_BYTES as u64 + index.len() as u64;
        let file = self.file()?;
        file.seek(SeekFrom::Start(index_record * RECORD_BYTES as u64))?;
        file.write_all(&index)?;
        file.set_len(end)?;
        self.write_header(index_record, index_words)
    }

    /// Flush the index (if anything changed) and release the file.
    pub fn close(&mut self) -> LfiResult<()> {
        if self.file.is_none() {
            return Ok(());
        }
        if self.modified {
            self.write_index()?;
            self.file()?.flush()?;
            self.modified = false;
        }
        self.file = None;
        debug!(path = %self.path.display(), "Closed LFI archive");
        Ok(())
    }
}

impl Drop for LfiFile {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(path = %self.path.display(), error = %e, "Failed to close LFI archive");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_name() {
        assert!(check_name("S001HUMI.SPECIFI").is_ok());
        assert!(check_name("").is_err());
        assert!(check_name("S001HUMI.SPECIFIC").is_err());
        assert!(check_name("UT ").is_err());
        assert!(check_name("é").is_err());
    }

    #[test]
    fn test_records_for() {
        assert_eq!(records_for(0), 0);
        assert_eq!(records_for(1), 1);
        assert_eq!(records_for(RECORD_WORDS), 1);
        assert_eq!(records_for(RECORD_WORDS + 1), 2);
    }

    #[test]
    fn test_overwrite_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.lfi");
        let mut lfi = LfiFile::open(&path, OpenMode::Write).unwrap();
        lfi.write_f64s("A", &[1.0; 10]).unwrap();
        lfi.write_f64s("B", &[2.0; 10]).unwrap();
        let first = lfi.article("A").unwrap().first_record;
        lfi.write_f64s("A", &[3.0; 20]).unwrap();
        assert_eq!(lfi.article("A").unwrap().first_record, first);
        lfi.write_f64s("A", &[4.0; RECORD_WORDS + 1]).unwrap();
        assert!(lfi.article("A").unwrap().first_record > first);
        assert_eq!(lfi.listnames(), vec!["A", "B"]);
    }
}
