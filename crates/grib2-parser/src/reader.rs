//! Reading and writing sequences of GRIB2 messages.

use bytes::Bytes;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

use crate::error::{Grib2Error, Grib2Result};
use crate::message::Grib2Message;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decompress gzip-compressed GRIB2 data.
pub fn decompress_gzip(data: &[u8]) -> Grib2Result<Bytes> {
    let mut decoder = flate2::read::GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(Bytes::from(decompressed))
}

/// Read a file, transparently decompressing gzip.
pub fn read_file(path: &Path) -> Grib2Result<Bytes> {
    let raw = fs::read(path)?;
    if raw.starts_with(&GZIP_MAGIC) {
        debug!(path = %path.display(), "Decompressing gzip GRIB2 file");
        return decompress_gzip(&raw);
    }
    Ok(Bytes::from(raw))
}

/// Does `path` start with a GRIB edition 2 message?
pub fn is_grib2(path: &Path) -> bool {
    read_file(path)
        .map(|data| data.len() >= 16 && &data[..4] == b"GRIB" && data[7] == 2)
        .unwrap_or(false)
}

/// Iterates over the messages of a GRIB2 byte stream.
///
/// Bytes between messages are skipped up to the next "GRIB" marker.
pub struct Grib2Reader {
    data: Bytes,
    offset: usize,
}

impl Grib2Reader {
    pub fn new(data: Bytes) -> Self {
        Self { data, offset: 0 }
    }

    pub fn open(path: &Path) -> Grib2Result<Self> {
        Ok(Self::new(read_file(path)?))
    }

    /// Byte range of the next message, advancing past it.
    fn next_message(&mut self) -> Option<Grib2Result<Bytes>> {
        let start = self.offset + find_marker(&self.data[self.offset..])?;
        if start + 16 > self.data.len() {
            self.offset = self.data.len();
            return Some(Err(Grib2Error::InvalidFormat(
                "truncated indicator section".to_string(),
            )));
        }
        let mut len = [0u8; 8];
        len.copy_from_slice(&self.data[start + 8..start + 16]);
        let length = u64::from_be_bytes(len) as usize;
        if length < 16 || start + length > self.data.len() {
            self.offset = self.data.len();
            return Some(Err(Grib2Error::InvalidFormat(format!(
                "message at byte {} announces {} bytes beyond end of data",
                start, length
            ))));
        }
        self.offset = start + length;
        Some(Ok(self.data.slice(start..start + length)))
    }
}

fn find_marker(data: &[u8]) -> Option<usize> {
    data.windows(4).position(|w| w == b"GRIB")
}

impl Iterator for Grib2Reader {
    type Item = Grib2Result<Grib2Message>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_message()
            .map(|bytes| bytes.and_then(|b| Grib2Message::parse(&b)))
    }
}

/// Appends encoded messages to a file.
pub struct Grib2Writer {
    file: fs::File,
    count: usize,
}

impl Grib2Writer {
    /// Create (truncate) or append to `path`.
    pub fn open(path: &Path, append: bool) -> Grib2Result<Self> {
        let file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(path)?;
        Ok(Self { file, count: 0 })
    }

    pub fn write(&mut self, message: &Grib2Message) -> Grib2Result<()> {
        self.file.write_all(&message.encode())?;
        self.count += 1;
        Ok(())
    }

    /// Number of messages written through this writer.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn flush(&mut self) -> Grib2Result<()> {
        self.file.flush()?;
        Ok(())
    }
}
