//! netCDF classic (CDF-1) and 64-bit offset (CDF-2) file format.
//!
//! ```text
//! header = "CDF" version numrecs dim_list gatt_list var_list
//! var    = name ndims dimids vatt_list nc_type vsize begin
//! ```
//!
//! All integers are big-endian; names and values are padded to 4 bytes.
//! Non-record variables are stored contiguously after the header, followed
//! by the records, each holding one slab of every record variable.

use bytes::{Buf, BufMut};

use crate::error::{NetCdfError, NetCdfResult};
use crate::model::{Attribute, Dataset, Dimension, NcType, NcValues, Variable};

const NC_DIMENSION: u32 = 0x0A;
const NC_VARIABLE: u32 = 0x0B;
const NC_ATTRIBUTE: u32 = 0x0C;
const STREAMING: u32 = 0xFFFF_FFFF;

/// On-disk variant of the classic format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassicFormat {
    /// CDF-1, 32-bit offsets.
    Classic,
    /// CDF-2, 64-bit offsets.
    Offset64,
}

impl ClassicFormat {
    fn version(self) -> u8 {
        match self {
            Self::Classic => 1,
            Self::Offset64 => 2,
        }
    }
}

/// Does `data` start with a classic or 64-bit offset magic?
pub fn is_classic(data: &[u8]) -> bool {
    data.len() >= 4 && &data[..3] == b"CDF" && matches!(data[3], 1 | 2)
}

fn padded(n: usize) -> usize {
    (n + 3) & !3
}

// ============================================================================
// Decoding
// ============================================================================

struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize, what: &str) -> NetCdfResult<&'a [u8]> {
        if self.data.len().saturating_sub(self.pos) < n {
            return Err(NetCdfError::invalid_format(format!("truncated header reading {}", what)));
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self, what: &str) -> NetCdfResult<u32> {
        Ok(self.take(4, what)?.get_u32())
    }

    fn offset(&mut self, format: ClassicFormat) -> NetCdfResult<u64> {
        match format {
            ClassicFormat::Classic => Ok(self.u32("offset")? as u64),
            ClassicFormat::Offset64 => Ok(self.take(8, "offset")?.get_u64()),
        }
    }

    fn name(&mut self) -> NetCdfResult<String> {
        let n = self.u32("name length")? as usize;
        let bytes = self.take(padded(n), "name")?;
        String::from_utf8(bytes[..n].to_vec())
            .map_err(|_| NetCdfError::invalid_format("non UTF-8 name"))
    }

    /// Tag and element count of a list; an absent list reads as zero.
    fn list_header(&mut self, tag: u32, what: &str) -> NetCdfResult<usize> {
        let found = self.u32(what)?;
        let count = self.u32(what)? as usize;
        if found == 0 && count == 0 {
            return Ok(0);
        }
        if found != tag {
            return Err(NetCdfError::invalid_format(format!(
                "expected {} tag {:#x}, found {:#x}",
                what, tag, found
            )));
        }
        Ok(count)
    }

    fn attributes(&mut self) -> NetCdfResult<Vec<Attribute>> {
        let count = self.list_header(NC_ATTRIBUTE, "attribute list")?;
        let mut attributes = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            let name = self.name()?;
            let nc_type = NcType::from_code(self.u32("attribute type")?)?;
            let n = self.u32("attribute length")? as usize;
            let bytes = self.take(padded(n.saturating_mul(nc_type.size())), &name)?;
            attributes.push(Attribute {
                value: decode_values(nc_type, bytes, n),
                name,
            });
        }
        Ok(attributes)
    }
}

fn decode_values(nc_type: NcType, mut bytes: &[u8], n: usize) -> NcValues {
    match nc_type {
        NcType::Byte => NcValues::Byte((0..n).map(|_| bytes.get_i8()).collect()),
        NcType::Char => NcValues::Char(bytes[..n].to_vec()),
        NcType::Short => NcValues::Short((0..n).map(|_| bytes.get_i16()).collect()),
        NcType::Int => NcValues::Int((0..n).map(|_| bytes.get_i32()).collect()),
        NcType::Float => NcValues::Float((0..n).map(|_| bytes.get_f32()).collect()),
        NcType::Double => NcValues::Double((0..n).map(|_| bytes.get_f64()).collect()),
    }
}

struct VarHeader {
    name: String,
    dimensions: Vec<usize>,
    attributes: Vec<Attribute>,
    nc_type: NcType,
    vsize: usize,
    begin: u64,
}

/// Decode a whole classic file.
pub fn decode(data: &[u8]) -> NetCdfResult<Dataset> {
    if !is_classic(data) {
        return Err(NetCdfError::invalid_format("missing CDF magic"));
    }
    let format = if data[3] == 1 {
        ClassicFormat::Classic
    } else {
        ClassicFormat::Offset64
    };
    let mut cur = Cursor { data, pos: 4 };
    let numrecs_raw = cur.u32("numrecs")?;

    let ndims = cur.list_header(NC_DIMENSION, "dimension list")?;
    let mut dimensions = Vec::with_capacity(ndims.min(1024));
    for _ in 0..ndims {
        let name = cur.name()?;
        let len = cur.u32("dimension length")? as usize;
        dimensions.push(Dimension {
            name,
            len,
            unlimited: len == 0,
        });
    }
    let attributes = cur.attributes()?;

    let nvars = cur.list_header(NC_VARIABLE, "variable list")?;
    let mut headers = Vec::with_capacity(nvars.min(4096));
    for _ in 0..nvars {
        let name = cur.name()?;
        let rank = cur.u32("variable rank")? as usize;
        let mut dims = Vec::with_capacity(rank.min(64));
        for _ in 0..rank {
            let id = cur.u32("dimension id")? as usize;
            if id >= dimensions.len() {
                return Err(NetCdfError::invalid_format(format!(
                    "variable '{}' refers to dimension {}",
                    name, id
                )));
            }
            dims.push(id);
        }
        let vatts = cur.attributes()?;
        let nc_type = NcType::from_code(cur.u32("variable type")?)?;
        let vsize = cur.u32("vsize")? as usize;
        let begin = cur.offset(format)?;
        headers.push(VarHeader {
            name,
            dimensions: dims,
            attributes: vatts,
            nc_type,
            vsize,
            begin,
        });
    }

    let record: Vec<bool> = headers
        .iter()
        .map(|h| h.dimensions.first().map(|d| dimensions[*d].unlimited).unwrap_or(false))
        .collect();
    let slabs: Vec<usize> = headers
        .iter()
        .map(|h| {
            h.dimensions
                .iter()
                .filter(|d| !dimensions[**d].unlimited)
                .map(|d| dimensions[*d].len)
                .product::<usize>()
        })
        .collect();
    let record_ids: Vec<usize> = (0..headers.len()).filter(|i| record[*i]).collect();
    let recsize: usize = match record_ids.as_slice() {
        [only] => slabs[*only] * headers[*only].nc_type.size(),
        ids => ids
            .iter()
            .map(|i| padded(slabs[*i] * headers[*i].nc_type.size()))
            .sum(),
    };

    let numrecs = if numrecs_raw == STREAMING {
        match record_ids.iter().map(|i| headers[*i].begin as usize).min() {
            Some(first) if recsize > 0 => data.len().saturating_sub(first) / recsize,
            _ => 0,
        }
    } else {
        numrecs_raw as usize
    };
    for d in dimensions.iter_mut().filter(|d| d.unlimited) {
        d.len = numrecs;
    }

    let mut variables = Vec::with_capacity(headers.len());
    for (k, h) in headers.iter().enumerate() {
        let slab = slabs[k];
        let size = h.nc_type.size();
        let begin = h.begin as usize;
        let bytes = if record[k] {
            let mut all = Vec::with_capacity(slab * size * numrecs);
            for r in 0..numrecs {
                let start = begin + r * recsize;
                all.extend_from_slice(slice_at(data, start, slab * size, &h.name)?);
            }
            all
        } else {
            if h.vsize != 0 && h.vsize < slab * size {
                return Err(NetCdfError::invalid_format(format!(
                    "vsize {} too small for '{}'",
                    h.vsize, h.name
                )));
            }
            slice_at(data, begin, slab * size, &h.name)?.to_vec()
        };
        let count = if record[k] { slab * numrecs } else { slab };
        variables.push(Variable {
            name: h.name.clone(),
            dimensions: h.dimensions.clone(),
            attributes: h.attributes.clone(),
            data: decode_values(h.nc_type, &bytes, count),
        });
    }

    Ok(Dataset {
        dimensions,
        attributes,
        variables,
    })
}

fn slice_at<'a>(data: &'a [u8], start: usize, len: usize, name: &str) -> NetCdfResult<&'a [u8]> {
    data.get(start..start + len)
        .ok_or_else(|| NetCdfError::invalid_format(format!("data of '{}' beyond end of file", name)))
}

// ============================================================================
// Encoding
// ============================================================================

fn put_name(buf: &mut Vec<u8>, name: &str) {
    buf.put_u32(name.len() as u32);
    buf.put_slice(name.as_bytes());
    pad(buf);
}

fn pad(buf: &mut Vec<u8>) {
    while buf.len() % 4 != 0 {
        buf.put_u8(0);
    }
}

fn put_values(buf: &mut Vec<u8>, values: &NcValues) {
    match values {
        NcValues::Byte(v) => v.iter().for_each(|x| buf.put_i8(*x)),
        NcValues::Char(v) => buf.put_slice(v),
        NcValues::Short(v) => v.iter().for_each(|x| buf.put_i16(*x)),
        NcValues::Int(v) => v.iter().for_each(|x| buf.put_i32(*x)),
        NcValues::Float(v) => v.iter().for_each(|x| buf.put_f32(*x)),
        NcValues::Double(v) => v.iter().for_each(|x| buf.put_f64(*x)),
    }
}

fn put_attributes(buf: &mut Vec<u8>, attributes: &[Attribute]) {
    if attributes.is_empty() {
        buf.put_u64(0);
        return;
    }
    buf.put_u32(NC_ATTRIBUTE);
    buf.put_u32(attributes.len() as u32);
    for a in attributes {
        put_name(buf, &a.name);
        buf.put_u32(a.value.nc_type().code());
        buf.put_u32(a.value.len() as u32);
        put_values(buf, &a.value);
        pad(buf);
    }
}

fn header(ds: &Dataset, format: ClassicFormat, layout: &[(usize, u64)]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.put_slice(b"CDF");
    buf.put_u8(format.version());
    buf.put_u32(ds.numrecs() as u32);
    if ds.dimensions.is_empty() {
        buf.put_u64(0);
    } else {
        buf.put_u32(NC_DIMENSION);
        buf.put_u32(ds.dimensions.len() as u32);
        for d in &ds.dimensions {
            put_name(&mut buf, &d.name);
            buf.put_u32(if d.unlimited { 0 } else { d.len as u32 });
        }
    }
    put_attributes(&mut buf, &ds.attributes);
    if ds.variables.is_empty() {
        buf.put_u64(0);
    } else {
        buf.put_u32(NC_VARIABLE);
        buf.put_u32(ds.variables.len() as u32);
        for (v, (vsize, begin)) in ds.variables.iter().zip(layout) {
            put_name(&mut buf, &v.name);
            buf.put_u32(v.dimensions.len() as u32);
            v.dimensions.iter().for_each(|d| buf.put_u32(*d as u32));
            put_attributes(&mut buf, &v.attributes);
            buf.put_u32(v.nc_type().code());
            buf.put_u32((*vsize).min(u32::MAX as usize) as u32);
            match format {
                ClassicFormat::Classic => buf.put_u32(*begin as u32),
                ClassicFormat::Offset64 => buf.put_u64(*begin),
            }
        }
    }
    buf
}

/// Encode a dataset; CDF-1 offsets must stay below 2 GiB.
pub fn encode(ds: &Dataset, format: ClassicFormat) -> NetCdfResult<Vec<u8>> {
    let numrecs = ds.numrecs();
    let slab = |v: &Variable| -> usize {
        v.dimensions
            .iter()
            .filter(|d| !ds.dimensions[**d].unlimited)
            .map(|d| ds.dimensions[*d].len)
            .product::<usize>()
    };
    let n_record = ds.variables.iter().filter(|v| ds.is_record_variable(v)).count();
    let vsizes: Vec<usize> = ds
        .variables
        .iter()
        .map(|v| {
            let raw = slab(v) * v.nc_type().size();
            if ds.is_record_variable(v) && n_record == 1 {
                raw
            } else {
                padded(raw)
            }
        })
        .collect();
    let recsize: usize = ds
        .variables
        .iter()
        .zip(&vsizes)
        .filter(|(v, _)| ds.is_record_variable(v))
        .map(|(_, s)| *s)
        .sum();

    // header length does not depend on offset values
    let placeholder = vec![(0usize, 0u64); ds.variables.len()];
    let header_len = header(ds, format, &placeholder).len();

    let mut layout = Vec::with_capacity(ds.variables.len());
    let mut offset = header_len as u64;
    for (v, vsize) in ds.variables.iter().zip(&vsizes) {
        if !ds.is_record_variable(v) {
            layout.push((*vsize, offset));
            offset += *vsize as u64;
        } else {
            layout.push((*vsize, 0));
        }
    }
    for (i, v) in ds.variables.iter().enumerate() {
        if ds.is_record_variable(v) {
            layout[i].1 = offset;
            offset += vsizes[i] as u64;
        }
    }
    let total = offset + (numrecs.saturating_sub(1) * recsize) as u64;
    if format == ClassicFormat::Classic && total > i32::MAX as u64 {
        return Err(NetCdfError::Unsupported(
            "dataset too large for CDF-1, use the 64-bit offset format".to_string(),
        ));
    }

    let mut buf = header(ds, format, &layout);
    for (v, (vsize, _)) in ds.variables.iter().zip(&layout) {
        if !ds.is_record_variable(v) {
            let start = buf.len();
            put_values(&mut buf, &v.data);
            buf.resize(start + vsize, 0);
        }
    }
    for r in 0..numrecs {
        for (v, (vsize, _)) in ds.variables.iter().zip(&layout) {
            if !ds.is_record_variable(v) {
                continue;
            }
            let n = slab(v);
            let start = buf.len();
            put_values(&mut buf, &slice_values(&v.data, r * n, n));
            buf.resize(start + vsize, 0);
        }
    }
    Ok(buf)
}

fn slice_values(values: &NcValues, start: usize, n: usize) -> NcValues {
    match values {
        NcValues::Byte(v) => NcValues::Byte(v[start..start + n].to_vec()),
        NcValues::Char(v) => NcValues::Char(v[start..start + n].to_vec()),
        NcValues::Short(v) => NcValues::Short(v[start..start + n].to_vec()),
        NcValues::Int(v) => NcValues::Int(v[start..start + n].to_vec()),
        NcValues::Float(v) => NcValues::Float(v[start..start + n].to_vec()),
        NcValues::Double(v) => NcValues::Double(v[start..start + n].to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Dataset {
        let mut ds = Dataset::new();
        ds.add_dimension("time", 0, true).unwrap();
        ds.add_dimension("Y", 2, false).unwrap();
        ds.add_dimension("X", 3, false).unwrap();
        ds.set_attribute("title", NcValues::text("sample"));
        ds.put_variable(
            "lat",
            &["Y"],
            vec![Attribute {
                name: "units".to_string(),
                value: NcValues::text("degrees_north"),
            }],
            NcValues::Float(vec![44.0, 45.0]),
        )
        .unwrap();
        ds.put_variable("t2m", &["time", "Y", "X"], vec![], NcValues::Double((0..12).map(f64::from).collect()))
            .unwrap();
        ds.put_variable("flag", &["time"], vec![], NcValues::Short(vec![1, 2]))
            .unwrap();
        ds
    }

    #[test]
    fn test_classic_and_offset64_roundtrip() {
        let ds = sample();
        for format in [ClassicFormat::Classic, ClassicFormat::Offset64] {
            let bytes = encode(&ds, format).unwrap();
            assert!(is_classic(&bytes));
            assert_eq!(bytes[3], format.version());
            assert_eq!(decode(&bytes).unwrap(), ds);
        }
    }

    #[test]
    fn test_single_record_variable_is_not_padded() {
        let mut ds = Dataset::new();
        ds.add_dimension("time", 0, true).unwrap();
        ds.put_variable("c", &["time"], vec![], NcValues::Char(b"abcde".to_vec()))
            .unwrap();
        let bytes = encode(&ds, ClassicFormat::Classic).unwrap();
        // 5 records of one byte right after the header
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.numrecs(), 5);
        assert_eq!(decoded.variable("c").unwrap().data, NcValues::Char(b"abcde".to_vec()));
        assert!(bytes.ends_with(b"abcde"));
    }

    #[test]
    fn test_truncated_file_rejected() {
        let bytes = encode(&sample(), ClassicFormat::Classic).unwrap();
        assert!(decode(&bytes[..bytes.len() - 4]).is_err());
        assert!(decode(&bytes[..20]).is_err());
        assert!(decode(b"HDF\x01").is_err());
    }
}
