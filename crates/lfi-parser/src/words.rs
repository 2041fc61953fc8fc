//! 8-byte big-endian words, the unit of LFI articles.

use bytes::{Buf, BufMut};

use crate::error::{LfiError, LfiResult};

pub const WORD_BYTES: usize = 8;

fn check_words(data: &[u8]) -> LfiResult<usize> {
    if data.len() % WORD_BYTES != 0 {
        return Err(LfiError::invalid_data(format!(
            "{} bytes is not a whole number of {}-byte words",
            data.len(),
            WORD_BYTES
        )));
    }
    Ok(data.len() / WORD_BYTES)
}

pub fn i64s_to_bytes(values: &[i64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * WORD_BYTES);
    for v in values {
        buf.put_i64(*v);
    }
    buf
}

pub fn bytes_to_i64s(mut data: &[u8]) -> LfiResult<Vec<i64>> {
    let n = check_words(data)?;
    Ok((0..n).map(|_| data.get_i64()).collect())
}

pub fn f64s_to_bytes(values: &[f64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * WORD_BYTES);
    for v in values {
        buf.put_f64(*v);
    }
    buf
}

pub fn bytes_to_f64s(mut data: &[u8]) -> LfiResult<Vec<f64>> {
    let n = check_words(data)?;
    Ok((0..n).map(|_| data.get_f64()).collect())
}

/// Characters stored one per word, as integer code points.
pub fn str_to_bytes(s: &str) -> Vec<u8> {
    let codes: Vec<i64> = s.chars().map(|c| c as i64).collect();
    i64s_to_bytes(&codes)
}

pub fn bytes_to_str(data: &[u8]) -> LfiResult<String> {
    bytes_to_i64s(data)?
        .into_iter()
        .map(|code| {
            u32::try_from(code)
                .ok()
                .and_then(char::from_u32)
                .ok_or_else(|| LfiError::invalid_data(format!("{} is not a character code", code)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_are_big_endian() {
        assert_eq!(i64s_to_bytes(&[1]), vec![0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(bytes_to_f64s(&f64s_to_bytes(&[-1.5])).unwrap(), vec![-1.5]);
    }

    #[test]
    fn test_string_one_char_per_word() {
        let b = str_to_bytes("MNH");
        assert_eq!(b.len(), 24);
        assert_eq!(bytes_to_str(&b).unwrap(), "MNH");
        assert!(bytes_to_i64s(&[0u8; 7]).is_err());
        assert!(bytes_to_str(&i64s_to_bytes(&[-3])).is_err());
    }
}
