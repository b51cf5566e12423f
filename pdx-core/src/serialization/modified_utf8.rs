//! Java-modified UTF-8, as produced by `DataOutput.writeUTF` on the JVM.
//!
//! The codec works on UTF-16 code units rather than code points. NUL becomes
//! the two-byte sequence `C0 80` and each half of a surrogate pair is encoded
//! separately as a three-byte sequence.

use crate::error::{PdxError, Result};

/// Returns the number of bytes `s` occupies in modified UTF-8.
pub fn encoded_len(s: &str) -> usize {
    s.encode_utf16().map(unit_len).sum()
}

/// Returns `true` when every UTF-16 unit of `s` is encoded as a single byte.
///
/// NUL does not qualify because it takes two bytes.
pub fn is_ascii(s: &str) -> bool {
    s.bytes().all(|b| b != 0 && b < 0x80)
}

#[inline]
fn unit_len(unit: u16) -> usize {
    match unit {
        0 => 2,
        1..=0x7F => 1,
        0x80..=0x7FF => 2,
        _ => 3,
    }
}

/// Appends the modified UTF-8 encoding of `s` to `out`.
pub fn encode_into(s: &str, out: &mut Vec<u8>) {
    for unit in s.encode_utf16() {
        match unit {
            1..=0x7F => out.push(unit as u8),
            0 | 0x80..=0x7FF => {
                out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
            _ => {
                out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
                out.push(0x80 | (unit & 0x3F) as u8);
            }
        }
    }
}

/// Encodes `s` into a fresh vector.
pub fn encode(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(s));
    encode_into(s, &mut out);
    out
}

/// Decodes modified UTF-8 bytes into UTF-16 code units.
pub fn decode_units(bytes: &[u8]) -> Result<Vec<u16>> {
    let mut units = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b0 = bytes[i];
        match b0 >> 4 {
            0..=7 => {
                units.push(b0 as u16);
                i += 1;
            }
            12 | 13 => {
                let b1 = continuation(bytes, i, 1)?;
                units.push((((b0 & 0x1F) as u16) << 6) | (b1 & 0x3F) as u16);
                i += 2;
            }
            14 => {
                let b1 = continuation(bytes, i, 1)?;
                let b2 = continuation(bytes, i, 2)?;
                units.push(
                    (((b0 & 0x0F) as u16) << 12)
                        | (((b1 & 0x3F) as u16) << 6)
                        | (b2 & 0x3F) as u16,
                );
                i += 3;
            }
            _ => {
                return Err(PdxError::Serialization(format!(
                    "malformed modified UTF-8: unexpected byte 0x{:02X} at {}",
                    b0, i
                )))
            }
        }
    }
    Ok(units)
}

fn continuation(bytes: &[u8], start: usize, n: usize) -> Result<u8> {
    match bytes.get(start + n) {
        Some(&b) if b & 0xC0 == 0x80 => Ok(b),
        Some(&b) => Err(PdxError::Serialization(format!(
            "malformed modified UTF-8: bad continuation byte 0x{:02X} at {}",
            b,
            start + n
        ))),
        None => Err(PdxError::Serialization(
            "malformed modified UTF-8: truncated sequence".to_string(),
        )),
    }
}

/// Converts UTF-16 code units into a string, rejecting unpaired surrogates.
pub fn units_to_string(units: &[u16]) -> Result<String> {
    String::from_utf16(units)
        .map_err(|e| PdxError::Serialization(format!("invalid UTF-16 string: {}", e)))
}

/// Decodes modified UTF-8 bytes into a string.
pub fn decode(bytes: &[u8]) -> Result<String> {
    units_to_string(&decode_units(bytes)?)
}
