//! Data output traits and implementations for PDX serialization.

use super::buffer_pool;
use super::ds_code::DsCode;
use super::modified_utf8;
use crate::error::{PdxError, Result};
use bytes::{BufMut, Bytes};

/// Trait for writing primitive values in the PDX binary format.
///
/// All multi-byte values are written in big-endian byte order.
pub trait DataOutput {
    /// Writes a single byte (i8).
    fn write_byte(&mut self, v: i8) -> Result<()>;

    /// Writes a boolean as a single byte (0 for false, 1 for true).
    fn write_bool(&mut self, v: bool) -> Result<()>;

    /// Writes a UTF-16 code unit in big-endian order.
    fn write_char(&mut self, v: u16) -> Result<()>;

    /// Writes a 16-bit signed integer in big-endian order.
    fn write_short(&mut self, v: i16) -> Result<()>;

    /// Writes a 32-bit signed integer in big-endian order.
    fn write_int(&mut self, v: i32) -> Result<()>;

    /// Writes a 64-bit signed integer in big-endian order.
    fn write_long(&mut self, v: i64) -> Result<()>;

    /// Writes a 32-bit floating point in big-endian order.
    fn write_float(&mut self, v: f32) -> Result<()>;

    /// Writes a 64-bit floating point in big-endian order.
    fn write_double(&mut self, v: f64) -> Result<()>;

    /// Writes raw bytes without length prefix.
    fn write_bytes(&mut self, v: &[u8]) -> Result<()>;

    /// Writes a DSCode-tagged string; `None` is written as the null string.
    fn write_string(&mut self, v: Option<&str>) -> Result<()>;
}

/// A growable output buffer backed by the thread-local buffer pool.
///
/// The buffer is append-only except for [`write_int_at`](Self::write_int_at),
/// which back-patches headers once their values are known.
#[derive(Debug)]
pub struct ObjectDataOutput {
    buffer: Vec<u8>,
}

impl ObjectDataOutput {
    /// Creates a new `ObjectDataOutput` using a pooled buffer.
    pub fn new() -> Self {
        Self {
            buffer: buffer_pool::checkout(),
        }
    }

    /// Creates a new `ObjectDataOutput` able to hold `capacity` bytes without growing.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut output = Self::new();
        output.ensure(capacity)?;
        Ok(output)
    }

    /// Returns the written bytes as a slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Copies the written bytes out; the buffer itself goes back to the pool on drop.
    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buffer)
    }

    /// Consumes the output and returns a right-sized copy of the written bytes.
    ///
    /// The pooled buffer itself is checked back in when `self` drops.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer.as_slice().to_vec()
    }

    /// Returns the number of bytes written.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns the current write position.
    pub fn position(&self) -> usize {
        self.buffer.len()
    }

    /// Clears the buffer, removing all written data.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    fn ensure(&mut self, additional: usize) -> Result<()> {
        buffer_pool::reserve(&mut self.buffer, additional)
    }

    /// Overwrites four bytes at `pos` with a big-endian `v`.
    pub fn write_int_at(&mut self, pos: usize, v: i32) -> Result<()> {
        let end = pos.checked_add(4).filter(|&end| end <= self.buffer.len());
        match end {
            Some(end) => {
                self.buffer[pos..end].copy_from_slice(&v.to_be_bytes());
                Ok(())
            }
            None => Err(PdxError::Serialization(format!(
                "cannot patch int at {} in a buffer of {} bytes",
                pos,
                self.buffer.len()
            ))),
        }
    }

    /// Writes an offset-table entry of the given width (1, 2 or 4 bytes).
    pub fn write_offset(&mut self, offset: usize, width: usize) -> Result<()> {
        match width {
            1 if offset <= u8::MAX as usize => self.write_bytes(&[offset as u8]),
            2 if offset <= u16::MAX as usize => {
                self.write_bytes(&(offset as u16).to_be_bytes())
            }
            4 if offset <= i32::MAX as usize => self.write_int(offset as i32),
            _ => Err(PdxError::Serialization(format!(
                "offset {} does not fit in a {} byte entry",
                offset, width
            ))),
        }
    }

    /// Writes an array length using the variable-width prefix.
    ///
    /// `-1` (null) is `0xFF`; `0..=252` is a single byte; up to `0xFFFF` is
    /// `0xFE` plus a u16; anything larger is `0xFD` plus a u32.
    pub fn write_array_len(&mut self, len: i32) -> Result<()> {
        match len {
            -1 => self.write_bytes(&[0xFF]),
            0..=252 => self.write_bytes(&[len as u8]),
            253..=0xFFFF => {
                self.write_bytes(&[0xFE])?;
                self.write_bytes(&(len as u16).to_be_bytes())
            }
            n if n > 0xFFFF => {
                self.write_bytes(&[0xFD])?;
                self.write_int(n)
            }
            n => Err(PdxError::InvalidArgument(format!(
                "array length {} is out of range",
                n
            ))),
        }
    }

    fn write_len_of(&mut self, len: usize) -> Result<()> {
        let len = i32::try_from(len).map_err(|_| {
            PdxError::InvalidArgument(format!("array of {} elements is too long", len))
        })?;
        self.write_array_len(len)
    }

    /// Writes an untagged string: u16 length plus modified UTF-8.
    pub fn write_utf(&mut self, v: &str) -> Result<()> {
        let len = modified_utf8::encoded_len(v);
        if len > 0xFFFF {
            return Err(PdxError::InvalidArgument(format!(
                "encoded string of {} bytes exceeds 65535",
                len
            )));
        }
        self.ensure(2 + len)?;
        self.buffer.put_u16(len as u16);
        modified_utf8::encode_into(v, &mut self.buffer);
        Ok(())
    }

    /// Writes the body of a huge ASCII string: u32 length plus raw bytes.
    pub fn write_ascii_huge(&mut self, v: &str) -> Result<()> {
        self.write_len_i32(v.len())?;
        self.write_bytes(v.as_bytes())
    }

    /// Writes the body of a huge string: u32 unit count plus big-endian UTF-16.
    pub fn write_utf16_huge(&mut self, v: &str) -> Result<()> {
        let units: Vec<u16> = v.encode_utf16().collect();
        self.write_len_i32(units.len())?;
        self.ensure(units.len() * 2)?;
        for unit in units {
            self.buffer.put_u16(unit);
        }
        Ok(())
    }

    fn write_len_i32(&mut self, len: usize) -> Result<()> {
        let len = i32::try_from(len).map_err(|_| {
            PdxError::InvalidArgument(format!("length {} does not fit in 32 bits", len))
        })?;
        self.write_int(len)
    }

    fn write_array<T: Copy>(
        &mut self,
        values: Option<&[T]>,
        width: usize,
        mut put: impl FnMut(&mut Vec<u8>, T),
    ) -> Result<()> {
        match values {
            None => self.write_array_len(-1),
            Some(values) => {
                self.write_len_of(values.len())?;
                self.ensure(values.len().saturating_mul(width))?;
                for &v in values {
                    put(&mut self.buffer, v);
                }
                Ok(())
            }
        }
    }

    /// Writes a length-prefixed byte array.
    pub fn write_byte_array(&mut self, v: Option<&[i8]>) -> Result<()> {
        self.write_array(v, 1, |buf, b| buf.put_i8(b))
    }

    /// Writes a length-prefixed boolean array, one byte per element.
    pub fn write_bool_array(&mut self, v: Option<&[bool]>) -> Result<()> {
        self.write_array(v, 1, |buf, b| buf.put_u8(u8::from(b)))
    }

    /// Writes a length-prefixed UTF-16 char array.
    pub fn write_char_array(&mut self, v: Option<&[u16]>) -> Result<()> {
        self.write_array(v, 2, |buf, c| buf.put_u16(c))
    }

    /// Writes a length-prefixed i16 array.
    pub fn write_short_array(&mut self, v: Option<&[i16]>) -> Result<()> {
        self.write_array(v, 2, |buf, n| buf.put_i16(n))
    }

    /// Writes a length-prefixed i32 array.
    pub fn write_int_array(&mut self, v: Option<&[i32]>) -> Result<()> {
        self.write_array(v, 4, |buf, n| buf.put_i32(n))
    }

    /// Writes a length-prefixed i64 array.
    pub fn write_long_array(&mut self, v: Option<&[i64]>) -> Result<()> {
        self.write_array(v, 8, |buf, n| buf.put_i64(n))
    }

    /// Writes a length-prefixed f32 array.
    pub fn write_float_array(&mut self, v: Option<&[f32]>) -> Result<()> {
        self.write_array(v, 4, |buf, n| buf.put_f32(n))
    }

    /// Writes a length-prefixed f64 array.
    pub fn write_double_array(&mut self, v: Option<&[f64]>) -> Result<()> {
        self.write_array(v, 8, |buf, n| buf.put_f64(n))
    }

    /// Writes a length-prefixed array of tagged strings.
    pub fn write_string_array(&mut self, v: Option<&[Option<String>]>) -> Result<()> {
        match v {
            None => self.write_array_len(-1),
            Some(values) => {
                self.write_len_of(values.len())?;
                for s in values {
                    self.write_string(s.as_deref())?;
                }
                Ok(())
            }
        }
    }

    /// Writes a length-prefixed array of byte arrays; null inner arrays are allowed.
    pub fn write_array_of_byte_arrays(&mut self, v: Option<&[Option<Vec<i8>>]>) -> Result<()> {
        match v {
            None => self.write_array_len(-1),
            Some(values) => {
                self.write_len_of(values.len())?;
                for inner in values {
                    self.write_byte_array(inner.as_deref())?;
                }
                Ok(())
            }
        }
    }
}

impl Default for ObjectDataOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ObjectDataOutput {
    fn drop(&mut self) {
        if self.buffer.capacity() > 0 {
            buffer_pool::checkin(std::mem::take(&mut self.buffer));
        }
    }
}

impl DataOutput for ObjectDataOutput {
    fn write_byte(&mut self, v: i8) -> Result<()> {
        self.ensure(1)?;
        self.buffer.put_i8(v);
        Ok(())
    }

    fn write_bool(&mut self, v: bool) -> Result<()> {
        self.ensure(1)?;
        self.buffer.put_u8(u8::from(v));
        Ok(())
    }

    fn write_char(&mut self, v: u16) -> Result<()> {
        self.ensure(2)?;
        self.buffer.put_u16(v);
        Ok(())
    }

    fn write_short(&mut self, v: i16) -> Result<()> {
        self.ensure(2)?;
        self.buffer.put_i16(v);
        Ok(())
    }

    fn write_int(&mut self, v: i32) -> Result<()> {
        self.ensure(4)?;
        self.buffer.put_i32(v);
        Ok(())
    }

    fn write_long(&mut self, v: i64) -> Result<()> {
        self.ensure(8)?;
        self.buffer.put_i64(v);
        Ok(())
    }

    fn write_float(&mut self, v: f32) -> Result<()> {
        self.ensure(4)?;
        self.buffer.put_f32(v);
        Ok(())
    }

    fn write_double(&mut self, v: f64) -> Result<()> {
        self.ensure(8)?;
        self.buffer.put_f64(v);
        Ok(())
    }

    fn write_bytes(&mut self, v: &[u8]) -> Result<()> {
        self.ensure(v.len())?;
        self.buffer.put_slice(v);
        Ok(())
    }

    fn write_string(&mut self, v: Option<&str>) -> Result<()> {
        let s = match v {
            None => return self.write_byte(DsCode::CacheableNullString.as_byte()),
            Some(s) => s,
        };
        let len = modified_utf8::encoded_len(s);
        let ascii = modified_utf8::is_ascii(s);
        if len > 0xFFFF {
            if ascii {
                self.write_byte(DsCode::CacheableAsciiStringHuge.as_byte())?;
                self.write_ascii_huge(s)
            } else {
                self.write_byte(DsCode::CacheableStringHuge.as_byte())?;
                self.write_utf16_huge(s)
            }
        } else {
            let code = if ascii {
                DsCode::CacheableAsciiString
            } else {
                DsCode::CacheableString
            };
            self.write_byte(code.as_byte())?;
            self.write_utf(s)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_output_is_empty() {
        let output = ObjectDataOutput::new();
        assert!(output.is_empty());
        assert_eq!(output.len(), 0);
    }

    #[test]
    fn test_with_capacity() {
        let output = ObjectDataOutput::with_capacity(100_000).unwrap();
        assert!(output.is_empty());
    }

    #[test]
    fn test_write_byte_negative() {
        let mut output = ObjectDataOutput::new();
        output.write_byte(-1).unwrap();
        assert_eq!(output.as_bytes(), &[0xFF]);
    }

    #[test]
    fn test_write_bool() {
        let mut output = ObjectDataOutput::new();
        output.write_bool(true).unwrap();
        output.write_bool(false).unwrap();
        assert_eq!(output.as_bytes(), &[1, 0]);
    }

    #[test]
    fn test_write_int_big_endian() {
        let mut output = ObjectDataOutput::new();
        output.write_int(0x01020304).unwrap();
        assert_eq!(output.as_bytes(), &[0x01, 0x02, 0x03, 0x04]);
    }

    #[test]
    fn test_write_long_big_endian() {
        let mut output = ObjectDataOutput::new();
        output.write_long(0x0102030405060708).unwrap();
        assert_eq!(
            output.as_bytes(),
            &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08]
        );
    }

    #[test]
    fn test_write_double_big_endian() {
        let mut output = ObjectDataOutput::new();
        output.write_double(1.0).unwrap();
        assert_eq!(output.as_bytes(), &[0x3F, 0xF0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_write_array_len_tiers() {
        let cases: [(i32, &[u8]); 6] = [
            (-1, &[0xFF]),
            (0, &[0x00]),
            (252, &[0xFC]),
            (253, &[0xFE, 0x00, 0xFD]),
            (0xFFFF, &[0xFE, 0xFF, 0xFF]),
            (0x10000, &[0xFD, 0x00, 0x01, 0x00, 0x00]),
        ];
        for (len, expected) in cases {
            let mut output = ObjectDataOutput::new();
            output.write_array_len(len).unwrap();
            assert_eq!(output.as_bytes(), expected, "length {}", len);
        }
    }

    #[test]
    fn test_write_array_len_rejects_below_minus_one() {
        let mut output = ObjectDataOutput::new();
        let err = output.write_array_len(-2).unwrap_err();
        assert!(matches!(err, PdxError::InvalidArgument(_)));
        assert!(output.is_empty());
    }

    #[test]
    fn test_write_ascii_string_is_tagged() {
        let mut output = ObjectDataOutput::new();
        output.write_string(Some("hi")).unwrap();
        assert_eq!(output.as_bytes(), &[87, 0x00, 0x02, b'h', b'i']);
    }

    #[test]
    fn test_write_non_ascii_string_uses_cacheable_string() {
        let mut output = ObjectDataOutput::new();
        output.write_string(Some("\u{e9}")).unwrap();
        assert_eq!(output.as_bytes(), &[42, 0x00, 0x02, 0xC3, 0xA9]);
    }

    #[test]
    fn test_write_nul_string_is_not_ascii() {
        let mut output = ObjectDataOutput::new();
        output.write_string(Some("\0")).unwrap();
        assert_eq!(output.as_bytes(), &[42, 0x00, 0x02, 0xC0, 0x80]);
    }

    #[test]
    fn test_write_null_string() {
        let mut output = ObjectDataOutput::new();
        output.write_string(None).unwrap();
        assert_eq!(output.as_bytes(), &[69]);
    }

    #[test]
    fn test_write_huge_ascii_string() {
        let s = "a".repeat(0x10000);
        let mut output = ObjectDataOutput::new();
        output.write_string(Some(&s)).unwrap();
        let bytes = output.as_bytes();
        assert_eq!(bytes[0], 88);
        assert_eq!(&bytes[1..5], &[0x00, 0x01, 0x00, 0x00]);
        assert_eq!(bytes.len(), 5 + 0x10000);
    }

    #[test]
    fn test_write_huge_utf16_string() {
        // 0x8000 two-byte characters encode to exactly 0x10000 bytes.
        let s = "\u{e9}".repeat(0x8000);
        let mut output = ObjectDataOutput::new();
        output.write_string(Some(&s)).unwrap();
        let bytes = output.as_bytes();
        assert_eq!(bytes[0], 89);
        assert_eq!(&bytes[1..5], &[0x00, 0x00, 0x80, 0x00]);
        assert_eq!(&bytes[5..7], &[0x00, 0xE9]);
        assert_eq!(bytes.len(), 5 + 0x8000 * 2);
    }

    #[test]
    fn test_write_utf_rejects_oversized() {
        let s = "x".repeat(0x10000);
        let mut output = ObjectDataOutput::new();
        assert!(matches!(
            output.write_utf(&s),
            Err(PdxError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_write_int_at_patches_in_place() {
        let mut output = ObjectDataOutput::new();
        output.write_int(0).unwrap();
        output.write_byte(7).unwrap();
        output.write_int_at(0, 258).unwrap();
        assert_eq!(output.as_bytes(), &[0, 0, 1, 2, 7]);
        assert!(output.write_int_at(3, 1).is_err());
    }

    #[test]
    fn test_write_offset_widths() {
        let mut output = ObjectDataOutput::new();
        output.write_offset(0x12, 1).unwrap();
        output.write_offset(0x1234, 2).unwrap();
        output.write_offset(0x12345, 4).unwrap();
        assert_eq!(
            output.as_bytes(),
            &[0x12, 0x12, 0x34, 0x00, 0x01, 0x23, 0x45]
        );
        assert!(output.write_offset(0x100, 1).is_err());
    }

    #[test]
    fn test_write_null_and_empty_arrays_differ() {
        let mut output = ObjectDataOutput::new();
        output.write_int_array(None).unwrap();
        output.write_int_array(Some(&[])).unwrap();
        assert_eq!(output.as_bytes(), &[0xFF, 0x00]);
    }

    #[test]
    fn test_write_string_array_with_null_element() {
        let mut output = ObjectDataOutput::new();
        output
            .write_string_array(Some(&[Some("a".to_string()), None]))
            .unwrap();
        assert_eq!(output.as_bytes(), &[2, 87, 0, 1, b'a', 69]);
    }

    #[test]
    fn test_into_bytes() {
        let mut output = ObjectDataOutput::new();
        output.write_short(0x0102).unwrap();
        assert_eq!(output.into_bytes(), vec![1, 2]);
    }

    #[test]
    fn test_into_bytes_returns_buffer_to_pool() {
        // Empty this thread's pool so the output allocates a fresh buffer.
        let drained: Vec<_> = (0..buffer_pool::MAX_POOLED_BUFFERS)
            .map(|_| buffer_pool::checkout())
            .collect();
        drop(drained);
        assert_eq!(buffer_pool::pooled_buffer_count(), 0);

        let mut output = ObjectDataOutput::new();
        output.write_int(7).unwrap();
        let bytes = output.into_bytes();

        assert_eq!(bytes, vec![0, 0, 0, 7]);
        assert!(bytes.capacity() < buffer_pool::INITIAL_BUFFER_SIZE);
        assert_eq!(buffer_pool::pooled_buffer_count(), 1);
    }
}
