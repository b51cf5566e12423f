//! Data input traits and implementations for PDX serialization.

use super::ds_code::DsCode;
use super::modified_utf8;
use crate::error::{PdxError, Result};
use bytes::Buf;
use std::io::Cursor;

/// Trait for reading primitive values from the PDX binary format.
///
/// All multi-byte values are read in big-endian byte order.
pub trait DataInput {
    /// Reads a single byte (i8).
    fn read_byte(&mut self) -> Result<i8>;

    /// Reads a boolean from a single byte.
    fn read_bool(&mut self) -> Result<bool>;

    /// Reads a UTF-16 code unit in big-endian order.
    fn read_char(&mut self) -> Result<u16>;

    /// Reads a 16-bit signed integer in big-endian order.
    fn read_short(&mut self) -> Result<i16>;

    /// Reads a 32-bit signed integer in big-endian order.
    fn read_int(&mut self) -> Result<i32>;

    /// Reads a 64-bit signed integer in big-endian order.
    fn read_long(&mut self) -> Result<i64>;

    /// Reads a 32-bit floating point in big-endian order.
    fn read_float(&mut self) -> Result<f32>;

    /// Reads a 64-bit floating point in big-endian order.
    fn read_double(&mut self) -> Result<f64>;

    /// Reads the specified number of raw bytes.
    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>>;

    /// Reads a DSCode-tagged string; the null string yields `None`.
    fn read_string(&mut self) -> Result<Option<String>>;
}

/// A bounds-checked reader over a borrowed byte slice.
///
/// Every read fails with [`PdxError::Serialization`] instead of reading past
/// the end, and the position can be moved freely with [`seek`](Self::seek).
#[derive(Debug)]
pub struct ObjectDataInput<'a> {
    cursor: Cursor<&'a [u8]>,
}

impl<'a> ObjectDataInput<'a> {
    /// Creates a new `ObjectDataInput` from the given byte slice.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
        }
    }

    /// Returns the number of bytes remaining to be read.
    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    /// Returns the current position in the buffer.
    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    /// Returns the total length of the underlying buffer.
    pub fn len(&self) -> usize {
        self.cursor.get_ref().len()
    }

    /// Returns true if the underlying buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.cursor.get_ref().is_empty()
    }

    /// Moves the cursor to an absolute position.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.len() {
            return Err(PdxError::Serialization(format!(
                "seek to {} beyond end of {} byte buffer",
                pos,
                self.len()
            )));
        }
        self.cursor.set_position(pos as u64);
        Ok(())
    }

    /// Advances the cursor by `n` bytes.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure_remaining(n)?;
        self.cursor.advance(n);
        Ok(())
    }

    /// Borrows `start..end` of the underlying buffer without moving the cursor.
    pub fn slice(&self, start: usize, end: usize) -> Result<&'a [u8]> {
        let data: &'a [u8] = *self.cursor.get_ref();
        if start > end || end > data.len() {
            return Err(PdxError::Serialization(format!(
                "range {}..{} outside {} byte buffer",
                start,
                end,
                data.len()
            )));
        }
        Ok(&data[start..end])
    }

    /// Borrows the next `n` bytes and advances past them.
    pub fn read_slice(&mut self, n: usize) -> Result<&'a [u8]> {
        let start = self.position();
        let out = self.slice(start, start.saturating_add(n))?;
        self.cursor.advance(n);
        Ok(out)
    }

    /// Reads an unsigned byte.
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure_remaining(1)?;
        Ok(self.cursor.get_u8())
    }

    /// Reads an unsigned offset-table entry of the given width.
    pub fn read_offset(&mut self, width: usize) -> Result<usize> {
        match width {
            1 => Ok(self.read_u8()? as usize),
            2 => {
                self.ensure_remaining(2)?;
                Ok(self.cursor.get_u16() as usize)
            }
            4 => {
                self.ensure_remaining(4)?;
                Ok(self.cursor.get_u32() as usize)
            }
            other => Err(PdxError::Serialization(format!(
                "invalid offset width {}",
                other
            ))),
        }
    }

    /// Reads a variable-width array length; `None` means a null array.
    pub fn read_array_len(&mut self) -> Result<Option<usize>> {
        match self.read_u8()? {
            0xFF => Ok(None),
            0xFE => {
                self.ensure_remaining(2)?;
                Ok(Some(self.cursor.get_u16() as usize))
            }
            0xFD => {
                let len = self.read_int()?;
                if len < 0 {
                    return Err(PdxError::Serialization(format!(
                        "negative array length {}",
                        len
                    )));
                }
                Ok(Some(len as usize))
            }
            n => Ok(Some(n as usize)),
        }
    }

    /// Reads an untagged string: u16 length plus modified UTF-8.
    pub fn read_utf(&mut self) -> Result<String> {
        self.ensure_remaining(2)?;
        let len = self.cursor.get_u16() as usize;
        modified_utf8::decode(self.read_slice(len)?)
    }

    /// Reads the body of a huge ASCII string.
    pub fn read_ascii_huge(&mut self) -> Result<String> {
        let len = self.read_len_i32()?;
        let bytes = self.read_slice(len)?;
        if !bytes.is_ascii() {
            return Err(PdxError::Serialization(
                "huge ASCII string contains non-ASCII bytes".to_string(),
            ));
        }
        Ok(bytes.iter().map(|&b| b as char).collect())
    }

    /// Reads the body of a huge UTF-16 string.
    pub fn read_utf16_huge(&mut self) -> Result<String> {
        let count = self.read_len_i32()?;
        self.ensure_remaining(count.saturating_mul(2))?;
        let units: Vec<u16> = (0..count).map(|_| self.cursor.get_u16()).collect();
        modified_utf8::units_to_string(&units)
    }

    fn read_len_i32(&mut self) -> Result<usize> {
        let len = self.read_int()?;
        usize::try_from(len)
            .map_err(|_| PdxError::Serialization(format!("negative length {}", len)))
    }

    /// Reads a string body whose DSCode has already been consumed.
    pub fn read_string_with_code(&mut self, code: DsCode) -> Result<Option<String>> {
        match code {
            DsCode::CacheableNullString => Ok(None),
            DsCode::CacheableString | DsCode::CacheableAsciiString => self.read_utf().map(Some),
            DsCode::CacheableAsciiStringHuge => self.read_ascii_huge().map(Some),
            DsCode::CacheableStringHuge => self.read_utf16_huge().map(Some),
            other => Err(PdxError::ProtocolViolation(format!(
                "expected a string, found DSCode {:?}",
                other
            ))),
        }
    }

    fn read_array<T>(
        &mut self,
        width: usize,
        mut get: impl FnMut(&mut Cursor<&'a [u8]>) -> T,
    ) -> Result<Option<Vec<T>>> {
        match self.read_array_len()? {
            None => Ok(None),
            Some(len) => {
                self.ensure_remaining(len.saturating_mul(width))?;
                Ok(Some((0..len).map(|_| get(&mut self.cursor)).collect()))
            }
        }
    }

    /// Reads a length-prefixed byte array.
    pub fn read_byte_array(&mut self) -> Result<Option<Vec<i8>>> {
        self.read_array(1, |c| c.get_i8())
    }

    /// Reads a length-prefixed boolean array.
    pub fn read_bool_array(&mut self) -> Result<Option<Vec<bool>>> {
        self.read_array(1, |c| c.get_u8() != 0)
    }

    /// Reads a length-prefixed UTF-16 char array.
    pub fn read_char_array(&mut self) -> Result<Option<Vec<u16>>> {
        self.read_array(2, |c| c.get_u16())
    }

    /// Reads a length-prefixed i16 array.
    pub fn read_short_array(&mut self) -> Result<Option<Vec<i16>>> {
        self.read_array(2, |c| c.get_i16())
    }

    /// Reads a length-prefixed i32 array.
    pub fn read_int_array(&mut self) -> Result<Option<Vec<i32>>> {
        self.read_array(4, |c| c.get_i32())
    }

    /// Reads a length-prefixed i64 array.
    pub fn read_long_array(&mut self) -> Result<Option<Vec<i64>>> {
        self.read_array(8, |c| c.get_i64())
    }

    /// Reads a length-prefixed f32 array.
    pub fn read_float_array(&mut self) -> Result<Option<Vec<f32>>> {
        self.read_array(4, |c| c.get_f32())
    }

    /// Reads a length-prefixed f64 array.
    pub fn read_double_array(&mut self) -> Result<Option<Vec<f64>>> {
        self.read_array(8, |c| c.get_f64())
    }

    /// Reads a length-prefixed array of tagged strings.
    pub fn read_string_array(&mut self) -> Result<Option<Vec<Option<String>>>> {
        match self.read_array_len()? {
            None => Ok(None),
            Some(len) => {
                // Each element takes at least its tag byte.
                self.ensure_remaining(len)?;
                (0..len)
                    .map(|_| self.read_string())
                    .collect::<Result<Vec<_>>>()
                    .map(Some)
            }
        }
    }

    /// Reads a length-prefixed array of byte arrays.
    pub fn read_array_of_byte_arrays(&mut self) -> Result<Option<Vec<Option<Vec<i8>>>>> {
        match self.read_array_len()? {
            None => Ok(None),
            Some(len) => {
                self.ensure_remaining(len)?;
                (0..len)
                    .map(|_| self.read_byte_array())
                    .collect::<Result<Vec<_>>>()
                    .map(Some)
            }
        }
    }

    fn ensure_remaining(&self, n: usize) -> Result<()> {
        if self.cursor.remaining() < n {
            Err(PdxError::Serialization(format!(
                "insufficient data: need {} bytes, have {}",
                n,
                self.cursor.remaining()
            )))
        } else {
            Ok(())
        }
    }
}

impl DataInput for ObjectDataInput<'_> {
    fn read_byte(&mut self) -> Result<i8> {
        self.ensure_remaining(1)?;
        Ok(self.cursor.get_i8())
    }

    fn read_bool(&mut self) -> Result<bool> {
        self.ensure_remaining(1)?;
        Ok(self.cursor.get_u8() != 0)
    }

    fn read_char(&mut self) -> Result<u16> {
        self.ensure_remaining(2)?;
        Ok(self.cursor.get_u16())
    }

    fn read_short(&mut self) -> Result<i16> {
        self.ensure_remaining(2)?;
        Ok(self.cursor.get_i16())
    }

    fn read_int(&mut self) -> Result<i32> {
        self.ensure_remaining(4)?;
        Ok(self.cursor.get_i32())
    }

    fn read_long(&mut self) -> Result<i64> {
        self.ensure_remaining(8)?;
        Ok(self.cursor.get_i64())
    }

    fn read_float(&mut self) -> Result<f32> {
        self.ensure_remaining(4)?;
        Ok(self.cursor.get_f32())
    }

    fn read_double(&mut self) -> Result<f64> {
        self.ensure_remaining(8)?;
        Ok(self.cursor.get_f64())
    }

    fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.read_slice(len).map(<[u8]>::to_vec)
    }

    fn read_string(&mut self) -> Result<Option<String>> {
        let code = DsCode::from_u8(self.read_u8()?)?;
        self.read_string_with_code(code)
    }
}
