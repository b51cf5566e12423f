//! Geometry of a serialized PDX blob: field data followed by the offset table.

use super::pdx_type::PdxType;
use crate::error::{PdxError, Result};

/// Size of the `length` and `type id` header words.
pub const PDX_HEADER_SIZE: usize = 8;

/// Offset-table entry width implied by a blob's total length.
pub fn offset_width(total_len: usize) -> usize {
    if total_len <= 0xFF {
        1
    } else if total_len <= 0xFFFF {
        2
    } else {
        4
    }
}

/// Returns the total length and entry width for `fields_len` bytes of field
/// data followed by `offset_count` table entries.
///
/// The width is the smallest one whose resulting total still selects that
/// width through [`offset_width`].
pub fn calculate_len_with_offsets(fields_len: usize, offset_count: usize) -> (usize, usize) {
    if fields_len + offset_count <= 0xFF {
        (fields_len + offset_count, 1)
    } else if fields_len + 2 * offset_count <= 0xFFFF {
        (fields_len + 2 * offset_count, 2)
    } else {
        (fields_len + 4 * offset_count, 4)
    }
}

/// Splits a blob (everything after the header) into field data and table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlobLayout {
    /// Bytes of field data.
    pub serialized_len: usize,
    /// Offset entry width.
    pub width: usize,
}

impl BlobLayout {
    /// Derives the layout of a `total_len` byte blob written for `pdx_type`.
    pub fn new(pdx_type: &PdxType, total_len: usize) -> Result<Self> {
        let width = offset_width(total_len);
        let entries = pdx_type.number_of_var_len_fields().saturating_sub(1);
        let table = entries * width;
        if table > total_len {
            return Err(PdxError::Serialization(format!(
                "{} byte blob cannot hold {} offset entries for {}",
                total_len,
                entries,
                pdx_type.class_name()
            )));
        }
        Ok(Self {
            serialized_len: total_len - table,
            width,
        })
    }

    /// The offset table of `blob`.
    pub fn offsets<'b>(&self, blob: &'b [u8]) -> &'b [u8] {
        blob.get(self.serialized_len..).unwrap_or(&[])
    }

    /// Start and end of field `index` inside the field data.
    pub fn field_range(
        &self,
        pdx_type: &PdxType,
        index: usize,
        blob: &[u8],
    ) -> Result<(usize, usize)> {
        let offsets = self.offsets(blob);
        let start = pdx_type.field_position(index, offsets, self.width, self.serialized_len)?;
        let end = pdx_type.field_end_position(index, offsets, self.width, self.serialized_len)?;
        if end < start {
            return Err(PdxError::Serialization(format!(
                "field {} of {} ends at {} before it starts at {}",
                index,
                pdx_type.class_name(),
                end,
                start
            )));
        }
        Ok((start, end))
    }
}
