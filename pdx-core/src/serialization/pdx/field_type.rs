//! Field kinds and field descriptors of a PDX type.

use crate::error::{PdxError, Result};
use std::fmt;

const DEFAULT_ZERO_1: &[u8] = &[0];
const DEFAULT_ZERO_2: &[u8] = &[0, 0];
const DEFAULT_ZERO_4: &[u8] = &[0, 0, 0, 0];
const DEFAULT_ZERO_8: &[u8] = &[0, 0, 0, 0, 0, 0, 0, 0];
const DEFAULT_DATE: &[u8] = &[0xFF; 8];
const DEFAULT_STRING: &[u8] = &[69];
const DEFAULT_OBJECT: &[u8] = &[41];
const DEFAULT_ARRAY: &[u8] = &[0xFF];

/// The kind of a PDX field, numbered as the JVM's `FieldType` enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum PdxFieldKind {
    /// Boolean, one byte.
    Boolean = 0,
    /// Signed byte.
    Byte = 1,
    /// UTF-16 code unit.
    Char = 2,
    /// 16-bit integer.
    Short = 3,
    /// 32-bit integer.
    Int = 4,
    /// 64-bit integer.
    Long = 5,
    /// 32-bit float.
    Float = 6,
    /// 64-bit float.
    Double = 7,
    /// Epoch milliseconds; `-1` is null.
    Date = 8,
    /// Tagged string.
    String = 9,
    /// Tagged object.
    Object = 10,
    /// Boolean array.
    BooleanArray = 11,
    /// Char array.
    CharArray = 12,
    /// Byte array.
    ByteArray = 13,
    /// 16-bit integer array.
    ShortArray = 14,
    /// 32-bit integer array.
    IntArray = 15,
    /// 64-bit integer array.
    LongArray = 16,
    /// 32-bit float array.
    FloatArray = 17,
    /// 64-bit float array.
    DoubleArray = 18,
    /// String array.
    StringArray = 19,
    /// Object array.
    ObjectArray = 20,
    /// Array of byte arrays.
    ArrayOfByteArrays = 21,
}

impl PdxFieldKind {
    /// Decodes the kind id written in type descriptors.
    pub fn from_id(id: u8) -> Result<Self> {
        use PdxFieldKind::*;
        Ok(match id {
            0 => Boolean,
            1 => Byte,
            2 => Char,
            3 => Short,
            4 => Int,
            5 => Long,
            6 => Float,
            7 => Double,
            8 => Date,
            9 => String,
            10 => Object,
            11 => BooleanArray,
            12 => CharArray,
            13 => ByteArray,
            14 => ShortArray,
            15 => IntArray,
            16 => LongArray,
            17 => FloatArray,
            18 => DoubleArray,
            19 => StringArray,
            20 => ObjectArray,
            21 => ArrayOfByteArrays,
            other => {
                return Err(PdxError::ProtocolViolation(format!(
                    "unknown PDX field kind {}",
                    other
                )))
            }
        })
    }

    /// Returns the kind id.
    pub fn id(self) -> u8 {
        self as u8
    }

    /// Returns the encoded size of a fixed-length kind, `None` for variable ones.
    pub fn fixed_size(self) -> Option<usize> {
        use PdxFieldKind::*;
        match self {
            Boolean | Byte => Some(1),
            Char | Short => Some(2),
            Int | Float => Some(4),
            Long | Double | Date => Some(8),
            _ => None,
        }
    }

    /// Returns `true` when the encoded size depends on the value.
    pub fn is_variable_length(self) -> bool {
        self.fixed_size().is_none()
    }

    /// The bytes a field of this kind has when it carries its default value.
    ///
    /// A field whose encoding equals these bytes is treated as absent when
    /// PDX instances are hashed and compared.
    pub fn default_bytes(self) -> &'static [u8] {
        use PdxFieldKind::*;
        match self {
            Boolean | Byte => DEFAULT_ZERO_1,
            Char | Short => DEFAULT_ZERO_2,
            Int | Float => DEFAULT_ZERO_4,
            Long | Double => DEFAULT_ZERO_8,
            Date => DEFAULT_DATE,
            String => DEFAULT_STRING,
            Object => DEFAULT_OBJECT,
            _ => DEFAULT_ARRAY,
        }
    }

    /// The JVM class name of the field's declared type.
    pub fn java_type_name(self) -> &'static str {
        use PdxFieldKind::*;
        match self {
            Boolean => "boolean",
            Byte => "byte",
            Char => "char",
            Short => "short",
            Int => "int",
            Long => "long",
            Float => "float",
            Double => "double",
            Date => "java.util.Date",
            String => "java.lang.String",
            Object => "java.lang.Object",
            BooleanArray => "boolean[]",
            CharArray => "char[]",
            ByteArray => "byte[]",
            ShortArray => "short[]",
            IntArray => "int[]",
            LongArray => "long[]",
            FloatArray => "float[]",
            DoubleArray => "double[]",
            StringArray => "java.lang.String[]",
            ObjectArray => "java.lang.Object[]",
            ArrayOfByteArrays => "byte[][]",
        }
    }
}

impl fmt::Display for PdxFieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.java_type_name())
    }
}

/// Describes one field of a [`PdxType`](super::PdxType).
///
/// `relative_offset` and `vl_offset_index` locate the field inside a
/// serialized blob; they are derived from the field list and recomputed by
/// the owning type whenever a field is added.
#[derive(Debug, Clone)]
pub struct PdxFieldType {
    pub(crate) name: String,
    pub(crate) kind: PdxFieldKind,
    pub(crate) sequence_id: i32,
    pub(crate) var_len_field_idx: i32,
    pub(crate) relative_offset: i32,
    pub(crate) vl_offset_index: i32,
    pub(crate) identity: bool,
}

impl PdxFieldType {
    pub(crate) fn new(
        name: impl Into<String>,
        kind: PdxFieldKind,
        sequence_id: i32,
        var_len_field_idx: i32,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            sequence_id,
            var_len_field_idx,
            relative_offset: 0,
            vl_offset_index: 0,
            identity: false,
        }
    }

    /// Field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Field kind.
    pub fn kind(&self) -> PdxFieldKind {
        self.kind
    }

    /// Position of the field in declaration order.
    pub fn sequence_id(&self) -> i32 {
        self.sequence_id
    }

    /// Index of this field among the variable-length fields, or of the most
    /// recent one for fixed fields.
    pub fn var_len_field_idx(&self) -> i32 {
        self.var_len_field_idx
    }

    /// Returns `true` if the field takes part in hashing and equality.
    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Returns `true` for variable-length fields.
    pub fn is_variable_length(&self) -> bool {
        self.kind.is_variable_length()
    }

    /// Encoded size of a fixed-length field, 0 for variable ones.
    pub fn fixed_size(&self) -> usize {
        self.kind.fixed_size().unwrap_or(0)
    }

    /// Field equality as used by type comparison: same name and kind.
    pub fn same_shape(&self, other: &PdxFieldType) -> bool {
        self.name == other.name && self.kind == other.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_ids_round_trip() {
        for id in 0u8..=21 {
            assert_eq!(PdxFieldKind::from_id(id).unwrap().id(), id);
        }
        assert!(PdxFieldKind::from_id(22).is_err());
    }

    #[test]
    fn test_fixed_sizes() {
        assert_eq!(PdxFieldKind::Boolean.fixed_size(), Some(1));
        assert_eq!(PdxFieldKind::Char.fixed_size(), Some(2));
        assert_eq!(PdxFieldKind::Float.fixed_size(), Some(4));
        assert_eq!(PdxFieldKind::Date.fixed_size(), Some(8));
        assert_eq!(PdxFieldKind::String.fixed_size(), None);
        assert!(PdxFieldKind::ArrayOfByteArrays.is_variable_length());
    }

    #[test]
    fn test_default_bytes_match_null_encodings() {
        assert_eq!(PdxFieldKind::Date.default_bytes(), &[0xFF; 8]);
        assert_eq!(PdxFieldKind::String.default_bytes(), &[69]);
        assert_eq!(PdxFieldKind::Object.default_bytes(), &[41]);
        assert_eq!(PdxFieldKind::IntArray.default_bytes(), &[0xFF]);
        assert_eq!(PdxFieldKind::Long.default_bytes(), &[0; 8]);
    }

    #[test]
    fn test_display_uses_java_names() {
        assert_eq!(PdxFieldKind::StringArray.to_string(), "java.lang.String[]");
        assert_eq!(PdxFieldKind::Int.to_string(), "int");
    }

    #[test]
    fn test_field_same_shape() {
        let a = PdxFieldType::new("age", PdxFieldKind::Int, 0, 0);
        let b = PdxFieldType::new("age", PdxFieldKind::Int, 3, 1);
        let c = PdxFieldType::new("age", PdxFieldKind::Long, 0, 0);
        assert!(a.same_shape(&b));
        assert!(!a.same_shape(&c));
    }
}
