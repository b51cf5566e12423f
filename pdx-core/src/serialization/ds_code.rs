//! Type tags identifying the wire encoding of a value.

use crate::error::{PdxError, Result};

/// A DSCode: the tag byte written in front of a self-describing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DsCode {
    /// Serialized PDX type descriptor.
    PdxType = 17,
    /// Boolean array.
    BooleanArray = 26,
    /// UTF-16 char array.
    CharArray = 27,
    /// Null object.
    NullObj = 41,
    /// Modified-UTF-8 string, short form.
    CacheableString = 42,
    /// Class reference, followed by a tagged class name.
    Class = 43,
    /// A DataSerializable payload.
    DataSerializable = 45,
    /// Byte array.
    CacheableBytes = 46,
    /// 16-bit integer array.
    Int16Array = 47,
    /// 32-bit integer array.
    Int32Array = 48,
    /// 64-bit integer array.
    Int64Array = 49,
    /// 32-bit float array.
    FloatArray = 50,
    /// 64-bit float array.
    DoubleArray = 51,
    /// Heterogeneous object array.
    CacheableObjectArray = 52,
    /// Boxed boolean.
    CacheableBoolean = 53,
    /// Boxed UTF-16 char.
    CacheableCharacter = 54,
    /// Boxed byte.
    CacheableByte = 55,
    /// Boxed 16-bit integer.
    CacheableInt16 = 56,
    /// Boxed 32-bit integer.
    CacheableInt32 = 57,
    /// Boxed 64-bit integer.
    CacheableInt64 = 58,
    /// Boxed 32-bit float.
    CacheableFloat = 59,
    /// Boxed 64-bit float.
    CacheableDouble = 60,
    /// Date as epoch milliseconds.
    CacheableDate = 61,
    /// String array.
    CacheableStringArray = 64,
    /// Ordered list.
    CacheableArrayList = 65,
    /// Hash map.
    CacheableHashMap = 67,
    /// Null string.
    CacheableNullString = 69,
    /// ASCII string, short form.
    CacheableAsciiString = 87,
    /// ASCII string with a 32-bit length.
    CacheableAsciiStringHuge = 88,
    /// UTF-16 string with a 32-bit length.
    CacheableStringHuge = 89,
    /// PDX-serialized object.
    Pdx = 93,
    /// PDX enum reference.
    PdxEnum = 94,
}

impl DsCode {
    /// Decodes a tag byte.
    pub fn from_u8(code: u8) -> Result<Self> {
        Ok(match code {
            17 => DsCode::PdxType,
            26 => DsCode::BooleanArray,
            27 => DsCode::CharArray,
            41 => DsCode::NullObj,
            42 => DsCode::CacheableString,
            43 => DsCode::Class,
            45 => DsCode::DataSerializable,
            46 => DsCode::CacheableBytes,
            47 => DsCode::Int16Array,
            48 => DsCode::Int32Array,
            49 => DsCode::Int64Array,
            50 => DsCode::FloatArray,
            51 => DsCode::DoubleArray,
            52 => DsCode::CacheableObjectArray,
            53 => DsCode::CacheableBoolean,
            54 => DsCode::CacheableCharacter,
            55 => DsCode::CacheableByte,
            56 => DsCode::CacheableInt16,
            57 => DsCode::CacheableInt32,
            58 => DsCode::CacheableInt64,
            59 => DsCode::CacheableFloat,
            60 => DsCode::CacheableDouble,
            61 => DsCode::CacheableDate,
            64 => DsCode::CacheableStringArray,
            65 => DsCode::CacheableArrayList,
            67 => DsCode::CacheableHashMap,
            69 => DsCode::CacheableNullString,
            87 => DsCode::CacheableAsciiString,
            88 => DsCode::CacheableAsciiStringHuge,
            89 => DsCode::CacheableStringHuge,
            93 => DsCode::Pdx,
            94 => DsCode::PdxEnum,
            other => {
                return Err(PdxError::ProtocolViolation(format!(
                    "unknown DSCode {}",
                    other
                )))
            }
        })
    }

    /// Returns the tag byte.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Returns the tag as the signed byte written on the wire.
    pub fn as_byte(self) -> i8 {
        self as u8 as i8
    }

    /// Returns `true` for the four string encodings.
    pub fn is_string(self) -> bool {
        matches!(
            self,
            DsCode::CacheableString
                | DsCode::CacheableAsciiString
                | DsCode::CacheableAsciiStringHuge
                | DsCode::CacheableStringHuge
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_decode() {
        for code in [17u8, 26, 41, 42, 45, 52, 61, 64, 69, 87, 88, 89, 93, 94] {
            assert_eq!(DsCode::from_u8(code).unwrap().code(), code);
        }
    }

    #[test]
    fn test_unknown_code_is_protocol_violation() {
        let err = DsCode::from_u8(200).unwrap_err();
        assert!(matches!(err, PdxError::ProtocolViolation(_)));
    }

    #[test]
    fn test_as_byte_is_signed() {
        assert_eq!(DsCode::Pdx.as_byte(), 93);
        assert_eq!(DsCode::CacheableStringHuge.as_byte(), 89);
    }

    #[test]
    fn test_is_string() {
        assert!(DsCode::CacheableAsciiString.is_string());
        assert!(DsCode::CacheableStringHuge.is_string());
        assert!(!DsCode::CacheableNullString.is_string());
        assert!(!DsCode::Pdx.is_string());
    }
}
