//! Self-describing values carried by `OBJECT` and `OBJECT_ARRAY` fields.
//!
//! Each value is prefixed with its [`DsCode`]. Nested PDX objects and enum
//! references resolve through the [`TypeRegistry`], so decoding needs one.

use crate::error::{PdxError, Result};
use crate::serialization::pdx::{EnumInfo, PdxInstance, TypeRegistry};
use crate::serialization::{java_hash, modified_utf8};
use crate::serialization::{DataInput, DataOutput, DsCode, ObjectDataInput, ObjectDataOutput};
use std::sync::Arc;

const OBJECT_ARRAY_COMPONENT: &str = "java.lang.Object";

/// A tagged value as JVM peers exchange it through `writeObject`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Cacheable {
    /// `null`.
    #[default]
    Null,
    /// `java.lang.Boolean`.
    Boolean(bool),
    /// `java.lang.Character`, one UTF-16 unit.
    Char(u16),
    /// `java.lang.Byte`.
    Byte(i8),
    /// `java.lang.Short`.
    Short(i16),
    /// `java.lang.Integer`.
    Int(i32),
    /// `java.lang.Long`.
    Long(i64),
    /// `java.lang.Float`.
    Float(f32),
    /// `java.lang.Double`.
    Double(f64),
    /// `java.lang.String`.
    String(String),
    /// `java.util.Date` as epoch milliseconds.
    Date(i64),
    /// `byte[]`.
    Bytes(Vec<i8>),
    /// `boolean[]`.
    BooleanArray(Vec<bool>),
    /// `char[]`.
    CharArray(Vec<u16>),
    /// `short[]`.
    ShortArray(Vec<i16>),
    /// `int[]`.
    IntArray(Vec<i32>),
    /// `long[]`.
    LongArray(Vec<i64>),
    /// `float[]`.
    FloatArray(Vec<f32>),
    /// `double[]`.
    DoubleArray(Vec<f64>),
    /// `String[]`, elements may be null.
    StringArray(Vec<Option<String>>),
    /// `Object[]`.
    ObjectArray(Vec<Cacheable>),
    /// `java.util.ArrayList`.
    ArrayList(Vec<Cacheable>),
    /// `java.util.HashMap`, in encounter order.
    HashMap(Vec<(Cacheable, Cacheable)>),
    /// A PDX enum constant.
    Enum(EnumInfo),
    /// A nested PDX object.
    Pdx(PdxInstance),
}

impl Cacheable {
    /// The DSCode this value is written with.
    pub fn ds_code(&self) -> DsCode {
        match self {
            Cacheable::Null => DsCode::NullObj,
            Cacheable::Boolean(_) => DsCode::CacheableBoolean,
            Cacheable::Char(_) => DsCode::CacheableCharacter,
            Cacheable::Byte(_) => DsCode::CacheableByte,
            Cacheable::Short(_) => DsCode::CacheableInt16,
            Cacheable::Int(_) => DsCode::CacheableInt32,
            Cacheable::Long(_) => DsCode::CacheableInt64,
            Cacheable::Float(_) => DsCode::CacheableFloat,
            Cacheable::Double(_) => DsCode::CacheableDouble,
            Cacheable::String(s) => {
                let huge = modified_utf8::encoded_len(s) > 0xFFFF;
                match (modified_utf8::is_ascii(s), huge) {
                    (true, false) => DsCode::CacheableAsciiString,
                    (false, false) => DsCode::CacheableString,
                    (true, true) => DsCode::CacheableAsciiStringHuge,
                    (false, true) => DsCode::CacheableStringHuge,
                }
            }
            Cacheable::Date(_) => DsCode::CacheableDate,
            Cacheable::Bytes(_) => DsCode::CacheableBytes,
            Cacheable::BooleanArray(_) => DsCode::BooleanArray,
            Cacheable::CharArray(_) => DsCode::CharArray,
            Cacheable::ShortArray(_) => DsCode::Int16Array,
            Cacheable::IntArray(_) => DsCode::Int32Array,
            Cacheable::LongArray(_) => DsCode::Int64Array,
            Cacheable::FloatArray(_) => DsCode::FloatArray,
            Cacheable::DoubleArray(_) => DsCode::DoubleArray,
            Cacheable::StringArray(_) => DsCode::CacheableStringArray,
            Cacheable::ObjectArray(_) => DsCode::CacheableObjectArray,
            Cacheable::ArrayList(_) => DsCode::CacheableArrayList,
            Cacheable::HashMap(_) => DsCode::CacheableHashMap,
            Cacheable::Enum(_) => DsCode::PdxEnum,
            Cacheable::Pdx(_) => DsCode::Pdx,
        }
    }

    /// Returns `true` for [`Cacheable::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Cacheable::Null)
    }

    /// Writes the DSCode followed by the value.
    pub fn write_to(&self, output: &mut ObjectDataOutput, registry: &TypeRegistry) -> Result<()> {
        match self {
            // write_string picks the string DSCode itself.
            Cacheable::String(s) => return output.write_string(Some(s)),
            Cacheable::Pdx(instance) => return instance.write_to(output),
            _ => {}
        }
        output.write_byte(self.ds_code().as_byte())?;
        match self {
            Cacheable::Null | Cacheable::String(_) | Cacheable::Pdx(_) => Ok(()),
            Cacheable::Boolean(v) => output.write_bool(*v),
            Cacheable::Char(v) => output.write_char(*v),
            Cacheable::Byte(v) => output.write_byte(*v),
            Cacheable::Short(v) => output.write_short(*v),
            Cacheable::Int(v) => output.write_int(*v),
            Cacheable::Long(v) => output.write_long(*v),
            Cacheable::Float(v) => output.write_float(*v),
            Cacheable::Double(v) => output.write_double(*v),
            Cacheable::Date(v) => output.write_long(*v),
            Cacheable::Bytes(v) => output.write_byte_array(Some(v)),
            Cacheable::BooleanArray(v) => output.write_bool_array(Some(v)),
            Cacheable::CharArray(v) => output.write_char_array(Some(v)),
            Cacheable::ShortArray(v) => output.write_short_array(Some(v)),
            Cacheable::IntArray(v) => output.write_int_array(Some(v)),
            Cacheable::LongArray(v) => output.write_long_array(Some(v)),
            Cacheable::FloatArray(v) => output.write_float_array(Some(v)),
            Cacheable::DoubleArray(v) => output.write_double_array(Some(v)),
            Cacheable::StringArray(v) => output.write_string_array(Some(v)),
            Cacheable::ObjectArray(v) => write_object_array_body(output, Some(v), registry),
            Cacheable::ArrayList(v) => {
                write_len(output, v.len())?;
                v.iter().try_for_each(|e| e.write_to(output, registry))
            }
            Cacheable::HashMap(entries) => {
                write_len(output, entries.len())?;
                for (k, v) in entries {
                    k.write_to(output, registry)?;
                    v.write_to(output, registry)?;
                }
                Ok(())
            }
            Cacheable::Enum(info) => {
                let id = registry.get_enum_value(info)?;
                output.write_byte((id >> 24) as i8)?;
                output.write_array_len(id & 0x00FF_FFFF)
            }
        }
    }

    /// Reads one tagged value.
    pub fn read_from(input: &mut ObjectDataInput<'_>, registry: &Arc<TypeRegistry>) -> Result<Self> {
        let code = DsCode::from_u8(input.read_u8()?)?;
        Self::read_with_code(code, input, registry)
    }

    fn read_with_code(
        code: DsCode,
        input: &mut ObjectDataInput<'_>,
        registry: &Arc<TypeRegistry>,
    ) -> Result<Self> {
        Ok(match code {
            DsCode::NullObj | DsCode::CacheableNullString => Cacheable::Null,
            DsCode::CacheableBoolean => Cacheable::Boolean(input.read_bool()?),
            DsCode::CacheableCharacter => Cacheable::Char(input.read_char()?),
            DsCode::CacheableByte => Cacheable::Byte(input.read_byte()?),
            DsCode::CacheableInt16 => Cacheable::Short(input.read_short()?),
            DsCode::CacheableInt32 => Cacheable::Int(input.read_int()?),
            DsCode::CacheableInt64 => Cacheable::Long(input.read_long()?),
            DsCode::CacheableFloat => Cacheable::Float(input.read_float()?),
            DsCode::CacheableDouble => Cacheable::Double(input.read_double()?),
            DsCode::CacheableDate => Cacheable::Date(input.read_long()?),
            code if code.is_string() => match input.read_string_with_code(code)? {
                Some(s) => Cacheable::String(s),
                None => Cacheable::Null,
            },
            DsCode::CacheableBytes => or_null(input.read_byte_array()?, Cacheable::Bytes),
            DsCode::BooleanArray => or_null(input.read_bool_array()?, Cacheable::BooleanArray),
            DsCode::CharArray => or_null(input.read_char_array()?, Cacheable::CharArray),
            DsCode::Int16Array => or_null(input.read_short_array()?, Cacheable::ShortArray),
            DsCode::Int32Array => or_null(input.read_int_array()?, Cacheable::IntArray),
            DsCode::Int64Array => or_null(input.read_long_array()?, Cacheable::LongArray),
            DsCode::FloatArray => or_null(input.read_float_array()?, Cacheable::FloatArray),
            DsCode::DoubleArray => or_null(input.read_double_array()?, Cacheable::DoubleArray),
            DsCode::CacheableStringArray => {
                or_null(input.read_string_array()?, Cacheable::StringArray)
            }
            DsCode::CacheableObjectArray => {
                or_null(read_object_array_body(input, registry)?, Cacheable::ObjectArray)
            }
            DsCode::CacheableArrayList => match input.read_array_len()? {
                None => Cacheable::Null,
                Some(len) => Cacheable::ArrayList(
                    (0..len)
                        .map(|_| Self::read_from(input, registry))
                        .collect::<Result<_>>()?,
                ),
            },
            DsCode::CacheableHashMap => match input.read_array_len()? {
                None => Cacheable::Null,
                Some(len) => {
                    let mut entries = Vec::with_capacity(len.min(input.remaining()));
                    for _ in 0..len {
                        let k = Self::read_from(input, registry)?;
                        let v = Self::read_from(input, registry)?;
                        entries.push((k, v));
                    }
                    Cacheable::HashMap(entries)
                }
            },
            DsCode::PdxEnum => {
                let dsid = input.read_u8()? as i32;
                let low = input.read_array_len()?.ok_or_else(|| {
                    PdxError::Serialization("null enum id".to_string())
                })?;
                let id = (dsid << 24) | (low as i32 & 0x00FF_FFFF);
                Cacheable::Enum(registry.get_enum(id)?)
            }
            DsCode::Pdx => Cacheable::Pdx(PdxInstance::read_from(input, registry)?),
            other => {
                return Err(PdxError::ProtocolViolation(format!(
                    "DSCode {:?} cannot start an object",
                    other
                )))
            }
        })
    }

    /// The JVM `hashCode` of the equivalent Java object.
    ///
    /// Arrays hash by content as `Arrays.deepHashCode` does.
    pub fn java_hash_code(&self) -> i32 {
        use java_hash::*;
        match self {
            Cacheable::Null => 0,
            Cacheable::Boolean(v) => bool_hash(*v),
            Cacheable::Char(v) => *v as i32,
            Cacheable::Byte(v) => *v as i32,
            Cacheable::Short(v) => *v as i32,
            Cacheable::Int(v) => *v,
            Cacheable::Long(v) | Cacheable::Date(v) => long_hash(*v),
            Cacheable::Float(v) => float_hash(*v),
            Cacheable::Double(v) => double_hash(*v),
            Cacheable::String(s) => string_hash(s),
            Cacheable::Bytes(v) => hash_all(v.iter().map(|&b| b as i32)),
            Cacheable::BooleanArray(v) => hash_all(v.iter().map(|&b| bool_hash(b))),
            Cacheable::CharArray(v) => hash_all(v.iter().map(|&c| c as i32)),
            Cacheable::ShortArray(v) => hash_all(v.iter().map(|&n| n as i32)),
            Cacheable::IntArray(v) => hash_all(v.iter().copied()),
            Cacheable::LongArray(v) => hash_all(v.iter().map(|&n| long_hash(n))),
            Cacheable::FloatArray(v) => hash_all(v.iter().map(|&n| float_hash(n))),
            Cacheable::DoubleArray(v) => hash_all(v.iter().map(|&n| double_hash(n))),
            Cacheable::StringArray(v) => {
                hash_all(v.iter().map(|s| s.as_deref().map_or(0, string_hash)))
            }
            Cacheable::ObjectArray(v) | Cacheable::ArrayList(v) => {
                hash_all(v.iter().map(Cacheable::java_hash_code))
            }
            Cacheable::HashMap(entries) => entries.iter().fold(0i32, |h, (k, v)| {
                h.wrapping_add(k.java_hash_code() ^ v.java_hash_code())
            }),
            Cacheable::Enum(info) => string_hash(info.enum_class_name())
                .wrapping_mul(31)
                .wrapping_add(string_hash(info.enum_name())),
            Cacheable::Pdx(instance) => instance.hash_code(),
        }
    }
}

fn or_null<T>(value: Option<T>, wrap: impl FnOnce(T) -> Cacheable) -> Cacheable {
    value.map_or(Cacheable::Null, wrap)
}

fn write_len(output: &mut ObjectDataOutput, len: usize) -> Result<()> {
    let len = i32::try_from(len)
        .map_err(|_| PdxError::InvalidArgument(format!("{} elements is too many", len)))?;
    output.write_array_len(len)
}

/// Writes an `Object[]` body: length, component class, then each element.
pub(crate) fn write_object_array_body(
    output: &mut ObjectDataOutput,
    values: Option<&[Cacheable]>,
    registry: &TypeRegistry,
) -> Result<()> {
    let Some(values) = values else {
        return output.write_array_len(-1);
    };
    write_len(output, values.len())?;
    output.write_byte(DsCode::Class.as_byte())?;
    output.write_string(Some(OBJECT_ARRAY_COMPONENT))?;
    values.iter().try_for_each(|v| v.write_to(output, registry))
}

/// Reads an `Object[]` body written by [`write_object_array_body`].
pub(crate) fn read_object_array_body(
    input: &mut ObjectDataInput<'_>,
    registry: &Arc<TypeRegistry>,
) -> Result<Option<Vec<Cacheable>>> {
    let Some(len) = input.read_array_len()? else {
        return Ok(None);
    };
    let code = DsCode::from_u8(input.read_u8()?)?;
    if code != DsCode::Class {
        return Err(PdxError::ProtocolViolation(format!(
            "object array without component class, found DSCode {:?}",
            code
        )));
    }
    let _component = input.read_string()?;
    let mut values = Vec::with_capacity(len.min(input.remaining()));
    for _ in 0..len {
        values.push(Cacheable::read_from(input, registry)?);
    }
    Ok(Some(values))
}

impl From<bool> for Cacheable {
    fn from(v: bool) -> Self {
        Cacheable::Boolean(v)
    }
}

impl From<i32> for Cacheable {
    fn from(v: i32) -> Self {
        Cacheable::Int(v)
    }
}

impl From<i64> for Cacheable {
    fn from(v: i64) -> Self {
        Cacheable::Long(v)
    }
}

impl From<f64> for Cacheable {
    fn from(v: f64) -> Self {
        Cacheable::Double(v)
    }
}

impl From<&str> for Cacheable {
    fn from(v: &str) -> Self {
        Cacheable::String(v.to_string())
    }
}

impl From<String> for Cacheable {
    fn from(v: String) -> Self {
        Cacheable::String(v)
    }
}

impl From<EnumInfo> for Cacheable {
    fn from(v: EnumInfo) -> Self {
        Cacheable::Enum(v)
    }
}

impl From<PdxInstance> for Cacheable {
    fn from(v: PdxInstance) -> Self {
        Cacheable::Pdx(v)
    }
}

impl<T: Into<Cacheable>> From<Option<T>> for Cacheable {
    fn from(v: Option<T>) -> Self {
        v.map_or(Cacheable::Null, Into::into)
    }
}
