//! Dynamically typed field values, one variant per field kind.

use super::field_type::PdxFieldKind;
use super::registry::TypeRegistry;
use crate::error::Result;
use crate::serialization::cacheable::{read_object_array_body, write_object_array_body, Cacheable};
use crate::serialization::{DataInput, DataOutput, ObjectDataInput, ObjectDataOutput};
use std::sync::Arc;

/// The value of one PDX field.
///
/// Nullable kinds carry an `Option`; `None` encodes as the kind's default
/// bytes.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum PdxFieldValue {
    Boolean(bool),
    Byte(i8),
    Char(u16),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// Epoch milliseconds.
    Date(Option<i64>),
    String(Option<String>),
    Object(Cacheable),
    BooleanArray(Option<Vec<bool>>),
    CharArray(Option<Vec<u16>>),
    ByteArray(Option<Vec<i8>>),
    ShortArray(Option<Vec<i16>>),
    IntArray(Option<Vec<i32>>),
    LongArray(Option<Vec<i64>>),
    FloatArray(Option<Vec<f32>>),
    DoubleArray(Option<Vec<f64>>),
    StringArray(Option<Vec<Option<String>>>),
    ObjectArray(Option<Vec<Cacheable>>),
    ArrayOfByteArrays(Option<Vec<Option<Vec<i8>>>>),
}

impl PdxFieldValue {
    /// The field kind this value belongs to.
    pub fn kind(&self) -> PdxFieldKind {
        match self {
            PdxFieldValue::Boolean(_) => PdxFieldKind::Boolean,
            PdxFieldValue::Byte(_) => PdxFieldKind::Byte,
            PdxFieldValue::Char(_) => PdxFieldKind::Char,
            PdxFieldValue::Short(_) => PdxFieldKind::Short,
            PdxFieldValue::Int(_) => PdxFieldKind::Int,
            PdxFieldValue::Long(_) => PdxFieldKind::Long,
            PdxFieldValue::Float(_) => PdxFieldKind::Float,
            PdxFieldValue::Double(_) => PdxFieldKind::Double,
            PdxFieldValue::Date(_) => PdxFieldKind::Date,
            PdxFieldValue::String(_) => PdxFieldKind::String,
            PdxFieldValue::Object(_) => PdxFieldKind::Object,
            PdxFieldValue::BooleanArray(_) => PdxFieldKind::BooleanArray,
            PdxFieldValue::CharArray(_) => PdxFieldKind::CharArray,
            PdxFieldValue::ByteArray(_) => PdxFieldKind::ByteArray,
            PdxFieldValue::ShortArray(_) => PdxFieldKind::ShortArray,
            PdxFieldValue::IntArray(_) => PdxFieldKind::IntArray,
            PdxFieldValue::LongArray(_) => PdxFieldKind::LongArray,
            PdxFieldValue::FloatArray(_) => PdxFieldKind::FloatArray,
            PdxFieldValue::DoubleArray(_) => PdxFieldKind::DoubleArray,
            PdxFieldValue::StringArray(_) => PdxFieldKind::StringArray,
            PdxFieldValue::ObjectArray(_) => PdxFieldKind::ObjectArray,
            PdxFieldValue::ArrayOfByteArrays(_) => PdxFieldKind::ArrayOfByteArrays,
        }
    }

    /// The value a reader yields for a field missing from the wire.
    pub fn default_for(kind: PdxFieldKind) -> Self {
        match kind {
            PdxFieldKind::Boolean => PdxFieldValue::Boolean(false),
            PdxFieldKind::Byte => PdxFieldValue::Byte(0),
            PdxFieldKind::Char => PdxFieldValue::Char(0),
            PdxFieldKind::Short => PdxFieldValue::Short(0),
            PdxFieldKind::Int => PdxFieldValue::Int(0),
            PdxFieldKind::Long => PdxFieldValue::Long(0),
            PdxFieldKind::Float => PdxFieldValue::Float(0.0),
            PdxFieldKind::Double => PdxFieldValue::Double(0.0),
            PdxFieldKind::Date => PdxFieldValue::Date(None),
            PdxFieldKind::String => PdxFieldValue::String(None),
            PdxFieldKind::Object => PdxFieldValue::Object(Cacheable::Null),
            PdxFieldKind::BooleanArray => PdxFieldValue::BooleanArray(None),
            PdxFieldKind::CharArray => PdxFieldValue::CharArray(None),
            PdxFieldKind::ByteArray => PdxFieldValue::ByteArray(None),
            PdxFieldKind::ShortArray => PdxFieldValue::ShortArray(None),
            PdxFieldKind::IntArray => PdxFieldValue::IntArray(None),
            PdxFieldKind::LongArray => PdxFieldValue::LongArray(None),
            PdxFieldKind::FloatArray => PdxFieldValue::FloatArray(None),
            PdxFieldKind::DoubleArray => PdxFieldValue::DoubleArray(None),
            PdxFieldKind::StringArray => PdxFieldValue::StringArray(None),
            PdxFieldKind::ObjectArray => PdxFieldValue::ObjectArray(None),
            PdxFieldKind::ArrayOfByteArrays => PdxFieldValue::ArrayOfByteArrays(None),
        }
    }

    /// Writes the field payload, without any tag of its own.
    pub fn encode(&self, output: &mut ObjectDataOutput, registry: &TypeRegistry) -> Result<()> {
        match self {
            PdxFieldValue::Boolean(v) => output.write_bool(*v),
            PdxFieldValue::Byte(v) => output.write_byte(*v),
            PdxFieldValue::Char(v) => output.write_char(*v),
            PdxFieldValue::Short(v) => output.write_short(*v),
            PdxFieldValue::Int(v) => output.write_int(*v),
            PdxFieldValue::Long(v) => output.write_long(*v),
            PdxFieldValue::Float(v) => output.write_float(*v),
            PdxFieldValue::Double(v) => output.write_double(*v),
            PdxFieldValue::Date(v) => output.write_long(v.unwrap_or(-1)),
            PdxFieldValue::String(v) => output.write_string(v.as_deref()),
            PdxFieldValue::Object(v) => v.write_to(output, registry),
            PdxFieldValue::BooleanArray(v) => output.write_bool_array(v.as_deref()),
            PdxFieldValue::CharArray(v) => output.write_char_array(v.as_deref()),
            PdxFieldValue::ByteArray(v) => output.write_byte_array(v.as_deref()),
            PdxFieldValue::ShortArray(v) => output.write_short_array(v.as_deref()),
            PdxFieldValue::IntArray(v) => output.write_int_array(v.as_deref()),
            PdxFieldValue::LongArray(v) => output.write_long_array(v.as_deref()),
            PdxFieldValue::FloatArray(v) => output.write_float_array(v.as_deref()),
            PdxFieldValue::DoubleArray(v) => output.write_double_array(v.as_deref()),
            PdxFieldValue::StringArray(v) => output.write_string_array(v.as_deref()),
            PdxFieldValue::ObjectArray(v) => write_object_array_body(output, v.as_deref(), registry),
            PdxFieldValue::ArrayOfByteArrays(v) => output.write_array_of_byte_arrays(v.as_deref()),
        }
    }

    /// Reads a payload of `kind`.
    pub fn decode(
        kind: PdxFieldKind,
        input: &mut ObjectDataInput<'_>,
        registry: &Arc<TypeRegistry>,
    ) -> Result<Self> {
        Ok(match kind {
            PdxFieldKind::Boolean => PdxFieldValue::Boolean(input.read_bool()?),
            PdxFieldKind::Byte => PdxFieldValue::Byte(input.read_byte()?),
            PdxFieldKind::Char => PdxFieldValue::Char(input.read_char()?),
            PdxFieldKind::Short => PdxFieldValue::Short(input.read_short()?),
            PdxFieldKind::Int => PdxFieldValue::Int(input.read_int()?),
            PdxFieldKind::Long => PdxFieldValue::Long(input.read_long()?),
            PdxFieldKind::Float => PdxFieldValue::Float(input.read_float()?),
            PdxFieldKind::Double => PdxFieldValue::Double(input.read_double()?),
            PdxFieldKind::Date => {
                let millis = input.read_long()?;
                PdxFieldValue::Date((millis != -1).then_some(millis))
            }
            PdxFieldKind::String => PdxFieldValue::String(input.read_string()?),
            PdxFieldKind::Object => PdxFieldValue::Object(Cacheable::read_from(input, registry)?),
            PdxFieldKind::BooleanArray => PdxFieldValue::BooleanArray(input.read_bool_array()?),
            PdxFieldKind::CharArray => PdxFieldValue::CharArray(input.read_char_array()?),
            PdxFieldKind::ByteArray => PdxFieldValue::ByteArray(input.read_byte_array()?),
            PdxFieldKind::ShortArray => PdxFieldValue::ShortArray(input.read_short_array()?),
            PdxFieldKind::IntArray => PdxFieldValue::IntArray(input.read_int_array()?),
            PdxFieldKind::LongArray => PdxFieldValue::LongArray(input.read_long_array()?),
            PdxFieldKind::FloatArray => PdxFieldValue::FloatArray(input.read_float_array()?),
            PdxFieldKind::DoubleArray => PdxFieldValue::DoubleArray(input.read_double_array()?),
            PdxFieldKind::StringArray => PdxFieldValue::StringArray(input.read_string_array()?),
            PdxFieldKind::ObjectArray => {
                PdxFieldValue::ObjectArray(read_object_array_body(input, registry)?)
            }
            PdxFieldKind::ArrayOfByteArrays => {
                PdxFieldValue::ArrayOfByteArrays(input.read_array_of_byte_arrays()?)
            }
        })
    }
}
