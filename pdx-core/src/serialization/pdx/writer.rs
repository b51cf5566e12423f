//! Produces serialized PDX blobs field by field.

use super::field_type::PdxFieldKind;
use super::field_value::PdxFieldValue;
use super::layout::{calculate_len_with_offsets, PDX_HEADER_SIZE};
use super::pdx_type::{FieldMaps, PdxType};
use super::preserved::{PdxUnreadFields, PreservedData};
use super::registry::TypeRegistry;
use super::serializer;
use super::{Mode, PdxSerializable};
use crate::error::{PdxError, Result};
use crate::serialization::cacheable::{write_object_array_body, Cacheable};
use crate::serialization::{DataOutput, DsCode, ObjectDataOutput};
use std::sync::Arc;
use tracing::trace;

enum WriterState {
    Collecting(PdxType),
    Known {
        pdx_type: Arc<PdxType>,
        next: usize,
    },
    Merging {
        merged: Arc<PdxType>,
        maps: Arc<FieldMaps>,
        preserved: Arc<PreservedData>,
        next: usize,
        next_preserved: usize,
    },
}

/// Writes the fields of one object into a PDX blob.
///
/// Fields must be written in the order the schema declares them. The header
/// is reserved on construction and patched by [`finish`](Self::finish),
/// which also appends the offset table.
pub struct PdxWriter<'a> {
    registry: &'a Arc<TypeRegistry>,
    output: &'a mut ObjectDataOutput,
    start: usize,
    state: WriterState,
    var_offsets: Vec<usize>,
    fields_written: usize,
    finished: bool,
}

impl<'a> PdxWriter<'a> {
    /// Starts a blob whose schema is collected from the writes themselves.
    pub(crate) fn collecting(
        registry: &'a Arc<TypeRegistry>,
        output: &'a mut ObjectDataOutput,
        seed: PdxType,
    ) -> Result<Self> {
        Self::begin(registry, output, WriterState::Collecting(seed))
    }

    /// Starts a blob for an already registered schema.
    pub(crate) fn known(
        registry: &'a Arc<TypeRegistry>,
        output: &'a mut ObjectDataOutput,
        pdx_type: Arc<PdxType>,
    ) -> Result<Self> {
        Self::begin(registry, output, WriterState::Known { pdx_type, next: 0 })
    }

    /// Starts a blob for `merged`, re-emitting the preserved fields that
    /// `local` does not declare.
    pub(crate) fn merging(
        registry: &'a Arc<TypeRegistry>,
        output: &'a mut ObjectDataOutput,
        local: &PdxType,
        merged: Arc<PdxType>,
        preserved: Arc<PreservedData>,
    ) -> Result<Self> {
        let maps = registry.field_maps(local, &merged);
        Self::begin(
            registry,
            output,
            WriterState::Merging {
                merged,
                maps,
                preserved,
                next: 0,
                next_preserved: 0,
            },
        )
    }

    fn begin(
        registry: &'a Arc<TypeRegistry>,
        output: &'a mut ObjectDataOutput,
        state: WriterState,
    ) -> Result<Self> {
        let start = output.position();
        output.write_int(0)?;
        output.write_int(0)?;
        Ok(Self {
            registry,
            output,
            start,
            state,
            var_offsets: Vec::new(),
            fields_written: 0,
            finished: false,
        })
    }

    /// How this writer resolves the schema.
    pub fn mode(&self) -> Mode {
        match self.state {
            WriterState::Collecting(_) => Mode::CollectingSchema,
            WriterState::Known { .. } => Mode::KnownSchema,
            WriterState::Merging { .. } => Mode::MergingRemote,
        }
    }

    /// Class being written.
    pub fn class_name(&self) -> &str {
        match &self.state {
            WriterState::Collecting(t) => t.class_name(),
            WriterState::Known { pdx_type, .. } => pdx_type.class_name(),
            WriterState::Merging { merged, .. } => merged.class_name(),
        }
    }

    /// The registry this writer resolves types and enums through.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        self.registry
    }

    fn field_data_position(&self) -> usize {
        self.output.position() - self.start - PDX_HEADER_SIZE
    }

    fn begin_field(&mut self, name: &str, kind: PdxFieldKind) -> Result<()> {
        if self.finished {
            return Err(PdxError::ProtocolViolation(format!(
                "field '{}' written after the object was finished",
                name
            )));
        }
        if name.is_empty() {
            return Err(PdxError::InvalidArgument(
                "field name must not be empty".to_string(),
            ));
        }
        let Self {
            output,
            start,
            state,
            var_offsets,
            ..
        } = self;
        match state {
            WriterState::Collecting(t) => t.add_field(name, kind),
            WriterState::Known { pdx_type, next } => {
                expect_next(pdx_type, *next, name, kind)?;
                *next += 1;
                Ok(())
            }
            WriterState::Merging {
                merged,
                maps,
                preserved,
                next,
                next_preserved,
            } => {
                let base = *start + PDX_HEADER_SIZE;
                write_preserved_data(output, base, var_offsets, merged, maps, preserved, next, next_preserved)?;
                expect_next(merged, *next, name, kind)?;
                *next += 1;
                Ok(())
            }
        }
    }

    fn write_value<F>(&mut self, name: &str, kind: PdxFieldKind, encode: F) -> Result<()>
    where
        F: FnOnce(&mut ObjectDataOutput, &Arc<TypeRegistry>) -> Result<()>,
    {
        self.begin_field(name, kind)?;
        if kind.is_variable_length() {
            let offset = self.field_data_position();
            self.var_offsets.push(offset);
        }
        encode(self.output, self.registry)?;
        self.fields_written += 1;
        Ok(())
    }

    /// Writes a boolean field.
    pub fn write_bool(&mut self, name: &str, value: bool) -> Result<()> {
        self.write_value(name, PdxFieldKind::Boolean, |out, _| out.write_bool(value))
    }

    /// Writes a byte field.
    pub fn write_byte(&mut self, name: &str, value: i8) -> Result<()> {
        self.write_value(name, PdxFieldKind::Byte, |out, _| out.write_byte(value))
    }

    /// Writes a char field as one UTF-16 unit.
    pub fn write_char(&mut self, name: &str, value: u16) -> Result<()> {
        self.write_value(name, PdxFieldKind::Char, |out, _| out.write_char(value))
    }

    /// Writes a short field.
    pub fn write_short(&mut self, name: &str, value: i16) -> Result<()> {
        self.write_value(name, PdxFieldKind::Short, |out, _| out.write_short(value))
    }

    /// Writes an int field.
    pub fn write_int(&mut self, name: &str, value: i32) -> Result<()> {
        self.write_value(name, PdxFieldKind::Int, |out, _| out.write_int(value))
    }

    /// Writes a long field.
    pub fn write_long(&mut self, name: &str, value: i64) -> Result<()> {
        self.write_value(name, PdxFieldKind::Long, |out, _| out.write_long(value))
    }

    /// Writes a float field.
    pub fn write_float(&mut self, name: &str, value: f32) -> Result<()> {
        self.write_value(name, PdxFieldKind::Float, |out, _| out.write_float(value))
    }

    /// Writes a double field.
    pub fn write_double(&mut self, name: &str, value: f64) -> Result<()> {
        self.write_value(name, PdxFieldKind::Double, |out, _| out.write_double(value))
    }

    /// Writes a date as epoch milliseconds; `None` is written as `-1`.
    pub fn write_date(&mut self, name: &str, millis: Option<i64>) -> Result<()> {
        self.write_value(name, PdxFieldKind::Date, |out, _| {
            out.write_long(millis.unwrap_or(-1))
        })
    }

    /// Writes a tagged string field.
    pub fn write_string(&mut self, name: &str, value: Option<&str>) -> Result<()> {
        self.write_value(name, PdxFieldKind::String, |out, _| out.write_string(value))
    }

    /// Writes a tagged object field.
    pub fn write_object(&mut self, name: &str, value: &Cacheable) -> Result<()> {
        self.write_value(name, PdxFieldKind::Object, |out, registry| {
            value.write_to(out, registry)
        })
    }

    /// Writes a nested PDX object as an object field.
    pub fn write_pdx(&mut self, name: &str, value: Option<&dyn PdxSerializable>) -> Result<()> {
        self.write_value(name, PdxFieldKind::Object, |out, registry| match value {
            Some(obj) => serializer::write_object(registry, out, obj),
            None => out.write_byte(DsCode::NullObj.as_byte()),
        })
    }

    /// Writes a boolean array field.
    pub fn write_bool_array(&mut self, name: &str, value: Option<&[bool]>) -> Result<()> {
        self.write_value(name, PdxFieldKind::BooleanArray, |out, _| out.write_bool_array(value))
    }

    /// Writes a char array field.
    pub fn write_char_array(&mut self, name: &str, value: Option<&[u16]>) -> Result<()> {
        self.write_value(name, PdxFieldKind::CharArray, |out, _| out.write_char_array(value))
    }

    /// Writes a byte array field.
    pub fn write_byte_array(&mut self, name: &str, value: Option<&[i8]>) -> Result<()> {
        self.write_value(name, PdxFieldKind::ByteArray, |out, _| out.write_byte_array(value))
    }

    /// Writes a short array field.
    pub fn write_short_array(&mut self, name: &str, value: Option<&[i16]>) -> Result<()> {
        self.write_value(name, PdxFieldKind::ShortArray, |out, _| out.write_short_array(value))
    }

    /// Writes an int array field.
    pub fn write_int_array(&mut self, name: &str, value: Option<&[i32]>) -> Result<()> {
        self.write_value(name, PdxFieldKind::IntArray, |out, _| out.write_int_array(value))
    }

    /// Writes a long array field.
    pub fn write_long_array(&mut self, name: &str, value: Option<&[i64]>) -> Result<()> {
        self.write_value(name, PdxFieldKind::LongArray, |out, _| out.write_long_array(value))
    }

    /// Writes a float array field.
    pub fn write_float_array(&mut self, name: &str, value: Option<&[f32]>) -> Result<()> {
        self.write_value(name, PdxFieldKind::FloatArray, |out, _| out.write_float_array(value))
    }

    /// Writes a double array field.
    pub fn write_double_array(&mut self, name: &str, value: Option<&[f64]>) -> Result<()> {
        self.write_value(name, PdxFieldKind::DoubleArray, |out, _| {
            out.write_double_array(value)
        })
    }

    /// Writes a string array field.
    pub fn write_string_array(&mut self, name: &str, value: Option<&[Option<String>]>) -> Result<()> {
        self.write_value(name, PdxFieldKind::StringArray, |out, _| {
            out.write_string_array(value)
        })
    }

    /// Writes an object array field.
    pub fn write_object_array(&mut self, name: &str, value: Option<&[Cacheable]>) -> Result<()> {
        self.write_value(name, PdxFieldKind::ObjectArray, |out, registry| {
            write_object_array_body(out, value, registry)
        })
    }

    /// Writes an array of byte arrays.
    pub fn write_array_of_byte_arrays(
        &mut self,
        name: &str,
        value: Option<&[Option<Vec<i8>>]>,
    ) -> Result<()> {
        self.write_value(name, PdxFieldKind::ArrayOfByteArrays, |out, _| {
            out.write_array_of_byte_arrays(value)
        })
    }

    /// Writes a dynamically typed value.
    pub fn write_field(&mut self, name: &str, value: &PdxFieldValue) -> Result<()> {
        self.write_value(name, value.kind(), |out, registry| value.encode(out, registry))
    }

    /// Splices an already encoded field payload.
    pub(crate) fn write_raw_field(&mut self, name: &str, kind: PdxFieldKind, bytes: &[u8]) -> Result<()> {
        self.write_value(name, kind, |out, _| out.write_bytes(bytes))
    }

    /// Marks a field as part of the object's identity.
    ///
    /// While collecting a schema the field must already be written; otherwise
    /// the schema must declare it.
    pub fn mark_identity_field(&mut self, name: &str) -> Result<()> {
        if self.finished {
            return Err(PdxError::ProtocolViolation(format!(
                "identity mark on '{}' after the object was finished",
                name
            )));
        }
        let declared = match &mut self.state {
            WriterState::Collecting(t) => return t.set_identity_field(name),
            WriterState::Known { pdx_type, .. } => pdx_type.has_field(name),
            WriterState::Merging { merged, .. } => merged.has_field(name),
        };
        if declared {
            Ok(())
        } else {
            Err(PdxError::ProtocolViolation(format!(
                "cannot mark undeclared field '{}' as identity",
                name
            )))
        }
    }

    /// Re-emits fields a newer version of the class wrote and this object
    /// kept from its last read.
    ///
    /// Must be called before any field is written.
    pub fn write_unread_fields(&mut self, unread: &PdxUnreadFields) -> Result<()> {
        if self.finished || self.fields_written > 0 {
            return Err(PdxError::ProtocolViolation(
                "unread fields must be written before any other field".to_string(),
            ));
        }
        let class_name = self.class_name().to_string();
        let local = self.registry.local_type(&class_name).ok_or_else(|| {
            PdxError::ProtocolViolation(format!(
                "class {} has no local schema to merge unread fields into",
                class_name
            ))
        })?;
        let merged = self.registry.get_type_by_id(unread.merged_type_id())?;
        if merged.class_name() != class_name {
            return Err(PdxError::ProtocolViolation(format!(
                "unread fields of {} cannot be written for {}",
                merged.class_name(),
                class_name
            )));
        }
        let maps = self.registry.field_maps(&local, &merged);
        self.state = WriterState::Merging {
            merged,
            maps,
            preserved: Arc::clone(unread.data()),
            next: 0,
            next_preserved: 0,
        };
        Ok(())
    }

    /// Completes the blob: appends outstanding preserved fields and the
    /// offset table, then patches the header.
    ///
    /// Returns the type the blob was written with. A collected schema is
    /// registered here.
    pub fn finish(&mut self) -> Result<Arc<PdxType>> {
        if self.finished {
            return Err(PdxError::ProtocolViolation(
                "object already finished".to_string(),
            ));
        }
        let Self {
            registry,
            output,
            start,
            state,
            var_offsets,
            ..
        } = self;
        let pdx_type = match state {
            WriterState::Collecting(t) => registry.get_or_register_type(t.clone())?,
            WriterState::Known { pdx_type, next } => {
                check_all_written(pdx_type, *next)?;
                Arc::clone(pdx_type)
            }
            WriterState::Merging {
                merged,
                maps,
                preserved,
                next,
                next_preserved,
            } => {
                let base = *start + PDX_HEADER_SIZE;
                write_preserved_data(output, base, var_offsets, merged, maps, preserved, next, next_preserved)?;
                check_all_written(merged, *next)?;
                if *next_preserved != preserved.fields().len() {
                    return Err(PdxError::Serialization(format!(
                        "{} preserved fields left over for {}",
                        preserved.fields().len() - *next_preserved,
                        merged.class_name()
                    )));
                }
                Arc::clone(merged)
            }
        };

        if var_offsets.len() != pdx_type.number_of_var_len_fields() {
            return Err(PdxError::Serialization(format!(
                "{} variable-length fields written for {} which declares {}",
                var_offsets.len(),
                pdx_type.class_name(),
                pdx_type.number_of_var_len_fields()
            )));
        }
        let fields_len = output.position() - *start - PDX_HEADER_SIZE;
        let offset_count = var_offsets.len().saturating_sub(1);
        let (total, width) = calculate_len_with_offsets(fields_len, offset_count);
        for &offset in var_offsets.iter().skip(1).rev() {
            output.write_offset(offset, width)?;
        }
        let total_len = i32::try_from(total).map_err(|_| {
            PdxError::OutOfMemory(format!("pdx object of {} bytes exceeds i32::MAX", total))
        })?;
        output.write_int_at(*start, total_len)?;
        output.write_int_at(*start + 4, pdx_type.type_id())?;
        self.finished = true;
        trace!(
            class = pdx_type.class_name(),
            type_id = pdx_type.type_id(),
            len = total,
            width,
            "wrote pdx object"
        );
        Ok(pdx_type)
    }
}

/// Splices preserved bytes for every merged-only field up to the next field
/// the local class declares.
#[allow(clippy::too_many_arguments)]
fn write_preserved_data(
    output: &mut ObjectDataOutput,
    base: usize,
    var_offsets: &mut Vec<usize>,
    merged: &PdxType,
    maps: &FieldMaps,
    preserved: &PreservedData,
    next: &mut usize,
    next_preserved: &mut usize,
) -> Result<()> {
    while *next < merged.field_count() && maps.remote_to_local[*next] < 0 {
        let field = &merged.fields()[*next];
        let bytes = preserved.fields().get(*next_preserved).ok_or_else(|| {
            PdxError::Serialization(format!(
                "no preserved bytes for field '{}' of {}",
                field.name(),
                merged.class_name()
            ))
        })?;
        if field.is_variable_length() {
            var_offsets.push(output.position() - base);
        }
        output.write_bytes(bytes)?;
        *next += 1;
        *next_preserved += 1;
    }
    Ok(())
}

fn expect_next(pdx_type: &PdxType, next: usize, name: &str, kind: PdxFieldKind) -> Result<()> {
    match pdx_type.fields().get(next) {
        Some(field) if field.name() == name => {
            if field.kind() == kind {
                Ok(())
            } else {
                Err(PdxError::ProtocolViolation(format!(
                    "field '{}' of {} is declared as {} but written as {}",
                    name,
                    pdx_type.class_name(),
                    field.kind(),
                    kind
                )))
            }
        }
        _ => Err(PdxError::ProtocolViolation(match pdx_type.field_index(name) {
            Some(i) if i < next => format!("field '{}' written twice", name),
            Some(_) => format!(
                "field '{}' of {} written out of declaration order",
                name,
                pdx_type.class_name()
            ),
            None => format!(
                "field '{}' is not declared by {}",
                name,
                pdx_type.class_name()
            ),
        })),
    }
}

fn check_all_written(pdx_type: &PdxType, next: usize) -> Result<()> {
    match pdx_type.fields().get(next) {
        None => Ok(()),
        Some(field) => Err(PdxError::ProtocolViolation(format!(
            "field '{}' of {} was not written",
            field.name(),
            pdx_type.class_name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::pdx::InMemoryTypeService;
    use crate::serialization::{DataInput, ObjectDataInput};

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(TypeRegistry::new(Arc::new(InMemoryTypeService::new())).unwrap())
    }

    #[test]
    fn test_collecting_writer_layout() {
        let registry = registry();
        let mut output = ObjectDataOutput::new();
        let mut writer =
            PdxWriter::collecting(&registry, &mut output, PdxType::new("T")).unwrap();
        assert_eq!(writer.mode(), Mode::CollectingSchema);
        writer.write_int("a", 7).unwrap();
        writer.write_string("s1", Some("hi")).unwrap();
        writer.write_string("s2", None).unwrap();
        writer.write_bool("b", true).unwrap();
        let pdx_type = writer.finish().unwrap();
        assert_eq!(pdx_type.field_count(), 4);

        let bytes = output.into_bytes();
        let mut input = ObjectDataInput::new(&bytes);
        // 4 + 5 + 1 + 1 field bytes, one 1-byte offset entry.
        assert_eq!(input.read_int().unwrap(), 12);
        assert_eq!(input.read_int().unwrap(), pdx_type.type_id());
        assert_eq!(input.read_int().unwrap(), 7);
        assert_eq!(&bytes[12..17], &[87, 0, 2, b'h', b'i']);
        assert_eq!(bytes[17], 69);
        assert_eq!(bytes[18], 1);
        assert_eq!(bytes[19], 9);
        assert_eq!(bytes.len(), 20);
    }

    #[test]
    fn test_known_writer_enforces_order_and_kind() {
        let registry = registry();
        let mut t = PdxType::new("T");
        t.add_field("a", PdxFieldKind::Int).unwrap();
        t.add_field("b", PdxFieldKind::Long).unwrap();
        let t = registry.get_or_register_type(t).unwrap();

        let mut output = ObjectDataOutput::new();
        let mut writer = PdxWriter::known(&registry, &mut output, Arc::clone(&t)).unwrap();
        assert!(matches!(
            writer.write_long("b", 1),
            Err(PdxError::ProtocolViolation(_))
        ));
        assert!(matches!(
            writer.write_long("a", 1),
            Err(PdxError::ProtocolViolation(_))
        ));
        writer.write_int("a", 1).unwrap();
        assert!(matches!(
            writer.write_int("a", 1),
            Err(PdxError::ProtocolViolation(_))
        ));
        assert!(matches!(
            writer.finish(),
            Err(PdxError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_duplicate_field_while_collecting() {
        let registry = registry();
        let mut output = ObjectDataOutput::new();
        let mut writer =
            PdxWriter::collecting(&registry, &mut output, PdxType::new("T")).unwrap();
        writer.write_int("a", 1).unwrap();
        assert!(matches!(
            writer.write_int("a", 2),
            Err(PdxError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_write_after_finish_and_empty_name() {
        let registry = registry();
        let mut output = ObjectDataOutput::new();
        let mut writer =
            PdxWriter::collecting(&registry, &mut output, PdxType::new("T")).unwrap();
        assert!(matches!(
            writer.write_int("", 1),
            Err(PdxError::InvalidArgument(_))
        ));
        writer.write_int("a", 1).unwrap();
        writer.finish().unwrap();
        assert!(matches!(
            writer.write_int("b", 1),
            Err(PdxError::ProtocolViolation(_))
        ));
        assert!(writer.finish().is_err());
    }

    #[test]
    fn test_identity_mark_requires_written_field() {
        let registry = registry();
        let mut output = ObjectDataOutput::new();
        let mut writer =
            PdxWriter::collecting(&registry, &mut output, PdxType::new("T")).unwrap();
        assert!(matches!(
            writer.mark_identity_field("id"),
            Err(PdxError::ProtocolViolation(_))
        ));
        writer.write_long("id", 5).unwrap();
        writer.mark_identity_field("id").unwrap();
        let t = writer.finish().unwrap();
        assert!(t.field("id").unwrap().is_identity());
    }

    #[test]
    fn test_unread_fields_after_a_field_is_rejected() {
        let registry = registry();
        let mut output = ObjectDataOutput::new();
        let mut writer =
            PdxWriter::collecting(&registry, &mut output, PdxType::new("T")).unwrap();
        writer.write_int("a", 1).unwrap();
        let unread = PdxUnreadFields(Arc::new(PreservedData::new(1, vec![])));
        assert!(matches!(
            writer.write_unread_fields(&unread),
            Err(PdxError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_no_variable_fields_means_no_table() {
        let registry = registry();
        let mut output = ObjectDataOutput::new();
        let mut writer =
            PdxWriter::collecting(&registry, &mut output, PdxType::new("T")).unwrap();
        writer.write_long("a", 1).unwrap();
        writer.write_double("b", 2.0).unwrap();
        writer.finish().unwrap();
        let bytes = output.into_bytes();
        assert_eq!(bytes.len(), 8 + 16);
        assert_eq!(&bytes[0..4], &[0, 0, 0, 16]);
    }
}
