//! Random-access field reads from a serialized PDX blob.

use super::field_type::PdxFieldKind;
use super::field_value::PdxFieldValue;
use super::layout::BlobLayout;
use super::pdx_type::{FieldMaps, PdxType};
use super::preserved::{PdxUnreadFields, PreservedData};
use super::registry::TypeRegistry;
use super::serializer;
use super::{Mode, PdxSerializable};
use crate::error::{PdxError, Result};
use crate::serialization::cacheable::{read_object_array_body, Cacheable};
use crate::serialization::{DataInput, DsCode, ObjectDataInput};
use bytes::Bytes;
use std::sync::Arc;
use tracing::trace;

enum ReaderState {
    Known,
    Merging {
        local: Arc<PdxType>,
        maps: Arc<FieldMaps>,
    },
    Collecting(PdxType),
}

/// Reads the fields of one object from a PDX blob.
///
/// Fields are located by name through the type the blob was written with,
/// so they may be read in any order. A field the blob does not carry reads
/// as its kind's default value.
pub struct PdxReader<'a> {
    registry: &'a Arc<TypeRegistry>,
    blob: &'a [u8],
    input: ObjectDataInput<'a>,
    remote: Arc<PdxType>,
    layout: BlobLayout,
    state: ReaderState,
    unread_taken: bool,
}

impl<'a> PdxReader<'a> {
    /// Reads a blob written with the local schema itself.
    pub(crate) fn known(
        registry: &'a Arc<TypeRegistry>,
        pdx_type: Arc<PdxType>,
        blob: &'a [u8],
    ) -> Result<Self> {
        Self::new(registry, pdx_type, blob, ReaderState::Known)
    }

    /// Reads a blob written with another version of the local schema.
    pub(crate) fn merging(
        registry: &'a Arc<TypeRegistry>,
        local: Arc<PdxType>,
        remote: Arc<PdxType>,
        blob: &'a [u8],
    ) -> Result<Self> {
        let maps = registry.field_maps(&local, &remote);
        Self::new(registry, remote, blob, ReaderState::Merging { local, maps })
    }

    /// Reads a blob while recording which fields the local class reads.
    pub(crate) fn collecting(
        registry: &'a Arc<TypeRegistry>,
        remote: Arc<PdxType>,
        blob: &'a [u8],
    ) -> Result<Self> {
        let collected = if remote.no_java_class() {
            PdxType::without_java_class(remote.class_name())
        } else {
            PdxType::new(remote.class_name())
        };
        Self::new(registry, remote, blob, ReaderState::Collecting(collected))
    }

    fn new(
        registry: &'a Arc<TypeRegistry>,
        remote: Arc<PdxType>,
        blob: &'a [u8],
        state: ReaderState,
    ) -> Result<Self> {
        let layout = BlobLayout::new(&remote, blob.len())?;
        let input = ObjectDataInput::new(&blob[..layout.serialized_len]);
        Ok(Self {
            registry,
            blob,
            input,
            remote,
            layout,
            state,
            unread_taken: false,
        })
    }

    /// How this reader maps local fields onto the blob.
    pub fn mode(&self) -> Mode {
        match self.state {
            ReaderState::Known => Mode::KnownSchema,
            ReaderState::Merging { .. } => Mode::MergingRemote,
            ReaderState::Collecting(_) => Mode::CollectingSchema,
        }
    }

    /// Class the blob was written for.
    pub fn class_name(&self) -> &str {
        self.remote.class_name()
    }

    /// The type the blob was written with.
    pub fn pdx_type(&self) -> &Arc<PdxType> {
        &self.remote
    }

    /// Returns `true` if the blob carries `name`.
    pub fn has_field(&self, name: &str) -> bool {
        self.remote.has_field(name)
    }

    /// Returns `true` if `name` is an identity field of the blob's type.
    pub fn is_identity_field(&self, name: &str) -> bool {
        self.remote
            .field(name)
            .map_or(false, |f| f.is_identity())
    }

    /// The registry this reader resolves types and enums through.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        self.registry
    }

    /// Resolves `name` to a field index of the blob's type, or `None` when
    /// the blob does not carry it.
    fn locate(&mut self, name: &str, kind: PdxFieldKind) -> Result<Option<usize>> {
        let index = match &mut self.state {
            ReaderState::Known => Some(self.remote.field_index(name).ok_or_else(|| {
                PdxError::ProtocolViolation(format!(
                    "field '{}' is not declared by {}",
                    name,
                    self.remote.class_name()
                ))
            })?),
            ReaderState::Merging { local, maps } => {
                let li = local.field_index(name).ok_or_else(|| {
                    PdxError::ProtocolViolation(format!(
                        "field '{}' is not declared by the local {}",
                        name,
                        local.class_name()
                    ))
                })?;
                let declared = local.fields()[li].kind();
                if declared != kind {
                    return Err(kind_mismatch(name, declared, kind));
                }
                match maps.local_to_remote[li] {
                    -2 => Some(li),
                    -1 => None,
                    ri => Some(ri as usize),
                }
            }
            ReaderState::Collecting(collected) => {
                match collected.field(name) {
                    Some(seen) if seen.kind() != kind => {
                        return Err(kind_mismatch(name, seen.kind(), kind))
                    }
                    Some(_) => {}
                    None => collected.add_field(name, kind)?,
                }
                self.remote.field_index(name)
            }
        };
        if let Some(ri) = index {
            let wire = self.remote.fields()[ri].kind();
            if wire != kind {
                return Err(kind_mismatch(name, wire, kind));
            }
        }
        Ok(index)
    }

    fn read_value<T, F>(&mut self, name: &str, kind: PdxFieldKind, default: T, decode: F) -> Result<T>
    where
        F: FnOnce(&mut ObjectDataInput<'a>, &Arc<TypeRegistry>) -> Result<T>,
    {
        let Some(index) = self.locate(name, kind)? else {
            return Ok(default);
        };
        let (start, end) = self.layout.field_range(&self.remote, index, self.blob)?;
        if self.input.position() != start {
            trace!(field = name, from = self.input.position(), to = start, "seeking pdx field");
            self.input.seek(start)?;
        }
        let value = decode(&mut self.input, self.registry)?;
        if self.input.position() > end {
            return Err(PdxError::Serialization(format!(
                "field '{}' of {} overran its {} bytes",
                name,
                self.remote.class_name(),
                end - start
            )));
        }
        Ok(value)
    }

    /// Reads a boolean field.
    pub fn read_bool(&mut self, name: &str) -> Result<bool> {
        self.read_value(name, PdxFieldKind::Boolean, false, |input, _| input.read_bool())
    }

    /// Reads a byte field.
    pub fn read_byte(&mut self, name: &str) -> Result<i8> {
        self.read_value(name, PdxFieldKind::Byte, 0, |input, _| input.read_byte())
    }

    /// Reads a char field as one UTF-16 unit.
    pub fn read_char(&mut self, name: &str) -> Result<u16> {
        self.read_value(name, PdxFieldKind::Char, 0, |input, _| input.read_char())
    }

    /// Reads a short field.
    pub fn read_short(&mut self, name: &str) -> Result<i16> {
        self.read_value(name, PdxFieldKind::Short, 0, |input, _| input.read_short())
    }

    /// Reads an int field.
    pub fn read_int(&mut self, name: &str) -> Result<i32> {
        self.read_value(name, PdxFieldKind::Int, 0, |input, _| input.read_int())
    }

    /// Reads a long field.
    pub fn read_long(&mut self, name: &str) -> Result<i64> {
        self.read_value(name, PdxFieldKind::Long, 0, |input, _| input.read_long())
    }

    /// Reads a float field.
    pub fn read_float(&mut self, name: &str) -> Result<f32> {
        self.read_value(name, PdxFieldKind::Float, 0.0, |input, _| input.read_float())
    }

    /// Reads a double field.
    pub fn read_double(&mut self, name: &str) -> Result<f64> {
        self.read_value(name, PdxFieldKind::Double, 0.0, |input, _| input.read_double())
    }

    /// Reads a date as epoch milliseconds; `-1` reads as `None`.
    pub fn read_date(&mut self, name: &str) -> Result<Option<i64>> {
        self.read_value(name, PdxFieldKind::Date, None, |input, _| {
            let millis = input.read_long()?;
            Ok((millis != -1).then_some(millis))
        })
    }

    /// Reads a string field.
    pub fn read_string(&mut self, name: &str) -> Result<Option<String>> {
        self.read_value(name, PdxFieldKind::String, None, |input, _| input.read_string())
    }

    /// Reads an object field.
    pub fn read_object(&mut self, name: &str) -> Result<Cacheable> {
        self.read_value(name, PdxFieldKind::Object, Cacheable::Null, |input, registry| {
            Cacheable::read_from(input, registry)
        })
    }

    /// Reads a nested PDX object into a fresh `P`.
    pub fn read_pdx<P>(&mut self, name: &str) -> Result<Option<P>>
    where
        P: PdxSerializable + Default,
    {
        self.read_value(name, PdxFieldKind::Object, None, |input, registry| {
            match DsCode::from_u8(input.read_u8()?)? {
                DsCode::NullObj => Ok(None),
                DsCode::Pdx => {
                    let mut obj = P::default();
                    serializer::read_object_body(registry, input, &mut obj)?;
                    Ok(Some(obj))
                }
                other => Err(PdxError::ProtocolViolation(format!(
                    "field '{}' holds DSCode {:?}, not a pdx object",
                    name, other
                ))),
            }
        })
    }

    /// Reads a boolean array field.
    pub fn read_bool_array(&mut self, name: &str) -> Result<Option<Vec<bool>>> {
        self.read_value(name, PdxFieldKind::BooleanArray, None, |input, _| {
            input.read_bool_array()
        })
    }

    /// Reads a char array field.
    pub fn read_char_array(&mut self, name: &str) -> Result<Option<Vec<u16>>> {
        self.read_value(name, PdxFieldKind::CharArray, None, |input, _| {
            input.read_char_array()
        })
    }

    /// Reads a byte array field.
    pub fn read_byte_array(&mut self, name: &str) -> Result<Option<Vec<i8>>> {
        self.read_value(name, PdxFieldKind::ByteArray, None, |input, _| {
            input.read_byte_array()
        })
    }

    /// Reads a short array field.
    pub fn read_short_array(&mut self, name: &str) -> Result<Option<Vec<i16>>> {
        self.read_value(name, PdxFieldKind::ShortArray, None, |input, _| {
            input.read_short_array()
        })
    }

    /// Reads an int array field.
    pub fn read_int_array(&mut self, name: &str) -> Result<Option<Vec<i32>>> {
        self.read_value(name, PdxFieldKind::IntArray, None, |input, _| {
            input.read_int_array()
        })
    }

    /// Reads a long array field.
    pub fn read_long_array(&mut self, name: &str) -> Result<Option<Vec<i64>>> {
        self.read_value(name, PdxFieldKind::LongArray, None, |input, _| {
            input.read_long_array()
        })
    }

    /// Reads a float array field.
    pub fn read_float_array(&mut self, name: &str) -> Result<Option<Vec<f32>>> {
        self.read_value(name, PdxFieldKind::FloatArray, None, |input, _| {
            input.read_float_array()
        })
    }

    /// Reads a double array field.
    pub fn read_double_array(&mut self, name: &str) -> Result<Option<Vec<f64>>> {
        self.read_value(name, PdxFieldKind::DoubleArray, None, |input, _| {
            input.read_double_array()
        })
    }

    /// Reads a string array field.
    pub fn read_string_array(&mut self, name: &str) -> Result<Option<Vec<Option<String>>>> {
        self.read_value(name, PdxFieldKind::StringArray, None, |input, _| {
            input.read_string_array()
        })
    }

    /// Reads an object array field.
    pub fn read_object_array(&mut self, name: &str) -> Result<Option<Vec<Cacheable>>> {
        self.read_value(name, PdxFieldKind::ObjectArray, None, |input, registry| {
            read_object_array_body(input, registry)
        })
    }

    /// Reads an array of byte arrays.
    pub fn read_array_of_byte_arrays(&mut self, name: &str) -> Result<Option<Vec<Option<Vec<i8>>>>> {
        self.read_value(name, PdxFieldKind::ArrayOfByteArrays, None, |input, _| {
            input.read_array_of_byte_arrays()
        })
    }

    /// Reads a field of `kind` as a dynamically typed value.
    pub fn read_field(&mut self, name: &str, kind: PdxFieldKind) -> Result<PdxFieldValue> {
        self.read_value(name, kind, PdxFieldValue::default_for(kind), |input, registry| {
            PdxFieldValue::decode(kind, input, registry)
        })
    }

    /// Hands the fields only a newer version of the class knows to the
    /// object, which then writes them back through
    /// [`PdxWriter::write_unread_fields`](super::PdxWriter::write_unread_fields).
    ///
    /// Returns `None` when there is nothing to keep or unread fields are
    /// ignored. On the first read of a class the local schema is not known
    /// yet; those fields go to the preserved-data table instead.
    pub fn read_unread_fields(&mut self) -> Result<Option<PdxUnreadFields>> {
        let local = match &self.state {
            ReaderState::Merging { local, .. } => Arc::clone(local),
            ReaderState::Known | ReaderState::Collecting(_) => return Ok(None),
        };
        self.unread_taken = true;
        Ok(self
            .extract_preserved_data(&local)?
            .map(|data| PdxUnreadFields(Arc::new(data))))
    }

    /// Copies out the bytes of every blob field `local` does not declare,
    /// keyed by the merged type of the two versions.
    fn extract_preserved_data(&self, local: &Arc<PdxType>) -> Result<Option<PreservedData>> {
        if self.registry.config().ignore_unread_fields() {
            return Ok(None);
        }
        let maps = self.registry.field_maps(local, &self.remote);
        if !maps.has_remote_only_fields() {
            return Ok(None);
        }
        let merged =
            self.registry
                .get_or_create_merged_type(self.remote.type_id(), local, &self.remote)?;
        let mut fields = Vec::new();
        for (ri, &li) in maps.remote_to_local.iter().enumerate() {
            if li < 0 {
                let (start, end) = self.layout.field_range(&self.remote, ri, self.blob)?;
                fields.push(Bytes::copy_from_slice(&self.blob[start..end]));
            }
        }
        Ok(Some(PreservedData::new(merged.type_id(), fields)))
    }

    /// Completes the read.
    ///
    /// A collected schema becomes the local type of the class. Returns the
    /// data to preserve for the object, unless it took its unread fields
    /// itself.
    pub(crate) fn finish(self) -> Result<Option<Arc<PreservedData>>> {
        let local = match &self.state {
            ReaderState::Known => return Ok(None),
            ReaderState::Merging { local, .. } => Arc::clone(local),
            ReaderState::Collecting(collected) => {
                if collected.same_shape(&self.remote) {
                    self.registry.add_local_type(&self.remote);
                    return Ok(None);
                }
                let registered = self.registry.get_or_register_type(collected.clone())?;
                self.registry.add_local_type(&registered)
            }
        };
        if self.unread_taken {
            return Ok(None);
        }
        Ok(self.extract_preserved_data(&local)?.map(Arc::new))
    }
}

fn kind_mismatch(name: &str, declared: PdxFieldKind, requested: PdxFieldKind) -> PdxError {
    PdxError::ProtocolViolation(format!(
        "field '{}' is {} but was read as {}",
        name, declared, requested
    ))
}
