//! Field-level access to PDX objects without their domain class.

use super::field_type::PdxFieldKind;
use super::field_value::PdxFieldValue;
use super::layout::{BlobLayout, PDX_HEADER_SIZE};
use super::pdx_type::PdxType;
use super::registry::TypeRegistry;
use super::serializer;
use super::writer::PdxWriter;
use super::PdxSerializable;
use crate::error::{PdxError, Result};
use crate::serialization::cacheable::Cacheable;
use crate::serialization::java_hash::byte_buffer_hash;
use crate::serialization::{DataOutput, DsCode, ObjectDataInput, ObjectDataOutput};
use bytes::Bytes;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// A PDX object kept in serialized form.
///
/// Fields decode on demand. Equality and hashing consider only identity
/// fields, or every field when the type marks none.
#[derive(Clone)]
pub struct PdxInstance {
    registry: Arc<TypeRegistry>,
    pdx_type: Arc<PdxType>,
    blob: Bytes,
}

impl PdxInstance {
    pub(crate) fn from_parts(registry: Arc<TypeRegistry>, pdx_type: Arc<PdxType>, blob: Bytes) -> Self {
        Self {
            registry,
            pdx_type,
            blob,
        }
    }

    /// Reads an instance; the `PDX` DSCode must already be consumed.
    pub fn read_from(input: &mut ObjectDataInput<'_>, registry: &Arc<TypeRegistry>) -> Result<Self> {
        let (type_id, blob) = serializer::read_blob(input)?;
        let pdx_type = registry.get_type_by_id(type_id)?;
        BlobLayout::new(&pdx_type, blob.len())?;
        Ok(Self::from_parts(
            Arc::clone(registry),
            pdx_type,
            Bytes::copy_from_slice(blob),
        ))
    }

    /// Writes the DSCode, header and blob.
    pub fn write_to(&self, output: &mut ObjectDataOutput) -> Result<()> {
        let len = i32::try_from(self.blob.len()).map_err(|_| {
            PdxError::OutOfMemory(format!("pdx object of {} bytes exceeds i32::MAX", self.blob.len()))
        })?;
        output.write_byte(DsCode::Pdx.as_byte())?;
        output.write_int(len)?;
        output.write_int(self.pdx_type.type_id())?;
        output.write_bytes(&self.blob)
    }

    /// Class name of the object.
    pub fn class_name(&self) -> &str {
        self.pdx_type.class_name()
    }

    /// The type the object was written with.
    pub fn pdx_type(&self) -> &Arc<PdxType> {
        &self.pdx_type
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> Vec<&str> {
        self.pdx_type.field_names().collect()
    }

    /// Returns `true` if the object has a field called `name`.
    pub fn has_field(&self, name: &str) -> bool {
        self.pdx_type.has_field(name)
    }

    /// Returns `true` if `name` is an identity field.
    pub fn is_identity_field(&self, name: &str) -> bool {
        self.pdx_type
            .sorted_identity_fields()
            .into_iter()
            .any(|i| self.pdx_type.fields()[i].name() == name)
    }

    /// Decodes field `name`.
    pub fn get_field(&self, name: &str) -> Result<PdxFieldValue> {
        let index = self.index_of(name)?;
        self.decode_at(index)
    }

    /// The encoded bytes of field `name`.
    pub fn raw_field(&self, name: &str) -> Result<&[u8]> {
        let index = self.index_of(name)?;
        self.raw_at(index)
    }

    /// Materializes the object as `T`, which must be of the same class.
    pub fn to_object<T>(&self) -> Result<T>
    where
        T: PdxSerializable + Default,
    {
        let mut obj = T::default();
        serializer::read_object_into(
            &self.registry,
            Arc::clone(&self.pdx_type),
            &self.blob,
            &mut obj,
        )?;
        Ok(obj)
    }

    /// Starts a modified copy of this instance.
    pub fn create_writer(&self) -> WritablePdxInstance {
        WritablePdxInstance {
            base: self.clone(),
            modified: HashMap::new(),
        }
    }

    /// Hash over the non-default identity fields, as the JVM computes it.
    pub fn hash_code(&self) -> i32 {
        let mut hash = 1i32;
        for index in self.pdx_type.sorted_identity_fields() {
            let kind = self.pdx_type.fields()[index].kind();
            let Ok(raw) = self.raw_at(index) else {
                continue;
            };
            if raw == kind.default_bytes() {
                continue;
            }
            let field_hash = match kind {
                PdxFieldKind::Object | PdxFieldKind::ObjectArray => match self.decode_at(index) {
                    Ok(PdxFieldValue::Object(v)) => v.java_hash_code(),
                    Ok(PdxFieldValue::ObjectArray(Some(v))) => Cacheable::ObjectArray(v).java_hash_code(),
                    _ => byte_buffer_hash(raw),
                },
                _ => byte_buffer_hash(raw),
            };
            hash = hash.wrapping_mul(31).wrapping_add(field_hash);
        }
        hash
    }

    fn index_of(&self, name: &str) -> Result<usize> {
        self.pdx_type.field_index(name).ok_or_else(|| {
            PdxError::ProtocolViolation(format!(
                "{} has no field '{}'",
                self.pdx_type.class_name(),
                name
            ))
        })
    }

    fn raw_at(&self, index: usize) -> Result<&[u8]> {
        let layout = BlobLayout::new(&self.pdx_type, self.blob.len())?;
        let (start, end) = layout.field_range(&self.pdx_type, index, &self.blob)?;
        Ok(&self.blob[start..end])
    }

    fn decode_at(&self, index: usize) -> Result<PdxFieldValue> {
        let kind = self.pdx_type.fields()[index].kind();
        let mut input = ObjectDataInput::new(self.raw_at(index)?);
        PdxFieldValue::decode(kind, &mut input, &self.registry)
    }

    fn identity_entry(&self, name: &str) -> Option<(usize, PdxFieldKind)> {
        let index = self.pdx_type.field_index(name)?;
        Some((index, self.pdx_type.fields()[index].kind()))
    }

    fn identity_names(&self) -> impl Iterator<Item = &str> {
        self.pdx_type
            .sorted_identity_fields()
            .into_iter()
            .map(|i| self.pdx_type.fields()[i].name())
    }

    fn field_equals(&self, other: &PdxInstance, name: &str) -> Result<bool> {
        match (self.identity_entry(name), other.identity_entry(name)) {
            (Some((a, kind_a)), Some((b, kind_b))) => {
                if kind_a != kind_b {
                    return Ok(false);
                }
                if matches!(kind_a, PdxFieldKind::Object | PdxFieldKind::ObjectArray) {
                    Ok(self.decode_at(a)? == other.decode_at(b)?)
                } else {
                    Ok(self.raw_at(a)? == other.raw_at(b)?)
                }
            }
            (Some((a, kind)), None) => Ok(self.raw_at(a)? == kind.default_bytes()),
            (None, Some((b, kind))) => Ok(other.raw_at(b)? == kind.default_bytes()),
            (None, None) => Ok(true),
        }
    }
}

impl PartialEq for PdxInstance {
    fn eq(&self, other: &Self) -> bool {
        if self.class_name() != other.class_name() {
            return false;
        }
        let names: BTreeSet<&str> = self.identity_names().chain(other.identity_names()).collect();
        names
            .into_iter()
            .all(|name| self.field_equals(other, name).unwrap_or(false))
    }
}

impl fmt::Debug for PdxInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("PdxInstance");
        s.field("class", &self.class_name())
            .field("type_id", &self.pdx_type.type_id());
        for (index, field) in self.pdx_type.fields().iter().enumerate() {
            match self.decode_at(index) {
                Ok(value) => s.field(field.name(), &value),
                Err(_) => s.field(field.name(), &"<malformed>"),
            };
        }
        s.finish()
    }
}

/// A copy of a [`PdxInstance`] with some fields replaced.
#[derive(Debug, Clone)]
pub struct WritablePdxInstance {
    base: PdxInstance,
    modified: HashMap<String, PdxFieldValue>,
}

impl WritablePdxInstance {
    /// Replaces field `name`, which must keep its declared kind.
    pub fn set_field(&mut self, name: &str, value: PdxFieldValue) -> Result<&mut Self> {
        let field = self.base.pdx_type.field(name).ok_or_else(|| {
            PdxError::ProtocolViolation(format!(
                "{} has no field '{}'",
                self.base.class_name(),
                name
            ))
        })?;
        if field.kind() != value.kind() {
            return Err(PdxError::ProtocolViolation(format!(
                "field '{}' is {} and cannot hold a {} value",
                name,
                field.kind(),
                value.kind()
            )));
        }
        self.modified.insert(name.to_string(), value);
        Ok(self)
    }

    /// Current value of field `name`, including modifications.
    pub fn get_field(&self, name: &str) -> Result<PdxFieldValue> {
        match self.modified.get(name) {
            Some(value) => Ok(value.clone()),
            None => self.base.get_field(name),
        }
    }

    /// Re-encodes the instance with the modifications applied.
    pub fn to_instance(&self) -> Result<PdxInstance> {
        if self.modified.is_empty() {
            return Ok(self.base.clone());
        }
        let base = &self.base;
        let mut output = ObjectDataOutput::with_capacity(base.blob.len() + PDX_HEADER_SIZE)?;
        let mut writer = PdxWriter::known(&base.registry, &mut output, Arc::clone(&base.pdx_type))?;
        for (index, field) in base.pdx_type.fields().iter().enumerate() {
            match self.modified.get(field.name()) {
                Some(value) => writer.write_field(field.name(), value)?,
                None => writer.write_raw_field(field.name(), field.kind(), base.raw_at(index)?)?,
            }
        }
        writer.finish()?;
        let blob = Bytes::from(output.into_bytes()).slice(PDX_HEADER_SIZE..);
        Ok(PdxInstance::from_parts(
            Arc::clone(&base.registry),
            Arc::clone(&base.pdx_type),
            blob,
        ))
    }
}

/// Builds a [`PdxInstance`] field by field, without a domain class.
#[derive(Debug)]
pub struct PdxInstanceFactory {
    registry: Arc<TypeRegistry>,
    pdx_type: PdxType,
    values: Vec<PdxFieldValue>,
    created: bool,
}

impl PdxInstanceFactory {
    /// Starts an instance of `class_name`.
    ///
    /// With `expect_domain_class` unset, JVM peers will not try to load the
    /// class when they deserialize the result.
    pub fn new(registry: Arc<TypeRegistry>, class_name: impl Into<String>, expect_domain_class: bool) -> Self {
        let pdx_type = if expect_domain_class {
            PdxType::new(class_name)
        } else {
            PdxType::without_java_class(class_name)
        };
        Self {
            registry,
            pdx_type,
            values: Vec::new(),
            created: false,
        }
    }

    /// Appends a field.
    pub fn write_field(&mut self, name: &str, value: PdxFieldValue) -> Result<&mut Self> {
        self.check_open()?;
        self.pdx_type.add_field(name, value.kind())?;
        self.values.push(value);
        Ok(self)
    }

    /// Appends a boolean field.
    pub fn write_bool(&mut self, name: &str, value: bool) -> Result<&mut Self> {
        self.write_field(name, PdxFieldValue::Boolean(value))
    }

    /// Appends an int field.
    pub fn write_int(&mut self, name: &str, value: i32) -> Result<&mut Self> {
        self.write_field(name, PdxFieldValue::Int(value))
    }

    /// Appends a long field.
    pub fn write_long(&mut self, name: &str, value: i64) -> Result<&mut Self> {
        self.write_field(name, PdxFieldValue::Long(value))
    }

    /// Appends a double field.
    pub fn write_double(&mut self, name: &str, value: f64) -> Result<&mut Self> {
        self.write_field(name, PdxFieldValue::Double(value))
    }

    /// Appends a string field.
    pub fn write_string(&mut self, name: &str, value: Option<&str>) -> Result<&mut Self> {
        self.write_field(name, PdxFieldValue::String(value.map(str::to_string)))
    }

    /// Appends an object field.
    pub fn write_object(&mut self, name: &str, value: impl Into<Cacheable>) -> Result<&mut Self> {
        self.write_field(name, PdxFieldValue::Object(value.into()))
    }

    /// Marks an appended field as part of the identity.
    pub fn mark_identity_field(&mut self, name: &str) -> Result<&mut Self> {
        self.check_open()?;
        self.pdx_type.set_identity_field(name)?;
        Ok(self)
    }

    /// Encodes the fields, registering the resulting type.
    ///
    /// The type does not become the local type of the class. A factory
    /// creates one instance only.
    pub fn create(&mut self) -> Result<PdxInstance> {
        self.check_open()?;
        self.created = true;
        let seed = if self.pdx_type.no_java_class() {
            PdxType::without_java_class(self.pdx_type.class_name())
        } else {
            PdxType::new(self.pdx_type.class_name())
        };
        let mut output = ObjectDataOutput::new();
        let mut writer = PdxWriter::collecting(&self.registry, &mut output, seed)?;
        for (field, value) in self.pdx_type.fields().iter().zip(&self.values) {
            writer.write_field(field.name(), value)?;
            if field.is_identity() {
                writer.mark_identity_field(field.name())?;
            }
        }
        let pdx_type = writer.finish()?;
        let blob = Bytes::from(output.into_bytes()).slice(PDX_HEADER_SIZE..);
        Ok(PdxInstance::from_parts(Arc::clone(&self.registry), pdx_type, blob))
    }

    fn check_open(&self) -> Result<()> {
        if self.created {
            return Err(PdxError::ProtocolViolation(format!(
                "instance of {} already created",
                self.pdx_type.class_name()
            )));
        }
        Ok(())
    }
}
