//! Portable Data eXchange: self-describing objects whose schemas live in a
//! cluster-wide type registry.
//!
//! A domain class implements [`PdxSerializable`] by writing its fields
//! through a [`PdxWriter`] and reading them back through a [`PdxReader`].
//! The first write of a class collects its schema; later writes reuse it.
//! Fields written by other versions of a class survive a read-modify-write
//! cycle through the preserved-data table.
//!
//! ```ignore
//! use pdx_core::{PdxReader, PdxSerializable, PdxWriter, Result};
//!
//! #[derive(Default)]
//! struct Account {
//!     id: i64,
//!     owner: Option<String>,
//! }
//!
//! impl PdxSerializable for Account {
//!     fn class_name(&self) -> &str {
//!         "com.example.Account"
//!     }
//!
//!     fn to_data(&self, writer: &mut PdxWriter<'_>) -> Result<()> {
//!         writer.write_long("id", self.id)?;
//!         writer.write_string("owner", self.owner.as_deref())?;
//!         writer.mark_identity_field("id")
//!     }
//!
//!     fn from_data(&mut self, reader: &mut PdxReader<'_>) -> Result<()> {
//!         self.id = reader.read_long("id")?;
//!         self.owner = reader.read_string("owner")?;
//!         Ok(())
//!     }
//! }
//! ```

mod enum_info;
mod field_codec;
mod field_type;
mod field_value;
mod instance;
mod layout;
mod pdx_type;
mod preserved;
mod reader;
mod registry;
mod serializer;
mod type_service;
mod writer;

pub use enum_info::EnumInfo;
pub use field_codec::PdxFieldCodec;
pub use field_type::{PdxFieldKind, PdxFieldType};
pub use field_value::PdxFieldValue;
pub use instance::{PdxInstance, PdxInstanceFactory, WritablePdxInstance};
pub use layout::{calculate_len_with_offsets, offset_width, BlobLayout, PDX_HEADER_SIZE};
pub use pdx_type::{FieldMaps, PdxType, JAVA_PDX_TYPE_CLASS};
pub use preserved::{PdxUnreadFields, PreservedData, PreservedDataTable, PreservedHandle};
pub use reader::PdxReader;
pub use registry::TypeRegistry;
pub use serializer::{PdxSerializer, PdxValue};
pub use type_service::{InMemoryTypeService, TypeService};
pub use writer::PdxWriter;

use crate::error::Result;

/// How a reader or writer relates the local class to the serialized schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// The schema is being built from the fields the class touches.
    CollectingSchema,
    /// The serialized schema is the local one.
    KnownSchema,
    /// The serialized schema is another version of the class.
    MergingRemote,
}

/// A domain class that serializes itself as a PDX object.
pub trait PdxSerializable {
    /// Fully qualified class name, as JVM peers know it.
    fn class_name(&self) -> &str;

    /// Writes every field, in the same order on every call.
    fn to_data(&self, writer: &mut PdxWriter<'_>) -> Result<()>;

    /// Reads fields by name; absent fields read as defaults.
    fn from_data(&mut self, reader: &mut PdxReader<'_>) -> Result<()>;

    /// Handle under which fields from other versions of the class are kept.
    fn preserved_handle(&self) -> Option<PreservedHandle> {
        None
    }

    /// Called on read when the object has fields to preserve but no handle.
    /// Objects that ignore the call lose those fields.
    fn set_preserved_handle(&mut self, _handle: PreservedHandle) {}
}
