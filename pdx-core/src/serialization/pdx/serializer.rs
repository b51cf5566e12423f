//! Entry points that turn domain objects into PDX bytes and back.

use super::instance::PdxInstance;
use super::pdx_type::PdxType;
use super::preserved::{PreservedData, PreservedHandle};
use super::reader::PdxReader;
use super::registry::TypeRegistry;
use super::writer::PdxWriter;
use super::{Mode, PdxSerializable};
use crate::error::{PdxError, Result};
use crate::serialization::{DataInput, DataOutput, DsCode, ObjectDataInput, ObjectDataOutput};
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

type Factory = Arc<dyn Fn() -> Box<dyn PdxSerializable> + Send + Sync>;

/// Writes `obj` as DSCode `PDX` followed by its blob.
///
/// The first write of a class collects its schema and makes it the local
/// type. Objects holding preserved data from a newer version are written
/// with the merged type so those fields survive.
pub(crate) fn write_object(
    registry: &Arc<TypeRegistry>,
    output: &mut ObjectDataOutput,
    obj: &dyn PdxSerializable,
) -> Result<()> {
    output.write_byte(DsCode::Pdx.as_byte())?;
    let class_name = obj.class_name();
    let preserved = if registry.config().ignore_unread_fields() {
        None
    } else {
        obj.preserved_handle()
            .and_then(|handle| registry.preserved().get(handle))
    };
    let mut writer = match (registry.local_type(class_name), preserved) {
        (None, _) => PdxWriter::collecting(registry, output, PdxType::new(class_name))?,
        (Some(local), Some(data)) => {
            let merged = registry.get_type_by_id(data.merged_type_id())?;
            PdxWriter::merging(registry, output, &local, merged, data)?
        }
        (Some(local), None) => PdxWriter::known(registry, output, local)?,
    };
    obj.to_data(&mut writer)?;
    let written = writer.finish()?;
    if writer.mode() == Mode::CollectingSchema {
        registry.add_local_type(&written);
    }
    Ok(())
}

/// Reads the `length` and `type id` header and returns the blob after it.
pub(crate) fn read_blob<'b>(input: &mut ObjectDataInput<'b>) -> Result<(i32, &'b [u8])> {
    let len = input.read_int()?;
    let type_id = input.read_int()?;
    let len = usize::try_from(len)
        .map_err(|_| PdxError::Serialization(format!("negative pdx length {}", len)))?;
    Ok((type_id, input.read_slice(len)?))
}

/// Reads a PDX object into `obj`, the DSCode already consumed.
pub(crate) fn read_object_body(
    registry: &Arc<TypeRegistry>,
    input: &mut ObjectDataInput<'_>,
    obj: &mut dyn PdxSerializable,
) -> Result<()> {
    let (type_id, blob) = read_blob(input)?;
    let remote = registry.get_type_by_id(type_id)?;
    read_object_into(registry, remote, blob, obj)
}

/// Runs `obj.from_data` over `blob` and stores whatever the local class did
/// not read under the object's preserved-data handle.
pub(crate) fn read_object_into(
    registry: &Arc<TypeRegistry>,
    remote: Arc<PdxType>,
    blob: &[u8],
    obj: &mut dyn PdxSerializable,
) -> Result<()> {
    if remote.class_name() != obj.class_name() {
        return Err(PdxError::Serialization(format!(
            "blob of {} cannot be read into {}",
            remote.class_name(),
            obj.class_name()
        )));
    }
    let mut reader = match registry.local_type(remote.class_name()) {
        None => PdxReader::collecting(registry, remote, blob)?,
        Some(local) if local.type_id() == remote.type_id() || local.same_shape(&remote) => {
            PdxReader::known(registry, remote, blob)?
        }
        Some(local) => PdxReader::merging(registry, local, remote, blob)?,
    };
    obj.from_data(&mut reader)?;
    let Some(data) = reader.finish()? else {
        // Nothing left unread, so data kept from an earlier read is stale.
        if let Some(handle) = obj.preserved_handle() {
            registry.preserved().remove(handle);
        }
        return Ok(());
    };
    let handle = match obj.preserved_handle() {
        Some(handle) => handle,
        None => {
            obj.set_preserved_handle(PreservedHandle::new());
            match obj.preserved_handle() {
                Some(handle) => handle,
                None => {
                    trace!(
                        class = obj.class_name(),
                        fields = data.fields().len(),
                        "object keeps no preserved-data handle, dropping unread fields"
                    );
                    return Ok(());
                }
            }
        }
    };
    registry.preserved().set(handle, data);
    Ok(())
}

/// The result of deserializing a PDX value.
pub enum PdxValue {
    /// An instance of a registered domain class.
    Domain(Box<dyn PdxSerializable>),
    /// The raw fields, for classes without a registered constructor or when
    /// `read_serialized` is set.
    Instance(PdxInstance),
}

impl PdxValue {
    /// Class name of the value.
    pub fn class_name(&self) -> &str {
        match self {
            PdxValue::Domain(obj) => obj.class_name(),
            PdxValue::Instance(instance) => instance.class_name(),
        }
    }

    /// Returns the instance, if the value was not materialized.
    pub fn into_instance(self) -> Option<PdxInstance> {
        match self {
            PdxValue::Instance(instance) => Some(instance),
            PdxValue::Domain(_) => None,
        }
    }
}

impl fmt::Debug for PdxValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PdxValue::Domain(obj) => f.debug_tuple("Domain").field(&obj.class_name()).finish(),
            PdxValue::Instance(instance) => f.debug_tuple("Instance").field(instance).finish(),
        }
    }
}

/// Serializes domain objects and [`PdxInstance`]s through a shared
/// [`TypeRegistry`].
pub struct PdxSerializer {
    registry: Arc<TypeRegistry>,
    factories: HashMap<String, Factory>,
}

impl fmt::Debug for PdxSerializer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdxSerializer")
            .field("registry", &self.registry)
            .field("classes", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl PdxSerializer {
    /// Creates a serializer over `registry`.
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self {
            registry,
            factories: HashMap::new(),
        }
    }

    /// Registers `T` so blobs of its class deserialize as `T`.
    pub fn register<T>(&mut self)
    where
        T: PdxSerializable + Default + 'static,
    {
        let class_name = T::default().class_name().to_string();
        debug!(class = %class_name, "registered pdx class");
        self.factories.insert(
            class_name,
            Arc::new(|| Box::new(T::default()) as Box<dyn PdxSerializable>),
        );
    }

    /// Returns `true` if a constructor is registered for `class_name`.
    pub fn is_registered(&self, class_name: &str) -> bool {
        self.factories.contains_key(class_name)
    }

    /// The registry shared by everything this serializer writes.
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Serializes a domain object.
    pub fn serialize(&self, obj: &dyn PdxSerializable) -> Result<Vec<u8>> {
        let mut output = ObjectDataOutput::new();
        write_object(&self.registry, &mut output, obj)?;
        Ok(output.into_bytes())
    }

    /// Serializes an instance exactly as it was read or built.
    pub fn serialize_instance(&self, instance: &PdxInstance) -> Result<Vec<u8>> {
        let mut output = ObjectDataOutput::new();
        instance.write_to(&mut output)?;
        Ok(output.into_bytes())
    }

    /// Deserializes a PDX value.
    ///
    /// Registered classes come back as [`PdxValue::Domain`] unless the
    /// registry is configured to read serialized.
    pub fn deserialize(&self, bytes: &[u8]) -> Result<PdxValue> {
        let mut input = ObjectDataInput::new(bytes);
        expect_pdx_code(&mut input)?;
        let (type_id, blob) = read_blob(&mut input)?;
        let remote = self.registry.get_type_by_id(type_id)?;
        let factory = if self.registry.config().read_serialized() {
            None
        } else {
            self.factories.get(remote.class_name())
        };
        match factory {
            Some(factory) => {
                let mut obj = factory();
                read_object_into(&self.registry, remote, blob, obj.as_mut())?;
                Ok(PdxValue::Domain(obj))
            }
            None => Ok(PdxValue::Instance(PdxInstance::from_parts(
                Arc::clone(&self.registry),
                remote,
                Bytes::copy_from_slice(blob),
            ))),
        }
    }

    /// Deserializes into a fresh `T`.
    pub fn deserialize_as<T>(&self, bytes: &[u8]) -> Result<T>
    where
        T: PdxSerializable + Default,
    {
        let mut obj = T::default();
        self.deserialize_into(bytes, &mut obj)?;
        Ok(obj)
    }

    /// Deserializes into an existing object of the blob's class.
    pub fn deserialize_into(&self, bytes: &[u8], obj: &mut dyn PdxSerializable) -> Result<()> {
        let mut input = ObjectDataInput::new(bytes);
        expect_pdx_code(&mut input)?;
        read_object_body(&self.registry, &mut input, obj)
    }

    /// Registers a type with the type service and returns its id.
    pub fn register_type(&self, pdx_type: PdxType) -> Result<i32> {
        self.registry.register_type(pdx_type)
    }

    /// Looks up a type by id.
    pub fn get_type(&self, type_id: i32) -> Result<Arc<PdxType>> {
        self.registry.get_type(type_id)
    }

    /// Data preserved for `handle`.
    pub fn get_preserved_data(&self, handle: PreservedHandle) -> Option<Arc<PreservedData>> {
        self.registry.preserved().get(handle)
    }

    /// Stores data for `handle`, restarting its expiry.
    pub fn set_preserved_data(&self, handle: PreservedHandle, data: Arc<PreservedData>) {
        self.registry.preserved().set(handle, data)
    }

    /// Drops the data preserved for `handle`.
    pub fn remove_preserved_data(&self, handle: PreservedHandle) -> Option<Arc<PreservedData>> {
        self.registry.preserved().remove(handle)
    }
}

fn expect_pdx_code(input: &mut ObjectDataInput<'_>) -> Result<()> {
    match DsCode::from_u8(input.read_u8()?)? {
        DsCode::Pdx => Ok(()),
        other => Err(PdxError::Serialization(format!(
            "expected a pdx object, found DSCode {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serialization::pdx::{InMemoryTypeService, PdxFieldKind, PdxReader, TypeService};

    #[derive(Debug, Default, PartialEq)]
    struct Order {
        id: i32,
        customer: Option<String>,
        total: f64,
        handle: Option<PreservedHandle>,
    }

    impl PdxSerializable for Order {
        fn class_name(&self) -> &str {
            "com.example.Order"
        }

        fn to_data(&self, writer: &mut PdxWriter<'_>) -> Result<()> {
            writer.write_int("id", self.id)?;
            writer.write_string("customer", self.customer.as_deref())?;
            writer.write_double("total", self.total)?;
            writer.mark_identity_field("id")
        }

        fn from_data(&mut self, reader: &mut PdxReader<'_>) -> Result<()> {
            self.id = reader.read_int("id")?;
            self.customer = reader.read_string("customer")?;
            self.total = reader.read_double("total")?;
            Ok(())
        }

        fn preserved_handle(&self) -> Option<PreservedHandle> {
            self.handle
        }

        fn set_preserved_handle(&mut self, handle: PreservedHandle) {
            self.handle = Some(handle);
        }
    }

    /// An older build of `Order` without `total`.
    #[derive(Debug, Default)]
    struct OrderV1 {
        id: i32,
        customer: Option<String>,
        handle: Option<PreservedHandle>,
    }

    impl PdxSerializable for OrderV1 {
        fn class_name(&self) -> &str {
            "com.example.Order"
        }

        fn to_data(&self, writer: &mut PdxWriter<'_>) -> Result<()> {
            writer.write_int("id", self.id)?;
            writer.write_string("customer", self.customer.as_deref())
        }

        fn from_data(&mut self, reader: &mut PdxReader<'_>) -> Result<()> {
            self.id = reader.read_int("id")?;
            self.customer = reader.read_string("customer")?;
            Ok(())
        }

        fn preserved_handle(&self) -> Option<PreservedHandle> {
            self.handle
        }

        fn set_preserved_handle(&mut self, handle: PreservedHandle) {
            self.handle = Some(handle);
        }
    }

    fn serializer_over(service: &Arc<InMemoryTypeService>) -> PdxSerializer {
        let service: Arc<dyn TypeService> = Arc::clone(service) as Arc<dyn TypeService>;
        PdxSerializer::new(Arc::new(TypeRegistry::new(service).unwrap()))
    }

    #[test]
    fn test_round_trip_registers_local_type() {
        let service = Arc::new(InMemoryTypeService::new());
        let mut serializer = serializer_over(&service);
        serializer.register::<Order>();
        let order = Order {
            id: 7,
            customer: Some("acme".to_string()),
            total: 12.5,
            handle: None,
        };
        let bytes = serializer.serialize(&order).unwrap();
        assert_eq!(bytes[0], DsCode::Pdx.code());
        let local = serializer.registry().local_type("com.example.Order").unwrap();
        assert!(local.is_local());
        assert!(local.field("id").unwrap().is_identity());

        let back: Order = serializer.deserialize_as(&bytes).unwrap();
        assert_eq!(back, order);
        assert_eq!(service.round_trips(), 1);
    }

    #[test]
    fn test_unregistered_class_reads_as_instance() {
        let service = Arc::new(InMemoryTypeService::new());
        let serializer = serializer_over(&service);
        let bytes = serializer
            .serialize(&Order {
                id: 3,
                ..Default::default()
            })
            .unwrap();
        let instance = serializer.deserialize(&bytes).unwrap().into_instance().unwrap();
        assert_eq!(instance.class_name(), "com.example.Order");
        assert_eq!(
            instance.get_field("id").unwrap(),
            crate::serialization::pdx::PdxFieldValue::Int(3)
        );
        assert_eq!(serializer.serialize_instance(&instance).unwrap(), bytes);
    }

    #[test]
    fn test_older_version_preserves_newer_fields() {
        let service = Arc::new(InMemoryTypeService::new());
        let newer = serializer_over(&service);
        let older = serializer_over(&service);
        let original = Order {
            id: 1,
            customer: Some("acme".to_string()),
            total: 99.0,
            handle: None,
        };
        let bytes = newer.serialize(&original).unwrap();

        let v1: OrderV1 = older.deserialize_as(&bytes).unwrap();
        assert_eq!(v1.id, 1);
        let handle = v1.handle.unwrap();
        assert_eq!(older.get_preserved_data(handle).unwrap().fields().len(), 1);

        let rewritten = older.serialize(&v1).unwrap();
        assert_eq!(rewritten, bytes);
        let back: Order = newer.deserialize_as(&rewritten).unwrap();
        assert_eq!(back.total, 99.0);
    }

    #[test]
    fn test_rereading_local_shape_clears_stale_preserved_data() {
        let service = Arc::new(InMemoryTypeService::new());
        let newer = serializer_over(&service);
        let older = serializer_over(&service);
        let wide = newer
            .serialize(&Order {
                id: 1,
                customer: Some("stale".to_string()),
                total: 42.0,
                handle: None,
            })
            .unwrap();

        let mut v1: OrderV1 = older.deserialize_as(&wide).unwrap();
        let handle = v1.handle.unwrap();
        assert!(older.get_preserved_data(handle).is_some());

        let narrow = older
            .serialize(&OrderV1 {
                id: 5,
                customer: None,
                handle: None,
            })
            .unwrap();
        older.deserialize_into(&narrow, &mut v1).unwrap();
        assert_eq!(v1.id, 5);
        assert_eq!(v1.handle, Some(handle));
        assert!(older.get_preserved_data(handle).is_none());

        assert_eq!(older.serialize(&v1).unwrap(), narrow);
    }

    #[test]
    fn test_ignore_unread_fields_drops_newer_fields() {
        let service = Arc::new(InMemoryTypeService::new());
        let newer = serializer_over(&service);
        let config = crate::PdxConfig::builder()
            .ignore_unread_fields(true)
            .build()
            .unwrap();
        let older = PdxSerializer::new(Arc::new(
            TypeRegistry::with_config(Arc::clone(&service) as Arc<dyn TypeService>, config)
                .unwrap(),
        ));
        let bytes = newer
            .serialize(&Order {
                id: 1,
                total: 5.0,
                ..Default::default()
            })
            .unwrap();
        let v1: OrderV1 = older.deserialize_as(&bytes).unwrap();
        assert!(v1.handle.is_none());
        assert!(older.registry().preserved().is_empty());
    }

    #[test]
    fn test_class_mismatch_is_rejected() {
        let service = Arc::new(InMemoryTypeService::new());
        let serializer = serializer_over(&service);
        let mut other = PdxType::new("com.example.Other");
        other.add_field("id", PdxFieldKind::Int).unwrap();
        let type_id = serializer.register_type(other).unwrap();
        let mut bytes = vec![DsCode::Pdx.code()];
        bytes.extend_from_slice(&4i32.to_be_bytes());
        bytes.extend_from_slice(&type_id.to_be_bytes());
        bytes.extend_from_slice(&[0, 0, 0, 1]);
        assert!(matches!(
            serializer.deserialize_as::<Order>(&bytes),
            Err(PdxError::Serialization(_))
        ));
    }

    #[test]
    fn test_non_pdx_code_is_rejected() {
        let service = Arc::new(InMemoryTypeService::new());
        let serializer = serializer_over(&service);
        assert!(matches!(
            serializer.deserialize(&[DsCode::NullObj.code()]),
            Err(PdxError::Serialization(_))
        ));
    }
}
