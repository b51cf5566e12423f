//! Process-wide cache of PDX types and enum ids.
//!
//! Reads go through `ArcSwap` snapshots and never block. Every mutation,
//! including the type service round trip that precedes it, runs under a
//! single write lock and republishes a copied map, so concurrent first use of
//! a shape, id or enum costs exactly one round trip.

use super::enum_info::EnumInfo;
use super::pdx_type::{FieldMaps, PdxType};
use super::preserved::PreservedDataTable;
use super::type_service::TypeService;
use crate::config::PdxConfig;
use crate::error::Result;
use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::sync::Arc;
use tracing::debug;

type Map<K, V> = ArcSwap<HashMap<K, V>>;

fn publish<K, V>(map: &Map<K, V>, key: K, value: V)
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    let mut next = HashMap::clone(&map.load());
    next.insert(key, value);
    map.store(Arc::new(next));
}

/// Type and enum registry shared by every writer and reader of one cache.
pub struct TypeRegistry {
    service: Arc<dyn TypeService>,
    config: PdxConfig,
    write_lock: Mutex<()>,
    types_by_id: Map<i32, Arc<PdxType>>,
    local_types: Map<String, Arc<PdxType>>,
    shapes: ArcSwap<HashSet<Arc<PdxType>>>,
    merged_types: Map<i32, Arc<PdxType>>,
    field_maps: Map<(i32, i32), Arc<FieldMaps>>,
    enum_ids: Map<EnumInfo, i32>,
    enums: Map<i32, EnumInfo>,
    preserved: PreservedDataTable,
}

impl TypeRegistry {
    /// Creates a registry with the default configuration.
    pub fn new(service: Arc<dyn TypeService>) -> Result<Self> {
        Self::with_config(service, PdxConfig::default())
    }

    /// Creates a registry backed by `service`.
    ///
    /// Starts the preserved-data expiry thread.
    pub fn with_config(service: Arc<dyn TypeService>, config: PdxConfig) -> Result<Self> {
        let preserved = PreservedDataTable::new(config.preserved_data_expiry())?;
        Ok(Self {
            service,
            config,
            write_lock: Mutex::new(()),
            types_by_id: ArcSwap::from_pointee(HashMap::new()),
            local_types: ArcSwap::from_pointee(HashMap::new()),
            shapes: ArcSwap::from_pointee(HashSet::new()),
            merged_types: ArcSwap::from_pointee(HashMap::new()),
            field_maps: ArcSwap::from_pointee(HashMap::new()),
            enum_ids: ArcSwap::from_pointee(HashMap::new()),
            enums: ArcSwap::from_pointee(HashMap::new()),
            preserved,
        })
    }

    /// The configuration this registry was built with.
    pub fn config(&self) -> &PdxConfig {
        &self.config
    }

    /// The preserved-data table.
    pub fn preserved(&self) -> &PreservedDataTable {
        &self.preserved
    }

    /// Returns the registered type with the same shape as `pdx_type`,
    /// registering it with the type service on first sight.
    pub fn get_or_register_type(&self, pdx_type: PdxType) -> Result<Arc<PdxType>> {
        if let Some(existing) = self.shapes.load().get(&pdx_type) {
            return Ok(Arc::clone(existing));
        }
        let _guard = self.write_lock.lock();
        if let Some(existing) = self.shapes.load().get(&pdx_type) {
            return Ok(Arc::clone(existing));
        }
        self.register_locked(pdx_type)
    }

    /// Registers `pdx_type` and returns its id.
    pub fn register_type(&self, pdx_type: PdxType) -> Result<i32> {
        self.get_or_register_type(pdx_type).map(|t| t.type_id())
    }

    fn register_locked(&self, mut pdx_type: PdxType) -> Result<Arc<PdxType>> {
        let type_id = self.service.get_pdx_id_for_type(&pdx_type)?;
        debug!(
            class = pdx_type.class_name(),
            type_id,
            fields = pdx_type.field_count(),
            "registered pdx type"
        );
        pdx_type.set_type_id(type_id);
        let pdx_type = Arc::new(pdx_type);
        self.publish_type_locked(&pdx_type);
        Ok(pdx_type)
    }

    fn publish_type_locked(&self, pdx_type: &Arc<PdxType>) {
        publish(&self.types_by_id, pdx_type.type_id(), Arc::clone(pdx_type));
        if !self.shapes.load().contains(pdx_type.as_ref()) {
            let mut shapes = HashSet::clone(&self.shapes.load());
            shapes.insert(Arc::clone(pdx_type));
            self.shapes.store(Arc::new(shapes));
        }
    }

    /// Returns the type registered under `type_id`, fetching it from the
    /// type service on the first miss.
    pub fn get_type_by_id(&self, type_id: i32) -> Result<Arc<PdxType>> {
        if let Some(t) = self.types_by_id.load().get(&type_id) {
            return Ok(Arc::clone(t));
        }
        let _guard = self.write_lock.lock();
        if let Some(t) = self.types_by_id.load().get(&type_id) {
            return Ok(Arc::clone(t));
        }
        let mut fetched = self.service.get_pdx_type_by_id(type_id)?;
        debug!(class = fetched.class_name(), type_id, "fetched pdx type");
        fetched.set_type_id(type_id);
        let fetched = Arc::new(fetched);
        self.publish_type_locked(&fetched);
        Ok(fetched)
    }

    /// Alias for [`get_type_by_id`](Self::get_type_by_id).
    pub fn get_type(&self, type_id: i32) -> Result<Arc<PdxType>> {
        self.get_type_by_id(type_id)
    }

    /// Returns the cached type for `type_id` without contacting the service.
    pub fn cached_type(&self, type_id: i32) -> Option<Arc<PdxType>> {
        self.types_by_id.load().get(&type_id).cloned()
    }

    /// The type that describes the local definition of `class_name`.
    pub fn local_type(&self, class_name: &str) -> Option<Arc<PdxType>> {
        self.local_types.load().get(class_name).cloned()
    }

    /// Records `pdx_type` as the local definition of its class.
    ///
    /// The first local type recorded for a class wins.
    pub fn add_local_type(&self, pdx_type: &Arc<PdxType>) -> Arc<PdxType> {
        if let Some(existing) = self.local_type(pdx_type.class_name()) {
            return existing;
        }
        let _guard = self.write_lock.lock();
        if let Some(existing) = self.local_type(pdx_type.class_name()) {
            return existing;
        }
        let local = if pdx_type.is_local() {
            Arc::clone(pdx_type)
        } else {
            let mut copy = PdxType::clone(pdx_type);
            copy.set_local(true);
            Arc::new(copy)
        };
        publish(
            &self.local_types,
            local.class_name().to_string(),
            Arc::clone(&local),
        );
        local
    }

    /// Returns the union of `local` and the remote type `remote_id`.
    ///
    /// The union reuses `local` or `remote` when it has the same shape as
    /// either, and is registered as a new type otherwise.
    pub fn get_or_create_merged_type(
        &self,
        remote_id: i32,
        local: &Arc<PdxType>,
        remote: &Arc<PdxType>,
    ) -> Result<Arc<PdxType>> {
        if let Some(merged) = self.merged_types.load().get(&remote_id) {
            return Ok(Arc::clone(merged));
        }
        let _guard = self.write_lock.lock();
        if let Some(merged) = self.merged_types.load().get(&remote_id) {
            return Ok(Arc::clone(merged));
        }
        let union = local.merge_version(remote)?;
        let merged = if union.same_shape(local) {
            Arc::clone(local)
        } else if union.same_shape(remote) {
            Arc::clone(remote)
        } else if let Some(existing) = self.shapes.load().get(&union) {
            Arc::clone(existing)
        } else {
            self.register_locked(union)?
        };
        debug!(
            class = local.class_name(),
            local_id = local.type_id(),
            remote_id,
            merged_id = merged.type_id(),
            "merged pdx type versions"
        );
        publish(&self.merged_types, remote_id, Arc::clone(&merged));
        Ok(merged)
    }

    /// Index maps between `local` and `remote`, cached per id pair.
    pub fn field_maps(&self, local: &PdxType, remote: &PdxType) -> Arc<FieldMaps> {
        let key = (local.type_id(), remote.type_id());
        if let Some(maps) = self.field_maps.load().get(&key) {
            return Arc::clone(maps);
        }
        let maps = Arc::new(FieldMaps::new(local, remote));
        let _guard = self.write_lock.lock();
        if let Some(existing) = self.field_maps.load().get(&key) {
            return Arc::clone(existing);
        }
        publish(&self.field_maps, key, Arc::clone(&maps));
        maps
    }

    /// Returns the cluster-wide id of an enum constant.
    pub fn get_enum_value(&self, info: &EnumInfo) -> Result<i32> {
        if let Some(&id) = self.enum_ids.load().get(info) {
            return Ok(id);
        }
        let _guard = self.write_lock.lock();
        if let Some(&id) = self.enum_ids.load().get(info) {
            return Ok(id);
        }
        let id = self.service.get_enum_value(info)?;
        debug!(
            class = info.enum_class_name(),
            name = info.enum_name(),
            enum_id = id,
            "registered pdx enum"
        );
        self.publish_enum_locked(id, info.clone());
        Ok(id)
    }

    /// Returns the enum constant registered under `enum_id`.
    pub fn get_enum(&self, enum_id: i32) -> Result<EnumInfo> {
        if let Some(info) = self.enums.load().get(&enum_id) {
            return Ok(info.clone());
        }
        let _guard = self.write_lock.lock();
        if let Some(info) = self.enums.load().get(&enum_id) {
            return Ok(info.clone());
        }
        let info = self.service.get_enum(enum_id)?;
        debug!(enum_id, class = info.enum_class_name(), "fetched pdx enum");
        self.publish_enum_locked(enum_id, info.clone());
        Ok(info)
    }

    fn publish_enum_locked(&self, id: i32, info: EnumInfo) {
        publish(&self.enum_ids, info.clone(), id);
        publish(&self.enums, id, info);
    }

    /// Number of cached types.
    pub fn type_count(&self) -> usize {
        self.types_by_id.load().len()
    }

    /// Drops every cached type, enum and preserved entry.
    pub fn clear(&self) {
        let _guard = self.write_lock.lock();
        self.types_by_id.store(Arc::new(HashMap::new()));
        self.local_types.store(Arc::new(HashMap::new()));
        self.shapes.store(Arc::new(HashSet::new()));
        self.merged_types.store(Arc::new(HashMap::new()));
        self.field_maps.store(Arc::new(HashMap::new()));
        self.enum_ids.store(Arc::new(HashMap::new()));
        self.enums.store(Arc::new(HashMap::new()));
        self.preserved.clear();
        debug!("cleared pdx type registry");
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeRegistry")
            .field("types", &self.types_by_id.load().len())
            .field("local_types", &self.local_types.load().len())
            .field("enums", &self.enums.load().len())
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PdxError;
    use crate::serialization::pdx::type_service::InMemoryTypeService;
    use crate::serialization::pdx::PdxFieldKind;

    fn registry() -> (Arc<InMemoryTypeService>, TypeRegistry) {
        let service = Arc::new(InMemoryTypeService::with_distributed_system_id(1));
        let registry = TypeRegistry::new(service.clone()).unwrap();
        (service, registry)
    }

    fn order(fields: &[(&str, PdxFieldKind)]) -> PdxType {
        let mut t = PdxType::new("com.example.Order");
        for (name, kind) in fields {
            t.add_field(name, *kind).unwrap();
        }
        t
    }

    #[test]
    fn test_same_shape_registers_once() {
        let (service, registry) = registry();
        let a = registry
            .get_or_register_type(order(&[("id", PdxFieldKind::Long)]))
            .unwrap();
        let b = registry
            .get_or_register_type(order(&[("id", PdxFieldKind::Long)]))
            .unwrap();
        assert_eq!(a.type_id(), b.type_id());
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(service.round_trips(), 1);
        assert_eq!(a.type_id() >> 24, 1);
    }

    #[test]
    fn test_identity_marks_distinguish_types() {
        let (service, registry) = registry();
        let fields = [("id", PdxFieldKind::Long), ("name", PdxFieldKind::String)];
        let plain = registry.get_or_register_type(order(&fields)).unwrap();
        let mut marked = order(&fields);
        marked.set_identity_field("id").unwrap();
        let marked = registry.get_or_register_type(marked).unwrap();

        assert_ne!(plain.type_id(), marked.type_id());
        assert!(!plain.field("id").unwrap().is_identity());
        assert!(marked.field("id").unwrap().is_identity());
        assert!(plain.same_shape(&marked));
        assert_eq!(service.round_trips(), 2);
    }

    #[test]
    fn test_get_type_by_id_fetches_once() {
        let service = Arc::new(InMemoryTypeService::new());
        let id = service
            .get_pdx_id_for_type(&order(&[("id", PdxFieldKind::Long)]))
            .unwrap();
        let registry = TypeRegistry::new(service.clone()).unwrap();
        assert!(registry.cached_type(id).is_none());
        let first = registry.get_type_by_id(id).unwrap();
        let second = registry.get_type_by_id(id).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(service.round_trips(), 2);
        assert_eq!(first.type_id(), id);
    }

    #[test]
    fn test_collaborator_failure_leaves_state_untouched() {
        let (service, registry) = registry();
        service.set_failing(true);
        let err = registry
            .get_or_register_type(order(&[("id", PdxFieldKind::Long)]))
            .unwrap_err();
        assert!(matches!(err, PdxError::Collaborator(_)));
        assert_eq!(registry.type_count(), 0);
        service.set_failing(false);
        assert!(registry
            .get_or_register_type(order(&[("id", PdxFieldKind::Long)]))
            .is_ok());
    }

    #[test]
    fn test_local_type_first_wins() {
        let (_, registry) = registry();
        let v1 = registry
            .get_or_register_type(order(&[("id", PdxFieldKind::Long)]))
            .unwrap();
        let v2 = registry
            .get_or_register_type(order(&[("id", PdxFieldKind::Long), ("n", PdxFieldKind::Int)]))
            .unwrap();
        let local = registry.add_local_type(&v1);
        assert!(local.is_local());
        assert_eq!(registry.add_local_type(&v2).type_id(), v1.type_id());
        assert_eq!(
            registry.local_type("com.example.Order").unwrap().type_id(),
            v1.type_id()
        );
    }

    #[test]
    fn test_merged_type_reuses_richer_version() {
        let (_, registry) = registry();
        let local = registry
            .get_or_register_type(order(&[("a", PdxFieldKind::Int), ("b", PdxFieldKind::String)]))
            .unwrap();
        let remote = registry
            .get_or_register_type(order(&[
                ("a", PdxFieldKind::Int),
                ("b", PdxFieldKind::String),
                ("c", PdxFieldKind::Double),
            ]))
            .unwrap();
        let merged = registry
            .get_or_create_merged_type(remote.type_id(), &local, &remote)
            .unwrap();
        assert!(Arc::ptr_eq(&merged, &remote));
    }

    #[test]
    fn test_merged_type_gets_new_id_for_true_union() {
        let (service, registry) = registry();
        let local = registry
            .get_or_register_type(order(&[("a", PdxFieldKind::Int), ("x", PdxFieldKind::Long)]))
            .unwrap();
        let remote = registry
            .get_or_register_type(order(&[("a", PdxFieldKind::Int), ("c", PdxFieldKind::Double)]))
            .unwrap();
        let merged = registry
            .get_or_create_merged_type(remote.type_id(), &local, &remote)
            .unwrap();
        assert_ne!(merged.type_id(), local.type_id());
        assert_ne!(merged.type_id(), remote.type_id());
        assert_eq!(merged.field_count(), 3);
        let trips = service.round_trips();
        let again = registry
            .get_or_create_merged_type(remote.type_id(), &local, &remote)
            .unwrap();
        assert!(Arc::ptr_eq(&merged, &again));
        assert_eq!(service.round_trips(), trips);
    }

    #[test]
    fn test_field_maps_are_cached() {
        let (_, registry) = registry();
        let local = registry
            .get_or_register_type(order(&[("a", PdxFieldKind::Int)]))
            .unwrap();
        let remote = registry
            .get_or_register_type(order(&[("a", PdxFieldKind::Int), ("b", PdxFieldKind::Int)]))
            .unwrap();
        let first = registry.field_maps(&local, &remote);
        let second = registry.field_maps(&local, &remote);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.remote_to_local, vec![0, -2]);
    }

    #[test]
    fn test_enum_round_trip_is_cached() {
        let (service, registry) = registry();
        let info = EnumInfo::new("com.example.Color", "RED", 0);
        let id = registry.get_enum_value(&info).unwrap();
        assert_eq!(registry.get_enum_value(&info).unwrap(), id);
        assert_eq!(registry.get_enum(id).unwrap(), info);
        assert_eq!(service.round_trips(), 1);
    }

    #[test]
    fn test_clear_forgets_everything() {
        let (service, registry) = registry();
        let t = registry
            .get_or_register_type(order(&[("a", PdxFieldKind::Int)]))
            .unwrap();
        registry.add_local_type(&t);
        registry.clear();
        assert_eq!(registry.type_count(), 0);
        assert!(registry.local_type("com.example.Order").is_none());
        registry
            .get_or_register_type(order(&[("a", PdxFieldKind::Int)]))
            .unwrap();
        assert_eq!(service.round_trips(), 2);
    }
}
