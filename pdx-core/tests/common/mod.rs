//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use pdx_core::{InMemoryTypeService, PdxConfig, PdxSerializer, TypeRegistry, TypeService};

/// A type service shared by several simulated clients.
pub fn shared_service() -> Arc<InMemoryTypeService> {
    Arc::new(InMemoryTypeService::new())
}

/// A registry over `service` with default settings.
pub fn registry(service: &Arc<InMemoryTypeService>) -> Arc<TypeRegistry> {
    registry_with(service, PdxConfig::default())
}

/// A registry over `service` with `config`.
pub fn registry_with(service: &Arc<InMemoryTypeService>, config: PdxConfig) -> Arc<TypeRegistry> {
    let service: Arc<dyn TypeService> = Arc::clone(service) as Arc<dyn TypeService>;
    Arc::new(TypeRegistry::with_config(service, config).expect("failed to create registry"))
}

/// A serializer acting as one client of `service`.
pub fn client(service: &Arc<InMemoryTypeService>) -> PdxSerializer {
    PdxSerializer::new(registry(service))
}

/// A client whose preserved data expires after `expiry`.
pub fn client_with_expiry(service: &Arc<InMemoryTypeService>, expiry: Duration) -> PdxSerializer {
    let config = PdxConfig::builder()
        .preserved_data_expiry(expiry)
        .build()
        .expect("failed to build config");
    PdxSerializer::new(registry_with(service, config))
}
