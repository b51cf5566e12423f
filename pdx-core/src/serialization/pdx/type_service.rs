//! The cluster-side type registry, as seen from this client.

use super::enum_info::EnumInfo;
use super::pdx_type::PdxType;
use crate::error::CollaboratorError;
use crate::serialization::{ObjectDataInput, ObjectDataOutput};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;
use tracing::trace;

/// Network calls the type registry makes to the cluster.
///
/// Implementations own timeouts and retries. Every call is synchronous and
/// each error is handed to the caller unchanged.
pub trait TypeService: Send + Sync {
    /// Returns the cluster-wide id for a type shape, assigning one if new.
    fn get_pdx_id_for_type(&self, pdx_type: &PdxType) -> Result<i32, CollaboratorError>;

    /// Fetches the type registered under `type_id`.
    fn get_pdx_type_by_id(&self, type_id: i32) -> Result<PdxType, CollaboratorError>;

    /// Returns the cluster-wide id for an enum constant, assigning one if new.
    fn get_enum_value(&self, info: &EnumInfo) -> Result<i32, CollaboratorError>;

    /// Fetches the enum constant registered under `enum_id`.
    fn get_enum(&self, enum_id: i32) -> Result<EnumInfo, CollaboratorError>;
}

#[derive(Debug, Default)]
struct ServiceState {
    next_type: i32,
    next_enum: i32,
    types: HashMap<i32, Vec<u8>>,
    type_ids: HashMap<PdxType, i32>,
    enums: HashMap<i32, EnumInfo>,
    enum_ids: HashMap<EnumInfo, i32>,
}

/// A loopback [`TypeService`] holding the cluster registry in memory.
///
/// Ids are `(distributed_system_id << 24) | counter`, as the cluster assigns
/// them. Types are stored in their serialized descriptor form so every fetch
/// goes through the same codec as a network reply.
#[derive(Debug)]
pub struct InMemoryTypeService {
    distributed_system_id: u8,
    latency: Duration,
    state: Mutex<ServiceState>,
    round_trips: AtomicUsize,
    failing: AtomicBool,
}

impl InMemoryTypeService {
    /// Creates an empty registry for distributed system 0.
    pub fn new() -> Self {
        Self::with_distributed_system_id(0)
    }

    /// Creates an empty registry for the given distributed system.
    pub fn with_distributed_system_id(distributed_system_id: u8) -> Self {
        Self {
            distributed_system_id,
            latency: Duration::ZERO,
            state: Mutex::new(ServiceState::default()),
            round_trips: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Delays every call, simulating network latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Makes every subsequent call fail until reset.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of calls served so far.
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::SeqCst)
    }

    /// Number of distinct types registered.
    pub fn type_count(&self) -> usize {
        self.state.lock().types.len()
    }

    fn begin_call(&self, call: &str) -> Result<(), CollaboratorError> {
        self.round_trips.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CollaboratorError::new(format!("{} failed: cluster unavailable", call)));
        }
        trace!(call, "type service call");
        Ok(())
    }

    fn next_id(&self, counter: &mut i32) -> i32 {
        *counter += 1;
        ((self.distributed_system_id as i32) << 24) | (*counter & 0x00FF_FFFF)
    }
}

impl Default for InMemoryTypeService {
    fn default() -> Self {
        Self::new()
    }
}

fn encode_type(pdx_type: &PdxType) -> Result<Vec<u8>, CollaboratorError> {
    let mut output = ObjectDataOutput::new();
    pdx_type
        .to_data(&mut output)
        .map_err(|e| CollaboratorError::with_source("cannot encode type", e))?;
    Ok(output.into_bytes())
}

fn decode_type(bytes: &[u8]) -> Result<PdxType, CollaboratorError> {
    PdxType::from_data(&mut ObjectDataInput::new(bytes))
        .map_err(|e| CollaboratorError::with_source("cannot decode type", e))
}

impl TypeService for InMemoryTypeService {
    fn get_pdx_id_for_type(&self, pdx_type: &PdxType) -> Result<i32, CollaboratorError> {
        self.begin_call("get_pdx_id_for_type")?;
        let received = decode_type(&encode_type(pdx_type)?)?;
        let mut state = self.state.lock();
        if let Some(&id) = state.type_ids.get(&received) {
            return Ok(id);
        }
        let mut counter = state.next_type;
        let id = self.next_id(&mut counter);
        state.next_type = counter;

        let mut stored = received.clone();
        stored.set_type_id(id);
        let bytes = encode_type(&stored)?;
        state.types.insert(id, bytes);
        state.type_ids.insert(received, id);
        Ok(id)
    }

    fn get_pdx_type_by_id(&self, type_id: i32) -> Result<PdxType, CollaboratorError> {
        self.begin_call("get_pdx_type_by_id")?;
        let bytes = self
            .state
            .lock()
            .types
            .get(&type_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::new(format!("unknown pdx type id {}", type_id)))?;
        decode_type(&bytes)
    }

    fn get_enum_value(&self, info: &EnumInfo) -> Result<i32, CollaboratorError> {
        self.begin_call("get_enum_value")?;
        let mut state = self.state.lock();
        if let Some(&id) = state.enum_ids.get(info) {
            return Ok(id);
        }
        let mut counter = state.next_enum;
        let id = self.next_id(&mut counter);
        state.next_enum = counter;
        state.enums.insert(id, info.clone());
        state.enum_ids.insert(info.clone(), id);
        Ok(id)
    }

    fn get_enum(&self, enum_id: i32) -> Result<EnumInfo, CollaboratorError> {
        self.begin_call("get_enum")?;
        self.state
            .lock()
            .enums
            .get(&enum_id)
            .cloned()
            .ok_or_else(|| CollaboratorError::new(format!("unknown enum id {}", enum_id)))
    }
}
