//! Bytes of fields a newer peer wrote that the local class does not know.
//!
//! When an object is read against a richer remote schema, the remote-only
//! fields are kept here under the object's [`PreservedHandle`] so that the
//! next write of the same object can emit them again. Entries expire on the
//! table's timer thread unless refreshed by another read.

use crate::error::Result;
use crate::timer::{TimerId, TimerQueue};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a domain object in the preserved-data table.
///
/// Objects that want their unknown fields to survive a round trip store the
/// handle they are given and hand it back on the next write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PreservedHandle(u64);

impl PreservedHandle {
    /// Allocates a process-unique handle.
    pub fn new() -> Self {
        Self(NEXT_HANDLE.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw handle value.
    pub fn id(self) -> u64 {
        self.0
    }
}

impl Default for PreservedHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PreservedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "preserved#{}", self.0)
    }
}

/// The remote-only field bytes of one object, in merged-type order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreservedData {
    merged_type_id: i32,
    fields: Vec<Bytes>,
}

impl PreservedData {
    /// Wraps field bytes captured while reading against `merged_type_id`.
    pub fn new(merged_type_id: i32, fields: Vec<Bytes>) -> Self {
        Self {
            merged_type_id,
            fields,
        }
    }

    /// Id of the merged type the bytes belong to.
    pub fn merged_type_id(&self) -> i32 {
        self.merged_type_id
    }

    /// Encoded field values, one per remote-only field.
    pub fn fields(&self) -> &[Bytes] {
        &self.fields
    }
}

/// Remote-only fields handed to an object that keeps them itself.
///
/// Returned by `PdxReader::read_unread_fields` and passed back through
/// `PdxWriter::write_unread_fields`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdxUnreadFields(pub(crate) Arc<PreservedData>);

impl PdxUnreadFields {
    /// Id of the merged type the fields belong to.
    pub fn merged_type_id(&self) -> i32 {
        self.0.merged_type_id
    }

    /// Number of preserved fields.
    pub fn len(&self) -> usize {
        self.0.fields.len()
    }

    /// Returns `true` when nothing was preserved.
    pub fn is_empty(&self) -> bool {
        self.0.fields.is_empty()
    }

    pub(crate) fn data(&self) -> &Arc<PreservedData> {
        &self.0
    }
}

struct Entry {
    data: Arc<PreservedData>,
    timer: TimerId,
    token: u64,
}

type Entries = Arc<Mutex<HashMap<PreservedHandle, Entry>>>;

/// Handle-indexed preserved data with timed expiry.
pub struct PreservedDataTable {
    entries: Entries,
    timer: TimerQueue,
    expiry: Duration,
    next_token: AtomicU64,
}

impl PreservedDataTable {
    /// Creates an empty table whose entries live `expiry` past their last set.
    pub fn new(expiry: Duration) -> Result<Self> {
        Ok(Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            timer: TimerQueue::new("pdx-preserved-expiry")?,
            expiry,
            next_token: AtomicU64::new(1),
        })
    }

    /// Time an entry survives without being set again.
    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    /// Stores `data` for `handle`, replacing any previous entry.
    ///
    /// Setting an existing handle pushes its expiry back instead of adding a
    /// second timer.
    pub fn set(&self, handle: PreservedHandle, data: Arc<PreservedData>) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(&handle) {
            if self.timer.reschedule(entry.timer, self.expiry) {
                debug!(%handle, "reset preserved data expiry");
                entry.data = data;
                return;
            }
        }
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let timer = self.schedule_expiry(handle, token);
        debug!(%handle, expiry_ms = self.expiry.as_millis() as u64, "scheduled preserved data expiry");
        entries.insert(handle, Entry { data, timer, token });
    }

    fn schedule_expiry(&self, handle: PreservedHandle, token: u64) -> TimerId {
        let weak = Arc::downgrade(&self.entries);
        self.timer.schedule(self.expiry, move || {
            let Some(entries) = weak.upgrade() else {
                return;
            };
            let mut entries = entries.lock();
            if entries.get(&handle).map(|e| e.token) == Some(token) {
                entries.remove(&handle);
                debug!(%handle, "preserved data expired");
            }
        })
    }

    /// Returns the data stored for `handle`, if it has not expired.
    pub fn get(&self, handle: PreservedHandle) -> Option<Arc<PreservedData>> {
        self.entries.lock().get(&handle).map(|e| Arc::clone(&e.data))
    }

    /// Removes the entry for `handle` and cancels its timer.
    pub fn remove(&self, handle: PreservedHandle) -> Option<Arc<PreservedData>> {
        let entry = self.entries.lock().remove(&handle)?;
        self.timer.cancel(entry.timer);
        Some(entry.data)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` when no entry is live.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drops every entry and its timer.
    pub fn clear(&self) {
        let drained: Vec<Entry> = self.entries.lock().drain().map(|(_, e)| e).collect();
        for entry in drained {
            self.timer.cancel(entry.timer);
        }
    }
}

impl fmt::Debug for PreservedDataTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreservedDataTable")
            .field("entries", &self.len())
            .field("expiry", &self.expiry)
            .finish()
    }
}
