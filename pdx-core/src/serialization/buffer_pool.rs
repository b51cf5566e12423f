//! Thread-local pool of reusable output buffers.
//!
//! Buffers are checked out when an `ObjectDataOutput` is created and checked
//! back in when it is dropped, always on the same thread. Growth past the
//! high-water mark goes through a single process-wide lock so at most one
//! thread at a time performs an oversized allocation.

use crate::error::{PdxError, Result};
use parking_lot::Mutex;
use std::cell::RefCell;
use tracing::{debug, trace};

/// Capacity of a freshly allocated buffer.
pub const INITIAL_BUFFER_SIZE: usize = 8192;

/// Growth beyond this many bytes is serialized by the big-buffer lock.
pub const HIGH_WATER_MARK: usize = 50 * 1024 * 1024;

/// Maximum number of idle buffers kept per thread.
pub const MAX_POOLED_BUFFERS: usize = 10;

/// Largest size a single buffer may reach; positions are 32-bit on the wire.
pub const MAX_BUFFER_SIZE: usize = i32::MAX as usize;

static BIG_BUFFER_LOCK: Mutex<()> = parking_lot::const_mutex(());

thread_local! {
    static POOL: RefCell<Vec<Vec<u8>>> = RefCell::new(Vec::new());
}

/// Takes an empty buffer from this thread's pool, allocating if none is idle.
pub(crate) fn checkout() -> Vec<u8> {
    POOL.try_with(|pool| pool.borrow_mut().pop())
        .ok()
        .flatten()
        .unwrap_or_else(|| Vec::with_capacity(INITIAL_BUFFER_SIZE))
}

/// Returns a buffer to this thread's pool.
///
/// Buffers that grew beyond the initial size are shrunk first.
pub(crate) fn checkin(mut buffer: Vec<u8>) {
    buffer.clear();
    if buffer.capacity() > INITIAL_BUFFER_SIZE {
        buffer.shrink_to(INITIAL_BUFFER_SIZE);
    }
    let _ = POOL.try_with(|pool| {
        let mut pool = pool.borrow_mut();
        if pool.len() < MAX_POOLED_BUFFERS {
            pool.push(buffer);
        }
    });
}

/// Number of idle buffers pooled on the calling thread.
#[cfg(test)]
pub(crate) fn pooled_buffer_count() -> usize {
    POOL.try_with(|pool| pool.borrow().len()).unwrap_or(0)
}

/// Ensures `buffer` can take `additional` more bytes.
///
/// Capacity at least doubles on each growth. Allocation failure and sizes
/// beyond [`MAX_BUFFER_SIZE`] are reported as [`PdxError::OutOfMemory`].
pub(crate) fn reserve(buffer: &mut Vec<u8>, additional: usize) -> Result<()> {
    let required = buffer
        .len()
        .checked_add(additional)
        .filter(|&n| n <= MAX_BUFFER_SIZE)
        .ok_or_else(|| {
            PdxError::OutOfMemory(format!(
                "buffer of {} bytes cannot grow by {} bytes",
                buffer.len(),
                additional
            ))
        })?;
    if required <= buffer.capacity() {
        return Ok(());
    }

    let target = required
        .max(buffer.capacity().saturating_mul(2))
        .min(MAX_BUFFER_SIZE);

    if target > HIGH_WATER_MARK {
        let _guard = BIG_BUFFER_LOCK.lock();
        debug!(
            from = buffer.capacity(),
            to = target,
            "growing oversized output buffer"
        );
        grow_to(buffer, target, required)
    } else {
        trace!(from = buffer.capacity(), to = target, "growing output buffer");
        grow_to(buffer, target, required)
    }
}

fn grow_to(buffer: &mut Vec<u8>, target: usize, required: usize) -> Result<()> {
    if buffer.try_reserve_exact(target - buffer.len()).is_ok() {
        return Ok(());
    }
    // Doubling failed; settle for exactly what the write needs.
    buffer
        .try_reserve_exact(required - buffer.len())
        .map_err(|e| {
            PdxError::OutOfMemory(format!(
                "failed to allocate {} byte buffer: {}",
                required, e
            ))
        })
}
