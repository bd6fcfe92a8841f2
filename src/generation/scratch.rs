//! Tracked scratch buffers for background jobs
//!
//! Every buffer a job allocates is registered with a shared
//! [`ScratchRegistry`] and released when the owning [`ScratchBuffer`] drops,
//! on every exit path including cancellation.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct RegistryCounters {
    live_buffers: AtomicUsize,
    live_bytes: AtomicUsize,
    total_allocations: AtomicU64,
}

/// Shared bookkeeping of live scratch allocations
#[derive(Clone, Default)]
pub struct ScratchRegistry {
    counters: Arc<RegistryCounters>,
}

impl ScratchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `len` elements initialised to `fill`
    pub fn allocate<T: Clone>(&self, len: usize, fill: T) -> ScratchBuffer<T> {
        self.track(vec![fill; len])
    }

    /// Allocate an empty growable buffer
    pub fn with_capacity<T>(&self, capacity: usize) -> ScratchBuffer<T> {
        self.track(Vec::with_capacity(capacity))
    }

    fn track<T>(&self, data: Vec<T>) -> ScratchBuffer<T> {
        let bytes = data.capacity() * std::mem::size_of::<T>();
        self.counters.live_buffers.fetch_add(1, Ordering::AcqRel);
        self.counters.live_bytes.fetch_add(bytes, Ordering::AcqRel);
        self.counters.total_allocations.fetch_add(1, Ordering::Relaxed);
        ScratchBuffer {
            data,
            bytes,
            registry: self.clone(),
        }
    }

    fn release(&self, bytes: usize) {
        self.counters.live_buffers.fetch_sub(1, Ordering::AcqRel);
        self.counters.live_bytes.fetch_sub(bytes, Ordering::AcqRel);
    }

    /// Buffers allocated and not yet released
    pub fn live_buffers(&self) -> usize {
        self.counters.live_buffers.load(Ordering::Acquire)
    }

    /// Bytes reserved by live buffers at allocation time
    pub fn live_bytes(&self) -> usize {
        self.counters.live_bytes.load(Ordering::Acquire)
    }

    pub fn total_allocations(&self) -> u64 {
        self.counters.total_allocations.load(Ordering::Relaxed)
    }
}

/// A `Vec` registered with a [`ScratchRegistry`] for its whole lifetime.
pub struct ScratchBuffer<T> {
    data: Vec<T>,
    bytes: usize,
    registry: ScratchRegistry,
}

impl<T> ScratchBuffer<T> {
    /// Release tracking and hand the storage to the caller.
    pub fn into_vec(mut self) -> Vec<T> {
        std::mem::take(&mut self.data)
    }
}

impl<T> Deref for ScratchBuffer<T> {
    type Target = Vec<T>;

    fn deref(&self) -> &Vec<T> {
        &self.data
    }
}

impl<T> DerefMut for ScratchBuffer<T> {
    fn deref_mut(&mut self) -> &mut Vec<T> {
        &mut self.data
    }
}

impl<T> Drop for ScratchBuffer<T> {
    fn drop(&mut self) {
        self.registry.release(self.bytes);
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for ScratchBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScratchBuffer")
            .field("len", &self.data.len())
            .field("bytes", &self.bytes)
            .finish()
    }
}
