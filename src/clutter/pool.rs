//! Pooled instances for placed objects
//!
//! The streaming layer only talks to [`ObjectPool`]; [`InstancePool`] is the
//! in-process implementation used by the driver binary and tests.

use std::collections::HashMap;

use glam::{Quat, Vec3};

use super::rules::PrefabKind;

/// Handle to a checked-out pooled instance.
///
/// Not `Clone`: releasing consumes the handle, so an instance cannot be
/// returned twice.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct InstanceHandle(u64);

impl InstanceHandle {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Object pooling collaborator.
///
/// Called only from the coordinating thread.
pub trait ObjectPool {
    /// Declare a prefab kind and create `prewarm` instances ahead of use
    fn register(&mut self, kind: PrefabKind, prewarm: usize);

    /// Check out an instance placed at `position` with `rotation`
    fn acquire(&mut self, kind: PrefabKind, position: Vec3, rotation: Quat) -> InstanceHandle;

    /// Return an instance to the pool
    fn release(&mut self, handle: InstanceHandle, kind: PrefabKind);
}

/// A slot in the instance pool
#[derive(Clone, Copy, Debug)]
pub struct InstanceSlot {
    pub position: Vec3,
    pub rotation: Quat,
    pub in_use: bool,
}

impl Default for InstanceSlot {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            in_use: false,
        }
    }
}

#[derive(Default)]
struct KindPool {
    /// Slot ids owned by this kind
    slots: HashMap<u64, InstanceSlot>,
    free_slots: Vec<u64>,
    checked_out: usize,
    created_on_demand: usize,
}

/// Free-list instance pool, one list per prefab kind
#[derive(Default)]
pub struct InstancePool {
    kinds: HashMap<PrefabKind, KindPool>,
    next_id: u64,
}

impl InstancePool {
    pub fn new() -> Self {
        Self::default()
    }

    fn create_slot(&mut self, kind: PrefabKind) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.kinds
            .entry(kind)
            .or_default()
            .slots
            .insert(id, InstanceSlot::default());
        id
    }

    /// Instances of `kind` currently checked out
    pub fn checked_out(&self, kind: PrefabKind) -> usize {
        self.kinds.get(&kind).map_or(0, |k| k.checked_out)
    }

    pub fn total_checked_out(&self) -> usize {
        self.kinds.values().map(|k| k.checked_out).sum()
    }

    /// Idle instances of `kind`
    pub fn free_count(&self, kind: PrefabKind) -> usize {
        self.kinds.get(&kind).map_or(0, |k| k.free_slots.len())
    }

    /// Instances created because the free list was empty
    pub fn created_on_demand(&self, kind: PrefabKind) -> usize {
        self.kinds.get(&kind).map_or(0, |k| k.created_on_demand)
    }

    pub fn is_registered(&self, kind: PrefabKind) -> bool {
        self.kinds.contains_key(&kind)
    }

    /// Slot state for a handle, if it belongs to `kind`
    pub fn slot(&self, handle: &InstanceHandle, kind: PrefabKind) -> Option<&InstanceSlot> {
        self.kinds.get(&kind)?.slots.get(&handle.0)
    }
}

impl ObjectPool for InstancePool {
    fn register(&mut self, kind: PrefabKind, prewarm: usize) {
        self.kinds.entry(kind).or_default();
        for _ in 0..prewarm {
            let id = self.create_slot(kind);
            if let Some(pool) = self.kinds.get_mut(&kind) {
                pool.free_slots.push(id);
            }
        }
        log::debug!("Registered prefab {:?} with {} prewarmed instances", kind, prewarm);
    }

    fn acquire(&mut self, kind: PrefabKind, position: Vec3, rotation: Quat) -> InstanceHandle {
        if !self.kinds.contains_key(&kind) {
            log::warn!("Prefab {:?} was not registered before use", kind);
        }

        let reused = self.kinds.get_mut(&kind).and_then(|pool| pool.free_slots.pop());
        let id = match reused {
            Some(id) => id,
            None => {
                let id = self.create_slot(kind);
                if let Some(pool) = self.kinds.get_mut(&kind) {
                    pool.created_on_demand += 1;
                    log::warn!(
                        "Instance pool for prefab {:?} exhausted, created instance on demand ({} so far)",
                        kind,
                        pool.created_on_demand
                    );
                }
                id
            }
        };

        if let Some(pool) = self.kinds.get_mut(&kind) {
            pool.checked_out += 1;
            if let Some(slot) = pool.slots.get_mut(&id) {
                *slot = InstanceSlot {
                    position,
                    rotation,
                    in_use: true,
                };
            }
        }

        InstanceHandle(id)
    }

    fn release(&mut self, handle: InstanceHandle, kind: PrefabKind) {
        let Some(pool) = self.kinds.get_mut(&kind) else {
            log::warn!("Released instance {} for unknown prefab {:?}", handle.0, kind);
            return;
        };
        match pool.slots.get_mut(&handle.0) {
            Some(slot) if slot.in_use => {
                slot.in_use = false;
                pool.checked_out -= 1;
                pool.free_slots.push(handle.0);
            }
            _ => log::warn!("Instance {} is not checked out from prefab {:?}", handle.0, kind),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PINE: PrefabKind = PrefabKind(0);
    const ROCK: PrefabKind = PrefabKind(1);

    #[test]
    fn test_prewarm_and_reuse() {
        let mut pool = InstancePool::new();
        pool.register(PINE, 2);
        assert_eq!(pool.free_count(PINE), 2);

        let a = pool.acquire(PINE, Vec3::ONE, Quat::IDENTITY);
        let b = pool.acquire(PINE, Vec3::ZERO, Quat::IDENTITY);
        assert_eq!(pool.checked_out(PINE), 2);
        assert_eq!(pool.free_count(PINE), 0);
        assert_eq!(pool.created_on_demand(PINE), 0);
        assert_eq!(pool.slot(&a, PINE).unwrap().position, Vec3::ONE);

        let a_id = a.id();
        pool.release(a, PINE);
        let c = pool.acquire(PINE, Vec3::X, Quat::IDENTITY);
        assert_eq!(c.id(), a_id);

        pool.release(b, PINE);
        pool.release(c, PINE);
        assert_eq!(pool.checked_out(PINE), 0);
    }

    #[test]
    fn test_exhaustion_creates_on_demand() {
        let mut pool = InstancePool::new();
        pool.register(ROCK, 1);
        let a = pool.acquire(ROCK, Vec3::ZERO, Quat::IDENTITY);
        let b = pool.acquire(ROCK, Vec3::ZERO, Quat::IDENTITY);
        assert_ne!(a.id(), b.id());
        assert_eq!(pool.created_on_demand(ROCK), 1);
        assert_eq!(pool.checked_out(ROCK), 2);

        pool.release(a, ROCK);
        pool.release(b, ROCK);
        assert_eq!(pool.free_count(ROCK), 2);
        assert_eq!(pool.total_checked_out(), 0);
    }

    #[test]
    fn test_release_under_wrong_kind_is_ignored() {
        let mut pool = InstancePool::new();
        pool.register(PINE, 1);
        pool.register(ROCK, 1);
        let a = pool.acquire(PINE, Vec3::ZERO, Quat::IDENTITY);
        pool.release(a, ROCK);
        assert_eq!(pool.checked_out(PINE), 1);
        assert_eq!(pool.checked_out(ROCK), 0);
    }

    #[test]
    fn test_unregistered_kind_still_served() {
        let mut pool = InstancePool::new();
        let a = pool.acquire(PINE, Vec3::ZERO, Quat::IDENTITY);
        assert!(pool.is_registered(PINE));
        assert_eq!(pool.checked_out(PINE), 1);
        pool.release(a, PINE);
        assert_eq!(pool.checked_out(PINE), 0);
    }
}
