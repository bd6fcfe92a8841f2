//! Index-based registry of live chunks

use std::collections::HashMap;

use super::chunk::{Chunk, ChunkCoord};

/// Stable index of a chunk slot in a [`ChunkArena`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChunkHandle(usize);

/// Slot storage with a free list and a coordinate index.
///
/// Holds at most one chunk per coordinate.
#[derive(Default)]
pub struct ChunkArena {
    slots: Vec<Option<Chunk>>,
    free_slots: Vec<usize>,
    by_coord: HashMap<ChunkCoord, ChunkHandle>,
}

impl ChunkArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a chunk. Gives it back if its coordinate is already live.
    pub fn insert(&mut self, chunk: Chunk) -> Result<ChunkHandle, Chunk> {
        let coord = chunk.coord();
        if self.by_coord.contains_key(&coord) {
            return Err(chunk);
        }

        let handle = match self.free_slots.pop() {
            Some(index) => {
                self.slots[index] = Some(chunk);
                ChunkHandle(index)
            }
            None => {
                self.slots.push(Some(chunk));
                ChunkHandle(self.slots.len() - 1)
            }
        };
        self.by_coord.insert(coord, handle);
        Ok(handle)
    }

    pub fn remove(&mut self, handle: ChunkHandle) -> Option<Chunk> {
        let chunk = self.slots.get_mut(handle.0)?.take()?;
        self.by_coord.remove(&chunk.coord());
        self.free_slots.push(handle.0);
        Some(chunk)
    }

    pub fn handle_of(&self, coord: ChunkCoord) -> Option<ChunkHandle> {
        self.by_coord.get(&coord).copied()
    }

    pub fn get(&self, handle: ChunkHandle) -> Option<&Chunk> {
        self.slots.get(handle.0)?.as_ref()
    }

    pub fn get_mut(&mut self, handle: ChunkHandle) -> Option<&mut Chunk> {
        self.slots.get_mut(handle.0)?.as_mut()
    }

    pub fn get_by_coord(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.get(self.handle_of(coord)?)
    }

    pub fn contains(&self, coord: ChunkCoord) -> bool {
        self.by_coord.contains_key(&coord)
    }

    pub fn len(&self) -> usize {
        self.by_coord.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_coord.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ChunkHandle, &Chunk)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|chunk| (ChunkHandle(i), chunk)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ChunkHandle, &mut Chunk)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|chunk| (ChunkHandle(i), chunk)))
    }

    pub fn handles(&self) -> Vec<ChunkHandle> {
        self.iter().map(|(handle, _)| handle).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Aabb;

    fn chunk(x: i32, z: i32) -> Chunk {
        Chunk::new(ChunkCoord::new(x, z), Aabb::default(), 1, 0)
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut arena = ChunkArena::new();
        let a = arena.insert(chunk(0, 0)).ok().unwrap();
        let b = arena.insert(chunk(1, 0)).ok().unwrap();
        assert_ne!(a, b);
        assert_eq!(arena.len(), 2);
        assert_eq!(arena.handle_of(ChunkCoord::new(1, 0)), Some(b));
        assert_eq!(arena.get(a).unwrap().coord(), ChunkCoord::new(0, 0));
    }

    #[test]
    fn test_one_chunk_per_coord() {
        let mut arena = ChunkArena::new();
        assert!(arena.insert(chunk(2, 2)).is_ok());
        let rejected = arena.insert(chunk(2, 2));
        assert!(rejected.is_err());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_slots_reused() {
        let mut arena = ChunkArena::new();
        let a = arena.insert(chunk(0, 0)).ok().unwrap();
        arena.insert(chunk(0, 1)).ok().unwrap();
        let removed = arena.remove(a).unwrap();
        assert_eq!(removed.coord(), ChunkCoord::new(0, 0));
        assert!(!arena.contains(ChunkCoord::new(0, 0)));
        assert!(arena.get(a).is_none());
        assert!(arena.remove(a).is_none());

        let c = arena.insert(chunk(5, 5)).ok().unwrap();
        assert_eq!(c, a);
        assert_eq!(arena.iter().count(), 2);
    }
}
