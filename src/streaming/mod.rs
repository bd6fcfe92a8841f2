//! Chunk streaming around a moving viewer

pub mod lod;
pub mod chunk;
pub mod arena;
pub mod manager;

pub use lod::{LodDescriptor, LodInfo, MAX_DETAIL_LEVEL};
pub use chunk::{Chunk, ChunkCoord, ChunkState, LodMesh, PlacedObject, MAX_MESH_ATTEMPTS};
pub use arena::{ChunkArena, ChunkHandle};
pub use manager::{FrameStats, InstanceBatch, Viewer, WorldPartition, MAX_INSTANCES_PER_BATCH};
