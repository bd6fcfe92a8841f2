//! Marching cubes surface extraction and chunk meshes

pub mod tables;

pub mod marching_cubes;
pub use marching_cubes::{case_index, interpolate_edge, march_cube};

pub mod terrain_mesh;
pub use terrain_mesh::{IndexBuffer, TerrainMesh, TerrainVertex};
