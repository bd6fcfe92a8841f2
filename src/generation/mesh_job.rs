//! Mesh generation for one chunk at one LOD

use std::sync::Arc;
use std::time::Instant;

use glam::Vec3;

use super::density_grid::DensityGrid;
use super::scratch::{ScratchBuffer, ScratchRegistry};
use crate::mesh::{march_cube, TerrainMesh};
use crate::streaming::chunk::ChunkCoord;
use crate::terrain::TerrainGenerator;

/// Shared inputs for every mesh job of a world
#[derive(Clone)]
pub struct MeshJobContext {
    pub generator: Arc<TerrainGenerator>,
    pub dimensions: [u32; 3],
    pub iso_level: f32,
    pub registry: ScratchRegistry,
}

/// A background unit of work: density field plus marching cubes for one
/// (chunk, LOD) pair.
pub struct MeshJob {
    pub coord: ChunkCoord,
    /// Index into the LOD table
    pub lod: usize,
    /// Grid stride for this LOD
    pub step: u32,
    pub context: MeshJobContext,
}

/// Buffers produced by a finished job, owned by whoever receives them
#[derive(Debug)]
pub struct MeshJobOutput {
    pub coord: ChunkCoord,
    pub lod: usize,
    pub vertices: ScratchBuffer<Vec3>,
    pub indices: ScratchBuffer<u32>,
    /// The extended density field the mesh was extracted from
    pub density: DensityGrid,
}

impl MeshJob {
    pub fn new(coord: ChunkCoord, lod: usize, step: u32, context: MeshJobContext) -> Self {
        Self {
            coord,
            lod,
            step,
            context,
        }
    }

    pub fn run(self) -> MeshJobOutput {
        let start = Instant::now();
        let ctx = &self.context;
        let origin = self.coord.world_origin(ctx.dimensions);

        let density = DensityGrid::generate(&ctx.generator, ctx.dimensions, self.step, origin, &ctx.registry);

        let [cx, cy, cz] = density.shape().cubes();
        let mut vertices = ctx.registry.with_capacity::<Vec3>(cx * cz * 6);
        let mut indices = ctx.registry.with_capacity::<u32>(cx * cz * 6);
        let step = self.step as f32;

        for z in 0..cz {
            for y in 0..cy {
                for x in 0..cx {
                    let corners = density.cube_corners(x, y, z);
                    march_cube(
                        &corners,
                        density.local_position(x, y, z),
                        step,
                        ctx.iso_level,
                        &mut vertices,
                        &mut indices,
                    );
                }
            }
        }

        log::trace!(
            "Mesh job {:?} LOD {} finished in {:.1}ms: {} vertices",
            self.coord,
            self.lod,
            start.elapsed().as_secs_f64() * 1000.0,
            vertices.len()
        );

        MeshJobOutput {
            coord: self.coord,
            lod: self.lod,
            vertices,
            indices,
            density,
        }
    }
}

impl MeshJobOutput {
    /// Convert into a renderable mesh, handing back the density field.
    ///
    /// The vertex and index scratch buffers are released here.
    pub fn into_mesh(self) -> (TerrainMesh, DensityGrid) {
        let origin = self.density.chunk_origin();
        let mesh = TerrainMesh::from_triangles(self.vertices.into_vec(), self.indices.into_vec(), origin);
        (mesh, self.density)
    }
}
