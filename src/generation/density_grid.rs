//! Extended density grids sampled for one chunk at one stride

use glam::Vec3;
use rayon::prelude::*;

use super::scratch::{ScratchBuffer, ScratchRegistry};
use crate::mesh::tables::CORNER_OFFSETS;
use crate::terrain::TerrainGenerator;

/// Point counts of a density grid along each axis
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridShape {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
}

impl GridShape {
    /// `dimension / step + 2` points per axis: one border sample on each side.
    pub fn for_chunk(dimensions: [u32; 3], step: u32) -> Self {
        let step = step.max(1);
        Self {
            nx: (dimensions[0] / step) as usize + 2,
            ny: (dimensions[1] / step) as usize + 2,
            nz: (dimensions[2] / step) as usize + 2,
        }
    }

    pub fn len(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Flattened index, x fastest then y then z
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        z * self.ny * self.nx + y * self.nx + x
    }

    /// Cubes along each axis (one fewer than points)
    pub fn cubes(&self) -> [usize; 3] {
        [
            self.nx.saturating_sub(1),
            self.ny.saturating_sub(1),
            self.nz.saturating_sub(1),
        ]
    }
}

/// Density samples for a chunk, owned by exactly one job at a time.
///
/// Grid point `(x, y, z)` sits at chunk-local position
/// `((x - 1) * step, (y - 1) * step, (z - 1) * step)`.
#[derive(Debug)]
pub struct DensityGrid {
    shape: GridShape,
    step: u32,
    chunk_origin: Vec3,
    values: ScratchBuffer<f32>,
}

impl DensityGrid {
    /// Sample `density` at every grid point, one z slab per parallel task.
    pub fn from_fn<F>(
        dimensions: [u32; 3],
        step: u32,
        chunk_origin: Vec3,
        registry: &ScratchRegistry,
        density: F,
    ) -> Self
    where
        F: Fn(Vec3) -> f32 + Sync,
    {
        let shape = GridShape::for_chunk(dimensions, step);
        let step = step.max(1);
        let mut values = registry.allocate(shape.len(), 0.0f32);
        let slab = shape.nx * shape.ny;

        values.par_chunks_mut(slab).enumerate().for_each(|(z, slab_values)| {
            for y in 0..shape.ny {
                for x in 0..shape.nx {
                    let p = chunk_origin + local_position(step, x, y, z);
                    slab_values[y * shape.nx + x] = density(p);
                }
            }
        });

        Self {
            shape,
            step,
            chunk_origin,
            values,
        }
    }

    /// Sample the terrain density field for a chunk.
    pub fn generate(
        generator: &TerrainGenerator,
        dimensions: [u32; 3],
        step: u32,
        chunk_origin: Vec3,
        registry: &ScratchRegistry,
    ) -> Self {
        Self::from_fn(dimensions, step, chunk_origin, registry, |p| generator.density(p))
    }

    pub fn shape(&self) -> GridShape {
        self.shape
    }

    pub fn step(&self) -> u32 {
        self.step
    }

    pub fn chunk_origin(&self) -> Vec3 {
        self.chunk_origin
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        self.values[self.shape.index(x, y, z)]
    }

    pub fn local_position(&self, x: usize, y: usize, z: usize) -> Vec3 {
        local_position(self.step, x, y, z)
    }

    pub fn world_position(&self, x: usize, y: usize, z: usize) -> Vec3 {
        self.chunk_origin + self.local_position(x, y, z)
    }

    /// Densities at the eight corners of the cube whose minimum point is `(x, y, z)`
    pub fn cube_corners(&self, x: usize, y: usize, z: usize) -> [f32; 8] {
        CORNER_OFFSETS.map(|[dx, dy, dz]| self.get(x + dx as usize, y + dy as usize, z + dz as usize))
    }
}

fn local_position(step: u32, x: usize, y: usize, z: usize) -> Vec3 {
    (Vec3::new(x as f32, y as f32, z as f32) - Vec3::ONE) * step as f32
}
