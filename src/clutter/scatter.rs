//! Scatter placement over a chunk's density field
//!
//! Objects are placed on floors: a solid sample directly beneath an air
//! sample. Each candidate floor passes through the rule's gates in order:
//! placement noise, height band, slope band, then a solidity check below the
//! floor that rejects thin floating slabs.

use glam::{Mat4, Quat, Vec3};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

use super::rules::{resolve_prefab, Orientation, PlacementRule, PrefabKind, PrefabSpec};
use crate::core::{Error, Result};
use crate::generation::density_grid::DensityGrid;
use crate::mesh::interpolate_edge;
use crate::streaming::chunk::ChunkCoord;
use crate::terrain::generator::PLACEMENT_SEED_OFFSET;
use crate::terrain::FbmLayer3d;

/// Grid cells below a floor that must still be solid
pub const GUARD_DEPTH: usize = 2;

/// One placed object, in world space
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlacementRecord {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: f32,
    pub prefab: PrefabKind,
    /// Index of the rule that produced this record
    pub rule: usize,
}

impl PlacementRecord {
    pub fn transform(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(Vec3::splat(self.scale), self.rotation, self.position)
    }
}

struct ScatterLayer {
    rule: PlacementRule,
    prefab: PrefabKind,
    noise: FbmLayer3d,
}

/// Places objects for every configured rule
pub struct ScatterEngine {
    layers: Vec<ScatterLayer>,
    seed: u32,
    iso_level: f32,
    chunk_height: f32,
}

impl ScatterEngine {
    pub fn new(
        rules: &[PlacementRule],
        prefabs: &[PrefabSpec],
        seed: u32,
        iso_level: f32,
        chunk_height: u32,
    ) -> Result<Self> {
        let layers = rules
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                rule.validate(prefabs)?;
                let prefab = resolve_prefab(prefabs, &rule.prefab)
                    .ok_or_else(|| Error::config(format!("unknown prefab '{}'", rule.prefab)))?;
                let layer_seed = seed.wrapping_add(PLACEMENT_SEED_OFFSET).wrapping_add(i as u32);
                Ok(ScatterLayer {
                    rule: rule.clone(),
                    prefab,
                    noise: FbmLayer3d::new(rule.noise.clone(), layer_seed, 0.0),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            layers,
            seed,
            iso_level,
            chunk_height: chunk_height.max(1) as f32,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn rule_count(&self) -> usize {
        self.layers.len()
    }

    /// Place objects for every rule over `grid`.
    pub fn scatter(&self, grid: &DensityGrid, coord: ChunkCoord) -> Vec<PlacementRecord> {
        let mut records = Vec::new();
        for (index, layer) in self.layers.iter().enumerate() {
            let mut rng = Pcg32::seed_from_u64(placement_seed(self.seed, coord, index));
            self.scatter_layer(grid, layer, index, &mut rng, &mut records);
        }
        log::trace!("Chunk {:?}: {} objects placed", coord, records.len());
        records
    }

    fn scatter_layer(
        &self,
        grid: &DensityGrid,
        layer: &ScatterLayer,
        index: usize,
        rng: &mut Pcg32,
        records: &mut Vec<PlacementRecord>,
    ) {
        let shape = grid.shape();
        if shape.nx < 3 || shape.nz < 3 || shape.ny < GUARD_DEPTH + 2 {
            return;
        }
        let rule = &layer.rule;
        let threshold = 1.0 - rule.coverage;

        // Columns cover local [0, width); the far border belongs to the next chunk
        for z in 1..shape.nz - 1 {
            for x in 1..shape.nx - 1 {
                for y in GUARD_DEPTH..shape.ny - 1 {
                    let below = grid.get(x, y, z);
                    let above = grid.get(x, y + 1, z);
                    if below < self.iso_level || above >= self.iso_level {
                        continue;
                    }

                    if layer.noise.sample_unit(grid.world_position(x, y, z)) < threshold {
                        continue;
                    }

                    let surface = interpolate_edge(
                        self.iso_level,
                        grid.world_position(x, y, z),
                        grid.world_position(x, y + 1, z),
                        below,
                        above,
                    );

                    let normalized_height = surface.y / self.chunk_height;
                    if normalized_height < rule.height_range[0] || normalized_height > rule.height_range[1] {
                        continue;
                    }

                    let Some(normal) = surface_normal(grid, x, y, z) else {
                        continue;
                    };
                    let slope = normal.dot(Vec3::Y).clamp(-1.0, 1.0).acos().to_degrees();
                    if slope < rule.slope_range[0] || slope > rule.slope_range[1] {
                        continue;
                    }

                    if grid.get(x, y - GUARD_DEPTH, z) < self.iso_level {
                        continue;
                    }

                    let yaw = if rule.random_yaw {
                        rng.gen_range(0.0..std::f32::consts::TAU)
                    } else {
                        0.0
                    };
                    let scale = rng.gen_range(rule.scale_range[0]..=rule.scale_range[1]);
                    let rotation = match rule.orientation {
                        Orientation::Vertical => Quat::from_rotation_y(yaw),
                        Orientation::SurfaceAligned => {
                            Quat::from_rotation_arc(Vec3::Y, normal) * Quat::from_rotation_y(yaw)
                        }
                    };

                    records.push(PlacementRecord {
                        position: surface,
                        rotation,
                        scale,
                        prefab: layer.prefab,
                        rule: index,
                    });
                }
            }
        }
    }
}

/// Outward surface normal from central differences of the density field.
///
/// Density grows into the solid, so the normal points down the gradient.
fn surface_normal(grid: &DensityGrid, x: usize, y: usize, z: usize) -> Option<Vec3> {
    let gradient = Vec3::new(
        grid.get(x + 1, y, z) - grid.get(x - 1, y, z),
        grid.get(x, y + 1, z) - grid.get(x, y - 1, z),
        grid.get(x, y, z + 1) - grid.get(x, y, z - 1),
    );
    let normal = -gradient.normalize_or_zero();
    (normal != Vec3::ZERO).then_some(normal)
}

fn placement_seed(seed: u32, coord: ChunkCoord, rule: usize) -> u64 {
    [coord.x as u32 as u64, coord.z as u32 as u64, rule as u64]
        .into_iter()
        .fold(seed as u64, |hash, value| {
            hash.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(value)
        })
}
