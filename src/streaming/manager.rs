//! World partition: the per-frame streaming loop
//!
//! Each frame the manager works out which chunk coordinates are within the
//! largest LOD distance of the viewer, creates or updates those chunks,
//! decommissions the rest, collects finished background work and feeds the
//! navmesh baker.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use glam::{Mat4, Vec3};

use super::arena::ChunkArena;
use super::chunk::{Chunk, ChunkCoord};
use super::lod::LodDescriptor;
use crate::clutter::pool::ObjectPool;
use crate::clutter::rules::PrefabKind;
use crate::clutter::scatter::{PlacementRecord, ScatterEngine};
use crate::core::Result;
use crate::generation::config::GenerationConfig;
use crate::generation::mesh_job::{MeshJob, MeshJobContext, MeshJobOutput};
use crate::generation::scratch::ScratchRegistry;
use crate::generation::worker::WorkerPool;
use crate::mesh::TerrainMesh;
use crate::navigation::{NavBaker, NavigationBackend};
use crate::terrain::TerrainGenerator;

/// Instanced draws are limited to this many transforms
pub const MAX_INSTANCES_PER_BATCH: usize = 1023;

/// LOD table index treated as full detail
pub const HIGHEST_DETAIL_LOD: usize = 0;

/// Something with a world position, polled once per frame
pub trait Viewer {
    fn position(&self) -> Vec3;
}

impl Viewer for Vec3 {
    fn position(&self) -> Vec3 {
        *self
    }
}

/// What happened during one update
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub chunks_created: usize,
    pub chunks_decommissioned: usize,
    pub jobs_spawned: usize,
    pub meshes_completed: usize,
    pub objects_placed: usize,
}

/// Transforms of one prefab kind for a single instanced draw
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceBatch {
    pub prefab: PrefabKind,
    pub transforms: Vec<Mat4>,
}

/// Owns the live chunk set and drives its background work.
pub struct WorldPartition<P: ObjectPool, N: NavigationBackend> {
    dimensions: [u32; 3],
    lods: LodDescriptor,
    job_context: MeshJobContext,
    scatter: Arc<ScatterEngine>,
    workers: WorkerPool,
    chunks: ChunkArena,
    pool: P,
    nav: NavBaker<N>,
    viewer_coord: Option<ChunkCoord>,
    frame: u64,
}

impl<P: ObjectPool, N: NavigationBackend> WorldPartition<P, N> {
    /// Validate `config`, bake the density field and register prefabs.
    pub fn new(config: &GenerationConfig, mut pool: P, navigation: N) -> Result<Self> {
        config.validate()?;
        let dimensions = config.chunk_dimensions;
        let lods = config.lod_descriptor()?;

        let generator = Arc::new(TerrainGenerator::new(&config.biome, config.seed, dimensions[1])?);
        let scatter = Arc::new(ScatterEngine::new(
            &config.placement_rules,
            &config.prefabs,
            config.seed,
            config.iso_level,
            dimensions[1],
        )?);
        let workers = WorkerPool::new(config.worker_threads)?;

        for (i, prefab) in config.prefabs.iter().enumerate() {
            pool.register(PrefabKind(i as u16), prefab.prewarm);
        }

        let nav = NavBaker::new(
            navigation,
            config.nav_agent.clone(),
            config.nav_layer_mask,
            config.nav_rebuild_interval()?,
            config.max_concurrent_bakes,
        );

        log::info!(
            "World partition ready: chunks {:?}, {} LODs up to {}m, {} placement rules",
            dimensions,
            lods.len(),
            lods.max_distance(),
            scatter.rule_count()
        );

        Ok(Self {
            dimensions,
            lods,
            job_context: MeshJobContext {
                generator,
                dimensions,
                iso_level: config.iso_level,
                registry: ScratchRegistry::new(),
            },
            scatter,
            workers,
            chunks: ChunkArena::new(),
            pool,
            nav,
            viewer_coord: None,
            frame: 0,
        })
    }

    /// Run one frame for `viewer`.
    pub fn update(&mut self, viewer: &impl Viewer) -> FrameStats {
        self.update_at(viewer.position(), Instant::now())
    }

    /// Run one frame with the viewer at `position` and the clock at `now`.
    pub fn update_at(&mut self, position: Vec3, now: Instant) -> FrameStats {
        self.frame += 1;
        let mut stats = FrameStats::default();

        let center = ChunkCoord::from_world_pos(position, self.dimensions);
        if self.viewer_coord != Some(center) {
            log::trace!("Viewer entered chunk {:?}", center);
            self.viewer_coord = Some(center);
        }

        let visible = self.visible_chunks(center, position);
        let visible_coords: HashSet<ChunkCoord> = visible.iter().map(|(coord, _)| *coord).collect();

        let stale: Vec<_> = self
            .chunks
            .iter()
            .filter(|(_, chunk)| !visible_coords.contains(&chunk.coord()))
            .map(|(handle, _)| handle)
            .collect();
        for handle in stale {
            if let Some(chunk) = self.chunks.remove(handle) {
                chunk.decommission(&mut self.pool);
                stats.chunks_decommissioned += 1;
            }
        }

        for (coord, lod) in visible {
            let handle = match self.chunks.handle_of(coord) {
                Some(handle) => handle,
                None => {
                    let chunk = Chunk::new(coord, coord.bounds(self.dimensions), self.lods.len(), lod);
                    match self.chunks.insert(chunk) {
                        Ok(handle) => {
                            log::debug!("Chunk {:?} instantiated at LOD {}", coord, lod);
                            stats.chunks_created += 1;
                            handle
                        }
                        Err(_) => continue,
                    }
                }
            };

            let Some(chunk) = self.chunks.get_mut(handle) else {
                continue;
            };
            if chunk.select_lod(lod) {
                let Some(info) = self.lods.get(lod) else {
                    continue;
                };
                let job = MeshJob::new(coord, lod, info.step(), self.job_context.clone());
                chunk.begin_generation(lod, self.workers.spawn(move || job.run()));
                stats.jobs_spawned += 1;
            }
        }

        self.poll_chunks(&mut stats);
        self.nav.update(now);

        stats
    }

    /// Coordinates within range of the viewer and their selected LOD,
    /// nearest rings first.
    fn visible_chunks(&self, center: ChunkCoord, position: Vec3) -> Vec<(ChunkCoord, usize)> {
        let max_distance = self.lods.max_distance();
        let radius_x = ((max_distance / self.dimensions[0] as f32).ceil() as i32).saturating_add(1);
        let radius_z = ((max_distance / self.dimensions[2] as f32).ceil() as i32).saturating_add(1);

        let mut visible = Vec::new();
        let mut seen = HashSet::new();
        for dz in -radius_z..=radius_z {
            for dx in -radius_x..=radius_x {
                // Offsets clamp at the edge of the coordinate range
                let coord = center.offset(dx, dz);
                if !seen.insert(coord) {
                    continue;
                }
                let distance = coord.bounds(self.dimensions).distance_to_point(position);
                if let Some(lod) = self.lods.select(distance) {
                    visible.push((coord, lod, distance));
                }
            }
        }
        visible.sort_by(|a, b| a.2.total_cmp(&b.2));
        visible.into_iter().map(|(coord, lod, _)| (coord, lod)).collect()
    }

    fn poll_chunks(&mut self, stats: &mut FrameStats) {
        let Self {
            chunks,
            pool,
            nav,
            workers,
            scatter,
            ..
        } = self;

        for (_, chunk) in chunks.iter_mut() {
            for (lod, result) in chunk.poll_mesh_jobs() {
                integrate_mesh(chunk, lod, result, nav, workers, scatter, stats);
            }
            if let Some(result) = chunk.poll_scatter() {
                integrate_placements(chunk, result, pool, stats);
            }
        }
    }

    /// Block until every in-flight job and placement scan has been integrated.
    pub fn wait_for_jobs(&mut self) -> FrameStats {
        let mut stats = FrameStats::default();
        let Self {
            chunks,
            pool,
            nav,
            workers,
            scatter,
            ..
        } = self;

        loop {
            let mut progressed = false;
            for (_, chunk) in chunks.iter_mut() {
                for (lod, result) in chunk.join_mesh_jobs() {
                    progressed = true;
                    integrate_mesh(chunk, lod, result, nav, workers, scatter, &mut stats);
                }
                if let Some(result) = chunk.join_scatter() {
                    progressed = true;
                    integrate_placements(chunk, result, pool, &mut stats);
                }
            }
            if !progressed {
                break;
            }
        }
        stats
    }

    /// Decommission every live chunk.
    pub fn clear(&mut self) {
        for handle in self.chunks.handles() {
            if let Some(chunk) = self.chunks.remove(handle) {
                chunk.decommission(&mut self.pool);
            }
        }
        self.viewer_coord = None;
    }

    /// Tear down the world and hand back the collaborators.
    pub fn shutdown(mut self) -> (P, N) {
        self.clear();
        log::info!("World partition shut down after {} frames", self.frame);
        (self.pool, self.nav.into_backend())
    }

    /// Placed objects of visible chunks, grouped by prefab into instanced batches.
    pub fn instance_batches(&self) -> Vec<InstanceBatch> {
        let mut chunks: Vec<&Chunk> = self
            .chunks
            .iter()
            .map(|(_, chunk)| chunk)
            .filter(|chunk| chunk.displayed_lod().is_some())
            .collect();
        chunks.sort_by_key(|chunk| chunk.coord());

        let mut by_prefab: BTreeMap<PrefabKind, Vec<Mat4>> = BTreeMap::new();
        for chunk in chunks {
            for placed in chunk.placements() {
                by_prefab
                    .entry(placed.record.prefab)
                    .or_default()
                    .push(placed.record.transform());
            }
        }

        by_prefab
            .into_iter()
            .flat_map(|(prefab, transforms)| {
                transforms
                    .chunks(MAX_INSTANCES_PER_BATCH)
                    .map(|batch| InstanceBatch {
                        prefab,
                        transforms: batch.to_vec(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Displayed mesh of every chunk that has one
    pub fn visible_meshes(&self) -> Vec<(ChunkCoord, &TerrainMesh)> {
        let mut meshes: Vec<_> = self
            .chunks
            .iter()
            .filter_map(|(_, chunk)| chunk.displayed_mesh().map(|mesh| (chunk.coord(), mesh)))
            .collect();
        meshes.sort_by_key(|(coord, _)| *coord);
        meshes
    }

    pub fn chunk(&self, coord: ChunkCoord) -> Option<&Chunk> {
        self.chunks.get_by_coord(coord)
    }

    pub fn live_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn live_coords(&self) -> Vec<ChunkCoord> {
        let mut coords: Vec<_> = self.chunks.iter().map(|(_, chunk)| chunk.coord()).collect();
        coords.sort();
        coords
    }

    pub fn has_pending_work(&self) -> bool {
        self.chunks.iter().any(|(_, chunk)| chunk.has_pending_work())
    }

    pub fn lods(&self) -> &LodDescriptor {
        &self.lods
    }

    pub fn dimensions(&self) -> [u32; 3] {
        self.dimensions
    }

    pub fn generator(&self) -> &TerrainGenerator {
        &self.job_context.generator
    }

    pub fn scratch(&self) -> &ScratchRegistry {
        &self.job_context.registry
    }

    pub fn pool(&self) -> &P {
        &self.pool
    }

    pub fn navigation(&self) -> &NavBaker<N> {
        &self.nav
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }
}

/// Store a finished mesh; at full detail, report bounds and start placement.
fn integrate_mesh<N: NavigationBackend>(
    chunk: &mut Chunk,
    lod: usize,
    result: Result<MeshJobOutput>,
    nav: &mut NavBaker<N>,
    workers: &WorkerPool,
    scatter: &Arc<ScatterEngine>,
    stats: &mut FrameStats,
) {
    let output = match result {
        Ok(output) => output,
        Err(e) => {
            if chunk.record_mesh_failure(lod) {
                log::warn!("Mesh job for chunk {:?} LOD {} failed, giving up: {}", chunk.coord(), lod, e);
            } else {
                log::warn!("Mesh job for chunk {:?} LOD {} failed, retrying: {}", chunk.coord(), lod, e);
            }
            return;
        }
    };

    let (mesh, density) = output.into_mesh();
    log::trace!(
        "Chunk {:?} LOD {}: {} triangles",
        chunk.coord(),
        lod,
        mesh.triangle_count()
    );
    chunk.store_mesh(lod, mesh);
    stats.meshes_completed += 1;

    if lod != HIGHEST_DETAIL_LOD {
        return;
    }
    if chunk.mark_nav_reported() {
        nav.enqueue(chunk.bounds());
    }
    if chunk.needs_scatter() {
        if scatter.is_empty() {
            chunk.skip_scatter();
        } else {
            let engine = Arc::clone(scatter);
            let coord = chunk.coord();
            chunk.begin_scatter(workers.spawn(move || engine.scatter(&density, coord)));
        }
    }
}

fn integrate_placements<P: ObjectPool>(
    chunk: &mut Chunk,
    result: Result<Vec<PlacementRecord>>,
    pool: &mut P,
    stats: &mut FrameStats,
) {
    match result {
        Ok(records) => {
            stats.objects_placed += records.len();
            chunk.place_objects(records, pool);
        }
        Err(e) => log::warn!("Placement scan for chunk {:?} failed: {}", chunk.coord(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clutter::pool::InstancePool;
    use crate::navigation::RecordingNavigation;
    use crate::streaming::lod::LodInfo;

    fn config() -> GenerationConfig {
        GenerationConfig {
            chunk_dimensions: [16, 64, 16],
            lods: vec![LodInfo::new(0, 12.0), LodInfo::new(1, 28.0)],
            nav_rebuild_interval_secs: 0.0,
            worker_threads: 2,
            ..Default::default()
        }
    }

    fn world() -> WorldPartition<InstancePool, RecordingNavigation> {
        WorldPartition::new(&config(), InstancePool::new(), RecordingNavigation::new(0)).unwrap()
    }

    #[test]
    fn test_visible_set_matches_lod_distances() {
        let mut world = world();
        let viewer = Vec3::new(8.0, 30.0, 8.0);
        world.update(&viewer);

        for coord in world.live_coords() {
            let distance = coord.bounds([16, 64, 16]).distance_to_point(viewer);
            assert!(distance <= 28.0);
        }
        // Viewer chunk and its neighbours are close enough for full detail
        let center = world.chunk(ChunkCoord::new(0, 0)).unwrap();
        assert_eq!(center.selected_lod(), 0);
        assert_eq!(world.chunk(ChunkCoord::new(1, 0)).unwrap().selected_lod(), 0);
        assert_eq!(world.chunk(ChunkCoord::new(2, 0)).unwrap().selected_lod(), 1);
        assert!(world.chunk(ChunkCoord::new(3, 0)).is_none());
    }

    #[test]
    fn test_meshes_arrive_and_are_displayed() {
        let mut world = world();
        let viewer = Vec3::new(8.0, 30.0, 8.0);
        let stats = world.update(&viewer);
        assert_eq!(stats.jobs_spawned, world.live_chunks());

        world.wait_for_jobs();
        assert!(!world.has_pending_work());
        assert_eq!(world.visible_meshes().len(), world.live_chunks());

        // No chunk asks for its mesh twice
        let stats = world.update(&viewer);
        assert_eq!(stats.jobs_spawned, 0);
        assert_eq!(stats.chunks_created, 0);
    }

    #[test]
    fn test_nav_reported_once_per_full_detail_chunk() {
        let mut world = world();
        let viewer = Vec3::new(8.0, 30.0, 8.0);
        world.update(&viewer);
        world.wait_for_jobs();
        for _ in 0..20 {
            world.update(&viewer);
        }

        let full_detail = world
            .live_coords()
            .into_iter()
            .filter(|c| world.chunk(*c).unwrap().selected_lod() == 0)
            .count();
        let baked = &world.navigation().backend().baked;
        assert_eq!(baked.len(), full_detail);
        let unique: HashSet<_> = baked.iter().map(|b| (b.min.x as i32, b.min.z as i32)).collect();
        assert_eq!(unique.len(), baked.len());
    }

    #[test]
    fn test_leaving_range_decommissions() {
        let mut world = world();
        world.update(&Vec3::new(8.0, 30.0, 8.0));
        world.wait_for_jobs();
        assert!(world.pool().total_checked_out() > 0 || world.live_chunks() > 0);

        let stats = world.update(&Vec3::new(10_000.0, 30.0, 10_000.0));
        assert!(stats.chunks_decommissioned > 0);
        assert!(world.chunk(ChunkCoord::new(0, 0)).is_none());

        world.wait_for_jobs();
        let placed: usize = world
            .live_coords()
            .iter()
            .map(|c| world.chunk(*c).unwrap().placements().len())
            .sum();
        assert_eq!(world.pool().total_checked_out(), placed);
        assert_eq!(world.scratch().live_buffers(), 0);
    }

    #[test]
    fn test_instance_batches_limited() {
        let mut world = world();
        world.update(&Vec3::new(8.0, 30.0, 8.0));
        world.wait_for_jobs();

        let batches = world.instance_batches();
        let total: usize = batches.iter().map(|b| b.transforms.len()).sum();
        assert_eq!(total, world.pool().total_checked_out());
        for batch in &batches {
            assert!(!batch.transforms.is_empty());
            assert!(batch.transforms.len() <= MAX_INSTANCES_PER_BATCH);
        }
    }

    #[test]
    fn test_far_viewer_does_not_overflow() {
        let mut world = world();
        for viewer in [
            Vec3::new(1e11, 20.0, 0.0),
            Vec3::new(-1e11, 20.0, -1e11),
            Vec3::new(f32::MAX, 20.0, f32::MIN),
        ] {
            world.update(&viewer);
        }
        world.wait_for_jobs();

        let coords = world.live_coords();
        let unique: HashSet<_> = coords.iter().collect();
        assert_eq!(unique.len(), coords.len());

        world.update(&Vec3::new(8.0, 30.0, 8.0));
        assert!(world.chunk(ChunkCoord::new(0, 0)).is_some());
    }

    #[test]
    fn test_shutdown_returns_everything() {
        let mut world = world();
        world.update(&Vec3::new(8.0, 30.0, 8.0));
        let registry = world.scratch().clone();
        let (pool, _nav) = world.shutdown();
        assert_eq!(pool.total_checked_out(), 0);
        assert_eq!(registry.live_buffers(), 0);
    }
}
