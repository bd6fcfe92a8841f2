//! Streamed terrain chunks

use glam::{IVec2, Vec3};

use crate::clutter::pool::{InstanceHandle, ObjectPool};
use crate::clutter::scatter::PlacementRecord;
use crate::core::Result;
use crate::generation::mesh_job::MeshJobOutput;
use crate::generation::worker::TaskHandle;
use crate::math::Aabb;
use crate::mesh::TerrainMesh;

/// Chunk coordinate on the XZ grid
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChunkCoord {
    pub x: i32,
    pub z: i32,
}

impl ChunkCoord {
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }

    /// Chunk containing a world position
    pub fn from_world_pos(pos: Vec3, dimensions: [u32; 3]) -> Self {
        Self {
            x: (pos.x / dimensions[0] as f32).floor() as i32,
            z: (pos.z / dimensions[2] as f32).floor() as i32,
        }
    }

    /// World-space minimum corner
    pub fn world_origin(&self, dimensions: [u32; 3]) -> Vec3 {
        Vec3::new(
            self.x as f32 * dimensions[0] as f32,
            0.0,
            self.z as f32 * dimensions[2] as f32,
        )
    }

    pub fn bounds(&self, dimensions: [u32; 3]) -> Aabb {
        let size = Vec3::new(dimensions[0] as f32, dimensions[1] as f32, dimensions[2] as f32);
        Aabb::from_min_size(self.world_origin(dimensions), size)
    }

    /// Neighbouring coordinate, clamped to the representable range
    pub fn offset(&self, dx: i32, dz: i32) -> Self {
        Self::new(self.x.saturating_add(dx), self.z.saturating_add(dz))
    }

    pub fn as_ivec2(&self) -> IVec2 {
        IVec2::new(self.x, self.z)
    }
}

/// A pooled instance owned by a chunk
#[derive(Debug)]
pub struct PlacedObject {
    pub record: PlacementRecord,
    pub handle: InstanceHandle,
}

/// Mesh jobs tried for one LOD before the chunk stops requesting it
pub const MAX_MESH_ATTEMPTS: u32 = 3;

/// Mesh cache entry for one LOD
#[derive(Default)]
pub struct LodMesh {
    /// Set once a job for this LOD has finished, even if the mesh is empty
    pub mesh: Option<TerrainMesh>,
    /// The in-flight job for this LOD
    pub pending: Option<TaskHandle<MeshJobOutput>>,
    /// Jobs for this LOD that ended without a result
    pub failures: u32,
}

impl LodMesh {
    pub fn has_mesh(&self) -> bool {
        self.mesh.is_some()
    }

    pub fn is_generating(&self) -> bool {
        self.pending.is_some()
    }

    /// No further jobs will be started for this LOD
    pub fn has_failed(&self) -> bool {
        self.failures >= MAX_MESH_ATTEMPTS
    }
}

/// Lifecycle state of a live chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkState {
    /// Waiting on the mesh for the selected LOD
    Generating,
    /// Showing the mesh for the selected LOD
    HasMesh,
}

/// Per-cell state: bounds, per-LOD mesh cache, outstanding work and the
/// objects placed on its surface.
pub struct Chunk {
    coord: ChunkCoord,
    bounds: Aabb,
    lods: Vec<LodMesh>,
    /// LOD chosen by distance this frame
    selected_lod: usize,
    /// LOD whose mesh is currently shown
    displayed_lod: Option<usize>,
    scatter_task: Option<TaskHandle<Vec<PlacementRecord>>>,
    scatter_started: bool,
    placements: Vec<PlacedObject>,
    nav_reported: bool,
}

impl Chunk {
    pub fn new(coord: ChunkCoord, bounds: Aabb, lod_count: usize, selected_lod: usize) -> Self {
        Self {
            coord,
            bounds,
            lods: (0..lod_count).map(|_| LodMesh::default()).collect(),
            selected_lod,
            displayed_lod: None,
            scatter_task: None,
            scatter_started: false,
            placements: Vec::new(),
            nav_reported: false,
        }
    }

    pub fn coord(&self) -> ChunkCoord {
        self.coord
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn selected_lod(&self) -> usize {
        self.selected_lod
    }

    pub fn displayed_lod(&self) -> Option<usize> {
        self.displayed_lod
    }

    pub fn state(&self) -> ChunkState {
        if self.displayed_lod == Some(self.selected_lod) {
            ChunkState::HasMesh
        } else {
            ChunkState::Generating
        }
    }

    pub fn lod(&self, index: usize) -> Option<&LodMesh> {
        self.lods.get(index)
    }

    /// Mesh currently shown, if any
    pub fn displayed_mesh(&self) -> Option<&TerrainMesh> {
        self.lods.get(self.displayed_lod?)?.mesh.as_ref()
    }

    pub fn placements(&self) -> &[PlacedObject] {
        &self.placements
    }

    pub fn nav_reported(&self) -> bool {
        self.nav_reported
    }

    pub fn has_pending_work(&self) -> bool {
        self.scatter_task.is_some() || self.lods.iter().any(LodMesh::is_generating)
    }

    /// Select a LOD and show its mesh if it exists.
    ///
    /// Returns true when the selected LOD needs a job: no mesh yet and none in
    /// flight. The previous mesh stays displayed until the new one arrives.
    pub fn select_lod(&mut self, lod: usize) -> bool {
        self.selected_lod = lod;
        let Some(entry) = self.lods.get(lod) else {
            return false;
        };
        if entry.has_mesh() {
            self.displayed_lod = Some(lod);
            return false;
        }
        !entry.is_generating() && !entry.has_failed()
    }

    pub fn begin_generation(&mut self, lod: usize, task: TaskHandle<MeshJobOutput>) {
        if let Some(entry) = self.lods.get_mut(lod) {
            entry.pending = Some(task);
        }
    }

    /// Take the results of mesh jobs that have finished, without blocking.
    pub fn poll_mesh_jobs(&mut self) -> Vec<(usize, Result<MeshJobOutput>)> {
        let mut finished = Vec::new();
        for (lod, entry) in self.lods.iter_mut().enumerate() {
            let Some(task) = entry.pending.as_mut() else {
                continue;
            };
            if let Some(result) = task.try_take() {
                entry.pending = None;
                finished.push((lod, result));
            }
        }
        finished
    }

    /// Block until every in-flight mesh job has finished.
    pub fn join_mesh_jobs(&mut self) -> Vec<(usize, Result<MeshJobOutput>)> {
        self.lods
            .iter_mut()
            .enumerate()
            .filter_map(|(lod, entry)| entry.pending.take().map(|task| (lod, task.join())))
            .collect()
    }

    /// Cache a finished mesh and show it if it is the selected LOD.
    pub fn store_mesh(&mut self, lod: usize, mesh: TerrainMesh) {
        if let Some(entry) = self.lods.get_mut(lod) {
            entry.mesh = Some(mesh);
            if lod == self.selected_lod {
                self.displayed_lod = Some(lod);
            }
        }
    }

    /// Count a failed mesh job. Returns true once the LOD is given up on.
    pub fn record_mesh_failure(&mut self, lod: usize) -> bool {
        let Some(entry) = self.lods.get_mut(lod) else {
            return false;
        };
        entry.failures += 1;
        entry.has_failed()
    }

    /// Mark the bounds as handed to the navmesh baker.
    ///
    /// Returns true only the first time.
    pub fn mark_nav_reported(&mut self) -> bool {
        !std::mem::replace(&mut self.nav_reported, true)
    }

    /// True if placement has never been started for this chunk
    pub fn needs_scatter(&self) -> bool {
        !self.scatter_started
    }

    pub fn begin_scatter(&mut self, task: TaskHandle<Vec<PlacementRecord>>) {
        self.scatter_started = true;
        self.scatter_task = Some(task);
    }

    /// Mark placement as done without running a scan
    pub fn skip_scatter(&mut self) {
        self.scatter_started = true;
    }

    pub fn poll_scatter(&mut self) -> Option<Result<Vec<PlacementRecord>>> {
        let result = self.scatter_task.as_mut()?.try_take()?;
        self.scatter_task = None;
        Some(result)
    }

    pub fn join_scatter(&mut self) -> Option<Result<Vec<PlacementRecord>>> {
        self.scatter_task.take().map(TaskHandle::join)
    }

    /// Acquire a pooled instance for each record.
    pub fn place_objects<P: ObjectPool>(&mut self, records: Vec<PlacementRecord>, pool: &mut P) {
        self.placements.reserve(records.len());
        for record in records {
            let handle = pool.acquire(record.prefab, record.position, record.rotation);
            self.placements.push(PlacedObject { record, handle });
        }
    }

    /// Tear the chunk down.
    ///
    /// In-flight jobs are finished synchronously and their buffers dropped,
    /// then every placed instance goes back to the pool.
    pub fn decommission<P: ObjectPool>(mut self, pool: &mut P) {
        let cancelled = self.join_mesh_jobs().len();
        if let Some(Err(e)) = self.join_scatter() {
            log::debug!("Placement scan for {:?} ended without a result: {}", self.coord, e);
        }
        let released = self.placements.len();
        for placed in self.placements.drain(..) {
            pool.release(placed.handle, placed.record.prefab);
        }
        log::debug!(
            "Decommissioned chunk {:?} ({} jobs cancelled, {} objects released)",
            self.coord,
            cancelled,
            released
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clutter::pool::InstancePool;
    use crate::clutter::rules::PrefabKind;
    use crate::generation::scratch::ScratchRegistry;
    use crate::generation::density_grid::DensityGrid;
    use glam::Quat;

    const DIMS: [u32; 3] = [32, 64, 32];

    fn chunk() -> Chunk {
        let coord = ChunkCoord::new(1, -1);
        Chunk::new(coord, coord.bounds(DIMS), 3, 0)
    }

    fn output(registry: &ScratchRegistry, lod: usize) -> MeshJobOutput {
        MeshJobOutput {
            coord: ChunkCoord::new(1, -1),
            lod,
            vertices: registry.with_capacity(0),
            indices: registry.with_capacity(0),
            density: DensityGrid::from_fn([4, 4, 4], 1, Vec3::ZERO, registry, |_| 1.0),
        }
    }

    #[test]
    fn test_coord_from_world_pos() {
        assert_eq!(ChunkCoord::from_world_pos(Vec3::new(10.0, 50.0, 40.0), DIMS), ChunkCoord::new(0, 1));
        assert_eq!(ChunkCoord::from_world_pos(Vec3::new(-0.5, 0.0, -32.0), DIMS), ChunkCoord::new(-1, -1));
        assert_eq!(ChunkCoord::from_world_pos(Vec3::new(-32.5, 0.0, 0.0), DIMS), ChunkCoord::new(-2, 0));
    }

    #[test]
    fn test_coord_offset_saturates() {
        let far = ChunkCoord::from_world_pos(Vec3::new(1e11, 0.0, -1e11), DIMS);
        assert_eq!(far, ChunkCoord::new(i32::MAX, i32::MIN));
        assert_eq!(far.offset(3, -3), far);
        assert_eq!(far.offset(-1, 1), ChunkCoord::new(i32::MAX - 1, i32::MIN + 1));
    }

    #[test]
    fn test_coord_bounds() {
        let bounds = ChunkCoord::new(1, -2).bounds(DIMS);
        assert_eq!(bounds.min, Vec3::new(32.0, 0.0, -64.0));
        assert_eq!(bounds.max, Vec3::new(64.0, 64.0, -32.0));
    }

    #[test]
    fn test_select_requests_generation_once() {
        let mut chunk = chunk();
        assert!(chunk.select_lod(0));
        chunk.begin_generation(0, TaskHandle::ready(output(&ScratchRegistry::new(), 0)));
        assert!(!chunk.select_lod(0));
        assert_eq!(chunk.state(), ChunkState::Generating);
    }

    #[test]
    fn test_displayed_lod_switches_when_mesh_arrives() {
        let mut chunk = chunk();
        chunk.store_mesh(0, TerrainMesh::empty(Vec3::ZERO));
        assert_eq!(chunk.displayed_lod(), Some(0));
        assert_eq!(chunk.state(), ChunkState::HasMesh);

        // Coarser LOD requested: the old mesh stays until the new one exists
        assert!(chunk.select_lod(1));
        assert_eq!(chunk.displayed_lod(), Some(0));
        chunk.store_mesh(1, TerrainMesh::empty(Vec3::ZERO));
        assert_eq!(chunk.displayed_lod(), Some(1));

        // Cached LOD 0 is shown again without a new job
        assert!(!chunk.select_lod(0));
        assert_eq!(chunk.displayed_lod(), Some(0));
    }

    #[test]
    fn test_poll_takes_finished_jobs() {
        let registry = ScratchRegistry::new();
        let mut chunk = chunk();
        chunk.begin_generation(2, TaskHandle::ready(output(&registry, 2)));
        assert!(chunk.has_pending_work());

        let finished = chunk.poll_mesh_jobs();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].0, 2);
        assert!(!chunk.has_pending_work());
        drop(finished);
        assert_eq!(registry.live_buffers(), 0);
    }

    #[test]
    fn test_failed_lod_stops_requesting_jobs() {
        let mut chunk = chunk();
        for attempt in 1..MAX_MESH_ATTEMPTS {
            assert!(chunk.select_lod(1));
            assert!(!chunk.record_mesh_failure(1), "gave up after {attempt} attempts");
        }
        assert!(chunk.select_lod(1));
        assert!(chunk.record_mesh_failure(1));
        assert!(chunk.lod(1).unwrap().has_failed());

        // Given up: no new job, other LODs unaffected
        assert!(!chunk.select_lod(1));
        assert!(!chunk.select_lod(1));
        assert!(chunk.select_lod(0));
    }

    #[test]
    fn test_nav_reported_once() {
        let mut chunk = chunk();
        assert!(chunk.mark_nav_reported());
        assert!(!chunk.mark_nav_reported());
        assert!(chunk.nav_reported());
    }

    #[test]
    fn test_decommission_releases_everything() {
        let registry = ScratchRegistry::new();
        let mut pool = InstancePool::new();
        pool.register(PrefabKind(0), 4);

        let mut chunk = chunk();
        chunk.begin_generation(0, TaskHandle::ready(output(&registry, 0)));
        let records = (0..3)
            .map(|i| PlacementRecord {
                position: Vec3::splat(i as f32),
                rotation: Quat::IDENTITY,
                scale: 1.0,
                prefab: PrefabKind(0),
                rule: 0,
            })
            .collect();
        chunk.place_objects(records, &mut pool);
        assert_eq!(pool.checked_out(PrefabKind(0)), 3);

        chunk.decommission(&mut pool);
        assert_eq!(pool.checked_out(PrefabKind(0)), 0);
        assert_eq!(registry.live_buffers(), 0);
    }
}
