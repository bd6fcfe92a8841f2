//! End-to-end streaming behaviour of the world partition

use std::collections::HashSet;
use std::time::{Duration, Instant};

use glam::Vec3;

use strata::clutter::InstancePool;
use strata::generation::GenerationConfig;
use strata::navigation::RecordingNavigation;
use strata::streaming::{ChunkCoord, ChunkState, LodInfo, WorldPartition};
use strata::terrain::BiomeParams;

type World = WorldPartition<InstancePool, RecordingNavigation>;

fn small_config(seed: u32) -> GenerationConfig {
    GenerationConfig {
        seed,
        chunk_dimensions: [16, 32, 16],
        lods: vec![LodInfo::new(0, 16.0), LodInfo::new(1, 40.0)],
        nav_rebuild_interval_secs: 0.0,
        worker_threads: 2,
        biome: BiomeParams {
            terrain_amplitude: 28.0,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn world(seed: u32) -> World {
    WorldPartition::new(&small_config(seed), InstancePool::new(), RecordingNavigation::new(0)).unwrap()
}

#[test]
fn test_moving_away_releases_all_resources() {
    let mut world = world(11);
    world.update(&Vec3::new(8.0, 20.0, 8.0));
    world.wait_for_jobs();
    assert!(world.live_chunks() > 0);

    // Leave in small steps so chunks age out one ring at a time
    for i in 1..=40 {
        world.update(&Vec3::new(8.0 + i as f32 * 16.0, 20.0, 8.0));
    }
    world.clear();

    assert_eq!(world.live_chunks(), 0);
    assert_eq!(world.pool().total_checked_out(), 0);
    assert_eq!(world.scratch().live_buffers(), 0);
    assert_eq!(world.scratch().live_bytes(), 0);
}

#[test]
fn test_decommission_with_jobs_in_flight() {
    let mut world = world(12);
    let stats = world.update(&Vec3::new(8.0, 20.0, 8.0));
    assert!(stats.jobs_spawned > 0);

    // Jump far away in the very next frame
    let stats = world.update(&Vec3::new(50_000.0, 20.0, -50_000.0));
    assert!(stats.chunks_decommissioned > 0);
    assert!(world.chunk(ChunkCoord::new(0, 0)).is_none());

    let (pool, _) = world.shutdown();
    assert_eq!(pool.total_checked_out(), 0);
}

#[test]
fn test_same_seed_same_world() {
    let mut a = world(99);
    let mut b = world(99);
    let viewer = Vec3::new(-40.0, 20.0, 25.0);
    a.update(&viewer);
    b.update(&viewer);
    a.wait_for_jobs();
    b.wait_for_jobs();

    assert_eq!(a.live_coords(), b.live_coords());
    let meshes_a = a.visible_meshes();
    let meshes_b = b.visible_meshes();
    assert_eq!(meshes_a.len(), meshes_b.len());
    for ((ca, ma), (cb, mb)) in meshes_a.iter().zip(meshes_b.iter()) {
        assert_eq!(ca, cb);
        assert_eq!(ma.positions(), mb.positions());
        assert_eq!(ma.indices().len(), mb.indices().len());
    }
    assert_eq!(a.instance_batches(), b.instance_batches());
}

#[test]
fn test_different_seed_different_terrain() {
    let mut a = world(1);
    let mut b = world(2);
    let viewer = Vec3::new(8.0, 20.0, 8.0);
    a.update(&viewer);
    b.update(&viewer);
    a.wait_for_jobs();
    b.wait_for_jobs();

    let differs = a
        .visible_meshes()
        .iter()
        .zip(b.visible_meshes().iter())
        .any(|((_, ma), (_, mb))| ma.positions() != mb.positions());
    assert!(differs);
}

#[test]
fn test_full_detail_chunks_reported_to_nav_once() {
    let mut world = world(5);
    let t0 = Instant::now();
    world.update_at(Vec3::new(8.0, 20.0, 8.0), t0);
    world.wait_for_jobs();

    // Wander inside the centre chunk for a while
    for i in 0..50 {
        let offset = (i % 5) as f32;
        world.update_at(Vec3::new(6.0 + offset, 20.0, 6.0 + offset), t0 + Duration::from_millis(i * 16));
    }

    let full_detail: HashSet<_> = world
        .live_coords()
        .into_iter()
        .filter(|c| world.chunk(*c).is_some_and(|chunk| chunk.selected_lod() == 0 && chunk.nav_reported()))
        .collect();
    let baked = &world.navigation().backend().baked;
    assert_eq!(baked.len(), full_detail.len());

    let baked_coords: HashSet<_> = baked
        .iter()
        .map(|b| ChunkCoord::from_world_pos(b.center(), [16, 32, 16]))
        .collect();
    assert_eq!(baked_coords.len(), baked.len());
    assert_eq!(baked_coords, full_detail);
    assert!(world.navigation().is_idle());
}

#[test]
fn test_coarse_chunks_upgrade_when_approached() {
    let mut world = world(8);
    world.update(&Vec3::new(8.0, 20.0, 8.0));
    world.wait_for_jobs();

    let target = ChunkCoord::new(2, 0);
    assert_eq!(world.chunk(target).unwrap().selected_lod(), 1);
    assert!(!world.chunk(target).unwrap().nav_reported());

    world.update(&Vec3::new(40.0, 20.0, 8.0));
    let chunk = world.chunk(target).unwrap();
    assert_eq!(chunk.selected_lod(), 0);
    // Coarse mesh stays on screen until the detailed one is ready
    if chunk.state() == ChunkState::Generating {
        assert_eq!(chunk.displayed_lod(), Some(1));
    }

    world.wait_for_jobs();
    let chunk = world.chunk(target).unwrap();
    assert_eq!(chunk.displayed_lod(), Some(0));
    assert!(chunk.nav_reported());
}

#[test]
fn test_rejects_invalid_config() {
    let mut config = small_config(1);
    config.lods = vec![LodInfo::new(0, 40.0), LodInfo::new(1, 16.0)];
    assert!(WorldPartition::new(&config, InstancePool::new(), RecordingNavigation::new(0)).is_err());

    let mut config = small_config(1);
    config.chunk_dimensions = [16, 30, 16];
    config.lods = vec![LodInfo::new(2, 16.0)];
    assert!(WorldPartition::new(&config, InstancePool::new(), RecordingNavigation::new(0)).is_err());

    let config = GenerationConfig {
        nav_rebuild_interval_secs: 1e20,
        ..small_config(1)
    };
    assert!(WorldPartition::new(&config, InstancePool::new(), RecordingNavigation::new(0)).is_err());
}
