//! Headless streaming driver: flies a viewer across the terrain and reports
//! what the world partition did.
//!
//! Usage: cargo run --release --bin stream_terrain -- [OPTIONS]
//!
//! Options:
//!   --config <PATH>   JSON generation config (default: built-in)
//!   --seed <SEED>     Override the config seed
//!   --frames <N>      Frames to simulate (default: 600)
//!   --speed <M>       Viewer distance per frame in meters (default: 2.0)
//!   --height <H>      Viewer altitude (default: 80.0)
//!   --write-config <PATH>  Save the effective config and exit

use std::process::ExitCode;
use std::time::Instant;

use glam::Vec3;

use strata::clutter::InstancePool;
use strata::core::logging;
use strata::generation::GenerationConfig;
use strata::navigation::RecordingNavigation;
use strata::streaming::{FrameStats, WorldPartition};

fn main() -> ExitCode {
    logging::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> strata::core::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let frames = parse_usize_arg(&args, "--frames").unwrap_or(600);
    let speed = parse_f32_arg(&args, "--speed").unwrap_or(2.0);
    let height = parse_f32_arg(&args, "--height").unwrap_or(80.0);

    let mut config = match parse_str_arg(&args, "--config") {
        Some(path) => GenerationConfig::load(path)?,
        None => GenerationConfig::default(),
    };
    if let Some(seed) = parse_u32_arg(&args, "--seed") {
        config.seed = seed;
    }
    if let Some(path) = parse_str_arg(&args, "--write-config") {
        config.save(&path)?;
        log::info!("Config written to {}", path);
        return Ok(());
    }

    println!("=== Strata Terrain Streaming ===");
    println!("Seed:   {}", config.seed);
    println!("Chunk:  {:?}", config.chunk_dimensions);
    println!("LODs:   {}", config.lods.len());
    println!("Frames: {} at {} m/frame", frames, speed);
    println!();

    let mut world = WorldPartition::new(&config, InstancePool::new(), RecordingNavigation::new(2))?;
    let start = Instant::now();
    let mut totals = FrameStats::default();

    for frame in 0..frames {
        let viewer = Vec3::new(frame as f32 * speed, height, frame as f32 * speed * 0.5);
        let stats = world.update(&viewer);
        accumulate(&mut totals, &stats);

        if frame % 100 == 0 {
            log::info!(
                "Frame {}: {} live chunks, {} meshes shown, {} objects",
                frame,
                world.live_chunks(),
                world.visible_meshes().len(),
                world.pool().total_checked_out()
            );
        }
    }

    let settled = world.wait_for_jobs();
    accumulate(&mut totals, &settled);
    let elapsed = start.elapsed();

    let triangles: usize = world
        .visible_meshes()
        .iter()
        .map(|(_, mesh)| mesh.triangle_count())
        .sum();
    let batches = world.instance_batches();
    let nav = world.navigation().stats();

    println!();
    println!("=== Streaming Complete ===");
    println!("Time:        {:.2}s ({:.1} ms/frame)", elapsed.as_secs_f64(), elapsed.as_secs_f64() * 1000.0 / frames.max(1) as f64);
    println!("Chunks:      {} created, {} decommissioned, {} live", totals.chunks_created, totals.chunks_decommissioned, world.live_chunks());
    println!("Meshes:      {} jobs, {} completed, {} triangles shown", totals.jobs_spawned, totals.meshes_completed, triangles);
    println!("Objects:     {} placed, {} live in {} batches", totals.objects_placed, world.pool().total_checked_out(), batches.len());
    println!("Navmesh:     {} queued, {} dispatched, {} completed", nav.enqueued, nav.dispatched, nav.completed);
    println!("Scratch:     {} allocations, {} live", world.scratch().total_allocations(), world.scratch().live_buffers());

    let (pool, _nav) = world.shutdown();
    if pool.total_checked_out() != 0 {
        log::warn!("{} instances still checked out after shutdown", pool.total_checked_out());
    }
    Ok(())
}

fn accumulate(totals: &mut FrameStats, frame: &FrameStats) {
    totals.chunks_created += frame.chunks_created;
    totals.chunks_decommissioned += frame.chunks_decommissioned;
    totals.jobs_spawned += frame.jobs_spawned;
    totals.meshes_completed += frame.meshes_completed;
    totals.objects_placed += frame.objects_placed;
}

fn parse_f32_arg(args: &[String], flag: &str) -> Option<f32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_u32_arg(args: &[String], flag: &str) -> Option<u32> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_usize_arg(args: &[String], flag: &str) -> Option<usize> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .and_then(|s| s.parse().ok())
}

fn parse_str_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
