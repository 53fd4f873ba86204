//! Forward+ Light Culling - Main Entry Point
//!
//! Headless demo driving the tile culling pipeline over an animated light
//! set. Runs the CPU backend by default; pass `--gpu` to run the compute
//! shader backend (requires a Vulkan device and compiled shaders under
//! `shaders/spirv/`).

use std::path::Path;

use anyhow::Result;
use glam::Vec3;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

use forward_core::Timer;
use forward_culling::{CpuCuller, CullingConfig, FrameOrchestrator, Viewport};
use forward_renderer::GpuCuller;
use forward_rhi::device::Device;
use forward_rhi::instance::Instance;
use forward_rhi::physical_device::select_physical_device;
use forward_scene::{Camera, LightStore};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const LIGHT_COUNT: usize = 1024;
const FRAME_COUNT: usize = 60;
const SEED: u64 = 42;

fn setup_scene(config: &CullingConfig, viewport: Viewport) -> Result<(Camera, LightStore)> {
    let mut camera = Camera::new();
    camera.position = Vec3::new(0.0, 8.0, 24.0);
    camera.set_perspective(45.0_f32.to_radians(), viewport.aspect(), 0.1, 1000.0);
    camera.look_at(Vec3::ZERO);

    let mut lights = LightStore::with_capacity(config.max_lights as usize);
    let mut rng = StdRng::seed_from_u64(SEED);
    lights.seed_random(
        LIGHT_COUNT,
        Vec3::new(-20.0, 0.0, -20.0),
        Vec3::new(20.0, 10.0, 20.0),
        (1.0, 4.0),
        &mut rng,
    )?;

    Ok((camera, lights))
}

fn run_cpu(config: CullingConfig, viewport: Viewport) -> Result<()> {
    let (mut camera, mut lights) = setup_scene(&config, viewport)?;
    let mut orchestrator = FrameOrchestrator::new(CpuCuller::new(), config, viewport)?;

    let mut timer = Timer::new();
    let mut total_entries = 0usize;
    let mut max_per_tile = 0u32;

    for _ in 0..FRAME_COUNT {
        let dt = timer.delta_secs();
        let snapshot = orchestrator.cull_frame(&mut camera, &mut lights, dt)?;

        total_entries += snapshot.total_entries();
        if let Some(peak) = snapshot.light_grid.iter().map(|e| e.count).max() {
            max_per_tile = max_per_tile.max(peak);
        }
    }

    let dims = orchestrator.dims();
    info!(
        "CPU culling done: {} frames in {:.1} ms, {} grid build(s), {}x{} tiles",
        orchestrator.frames_culled(),
        timer.elapsed_secs() * 1000.0,
        orchestrator.grid_builds(),
        dims.tiles_x,
        dims.tiles_y
    );
    info!(
        "Average {} light-tile entries per frame, busiest tile held {} lights",
        total_entries / FRAME_COUNT,
        max_per_tile
    );

    Ok(())
}

fn run_gpu(config: CullingConfig, viewport: Viewport) -> Result<()> {
    let (mut camera, mut lights) = setup_scene(&config, viewport)?;

    let instance = Instance::new(cfg!(debug_assertions))?;
    let physical_device = select_physical_device(instance.handle())?;
    info!("Using GPU: {}", physical_device.device_name());
    let device = Device::new(&instance, &physical_device)?;

    let culler = GpuCuller::new(device, config, Path::new("shaders/spirv"))?;
    let mut orchestrator = FrameOrchestrator::new(culler, config, viewport)?;

    let mut timer = Timer::new();
    for _ in 0..FRAME_COUNT {
        let dt = timer.delta_secs();
        orchestrator.cull_frame(&mut camera, &mut lights, dt)?;
    }

    // Pull the final frame's results back for inspection
    let snapshot = orchestrator.executor().read_results()?;
    let busiest = snapshot.light_grid.iter().map(|e| e.count).max().unwrap_or(0);
    let total: u32 = snapshot.light_grid.iter().map(|e| e.count).sum();

    let dims = orchestrator.dims();
    info!(
        "GPU culling done: {} frames in {:.1} ms, {} grid build(s), {}x{} tiles",
        orchestrator.frames_culled(),
        timer.elapsed_secs() * 1000.0,
        orchestrator.grid_builds(),
        dims.tiles_x,
        dims.tiles_y
    );
    info!(
        "Final frame: {} light-tile entries, busiest tile held {} lights",
        total, busiest
    );

    Ok(())
}

fn main() -> Result<()> {
    forward_core::init_logging();
    info!("Starting Forward+ light culling demo");

    let config = CullingConfig::default();
    let viewport = Viewport::new(WIDTH, HEIGHT);
    info!(
        "Viewport {}x{}, {} animated lights, {} frames",
        WIDTH, HEIGHT, LIGHT_COUNT, FRAME_COUNT
    );

    if std::env::args().any(|arg| arg == "--gpu") {
        run_gpu(config, viewport)
    } else {
        run_cpu(config, viewport)
    }
}
