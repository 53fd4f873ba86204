//! Execution backends for the culling passes.
//!
//! The orchestrator drives a [`CullExecutor`] without knowing where the work
//! runs. [`CpuCuller`] executes both passes on the CPU with rayon and is the
//! reference for correctness; a GPU backend records the same passes into
//! compute dispatches and returns device buffer handles instead of host
//! vectors.

use glam::Mat4;
use tracing::debug;

use forward_scene::LightStore;

use crate::config::GridDimensions;
use crate::cull::{CullingSnapshot, cull_lights};
use crate::error::CullingResult;
use crate::frustum::{TileFrustum, build_frustum_grid};

/// Inputs of the frustum grid build pass.
#[derive(Clone, Copy, Debug)]
pub struct GridBuildContext {
    /// Inverse of the camera projection matrix (Vulkan clip conventions)
    pub inverse_projection: Mat4,
    /// Grid dimensions derived from the current viewport
    pub dims: GridDimensions,
}

/// Per-frame inputs of the light culling pass.
#[derive(Clone, Copy, Debug)]
pub struct CullContext {
    /// Camera view matrix for this frame
    pub view: Mat4,
    /// Grid dimensions matching the frustums built last
    pub dims: GridDimensions,
    /// Per-tile light cap; overflowing lights are dropped
    pub max_lights_per_tile: u32,
    /// Accumulated scene time in seconds
    pub time: f32,
    /// True when the frustum grid was rebuilt earlier this frame.
    /// A GPU backend must order the culling dispatch after the rebuild;
    /// the CPU backend runs the passes in call order anyway.
    pub grid_rebuilt: bool,
}

/// A backend that executes the culling passes.
///
/// Call order per frame: `begin_frame`, then `build_frustum_grid` when the
/// projection or viewport changed, then `cull_lights`. The produced output
/// stays valid until the next `begin_frame`.
pub trait CullExecutor {
    /// What a finished frame hands back: host vectors for the CPU backend,
    /// device buffer handles plus a semaphore for a GPU backend.
    type Output;

    /// Prepares the backend for a new frame.
    fn begin_frame(&mut self) -> CullingResult<()>;

    /// Rebuilds the tile frustum grid.
    fn build_frustum_grid(&mut self, ctx: &GridBuildContext) -> CullingResult<()>;

    /// Bins the store's lights into the current grid.
    fn cull_lights(&mut self, lights: &LightStore, ctx: &CullContext) -> CullingResult<()>;

    /// The output of the last completed culling pass.
    fn output(&self) -> &Self::Output;
}

/// CPU reference backend.
///
/// Keeps the frustum grid and the last snapshot as host vectors so tests and
/// tools can inspect them directly.
#[derive(Default)]
pub struct CpuCuller {
    frustums: Vec<TileFrustum>,
    snapshot: CullingSnapshot,
}

impl CpuCuller {
    /// Creates a backend with no grid built yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current frustum grid, row-major.
    pub fn frustums(&self) -> &[TileFrustum] {
        &self.frustums
    }

    /// The last culling snapshot.
    pub fn snapshot(&self) -> &CullingSnapshot {
        &self.snapshot
    }
}

impl CullExecutor for CpuCuller {
    type Output = CullingSnapshot;

    fn begin_frame(&mut self) -> CullingResult<()> {
        Ok(())
    }

    fn build_frustum_grid(&mut self, ctx: &GridBuildContext) -> CullingResult<()> {
        self.frustums = build_frustum_grid(ctx.inverse_projection, ctx.dims);
        debug!("CPU frustum grid rebuilt: {} tiles", self.frustums.len());
        Ok(())
    }

    fn cull_lights(&mut self, lights: &LightStore, ctx: &CullContext) -> CullingResult<()> {
        self.snapshot = cull_lights(
            &self.frustums,
            lights.lights(),
            ctx.view,
            ctx.max_lights_per_tile,
        );
        Ok(())
    }

    fn output(&self) -> &Self::Output {
        &self.snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Viewport;
    use forward_scene::Light;
    use glam::Vec3;

    fn grid_ctx() -> GridBuildContext {
        let mut proj = Mat4::perspective_rh(90.0_f32.to_radians(), 1.0, 0.1, 100.0);
        proj.y_axis.y *= -1.0;
        GridBuildContext {
            inverse_projection: proj.inverse(),
            dims: GridDimensions::for_viewport(Viewport::new(32, 32), 16),
        }
    }

    #[test]
    fn test_cpu_culler_end_to_end() {
        let mut culler = CpuCuller::new();
        let grid = grid_ctx();

        let mut lights = LightStore::with_capacity(8);
        lights
            .push(Light {
                begin_pos: Vec3::new(0.0, 0.0, -5.0),
                end_pos: Vec3::new(0.0, 0.0, -5.0),
                radius: 0.5,
                ..Default::default()
            })
            .unwrap();

        culler.begin_frame().unwrap();
        culler.build_frustum_grid(&grid).unwrap();
        assert_eq!(culler.frustums().len(), 4);

        let cull = CullContext {
            view: Mat4::IDENTITY,
            dims: grid.dims,
            max_lights_per_tile: 128,
            time: 0.0,
            grid_rebuilt: true,
        };
        culler.cull_lights(&lights, &cull).unwrap();

        // A light on the view axis touches all four quadrant tiles
        let total: u32 = culler.output().light_grid.iter().map(|e| e.count).sum();
        assert!(total >= 1);
    }

    #[test]
    fn test_grid_persists_across_frames() {
        let mut culler = CpuCuller::new();
        culler.build_frustum_grid(&grid_ctx()).unwrap();
        let before = culler.frustums().to_vec();

        culler.begin_frame().unwrap();
        assert_eq!(culler.frustums(), before.as_slice());
    }
}
