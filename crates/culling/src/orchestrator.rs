//! Frame orchestration for the culling pipeline.
//!
//! The orchestrator owns the per-frame protocol: rebuild the frustum grid
//! only when the projection or viewport changed, then bin the lights every
//! frame. The grid is deliberately insensitive to camera movement, so a
//! frame where only the view matrix changed skips the rebuild pass entirely.

use tracing::{debug, info};

use forward_scene::{Camera, LightStore};

use crate::config::{CullingConfig, GridDimensions, Viewport};
use crate::error::{CullingError, CullingResult};
use crate::executor::{CullContext, CullExecutor, GridBuildContext};

/// Where a frame stands in the rebuild/cull cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    /// The frustum grid does not match the current projection or viewport
    GridStale,
    /// The grid is current; culling may run against it
    GridValid,
    /// Culling finished this frame; the executor output is readable
    CullingDone,
}

/// Drives an executor through the per-frame culling protocol.
pub struct FrameOrchestrator<E: CullExecutor> {
    executor: E,
    config: CullingConfig,
    dims: GridDimensions,
    state: FrameState,
    time: f32,
    frames_culled: u64,
    grid_builds: u64,
}

impl<E: CullExecutor> FrameOrchestrator<E> {
    /// Creates an orchestrator for a viewport.
    ///
    /// The grid starts stale; the first `cull_frame` builds it.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid or the viewport
    /// needs more tiles than the frustum capacity allows.
    pub fn new(executor: E, config: CullingConfig, viewport: Viewport) -> CullingResult<Self> {
        config.validate()?;
        let dims = config.grid_for(viewport)?;

        info!(
            "Culling pipeline configured: {}x{} tiles of {} px, caps: {} lights, {} per tile",
            dims.tiles_x, dims.tiles_y, dims.tile_size, config.max_lights, config.max_lights_per_tile
        );

        Ok(Self {
            executor,
            config,
            dims,
            state: FrameState::GridStale,
            time: 0.0,
            frames_culled: 0,
            grid_builds: 0,
        })
    }

    /// Adopts a new viewport and marks the grid stale.
    ///
    /// # Errors
    ///
    /// Returns an error when the viewport is degenerate or exceeds the
    /// frustum capacity; the previous grid stays in effect in that case.
    pub fn resize(&mut self, viewport: Viewport) -> CullingResult<()> {
        let dims = self.config.grid_for(viewport)?;
        if dims != self.dims {
            debug!(
                "Viewport resized to {}x{}, grid now {}x{} tiles",
                viewport.width, viewport.height, dims.tiles_x, dims.tiles_y
            );
            self.dims = dims;
            self.state = FrameState::GridStale;
        }
        Ok(())
    }

    /// Marks the grid stale, forcing a rebuild on the next frame.
    ///
    /// Projection changes made through [`Camera`] setters are picked up
    /// automatically; this is for projection state managed elsewhere.
    pub fn mark_projection_changed(&mut self) {
        self.state = FrameState::GridStale;
    }

    /// Runs one frame: advance the light animation, rebuild the grid when
    /// needed, and bin the lights.
    ///
    /// Returns the executor's output, valid until the next call.
    ///
    /// # Errors
    ///
    /// Returns an error when the light count exceeds the configured cap or
    /// the backend fails.
    pub fn cull_frame(
        &mut self,
        camera: &mut Camera,
        lights: &mut LightStore,
        dt: f32,
    ) -> CullingResult<&E::Output> {
        if camera.take_projection_dirty() {
            self.state = FrameState::GridStale;
        }

        if lights.len() > self.config.max_lights as usize {
            return Err(CullingError::CapacityExceeded {
                what: "light",
                requested: lights.len(),
                capacity: self.config.max_lights as usize,
            });
        }

        self.executor.begin_frame()?;

        // A finished frame's output is consumed; the grid itself stays valid
        if self.state == FrameState::CullingDone {
            self.state = FrameState::GridValid;
        }

        lights.advance(dt);
        self.time += dt;

        let grid_rebuilt = self.state == FrameState::GridStale;
        if grid_rebuilt {
            self.executor.build_frustum_grid(&GridBuildContext {
                inverse_projection: camera.inverse_projection_matrix(),
                dims: self.dims,
            })?;
            self.grid_builds += 1;
            self.state = FrameState::GridValid;
        }

        self.executor.cull_lights(
            lights,
            &CullContext {
                view: camera.view_matrix(),
                dims: self.dims,
                max_lights_per_tile: self.config.max_lights_per_tile,
                time: self.time,
                grid_rebuilt,
            },
        )?;

        self.frames_culled += 1;
        self.state = FrameState::CullingDone;

        Ok(self.executor.output())
    }

    /// Current frame state.
    pub fn state(&self) -> FrameState {
        self.state
    }

    /// Current grid dimensions.
    pub fn dims(&self) -> GridDimensions {
        self.dims
    }

    /// The pipeline configuration.
    pub fn config(&self) -> &CullingConfig {
        &self.config
    }

    /// Accumulated scene time in seconds.
    pub fn time(&self) -> f32 {
        self.time
    }

    /// Number of frames culled since creation.
    pub fn frames_culled(&self) -> u64 {
        self.frames_culled
    }

    /// Number of grid rebuilds since creation.
    pub fn grid_builds(&self) -> u64 {
        self.grid_builds
    }

    /// The underlying executor.
    pub fn executor(&self) -> &E {
        &self.executor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::CpuCuller;
    use forward_scene::Light;
    use glam::Vec3;

    fn setup(viewport: Viewport) -> (FrameOrchestrator<CpuCuller>, Camera, LightStore) {
        let orchestrator =
            FrameOrchestrator::new(CpuCuller::new(), CullingConfig::default(), viewport).unwrap();

        let mut camera = Camera::default();
        camera.set_aspect(viewport.width as f32 / viewport.height as f32);

        let mut lights = LightStore::with_capacity(16);
        lights
            .push(Light {
                begin_pos: Vec3::new(0.0, 0.0, -5.0),
                end_pos: Vec3::new(0.0, 0.0, -5.0),
                radius: 2.0,
                ..Default::default()
            })
            .unwrap();

        (orchestrator, camera, lights)
    }

    #[test]
    fn test_grid_starts_stale() {
        let (orchestrator, _, _) = setup(Viewport::new(1280, 720));
        assert_eq!(orchestrator.state(), FrameState::GridStale);
        assert_eq!(orchestrator.grid_builds(), 0);
    }

    #[test]
    fn test_first_frame_builds_grid_once() {
        let (mut orchestrator, mut camera, mut lights) = setup(Viewport::new(1280, 720));

        orchestrator.cull_frame(&mut camera, &mut lights, 0.016).unwrap();
        assert_eq!(orchestrator.state(), FrameState::CullingDone);
        assert_eq!(orchestrator.grid_builds(), 1);
        assert_eq!(orchestrator.frames_culled(), 1);
    }

    #[test]
    fn test_camera_movement_does_not_rebuild_grid() {
        let (mut orchestrator, mut camera, mut lights) = setup(Viewport::new(640, 480));

        orchestrator.cull_frame(&mut camera, &mut lights, 0.016).unwrap();

        camera.position = Vec3::new(3.0, 1.0, 2.0);
        camera.look_at(Vec3::ZERO);
        orchestrator.cull_frame(&mut camera, &mut lights, 0.016).unwrap();

        assert_eq!(orchestrator.grid_builds(), 1);
        assert_eq!(orchestrator.frames_culled(), 2);
    }

    #[test]
    fn test_projection_change_rebuilds_grid() {
        let (mut orchestrator, mut camera, mut lights) = setup(Viewport::new(640, 480));

        orchestrator.cull_frame(&mut camera, &mut lights, 0.016).unwrap();
        camera.set_perspective(60.0_f32.to_radians(), 640.0 / 480.0, 0.1, 500.0);
        orchestrator.cull_frame(&mut camera, &mut lights, 0.016).unwrap();

        assert_eq!(orchestrator.grid_builds(), 2);
    }

    #[test]
    fn test_resize_rebuilds_grid() {
        let (mut orchestrator, mut camera, mut lights) = setup(Viewport::new(640, 480));

        orchestrator.cull_frame(&mut camera, &mut lights, 0.016).unwrap();
        orchestrator.resize(Viewport::new(1920, 1080)).unwrap();
        assert_eq!(orchestrator.state(), FrameState::GridStale);

        orchestrator.cull_frame(&mut camera, &mut lights, 0.016).unwrap();
        assert_eq!(orchestrator.grid_builds(), 2);
        assert_eq!(orchestrator.dims().tiles_x, 120);
    }

    #[test]
    fn test_resize_to_same_viewport_is_a_noop() {
        let (mut orchestrator, mut camera, mut lights) = setup(Viewport::new(640, 480));

        orchestrator.cull_frame(&mut camera, &mut lights, 0.016).unwrap();
        orchestrator.resize(Viewport::new(640, 480)).unwrap();
        assert_eq!(orchestrator.state(), FrameState::CullingDone);
    }

    #[test]
    fn test_resize_rejects_zero_viewport() {
        let (mut orchestrator, _, _) = setup(Viewport::new(640, 480));
        assert!(orchestrator.resize(Viewport::new(0, 480)).is_err());
        // The previous grid stays usable
        assert_eq!(orchestrator.dims().tiles_x, 40);
    }

    #[test]
    fn test_light_cap_is_enforced() {
        let config = CullingConfig {
            max_lights: 2,
            ..Default::default()
        };
        let mut orchestrator =
            FrameOrchestrator::new(CpuCuller::new(), config, Viewport::new(640, 480)).unwrap();

        let mut camera = Camera::default();
        let mut lights = LightStore::with_capacity(8);
        for _ in 0..3 {
            lights.push(Light::default()).unwrap();
        }

        let result = orchestrator.cull_frame(&mut camera, &mut lights, 0.016);
        assert!(matches!(
            result,
            Err(CullingError::CapacityExceeded { what: "light", .. })
        ));
    }

    #[test]
    fn test_time_and_animation_advance() {
        let (mut orchestrator, mut camera, mut lights) = setup(Viewport::new(640, 480));
        lights
            .push(Light {
                speed: 1.0,
                ..Default::default()
            })
            .unwrap();

        orchestrator.cull_frame(&mut camera, &mut lights, 0.25).unwrap();
        orchestrator.cull_frame(&mut camera, &mut lights, 0.25).unwrap();

        assert!((orchestrator.time() - 0.5).abs() < 1e-6);
        assert!((lights.lights()[1].t - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_output_reflects_latest_frame() {
        let (mut orchestrator, mut camera, mut lights) = setup(Viewport::new(64, 64));
        camera.set_perspective(90.0_f32.to_radians(), 1.0, 0.1, 100.0);
        camera.position = Vec3::ZERO;
        camera.rotation = glam::Quat::IDENTITY;

        let snapshot = orchestrator
            .cull_frame(&mut camera, &mut lights, 0.0)
            .unwrap();
        assert_eq!(snapshot.light_grid.len(), 16);
        assert!(snapshot.total_entries() >= 1);
    }
}
