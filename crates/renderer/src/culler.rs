//! Compute-shader execution of the culling passes.

use std::mem::size_of;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use forward_culling::{
    CullContext, CullExecutor, CullingConfig, CullingError, CullingResult, CullingSnapshot,
    GridBuildContext, GridDimensions, LightGridEntry, TileFrustum,
};
use forward_rhi::RhiError;
use forward_rhi::buffer::{Buffer, BufferUsage};
use forward_rhi::command::{CommandBuffer, CommandPool};
use forward_rhi::descriptor::{
    DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout, buffer_info,
    update_descriptor_sets,
};
use forward_rhi::device::Device;
use forward_rhi::pipeline::{Pipeline, PipelineLayout};
use forward_rhi::shader::Shader;
use forward_rhi::sync::{Fence, Semaphore};
use forward_scene::{GpuLight, LightStore};

use crate::params::CullParams;

/// Workgroup edge length of both compute shaders.
const WORKGROUP_SIZE: u32 = 16;

/// Per-tile index capacity compiled into `light_cull.comp`.
const SHADER_MAX_LIGHTS_PER_TILE: u32 = 128;

/// The compiled shaders bake the tile size and per-tile cap; a configuration
/// that disagrees with either would make the shaders address buffers sized
/// for different strides.
fn check_shader_config(config: &CullingConfig) -> CullingResult<()> {
    if config.tile_size != WORKGROUP_SIZE {
        return Err(CullingError::Config(format!(
            "tile size {} does not match the compiled shader tile size {}",
            config.tile_size, WORKGROUP_SIZE
        )));
    }
    if config.max_lights_per_tile != SHADER_MAX_LIGHTS_PER_TILE {
        return Err(CullingError::Config(format!(
            "per-tile cap {} does not match the compiled shader cap {}",
            config.max_lights_per_tile, SHADER_MAX_LIGHTS_PER_TILE
        )));
    }
    Ok(())
}

/// What the GPU backend hands to the shading stage.
///
/// The buffer and semaphore handles stay owned by the [`GpuCuller`]; they are
/// valid for as long as the culler lives. Downstream passes bind the two
/// buffers and wait on `cull_finished` before sampling them.
#[derive(Clone, Copy, Debug)]
pub struct GpuCullingOutput {
    /// Per-tile (offset, count) entries, one per tile, row-major
    pub light_grid: vk::Buffer,
    /// Per-tile light indices at a fixed stride of `max_lights_per_tile`
    pub light_index_list: vk::Buffer,
    /// Signaled when the light-cull dispatch of the frame completes
    pub cull_finished: vk::Semaphore,
}

/// GPU backend running both culling passes as compute dispatches.
///
/// All buffers are sized once from the configured caps. Unlike the CPU
/// backend, the index list uses a fixed per-tile stride: tile `i` writes its
/// indices at offset `i * max_lights_per_tile`, which lets every workgroup
/// claim its slot without a global compaction pass.
pub struct GpuCuller {
    device: Arc<Device>,
    config: CullingConfig,

    params: CullParams,
    dims: Option<GridDimensions>,

    // Shader resources (bindings 0..4)
    params_buffer: Buffer,
    lights_buffer: Buffer,
    frustums_buffer: Buffer,
    light_index_buffer: Buffer,
    light_grid_buffer: Buffer,

    // Host-readable copies of the results
    grid_readback: Buffer,
    index_readback: Buffer,

    descriptor_set_layout: DescriptorSetLayout,
    descriptor_pool: DescriptorPool,
    descriptor_set: vk::DescriptorSet,

    pipeline_layout: PipelineLayout,
    grid_pipeline: Pipeline,
    cull_pipeline: Pipeline,

    command_pool: CommandPool,
    grid_cmd: CommandBuffer,
    cull_cmd: CommandBuffer,

    /// Orders the grid dispatch before the cull dispatch on rebuild frames
    grid_built: Semaphore,
    cull_finished: Semaphore,
    /// Paces the CPU: waited before rewriting the shared buffers
    in_flight: Fence,
    /// True while a submission that will signal `in_flight` is outstanding
    fence_armed: bool,
    /// True when a recorded grid dispatch awaits submission this frame
    grid_pending: bool,

    output: GpuCullingOutput,
}

fn rhi(err: RhiError) -> CullingError {
    CullingError::backend(err)
}

impl GpuCuller {
    /// Creates the backend, sizing every buffer from the configured caps.
    ///
    /// `shader_dir` must contain the compiled `frustum_grid.comp.spv` and
    /// `light_cull.comp.spv` modules.
    ///
    /// # Errors
    ///
    /// Returns an error when the configuration is invalid, when it disagrees
    /// with the tile size or per-tile cap compiled into the shaders, or when
    /// any Vulkan resource creation fails.
    pub fn new(
        device: Arc<Device>,
        config: CullingConfig,
        shader_dir: &Path,
    ) -> CullingResult<Self> {
        config.validate()?;
        check_shader_config(&config)?;

        let max_lights = config.max_lights as u64;
        let max_frustums = config.max_frustums as u64;
        let per_tile = config.max_lights_per_tile as u64;

        let params_buffer = Buffer::new(
            device.clone(),
            BufferUsage::Uniform,
            CullParams::SIZE as u64,
        )
        .map_err(rhi)?;
        let lights_buffer = Buffer::new(
            device.clone(),
            BufferUsage::StorageUpload,
            max_lights * GpuLight::SIZE as u64,
        )
        .map_err(rhi)?;
        let frustums_buffer = Buffer::new(
            device.clone(),
            BufferUsage::Storage,
            max_frustums * TileFrustum::SIZE as u64,
        )
        .map_err(rhi)?;
        let light_index_buffer = Buffer::new(
            device.clone(),
            BufferUsage::Storage,
            max_frustums * per_tile * size_of::<u32>() as u64,
        )
        .map_err(rhi)?;
        let light_grid_buffer = Buffer::new(
            device.clone(),
            BufferUsage::Storage,
            max_frustums * size_of::<LightGridEntry>() as u64,
        )
        .map_err(rhi)?;

        let grid_readback = Buffer::new(
            device.clone(),
            BufferUsage::Readback,
            light_grid_buffer.size(),
        )
        .map_err(rhi)?;
        let index_readback = Buffer::new(
            device.clone(),
            BufferUsage::Readback,
            light_index_buffer.size(),
        )
        .map_err(rhi)?;

        // Binding 0: params UBO, 1: lights, 2: frustums, 3: index list, 4: grid
        let bindings = [
            DescriptorBindingBuilder::uniform_buffer(0, vk::ShaderStageFlags::COMPUTE),
            DescriptorBindingBuilder::storage_buffer(1, vk::ShaderStageFlags::COMPUTE),
            DescriptorBindingBuilder::storage_buffer(2, vk::ShaderStageFlags::COMPUTE),
            DescriptorBindingBuilder::storage_buffer(3, vk::ShaderStageFlags::COMPUTE),
            DescriptorBindingBuilder::storage_buffer(4, vk::ShaderStageFlags::COMPUTE),
        ];
        let descriptor_set_layout =
            DescriptorSetLayout::new(device.clone(), &bindings).map_err(rhi)?;

        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(1),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(4),
        ];
        let descriptor_pool = DescriptorPool::new(device.clone(), 1, &pool_sizes).map_err(rhi)?;
        let descriptor_set = descriptor_pool
            .allocate(&[descriptor_set_layout.handle()])
            .map_err(rhi)?[0];

        let params_info = [buffer_info(params_buffer.handle(), 0, params_buffer.size())];
        let lights_info = [buffer_info(lights_buffer.handle(), 0, lights_buffer.size())];
        let frustums_info = [buffer_info(
            frustums_buffer.handle(),
            0,
            frustums_buffer.size(),
        )];
        let index_info = [buffer_info(
            light_index_buffer.handle(),
            0,
            light_index_buffer.size(),
        )];
        let grid_info = [buffer_info(
            light_grid_buffer.handle(),
            0,
            light_grid_buffer.size(),
        )];

        let writes = [
            vk::WriteDescriptorSet::default()
                .dst_set(descriptor_set)
                .dst_binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(&params_info),
            vk::WriteDescriptorSet::default()
                .dst_set(descriptor_set)
                .dst_binding(1)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .buffer_info(&lights_info),
            vk::WriteDescriptorSet::default()
                .dst_set(descriptor_set)
                .dst_binding(2)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .buffer_info(&frustums_info),
            vk::WriteDescriptorSet::default()
                .dst_set(descriptor_set)
                .dst_binding(3)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .buffer_info(&index_info),
            vk::WriteDescriptorSet::default()
                .dst_set(descriptor_set)
                .dst_binding(4)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .buffer_info(&grid_info),
        ];
        update_descriptor_sets(&device, &writes);

        let grid_shader = Shader::from_spirv_file(
            device.clone(),
            &shader_dir.join("frustum_grid.comp.spv"),
            "main",
        )
        .map_err(rhi)?;
        let cull_shader = Shader::from_spirv_file(
            device.clone(),
            &shader_dir.join("light_cull.comp.spv"),
            "main",
        )
        .map_err(rhi)?;

        let pipeline_layout =
            PipelineLayout::new(device.clone(), &[descriptor_set_layout.handle()], &[])
                .map_err(rhi)?;
        let grid_pipeline =
            Pipeline::create_compute(device.clone(), &grid_shader, &pipeline_layout)
                .map_err(rhi)?;
        let cull_pipeline =
            Pipeline::create_compute(device.clone(), &cull_shader, &pipeline_layout)
                .map_err(rhi)?;

        let compute_family = device
            .queue_families()
            .compute_family
            .ok_or(RhiError::NoSuitableGpu)
            .map_err(rhi)?;
        let command_pool = CommandPool::new(device.clone(), compute_family).map_err(rhi)?;
        let grid_cmd = CommandBuffer::new(device.clone(), &command_pool).map_err(rhi)?;
        let cull_cmd = CommandBuffer::new(device.clone(), &command_pool).map_err(rhi)?;

        let grid_built = Semaphore::new(device.clone()).map_err(rhi)?;
        let cull_finished = Semaphore::new(device.clone()).map_err(rhi)?;
        let in_flight = Fence::new(device.clone(), false).map_err(rhi)?;

        let output = GpuCullingOutput {
            light_grid: light_grid_buffer.handle(),
            light_index_list: light_index_buffer.handle(),
            cull_finished: cull_finished.handle(),
        };

        info!(
            "GPU culler created: {} light slots, {} frustum slots, {} indices per tile",
            config.max_lights, config.max_frustums, config.max_lights_per_tile
        );

        Ok(Self {
            device,
            config,
            params: CullParams::default(),
            dims: None,
            params_buffer,
            lights_buffer,
            frustums_buffer,
            light_index_buffer,
            light_grid_buffer,
            grid_readback,
            index_readback,
            descriptor_set_layout,
            descriptor_pool,
            descriptor_set,
            pipeline_layout,
            grid_pipeline,
            cull_pipeline,
            command_pool,
            grid_cmd,
            cull_cmd,
            grid_built,
            cull_finished,
            in_flight,
            fence_armed: false,
            grid_pending: false,
            output,
        })
    }

    /// Blocks until the in-flight frame completes, then reads the results
    /// back into host memory.
    ///
    /// The grid entries preserve the shader's fixed-stride addressing: tile
    /// `i` has `offset == i * max_lights_per_tile`, so the index list is not
    /// compacted the way the CPU backend's is.
    ///
    /// # Errors
    ///
    /// Returns an error when no frame has been culled yet or the readback
    /// copy fails.
    pub fn read_results(&self) -> CullingResult<CullingSnapshot> {
        let dims = self.dims.ok_or_else(|| {
            CullingError::Config("no culled frame to read back".into())
        })?;

        if self.fence_armed {
            self.in_flight.wait(u64::MAX).map_err(rhi)?;
        }

        let tiles = dims.tile_count() as usize;
        let per_tile = self.config.max_lights_per_tile as usize;

        let mut grid_bytes = vec![0u8; tiles * size_of::<LightGridEntry>()];
        self.grid_readback.read_data(0, &mut grid_bytes).map_err(rhi)?;
        let light_grid: Vec<LightGridEntry> = bytemuck::cast_slice(&grid_bytes).to_vec();

        let mut index_bytes = vec![0u8; tiles * per_tile * size_of::<u32>()];
        self.index_readback.read_data(0, &mut index_bytes).map_err(rhi)?;
        let light_index_list: Vec<u32> = bytemuck::cast_slice(&index_bytes).to_vec();

        Ok(CullingSnapshot {
            light_grid,
            light_index_list,
        })
    }

    fn record_grid_pass(&self, dims: GridDimensions) -> CullingResult<()> {
        self.grid_cmd.reset().map_err(rhi)?;
        self.grid_cmd.begin().map_err(rhi)?;
        self.grid_cmd
            .bind_pipeline(self.grid_pipeline.bind_point(), self.grid_pipeline.handle());
        self.grid_cmd.bind_descriptor_sets(
            self.grid_pipeline.bind_point(),
            self.pipeline_layout.handle(),
            0,
            &[self.descriptor_set],
            &[],
        );
        // One invocation per tile
        self.grid_cmd.dispatch(
            dims.tiles_x.div_ceil(WORKGROUP_SIZE),
            dims.tiles_y.div_ceil(WORKGROUP_SIZE),
            1,
        );
        self.grid_cmd.end().map_err(rhi)?;
        Ok(())
    }

    fn record_cull_pass(&self, dims: GridDimensions) -> CullingResult<()> {
        self.cull_cmd.reset().map_err(rhi)?;
        self.cull_cmd.begin().map_err(rhi)?;

        // Frustum writes from the grid pass must be visible before the cull
        // pass reads them; the grid_built semaphore orders the submissions,
        // this barrier covers same-queue pipelining
        let frustum_barrier = [vk::BufferMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::SHADER_WRITE)
            .dst_access_mask(vk::AccessFlags::SHADER_READ)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(self.frustums_buffer.handle())
            .size(vk::WHOLE_SIZE)];
        self.cull_cmd.pipeline_barrier(
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::PipelineStageFlags::COMPUTE_SHADER,
            &[],
            &frustum_barrier,
        );

        self.cull_cmd
            .bind_pipeline(self.cull_pipeline.bind_point(), self.cull_pipeline.handle());
        self.cull_cmd.bind_descriptor_sets(
            self.cull_pipeline.bind_point(),
            self.pipeline_layout.handle(),
            0,
            &[self.descriptor_set],
            &[],
        );
        // One workgroup per tile; the workgroup tests the light array
        // cooperatively and appends survivors to a shared list
        self.cull_cmd.dispatch(dims.tiles_x, dims.tiles_y, 1);

        // Results must be visible to the readback copies
        let tiles = dims.tile_count() as u64;
        let per_tile = self.config.max_lights_per_tile as u64;
        let barriers = [
            vk::BufferMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .buffer(self.light_grid_buffer.handle())
                .size(vk::WHOLE_SIZE),
            vk::BufferMemoryBarrier::default()
                .src_access_mask(vk::AccessFlags::SHADER_WRITE)
                .dst_access_mask(vk::AccessFlags::TRANSFER_READ)
                .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                .buffer(self.light_index_buffer.handle())
                .size(vk::WHOLE_SIZE),
        ];
        self.cull_cmd.pipeline_barrier(
            vk::PipelineStageFlags::COMPUTE_SHADER,
            vk::PipelineStageFlags::TRANSFER,
            &[],
            &barriers,
        );

        self.cull_cmd.copy_buffer(
            self.light_grid_buffer.handle(),
            self.grid_readback.handle(),
            &[vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: tiles * size_of::<LightGridEntry>() as u64,
            }],
        );
        self.cull_cmd.copy_buffer(
            self.light_index_buffer.handle(),
            self.index_readback.handle(),
            &[vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: tiles * per_tile * size_of::<u32>() as u64,
            }],
        );

        self.cull_cmd.end().map_err(rhi)?;
        Ok(())
    }
}

impl CullExecutor for GpuCuller {
    type Output = GpuCullingOutput;

    fn begin_frame(&mut self) -> CullingResult<()> {
        // Shared buffers must not be rewritten while the previous frame's
        // dispatches may still read them
        if self.fence_armed {
            self.in_flight.wait(u64::MAX).map_err(rhi)?;
            self.in_flight.reset().map_err(rhi)?;
            self.fence_armed = false;
        }
        Ok(())
    }

    fn build_frustum_grid(&mut self, ctx: &GridBuildContext) -> CullingResult<()> {
        let dims = ctx.dims;
        let tiles = dims.tile_count() as usize;
        if tiles > self.config.max_frustums as usize {
            return Err(CullingError::CapacityExceeded {
                what: "tile frustum",
                requested: tiles,
                capacity: self.config.max_frustums as usize,
            });
        }

        self.params.inverse_projection = ctx.inverse_projection;
        self.params.screen_dimensions = [dims.viewport.width, dims.viewport.height];
        self.params.tile_count = [dims.tiles_x, dims.tiles_y];

        // Recorded now, submitted together with the cull pass so the uniform
        // upload happens exactly once per frame
        self.record_grid_pass(dims)?;
        self.dims = Some(dims);
        self.grid_pending = true;

        debug!(
            "Grid dispatch recorded: {}x{} tiles",
            dims.tiles_x, dims.tiles_y
        );
        Ok(())
    }

    fn cull_lights(&mut self, lights: &LightStore, ctx: &CullContext) -> CullingResult<()> {
        let dims = self.dims.ok_or_else(|| {
            CullingError::Config("cull_lights called before the frustum grid was built".into())
        })?;

        if lights.len() > self.config.max_lights as usize {
            return Err(CullingError::CapacityExceeded {
                what: "light",
                requested: lights.len(),
                capacity: self.config.max_lights as usize,
            });
        }

        self.params.view = ctx.view;
        self.params.light_count = lights.len() as u32;
        self.params.time = ctx.time;
        self.params_buffer
            .write_data(0, bytemuck::bytes_of(&self.params))
            .map_err(rhi)?;

        let gpu_lights = lights.gpu_lights();
        self.lights_buffer
            .write_data(0, bytemuck::cast_slice(&gpu_lights))
            .map_err(rhi)?;

        self.record_cull_pass(dims)?;

        let grid_cmds = [self.grid_cmd.handle()];
        let cull_cmds = [self.cull_cmd.handle()];
        let grid_signal = [self.grid_built.handle()];
        let cull_wait = [self.grid_built.handle()];
        let cull_wait_stages = [vk::PipelineStageFlags::COMPUTE_SHADER];
        let cull_signal = [self.cull_finished.handle()];

        let cull_submit = vk::SubmitInfo::default()
            .command_buffers(&cull_cmds)
            .signal_semaphores(&cull_signal);

        if self.grid_pending {
            let grid_submit = vk::SubmitInfo::default()
                .command_buffers(&grid_cmds)
                .signal_semaphores(&grid_signal);
            let cull_submit = cull_submit
                .wait_semaphores(&cull_wait)
                .wait_dst_stage_mask(&cull_wait_stages);
            unsafe {
                self.device
                    .submit_compute(&[grid_submit, cull_submit], self.in_flight.handle())
                    .map_err(rhi)?;
            }
            self.grid_pending = false;
        } else {
            unsafe {
                self.device
                    .submit_compute(&[cull_submit], self.in_flight.handle())
                    .map_err(rhi)?;
            }
        }

        self.fence_armed = true;
        Ok(())
    }

    fn output(&self) -> &Self::Output {
        &self.output
    }
}

impl Drop for GpuCuller {
    fn drop(&mut self) {
        // Dispatches may still be running against the buffers dropped next
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during culler drop: {:?}", e);
        }
        info!("GPU culler destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_handles_are_copyable() {
        fn assert_copy<T: Copy>() {}
        assert_copy::<GpuCullingOutput>();
    }

    #[test]
    fn test_workgroup_size_matches_tile_size() {
        // The cull shader maps one workgroup to one tile, one invocation per
        // pixel of the tile
        assert_eq!(WORKGROUP_SIZE, forward_culling::config::DEFAULT_TILE_SIZE);
    }

    #[test]
    fn test_grid_dispatch_shape_1080p() {
        use forward_culling::{GridDimensions, Viewport};

        // 1920x1080 at 16px tiles is a 120x68 grid; the grid pass covers it
        // with 16x16 workgroups of one-invocation-per-tile
        let dims = GridDimensions::for_viewport(Viewport::new(1920, 1080), 16);
        assert_eq!(dims.tiles_x.div_ceil(WORKGROUP_SIZE), 8);
        assert_eq!(dims.tiles_y.div_ceil(WORKGROUP_SIZE), 5);
        // The cull pass runs one workgroup per tile
        assert_eq!(dims.tile_count(), 8160);
    }

    #[test]
    fn test_default_config_matches_compiled_shaders() {
        assert!(check_shader_config(&CullingConfig::default()).is_ok());
    }

    #[test]
    fn test_tile_size_mismatch_is_rejected() {
        let config = CullingConfig {
            tile_size: 32,
            ..Default::default()
        };
        assert!(matches!(
            check_shader_config(&config),
            Err(CullingError::Config(_))
        ));
    }

    #[test]
    fn test_per_tile_cap_mismatch_is_rejected() {
        // A smaller cap would size the index buffer below the shader's write
        // stride; a larger one would be silently clamped by the shader
        for cap in [64, 256] {
            let config = CullingConfig {
                max_lights_per_tile: cap,
                ..Default::default()
            };
            assert!(matches!(
                check_shader_config(&config),
                Err(CullingError::Config(_))
            ));
        }
    }
}
