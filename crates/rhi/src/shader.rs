//! Compute shader module management.
//!
//! This module handles SPIR-V loading and VkShaderModule creation. Both
//! culling passes are compute shaders, so the wrapper is compute-only.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use forward_rhi::device::Device;
//! use forward_rhi::shader::Shader;
//!
//! # fn example(device: Arc<Device>) -> Result<(), forward_rhi::RhiError> {
//! let shader = Shader::from_spirv_file(
//!     device,
//!     Path::new("shaders/light_cull.comp.spv"),
//!     "main",
//! )?;
//!
//! let _stage_info = shader.stage_create_info();
//! # Ok(())
//! # }
//! ```

use std::ffi::CString;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Vulkan compute shader module wrapper.
///
/// This struct manages the lifecycle of a VkShaderModule and provides
/// the stage create info needed for compute pipeline creation.
///
/// # Thread Safety
///
/// The shader module is immutable after creation and can be safely shared
/// between threads.
pub struct Shader {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan shader module handle.
    module: vk::ShaderModule,
    /// Entry point function name.
    entry_point: CString,
}

impl Shader {
    /// Creates a compute shader module from a SPIR-V file.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `path` - Path to the SPIR-V file
    /// * `entry_point` - The name of the entry point function (typically "main")
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read
    /// - The SPIR-V data is invalid
    /// - Shader module creation fails
    pub fn from_spirv_file(device: Arc<Device>, path: &Path, entry_point: &str) -> RhiResult<Self> {
        debug!("Loading compute shader from {:?}", path);

        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;

        Self::from_spirv_bytes(device, &bytes, entry_point)
    }

    /// Creates a compute shader module from SPIR-V bytes.
    ///
    /// The bytes must be valid SPIR-V code and properly aligned (4-byte alignment).
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The byte length is not a multiple of 4 (SPIR-V alignment requirement)
    /// - The entry point name contains null bytes
    /// - Shader module creation fails
    pub fn from_spirv_bytes(
        device: Arc<Device>,
        bytes: &[u8],
        entry_point: &str,
    ) -> RhiResult<Self> {
        // Validate SPIR-V alignment
        if !bytes.len().is_multiple_of(4) {
            return Err(RhiError::ShaderError(format!(
                "SPIR-V code must be 4-byte aligned, got {} bytes",
                bytes.len()
            )));
        }

        // Convert bytes to u32 code words
        let code: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        // Create shader module
        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);

        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        // Create entry point CString
        let entry_point_cstring = CString::new(entry_point)
            .map_err(|e| RhiError::ShaderError(format!("Invalid entry point name: {}", e)))?;

        info!(
            "Created compute shader module with entry point '{}'",
            entry_point
        );

        Ok(Self {
            device,
            module,
            entry_point: entry_point_cstring,
        })
    }

    /// Returns the Vulkan shader module handle.
    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    /// Returns the entry point function name as a C string reference.
    #[inline]
    pub fn entry_point(&self) -> &std::ffi::CStr {
        &self.entry_point
    }

    /// Creates a pipeline shader stage create info structure.
    ///
    /// The returned structure borrows from this shader and must not outlive it.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(self.module)
            .name(&self.entry_point)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed compute shader module");
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_spirv_alignment_requirement() {
        // from_spirv_bytes rejects data that is not a multiple of 4 bytes
        let misaligned_bytes = vec![0u8; 5];
        assert!(misaligned_bytes.len() % 4 != 0);

        let aligned_bytes = vec![0u8; 8];
        assert!(aligned_bytes.len() % 4 == 0);
    }
}
