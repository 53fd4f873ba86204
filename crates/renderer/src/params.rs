//! Uniform parameter block shared by both culling shaders.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// Parameters read by the frustum-grid and light-cull shaders.
///
/// Layout matches the std140 uniform block (160 bytes). The grid pass reads
/// the inverse projection and the tile/screen dimensions; the cull pass
/// additionally reads the view matrix, light count, and scene time.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct CullParams {
    /// Camera view matrix for this frame
    pub view: Mat4,
    /// Inverse camera projection, used to unproject tile corners
    pub inverse_projection: Mat4,
    /// Viewport size in pixels
    pub screen_dimensions: [u32; 2],
    /// Tile grid dimensions
    pub tile_count: [u32; 2],
    /// Number of valid lights in the light buffer
    pub light_count: u32,
    /// Accumulated scene time in seconds
    pub time: f32,
    /// Pads the block to a 16-byte multiple per std140
    pub _pad: [u32; 2],
}

impl CullParams {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::offset_of;

    #[test]
    fn test_params_size_matches_std140() {
        assert_eq!(CullParams::SIZE, 160);
        assert!(CullParams::SIZE.is_multiple_of(16));
    }

    #[test]
    fn test_field_offsets_match_shader_block() {
        assert_eq!(offset_of!(CullParams, view), 0);
        assert_eq!(offset_of!(CullParams, inverse_projection), 64);
        assert_eq!(offset_of!(CullParams, screen_dimensions), 128);
        assert_eq!(offset_of!(CullParams, tile_count), 136);
        assert_eq!(offset_of!(CullParams, light_count), 144);
        assert_eq!(offset_of!(CullParams, time), 148);
    }
}
