//! Per-tile light binning.
//!
//! Each light becomes a bounding sphere in view space and is tested against
//! every tile frustum. Tiles run in parallel; the surviving indices are then
//! packed into one contiguous index list plus a per-tile (offset, count)
//! grid, row-major in tile order.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use rayon::prelude::*;
use tracing::trace;

use forward_scene::Light;

use crate::frustum::TileFrustum;

/// Per-tile slice descriptor into the light index list.
///
/// Layout matches the shader storage buffer: two `u32`s per tile.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct LightGridEntry {
    /// Start of this tile's indices in the light index list
    pub offset: u32,
    /// Number of indices belonging to this tile
    pub count: u32,
}

/// The output of one culling pass.
///
/// `light_grid[tile]` addresses a contiguous run of `light_index_list`; the
/// runs appear in tile order with no gaps between them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CullingSnapshot {
    /// One entry per tile, row-major
    pub light_grid: Vec<LightGridEntry>,
    /// Concatenated per-tile light indices
    pub light_index_list: Vec<u32>,
}

impl CullingSnapshot {
    /// The light indices binned into a tile.
    pub fn tile_lights(&self, tile: usize) -> &[u32] {
        let entry = self.light_grid[tile];
        let start = entry.offset as usize;
        &self.light_index_list[start..start + entry.count as usize]
    }

    /// Total number of (tile, light) pairs recorded this pass.
    pub fn total_entries(&self) -> usize {
        self.light_index_list.len()
    }
}

/// Bins lights into tiles.
///
/// Light positions are taken at their current animation parameter and moved
/// into view space through `view`. A tile keeps at most `max_lights_per_tile`
/// lights; when more intersect its frustum, the first ones in store order are
/// kept and the rest are dropped for that tile only. Overflow is a drop
/// policy, not an error.
pub fn cull_lights(
    frustums: &[TileFrustum],
    lights: &[Light],
    view: Mat4,
    max_lights_per_tile: u32,
) -> CullingSnapshot {
    let cap = max_lights_per_tile as usize;

    // View-space bounding spheres, computed once per pass
    let spheres: Vec<_> = lights
        .iter()
        .map(|light| (view.transform_point3(light.position()), light.radius))
        .collect();

    let per_tile: Vec<Vec<u32>> = frustums
        .par_iter()
        .map(|frustum| {
            let mut indices = Vec::new();
            for (i, &(center, radius)) in spheres.iter().enumerate() {
                if frustum.contains_sphere(center, radius) {
                    indices.push(i as u32);
                    if indices.len() == cap {
                        break;
                    }
                }
            }
            indices
        })
        .collect();

    let mut light_grid = Vec::with_capacity(frustums.len());
    let mut light_index_list = Vec::new();
    for indices in &per_tile {
        light_grid.push(LightGridEntry {
            offset: light_index_list.len() as u32,
            count: indices.len() as u32,
        });
        light_index_list.extend_from_slice(indices);
    }

    trace!(
        "Culled {} lights into {} tiles ({} entries)",
        lights.len(),
        frustums.len(),
        light_index_list.len()
    );

    CullingSnapshot {
        light_grid,
        light_index_list,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GridDimensions, Viewport};
    use crate::frustum::build_frustum_grid;
    use glam::Vec3;

    fn inv_proj_90_square() -> Mat4 {
        let mut proj = Mat4::perspective_rh(90.0_f32.to_radians(), 1.0, 0.1, 100.0);
        proj.y_axis.y *= -1.0;
        proj.inverse()
    }

    fn light_at(position: Vec3, radius: f32) -> Light {
        Light {
            begin_pos: position,
            end_pos: position,
            radius,
            ..Default::default()
        }
    }

    #[test]
    fn test_entry_layout() {
        assert_eq!(std::mem::size_of::<LightGridEntry>(), 8);
    }

    #[test]
    fn test_light_lands_in_its_quadrant() {
        // 2x2 grid over a square 90 degree view; quadrant boundaries pass
        // through the view axis
        let dims = GridDimensions::for_viewport(Viewport::new(32, 32), 16);
        let frustums = build_frustum_grid(inv_proj_90_square(), dims);
        assert_eq!(frustums.len(), 4);

        // View x < 0, y > 0 projects to the top-left of the screen
        let lights = vec![light_at(Vec3::new(-1.0, 1.0, -2.0), 0.1)];
        let snapshot = cull_lights(&frustums, &lights, Mat4::IDENTITY, 128);

        assert_eq!(snapshot.tile_lights(0), &[0]);
        assert!(snapshot.tile_lights(1).is_empty());
        assert!(snapshot.tile_lights(2).is_empty());
        assert!(snapshot.tile_lights(3).is_empty());
    }

    #[test]
    fn test_large_light_spans_all_tiles() {
        let dims = GridDimensions::for_viewport(Viewport::new(32, 32), 16);
        let frustums = build_frustum_grid(inv_proj_90_square(), dims);

        let lights = vec![light_at(Vec3::new(0.0, 0.0, -5.0), 100.0)];
        let snapshot = cull_lights(&frustums, &lights, Mat4::IDENTITY, 128);

        for tile in 0..4 {
            assert_eq!(snapshot.tile_lights(tile), &[0]);
        }
        assert_eq!(snapshot.total_entries(), 4);
    }

    #[test]
    fn test_per_tile_cap_keeps_first_in_store_order() {
        let dims = GridDimensions::for_viewport(Viewport::new(16, 16), 16);
        let frustums = build_frustum_grid(inv_proj_90_square(), dims);

        // Eight identical lights straight ahead, cap of four
        let lights: Vec<_> = (0..8)
            .map(|_| light_at(Vec3::new(0.0, 0.0, -5.0), 0.5))
            .collect();
        let snapshot = cull_lights(&frustums, &lights, Mat4::IDENTITY, 4);

        assert_eq!(snapshot.tile_lights(0), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_index_list_is_contiguous() {
        let dims = GridDimensions::for_viewport(Viewport::new(64, 64), 16);
        let frustums = build_frustum_grid(inv_proj_90_square(), dims);

        let lights: Vec<_> = (0..32)
            .map(|i| {
                let angle = i as f32 * 0.3;
                light_at(
                    Vec3::new(angle.cos() * 2.0, angle.sin() * 2.0, -4.0),
                    1.0,
                )
            })
            .collect();
        let snapshot = cull_lights(&frustums, &lights, Mat4::IDENTITY, 128);

        let mut expected_offset = 0u32;
        for entry in &snapshot.light_grid {
            assert_eq!(entry.offset, expected_offset);
            expected_offset += entry.count;
        }
        assert_eq!(expected_offset as usize, snapshot.light_index_list.len());
    }

    #[test]
    fn test_view_matrix_moves_lights_out() {
        let dims = GridDimensions::for_viewport(Viewport::new(16, 16), 16);
        let frustums = build_frustum_grid(inv_proj_90_square(), dims);

        let lights = vec![light_at(Vec3::new(0.0, 0.0, -5.0), 0.5)];

        let identity = cull_lights(&frustums, &lights, Mat4::IDENTITY, 128);
        assert_eq!(identity.tile_lights(0), &[0]);

        // A view looking away from the light leaves the tile empty
        let away = Mat4::look_at_rh(Vec3::ZERO, Vec3::Z, Vec3::Y);
        let turned = cull_lights(&frustums, &lights, away, 128);
        assert!(turned.tile_lights(0).is_empty());
    }

    #[test]
    fn test_pass_is_deterministic() {
        let dims = GridDimensions::for_viewport(Viewport::new(64, 48), 16);
        let frustums = build_frustum_grid(inv_proj_90_square(), dims);

        let lights: Vec<_> = (0..64)
            .map(|i| {
                let f = i as f32;
                light_at(Vec3::new(f.sin() * 3.0, f.cos() * 3.0, -6.0 - f * 0.1), 1.5)
            })
            .collect();

        let a = cull_lights(&frustums, &lights, Mat4::IDENTITY, 128);
        let b = cull_lights(&frustums, &lights, Mat4::IDENTITY, 128);
        assert_eq!(a, b);
    }

    #[test]
    fn test_no_lights_yields_empty_runs() {
        let dims = GridDimensions::for_viewport(Viewport::new(32, 32), 16);
        let frustums = build_frustum_grid(inv_proj_90_square(), dims);

        let snapshot = cull_lights(&frustums, &[], Mat4::IDENTITY, 128);
        assert_eq!(snapshot.light_grid.len(), 4);
        assert!(snapshot.light_index_list.is_empty());
        for entry in &snapshot.light_grid {
            assert_eq!(entry.count, 0);
        }
    }
}
