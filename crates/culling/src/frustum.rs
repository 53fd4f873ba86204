//! Tile frustum construction.
//!
//! Every screen tile gets a view-space frustum made of four lateral planes
//! passing through the eye. Near/far clipping is left to the depth bounds of
//! the shading stage, so four planes are enough to bin lights per tile.
//!
//! The grid depends only on the projection and viewport, never on the view
//! matrix: camera movement does not invalidate it.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use tracing::debug;

use crate::config::{GridDimensions, Viewport};

/// A view-space plane in normal/distance form.
///
/// Layout matches the shader storage buffer (16 bytes): xyz = unit normal,
/// w = signed distance to the origin. Tile planes pass through the eye, so
/// their distance is always zero; the field is kept for the GPU layout and
/// for generality of the sphere test.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Plane {
    /// Unit normal, pointing to the inside of the frustum
    pub normal: Vec3,
    /// Signed distance from the origin along the normal
    pub distance: f32,
}

impl Plane {
    /// Signed distance from a point to the plane.
    #[inline]
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.distance
    }
}

/// The four lateral planes of one screen tile, normals pointing inward.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct TileFrustum {
    /// Planes in left, right, top, bottom order
    pub planes: [Plane; 4],
}

impl TileFrustum {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Tests whether a view-space sphere intersects the frustum.
    ///
    /// A sphere is kept when it is on the inner side of (or touching) all
    /// four planes: `n . c + d + r >= 0` for each plane. The test
    /// over-includes spheres near tile corners, which costs shading work but
    /// never drops a visible light.
    pub fn contains_sphere(&self, center: Vec3, radius: f32) -> bool {
        self.planes
            .iter()
            .all(|plane| plane.signed_distance(center) + radius >= 0.0)
    }
}

/// Unprojects a pixel coordinate to a view-space ray direction.
///
/// The clip-space point sits on the far plane; since the lateral planes pass
/// through the eye, any point along the corner ray defines them equally well.
fn unproject(inverse_projection: Mat4, pixel: Vec3, viewport: Viewport) -> Vec3 {
    let ndc_x = 2.0 * pixel.x / viewport.width as f32 - 1.0;
    let ndc_y = 2.0 * pixel.y / viewport.height as f32 - 1.0;

    let clip = Vec4::new(ndc_x, ndc_y, 1.0, 1.0);
    let view = inverse_projection * clip;
    view.truncate() / view.w
}

/// Builds the frustum for one tile from its four corner rays.
fn tile_frustum(
    inverse_projection: Mat4,
    viewport: Viewport,
    tile_size: u32,
    tx: u32,
    ty: u32,
) -> TileFrustum {
    let ts = tile_size as f32;
    let x0 = tx as f32 * ts;
    let y0 = ty as f32 * ts;

    let corner = |px: f32, py: f32| unproject(inverse_projection, Vec3::new(px, py, 1.0), viewport);

    let tl = corner(x0, y0);
    let tr = corner(x0 + ts, y0);
    let bl = corner(x0, y0 + ts);
    let br = corner(x0 + ts, y0 + ts);
    let center = corner(x0 + ts * 0.5, y0 + ts * 0.5);

    // Each lateral plane contains the eye and two corner rays; the cross
    // product gives its normal, oriented inward via the center ray.
    let plane = |a: Vec3, b: Vec3| {
        let mut normal = a.cross(b).normalize();
        if normal.dot(center) < 0.0 {
            normal = -normal;
        }
        Plane {
            normal,
            distance: 0.0,
        }
    };

    TileFrustum {
        planes: [
            plane(tl, bl), // left
            plane(tr, br), // right
            plane(tl, tr), // top
            plane(bl, br), // bottom
        ],
    }
}

/// Builds the view-space frustum grid for a viewport, row-major.
///
/// The caller validates the tile count against its frustum capacity before
/// building; this function assumes the dimensions are in range.
pub fn build_frustum_grid(
    inverse_projection: Mat4,
    dims: GridDimensions,
) -> Vec<TileFrustum> {
    let mut frustums = Vec::with_capacity(dims.tile_count() as usize);

    for ty in 0..dims.tiles_y {
        for tx in 0..dims.tiles_x {
            frustums.push(tile_frustum(
                inverse_projection,
                dims.viewport,
                dims.tile_size,
                tx,
                ty,
            ));
        }
    }

    debug!(
        "Built frustum grid: {}x{} tiles ({} px)",
        dims.tiles_x, dims.tiles_y, dims.tile_size
    );

    frustums
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Viewport;

    const EPS: f32 = 1e-4;

    fn inv_proj_90_square() -> Mat4 {
        // 90 degree vertical fov, aspect 1, with the Vulkan Y-flip
        let mut proj = Mat4::perspective_rh(90.0_f32.to_radians(), 1.0, 0.1, 100.0);
        proj.y_axis.y *= -1.0;
        proj.inverse()
    }

    fn single_tile_grid() -> Vec<TileFrustum> {
        // One 16px tile covering the whole viewport
        let dims = GridDimensions::for_viewport(Viewport::new(16, 16), 16);
        build_frustum_grid(inv_proj_90_square(), dims)
    }

    #[test]
    fn test_struct_layouts() {
        assert_eq!(std::mem::size_of::<Plane>(), 16);
        assert_eq!(TileFrustum::SIZE, 64);
    }

    #[test]
    fn test_planes_are_unit_length_through_origin() {
        for frustum in single_tile_grid() {
            for plane in frustum.planes {
                assert!((plane.normal.length() - 1.0).abs() < EPS);
                assert_eq!(plane.distance, 0.0);
            }
        }
    }

    #[test]
    fn test_full_viewport_frustum_at_90_degrees() {
        // At 90 degree fov and aspect 1 the side planes sit at 45 degrees
        let frustums = single_tile_grid();
        assert_eq!(frustums.len(), 1);
        let planes = frustums[0].planes;

        let s = std::f32::consts::FRAC_1_SQRT_2;
        let expected = [
            Vec3::new(s, 0.0, -s),  // left
            Vec3::new(-s, 0.0, -s), // right
            Vec3::new(0.0, -s, -s), // top (view-space y up, screen y down)
            Vec3::new(0.0, s, -s),  // bottom
        ];

        for (plane, want) in planes.iter().zip(expected) {
            assert!(
                (plane.normal - want).length() < 1e-3,
                "normal {:?} != {:?}",
                plane.normal,
                want
            );
        }
    }

    #[test]
    fn test_normals_point_inward() {
        // A point straight down the view axis is inside every tile-center ray's
        // half space only for the center tile; test against each tile's own
        // interior instead: the center corner ray itself.
        let dims = GridDimensions::for_viewport(Viewport::new(64, 64), 16);
        let inv_proj = inv_proj_90_square();
        let frustums = build_frustum_grid(inv_proj, dims);

        for (i, frustum) in frustums.iter().enumerate() {
            let tx = i as u32 % dims.tiles_x;
            let ty = i as u32 / dims.tiles_x;
            let ts = dims.tile_size as f32;
            let center = unproject(
                inv_proj,
                Vec3::new(tx as f32 * ts + ts * 0.5, ty as f32 * ts + ts * 0.5, 1.0),
                dims.viewport,
            );
            for plane in frustum.planes {
                assert!(
                    plane.signed_distance(center) > 0.0,
                    "tile {i}: center ray outside plane {:?}",
                    plane
                );
            }
        }
    }

    #[test]
    fn test_grid_is_deterministic() {
        let dims = GridDimensions::for_viewport(Viewport::new(128, 96), 16);
        let inv_proj = inv_proj_90_square();

        let a = build_frustum_grid(inv_proj, dims);
        let b = build_frustum_grid(inv_proj, dims);
        assert_eq!(a, b);
    }

    #[test]
    fn test_grid_independent_of_view() {
        // Only the projection enters the build; nothing view-dependent to vary.
        // Changing the projection, however, must change the grid.
        let dims = GridDimensions::for_viewport(Viewport::new(64, 64), 16);
        let a = build_frustum_grid(inv_proj_90_square(), dims);

        let mut proj = Mat4::perspective_rh(45.0_f32.to_radians(), 1.0, 0.1, 100.0);
        proj.y_axis.y *= -1.0;
        let b = build_frustum_grid(proj.inverse(), dims);

        assert_ne!(a, b);
    }

    #[test]
    fn test_contains_sphere_on_axis() {
        let frustum = single_tile_grid()[0];

        // Straight ahead (view space looks down -Z)
        assert!(frustum.contains_sphere(Vec3::new(0.0, 0.0, -5.0), 1.0));
        // Far off to the side
        assert!(!frustum.contains_sphere(Vec3::new(-50.0, 0.0, -5.0), 1.0));
        // Behind the eye
        assert!(!frustum.contains_sphere(Vec3::new(0.0, 0.0, 5.0), 1.0));
    }

    #[test]
    fn test_sphere_touching_plane_is_kept() {
        let frustum = single_tile_grid()[0];

        // A sphere centered outside the left plane but reaching it must be kept
        let center = Vec3::new(-10.0, 0.0, -5.0);
        let distance = frustum.planes[0].signed_distance(center);
        assert!(distance < 0.0);
        assert!(frustum.contains_sphere(center, -distance + 1e-3));
        assert!(!frustum.contains_sphere(center, -distance - 1e-3));
    }
}
