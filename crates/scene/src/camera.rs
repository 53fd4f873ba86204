//! Camera systems for the culling pipeline.

use glam::{Mat4, Quat, Vec3};

/// Projection type for the camera.
#[derive(Clone, Debug)]
pub enum Projection {
    /// Perspective projection
    Perspective {
        fov_y: f32,
        aspect: f32,
        near: f32,
        far: f32,
    },
    /// Orthographic projection
    Orthographic {
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    },
}

/// A camera driving the view and projection matrices of the culling passes.
///
/// Projection changes are tracked with a dirty flag so the tile frustum grid
/// is only rebuilt when the projection or viewport actually changed. The view
/// matrix has no such tracking since culling reruns every frame anyway.
#[derive(Clone, Debug)]
pub struct Camera {
    /// Camera position in world space
    pub position: Vec3,
    /// Camera rotation
    pub rotation: Quat,
    /// Projection settings
    projection: Projection,
    /// Set whenever the projection changes, cleared by `take_projection_dirty`
    projection_dirty: bool,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 5.0),
            rotation: Quat::IDENTITY,
            projection: Projection::Perspective {
                fov_y: 45.0_f32.to_radians(),
                aspect: 16.0 / 9.0,
                near: 0.1,
                far: 1000.0,
            },
            projection_dirty: true,
        }
    }
}

impl Camera {
    /// Create a new camera with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current projection settings.
    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Set the perspective projection.
    pub fn set_perspective(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        self.projection = Projection::Perspective {
            fov_y,
            aspect,
            near,
            far,
        };
        self.projection_dirty = true;
    }

    /// Set the orthographic projection.
    pub fn set_orthographic(
        &mut self,
        left: f32,
        right: f32,
        bottom: f32,
        top: f32,
        near: f32,
        far: f32,
    ) {
        self.projection = Projection::Orthographic {
            left,
            right,
            bottom,
            top,
            near,
            far,
        };
        self.projection_dirty = true;
    }

    /// Update the aspect ratio (for perspective projection).
    pub fn set_aspect(&mut self, aspect: f32) {
        if let Projection::Perspective {
            fov_y, near, far, ..
        } = self.projection
        {
            self.projection = Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            };
            self.projection_dirty = true;
        }
    }

    /// Returns whether the projection changed since the last call, clearing
    /// the flag.
    pub fn take_projection_dirty(&mut self) -> bool {
        std::mem::take(&mut self.projection_dirty)
    }

    /// Get the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        let forward = self.rotation * Vec3::NEG_Z;
        let target = self.position + forward;
        Mat4::look_at_rh(self.position, target, Vec3::Y)
    }

    /// Get the projection matrix (with Vulkan Y-flip).
    pub fn projection_matrix(&self) -> Mat4 {
        let mut proj = match self.projection {
            Projection::Perspective {
                fov_y,
                aspect,
                near,
                far,
            } => Mat4::perspective_rh(fov_y, aspect, near, far),
            Projection::Orthographic {
                left,
                right,
                bottom,
                top,
                near,
                far,
            } => Mat4::orthographic_rh(left, right, bottom, top, near, far),
        };
        // Flip Y for Vulkan coordinate system
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Get the inverse projection matrix.
    ///
    /// This is the matrix the frustum-grid pass uses to unproject tile
    /// corners from clip space back to view space.
    pub fn inverse_projection_matrix(&self) -> Mat4 {
        self.projection_matrix().inverse()
    }

    /// Get the view-projection matrix.
    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Get the forward direction vector.
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }

    /// Look at a target position.
    pub fn look_at(&mut self, target: Vec3) {
        let forward = (target - self.position).normalize();
        if forward.length_squared() > 0.0 {
            self.rotation = Quat::from_rotation_arc(Vec3::NEG_Z, forward);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_projection_dirty_initially_set() {
        let mut camera = Camera::new();
        assert!(camera.take_projection_dirty());
        assert!(!camera.take_projection_dirty());
    }

    #[test]
    fn test_set_aspect_marks_dirty() {
        let mut camera = Camera::new();
        camera.take_projection_dirty();

        camera.set_aspect(4.0 / 3.0);
        assert!(camera.take_projection_dirty());
    }

    #[test]
    fn test_view_changes_do_not_mark_dirty() {
        let mut camera = Camera::new();
        camera.take_projection_dirty();

        camera.position = Vec3::new(10.0, 2.0, -3.0);
        camera.look_at(Vec3::ZERO);
        assert!(!camera.take_projection_dirty());
    }

    #[test]
    fn test_inverse_projection_roundtrip() {
        let mut camera = Camera::new();
        camera.set_perspective(60.0_f32.to_radians(), 16.0 / 9.0, 0.1, 100.0);

        let identity = camera.projection_matrix() * camera.inverse_projection_matrix();
        for (i, col) in identity.to_cols_array_2d().iter().enumerate() {
            for (j, v) in col.iter().enumerate() {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert!((v - expected).abs() < 1e-5, "entry ({i},{j}) = {v}");
            }
        }
    }

    #[test]
    fn test_view_matrix_at_origin_is_identity() {
        let mut camera = Camera::new();
        camera.position = Vec3::ZERO;
        camera.rotation = Quat::IDENTITY;

        let view = camera.view_matrix();
        assert!((view - Mat4::IDENTITY).abs_diff_eq(Mat4::ZERO, 1e-6));
    }
}
