//! Animated point lights and their GPU storage layout.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use rand::Rng;
use tracing::debug;

use forward_core::{Error, Result};

/// Default cap on the number of lights in a scene.
pub const MAX_NUM_LIGHTS: usize = 5000;

/// An animated point light.
///
/// Each light oscillates along the segment from `begin_pos` to `end_pos`;
/// its current world-space position is the linear interpolation at parameter
/// `t`, which wraps in `[0, 1)` as the animation advances.
#[derive(Clone, Copy, Debug)]
pub struct Light {
    /// Start of the animation segment
    pub begin_pos: Vec3,
    /// End of the animation segment
    pub end_pos: Vec3,
    /// Light intensity
    pub intensity: f32,
    /// Attenuation radius (world units), also the culling bound
    pub radius: f32,
    /// Light color
    pub color: Vec3,
    /// Animation parameter in [0, 1)
    pub t: f32,
    /// Animation speed in parameter units per second
    pub speed: f32,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            begin_pos: Vec3::ZERO,
            end_pos: Vec3::ZERO,
            intensity: 1.0,
            radius: 10.0,
            color: Vec3::ONE,
            t: 0.0,
            speed: 0.0,
        }
    }
}

impl Light {
    /// Current world-space position at the light's animation parameter.
    pub fn position(&self) -> Vec3 {
        self.begin_pos.lerp(self.end_pos, self.t)
    }
}

/// GPU-side point light record.
///
/// Layout matches the shader storage buffer (48 bytes):
/// - `begin_pos`: xyz = segment start, w = intensity
/// - `end_pos`:   xyz = segment end,   w = radius
/// - `color`:     xyz = color,         w = animation parameter t
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct GpuLight {
    pub begin_pos: Vec4,
    pub end_pos: Vec4,
    pub color: Vec4,
}

impl GpuLight {
    /// Size of the struct in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

impl From<&Light> for GpuLight {
    fn from(light: &Light) -> Self {
        Self {
            begin_pos: light.begin_pos.extend(light.intensity),
            end_pos: light.end_pos.extend(light.radius),
            color: light.color.extend(light.t),
        }
    }
}

/// A bounded store of animated point lights.
///
/// The capacity is fixed at creation time because the GPU storage buffers
/// that mirror the store are sized once. Exceeding it is a configuration
/// error, never silent truncation.
pub struct LightStore {
    lights: Vec<Light>,
    capacity: usize,
}

impl LightStore {
    /// Creates an empty store with the given capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            lights: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds a light to the store.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the store is full.
    pub fn push(&mut self, light: Light) -> Result<()> {
        if self.lights.len() >= self.capacity {
            return Err(Error::Config(format!(
                "light count would exceed capacity {}",
                self.capacity
            )));
        }
        self.lights.push(light);
        Ok(())
    }

    /// Fills the store with `count` randomized lights inside a bounding box.
    ///
    /// Each light gets a random animation segment within the box, a random
    /// color, and a random speed, which is how demo scenes are populated.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `count` exceeds the remaining
    /// capacity.
    pub fn seed_random<R: Rng>(
        &mut self,
        count: usize,
        min: Vec3,
        max: Vec3,
        radius_range: (f32, f32),
        rng: &mut R,
    ) -> Result<()> {
        if self.lights.len() + count > self.capacity {
            return Err(Error::Config(format!(
                "seeding {} lights would exceed capacity {}",
                count, self.capacity
            )));
        }

        let mut random_point = |rng: &mut R| {
            Vec3::new(
                rng.random_range(min.x..=max.x),
                rng.random_range(min.y..=max.y),
                rng.random_range(min.z..=max.z),
            )
        };

        for _ in 0..count {
            let begin_pos = random_point(rng);
            let end_pos = random_point(rng);
            let light = Light {
                begin_pos,
                end_pos,
                intensity: rng.random_range(0.5..=2.0),
                radius: rng.random_range(radius_range.0..=radius_range.1),
                color: Vec3::new(
                    rng.random_range(0.0..=1.0),
                    rng.random_range(0.0..=1.0),
                    rng.random_range(0.0..=1.0),
                ),
                t: rng.random_range(0.0..1.0),
                speed: rng.random_range(0.05..=0.5),
            };
            self.lights.push(light);
        }

        debug!("Seeded {} randomized lights", count);

        Ok(())
    }

    /// Advances every light's animation parameter by `dt` seconds.
    ///
    /// The parameter wraps into `[0, 1)`; radius, intensity, and the segment
    /// endpoints are untouched.
    pub fn advance(&mut self, dt: f32) {
        for light in &mut self.lights {
            light.t = (light.t + light.speed * dt).rem_euclid(1.0);
        }
    }

    /// Returns the lights as a slice.
    #[inline]
    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Returns the number of lights in the store.
    #[inline]
    pub fn len(&self) -> usize {
        self.lights.len()
    }

    /// Returns true when the store holds no lights.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.lights.is_empty()
    }

    /// Returns the fixed capacity of the store.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Converts the store to the GPU storage layout.
    pub fn gpu_lights(&self) -> Vec<GpuLight> {
        self.lights.iter().map(GpuLight::from).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_gpu_light_layout() {
        // Three vec4s, matching the shader-side struct
        assert_eq!(GpuLight::SIZE, 48);
        assert_eq!(std::mem::align_of::<GpuLight>(), 16);
    }

    #[test]
    fn test_gpu_light_packing() {
        let light = Light {
            begin_pos: Vec3::new(1.0, 2.0, 3.0),
            end_pos: Vec3::new(4.0, 5.0, 6.0),
            intensity: 1.5,
            radius: 7.0,
            color: Vec3::new(0.1, 0.2, 0.3),
            t: 0.25,
            speed: 0.1,
        };

        let gpu = GpuLight::from(&light);
        assert_eq!(gpu.begin_pos, Vec4::new(1.0, 2.0, 3.0, 1.5));
        assert_eq!(gpu.end_pos, Vec4::new(4.0, 5.0, 6.0, 7.0));
        assert_eq!(gpu.color, Vec4::new(0.1, 0.2, 0.3, 0.25));
    }

    #[test]
    fn test_position_lerps_between_endpoints() {
        let mut light = Light {
            begin_pos: Vec3::new(0.0, 0.0, 0.0),
            end_pos: Vec3::new(10.0, 0.0, 0.0),
            t: 0.0,
            ..Default::default()
        };
        assert_eq!(light.position(), Vec3::ZERO);

        light.t = 0.5;
        assert_eq!(light.position(), Vec3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_push_rejects_over_capacity() {
        let mut store = LightStore::with_capacity(1);
        store.push(Light::default()).unwrap();

        let result = store.push(Light::default());
        assert!(matches!(result, Err(Error::Config(_))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_advance_wraps_parameter() {
        let mut store = LightStore::with_capacity(4);
        store
            .push(Light {
                t: 0.9,
                speed: 1.0,
                ..Default::default()
            })
            .unwrap();

        store.advance(0.2);
        let t = store.lights()[0].t;
        assert!((t - 0.1).abs() < 1e-6, "t = {t}");
        assert!((0.0..1.0).contains(&t));
    }

    #[test]
    fn test_advance_leaves_radius_and_intensity() {
        let mut store = LightStore::with_capacity(4);
        store
            .push(Light {
                radius: 3.0,
                intensity: 2.0,
                speed: 0.7,
                ..Default::default()
            })
            .unwrap();

        store.advance(1.0);
        assert_eq!(store.lights()[0].radius, 3.0);
        assert_eq!(store.lights()[0].intensity, 2.0);
    }

    #[test]
    fn test_seed_random_is_deterministic_per_seed() {
        let mut a = LightStore::with_capacity(64);
        let mut b = LightStore::with_capacity(64);

        let min = Vec3::splat(-10.0);
        let max = Vec3::splat(10.0);

        let mut rng_a = StdRng::seed_from_u64(7);
        let mut rng_b = StdRng::seed_from_u64(7);
        a.seed_random(32, min, max, (1.0, 5.0), &mut rng_a).unwrap();
        b.seed_random(32, min, max, (1.0, 5.0), &mut rng_b).unwrap();

        assert_eq!(a.gpu_lights(), b.gpu_lights());
    }

    #[test]
    fn test_seed_random_respects_capacity() {
        let mut store = LightStore::with_capacity(8);
        let mut rng = StdRng::seed_from_u64(1);

        let result = store.seed_random(
            9,
            Vec3::splat(-1.0),
            Vec3::splat(1.0),
            (1.0, 2.0),
            &mut rng,
        );
        assert!(matches!(result, Err(Error::Config(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn test_seeded_lights_within_bounds() {
        let mut store = LightStore::with_capacity(32);
        let mut rng = StdRng::seed_from_u64(42);
        let min = Vec3::new(-5.0, 0.0, -5.0);
        let max = Vec3::new(5.0, 4.0, 5.0);

        store.seed_random(32, min, max, (1.0, 3.0), &mut rng).unwrap();

        for light in store.lights() {
            for p in [light.begin_pos, light.end_pos] {
                assert!(p.cmpge(min).all() && p.cmple(max).all());
            }
            assert!((1.0..=3.0).contains(&light.radius));
            assert!((0.0..1.0).contains(&light.t));
        }
    }
}
