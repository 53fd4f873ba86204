//! Grid configuration and validation.

use crate::error::{CullingError, CullingResult};

/// Default tile edge length in pixels.
pub const DEFAULT_TILE_SIZE: u32 = 16;

/// Default cap on lights stored per tile.
pub const DEFAULT_MAX_LIGHTS_PER_TILE: u32 = 128;

/// Default cap on lights in the scene.
pub const DEFAULT_MAX_LIGHTS: u32 = 5000;

/// Default cap on tile frustums, which bounds the supported resolution.
pub const DEFAULT_MAX_FRUSTUMS: u32 = 20000;

/// Fixed capacities of the culling pipeline.
///
/// All buffer sizes derive from these caps at configure time; none of them
/// change while the pipeline runs. An invalid configuration is rejected
/// synchronously, never clamped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CullingConfig {
    /// Tile edge length in pixels
    pub tile_size: u32,
    /// Maximum lights recorded per tile; excess lights are dropped
    pub max_lights_per_tile: u32,
    /// Maximum lights in the scene
    pub max_lights: u32,
    /// Maximum tile frustums (bounds the viewport the grid can cover)
    pub max_frustums: u32,
}

impl Default for CullingConfig {
    fn default() -> Self {
        Self {
            tile_size: DEFAULT_TILE_SIZE,
            max_lights_per_tile: DEFAULT_MAX_LIGHTS_PER_TILE,
            max_lights: DEFAULT_MAX_LIGHTS,
            max_frustums: DEFAULT_MAX_FRUSTUMS,
        }
    }
}

impl CullingConfig {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when any cap is zero.
    pub fn validate(&self) -> CullingResult<()> {
        if self.tile_size == 0 {
            return Err(CullingError::Config("tile_size must be nonzero".into()));
        }
        if self.max_lights_per_tile == 0 {
            return Err(CullingError::Config(
                "max_lights_per_tile must be nonzero".into(),
            ));
        }
        if self.max_lights == 0 {
            return Err(CullingError::Config("max_lights must be nonzero".into()));
        }
        if self.max_frustums == 0 {
            return Err(CullingError::Config("max_frustums must be nonzero".into()));
        }
        Ok(())
    }

    /// Computes the grid dimensions for a viewport.
    ///
    /// # Errors
    ///
    /// Returns an error when the viewport is degenerate or the resulting
    /// tile count exceeds `max_frustums`.
    pub fn grid_for(&self, viewport: Viewport) -> CullingResult<GridDimensions> {
        viewport.validate()?;

        let dims = GridDimensions::for_viewport(viewport, self.tile_size);
        let tiles = dims.tile_count() as usize;
        if tiles > self.max_frustums as usize {
            return Err(CullingError::CapacityExceeded {
                what: "tile frustum",
                requested: tiles,
                capacity: self.max_frustums as usize,
            });
        }

        Ok(dims)
    }
}

/// A screen viewport in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Creates a viewport.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Rejects degenerate viewports.
    pub fn validate(&self) -> CullingResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(CullingError::Config(format!(
                "viewport must be nonzero, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Aspect ratio (width over height).
    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Tile grid dimensions derived from a viewport and tile size.
///
/// Edge tiles cover the partial rows/columns when the viewport is not a
/// multiple of the tile size; their frustums still span a full tile's worth
/// of pixels, which over-includes slightly rather than dropping lights.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridDimensions {
    /// Number of tile columns
    pub tiles_x: u32,
    /// Number of tile rows
    pub tiles_y: u32,
    /// Tile edge length in pixels
    pub tile_size: u32,
    /// Viewport the grid was derived from
    pub viewport: Viewport,
}

impl GridDimensions {
    /// Computes the grid covering a viewport, rounding up at the edges.
    pub fn for_viewport(viewport: Viewport, tile_size: u32) -> Self {
        Self {
            tiles_x: viewport.width.div_ceil(tile_size),
            tiles_y: viewport.height.div_ceil(tile_size),
            tile_size,
            viewport,
        }
    }

    /// Total number of tiles.
    #[inline]
    pub fn tile_count(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }

    /// Row-major index of the tile at grid coordinates (x, y).
    #[inline]
    pub fn tile_index(&self, x: u32, y: u32) -> u32 {
        y * self.tiles_x + x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_caps() {
        let config = CullingConfig::default();
        assert_eq!(config.tile_size, 16);
        assert_eq!(config.max_lights_per_tile, 128);
        assert_eq!(config.max_lights, 5000);
        assert_eq!(config.max_frustums, 20000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_tile_size_rejected() {
        let config = CullingConfig {
            tile_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CullingError::Config(_))
        ));
    }

    #[test]
    fn test_grid_dimensions_1080p() {
        let dims = GridDimensions::for_viewport(Viewport::new(1920, 1080), 16);
        assert_eq!(dims.tiles_x, 120);
        assert_eq!(dims.tiles_y, 68); // 1080 / 16 = 67.5, rounded up
        assert_eq!(dims.tile_count(), 8160);
    }

    #[test]
    fn test_grid_dimensions_exact_fit() {
        let dims = GridDimensions::for_viewport(Viewport::new(1280, 720), 16);
        assert_eq!(dims.tiles_x, 80);
        assert_eq!(dims.tiles_y, 45);
    }

    #[test]
    fn test_tile_index_row_major() {
        let dims = GridDimensions::for_viewport(Viewport::new(64, 64), 16);
        assert_eq!(dims.tiles_x, 4);
        assert_eq!(dims.tile_index(0, 0), 0);
        assert_eq!(dims.tile_index(3, 0), 3);
        assert_eq!(dims.tile_index(0, 1), 4);
        assert_eq!(dims.tile_index(2, 3), 14);
    }

    #[test]
    fn test_zero_viewport_rejected() {
        let config = CullingConfig::default();
        assert!(config.grid_for(Viewport::new(0, 720)).is_err());
        assert!(config.grid_for(Viewport::new(1280, 0)).is_err());
    }

    #[test]
    fn test_frustum_capacity_enforced() {
        // 4K at 8px tiles is 480 * 270 = 129600 tiles, above the default cap
        let config = CullingConfig {
            tile_size: 8,
            ..Default::default()
        };
        let result = config.grid_for(Viewport::new(3840, 2160));
        assert!(matches!(
            result,
            Err(CullingError::CapacityExceeded { what: "tile frustum", .. })
        ));
    }
}
