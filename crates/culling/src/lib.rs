//! Tile-based (Forward+) light culling.
//!
//! This crate implements the screen-space tile culling pipeline:
//! - Grid configuration and validation
//! - Tile frustum construction from the camera projection
//! - Per-tile light binning with a bounded per-tile list
//! - The frame orchestrator driving grid rebuilds and per-frame culling
//!
//! The algorithm itself is execution-agnostic: [`CullExecutor`] is the seam
//! between the orchestrator and a backend, with [`CpuCuller`] as the
//! rayon-parallel reference implementation. A GPU backend drives the same
//! passes through compute shaders.

mod error;

pub mod config;
pub mod cull;
pub mod executor;
pub mod frustum;
pub mod orchestrator;

pub use config::{CullingConfig, GridDimensions, Viewport};
pub use cull::{CullingSnapshot, LightGridEntry, cull_lights};
pub use error::{CullingError, CullingResult};
pub use executor::{CpuCuller, CullContext, CullExecutor, GridBuildContext};
pub use frustum::{Plane, TileFrustum, build_frustum_grid};
pub use orchestrator::{FrameOrchestrator, FrameState};
