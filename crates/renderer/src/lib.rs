//! GPU execution backend for the tile culling pipeline.
//!
//! [`GpuCuller`] implements the same two passes as the CPU backend with
//! compute shaders: a frustum-grid dispatch that runs only when the
//! projection or viewport changed, and a per-tile light-cull dispatch that
//! runs every frame. Downstream shading waits on the `cull_finished`
//! semaphore exposed in [`GpuCullingOutput`].

pub mod culler;
pub mod params;

pub use culler::{GpuCuller, GpuCullingOutput};
pub use params::CullParams;
