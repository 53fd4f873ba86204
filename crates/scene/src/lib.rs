//! Scene state for the culling pipeline.
//!
//! This crate provides:
//! - Camera systems (view/projection matrices with change tracking)
//! - Animated point-light storage and its GPU layout

pub mod camera;
pub mod light;

pub use camera::{Camera, Projection};
pub use light::{GpuLight, Light, LightStore, MAX_NUM_LIGHTS};
