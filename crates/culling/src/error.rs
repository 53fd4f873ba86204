//! Culling-specific error types.

use thiserror::Error;

/// Errors produced by the culling pipeline.
///
/// Configuration and capacity violations are synchronous and fatal; the
/// pipeline never silently clamps an invalid configuration. Per-tile list
/// overflow is NOT an error (it is a documented drop policy handled inside
/// the binning pass).
#[derive(Error, Debug)]
pub enum CullingError {
    /// Invalid configuration (zero tile size, zero viewport, ...)
    #[error("Config error: {0}")]
    Config(String),

    /// A fixed capacity would be exceeded
    #[error("{what} capacity exceeded: requested {requested}, capacity {capacity}")]
    CapacityExceeded {
        what: &'static str,
        requested: usize,
        capacity: usize,
    },

    /// Failure in the execution backend (device loss, submission failure)
    #[error("Backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl CullingError {
    /// Wraps a backend failure.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CullingError::Backend(Box::new(err))
    }
}

/// Result type alias for culling operations.
pub type CullingResult<T> = std::result::Result<T, CullingError>;
