//! Error types shared across the culling pipeline.

use thiserror::Error;

/// Main error type for the pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Vulkan-related errors
    #[error("Vulkan error: {0}")]
    Vulkan(String),

    /// Shader loading or compilation errors
    #[error("Shader error: {0}")]
    Shader(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors (invalid caps, zero viewport, over-capacity scenes)
    #[error("Config error: {0}")]
    Config(String),

    /// Generic internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using the pipeline's Error type.
pub type Result<T> = std::result::Result<T, Error>;
