//! Error types for the model crate.

use mlx_rs::error::Exception;
use thiserror::Error;

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Error type for model construction and forward passes.
#[derive(Error, Debug)]
pub enum ModelError {
    /// MLX operation error.
    #[error("MLX error: {0}")]
    Mlx(#[from] Exception),

    /// Construction-time configuration error (mismatched list lengths,
    /// invalid kernel or channel counts).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Runtime shape contract violation (non-divisible resampling lengths,
    /// shortcut length mismatches).
    #[error("Shape error: {0}")]
    Shape(String),
}
