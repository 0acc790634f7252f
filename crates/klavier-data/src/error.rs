//! Error types for the data crate.

use thiserror::Error;

/// Result type for dataset operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Error type for dataset construction and loading.
#[derive(Error, Debug)]
pub enum DataError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// WAV decoding error.
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    /// Invalid dataset configuration or contents.
    #[error("Dataset error: {0}")]
    Dataset(String),
}
