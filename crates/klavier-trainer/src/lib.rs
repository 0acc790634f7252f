//! Training loops and optimization for klavier.
//!
//! This crate provides:
//! - The [`Trainer`] capability trait (train / evaluate / persist)
//! - [`GeneratorTrainer`] for plain reconstruction training
//! - [`GanTrainer`] for adversarial training with an optional pretrained
//!   autoencoder feature loss
//! - Atomic directory checkpoints with full resume support
//! - Step learning-rate scheduling
//! - SNR / LSD evaluation metrics with undefined-value exclusion

#![warn(missing_docs)]

pub mod checkpoint;
pub mod gan_trainer;
pub mod generator_trainer;
pub mod history;
pub mod metrics;
pub mod scheduler;

pub use checkpoint::{CheckpointWriter, TrainerState};
pub use gan_trainer::GanTrainer;
pub use generator_trainer::GeneratorTrainer;
pub use history::LossHistory;
pub use metrics::{aggregate, evaluate_generator, lsd, snr, MetricSummary, MetricsReport};
pub use scheduler::StepLr;

use mlx_rs::error::Exception;
use thiserror::Error;

/// Error type for training operations.
#[derive(Error, Debug)]
pub enum TrainerError {
    /// MLX error.
    #[error("MLX error: {0}")]
    Mlx(#[from] Exception),

    /// Model error.
    #[error("Model error: {0}")]
    Model(#[from] klavier_nn::ModelError),

    /// Dataset error.
    #[error("Data error: {0}")]
    Data(#[from] klavier_data::DataError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Checkpoint serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Missing or malformed checkpoint contents.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Invalid trainer configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for training operations.
pub type Result<T> = std::result::Result<T, TrainerError>;

/// Capabilities every trainer provides.
///
/// Concrete trainers own their injected models, optimizers, schedulers and
/// data loaders; the trait only fixes the lifecycle surface.
pub trait Trainer {
    /// Train for the given number of epochs, validating and checkpointing
    /// at the end of each one.
    fn train(&mut self, epochs: usize) -> Result<()>;

    /// Run one no-grad validation pass and record the aggregated losses.
    fn evaluate(&mut self) -> Result<()>;

    /// Persist the full trainer state to the configured save path.
    fn save(&self) -> Result<()>;

    /// Restore the full trainer state from the configured load path.
    fn load(&mut self) -> Result<()>;
}
