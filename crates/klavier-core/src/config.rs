//! Model and training configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Network architecture configuration shared by the generator, discriminator
/// and autoencoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of samples per waveform window.
    #[serde(default = "default_window_length")]
    pub window_length: i32,

    /// Kernel sizes of the parallel convolution branches (must be odd).
    #[serde(default = "default_kernel_sizes")]
    pub kernel_sizes: Vec<i32>,

    /// Output channels of each parallel branch; one entry per kernel size.
    #[serde(default = "default_channel_sizes")]
    pub channel_sizes: Vec<i32>,

    /// Channels of the 1x1 bottleneck projection in front of each branch.
    #[serde(default = "default_bottleneck_channels")]
    pub bottleneck_channels: i32,

    /// Whether the bottleneck projections are used at all.
    #[serde(default = "default_true")]
    pub use_bottleneck: bool,

    /// Temporal downscale factor of each encoder stage.
    #[serde(default = "default_resample_factor")]
    pub downscale_factor: i32,

    /// Temporal upscale factor of each decoder stage.
    #[serde(default = "default_resample_factor")]
    pub upscale_factor: i32,

    /// Dropout probability inside decoder stages.
    #[serde(default = "default_dropout_probability")]
    pub dropout_probability: f32,

    /// Total number of generator blocks (half encoder, half decoder).
    #[serde(default = "default_n_blocks_generator")]
    pub n_blocks_generator: usize,

    /// Number of encoder blocks in the discriminator.
    #[serde(default = "default_n_blocks_discriminator")]
    pub n_blocks_discriminator: usize,

    /// Total number of autoencoder blocks (half encoder, half decoder).
    #[serde(default = "default_n_blocks_autoencoder")]
    pub n_blocks_autoencoder: usize,

    /// Kernel size of the final output convolution.
    #[serde(default = "default_output_kernel_size")]
    pub output_kernel_size: i32,

    /// Width of the discriminator's first fully-connected layer.
    #[serde(default = "default_fc_output_features")]
    pub fc_output_features: i32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            window_length: default_window_length(),
            kernel_sizes: default_kernel_sizes(),
            channel_sizes: default_channel_sizes(),
            bottleneck_channels: default_bottleneck_channels(),
            use_bottleneck: true,
            downscale_factor: default_resample_factor(),
            upscale_factor: default_resample_factor(),
            dropout_probability: default_dropout_probability(),
            n_blocks_generator: default_n_blocks_generator(),
            n_blocks_discriminator: default_n_blocks_discriminator(),
            n_blocks_autoencoder: default_n_blocks_autoencoder(),
            output_kernel_size: default_output_kernel_size(),
            fc_output_features: default_fc_output_features(),
        }
    }
}

impl ModelConfig {
    /// Sum of the per-branch channel sizes, i.e. the channel count a
    /// multi-scale stage produces before resampling.
    pub fn sum_channels(&self) -> i32 {
        self.channel_sizes.iter().sum()
    }

    /// Number of encoder (and decoder) stages in the generator.
    pub fn generator_depth(&self) -> usize {
        self.n_blocks_generator / 2
    }

    /// Number of encoder (and decoder) stages in the autoencoder.
    pub fn autoencoder_depth(&self) -> usize {
        self.n_blocks_autoencoder / 2
    }
}

/// Training configuration for the generator and GAN trainers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Learning rate of the generator optimizer.
    #[serde(default = "default_learning_rate")]
    pub generator_lr: f32,

    /// Learning rate of the discriminator optimizer.
    #[serde(default = "default_learning_rate")]
    pub discriminator_lr: f32,

    /// Epochs between learning-rate decays.
    #[serde(default = "default_scheduler_step")]
    pub scheduler_step: usize,

    /// Multiplicative learning-rate decay factor.
    #[serde(default = "default_scheduler_gamma")]
    pub scheduler_gamma: f32,

    /// Whether the magnitude-spectrogram reconstruction term contributes to
    /// the optimized loss. The term is always recorded for diagnostics.
    #[serde(default)]
    pub use_frequency_loss: bool,

    /// Weight of the frequency-domain reconstruction term.
    #[serde(default = "default_lambda_freq")]
    pub lambda_freq: f32,

    /// Whether the adversarial term contributes to the generator loss.
    #[serde(default = "default_true")]
    pub use_adversarial: bool,

    /// Weight of the adversarial term.
    #[serde(default = "default_lambda_adversarial")]
    pub lambda_adversarial: f32,

    /// Weight of the autoencoder embedding-distance term.
    #[serde(default = "default_lambda_autoencoder")]
    pub lambda_autoencoder: f32,

    /// Number of epochs to train for.
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    /// Directory the trainer checkpoints into at the end of every epoch.
    pub save_path: PathBuf,

    /// Checkpoint directory to resume from. Training fails fast if this is
    /// set and the checkpoint cannot be loaded.
    #[serde(default)]
    pub load_path: Option<PathBuf>,

    /// Checkpoint directory holding a pretrained autoencoder used for the
    /// embedding-distance loss. None disables the term.
    #[serde(default)]
    pub autoencoder_path: Option<PathBuf>,
}

impl TrainConfig {
    /// Configuration with defaults and the given checkpoint directory.
    pub fn with_save_path(save_path: impl Into<PathBuf>) -> Self {
        Self {
            generator_lr: default_learning_rate(),
            discriminator_lr: default_learning_rate(),
            scheduler_step: default_scheduler_step(),
            scheduler_gamma: default_scheduler_gamma(),
            use_frequency_loss: false,
            lambda_freq: default_lambda_freq(),
            use_adversarial: true,
            lambda_adversarial: default_lambda_adversarial(),
            lambda_autoencoder: default_lambda_autoencoder(),
            epochs: default_epochs(),
            save_path: save_path.into(),
            load_path: None,
            autoencoder_path: None,
        }
    }
}

fn default_window_length() -> i32 {
    8192
}
fn default_kernel_sizes() -> Vec<i32> {
    vec![3, 9, 27, 81]
}
fn default_channel_sizes() -> Vec<i32> {
    vec![24, 24, 8, 8]
}
fn default_bottleneck_channels() -> i32 {
    4
}
fn default_resample_factor() -> i32 {
    2
}
fn default_dropout_probability() -> f32 {
    0.2
}
fn default_n_blocks_generator() -> usize {
    8
}
fn default_n_blocks_discriminator() -> usize {
    7
}
fn default_n_blocks_autoencoder() -> usize {
    4
}
fn default_output_kernel_size() -> i32 {
    27
}
fn default_fc_output_features() -> i32 {
    64
}
fn default_learning_rate() -> f32 {
    1e-4
}
fn default_scheduler_step() -> usize {
    30
}
fn default_scheduler_gamma() -> f32 {
    0.5
}
fn default_lambda_freq() -> f32 {
    1e-3
}
fn default_lambda_adversarial() -> f32 {
    1e-3
}
fn default_lambda_autoencoder() -> f32 {
    1e-1
}
fn default_epochs() -> usize {
    10
}
fn default_true() -> bool {
    true
}
