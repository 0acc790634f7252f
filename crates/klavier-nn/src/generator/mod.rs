//! U-Net generator for waveform-to-waveform timbre transfer.
//!
//! The generator is a symmetric stack of encoder and decoder stages. Encoder
//! outputs are carried across to the matching decoder stages as channel-wise
//! shortcuts, and the final decoder stage concatenates the raw input window,
//! so high-resolution detail survives the bottleneck.

use crate::error::{ModelError, Result};
use crate::nn::{Conv1d, DownBlock, UpBlock};
use klavier_core::ModelConfig;
use mlx_rs::macros::ModuleParameters;
use mlx_rs::Array;

/// Waveform-to-waveform U-Net.
///
/// Transforms `[batch, 1, window]` input windows into `[batch, 1, window]`
/// output windows normalized to [-1, 1].
#[derive(Debug, ModuleParameters)]
pub struct Generator {
    /// Encoder stages.
    #[param]
    pub down_blocks: Vec<DownBlock>,
    /// Decoder stages.
    #[param]
    pub up_blocks: Vec<UpBlock>,
    /// Final convolution down to a single channel.
    #[param]
    pub conv_out: Conv1d,
}

impl Generator {
    /// Build a generator from configuration.
    ///
    /// Channel bookkeeping between consecutive stages is resolved here; any
    /// inconsistency in the configuration is a construction-time error.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let depth = config.generator_depth();
        if depth == 0 || config.n_blocks_generator % 2 != 0 {
            return Err(ModelError::Config(format!(
                "generator needs an even, positive block count, got {}",
                config.n_blocks_generator
            )));
        }
        if config.upscale_factor != config.downscale_factor {
            return Err(ModelError::Config(format!(
                "encoder/decoder factors must match for the length round trip, got {} and {}",
                config.downscale_factor, config.upscale_factor
            )));
        }
        let factor = config.downscale_factor;
        let mut window = config.window_length;
        for _ in 0..depth {
            if window % factor != 0 {
                return Err(ModelError::Config(format!(
                    "window length {} not divisible by {} across {} stages",
                    config.window_length, factor, depth
                )));
            }
            window /= factor;
        }

        let sum_channels = config.sum_channels();

        // Encoder: each stage emits sum(channel_sizes) * factor channels.
        // The raw input is the first shortcut; every encoder output except
        // the deepest one is a shortcut for the decoder.
        let mut down_blocks = Vec::with_capacity(depth);
        let mut shortcut_channels = vec![1];
        let mut channels = 1;
        for _ in 0..depth {
            let block = DownBlock::new(
                channels,
                &config.kernel_sizes,
                &config.channel_sizes,
                config.bottleneck_channels,
                config.use_bottleneck,
                factor,
            )?;
            channels = block.out_channels();
            shortcut_channels.push(channels);
            down_blocks.push(block);
        }

        // Decoder: own channels plus the matching shortcut's channels.
        let mut up_blocks = Vec::with_capacity(depth);
        for i in 0..depth {
            let block = UpBlock::new(
                channels,
                &config.kernel_sizes,
                &config.channel_sizes,
                config.bottleneck_channels,
                config.use_bottleneck,
                config.dropout_probability,
                factor,
            )?;
            channels = block.out_channels() + shortcut_channels[depth - 1 - i];
            up_blocks.push(block);
        }

        let conv_out = Conv1d::new(
            channels,
            1,
            config.output_kernel_size,
            Some((config.output_kernel_size - 1) / 2),
            None,
        )?;

        Ok(Self {
            down_blocks,
            up_blocks,
            conv_out,
        })
    }

    /// Forward pass: `[B, 1, L]` -> `[B, 1, L]`.
    pub fn forward(&self, x: &Array) -> Result<Array> {
        let mut shortcuts = vec![x.clone()];
        let mut h = x.clone();

        for (i, down) in self.down_blocks.iter().enumerate() {
            h = down.forward(&h)?;
            if i + 1 < self.down_blocks.len() {
                shortcuts.push(h.clone());
            }
        }

        for (i, up) in self.up_blocks.iter().enumerate() {
            let shortcut = &shortcuts[shortcuts.len() - 1 - i];
            h = up.forward(&h, Some(shortcut))?;
        }

        let out = self.conv_out.forward(&h)?;
        Ok(mlx_rs::ops::tanh(&out)?)
    }

    /// Toggle dropout between training and evaluation behavior.
    pub fn set_training(&mut self, training: bool) {
        for block in &mut self.up_blocks {
            block.set_training(training);
        }
    }
}
