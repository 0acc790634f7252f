//! Convolutional autoencoder.
//!
//! Same encoder/decoder stages as the generator but without shortcuts, so the
//! bottleneck embedding has to carry everything. A pretrained instance serves
//! as a fixed feature extractor for the GAN's embedding-distance loss.

use crate::error::{ModelError, Result};
use crate::nn::{Conv1d, DownBlock, UpBlock};
use klavier_core::ModelConfig;
use mlx_rs::macros::ModuleParameters;
use mlx_rs::Array;

/// Skip-free encoder/decoder over waveform windows.
#[derive(Debug, ModuleParameters)]
pub struct Autoencoder {
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

impl Autoencoder {
    /// Build an autoencoder from configuration.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let depth = config.autoencoder_depth();
        if depth == 0 || config.n_blocks_autoencoder % 2 != 0 {
            return Err(ModelError::Config(format!(
                "autoencoder needs an even, positive block count, got {}",
                config.n_blocks_autoencoder
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

        let mut down_blocks = Vec::with_capacity(depth);
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
            down_blocks.push(block);
        }

        let mut up_blocks = Vec::with_capacity(depth);
        for _ in 0..depth {
            let block = UpBlock::new(
                channels,
                &config.kernel_sizes,
                &config.channel_sizes,
                config.bottleneck_channels,
                config.use_bottleneck,
                config.dropout_probability,
                factor,
            )?;
            channels = block.out_channels();
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

    /// Encode a window into its bottleneck embedding.
    ///
    /// # Arguments
    /// * `x` - Input tensor [batch, 1, window]
    ///
    /// # Returns
    /// Embedding tensor [batch, sum(channels)*f, window / f^depth]
    pub fn embed(&self, x: &Array) -> Result<Array> {
        let mut h = x.clone();
        for block in &self.down_blocks {
            h = block.forward(&h)?;
        }
        Ok(h)
    }

    /// Full reconstruction pass: `[B, 1, L]` -> `[B, 1, L]`.
    pub fn forward(&self, x: &Array) -> Result<Array> {
        let mut h = self.embed(x)?;
        for block in &self.up_blocks {
            h = block.forward(&h, None)?;
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

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> ModelConfig {
        ModelConfig {
            window_length: 64,
            kernel_sizes: vec![3, 9],
            channel_sizes: vec![4, 4],
            bottleneck_channels: 2,
            n_blocks_autoencoder: 4,
            ..ModelConfig::default()
        }
    }

    #[test]
    fn test_autoencoder_round_trips_shape() {
        let autoencoder = Autoencoder::new(&small_config()).unwrap();

        let x = mlx_rs::random::normal::<f32>(&[2, 1, 64], None, None, None).unwrap();
        let y = autoencoder.forward(&x).unwrap();
        y.eval().unwrap();

        assert_eq!(y.shape(), &[2, 1, 64]);
    }

    #[test]
    fn test_autoencoder_embedding_shape() {
        let autoencoder = Autoencoder::new(&small_config()).unwrap();

        let x = mlx_rs::random::normal::<f32>(&[1, 1, 64], None, None, None).unwrap();
        let z = autoencoder.embed(&x).unwrap();
        z.eval().unwrap();

        // Two factor-2 stages: 64 samples -> 16, 1 channel -> 16
        assert_eq!(z.shape(), &[1, 16, 16]);
    }
}
