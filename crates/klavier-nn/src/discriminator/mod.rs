//! Waveform discriminator for adversarial training.

use crate::error::{ModelError, Result};
use crate::nn::{DownBlock, Linear, PRelu};
use klavier_core::ModelConfig;
use mlx_rs::macros::ModuleParameters;
use mlx_rs::Array;

/// Encoder stack followed by a two-layer classification head.
///
/// Consumes `[batch, 1, window]` waveforms and emits one raw logit per
/// example, trained with the least-squares objective (no sigmoid).
#[derive(Debug, ModuleParameters)]
pub struct Discriminator {
    /// Encoder stages.
    #[param]
    pub blocks: Vec<DownBlock>,
    /// First fully-connected layer over the flattened features.
    #[param]
    pub fc1: Linear,
    /// Activation between the fully-connected layers.
    #[param]
    pub activation: PRelu,
    /// Output layer producing one logit.
    #[param]
    pub fc2: Linear,
}

impl Discriminator {
    /// Build a discriminator from configuration.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let depth = config.n_blocks_discriminator;
        if depth == 0 {
            return Err(ModelError::Config(
                "discriminator needs at least one block".into(),
            ));
        }
        let factor = config.downscale_factor;

        let mut blocks = Vec::with_capacity(depth);
        let mut channels = 1;
        let mut window = config.window_length;
        for _ in 0..depth {
            if window % factor != 0 {
                return Err(ModelError::Config(format!(
                    "window length {} not divisible by {} across {} discriminator stages",
                    config.window_length, factor, depth
                )));
            }
            window /= factor;

            let block = DownBlock::new(
                channels,
                &config.kernel_sizes,
                &config.channel_sizes,
                config.bottleneck_channels,
                config.use_bottleneck,
                factor,
            )?;
            channels = block.out_channels();
            blocks.push(block);
        }

        let flat_features = channels * window;
        let fc1 = Linear::new(flat_features, config.fc_output_features)?;
        let activation = PRelu::new(config.fc_output_features)?;
        let fc2 = Linear::new(config.fc_output_features, 1)?;

        Ok(Self {
            blocks,
            fc1,
            activation,
            fc2,
        })
    }

    /// Forward pass: `[B, 1, L]` -> `[B, 1]` logits.
    pub fn forward(&self, x: &Array) -> Result<Array> {
        let batch = x.dim(0);

        let mut h = x.clone();
        for block in &self.blocks {
            h = block.forward(&h)?;
        }

        let h = h.reshape(&[batch, -1])?;
        let h = self.fc1.forward(&h)?;
        let h = self.activation.forward(&h)?;
        self.fc2.forward(&h)
    }
}
