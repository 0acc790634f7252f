//! Decoder stage.

use crate::error::{ModelError, Result};
use crate::nn::{BaseBlock, Dropout, PRelu, SubPixel1d};
use mlx_rs::macros::ModuleParameters;
use mlx_rs::Array;

/// One decoder stage: multi-scale convolutions, dropout, PReLU, sub-pixel
/// upsampling, then optional concatenation with an encoder-side shortcut.
#[derive(Debug, ModuleParameters)]
pub struct UpBlock {
    /// Multi-scale convolution stage.
    #[param]
    pub base: BaseBlock,
    /// Per-channel activation over the concatenated branches.
    #[param]
    pub activation: PRelu,
    /// Dropout applied before the activation.
    pub dropout: Dropout,
    /// Channel/length rearrangement.
    pub subpixel: SubPixel1d,
}

impl UpBlock {
    /// Create a new decoder stage.
    ///
    /// `sum(channel_sizes)` must be divisible by the upscale factor so the
    /// sub-pixel rearrangement is well defined.
    pub fn new(
        in_channels: i32,
        kernel_sizes: &[i32],
        channel_sizes: &[i32],
        bottleneck_channels: i32,
        use_bottleneck: bool,
        dropout_probability: f32,
        upscale_factor: i32,
    ) -> Result<Self> {
        let base = BaseBlock::new(
            in_channels,
            kernel_sizes,
            channel_sizes,
            bottleneck_channels,
            use_bottleneck,
        )?;
        if base.out_channels % upscale_factor != 0 {
            return Err(ModelError::Config(format!(
                "sum of channel sizes {} not divisible by upscale factor {}",
                base.out_channels, upscale_factor
            )));
        }
        let activation = PRelu::new(base.out_channels)?;
        let dropout = Dropout::new(dropout_probability)?;
        let subpixel = SubPixel1d::new(upscale_factor)?;

        Ok(Self {
            base,
            activation,
            dropout,
            subpixel,
        })
    }

    /// Channel count after upsampling, excluding any shortcut.
    pub fn out_channels(&self) -> i32 {
        self.base.out_channels / self.subpixel.factor
    }

    /// Forward pass: `[B, C_in, L]` -> `[B, sum(channels)/f (+ C_s), L*f]`.
    ///
    /// When a shortcut is supplied its length must equal the post-upsample
    /// length of the main path; it is concatenated along the channel axis.
    pub fn forward(&self, x: &Array, shortcut: Option<&Array>) -> Result<Array> {
        let x = self.base.forward(x)?;
        let x = self.dropout.forward(&x)?;
        let x = self.activation.forward(&x)?;
        let x = self.subpixel.forward(&x)?;

        match shortcut {
            None => Ok(x),
            Some(shortcut) => {
                if shortcut.dim(2) != x.dim(2) || shortcut.dim(0) != x.dim(0) {
                    return Err(ModelError::Shape(format!(
                        "shortcut shape {:?} incompatible with decoder output {:?}",
                        shortcut.shape(),
                        x.shape()
                    )));
                }
                Ok(mlx_rs::ops::concatenate_axis(&[&x, shortcut], 1)?)
            }
        }
    }

    /// Toggle dropout between training and evaluation behavior.
    pub fn set_training(&mut self, training: bool) {
        self.dropout.training = training;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_up_block_shape_without_shortcut() {
        let block = UpBlock::new(16, &[3, 9], &[4, 4], 2, true, 0.2, 2).unwrap();

        let x = mlx_rs::random::normal::<f32>(&[1, 16, 32], None, None, None).unwrap();
        let y = block.forward(&x, None).unwrap();
        y.eval().unwrap();

        // sum(channel_sizes)=8 halved by the factor-2 subpixel, length doubled
        assert_eq!(y.shape(), &[1, 4, 64]);
    }

    #[test]
    fn test_up_block_concatenates_shortcut() {
        let block = UpBlock::new(16, &[3, 9], &[4, 4], 2, true, 0.2, 2).unwrap();

        let x = mlx_rs::random::normal::<f32>(&[1, 16, 32], None, None, None).unwrap();
        let shortcut = mlx_rs::random::normal::<f32>(&[1, 6, 64], None, None, None).unwrap();

        let y = block.forward(&x, Some(&shortcut)).unwrap();
        y.eval().unwrap();

        // 4 own channels + 6 shortcut channels
        assert_eq!(y.shape(), &[1, 10, 64]);
    }

    #[test]
    fn test_up_block_rejects_shortcut_length_mismatch() {
        let block = UpBlock::new(16, &[3, 9], &[4, 4], 2, true, 0.0, 2).unwrap();

        let x = mlx_rs::random::normal::<f32>(&[1, 16, 32], None, None, None).unwrap();
        let shortcut = mlx_rs::random::normal::<f32>(&[1, 6, 63], None, None, None).unwrap();

        assert!(matches!(
            block.forward(&x, Some(&shortcut)),
            Err(ModelError::Shape(_))
        ));
    }

    #[test]
    fn test_up_block_rejects_indivisible_channels() {
        // sum(channel_sizes)=7 cannot be rearranged by a factor of 2
        assert!(UpBlock::new(16, &[3, 9], &[4, 3], 2, true, 0.2, 2).is_err());
    }
}
