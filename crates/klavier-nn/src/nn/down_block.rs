//! Encoder stage.

use crate::error::Result;
use crate::nn::{BaseBlock, PRelu, SuperPixel1d};
use mlx_rs::macros::ModuleParameters;
use mlx_rs::Array;

/// One encoder stage: multi-scale convolutions, PReLU, then super-pixel
/// downsampling. Divides the temporal length by the factor while multiplying
/// the channel count by the same factor.
#[derive(Debug, ModuleParameters)]
pub struct DownBlock {
    /// Multi-scale convolution stage.
    #[param]
    pub base: BaseBlock,
    /// Per-channel activation over the concatenated branches.
    #[param]
    pub activation: PRelu,
    /// Channel/length rearrangement.
    pub superpixel: SuperPixel1d,
}

impl DownBlock {
    /// Create a new encoder stage.
    pub fn new(
        in_channels: i32,
        kernel_sizes: &[i32],
        channel_sizes: &[i32],
        bottleneck_channels: i32,
        use_bottleneck: bool,
        downscale_factor: i32,
    ) -> Result<Self> {
        let base = BaseBlock::new(
            in_channels,
            kernel_sizes,
            channel_sizes,
            bottleneck_channels,
            use_bottleneck,
        )?;
        let activation = PRelu::new(base.out_channels)?;
        let superpixel = SuperPixel1d::new(downscale_factor)?;

        Ok(Self {
            base,
            activation,
            superpixel,
        })
    }

    /// Channel count after downsampling.
    pub fn out_channels(&self) -> i32 {
        self.base.out_channels * self.superpixel.factor
    }

    /// Forward pass: `[B, C_in, L]` -> `[B, sum(channels)*f, L/f]`.
    pub fn forward(&self, x: &Array) -> Result<Array> {
        let x = self.base.forward(x)?;
        let x = self.activation.forward(&x)?;
        self.superpixel.forward(&x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_down_block_shape() {
        let block = DownBlock::new(1, &[3, 9, 27, 81], &[24, 24, 8, 8], 4, true, 2).unwrap();

        let x = mlx_rs::random::normal::<f32>(&[1, 1, 256], None, None, None).unwrap();
        let y = block.forward(&x).unwrap();
        y.eval().unwrap();

        // sum(channel_sizes)=64, doubled by the factor-2 superpixel
        assert_eq!(y.shape(), &[1, 128, 128]);
        assert_eq!(block.out_channels(), 128);
    }

    #[test]
    fn test_down_block_stacks() {
        let first = DownBlock::new(1, &[3, 9], &[4, 4], 2, true, 2).unwrap();
        let second = DownBlock::new(first.out_channels(), &[3, 9], &[4, 4], 2, true, 2).unwrap();

        let x = mlx_rs::random::normal::<f32>(&[2, 1, 64], None, None, None).unwrap();
        let y = second.forward(&first.forward(&x).unwrap()).unwrap();
        y.eval().unwrap();

        assert_eq!(y.shape(), &[2, 16, 16]);
    }
}
