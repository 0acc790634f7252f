//! Multi-scale convolution stage.

use crate::error::{ModelError, Result};
use crate::nn::Conv1d;
use mlx_rs::macros::ModuleParameters;
use mlx_rs::Array;

/// Parallel convolutions with different kernel sizes applied to one input,
/// concatenated along the channel axis.
///
/// Each branch optionally runs through a 1x1 bottleneck projection first to
/// keep the wide-kernel branches cheap. Every branch uses `(k - 1) / 2`
/// padding so all outputs share the input length and channel concatenation is
/// well defined.
#[derive(Debug, ModuleParameters)]
pub struct BaseBlock {
    /// 1x1 bottleneck projections, one per branch. Empty when bottlenecks
    /// are disabled.
    #[param]
    pub bottlenecks: Vec<Conv1d>,
    /// Wide convolutions, one per branch.
    #[param]
    pub convs: Vec<Conv1d>,
    /// Channel count of the concatenated output.
    pub out_channels: i32,
}

impl BaseBlock {
    /// Create a new multi-scale stage.
    ///
    /// # Arguments
    /// * `in_channels` - Number of input channels
    /// * `kernel_sizes` - Kernel size of each parallel branch (odd)
    /// * `channel_sizes` - Output channels of each branch
    /// * `bottleneck_channels` - Channels of the 1x1 projections
    /// * `use_bottleneck` - Whether the projections are used
    pub fn new(
        in_channels: i32,
        kernel_sizes: &[i32],
        channel_sizes: &[i32],
        bottleneck_channels: i32,
        use_bottleneck: bool,
    ) -> Result<Self> {
        if kernel_sizes.is_empty() {
            return Err(ModelError::Config(
                "at least one kernel size is required".into(),
            ));
        }
        if kernel_sizes.len() != channel_sizes.len() {
            return Err(ModelError::Config(format!(
                "{} kernel sizes but {} channel sizes",
                kernel_sizes.len(),
                channel_sizes.len()
            )));
        }
        for &k in kernel_sizes {
            if k <= 0 || k % 2 == 0 {
                return Err(ModelError::Config(format!(
                    "kernel sizes must be positive and odd, got {}",
                    k
                )));
            }
        }

        let mut bottlenecks = Vec::new();
        let mut convs = Vec::with_capacity(kernel_sizes.len());

        for (&kernel_size, &channel_size) in kernel_sizes.iter().zip(channel_sizes) {
            let padding = (kernel_size - 1) / 2;
            if use_bottleneck {
                bottlenecks.push(Conv1d::new(in_channels, bottleneck_channels, 1, None, None)?);
                convs.push(Conv1d::new(
                    bottleneck_channels,
                    channel_size,
                    kernel_size,
                    Some(padding),
                    None,
                )?);
            } else {
                convs.push(Conv1d::new(
                    in_channels,
                    channel_size,
                    kernel_size,
                    Some(padding),
                    None,
                )?);
            }
        }

        Ok(Self {
            bottlenecks,
            convs,
            out_channels: channel_sizes.iter().sum(),
        })
    }

    /// Forward pass.
    ///
    /// # Arguments
    /// * `x` - Input tensor [batch, in_channels, length]
    ///
    /// # Returns
    /// Output tensor [batch, sum(channel_sizes), length]
    pub fn forward(&self, x: &Array) -> Result<Array> {
        let mut branches = Vec::with_capacity(self.convs.len());

        for (i, conv) in self.convs.iter().enumerate() {
            let branch = if self.bottlenecks.is_empty() {
                conv.forward(x)?
            } else {
                conv.forward(&self.bottlenecks[i].forward(x)?)?
            };
            branches.push(branch);
        }

        let refs: Vec<&Array> = branches.iter().collect();
        Ok(mlx_rs::ops::concatenate_axis(&refs, 1)?)
    }
}
