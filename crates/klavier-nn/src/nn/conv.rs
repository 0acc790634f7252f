//! Convolution and linear layers.
//!
//! Waveform tensors use NCL layout throughout the crate. MLX's conv1d expects
//! NLC input and OKI weights, so forward passes transpose on the way in and
//! out.

use crate::error::{ModelError, Result};
use mlx_rs::macros::ModuleParameters;
use mlx_rs::module::Param;
use mlx_rs::Array;

/// 1D convolution over `[batch, channels, length]` tensors.
#[derive(Debug, ModuleParameters)]
pub struct Conv1d {
    /// Weight tensor [out_channels, in_channels, kernel_size].
    #[param]
    pub weight: Param<Array>,
    /// Optional bias [out_channels].
    #[param]
    pub bias: Param<Option<Array>>,
    /// Input channels.
    pub in_channels: i32,
    /// Output channels.
    pub out_channels: i32,
    /// Kernel size.
    pub kernel_size: i32,
    /// Symmetric zero padding.
    pub padding: i32,
}

impl Conv1d {
    /// Create a new Conv1d with Kaiming-uniform initialization.
    ///
    /// # Arguments
    /// * `in_channels` - Number of input channels
    /// * `out_channels` - Number of output channels
    /// * `kernel_size` - Kernel size
    /// * `padding` - Symmetric padding (default 0)
    /// * `bias` - Whether to use bias (default true)
    pub fn new(
        in_channels: i32,
        out_channels: i32,
        kernel_size: i32,
        padding: Option<i32>,
        bias: Option<bool>,
    ) -> Result<Self> {
        if in_channels <= 0 || out_channels <= 0 || kernel_size <= 0 {
            return Err(ModelError::Config(format!(
                "invalid Conv1d dimensions: in={}, out={}, kernel={}",
                in_channels, out_channels, kernel_size
            )));
        }
        let padding = padding.unwrap_or(0);
        let use_bias = bias.unwrap_or(true);

        let fan_in = in_channels * kernel_size;
        let bound = (1.0 / fan_in as f32).sqrt();

        let weight = mlx_rs::random::uniform::<_, f32>(
            -bound,
            bound,
            &[out_channels, in_channels, kernel_size],
            None,
        )?;

        let bias = if use_bias {
            Some(mlx_rs::random::uniform::<_, f32>(
                -bound,
                bound,
                &[out_channels],
                None,
            )?)
        } else {
            None
        };

        Ok(Self {
            weight: Param::new(weight),
            bias: Param::new(bias),
            in_channels,
            out_channels,
            kernel_size,
            padding,
        })
    }

    /// Forward pass.
    ///
    /// # Arguments
    /// * `x` - Input tensor [batch, in_channels, length]
    ///
    /// # Returns
    /// Output tensor [batch, out_channels, new_length]
    pub fn forward(&self, x: &Array) -> Result<Array> {
        // NCL -> NLC for the input, OIK -> OKI for the weight
        let x_nlc = x.transpose_axes(&[0, 2, 1])?;
        let weight_oki = self.weight.as_ref().transpose_axes(&[0, 2, 1])?;

        let output = mlx_rs::ops::conv1d(&x_nlc, &weight_oki, 1, self.padding, 1, 1)?;

        // NLC -> NCL
        let output = output.transpose_axes(&[0, 2, 1])?;

        if let Some(bias) = self.bias.value.as_ref() {
            let bias_reshaped = bias.reshape(&[1, self.out_channels, 1])?;
            Ok(output.add(&bias_reshaped)?)
        } else {
            Ok(output)
        }
    }
}

/// Fully-connected layer over `[batch, features]` tensors.
#[derive(Debug, ModuleParameters)]
pub struct Linear {
    /// Weight tensor [out_features, in_features].
    #[param]
    pub weight: Param<Array>,
    /// Bias [out_features].
    #[param]
    pub bias: Param<Option<Array>>,
    /// Input features.
    pub in_features: i32,
    /// Output features.
    pub out_features: i32,
}

impl Linear {
    /// Create a new Linear layer with Kaiming-uniform initialization.
    pub fn new(in_features: i32, out_features: i32) -> Result<Self> {
        if in_features <= 0 || out_features <= 0 {
            return Err(ModelError::Config(format!(
                "invalid Linear dimensions: in={}, out={}",
                in_features, out_features
            )));
        }
        let bound = (1.0 / in_features as f32).sqrt();
        let weight = mlx_rs::random::uniform::<_, f32>(
            -bound,
            bound,
            &[out_features, in_features],
            None,
        )?;
        let bias =
            mlx_rs::random::uniform::<_, f32>(-bound, bound, &[out_features], None)?;

        Ok(Self {
            weight: Param::new(weight),
            bias: Param::new(Some(bias)),
            in_features,
            out_features,
        })
    }

    /// Forward pass: `x @ W^T + b`.
    pub fn forward(&self, x: &Array) -> Result<Array> {
        let weight_t = self.weight.as_ref().transpose_axes(&[1, 0])?;
        let output = x.matmul(&weight_t)?;
        if let Some(bias) = self.bias.value.as_ref() {
            Ok(output.add(bias)?)
        } else {
            Ok(output)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conv1d_same_padding_shape() {
        let conv = Conv1d::new(4, 8, 3, Some(1), None).unwrap();

        let x = mlx_rs::random::normal::<f32>(&[2, 4, 16], None, None, None).unwrap();
        let y = conv.forward(&x).unwrap();
        y.eval().unwrap();

        // padding=1, kernel=3: output length == input length
        assert_eq!(y.shape(), &[2, 8, 16]);
    }

    #[test]
    fn test_conv1d_pointwise() {
        let conv = Conv1d::new(4, 2, 1, None, None).unwrap();

        let x = mlx_rs::random::normal::<f32>(&[1, 4, 32], None, None, None).unwrap();
        let y = conv.forward(&x).unwrap();
        y.eval().unwrap();

        assert_eq!(y.shape(), &[1, 2, 32]);
    }

    #[test]
    fn test_conv1d_rejects_bad_config() {
        assert!(Conv1d::new(0, 8, 3, None, None).is_err());
        assert!(Conv1d::new(4, 8, 0, None, None).is_err());
    }

    #[test]
    fn test_linear_shape() {
        let linear = Linear::new(16, 4).unwrap();

        let x = mlx_rs::random::normal::<f32>(&[3, 16], None, None, None).unwrap();
        let y = linear.forward(&x).unwrap();
        y.eval().unwrap();

        assert_eq!(y.shape(), &[3, 4]);
    }
}
