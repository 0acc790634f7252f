//! Learned activation functions.

use crate::error::{ModelError, Result};
use mlx_rs::macros::ModuleParameters;
use mlx_rs::module::Param;
use mlx_rs::Array;

/// Parametric ReLU with one learned slope per channel.
///
/// PReLU(x) = max(0, x) + alpha * min(0, x)
#[derive(Debug, ModuleParameters)]
pub struct PRelu {
    /// Learned negative-slope parameter, one per channel.
    #[param]
    pub alpha: Param<Array>,
    /// Number of channels.
    pub channels: i32,
}

impl PRelu {
    /// Create a new PReLU with all slopes initialized to 0.25.
    pub fn new(channels: i32) -> Result<Self> {
        if channels <= 0 {
            return Err(ModelError::Config(format!(
                "invalid PReLU channel count: {}",
                channels
            )));
        }
        let init = Array::from_f32(0.25);
        let alpha = mlx_rs::ops::broadcast_to(&init, &[channels])?;

        Ok(Self {
            alpha: Param::new(alpha),
            channels,
        })
    }

    /// Forward pass.
    ///
    /// Accepts `[batch, channels, length]` or `[batch, channels]` tensors;
    /// the slope broadcasts over the channel axis.
    pub fn forward(&self, x: &Array) -> Result<Array> {
        let alpha = match x.ndim() {
            3 => self.alpha.as_ref().reshape(&[1, self.channels, 1])?,
            2 => self.alpha.as_ref().reshape(&[1, self.channels])?,
            n => {
                return Err(ModelError::Shape(format!(
                    "PReLU expects a 2-D or 3-D input, got {} dims",
                    n
                )))
            }
        };

        let zero = Array::from_f32(0.0);
        let positive = mlx_rs::ops::maximum(x, &zero)?;
        let negative = mlx_rs::ops::minimum(x, &zero)?;

        Ok(positive.add(&negative.multiply(&alpha)?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelu_shape() {
        let prelu = PRelu::new(4).unwrap();
        let x = mlx_rs::random::normal::<f32>(&[2, 4, 16], None, None, None).unwrap();

        let y = prelu.forward(&x).unwrap();
        y.eval().unwrap();

        assert_eq!(y.shape(), &[2, 4, 16]);
    }

    #[test]
    fn test_prelu_positive_identity() {
        let prelu = PRelu::new(1).unwrap();
        let x = Array::from_slice(&[1.0f32, 2.0, 3.0], &[1, 1, 3]);

        let y = prelu.forward(&x).unwrap();
        y.eval().unwrap();

        assert_eq!(y.as_slice::<f32>(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_prelu_negative_slope() {
        let prelu = PRelu::new(1).unwrap();
        let x = Array::from_slice(&[-4.0f32], &[1, 1, 1]);

        let y = prelu.forward(&x).unwrap();
        y.eval().unwrap();

        // Initial slope 0.25: -4 -> -1
        assert!((y.as_slice::<f32>()[0] + 1.0).abs() < 1e-6);
    }
}
