//! Shape-rearranging resampling operators.
//!
//! Down- and up-sampling trade sequence length against channel count instead
//! of pooling or transposed convolution. The two operators are exact shape
//! inverses of each other.

use crate::error::{ModelError, Result};
use mlx_rs::Array;

/// Space-to-depth along the time axis: `[B, C, L]` -> `[B, C*f, L/f]`.
///
/// Sample `t*f + j` of channel `c` becomes sample `t` of channel `c*f + j`,
/// so no information is discarded.
#[derive(Debug, Clone)]
pub struct SuperPixel1d {
    /// Temporal downscale factor.
    pub factor: i32,
}

impl SuperPixel1d {
    /// Create a new SuperPixel1d operator.
    pub fn new(factor: i32) -> Result<Self> {
        if factor < 1 {
            return Err(ModelError::Config(format!(
                "resampling factor must be >= 1, got {}",
                factor
            )));
        }
        Ok(Self { factor })
    }

    /// Forward pass. The input length must be divisible by the factor.
    pub fn forward(&self, x: &Array) -> Result<Array> {
        let f = self.factor;
        if f == 1 {
            return Ok(x.clone());
        }

        let batch = x.dim(0);
        let channels = x.dim(1);
        let length = x.dim(2);
        if length % f != 0 {
            return Err(ModelError::Shape(format!(
                "length {} not divisible by downscale factor {}",
                length, f
            )));
        }

        let x = x.reshape(&[batch, channels, length / f, f])?;
        let x = x.transpose_axes(&[0, 1, 3, 2])?;
        Ok(x.reshape(&[batch, channels * f, length / f])?)
    }
}

/// Depth-to-space along the time axis: `[B, C, L]` -> `[B, C/f, L*f]`.
///
/// Inverse rearrangement of [`SuperPixel1d`] with the same factor.
#[derive(Debug, Clone)]
pub struct SubPixel1d {
    /// Temporal upscale factor.
    pub factor: i32,
}

impl SubPixel1d {
    /// Create a new SubPixel1d operator.
    pub fn new(factor: i32) -> Result<Self> {
        if factor < 1 {
            return Err(ModelError::Config(format!(
                "resampling factor must be >= 1, got {}",
                factor
            )));
        }
        Ok(Self { factor })
    }

    /// Forward pass. The input channel count must be divisible by the factor.
    pub fn forward(&self, x: &Array) -> Result<Array> {
        let f = self.factor;
        if f == 1 {
            return Ok(x.clone());
        }

        let batch = x.dim(0);
        let channels = x.dim(1);
        let length = x.dim(2);
        if channels % f != 0 {
            return Err(ModelError::Shape(format!(
                "channel count {} not divisible by upscale factor {}",
                channels, f
            )));
        }

        let x = x.reshape(&[batch, channels / f, f, length])?;
        let x = x.transpose_axes(&[0, 1, 3, 2])?;
        Ok(x.reshape(&[batch, channels / f, length * f])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_superpixel_shape() {
        let sp = SuperPixel1d::new(2).unwrap();
        let x = mlx_rs::random::normal::<f32>(&[2, 3, 8], None, None, None).unwrap();

        let y = sp.forward(&x).unwrap();
        y.eval().unwrap();

        assert_eq!(y.shape(), &[2, 6, 4]);
    }

    #[test]
    fn test_subpixel_shape() {
        let sp = SubPixel1d::new(2).unwrap();
        let x = mlx_rs::random::normal::<f32>(&[2, 6, 4], None, None, None).unwrap();

        let y = sp.forward(&x).unwrap();
        y.eval().unwrap();

        assert_eq!(y.shape(), &[2, 3, 8]);
    }

    #[test]
    fn test_shape_round_trip() {
        let down = SuperPixel1d::new(4).unwrap();
        let up = SubPixel1d::new(4).unwrap();
        let x = mlx_rs::random::normal::<f32>(&[1, 2, 16], None, None, None).unwrap();

        let y = up.forward(&down.forward(&x).unwrap()).unwrap();
        y.eval().unwrap();

        assert_eq!(y.shape(), x.shape());
    }

    #[test]
    fn test_round_trip_restores_values() {
        // The rearrangement is an exact inverse, not just a shape inverse.
        let down = SuperPixel1d::new(2).unwrap();
        let up = SubPixel1d::new(2).unwrap();
        let x = Array::from_slice(&[1.0f32, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0], &[1, 2, 4]);

        let y = up.forward(&down.forward(&x).unwrap()).unwrap();
        y.eval().unwrap();

        assert_eq!(y.as_slice::<f32>(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
    }

    #[test]
    fn test_superpixel_rejects_ragged_length() {
        let sp = SuperPixel1d::new(2).unwrap();
        let x = mlx_rs::random::normal::<f32>(&[1, 1, 7], None, None, None).unwrap();

        assert!(matches!(sp.forward(&x), Err(ModelError::Shape(_))));
    }

    #[test]
    fn test_subpixel_rejects_ragged_channels() {
        let sp = SubPixel1d::new(2).unwrap();
        let x = mlx_rs::random::normal::<f32>(&[1, 3, 8], None, None, None).unwrap();

        assert!(matches!(sp.forward(&x), Err(ModelError::Shape(_))));
    }

    #[test]
    fn test_factor_one_is_identity() {
        let sp = SuperPixel1d::new(1).unwrap();
        let x = mlx_rs::random::normal::<f32>(&[1, 3, 5], None, None, None).unwrap();

        let y = sp.forward(&x).unwrap();
        y.eval().unwrap();
        assert_eq!(y.shape(), &[1, 3, 5]);
    }
}
