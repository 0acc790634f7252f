//! Inverted dropout with an explicit training toggle.

use crate::error::{ModelError, Result};
use mlx_rs::Array;

/// Dropout that zeroes activations with probability `p` during training and
/// rescales the survivors by `1 / (1 - p)`. A no-op in evaluation mode.
#[derive(Debug, Clone)]
pub struct Dropout {
    /// Drop probability in [0, 1).
    pub p: f32,
    /// Whether the layer is in training mode.
    pub training: bool,
}

impl Dropout {
    /// Create a new dropout layer, initially in training mode.
    pub fn new(p: f32) -> Result<Self> {
        if !(0.0..1.0).contains(&p) {
            return Err(ModelError::Config(format!(
                "dropout probability must be in [0, 1), got {}",
                p
            )));
        }
        Ok(Self { p, training: true })
    }

    /// Forward pass.
    pub fn forward(&self, x: &Array) -> Result<Array> {
        if !self.training || self.p == 0.0 {
            return Ok(x.clone());
        }

        let keep_prob = 1.0 - self.p;
        let noise = mlx_rs::random::uniform::<_, f32>(0.0, 1.0, x.shape(), None)?;
        let mask = noise
            .lt(&Array::from_f32(self.p))?
            .as_dtype(mlx_rs::Dtype::Float32)?;
        // Survivors are where noise >= p
        let one = Array::from_f32(1.0);
        let keep_mask = one.subtract(&mask)?;

        let scaled = x.multiply(&keep_mask)?;
        Ok(scaled.divide(&Array::from_f32(keep_prob))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dropout_eval_is_identity() {
        let mut dropout = Dropout::new(0.5).unwrap();
        dropout.training = false;

        let x = Array::from_slice(&[1.0f32, -2.0, 3.0], &[1, 1, 3]);
        let y = dropout.forward(&x).unwrap();
        y.eval().unwrap();

        assert_eq!(y.as_slice::<f32>(), &[1.0, -2.0, 3.0]);
    }

    #[test]
    fn test_dropout_zero_probability() {
        let dropout = Dropout::new(0.0).unwrap();

        let x = Array::from_slice(&[1.0f32, 2.0], &[1, 1, 2]);
        let y = dropout.forward(&x).unwrap();
        y.eval().unwrap();

        assert_eq!(y.as_slice::<f32>(), &[1.0, 2.0]);
    }

    #[test]
    fn test_dropout_preserves_shape() {
        let dropout = Dropout::new(0.3).unwrap();

        let x = mlx_rs::random::normal::<f32>(&[2, 4, 8], None, None, None).unwrap();
        let y = dropout.forward(&x).unwrap();
        y.eval().unwrap();

        assert_eq!(y.shape(), &[2, 4, 8]);
    }

    #[test]
    fn test_dropout_rejects_invalid_probability() {
        assert!(Dropout::new(1.0).is_err());
        assert!(Dropout::new(-0.1).is_err());
    }
}
