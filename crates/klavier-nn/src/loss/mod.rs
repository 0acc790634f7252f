//! Loss functions for generator and GAN training.
//!
//! The generator trains on a time-domain reconstruction term, optionally a
//! frequency-domain term over magnitude spectrograms, and — in the
//! adversarial variant — a least-squares adversarial term plus an
//! autoencoder embedding-distance term. The discriminator trains on the
//! matching least-squares real/fake objective.

use crate::audio::{magnitude_spectrogram, StftConfig};
use crate::error::Result;
use mlx_rs::Array;

/// Mean-squared error between two equally shaped tensors.
pub fn mse_loss(a: &Array, b: &Array) -> Result<Array> {
    let diff = a.subtract(b)?;
    Ok(diff.multiply(&diff)?.mean(None)?)
}

/// Mean-squared error between the magnitude spectrograms of two waveform
/// batches of shape `[batch, 1, samples]`.
pub fn spectral_l2_loss(
    generated: &Array,
    target: &Array,
    config: &StftConfig,
) -> Result<Array> {
    let batch = generated.dim(0);
    let generated = generated.reshape(&[batch, -1])?;
    let target = target.reshape(&[target.dim(0), -1])?;

    let generated_spec = magnitude_spectrogram(&generated, config)?;
    let target_spec = magnitude_spectrogram(&target, config)?;

    mse_loss(&generated_spec, &target_spec)
}

/// Generator-side least-squares adversarial loss.
///
/// L_adv(G) = E[(1 - D(G(x)))²]
pub fn generator_adversarial_loss(fake_logits: &Array) -> Result<Array> {
    let one = Array::from_f32(1.0);
    let diff = one.subtract(fake_logits)?;
    Ok(diff.multiply(&diff)?.mean(None)?)
}

/// Discriminator-side least-squares adversarial loss.
///
/// L_adv(D) = E[(1 - D(x))²] + E[D(G(x))²], returned as separate real and
/// fake terms so both can be recorded.
pub fn discriminator_adversarial_loss(
    real_logits: &Array,
    fake_logits: &Array,
) -> Result<(Array, Array)> {
    let one = Array::from_f32(1.0);
    let real_diff = one.subtract(real_logits)?;
    let real_loss = real_diff.multiply(&real_diff)?.mean(None)?;

    let fake_loss = fake_logits.multiply(fake_logits)?.mean(None)?;

    Ok((real_loss, fake_loss))
}

/// Mean-squared distance between two autoencoder embeddings.
pub fn embedding_l2_loss(generated_embedding: &Array, target_embedding: &Array) -> Result<Array> {
    mse_loss(generated_embedding, target_embedding)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mse_loss_of_identical_inputs_is_zero() {
        let x = mlx_rs::random::normal::<f32>(&[2, 1, 32], None, None, None).unwrap();
        let loss = mse_loss(&x, &x).unwrap();
        loss.eval().unwrap();

        assert_eq!(loss.ndim(), 0);
        assert!(loss.item::<f32>().abs() < 1e-7);
    }

    #[test]
    fn test_spectral_l2_loss_is_scalar() {
        let config = StftConfig {
            n_fft: 32,
            hop_length: 8,
            ..Default::default()
        };
        let a = mlx_rs::random::normal::<f32>(&[2, 1, 128], None, None, None).unwrap();
        let b = mlx_rs::random::normal::<f32>(&[2, 1, 128], None, None, None).unwrap();

        let loss = spectral_l2_loss(&a, &b, &config).unwrap();
        loss.eval().unwrap();

        assert_eq!(loss.ndim(), 0);
        assert!(loss.item::<f32>() > 0.0);
    }

    #[test]
    fn test_adversarial_losses_are_nonnegative_scalars() {
        let real = mlx_rs::random::normal::<f32>(&[4, 1], None, None, None).unwrap();
        let fake = mlx_rs::random::normal::<f32>(&[4, 1], None, None, None).unwrap();

        let g_loss = generator_adversarial_loss(&fake).unwrap();
        let (real_loss, fake_loss) = discriminator_adversarial_loss(&real, &fake).unwrap();
        g_loss.eval().unwrap();
        real_loss.eval().unwrap();
        fake_loss.eval().unwrap();

        assert!(g_loss.item::<f32>() >= 0.0);
        assert!(real_loss.item::<f32>() >= 0.0);
        assert!(fake_loss.item::<f32>() >= 0.0);
    }

    #[test]
    fn test_discriminator_loss_at_optimum() {
        // Perfect discriminator: D(real)=1, D(fake)=0 -> both terms vanish
        let real = Array::from_slice(&[1.0f32, 1.0], &[2, 1]);
        let fake = Array::from_slice(&[0.0f32, 0.0], &[2, 1]);

        let (real_loss, fake_loss) = discriminator_adversarial_loss(&real, &fake).unwrap();
        real_loss.eval().unwrap();
        fake_loss.eval().unwrap();

        assert!(real_loss.item::<f32>().abs() < 1e-7);
        assert!(fake_loss.item::<f32>().abs() < 1e-7);
    }
}
