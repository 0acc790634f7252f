//! Short-Time Fourier Transform implementation using MLX.

use crate::error::{ModelError, Result};
use mlx_rs::Array;
use serde::{Deserialize, Serialize};

/// STFT configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StftConfig {
    /// FFT size.
    pub n_fft: i32,
    /// Hop size in samples.
    pub hop_length: i32,
    /// Window size (defaults to n_fft).
    pub win_length: Option<i32>,
    /// Whether to center the signal with padding.
    pub center: bool,
    /// Padding mode when centering.
    pub pad_mode: PadMode,
}

/// Padding modes for STFT.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub enum PadMode {
    /// Reflect padding (mirror).
    #[default]
    Reflect,
    /// Zero padding.
    Zeros,
}

impl Default for StftConfig {
    fn default() -> Self {
        Self {
            n_fft: 1024,
            hop_length: 256,
            win_length: None,
            center: true,
            pad_mode: PadMode::Reflect,
        }
    }
}

/// Create a Hann window of the given size.
pub fn hann_window(size: i32) -> Result<Array> {
    // hann[n] = 0.5 * (1 - cos(2*pi*n / (N-1)))
    let n = mlx_rs::ops::arange::<i32, f32>(0, size, None)?;
    let pi = std::f32::consts::PI;
    let scale = Array::from_f32(2.0 * pi / (size - 1) as f32);
    let cos_term = (n.multiply(&scale)?).cos()?;
    let half = Array::from_f32(0.5);
    let one = Array::from_f32(1.0);

    Ok(half.multiply(&one.subtract(&cos_term)?)?)
}

/// Compute the Short-Time Fourier Transform.
///
/// # Arguments
/// * `signal` - Input audio signal [samples] or [batch, samples]
/// * `config` - STFT configuration
///
/// # Returns
/// Complex STFT output [batch, n_fft/2+1, frames] or [n_fft/2+1, frames]
pub fn stft(signal: &Array, config: &StftConfig) -> Result<Array> {
    use mlx_rs::ops::indexing::IndexOp;

    let win_length = config.win_length.unwrap_or(config.n_fft);
    if win_length > config.n_fft {
        return Err(ModelError::Config(format!(
            "window length {} exceeds FFT size {}",
            win_length, config.n_fft
        )));
    }

    let window = hann_window(win_length)?;

    // Pad the window to n_fft if needed
    let window = if win_length < config.n_fft {
        let pad_left = (config.n_fft - win_length) / 2;
        let pad_right = config.n_fft - win_length - pad_left;
        let zeros_left = mlx_rs::ops::zeros::<f32>(&[pad_left])?;
        let zeros_right = mlx_rs::ops::zeros::<f32>(&[pad_right])?;
        mlx_rs::ops::concatenate_axis(&[&zeros_left, &window, &zeros_right], 0)?
    } else {
        window
    };

    let (signal, was_1d) = if signal.ndim() == 1 {
        (signal.reshape(&[1, -1])?, true)
    } else {
        (signal.clone(), false)
    };

    let signal = if config.center {
        let pad_amount = config.n_fft / 2;
        pad_signal(&signal, pad_amount, config.pad_mode)?
    } else {
        signal
    };

    let padded_length = signal.dim(1);
    if padded_length < config.n_fft {
        return Err(ModelError::Shape(format!(
            "signal of length {} too short for FFT size {}",
            padded_length, config.n_fft
        )));
    }
    let num_frames = (padded_length - config.n_fft) / config.hop_length + 1;

    // Frame the signal
    let mut frames = Vec::with_capacity(num_frames as usize);
    for i in 0..num_frames {
        let start = i * config.hop_length;
        let end = start + config.n_fft;
        frames.push(signal.index((.., start..end)));
    }

    // Stack frames: [batch, frames, n_fft]
    let frame_refs: Vec<&Array> = frames.iter().collect();
    let framed = mlx_rs::ops::stack_axis(&frame_refs, 1)?;

    // Window and transform
    let windowed = framed.multiply(&window)?;
    let spectrum = mlx_rs::fft::rfft(&windowed, Some(config.n_fft), -1)?;

    // [batch, frames, freq] -> [batch, freq, frames]
    let spectrum = spectrum.transpose_axes(&[0, 2, 1])?;

    if was_1d {
        Ok(spectrum.index((0, .., ..)))
    } else {
        Ok(spectrum)
    }
}

/// Magnitude spectrogram |STFT(x)|.
pub fn magnitude_spectrogram(signal: &Array, config: &StftConfig) -> Result<Array> {
    let spectrum = stft(signal, config)?;
    Ok(spectrum.abs()?)
}

/// Power spectrogram |STFT(x)|².
pub fn power_spectrogram(signal: &Array, config: &StftConfig) -> Result<Array> {
    let magnitude = magnitude_spectrogram(signal, config)?;
    Ok(magnitude.multiply(&magnitude)?)
}

/// Pad a `[batch, samples]` signal at both ends.
fn pad_signal(signal: &Array, pad_amount: i32, mode: PadMode) -> Result<Array> {
    let batch_size = signal.dim(0);
    let length = signal.dim(1);

    match mode {
        PadMode::Zeros => {
            let left_pad = mlx_rs::ops::zeros::<f32>(&[batch_size, pad_amount])?;
            let right_pad = mlx_rs::ops::zeros::<f32>(&[batch_size, pad_amount])?;
            Ok(mlx_rs::ops::concatenate_axis(
                &[&left_pad, signal, &right_pad],
                1,
            )?)
        }
        PadMode::Reflect => {
            if pad_amount >= length {
                return Err(ModelError::Shape(format!(
                    "cannot reflect-pad {} samples on a {}-sample signal",
                    pad_amount, length
                )));
            }

            // left: signal[pad:0:-1], right: signal[-2:-pad-2:-1]
            let left_indices: Vec<i32> = (1..=pad_amount).rev().collect();
            let left = Array::from_slice(&left_indices, &[pad_amount]);
            let left_pad = signal.take_axis(&left, 1)?;

            let right_indices: Vec<i32> =
                ((length - pad_amount - 1)..(length - 1)).rev().collect();
            let right = Array::from_slice(&right_indices, &[pad_amount]);
            let right_pad = signal.take_axis(&right, 1)?;

            Ok(mlx_rs::ops::concatenate_axis(
                &[&left_pad, signal, &right_pad],
                1,
            )?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hann_window_endpoints() {
        let window = hann_window(8).unwrap();
        window.eval().unwrap();

        let values = window.as_slice::<f32>();
        assert_eq!(values.len(), 8);
        assert!(values[0].abs() < 1e-6);
        assert!(values[7].abs() < 1e-6);
    }

    #[test]
    fn test_stft_shape() {
        let config = StftConfig {
            n_fft: 64,
            hop_length: 16,
            ..Default::default()
        };
        let signal = mlx_rs::random::normal::<f32>(&[2, 256], None, None, None).unwrap();

        let spectrum = stft(&signal, &config).unwrap();
        spectrum.eval().unwrap();

        // freq bins = n_fft/2 + 1; centered: frames = len/hop + 1
        assert_eq!(spectrum.dim(0), 2);
        assert_eq!(spectrum.dim(1), 33);
        assert_eq!(spectrum.dim(2), 17);
    }

    #[test]
    fn test_magnitude_is_nonnegative() {
        let config = StftConfig {
            n_fft: 32,
            hop_length: 8,
            ..Default::default()
        };
        let signal = mlx_rs::random::normal::<f32>(&[1, 128], None, None, None).unwrap();

        let magnitude = magnitude_spectrogram(&signal, &config).unwrap();
        magnitude.eval().unwrap();

        let min = magnitude.min(None).unwrap();
        min.eval().unwrap();
        assert!(min.item::<f32>() >= 0.0);
    }
}
