//! Audio fidelity metrics.
//!
//! Both metrics are pure functions over `(generated, reference)` batches and
//! return one value per example. Degenerate signals (all-zero silence
//! windows) make the logarithms blow up; those values come back non-finite
//! and [`aggregate`] excludes them from the statistics instead of letting
//! them poison the mean.

use crate::{Result, TrainerError};
use klavier_data::DataLoader;
use klavier_nn::audio::{power_spectrogram, StftConfig};
use klavier_nn::Generator;
use mlx_rs::Array;

/// Per-example signal-to-noise ratio in dB.
///
/// snr = 10 * log10(||x_ref||² / ||x - x_ref||²)
///
/// # Arguments
/// * `generated` - Generated batch [batch, 1, samples]
/// * `reference` - Reference batch of the same shape
///
/// # Returns
/// One value per example, shape [batch].
pub fn snr(generated: &Array, reference: &Array) -> Result<Array> {
    let x = generated.reshape(&[generated.dim(0), -1])?;
    let x_ref = reference.reshape(&[reference.dim(0), -1])?;

    let signal_power = x_ref.multiply(&x_ref)?.sum_axes(&[1], None)?;
    let noise = x.subtract(&x_ref)?;
    let noise_power = noise.multiply(&noise)?.sum_axes(&[1], None)?;

    let ratio = signal_power.divide(&noise_power)?;
    // 10 * log10(r) = ln(r) * 10 / ln(10)
    let scale = Array::from_f32(10.0 / std::f32::consts::LN_10);
    Ok(ratio.log()?.multiply(&scale)?)
}

/// Per-example log-spectral distance.
///
/// For each frame, the RMS over frequency of the difference of log power
/// spectra, averaged over frames.
///
/// # Arguments
/// * `generated` - Generated batch [batch, 1, samples]
/// * `reference` - Reference batch of the same shape
/// * `config` - STFT configuration for the spectrograms
///
/// # Returns
/// One value per example, shape [batch].
pub fn lsd(generated: &Array, reference: &Array, config: &StftConfig) -> Result<Array> {
    let x = generated.reshape(&[generated.dim(0), -1])?;
    let x_ref = reference.reshape(&[reference.dim(0), -1])?;

    // [batch, freq, frames]
    let power = power_spectrogram(&x, config)?;
    let power_ref = power_spectrogram(&x_ref, config)?;

    let ln10 = Array::from_f32(std::f32::consts::LN_10);
    let log_diff = power.log()?.subtract(&power_ref.log()?)?.divide(&ln10)?;

    let n_freq = log_diff.dim(1);
    let freq_ms = log_diff
        .multiply(&log_diff)?
        .sum_axes(&[1], None)?
        .divide(&Array::from_f32(n_freq as f32))?;
    let per_frame = freq_ms.sqrt()?;

    let n_frames = per_frame.dim(1);
    Ok(per_frame
        .sum_axes(&[1], None)?
        .divide(&Array::from_f32(n_frames as f32))?)
}

/// Aggregate statistics over per-example metric values.
#[derive(Debug, Clone, Copy)]
pub struct MetricSummary {
    /// Mean of the defined values.
    pub mean: f32,
    /// Population standard deviation of the defined values.
    pub std: f32,
    /// Number of defined values.
    pub valid: usize,
    /// Number of undefined (non-finite) values excluded.
    pub excluded: usize,
}

/// Compute mean/std over the defined values only.
///
/// Non-finite entries are counted in `excluded` and never contribute to the
/// statistics; with no defined value at all, mean and std are NaN.
pub fn aggregate(values: &[f32]) -> MetricSummary {
    let defined: Vec<f32> = values.iter().copied().filter(|v| v.is_finite()).collect();
    let excluded = values.len() - defined.len();

    if defined.is_empty() {
        return MetricSummary {
            mean: f32::NAN,
            std: f32::NAN,
            valid: 0,
            excluded,
        };
    }

    let mean = defined.iter().sum::<f32>() / defined.len() as f32;
    let variance = defined
        .iter()
        .map(|v| (v - mean) * (v - mean))
        .sum::<f32>()
        / defined.len() as f32;

    MetricSummary {
        mean,
        std: variance.sqrt(),
        valid: defined.len(),
        excluded,
    }
}

/// SNR and LSD summaries over a set of evaluation batches.
#[derive(Debug, Clone, Copy)]
pub struct MetricsReport {
    /// Signal-to-noise ratio summary.
    pub snr: MetricSummary,
    /// Log-spectral distance summary.
    pub lsd: MetricSummary,
}

/// Run a generator over `n_batches` evaluation batches and summarize both
/// metrics. The loader is restarted when it runs dry.
pub fn evaluate_generator(
    generator: &Generator,
    loader: &mut DataLoader,
    config: &StftConfig,
    n_batches: usize,
) -> Result<MetricsReport> {
    if loader.is_empty() {
        return Err(TrainerError::Config(
            "cannot evaluate metrics on an empty loader".into(),
        ));
    }

    let mut snr_values = Vec::new();
    let mut lsd_values = Vec::new();

    for _ in 0..n_batches {
        let batch = match loader.next_batch() {
            Some(batch) => batch,
            None => {
                loader.reset(None);
                match loader.next_batch() {
                    Some(batch) => batch,
                    None => break,
                }
            }
        };

        let generated = generator.forward(&batch.input)?;

        let batch_snr = snr(&generated, &batch.target)?;
        batch_snr.eval()?;
        snr_values.extend_from_slice(batch_snr.as_slice::<f32>());

        let batch_lsd = lsd(&generated, &batch.target, config)?;
        batch_lsd.eval()?;
        lsd_values.extend_from_slice(batch_lsd.as_slice::<f32>());
    }

    Ok(MetricsReport {
        snr: aggregate(&snr_values),
        lsd: aggregate(&lsd_values),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stft_config() -> StftConfig {
        StftConfig {
            n_fft: 16,
            hop_length: 8,
            ..Default::default()
        }
    }

    #[test]
    fn test_snr_shape_and_finiteness() {
        let reference = mlx_rs::random::normal::<f32>(&[3, 1, 64], None, None, None).unwrap();
        let noise = mlx_rs::random::normal::<f32>(&[3, 1, 64], None, None, None).unwrap();
        let generated = reference
            .add(&noise.multiply(&Array::from_f32(0.1)).unwrap())
            .unwrap();

        let values = snr(&generated, &reference).unwrap();
        values.eval().unwrap();

        assert_eq!(values.shape(), &[3]);
        assert!(values.as_slice::<f32>().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_snr_improves_with_less_noise() {
        let reference = mlx_rs::random::normal::<f32>(&[1, 1, 256], None, None, None).unwrap();
        let noise = mlx_rs::random::normal::<f32>(&[1, 1, 256], None, None, None).unwrap();

        let noisy = reference
            .add(&noise.multiply(&Array::from_f32(0.5)).unwrap())
            .unwrap();
        let cleaner = reference
            .add(&noise.multiply(&Array::from_f32(0.05)).unwrap())
            .unwrap();

        let low = snr(&noisy, &reference).unwrap();
        let high = snr(&cleaner, &reference).unwrap();
        low.eval().unwrap();
        high.eval().unwrap();

        assert!(high.as_slice::<f32>()[0] > low.as_slice::<f32>()[0]);
    }

    #[test]
    fn test_snr_silent_reference_is_undefined() {
        let reference = mlx_rs::ops::zeros::<f32>(&[1, 1, 64]).unwrap();
        let generated = mlx_rs::random::normal::<f32>(&[1, 1, 64], None, None, None).unwrap();

        let values = snr(&generated, &reference).unwrap();
        values.eval().unwrap();

        assert!(!values.as_slice::<f32>()[0].is_finite());
    }

    #[test]
    fn test_lsd_shape() {
        let reference = mlx_rs::random::normal::<f32>(&[2, 1, 64], None, None, None).unwrap();
        let generated = mlx_rs::random::normal::<f32>(&[2, 1, 64], None, None, None).unwrap();

        let values = lsd(&generated, &reference, &stft_config()).unwrap();
        values.eval().unwrap();

        assert_eq!(values.shape(), &[2]);
    }

    #[test]
    fn test_aggregate_excludes_undefined_values() {
        let summary = aggregate(&[1.0, f32::INFINITY, 3.0, f32::NAN]);

        assert_eq!(summary.valid, 2);
        assert_eq!(summary.excluded, 2);
        assert!((summary.mean - 2.0).abs() < 1e-6);
        assert!((summary.std - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_aggregate_all_undefined() {
        let summary = aggregate(&[f32::INFINITY, f32::NAN]);
        assert_eq!(summary.valid, 0);
        assert_eq!(summary.excluded, 2);
        assert!(summary.mean.is_nan());
    }

    #[test]
    fn test_silent_window_excluded_from_batch_statistics() {
        // One silent window among three: the aggregate must equal the
        // aggregate over the non-silent sub-batch alone.
        let loud = mlx_rs::random::normal::<f32>(&[2, 1, 64], None, None, None).unwrap();
        let silent = mlx_rs::ops::zeros::<f32>(&[1, 1, 64]).unwrap();
        let reference = mlx_rs::ops::concatenate_axis(&[&loud, &silent], 0).unwrap();
        let generated = mlx_rs::random::normal::<f32>(&[3, 1, 64], None, None, None).unwrap();

        let full = snr(&generated, &reference).unwrap();
        full.eval().unwrap();
        let full_summary = aggregate(full.as_slice::<f32>());

        use mlx_rs::ops::indexing::IndexOp;
        let sub_generated = generated.index((..2, .., ..));
        let sub = snr(&sub_generated, &loud).unwrap();
        sub.eval().unwrap();
        let sub_summary = aggregate(sub.as_slice::<f32>());

        assert_eq!(full_summary.valid, 2);
        assert_eq!(full_summary.excluded, 1);
        assert!((full_summary.mean - sub_summary.mean).abs() < 1e-5);
        assert!((full_summary.std - sub_summary.std).abs() < 1e-5);
    }
}
