//! In-memory windowed waveform dataset.

use crate::error::{DataError, Result};
use std::path::Path;

/// Paired fixed-length windows of input and target audio.
///
/// Every window has exactly `window_length` samples normalized to [-1, 1];
/// input window `i` corresponds to target window `i` (same score, different
/// timbre in the original pipeline).
#[derive(Debug, Clone)]
pub struct WindowDataset {
    inputs: Vec<Vec<f32>>,
    targets: Vec<Vec<f32>>,
    window_length: usize,
}

impl WindowDataset {
    /// Build a dataset from pre-windowed sample vectors.
    pub fn from_windows(
        inputs: Vec<Vec<f32>>,
        targets: Vec<Vec<f32>>,
        window_length: usize,
    ) -> Result<Self> {
        if window_length == 0 {
            return Err(DataError::Dataset("window length must be positive".into()));
        }
        if inputs.len() != targets.len() {
            return Err(DataError::Dataset(format!(
                "{} input windows but {} target windows",
                inputs.len(),
                targets.len()
            )));
        }
        for window in inputs.iter().chain(targets.iter()) {
            if window.len() != window_length {
                return Err(DataError::Dataset(format!(
                    "window of {} samples, expected {}",
                    window.len(),
                    window_length
                )));
            }
        }

        Ok(Self {
            inputs,
            targets,
            window_length,
        })
    }

    /// Load a dataset from a pair of WAV files rendered from the same score.
    ///
    /// Both files are mixed down to mono, normalized to [-1, 1] and cut into
    /// non-overlapping windows; the ragged tail is discarded. The pair is
    /// truncated to the shorter file's window count.
    pub fn from_wav_pair(
        input_path: impl AsRef<Path>,
        target_path: impl AsRef<Path>,
        window_length: usize,
    ) -> Result<Self> {
        let input_samples = read_wav_mono(input_path.as_ref())?;
        let target_samples = read_wav_mono(target_path.as_ref())?;

        let mut inputs = window_samples(&input_samples, window_length);
        let mut targets = window_samples(&target_samples, window_length);

        let count = inputs.len().min(targets.len());
        if count == 0 {
            return Err(DataError::Dataset(format!(
                "no complete {}-sample window in {:?} / {:?}",
                window_length,
                input_path.as_ref(),
                target_path.as_ref()
            )));
        }
        inputs.truncate(count);
        targets.truncate(count);

        tracing::debug!(
            windows = count,
            window_length,
            "loaded paired windows from WAV files"
        );

        Self::from_windows(inputs, targets, window_length)
    }

    /// Number of window pairs.
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// Whether the dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Samples per window.
    pub fn window_length(&self) -> usize {
        self.window_length
    }

    /// The `(input, target)` window pair at `index`.
    pub fn get(&self, index: usize) -> (&[f32], &[f32]) {
        (&self.inputs[index], &self.targets[index])
    }
}

/// Read a WAV file as normalized mono f32 samples.
fn read_wav_mono(path: &Path) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(DataError::Dataset(format!("{:?} has zero channels", path)));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    // Mix interleaved channels down to mono
    if channels == 1 {
        return Ok(samples);
    }
    Ok(samples
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect())
}

/// Cut a sample stream into non-overlapping windows, dropping the tail.
fn window_samples(samples: &[f32], window_length: usize) -> Vec<Vec<f32>> {
    samples
        .chunks_exact(window_length)
        .map(|chunk| chunk.to_vec())
        .collect()
}
