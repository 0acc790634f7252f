//! Audio signal processing utilities.

mod stft;

pub use stft::{hann_window, magnitude_spectrogram, power_spectrogram, stft, PadMode, StftConfig};
