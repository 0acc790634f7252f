//! Windowed waveform datasets and batching.
//!
//! The trainers consume `(input, target)` window pairs through a restartable
//! [`DataLoader`]; this crate owns the window storage and the shuffling. The
//! upstream MIDI rewriting that produces the paired audio is an external
//! collaborator — this crate starts at audio files.

#![warn(missing_docs)]

mod dataloader;
mod dataset;
mod error;

pub use dataloader::{Batch, DataLoader, DataLoaderConfig};
pub use dataset::WindowDataset;
pub use error::{DataError, Result};
