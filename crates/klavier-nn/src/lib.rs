//! Multi-scale convolutional models for audio timbre transfer.
//!
//! This crate implements the network side of the klavier pipeline: learned
//! sub-pixel/super-pixel resampling, multi-scale convolution blocks and the
//! generator / discriminator / autoencoder stacks built from them, together
//! with the STFT utilities and loss functions the trainers consume.
//!
//! All waveform tensors use NCL layout `[batch, channels, length]`, with
//! windows normalized to [-1, 1].

#![warn(missing_docs)]

pub mod audio;
pub mod autoencoder;
pub mod discriminator;
pub mod error;
pub mod generator;
pub mod loss;
pub mod nn;

pub use autoencoder::Autoencoder;
pub use discriminator::Discriminator;
pub use error::{ModelError, Result};
pub use generator::Generator;
