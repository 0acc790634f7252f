//! Neural network building blocks.
//!
//! This module provides the layers the models are assembled from:
//! - Plain 1D convolutions and linear layers (NCL layout)
//! - Learned per-channel PReLU activation
//! - Inverted dropout with an explicit training toggle
//! - SuperPixel1d / SubPixel1d shape-rearranging resamplers
//! - Multi-scale BaseBlock and the Down/Up encoder/decoder stages

mod activation;
mod base_block;
mod conv;
mod down_block;
mod dropout;
mod resample;
mod up_block;

pub use activation::PRelu;
pub use base_block::BaseBlock;
pub use conv::{Conv1d, Linear};
pub use down_block::DownBlock;
pub use dropout::Dropout;
pub use resample::{SubPixel1d, SuperPixel1d};
pub use up_block::UpBlock;
