//! Core configuration types for the klavier timbre-transfer pipeline.
//!
//! Configuration is carried by explicit value objects constructed once at
//! process start and passed by reference to every component that needs them.
//! There is no global configuration lookup.

#![warn(missing_docs)]

mod config;

pub use config::*;
