//! Learning rate schedulers.

use serde::{Deserialize, Serialize};

/// Step decay scheduler: the learning rate is multiplied by `gamma` every
/// `step_size` epochs.
///
/// Serializable so its state travels inside the trainer checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepLr {
    base_lr: f32,
    step_size: usize,
    gamma: f32,
    epoch: usize,
}

impl StepLr {
    /// Create a new scheduler at epoch zero.
    pub fn new(base_lr: f32, step_size: usize, gamma: f32) -> Self {
        Self {
            base_lr,
            step_size: step_size.max(1),
            gamma,
            epoch: 0,
        }
    }

    /// The learning rate for the current epoch.
    pub fn lr(&self) -> f32 {
        self.base_lr * self.gamma.powi((self.epoch / self.step_size) as i32)
    }

    /// Advance to the next epoch.
    pub fn step(&mut self) {
        self.epoch += 1;
    }

    /// The current epoch.
    pub fn epoch(&self) -> usize {
        self.epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_decay() {
        let mut scheduler = StepLr::new(1e-3, 2, 0.5);

        assert_eq!(scheduler.lr(), 1e-3);
        scheduler.step();
        assert_eq!(scheduler.lr(), 1e-3);
        scheduler.step();
        assert!((scheduler.lr() - 5e-4).abs() < 1e-12);

        scheduler.step();
        scheduler.step();
        assert!((scheduler.lr() - 2.5e-4).abs() < 1e-12);
    }

    #[test]
    fn test_zero_step_size_is_clamped() {
        let scheduler = StepLr::new(1e-3, 0, 0.5);
        assert_eq!(scheduler.lr(), 1e-3);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut scheduler = StepLr::new(1e-4, 30, 0.5);
        scheduler.step();
        scheduler.step();

        let json = serde_json::to_string(&scheduler).unwrap();
        let back: StepLr = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scheduler);
        assert_eq!(back.epoch(), 2);
    }
}
