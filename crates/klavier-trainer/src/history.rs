//! Per-term loss histories.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from loss name to the ordered sequence of recorded values.
///
/// Training appends once per batch, validation once per epoch; series are
/// never truncated, so they grow monotonically across a run and survive
/// checkpoint round trips.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LossHistory(BTreeMap<String, Vec<f32>>);

impl LossHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value to the named series, creating it if needed.
    pub fn push(&mut self, name: &str, value: f32) {
        self.0.entry(name.to_string()).or_default().push(value);
    }

    /// The full series for a name; empty if never recorded.
    pub fn series(&self, name: &str) -> &[f32] {
        self.0.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Mean of the last `n` recorded values of a series.
    pub fn mean_of_last(&self, name: &str, n: usize) -> Option<f32> {
        let series = self.series(name);
        if series.is_empty() || n == 0 {
            return None;
        }
        let tail = &series[series.len().saturating_sub(n)..];
        Some(tail.iter().sum::<f32>() / tail.len() as f32)
    }

    /// Names of all recorded series.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_series() {
        let mut history = LossHistory::new();
        history.push("time_l2", 1.0);
        history.push("time_l2", 3.0);

        assert_eq!(history.series("time_l2"), &[1.0, 3.0]);
        assert_eq!(history.series("missing"), &[] as &[f32]);
    }

    #[test]
    fn test_mean_of_last() {
        let mut history = LossHistory::new();
        for v in [1.0, 2.0, 3.0, 4.0] {
            history.push("loss", v);
        }

        assert_eq!(history.mean_of_last("loss", 2), Some(3.5));
        // n larger than the series falls back to the full mean
        assert_eq!(history.mean_of_last("loss", 100), Some(2.5));
        assert_eq!(history.mean_of_last("missing", 2), None);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut history = LossHistory::new();
        history.push("a", 0.5);
        history.push("b", 1.5);

        let json = serde_json::to_string(&history).unwrap();
        let back: LossHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, history);
    }
}
