//! DataLoader yielding `[batch, 1, window]` tensor pairs.

use crate::dataset::WindowDataset;
use mlx_rs::Array;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::sync::Arc;

/// A batch of paired windows ready for the models.
#[derive(Debug)]
pub struct Batch {
    /// Input windows [batch, 1, window_length].
    pub input: Array,
    /// Target windows [batch, 1, window_length].
    pub target: Array,
    /// Number of window pairs in this batch.
    pub batch_size: usize,
}

/// Configuration for the DataLoader.
#[derive(Debug, Clone)]
pub struct DataLoaderConfig {
    /// Batch size.
    pub batch_size: usize,
    /// Whether to shuffle the window order.
    pub shuffle: bool,
    /// Random seed for shuffling.
    pub seed: u64,
    /// Whether to drop the last incomplete batch.
    pub drop_last: bool,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            shuffle: true,
            seed: 42,
            drop_last: false,
        }
    }
}

/// Restartable iterator over a [`WindowDataset`].
pub struct DataLoader {
    dataset: Arc<WindowDataset>,
    config: DataLoaderConfig,
    indices: Vec<usize>,
    position: usize,
}

impl DataLoader {
    /// Create a new DataLoader.
    pub fn new(dataset: Arc<WindowDataset>, config: DataLoaderConfig) -> Self {
        let mut indices: Vec<usize> = (0..dataset.len()).collect();

        if config.shuffle {
            let mut rng = rand::rngs::StdRng::seed_from_u64(config.seed);
            indices.shuffle(&mut rng);
        }

        Self {
            dataset,
            config,
            indices,
            position: 0,
        }
    }

    /// Restart iteration, reshuffling with `new_seed` (or the configured
    /// seed) when shuffling is enabled.
    pub fn reset(&mut self, new_seed: Option<u64>) {
        self.position = 0;
        if self.config.shuffle {
            let seed = new_seed.unwrap_or(self.config.seed);
            let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
            self.indices.shuffle(&mut rng);
        }
    }

    /// The loader configuration.
    pub fn config(&self) -> &DataLoaderConfig {
        &self.config
    }

    /// Number of batches per full pass.
    pub fn num_batches(&self) -> usize {
        let n = self.dataset.len();
        if self.config.drop_last {
            n / self.config.batch_size
        } else {
            n.div_ceil(self.config.batch_size)
        }
    }

    /// Number of window pairs.
    pub fn len(&self) -> usize {
        self.dataset.len()
    }

    /// Whether the underlying dataset is empty.
    pub fn is_empty(&self) -> bool {
        self.dataset.is_empty()
    }

    /// Yield the next batch, or None when the pass is exhausted.
    pub fn next_batch(&mut self) -> Option<Batch> {
        let remaining = self.indices.len().saturating_sub(self.position);
        if remaining == 0 {
            return None;
        }

        let batch_size = remaining.min(self.config.batch_size);
        if batch_size < self.config.batch_size && self.config.drop_last {
            return None;
        }

        let window = self.dataset.window_length();
        let mut input_flat = Vec::with_capacity(batch_size * window);
        let mut target_flat = Vec::with_capacity(batch_size * window);

        for &index in &self.indices[self.position..self.position + batch_size] {
            let (input, target) = self.dataset.get(index);
            input_flat.extend_from_slice(input);
            target_flat.extend_from_slice(target);
        }
        self.position += batch_size;

        let shape = [batch_size as i32, 1, window as i32];
        Some(Batch {
            input: Array::from_slice(&input_flat, &shape),
            target: Array::from_slice(&target_flat, &shape),
            batch_size,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(n: usize, window: usize) -> Arc<WindowDataset> {
        let windows: Vec<Vec<f32>> = (0..n)
            .map(|i| vec![i as f32 / n as f32; window])
            .collect();
        Arc::new(WindowDataset::from_windows(windows.clone(), windows, window).unwrap())
    }

    #[test]
    fn test_batch_shapes() {
        let mut loader = DataLoader::new(
            dataset(10, 16),
            DataLoaderConfig {
                batch_size: 4,
                shuffle: false,
                ..Default::default()
            },
        );

        let batch = loader.next_batch().unwrap();
        batch.input.eval().unwrap();
        assert_eq!(batch.input.shape(), &[4, 1, 16]);
        assert_eq!(batch.target.shape(), &[4, 1, 16]);
        assert_eq!(batch.batch_size, 4);
    }

    #[test]
    fn test_sequential_order_without_shuffle() {
        let mut loader = DataLoader::new(
            dataset(4, 8),
            DataLoaderConfig {
                batch_size: 2,
                shuffle: false,
                ..Default::default()
            },
        );

        let batch = loader.next_batch().unwrap();
        batch.input.eval().unwrap();
        let values = batch.input.as_slice::<f32>();
        // First window is all zeros, second all 0.25
        assert_eq!(values[0], 0.0);
        assert_eq!(values[8], 0.25);
    }

    #[test]
    fn test_ragged_final_batch() {
        let mut loader = DataLoader::new(
            dataset(5, 8),
            DataLoaderConfig {
                batch_size: 2,
                shuffle: false,
                drop_last: false,
                ..Default::default()
            },
        );

        assert_eq!(loader.num_batches(), 3);
        let mut sizes = Vec::new();
        while let Some(batch) = loader.next_batch() {
            sizes.push(batch.batch_size);
        }
        assert_eq!(sizes, vec![2, 2, 1]);
    }

    #[test]
    fn test_drop_last() {
        let mut loader = DataLoader::new(
            dataset(5, 8),
            DataLoaderConfig {
                batch_size: 2,
                shuffle: false,
                drop_last: true,
                ..Default::default()
            },
        );

        assert_eq!(loader.num_batches(), 2);
        let mut count = 0;
        while loader.next_batch().is_some() {
            count += 1;
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn test_reset_restarts_iteration() {
        let mut loader = DataLoader::new(
            dataset(4, 8),
            DataLoaderConfig {
                batch_size: 4,
                shuffle: false,
                ..Default::default()
            },
        );

        assert!(loader.next_batch().is_some());
        assert!(loader.next_batch().is_none());

        loader.reset(None);
        assert!(loader.next_batch().is_some());
    }

    #[test]
    fn test_shuffle_is_seed_deterministic() {
        let config = DataLoaderConfig {
            batch_size: 8,
            shuffle: true,
            seed: 7,
            ..Default::default()
        };
        let mut first = DataLoader::new(dataset(8, 4), config.clone());
        let mut second = DataLoader::new(dataset(8, 4), config);

        let a = first.next_batch().unwrap();
        let b = second.next_batch().unwrap();
        a.input.eval().unwrap();
        b.input.eval().unwrap();
        assert_eq!(a.input.as_slice::<f32>(), b.input.as_slice::<f32>());
    }
}
