//! Reconstruction-only generator training.

use crate::checkpoint::{self, CheckpointWriter, TrainerState};
use crate::history::LossHistory;
use crate::metrics::{self, MetricsReport};
use crate::scheduler::StepLr;
use crate::{Result, Trainer, TrainerError};
use klavier_core::{ModelConfig, TrainConfig};
use klavier_data::{Batch, DataLoader};
use klavier_nn::audio::StftConfig;
use klavier_nn::loss::{mse_loss, spectral_l2_loss};
use klavier_nn::Generator;
use mlx_rs::error::Exception;
use mlx_rs::optimizers::{Adam, Optimizer};
use mlx_rs::{array, nn, Array};
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Trains a [`Generator`] on time-domain reconstruction, with an optional
/// frequency-domain term.
///
/// One epoch is a full shuffled pass over the training loader, a no-grad
/// validation pass, and a checkpoint. Both loss terms are recorded every
/// batch regardless of whether the frequency term contributes to the
/// optimized total.
pub struct GeneratorTrainer {
    config: TrainConfig,
    stft: StftConfig,
    generator: Generator,
    optimizer: Adam,
    scheduler: StepLr,
    train_loader: DataLoader,
    valid_loader: DataLoader,
    test_loader: DataLoader,
    epoch: usize,
    best_valid_loss: Option<f64>,
    train_losses: LossHistory,
    valid_losses: LossHistory,
}

impl GeneratorTrainer {
    /// Build a trainer and, if a load path is configured, resume from it.
    pub fn new(
        model_config: &ModelConfig,
        config: TrainConfig,
        stft: StftConfig,
        train_loader: DataLoader,
        valid_loader: DataLoader,
        test_loader: DataLoader,
    ) -> Result<Self> {
        validate_loss_weights(&config)?;
        if train_loader.is_empty() || valid_loader.is_empty() {
            return Err(TrainerError::Config(
                "train and validation loaders must not be empty".into(),
            ));
        }

        let generator = Generator::new(model_config)?;
        let optimizer = Adam::new(config.generator_lr);
        let scheduler = StepLr::new(
            config.generator_lr,
            config.scheduler_step,
            config.scheduler_gamma,
        );

        let mut trainer = Self {
            config,
            stft,
            generator,
            optimizer,
            scheduler,
            train_loader,
            valid_loader,
            test_loader,
            epoch: 0,
            best_valid_loss: None,
            train_losses: LossHistory::new(),
            valid_losses: LossHistory::new(),
        };

        if trainer.config.load_path.is_some() {
            trainer.load()?;
        }

        Ok(trainer)
    }

    /// The trained generator.
    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// Completed epochs.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Best validation loss seen so far.
    pub fn best_valid_loss(&self) -> Option<f64> {
        self.best_valid_loss
    }

    /// Per-batch training losses.
    pub fn train_losses(&self) -> &LossHistory {
        &self.train_losses
    }

    /// Per-epoch validation losses.
    pub fn valid_losses(&self) -> &LossHistory {
        &self.valid_losses
    }

    /// Evaluate SNR/LSD over `n_batches` test batches, excluding undefined
    /// values from the aggregates.
    pub fn evaluate_metrics(&mut self, n_batches: usize) -> Result<MetricsReport> {
        let Self {
            generator,
            test_loader,
            stft,
            ..
        } = self;
        generator.set_training(false);
        metrics::evaluate_generator(generator, test_loader, stft, n_batches)
    }

    fn train_step(&mut self, batch: &Batch) -> Result<()> {
        let Self {
            generator,
            optimizer,
            config,
            stft,
            train_losses,
            ..
        } = self;

        let use_freq = config.use_frequency_loss;
        let lambda_freq = config.lambda_freq;
        let recorded: RefCell<Vec<(&'static str, Array)>> = RefCell::new(Vec::new());

        let loss_fn = |model: &mut Generator,
                       (input, target): (&Array, &Array)|
         -> std::result::Result<Array, Exception> {
            let generated = model
                .forward(input)
                .map_err(|e| Exception::custom(e.to_string()))?;

            let time_loss =
                mse_loss(&generated, target).map_err(|e| Exception::custom(e.to_string()))?;
            let freq_loss = spectral_l2_loss(&generated, target, stft)
                .map_err(|e| Exception::custom(e.to_string()))?;

            let total = if use_freq {
                time_loss.add(&freq_loss.multiply(&Array::from_f32(lambda_freq))?)?
            } else {
                time_loss.clone()
            };

            let mut terms = recorded.borrow_mut();
            terms.clear();
            terms.push(("time_l2", time_loss));
            terms.push(("freq_l2", freq_loss));
            Ok(total)
        };

        let mut loss_and_grad_fn = nn::value_and_grad(loss_fn);
        let (loss, grads) = loss_and_grad_fn(generator, (&batch.input, &batch.target))?;
        optimizer.update(generator, grads)?;
        loss.eval()?;
        drop(loss_and_grad_fn);

        for (name, value) in recorded.into_inner() {
            value.eval()?;
            train_losses.push(name, value.item::<f32>());
        }
        Ok(())
    }

    fn train_epoch(&mut self) -> Result<()> {
        self.generator.set_training(true);

        let lr = self.scheduler.lr();
        self.optimizer.lr = array!(lr);

        let epoch_seed = self.train_loader.config().seed + self.epoch as u64 + 1;
        self.train_loader.reset(Some(epoch_seed));

        let n_batches = self.train_loader.num_batches();
        while let Some(batch) = self.train_loader.next_batch() {
            self.train_step(&batch)?;
        }

        tracing::info!(
            epoch = self.epoch,
            lr,
            time_l2 = self.train_losses.mean_of_last("time_l2", n_batches),
            freq_l2 = self.train_losses.mean_of_last("freq_l2", n_batches),
            "train epoch complete"
        );
        Ok(())
    }

    fn valid_epoch(&mut self) -> Result<()> {
        self.generator.set_training(false);
        self.valid_loader.reset(None);

        let mut time_values = Vec::new();
        let mut freq_values = Vec::new();

        while let Some(batch) = self.valid_loader.next_batch() {
            let generated = self.generator.forward(&batch.input)?;
            let time_loss = mse_loss(&generated, &batch.target)?;
            let freq_loss = spectral_l2_loss(&generated, &batch.target, &self.stft)?;
            time_loss.eval()?;
            freq_loss.eval()?;
            time_values.push(time_loss.item::<f32>());
            freq_values.push(freq_loss.item::<f32>());
        }

        let time_mean = mean(&time_values);
        let freq_mean = mean(&freq_values);
        self.valid_losses.push("time_l2", time_mean);
        self.valid_losses.push("freq_l2", freq_mean);

        let total = validation_total(&self.config, time_mean, freq_mean);
        let improved = self.best_valid_loss.map_or(true, |best| total < best);
        if improved {
            self.best_valid_loss = Some(total);
        }

        tracing::info!(
            epoch = self.epoch,
            time_l2 = time_mean,
            freq_l2 = freq_mean,
            improved,
            "validation complete"
        );
        Ok(())
    }
}

impl Trainer for GeneratorTrainer {
    fn train(&mut self, epochs: usize) -> Result<()> {
        for _ in 0..epochs {
            self.train_epoch()?;
            self.valid_epoch()?;
            self.epoch += 1;
            self.scheduler.step();
            self.save()?;
        }
        Ok(())
    }

    fn evaluate(&mut self) -> Result<()> {
        self.valid_epoch()
    }

    fn save(&self) -> Result<()> {
        let writer = CheckpointWriter::create(&self.config.save_path)?;

        let mut schedulers = BTreeMap::new();
        schedulers.insert("generator".to_string(), self.scheduler.clone());
        writer.write_state(&TrainerState {
            epoch: self.epoch,
            best_valid_loss: self.best_valid_loss,
            schedulers,
            train_losses: self.train_losses.clone(),
            valid_losses: self.valid_losses.clone(),
        })?;
        writer.write_model("generator", &self.generator)?;
        writer.write_optimizer("generator", &self.optimizer)?;
        let path = writer.commit()?;

        tracing::info!(epoch = self.epoch, ?path, "checkpoint saved");
        Ok(())
    }

    fn load(&mut self) -> Result<()> {
        let dir = self
            .config
            .load_path
            .clone()
            .ok_or_else(|| TrainerError::Config("no load path configured".into()))?;

        let state = checkpoint::read_state(&dir)?;
        let scheduler = state.schedulers.get("generator").cloned().ok_or_else(|| {
            TrainerError::Checkpoint(format!(
                "checkpoint {:?} has no generator scheduler state",
                dir
            ))
        })?;

        checkpoint::load_model(&dir, "generator", &mut self.generator)?;
        checkpoint::load_optimizer(&dir, "generator", &mut self.optimizer)?;
        self.epoch = state.epoch;
        self.best_valid_loss = state.best_valid_loss;
        self.scheduler = scheduler;
        self.train_losses = state.train_losses;
        self.valid_losses = state.valid_losses;

        tracing::info!(epoch = self.epoch, from = ?dir, "trainer resumed");
        Ok(())
    }
}

/// Reject a frequency criterion that could never contribute.
pub(crate) fn validate_loss_weights(config: &TrainConfig) -> Result<()> {
    if config.use_frequency_loss && config.lambda_freq <= 0.0 {
        return Err(TrainerError::Config(format!(
            "frequency loss enabled with non-positive weight {}",
            config.lambda_freq
        )));
    }
    Ok(())
}

/// Validation total used for the improvement signal.
pub(crate) fn validation_total(config: &TrainConfig, time_mean: f32, freq_mean: f32) -> f64 {
    let mut total = time_mean as f64;
    if config.use_frequency_loss {
        total += config.lambda_freq as f64 * freq_mean as f64;
    }
    total
}

pub(crate) fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return f32::NAN;
    }
    values.iter().sum::<f32>() / values.len() as f32
}
