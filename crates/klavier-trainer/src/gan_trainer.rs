//! Adversarial generator training.

use crate::checkpoint::{self, CheckpointWriter, TrainerState};
use crate::generator_trainer::{mean, validate_loss_weights, validation_total};
use crate::history::LossHistory;
use crate::metrics::{self, MetricsReport};
use crate::scheduler::StepLr;
use crate::{Result, Trainer, TrainerError};
use klavier_core::{ModelConfig, TrainConfig};
use klavier_data::{Batch, DataLoader};
use klavier_nn::audio::StftConfig;
use klavier_nn::loss::{
    discriminator_adversarial_loss, embedding_l2_loss, generator_adversarial_loss, mse_loss,
    spectral_l2_loss,
};
use klavier_nn::{Autoencoder, Discriminator, Generator};
use mlx_rs::error::Exception;
use mlx_rs::optimizers::{Adam, Optimizer};
use mlx_rs::{array, nn, Array};
use std::cell::RefCell;
use std::collections::BTreeMap;

/// Trains a [`Generator`] against a [`Discriminator`] with a least-squares
/// adversarial objective.
///
/// Each batch first updates the discriminator on real targets versus a
/// detached fake batch, then updates the generator on the weighted sum of
/// the time-domain reconstruction term, the adversarial term, the optional
/// frequency term and the optional embedding distance measured by a frozen
/// pretrained autoencoder. Every term is recorded independently even when
/// its weight keeps it out of the optimized total.
pub struct GanTrainer {
    config: TrainConfig,
    stft: StftConfig,
    generator: Generator,
    discriminator: Discriminator,
    autoencoder: Option<Autoencoder>,
    g_optimizer: Adam,
    d_optimizer: Adam,
    g_scheduler: StepLr,
    d_scheduler: StepLr,
    train_loader: DataLoader,
    valid_loader: DataLoader,
    test_loader: DataLoader,
    epoch: usize,
    best_valid_loss: Option<f64>,
    train_losses: LossHistory,
    valid_losses: LossHistory,
}

impl GanTrainer {
    /// Build a trainer and, if a load path is configured, resume from it.
    ///
    /// When `autoencoder_path` is configured the pretrained autoencoder is
    /// loaded from that checkpoint directory and kept frozen; a missing file
    /// is a fatal error rather than a silently weaker loss.
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
        let discriminator = Discriminator::new(model_config)?;

        let autoencoder = match &config.autoencoder_path {
            Some(path) => {
                let mut autoencoder = Autoencoder::new(model_config)?;
                checkpoint::load_model(path, "autoencoder", &mut autoencoder)?;
                autoencoder.set_training(false);
                tracing::info!(?path, "loaded pretrained autoencoder for embedding loss");
                Some(autoencoder)
            }
            None => None,
        };

        let g_optimizer = Adam::new(config.generator_lr);
        let d_optimizer = Adam::new(config.discriminator_lr);
        let g_scheduler = StepLr::new(
            config.generator_lr,
            config.scheduler_step,
            config.scheduler_gamma,
        );
        let d_scheduler = StepLr::new(
            config.discriminator_lr,
            config.scheduler_step,
            config.scheduler_gamma,
        );

        let mut trainer = Self {
            config,
            stft,
            generator,
            discriminator,
            autoencoder,
            g_optimizer,
            d_optimizer,
            g_scheduler,
            d_scheduler,
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

    /// The discriminator.
    pub fn discriminator(&self) -> &Discriminator {
        &self.discriminator
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
            discriminator,
            autoencoder,
            g_optimizer,
            d_optimizer,
            config,
            stft,
            train_losses,
            ..
        } = self;

        // Discriminator step on real targets versus a detached fake batch:
        // the generator is not part of the differentiated state here, so no
        // gradient reaches it.
        let fake = generator.forward(&batch.input)?;

        let d_recorded: RefCell<Vec<(&'static str, Array)>> = RefCell::new(Vec::new());
        let d_loss_fn = |model: &mut Discriminator,
                         (real, fake): (&Array, &Array)|
         -> std::result::Result<Array, Exception> {
            let real_logits = model
                .forward(real)
                .map_err(|e| Exception::custom(e.to_string()))?;
            let fake_logits = model
                .forward(fake)
                .map_err(|e| Exception::custom(e.to_string()))?;
            let (real_loss, fake_loss) = discriminator_adversarial_loss(&real_logits, &fake_logits)
                .map_err(|e| Exception::custom(e.to_string()))?;
            let total = real_loss.add(&fake_loss)?;

            let mut terms = d_recorded.borrow_mut();
            terms.clear();
            terms.push(("discriminator_real", real_loss));
            terms.push(("discriminator_fake", fake_loss));
            Ok(total)
        };

        let mut d_loss_and_grad = nn::value_and_grad(d_loss_fn);
        let (d_loss, d_grads) = d_loss_and_grad(discriminator, (&batch.target, &fake))?;
        d_optimizer.update(discriminator, d_grads)?;
        d_loss.eval()?;
        drop(d_loss_and_grad);
        for (name, value) in d_recorded.into_inner() {
            value.eval()?;
            train_losses.push(name, value.item::<f32>());
        }

        // Generator step; the discriminator and autoencoder participate in
        // the graph but only the generator's parameters receive gradients.
        let use_freq = config.use_frequency_loss;
        let lambda_freq = config.lambda_freq;
        let use_adversarial = config.use_adversarial;
        let lambda_adversarial = config.lambda_adversarial;
        let lambda_autoencoder = config.lambda_autoencoder;
        let discriminator_ref: &Discriminator = discriminator;
        let autoencoder_ref: Option<&Autoencoder> = autoencoder.as_ref();

        let g_recorded: RefCell<Vec<(&'static str, Array)>> = RefCell::new(Vec::new());
        let g_loss_fn = |model: &mut Generator,
                         (input, target): (&Array, &Array)|
         -> std::result::Result<Array, Exception> {
            let generated = model
                .forward(input)
                .map_err(|e| Exception::custom(e.to_string()))?;

            let time_loss =
                mse_loss(&generated, target).map_err(|e| Exception::custom(e.to_string()))?;
            let freq_loss = spectral_l2_loss(&generated, target, stft)
                .map_err(|e| Exception::custom(e.to_string()))?;
            let fake_logits = discriminator_ref
                .forward(&generated)
                .map_err(|e| Exception::custom(e.to_string()))?;
            let adversarial_loss = generator_adversarial_loss(&fake_logits)
                .map_err(|e| Exception::custom(e.to_string()))?;

            let mut total = time_loss.clone();
            if use_adversarial {
                total =
                    total.add(&adversarial_loss.multiply(&Array::from_f32(lambda_adversarial))?)?;
            }
            if use_freq {
                total = total.add(&freq_loss.multiply(&Array::from_f32(lambda_freq))?)?;
            }

            let mut terms = g_recorded.borrow_mut();
            terms.clear();
            if let Some(autoencoder) = autoencoder_ref {
                let generated_embedding = autoencoder
                    .embed(&generated)
                    .map_err(|e| Exception::custom(e.to_string()))?;
                let target_embedding = autoencoder
                    .embed(target)
                    .map_err(|e| Exception::custom(e.to_string()))?;
                let embedding_loss = embedding_l2_loss(&generated_embedding, &target_embedding)
                    .map_err(|e| Exception::custom(e.to_string()))?;
                total =
                    total.add(&embedding_loss.multiply(&Array::from_f32(lambda_autoencoder))?)?;
                terms.push(("autoencoder_l2", embedding_loss));
            }
            terms.push(("time_l2", time_loss));
            terms.push(("freq_l2", freq_loss));
            terms.push(("generator_adversarial", adversarial_loss));
            Ok(total)
        };

        let mut g_loss_and_grad = nn::value_and_grad(g_loss_fn);
        let (g_loss, g_grads) = g_loss_and_grad(generator, (&batch.input, &batch.target))?;
        g_optimizer.update(generator, g_grads)?;
        g_loss.eval()?;
        drop(g_loss_and_grad);
        for (name, value) in g_recorded.into_inner() {
            value.eval()?;
            train_losses.push(name, value.item::<f32>());
        }

        Ok(())
    }

    fn train_epoch(&mut self) -> Result<()> {
        self.generator.set_training(true);

        let g_lr = self.g_scheduler.lr();
        let d_lr = self.d_scheduler.lr();
        self.g_optimizer.lr = array!(g_lr);
        self.d_optimizer.lr = array!(d_lr);

        let epoch_seed = self.train_loader.config().seed + self.epoch as u64 + 1;
        self.train_loader.reset(Some(epoch_seed));

        let n_batches = self.train_loader.num_batches();
        while let Some(batch) = self.train_loader.next_batch() {
            self.train_step(&batch)?;
        }

        tracing::info!(
            epoch = self.epoch,
            g_lr,
            d_lr,
            time_l2 = self.train_losses.mean_of_last("time_l2", n_batches),
            adversarial = self
                .train_losses
                .mean_of_last("generator_adversarial", n_batches),
            discriminator_real = self
                .train_losses
                .mean_of_last("discriminator_real", n_batches),
            discriminator_fake = self
                .train_losses
                .mean_of_last("discriminator_fake", n_batches),
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

impl Trainer for GanTrainer {
    fn train(&mut self, epochs: usize) -> Result<()> {
        for _ in 0..epochs {
            self.train_epoch()?;
            self.valid_epoch()?;
            self.epoch += 1;
            self.g_scheduler.step();
            self.d_scheduler.step();
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
        schedulers.insert("generator".to_string(), self.g_scheduler.clone());
        schedulers.insert("discriminator".to_string(), self.d_scheduler.clone());
        writer.write_state(&TrainerState {
            epoch: self.epoch,
            best_valid_loss: self.best_valid_loss,
            schedulers,
            train_losses: self.train_losses.clone(),
            valid_losses: self.valid_losses.clone(),
        })?;
        writer.write_model("generator", &self.generator)?;
        writer.write_model("discriminator", &self.discriminator)?;
        writer.write_optimizer("generator", &self.g_optimizer)?;
        writer.write_optimizer("discriminator", &self.d_optimizer)?;
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
        let g_scheduler = state.schedulers.get("generator").cloned().ok_or_else(|| {
            TrainerError::Checkpoint(format!(
                "checkpoint {:?} has no generator scheduler state",
                dir
            ))
        })?;
        let d_scheduler = state
            .schedulers
            .get("discriminator")
            .cloned()
            .ok_or_else(|| {
                TrainerError::Checkpoint(format!(
                    "checkpoint {:?} has no discriminator scheduler state",
                    dir
                ))
            })?;

        checkpoint::load_model(&dir, "generator", &mut self.generator)?;
        checkpoint::load_model(&dir, "discriminator", &mut self.discriminator)?;
        checkpoint::load_optimizer(&dir, "generator", &mut self.g_optimizer)?;
        checkpoint::load_optimizer(&dir, "discriminator", &mut self.d_optimizer)?;
        self.epoch = state.epoch;
        self.best_valid_loss = state.best_valid_loss;
        self.g_scheduler = g_scheduler;
        self.d_scheduler = d_scheduler;
        self.train_losses = state.train_losses;
        self.valid_losses = state.valid_losses;

        tracing::info!(epoch = self.epoch, from = ?dir, "trainer resumed");
        Ok(())
    }
}
