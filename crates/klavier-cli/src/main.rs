//! klavier CLI - audio timbre transfer training on MLX.

use clap::{Args, Parser, Subcommand};
use klavier_core::{ModelConfig, TrainConfig};
use klavier_data::{DataLoader, DataLoaderConfig, WindowDataset};
use klavier_nn::audio::StftConfig;
use klavier_nn::Generator;
use klavier_trainer::{
    checkpoint, metrics, GanTrainer, GeneratorTrainer, MetricsReport, Trainer,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "klavier")]
#[command(version, about = "Timbre transfer on MIDI-derived piano recordings", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the generator on reconstruction losses only.
    TrainGenerator {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        train: TrainArgs,
    },
    /// Train the generator adversarially against a discriminator.
    TrainGan {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        train: TrainArgs,
    },
    /// Evaluate SNR/LSD of a trained generator on the test split.
    Metrics {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        model: ModelArgs,
        /// Checkpoint directory holding the trained generator.
        #[arg(long)]
        load_path: PathBuf,
        /// Number of test batches to evaluate.
        #[arg(long, default_value_t = 10)]
        n_batches: usize,
    },
}

/// Paired WAV files per split, rendered from the same scores with the input
/// and target timbres.
#[derive(Args)]
struct DataArgs {
    /// Input-timbre WAV file for the training split.
    #[arg(long)]
    train_input: PathBuf,
    /// Target-timbre WAV file for the training split.
    #[arg(long)]
    train_target: PathBuf,
    /// Input-timbre WAV file for the validation split.
    #[arg(long)]
    valid_input: PathBuf,
    /// Target-timbre WAV file for the validation split.
    #[arg(long)]
    valid_target: PathBuf,
    /// Input-timbre WAV file for the test split (defaults to the validation pair).
    #[arg(long)]
    test_input: Option<PathBuf>,
    /// Target-timbre WAV file for the test split.
    #[arg(long)]
    test_target: Option<PathBuf>,
    /// Windows per batch.
    #[arg(long, default_value_t = 10)]
    batch_size: usize,
    /// Shuffle seed for the training split.
    #[arg(long, default_value_t = 42)]
    seed: u64,
}

#[derive(Args)]
struct ModelArgs {
    /// JSON file overriding the model architecture.
    #[arg(long)]
    model_config: Option<PathBuf>,
    /// Samples per window (ignored when --model-config is given).
    #[arg(long, default_value_t = 8192)]
    window_length: i32,
}

#[derive(Args)]
struct TrainArgs {
    #[command(flatten)]
    model: ModelArgs,
    /// Directory the trainer checkpoints into every epoch.
    #[arg(long, default_value = "objects/trainer")]
    save_path: PathBuf,
    /// Checkpoint directory to resume from.
    #[arg(long)]
    load_path: Option<PathBuf>,
    /// Number of epochs to train for.
    #[arg(long, default_value_t = 10)]
    epochs: usize,
    /// Learning rate for the generator.
    #[arg(long, default_value_t = 1e-4)]
    generator_lr: f32,
    /// Learning rate for the discriminator.
    #[arg(long, default_value_t = 1e-4)]
    discriminator_lr: f32,
    /// Epochs between learning-rate decays.
    #[arg(long, default_value_t = 30)]
    scheduler_step: usize,
    /// Multiplicative learning-rate decay factor.
    #[arg(long, default_value_t = 0.5)]
    scheduler_gamma: f32,
    /// Include the magnitude-spectrogram term in the optimized loss.
    #[arg(long)]
    use_frequency_loss: bool,
    /// Weight of the frequency-domain term.
    #[arg(long, default_value_t = 1e-3)]
    lambda_freq: f32,
    /// Weight of the adversarial term (GAN training only).
    #[arg(long, default_value_t = 1e-3)]
    lambda_adversarial: f32,
    /// Weight of the autoencoder embedding term (GAN training only).
    #[arg(long, default_value_t = 1e-1)]
    lambda_autoencoder: f32,
    /// Checkpoint directory of a pretrained autoencoder (GAN training only).
    #[arg(long)]
    autoencoder_path: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Cli::parse()) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::TrainGenerator { data, train } => {
            let model_config = load_model_config(&train.model)?;
            let (train_loader, valid_loader, test_loader) = build_loaders(&data, &model_config)?;
            let mut trainer = GeneratorTrainer::new(
                &model_config,
                train_config(&train),
                StftConfig::default(),
                train_loader,
                valid_loader,
                test_loader,
            )?;
            trainer.train(train.epochs)?;
            report_metrics(trainer.evaluate_metrics(10)?);
        }
        Commands::TrainGan { data, train } => {
            let model_config = load_model_config(&train.model)?;
            let (train_loader, valid_loader, test_loader) = build_loaders(&data, &model_config)?;
            let mut trainer = GanTrainer::new(
                &model_config,
                train_config(&train),
                StftConfig::default(),
                train_loader,
                valid_loader,
                test_loader,
            )?;
            trainer.train(train.epochs)?;
            report_metrics(trainer.evaluate_metrics(10)?);
        }
        Commands::Metrics {
            data,
            model,
            load_path,
            n_batches,
        } => {
            let model_config = load_model_config(&model)?;
            let (_, _, mut test_loader) = build_loaders(&data, &model_config)?;

            let mut generator = Generator::new(&model_config)?;
            checkpoint::load_model(&load_path, "generator", &mut generator)?;
            generator.set_training(false);

            let report = metrics::evaluate_generator(
                &generator,
                &mut test_loader,
                &StftConfig::default(),
                n_batches,
            )?;
            report_metrics(report);
        }
    }
    Ok(())
}

fn load_model_config(args: &ModelArgs) -> Result<ModelConfig, Box<dyn std::error::Error>> {
    match &args.model_config {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            Ok(serde_json::from_str(&json)?)
        }
        None => Ok(ModelConfig {
            window_length: args.window_length,
            ..ModelConfig::default()
        }),
    }
}

fn train_config(args: &TrainArgs) -> TrainConfig {
    TrainConfig {
        generator_lr: args.generator_lr,
        discriminator_lr: args.discriminator_lr,
        scheduler_step: args.scheduler_step,
        scheduler_gamma: args.scheduler_gamma,
        use_frequency_loss: args.use_frequency_loss,
        lambda_freq: args.lambda_freq,
        lambda_adversarial: args.lambda_adversarial,
        lambda_autoencoder: args.lambda_autoencoder,
        epochs: args.epochs,
        load_path: args.load_path.clone(),
        autoencoder_path: args.autoencoder_path.clone(),
        ..TrainConfig::with_save_path(&args.save_path)
    }
}

fn build_loaders(
    data: &DataArgs,
    model_config: &ModelConfig,
) -> Result<(DataLoader, DataLoader, DataLoader), Box<dyn std::error::Error>> {
    let window = model_config.window_length as usize;

    let train_dataset = Arc::new(WindowDataset::from_wav_pair(
        &data.train_input,
        &data.train_target,
        window,
    )?);
    let valid_dataset = Arc::new(WindowDataset::from_wav_pair(
        &data.valid_input,
        &data.valid_target,
        window,
    )?);
    let test_dataset = match (&data.test_input, &data.test_target) {
        (Some(input), Some(target)) => {
            Arc::new(WindowDataset::from_wav_pair(input, target, window)?)
        }
        _ => valid_dataset.clone(),
    };

    tracing::info!(
        train_windows = train_dataset.len(),
        valid_windows = valid_dataset.len(),
        test_windows = test_dataset.len(),
        window,
        "datasets loaded"
    );

    let train_loader = DataLoader::new(
        train_dataset,
        DataLoaderConfig {
            batch_size: data.batch_size,
            shuffle: true,
            seed: data.seed,
            drop_last: false,
        },
    );
    let valid_loader = DataLoader::new(
        valid_dataset,
        DataLoaderConfig {
            batch_size: data.batch_size,
            shuffle: false,
            seed: data.seed,
            drop_last: false,
        },
    );
    let test_loader = DataLoader::new(
        test_dataset,
        DataLoaderConfig {
            batch_size: data.batch_size,
            shuffle: false,
            seed: data.seed,
            drop_last: false,
        },
    );

    Ok((train_loader, valid_loader, test_loader))
}

fn report_metrics(report: MetricsReport) {
    tracing::info!(
        snr_mean = report.snr.mean,
        snr_std = report.snr.std,
        lsd_mean = report.lsd.mean,
        lsd_std = report.lsd.std,
        undefined_excluded = report.snr.excluded + report.lsd.excluded,
        "evaluation metrics"
    );
}
