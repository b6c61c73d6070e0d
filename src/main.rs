#![recursion_limit = "256"]

use anyhow::Context;
use burn::backend::Autodiff;
use clap::{Parser, Subcommand};
use infogan::{
    data::CifarDataset,
    latent::LatentSampler,
    model::load_generator,
    train,
    training::{save_sample_grid, TrainingConfig},
    ModelConfig,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "wgpu")]
type MyBackend = burn::backend::Wgpu<f32>;
#[cfg(not(feature = "wgpu"))]
type MyBackend = burn::backend::NdArray<f32>;
type MyAutodiffBackend = Autodiff<MyBackend>;

#[derive(Parser, Debug)]
#[command(name = "infogan", version, about = "Train an InfoGAN on CIFAR-10")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train all three networks and write samples, config and weights
    Train {
        /// CIFAR-10 binary batches or an image folder with one directory per class
        #[arg(long)]
        data_dir: PathBuf,
        #[arg(long, default_value = "infogan-artifacts")]
        artifact_dir: PathBuf,
        #[arg(long, default_value_t = 50000)]
        iterations: usize,
        #[arg(long, default_value_t = 128)]
        batch_size: usize,
        #[arg(long, default_value_t = 50)]
        sample_interval: usize,
        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
    /// Render a class-by-noise grid from a trained generator
    Sample {
        #[arg(long, default_value = "infogan-artifacts")]
        artifact_dir: PathBuf,
        #[arg(long)]
        output: PathBuf,
        #[arg(long, default_value_t = 0)]
        seed: u64,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let device = Default::default();

    match cli.command {
        Command::Train {
            data_dir,
            artifact_dir,
            iterations,
            batch_size,
            sample_interval,
            seed,
        } => {
            let dataset = CifarDataset::open(&data_dir)
                .with_context(|| format!("loading dataset from {}", data_dir.display()))?;

            let config = TrainingConfig::new(ModelConfig::new(), TrainingConfig::adam())
                .with_iterations(iterations)
                .with_batch_size(batch_size)
                .with_sample_interval(sample_interval)
                .with_seed(seed);

            let history = train::<MyAutodiffBackend, _>(&artifact_dir, config, &dataset, &device)?;
            if let Some(last) = history.last() {
                info!(
                    "finished: D loss {:.4}, G loss {:.4}, Q loss {:.4}",
                    last.discriminator, last.generator, last.recognition
                );
            }
        }
        Command::Sample {
            artifact_dir,
            output,
            seed,
        } => {
            let config = TrainingConfig::load_json(artifact_dir.join("config.json"))?;
            let generator =
                load_generator::<MyBackend, _>(artifact_dir.join("model"), &config.model, &device)?;
            let mut sampler =
                LatentSampler::new(config.model.noise_dim, config.model.num_classes, seed);

            save_sample_grid(&generator, &mut sampler, &output, &device)?;
            info!("wrote {}", output.display());
        }
    }

    Ok(())
}
