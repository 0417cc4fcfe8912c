//! Training CLI.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use candle_core::Device;
use curvetrace_train::{CheckpointTag, TrainConfig, Trainer};

#[derive(Parser, Debug)]
#[command(name = "train", about = "Train the curve-tracing model")]
struct Args {
    /// Config file (TOML, JSON or YAML); defaults apply when omitted.
    #[arg(long)]
    config: Option<String>,

    /// Override the training data directory.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Override the checkpoint base path.
    #[arg(long)]
    checkpoint_base: Option<PathBuf>,

    /// Override the epoch count.
    #[arg(long)]
    epochs: Option<usize>,

    /// Override the batch size.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Override the RNG seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Resume from the checkpoint saved after this epoch.
    #[arg(long)]
    resume_epoch: Option<usize>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => TrainConfig::from_file(path)?,
        None => TrainConfig::default(),
    };
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(checkpoint_base) = args.checkpoint_base {
        config.checkpoint_base = checkpoint_base;
    }
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }

    let device = Device::cuda_if_available(0).unwrap_or(Device::Cpu);
    info!(?device, epochs = config.epochs, "starting training");

    let mut trainer = Trainer::new(config, device)?;
    let start_epoch = match args.resume_epoch {
        Some(epoch) => trainer.resume(CheckpointTag::Epoch(epoch))?,
        None => 0,
    };
    let report = trainer.run_from(start_epoch)?;

    info!(
        final_loss = report.final_loss,
        epochs = report.epochs.len(),
        "training complete"
    );
    Ok(())
}
