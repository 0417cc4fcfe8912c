//! Synthetic training-pair generator.
//!
//! Writes paired `graph_NNNNN.png` / `graph_NNNNN.csv` files ready for the
//! training harness.

use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use curvetrace_core::StripGeometry;
use curvetrace_data::{GraphSynthesizer, SynthConfig, Waveform};

#[derive(Parser, Debug)]
#[command(name = "datagen", about = "Generate synthetic wide-graph training pairs")]
struct Args {
    /// Output directory for the image/CSV pairs.
    #[arg(long, default_value = "data")]
    out_dir: PathBuf,

    /// Number of pairs to generate.
    #[arg(long, default_value_t = 100)]
    count: usize,

    /// Curve family: "sine" or "driven".
    #[arg(long, default_value = "sine")]
    waveform: String,

    /// RNG seed.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Width of each strip in pixels.
    #[arg(long, default_value_t = 224)]
    strip_width: u32,

    /// Height of the raster in pixels.
    #[arg(long, default_value_t = 224)]
    strip_height: u32,

    /// Number of strips per wide image.
    #[arg(long, default_value_t = 3)]
    num_strips: usize,

    /// Rows per coordinate table.
    #[arg(long, default_value_t = 300)]
    num_points: usize,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let waveform = match args.waveform.as_str() {
        "sine" => Waveform::Sine,
        "driven" => Waveform::DrivenOscillation,
        other => bail!("unknown waveform '{other}' (expected \"sine\" or \"driven\")"),
    };

    let config = SynthConfig {
        geometry: StripGeometry::new(args.strip_width, args.strip_height, args.num_strips),
        num_points_full: args.num_points,
        waveform,
    };
    info!(?waveform, count = args.count, out = %args.out_dir.display(), "generating");

    let synth = GraphSynthesizer::new(config);
    let mut rng = StdRng::seed_from_u64(args.seed);
    synth.write_dataset(&args.out_dir, args.count, &mut rng)?;

    info!("done");
    Ok(())
}
