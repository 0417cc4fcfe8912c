//! End-to-end training-loop test on a tiny synthetic dataset.

use candle_core::Device;
use rand::rngs::StdRng;
use rand::SeedableRng;

use curvetrace_core::StripGeometry;
use curvetrace_data::{GraphSynthesizer, PreprocessConfig, SynthConfig, Waveform, WideImage};
use curvetrace_model::{
    DecoderConfig, EncoderConfig, EngineConfig, ModelConfig, TraceEngine, DEFAULT_SEED_POINT,
};
use curvetrace_train::{CheckpointTag, TrainConfig, Trainer};

fn tiny_config(data_dir: &std::path::Path, checkpoint_dir: &std::path::Path) -> TrainConfig {
    TrainConfig {
        data_dir: data_dir.to_path_buf(),
        checkpoint_base: checkpoint_dir.join("run"),
        epochs: 2,
        batch_size: 4,
        checkpoint_every: 1,
        seed: 7,
        geometry: StripGeometry::new(16, 16, 2),
        num_points_full: 40,
        max_grad_norm: 1.0,
        model: ModelConfig {
            encoder: EncoderConfig {
                resolution: 32,
                patch_size: 16,
                hidden_dim: 32,
                n_layers: 1,
                n_heads: 4,
                mlp_ratio: 2,
            },
            decoder: DecoderConfig {
                input_dim: 2,
                hidden_dim: 16,
                n_layers: 2,
                attention_dim: 8,
            },
            points_per_strip: 5,
        },
        preprocess: PreprocessConfig {
            resolution: 32,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn write_pairs(dir: &std::path::Path, count: usize) {
    let synth = GraphSynthesizer::new(SynthConfig {
        geometry: StripGeometry::new(16, 16, 2),
        num_points_full: 40,
        waveform: Waveform::Sine,
    });
    let mut rng = StdRng::seed_from_u64(99);
    synth.write_dataset(dir, count, &mut rng).unwrap();
}

#[test]
fn test_training_writes_checkpoints_and_engine_loads_them() {
    let data_dir = tempfile::tempdir().unwrap();
    let checkpoint_dir = tempfile::tempdir().unwrap();
    write_pairs(data_dir.path(), 4);

    let config = tiny_config(data_dir.path(), checkpoint_dir.path());
    let mut trainer = Trainer::new(config.clone(), Device::Cpu).unwrap();
    let report = trainer.run().unwrap();

    assert_eq!(report.epochs.len(), 2);
    assert!(report.final_loss.is_finite());
    for stats in &report.epochs {
        assert!(stats.average_loss.is_finite());
    }
    // Ratio follows the default schedule: 0.9 at epoch 0, then decaying.
    assert!(report.epochs[0].teacher_forcing >= report.epochs[1].teacher_forcing);

    // checkpoint_every = 1 means one triple per epoch plus the final one.
    let base = checkpoint_dir.path().join("run");
    for suffix in ["epoch_0", "epoch_1", "final"] {
        for ext in ["safetensors", "optim.safetensors", "json"] {
            let path = checkpoint_dir.path().join(format!("run_{suffix}.{ext}"));
            assert!(path.exists(), "missing {}", path.display());
        }
    }

    // The final weights load straight into the inference engine.
    let engine = TraceEngine::load(
        base.with_file_name("run_final.safetensors"),
        EngineConfig {
            model: config.model.clone(),
            preprocess: config.preprocess.clone(),
            geometry: config.geometry,
        },
        Device::Cpu,
    )
    .unwrap();
    let image = WideImage::new(image::RgbImage::new(32, 16), config.geometry).unwrap();
    let curve = engine.trace(&image, DEFAULT_SEED_POINT).unwrap();
    assert_eq!(curve.len(), 10);
    assert!(curve.iter().all(|p| p.x.is_finite() && p.y.is_finite()));
}

#[test]
fn test_resume_restores_progress() {
    let data_dir = tempfile::tempdir().unwrap();
    let checkpoint_dir = tempfile::tempdir().unwrap();
    write_pairs(data_dir.path(), 4);

    let mut config = tiny_config(data_dir.path(), checkpoint_dir.path());
    config.epochs = 3;
    let mut trainer = Trainer::new(config.clone(), Device::Cpu).unwrap();
    trainer.run().unwrap();

    // A fresh trainer picks up after the last periodic checkpoint.
    let mut resumed = Trainer::new(config, Device::Cpu).unwrap();
    let next_epoch = resumed.resume(CheckpointTag::Epoch(1)).unwrap();
    assert_eq!(next_epoch, 2);
    let report = resumed.run_from(next_epoch).unwrap();
    assert_eq!(report.epochs.len(), 1);
    assert_eq!(report.epochs[0].epoch, 2);
}
