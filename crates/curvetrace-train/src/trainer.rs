//! Epoch-driven training loop with scheduled sampling and scaled
//! gradients.

use std::time::Instant;

use candle_core::{DType, Device, Var};
use candle_nn::{loss, VarBuilder, VarMap};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

use curvetrace_core::{Error, Result};
use curvetrace_data::{Batch, BatchLoader, Manifest, Preprocessor, StripDataset, StripSampler};
use curvetrace_model::CurveModel;

use crate::checkpoint::{self, CheckpointTag};
use crate::config::TrainConfig;
use crate::optim::AdamW;
use crate::scaler::GradScaler;

/// Per-epoch entry of the final report.
#[derive(Debug, Clone)]
pub struct EpochStats {
    pub epoch: usize,
    /// Batch-size-weighted mean MSE over the epoch.
    pub average_loss: f64,
    /// Teacher-forcing ratio the epoch ran under.
    pub teacher_forcing: f64,
    /// Optimizer steps skipped due to non-finite gradients.
    pub skipped_steps: usize,
}

/// Result of a full training run.
#[derive(Debug, Clone)]
pub struct TrainReport {
    pub epochs: Vec<EpochStats>,
    pub final_loss: f64,
}

struct StepOutcome {
    loss: f64,
    skipped: bool,
}

/// Owns the model, data and optimizer state for one training run.
pub struct Trainer {
    config: TrainConfig,
    varmap: VarMap,
    model: CurveModel,
    optimizer: AdamW,
    scaler: GradScaler,
    dataset: StripDataset,
    rng: StdRng,
}

impl std::fmt::Debug for Trainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trainer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Trainer {
    /// Build the dataset, model and optimizer for a fresh run.
    pub fn new(config: TrainConfig, device: Device) -> Result<Self> {
        config.validate()?;
        let manifest = Manifest::from_dir(&config.data_dir)?;
        if manifest.is_empty() {
            return Err(Error::Dataset(format!(
                "no training pairs under {}",
                config.data_dir.display()
            )));
        }
        info!(
            pairs = manifest.len(),
            strips = config.geometry.num_strips,
            "dataset located"
        );
        let sampler = StripSampler::new(config.geometry, config.model.points_per_strip);
        let preprocessor = Preprocessor::new(config.preprocess.clone(), device.clone());
        let dataset = StripDataset::new(manifest, sampler, preprocessor, config.num_points_full);

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = CurveModel::new(config.model.clone(), vb)?;
        let optimizer = AdamW::new(&varmap, config.optimizer.clone())?;
        let scaler = GradScaler::new(config.scaler.clone());
        let rng = StdRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            varmap,
            model,
            optimizer,
            scaler,
            dataset,
            rng,
        })
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// Restore weights, optimizer and scaler from a checkpoint; returns
    /// the epoch to continue from.
    pub fn resume(&mut self, tag: CheckpointTag) -> Result<usize> {
        let meta = checkpoint::load(
            &self.config.checkpoint_base,
            tag,
            &mut self.varmap,
            &mut self.optimizer,
            &mut self.scaler,
        )?;
        info!(
            epoch = meta.epoch,
            loss = meta.average_loss,
            "resumed from checkpoint"
        );
        Ok(meta.epoch + 1)
    }

    /// Run every configured epoch from the start.
    pub fn run(&mut self) -> Result<TrainReport> {
        self.run_from(0)
    }

    /// Run from `start_epoch` up to the configured epoch count,
    /// checkpointing periodically and once more at the end.
    pub fn run_from(&mut self, start_epoch: usize) -> Result<TrainReport> {
        if start_epoch >= self.config.epochs {
            return Err(Error::Training(format!(
                "start epoch {start_epoch} is past the configured {} epochs",
                self.config.epochs
            )));
        }
        let vars = self.varmap.all_vars();
        let mut epochs = Vec::with_capacity(self.config.epochs - start_epoch);

        for epoch in start_epoch..self.config.epochs {
            let ratio = self.config.schedule.ratio(epoch);
            let started = Instant::now();
            let loader = BatchLoader::new(&self.dataset, self.config.batch_size);
            let plan = loader.epoch(&mut self.rng);

            let mut loss_sum = 0f64;
            let mut items = 0usize;
            let mut skipped = 0usize;
            for indices in &plan {
                let batch = loader.load(indices)?;
                let outcome = train_step(
                    &self.model,
                    &mut self.optimizer,
                    &mut self.scaler,
                    &vars,
                    &mut self.rng,
                    &batch,
                    ratio,
                    self.config.max_grad_norm,
                )?;
                if outcome.loss.is_finite() {
                    loss_sum += outcome.loss * batch.len() as f64;
                    items += batch.len();
                }
                if outcome.skipped {
                    skipped += 1;
                }
            }

            let average_loss = loss_sum / items.max(1) as f64;
            info!(
                epoch,
                loss = average_loss,
                tf_ratio = ratio,
                skipped,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "epoch complete"
            );
            if (epoch + 1) % self.config.checkpoint_every == 0 {
                checkpoint::save(
                    &self.config.checkpoint_base,
                    CheckpointTag::Epoch(epoch),
                    &self.varmap,
                    &self.optimizer,
                    &self.scaler,
                    epoch,
                    average_loss,
                )?;
            }
            epochs.push(EpochStats {
                epoch,
                average_loss,
                teacher_forcing: ratio,
                skipped_steps: skipped,
            });
        }

        let (last_epoch, final_loss) = epochs
            .last()
            .map(|s| (s.epoch, s.average_loss))
            .unwrap_or((0, 0.0));
        checkpoint::save(
            &self.config.checkpoint_base,
            CheckpointTag::Final,
            &self.varmap,
            &self.optimizer,
            &self.scaler,
            last_epoch,
            final_loss,
        )?;
        Ok(TrainReport { epochs, final_loss })
    }
}

/// One batch forward/backward/step under the current schedule.
fn train_step(
    model: &CurveModel,
    optimizer: &mut AdamW,
    scaler: &mut GradScaler,
    vars: &[Var],
    rng: &mut StdRng,
    batch: &Batch,
    ratio: f64,
    max_grad_norm: f64,
) -> Result<StepOutcome> {
    let predictions = model.forward_train(&batch.pixels, &batch.first, &batch.rest, ratio, rng)?;
    let loss = loss::mse(&predictions, &batch.rest)?;
    let loss_value = loss.to_scalar::<f32>()? as f64;

    let scaled = scaler.scale_loss(&loss)?;
    let mut grads = scaled.backward()?;
    match scaler.unscale_and_clip(&mut grads, vars, max_grad_norm)? {
        Some(grad_norm) => {
            optimizer.step(&grads)?;
            scaler.update(false);
            debug!(loss = loss_value, grad_norm, "step");
            Ok(StepOutcome {
                loss: loss_value,
                skipped: false,
            })
        }
        None => {
            scaler.update(true);
            warn!(scale = scaler.scale(), "non-finite gradients, step skipped");
            Ok(StepOutcome {
                loss: loss_value,
                skipped: true,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_requires_data() {
        let dir = tempfile::tempdir().unwrap();
        let config = TrainConfig {
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let err = Trainer::new(config, Device::Cpu).unwrap_err();
        assert!(err.to_string().contains("no training pairs"));
    }

    #[test]
    fn test_run_from_rejects_finished_run() {
        // Validation happens before any data is touched.
        let config = TrainConfig {
            epochs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
