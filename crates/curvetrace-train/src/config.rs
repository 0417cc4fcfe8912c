//! Training-run configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use curvetrace_core::{Error, Result, StripGeometry};
use curvetrace_data::PreprocessConfig;
use curvetrace_model::ModelConfig;

use crate::optim::OptimizerConfig;
use crate::scaler::ScalerConfig;
use crate::schedule::TeacherForcingSchedule;

/// Everything a training run needs, from data layout to optimizer knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Directory of paired `*.png` / `*.csv` training files.
    pub data_dir: PathBuf,
    /// Checkpoint base path; files land as `{base}_epoch_{N}.*` and
    /// `{base}_final.*`.
    pub checkpoint_base: PathBuf,
    pub epochs: usize,
    pub batch_size: usize,
    /// Save a checkpoint every this many epochs.
    pub checkpoint_every: usize,
    pub seed: u64,
    /// Strip tiling of the wide inputs.
    pub geometry: StripGeometry,
    /// Required row count of every coordinate table.
    pub num_points_full: usize,
    pub max_grad_norm: f64,
    pub model: ModelConfig,
    pub preprocess: PreprocessConfig,
    pub optimizer: OptimizerConfig,
    pub scaler: ScalerConfig,
    pub schedule: TeacherForcingSchedule,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            checkpoint_base: PathBuf::from("checkpoints/curvetrace"),
            epochs: 30,
            batch_size: 16,
            checkpoint_every: 5,
            seed: 42,
            geometry: StripGeometry::default(),
            num_points_full: 300,
            max_grad_norm: 1.0,
            model: ModelConfig::default(),
            preprocess: PreprocessConfig::default(),
            optimizer: OptimizerConfig::default(),
            scaler: ScalerConfig::default(),
            schedule: TeacherForcingSchedule::default(),
        }
    }
}

impl TrainConfig {
    /// Load from a config file (TOML, JSON or YAML by extension), with
    /// `CURVETRACE_`-prefixed environment variables layered on top.
    pub fn from_file(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("CURVETRACE").separator("__"))
            .build()
            .map_err(|e| Error::Config(e.to_string()))?;
        let config: TrainConfig = settings
            .try_deserialize()
            .map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Cross-field sanity checks before a run starts.
    pub fn validate(&self) -> Result<()> {
        if self.epochs == 0 {
            return Err(Error::Config("epochs must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.checkpoint_every == 0 {
            return Err(Error::Config(
                "checkpoint_every must be at least 1".to_string(),
            ));
        }
        if self.model.points_per_strip < 2 {
            return Err(Error::Config(
                "points_per_strip must be at least 2".to_string(),
            ));
        }
        if self.geometry.num_strips == 0 {
            return Err(Error::Config("num_strips must be at least 1".to_string()));
        }
        if self.model.encoder.resolution != self.preprocess.resolution as usize {
            return Err(Error::Config(format!(
                "encoder resolution {} disagrees with preprocess resolution {}",
                self.model.encoder.resolution, self.preprocess.resolution
            )));
        }
        let schedule = &self.schedule;
        for ratio in [schedule.initial, schedule.final_ratio] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(Error::Config(format!(
                    "teacher-forcing ratio {ratio} outside [0, 1]"
                )));
            }
        }
        if schedule.final_ratio > schedule.initial {
            return Err(Error::Config(
                "teacher-forcing ratio must not grow over time".to_string(),
            ));
        }
        if self.max_grad_norm <= 0.0 {
            return Err(Error::Config("max_grad_norm must be positive".to_string()));
        }
        Ok(())
    }
}
