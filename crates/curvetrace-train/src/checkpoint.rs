//! Checkpoint persistence.
//!
//! A checkpoint is three sibling files sharing a base name: model weights
//! (`.safetensors`), optimizer moments (`.optim.safetensors`) and a JSON
//! sidecar with the epoch, loss, step count, scaler state and timestamp.
//! The weights file alone is what the inference engine loads.

use std::fs;
use std::path::{Path, PathBuf};

use candle_nn::VarMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use curvetrace_core::Result;

use crate::optim::AdamW;
use crate::scaler::{GradScaler, ScalerState};

/// Sidecar metadata stored with every checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub epoch: usize,
    pub average_loss: f64,
    pub optimizer_steps: usize,
    pub scaler: ScalerState,
    pub saved_at: DateTime<Utc>,
}

/// Which checkpoint of a run a file name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointTag {
    Epoch(usize),
    Final,
}

impl CheckpointTag {
    fn suffix(&self) -> String {
        match self {
            Self::Epoch(n) => format!("epoch_{n}"),
            Self::Final => "final".to_string(),
        }
    }
}

/// The three file paths of one checkpoint.
#[derive(Debug, Clone)]
pub struct CheckpointPaths {
    pub weights: PathBuf,
    pub optimizer: PathBuf,
    pub meta: PathBuf,
}

pub fn checkpoint_paths(base: &Path, tag: CheckpointTag) -> CheckpointPaths {
    let stem = format!("{}_{}", base.display(), tag.suffix());
    CheckpointPaths {
        weights: PathBuf::from(format!("{stem}.safetensors")),
        optimizer: PathBuf::from(format!("{stem}.optim.safetensors")),
        meta: PathBuf::from(format!("{stem}.json")),
    }
}

/// Write all three checkpoint files. Any failure is fatal to the run.
pub fn save(
    base: &Path,
    tag: CheckpointTag,
    varmap: &VarMap,
    optimizer: &AdamW,
    scaler: &GradScaler,
    epoch: usize,
    average_loss: f64,
) -> Result<CheckpointPaths> {
    if let Some(parent) = base.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let paths = checkpoint_paths(base, tag);
    varmap.save(&paths.weights)?;
    optimizer.save_state(&paths.optimizer)?;
    let meta = CheckpointMeta {
        epoch,
        average_loss,
        optimizer_steps: optimizer.step_count(),
        scaler: scaler.state(),
        saved_at: Utc::now(),
    };
    fs::write(&paths.meta, serde_json::to_string_pretty(&meta)?)?;
    info!(weights = %paths.weights.display(), epoch, "checkpoint written");
    Ok(paths)
}

/// Restore weights, optimizer moments and scaler state for resuming.
///
/// The varmap must already hold variables with the same names and shapes,
/// which is the case once the model has been constructed against it.
pub fn load(
    base: &Path,
    tag: CheckpointTag,
    varmap: &mut VarMap,
    optimizer: &mut AdamW,
    scaler: &mut GradScaler,
) -> Result<CheckpointMeta> {
    let paths = checkpoint_paths(base, tag);
    varmap.load(&paths.weights)?;
    optimizer.load_state(&paths.optimizer)?;
    let meta: CheckpointMeta = serde_json::from_str(&fs::read_to_string(&paths.meta)?)?;
    optimizer.set_step_count(meta.optimizer_steps);
    scaler.restore(meta.scaler);
    Ok(meta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optim::OptimizerConfig;
    use crate::scaler::ScalerConfig;
    use candle_core::{DType, Device};
    use candle_nn::{Init, VarBuilder};

    fn seeded_varmap(value: f64) -> VarMap {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        vb.get_with_hints((2, 2), "layer.weight", Init::Const(value))
            .unwrap();
        varmap
    }

    #[test]
    fn test_path_scheme() {
        let paths = checkpoint_paths(Path::new("out/run"), CheckpointTag::Epoch(7));
        assert_eq!(paths.weights, PathBuf::from("out/run_epoch_7.safetensors"));
        assert_eq!(
            paths.optimizer,
            PathBuf::from("out/run_epoch_7.optim.safetensors")
        );
        assert_eq!(paths.meta, PathBuf::from("out/run_epoch_7.json"));

        let finals = checkpoint_paths(Path::new("out/run"), CheckpointTag::Final);
        assert_eq!(finals.weights, PathBuf::from("out/run_final.safetensors"));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("run");

        let varmap = seeded_varmap(4.25);
        let optimizer = AdamW::new(&varmap, OptimizerConfig::default()).unwrap();
        let mut scaler = GradScaler::new(ScalerConfig::default());
        scaler.update(true);

        let paths = save(
            &base,
            CheckpointTag::Epoch(2),
            &varmap,
            &optimizer,
            &scaler,
            2,
            0.125,
        )
        .unwrap();
        assert!(paths.weights.exists());
        assert!(paths.optimizer.exists());
        assert!(paths.meta.exists());

        // Same structure, different values; load must overwrite them.
        let mut varmap2 = seeded_varmap(0.0);
        let mut optimizer2 = AdamW::new(&varmap2, OptimizerConfig::default()).unwrap();
        let mut scaler2 = GradScaler::new(ScalerConfig::default());
        let meta = load(
            &base,
            CheckpointTag::Epoch(2),
            &mut varmap2,
            &mut optimizer2,
            &mut scaler2,
        )
        .unwrap();

        assert_eq!(meta.epoch, 2);
        assert_eq!(meta.average_loss, 0.125);
        assert_eq!(scaler2.state(), scaler.state());
        let restored = varmap2.all_vars()[0].to_vec2::<f32>().unwrap();
        assert_eq!(restored, vec![vec![4.25, 4.25], vec![4.25, 4.25]]);
    }

    #[test]
    fn test_missing_checkpoint_fails() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("run");
        let mut varmap = seeded_varmap(1.0);
        let mut optimizer = AdamW::new(&varmap, OptimizerConfig::default()).unwrap();
        let mut scaler = GradScaler::new(ScalerConfig::default());
        assert!(load(
            &base,
            CheckpointTag::Final,
            &mut varmap,
            &mut optimizer,
            &mut scaler
        )
        .is_err());
    }
}
