//! AdamW with persistable moment state.
//!
//! The stock candle optimizer keeps its moments private, but checkpoints
//! here must carry the full optimizer state across restarts. This
//! implementation runs the same update (decoupled weight decay,
//! bias-corrected moments) against named parameters, with the moments
//! serializable as a safetensors table keyed by parameter name.

use std::collections::HashMap;
use std::path::Path;

use candle_core::backprop::GradStore;
use candle_core::{safetensors, Tensor, Var};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};

use curvetrace_core::{Error, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
    pub weight_decay: f64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-4,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
            weight_decay: 0.01,
        }
    }
}

struct Slot {
    m: Tensor,
    v: Tensor,
}

/// AdamW over every variable registered in a [`VarMap`].
pub struct AdamW {
    params: Vec<(String, Var)>,
    slots: HashMap<String, Slot>,
    step_t: usize,
    config: OptimizerConfig,
}

impl AdamW {
    pub fn new(varmap: &VarMap, config: OptimizerConfig) -> Result<Self> {
        let data = varmap.data().lock().unwrap();
        let mut params: Vec<(String, Var)> = data
            .iter()
            .map(|(name, var)| (name.clone(), var.clone()))
            .collect();
        drop(data);
        // Deterministic update order regardless of map iteration.
        params.sort_by(|a, b| a.0.cmp(&b.0));

        let mut slots = HashMap::with_capacity(params.len());
        for (name, var) in &params {
            let m = Tensor::zeros(var.shape(), var.dtype(), var.device())?;
            let v = Tensor::zeros(var.shape(), var.dtype(), var.device())?;
            slots.insert(name.clone(), Slot { m, v });
        }
        Ok(Self {
            params,
            slots,
            step_t: 0,
            config,
        })
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Optimizer steps taken so far.
    pub fn step_count(&self) -> usize {
        self.step_t
    }

    /// Restore the step counter when resuming from a checkpoint; bias
    /// correction depends on it.
    pub fn set_step_count(&mut self, steps: usize) {
        self.step_t = steps;
    }

    /// Apply one update from computed gradients. Parameters without a
    /// gradient are left untouched.
    pub fn step(&mut self, grads: &GradStore) -> Result<()> {
        self.step_t += 1;
        let c = &self.config;
        let t = self.step_t as f64;
        let bias1 = 1.0 - c.beta1.powf(t);
        let bias2 = 1.0 - c.beta2.powf(t);

        for (name, var) in &self.params {
            let Some(grad) = grads.get(var) else {
                continue;
            };
            let slot = self
                .slots
                .get_mut(name)
                .ok_or_else(|| Error::Training(format!("no moment slot for '{name}'")))?;

            let m = ((&slot.m * c.beta1)? + (grad * (1.0 - c.beta1))?)?;
            let v = ((&slot.v * c.beta2)? + (grad.sqr()? * (1.0 - c.beta2))?)?;
            let m_hat = (&m / bias1)?;
            let v_hat = (&v / bias2)?;
            let update = (m_hat / (v_hat.sqrt()? + c.eps)?)?;

            let mut next = (var.as_tensor() - (update * c.learning_rate)?)?;
            if c.weight_decay > 0.0 {
                next = (next - (var.as_tensor() * (c.learning_rate * c.weight_decay))?)?;
            }
            var.set(&next)?;
            slot.m = m;
            slot.v = v;
        }
        Ok(())
    }

    /// Serialize both moment tables to a safetensors file.
    pub fn save_state<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut tensors = HashMap::with_capacity(self.slots.len() * 2);
        for (name, slot) in &self.slots {
            tensors.insert(format!("{name}.m"), slot.m.clone());
            tensors.insert(format!("{name}.v"), slot.v.clone());
        }
        safetensors::save(&tensors, path.as_ref())?;
        Ok(())
    }

    /// Restore moments saved by [`AdamW::save_state`]. Every tracked
    /// parameter must be present, so a checkpoint from a different model
    /// cannot resume silently.
    pub fn load_state<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let Some((_, reference)) = self.params.first() else {
            return Ok(());
        };
        let device = reference.device().clone();
        let tensors = safetensors::load(path.as_ref(), &device)?;
        for (name, slot) in self.slots.iter_mut() {
            slot.m = lookup(&tensors, &format!("{name}.m"))?;
            slot.v = lookup(&tensors, &format!("{name}.v"))?;
        }
        Ok(())
    }
}

fn lookup(tensors: &HashMap<String, Tensor>, key: &str) -> Result<Tensor> {
    tensors
        .get(key)
        .cloned()
        .ok_or_else(|| Error::Checkpoint(format!("optimizer state missing '{key}'")))
}
