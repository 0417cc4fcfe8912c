//! Dynamic loss scaling with fused unscale and gradient clipping.
//!
//! Mixed-precision training multiplies the loss by a large scale factor
//! before backward so small gradients survive reduced precision, then
//! divides the gradients back out before the optimizer sees them. The
//! scale adapts: halve on non-finite gradients (and skip that step), grow
//! after a streak of clean steps.

use candle_core::backprop::GradStore;
use candle_core::{Tensor, Var};
use serde::{Deserialize, Serialize};

use curvetrace_core::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalerConfig {
    pub init_scale: f64,
    pub growth_factor: f64,
    pub backoff_factor: f64,
    /// Clean steps required before the scale grows.
    pub growth_interval: usize,
}

impl Default for ScalerConfig {
    fn default() -> Self {
        Self {
            init_scale: 65536.0,
            growth_factor: 2.0,
            backoff_factor: 0.5,
            growth_interval: 2000,
        }
    }
}

/// The serializable part of the scaler, carried in checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerState {
    pub scale: f64,
    pub growth_counter: usize,
}

pub struct GradScaler {
    config: ScalerConfig,
    scale: f64,
    growth_counter: usize,
}

impl GradScaler {
    pub fn new(config: ScalerConfig) -> Self {
        let scale = config.init_scale;
        Self {
            config,
            scale,
            growth_counter: 0,
        }
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// Scale the loss before calling backward on it.
    pub fn scale_loss(&self, loss: &Tensor) -> Result<Tensor> {
        Ok((loss * self.scale)?)
    }

    /// Unscale every gradient in place, then clip the global L2 norm to
    /// `max_norm`. Returns the pre-clip norm, or `None` when any gradient
    /// is non-finite, in which case the step must be skipped.
    pub fn unscale_and_clip(
        &self,
        grads: &mut GradStore,
        vars: &[Var],
        max_norm: f64,
    ) -> Result<Option<f64>> {
        let inv = 1.0 / self.scale;
        let mut sq_sum = 0f64;
        for var in vars {
            let Some(grad) = grads.remove(var) else {
                continue;
            };
            let grad = (grad * inv)?;
            let sq: f32 = grad.sqr()?.sum_all()?.to_scalar()?;
            sq_sum += sq as f64;
            grads.insert(var, grad);
        }
        if !sq_sum.is_finite() {
            return Ok(None);
        }
        let norm = sq_sum.sqrt();
        if norm > max_norm {
            let factor = max_norm / norm;
            for var in vars {
                let Some(grad) = grads.remove(var) else {
                    continue;
                };
                grads.insert(var, (grad * factor)?);
            }
        }
        Ok(Some(norm))
    }

    /// Advance the scale after a step attempt.
    pub fn update(&mut self, found_non_finite: bool) {
        if found_non_finite {
            self.scale = (self.scale * self.config.backoff_factor).max(1.0);
            self.growth_counter = 0;
        } else {
            self.growth_counter += 1;
            if self.growth_counter >= self.config.growth_interval {
                self.scale *= self.config.growth_factor;
                self.growth_counter = 0;
            }
        }
    }

    pub fn state(&self) -> ScalerState {
        ScalerState {
            scale: self.scale,
            growth_counter: self.growth_counter,
        }
    }

    pub fn restore(&mut self, state: ScalerState) {
        self.scale = state.scale;
        self.growth_counter = state.growth_counter;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use candle_core::{Device, Var};

    fn scalar_var(value: f32) -> Var {
        Var::from_tensor(&Tensor::full(value, (1,), &Device::Cpu).unwrap()).unwrap()
    }

    fn grads_for(var: &Var) -> GradStore {
        let loss = var.as_tensor().sqr().unwrap().sum_all().unwrap();
        loss.backward().unwrap()
    }

    #[test]
    fn test_scale_loss_multiplies() {
        let scaler = GradScaler::new(ScalerConfig {
            init_scale: 8.0,
            ..Default::default()
        });
        let loss = Tensor::full(2.0f32, (), &Device::Cpu).unwrap();
        let scaled = scaler.scale_loss(&loss).unwrap();
        assert_relative_eq!(scaled.to_scalar::<f32>().unwrap(), 16.0);
    }

    #[test]
    fn test_unscale_recovers_gradient() {
        let scaler = GradScaler::new(ScalerConfig {
            init_scale: 4.0,
            ..Default::default()
        });
        let var = scalar_var(3.0);
        // d/dw of 4 * w^2 at w=3 is 24; unscaling brings it back to 6.
        let loss = var.as_tensor().sqr().unwrap().sum_all().unwrap();
        let scaled = scaler.scale_loss(&loss).unwrap();
        let mut grads = scaled.backward().unwrap();
        let norm = scaler
            .unscale_and_clip(&mut grads, &[var.clone()], 1e9)
            .unwrap()
            .unwrap();
        assert_relative_eq!(norm, 6.0, epsilon = 1e-4);
        let grad = grads.get(&var).unwrap().to_vec1::<f32>().unwrap()[0];
        assert_relative_eq!(grad, 6.0, epsilon = 1e-4);
    }

    #[test]
    fn test_clip_bounds_norm() {
        let scaler = GradScaler::new(ScalerConfig {
            init_scale: 1.0,
            ..Default::default()
        });
        let var = scalar_var(50.0);
        let mut grads = grads_for(&var);
        // Pre-clip norm is 100.
        let norm = scaler
            .unscale_and_clip(&mut grads, &[var.clone()], 1.0)
            .unwrap()
            .unwrap();
        assert_relative_eq!(norm, 100.0, epsilon = 1e-3);
        let grad = grads.get(&var).unwrap().to_vec1::<f32>().unwrap()[0];
        assert_relative_eq!(grad, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_small_norm_untouched() {
        let scaler = GradScaler::new(ScalerConfig {
            init_scale: 1.0,
            ..Default::default()
        });
        let var = scalar_var(0.25);
        let mut grads = grads_for(&var);
        let norm = scaler
            .unscale_and_clip(&mut grads, &[var.clone()], 1.0)
            .unwrap()
            .unwrap();
        assert_relative_eq!(norm, 0.5, epsilon = 1e-5);
        let grad = grads.get(&var).unwrap().to_vec1::<f32>().unwrap()[0];
        assert_relative_eq!(grad, 0.5, epsilon = 1e-5);
    }

    #[test]
    fn test_non_finite_reported_and_backed_off() {
        let mut scaler = GradScaler::new(ScalerConfig {
            init_scale: 1024.0,
            ..Default::default()
        });
        // (w^2)^2 at w = 1e30 overflows f32 in the gradient.
        let var = scalar_var(1e30);
        let loss = var
            .as_tensor()
            .sqr()
            .unwrap()
            .sqr()
            .unwrap()
            .sum_all()
            .unwrap();
        let mut grads = loss.backward().unwrap();
        let outcome = scaler
            .unscale_and_clip(&mut grads, &[var.clone()], 1.0)
            .unwrap();
        assert!(outcome.is_none());
        scaler.update(true);
        assert_relative_eq!(scaler.scale(), 512.0);
    }

    #[test]
    fn test_growth_after_interval() {
        let mut scaler = GradScaler::new(ScalerConfig {
            init_scale: 2.0,
            growth_interval: 3,
            ..Default::default()
        });
        scaler.update(false);
        scaler.update(false);
        assert_relative_eq!(scaler.scale(), 2.0);
        scaler.update(false);
        assert_relative_eq!(scaler.scale(), 4.0);
    }

    #[test]
    fn test_state_roundtrip() {
        let mut scaler = GradScaler::new(ScalerConfig::default());
        scaler.update(true);
        scaler.update(false);
        let state = scaler.state();

        let mut other = GradScaler::new(ScalerConfig::default());
        other.restore(state);
        assert_eq!(other.state(), state);
        assert_relative_eq!(other.scale(), 32768.0);
    }
}
