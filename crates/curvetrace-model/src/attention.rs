//! Additive attention over the encoder's patch sequence.

use candle_core::{Module, Result, Tensor};
use candle_nn::{linear, linear_no_bias, Linear, VarBuilder};

/// Bahdanau-style additive attention.
///
/// Energies come from a tanh projection of the concatenated decoder state
/// and encoder position; a softmax over positions yields the weights, and
/// the context is the weighted sum of encoder features. Scores stay
/// bounded because the energy passes through tanh before the final
/// projection.
pub struct AdditiveAttention {
    energy: Linear,
    score: Linear,
}

impl AdditiveAttention {
    pub fn new(
        decoder_dim: usize,
        encoder_dim: usize,
        attention_dim: usize,
        vb: VarBuilder,
    ) -> Result<Self> {
        let energy = linear(decoder_dim + encoder_dim, attention_dim, vb.pp("energy"))?;
        let score = linear_no_bias(attention_dim, 1, vb.pp("score"))?;
        Ok(Self { energy, score })
    }

    /// Attend one decoder state `[B, Hd]` over the full encoder sequence
    /// `[B, L, He]`; returns the context `[B, He]` and weights `[B, L]`.
    pub fn forward(&self, decoder_state: &Tensor, encoder_seq: &Tensor) -> Result<(Tensor, Tensor)> {
        let (_, seq_len, _) = encoder_seq.dims3()?;
        let state = decoder_state.unsqueeze(1)?.repeat((1, seq_len, 1))?;
        let joined = Tensor::cat(&[&state, encoder_seq], 2)?;
        let energy = self.energy.forward(&joined)?.tanh()?;
        let scores = self.score.forward(&energy)?.squeeze(2)?;
        let weights = candle_nn::ops::softmax(&scores, 1)?;
        let context = weights
            .unsqueeze(1)?
            .matmul(&encoder_seq.contiguous()?)?
            .squeeze(1)?;
        Ok((context, weights))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn build(decoder_dim: usize, encoder_dim: usize) -> AdditiveAttention {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        AdditiveAttention::new(decoder_dim, encoder_dim, 16, vb).unwrap()
    }

    #[test]
    fn test_output_shapes() {
        let attention = build(8, 12);
        let device = Device::Cpu;
        let state = Tensor::randn(0f32, 1f32, (3, 8), &device).unwrap();
        let seq = Tensor::randn(0f32, 1f32, (3, 5, 12), &device).unwrap();
        let (context, weights) = attention.forward(&state, &seq).unwrap();
        assert_eq!(context.dims(), &[3, 12]);
        assert_eq!(weights.dims(), &[3, 5]);
    }

    #[test]
    fn test_weights_sum_to_one() {
        let attention = build(8, 12);
        let device = Device::Cpu;
        let state = Tensor::randn(0f32, 1f32, (4, 8), &device).unwrap();
        let seq = Tensor::randn(0f32, 1f32, (4, 7, 12), &device).unwrap();
        let (_, weights) = attention.forward(&state, &seq).unwrap();
        let sums = weights.sum(1).unwrap().to_vec1::<f32>().unwrap();
        for s in sums {
            assert!((s - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_constant_sequence_returns_itself() {
        let attention = build(4, 6);
        let device = Device::Cpu;
        let state = Tensor::randn(0f32, 1f32, (1, 4), &device).unwrap();
        // Every position holds the same vector, so any convex combination
        // must reproduce it.
        let row = Tensor::full(0.37f32, (1, 1, 6), &device).unwrap();
        let seq = row.repeat((1, 9, 1)).unwrap();
        let (context, _) = attention.forward(&state, &seq).unwrap();
        let values = context.to_vec2::<f32>().unwrap();
        for v in &values[0] {
            assert!((v - 0.37).abs() < 1e-5);
        }
    }
}
