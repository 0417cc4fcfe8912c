//! The assembled strip-to-curve model.

use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::decoder::{DecoderConfig, SequenceDecoder, TeacherForcing};
use crate::encoder::{EncoderConfig, VisualEncoder};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub encoder: EncoderConfig,
    pub decoder: DecoderConfig,
    /// Fixed per-strip sequence length. The first point seeds the decoder,
    /// which then runs `points_per_strip - 1` steps.
    pub points_per_strip: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderConfig::default(),
            decoder: DecoderConfig::default(),
            points_per_strip: 100,
        }
    }
}

/// Encoder plus decoder under one variable namespace.
pub struct CurveModel {
    encoder: VisualEncoder,
    decoder: SequenceDecoder,
    config: ModelConfig,
}

impl CurveModel {
    pub fn new(config: ModelConfig, vb: VarBuilder) -> Result<Self> {
        if config.points_per_strip < 2 {
            candle_core::bail!(
                "points_per_strip must be at least 2, got {}",
                config.points_per_strip
            );
        }
        let encoder = VisualEncoder::new(config.encoder.clone(), vb.pp("encoder"))?;
        let decoder = SequenceDecoder::new(
            config.decoder.clone(),
            config.encoder.hidden_dim,
            vb.pp("decoder"),
        )?;
        Ok(Self {
            encoder,
            decoder,
            config,
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Decode steps per strip: one per supervised point.
    pub fn steps(&self) -> usize {
        self.config.points_per_strip - 1
    }

    /// Training forward pass under scheduled sampling; returns
    /// `[B, steps, 2]` aligned with `targets`.
    pub fn forward_train(
        &self,
        pixels: &Tensor,
        first: &Tensor,
        targets: &Tensor,
        ratio: f64,
        rng: &mut StdRng,
    ) -> Result<Tensor> {
        let (seq, pooled) = self.encoder.encode(pixels)?;
        self.decoder.forward(
            first,
            &seq,
            &pooled,
            self.steps(),
            Some(TeacherForcing {
                targets,
                ratio,
                rng,
            }),
        )
    }

    /// Inference pass: the decoder feeds on its own detached predictions.
    pub fn predict(&self, pixels: &Tensor, first: &Tensor) -> Result<Tensor> {
        let (seq, pooled) = self.encoder.encode(pixels)?;
        self.decoder.forward(first, &seq, &pooled, self.steps(), None)
    }
}
