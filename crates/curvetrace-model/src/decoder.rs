//! Autoregressive recurrent decoder with per-step additive attention.

use candle_core::{Module, Result, Tensor};
use candle_nn::{linear, Linear, VarBuilder};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::attention::AdditiveAttention;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecoderConfig {
    /// Coordinate dimensionality consumed and produced each step.
    pub input_dim: usize,
    /// LSTM hidden width.
    pub hidden_dim: usize,
    /// Stacked LSTM layers.
    pub n_layers: usize,
    /// Width of the additive-attention energy space.
    pub attention_dim: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            input_dim: 2,
            hidden_dim: 256,
            n_layers: 2,
            attention_dim: 128,
        }
    }
}

/// Where a decode step's next input coordinate comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepSource {
    /// The ground-truth point for this step.
    GroundTruth,
    /// The model's own prediction, detached from the gradient graph.
    Prediction,
}

impl StepSource {
    /// Draw a source at the given teacher-forcing ratio.
    pub fn draw(ratio: f64, rng: &mut StdRng) -> Self {
        if rng.gen::<f64>() < ratio {
            Self::GroundTruth
        } else {
            Self::Prediction
        }
    }
}

/// Scheduled-sampling context for one training pass.
pub struct TeacherForcing<'a> {
    /// Ground-truth remaining points, `[B, steps, 2]`.
    pub targets: &'a Tensor,
    /// Probability of feeding the ground-truth point at each step.
    pub ratio: f64,
    pub rng: &'a mut StdRng,
}

/// One LSTM layer assembled from gate projections, order i, f, g, o.
///
/// Built by hand because the decoder needs an externally supplied initial
/// hidden state on every layer of the stack.
struct LstmCell {
    input_gates: Linear,
    hidden_gates: Linear,
}

impl LstmCell {
    fn new(input_dim: usize, hidden_dim: usize, vb: VarBuilder) -> Result<Self> {
        Ok(Self {
            input_gates: linear(input_dim, 4 * hidden_dim, vb.pp("ih"))?,
            hidden_gates: linear(hidden_dim, 4 * hidden_dim, vb.pp("hh"))?,
        })
    }

    fn step(&self, input: &Tensor, h: &Tensor, c: &Tensor) -> Result<(Tensor, Tensor)> {
        let gates = (self.input_gates.forward(input)? + self.hidden_gates.forward(h)?)?;
        let chunks = gates.chunk(4, 1)?;
        let i = candle_nn::ops::sigmoid(&chunks[0])?;
        let f = candle_nn::ops::sigmoid(&chunks[1])?;
        let g = chunks[2].tanh()?;
        let o = candle_nn::ops::sigmoid(&chunks[3])?;
        let c_next = ((&f * c)? + (&i * &g)?)?;
        let h_next = (&o * c_next.tanh()?)?;
        Ok((h_next, c_next))
    }
}

/// Emits a fixed-length sequence of strip-local points.
///
/// The initial hidden state of every LSTM layer is a learned projection
/// of the encoder's pooled feature. Each step attends over the patch
/// sequence with the top layer's hidden state, concatenates hidden state
/// and context, and projects to a coordinate pair.
pub struct SequenceDecoder {
    cells: Vec<LstmCell>,
    init_hidden: Linear,
    attention: AdditiveAttention,
    output: Linear,
    config: DecoderConfig,
}

impl SequenceDecoder {
    pub fn new(config: DecoderConfig, encoder_dim: usize, vb: VarBuilder) -> Result<Self> {
        let mut cells = Vec::with_capacity(config.n_layers);
        for i in 0..config.n_layers {
            let input_dim = if i == 0 {
                config.input_dim
            } else {
                config.hidden_dim
            };
            cells.push(LstmCell::new(
                input_dim,
                config.hidden_dim,
                vb.pp(format!("lstm_{i}")),
            )?);
        }
        let init_hidden = linear(encoder_dim, config.hidden_dim, vb.pp("init_hidden"))?;
        let attention = AdditiveAttention::new(
            config.hidden_dim,
            encoder_dim,
            config.attention_dim,
            vb.pp("attention"),
        )?;
        let output = linear(
            config.hidden_dim + encoder_dim,
            config.input_dim,
            vb.pp("output"),
        )?;
        Ok(Self {
            cells,
            init_hidden,
            attention,
            output,
            config,
        })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    /// Decode exactly `steps` points starting from the seed `first`
    /// `[B, 2]`; returns `[B, steps, 2]`.
    ///
    /// With `teacher` supplied, each step's next input is drawn between
    /// the ground-truth point and the detached prediction at the given
    /// ratio. Without it, the detached prediction always feeds forward,
    /// which is the inference path.
    pub fn forward(
        &self,
        first: &Tensor,
        encoder_seq: &Tensor,
        pooled: &Tensor,
        steps: usize,
        mut teacher: Option<TeacherForcing<'_>>,
    ) -> Result<Tensor> {
        let h0 = self.init_hidden.forward(pooled)?;
        let c0 = h0.zeros_like()?;
        let mut hidden: Vec<Tensor> = vec![h0; self.cells.len()];
        let mut cell: Vec<Tensor> = vec![c0; self.cells.len()];

        let mut input = first.clone();
        let mut outputs = Vec::with_capacity(steps);
        for t in 0..steps {
            let mut layer_in = input.clone();
            for (i, lstm) in self.cells.iter().enumerate() {
                let (h, c) = lstm.step(&layer_in, &hidden[i], &cell[i])?;
                layer_in = h.clone();
                hidden[i] = h;
                cell[i] = c;
            }
            let top = &hidden[self.cells.len() - 1];
            let (context, _) = self.attention.forward(top, encoder_seq)?;
            let joined = Tensor::cat(&[top, &context], 1)?;
            let prediction = self.output.forward(&joined)?;

            if t + 1 < steps {
                input = next_input(&prediction, t, teacher.as_mut())?;
            }
            outputs.push(prediction);
        }
        Tensor::stack(&outputs, 1)
    }
}

fn next_input(
    prediction: &Tensor,
    step: usize,
    teacher: Option<&mut TeacherForcing<'_>>,
) -> Result<Tensor> {
    match teacher {
        Some(tf) => match StepSource::draw(tf.ratio, tf.rng) {
            StepSource::GroundTruth => tf.targets.narrow(1, step, 1)?.squeeze(1),
            StepSource::Prediction => Ok(prediction.detach()),
        },
        None => Ok(prediction.detach()),
    }
}
