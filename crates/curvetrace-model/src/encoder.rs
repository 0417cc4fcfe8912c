//! Patch-transformer visual encoder.
//!
//! Encodes a strip crop into a sequence of per-patch feature vectors plus
//! a pooled global feature (mean over patches). The pooled feature seeds
//! the decoder's hidden state; the patch sequence feeds its attention.
//! Weights train jointly with the decoder, or come from a safetensors
//! export of a pretrained backbone with matching names.

use candle_core::{Module, Result, Tensor};
use candle_nn::{
    conv2d, layer_norm, linear, Conv2d, Conv2dConfig, LayerNorm, Linear, VarBuilder,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncoderConfig {
    /// Square input resolution fed by the preprocessor.
    pub resolution: usize,
    /// Patch edge length; `resolution` must be a multiple.
    pub patch_size: usize,
    /// Per-patch feature width.
    pub hidden_dim: usize,
    /// Number of transformer blocks.
    pub n_layers: usize,
    /// Attention heads per block.
    pub n_heads: usize,
    /// FFN expansion factor.
    pub mlp_ratio: usize,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            resolution: 224,
            patch_size: 16,
            hidden_dim: 192,
            n_layers: 4,
            n_heads: 4,
            mlp_ratio: 4,
        }
    }
}

impl EncoderConfig {
    /// Patch-sequence length for the configured tiling.
    pub fn seq_len(&self) -> usize {
        let per_side = self.resolution / self.patch_size;
        per_side * per_side
    }
}

/// Conv2d patch projection: `[B, 3, R, R] -> [B, L, D]`.
struct PatchEmbed {
    projection: Conv2d,
}

impl PatchEmbed {
    fn new(config: &EncoderConfig, vb: VarBuilder) -> Result<Self> {
        let conv_config = Conv2dConfig {
            stride: config.patch_size,
            ..Default::default()
        };
        let projection = conv2d(
            3,
            config.hidden_dim,
            config.patch_size,
            conv_config,
            vb.pp("projection"),
        )?;
        Ok(Self { projection })
    }

    fn forward(&self, pixels: &Tensor) -> Result<Tensor> {
        let embeddings = self.projection.forward(pixels)?;
        embeddings.flatten_from(2)?.transpose(1, 2)?.contiguous()
    }
}

/// Multi-head self-attention over the patch sequence.
struct PatchAttention {
    query: Linear,
    key: Linear,
    value: Linear,
    output: Linear,
    n_heads: usize,
    head_dim: usize,
}

impl PatchAttention {
    fn new(config: &EncoderConfig, vb: VarBuilder) -> Result<Self> {
        let dim = config.hidden_dim;
        Ok(Self {
            query: linear(dim, dim, vb.pp("query"))?,
            key: linear(dim, dim, vb.pp("key"))?,
            value: linear(dim, dim, vb.pp("value"))?,
            output: linear(dim, dim, vb.pp("output"))?,
            n_heads: config.n_heads,
            head_dim: dim / config.n_heads,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let (b, l, d) = x.dims3()?;

        let split = |t: Tensor| -> Result<Tensor> {
            t.reshape((b, l, self.n_heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()
        };
        let q = split(self.query.forward(x)?)?;
        let k = split(self.key.forward(x)?)?;
        let v = split(self.value.forward(x)?)?;

        let scale = (self.head_dim as f64).sqrt();
        let scores = (q.matmul(&k.transpose(2, 3)?.contiguous()?)? / scale)?;
        let weights = candle_nn::ops::softmax(&scores, 3)?;

        let context = weights
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((b, l, d))?;
        self.output.forward(&context)
    }
}

/// Attention + FFN block with residual connections, post-norm.
struct EncoderBlock {
    attention: PatchAttention,
    norm1: LayerNorm,
    norm2: LayerNorm,
    ffn_up: Linear,
    ffn_down: Linear,
}

impl EncoderBlock {
    fn new(config: &EncoderConfig, vb: VarBuilder) -> Result<Self> {
        let dim = config.hidden_dim;
        let ffn_dim = dim * config.mlp_ratio;
        Ok(Self {
            attention: PatchAttention::new(config, vb.pp("attention"))?,
            norm1: layer_norm(dim, 1e-5, vb.pp("norm1"))?,
            norm2: layer_norm(dim, 1e-5, vb.pp("norm2"))?,
            ffn_up: linear(dim, ffn_dim, vb.pp("ffn_up"))?,
            ffn_down: linear(ffn_dim, dim, vb.pp("ffn_down"))?,
        })
    }

    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let attended = self.attention.forward(x)?;
        let x = self.norm1.forward(&(x + attended)?)?;
        let ffn = self.ffn_down.forward(&self.ffn_up.forward(&x)?.gelu()?)?;
        self.norm2.forward(&(&x + ffn)?)
    }
}

/// The full patch encoder.
pub struct VisualEncoder {
    patch_embed: PatchEmbed,
    pos_embed: Tensor,
    blocks: Vec<EncoderBlock>,
    norm: LayerNorm,
    config: EncoderConfig,
}

impl VisualEncoder {
    pub fn new(config: EncoderConfig, vb: VarBuilder) -> Result<Self> {
        if config.resolution % config.patch_size != 0 {
            candle_core::bail!(
                "resolution {} is not a multiple of patch size {}",
                config.resolution,
                config.patch_size
            );
        }
        if config.hidden_dim % config.n_heads != 0 {
            candle_core::bail!(
                "hidden dim {} is not divisible by {} heads",
                config.hidden_dim,
                config.n_heads
            );
        }
        let patch_embed = PatchEmbed::new(&config, vb.pp("patch_embed"))?;
        let pos_embed = vb.get_with_hints(
            (1, config.seq_len(), config.hidden_dim),
            "pos_embed",
            candle_nn::Init::Randn {
                mean: 0.0,
                stdev: 0.02,
            },
        )?;
        let mut blocks = Vec::with_capacity(config.n_layers);
        for i in 0..config.n_layers {
            blocks.push(EncoderBlock::new(&config, vb.pp(format!("block_{i}")))?);
        }
        let norm = layer_norm(config.hidden_dim, 1e-5, vb.pp("norm"))?;
        Ok(Self {
            patch_embed,
            pos_embed,
            blocks,
            norm,
            config,
        })
    }

    pub fn config(&self) -> &EncoderConfig {
        &self.config
    }

    /// Per-patch feature sequence `[B, L, D]` plus the pooled global
    /// feature `[B, D]` (mean over patches).
    pub fn encode(&self, pixels: &Tensor) -> Result<(Tensor, Tensor)> {
        let mut x = self.patch_embed.forward(pixels)?;
        x = x.broadcast_add(&self.pos_embed)?;
        for block in &self.blocks {
            x = block.forward(&x)?;
        }
        let x = self.norm.forward(&x)?;
        let pooled = x.mean(1)?;
        Ok((x, pooled))
    }
}
