//! Pixel encoding for the visual encoder.

use candle_core::{Device, Tensor};
use image::imageops::FilterType;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use curvetrace_core::Result;

/// Numeric-input settings matched to the encoder backbone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Square edge length crops are resized to.
    pub resolution: u32,
    /// Per-channel normalization mean, applied after scaling to `[0, 1]`.
    pub mean: [f32; 3],
    /// Per-channel normalization standard deviation.
    pub std: [f32; 3],
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            resolution: 224,
            mean: [0.5, 0.5, 0.5],
            std: [0.5, 0.5, 0.5],
        }
    }
}

/// Turns cropped RGB rasters into fixed-shape model input.
pub struct Preprocessor {
    config: PreprocessConfig,
    device: Device,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig, device: Device) -> Self {
        Self { config, device }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Encode a crop as a `[3, R, R]` f32 tensor, scaled to `[0, 1]` then
    /// mean/std normalized per channel.
    pub fn encode(&self, crop: &RgbImage) -> Result<Tensor> {
        let r = self.config.resolution;
        let resized = if crop.dimensions() == (r, r) {
            crop.clone()
        } else {
            image::imageops::resize(crop, r, r, FilterType::Triangle)
        };
        let r = r as usize;
        let mut data = vec![0f32; 3 * r * r];
        for (c, plane) in data.chunks_exact_mut(r * r).enumerate() {
            let mean = self.config.mean[c];
            let std = self.config.std[c];
            for y in 0..r {
                for x in 0..r {
                    let value = resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
                    plane[y * r + x] = (value - mean) / std;
                }
            }
        }
        Ok(Tensor::from_vec(data, (3, r, r), &self.device)?)
    }
}
