//! Whole-graph inference: checkpoint in, stitched global curve out.

use std::path::Path;

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use tracing::info;

use curvetrace_core::{Point, Result, StripGeometry};
use curvetrace_data::{PreprocessConfig, Preprocessor, WideImage};

use crate::model::{CurveModel, ModelConfig};

/// Decoder seed for a strip with no known starting point: the strip-local
/// origin with y centered, matching the sparse-strip fill used in
/// training data.
pub const DEFAULT_SEED_POINT: Point = Point { x: 0.0, y: 0.5 };

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub model: ModelConfig,
    pub preprocess: PreprocessConfig,
    pub geometry: StripGeometry,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: ModelConfig::default(),
            preprocess: PreprocessConfig::default(),
            geometry: StripGeometry::default(),
        }
    }
}

/// Runs the trained model over every strip of a wide image and stitches
/// the strip-local outputs back into one global curve.
pub struct TraceEngine {
    model: CurveModel,
    preprocessor: Preprocessor,
    geometry: StripGeometry,
    device: Device,
}

impl TraceEngine {
    /// Fresh random weights; useful for tests and as the starting point
    /// of a training run.
    pub fn new_random(config: EngineConfig, device: Device) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = CurveModel::new(config.model.clone(), vb)?;
        Ok(Self::assemble(model, config, device))
    }

    /// Load trained weights from a safetensors checkpoint.
    pub fn load<P: AsRef<Path>>(path: P, config: EngineConfig, device: Device) -> Result<Self> {
        let vb =
            unsafe { VarBuilder::from_mmaped_safetensors(&[path.as_ref()], DType::F32, &device)? };
        let model = CurveModel::new(config.model.clone(), vb)?;
        info!(path = %path.as_ref().display(), "loaded model weights");
        Ok(Self::assemble(model, config, device))
    }

    fn assemble(model: CurveModel, config: EngineConfig, device: Device) -> Self {
        let preprocessor = Preprocessor::new(config.preprocess, device.clone());
        Self {
            model,
            preprocessor,
            geometry: config.geometry,
            device,
        }
    }

    pub fn geometry(&self) -> StripGeometry {
        self.geometry
    }

    /// Points produced per traced image.
    pub fn output_len(&self) -> usize {
        self.geometry.num_strips * self.model.config().points_per_strip
    }

    /// Trace the full curve of a wide image, strip by strip.
    ///
    /// Each strip is seeded with `seed` (the first local point), decoded
    /// to `points_per_strip - 1` further points, and mapped back to
    /// global x via `x = (x_local + i) / N`. The seed itself is included
    /// so every strip contributes exactly `points_per_strip` points.
    pub fn trace(&self, image: &WideImage, seed: Point) -> Result<Vec<Point>> {
        let n = self.geometry.num_strips;
        let mut curve = Vec::with_capacity(self.output_len());
        for index in 0..n {
            let crop = image.crop_strip(index);
            let pixels = self.preprocessor.encode(&crop)?.unsqueeze(0)?;
            let first = Tensor::from_vec(vec![seed.x, seed.y], (1, 2), &self.device)?;
            let predicted = self.model.predict(&pixels, &first)?;
            let rows = predicted.squeeze(0)?.to_vec2::<f32>()?;

            curve.push(to_global(seed, index, n));
            for row in rows {
                curve.push(to_global(Point::new(row[0], row[1]), index, n));
            }
        }
        Ok(curve)
    }

    /// Convenience wrapper: open, validate and trace an image file.
    pub fn trace_path(&self, path: &Path, seed: Point) -> Result<Vec<Point>> {
        let image = WideImage::open(path, self.geometry)?;
        self.trace(&image, seed)
    }
}

/// Map a strip-local point of strip `index` back to global coordinates.
fn to_global(p: Point, index: usize, num_strips: usize) -> Point {
    Point::new((p.x + index as f32) / num_strips as f32, p.y)
}
