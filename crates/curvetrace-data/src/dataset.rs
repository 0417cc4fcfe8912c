//! Flat (image x strip) datasets over manifest-paired files.

use std::collections::HashMap;
use std::sync::Arc;

use candle_core::Tensor;
use parking_lot::Mutex;

use curvetrace_core::{Error, Result};

use crate::manifest::Manifest;
use crate::preprocess::Preprocessor;
use crate::strip::StripSampler;
use crate::table::CoordinateTable;
use crate::wide::WideImage;

/// How many decoded wide images stay resident. Each image serves
/// `num_strips` samples, so a small cap already absorbs the common case
/// of consecutive indices landing on the same image.
const IMAGE_CACHE_CAP: usize = 8;

/// One training item.
pub struct StripSample {
    /// Encoded strip pixels, `[3, R, R]`.
    pub pixels: Tensor,
    /// The strip's first resampled point, `[2]`; seeds the decoder.
    pub first: Tensor,
    /// The remaining points, `[points_per_strip - 1, 2]`; supervision
    /// targets for every decode step.
    pub rest: Tensor,
}

struct GraphRecord {
    image: WideImage,
    table: CoordinateTable,
}

/// Lazily loaded dataset with one logical item per (image, strip) pair.
///
/// Item `k` maps to image `k / num_strips`, strip `k % num_strips`, so
/// consecutive indices walk the strips of one image before moving on.
/// Decoded images are shared across threads through an internal cache.
pub struct StripDataset {
    manifest: Manifest,
    sampler: StripSampler,
    preprocessor: Preprocessor,
    num_points_full: usize,
    cache: Mutex<HashMap<usize, Arc<GraphRecord>>>,
}

impl StripDataset {
    pub fn new(
        manifest: Manifest,
        sampler: StripSampler,
        preprocessor: Preprocessor,
        num_points_full: usize,
    ) -> Self {
        Self {
            manifest,
            sampler,
            preprocessor,
            num_points_full,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Total logical items: one per (image, strip).
    pub fn len(&self) -> usize {
        self.manifest.len() * self.num_strips()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn points_per_strip(&self) -> usize {
        self.sampler.points_per_strip()
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    fn num_strips(&self) -> usize {
        self.sampler.geometry().num_strips
    }

    /// Load, sample and encode item `index`.
    pub fn get(&self, index: usize) -> Result<StripSample> {
        let strips = self.num_strips();
        let image_index = index / strips;
        let strip_index = index % strips;
        if image_index >= self.manifest.len() {
            return Err(Error::Dataset(format!(
                "index {index} out of range for {} items",
                self.len()
            )));
        }
        let record = self.load_record(image_index)?;
        let (crop, points) = self.sampler.sample(&record.image, &record.table, strip_index)?;
        if points.len() < 2 {
            return Err(Error::Dataset(
                "strips must hold at least two points to supervise a decode step".to_string(),
            ));
        }
        let pixels = self.preprocessor.encode(&crop)?;
        let device = self.preprocessor.device();

        let first = Tensor::from_vec(vec![points[0].x, points[0].y], (2,), device)?;
        let mut rest = Vec::with_capacity((points.len() - 1) * 2);
        for p in &points[1..] {
            rest.push(p.x);
            rest.push(p.y);
        }
        let rest = Tensor::from_vec(rest, (points.len() - 1, 2), device)?;
        Ok(StripSample {
            pixels,
            first,
            rest,
        })
    }

    fn load_record(&self, image_index: usize) -> Result<Arc<GraphRecord>> {
        if let Some(record) = self.cache.lock().get(&image_index) {
            return Ok(record.clone());
        }
        let entry = self
            .manifest
            .get(image_index)
            .ok_or_else(|| Error::Dataset(format!("no manifest entry {image_index}")))?;
        let image = WideImage::open(&entry.image, self.sampler.geometry())?;
        let table = CoordinateTable::from_path(&entry.coords)?;
        table.expect_rows(self.num_points_full)?;
        let record = Arc::new(GraphRecord { image, table });

        let mut cache = self.cache.lock();
        if cache.len() >= IMAGE_CACHE_CAP {
            cache.clear();
        }
        cache.insert(image_index, record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::PreprocessConfig;
    use crate::synth::{GraphSynthesizer, SynthConfig, Waveform};
    use candle_core::Device;
    use curvetrace_core::StripGeometry;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn build_dataset(dir: &std::path::Path) -> StripDataset {
        let geometry = StripGeometry::new(16, 16, 2);
        let synth = GraphSynthesizer::new(SynthConfig {
            geometry,
            num_points_full: 40,
            waveform: Waveform::Sine,
        });
        let mut rng = StdRng::seed_from_u64(21);
        synth.write_dataset(dir, 3, &mut rng).unwrap();

        let manifest = Manifest::from_dir(dir).unwrap();
        let sampler = StripSampler::new(geometry, 10);
        let preprocessor = Preprocessor::new(
            PreprocessConfig {
                resolution: 16,
                ..Default::default()
            },
            Device::Cpu,
        );
        StripDataset::new(manifest, sampler, preprocessor, 40)
    }

    #[test]
    fn test_len_counts_strips() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = build_dataset(dir.path());
        assert_eq!(dataset.len(), 6);
    }

    #[test]
    fn test_get_shapes() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = build_dataset(dir.path());
        let sample = dataset.get(0).unwrap();
        assert_eq!(sample.pixels.dims(), &[3, 16, 16]);
        assert_eq!(sample.first.dims(), &[2]);
        assert_eq!(sample.rest.dims(), &[9, 2]);
    }

    #[test]
    fn test_all_indices_load() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = build_dataset(dir.path());
        for index in 0..dataset.len() {
            dataset.get(index).unwrap();
        }
    }

    #[test]
    fn test_out_of_range_index_fails() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = build_dataset(dir.path());
        assert!(dataset.get(dataset.len()).is_err());
    }

    #[test]
    fn test_row_count_mismatch_fails() {
        let dir = tempfile::tempdir().unwrap();
        let geometry = StripGeometry::new(16, 16, 2);
        let synth = GraphSynthesizer::new(SynthConfig {
            geometry,
            num_points_full: 40,
            waveform: Waveform::Sine,
        });
        let mut rng = StdRng::seed_from_u64(2);
        synth.write_dataset(dir.path(), 1, &mut rng).unwrap();

        let manifest = Manifest::from_dir(dir.path()).unwrap();
        let sampler = StripSampler::new(geometry, 10);
        let preprocessor = Preprocessor::new(
            PreprocessConfig {
                resolution: 16,
                ..Default::default()
            },
            Device::Cpu,
        );
        // Declared row count disagrees with the files on disk.
        let dataset = StripDataset::new(manifest, sampler, preprocessor, 99);
        assert!(dataset.get(0).is_err());
    }
}
