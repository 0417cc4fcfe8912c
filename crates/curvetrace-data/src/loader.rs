//! Batched, shuffled iteration over a strip dataset.

use candle_core::Tensor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;

use curvetrace_core::Result;

use crate::dataset::{StripDataset, StripSample};

/// One optimizer-step batch of stacked samples.
pub struct Batch {
    /// `[B, 3, R, R]`
    pub pixels: Tensor,
    /// `[B, 2]`
    pub first: Tensor,
    /// `[B, points_per_strip - 1, 2]`
    pub rest: Tensor,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.pixels.dims()[0]
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Assembles batches from a dataset; sample loading fans out across the
/// rayon pool.
pub struct BatchLoader<'a> {
    dataset: &'a StripDataset,
    batch_size: usize,
}

impl<'a> BatchLoader<'a> {
    pub fn new(dataset: &'a StripDataset, batch_size: usize) -> Self {
        Self {
            dataset,
            batch_size,
        }
    }

    /// Shuffled batch plan for one epoch. Every dataset index appears in
    /// exactly one batch; the last batch may be short.
    pub fn epoch(&self, rng: &mut StdRng) -> Vec<Vec<usize>> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        indices.shuffle(rng);
        indices
            .chunks(self.batch_size)
            .map(|chunk| chunk.to_vec())
            .collect()
    }

    /// Load and stack the samples at `indices`.
    pub fn load(&self, indices: &[usize]) -> Result<Batch> {
        let samples: Vec<StripSample> = indices
            .par_iter()
            .map(|&index| self.dataset.get(index))
            .collect::<Result<_>>()?;
        let pixels: Vec<&Tensor> = samples.iter().map(|s| &s.pixels).collect();
        let first: Vec<&Tensor> = samples.iter().map(|s| &s.first).collect();
        let rest: Vec<&Tensor> = samples.iter().map(|s| &s.rest).collect();
        Ok(Batch {
            pixels: Tensor::stack(&pixels, 0)?,
            first: Tensor::stack(&first, 0)?,
            rest: Tensor::stack(&rest, 0)?,
        })
    }
}
