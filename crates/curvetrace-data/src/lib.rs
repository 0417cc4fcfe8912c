//! # curvetrace-data
//!
//! Data pipeline for the curvetrace system. Loads wide curve rasters with
//! their coordinate tables and resamples each vertical strip to a
//! fixed-length point sequence; the batch loader assembles shuffled
//! training batches on top. Also ships a synthetic graph generator for
//! producing training pairs from scratch.

pub mod dataset;
pub mod loader;
pub mod manifest;
pub mod preprocess;
pub mod strip;
pub mod synth;
pub mod table;
pub mod wide;

pub use dataset::{StripDataset, StripSample};
pub use loader::{Batch, BatchLoader};
pub use manifest::{Manifest, ManifestEntry};
pub use preprocess::{PreprocessConfig, Preprocessor};
pub use strip::StripSampler;
pub use synth::{GraphSynthesizer, SynthConfig, Waveform};
pub use table::CoordinateTable;
pub use wide::WideImage;
