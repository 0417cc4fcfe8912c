//! # curvetrace-model
//!
//! The neural curve-tracing model: a patch-transformer visual encoder
//! feeding an autoregressive recurrent decoder through an additive
//! attention bridge. Each decode step emits one strip-local coordinate.
//! The [`engine`] module wraps the whole graph behind a load-and-trace
//! API.

pub mod attention;
pub mod decoder;
pub mod encoder;
pub mod engine;
pub mod model;

pub use attention::AdditiveAttention;
pub use decoder::{DecoderConfig, SequenceDecoder, StepSource, TeacherForcing};
pub use encoder::{EncoderConfig, VisualEncoder};
pub use engine::{EngineConfig, TraceEngine, DEFAULT_SEED_POINT};
pub use model::{CurveModel, ModelConfig};
