//! # curvetrace-train
//!
//! Training harness for the curve-tracing model. The trainer drives the
//! teacher-forcing schedule and an AdamW optimizer with persistable state
//! under dynamic loss scaling with gradient clipping, and writes
//! three-file checkpoints the inference engine can load back.

pub mod checkpoint;
pub mod config;
pub mod optim;
pub mod scaler;
pub mod schedule;
pub mod trainer;

pub use checkpoint::{CheckpointMeta, CheckpointPaths, CheckpointTag};
pub use config::TrainConfig;
pub use optim::{AdamW, OptimizerConfig};
pub use scaler::{GradScaler, ScalerConfig, ScalerState};
pub use schedule::TeacherForcingSchedule;
pub use trainer::{EpochStats, TrainReport, Trainer};
