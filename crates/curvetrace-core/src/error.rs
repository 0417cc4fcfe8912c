//! Error types for the curvetrace system.

use thiserror::Error;

/// Errors that can occur anywhere in the curvetrace pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("raster shape mismatch: expected {expected_w}x{expected_h}, got {actual_w}x{actual_h}")]
    ShapeMismatch {
        expected_w: u32,
        expected_h: u32,
        actual_w: u32,
        actual_h: u32,
    },

    #[error("manifest mismatch: {0}")]
    ManifestMismatch(String),

    #[error("coordinate table error: {0}")]
    CoordinateTable(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("image error: {0}")]
    Image(String),

    #[error("model error: {0}")]
    Model(String),

    #[error("training error: {0}")]
    Training(String),

    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("tensor error: {0}")]
    Tensor(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for curvetrace operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<candle_core::Error> for Error {
    fn from(err: candle_core::Error) -> Self {
        Error::Tensor(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
