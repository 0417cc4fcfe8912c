//! # curvetrace-core
//!
//! Shared foundation for the curvetrace crates: the point and strip-geometry
//! types every layer speaks, and the common error enum.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
