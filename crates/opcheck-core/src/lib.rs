//! Core types for differential operator validation.
//!
//! `opcheck-core` provides the value model (`Array`, `Value`, `DType`, `Shape`),
//! the symbolic graph arguments are lifted from, the backend seams the
//! validator drives, and a pure Rust CPU reference backend.
//!
//! # Backends
//!
//! - [`cpu_kernels::CpuRefBackend`]: eager ground truth for every [`graph::OpKind`]
//! - candidate backends implement [`backend::CandidateFn`] over their own
//!   [`backend::Interop`] value types

pub mod array;
pub mod backend;
pub mod cpu_kernels;
pub mod diagnostics;
pub mod graph;
pub mod types;
pub mod value;

pub use array::{Array, Buffer, Device};
pub use types::{DType, Shape};
pub use value::{Kwargs, Tree, Value};

pub type Result<T> = std::result::Result<T, OpcheckError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum OpcheckError {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<i64>, got: Vec<i64> },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("value {value} out of range for {dtype}")]
    OutOfRange { value: i64, dtype: DType },
}
