//! Host candidate backend.
//!
//! Every reference op has an independently written translation here,
//! expressed as the ONNX operator it exports to (`Add`, `ReduceSum`,
//! `Gather`, ...). Inputs arrive in host-native form: dtype tags are ONNX
//! element codes and plain number lists are 1-D arrays. Outputs are either
//! dense arrays or arrays wrapped with the name of the value that produced
//! them.

pub mod interop;
pub mod kernels;
pub mod translate;

use opcheck_core::Array;

pub use interop::HostInterop;
pub use translate::{HostFn, translate};

/// A candidate-native input value.
#[derive(Clone, Debug, PartialEq)]
pub enum HostInput {
    Array(Array),
    Int(i64),
    Float(f64),
    Bool(bool),
    /// ONNX `TensorProto.DataType` element code.
    DType(i64),
    Str(String),
    Seq(Vec<HostInput>),
}

impl HostInput {
    pub fn kind(&self) -> &'static str {
        match self {
            HostInput::Array(_) => "array",
            HostInput::Int(_) => "int",
            HostInput::Float(_) => "float",
            HostInput::Bool(_) => "bool",
            HostInput::DType(_) => "dtype",
            HostInput::Str(_) => "str",
            HostInput::Seq(_) => "sequence",
        }
    }
}

/// An array tagged with the graph value name it was produced under.
#[derive(Clone, Debug, PartialEq)]
pub struct WrappedTensor {
    pub name: String,
    pub value: Array,
}

/// A candidate-native output leaf.
#[derive(Clone, Debug, PartialEq)]
pub enum HostOutput {
    Dense(Array),
    Wrapped(WrappedTensor),
}

impl HostOutput {
    pub fn array(&self) -> &Array {
        match self {
            HostOutput::Dense(a) => a,
            HostOutput::Wrapped(w) => &w.value,
        }
    }
}
