//! Backend seams: the callables the validator runs and the converters between them.
//!
//! A `Backend` knows how to execute a single op eagerly on concrete values.
//! `ReferenceFn` and `CandidateFn` are the two sides of a validation call;
//! `Interop` converts reference-native values into candidate-native inputs and
//! candidate outputs back into dense arrays.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::graph::OpKind;
use crate::value::{Kwargs, Tree, Value};
use crate::Array;

/// How a backend evaluates floating point work.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EvalMode {
    /// Accumulate in the tensor dtype's own precision.
    #[default]
    Native,
    /// Accumulate in f64 and round once at the end.
    Widened,
}

impl std::str::FromStr for EvalMode {
    type Err = crate::OpcheckError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_lowercase().as_str() {
            "native" => Ok(EvalMode::Native),
            "widened" => Ok(EvalMode::Widened),
            other => Err(crate::OpcheckError::InvalidArgument(format!(
                "unknown eval mode `{other}` (expected native or widened)"
            ))),
        }
    }
}

/// Determine the evaluation mode via env var → default.
///
/// `OPCHECK_EVAL_MODE` accepts `"native"` or `"widened"` (case-insensitive);
/// anything else falls through to [`EvalMode::Native`].
pub fn default_eval_mode() -> EvalMode {
    std::env::var("OPCHECK_EVAL_MODE")
        .ok()
        .and_then(|val| val.parse().ok())
        .unwrap_or_default()
}

/// Failure raised while executing an op on either backend.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    /// An index or dim argument fell outside the tensor's bounds.
    #[error("IndexError: {0}")]
    IndexOutOfBounds(String),

    /// Provided arguments do not fit the callee's signature.
    #[error("ValueError: {0}")]
    ArgumentMismatch(String),

    #[error("RuntimeError: {0}")]
    Runtime(String),
}

impl ExecError {
    pub fn runtime(msg: impl Into<String>) -> Self {
        ExecError::Runtime(msg.into())
    }
}

/// Pluggable eager backend.
pub trait Backend: Send + Sync {
    /// Evaluate one op on concrete arguments.
    fn eval_op(
        &self,
        op: OpKind,
        args: &[Value],
        kwargs: &Kwargs,
        mode: EvalMode,
    ) -> Result<Value, ExecError>;
}

/// The ground-truth side of a validation call.
pub trait ReferenceFn {
    fn name(&self) -> String;

    fn call(&self, args: &[Value], kwargs: &Kwargs, mode: EvalMode) -> Result<Value, ExecError>;
}

/// Converters between reference-native values and a candidate backend.
pub trait Interop {
    /// Candidate-native input value.
    type Input;
    /// Candidate-native output leaf.
    type Output;

    fn to_candidate(&self, value: &Value) -> Self::Input;

    /// Convert keyword arguments, dropping those the candidate cannot accept.
    fn kwargs_to_candidate(&self, kwargs: &Kwargs) -> BTreeMap<String, Self::Input>;

    /// Normalize a candidate output leaf into a dense array.
    fn to_dense(&self, output: Self::Output) -> Array;
}

/// The side under validation.
pub trait CandidateFn<I: Interop> {
    fn name(&self) -> String;

    fn call(
        &self,
        args: &[I::Input],
        kwargs: &BTreeMap<String, I::Input>,
        mode: EvalMode,
    ) -> Result<Tree<I::Output>, ExecError>;
}

/// An op bound to an eager backend.
#[derive(Clone)]
pub struct EagerOp {
    op: OpKind,
    backend: Arc<dyn Backend>,
}

impl EagerOp {
    pub fn new(op: OpKind, backend: Arc<dyn Backend>) -> Self {
        Self { op, backend }
    }

    pub fn op(&self) -> OpKind {
        self.op
    }
}

impl std::fmt::Debug for EagerOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EagerOp")
            .field("op", &self.op)
            .finish_non_exhaustive()
    }
}

impl ReferenceFn for EagerOp {
    fn name(&self) -> String {
        self.op.name().to_string()
    }

    fn call(&self, args: &[Value], kwargs: &Kwargs, mode: EvalMode) -> Result<Value, ExecError> {
        self.backend.eval_op(self.op, args, kwargs, mode)
    }
}

/// A closure with a name, usable as either side of a validation call.
pub struct NamedFn<F> {
    name: String,
    f: F,
}

impl<F> NamedFn<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> ReferenceFn for NamedFn<F>
where
    F: Fn(&[Value], &Kwargs, EvalMode) -> Result<Value, ExecError>,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    fn call(&self, args: &[Value], kwargs: &Kwargs, mode: EvalMode) -> Result<Value, ExecError> {
        (self.f)(args, kwargs, mode)
    }
}

impl<I, F> CandidateFn<I> for NamedFn<F>
where
    I: Interop,
    F: Fn(&[I::Input], &BTreeMap<String, I::Input>, EvalMode) -> Result<Tree<I::Output>, ExecError>,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    fn call(
        &self,
        args: &[I::Input],
        kwargs: &BTreeMap<String, I::Input>,
        mode: EvalMode,
    ) -> Result<Tree<I::Output>, ExecError> {
        (self.f)(args, kwargs, mode)
    }
}

/// The default eager backend: the CPU reference kernels.
pub fn default_backend() -> Arc<dyn Backend> {
    Arc::new(crate::cpu_kernels::CpuRefBackend)
}
