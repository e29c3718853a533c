//! Translated functions: one host callable per reference op.

use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use opcheck_core::backend::{CandidateFn, EvalMode, ExecError};
use opcheck_core::graph::OpKind;
use opcheck_core::Tree;

use crate::kernels;
use crate::{HostInput, HostInterop, HostOutput};

/// Accepted call shape of a translated function.
struct Signature {
    positional: RangeInclusive<usize>,
    keywords: &'static [&'static str],
}

const fn sig(positional: RangeInclusive<usize>, keywords: &'static [&'static str]) -> Signature {
    Signature {
        positional,
        keywords,
    }
}

fn signature(op: OpKind) -> Signature {
    match op {
        OpKind::Add | OpKind::Sub => sig(2..=2, &["alpha"]),
        OpKind::Mul | OpKind::Div | OpKind::MatMul => sig(2..=2, &[]),
        OpKind::Neg | OpKind::Exp | OpKind::Sqrt => sig(1..=1, &[]),
        OpKind::Sum => sig(1..=2, &["dim", "keepdim"]),
        OpKind::Transpose => sig(3..=3, &[]),
        OpKind::Softmax => sig(2..=2, &[]),
        OpKind::IndexSelect => sig(3..=3, &[]),
        OpKind::Lerp => sig(3..=3, &[]),
        OpKind::Split => sig(1..=3, &["split_size", "dim"]),
        OpKind::Cat => sig(1..=2, &["tensors", "dim"]),
        OpKind::ToDtype => sig(1..=2, &["dtype"]),
    }
}

/// The ONNX operator an op exports to.
pub fn onnx_name(op: OpKind) -> &'static str {
    match op {
        OpKind::Add => "Add",
        OpKind::Sub => "Sub",
        OpKind::Mul => "Mul",
        OpKind::Div => "Div",
        OpKind::Neg => "Neg",
        OpKind::Exp => "Exp",
        OpKind::Sqrt => "Sqrt",
        OpKind::Sum => "ReduceSum",
        OpKind::MatMul => "MatMul",
        OpKind::Transpose => "Transpose",
        OpKind::Softmax => "Softmax",
        OpKind::IndexSelect => "Gather",
        OpKind::Lerp => "Lerp",
        OpKind::Split => "Split",
        OpKind::Cat => "Concat",
        OpKind::ToDtype => "Cast",
    }
}

/// A translated host function for one op.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostFn {
    op: OpKind,
}

/// Look up the translated function for `op`.
pub fn translate(op: OpKind) -> HostFn {
    HostFn { op }
}

impl HostFn {
    pub fn op(&self) -> OpKind {
        self.op
    }

    fn check_call(&self, args: &[HostInput], kwargs: &BTreeMap<String, HostInput>) -> Result<(), ExecError> {
        let sig = signature(self.op);
        if !sig.positional.contains(&args.len()) {
            return Err(ExecError::ArgumentMismatch(format!(
                "{} expected {} to {} positional inputs, got {}",
                onnx_name(self.op),
                sig.positional.start(),
                sig.positional.end(),
                args.len()
            )));
        }
        if let Some(k) = kwargs.keys().find(|k| !sig.keywords.contains(&k.as_str())) {
            return Err(ExecError::ArgumentMismatch(format!(
                "{} got an unexpected attribute '{k}'",
                onnx_name(self.op)
            )));
        }
        Ok(())
    }
}

impl CandidateFn<HostInterop> for HostFn {
    fn name(&self) -> String {
        format!("onnx::{}", onnx_name(self.op))
    }

    fn call(
        &self,
        args: &[HostInput],
        kwargs: &BTreeMap<String, HostInput>,
        mode: EvalMode,
    ) -> Result<Tree<HostOutput>, ExecError> {
        self.check_call(args, kwargs)?;
        tracing::debug!(op = onnx_name(self.op), inputs = args.len(), "host call");
        kernels::run(self.op, args, kwargs, mode)
    }
}
