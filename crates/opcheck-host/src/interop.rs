//! Conversion between reference values and host inputs/outputs.

use std::collections::BTreeMap;

use opcheck_core::backend::Interop;
use opcheck_core::{Array, DType, Kwargs, Shape, Value};

use crate::{HostInput, HostOutput};

/// Keyword arguments that only steer tensor placement or autograd on the
/// reference side. The host has no notion of them.
const PLACEMENT_KWARGS: [&str; 5] = [
    "device",
    "layout",
    "memory_format",
    "pin_memory",
    "requires_grad",
];

#[derive(Clone, Copy, Debug, Default)]
pub struct HostInterop;

impl Interop for HostInterop {
    type Input = HostInput;
    type Output = HostOutput;

    fn to_candidate(&self, value: &Value) -> HostInput {
        match value {
            Value::Tensor(a) => HostInput::Array(a.clone()),
            Value::Int(v) => HostInput::Int(*v),
            Value::Float(v) => HostInput::Float(*v),
            Value::Bool(v) => HostInput::Bool(*v),
            Value::DType(d) => HostInput::DType(d.onnx_code()),
            Value::Str(s) => HostInput::Str(s.clone()),
            Value::List(items) => numeric_list(items).unwrap_or_else(|| {
                HostInput::Seq(items.iter().map(|v| self.to_candidate(v)).collect())
            }),
        }
    }

    fn kwargs_to_candidate(&self, kwargs: &Kwargs) -> BTreeMap<String, HostInput> {
        kwargs
            .iter()
            .filter(|(k, _)| {
                let keep = !PLACEMENT_KWARGS.contains(&k.as_str());
                if !keep {
                    tracing::debug!(kwarg = %k, "dropping placement kwarg for host call");
                }
                keep
            })
            .map(|(k, v)| (k.clone(), self.to_candidate(v)))
            .collect()
    }

    fn to_dense(&self, output: HostOutput) -> Array {
        match output {
            HostOutput::Dense(a) => a,
            HostOutput::Wrapped(w) => w.value,
        }
    }
}

/// A non-empty list of plain numbers becomes a 1-D array: `I64` when every
/// element is an int, `F32` otherwise.
fn numeric_list(items: &[Value]) -> Option<HostInput> {
    if items.is_empty() {
        return None;
    }
    let shape = Shape::new(vec![items.len() as i64]);
    let array = if items.iter().all(|v| matches!(v, Value::Int(_))) {
        Array::from_i64(items.iter().filter_map(Value::as_int).collect(), &shape, DType::I64)
    } else if items.iter().all(|v| matches!(v, Value::Int(_) | Value::Float(_))) {
        Array::from_f64(items.iter().filter_map(Value::as_f64).collect(), &shape, DType::F32)
    } else {
        return None;
    };
    array.ok().map(HostInput::Array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WrappedTensor;

    #[test]
    fn test_dtype_becomes_onnx_code() {
        assert_eq!(HostInterop.to_candidate(&Value::DType(DType::I64)), HostInput::DType(7));
    }

    #[test]
    fn test_int_list_becomes_array() {
        let v = Value::List(vec![Value::Int(2), Value::Int(3)]);
        let HostInput::Array(a) = HostInterop.to_candidate(&v) else {
            panic!("expected array");
        };
        assert_eq!(a.dtype(), DType::I64);
        assert_eq!(a.as_ints().unwrap(), &[2, 3]);
    }

    #[test]
    fn test_mixed_number_list_is_f32() {
        let v = Value::List(vec![Value::Int(1), Value::Float(0.5)]);
        let HostInput::Array(a) = HostInterop.to_candidate(&v) else {
            panic!("expected array");
        };
        assert_eq!(a.dtype(), DType::F32);
        assert_eq!(a.to_f32_vec(), vec![1.0, 0.5]);
    }

    #[test]
    fn test_tensor_list_stays_sequence() {
        let t = Array::from_f32(&[1.0], &Shape::new(vec![1])).unwrap();
        let v = Value::List(vec![Value::Tensor(t.clone()), Value::Tensor(t.clone())]);
        assert_eq!(
            HostInterop.to_candidate(&v),
            HostInput::Seq(vec![HostInput::Array(t.clone()), HostInput::Array(t)])
        );
        assert_eq!(HostInterop.to_candidate(&Value::List(vec![])), HostInput::Seq(vec![]));
    }

    #[test]
    fn test_placement_kwargs_dropped() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("device".into(), Value::Str("cpu".into()));
        kwargs.insert("requires_grad".into(), Value::Bool(false));
        kwargs.insert("dim".into(), Value::Int(1));
        let out = HostInterop.kwargs_to_candidate(&kwargs);
        assert_eq!(out.len(), 1);
        assert_eq!(out["dim"], HostInput::Int(1));
    }

    #[test]
    fn test_to_dense_unwraps() {
        let a = Array::from_f32(&[1.0, 2.0], &Shape::new(vec![2])).unwrap();
        let wrapped = HostOutput::Wrapped(WrappedTensor {
            name: "Add_0".into(),
            value: a.clone(),
        });
        assert_eq!(HostInterop.to_dense(wrapped), a);
        assert_eq!(HostInterop.to_dense(HostOutput::Dense(a.clone())), a);
    }
}
