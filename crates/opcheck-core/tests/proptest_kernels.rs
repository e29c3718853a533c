//! Property tests for the CPU reference kernels.
//!
//! Shapes stay small so every case runs fast; values are arbitrary finite
//! floats so the identities below hold exactly or to f32 rounding.

use opcheck_core::backend::{Backend, EvalMode};
use opcheck_core::cpu_kernels::CpuRefBackend;
use opcheck_core::graph::OpKind;
use opcheck_core::{Array, DType, Kwargs, Shape, Value};
use proptest::prelude::*;

// ── Strategies ───────────────────────────────────────────────────────────

fn dim() -> impl Strategy<Value = i64> {
    1i64..=6
}

/// A random F32 array with rank 1..=3.
fn arb_array() -> impl Strategy<Value = Array> {
    prop::collection::vec(dim(), 1..=3).prop_flat_map(|dims| {
        let numel = dims.iter().product::<i64>() as usize;
        prop::collection::vec(-100.0f32..100.0, numel).prop_map(move |data| {
            Array::from_f32(&data, &Shape::new(dims.clone())).unwrap()
        })
    })
}

/// An array plus a valid axis for it, possibly negative.
fn array_with_axis() -> impl Strategy<Value = (Array, i64)> {
    arb_array().prop_flat_map(|a| {
        let ndim = a.shape().ndim() as i64;
        (Just(a), -ndim..ndim)
    })
}

fn eval(op: OpKind, args: Vec<Value>) -> Value {
    CpuRefBackend
        .eval_op(op, &args, &Kwargs::new(), EvalMode::Native)
        .unwrap()
}

fn tensor(v: Value) -> Array {
    match v {
        Value::Tensor(a) => a,
        other => panic!("expected tensor, got {}", other.kind()),
    }
}

// ── Properties ───────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn transpose_twice_is_identity((a, axis) in array_with_axis()) {
        let once = tensor(eval(
            OpKind::Transpose,
            vec![Value::Tensor(a.clone()), Value::Int(0), Value::Int(axis)],
        ));
        let twice = tensor(eval(
            OpKind::Transpose,
            vec![Value::Tensor(once), Value::Int(0), Value::Int(axis)],
        ));
        prop_assert_eq!(twice, a);
    }

    #[test]
    fn split_then_cat_is_identity((a, axis) in array_with_axis(), size in 1i64..4) {
        let Value::List(chunks) = eval(
            OpKind::Split,
            vec![Value::Tensor(a.clone()), Value::Int(size), Value::Int(axis)],
        ) else {
            panic!("split must return a list");
        };
        let joined = tensor(eval(OpKind::Cat, vec![Value::List(chunks), Value::Int(axis)]));
        prop_assert_eq!(joined, a);
    }

    #[test]
    fn softmax_rows_sum_to_one((a, axis) in array_with_axis()) {
        let s = Value::Tensor(tensor(eval(
            OpKind::Softmax,
            vec![Value::Tensor(a), Value::Int(axis)],
        )));
        let sums = tensor(eval(OpKind::Sum, vec![s, Value::Int(axis)]));
        for v in sums.to_f64_vec() {
            prop_assert!((v - 1.0).abs() < 1e-5, "sum was {v}");
        }
    }

    #[test]
    fn sum_keeps_rank_with_keepdim((a, axis) in array_with_axis()) {
        let mut kwargs = Kwargs::new();
        kwargs.insert("keepdim".into(), Value::Bool(true));
        let out = CpuRefBackend
            .eval_op(OpKind::Sum, &[Value::Tensor(a.clone()), Value::Int(axis)], &kwargs, EvalMode::Widened)
            .unwrap();
        let out = tensor(out);
        prop_assert_eq!(out.shape().ndim(), a.shape().ndim());
        prop_assert_eq!(out.dtype(), DType::F32);
    }

    #[test]
    fn add_neg_is_zero(a in arb_array()) {
        let neg = eval(OpKind::Neg, vec![Value::Tensor(a.clone())]);
        let zero = tensor(eval(OpKind::Add, vec![Value::Tensor(a), neg]));
        prop_assert!(zero.to_f64_vec().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn index_select_all_positions_is_identity((a, axis) in array_with_axis()) {
        let ndim = a.shape().ndim() as i64;
        let len = a.shape().0[axis.rem_euclid(ndim) as usize];
        let idx = Array::from_i64((0..len).collect(), &Shape::new(vec![len]), DType::I64).unwrap();
        let out = tensor(eval(
            OpKind::IndexSelect,
            vec![Value::Tensor(a.clone()), Value::Int(axis), Value::Tensor(idx)],
        ));
        prop_assert_eq!(out, a);
    }
}
