//! Canonical single-call graphs for each op.

use opcheck_core::graph::{Argument, FakeValue, Graph, NodeId, OpKind, TensorMeta};
use opcheck_core::{DType, Kwargs, Shape};

fn input(g: &mut Graph, name: &str, shape: &Shape, dtype: DType) -> opcheck_core::Result<Argument> {
    let meta = TensorMeta {
        shape: shape.clone(),
        dtype,
    };
    let id = g.add_placeholder(name, FakeValue::Tensor(meta));
    g.arg(id)
}

/// Build a graph calling `op` on inputs of `shape` and `dtype`.
///
/// Non-tensor parameters get fixed values: dims are `0` and `-1`, split size
/// is 1, lerp weight is 0.25, casts go to `float64`. `matmul` multiplies by a
/// square matrix sized from the last dim of `shape`.
pub fn build(op: OpKind, shape: &Shape, dtype: DType) -> opcheck_core::Result<(Graph, NodeId)> {
    let mut g = Graph::new();
    let x = input(&mut g, "x", shape, dtype)?;
    let args = match op {
        OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::Div => {
            vec![x, input(&mut g, "y", shape, dtype)?]
        }
        OpKind::Neg | OpKind::Exp | OpKind::Sqrt | OpKind::Sum => vec![x],
        OpKind::MatMul => {
            let dims = &shape.0;
            let k = dims.last().copied().unwrap_or(1);
            vec![x, input(&mut g, "w", &Shape::new(vec![k, k]), dtype)?]
        }
        OpKind::Transpose => vec![x, Argument::Int(0), Argument::Int(-1)],
        OpKind::Softmax => vec![x, Argument::Int(-1)],
        OpKind::Split => vec![x, Argument::Int(1), Argument::Int(0)],
        OpKind::Cat => {
            let y = input(&mut g, "y", shape, dtype)?;
            vec![Argument::Seq(vec![x, y]), Argument::Int(0)]
        }
        OpKind::IndexSelect => {
            let index = input(&mut g, "index", &Shape::new(vec![2]), DType::I64)?;
            vec![x, Argument::Int(0), index]
        }
        OpKind::Lerp => vec![x, input(&mut g, "end", shape, dtype)?, Argument::Float(0.25)],
        OpKind::ToDtype => vec![x, Argument::DType(DType::F64)],
    };
    let call = g.add_call(op.name(), op, args, Kwargs::new(), FakeValue::Other("not inferred".into()))?;
    Ok((g, call))
}

/// Shape and dtype `smoke` uses for `op`.
pub fn smoke_input(op: OpKind) -> (Shape, DType) {
    match op {
        OpKind::MatMul => (Shape::new(vec![4, 8]), DType::F32),
        OpKind::Sqrt => (Shape::new(vec![3, 5]), DType::U8),
        OpKind::Sum | OpKind::Neg => (Shape::new(vec![6, 4]), DType::I32),
        OpKind::ToDtype => (Shape::new(vec![10]), DType::I16),
        _ => (Shape::new(vec![2, 3, 4]), DType::F32),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opcheck_core::graph::NodeKind;

    #[test]
    fn test_every_op_builds_a_call() {
        for op in OpKind::ALL {
            let (shape, dtype) = smoke_input(op);
            let (g, call) = build(op, &shape, dtype).unwrap();
            let node = g.get(call).unwrap();
            assert!(matches!(&node.kind, NodeKind::Call { op: o, .. } if *o == op));
        }
    }

    #[test]
    fn test_matmul_rhs_is_square() {
        let (g, call) = build(OpKind::MatMul, &Shape::new(vec![3, 5]), DType::F32).unwrap();
        let w = g.nodes().find(|n| n.name == "w").unwrap();
        assert_eq!(w.value, FakeValue::Tensor(TensorMeta::new(vec![5, 5], DType::F32)));
        assert_eq!(g.get(call).unwrap().inputs.len(), 2);
    }
}
