//! Host kernels behind the translated functions.
//!
//! Floating point work is carried in f64 and rounded to the output dtype once
//! per element; only `ReduceSum` honours [`EvalMode::Native`] by accumulating
//! at f32 width. Integer arithmetic wraps at the output dtype's width.

use std::collections::BTreeMap;
use std::ops::Range;

use opcheck_core::backend::{EvalMode, ExecError};
use opcheck_core::graph::OpKind;
use opcheck_core::{Array, Buffer, DType, Shape, Tree};

use crate::translate::onnx_name;
use crate::{HostInput, HostOutput, WrappedTensor};

type Attrs = BTreeMap<String, HostInput>;
type HResult<T> = Result<T, ExecError>;

/// Execute the translation of `op`. Arity has already been checked.
pub fn run(op: OpKind, args: &[HostInput], attrs: &Attrs, mode: EvalMode) -> HResult<Tree<HostOutput>> {
    let out = match op {
        OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::Div => binary(op, args, attrs)?,
        OpKind::Neg => neg(input(op, args, 0)?)?,
        OpKind::Exp => unary_float(input(op, args, 0)?, f64::exp)?,
        OpKind::Sqrt => unary_float(input(op, args, 0)?, f64::sqrt)?,
        OpKind::Sum => reduce_sum(args, attrs, mode)?,
        OpKind::MatMul => matmul(input(op, args, 0)?, input(op, args, 1)?)?,
        OpKind::Transpose => transpose(args)?,
        OpKind::Softmax => softmax(args)?,
        OpKind::IndexSelect => gather(args)?,
        OpKind::Lerp => lerp(args)?,
        OpKind::Cat => concat(args, attrs)?,
        OpKind::ToDtype => cast(args, attrs)?,
        OpKind::Split => {
            let parts = split(args, attrs)?;
            return Ok(Tree::Seq(
                parts
                    .into_iter()
                    .map(|a| Tree::Leaf(HostOutput::Dense(a)))
                    .collect(),
            ));
        }
    };
    Ok(Tree::Leaf(HostOutput::Wrapped(WrappedTensor {
        name: format!("{}_0", onnx_name(op)),
        value: out,
    })))
}

// ── Inputs ──────────────────────────────────────────────────────────────

fn mismatch(msg: impl Into<String>) -> ExecError {
    ExecError::ArgumentMismatch(msg.into())
}

fn arg<'a>(op: OpKind, args: &'a [HostInput], i: usize) -> HResult<&'a HostInput> {
    args.get(i)
        .ok_or_else(|| mismatch(format!("{} is missing input {i}", onnx_name(op))))
}

fn input<'a>(op: OpKind, args: &'a [HostInput], i: usize) -> HResult<&'a Array> {
    match args.get(i) {
        Some(HostInput::Array(a)) => Ok(a),
        Some(other) => Err(mismatch(format!(
            "{} input {i} must be an array, got {}",
            onnx_name(op),
            other.kind()
        ))),
        None => Err(mismatch(format!("{} is missing input {i}", onnx_name(op)))),
    }
}

/// Integer attribute, positional slot `i` first, then keyword `name`.
fn int_attr(op: OpKind, args: &[HostInput], attrs: &Attrs, i: usize, name: &str, default: Option<i64>) -> HResult<i64> {
    match args.get(i).or_else(|| attrs.get(name)) {
        Some(HostInput::Int(v)) => Ok(*v),
        Some(other) => Err(mismatch(format!(
            "{} attribute '{name}' must be an int, got {}",
            onnx_name(op),
            other.kind()
        ))),
        None => default.ok_or_else(|| mismatch(format!("{} requires attribute '{name}'", onnx_name(op)))),
    }
}

fn axis(shape: &Shape, dim: i64) -> HResult<usize> {
    let rank = shape.ndim().max(1) as i64;
    let a = if dim < 0 { dim + rank } else { dim };
    if !(0..rank).contains(&a) {
        return Err(ExecError::runtime(format!("axis {dim} is out of range for rank {rank}")));
    }
    Ok(a as usize)
}

/// `(outer, len, inner)` around `axis`.
fn extents(shape: &Shape, axis: usize) -> (usize, usize, usize) {
    let dims: Vec<usize> = shape.0.iter().map(|&d| d as usize).collect();
    if dims.is_empty() {
        return (1, 1, 1);
    }
    (
        dims[..axis].iter().product(),
        dims[axis],
        dims[axis + 1..].iter().product(),
    )
}

fn ints_of(a: &Array) -> Vec<i64> {
    match a.data() {
        Buffer::Bool(v) => v.iter().map(|&b| b as i64).collect(),
        Buffer::Int(v) => v.clone(),
        Buffer::Float(v) => v.iter().map(|&f| f as i64).collect(),
    }
}

fn finish_ints(data: Vec<i64>, shape: &Shape, dtype: DType) -> HResult<Array> {
    let out = match dtype {
        DType::Bool => Array::from_bool(data.into_iter().map(|v| v != 0).collect(), shape),
        d => Array::from_i64(data.into_iter().map(|v| d.wrap_int(v)).collect(), shape, d),
    };
    out.map_err(|e| ExecError::runtime(e.to_string()))
}

fn finish_floats(data: Vec<f64>, shape: &Shape, dtype: DType) -> HResult<Array> {
    Array::from_f64(data, shape, dtype).map_err(|e| ExecError::runtime(e.to_string()))
}

// ── Buffer plumbing ─────────────────────────────────────────────────────

fn empty_like(b: &Buffer) -> Buffer {
    match b {
        Buffer::Bool(_) => Buffer::Bool(Vec::new()),
        Buffer::Int(_) => Buffer::Int(Vec::new()),
        Buffer::Float(_) => Buffer::Float(Vec::new()),
    }
}

fn extend_range(dst: &mut Buffer, src: &Buffer, range: Range<usize>) -> HResult<()> {
    match (dst, src) {
        (Buffer::Bool(d), Buffer::Bool(s)) => d.extend_from_slice(&s[range]),
        (Buffer::Int(d), Buffer::Int(s)) => d.extend_from_slice(&s[range]),
        (Buffer::Float(d), Buffer::Float(s)) => d.extend_from_slice(&s[range]),
        _ => return Err(ExecError::runtime("inputs must share an element type")),
    }
    Ok(())
}

fn into_array(buf: Buffer, shape: &Shape, dtype: DType) -> HResult<Array> {
    let out = match buf {
        Buffer::Bool(v) => Array::from_bool(v, shape),
        Buffer::Int(v) => Array::from_i64(v, shape, dtype),
        Buffer::Float(v) => Array::from_f64(v, shape, dtype),
    };
    out.map_err(|e| ExecError::runtime(e.to_string()))
}

// ── Elementwise ─────────────────────────────────────────────────────────

/// Binary operand: an array, or a scalar broadcast to every element.
enum Operand<'a> {
    Array(&'a Array),
    Scalar { value: f64, int: i64, is_float: bool },
}

impl Operand<'_> {
    fn parse(op: OpKind, arg: &HostInput) -> HResult<Operand<'_>> {
        match arg {
            HostInput::Array(a) => Ok(Operand::Array(a)),
            HostInput::Int(v) => Ok(Operand::Scalar { value: *v as f64, int: *v, is_float: false }),
            HostInput::Bool(b) => Ok(Operand::Scalar { value: *b as u8 as f64, int: *b as i64, is_float: false }),
            HostInput::Float(v) => Ok(Operand::Scalar { value: *v, int: *v as i64, is_float: true }),
            other => Err(mismatch(format!(
                "{} operands must be arrays or numbers, got {}",
                onnx_name(op),
                other.kind()
            ))),
        }
    }

    fn floats(&self) -> Vec<f64> {
        match self {
            Operand::Array(a) => a.to_f64_vec(),
            Operand::Scalar { value, .. } => vec![*value],
        }
    }

    fn ints(&self) -> Vec<i64> {
        match self {
            Operand::Array(a) => ints_of(a),
            Operand::Scalar { int, .. } => vec![*int],
        }
    }
}

fn result_meta(op: OpKind, x: &Operand<'_>, y: &Operand<'_>) -> HResult<(Shape, DType)> {
    let (shape, dtype) = match (x, y) {
        (Operand::Array(a), Operand::Array(b)) => {
            let shape = match (a.shape().ndim(), b.shape().ndim()) {
                _ if a.shape() == b.shape() => a.shape().clone(),
                (_, 0) => a.shape().clone(),
                (0, _) => b.shape().clone(),
                _ => {
                    return Err(ExecError::runtime(format!(
                        "{}: incompatible shapes {} and {}",
                        onnx_name(op),
                        a.shape(),
                        b.shape()
                    )));
                }
            };
            (shape, DType::promote(a.dtype(), b.dtype()))
        }
        (Operand::Array(a), Operand::Scalar { is_float, .. })
        | (Operand::Scalar { is_float, .. }, Operand::Array(a)) => {
            let dtype = match (a.dtype(), *is_float) {
                (d, true) if !d.is_float() => DType::F32,
                (DType::Bool, false) => DType::I64,
                (d, _) => d,
            };
            (a.shape().clone(), dtype)
        }
        _ => return Err(mismatch(format!("{} needs at least one array operand", onnx_name(op)))),
    };
    match (op, dtype.is_float()) {
        (OpKind::Div, false) => Ok((shape, DType::F32)),
        _ => Ok((shape, dtype)),
    }
}

fn binary(op: OpKind, args: &[HostInput], attrs: &Attrs) -> HResult<Array> {
    let x = Operand::parse(op, arg(op, args, 0)?)?;
    let y = Operand::parse(op, arg(op, args, 1)?)?;
    let (shape, dtype) = result_meta(op, &x, &y)?;
    let alpha = match attrs.get("alpha") {
        None => 1.0,
        Some(HostInput::Int(v)) => *v as f64,
        Some(HostInput::Float(v)) => *v,
        Some(other) => return Err(mismatch(format!("alpha must be a number, got {}", other.kind()))),
    };
    let n = shape.numel() as usize;

    if dtype.is_float() {
        let (xs, ys) = (x.floats(), y.floats());
        let at = |v: &[f64], i: usize| v[i % v.len()];
        let data = (0..n)
            .map(|i| {
                let (a, b) = (at(&xs, i), at(&ys, i));
                match op {
                    OpKind::Add => a + dtype.round_float(alpha * b),
                    OpKind::Sub => a - dtype.round_float(alpha * b),
                    OpKind::Mul => a * b,
                    _ => a / b,
                }
            })
            .collect();
        finish_floats(data, &shape, dtype)
    } else {
        let (xs, ys) = (x.ints(), y.ints());
        let at = |v: &[i64], i: usize| v[i % v.len()];
        let alpha = alpha as i64;
        let data = (0..n)
            .map(|i| {
                let (a, b) = (at(&xs, i), at(&ys, i));
                match op {
                    OpKind::Add => a.wrapping_add(b.wrapping_mul(alpha)),
                    OpKind::Sub => a.wrapping_sub(b.wrapping_mul(alpha)),
                    _ => a.wrapping_mul(b),
                }
            })
            .collect();
        finish_ints(data, &shape, dtype)
    }
}

fn neg(a: &Array) -> HResult<Array> {
    match a.dtype() {
        DType::Bool => Err(ExecError::runtime("Neg is not defined for bool inputs")),
        d if d.is_float() => finish_floats(a.to_f64_vec().iter().map(|v| -v).collect(), a.shape(), d),
        d => finish_ints(ints_of(a).iter().map(|v| v.wrapping_neg()).collect(), a.shape(), d),
    }
}

fn unary_float(a: &Array, f: fn(f64) -> f64) -> HResult<Array> {
    let dtype = if a.dtype().is_float() { a.dtype() } else { DType::F32 };
    finish_floats(a.to_f64_vec().into_iter().map(f).collect(), a.shape(), dtype)
}

// ── Reductions ──────────────────────────────────────────────────────────

fn reduce_sum(args: &[HostInput], attrs: &Attrs, mode: EvalMode) -> HResult<Array> {
    let x = input(OpKind::Sum, args, 0)?;
    let keepdims = match attrs.get("keepdim") {
        None => false,
        Some(HostInput::Bool(b)) => *b,
        Some(other) => return Err(mismatch(format!("keepdim must be a bool, got {}", other.kind()))),
    };
    let dim = match args.get(1).or_else(|| attrs.get("dim")) {
        None => None,
        Some(HostInput::Int(d)) => Some(axis(x.shape(), *d)?),
        Some(other) => return Err(mismatch(format!("ReduceSum axes must be an int, got {}", other.kind()))),
    };

    // Treat a full reduction as a reduction over one flattened axis.
    let (outer, len, inner, out_dims) = match dim {
        None => {
            let dims = if keepdims { vec![1; x.shape().ndim()] } else { Vec::new() };
            (1, x.numel(), 1, dims)
        }
        Some(ax) => {
            let (outer, len, inner) = extents(x.shape(), ax);
            let mut dims = x.shape().0.clone();
            match (dims.is_empty(), keepdims) {
                (true, _) => {}
                (false, true) => dims[ax] = 1,
                (false, false) => {
                    dims.remove(ax);
                }
            }
            (outer, len, inner, dims)
        }
    };
    let shape = Shape::new(out_dims);
    let offsets = |o: usize, i: usize| (0..len).map(move |d| (o * len + d) * inner + i);

    if x.dtype().is_float() {
        let vals = x.to_f64_vec();
        let narrow = mode == EvalMode::Native && x.dtype() == DType::F32;
        let mut data = Vec::with_capacity(outer * inner);
        for o in 0..outer {
            for i in 0..inner {
                let total = if narrow {
                    offsets(o, i).fold(0f32, |acc, k| acc + vals[k] as f32) as f64
                } else {
                    offsets(o, i).map(|k| vals[k]).sum()
                };
                data.push(total);
            }
        }
        finish_floats(data, &shape, x.dtype())
    } else {
        let vals = ints_of(x);
        let mut data = Vec::with_capacity(outer * inner);
        for o in 0..outer {
            for i in 0..inner {
                data.push(offsets(o, i).fold(0i64, |acc, k| acc.wrapping_add(vals[k])));
            }
        }
        finish_ints(data, &shape, DType::I64)
    }
}

// ── MatMul ──────────────────────────────────────────────────────────────

fn matmul(a: &Array, b: &Array) -> HResult<Array> {
    let (ad, bd) = (&a.shape().0, &b.shape().0);
    if ad.len() != 2 || bd.len() != 2 {
        return Err(ExecError::runtime(format!(
            "MatMul supports rank-2 inputs only, got {} and {}",
            a.shape(),
            b.shape()
        )));
    }
    if a.dtype() != b.dtype() {
        return Err(ExecError::runtime(format!(
            "MatMul inputs must share a dtype, got {} and {}",
            a.dtype(),
            b.dtype()
        )));
    }
    let (m, k, n) = (ad[0] as usize, ad[1] as usize, bd[1] as usize);
    if bd[0] as usize != k {
        return Err(ExecError::runtime(format!(
            "MatMul dimension mismatch: {} x {}",
            a.shape(),
            b.shape()
        )));
    }
    let shape = Shape::new(vec![m as i64, n as i64]);

    if a.dtype().is_float() {
        let (x, y) = (a.to_f64_vec(), b.to_f64_vec());
        let mut out = vec![0f64; m * n];
        for i in 0..m {
            for p in 0..k {
                let xv = x[i * k + p];
                for j in 0..n {
                    out[i * n + j] += xv * y[p * n + j];
                }
            }
        }
        finish_floats(out, &shape, a.dtype())
    } else {
        let (x, y) = (ints_of(a), ints_of(b));
        let mut out = vec![0i64; m * n];
        for i in 0..m {
            for p in 0..k {
                for j in 0..n {
                    out[i * n + j] = out[i * n + j].wrapping_add(x[i * k + p].wrapping_mul(y[p * n + j]));
                }
            }
        }
        finish_ints(out, &shape, a.dtype())
    }
}

// ── Data movement ───────────────────────────────────────────────────────

fn transpose(args: &[HostInput]) -> HResult<Array> {
    let x = input(OpKind::Transpose, args, 0)?;
    let none = Attrs::new();
    let d0 = axis(x.shape(), int_attr(OpKind::Transpose, args, &none, 1, "dim0", None)?)?;
    let d1 = axis(x.shape(), int_attr(OpKind::Transpose, args, &none, 2, "dim1", None)?)?;
    let rank = x.shape().ndim();
    if rank < 2 {
        return Ok(x.clone());
    }

    let perm: Vec<usize> = (0..rank)
        .map(|d| if d == d0 { d1 } else if d == d1 { d0 } else { d })
        .collect();
    let out_shape = Shape::new(perm.iter().map(|&p| x.shape().0[p]).collect::<Vec<_>>());
    let in_strides = x.shape().strides();

    let mut buf = empty_like(x.data());
    for flat in 0..x.numel() {
        let src: usize = out_shape
            .unravel(flat)
            .into_iter()
            .zip(&perm)
            .map(|(c, &p)| c * in_strides[p])
            .sum();
        extend_range(&mut buf, x.data(), src..src + 1)?;
    }
    into_array(buf, &out_shape, x.dtype())
}

fn gather(args: &[HostInput]) -> HResult<Array> {
    let x = input(OpKind::IndexSelect, args, 0)?;
    let ax = axis(x.shape(), int_attr(OpKind::IndexSelect, args, &Attrs::new(), 1, "dim", None)?)?;
    let indices = input(OpKind::IndexSelect, args, 2)?;
    if !matches!(indices.dtype(), DType::I32 | DType::I64) || indices.shape().ndim() > 1 {
        return Err(ExecError::runtime(format!(
            "Gather indices must be a 1-D int32/int64 array, got {} {}",
            indices.dtype(),
            indices.shape()
        )));
    }

    let (outer, len, inner) = extents(x.shape(), ax);
    let idx = ints_of(indices);
    if let Some(bad) = idx.iter().find(|&&v| v < 0 || v as usize >= len) {
        return Err(ExecError::runtime(format!(
            "Gather: indices element out of data bounds, idx={bad} must be within the inclusive range [0,{}]",
            len as i64 - 1
        )));
    }

    let mut buf = empty_like(x.data());
    for o in 0..outer {
        for &p in &idx {
            let start = (o * len + p as usize) * inner;
            extend_range(&mut buf, x.data(), start..start + inner)?;
        }
    }
    let mut dims = x.shape().0.clone();
    if dims.is_empty() {
        dims.push(1);
    }
    dims[ax] = idx.len() as i64;
    into_array(buf, &Shape::new(dims), x.dtype())
}

fn concat(args: &[HostInput], attrs: &Attrs) -> HResult<Array> {
    let items = match args.first().or_else(|| attrs.get("tensors")) {
        Some(HostInput::Seq(items)) => items,
        Some(other) => return Err(mismatch(format!("Concat expects a sequence of arrays, got {}", other.kind()))),
        None => return Err(mismatch("Concat requires its input sequence")),
    };
    let parts: Vec<&Array> = items
        .iter()
        .map(|item| match item {
            HostInput::Array(a) => Ok(a),
            other => Err(mismatch(format!("Concat inputs must be arrays, got {}", other.kind()))),
        })
        .collect::<HResult<_>>()?;
    let Some(first) = parts.first() else {
        return Err(ExecError::runtime("Concat needs at least one input"));
    };
    if first.shape().ndim() == 0 {
        return Err(ExecError::runtime("Concat inputs must have rank at least 1"));
    }
    let ax = axis(first.shape(), int_attr(OpKind::Cat, args, attrs, 1, "dim", Some(0))?)?;

    for p in &parts {
        let rest_matches = p.shape().ndim() == first.shape().ndim()
            && (0..p.shape().ndim()).all(|d| d == ax || p.shape().0[d] == first.shape().0[d]);
        if !rest_matches || p.dtype() != first.dtype() {
            return Err(ExecError::runtime(format!(
                "Concat inputs disagree: {} {} vs {} {}",
                first.dtype(),
                first.shape(),
                p.dtype(),
                p.shape()
            )));
        }
    }

    let (outer, _, inner) = extents(first.shape(), ax);
    let mut buf = empty_like(first.data());
    for o in 0..outer {
        for p in &parts {
            let block = p.shape().0[ax] as usize * inner;
            extend_range(&mut buf, p.data(), o * block..(o + 1) * block)?;
        }
    }
    let mut dims = first.shape().0.clone();
    dims[ax] = parts.iter().map(|p| p.shape().0[ax]).sum();
    into_array(buf, &Shape::new(dims), first.dtype())
}

fn split(args: &[HostInput], attrs: &Attrs) -> HResult<Vec<Array>> {
    let x = input(OpKind::Split, args, 0)?;
    let size = int_attr(OpKind::Split, args, attrs, 1, "split_size", None)?;
    let ax = axis(x.shape(), int_attr(OpKind::Split, args, attrs, 2, "dim", Some(0))?)?;
    if size < 1 || x.shape().ndim() == 0 {
        return Err(ExecError::runtime(format!(
            "Split needs a positive chunk size and a rank >= 1 input, got {size} and {}",
            x.shape()
        )));
    }

    let (outer, len, inner) = extents(x.shape(), ax);
    let size = size as usize;
    let bounds: Vec<Range<usize>> = (0..len)
        .step_by(size)
        .map(|start| start..(start + size).min(len))
        .collect();

    bounds
        .into_iter()
        .map(|r| {
            let mut buf = empty_like(x.data());
            for o in 0..outer {
                let base = o * len * inner;
                extend_range(&mut buf, x.data(), base + r.start * inner..base + r.end * inner)?;
            }
            let mut dims = x.shape().0.clone();
            dims[ax] = r.len() as i64;
            into_array(buf, &Shape::new(dims), x.dtype())
        })
        .collect()
}

// ── Activations and blends ──────────────────────────────────────────────

fn softmax(args: &[HostInput]) -> HResult<Array> {
    let x = input(OpKind::Softmax, args, 0)?;
    if !x.dtype().is_float() {
        return Err(ExecError::runtime(format!("Softmax is not defined for {}", x.dtype())));
    }
    let ax = axis(x.shape(), int_attr(OpKind::Softmax, args, &Attrs::new(), 1, "dim", None)?)?;
    let (outer, len, inner) = extents(x.shape(), ax);
    let mut v = x.to_f64_vec();

    for o in 0..outer {
        for i in 0..inner {
            let lane: Vec<usize> = (0..len).map(|d| (o * len + d) * inner + i).collect();
            let peak = lane.iter().map(|&k| v[k]).fold(f64::NEG_INFINITY, f64::max);
            let denom: f64 = lane.iter().map(|&k| (v[k] - peak).exp()).sum();
            for &k in &lane {
                v[k] = (v[k] - peak).exp() / denom;
            }
        }
    }
    finish_floats(v, x.shape(), x.dtype())
}

fn lerp(args: &[HostInput]) -> HResult<Array> {
    let start = input(OpKind::Lerp, args, 0)?;
    let end = input(OpKind::Lerp, args, 1)?;
    let weights = match arg(OpKind::Lerp, args, 2)? {
        HostInput::Array(w) if w.numel() == 1 || w.shape() == start.shape() => w.to_f64_vec(),
        HostInput::Array(w) => {
            return Err(ExecError::runtime(format!(
                "Lerp weight shape {} does not match {}",
                w.shape(),
                start.shape()
            )));
        }
        HostInput::Float(w) => vec![*w],
        HostInput::Int(w) => vec![*w as f64],
        other => return Err(mismatch(format!("Lerp weight must be a number or array, got {}", other.kind()))),
    };
    if start.shape() != end.shape() || start.dtype() != end.dtype() || !start.dtype().is_float() {
        return Err(ExecError::runtime(format!(
            "Lerp needs matching float inputs, got {} {} and {} {}",
            start.dtype(),
            start.shape(),
            end.dtype(),
            end.shape()
        )));
    }

    let (s, e) = (start.to_f64_vec(), end.to_f64_vec());
    let data = (0..s.len())
        .map(|i| s[i] + weights[i % weights.len()] * (e[i] - s[i]))
        .collect();
    finish_floats(data, start.shape(), start.dtype())
}

fn cast(args: &[HostInput], attrs: &Attrs) -> HResult<Array> {
    let x = input(OpKind::ToDtype, args, 0)?;
    let to = match args.get(1).or_else(|| attrs.get("dtype")) {
        Some(HostInput::DType(code)) => DType::from_onnx_code(*code)
            .ok_or_else(|| ExecError::runtime(format!("Cast: unsupported element type {code}")))?,
        Some(other) => return Err(mismatch(format!("Cast 'to' must be an element type, got {}", other.kind()))),
        None => return Err(mismatch("Cast requires the 'to' attribute")),
    };

    let out = match (x.data(), to) {
        (_, DType::Bool) => Array::from_bool(x.to_f64_vec().iter().map(|&v| v != 0.0).collect(), x.shape()),
        (Buffer::Float(v), d) if d.is_float() => Array::from_f64(v.clone(), x.shape(), d),
        (Buffer::Float(v), d) => {
            Array::from_i64(v.iter().map(|&f| d.wrap_int(f as i64)).collect(), x.shape(), d)
        }
        (_, d) if d.is_float() => Array::from_f64(x.to_f64_vec(), x.shape(), d),
        (_, d) => Array::from_i64(ints_of(x).into_iter().map(|v| d.wrap_int(v)).collect(), x.shape(), d),
    };
    out.map_err(|e| ExecError::runtime(e.to_string()))
}
