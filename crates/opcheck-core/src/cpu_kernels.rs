//! Built-in CPU reference backend, the eager ground truth.
//!
//! This is an intentionally simple, safe Rust implementation of every op.
//! It prioritizes correctness and readability over performance. Failures
//! are reported the way the eager framework raises them: bad indices and
//! dims are `IndexOutOfBounds`, everything else is `Runtime`.

use crate::array::Buffer;
use crate::backend::{Backend, EvalMode, ExecError};
use crate::graph::OpKind;
use crate::value::{Kwargs, Value};
use crate::{Array, DType, Shape};

type KResult<T> = std::result::Result<T, ExecError>;

/// Reference CPU backend.
pub struct CpuRefBackend;

impl Backend for CpuRefBackend {
    fn eval_op(
        &self,
        op: OpKind,
        args: &[Value],
        kwargs: &Kwargs,
        mode: EvalMode,
    ) -> KResult<Value> {
        match op {
            OpKind::Add | OpKind::Sub | OpKind::Mul | OpKind::Div => {
                binary_elementwise(op, args, kwargs)
            }
            OpKind::Neg => {
                let a = require_tensor(op, args, 0)?;
                if a.dtype() == DType::Bool {
                    return Err(ExecError::runtime(
                        "Negation, the `-` operator, on a bool tensor is not supported.",
                    ));
                }
                map_unary(a, a.dtype(), |x| -x, |x| x.wrapping_neg())
            }
            OpKind::Exp => {
                let a = require_tensor(op, args, 0)?;
                map_unary(a, float_result(a.dtype()), f64::exp, |_| 0)
            }
            OpKind::Sqrt => {
                let a = require_tensor(op, args, 0)?;
                map_unary(a, float_result(a.dtype()), f64::sqrt, |_| 0)
            }
            OpKind::Sum => reduce_sum(args, kwargs, mode),
            OpKind::MatMul => matmul(args, mode),
            OpKind::Transpose => transpose(args),
            OpKind::Split => split(args, kwargs),
            OpKind::Cat => cat(args, kwargs),
            OpKind::IndexSelect => index_select(args),
            OpKind::Softmax => softmax(args, mode),
            OpKind::Lerp => lerp(args),
            OpKind::ToDtype => to_dtype(args, kwargs),
        }
    }
}

// ── Argument access ─────────────────────────────────────────────────────

fn require_tensor<'a>(op: OpKind, args: &'a [Value], idx: usize) -> KResult<&'a Array> {
    match args.get(idx) {
        Some(Value::Tensor(a)) => Ok(a),
        Some(other) => Err(ExecError::runtime(format!(
            "{op}(): argument {idx} must be Tensor, not {}",
            other.kind()
        ))),
        None => Err(ExecError::runtime(format!(
            "{op}(): missing required argument {idx}"
        ))),
    }
}

/// Integer argument at `idx`, then keyword `name`, then `default`.
fn int_arg(
    op: OpKind,
    args: &[Value],
    kwargs: &Kwargs,
    idx: usize,
    name: &str,
    default: Option<i64>,
) -> KResult<i64> {
    match args.get(idx).or_else(|| kwargs.get(name)) {
        Some(Value::Int(v)) => Ok(*v),
        Some(other) => Err(ExecError::runtime(format!(
            "{op}(): argument '{name}' must be int, not {}",
            other.kind()
        ))),
        None => default.ok_or_else(|| {
            ExecError::runtime(format!("{op}(): missing required argument '{name}'"))
        }),
    }
}

/// Resolve a possibly negative dim, raising the eager framework's IndexError.
fn resolve_dim(shape: &Shape, dim: i64) -> KResult<usize> {
    let ndim = shape.ndim().max(1) as i64;
    let idx = if dim < 0 { dim + ndim } else { dim };
    if idx < 0 || idx >= ndim {
        return Err(ExecError::IndexOutOfBounds(format!(
            "Dimension out of range (expected to be in range of [{}, {}], but got {dim})",
            -ndim,
            ndim - 1
        )));
    }
    Ok(idx as usize)
}

/// `(outer, dim, inner)` extents around `axis`.
fn split_extents(shape: &Shape, axis: usize) -> (usize, usize, usize) {
    if shape.ndim() == 0 {
        return (1, 1, 1);
    }
    let outer = shape.0[..axis].iter().product::<i64>() as usize;
    let dim = shape.0[axis] as usize;
    let inner = shape.0[axis + 1..].iter().product::<i64>() as usize;
    (outer, dim, inner)
}

fn float_result(dt: DType) -> DType {
    if dt.is_float() { dt } else { DType::F32 }
}

fn int_at(a: &Array, i: usize) -> i64 {
    match a.data() {
        Buffer::Bool(v) => v[i] as i64,
        Buffer::Int(v) => v[i],
        Buffer::Float(v) => v[i] as i64,
    }
}

fn build_ints(data: Vec<i64>, shape: &Shape, dtype: DType) -> KResult<Array> {
    let out = if dtype == DType::Bool {
        Array::from_bool(data.iter().map(|&v| v != 0).collect(), shape)
    } else {
        Array::from_i64(data.into_iter().map(|v| dtype.wrap_int(v)).collect(), shape, dtype)
    };
    out.map_err(|e| ExecError::runtime(e.to_string()))
}

fn build_floats(data: Vec<f64>, shape: &Shape, dtype: DType) -> KResult<Array> {
    Array::from_f64(data, shape, dtype).map_err(|e| ExecError::runtime(e.to_string()))
}

/// Copy elements `picks` (source array, flat offset) into a new array.
fn take(sources: &[&Array], dtype: DType, shape: &Shape, picks: &[(usize, usize)]) -> KResult<Array> {
    match dtype {
        d if d.is_float() => build_floats(
            picks.iter().map(|&(s, i)| sources[s].get_f64(i)).collect(),
            shape,
            d,
        ),
        d => build_ints(picks.iter().map(|&(s, i)| int_at(sources[s], i)).collect(), shape, d),
    }
}

/// Add `v` to `acc` at the precision `mode` asks for.
fn accumulate(acc: f64, v: f64, dtype: DType, mode: EvalMode) -> f64 {
    match (mode, dtype) {
        (EvalMode::Native, DType::F32) => (acc as f32 + v as f32) as f64,
        _ => acc + v,
    }
}

// ── Elementwise ─────────────────────────────────────────────────────────

enum Operand<'a> {
    Tensor(&'a Array),
    Int(i64),
    Float(f64),
}

impl Operand<'_> {
    fn f64_at(&self, i: usize) -> f64 {
        match self {
            Operand::Tensor(a) if a.numel() == 1 => a.get_f64(0),
            Operand::Tensor(a) => a.get_f64(i),
            Operand::Int(v) => *v as f64,
            Operand::Float(v) => *v,
        }
    }

    fn i64_at(&self, i: usize) -> i64 {
        match self {
            Operand::Tensor(a) if a.numel() == 1 => int_at(a, 0),
            Operand::Tensor(a) => int_at(a, i),
            Operand::Int(v) => *v,
            Operand::Float(v) => *v as i64,
        }
    }
}

fn operand(op: OpKind, value: Option<&Value>, idx: usize) -> KResult<Operand<'_>> {
    match value {
        Some(Value::Tensor(a)) => Ok(Operand::Tensor(a)),
        Some(Value::Int(v)) => Ok(Operand::Int(*v)),
        Some(Value::Bool(v)) => Ok(Operand::Int(*v as i64)),
        Some(Value::Float(v)) => Ok(Operand::Float(*v)),
        Some(other) => Err(ExecError::runtime(format!(
            "{op}(): argument {idx} must be Tensor or Number, not {}",
            other.kind()
        ))),
        None => Err(ExecError::runtime(format!(
            "{op}(): missing required argument {idx}"
        ))),
    }
}

/// Result shape and dtype of a binary op (same-shape or rank-0/scalar broadcast).
fn binary_meta(op: OpKind, lhs: &Operand<'_>, rhs: &Operand<'_>) -> KResult<(Shape, DType)> {
    let (shape, dtype) = match (lhs, rhs) {
        (Operand::Tensor(a), Operand::Tensor(b)) => {
            let shape = if a.shape() == b.shape() || b.shape().ndim() == 0 {
                a.shape().clone()
            } else if a.shape().ndim() == 0 {
                b.shape().clone()
            } else {
                return Err(ExecError::runtime(format!(
                    "The size of tensor a {} must match the size of tensor b {}",
                    a.shape(),
                    b.shape()
                )));
            };
            (shape, DType::promote(a.dtype(), b.dtype()))
        }
        (Operand::Tensor(a), scalar) | (scalar, Operand::Tensor(a)) => {
            let dtype = match scalar {
                Operand::Float(_) if !a.dtype().is_float() => DType::F32,
                Operand::Int(_) if a.dtype() == DType::Bool => DType::I64,
                _ => a.dtype(),
            };
            (a.shape().clone(), dtype)
        }
        _ => {
            return Err(ExecError::runtime(format!(
                "{op}(): at least one argument must be a Tensor"
            )));
        }
    };
    let dtype = if op == OpKind::Div { float_result(dtype) } else { dtype };
    Ok((shape, dtype))
}

fn binary_elementwise(op: OpKind, args: &[Value], kwargs: &Kwargs) -> KResult<Value> {
    let lhs = operand(op, args.first(), 0)?;
    let rhs = operand(op, args.get(1), 1)?;
    let (shape, dtype) = binary_meta(op, &lhs, &rhs)?;
    let alpha = match kwargs.get("alpha") {
        Some(v) if matches!(op, OpKind::Add | OpKind::Sub) => v
            .as_f64()
            .ok_or_else(|| ExecError::runtime(format!("{op}(): alpha must be a Number")))?,
        _ => 1.0,
    };
    let n = shape.numel() as usize;

    let out = if dtype.is_float() {
        let data = (0..n)
            .map(|i| {
                let (x, y) = (lhs.f64_at(i), rhs.f64_at(i));
                match op {
                    OpKind::Add => x + alpha * y,
                    OpKind::Sub => x - alpha * y,
                    OpKind::Mul => x * y,
                    _ => x / y,
                }
            })
            .collect();
        build_floats(data, &shape, dtype)?
    } else {
        let alpha = alpha as i64;
        let data = (0..n)
            .map(|i| {
                let (x, y) = (lhs.i64_at(i), rhs.i64_at(i));
                match op {
                    OpKind::Add => x.wrapping_add(alpha.wrapping_mul(y)),
                    OpKind::Sub => x.wrapping_sub(alpha.wrapping_mul(y)),
                    _ => x.wrapping_mul(y),
                }
            })
            .collect();
        build_ints(data, &shape, dtype)?
    };
    Ok(Value::Tensor(out))
}

fn map_unary(
    a: &Array,
    dtype: DType,
    float_fn: fn(f64) -> f64,
    int_fn: fn(i64) -> i64,
) -> KResult<Value> {
    let out = if dtype.is_float() {
        build_floats(a.to_f64_vec().into_iter().map(float_fn).collect(), a.shape(), dtype)?
    } else {
        let data = (0..a.numel()).map(|i| int_fn(int_at(a, i))).collect();
        build_ints(data, a.shape(), dtype)?
    };
    Ok(Value::Tensor(out))
}

// ── Reductions ──────────────────────────────────────────────────────────

fn reduce_sum(args: &[Value], kwargs: &Kwargs, mode: EvalMode) -> KResult<Value> {
    let a = require_tensor(OpKind::Sum, args, 0)?;
    let keepdim = matches!(kwargs.get("keepdim"), Some(Value::Bool(true)));
    let dtype = if a.dtype().is_float() { a.dtype() } else { DType::I64 };

    let dim = match args.get(1).or_else(|| kwargs.get("dim")) {
        None => None,
        Some(Value::Int(d)) => Some(resolve_dim(a.shape(), *d)?),
        Some(other) => {
            return Err(ExecError::runtime(format!(
                "aten.sum(): argument 'dim' must be int, not {}",
                other.kind()
            )));
        }
    };

    let (shape, groups): (Shape, Vec<Vec<usize>>) = match dim {
        None => {
            let shape = if keepdim {
                Shape::new(vec![1; a.shape().ndim()])
            } else {
                Shape::scalar()
            };
            (shape, vec![(0..a.numel()).collect()])
        }
        Some(ax) => {
            let (outer, len, inner) = split_extents(a.shape(), ax);
            let mut dims = a.shape().0.clone();
            // Rank 0 has nothing to drop.
            if !dims.is_empty() {
                if keepdim {
                    dims[ax] = 1;
                } else {
                    dims.remove(ax);
                }
            }
            let mut groups = Vec::with_capacity(outer * inner);
            for o in 0..outer {
                for i in 0..inner {
                    groups.push((0..len).map(|d| o * len * inner + d * inner + i).collect());
                }
            }
            (Shape::new(dims), groups)
        }
    };

    let out = if dtype.is_float() {
        let data = groups
            .iter()
            .map(|g| {
                let acc = g
                    .iter()
                    .fold(0.0, |acc, &i| accumulate(acc, a.get_f64(i), dtype, mode));
                dtype.round_float(acc)
            })
            .collect();
        build_floats(data, &shape, dtype)?
    } else {
        let data = groups
            .iter()
            .map(|g| g.iter().fold(0i64, |acc, &i| acc.wrapping_add(int_at(a, i))))
            .collect();
        build_ints(data, &shape, dtype)?
    };
    Ok(Value::Tensor(out))
}

// ── Linear algebra ──────────────────────────────────────────────────────

fn matmul(args: &[Value], mode: EvalMode) -> KResult<Value> {
    let a = require_tensor(OpKind::MatMul, args, 0)?;
    let b = require_tensor(OpKind::MatMul, args, 1)?;

    if a.shape().ndim() != 2 || b.shape().ndim() != 2 {
        return Err(ExecError::runtime("matmul requires 2D tensors"));
    }
    if a.dtype() != b.dtype() {
        return Err(ExecError::runtime(format!(
            "expected m1 and m2 to have the same dtype, but got: {} != {}",
            a.dtype(),
            b.dtype()
        )));
    }

    let m = a.shape().0[0] as usize;
    let k = a.shape().0[1] as usize;
    let k2 = b.shape().0[0] as usize;
    let n = b.shape().0[1] as usize;

    if k != k2 {
        return Err(ExecError::runtime(format!(
            "mat1 and mat2 shapes cannot be multiplied ({m}x{k} and {k2}x{n})"
        )));
    }

    let shape = Shape::new(vec![m as i64, n as i64]);
    let dtype = a.dtype();
    let out = if dtype.is_float() {
        let mut data = vec![0.0f64; m * n];
        for i in 0..m {
            for j in 0..n {
                let mut sum = 0.0;
                for p in 0..k {
                    let prod = dtype.round_float(a.get_f64(i * k + p) * b.get_f64(p * n + j));
                    sum = accumulate(sum, prod, dtype, mode);
                }
                data[i * n + j] = sum;
            }
        }
        build_floats(data, &shape, dtype)?
    } else {
        let mut data = vec![0i64; m * n];
        for i in 0..m {
            for j in 0..n {
                data[i * n + j] = (0..k).fold(0i64, |acc, p| {
                    acc.wrapping_add(int_at(a, i * k + p).wrapping_mul(int_at(b, p * n + j)))
                });
            }
        }
        build_ints(data, &shape, dtype)?
    };
    Ok(Value::Tensor(out))
}

// ── Shape manipulation ──────────────────────────────────────────────────

fn transpose(args: &[Value]) -> KResult<Value> {
    let a = require_tensor(OpKind::Transpose, args, 0)?;
    let no_kwargs = Kwargs::new();
    let d0 = resolve_dim(a.shape(), int_arg(OpKind::Transpose, args, &no_kwargs, 1, "dim0", None)?)?;
    let d1 = resolve_dim(a.shape(), int_arg(OpKind::Transpose, args, &no_kwargs, 2, "dim1", None)?)?;
    if a.shape().ndim() < 2 {
        return Ok(Value::Tensor(a.clone()));
    }

    let mut perm: Vec<usize> = (0..a.shape().ndim()).collect();
    perm.swap(d0, d1);
    let new_shape = Shape::new(perm.iter().map(|&ax| a.shape().0[ax]).collect::<Vec<_>>());
    let old_strides = a.shape().strides();

    let picks: Vec<(usize, usize)> = (0..a.numel())
        .map(|flat| {
            // Multi-index in the new shape; coord `d` walks old axis `perm[d]`.
            let coords = new_shape.unravel(flat);
            let old_flat = coords
                .iter()
                .enumerate()
                .map(|(d, &c)| c * old_strides[perm[d]])
                .sum();
            (0, old_flat)
        })
        .collect();
    Ok(Value::Tensor(take(&[a], a.dtype(), &new_shape, &picks)?))
}

fn split(args: &[Value], kwargs: &Kwargs) -> KResult<Value> {
    let a = require_tensor(OpKind::Split, args, 0)?;
    let size = int_arg(OpKind::Split, args, kwargs, 1, "split_size", None)?;
    let ax = resolve_dim(a.shape(), int_arg(OpKind::Split, args, kwargs, 2, "dim", Some(0))?)?;
    if size <= 0 {
        return Err(ExecError::runtime(format!(
            "split_size can only be a positive integer, but got {size}"
        )));
    }
    if a.shape().ndim() == 0 {
        return Err(ExecError::runtime("split expects at least a 1-dimensional tensor"));
    }

    let (outer, len, inner) = split_extents(a.shape(), ax);
    let size = size as usize;
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < len {
        let width = size.min(len - start);
        let mut dims = a.shape().0.clone();
        dims[ax] = width as i64;
        let mut picks = Vec::with_capacity(outer * width * inner);
        for o in 0..outer {
            for d in start..start + width {
                for i in 0..inner {
                    picks.push((0, o * len * inner + d * inner + i));
                }
            }
        }
        chunks.push(Value::Tensor(take(&[a], a.dtype(), &Shape::new(dims), &picks)?));
        start += width;
    }
    Ok(Value::List(chunks))
}

fn cat(args: &[Value], kwargs: &Kwargs) -> KResult<Value> {
    let tensors: Vec<&Array> = match args.first().or_else(|| kwargs.get("tensors")) {
        Some(Value::List(items)) => items
            .iter()
            .map(|v| {
                v.as_tensor().ok_or_else(|| {
                    ExecError::runtime(format!(
                        "aten.cat(): expected a sequence of Tensors, found {}",
                        v.kind()
                    ))
                })
            })
            .collect::<KResult<_>>()?,
        _ => return Err(ExecError::runtime("aten.cat(): argument 'tensors' must be a list")),
    };
    let Some(first) = tensors.first() else {
        return Err(ExecError::runtime("torch.cat(): expected a non-empty list of Tensors"));
    };
    let ax = resolve_dim(first.shape(), int_arg(OpKind::Cat, args, kwargs, 1, "dim", Some(0))?)?;
    if first.shape().ndim() == 0 {
        return Err(ExecError::runtime("zero-dimensional tensor cannot be concatenated"));
    }

    let mut total = 0i64;
    for (n, t) in tensors.iter().enumerate() {
        let same_rest = t.shape().ndim() == first.shape().ndim()
            && t
                .shape()
                .0
                .iter()
                .zip(first.shape().0.iter())
                .enumerate()
                .all(|(d, (x, y))| d == ax || x == y);
        if !same_rest {
            return Err(ExecError::runtime(format!(
                "Sizes of tensors must match except in dimension {ax}. Got {} and {} (tensor {n})",
                first.shape(),
                t.shape()
            )));
        }
        if t.dtype() != first.dtype() {
            return Err(ExecError::runtime(format!(
                "Expected all tensors to share dtype {}, found {} (tensor {n})",
                first.dtype(),
                t.dtype()
            )));
        }
        total += t.shape().0[ax];
    }

    let mut dims = first.shape().0.clone();
    dims[ax] = total;
    let (outer, _, inner) = split_extents(first.shape(), ax);
    let mut picks = Vec::new();
    for o in 0..outer {
        for (s, t) in tensors.iter().enumerate() {
            let len = t.shape().0[ax] as usize;
            for d in 0..len {
                for i in 0..inner {
                    picks.push((s, o * len * inner + d * inner + i));
                }
            }
        }
    }
    Ok(Value::Tensor(take(&tensors, first.dtype(), &Shape::new(dims), &picks)?))
}

// ── Indexing ────────────────────────────────────────────────────────────

fn index_select(args: &[Value]) -> KResult<Value> {
    let a = require_tensor(OpKind::IndexSelect, args, 0)?;
    let no_kwargs = Kwargs::new();
    let ax = resolve_dim(a.shape(), int_arg(OpKind::IndexSelect, args, &no_kwargs, 1, "dim", None)?)?;
    let index = require_tensor(OpKind::IndexSelect, args, 2)?;
    if !matches!(index.dtype(), DType::I32 | DType::I64) {
        return Err(ExecError::runtime(format!(
            "index_select(): Expected dtype int32/int64 for index but got: {}",
            index.dtype()
        )));
    }
    if index.shape().ndim() > 1 {
        return Err(ExecError::runtime("index_select(): Index is supposed to be a vector"));
    }

    let (outer, len, inner) = split_extents(a.shape(), ax);
    let positions: Vec<usize> = (0..index.numel())
        .map(|i| {
            let idx = int_at(index, i);
            if idx < 0 || idx as usize >= len {
                Err(ExecError::IndexOutOfBounds(format!(
                    "index {idx} is out of bounds for dimension {ax} with size {len}"
                )))
            } else {
                Ok(idx as usize)
            }
        })
        .collect::<KResult<_>>()?;

    let mut dims = a.shape().0.clone();
    if dims.is_empty() {
        dims.push(1);
    }
    dims[ax] = positions.len() as i64;
    let mut picks = Vec::with_capacity(outer * positions.len() * inner);
    for o in 0..outer {
        for &p in &positions {
            for i in 0..inner {
                picks.push((0, o * len * inner + p * inner + i));
            }
        }
    }
    Ok(Value::Tensor(take(&[a], a.dtype(), &Shape::new(dims), &picks)?))
}

// ── Activations ─────────────────────────────────────────────────────────

fn softmax(args: &[Value], mode: EvalMode) -> KResult<Value> {
    let a = require_tensor(OpKind::Softmax, args, 0)?;
    if !a.dtype().is_float() {
        return Err(ExecError::runtime(format!(
            "\"softmax_lastdim_kernel_impl\" not implemented for '{}'",
            a.dtype()
        )));
    }
    let no_kwargs = Kwargs::new();
    let ax = resolve_dim(a.shape(), int_arg(OpKind::Softmax, args, &no_kwargs, 1, "dim", None)?)?;
    let dtype = a.dtype();
    let (outer, dim, inner) = split_extents(a.shape(), ax);

    let mut data = a.to_f64_vec();
    for o in 0..outer {
        for i in 0..inner {
            let idx = |d: usize| o * dim * inner + d * inner + i;
            let max_val = (0..dim).map(|d| data[idx(d)]).fold(f64::NEG_INFINITY, f64::max);
            let mut sum_exp = 0.0;
            for d in 0..dim {
                let e = dtype.round_float((data[idx(d)] - max_val).exp());
                data[idx(d)] = e;
                sum_exp = accumulate(sum_exp, e, dtype, mode);
            }
            for d in 0..dim {
                data[idx(d)] /= sum_exp;
            }
        }
    }
    Ok(Value::Tensor(build_floats(data, a.shape(), dtype)?))
}

// ── Misc ────────────────────────────────────────────────────────────────

/// `lerp(start, end, weight)` with the two-sided formula that stays exact at
/// both endpoints.
fn lerp(args: &[Value]) -> KResult<Value> {
    let start = require_tensor(OpKind::Lerp, args, 0)?;
    let end = require_tensor(OpKind::Lerp, args, 1)?;
    let weight = operand(OpKind::Lerp, args.get(2), 2)?;

    if start.shape() != end.shape() {
        return Err(ExecError::runtime(format!(
            "lerp(): expected end to have shape {}, got {}",
            start.shape(),
            end.shape()
        )));
    }
    if start.dtype() != end.dtype() || !start.dtype().is_float() {
        return Err(ExecError::runtime(format!(
            "lerp(): expected floating start and end of the same dtype, got {} and {}",
            start.dtype(),
            end.dtype()
        )));
    }
    if let Operand::Tensor(w) = &weight
        && w.numel() != 1
        && w.shape() != start.shape()
    {
        return Err(ExecError::runtime(format!(
            "lerp(): expected weight to have shape {}, got {}",
            start.shape(),
            w.shape()
        )));
    }

    let data = (0..start.numel())
        .map(|i| {
            let (s, e, w) = (start.get_f64(i), end.get_f64(i), weight.f64_at(i));
            let diff = e - s;
            if w.abs() < 0.5 { s + w * diff } else { e - diff * (1.0 - w) }
        })
        .collect();
    Ok(Value::Tensor(build_floats(data, start.shape(), start.dtype())?))
}

/// Cast an array to `dtype`, keeping integer values exact.
pub fn cast(a: &Array, dtype: DType) -> crate::Result<Array> {
    match (a.data(), dtype) {
        (Buffer::Int(v), d) if d.is_integer() => {
            Array::from_i64(v.iter().map(|&x| d.wrap_int(x)).collect(), a.shape(), d)
        }
        (_, DType::Bool) => {
            Array::from_bool(a.to_f64_vec().iter().map(|&x| x != 0.0).collect(), a.shape())
        }
        _ => Array::cast_from_f64(a.to_f64_vec(), a.shape(), dtype),
    }
    .map(|out| out.with_device(a.device()))
}

fn to_dtype(args: &[Value], kwargs: &Kwargs) -> KResult<Value> {
    let a = require_tensor(OpKind::ToDtype, args, 0)?;
    let dtype = match args.get(1).or_else(|| kwargs.get("dtype")) {
        Some(Value::DType(d)) => *d,
        Some(other) => {
            return Err(ExecError::runtime(format!(
                "aten.to(): argument 'dtype' must be dtype, not {}",
                other.kind()
            )));
        }
        None => return Err(ExecError::runtime("aten.to(): missing required argument 'dtype'")),
    };
    cast(a, dtype)
        .map(Value::Tensor)
        .map_err(|e| ExecError::runtime(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(data: &[f32], shape: Vec<i64>) -> Value {
        Value::Tensor(Array::from_f32(data, &Shape::new(shape)).unwrap())
    }

    fn ti(data: Vec<i64>, shape: Vec<i64>, dtype: DType) -> Value {
        Value::Tensor(Array::from_i64(data, &Shape::new(shape), dtype).unwrap())
    }

    fn eval(op: OpKind, args: &[Value]) -> KResult<Value> {
        CpuRefBackend.eval_op(op, args, &Kwargs::new(), EvalMode::Native)
    }

    fn floats(v: &Value) -> Vec<f32> {
        v.as_tensor().unwrap().to_f32_vec()
    }

    #[test]
    fn test_add() {
        let out = eval(OpKind::Add, &[t(&[1.0, 2.0, 3.0], vec![3]), t(&[4.0, 5.0, 6.0], vec![3])]).unwrap();
        assert_eq!(floats(&out), vec![5.0, 7.0, 9.0]);
    }

    #[test]
    fn test_add_alpha_and_scalar() {
        let mut kwargs = Kwargs::new();
        kwargs.insert("alpha".into(), Value::Int(2));
        let out = CpuRefBackend
            .eval_op(
                OpKind::Add,
                &[t(&[1.0, 2.0], vec![2]), Value::Float(0.5)],
                &kwargs,
                EvalMode::Native,
            )
            .unwrap();
        assert_eq!(floats(&out), vec![2.0, 3.0]);
    }

    #[test]
    fn test_int_add_wraps() {
        let out = eval(
            OpKind::Add,
            &[ti(vec![127, -128], vec![2], DType::I8), ti(vec![1, -1], vec![2], DType::I8)],
        )
        .unwrap();
        let a = out.as_tensor().unwrap();
        assert_eq!(a.dtype(), DType::I8);
        assert_eq!(a.as_ints().unwrap(), &[-128, 127]);
    }

    #[test]
    fn test_uint8_plus_int8_is_int16() {
        let out = eval(
            OpKind::Add,
            &[ti(vec![200, 0], vec![2], DType::U8), ti(vec![1, -128], vec![2], DType::I8)],
        )
        .unwrap();
        let a = out.as_tensor().unwrap();
        assert_eq!(a.dtype(), DType::I16);
        assert_eq!(a.as_ints().unwrap(), &[201, -128]);
    }

    #[test]
    fn test_div_is_true_division() {
        let out = eval(
            OpKind::Div,
            &[ti(vec![1, 3], vec![2], DType::I32), Value::Int(2)],
        )
        .unwrap();
        let a = out.as_tensor().unwrap();
        assert_eq!(a.dtype(), DType::F32);
        assert_eq!(a.to_f32_vec(), vec![0.5, 1.5]);
    }

    #[test]
    fn test_shape_mismatch_is_runtime() {
        let err = eval(OpKind::Mul, &[t(&[1.0, 2.0], vec![2]), t(&[1.0, 2.0, 3.0], vec![3])]).unwrap_err();
        assert!(matches!(err, ExecError::Runtime(_)));
    }

    #[test]
    fn test_neg_bool_rejected() {
        let b = Value::Tensor(Array::from_bool(vec![true], &Shape::new(vec![1])).unwrap());
        assert!(matches!(eval(OpKind::Neg, &[b]), Err(ExecError::Runtime(_))));
    }

    #[test]
    fn test_matmul() {
        let out = eval(
            OpKind::MatMul,
            &[t(&[1.0, 2.0, 3.0, 4.0], vec![2, 2]), t(&[5.0, 6.0, 7.0, 8.0], vec![2, 2])],
        )
        .unwrap();
        assert_eq!(floats(&out), vec![19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn test_matmul_inner_dim_mismatch() {
        let err = eval(
            OpKind::MatMul,
            &[t(&[1.0; 6], vec![2, 3]), t(&[1.0; 4], vec![2, 2])],
        )
        .unwrap_err();
        assert!(err.to_string().contains("cannot be multiplied"));
    }

    #[test]
    fn test_reduce_sum_axis() {
        let a = t(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]);
        assert_eq!(floats(&eval(OpKind::Sum, &[a.clone(), Value::Int(0)]).unwrap()), vec![5.0, 7.0, 9.0]);
        assert_eq!(floats(&eval(OpKind::Sum, &[a.clone(), Value::Int(-1)]).unwrap()), vec![6.0, 15.0]);
        let all = eval(OpKind::Sum, &[a]).unwrap();
        assert_eq!(all.as_tensor().unwrap().shape(), &Shape::scalar());
        assert_eq!(floats(&all), vec![21.0]);
    }

    #[test]
    fn test_sum_of_ints_is_int64() {
        let out = eval(OpKind::Sum, &[ti(vec![100, 100], vec![2], DType::I8)]).unwrap();
        let a = out.as_tensor().unwrap();
        assert_eq!(a.dtype(), DType::I64);
        assert_eq!(a.as_ints().unwrap(), &[200]);
    }

    #[test]
    fn test_bad_dim_is_index_error() {
        let err = eval(OpKind::Sum, &[t(&[1.0, 2.0], vec![2]), Value::Int(3)]).unwrap_err();
        assert!(matches!(err, ExecError::IndexOutOfBounds(_)));
    }

    #[test]
    fn test_transpose() {
        let out = eval(
            OpKind::Transpose,
            &[t(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]), Value::Int(0), Value::Int(1)],
        )
        .unwrap();
        assert_eq!(out.as_tensor().unwrap().shape(), &Shape::new(vec![3, 2]));
        // [[1,2,3],[4,5,6]] transposed = [[1,4],[2,5],[3,6]]
        assert_eq!(floats(&out), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_softmax() {
        let out = eval(OpKind::Softmax, &[t(&[1.0, 2.0, 3.0], vec![3]), Value::Int(0)]).unwrap();
        let vals = floats(&out);
        let sum: f32 = vals.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        assert!(vals[0] < vals[1]);
        assert!(vals[1] < vals[2]);
    }

    #[test]
    fn test_softmax_widened_matches_native_closely() {
        let x = t(&[0.1, -0.7, 2.5, 1.25, 0.0, -3.0], vec![2, 3]);
        let native = CpuRefBackend
            .eval_op(OpKind::Softmax, &[x.clone(), Value::Int(1)], &Kwargs::new(), EvalMode::Native)
            .unwrap();
        let wide = CpuRefBackend
            .eval_op(OpKind::Softmax, &[x, Value::Int(1)], &Kwargs::new(), EvalMode::Widened)
            .unwrap();
        for (a, b) in floats(&native).iter().zip(floats(&wide)) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_index_select() {
        let x = t(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![3, 2]);
        let idx = ti(vec![2, 0], vec![2], DType::I64);
        let out = eval(OpKind::IndexSelect, &[x, Value::Int(0), idx]).unwrap();
        assert_eq!(floats(&out), vec![5.0, 6.0, 1.0, 2.0]);
    }

    #[test]
    fn test_index_select_out_of_bounds() {
        let x = t(&[1.0, 2.0], vec![2]);
        let idx = ti(vec![i64::MAX - 1], vec![1], DType::I64);
        let err = eval(OpKind::IndexSelect, &[x, Value::Int(0), idx]).unwrap_err();
        assert!(matches!(err, ExecError::IndexOutOfBounds(_)));
    }

    #[test]
    fn test_lerp_endpoints_exact() {
        let s = t(&[1.0, -2.0], vec![2]);
        let e = t(&[3.0, 10.0], vec![2]);
        assert_eq!(floats(&eval(OpKind::Lerp, &[s.clone(), e.clone(), Value::Float(0.0)]).unwrap()), vec![1.0, -2.0]);
        assert_eq!(floats(&eval(OpKind::Lerp, &[s.clone(), e.clone(), Value::Float(1.0)]).unwrap()), vec![3.0, 10.0]);
        assert_eq!(floats(&eval(OpKind::Lerp, &[s, e, Value::Float(0.5)]).unwrap()), vec![2.0, 4.0]);
    }

    #[test]
    fn test_split_returns_list() {
        let x = t(&[1.0, 2.0, 3.0, 4.0, 5.0], vec![5]);
        let out = eval(OpKind::Split, &[x, Value::Int(2)]).unwrap();
        let Value::List(chunks) = out else {
            panic!("split should return a list");
        };
        let sizes: Vec<_> = chunks.iter().map(|c| c.as_tensor().unwrap().numel()).collect();
        assert_eq!(sizes, vec![2, 2, 1]);
        assert_eq!(floats(&chunks[2]), vec![5.0]);
    }

    #[test]
    fn test_cat_along_dim1() {
        let a = t(&[1.0, 2.0], vec![2, 1]);
        let b = t(&[3.0, 4.0, 5.0, 6.0], vec![2, 2]);
        let out = eval(OpKind::Cat, &[Value::List(vec![a, b]), Value::Int(1)]).unwrap();
        assert_eq!(out.as_tensor().unwrap().shape(), &Shape::new(vec![2, 3]));
        assert_eq!(floats(&out), vec![1.0, 3.0, 4.0, 2.0, 5.0, 6.0]);
    }

    #[test]
    fn test_cat_empty_list() {
        assert!(eval(OpKind::Cat, &[Value::List(vec![])]).is_err());
    }

    #[test]
    fn test_to_dtype() {
        let out = eval(OpKind::ToDtype, &[t(&[1.9, -1.9, 300.0], vec![3]), Value::DType(DType::U8)]).unwrap();
        let a = out.as_tensor().unwrap();
        assert_eq!(a.dtype(), DType::U8);
        assert_eq!(a.as_ints().unwrap(), &[1, 255, 44]);
    }
}
