//! Synthetic input generation.
//!
//! Turns an argument tree recorded against a symbolic graph into concrete
//! values: every tensor-valued node reference becomes a freshly sampled
//! [`Array`] of the recorded shape and dtype. Leaves that cannot be
//! materialized are dropped with a warning, never an error.

use opcheck_core::diagnostics::Diagnostic;
use opcheck_core::graph::{Argument, FakeValue, NodeRef};
use opcheck_core::{Array, DType, Kwargs, Result, Shape, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};

/// Concrete positional and keyword arguments, plus what was dropped on the way.
#[derive(Clone, Debug, PartialEq)]
pub struct WrappedArgs {
    pub args: Vec<Value>,
    pub kwargs: Kwargs,
    pub diagnostics: Vec<Diagnostic>,
}

/// Sample a random array of `shape` and `dtype`.
///
/// Integer dtypes draw uniformly from `[min, max)` of their width, `Bool`
/// elements are true when a uniform `[0, 1)` draw exceeds 0.5, and float
/// dtypes draw standard-normal samples. Fails only for shapes with negative
/// dimensions or an element count that overflows `usize`.
pub fn generate<R: Rng + ?Sized>(shape: &Shape, dtype: DType, rng: &mut R) -> Result<Array> {
    let n = shape.checked_numel()?;
    if let Some(range) = dtype.sampling_range() {
        let data = (0..n).map(|_| rng.random_range(range.clone())).collect();
        return Array::from_i64(data, shape, dtype);
    }
    match dtype {
        DType::Bool => Array::from_bool((0..n).map(|_| rng.random::<f64>() > 0.5).collect(), shape),
        d => Array::from_f64(
            (0..n).map(|_| StandardNormal.sample(&mut *rng)).collect(),
            shape,
            d,
        ),
    }
}

/// Concretize an argument tree and pass keyword arguments through.
pub fn wrap_args<R: Rng + ?Sized>(args: &[Argument], kwargs: Kwargs, rng: &mut R) -> WrappedArgs {
    let mut diagnostics = Vec::new();
    let args = wrap_seq(args, rng, &mut diagnostics);
    WrappedArgs {
        args,
        kwargs,
        diagnostics,
    }
}

fn wrap_seq<R: Rng + ?Sized>(
    items: &[Argument],
    rng: &mut R,
    diagnostics: &mut Vec<Diagnostic>,
) -> Vec<Value> {
    items
        .iter()
        .filter_map(|arg| wrap_one(arg, rng, diagnostics))
        .collect()
}

fn wrap_one<R: Rng + ?Sized>(
    arg: &Argument,
    rng: &mut R,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Value> {
    match arg {
        Argument::Node(node) => wrap_node(node, rng, diagnostics),
        Argument::Seq(items) => Some(Value::List(wrap_seq(items, rng, diagnostics))),
        Argument::Int(v) => Some(Value::Int(*v)),
        Argument::Float(v) => Some(Value::Float(*v)),
        Argument::Bool(v) => Some(Value::Bool(*v)),
        Argument::DType(d) => Some(Value::DType(*d)),
        Argument::Opaque(desc) => {
            drop_leaf(
                diagnostics,
                format!(
                    "Unexpected argument type found: {desc}. Dropping it; this might lead to an error when running the op"
                ),
            );
            None
        }
    }
}

fn wrap_node<R: Rng + ?Sized>(
    node: &NodeRef,
    rng: &mut R,
    diagnostics: &mut Vec<Diagnostic>,
) -> Option<Value> {
    match &node.value {
        FakeValue::Tensor(meta) => match generate(&meta.shape, meta.dtype, rng) {
            Ok(a) => Some(Value::Tensor(a)),
            Err(e) => {
                drop_leaf(
                    diagnostics,
                    format!("Cannot generate input for node {} ({}): {e}, dropping it", node.name, node.id),
                );
                None
            }
        },
        FakeValue::Int(v) => Some(Value::Int(*v)),
        FakeValue::Float(v) => Some(Value::Float(*v)),
        FakeValue::Other(desc) => {
            drop_leaf(
                diagnostics,
                format!(
                    "Unexpected value found on node {} ({}): {desc}. Dropping it; this might lead to an error when running the op",
                    node.name, node.id
                ),
            );
            None
        }
    }
}

fn drop_leaf(diagnostics: &mut Vec<Diagnostic>, message: String) {
    tracing::warn!("{message}");
    diagnostics.push(Diagnostic::warning(message));
}

/// Build the generator RNG: explicit seed, then `OPCHECK_SEED`, then OS entropy.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    let seed = seed.or_else(|| {
        std::env::var("OPCHECK_SEED")
            .ok()
            .and_then(|s| s.trim().parse().ok())
    });
    match seed {
        Some(s) => {
            tracing::debug!(seed = s, "seeding input generator");
            StdRng::seed_from_u64(s)
        }
        None => StdRng::from_os_rng(),
    }
}
