//! Validation gate: every reference op against its host translation.
//!
//! Each case builds a one-call graph, concretizes it with seeded random
//! inputs and validates it in both evaluation modes.
//!
//! Run with: `cargo test -p opcheck-validate --test gate`

use opcheck_core::backend::{EvalMode, default_backend};
use opcheck_core::graph::{Argument, FakeValue, Graph, OpKind, TensorMeta};
use opcheck_core::{DType, Kwargs, Value};
use opcheck_gen::seeded_rng;
use opcheck_host::{HostInterop, translate};
use opcheck_validate::{Outcome, Report, Side, Validator, ValidatorConfig};

/// Argument builder for one case: receives the graph, returns (args, kwargs).
type Build = fn(&mut Graph) -> (Vec<Argument>, Kwargs);

fn tensor(g: &mut Graph, name: &str, dims: &[i64], dtype: DType) -> Argument {
    let id = g.add_placeholder(name, FakeValue::Tensor(TensorMeta::new(dims.to_vec(), dtype)));
    g.arg(id).expect("placeholder exists")
}

fn kw(pairs: &[(&str, Value)]) -> Kwargs {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

fn run_case(op: OpKind, build: Build, mode: EvalMode, seed: u64) -> Report {
    let mut g = Graph::new();
    let (args, kwargs) = build(&mut g);
    let call = g
        .add_call(op.name(), op, args, kwargs, FakeValue::Other("unused".into()))
        .expect("call node");
    let node = g.get(call).expect("call node exists");

    let validator = Validator::new(HostInterop, ValidatorConfig::default().with_mode(mode));
    validator
        .validate_node(node, default_backend(), &translate(op), &mut seeded_rng(Some(seed)))
        .expect("no contract violation")
}

fn case(name: &'static str, op: OpKind, build: Build) -> (&'static str, OpKind, Build) {
    (name, op, build)
}

fn cases() -> Vec<(&'static str, OpKind, Build)> {
    vec![
        case("add", OpKind::Add, |g| {
            (vec![tensor(g, "a", &[8, 16], DType::F32), tensor(g, "b", &[8, 16], DType::F32)], Kwargs::new())
        }),
        case("add_alpha", OpKind::Add, |g| {
            (
                vec![tensor(g, "a", &[8, 16], DType::F32), tensor(g, "b", &[8, 16], DType::F32)],
                kw(&[("alpha", Value::Float(0.5))]),
            )
        }),
        case("add_int32_wraps", OpKind::Add, |g| {
            (vec![tensor(g, "a", &[64], DType::I32), tensor(g, "b", &[64], DType::I32)], Kwargs::new())
        }),
        case("sub_scalar", OpKind::Sub, |g| {
            (vec![tensor(g, "a", &[4, 4], DType::F64), Argument::Float(1.5)], Kwargs::new())
        }),
        case("mul_int8", OpKind::Mul, |g| {
            (vec![tensor(g, "a", &[32], DType::I8), tensor(g, "b", &[32], DType::I8)], Kwargs::new())
        }),
        case("div", OpKind::Div, |g| {
            (vec![tensor(g, "a", &[16], DType::F32), tensor(g, "b", &[16], DType::F32)], Kwargs::new())
        }),
        case("neg", OpKind::Neg, |g| (vec![tensor(g, "a", &[3, 5], DType::I16)], Kwargs::new())),
        case("exp", OpKind::Exp, |g| (vec![tensor(g, "a", &[3, 5], DType::F32)], Kwargs::new())),
        case("sqrt_u8", OpKind::Sqrt, |g| (vec![tensor(g, "a", &[3, 5], DType::U8)], Kwargs::new())),
        case("sum_all", OpKind::Sum, |g| (vec![tensor(g, "a", &[16, 16], DType::F32)], Kwargs::new())),
        case("sum_dim_keepdim", OpKind::Sum, |g| {
            (
                vec![tensor(g, "a", &[4, 8, 3], DType::F32), Argument::Int(1)],
                kw(&[("keepdim", Value::Bool(true))]),
            )
        }),
        case("sum_int64", OpKind::Sum, |g| (vec![tensor(g, "a", &[5, 5], DType::I64)], Kwargs::new())),
        case("matmul", OpKind::MatMul, |g| {
            (vec![tensor(g, "a", &[8, 16], DType::F32), tensor(g, "b", &[16, 4], DType::F32)], Kwargs::new())
        }),
        case("transpose", OpKind::Transpose, |g| {
            (
                vec![tensor(g, "a", &[2, 3, 4], DType::F32), Argument::Int(0), Argument::Int(-1)],
                Kwargs::new(),
            )
        }),
        case("softmax", OpKind::Softmax, |g| {
            (vec![tensor(g, "a", &[6, 10], DType::F32), Argument::Int(-1)], Kwargs::new())
        }),
        case("lerp_low", OpKind::Lerp, |g| {
            (
                vec![tensor(g, "s", &[12], DType::F32), tensor(g, "e", &[12], DType::F32), Argument::Float(0.3)],
                Kwargs::new(),
            )
        }),
        case("lerp_high", OpKind::Lerp, |g| {
            (
                vec![tensor(g, "s", &[12], DType::F32), tensor(g, "e", &[12], DType::F32), Argument::Float(0.8)],
                Kwargs::new(),
            )
        }),
        case("split", OpKind::Split, |g| {
            (
                vec![tensor(g, "a", &[4, 7], DType::F32), Argument::Int(3), Argument::Int(1)],
                Kwargs::new(),
            )
        }),
        case("cat", OpKind::Cat, |g| {
            let parts = vec![tensor(g, "a", &[2, 3], DType::I32), tensor(g, "b", &[4, 3], DType::I32)];
            (vec![Argument::Seq(parts), Argument::Int(0)], Kwargs::new())
        }),
        case("to_int32", OpKind::ToDtype, |g| {
            (vec![tensor(g, "a", &[10], DType::F32), Argument::DType(DType::I32)], Kwargs::new())
        }),
        case("to_placement_kwargs", OpKind::ToDtype, |g| {
            (
                vec![tensor(g, "a", &[10], DType::I64)],
                kw(&[
                    ("dtype", Value::DType(DType::F64)),
                    ("device", Value::Str("cpu".into())),
                    ("pin_memory", Value::Bool(false)),
                ]),
            )
        }),
    ]
}

/// The gate: every case must validate cleanly in both modes.
#[test]
fn validation_gate() {
    let _ = tracing_subscriber::fmt::try_init();
    for mode in [EvalMode::Native, EvalMode::Widened] {
        for (seed, (name, op, build)) in cases().into_iter().enumerate() {
            let report = run_case(op, build, mode, seed as u64);
            assert!(
                report.is_success(),
                "{name} ({mode:?}) failed: {:#?}",
                report.findings
            );
            eprintln!("  PASS {name} ({mode:?})");
        }
    }
}

/// Random INT64 indices fall outside any small dimension; the reference
/// rejects them and the call is bypassed rather than failed.
#[test]
fn index_select_with_random_indices_is_bypassed() {
    let report = run_case(
        OpKind::IndexSelect,
        |g| {
            (
                vec![tensor(g, "a", &[6, 2], DType::F32), Argument::Int(0), tensor(g, "i", &[4], DType::I64)],
                Kwargs::new(),
            )
        },
        EvalMode::Native,
        1,
    );
    assert_eq!(report.findings.len(), 1);
    assert!(matches!(
        report.outcome(),
        Outcome::BypassedExecutionError { side: Side::Reference, .. }
    ));
}
