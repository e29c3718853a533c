use std::process::ExitCode;

use clap::{Parser, Subcommand};
use opcheck_core::backend::{EvalMode, default_backend, default_eval_mode};
use opcheck_core::diagnostics::{Level, TracingSink};
use opcheck_core::graph::OpKind;
use opcheck_core::{DType, Shape};
use opcheck_gen::seeded_rng;
use opcheck_host::{HostInterop, translate};
use opcheck_validate::{Report, Validator, ValidatorConfig};
use tracing_subscriber::EnvFilter;

mod cases;

#[derive(Parser)]
#[command(name = "opcheck")]
#[command(about = "Validate translated ops against the eager reference")]
struct Args {
    /// Evaluation mode for both backends (defaults to OPCHECK_EVAL_MODE, then native).
    #[arg(long, global = true)]
    mode: Option<EvalMode>,

    /// Seed for input generation (defaults to OPCHECK_SEED, then OS entropy).
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Validate every supported op on generated inputs.
    Smoke,
    /// Validate a single op.
    Validate {
        /// Op name, e.g. `add` or `aten.index_select`.
        #[arg(long)]
        op: OpKind,
        /// Input shape, comma separated.
        #[arg(long, value_delimiter = ',', default_value = "2,3")]
        shape: Vec<i64>,
        #[arg(long, default_value = "float32")]
        dtype: DType,
        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mode = args.mode.unwrap_or_else(default_eval_mode);
    let validator = Validator::new(HostInterop, ValidatorConfig::from_env().with_mode(mode));

    let result = match args.cmd {
        Cmd::Smoke => smoke(&validator, args.seed),
        Cmd::Validate {
            op,
            shape,
            dtype,
            json,
        } => validate(&validator, op, &Shape::new(shape), dtype, args.seed, json),
    };
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(2)
        }
    }
}

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn run_one(
    validator: &Validator<HostInterop>,
    op: OpKind,
    shape: &Shape,
    dtype: DType,
    seed: Option<u64>,
) -> CliResult<Report> {
    let (graph, call) = cases::build(op, shape, dtype)?;
    let mut reports = validator.validate_graph(&graph, &[call], default_backend(), translate, &mut seeded_rng(seed))?;
    let report = reports.pop().ok_or("graph has no call node")?;
    Ok(report)
}

fn has_errors(report: &Report) -> bool {
    report.findings.iter().any(|f| f.level() == Level::Error)
}

fn smoke(validator: &Validator<HostInterop>, seed: Option<u64>) -> CliResult<bool> {
    println!("Reference: CPU eager backend ({:?} mode)", validator.config().mode);
    println!("Candidate: host ONNX translations\n");

    let mut failed = 0;
    for op in OpKind::ALL {
        let (shape, dtype) = cases::smoke_input(op);
        tracing::debug!(op = op.name(), %shape, %dtype, "smoke");
        let report = run_one(validator, op, &shape, dtype, seed)?;
        report.emit_to(&mut TracingSink);
        let status = match report.findings.first() {
            None => "PASS",
            Some(f) if f.outcome.is_bypass() => "BYPASS",
            Some(_) => "FAIL",
        };
        if has_errors(&report) {
            failed += 1;
        }
        println!("{status:<7}{:<20} {shape} {dtype}", op.name());
    }

    tracing::info!(ops = OpKind::ALL.len(), failed, "smoke run finished");
    if failed == 0 {
        println!("\nAll smoke validations passed.");
    } else {
        println!("\n{failed} op(s) failed validation.");
    }
    Ok(failed == 0)
}

fn validate(
    validator: &Validator<HostInterop>,
    op: OpKind,
    shape: &Shape,
    dtype: DType,
    seed: Option<u64>,
    json: bool,
) -> CliResult<bool> {
    let report = run_one(validator, op, shape, dtype, seed)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for d in report.diagnostics() {
            println!("{d}");
        }
        if report.is_success() {
            println!("PASS {} vs {}", report.reference, report.candidate);
        }
    }
    Ok(!has_errors(&report))
}
