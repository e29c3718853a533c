//! The validation driver.

use std::sync::Arc;

use opcheck_core::backend::{Backend, CandidateFn, EagerOp, ExecError, Interop, ReferenceFn};
use opcheck_core::graph::{Graph, Node, NodeId, NodeKind, OpKind};
use opcheck_core::{Kwargs, Value};
use rand::Rng;

use crate::compare::compare;
use crate::outcome::{Finding, Outcome, Report, Side};
use crate::{ContractViolation, ValidatorConfig};

/// Runs reference and candidate functions side by side.
#[derive(Clone, Debug, Default)]
pub struct Validator<I> {
    interop: I,
    config: ValidatorConfig,
}

impl<I: Interop> Validator<I> {
    pub fn new(interop: I, config: ValidatorConfig) -> Self {
        Self { interop, config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    pub fn interop(&self) -> &I {
        &self.interop
    }

    /// Validate one call.
    ///
    /// Execution failures end the call with a single finding. Otherwise every
    /// flattened output pair is compared and each mismatch becomes its own
    /// finding. Errors are returned only when the reference produced no
    /// outputs or the two sides disagree on how many they produced.
    pub fn validate<R, C>(
        &self,
        reference: &R,
        candidate: &C,
        args: &[Value],
        kwargs: &Kwargs,
    ) -> Result<Report, ContractViolation>
    where
        R: ReferenceFn + ?Sized,
        C: CandidateFn<I> + ?Sized,
    {
        let (ref_name, cand_name) = (reference.name(), candidate.name());
        let mut report = Report::new(&ref_name, &cand_name);
        let mode = self.config.mode;
        tracing::debug!(reference = %ref_name, candidate = %cand_name, ?mode, "validating");

        let expected = match reference.call(args, kwargs, mode) {
            Ok(v) => v,
            Err(err) => {
                report.findings.push(reference_failure(&ref_name, err));
                return Ok(report);
            }
        };

        let inputs: Vec<I::Input> = args.iter().map(|v| self.interop.to_candidate(v)).collect();
        let candidate_kwargs = self.interop.kwargs_to_candidate(kwargs);

        let actual = match candidate.call(&inputs, &candidate_kwargs, mode) {
            Ok(out) => out,
            Err(err) => {
                report.findings.push(candidate_failure(&cand_name, err));
                return Ok(report);
            }
        };

        let expected = expected.flatten();
        let actual = actual.flatten();
        if expected.is_empty() {
            return Err(ContractViolation::EmptyExpected { reference: ref_name });
        }
        if expected.len() != actual.len() {
            return Err(ContractViolation::ArityMismatch {
                expected: expected.len(),
                actual: actual.len(),
            });
        }

        for (position, (e, a)) in expected.into_iter().zip(actual).enumerate() {
            let a = self.interop.to_dense(a);
            let detail = match e.to_array() {
                Some(Ok(e)) => match compare(&a, &e, &self.config.tolerance) {
                    Ok(()) => continue,
                    Err(m) => m.to_string(),
                },
                Some(Err(err)) => format!("expected output could not be materialized: {err}"),
                None => format!("expected output is a non-numeric {}", e.kind()),
            };
            report.findings.push(Finding {
                message: format!(
                    "Op {ref_name} has mismatched output {position}. Please check the implementation of {cand_name}.\n{detail}"
                ),
                outcome: Outcome::FailedValueMismatch { position, detail },
            });
        }

        if report.is_success() {
            tracing::debug!(reference = %ref_name, "outputs match");
        }
        Ok(report)
    }

    /// Validate `op` on `backend` against `candidate` with concrete arguments.
    pub fn validate_op<C>(
        &self,
        op: OpKind,
        backend: Arc<dyn Backend>,
        candidate: &C,
        args: &[Value],
        kwargs: &Kwargs,
    ) -> Result<Report, ContractViolation>
    where
        C: CandidateFn<I> + ?Sized,
    {
        self.validate(&EagerOp::new(op, backend), candidate, args, kwargs)
    }

    /// Validate one call node with fresh random inputs.
    ///
    /// The node's arguments are concretized with [`opcheck_gen::wrap_args`]; any
    /// argument dropped on the way is kept as a note on the report.
    pub fn validate_node<C, G>(
        &self,
        node: &Node,
        backend: Arc<dyn Backend>,
        candidate: &C,
        rng: &mut G,
    ) -> Result<Report, ContractViolation>
    where
        C: CandidateFn<I> + ?Sized,
        G: Rng + ?Sized,
    {
        let NodeKind::Call { op, args, kwargs } = &node.kind else {
            return Err(ContractViolation::NotACall(node.name.clone()));
        };
        let wrapped = opcheck_gen::wrap_args(args, kwargs.clone(), rng);
        let mut report = self.validate_op(*op, backend, candidate, &wrapped.args, &wrapped.kwargs)?;
        report.notes = wrapped.diagnostics;
        Ok(report)
    }

    /// Validate every call node `outputs` depend on, inputs first.
    ///
    /// `candidate_for` supplies the candidate for each node's op. Reports come
    /// back in topological order.
    pub fn validate_graph<C, F, G>(
        &self,
        graph: &Graph,
        outputs: &[NodeId],
        backend: Arc<dyn Backend>,
        candidate_for: F,
        rng: &mut G,
    ) -> Result<Vec<Report>, ContractViolation>
    where
        C: CandidateFn<I>,
        F: Fn(OpKind) -> C,
        G: Rng + ?Sized,
    {
        graph
            .topo_sort(outputs)
            .into_iter()
            .filter_map(|id| graph.get(id))
            .filter_map(|node| match &node.kind {
                NodeKind::Call { op, .. } => Some((node, *op)),
                NodeKind::Placeholder => None,
            })
            .map(|(node, op)| self.validate_node(node, Arc::clone(&backend), &candidate_for(op), &mut *rng))
            .collect()
    }
}

fn reference_failure(name: &str, err: ExecError) -> Finding {
    match err {
        ExecError::IndexOutOfBounds(_) => Finding {
            message: format!(
                "Bypass the test of running on reference op {name} with {err}. \
                 This is possibly raised by unsupported random dims/indices (INT64)."
            ),
            outcome: Outcome::BypassedExecutionError {
                side: Side::Reference,
                error: err.to_string(),
            },
        },
        _ => Finding {
            message: format!("Fail the test of running on reference op {name} with {err}."),
            outcome: Outcome::FailedExecutionError {
                side: Side::Reference,
                error: err.to_string(),
            },
        },
    }
}

fn candidate_failure(name: &str, err: ExecError) -> Finding {
    match err {
        ExecError::ArgumentMismatch(_) => Finding {
            message: format!(
                "Bypass the test of running on candidate {name} with {err}. \
                 This is possibly raised by an args/kwargs split the candidate does not accept."
            ),
            outcome: Outcome::BypassedMismatch {
                error: err.to_string(),
            },
        },
        _ => Finding {
            message: format!("Fail the test of running on candidate {name} with {err}."),
            outcome: Outcome::FailedExecutionError {
                side: Side::Candidate,
                error: err.to_string(),
            },
        },
    }
}
