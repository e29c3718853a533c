//! Classified results of a validation call.

use opcheck_core::diagnostics::{Diagnostic, DiagnosticSink, Level};
use serde::Serialize;

/// Which side of the call raised.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Reference,
    Candidate,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Reference => write!(f, "reference"),
            Side::Candidate => write!(f, "candidate"),
        }
    }
}

/// Classification of one validation call, or of one output pair within it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    /// The candidate rejected the argument split it was given.
    BypassedMismatch { error: String },
    /// Execution failed in a way attributed to the random inputs.
    BypassedExecutionError { side: Side, error: String },
    FailedExecutionError { side: Side, error: String },
    /// Output `position` of the flattened outputs is not close.
    FailedValueMismatch { position: usize, detail: String },
}

impl Outcome {
    /// Severity, `None` for success.
    pub fn level(&self) -> Option<Level> {
        match self {
            Outcome::Success => None,
            Outcome::BypassedMismatch { .. } | Outcome::BypassedExecutionError { .. } => {
                Some(Level::Warning)
            }
            Outcome::FailedExecutionError { .. } | Outcome::FailedValueMismatch { .. } => {
                Some(Level::Error)
            }
        }
    }

    pub fn is_bypass(&self) -> bool {
        self.level() == Some(Level::Warning)
    }
}

/// One reported outcome with its rendered message.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Finding {
    pub outcome: Outcome,
    pub message: String,
}

impl Finding {
    pub fn level(&self) -> Level {
        self.outcome.level().unwrap_or(Level::Warning)
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            level: self.level(),
            message: self.message.clone(),
        }
    }
}

/// Everything one validation call produced. No findings means success.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Report {
    pub reference: String,
    pub candidate: String,
    /// Warnings raised while building the call's inputs.
    pub notes: Vec<Diagnostic>,
    pub findings: Vec<Finding>,
}

impl Report {
    pub fn new(reference: impl Into<String>, candidate: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            candidate: candidate.into(),
            notes: Vec::new(),
            findings: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.findings.is_empty()
    }

    /// Overall classification: the first finding, or success.
    pub fn outcome(&self) -> Outcome {
        self.findings
            .first()
            .map(|f| f.outcome.clone())
            .unwrap_or(Outcome::Success)
    }

    pub fn outcomes(&self) -> impl Iterator<Item = &Outcome> {
        self.findings.iter().map(|f| &f.outcome)
    }

    /// Notes followed by findings, in the order they were raised.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.notes
            .iter()
            .cloned()
            .chain(self.findings.iter().map(Finding::to_diagnostic))
            .collect()
    }

    pub fn emit_to<S: DiagnosticSink + ?Sized>(&self, sink: &mut S) {
        for d in self.diagnostics() {
            sink.emit(&d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(outcome: Outcome) -> Finding {
        Finding {
            outcome,
            message: "m".into(),
        }
    }

    #[test]
    fn test_levels() {
        assert_eq!(Outcome::Success.level(), None);
        assert!(Outcome::BypassedMismatch { error: "e".into() }.is_bypass());
        assert_eq!(
            Outcome::FailedValueMismatch { position: 0, detail: String::new() }.level(),
            Some(Level::Error)
        );
    }

    #[test]
    fn test_report_outcome_and_emit() {
        let mut report = Report::new("aten.add", "onnx::Add");
        assert!(report.is_success());
        assert_eq!(report.outcome(), Outcome::Success);

        report.notes.push(Diagnostic::warning("dropped"));
        report.findings.push(finding(Outcome::FailedExecutionError {
            side: Side::Candidate,
            error: "boom".into(),
        }));
        let mut sink: Vec<Diagnostic> = Vec::new();
        report.emit_to(&mut sink);
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[0].level, Level::Warning);
        assert_eq!(sink[1].level, Level::Error);
        assert!(!report.is_success());
    }

    #[test]
    fn test_outcome_json() {
        let o = Outcome::BypassedExecutionError {
            side: Side::Reference,
            error: "IndexError: x".into(),
        };
        let json = serde_json::to_string(&o).unwrap();
        assert_eq!(
            json,
            r#"{"kind":"bypassed_execution_error","side":"reference","error":"IndexError: x"}"#
        );
    }
}
