//! Cross-backend validation.
//!
//! A [`Validator`] runs the same call on a reference function and a candidate
//! function, classifies execution failures, and compares every flattened
//! output pair within a [`Tolerance`]. Everything that can go wrong with the
//! backends ends up as a [`Finding`] in the returned [`Report`]; only broken
//! calling contracts surface as [`ContractViolation`] errors.

pub mod compare;
pub mod config;
pub mod outcome;
pub mod validator;

pub use compare::{Mismatch, Tolerance, compare};
pub use config::ValidatorConfig;
pub use outcome::{Finding, Outcome, Report, Side};
pub use validator::Validator;

/// Calling-contract breaches. These are bugs in the caller, not findings.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractViolation {
    #[error("reference {reference} produced no outputs")]
    EmptyExpected { reference: String },

    #[error("output arity mismatch: reference produced {expected} leaves, candidate produced {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("node {0} is not an op call")]
    NotACall(String),
}
