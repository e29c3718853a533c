//! Validator configuration.

use opcheck_core::backend::{EvalMode, default_eval_mode};
use serde::Serialize;

use crate::Tolerance;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct ValidatorConfig {
    pub tolerance: Tolerance,
    /// Evaluation mode passed to both sides of every call.
    pub mode: EvalMode,
}

impl ValidatorConfig {
    /// Defaults, with the evaluation mode taken from `OPCHECK_EVAL_MODE`.
    pub fn from_env() -> Self {
        Self {
            mode: default_eval_mode(),
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: EvalMode) -> Self {
        self.mode = mode;
        self
    }
}
