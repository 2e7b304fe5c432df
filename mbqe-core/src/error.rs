//! Error Types.

use thiserror::Error;

/// Errors surfaced by projection operations.
///
/// Opaque literals and non-linear sub-terms are not errors: they are
/// recovered locally by leaving the literal in the residue or treating the
/// term as an atomic engine variable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MbqeError {
    /// Cooperative abort; the caller may retry.
    #[error("projection canceled")]
    Canceled,
    /// Evaluation returned a non-value where a numeral or truth value was
    /// required. Fatal for the current call.
    #[error("model evaluation did not produce a {expected}: {term}")]
    EvaluationNotGround {
        /// What the evaluator was expected to produce.
        expected: &'static str,
        /// Printed form of the offending term.
        term: String,
    },
    /// An internal post-condition failed.
    #[error("internal assumption failed: {0}")]
    AssumptionFailed(String),
    /// Substituting the computed definitions falsified a formula under the
    /// model. Only raised when `apply_projection` is enabled.
    #[error("projection invalidates the model")]
    ProjectionInvalidatesModel,
}

/// Result alias for projection operations.
pub type Result<T> = std::result::Result<T, MbqeError>;
