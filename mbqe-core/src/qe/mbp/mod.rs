//! Model-Based Projection.
//!
//! Given formulas `F`, a model `M ⊨ F`, and variables `V`, projection
//! computes a quantifier-free `F'` with `M ⊨ F'` and `F' ⇒ ∃V. F`,
//! optionally together with a witness definition for each eliminated
//! variable. The surrounding framework dispatches over plugins by theory;
//! this module defines the capability surface and the arithmetic plugin.

pub mod arith;

pub use arith::{ArithProjectPlugin, MbpConfig, MbpStats};

use crate::ast::{TermId, TermManager};
use crate::error::Result;
use crate::model::Model;
use mbqe_math::InfEps;

/// Theory a projection plugin handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TheoryFamily {
    /// Linear integer/real arithmetic.
    Arith,
}

/// Witness definition for an eliminated variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MbpDef {
    /// The eliminated variable.
    pub var: TermId,
    /// Its substitution term over surviving variables.
    pub term: TermId,
}

/// Result of objective maximization.
#[derive(Debug, Clone)]
pub struct Maximum {
    /// The optimum as an extended real.
    pub value: InfEps,
    /// Weak bound the model already satisfies.
    pub ge: TermId,
    /// Strict improvement bound; `false` when the objective is unbounded.
    pub gt: TermId,
}

/// Capability surface of a projection plugin.
pub trait ProjectPlugin {
    /// Theory tag used for dispatch.
    fn family(&self) -> TheoryFamily;

    /// Project a single variable; `Ok(true)` iff it was eliminated.
    /// Variables that survive are appended to `vars`.
    fn project1(
        &mut self,
        model: &mut Model,
        var: TermId,
        vars: &mut Vec<TermId>,
        fmls: &mut Vec<TermId>,
        tm: &mut TermManager,
    ) -> Result<bool>;

    /// Project `vars` in place: on return `vars` holds the survivors and
    /// `fmls` the projected formulas.
    fn project(
        &mut self,
        model: &mut Model,
        vars: &mut Vec<TermId>,
        fmls: &mut Vec<TermId>,
        tm: &mut TermManager,
    ) -> Result<()>;

    /// Like [`project`](Self::project), appending one definition per
    /// eliminated variable to `defs`.
    fn project_with_defs(
        &mut self,
        model: &mut Model,
        vars: &mut Vec<TermId>,
        fmls: &mut Vec<TermId>,
        defs: &mut Vec<MbpDef>,
        tm: &mut TermManager,
    ) -> Result<()>;

    /// Maximize `t` subject to `fmls` under the model.
    fn maximize(
        &mut self,
        fmls: &[TermId],
        model: &mut Model,
        t: TermId,
        tm: &mut TermManager,
    ) -> Result<Maximum>;
}
