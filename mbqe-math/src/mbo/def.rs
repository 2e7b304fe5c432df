//! Symbolic Definition Trees.
//!
//! When a variable is eliminated, the engine can report a witness term for
//! it: an algebraic expression over the surviving engine variables. The
//! caller converts these trees back into its own term language.

use super::{LinExpr, VarId};
use num_rational::BigRational;
use num_traits::{One, Zero};

/// Witness expression for an eliminated variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefTree {
    /// Rational constant.
    Const(BigRational),
    /// Engine variable scaled by a coefficient.
    Var(VarId, BigRational),
    /// Sum of two subtrees.
    Add(Box<DefTree>, Box<DefTree>),
    /// Product of two subtrees.
    Mul(Box<DefTree>, Box<DefTree>),
    /// Division by a positive constant; floor division for integer targets.
    Div(Box<DefTree>, BigRational),
}

impl DefTree {
    /// Sum constructor; folds away zero constants.
    pub fn add(x: DefTree, y: DefTree) -> DefTree {
        match (x, y) {
            (DefTree::Const(a), y) if a.is_zero() => y,
            (x, DefTree::Const(b)) if b.is_zero() => x,
            (DefTree::Const(a), DefTree::Const(b)) => DefTree::Const(a + b),
            (x, y) => DefTree::Add(Box::new(x), Box::new(y)),
        }
    }

    /// Scale by a constant; folds unit and zero factors.
    pub fn mul_const(c: &BigRational, x: DefTree) -> DefTree {
        if c.is_zero() {
            return DefTree::Const(BigRational::zero());
        }
        if c.is_one() {
            return x;
        }
        match x {
            DefTree::Const(a) => DefTree::Const(c * a),
            DefTree::Var(v, w) => DefTree::Var(v, c * w),
            x => DefTree::Mul(Box::new(DefTree::Const(c.clone())), Box::new(x)),
        }
    }

    /// Divide by a positive constant.
    pub fn div_const(x: DefTree, d: BigRational) -> DefTree {
        debug_assert!(d > BigRational::zero());
        if d.is_one() {
            return x;
        }
        DefTree::Div(Box::new(x), d)
    }

    /// Build a sum tree from a linear expression.
    pub fn from_linear(e: &LinExpr) -> DefTree {
        let mut acc = if e.constant.is_zero() && !e.vars.is_empty() {
            None
        } else {
            Some(DefTree::Const(e.constant.clone()))
        };
        for rv in &e.vars {
            let term = DefTree::Var(rv.id, rv.coeff.clone());
            acc = Some(match acc {
                Some(t) => DefTree::add(t, term),
                None => term,
            });
        }
        acc.unwrap_or(DefTree::Const(BigRational::zero()))
    }

    /// Evaluate under a variable assignment using exact rational division.
    ///
    /// Integer-target `Div` nodes floor instead; callers that care use the
    /// term-level evaluator after reconstruction. This form is for checks on
    /// real-valued trees.
    pub fn eval_with(&self, lookup: &impl Fn(VarId) -> BigRational) -> BigRational {
        match self {
            DefTree::Const(q) => q.clone(),
            DefTree::Var(v, c) => c * lookup(*v),
            DefTree::Add(x, y) => x.eval_with(lookup) + y.eval_with(lookup),
            DefTree::Mul(x, y) => x.eval_with(lookup) * y.eval_with(lookup),
            DefTree::Div(x, d) => x.eval_with(lookup) / d,
        }
    }
}
