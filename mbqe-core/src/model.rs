//! Models and Evaluation.
//!
//! A [`Model`] maps terms to concrete values; a [`ModelEvaluator`] computes
//! the value of arbitrary terms under it. With model completion enabled the
//! evaluator is total on well-sorted terms: unassigned symbols are
//! fabricated (false / zero) and recorded back into the model, so later
//! queries stay consistent.
//!
//! Arithmetic follows SMT-LIB: `div`/`mod` are Euclidean, division by zero
//! evaluates to [`Value::Undefined`] rather than failing.

use crate::ast::{TermId, TermKind, TermManager};
use crate::sort::SortKind;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{Signed, Zero};
use rustc_hash::FxHashMap;
use std::fmt;

/// Value in a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Boolean value.
    Bool(bool),
    /// Integer value.
    Int(BigInt),
    /// Rational value.
    Rational(BigRational),
    /// No value (evaluation failure without completion).
    Undefined,
}

impl Value {
    /// True for `Bool`.
    pub fn is_bool(&self) -> bool {
        matches!(self, Value::Bool(_))
    }

    /// Boolean payload.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// True exactly for `Bool(true)`.
    pub fn is_true(&self) -> bool {
        matches!(self, Value::Bool(true))
    }

    /// True exactly for `Bool(false)`.
    pub fn is_false(&self) -> bool {
        matches!(self, Value::Bool(false))
    }

    /// True for `Int`.
    pub fn is_int(&self) -> bool {
        matches!(self, Value::Int(_))
    }

    /// Integer payload.
    pub fn as_int(&self) -> Option<&BigInt> {
        match self {
            Value::Int(n) => Some(n),
            _ => None,
        }
    }

    /// True for `Rational`.
    pub fn is_rational(&self) -> bool {
        matches!(self, Value::Rational(_))
    }

    /// Rational payload.
    pub fn as_rational(&self) -> Option<&BigRational> {
        match self {
            Value::Rational(q) => Some(q),
            _ => None,
        }
    }

    /// True for `Undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Numeric view: integers and rationals as a rational.
    pub fn to_rational(&self) -> Option<BigRational> {
        match self {
            Value::Int(n) => Some(BigRational::from_integer(n.clone())),
            Value::Rational(q) => Some(q.clone()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(n) => write!(f, "{}", n),
            Value::Rational(q) => write!(f, "{}", q),
            Value::Undefined => write!(f, "undefined"),
        }
    }
}

/// Assignment from terms to values.
#[derive(Debug, Clone, Default)]
pub struct Model {
    assignments: FxHashMap<TermId, Value>,
}

impl Model {
    /// Create an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign a value to a term.
    pub fn assign(&mut self, t: TermId, v: Value) {
        self.assignments.insert(t, v);
    }

    /// Value assigned to a term, if any.
    pub fn get(&self, t: TermId) -> Option<&Value> {
        self.assignments.get(&t)
    }

    /// Iterate over the assignments.
    pub fn iter(&self) -> impl Iterator<Item = (&TermId, &Value)> {
        self.assignments.iter()
    }
}

/// Evaluator with optional model completion.
pub struct ModelEvaluator<'m> {
    model: &'m mut Model,
    completion: bool,
    cache: FxHashMap<TermId, Value>,
}

impl<'m> ModelEvaluator<'m> {
    /// Evaluator over a model, completion disabled.
    pub fn new(model: &'m mut Model) -> Self {
        Self {
            model,
            completion: false,
            cache: FxHashMap::default(),
        }
    }

    /// Toggle model completion (fabricate-and-record defaults).
    pub fn set_model_completion(&mut self, on: bool) {
        self.completion = on;
    }

    /// The underlying model.
    pub fn model(&self) -> &Model {
        self.model
    }

    /// Evaluate a term. Total on well-sorted terms under completion,
    /// except for division by zero.
    pub fn eval(&mut self, t: TermId, tm: &TermManager) -> Value {
        if let Some(v) = self.model.get(t) {
            return v.clone();
        }
        if let Some(v) = self.cache.get(&t) {
            return v.clone();
        }
        let Some(term) = tm.get(t) else {
            return Value::Undefined;
        };
        let sort = term.sort;
        let v = match term.kind.clone() {
            TermKind::True => Value::Bool(true),
            TermKind::False => Value::Bool(false),
            TermKind::IntConst(n) => Value::Int(n),
            TermKind::RealConst(q) => Value::Rational(q),
            TermKind::Var(_) => {
                if self.completion {
                    let d = match tm.sorts.kind(sort) {
                        SortKind::Bool => Value::Bool(false),
                        SortKind::Int => Value::Int(BigInt::zero()),
                        SortKind::Real => Value::Rational(BigRational::zero()),
                    };
                    self.model.assign(t, d.clone());
                    d
                } else {
                    Value::Undefined
                }
            }
            TermKind::Add(args) => self.eval_fold(&args, tm, sort, |a, b| a + b),
            TermKind::Mul(args) => self.eval_fold(&args, tm, sort, |a, b| a * b),
            TermKind::Sub(a, b) => match (self.eval_q(a, tm), self.eval_q(b, tm)) {
                (Some(x), Some(y)) => self.mk_num(tm, sort, x - y),
                _ => Value::Undefined,
            },
            TermKind::Neg(a) => match self.eval_q(a, tm) {
                Some(x) => self.mk_num(tm, sort, -x),
                None => Value::Undefined,
            },
            TermKind::Div(a, b) => match (self.eval_q(a, tm), self.eval_q(b, tm)) {
                (Some(x), Some(y)) if !y.is_zero() => {
                    if tm.is_int(t) {
                        self.mk_num(tm, sort, euclid_div(&x, &y))
                    } else {
                        self.mk_num(tm, sort, x / y)
                    }
                }
                _ => Value::Undefined,
            },
            TermKind::Mod(a, b) => match (self.eval_q(a, tm), self.eval_q(b, tm)) {
                (Some(x), Some(y)) if !y.is_zero() => {
                    let r = &x - &y * euclid_div(&x, &y);
                    self.mk_num(tm, sort, r)
                }
                _ => Value::Undefined,
            },
            TermKind::Ite(c, a, b) => match self.eval(c, tm) {
                Value::Bool(true) => self.eval(a, tm),
                Value::Bool(false) => self.eval(b, tm),
                _ => Value::Undefined,
            },
            TermKind::Not(a) => match self.eval(a, tm) {
                Value::Bool(b) => Value::Bool(!b),
                _ => Value::Undefined,
            },
            TermKind::And(args) => {
                let mut out = Value::Bool(true);
                for &a in &args {
                    match self.eval(a, tm) {
                        Value::Bool(false) => {
                            out = Value::Bool(false);
                            break;
                        }
                        Value::Bool(true) => {}
                        _ => out = Value::Undefined,
                    }
                }
                out
            }
            TermKind::Or(args) => {
                let mut out = Value::Bool(false);
                for &a in &args {
                    match self.eval(a, tm) {
                        Value::Bool(true) => {
                            out = Value::Bool(true);
                            break;
                        }
                        Value::Bool(false) => {}
                        _ => out = Value::Undefined,
                    }
                }
                out
            }
            TermKind::Eq(a, b) => {
                let (va, vb) = (self.eval(a, tm), self.eval(b, tm));
                match (va.to_rational(), vb.to_rational()) {
                    (Some(x), Some(y)) => Value::Bool(x == y),
                    _ => match (va, vb) {
                        (Value::Bool(x), Value::Bool(y)) => Value::Bool(x == y),
                        _ => Value::Undefined,
                    },
                }
            }
            TermKind::Le(a, b) => self.eval_cmp(a, b, tm, |o| o != std::cmp::Ordering::Greater),
            TermKind::Lt(a, b) => self.eval_cmp(a, b, tm, |o| o == std::cmp::Ordering::Less),
            TermKind::Ge(a, b) => self.eval_cmp(a, b, tm, |o| o != std::cmp::Ordering::Less),
            TermKind::Gt(a, b) => self.eval_cmp(a, b, tm, |o| o == std::cmp::Ordering::Greater),
            TermKind::Distinct(args) => {
                let mut vals = Vec::with_capacity(args.len());
                let mut ok = true;
                for &a in &args {
                    let v = self.eval(a, tm);
                    if v.is_undefined() {
                        ok = false;
                        break;
                    }
                    vals.push(v);
                }
                if !ok {
                    Value::Undefined
                } else {
                    let mut distinct = true;
                    'outer: for i in 0..vals.len() {
                        for j in i + 1..vals.len() {
                            if vals[i] == vals[j] {
                                distinct = false;
                                break 'outer;
                            }
                        }
                    }
                    Value::Bool(distinct)
                }
            }
        };
        if !v.is_undefined() {
            // Undefined is not cached: enabling completion later may turn
            // the same term into a value
            self.cache.insert(t, v.clone());
        }
        v
    }

    /// Evaluate to a rational, if the term is numeric under the model.
    pub fn eval_rational(&mut self, t: TermId, tm: &TermManager) -> Option<BigRational> {
        self.eval(t, tm).to_rational()
    }

    /// True when the term evaluates to `Bool(true)`.
    pub fn is_true(&mut self, t: TermId, tm: &TermManager) -> bool {
        self.eval(t, tm).is_true()
    }

    /// True when the term evaluates to `Bool(false)`.
    pub fn is_false(&mut self, t: TermId, tm: &TermManager) -> bool {
        self.eval(t, tm).is_false()
    }

    fn eval_q(&mut self, t: TermId, tm: &TermManager) -> Option<BigRational> {
        self.eval(t, tm).to_rational()
    }

    fn eval_fold(
        &mut self,
        args: &[TermId],
        tm: &TermManager,
        sort: crate::sort::SortId,
        op: impl Fn(BigRational, BigRational) -> BigRational,
    ) -> Value {
        let mut acc: Option<BigRational> = None;
        for &a in args {
            let Some(x) = self.eval_q(a, tm) else {
                return Value::Undefined;
            };
            acc = Some(match acc {
                None => x,
                Some(y) => op(y, x),
            });
        }
        match acc {
            Some(q) => self.mk_num(tm, sort, q),
            None => Value::Undefined,
        }
    }

    fn eval_cmp(
        &mut self,
        a: TermId,
        b: TermId,
        tm: &TermManager,
        pred: impl Fn(std::cmp::Ordering) -> bool,
    ) -> Value {
        match (self.eval_q(a, tm), self.eval_q(b, tm)) {
            (Some(x), Some(y)) => Value::Bool(pred(x.cmp(&y))),
            _ => Value::Undefined,
        }
    }

    fn mk_num(&self, tm: &TermManager, sort: crate::sort::SortId, q: BigRational) -> Value {
        if tm.sorts.kind(sort) == SortKind::Int && q.is_integer() {
            Value::Int(q.to_integer())
        } else {
            Value::Rational(q)
        }
    }
}

/// Euclidean quotient: the remainder `a - b·q` lies in `[0, |b|)`.
fn euclid_div(a: &BigRational, b: &BigRational) -> BigRational {
    let q = a / b;
    if b.is_positive() {
        q.floor()
    } else {
        q.ceil()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(n: i64) -> BigRational {
        BigRational::from_integer(n.into())
    }

    #[test]
    fn test_eval_arith() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let y = tm.mk_var("y", tm.sorts.int_sort);
        let sum = tm.mk_add(vec![x, y]);

        let mut model = Model::new();
        model.assign(x, Value::Int(5.into()));
        model.assign(y, Value::Int(10.into()));
        let mut eval = ModelEvaluator::new(&mut model);
        assert_eq!(eval.eval(sum, &tm), Value::Int(15.into()));

        let five = tm.mk_int(5);
        let cmp = tm.mk_gt(y, five);
        assert!(eval.is_true(cmp, &tm));
    }

    #[test]
    fn test_eval_mod_div_floor() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let three = tm.mk_int(3);
        let m = tm.mk_mod(x, three);
        let d = tm.mk_div(x, three);

        let mut model = Model::new();
        model.assign(x, Value::Int((-4).into()));
        let mut eval = ModelEvaluator::new(&mut model);
        // -4 mod 3 = 2, -4 div 3 = -2
        assert_eq!(eval.eval(m, &tm), Value::Int(2.into()));
        assert_eq!(eval.eval(d, &tm), Value::Int((-2).into()));
    }

    #[test]
    fn test_division_by_zero_is_undefined() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let zero = tm.mk_int(0);
        let d = tm.mk_div(x, zero);
        let mut model = Model::new();
        model.assign(x, Value::Int(1.into()));
        let mut eval = ModelEvaluator::new(&mut model);
        assert!(eval.eval(d, &tm).is_undefined());
    }

    #[test]
    fn test_completion_records_defaults() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let p = tm.mk_var("p", tm.sorts.bool_sort);
        let mut model = Model::new();
        {
            let mut eval = ModelEvaluator::new(&mut model);
            assert!(eval.eval(x, &tm).is_undefined());
            eval.set_model_completion(true);
            assert_eq!(eval.eval(x, &tm), Value::Int(0.into()));
            assert_eq!(eval.eval(p, &tm), Value::Bool(false));
        }
        // fabricated values were recorded
        assert_eq!(model.get(x), Some(&Value::Int(0.into())));
        assert_eq!(model.get(p), Some(&Value::Bool(false)));
    }

    #[test]
    fn test_eval_ite_and_distinct() {
        let mut tm = TermManager::new();
        let p = tm.mk_var("p", tm.sorts.bool_sort);
        let a = tm.mk_int(1);
        let b = tm.mk_int(2);
        let ite = tm.mk_ite(p, a, b);
        let dist = tm.mk_distinct(vec![a, b]);

        let mut model = Model::new();
        model.assign(p, Value::Bool(true));
        let mut eval = ModelEvaluator::new(&mut model);
        assert_eq!(eval.eval(ite, &tm), Value::Int(1.into()));
        assert!(eval.is_true(dist, &tm));
    }

    #[test]
    fn test_mixed_int_real_compare() {
        let mut tm = TermManager::new();
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let half = tm.mk_real(BigRational::new(1.into(), 2.into()));
        let cmp = tm.mk_lt(half, x);
        let mut model = Model::new();
        model.assign(x, Value::Int(1.into()));
        let mut eval = ModelEvaluator::new(&mut model);
        assert!(eval.is_true(cmp, &tm));
        assert_eq!(eval.eval_rational(x, &tm), Some(q(1)));
    }
}
