//! Expression Kernel.
//!
//! Hash-consed arithmetic and boolean terms. Two structurally identical
//! terms always receive the same [`TermId`], so id equality is semantic
//! identity. Constructors perform sort inference and light canonicalization
//! (unit folding, double-negation stripping) but no rewriting.
//!
//! `Div` is sort-directed the way SMT-LIB splits `div` and `/`: on integer
//! operands it denotes floor division, on reals exact division. `Mod` is
//! integer-only.

use crate::resource::ResourceLimit;
use crate::sort::{SortId, Sorts};
use lasso::{Rodeo, Spur};
use num_bigint::BigInt;
use num_rational::BigRational;
use rustc_hash::FxHashMap;
use std::fmt;

/// Term identifier. Equal ids denote identical terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TermId(u32);

impl TermId {
    /// Dense index of this term.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Term node kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TermKind {
    /// Boolean constant true.
    True,
    /// Boolean constant false.
    False,
    /// Named variable (uninterpreted constant).
    Var(Spur),
    /// Integer numeral.
    IntConst(BigInt),
    /// Rational numeral.
    RealConst(BigRational),
    /// N-ary sum.
    Add(Vec<TermId>),
    /// Binary difference.
    Sub(TermId, TermId),
    /// N-ary product.
    Mul(Vec<TermId>),
    /// Arithmetic negation.
    Neg(TermId),
    /// Division: floor division on integers, exact on reals.
    Div(TermId, TermId),
    /// Integer modulo.
    Mod(TermId, TermId),
    /// If-then-else.
    Ite(TermId, TermId, TermId),
    /// Boolean negation.
    Not(TermId),
    /// N-ary conjunction.
    And(Vec<TermId>),
    /// N-ary disjunction.
    Or(Vec<TermId>),
    /// Equality.
    Eq(TermId, TermId),
    /// Less-or-equal.
    Le(TermId, TermId),
    /// Strictly-less.
    Lt(TermId, TermId),
    /// Greater-or-equal.
    Ge(TermId, TermId),
    /// Strictly-greater.
    Gt(TermId, TermId),
    /// Pairwise distinctness.
    Distinct(Vec<TermId>),
}

impl TermKind {
    /// Direct children of this node.
    pub fn children(&self) -> Vec<TermId> {
        match self {
            TermKind::True
            | TermKind::False
            | TermKind::Var(_)
            | TermKind::IntConst(_)
            | TermKind::RealConst(_) => Vec::new(),
            TermKind::Neg(a) | TermKind::Not(a) => vec![*a],
            TermKind::Sub(a, b)
            | TermKind::Div(a, b)
            | TermKind::Mod(a, b)
            | TermKind::Eq(a, b)
            | TermKind::Le(a, b)
            | TermKind::Lt(a, b)
            | TermKind::Ge(a, b)
            | TermKind::Gt(a, b) => vec![*a, *b],
            TermKind::Ite(c, t, e) => vec![*c, *t, *e],
            TermKind::Add(args)
            | TermKind::Mul(args)
            | TermKind::And(args)
            | TermKind::Or(args)
            | TermKind::Distinct(args) => args.clone(),
        }
    }
}

/// A term: kind plus sort.
#[derive(Debug, Clone)]
pub struct Term {
    /// Node kind.
    pub kind: TermKind,
    /// Sort of the term.
    pub sort: SortId,
}

/// Hash-consing term arena.
pub struct TermManager {
    terms: Vec<Term>,
    table: FxHashMap<(TermKind, SortId), TermId>,
    names: Rodeo,
    /// Sort registry.
    pub sorts: Sorts,
    limit: ResourceLimit,
}

impl TermManager {
    /// Create an empty manager.
    pub fn new() -> Self {
        Self {
            terms: Vec::new(),
            table: FxHashMap::default(),
            names: Rodeo::default(),
            sorts: Sorts::new(),
            limit: ResourceLimit::new(),
        }
    }

    /// Install a cancellation handle.
    pub fn set_limit(&mut self, limit: ResourceLimit) {
        self.limit = limit;
    }

    /// The cancellation handle.
    pub fn limit(&self) -> &ResourceLimit {
        &self.limit
    }

    /// Cancellation checkpoint; `false` once canceled.
    pub fn inc(&self) -> bool {
        self.limit.inc()
    }

    fn intern(&mut self, kind: TermKind, sort: SortId) -> TermId {
        if let Some(&id) = self.table.get(&(kind.clone(), sort)) {
            return id;
        }
        let id = TermId(self.terms.len() as u32);
        self.terms.push(Term {
            kind: kind.clone(),
            sort,
        });
        self.table.insert((kind, sort), id);
        id
    }

    /// Look up a term by id.
    pub fn get(&self, t: TermId) -> Option<&Term> {
        self.terms.get(t.index())
    }

    /// Sort of a term.
    pub fn sort_of(&self, t: TermId) -> SortId {
        self.terms[t.index()].sort
    }

    /// True for integer-sorted terms.
    pub fn is_int(&self, t: TermId) -> bool {
        self.sort_of(t) == self.sorts.int_sort
    }

    /// True for real-sorted terms.
    pub fn is_real(&self, t: TermId) -> bool {
        self.sort_of(t) == self.sorts.real_sort
    }

    /// True for integer- or real-sorted terms.
    pub fn is_arith(&self, t: TermId) -> bool {
        self.sorts.is_arith(self.sort_of(t))
    }

    /// Resolve an interned name.
    pub fn resolve_str(&self, name: Spur) -> &str {
        self.names.resolve(&name)
    }

    /// Number of distinct terms.
    pub fn term_count(&self) -> usize {
        self.terms.len()
    }

    /// Numeric value of an `IntConst`/`RealConst`, if any.
    pub fn numeral_value(&self, t: TermId) -> Option<BigRational> {
        match &self.get(t)?.kind {
            TermKind::IntConst(n) => Some(BigRational::from_integer(n.clone())),
            TermKind::RealConst(q) => Some(q.clone()),
            _ => None,
        }
    }

    /// True when the term is a numeral.
    pub fn is_numeral(&self, t: TermId) -> bool {
        matches!(
            self.get(t).map(|term| &term.kind),
            Some(TermKind::IntConst(_)) | Some(TermKind::RealConst(_))
        )
    }

    // ------------------------------------------------------------------
    // constructors
    // ------------------------------------------------------------------

    /// Boolean true.
    pub fn mk_true(&mut self) -> TermId {
        let s = self.sorts.bool_sort;
        self.intern(TermKind::True, s)
    }

    /// Boolean false.
    pub fn mk_false(&mut self) -> TermId {
        let s = self.sorts.bool_sort;
        self.intern(TermKind::False, s)
    }

    /// Named variable of the given sort.
    pub fn mk_var(&mut self, name: &str, sort: SortId) -> TermId {
        let spur = self.names.get_or_intern(name);
        self.intern(TermKind::Var(spur), sort)
    }

    /// Integer numeral.
    pub fn mk_int(&mut self, n: impl Into<BigInt>) -> TermId {
        let s = self.sorts.int_sort;
        self.intern(TermKind::IntConst(n.into()), s)
    }

    /// Rational numeral.
    pub fn mk_real(&mut self, q: BigRational) -> TermId {
        let s = self.sorts.real_sort;
        self.intern(TermKind::RealConst(q), s)
    }

    /// Numeral of the requested sort; a non-integral `q` is always real.
    pub fn mk_numeral(&mut self, q: BigRational, is_int: bool) -> TermId {
        if is_int && q.is_integer() {
            self.mk_int(q.to_integer())
        } else {
            self.mk_real(q)
        }
    }

    fn arith_sort(&self, args: &[TermId]) -> SortId {
        if args.iter().any(|&a| self.is_real(a)) {
            self.sorts.real_sort
        } else {
            self.sorts.int_sort
        }
    }

    /// N-ary sum; folds empty and unit lists.
    pub fn mk_add(&mut self, args: Vec<TermId>) -> TermId {
        match args.len() {
            0 => self.mk_int(0),
            1 => args[0],
            _ => {
                let s = self.arith_sort(&args);
                self.intern(TermKind::Add(args), s)
            }
        }
    }

    /// Difference.
    pub fn mk_sub(&mut self, a: TermId, b: TermId) -> TermId {
        let s = self.arith_sort(&[a, b]);
        self.intern(TermKind::Sub(a, b), s)
    }

    /// N-ary product; folds empty and unit lists.
    pub fn mk_mul(&mut self, args: Vec<TermId>) -> TermId {
        match args.len() {
            0 => self.mk_int(1),
            1 => args[0],
            _ => {
                let s = self.arith_sort(&args);
                self.intern(TermKind::Mul(args), s)
            }
        }
    }

    /// Arithmetic negation.
    pub fn mk_neg(&mut self, a: TermId) -> TermId {
        let s = self.sort_of(a);
        self.intern(TermKind::Neg(a), s)
    }

    /// Division: floor `div` when both operands are integer, `/` otherwise.
    pub fn mk_div(&mut self, a: TermId, b: TermId) -> TermId {
        let s = self.arith_sort(&[a, b]);
        self.intern(TermKind::Div(a, b), s)
    }

    /// Integer modulo.
    pub fn mk_mod(&mut self, a: TermId, b: TermId) -> TermId {
        debug_assert!(self.is_int(a) && self.is_int(b));
        let s = self.sorts.int_sort;
        self.intern(TermKind::Mod(a, b), s)
    }

    /// If-then-else; branches must agree on sort.
    pub fn mk_ite(&mut self, c: TermId, t: TermId, e: TermId) -> TermId {
        debug_assert!(self.sort_of(t) == self.sort_of(e));
        let s = self.sort_of(t);
        self.intern(TermKind::Ite(c, t, e), s)
    }

    /// Boolean negation; strips a double negation.
    pub fn mk_not(&mut self, a: TermId) -> TermId {
        if let Some(TermKind::Not(inner)) = self.get(a).map(|t| t.kind.clone()) {
            return inner;
        }
        let s = self.sorts.bool_sort;
        self.intern(TermKind::Not(a), s)
    }

    /// N-ary conjunction; folds empty and unit lists.
    pub fn mk_and(&mut self, args: Vec<TermId>) -> TermId {
        match args.len() {
            0 => self.mk_true(),
            1 => args[0],
            _ => {
                let s = self.sorts.bool_sort;
                self.intern(TermKind::And(args), s)
            }
        }
    }

    /// N-ary disjunction; folds empty and unit lists.
    pub fn mk_or(&mut self, args: Vec<TermId>) -> TermId {
        match args.len() {
            0 => self.mk_false(),
            1 => args[0],
            _ => {
                let s = self.sorts.bool_sort;
                self.intern(TermKind::Or(args), s)
            }
        }
    }

    /// Equality; identical sides fold to true.
    pub fn mk_eq(&mut self, a: TermId, b: TermId) -> TermId {
        if a == b {
            return self.mk_true();
        }
        let s = self.sorts.bool_sort;
        self.intern(TermKind::Eq(a, b), s)
    }

    /// Less-or-equal.
    pub fn mk_le(&mut self, a: TermId, b: TermId) -> TermId {
        let s = self.sorts.bool_sort;
        self.intern(TermKind::Le(a, b), s)
    }

    /// Strictly-less.
    pub fn mk_lt(&mut self, a: TermId, b: TermId) -> TermId {
        let s = self.sorts.bool_sort;
        self.intern(TermKind::Lt(a, b), s)
    }

    /// Greater-or-equal.
    pub fn mk_ge(&mut self, a: TermId, b: TermId) -> TermId {
        let s = self.sorts.bool_sort;
        self.intern(TermKind::Ge(a, b), s)
    }

    /// Strictly-greater.
    pub fn mk_gt(&mut self, a: TermId, b: TermId) -> TermId {
        let s = self.sorts.bool_sort;
        self.intern(TermKind::Gt(a, b), s)
    }

    /// Pairwise distinctness.
    pub fn mk_distinct(&mut self, args: Vec<TermId>) -> TermId {
        if args.len() < 2 {
            return self.mk_true();
        }
        let s = self.sorts.bool_sort;
        self.intern(TermKind::Distinct(args), s)
    }

    // ------------------------------------------------------------------
    // substitution
    // ------------------------------------------------------------------

    /// Simultaneous substitution, bottom-up. Terms carry no binders, so the
    /// replacement is capture-free.
    pub fn substitute(&mut self, t: TermId, map: &FxHashMap<TermId, TermId>) -> TermId {
        let mut cache: FxHashMap<TermId, TermId> = FxHashMap::default();
        self.substitute_rec(t, map, &mut cache)
    }

    fn substitute_rec(
        &mut self,
        t: TermId,
        map: &FxHashMap<TermId, TermId>,
        cache: &mut FxHashMap<TermId, TermId>,
    ) -> TermId {
        if let Some(&r) = map.get(&t) {
            return r;
        }
        if let Some(&r) = cache.get(&t) {
            return r;
        }
        let kind = self.terms[t.index()].kind.clone();
        let r = match kind {
            TermKind::True
            | TermKind::False
            | TermKind::Var(_)
            | TermKind::IntConst(_)
            | TermKind::RealConst(_) => t,
            TermKind::Add(args) => {
                let na = self.substitute_all(&args, map, cache);
                self.mk_add(na)
            }
            TermKind::Mul(args) => {
                let na = self.substitute_all(&args, map, cache);
                self.mk_mul(na)
            }
            TermKind::And(args) => {
                let na = self.substitute_all(&args, map, cache);
                self.mk_and(na)
            }
            TermKind::Or(args) => {
                let na = self.substitute_all(&args, map, cache);
                self.mk_or(na)
            }
            TermKind::Distinct(args) => {
                let na = self.substitute_all(&args, map, cache);
                self.mk_distinct(na)
            }
            TermKind::Sub(a, b) => {
                let (na, nb) = (
                    self.substitute_rec(a, map, cache),
                    self.substitute_rec(b, map, cache),
                );
                self.mk_sub(na, nb)
            }
            TermKind::Div(a, b) => {
                let (na, nb) = (
                    self.substitute_rec(a, map, cache),
                    self.substitute_rec(b, map, cache),
                );
                self.mk_div(na, nb)
            }
            TermKind::Mod(a, b) => {
                let (na, nb) = (
                    self.substitute_rec(a, map, cache),
                    self.substitute_rec(b, map, cache),
                );
                self.mk_mod(na, nb)
            }
            TermKind::Eq(a, b) => {
                let (na, nb) = (
                    self.substitute_rec(a, map, cache),
                    self.substitute_rec(b, map, cache),
                );
                self.mk_eq(na, nb)
            }
            TermKind::Le(a, b) => {
                let (na, nb) = (
                    self.substitute_rec(a, map, cache),
                    self.substitute_rec(b, map, cache),
                );
                self.mk_le(na, nb)
            }
            TermKind::Lt(a, b) => {
                let (na, nb) = (
                    self.substitute_rec(a, map, cache),
                    self.substitute_rec(b, map, cache),
                );
                self.mk_lt(na, nb)
            }
            TermKind::Ge(a, b) => {
                let (na, nb) = (
                    self.substitute_rec(a, map, cache),
                    self.substitute_rec(b, map, cache),
                );
                self.mk_ge(na, nb)
            }
            TermKind::Gt(a, b) => {
                let (na, nb) = (
                    self.substitute_rec(a, map, cache),
                    self.substitute_rec(b, map, cache),
                );
                self.mk_gt(na, nb)
            }
            TermKind::Neg(a) => {
                let na = self.substitute_rec(a, map, cache);
                self.mk_neg(na)
            }
            TermKind::Not(a) => {
                let na = self.substitute_rec(a, map, cache);
                self.mk_not(na)
            }
            TermKind::Ite(c, a, b) => {
                let nc = self.substitute_rec(c, map, cache);
                let na = self.substitute_rec(a, map, cache);
                let nb = self.substitute_rec(b, map, cache);
                self.mk_ite(nc, na, nb)
            }
        };
        cache.insert(t, r);
        r
    }

    fn substitute_all(
        &mut self,
        args: &[TermId],
        map: &FxHashMap<TermId, TermId>,
        cache: &mut FxHashMap<TermId, TermId>,
    ) -> Vec<TermId> {
        let mut out = Vec::with_capacity(args.len());
        for &a in args {
            out.push(self.substitute_rec(a, map, cache));
        }
        out
    }

    /// Pretty printer handle for a term.
    pub fn display(&self, t: TermId) -> TermDisplay<'_> {
        TermDisplay { tm: self, id: t }
    }
}

impl Default for TermManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Display adapter printing terms in prefix syntax.
pub struct TermDisplay<'a> {
    tm: &'a TermManager,
    id: TermId,
}

impl fmt::Display for TermDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tm = self.tm;
        let sub = |id| TermDisplay { tm, id };
        let nary = |f: &mut fmt::Formatter<'_>, op: &str, args: &[TermId]| {
            write!(f, "({}", op)?;
            for &a in args {
                write!(f, " {}", sub(a))?;
            }
            write!(f, ")")
        };
        let Some(term) = tm.get(self.id) else {
            return write!(f, "?{}", self.id.index());
        };
        match &term.kind {
            TermKind::True => write!(f, "true"),
            TermKind::False => write!(f, "false"),
            TermKind::Var(name) => write!(f, "{}", tm.resolve_str(*name)),
            TermKind::IntConst(n) => write!(f, "{}", n),
            TermKind::RealConst(q) => write!(f, "{}", q),
            TermKind::Add(args) => nary(f, "+", args),
            TermKind::Sub(a, b) => nary(f, "-", &[*a, *b]),
            TermKind::Mul(args) => nary(f, "*", args),
            TermKind::Neg(a) => nary(f, "-", &[*a]),
            TermKind::Div(a, b) => {
                let op = if tm.is_int(self.id) { "div" } else { "/" };
                nary(f, op, &[*a, *b])
            }
            TermKind::Mod(a, b) => nary(f, "mod", &[*a, *b]),
            TermKind::Ite(c, t, e) => nary(f, "ite", &[*c, *t, *e]),
            TermKind::Not(a) => nary(f, "not", &[*a]),
            TermKind::And(args) => nary(f, "and", args),
            TermKind::Or(args) => nary(f, "or", args),
            TermKind::Eq(a, b) => nary(f, "=", &[*a, *b]),
            TermKind::Le(a, b) => nary(f, "<=", &[*a, *b]),
            TermKind::Lt(a, b) => nary(f, "<", &[*a, *b]),
            TermKind::Ge(a, b) => nary(f, ">=", &[*a, *b]),
            TermKind::Gt(a, b) => nary(f, ">", &[*a, *b]),
            TermKind::Distinct(args) => nary(f, "distinct", args),
        }
    }
}
