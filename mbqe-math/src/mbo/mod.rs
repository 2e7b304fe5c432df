//! Model-Based Optimization Engine.
//!
//! A row store for linear arithmetic constraints over dense variable ids.
//! Every variable carries a current value and the store maintains the
//! invariant that each live row is satisfied by those values. On top of the
//! store sit two symbolic services:
//!
//! - `project`: model-guided variable elimination (Loos–Weispfenning virtual
//!   substitution with Fourier–Motzkin resolution, integer divisibility
//!   strengthening, and congruence splits for mod/div rows)
//! - `maximize`: exact Fourier–Motzkin maximization of a linear objective
//!   over the reals, returning an extended-real optimum
//!
//! Rows come in six flavors: `Le`/`Lt`/`Eq` are ordinary comparisons with
//! zero, `Mod`/`Div` bind a defined variable to `body mod m` / `⌊body/m⌋`,
//! and `Divides` asserts `m | body` without introducing a variable.
//!
//! ## References
//!
//! - Z3's `math/simplex/model_based_opt.cpp`
//! - Loos & Weispfenning: "Applying Linear Quantifier Elimination" (1993)

pub mod def;

pub use def::DefTree;

use crate::inf_eps::InfEps;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};

/// Engine variable identifier.
pub type VarId = usize;

/// Row comparison type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowType {
    /// `body ≤ 0`
    Le,
    /// `body < 0`
    Lt,
    /// `body = 0`
    Eq,
    /// `def_var = body mod m`
    Mod,
    /// `def_var = ⌊body / m⌋`
    Div,
    /// `m | body`
    Divides,
}

impl RowType {
    fn is_modish(self) -> bool {
        matches!(self, RowType::Mod | RowType::Div | RowType::Divides)
    }
}

/// Coefficient on an engine variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowVar {
    /// Variable id.
    pub id: VarId,
    /// Non-zero rational coefficient.
    pub coeff: BigRational,
}

/// Linear expression `Σ coeff·x + constant`.
///
/// Variables are sorted by id and appear at most once, with non-zero
/// coefficients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinExpr {
    /// Coefficient list, ascending by id.
    pub vars: SmallVec<[RowVar; 4]>,
    /// Constant term.
    pub constant: BigRational,
}

impl LinExpr {
    /// Coefficient of `x`, zero when absent.
    pub fn coeff(&self, x: VarId) -> BigRational {
        match self.vars.binary_search_by_key(&x, |rv| rv.id) {
            Ok(i) => self.vars[i].coeff.clone(),
            Err(_) => BigRational::zero(),
        }
    }

    /// Remove `x` and return its coefficient.
    fn remove(&mut self, x: VarId) -> BigRational {
        match self.vars.binary_search_by_key(&x, |rv| rv.id) {
            Ok(i) => self.vars.remove(i).coeff,
            Err(_) => BigRational::zero(),
        }
    }

    /// Multiply through by a non-zero factor.
    fn scale(&mut self, f: &BigRational) {
        debug_assert!(!f.is_zero());
        if f.is_one() {
            return;
        }
        for rv in &mut self.vars {
            rv.coeff = &rv.coeff * f;
        }
        self.constant = &self.constant * f;
    }

    /// Add `f · other` into this expression.
    fn add_scaled(&mut self, other: &LinExpr, f: &BigRational) {
        if f.is_zero() {
            return;
        }
        let mut merged: SmallVec<[RowVar; 4]> = SmallVec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.vars.len() && j < other.vars.len() {
            match self.vars[i].id.cmp(&other.vars[j].id) {
                std::cmp::Ordering::Less => {
                    merged.push(self.vars[i].clone());
                    i += 1;
                }
                std::cmp::Ordering::Greater => {
                    merged.push(RowVar {
                        id: other.vars[j].id,
                        coeff: f * &other.vars[j].coeff,
                    });
                    j += 1;
                }
                std::cmp::Ordering::Equal => {
                    let c = &self.vars[i].coeff + f * &other.vars[j].coeff;
                    if !c.is_zero() {
                        merged.push(RowVar {
                            id: self.vars[i].id,
                            coeff: c,
                        });
                    }
                    i += 1;
                    j += 1;
                }
            }
        }
        merged.extend(self.vars[i..].iter().cloned());
        merged.extend(other.vars[j..].iter().map(|rv| RowVar {
            id: rv.id,
            coeff: f * &rv.coeff,
        }));
        self.vars = merged;
        self.constant = &self.constant + f * &other.constant;
    }

    /// Coefficient pairs, for re-feeding into the engine API.
    pub fn pairs(&self) -> Vec<(VarId, BigRational)> {
        self.vars
            .iter()
            .map(|rv| (rv.id, rv.coeff.clone()))
            .collect()
    }
}

/// A constraint row: a linear expression plus a comparison type.
#[derive(Debug, Clone)]
pub struct Row {
    /// The linear body.
    pub expr: LinExpr,
    /// Comparison type.
    pub ty: RowType,
    /// Modulus for `Mod`/`Div`/`Divides` rows; zero otherwise.
    pub modulus: BigInt,
    /// The variable a `Mod`/`Div` row defines.
    pub def_var: Option<VarId>,
    alive: bool,
}

impl Row {
    fn linear(expr: LinExpr, ty: RowType) -> Self {
        Self {
            expr,
            ty,
            modulus: BigInt::zero(),
            def_var: None,
            alive: true,
        }
    }
}

#[derive(Debug, Clone)]
struct VarInfo {
    value: BigRational,
    is_int: bool,
}

/// Engine statistics.
#[derive(Debug, Clone, Default)]
pub struct MboStats {
    /// Variables eliminated by `project`.
    pub vars_eliminated: usize,
    /// Fourier–Motzkin resolutions performed.
    pub rows_resolved: usize,
    /// Congruence case splits for mod/div occurrences.
    pub congruence_splits: usize,
}

/// Elimination trail entry, kept for witness reconstruction in `maximize`.
enum Elim {
    Subst(VarId, LinExpr),
    Bounds(VarId, Vec<Row>),
}

/// The model-based optimization engine.
pub struct ModelBasedOpt {
    vars: Vec<VarInfo>,
    rows: Vec<Row>,
    objective: Option<LinExpr>,
    stats: MboStats,
}

impl ModelBasedOpt {
    /// Create an empty engine.
    pub fn new() -> Self {
        Self {
            vars: Vec::new(),
            rows: Vec::new(),
            objective: None,
            stats: MboStats::default(),
        }
    }

    /// Register a variable with its current value.
    pub fn add_var(&mut self, value: BigRational, is_int: bool) -> VarId {
        debug_assert!(!is_int || value.is_integer());
        let id = self.vars.len();
        self.vars.push(VarInfo { value, is_int });
        id
    }

    /// Current value of a variable.
    pub fn get_value(&self, x: VarId) -> &BigRational {
        &self.vars[x].value
    }

    /// Integrality tag of a variable.
    pub fn is_int(&self, x: VarId) -> bool {
        self.vars[x].is_int
    }

    /// Number of registered variables.
    pub fn num_vars(&self) -> usize {
        self.vars.len()
    }

    /// Engine statistics.
    pub fn stats(&self) -> &MboStats {
        &self.stats
    }

    /// Add `Σ coeff·x + k ⟨ty⟩ 0` for `ty ∈ {Le, Lt, Eq}`.
    pub fn add_constraint(
        &mut self,
        coeffs: Vec<(VarId, BigRational)>,
        k: BigRational,
        ty: RowType,
    ) {
        debug_assert!(matches!(ty, RowType::Le | RowType::Lt | RowType::Eq));
        let mut row = Row::linear(self.mk_expr(coeffs, k), ty);
        self.normalize_row(&mut row);
        self.push_row(row);
    }

    /// Register `y = (Σ coeff·x + k) mod m` and return `y`.
    pub fn add_mod(&mut self, coeffs: Vec<(VarId, BigRational)>, k: BigRational, m: BigInt) -> VarId {
        debug_assert!(m.is_positive());
        let expr = self.mk_expr(coeffs, k);
        let body = self.expr_value(&expr);
        let q = floor_div_q(&body, &m);
        let v = body - BigRational::from_integer(&m * q);
        let y = self.add_var(v, true);
        self.push_row(Row {
            expr,
            ty: RowType::Mod,
            modulus: m,
            def_var: Some(y),
            alive: true,
        });
        y
    }

    /// Register `y = ⌊(Σ coeff·x + k) / m⌋` and return `y`.
    pub fn add_div(&mut self, coeffs: Vec<(VarId, BigRational)>, k: BigRational, m: BigInt) -> VarId {
        debug_assert!(m.is_positive());
        let expr = self.mk_expr(coeffs, k);
        let body = self.expr_value(&expr);
        let v = BigRational::from_integer(floor_div_q(&body, &m));
        let y = self.add_var(v, true);
        self.push_row(Row {
            expr,
            ty: RowType::Div,
            modulus: m,
            def_var: Some(y),
            alive: true,
        });
        y
    }

    /// Add the side constraint `m | Σ coeff·x + k`.
    pub fn add_divides(&mut self, coeffs: Vec<(VarId, BigRational)>, k: BigRational, m: BigInt) {
        debug_assert!(m.is_positive());
        let expr = self.mk_expr(coeffs, k);
        self.push_row(Row {
            expr,
            ty: RowType::Divides,
            modulus: m,
            def_var: None,
            alive: true,
        });
    }

    /// Install the objective `Σ coeff·x + k` for [`maximize`](Self::maximize).
    pub fn set_objective(&mut self, coeffs: Vec<(VarId, BigRational)>, k: BigRational) {
        let expr = self.mk_expr(coeffs, k);
        self.objective = Some(expr);
    }

    /// Snapshot of the surviving rows.
    pub fn get_live_rows(&self) -> Vec<Row> {
        self.rows.iter().filter(|r| r.alive).cloned().collect()
    }

    /// Eliminate the listed variables in order.
    ///
    /// Returns one optional definition tree per input variable, same index.
    /// `None` means the variable was unbounded in the elimination direction
    /// (or `compute_def` was off) and no witness term is needed.
    pub fn project(&mut self, xs: &[VarId], compute_def: bool) -> Vec<Option<DefTree>> {
        xs.iter().map(|&x| self.project1(x, compute_def)).collect()
    }

    // ------------------------------------------------------------------
    // elimination
    // ------------------------------------------------------------------

    fn project1(&mut self, x: VarId, compute_def: bool) -> Option<DefTree> {
        debug_assert!(self
            .rows
            .iter()
            .all(|r| !r.alive || r.def_var != Some(x)));
        self.stats.vars_eliminated += 1;
        let occ = self.occurrences(x);
        if occ.is_empty() {
            return None;
        }
        if occ.iter().any(|&ri| self.rows[ri].ty.is_modish()) {
            return self.solve_congruence(x, compute_def);
        }
        let eq = occ
            .iter()
            .copied()
            .filter(|&ri| self.rows[ri].ty == RowType::Eq)
            .min_by(|&a, &b| {
                self.rows[a]
                    .expr
                    .coeff(x)
                    .abs()
                    .cmp(&self.rows[b].expr.coeff(x).abs())
            });
        if let Some(ei) = eq {
            return self.solve_eq(ei, x, compute_def);
        }
        self.solve_bounds(x, occ, compute_def)
    }

    /// Solve an equality row for `x` and substitute everywhere else.
    fn solve_eq(&mut self, ei: usize, x: VarId, compute_def: bool) -> Option<DefTree> {
        let a = self.rows[ei].expr.coeff(x);
        let mut rest = self.rows[ei].expr.clone();
        rest.remove(x);
        // x = -rest / a
        let mut repl = rest.clone();
        repl.scale(&-a.recip());
        self.rows[ei].alive = false;
        self.substitute(x, &repl);

        let int_exact = self.vars[x].is_int
            && a.is_integer()
            && rest.constant.is_integer()
            && rest
                .vars
                .iter()
                .all(|rv| self.vars[rv.id].is_int && rv.coeff.is_integer());
        if int_exact && a.abs() != BigRational::one() {
            // the equality forces a | rest
            self.add_divides(rest.pairs(), rest.constant.clone(), a.numer().abs());
        }
        if !compute_def {
            return None;
        }
        if int_exact && a.abs() != BigRational::one() {
            let mut num = rest;
            let sign = if a.is_positive() {
                -BigRational::one()
            } else {
                BigRational::one()
            };
            num.scale(&sign);
            Some(DefTree::div_const(
                DefTree::from_linear(&num),
                a.abs(),
            ))
        } else {
            Some(DefTree::from_linear(&repl))
        }
    }

    /// Case-split `x` on its residue modulo the lcm of the moduli it occurs
    /// under, replacing it by `K·y + u` for a fresh `y` and the model's `u`.
    fn solve_congruence(&mut self, x: VarId, compute_def: bool) -> Option<DefTree> {
        debug_assert!(self.vars[x].is_int);
        let occ = self.occurrences(x);
        let mut k_lcm = BigInt::one();
        for &ri in &occ {
            if self.rows[ri].ty.is_modish() {
                k_lcm = lcm_int(&k_lcm, &self.rows[ri].modulus);
            }
        }
        let x0 = self.vars[x].value.to_integer();
        let u = mod_floor_int(&x0, &k_lcm);
        let y_val = (&x0 - &u) / &k_lcm;
        let y = self.add_var(BigRational::from_integer(y_val), true);
        self.stats.congruence_splits += 1;
        tracing::trace!(x, y, k = %k_lcm, u = %u, "congruence split");

        let repl = LinExpr {
            vars: smallvec![RowVar {
                id: y,
                coeff: BigRational::from_integer(k_lcm.clone()),
            }],
            constant: BigRational::from_integer(u.clone()),
        };
        self.substitute(x, &repl);

        // In mod/divides rows the y term is a multiple of the modulus and
        // drops out; div rows are split on a fresh defined variable so that
        // the quotient stays exact.
        let nrows = self.rows.len();
        for ri in 0..nrows {
            if !self.rows[ri].alive {
                continue;
            }
            match self.rows[ri].ty {
                RowType::Mod | RowType::Divides => {
                    let c = self.rows[ri].expr.coeff(y);
                    if c.is_zero() {
                        continue;
                    }
                    debug_assert!(
                        c.is_integer() && (c.to_integer() % &self.rows[ri].modulus).is_zero()
                    );
                    self.rows[ri].expr.remove(y);
                }
                RowType::Div => {
                    let c = self.rows[ri].expr.coeff(y);
                    if c.is_zero() {
                        continue;
                    }
                    let m = self.rows[ri].modulus.clone();
                    debug_assert!(c.is_integer() && (c.to_integer() % &m).is_zero());
                    let q = c.to_integer() / &m;
                    let mut rest = self.rows[ri].expr.clone();
                    rest.remove(y);
                    let z_val = floor_div_q(&self.expr_value(&rest), &m);
                    let z = self.add_var(BigRational::from_integer(z_val), true);
                    let old_d = self.rows[ri].def_var.expect("div row defines a variable");
                    self.rows[ri].expr = rest;
                    self.rows[ri].def_var = Some(z);
                    // old_d = q·y + z
                    let drepl = LinExpr {
                        vars: smallvec![
                            RowVar {
                                id: y,
                                coeff: BigRational::from_integer(q),
                            },
                            RowVar {
                                id: z,
                                coeff: BigRational::one(),
                            },
                        ],
                        constant: BigRational::zero(),
                    };
                    self.substitute(old_d, &drepl);
                }
                _ => {}
            }
        }

        let dy = self.project1(y, compute_def);
        if !compute_def {
            return None;
        }
        dy.map(|t| {
            DefTree::add(
                DefTree::mul_const(&BigRational::from_integer(k_lcm), t),
                DefTree::Const(BigRational::from_integer(u)),
            )
        })
    }

    /// Eliminate `x` constrained by inequalities only.
    fn solve_bounds(
        &mut self,
        x: VarId,
        occ: Vec<usize>,
        compute_def: bool,
    ) -> Option<DefTree> {
        // substitutions may have denormalized the rows
        for &ri in &occ {
            let mut row = self.rows[ri].clone();
            self.normalize_row(&mut row);
            self.rows[ri] = row;
        }
        debug_assert!(occ
            .iter()
            .all(|&ri| matches!(self.rows[ri].ty, RowType::Le | RowType::Lt)));

        let mut lowers = Vec::new();
        let mut uppers = Vec::new();
        for &ri in &occ {
            if self.rows[ri].expr.coeff(x).is_negative() {
                lowers.push(ri);
            } else {
                uppers.push(ri);
            }
        }
        if lowers.is_empty() || uppers.is_empty() {
            // unbounded in one direction; the rows impose nothing on the rest
            for &ri in &occ {
                self.rows[ri].alive = false;
            }
            return None;
        }

        let use_lower = lowers.len() <= uppers.len();
        let side = if use_lower { &lowers } else { &uppers };

        // tightest bound under the model; ties prefer strict rows, then
        // small coefficients
        let x0 = self.vars[x].value.clone();
        let mut pivot = side[0];
        let mut best_val = self.bound_value(pivot, x);
        for &ri in &side[1..] {
            let bv = self.bound_value(ri, x);
            let better = match bv.cmp(&best_val) {
                std::cmp::Ordering::Greater => use_lower,
                std::cmp::Ordering::Less => !use_lower,
                std::cmp::Ordering::Equal => {
                    let (s_new, s_old) =
                        (self.rows[ri].ty == RowType::Lt, self.rows[pivot].ty == RowType::Lt);
                    s_new && !s_old
                        || s_new == s_old
                            && self.rows[ri].expr.coeff(x).abs()
                                < self.rows[pivot].expr.coeff(x).abs()
                }
            };
            if better {
                pivot = ri;
                best_val = bv;
            }
        }

        let int_mode = self.vars[x].is_int
            && occ.iter().all(|&ri| {
                let r = &self.rows[ri];
                r.ty == RowType::Le
                    && r.expr.constant.is_integer()
                    && r.expr
                        .vars
                        .iter()
                        .all(|rv| self.vars[rv.id].is_int && rv.coeff.is_integer())
            });

        let mut def_expr: Option<(LinExpr, BigRational)> = None; // (bound numerator, divisor)
        if int_mode {
            let a = self.rows[pivot].expr.coeff(x).numer().abs();
            // bound on a·x: lower `a·x ≥ t`, upper `a·x ≤ t`
            let mut t = self.rows[pivot].expr.clone();
            t.remove(x);
            if !use_lower {
                t.scale(&-BigRational::one());
            }
            let t0 = self.expr_value(&t).to_integer();
            let x0i = x0.to_integer();
            let r = if use_lower {
                mod_floor_int(&(&a * &x0i - &t0), &a)
            } else {
                mod_floor_int(&(&t0 - &a * &x0i), &a)
            };
            if !r.is_zero() {
                // strengthen to the residue class the model inhabits
                self.rows[pivot].expr.constant += BigRational::from_integer(r.clone());
            }
            let mut num = t;
            if use_lower {
                num.constant += BigRational::from_integer(r);
            } else {
                num.constant -= BigRational::from_integer(r);
            }
            if a > BigInt::one() {
                // make the floored witness exact
                self.add_divides(num.pairs(), num.constant.clone(), a.clone());
            }
            def_expr = Some((num, BigRational::from_integer(a)));
        }

        let piv = self.rows[pivot].clone();
        for &ri in &occ {
            if ri == pivot {
                continue;
            }
            let other = self.rows[ri].clone();
            let resolved = self.resolve(&piv, &other, x);
            self.rows[ri].alive = false;
            self.push_normalized(resolved);
        }
        self.rows[pivot].alive = false;

        if !compute_def {
            return None;
        }
        match def_expr {
            Some((num, a)) => Some(DefTree::div_const(DefTree::from_linear(&num), a)),
            None => {
                let c = piv.expr.coeff(x);
                let mut repl = piv.expr.clone();
                repl.remove(x);
                repl.scale(&-c.recip());
                let mut def = DefTree::from_linear(&repl);
                if piv.ty == RowType::Lt {
                    // move strictly inside the feasible region, by the
                    // model's own slack
                    let shift = &x0 - self.expr_value(&repl);
                    def = DefTree::add(def, DefTree::Const(shift));
                }
                Some(def)
            }
        }
    }

    /// Fourier–Motzkin combination of `other` with the pivot row, removing
    /// `x`. Opposite bound directions combine positively; for a same-side
    /// row the result states that the pivot's bound subsumes it.
    fn resolve(&mut self, pivot: &Row, other: &Row, x: VarId) -> Row {
        let cp = pivot.expr.coeff(x);
        let co = other.expr.coeff(x);
        debug_assert!(!cp.is_zero() && !co.is_zero());
        self.stats.rows_resolved += 1;
        let mut expr;
        let ty;
        if cp.is_negative() != co.is_negative() {
            expr = pivot.expr.clone();
            expr.scale(&co.abs());
            expr.add_scaled(&other.expr, &cp.abs());
            ty = if pivot.ty == RowType::Lt || other.ty == RowType::Lt {
                RowType::Lt
            } else {
                RowType::Le
            };
        } else {
            let mut prest = pivot.expr.clone();
            prest.remove(x);
            expr = other.expr.clone();
            expr.scale(&cp.abs());
            expr.remove(x);
            expr.add_scaled(&prest, &-co.abs());
            ty = if other.ty == RowType::Lt && pivot.ty != RowType::Lt {
                RowType::Lt
            } else {
                RowType::Le
            };
        }
        debug_assert!(expr.coeff(x).is_zero());
        Row::linear(expr, ty)
    }

    // ------------------------------------------------------------------
    // maximization
    // ------------------------------------------------------------------

    /// Maximize the installed objective over the live rows.
    ///
    /// Mod/div rows are relaxed away (the service is specified over the
    /// reals). When a finite optimum is attained, variable values are moved
    /// to an optimal witness point, provided the system is purely real.
    pub fn maximize(&mut self) -> InfEps {
        let obj = self
            .objective
            .clone()
            .expect("objective must be set before maximize");
        let z_val = self.expr_value(&obj);
        let z = self.add_var(z_val, false);
        let mut eq = obj;
        eq.vars.push(RowVar {
            id: z,
            coeff: -BigRational::one(),
        });
        self.push_row(Row::linear(eq, RowType::Eq));

        let mut has_int = false;
        for r in &mut self.rows {
            if r.alive && r.ty.is_modish() {
                r.alive = false;
            }
        }
        for r in &self.rows {
            if r.alive {
                has_int |= r.expr.vars.iter().any(|rv| self.vars[rv.id].is_int);
            }
        }

        let mut trail: Vec<Elim> = Vec::new();
        let nvars = self.vars.len();
        for v in 0..nvars {
            if v == z {
                continue;
            }
            let occ = self.occurrences(v);
            if occ.is_empty() {
                continue;
            }
            let eq_row = occ.iter().copied().find(|&ri| self.rows[ri].ty == RowType::Eq);
            if let Some(ei) = eq_row {
                let a = self.rows[ei].expr.coeff(v);
                let mut repl = self.rows[ei].expr.clone();
                repl.remove(v);
                repl.scale(&-a.recip());
                self.rows[ei].alive = false;
                self.substitute(v, &repl);
                trail.push(Elim::Subst(v, repl));
            } else {
                let snapshot: Vec<Row> = occ.iter().map(|&ri| self.rows[ri].clone()).collect();
                let lowers: Vec<usize> = occ
                    .iter()
                    .copied()
                    .filter(|&ri| self.rows[ri].expr.coeff(v).is_negative())
                    .collect();
                let uppers: Vec<usize> = occ
                    .iter()
                    .copied()
                    .filter(|&ri| self.rows[ri].expr.coeff(v).is_positive())
                    .collect();
                for &li in &lowers {
                    for &ui in &uppers {
                        let l = self.rows[li].clone();
                        let u = self.rows[ui].clone();
                        let resolved = self.resolve(&l, &u, v);
                        self.push_normalized(resolved);
                    }
                }
                for &ri in &occ {
                    self.rows[ri].alive = false;
                }
                trail.push(Elim::Bounds(v, snapshot));
            }
        }

        // optimum = min over the surviving upper bounds on z; an equality
        // row pins z outright
        let mut best: Option<(BigRational, bool)> = None;
        for r in &self.rows {
            if !r.alive {
                continue;
            }
            let c = r.expr.coeff(z);
            if c.is_zero() || (r.ty != RowType::Eq && !c.is_positive()) {
                continue;
            }
            let mut rest = r.expr.clone();
            rest.remove(z);
            let bound = -self.expr_value(&rest) / &c;
            let strict = r.ty == RowType::Lt;
            best = Some(match best {
                None => (bound, strict),
                Some((b, s)) => match bound.cmp(&b) {
                    std::cmp::Ordering::Less => (bound, strict),
                    std::cmp::Ordering::Equal => (b, s || strict),
                    std::cmp::Ordering::Greater => (b, s),
                },
            });
        }

        match best {
            None => InfEps::pos_infinite(),
            Some((opt, true)) => InfEps::finite_eps(opt, -1),
            Some((opt, false)) => {
                if !has_int {
                    self.update_witness(z, &opt, &trail);
                }
                InfEps::finite(opt)
            }
        }
    }

    /// Move variable values to an optimal witness point, walking the
    /// elimination trail backwards.
    fn update_witness(&mut self, z: VarId, opt: &BigRational, trail: &[Elim]) {
        self.vars[z].value = opt.clone();
        for elim in trail.iter().rev() {
            match elim {
                Elim::Subst(v, repl) => {
                    self.vars[*v].value = self.expr_value(repl);
                }
                Elim::Bounds(v, rows) => {
                    let mut lo: Option<(BigRational, bool)> = None;
                    let mut hi: Option<(BigRational, bool)> = None;
                    for r in rows {
                        let c = r.expr.coeff(*v);
                        let mut rest = r.expr.clone();
                        rest.remove(*v);
                        let bound = -self.expr_value(&rest) / &c;
                        let strict = r.ty == RowType::Lt;
                        if c.is_positive() {
                            hi = Some(match hi {
                                None => (bound, strict),
                                Some((b, s)) => match bound.cmp(&b) {
                                    std::cmp::Ordering::Less => (bound, strict),
                                    std::cmp::Ordering::Equal => (b, s || strict),
                                    std::cmp::Ordering::Greater => (b, s),
                                },
                            });
                        } else {
                            lo = Some(match lo {
                                None => (bound, strict),
                                Some((b, s)) => match bound.cmp(&b) {
                                    std::cmp::Ordering::Greater => (bound, strict),
                                    std::cmp::Ordering::Equal => (b, s || strict),
                                    std::cmp::Ordering::Less => (b, s),
                                },
                            });
                        }
                    }
                    let two = BigRational::from_integer(2.into());
                    self.vars[*v].value = match (lo, hi) {
                        (Some((l, ls)), None) => {
                            if ls {
                                l + BigRational::one()
                            } else {
                                l
                            }
                        }
                        (None, Some((h, hs))) => {
                            if hs {
                                h - BigRational::one()
                            } else {
                                h
                            }
                        }
                        (Some((l, _)), Some((h, _))) if l == h => l,
                        (Some((l, _)), Some((h, _))) => (l + h) / two,
                        (None, None) => unreachable!("bounded elimination without bounds"),
                    };
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // internals
    // ------------------------------------------------------------------

    fn mk_expr(&self, coeffs: Vec<(VarId, BigRational)>, k: BigRational) -> LinExpr {
        let mut acc: FxHashMap<VarId, BigRational> = FxHashMap::default();
        for (id, c) in coeffs {
            debug_assert!(id < self.vars.len());
            *acc.entry(id).or_insert_with(BigRational::zero) += c;
        }
        let mut vars: SmallVec<[RowVar; 4]> = acc
            .into_iter()
            .filter(|(_, c)| !c.is_zero())
            .map(|(id, coeff)| RowVar { id, coeff })
            .collect();
        vars.sort_by_key(|rv| rv.id);
        LinExpr { vars, constant: k }
    }

    fn expr_value(&self, e: &LinExpr) -> BigRational {
        let mut v = e.constant.clone();
        for rv in &e.vars {
            v += &rv.coeff * &self.vars[rv.id].value;
        }
        v
    }

    fn satisfied(&self, row: &Row) -> bool {
        let v = self.expr_value(&row.expr);
        match row.ty {
            RowType::Le => !v.is_positive(),
            RowType::Lt => v.is_negative(),
            RowType::Eq => v.is_zero(),
            RowType::Divides => {
                v.is_integer() && (v.to_integer() % &row.modulus).is_zero()
            }
            RowType::Mod => {
                let d = row.def_var.expect("mod row defines a variable");
                let q = floor_div_q(&v, &row.modulus);
                self.vars[d].value == v - BigRational::from_integer(&row.modulus * q)
            }
            RowType::Div => {
                let d = row.def_var.expect("div row defines a variable");
                self.vars[d].value == BigRational::from_integer(floor_div_q(&v, &row.modulus))
            }
        }
    }

    fn push_row(&mut self, mut row: Row) {
        debug_assert!(self.satisfied(&row), "row violates the current values");
        if row.expr.vars.is_empty() && !matches!(row.ty, RowType::Mod | RowType::Div) {
            // tautology under a model-consistent store
            row.alive = false;
        }
        self.rows.push(row);
    }

    fn push_normalized(&mut self, mut row: Row) {
        self.normalize_row(&mut row);
        self.push_row(row);
    }

    /// Live rows in which `x` occurs with a non-zero coefficient.
    fn occurrences(&self, x: VarId) -> Vec<usize> {
        self.rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.alive && !r.expr.coeff(x).is_zero())
            .map(|(i, _)| i)
            .collect()
    }

    /// The bound row `ri` puts on `x`: `x ⊙ bound`.
    fn bound_value(&self, ri: usize, x: VarId) -> BigRational {
        let r = &self.rows[ri];
        let c = r.expr.coeff(x);
        let mut rest = r.expr.clone();
        rest.remove(x);
        -self.expr_value(&rest) / c
    }

    /// Replace `c·x` by `c·repl` in every live row.
    fn substitute(&mut self, x: VarId, repl: &LinExpr) {
        for ri in 0..self.rows.len() {
            if !self.rows[ri].alive {
                continue;
            }
            let c = self.rows[ri].expr.coeff(x);
            if c.is_zero() {
                continue;
            }
            let mut row = self.rows[ri].clone();
            row.expr.remove(x);
            row.expr.add_scaled(repl, &c);
            self.normalize_row(&mut row);
            if row.expr.vars.is_empty() && !matches!(row.ty, RowType::Mod | RowType::Div) {
                row.alive = false;
            }
            debug_assert!(self.satisfied(&row));
            self.rows[ri] = row;
        }
    }

    /// Canonicalize an ordinary comparison row over integer variables:
    /// integer coefficients, non-strict form, gcd-reduced.
    fn normalize_row(&self, row: &mut Row) {
        if !matches!(row.ty, RowType::Le | RowType::Lt | RowType::Eq) {
            return;
        }
        if row.expr.vars.is_empty()
            || !row.expr.vars.iter().all(|rv| self.vars[rv.id].is_int)
        {
            return;
        }
        let mut l = BigInt::one();
        for rv in &row.expr.vars {
            l = lcm_int(&l, rv.coeff.denom());
        }
        l = lcm_int(&l, row.expr.constant.denom());
        if !l.is_one() {
            row.expr.scale(&BigRational::from_integer(l));
        }
        if row.ty == RowType::Lt {
            // t < 0 iff t + 1 <= 0 over the integers
            row.expr.constant += BigRational::one();
            row.ty = RowType::Le;
        }
        let mut g = BigInt::zero();
        for rv in &row.expr.vars {
            g = gcd_int(&g, rv.coeff.numer());
        }
        if g > BigInt::one() {
            let f = BigRational::from_integer(g);
            for rv in &mut row.expr.vars {
                rv.coeff = &rv.coeff / &f;
            }
            let c = &row.expr.constant / &f;
            row.expr.constant = match row.ty {
                RowType::Eq => {
                    debug_assert!(c.is_integer());
                    c
                }
                _ => c.ceil(),
            };
        }
    }
}

impl Default for ModelBasedOpt {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ModelBasedOpt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, r) in self.rows.iter().enumerate() {
            if !r.alive {
                continue;
            }
            write!(f, "r{}: ", i)?;
            for (j, rv) in r.expr.vars.iter().enumerate() {
                if j > 0 {
                    write!(f, " + ")?;
                }
                write!(f, "{}*v{}", rv.coeff, rv.id)?;
            }
            if !r.expr.constant.is_zero() || r.expr.vars.is_empty() {
                write!(f, " + {}", r.expr.constant)?;
            }
            match r.ty {
                RowType::Le => writeln!(f, " <= 0")?,
                RowType::Lt => writeln!(f, " < 0")?,
                RowType::Eq => writeln!(f, " = 0")?,
                RowType::Mod => {
                    writeln!(f, " mod {} = v{}", r.modulus, r.def_var.unwrap_or(0))?
                }
                RowType::Div => {
                    writeln!(f, " div {} = v{}", r.modulus, r.def_var.unwrap_or(0))?
                }
                RowType::Divides => writeln!(f, " divisible by {}", r.modulus)?,
            }
        }
        Ok(())
    }
}

fn gcd_int(a: &BigInt, b: &BigInt) -> BigInt {
    let mut x = a.abs();
    let mut y = b.abs();
    while !y.is_zero() {
        let t = y.clone();
        y = &x % &y;
        x = t;
    }
    x
}

fn lcm_int(a: &BigInt, b: &BigInt) -> BigInt {
    if a.is_zero() || b.is_zero() {
        return BigInt::zero();
    }
    let g = gcd_int(a, b);
    (a / g * b).abs()
}

/// `⌊q / m⌋` for a positive integer `m`.
fn floor_div_q(q: &BigRational, m: &BigInt) -> BigInt {
    debug_assert!(m.is_positive());
    (q / BigRational::from_integer(m.clone())).floor().to_integer()
}

/// `a mod m` in `[0, m)` for a positive `m`.
fn mod_floor_int(a: &BigInt, m: &BigInt) -> BigInt {
    debug_assert!(m.is_positive());
    let r = a % m;
    if r.is_negative() {
        r + m
    } else {
        r
    }
}
