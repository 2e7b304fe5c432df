//! Arithmetic Model-Based Projection.
//!
//! Extracts linear inequalities from literals into the numeric engine,
//! using the current model to choose values for conditionals and to prime
//! the engine with the interpretation of sub-expressions that are treated
//! as engine variables. The engine then eliminates the requested variables;
//! surviving rows are converted back to formulas and, on request, each
//! eliminated variable receives a witness definition over the survivors.
//!
//! Literals the dispatcher cannot handle stay in the caller's formula
//! vector as residue; non-linear sub-terms become atomic engine variables
//! seeded with their model value. Neither is an error.
//!
//! ## References
//!
//! - Z3's `qe/mbp/mbp_arith.cpp`
//! - Bjørner & Janota: "Playing with Quantified Satisfaction" (2015)

use crate::ast::{TermId, TermKind, TermManager};
use crate::error::{MbqeError, Result};
use crate::model::{Model, ModelEvaluator, Value};
use crate::qe::mbp::{Maximum, MbpDef, ProjectPlugin, TheoryFamily};
use mbqe_math::mbo::{DefTree, ModelBasedOpt, Row, RowType, VarId};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use rustc_hash::{FxHashMap, FxHashSet};

/// Configuration for arithmetic projection.
#[derive(Debug, Clone)]
pub struct MbpConfig {
    /// Strict purity mode: also refuse to eliminate variables reachable
    /// from the residue or from any impure non-target representative.
    pub check_purified: bool,
    /// Substitute computed definitions into the projected formulas and
    /// re-check them under the model.
    pub apply_projection: bool,
}

impl Default for MbpConfig {
    fn default() -> Self {
        Self {
            check_purified: true,
            apply_projection: false,
        }
    }
}

/// Projection statistics.
#[derive(Debug, Clone, Default)]
pub struct MbpStats {
    /// Literals absorbed into the engine.
    pub literals_absorbed: usize,
    /// Literals left in the residue.
    pub literals_residual: usize,
    /// Variables handed to the engine for elimination.
    pub vars_projected: usize,
    /// Witness definitions reconstructed.
    pub defs_computed: usize,
}

/// Model-based projection plugin for linear integer/real arithmetic.
pub struct ArithProjectPlugin {
    config: MbpConfig,
    stats: MbpStats,
}

impl ArithProjectPlugin {
    /// Plugin with the given configuration.
    pub fn new(config: MbpConfig) -> Self {
        Self {
            config,
            stats: MbpStats::default(),
        }
    }

    /// Strict purity mode (default true).
    pub fn set_check_purified(&mut self, on: bool) {
        self.config.check_purified = on;
    }

    /// Apply-and-validate mode (default false).
    pub fn set_apply_projection(&mut self, on: bool) {
        self.config.apply_projection = on;
    }

    /// Projection statistics.
    pub fn stats(&self) -> &MbpStats {
        &self.stats
    }

    /// Project `vars` out of `fmls` in place.
    pub fn project(
        &mut self,
        model: &mut Model,
        vars: &mut Vec<TermId>,
        fmls: &mut Vec<TermId>,
        tm: &mut TermManager,
    ) -> Result<()> {
        self.project_impl(model, vars, fmls, false, tm)?;
        Ok(())
    }

    /// Project and append one definition per eliminated variable.
    pub fn project_with_defs(
        &mut self,
        model: &mut Model,
        vars: &mut Vec<TermId>,
        fmls: &mut Vec<TermId>,
        defs: &mut Vec<MbpDef>,
        tm: &mut TermManager,
    ) -> Result<()> {
        let mut out = self.project_impl(model, vars, fmls, true, tm)?;
        defs.append(&mut out);
        Ok(())
    }

    /// Project a single variable; `Ok(true)` iff it was eliminated.
    /// A surviving variable is appended to `vars`.
    pub fn project_one(
        &mut self,
        model: &mut Model,
        var: TermId,
        vars: &mut Vec<TermId>,
        fmls: &mut Vec<TermId>,
        tm: &mut TermManager,
    ) -> Result<bool> {
        let mut vs = vec![var];
        self.project_impl(model, &mut vs, fmls, false, tm)?;
        let eliminated = vs.is_empty();
        vars.append(&mut vs);
        Ok(eliminated)
    }

    // ------------------------------------------------------------------
    // linearizer
    // ------------------------------------------------------------------

    fn insert_mul(t: TermId, mul: &BigRational, ts: &mut FxHashMap<TermId, BigRational>) {
        *ts.entry(t).or_insert_with(BigRational::zero) += mul;
    }

    /// Extract one linear constraint from `lit` into the engine, or expand
    /// it into model-selected sub-literals appended to `fmls`. `Ok(false)`
    /// means the literal is opaque and belongs to the residue.
    #[allow(clippy::too_many_arguments)]
    fn linearize_literal(
        &mut self,
        mbo: &mut ModelBasedOpt,
        eval: &mut ModelEvaluator,
        lit: TermId,
        fmls: &mut Vec<TermId>,
        tids: &mut FxHashMap<TermId, VarId>,
        tm: &mut TermManager,
    ) -> Result<bool> {
        if !tm.inc() {
            return Err(MbqeError::Canceled);
        }
        let mut l = lit;
        let mut is_not = false;
        if let Some(TermKind::Not(inner)) = tm.get(l).map(|t| t.kind.clone()) {
            is_not = true;
            l = inner;
        }
        let mul = if is_not {
            -BigRational::one()
        } else {
            BigRational::one()
        };
        let mut ts: FxHashMap<TermId, BigRational> = FxHashMap::default();
        let mut c = BigRational::zero();
        let ty;

        let Some(term) = tm.get(l) else {
            return Ok(false);
        };
        let kind = term.kind.clone();
        match kind {
            TermKind::Le(a, b) => {
                self.linearize_term(mbo, eval, &mul, a, &mut c, fmls, &mut ts, tids, tm)?;
                self.linearize_term(mbo, eval, &-mul, b, &mut c, fmls, &mut ts, tids, tm)?;
                ty = if is_not { RowType::Lt } else { RowType::Le };
            }
            TermKind::Ge(a, b) => {
                self.linearize_term(mbo, eval, &mul, b, &mut c, fmls, &mut ts, tids, tm)?;
                self.linearize_term(mbo, eval, &-mul, a, &mut c, fmls, &mut ts, tids, tm)?;
                ty = if is_not { RowType::Lt } else { RowType::Le };
            }
            TermKind::Lt(a, b) => {
                self.linearize_term(mbo, eval, &mul, a, &mut c, fmls, &mut ts, tids, tm)?;
                self.linearize_term(mbo, eval, &-mul, b, &mut c, fmls, &mut ts, tids, tm)?;
                ty = if is_not { RowType::Le } else { RowType::Lt };
            }
            TermKind::Gt(a, b) => {
                self.linearize_term(mbo, eval, &mul, b, &mut c, fmls, &mut ts, tids, tm)?;
                self.linearize_term(mbo, eval, &-mul, a, &mut c, fmls, &mut ts, tids, tm)?;
                ty = if is_not { RowType::Le } else { RowType::Lt };
            }
            TermKind::Eq(a, b) if !is_not && tm.is_arith(a) => {
                self.linearize_term(mbo, eval, &mul, a, &mut c, fmls, &mut ts, tids, tm)?;
                self.linearize_term(mbo, eval, &-mul, b, &mut c, fmls, &mut ts, tids, tm)?;
                ty = RowType::Eq;
            }
            TermKind::Eq(a, b) if is_not && tm.is_arith(a) => {
                let Some(r1) = eval.eval_rational(a, tm) else {
                    return Ok(false);
                };
                let Some(r2) = eval.eval_rational(b, tm) else {
                    return Ok(false);
                };
                if r1 == r2 {
                    return Err(MbqeError::AssumptionFailed(
                        "disequality holds under the model".into(),
                    ));
                }
                // order so that the model-smaller side ends up strictly below
                let (a, b) = if r1 < r2 { (b, a) } else { (a, b) };
                ty = RowType::Lt;
                self.linearize_term(mbo, eval, &mul, a, &mut c, fmls, &mut ts, tids, tm)?;
                self.linearize_term(mbo, eval, &-mul, b, &mut c, fmls, &mut ts, tids, tm)?;
            }
            TermKind::Distinct(args) if !is_not && tm.is_arith(args[0]) => {
                let mut nums: Vec<(TermId, BigRational)> = Vec::with_capacity(args.len());
                for &arg in &args {
                    let Some(r) = eval.eval_rational(arg, tm) else {
                        return Ok(false);
                    };
                    nums.push((arg, r));
                }
                nums.sort_by(|x, y| x.1.cmp(&y.1));
                for w in nums.windows(2) {
                    debug_assert!(w[0].1 < w[1].1);
                    let fml = tm.mk_lt(w[0].0, w[1].0);
                    if !self.linearize_literal(mbo, eval, fml, fmls, tids, tm)? {
                        return Ok(false);
                    }
                }
                return Ok(true);
            }
            TermKind::Distinct(args) if is_not && tm.is_arith(args[0]) => {
                // two arguments coincide under the model; equate them
                let mut values: FxHashMap<BigRational, TermId> = FxHashMap::default();
                let mut found = None;
                for &arg in &args {
                    let Some(r) = eval.eval_rational(arg, tm) else {
                        return Ok(false);
                    };
                    if let Some(&other) = values.get(&r) {
                        found = Some((arg, other));
                        break;
                    }
                    values.insert(r, arg);
                }
                let Some((a, b)) = found else {
                    return Err(MbqeError::AssumptionFailed(
                        "negated distinct without an equal pair".into(),
                    ));
                };
                ty = RowType::Eq;
                self.linearize_term(mbo, eval, &mul, a, &mut c, fmls, &mut ts, tids, tm)?;
                self.linearize_term(mbo, eval, &-mul, b, &mut c, fmls, &mut ts, tids, tm)?;
            }
            TermKind::And(args) if !is_not => {
                fmls.extend(args);
                return Ok(true);
            }
            TermKind::Or(args) if is_not => {
                for &arg in &args {
                    let n = tm.mk_not(arg);
                    fmls.push(n);
                }
                return Ok(true);
            }
            TermKind::Or(args) if !is_not => {
                for &arg in &args {
                    if eval.is_true(arg, tm) {
                        fmls.push(arg);
                        return Ok(true);
                    }
                }
                return Ok(false);
            }
            TermKind::And(args) if is_not => {
                for &arg in &args {
                    if eval.is_false(arg, tm) {
                        let n = tm.mk_not(arg);
                        fmls.push(n);
                        return Ok(true);
                    }
                }
                return Ok(false);
            }
            _ => return Ok(false),
        }
        let coeffs = self.extract_coefficients(mbo, eval, &ts, tids, tm)?;
        mbo.add_constraint(coeffs, c, ty);
        Ok(true)
    }

    /// Normalize term `t`, scaled by `mul`, into the coefficient map `ts`
    /// and running constant `c`. Branching and mod/div constructs are
    /// resolved against the model; anything else opaque becomes atomic.
    #[allow(clippy::too_many_arguments)]
    fn linearize_term(
        &mut self,
        mbo: &mut ModelBasedOpt,
        eval: &mut ModelEvaluator,
        mul: &BigRational,
        t: TermId,
        c: &mut BigRational,
        fmls: &mut Vec<TermId>,
        ts: &mut FxHashMap<TermId, BigRational>,
        tids: &mut FxHashMap<TermId, VarId>,
        tm: &mut TermManager,
    ) -> Result<()> {
        if tids.contains_key(&t) {
            Self::insert_mul(t, mul, ts);
            return Ok(());
        }
        let Some(term) = tm.get(t) else {
            Self::insert_mul(t, mul, ts);
            return Ok(());
        };
        let kind = term.kind.clone();
        match kind {
            TermKind::IntConst(n) => {
                *c += mul * BigRational::from_integer(n);
            }
            TermKind::RealConst(q) => {
                *c += mul * q;
            }
            TermKind::Neg(a) => {
                self.linearize_term(mbo, eval, &-mul.clone(), a, c, fmls, ts, tids, tm)?;
            }
            TermKind::Add(args) => {
                for &a in &args {
                    self.linearize_term(mbo, eval, mul, a, c, fmls, ts, tids, tm)?;
                }
            }
            TermKind::Sub(a, b) => {
                self.linearize_term(mbo, eval, mul, a, c, fmls, ts, tids, tm)?;
                self.linearize_term(mbo, eval, &-mul.clone(), b, c, fmls, ts, tids, tm)?;
            }
            TermKind::Mul(args) => {
                // fold out numeral factors; one non-numeral factor keeps the
                // term linear, more make it opaque
                let mut factor = BigRational::one();
                let mut rest = Vec::new();
                for &a in &args {
                    match tm.numeral_value(a) {
                        Some(q) => factor *= q,
                        None => rest.push(a),
                    }
                }
                match rest.len() {
                    0 => *c += mul * factor,
                    1 => {
                        let m = mul * factor;
                        self.linearize_term(mbo, eval, &m, rest[0], c, fmls, ts, tids, tm)?;
                    }
                    _ => Self::insert_mul(t, mul, ts),
                }
            }
            TermKind::Ite(g, a, b) => match eval.eval(g, tm) {
                Value::Bool(true) => {
                    fmls.push(g);
                    self.linearize_term(mbo, eval, mul, a, c, fmls, ts, tids, tm)?;
                }
                Value::Bool(false) => {
                    let ng = tm.mk_not(g);
                    fmls.push(ng);
                    self.linearize_term(mbo, eval, mul, b, c, fmls, ts, tids, tm)?;
                }
                _ => {
                    return Err(MbqeError::EvaluationNotGround {
                        expected: "truth value",
                        term: tm.display(g).to_string(),
                    });
                }
            },
            TermKind::Mod(a, b)
                if tm
                    .numeral_value(b)
                    .is_some_and(|r| r.is_positive()) =>
            {
                let m = tm.numeral_value(b).expect("guard").to_integer();
                let (coeffs, c0) = self.linearize_nested(mbo, eval, a, fmls, tids, tm)?;
                let v = mbo.add_mod(coeffs, c0, m);
                tids.insert(t, v);
                Self::insert_mul(t, mul, ts);
            }
            TermKind::Div(a, b)
                if tm.is_int(t)
                    && tm
                        .numeral_value(b)
                        .is_some_and(|r| r.is_positive()) =>
            {
                let m = tm.numeral_value(b).expect("guard").to_integer();
                let (coeffs, c0) = self.linearize_nested(mbo, eval, a, fmls, tids, tm)?;
                let v = mbo.add_div(coeffs, c0, m);
                tids.insert(t, v);
                Self::insert_mul(t, mul, ts);
            }
            _ => {
                // uninterpreted or non-linear: treat atomically
                Self::insert_mul(t, mul, ts);
            }
        }
        Ok(())
    }

    /// Linearize a mod/div body into a standalone coefficient list.
    fn linearize_nested(
        &mut self,
        mbo: &mut ModelBasedOpt,
        eval: &mut ModelEvaluator,
        t: TermId,
        fmls: &mut Vec<TermId>,
        tids: &mut FxHashMap<TermId, VarId>,
        tm: &mut TermManager,
    ) -> Result<(Vec<(VarId, BigRational)>, BigRational)> {
        let mut ts0: FxHashMap<TermId, BigRational> = FxHashMap::default();
        let mut c0 = BigRational::zero();
        let one = BigRational::one();
        self.linearize_term(mbo, eval, &one, t, &mut c0, fmls, &mut ts0, tids, tm)?;
        let coeffs = self.extract_coefficients(mbo, eval, &ts0, tids, tm)?;
        Ok((coeffs, c0))
    }

    /// Resolve the coefficient map to engine variables, allocating fresh
    /// ones seeded with the model value of their term.
    fn extract_coefficients(
        &mut self,
        mbo: &mut ModelBasedOpt,
        eval: &mut ModelEvaluator,
        ts: &FxHashMap<TermId, BigRational>,
        tids: &mut FxHashMap<TermId, VarId>,
        tm: &mut TermManager,
    ) -> Result<Vec<(VarId, BigRational)>> {
        let mut coeffs = Vec::with_capacity(ts.len());
        for (&t, coeff) in ts {
            let id = match tids.get(&t) {
                Some(&id) => id,
                None => {
                    let Some(q) = eval.eval_rational(t, tm) else {
                        return Err(MbqeError::EvaluationNotGround {
                            expected: "numeral",
                            term: tm.display(t).to_string(),
                        });
                    };
                    let id = mbo.add_var(q, tm.is_int(t));
                    tids.insert(t, id);
                    id
                }
            };
            if !coeff.is_zero() {
                coeffs.push((id, coeff.clone()));
            }
        }
        Ok(coeffs)
    }

    // ------------------------------------------------------------------
    // projector
    // ------------------------------------------------------------------

    fn project_impl(
        &mut self,
        model: &mut Model,
        vars: &mut Vec<TermId>,
        fmls: &mut Vec<TermId>,
        compute_def: bool,
        tm: &mut TermManager,
    ) -> Result<Vec<MbpDef>> {
        if !vars.iter().any(|&v| tm.is_arith(v)) {
            return Ok(Vec::new());
        }
        let compute_def = compute_def || self.config.apply_projection;
        let mut eval = ModelEvaluator::new(model);
        eval.set_model_completion(true);

        let mut mbo = ModelBasedOpt::new();
        let mut tids: FxHashMap<TermId, VarId> = FxHashMap::default();

        // absorb what linearizes; compact the residue in place
        let mut i = 0;
        let mut j = 0;
        while i < fmls.len() {
            let fml = fmls[i];
            debug_assert!(
                !eval.is_false(fml, tm),
                "literal {} is false under the model",
                tm.display(fml)
            );
            if self.linearize_literal(&mut mbo, &mut eval, fml, fmls, &mut tids, tm)? {
                self.stats.literals_absorbed += 1;
            } else {
                tracing::trace!(lit = %tm.display(fml), "literal left in residue");
                self.stats.literals_residual += 1;
                fmls[j] = fml;
                j += 1;
            }
            i += 1;
        }
        fmls.truncate(j);

        // engine variables for targets the linearizer never met
        for &v in vars.iter() {
            if tm.is_arith(v) && !tids.contains_key(&v) {
                if !tm.inc() {
                    return Err(MbqeError::Canceled);
                }
                let Some(q) = eval.eval_rational(v, tm) else {
                    return Err(MbqeError::EvaluationNotGround {
                        expected: "numeral",
                        term: tm.display(v).to_string(),
                    });
                };
                tids.insert(v, mbo.add_var(q, tm.is_int(v)));
            }
        }

        // purity: representatives the engine cannot express natively taint
        // their whole sub-DAG
        let var_mark: FxHashSet<TermId> = vars.iter().copied().collect();
        let mut fmls_mark: FxHashSet<TermId> = FxHashSet::default();
        for &e in tids.keys() {
            if tm.is_arith(e) && !is_pure(e, tm) && !var_mark.contains(&e) {
                mark_rec(&mut fmls_mark, e, tm);
            }
        }
        if self.config.check_purified {
            for &fml in fmls.iter() {
                mark_rec(&mut fmls_mark, fml, tm);
            }
            for &e in tids.keys() {
                if !var_mark.contains(&e) && !is_pure(e, tm) {
                    mark_rec(&mut fmls_mark, e, tm);
                }
            }
        }

        let mut index2expr: Vec<Option<TermId>> = vec![None; mbo.num_vars()];
        for (&e, &id) in &tids {
            index2expr[id] = Some(e);
        }

        // split the targets into eliminable and surviving
        let mut real_vars: Vec<VarId> = Vec::new();
        let mut eliminated: Vec<TermId> = Vec::new();
        let mut j = 0;
        for i in 0..vars.len() {
            let v = vars[i];
            if tm.is_arith(v) && !fmls_mark.contains(&v) {
                real_vars.push(tids[&v]);
                eliminated.push(v);
            } else {
                vars[j] = v;
                j += 1;
            }
        }
        vars.truncate(j);
        self.stats.vars_projected += real_vars.len();
        tracing::debug!(
            eliminable = real_vars.len(),
            surviving = vars.len(),
            residue = fmls.len(),
            "projecting"
        );

        let defs = mbo.project(&real_vars, compute_def);

        let rows = mbo.get_live_rows();
        let mut def_rows: FxHashMap<VarId, Row> = FxHashMap::default();
        for r in &rows {
            if matches!(r.ty, RowType::Mod | RowType::Div) {
                def_rows.insert(r.def_var.expect("defined row"), r.clone());
            }
        }
        self.rows_to_fmls(&rows, &def_rows, &index2expr, fmls, tm);

        let mut result = Vec::new();
        if compute_def {
            for (i, d) in defs.iter().enumerate() {
                let Some(tree) = d else {
                    // unbounded in the elimination direction
                    continue;
                };
                let x = eliminated[i];
                let term = self.reconstruct_def(tree, tm.is_int(x), &def_rows, &index2expr, tm);
                self.stats.defs_computed += 1;
                result.push(MbpDef { var: x, term });
            }
        }

        if self.config.apply_projection {
            self.apply_defs(&mut eval, &result, fmls, tm)?;
        }
        Ok(result)
    }

    // ------------------------------------------------------------------
    // row -> formula conversion
    // ------------------------------------------------------------------

    fn rows_to_fmls(
        &self,
        rows: &[Row],
        def_rows: &FxHashMap<VarId, Row>,
        index2expr: &[Option<TermId>],
        fmls: &mut Vec<TermId>,
        tm: &mut TermManager,
    ) {
        for r in rows {
            if r.expr.vars.is_empty() {
                continue;
            }
            // mod/div rows are consumed by inlining
            if matches!(r.ty, RowType::Mod | RowType::Div) {
                continue;
            }
            if r.expr.vars.len() == 1
                && r.expr.vars[0].coeff.is_negative()
                && matches!(r.ty, RowType::Le | RowType::Lt | RowType::Eq)
            {
                // flip the sign to avoid a negated left-hand side
                let rv = &r.expr.vars[0];
                let mut t = self.id_to_term(rv.id, def_rows, index2expr, tm);
                if rv.coeff != -BigRational::one() {
                    let n = tm.mk_numeral(-rv.coeff.clone(), tm.is_int(t));
                    t = tm.mk_mul(vec![n, t]);
                }
                let s = tm.mk_numeral(
                    r.expr.constant.clone(),
                    r.expr.constant.is_integer() && tm.is_int(t),
                );
                let fml = match r.ty {
                    RowType::Lt => tm.mk_gt(t, s),
                    RowType::Le => tm.mk_ge(t, s),
                    _ => tm.mk_eq(t, s),
                };
                fmls.push(fml);
                continue;
            }
            let t = self.row_to_term(r, def_rows, index2expr, tm);
            let fml = match r.ty {
                RowType::Lt | RowType::Le | RowType::Eq => {
                    let s = tm.mk_numeral(
                        -r.expr.constant.clone(),
                        r.expr.constant.is_integer() && tm.is_int(t),
                    );
                    match r.ty {
                        RowType::Lt => tm.mk_lt(t, s),
                        RowType::Le => tm.mk_le(t, s),
                        _ => tm.mk_eq(t, s),
                    }
                }
                RowType::Divides => {
                    let m = tm.mk_int(r.modulus.clone());
                    let md = tm.mk_mod(t, m);
                    let zero = tm.mk_int(0);
                    tm.mk_eq(md, zero)
                }
                RowType::Mod | RowType::Div => unreachable!("filtered above"),
            };
            fmls.push(fml);
        }
    }

    /// Rebuild a row body as a term, inlining mod/div defined variables.
    fn row_to_term(
        &self,
        r: &Row,
        def_rows: &FxHashMap<VarId, Row>,
        index2expr: &[Option<TermId>],
        tm: &mut TermManager,
    ) -> TermId {
        let mut ts: Vec<TermId> = Vec::with_capacity(r.expr.vars.len() + 1);
        for rv in &r.expr.vars {
            let t = self.id_to_term(rv.id, def_rows, index2expr, tm);
            if let Some(n) = tm.numeral_value(t) {
                if n.is_zero() {
                    continue;
                }
                let folded = tm.mk_numeral(&rv.coeff * n, tm.is_int(t));
                ts.push(folded);
            } else if !rv.coeff.is_one() {
                let n = tm.mk_numeral(rv.coeff.clone(), tm.is_int(t));
                ts.push(tm.mk_mul(vec![n, t]));
            } else {
                ts.push(t);
            }
        }
        match r.ty {
            RowType::Mod => {
                debug_assert!(r.expr.constant.is_integer());
                let k = r.expr.constant.to_integer();
                if ts.is_empty() {
                    return tm.mk_int(mod_floor(&k, &r.modulus));
                }
                if !k.is_zero() {
                    let kt = tm.mk_int(k);
                    ts.push(kt);
                }
                let body = tm.mk_add(ts);
                let m = tm.mk_int(r.modulus.clone());
                tm.mk_mod(body, m)
            }
            RowType::Div => {
                debug_assert!(r.expr.constant.is_integer());
                let k = r.expr.constant.to_integer();
                if ts.is_empty() {
                    return tm.mk_int(floor_div(&k, &r.modulus));
                }
                if !k.is_zero() {
                    let kt = tm.mk_int(k);
                    ts.push(kt);
                }
                let body = tm.mk_add(ts);
                let m = tm.mk_int(r.modulus.clone());
                tm.mk_div(body, m)
            }
            RowType::Divides => {
                if !r.expr.constant.is_zero() {
                    let kt =
                        tm.mk_numeral(r.expr.constant.clone(), r.expr.constant.is_integer());
                    ts.push(kt);
                }
                tm.mk_add(ts)
            }
            _ => tm.mk_add(ts),
        }
    }

    fn id_to_term(
        &self,
        id: VarId,
        def_rows: &FxHashMap<VarId, Row>,
        index2expr: &[Option<TermId>],
        tm: &mut TermManager,
    ) -> TermId {
        if let Some(r) = def_rows.get(&id) {
            return self.row_to_term(r, def_rows, index2expr, tm);
        }
        index2expr[id].expect("engine variable has a term image")
    }

    // ------------------------------------------------------------------
    // definition reconstruction
    // ------------------------------------------------------------------

    /// Convert an engine definition tree into a kernel term of the target
    /// variable's sort.
    fn reconstruct_def(
        &self,
        d: &DefTree,
        is_int: bool,
        def_rows: &FxHashMap<VarId, Row>,
        index2expr: &[Option<TermId>],
        tm: &mut TermManager,
    ) -> TermId {
        match d {
            DefTree::Const(q) => tm.mk_numeral(q.clone(), is_int),
            DefTree::Var(id, coeff) => {
                let t = self.id_to_term(*id, def_rows, index2expr, tm);
                if coeff.is_one() {
                    t
                } else {
                    let n = tm.mk_numeral(coeff.clone(), tm.is_int(t));
                    tm.mk_mul(vec![n, t])
                }
            }
            DefTree::Add(x, y) => {
                let tx = self.reconstruct_def(x, is_int, def_rows, index2expr, tm);
                let ty = self.reconstruct_def(y, is_int, def_rows, index2expr, tm);
                tm.mk_add(vec![tx, ty])
            }
            DefTree::Mul(x, y) => {
                let tx = self.reconstruct_def(x, is_int, def_rows, index2expr, tm);
                let ty = self.reconstruct_def(y, is_int, def_rows, index2expr, tm);
                tm.mk_mul(vec![tx, ty])
            }
            DefTree::Div(x, m) => {
                let tx = self.reconstruct_def(x, is_int, def_rows, index2expr, tm);
                let tn = tm.mk_numeral(m.clone(), is_int);
                tm.mk_div(tx, tn)
            }
        }
    }

    // ------------------------------------------------------------------
    // apply-and-validate
    // ------------------------------------------------------------------

    /// Substitute the definitions into the projected formulas, later
    /// definitions first so they may reference earlier variables, and check
    /// each result under the model.
    fn apply_defs(
        &self,
        eval: &mut ModelEvaluator,
        defs: &[MbpDef],
        fmls: &mut Vec<TermId>,
        tm: &mut TermManager,
    ) -> Result<()> {
        if fmls.is_empty() || defs.is_empty() {
            return Ok(());
        }
        let mut subst: FxHashMap<TermId, TermId> = FxHashMap::default();
        for d in defs.iter().rev() {
            let t = tm.substitute(d.term, &subst);
            subst.insert(d.var, t);
        }
        for i in 0..fmls.len() {
            let nf = tm.substitute(fmls[i], &subst);
            if eval.is_false(nf, tm) {
                return Err(MbqeError::ProjectionInvalidatesModel);
            }
            fmls[i] = nf;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // maximization
    // ------------------------------------------------------------------

    /// Maximize the real objective `t` subject to `fmls` under the model.
    ///
    /// Returns the optimum together with a weak bound `ge` the model
    /// already satisfies and a strict improvement bound `gt` (`false` when
    /// the objective is unbounded). Uninterpreted constants are moved to
    /// the engine's witness values.
    pub fn maximize(
        &mut self,
        fmls0: &[TermId],
        model: &mut Model,
        t: TermId,
        tm: &mut TermManager,
    ) -> Result<Maximum> {
        debug_assert!(tm.is_real(t));
        let mut fmls = fmls0.to_vec();
        let mut mbo = ModelBasedOpt::new();
        let mut tids: FxHashMap<TermId, VarId> = FxHashMap::default();
        let mut eval = ModelEvaluator::new(model);
        eval.set_model_completion(true);

        // objective
        let mut ts: FxHashMap<TermId, BigRational> = FxHashMap::default();
        let mut c = BigRational::zero();
        let one = BigRational::one();
        self.linearize_term(&mut mbo, &mut eval, &one, t, &mut c, &mut fmls, &mut ts, &mut tids, tm)?;
        let coeffs = self.extract_coefficients(&mut mbo, &mut eval, &ts, &mut tids, tm)?;
        mbo.set_objective(coeffs, c);
        debug_assert!(self.validate_model(&mut eval, fmls0, tm));

        // constraints; opaque formulas simply do not constrain the optimum
        let mut i = 0;
        while i < fmls.len() {
            let fml = fmls[i];
            self.linearize_literal(&mut mbo, &mut eval, fml, &mut fmls, &mut tids, tm)?;
            i += 1;
        }

        let value = mbo.maximize();

        let tval = eval.eval_rational(t, tm).ok_or(MbqeError::EvaluationNotGround {
            expected: "numeral",
            term: tm.display(t).to_string(),
        })?;
        // witness values for uninterpreted constants
        let mut updates: Vec<(TermId, Value)> = Vec::new();
        for (&e, &id) in &tids {
            if matches!(tm.get(e).map(|term| &term.kind), Some(TermKind::Var(_))) && tm.is_arith(e)
            {
                let q = mbo.get_value(id).clone();
                let v = if tm.is_int(e) && q.is_integer() {
                    Value::Int(q.to_integer())
                } else {
                    Value::Rational(q)
                };
                updates.push((e, v));
            }
        }
        drop(eval);
        for (e, v) in updates {
            model.assign(e, v);
        }

        let tval_term = tm.mk_numeral(tval, false);
        let (ge, gt);
        if !value.is_finite() {
            ge = tm.mk_ge(t, tval_term);
            gt = tm.mk_false();
        } else {
            let opt_term = tm.mk_real(value.rational().clone());
            if value.infinitesimal() < 0 {
                // supremum, not attained
                ge = tm.mk_ge(t, tval_term);
                gt = tm.mk_ge(t, opt_term);
            } else {
                ge = tm.mk_ge(t, opt_term);
                gt = tm.mk_gt(t, opt_term);
            }
        }
        Ok(Maximum { value, ge, gt })
    }

    fn validate_model(&self, eval: &mut ModelEvaluator, fmls: &[TermId], tm: &TermManager) -> bool {
        fmls.iter().all(|&f| {
            let mut e = eval.eval(f, tm);
            if e.is_undefined() {
                e = Value::Bool(false);
            }
            e.is_true()
        })
    }
}

impl Default for ArithProjectPlugin {
    fn default() -> Self {
        Self::new(MbpConfig::default())
    }
}

impl ProjectPlugin for ArithProjectPlugin {
    fn family(&self) -> TheoryFamily {
        TheoryFamily::Arith
    }

    fn project1(
        &mut self,
        model: &mut Model,
        var: TermId,
        vars: &mut Vec<TermId>,
        fmls: &mut Vec<TermId>,
        tm: &mut TermManager,
    ) -> Result<bool> {
        self.project_one(model, var, vars, fmls, tm)
    }

    fn project(
        &mut self,
        model: &mut Model,
        vars: &mut Vec<TermId>,
        fmls: &mut Vec<TermId>,
        tm: &mut TermManager,
    ) -> Result<()> {
        ArithProjectPlugin::project(self, model, vars, fmls, tm)
    }

    fn project_with_defs(
        &mut self,
        model: &mut Model,
        vars: &mut Vec<TermId>,
        fmls: &mut Vec<TermId>,
        defs: &mut Vec<MbpDef>,
        tm: &mut TermManager,
    ) -> Result<()> {
        ArithProjectPlugin::project_with_defs(self, model, vars, fmls, defs, tm)
    }

    fn maximize(
        &mut self,
        fmls: &[TermId],
        model: &mut Model,
        t: TermId,
        tm: &mut TermManager,
    ) -> Result<Maximum> {
        ArithProjectPlugin::maximize(self, fmls, model, t, tm)
    }
}

/// A representative the engine expresses natively: `mod` by a numeral, or
/// integer division by a positive numeral.
fn is_pure(e: TermId, tm: &TermManager) -> bool {
    let Some(term) = tm.get(e) else {
        return false;
    };
    match term.kind {
        TermKind::Mod(_, d) => tm.numeral_value(d).is_some(),
        TermKind::Div(_, d) if tm.is_int(e) => {
            tm.numeral_value(d).is_some_and(|r| r.is_positive())
        }
        _ => false,
    }
}

/// Mark `t` and its whole sub-DAG.
fn mark_rec(marks: &mut FxHashSet<TermId>, t: TermId, tm: &TermManager) {
    let mut stack = vec![t];
    while let Some(u) = stack.pop() {
        if !marks.insert(u) {
            continue;
        }
        if let Some(term) = tm.get(u) {
            stack.extend(term.kind.children());
        }
    }
}

fn floor_div(a: &BigInt, m: &BigInt) -> BigInt {
    debug_assert!(m.is_positive());
    let q = a / m;
    if (a - &q * m).is_negative() {
        q - BigInt::one()
    } else {
        q
    }
}

fn mod_floor(a: &BigInt, m: &BigInt) -> BigInt {
    a - floor_div(a, m) * m
}
