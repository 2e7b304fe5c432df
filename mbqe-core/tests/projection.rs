//! End-to-end projection scenarios.
//!
//! Each test builds a small formula set with a satisfying model, projects
//! variables out, and checks the contract: the model still satisfies the
//! result, eliminated variables are gone, and witness definitions (when
//! requested) reproduce a satisfying assignment.

use mbqe_core::ast::{TermId, TermManager};
use mbqe_core::error::MbqeError;
use mbqe_core::model::{Model, ModelEvaluator, Value};
use mbqe_core::qe::mbp::{ArithProjectPlugin, MbpConfig, ProjectPlugin, TheoryFamily};
use mbqe_math::InfEps;
use num_bigint::BigInt;
use num_rational::BigRational;

fn q(n: i64) -> BigRational {
    BigRational::from_integer(n.into())
}

/// Whether `v` occurs anywhere in `t`.
fn mentions(tm: &TermManager, t: TermId, v: TermId) -> bool {
    let mut stack = vec![t];
    while let Some(u) = stack.pop() {
        if u == v {
            return true;
        }
        if let Some(term) = tm.get(u) {
            stack.extend(term.kind.children());
        }
    }
    false
}

/// Every formula evaluates to true under the model.
fn all_true(tm: &TermManager, model: &mut Model, fmls: &[TermId]) -> bool {
    let mut eval = ModelEvaluator::new(model);
    eval.set_model_completion(true);
    fmls.iter().all(|&f| eval.is_true(f, tm))
}

#[test]
fn box_projection_keeps_bounds_on_survivor() {
    // {x + y <= 10, x >= 0, y >= 0}, M = {x: 3, y: 4}, eliminate x
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", tm.sorts.int_sort);
    let y = tm.mk_var("y", tm.sorts.int_sort);
    let ten = tm.mk_int(10);
    let zero = tm.mk_int(0);
    let sum = tm.mk_add(vec![x, y]);
    let f1 = tm.mk_le(sum, ten);
    let f2 = tm.mk_ge(x, zero);
    let f3 = tm.mk_ge(y, zero);

    let mut model = Model::new();
    model.assign(x, Value::Int(3.into()));
    model.assign(y, Value::Int(4.into()));

    let mut plugin = ArithProjectPlugin::default();
    let mut vars = vec![x];
    let mut fmls = vec![f1, f2, f3];
    plugin
        .project(&mut model, &mut vars, &mut fmls, &mut tm)
        .unwrap();

    assert!(vars.is_empty());
    assert!(!fmls.is_empty());
    assert!(fmls.iter().all(|&f| !mentions(&tm, f, x)));
    assert!(all_true(&tm, &mut model, &fmls));
    // the survivor is still bounded: y <= 10 must be a consequence; check
    // it at the witness y = 10 boundary by direct syntactic presence
    let y_le_10 = tm.mk_le(y, ten);
    assert!(fmls.contains(&y_le_10));
}

#[test]
fn equality_gives_definition_and_parity_constraint() {
    // {2x = y + 1, y >= 0}, M = {x: 1, y: 1}, eliminate x with defs
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", tm.sorts.int_sort);
    let y = tm.mk_var("y", tm.sorts.int_sort);
    let two = tm.mk_int(2);
    let one = tm.mk_int(1);
    let zero = tm.mk_int(0);
    let lhs = tm.mk_mul(vec![two, x]);
    let rhs = tm.mk_add(vec![y, one]);
    let f1 = tm.mk_eq(lhs, rhs);
    let f2 = tm.mk_ge(y, zero);
    let orig = vec![f1, f2];

    let mut model = Model::new();
    model.assign(x, Value::Int(1.into()));
    model.assign(y, Value::Int(1.into()));

    let mut plugin = ArithProjectPlugin::default();
    let mut vars = vec![x];
    let mut fmls = orig.clone();
    let mut defs = Vec::new();
    plugin
        .project_with_defs(&mut model, &mut vars, &mut fmls, &mut defs, &mut tm)
        .unwrap();

    assert!(vars.is_empty());
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].var, x);
    assert_eq!(tm.display(defs[0].term).to_string(), "(div (+ 1 y) 2)");
    // the parity side constraint survives as a mod-equals-zero formula
    assert!(fmls
        .iter()
        .any(|&f| tm.display(f).to_string().contains("mod")));
    assert!(all_true(&tm, &mut model, &fmls));

    // definition fidelity: M[x := eval(def)] satisfies the original formulas
    let def_val = {
        let mut eval = ModelEvaluator::new(&mut model);
        eval.eval(defs[0].term, &tm)
    };
    model.assign(x, def_val);
    assert!(all_true(&tm, &mut model, &orig));
}

#[test]
fn distinct_projects_to_transitive_gap() {
    // {distinct(a, b, c)}, M = {a: 1, b: 2, c: 3}, eliminate b
    let mut tm = TermManager::new();
    let a = tm.mk_var("a", tm.sorts.real_sort);
    let b = tm.mk_var("b", tm.sorts.real_sort);
    let c = tm.mk_var("c", tm.sorts.real_sort);
    let f = tm.mk_distinct(vec![a, b, c]);

    let mut model = Model::new();
    model.assign(a, Value::Rational(q(1)));
    model.assign(b, Value::Rational(q(2)));
    model.assign(c, Value::Rational(q(3)));

    let mut plugin = ArithProjectPlugin::default();
    let mut vars = vec![b];
    let mut fmls = vec![f];
    plugin
        .project(&mut model, &mut vars, &mut fmls, &mut tm)
        .unwrap();

    assert!(vars.is_empty());
    assert_eq!(fmls.len(), 1);
    assert!(!mentions(&tm, fmls[0], b));
    assert!(mentions(&tm, fmls[0], a) && mentions(&tm, fmls[0], c));
    assert!(all_true(&tm, &mut model, &fmls));
}

#[test]
fn negated_distinct_equates_the_colliding_pair() {
    // {not distinct(a, b, c)}, M = {a: 1, b: 1, c: 2}, eliminate a
    let mut tm = TermManager::new();
    let a = tm.mk_var("a", tm.sorts.int_sort);
    let b = tm.mk_var("b", tm.sorts.int_sort);
    let c = tm.mk_var("c", tm.sorts.int_sort);
    let d = tm.mk_distinct(vec![a, b, c]);
    let f = tm.mk_not(d);

    let mut model = Model::new();
    model.assign(a, Value::Int(1.into()));
    model.assign(b, Value::Int(1.into()));
    model.assign(c, Value::Int(2.into()));

    let mut plugin = ArithProjectPlugin::default();
    let mut vars = vec![a];
    let mut fmls = vec![f];
    let mut defs = Vec::new();
    plugin
        .project_with_defs(&mut model, &mut vars, &mut fmls, &mut defs, &mut tm)
        .unwrap();

    assert!(vars.is_empty());
    // a was defined by the equality with its model-equal partner
    assert_eq!(defs.len(), 1);
    assert_eq!(defs[0].term, b);
    assert!(all_true(&tm, &mut model, &fmls));
}

#[test]
fn boolean_ite_formula_stays_in_residue() {
    // {ite(p, x >= 1, x <= -1), p}, M = {p: true, x: 2}, eliminate x:
    // the formula-level ite is opaque, so strict purity keeps x alive
    let mut tm = TermManager::new();
    let p = tm.mk_var("p", tm.sorts.bool_sort);
    let x = tm.mk_var("x", tm.sorts.int_sort);
    let one = tm.mk_int(1);
    let neg_one = tm.mk_int(-1);
    let thn = tm.mk_ge(x, one);
    let els = tm.mk_le(x, neg_one);
    let ite = tm.mk_ite(p, thn, els);

    let mut model = Model::new();
    model.assign(p, Value::Bool(true));
    model.assign(x, Value::Int(2.into()));

    let mut plugin = ArithProjectPlugin::default();
    let mut vars = vec![x];
    let mut fmls = vec![ite, p];
    plugin
        .project(&mut model, &mut vars, &mut fmls, &mut tm)
        .unwrap();

    assert_eq!(vars, vec![x]);
    assert!(fmls.contains(&p));
    assert!(fmls.contains(&ite));
    assert!(all_true(&tm, &mut model, &fmls));
}

#[test]
fn term_ite_takes_the_model_branch() {
    // {ite(p, x, y) >= 1, p}, M = {p: true, x: 2, y: 0}, eliminate x:
    // the guard is pushed as a side literal and the then-branch linearizes
    let mut tm = TermManager::new();
    let p = tm.mk_var("p", tm.sorts.bool_sort);
    let x = tm.mk_var("x", tm.sorts.int_sort);
    let y = tm.mk_var("y", tm.sorts.int_sort);
    let one = tm.mk_int(1);
    let ite = tm.mk_ite(p, x, y);
    let f = tm.mk_ge(ite, one);

    let mut model = Model::new();
    model.assign(p, Value::Bool(true));
    model.assign(x, Value::Int(2.into()));
    model.assign(y, Value::Int(0.into()));

    let mut plugin = ArithProjectPlugin::default();
    let mut vars = vec![x];
    let mut fmls = vec![f, p];
    plugin
        .project(&mut model, &mut vars, &mut fmls, &mut tm)
        .unwrap();

    assert!(vars.is_empty());
    assert!(fmls.contains(&p));
    assert!(fmls.iter().all(|&g| !mentions(&tm, g, x)));
    assert!(all_true(&tm, &mut model, &fmls));
}

#[test]
fn modulo_constraint_projects_via_congruence() {
    // {(x mod 3) = 1, x >= 0, x <= 10}, M = {x: 4}, eliminate x
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", tm.sorts.int_sort);
    let three = tm.mk_int(3);
    let one = tm.mk_int(1);
    let zero = tm.mk_int(0);
    let ten = tm.mk_int(10);
    let m = tm.mk_mod(x, three);
    let f1 = tm.mk_eq(m, one);
    let f2 = tm.mk_ge(x, zero);
    let f3 = tm.mk_le(x, ten);

    let mut model = Model::new();
    model.assign(x, Value::Int(4.into()));

    let mut plugin = ArithProjectPlugin::default();
    let mut vars = vec![x];
    let mut fmls = vec![f1, f2, f3];
    let mut defs = Vec::new();
    plugin
        .project_with_defs(&mut model, &mut vars, &mut fmls, &mut defs, &mut tm)
        .unwrap();

    assert!(vars.is_empty());
    assert!(fmls.iter().all(|&f| !mentions(&tm, f, x)));
    assert!(all_true(&tm, &mut model, &fmls));
    // the witness stays in the residue class 1 mod 3 and inside [0, 10]
    if let Some(d) = defs.iter().find(|d| d.var == x) {
        let val = {
            let mut eval = ModelEvaluator::new(&mut model);
            eval.eval(d.term, &tm)
        };
        let n = val.as_int().expect("integer witness").clone();
        let three = BigInt::from(3);
        assert_eq!((&n % &three + &three) % &three, BigInt::from(1));
        assert!(n >= BigInt::from(0) && n <= BigInt::from(10));
    }
}

#[test]
fn mod_term_survives_projection_of_unrelated_variable() {
    // {(x mod 3) = 1, x >= 0, y >= x}, eliminate y: the mod atom must
    // survive verbatim
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", tm.sorts.int_sort);
    let y = tm.mk_var("y", tm.sorts.int_sort);
    let three = tm.mk_int(3);
    let one = tm.mk_int(1);
    let zero = tm.mk_int(0);
    let m = tm.mk_mod(x, three);
    let f1 = tm.mk_eq(m, one);
    let f2 = tm.mk_ge(x, zero);
    let f3 = tm.mk_ge(y, x);

    let mut model = Model::new();
    model.assign(x, Value::Int(4.into()));
    model.assign(y, Value::Int(5.into()));

    let mut plugin = ArithProjectPlugin::default();
    let mut vars = vec![y];
    let mut fmls = vec![f1, f2, f3];
    plugin
        .project(&mut model, &mut vars, &mut fmls, &mut tm)
        .unwrap();

    assert!(vars.is_empty());
    assert!(fmls.contains(&f1), "mod atom must round-trip");
    assert!(fmls.iter().all(|&f| !mentions(&tm, f, y)));
    assert!(all_true(&tm, &mut model, &fmls));
}

#[test]
fn projection_over_empty_set_is_identity() {
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", tm.sorts.int_sort);
    let zero = tm.mk_int(0);
    let f = tm.mk_ge(x, zero);
    let mut model = Model::new();
    model.assign(x, Value::Int(1.into()));

    let mut plugin = ArithProjectPlugin::default();
    let mut vars: Vec<TermId> = Vec::new();
    let mut fmls = vec![f];
    plugin
        .project(&mut model, &mut vars, &mut fmls, &mut tm)
        .unwrap();
    assert_eq!(fmls, vec![f]);
    assert!(vars.is_empty());
}

#[test]
fn purity_modes_differ_on_residue_variables() {
    // residue mentions x; strict mode keeps x, permissive mode eliminates it
    let mk = |tm: &mut TermManager| {
        let p = tm.mk_var("p", tm.sorts.bool_sort);
        let x = tm.mk_var("x", tm.sorts.int_sort);
        let one = tm.mk_int(1);
        let neg_one = tm.mk_int(-1);
        let zero = tm.mk_int(0);
        let thn = tm.mk_ge(x, one);
        let els = tm.mk_le(x, neg_one);
        let ite = tm.mk_ite(p, thn, els);
        let bound = tm.mk_ge(x, zero);
        (p, x, ite, bound)
    };

    // strict (default)
    let mut tm = TermManager::new();
    let (p, x, ite, bound) = mk(&mut tm);
    let mut model = Model::new();
    model.assign(p, Value::Bool(true));
    model.assign(x, Value::Int(2.into()));
    let mut plugin = ArithProjectPlugin::default();
    let mut vars = vec![x];
    let mut fmls = vec![ite, bound];
    plugin
        .project(&mut model, &mut vars, &mut fmls, &mut tm)
        .unwrap();
    assert_eq!(vars, vec![x]);

    // permissive
    let mut tm = TermManager::new();
    let (p, x, ite, bound) = mk(&mut tm);
    let mut model = Model::new();
    model.assign(p, Value::Bool(true));
    model.assign(x, Value::Int(2.into()));
    let mut plugin = ArithProjectPlugin::new(MbpConfig {
        check_purified: false,
        apply_projection: false,
    });
    let mut vars = vec![x];
    let mut fmls = vec![ite, bound];
    plugin
        .project(&mut model, &mut vars, &mut fmls, &mut tm)
        .unwrap();
    assert!(vars.is_empty());
    assert!(fmls.contains(&ite));
}

#[test]
fn apply_projection_validates_the_witness() {
    // permissive mode computes a witness that violates the residue; the
    // apply-and-validate pass must catch it
    let mut tm = TermManager::new();
    let p = tm.mk_var("p", tm.sorts.bool_sort);
    let x = tm.mk_var("x", tm.sorts.int_sort);
    let one = tm.mk_int(1);
    let neg_one = tm.mk_int(-1);
    let zero = tm.mk_int(0);
    let five = tm.mk_int(5);
    let thn = tm.mk_ge(x, one);
    let els = tm.mk_le(x, neg_one);
    let ite = tm.mk_ite(p, thn, els);
    let lo = tm.mk_ge(x, zero);
    let hi = tm.mk_le(x, five);

    let mut model = Model::new();
    model.assign(p, Value::Bool(true));
    model.assign(x, Value::Int(2.into()));

    let mut plugin = ArithProjectPlugin::new(MbpConfig {
        check_purified: false,
        apply_projection: true,
    });
    let mut vars = vec![x];
    let mut fmls = vec![ite, lo, hi];
    let err = plugin
        .project(&mut model, &mut vars, &mut fmls, &mut tm)
        .unwrap_err();
    assert_eq!(err, MbqeError::ProjectionInvalidatesModel);
}

#[test]
fn apply_projection_succeeds_on_clean_input() {
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", tm.sorts.int_sort);
    let y = tm.mk_var("y", tm.sorts.int_sort);
    let two = tm.mk_int(2);
    let one = tm.mk_int(1);
    let zero = tm.mk_int(0);
    let lhs = tm.mk_mul(vec![two, x]);
    let rhs = tm.mk_add(vec![y, one]);
    let f1 = tm.mk_eq(lhs, rhs);
    let f2 = tm.mk_ge(y, zero);

    let mut model = Model::new();
    model.assign(x, Value::Int(1.into()));
    model.assign(y, Value::Int(1.into()));

    let mut plugin = ArithProjectPlugin::default();
    plugin.set_apply_projection(true);
    let mut vars = vec![x];
    let mut fmls = vec![f1, f2];
    plugin
        .project(&mut model, &mut vars, &mut fmls, &mut tm)
        .unwrap();
    assert!(vars.is_empty());
    assert!(all_true(&tm, &mut model, &fmls));
}

#[test]
fn ite_with_non_boolean_guard_is_not_ground() {
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", tm.sorts.int_sort);
    let y = tm.mk_var("y", tm.sorts.int_sort);
    let z = tm.mk_var("z", tm.sorts.int_sort);
    let one = tm.mk_int(1);
    // guard of integer sort: evaluation cannot produce a truth value
    let ite = tm.mk_ite(x, y, z);
    let f = tm.mk_ge(ite, one);

    let mut model = Model::new();
    model.assign(x, Value::Int(1.into()));
    model.assign(y, Value::Int(1.into()));
    model.assign(z, Value::Int(1.into()));

    let mut plugin = ArithProjectPlugin::default();
    let mut vars = vec![y];
    let mut fmls = vec![f];
    let err = plugin
        .project(&mut model, &mut vars, &mut fmls, &mut tm)
        .unwrap_err();
    assert!(matches!(err, MbqeError::EvaluationNotGround { .. }));
}

#[test]
fn project_one_reports_elimination() {
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", tm.sorts.int_sort);
    let zero = tm.mk_int(0);
    let f = tm.mk_ge(x, zero);
    let mut model = Model::new();
    model.assign(x, Value::Int(1.into()));

    let mut plugin = ArithProjectPlugin::default();
    let mut vars = Vec::new();
    let mut fmls = vec![f];
    let eliminated = plugin
        .project_one(&mut model, x, &mut vars, &mut fmls, &mut tm)
        .unwrap();
    assert!(eliminated);
    assert!(vars.is_empty());
    assert!(fmls.is_empty());
}

#[test]
fn plugin_dispatch_surface() {
    let plugin = ArithProjectPlugin::default();
    let dyn_plugin: &dyn ProjectPlugin = &plugin;
    assert_eq!(dyn_plugin.family(), TheoryFamily::Arith);
}

#[test]
fn maximize_box_objective() {
    // max (x + y) subject to {x <= 3, y <= 5, x >= 0, y >= 0}
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", tm.sorts.real_sort);
    let y = tm.mk_var("y", tm.sorts.real_sort);
    let three = tm.mk_int(3);
    let five = tm.mk_int(5);
    let zero = tm.mk_int(0);
    let f1 = tm.mk_le(x, three);
    let f2 = tm.mk_le(y, five);
    let f3 = tm.mk_ge(x, zero);
    let f4 = tm.mk_ge(y, zero);
    let t = tm.mk_add(vec![x, y]);

    let mut model = Model::new();
    model.assign(x, Value::Rational(q(0)));
    model.assign(y, Value::Rational(q(0)));

    let mut plugin = ArithProjectPlugin::default();
    let max = plugin
        .maximize(&[f1, f2, f3, f4], &mut model, t, &mut tm)
        .unwrap();

    assert_eq!(max.value, InfEps::finite(q(8)));
    assert_eq!(tm.display(max.ge).to_string(), "(>= (+ x y) 8)");
    assert_eq!(tm.display(max.gt).to_string(), "(> (+ x y) 8)");
    // the witness model was moved onto the optimal vertex
    assert_eq!(model.get(x), Some(&Value::Rational(q(3))));
    assert_eq!(model.get(y), Some(&Value::Rational(q(5))));
}

#[test]
fn maximize_unbounded_objective() {
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", tm.sorts.real_sort);
    let zero = tm.mk_int(0);
    let f = tm.mk_ge(x, zero);

    let mut model = Model::new();
    model.assign(x, Value::Rational(q(0)));

    let mut plugin = ArithProjectPlugin::default();
    let max = plugin.maximize(&[f], &mut model, x, &mut tm).unwrap();
    assert!(!max.value.is_finite());
    assert_eq!(max.gt, tm.mk_false());
    assert!(all_true(&tm, &mut model, &[max.ge]));
}

#[test]
fn maximize_strict_supremum() {
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", tm.sorts.real_sort);
    let seven = tm.mk_int(7);
    let f = tm.mk_lt(x, seven);

    let mut model = Model::new();
    model.assign(x, Value::Rational(q(0)));

    let mut plugin = ArithProjectPlugin::default();
    let max = plugin.maximize(&[f], &mut model, x, &mut tm).unwrap();
    assert_eq!(max.value, InfEps::finite_eps(q(7), -1));
    // ge is the weak bound at the incumbent model, gt pushes to the optimum
    assert!(all_true(&tm, &mut model, &[max.ge]));
    assert_eq!(tm.display(max.gt).to_string(), "(>= x 7)");
}

#[test]
fn or_expansion_picks_the_true_branch() {
    // {x <= 1 or x >= 5}, M = {x: 7}, eliminate x
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", tm.sorts.int_sort);
    let one = tm.mk_int(1);
    let five = tm.mk_int(5);
    let a = tm.mk_le(x, one);
    let b = tm.mk_ge(x, five);
    let f = tm.mk_or(vec![a, b]);

    let mut model = Model::new();
    model.assign(x, Value::Int(7.into()));

    let mut plugin = ArithProjectPlugin::default();
    let mut vars = vec![x];
    let mut fmls = vec![f];
    plugin
        .project(&mut model, &mut vars, &mut fmls, &mut tm)
        .unwrap();
    assert!(vars.is_empty());
    assert!(fmls.iter().all(|&g| !mentions(&tm, g, x)));
    assert!(all_true(&tm, &mut model, &fmls));
}

#[test]
fn negated_equality_uses_model_order() {
    // {not (x = y), x <= y}, M = {x: 1, y: 4}: the disequality becomes
    // x < y, so eliminating x keeps the system satisfiable
    let mut tm = TermManager::new();
    let x = tm.mk_var("x", tm.sorts.int_sort);
    let y = tm.mk_var("y", tm.sorts.int_sort);
    let eq = tm.mk_eq(x, y);
    let f1 = tm.mk_not(eq);
    let f2 = tm.mk_le(x, y);

    let mut model = Model::new();
    model.assign(x, Value::Int(1.into()));
    model.assign(y, Value::Int(4.into()));

    let mut plugin = ArithProjectPlugin::default();
    let mut vars = vec![x];
    let mut fmls = vec![f1, f2];
    plugin
        .project(&mut model, &mut vars, &mut fmls, &mut tm)
        .unwrap();
    assert!(vars.is_empty());
    assert!(fmls.iter().all(|&g| !mentions(&tm, g, x)));
    assert!(all_true(&tm, &mut model, &fmls));
}
