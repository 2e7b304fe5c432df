//! Property-based tests for arithmetic projection
//!
//! Random interval systems with a model inside them: projection must keep
//! the model satisfied, must not mention eliminated variables, and with
//! definitions enabled the witnesses must reproduce a satisfying point.

use mbqe_core::ast::{TermId, TermManager};
use mbqe_core::model::{Model, ModelEvaluator, Value};
use mbqe_core::qe::mbp::ArithProjectPlugin;
use proptest::prelude::*;

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

proptest! {
    /// Projecting the first variable of a random integer box plus one
    /// coupling constraint preserves the model and drops the variable.
    #[test]
    fn projection_preserves_model_and_progress(
        bounds in proptest::collection::vec((-30i64..30, 0i64..30), 2..5)
    ) {
        let mut tm = TermManager::new();
        let mut model = Model::new();
        let mut fmls = Vec::new();
        let mut xs = Vec::new();
        for (i, (l, w)) in bounds.iter().enumerate() {
            let x = tm.mk_var(&format!("x{}", i), tm.sorts.int_sort);
            let lo = tm.mk_int(*l);
            let hi = tm.mk_int(l + w);
            fmls.push(tm.mk_ge(x, lo));
            fmls.push(tm.mk_le(x, hi));
            model.assign(x, Value::Int((*l).into()));
            xs.push(x);
        }
        // coupling: sum of all variables bounded by the sum of uppers
        let sum = tm.mk_add(xs.clone());
        let ub: i64 = bounds.iter().map(|(l, w)| l + w).sum();
        let ub_t = tm.mk_int(ub);
        fmls.push(tm.mk_le(sum, ub_t));

        let victim = xs[0];
        let mut plugin = ArithProjectPlugin::default();
        let mut vars = vec![victim];
        let mut defs = Vec::new();
        plugin
            .project_with_defs(&mut model, &mut vars, &mut fmls, &mut defs, &mut tm)
            .unwrap();

        prop_assert!(vars.is_empty());
        for &f in &fmls {
            prop_assert!(!mentions(&tm, f, victim));
        }
        {
            let mut eval = ModelEvaluator::new(&mut model);
            eval.set_model_completion(true);
            for &f in &fmls {
                prop_assert!(eval.is_true(f, &tm));
            }
        }

        // definition fidelity: put the witness back and re-check the inputs
        if let Some(d) = defs.iter().find(|d| d.var == victim) {
            let val = {
                let mut eval = ModelEvaluator::new(&mut model);
                eval.eval(d.term, &tm)
            };
            let mut m2 = model.clone();
            m2.assign(victim, val);
            let mut eval = ModelEvaluator::new(&mut m2);
            eval.set_model_completion(true);
            for (i, (l, w)) in bounds.iter().enumerate() {
                let x = xs[i];
                let lo = tm.mk_int(*l);
                let hi = tm.mk_int(l + w);
                let ge = tm.mk_ge(x, lo);
                let le = tm.mk_le(x, hi);
                prop_assert!(eval.is_true(ge, &tm));
                prop_assert!(eval.is_true(le, &tm));
            }
        }
    }

    /// Evaluation agrees with direct integer arithmetic on random sums.
    #[test]
    fn evaluator_matches_reference(vals in proptest::collection::vec(-100i64..100, 1..6)) {
        let mut tm = TermManager::new();
        let mut model = Model::new();
        let mut terms = Vec::new();
        for (i, v) in vals.iter().enumerate() {
            let x = tm.mk_var(&format!("v{}", i), tm.sorts.int_sort);
            model.assign(x, Value::Int((*v).into()));
            terms.push(x);
        }
        let sum = tm.mk_add(terms);
        let expected: i64 = vals.iter().sum();
        let mut eval = ModelEvaluator::new(&mut model);
        prop_assert_eq!(eval.eval(sum, &tm), Value::Int(expected.into()));
    }
}
