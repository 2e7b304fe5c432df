//! # Basic Projection Example
//!
//! This example demonstrates model-based projection end to end:
//! - Building formulas over integer variables
//! - Projecting a variable out under a satisfying model
//! - Requesting witness definitions for eliminated variables
//!
//! ## Projection in one line
//! Given `F`, a model `M ⊨ F`, and variables `V`, projection returns `F'`
//! with `M ⊨ F'` and `F' ⇒ ∃V. F` — the existential quantifier is gone,
//! at the price of committing to the case the model inhabits.

use mbqe_core::ast::TermManager;
use mbqe_core::model::{Model, Value};
use mbqe_core::qe::mbp::ArithProjectPlugin;

fn main() {
    println!("=== MBQE Core: Basic Projection ===\n");

    let mut tm = TermManager::new();

    // ===== Example 1: interval projection =====
    println!("--- Example 1: Interval Projection ---");
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

    println!("F  = {{x + y <= 10, x >= 0, y >= 0}}");
    println!("M  = {{x: 3, y: 4}}, eliminating x");

    let mut plugin = ArithProjectPlugin::default();
    let mut vars = vec![x];
    let mut fmls = vec![f1, f2, f3];
    plugin
        .project(&mut model, &mut vars, &mut fmls, &mut tm)
        .expect("projection succeeds");

    println!("F' =");
    for &f in &fmls {
        println!("  {}", tm.display(f));
    }

    // ===== Example 2: equality with a witness definition =====
    println!("\n--- Example 2: Witness Definitions ---");
    let two = tm.mk_int(2);
    let one = tm.mk_int(1);
    let lhs = tm.mk_mul(vec![two, x]);
    let rhs = tm.mk_add(vec![y, one]);
    let g1 = tm.mk_eq(lhs, rhs);
    let g2 = tm.mk_ge(y, zero);

    let mut model = Model::new();
    model.assign(x, Value::Int(1.into()));
    model.assign(y, Value::Int(1.into()));

    println!("F  = {{2x = y + 1, y >= 0}}");
    println!("M  = {{x: 1, y: 1}}, eliminating x with definitions");

    let mut vars = vec![x];
    let mut fmls = vec![g1, g2];
    let mut defs = Vec::new();
    plugin
        .project_with_defs(&mut model, &mut vars, &mut fmls, &mut defs, &mut tm)
        .expect("projection succeeds");

    println!("F' =");
    for &f in &fmls {
        println!("  {}", tm.display(f));
    }
    for d in &defs {
        println!("def: {} := {}", tm.display(d.var), tm.display(d.term));
    }

    println!("\nStats: {:?}", plugin.stats());
}
