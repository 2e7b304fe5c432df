//! MBQE Core - Terms, Models, and Model-Based Projection
//!
//! This crate provides the pieces around the arithmetic projection
//! procedure:
//! - Hash-consed terms with dense [`TermId`] references
//! - A sort registry for the boolean/integer/real fragment
//! - Models and a completing evaluator
//! - Model-based projection for linear arithmetic
//!   ([`qe::mbp::ArithProjectPlugin`])
//!
//! # Examples
//!
//! Projecting `x` out of `{x + y <= 10, x >= 0, y >= 0}` under the model
//! `{x: 3, y: 4}`:
//!
//! ```
//! use mbqe_core::ast::TermManager;
//! use mbqe_core::model::{Model, Value};
//! use mbqe_core::qe::mbp::ArithProjectPlugin;
//!
//! let mut tm = TermManager::new();
//! let x = tm.mk_var("x", tm.sorts.int_sort);
//! let y = tm.mk_var("y", tm.sorts.int_sort);
//! let ten = tm.mk_int(10);
//! let zero = tm.mk_int(0);
//! let sum = tm.mk_add(vec![x, y]);
//! let f1 = tm.mk_le(sum, ten);
//! let f2 = tm.mk_ge(x, zero);
//! let f3 = tm.mk_ge(y, zero);
//!
//! let mut model = Model::new();
//! model.assign(x, Value::Int(3.into()));
//! model.assign(y, Value::Int(4.into()));
//!
//! let mut plugin = ArithProjectPlugin::default();
//! let mut vars = vec![x];
//! let mut fmls = vec![f1, f2, f3];
//! plugin
//!     .project(&mut model, &mut vars, &mut fmls, &mut tm)
//!     .unwrap();
//! assert!(vars.is_empty());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod ast;
pub mod error;
pub mod model;
pub mod qe;
pub mod resource;
pub mod sort;

pub use ast::{Term, TermId, TermKind, TermManager};
pub use error::{MbqeError, Result};
pub use model::{Model, ModelEvaluator, Value};
pub use resource::ResourceLimit;
pub use sort::{SortId, SortKind, Sorts};

pub use qe::mbp::{
    ArithProjectPlugin, Maximum, MbpConfig, MbpDef, MbpStats, ProjectPlugin, TheoryFamily,
};
