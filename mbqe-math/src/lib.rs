//! MBQE Math - Numeric Engines for Model-Based Projection
//!
//! This crate provides the arithmetic machinery underneath the projection
//! procedures in `mbqe-core`:
//! - A row store holding linear constraints in canonical form, with
//!   model-guided symbolic variable elimination ([`mbo::ModelBasedOpt`])
//! - Symbolic definition trees produced by elimination ([`mbo::DefTree`])
//! - Extended reals with infinitesimals ([`InfEps`]) for objective bounds
//!
//! The crate is AST-free: it speaks dense variable ids and
//! arbitrary-precision rationals only.
//!
//! # Examples
//!
//! ```
//! use mbqe_math::mbo::{ModelBasedOpt, RowType};
//! use num_rational::BigRational;
//! use num_traits::Zero;
//!
//! let q = |n: i64| BigRational::from_integer(n.into());
//!
//! let mut mbo = ModelBasedOpt::new();
//! let x = mbo.add_var(q(3), false);
//! let y = mbo.add_var(q(4), false);
//!
//! // x + y - 10 <= 0
//! mbo.add_constraint(vec![(x, q(1)), (y, q(1))], q(-10), RowType::Le);
//! // -x <= 0
//! mbo.add_constraint(vec![(x, q(-1))], BigRational::zero(), RowType::Le);
//!
//! let defs = mbo.project(&[x], false);
//! assert_eq!(defs.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod inf_eps;
pub mod mbo;

pub use inf_eps::InfEps;
pub use mbo::{DefTree, LinExpr, MboStats, ModelBasedOpt, Row, RowType, RowVar, VarId};
