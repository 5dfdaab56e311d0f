//! Symbolic regression by genetic programming.
//!
//! A population of arithmetic expression trees is scored against a dataset, then repeatedly
//! selected, recombined, mutated and simplified until an expression fits well enough.
//!
//! - [`gp`] holds the expression tree and its evolutionary operators.
//! - [`ga`] holds the population and the generational loop.
//! - [`dataset`] scores expressions against delimited numeric samples.
//! - [`config`] describes a run.

pub mod config;
pub mod dataset;
pub mod error;
pub mod ga;
pub mod gp;

pub use crate::error::Error;
pub use crate::gp::expr::{Bindings, Evaluation, Expr, Node, Operator};
