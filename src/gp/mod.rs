//! Common items related to Genetic Programming.
//!
//! Expressions are binary trees of arithmetic operators whose leaves are either named input
//! variables or numeric coefficients.
//!
//! - [`expr`]: the tree itself, evaluation and structural surgery.
//! - [`simplify`]: algebraic reduction applied after every structural change.
//! - [`gen`]: random tree generation.
//! - [`variation`]: crossover and mutation.

pub mod expr;
pub mod gen;
pub mod simplify;
pub mod variation;
