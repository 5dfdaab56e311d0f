//! Algebraic simplification of expression trees.
//!
//! A single bottom-up pass rewrites every operator node whose inputs allow it:
//!
//! 1. Two coefficients fold into one. A division by a zero coefficient is flagged as degenerate
//!    and left in place.
//! 2. `x / x` becomes `1`.
//! 3. `x - x`, `0 * e`, `e * 0` and `0 / e` become `0`.
//! 4. `0 + e`, `e + 0`, `e - 0`, `1 * e`, `e * 1` and `e / 1` become `e`.
//! 5. Coefficients within [`ROUNDING_EPSILON`] of an integer snap to that integer.
//!
//! Children are simplified before their parents, so one pass reaches a fixed point and
//! simplifying an already simplified tree changes nothing.

use tracing::trace;

use super::expr::{Expr, Node, NodeIndex, Operator, Slot};

/// Coefficients closer than this to an integer are snapped to it.
pub const ROUNDING_EPSILON: f64 = 1.0e-9;

/// A summary of a simplification pass.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Simplification {
    /// The number of rewrites applied.
    pub rewrites: usize,
    /// Whether a division by a zero coefficient was found.
    pub degenerate: bool,
}

// What to do with a single operator node.
#[derive(Copy, Clone, Debug, PartialEq)]
enum Rewrite {
    Keep,
    Degenerate,
    Fold(f64),
    Hoist(Slot),
}

impl Expr {
    /// Simplify the tree in place.
    pub fn simplify(&mut self) -> Simplification {
        let mut summary = Simplification::default();
        let root = self.root();
        simplify_node(self, root, &mut summary);
        summary
    }
}

/// Snap `value` to the nearest integer if it lies within [`ROUNDING_EPSILON`] of it.
pub fn snap(value: f64) -> f64 {
    let rounded = value.round();
    if (value - rounded).abs() < ROUNDING_EPSILON {
        // Avoid printing `-0`.
        if rounded == 0.0 {
            0.0
        } else {
            rounded
        }
    } else {
        value
    }
}

// Returns the index now occupying the position `nx` held.
fn simplify_node(expr: &mut Expr, nx: NodeIndex, summary: &mut Simplification) -> NodeIndex {
    let op = match *expr.node(nx) {
        Node::Operator(op) => op,
        Node::Coefficient(value) => {
            let snapped = snap(value);
            if snapped.to_bits() != value.to_bits() {
                expr.set_coefficient(nx, snapped);
                summary.rewrites += 1;
            }
            return nx;
        }
        Node::Variable(_) => return nx,
    };

    let (l, r) = expr.operands(nx);
    let l = simplify_node(expr, l, summary);
    let r = simplify_node(expr, r, summary);

    let rewrite = rewrite(op, expr.node(l), expr.node(r));
    trace!(?op, ?rewrite, "simplify");
    match rewrite {
        Rewrite::Keep => nx,
        Rewrite::Degenerate => {
            summary.degenerate = true;
            nx
        }
        Rewrite::Fold(value) => {
            expr.collapse(nx, snap(value));
            summary.rewrites += 1;
            nx
        }
        Rewrite::Hoist(slot) => {
            summary.rewrites += 1;
            expr.hoist(nx, slot)
        }
    }
}

fn rewrite(op: Operator, lhs: &Node, rhs: &Node) -> Rewrite {
    use Node::{Coefficient, Variable};
    use Operator::{Add, Divide, Multiply, Subtract};

    match (op, lhs, rhs) {
        (_, Coefficient(a), Coefficient(b)) => match op.apply(*a, *b) {
            Some(value) => Rewrite::Fold(value),
            None => Rewrite::Degenerate,
        },
        (Divide, Variable(a), Variable(b)) if a == b => Rewrite::Fold(1.0),
        (Subtract, Variable(a), Variable(b)) if a == b => Rewrite::Fold(0.0),
        (Multiply, Coefficient(z), _) | (Multiply, _, Coefficient(z)) if *z == 0.0 => {
            Rewrite::Fold(0.0)
        }
        (Divide, _, Coefficient(z)) if *z == 0.0 => Rewrite::Degenerate,
        (Divide, Coefficient(z), _) if *z == 0.0 => Rewrite::Fold(0.0),
        (Add, Coefficient(z), _) if *z == 0.0 => Rewrite::Hoist(Slot::Right),
        (Add, _, Coefficient(z)) | (Subtract, _, Coefficient(z)) if *z == 0.0 => {
            Rewrite::Hoist(Slot::Left)
        }
        (Multiply, Coefficient(one), _) if *one == 1.0 => Rewrite::Hoist(Slot::Right),
        (Multiply, _, Coefficient(one)) | (Divide, _, Coefficient(one)) if *one == 1.0 => {
            Rewrite::Hoist(Slot::Left)
        }
        _ => Rewrite::Keep,
    }
}
