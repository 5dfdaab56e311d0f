//! Crossover and mutation of expression trees.
//!
//! Both operators only ever pick non-root nodes as their splice points, so every offspring
//! remains a single tree rooted where its parent was rooted.

use rand::Rng;

use super::expr::{Expr, Node, NodeIndex};
use super::gen::Generator;
use crate::error::Error;

/// How offspring are mutated.
#[derive(Clone, Debug, PartialEq)]
pub struct Mutation {
    /// The probability that any single coefficient is perturbed.
    pub rate: f64,
    /// The bounds of the amount added to a perturbed coefficient.
    pub range: (f64, f64),
    /// Only perturb by whole-number amounts.
    pub integral: bool,
    /// The probability that an offspring has a random subtree replaced.
    pub subtree_rate: f64,
    /// The depth of replacement subtrees.
    pub subtree_depth: u32,
}

impl Default for Mutation {
    fn default() -> Self {
        Mutation {
            rate: 0.1,
            range: (-3.0, 3.0),
            integral: false,
            subtree_rate: 0.1,
            subtree_depth: 2,
        }
    }
}

/// Produce two offspring by exchanging a random subtree between copies of `a` and `b`.
///
/// Each offspring keeps its parent's root. The subtree chosen in one copy takes over the slot
/// of the subtree chosen in the other, so the offspring hold exactly the nodes of their
/// parents. If either parent is a single node there is nothing to exchange and both copies
/// are returned unchanged.
///
/// Each tree owns its own arena, so a subtree cannot be relinked into the other tree. It is
/// copied across and the original removed, which relocates the nodes by value.
pub fn crossover<R>(rng: &mut R, a: &Expr, b: &Expr) -> (Expr, Expr)
where
    R: Rng,
{
    let mut left = a.clone();
    let mut right = b.clone();
    let (left_point, right_point) = match (left.random_node(rng), right.random_node(rng)) {
        (Some(l), Some(r)) => (l, r),
        _ => return (left, right),
    };
    let from_left = left.clone_subtree(left_point);
    let from_right = right.clone_subtree(right_point);
    left.replace_subtree(left_point, &from_right);
    right.replace_subtree(right_point, &from_left);
    debug_assert!(left.is_well_formed() && right.is_well_formed());
    (left, right)
}

/// Perturb each coefficient independently with probability `rate`.
///
/// A perturbed coefficient has a value drawn uniformly from `range` added to it. Returns the
/// number of coefficients changed.
pub fn perturb_coefficients<R>(
    rng: &mut R,
    expr: &mut Expr,
    rate: f64,
    range: (f64, f64),
    integral: bool,
) -> usize
where
    R: Rng,
{
    let (a, b) = range;
    let (min, max) = (a.min(b), a.max(b));
    let coefficients: Vec<(NodeIndex, f64)> = expr
        .nodes()
        .filter_map(|nx| match *expr.node(nx) {
            Node::Coefficient(value) => Some((nx, value)),
            _ => None,
        })
        .collect();
    let mut changed = 0;
    for (nx, value) in coefficients {
        if !rng.gen_bool(rate.clamp(0.0, 1.0)) {
            continue;
        }
        let delta = if integral && min.ceil() <= max.floor() {
            rng.gen_range(min.ceil() as i64..=max.floor() as i64) as f64
        } else {
            rng.gen_range(min..=max)
        };
        expr.set_coefficient(nx, value + delta);
        changed += 1;
    }
    changed
}

/// Replace a random non-root subtree with a freshly generated one of the given depth.
///
/// Returns `false` without changing anything when the tree is a single node.
pub fn replace_random_subtree<R>(
    rng: &mut R,
    expr: &mut Expr,
    generator: &Generator,
    depth: u32,
) -> Result<bool, Error>
where
    R: Rng,
{
    let nx = match expr.random_node(rng) {
        Some(nx) => nx,
        None => return Ok(false),
    };
    let subtree = generator.generate(rng, depth)?;
    expr.replace_subtree(nx, &subtree);
    Ok(true)
}

/// Apply both mutation mechanisms to `expr`.
///
/// Coefficients are always considered for perturbation. A subtree is replaced with probability
/// `mutation.subtree_rate`. The caller must simplify and re-score the tree afterwards.
pub fn mutate<R>(
    rng: &mut R,
    expr: &mut Expr,
    mutation: &Mutation,
    generator: &Generator,
) -> Result<(), Error>
where
    R: Rng,
{
    if rng.gen_bool(mutation.subtree_rate.clamp(0.0, 1.0)) {
        replace_random_subtree(rng, expr, generator, mutation.subtree_depth)?;
    }
    perturb_coefficients(rng, expr, mutation.rate, mutation.range, mutation.integral);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gp::expr::Operator;
    use crate::gp::gen::variable_names;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    fn generator() -> Generator {
        Generator::new(Operator::ALL.to_vec(), variable_names(2), (-5.0, 5.0)).unwrap()
    }

    #[test]
    fn crossover_relocates_nodes() {
        let mut rng = XorShiftRng::seed_from_u64(11);
        let gen = generator();
        for _ in 0..100 {
            let a = gen.generate(&mut rng, 3).unwrap();
            let b = gen.generate(&mut rng, 2).unwrap();
            let (c, d) = crossover(&mut rng, &a, &b);
            assert_eq!(c.size() + d.size(), a.size() + b.size());
            assert!(c.is_well_formed());
            assert!(d.is_well_formed());
            assert_eq!(c.node(c.root()), a.node(a.root()));
            assert_eq!(d.node(d.root()), b.node(b.root()));
        }
    }

    #[test]
    fn crossover_leaves_parents_alone() {
        let mut rng = XorShiftRng::seed_from_u64(12);
        let a = (Expr::variable("x1") + 1.0) * 2.0;
        let b = Expr::variable("x2") - (Expr::variable("x1") / 4.0);
        let (a_before, b_before) = (a.to_string(), b.to_string());
        let _ = crossover(&mut rng, &a, &b);
        assert_eq!(a.to_string(), a_before);
        assert_eq!(b.to_string(), b_before);
    }

    #[test]
    fn crossover_with_leaf_is_identity() {
        let mut rng = XorShiftRng::seed_from_u64(13);
        let a = Expr::variable("x1") + 1.0;
        let b = Expr::coefficient(4.0);
        let (c, d) = crossover(&mut rng, &a, &b);
        assert_eq!(c, a);
        assert_eq!(d, b);
    }

    #[test]
    fn zero_rate_leaves_coefficients() {
        let mut rng = XorShiftRng::seed_from_u64(14);
        let mut expr = (Expr::variable("x1") + 1.0) * 2.0;
        let before = expr.clone();
        assert_eq!(perturb_coefficients(&mut rng, &mut expr, 0.0, (-3.0, 3.0), false), 0);
        assert_eq!(expr, before);
    }

    #[test]
    fn full_rate_perturbs_every_coefficient() {
        let mut rng = XorShiftRng::seed_from_u64(15);
        let mut expr = (Expr::variable("x1") + 1.0) * 2.0;
        let changed = perturb_coefficients(&mut rng, &mut expr, 1.0, (1.0, 3.0), true);
        assert_eq!(changed, 2);
        let (left, right) = expr.children(expr.root()).unwrap();
        let (_, one) = expr.children(left).unwrap();
        match (expr.node(one), expr.node(right)) {
            (Node::Coefficient(a), Node::Coefficient(b)) => {
                assert!([2.0, 3.0, 4.0].contains(a));
                assert!([3.0, 4.0, 5.0].contains(b));
            }
            other => panic!("unexpected nodes {:?}", other),
        }
    }

    #[test]
    fn subtree_replacement_keeps_root() {
        let mut rng = XorShiftRng::seed_from_u64(16);
        let gen = generator();
        let mut expr = gen.generate(&mut rng, 2).unwrap();
        let root = expr.node(expr.root()).clone();
        assert!(replace_random_subtree(&mut rng, &mut expr, &gen, 1).unwrap());
        assert!(expr.is_well_formed());
        assert_eq!(*expr.node(expr.root()), root);

        let mut leaf = Expr::coefficient(1.0);
        assert!(!replace_random_subtree(&mut rng, &mut leaf, &gen, 1).unwrap());
    }
}
