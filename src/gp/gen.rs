//! Functions for generating random expression trees.

use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::VecDeque;

use super::expr::{Expr, Graph, Node, Operator, Slot, Vertex};
use crate::error::Error;

/// The deepest tree the generator will build.
pub const MAX_DEPTH: u32 = 16;

/// Builds random, fully populated expression trees.
#[derive(Clone, Debug)]
pub struct Generator {
    operators: Vec<Operator>,
    variables: Vec<String>,
    coefficient_range: (f64, f64),
    integral: bool,
}

/// The conventional names for `count` dataset inputs: `x1, x2, ...`.
pub fn variable_names(count: usize) -> Vec<String> {
    (1..=count).map(|i| format!("x{}", i)).collect()
}

impl Generator {
    /// A generator drawing from the given operators, variables and coefficient range.
    ///
    /// The range bounds may be given in either order.
    pub fn new(
        operators: Vec<Operator>,
        variables: Vec<String>,
        coefficient_range: (f64, f64),
    ) -> Result<Self, Error> {
        if operators.is_empty() {
            return Err(Error::EmptyOperatorSet);
        }
        let (a, b) = coefficient_range;
        Ok(Generator {
            operators,
            variables,
            coefficient_range: (a.min(b), a.max(b)),
            integral: false,
        })
    }

    /// Only draw whole-number coefficients.
    pub fn integral(mut self, integral: bool) -> Self {
        self.integral = integral;
        self
    }

    /// The variables placed into generated trees.
    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// The operators placed into generated trees.
    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    /// Draw a single coefficient from the configured range.
    pub fn coefficient<R>(&self, rng: &mut R) -> f64
    where
        R: Rng,
    {
        let (min, max) = self.coefficient_range;
        if self.integral {
            let (lo, hi) = (min.ceil(), max.floor());
            if lo <= hi {
                return rng.gen_range(lo as i64..=hi as i64) as f64;
            }
        }
        rng.gen_range(min..=max)
    }

    /// Generate a complete binary tree of the given depth.
    ///
    /// The tree has `2^depth - 1` operator nodes and `2^depth` leaves. Every variable fills one
    /// leaf (a random subset of them when there are more variables than leaves) and random
    /// coefficients fill the rest. Leaves are shuffled, then paired breadth-first beneath the
    /// operators until a single root remains.
    pub fn generate<R>(&self, rng: &mut R, depth: u32) -> Result<Expr, Error>
    where
        R: Rng,
    {
        if depth > MAX_DEPTH {
            return Err(Error::DepthTooLarge {
                depth,
                max: MAX_DEPTH,
            });
        }
        let leaves = 1usize << depth;
        let mut graph = Graph::with_capacity(2 * leaves - 1, 2 * leaves - 2);

        let mut names: Vec<&String> = self.variables.iter().collect();
        if names.len() > leaves {
            names.shuffle(rng);
            names.truncate(leaves);
        }
        let mut pending: VecDeque<_> = names
            .into_iter()
            .map(|name| graph.add_node(Vertex::new(Node::Variable(name.clone()))))
            .collect();
        while pending.len() < leaves {
            let value = self.coefficient(rng);
            pending.push_back(graph.add_node(Vertex::new(Node::Coefficient(value))));
        }
        pending.make_contiguous().shuffle(rng);

        // Pair the two oldest pending subtrees beneath each new operator.
        while pending.len() > 1 {
            let op = self.operators[rng.gen_range(0..self.operators.len())];
            let parent = graph.add_node(Vertex::new(Node::Operator(op)));
            let mut size = 1;
            for slot in Slot::BOTH {
                if let Some(child) = pending.pop_front() {
                    size += graph[child].size;
                    graph.add_edge(child, parent, slot);
                }
            }
            graph[parent].size = size;
            pending.push_back(parent);
        }

        match pending.pop_front() {
            Some(root) => Ok(Expr::from_parts(graph, root)),
            None => unreachable!("a tree always has at least one leaf"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    fn generator(variables: usize) -> Generator {
        Generator::new(Operator::ALL.to_vec(), variable_names(variables), (-5.0, 5.0)).unwrap()
    }

    fn leaves(expr: &Expr) -> Vec<Node> {
        expr.nodes()
            .map(|nx| expr.node(nx).clone())
            .filter(Node::is_leaf)
            .collect()
    }

    #[test]
    fn builds_complete_trees() {
        let mut rng = XorShiftRng::seed_from_u64(1);
        for depth in 0..6 {
            let expr = generator(2.min(1 << depth)).generate(&mut rng, depth).unwrap();
            assert_eq!(expr.size(), (1 << (depth + 1)) - 1);
            assert_eq!(leaves(&expr).len(), 1 << depth);
            assert!(expr.is_well_formed());
        }
    }

    #[test]
    fn every_variable_appears_once() {
        let mut rng = XorShiftRng::seed_from_u64(2);
        let expr = generator(3).generate(&mut rng, 3).unwrap();
        let leaves = leaves(&expr);
        for name in variable_names(3) {
            let count = leaves
                .iter()
                .filter(|n| **n == Node::Variable(name.clone()))
                .count();
            assert_eq!(count, 1, "{} in {}", name, expr);
        }
        for leaf in &leaves {
            if let Node::Coefficient(c) = *leaf {
                assert!((-5.0..=5.0).contains(&c));
            }
        }
    }

    #[test]
    fn excess_variables_are_sampled() {
        let mut rng = XorShiftRng::seed_from_u64(3);
        let expr = generator(5).generate(&mut rng, 1).unwrap();
        let leaves = leaves(&expr);
        assert_eq!(leaves.len(), 2);
        assert!(leaves.iter().all(|n| matches!(*n, Node::Variable(_))));
    }

    #[test]
    fn integral_coefficients_are_whole() {
        let mut rng = XorShiftRng::seed_from_u64(4);
        let gen = Generator::new(vec![Operator::Add], vec![], (2.5, -2.5))
            .unwrap()
            .integral(true);
        let expr = gen.generate(&mut rng, 4).unwrap();
        for leaf in leaves(&expr) {
            match leaf {
                Node::Coefficient(c) => {
                    assert_eq!(c.fract(), 0.0);
                    assert!((-2.0..=2.0).contains(&c));
                }
                other => panic!("unexpected leaf {:?}", other),
            }
        }
    }

    #[test]
    fn same_seed_same_tree() {
        let gen = generator(2);
        let a = gen.generate(&mut XorShiftRng::seed_from_u64(9), 3).unwrap();
        let b = gen.generate(&mut XorShiftRng::seed_from_u64(9), 3).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(matches!(
            Generator::new(vec![], vec![], (0.0, 1.0)),
            Err(Error::EmptyOperatorSet)
        ));
        let mut rng = XorShiftRng::seed_from_u64(5);
        assert!(matches!(
            generator(1).generate(&mut rng, MAX_DEPTH + 1),
            Err(Error::DepthTooLarge { .. })
        ));
    }
}
