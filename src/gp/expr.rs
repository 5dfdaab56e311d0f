//! Items related to expressions.

use fnv::FnvHashMap;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use petgraph::{Incoming, Outgoing};
use rand::Rng;
use serde::Deserialize;
use std::cmp::Ordering;
use std::fmt;
use std::mem;
use std::ops;
use std::str::FromStr;

use crate::error::Error;

/// The value produced when dividing by exactly zero.
///
/// Evaluation substitutes this value and flags the result as degenerate rather than failing.
pub const DIVIDE_BY_ZERO: f64 = 1.0e9;

/// Values for the named inputs of an expression.
pub type Bindings = FnvHashMap<String, f64>;

/// The directed graph type used to store an expression.
///
/// Each node within the graph is a [`Vertex`]. Operator nodes have exactly two input
/// expressions stored on `Incoming` edges, each weighted with the [`Slot`] it occupies. The
/// single `Outgoing` edge of a node leads to its parent. The root has no `Outgoing` edge.
pub type Graph = StableDiGraph<Vertex, Slot, u32>;

/// The node index type used within the expr graph type.
pub type NodeIndex = petgraph::stable_graph::NodeIndex<u32>;

/// The arithmetic operators available to branch nodes.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// The position of a child beneath its operator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Left,
    Right,
}

/// The payload of a single expression node.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    /// A branch applying an operator to its left and right inputs.
    Operator(Operator),
    /// A leaf looked up by name in the bindings.
    Variable(String),
    /// A constant leaf.
    Coefficient(f64),
}

/// A node along with the cached size of the subtree it roots.
#[derive(Clone, Debug)]
pub struct Vertex {
    /// The node payload.
    pub node: Node,
    pub(crate) size: usize,
}

/// The result of evaluating an expression.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Evaluation {
    /// The computed value.
    pub value: f64,
    /// Whether a division by zero was replaced with the sentinel somewhere in the tree.
    pub degenerate: bool,
}

/// An arithmetic expression tree.
///
/// The tree owns every one of its nodes. Cloning produces a compact deep copy that shares
/// nothing with the source.
#[derive(Debug)]
pub struct Expr {
    graph: Graph,
    root: NodeIndex,
}

impl Operator {
    /// Every supported operator.
    pub const ALL: [Operator; 4] = [
        Operator::Add,
        Operator::Subtract,
        Operator::Multiply,
        Operator::Divide,
    ];

    /// Apply the operator to the given operands.
    ///
    /// Returns `None` for a division whose right operand is exactly zero.
    pub fn apply(self, lhs: f64, rhs: f64) -> Option<f64> {
        match self {
            Operator::Add => Some(lhs + rhs),
            Operator::Subtract => Some(lhs - rhs),
            Operator::Multiply => Some(lhs * rhs),
            Operator::Divide if rhs == 0.0 => None,
            Operator::Divide => Some(lhs / rhs),
        }
    }

    /// The infix symbol for the operator.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Operator {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let op = match s.trim().to_ascii_lowercase().as_str() {
            "+" | "add" => Operator::Add,
            "-" | "sub" | "subtract" => Operator::Subtract,
            "*" | "mul" | "multiply" => Operator::Multiply,
            "/" | "div" | "divide" => Operator::Divide,
            _ => return Err(Error::UnknownOperator(s.to_string())),
        };
        Ok(op)
    }
}

impl Slot {
    /// Both slots, left first.
    pub const BOTH: [Slot; 2] = [Slot::Left, Slot::Right];

    /// The opposite slot.
    pub fn sibling(self) -> Slot {
        match self {
            Slot::Left => Slot::Right,
            Slot::Right => Slot::Left,
        }
    }
}

impl Node {
    /// Whether the node is a variable or coefficient.
    pub fn is_leaf(&self) -> bool {
        !matches!(*self, Node::Operator(_))
    }
}

impl Vertex {
    pub(crate) fn new(node: Node) -> Self {
        Vertex { node, size: 1 }
    }

    /// The number of nodes in the subtree rooted at this vertex.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Expr {
    /// A single-node expression.
    ///
    /// Operators cannot stand alone, so passing a `Node::Operator` is an error.
    pub fn leaf(node: Node) -> Result<Self, Error> {
        if let Node::Operator(op) = node {
            return Err(Error::OperatorLeaf(op));
        }
        let mut graph = Graph::with_capacity(1, 0);
        let root = graph.add_node(Vertex::new(node));
        Ok(Expr { graph, root })
    }

    /// A single variable leaf.
    pub fn variable(name: impl Into<String>) -> Self {
        let mut graph = Graph::with_capacity(1, 0);
        let root = graph.add_node(Vertex::new(Node::Variable(name.into())));
        Expr { graph, root }
    }

    /// A single coefficient leaf.
    pub fn coefficient(value: f64) -> Self {
        let mut graph = Graph::with_capacity(1, 0);
        let root = graph.add_node(Vertex::new(Node::Coefficient(value)));
        Expr { graph, root }
    }

    /// Join two expressions beneath a new operator root.
    pub fn operator(op: Operator, left: Expr, right: Expr) -> Self {
        let n = 1 + left.size() + right.size();
        let mut graph = Graph::with_capacity(n, n - 1);
        let root = graph.add_node(Vertex::new(Node::Operator(op)));
        for (slot, input) in [(Slot::Left, &left), (Slot::Right, &right)] {
            let child = copy_subtree(&mut graph, &input.graph, input.root);
            graph.add_edge(child, root, slot);
        }
        graph[root].size = n;
        Expr { graph, root }
    }

    /// Assemble an expression from a graph built elsewhere in the crate.
    ///
    /// The caller is responsible for the graph's sizes and slots.
    pub(crate) fn from_parts(graph: Graph, root: NodeIndex) -> Self {
        Expr { graph, root }
    }

    /// The index of the root node.
    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// The payload of the node at `nx`.
    pub fn node(&self, nx: NodeIndex) -> &Node {
        &self.graph[nx].node
    }

    /// All node indices in the tree, in arena order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    /// The number of nodes in the tree.
    pub fn size(&self) -> usize {
        self.graph[self.root].size
    }

    /// The number of nodes in the subtree rooted at `nx`.
    pub fn subtree_size(&self, nx: NodeIndex) -> usize {
        self.graph[nx].size
    }

    /// The child occupying `slot` beneath `nx`, if any.
    pub fn child(&self, nx: NodeIndex, slot: Slot) -> Option<NodeIndex> {
        self.graph
            .edges_directed(nx, Incoming)
            .find(|e| *e.weight() == slot)
            .map(|e| e.source())
    }

    /// The left and right children of `nx`, or `None` for leaves.
    pub fn children(&self, nx: NodeIndex) -> Option<(NodeIndex, NodeIndex)> {
        Some((self.child(nx, Slot::Left)?, self.child(nx, Slot::Right)?))
    }

    /// The parent of `nx` along with the slot `nx` occupies, or `None` for the root.
    pub fn parent(&self, nx: NodeIndex) -> Option<(NodeIndex, Slot)> {
        self.graph
            .edges_directed(nx, Outgoing)
            .next()
            .map(|e| (e.target(), *e.weight()))
    }

    // The children of an operator node. Missing children break the tree's invariants.
    pub(crate) fn operands(&self, nx: NodeIndex) -> (NodeIndex, NodeIndex) {
        self.children(nx).unwrap_or_else(|| {
            panic!(
                "operator node {:?} is missing a child\n{:#?}",
                nx, self.graph
            )
        })
    }

    /// Evaluate the expression, substituting [`DIVIDE_BY_ZERO`] for divisions by zero.
    pub fn evaluate(&self, bindings: &Bindings) -> Result<Evaluation, Error> {
        self.evaluate_with(bindings, DIVIDE_BY_ZERO)
    }

    /// Evaluate the expression, substituting `sentinel` for divisions by zero.
    pub fn evaluate_with(&self, bindings: &Bindings, sentinel: f64) -> Result<Evaluation, Error> {
        let mut degenerate = false;
        let value = self.eval_node(self.root, bindings, sentinel, &mut degenerate)?;
        Ok(Evaluation { value, degenerate })
    }

    fn eval_node(
        &self,
        nx: NodeIndex,
        bindings: &Bindings,
        sentinel: f64,
        degenerate: &mut bool,
    ) -> Result<f64, Error> {
        match self.graph[nx].node {
            Node::Coefficient(value) => Ok(value),
            Node::Variable(ref name) => bindings
                .get(name)
                .copied()
                .ok_or_else(|| Error::UnboundVariable(name.clone())),
            Node::Operator(op) => {
                let (l, r) = self.operands(nx);
                let lhs = self.eval_node(l, bindings, sentinel, degenerate)?;
                let rhs = self.eval_node(r, bindings, sentinel, degenerate)?;
                Ok(op.apply(lhs, rhs).unwrap_or_else(|| {
                    *degenerate = true;
                    sentinel
                }))
            }
        }
    }

    /// The node at in-order position `k`, or `None` if `k` is out of range.
    pub fn kth_node(&self, mut k: usize) -> Option<NodeIndex> {
        if k >= self.size() {
            return None;
        }
        let mut nx = self.root;
        loop {
            let left = self.child(nx, Slot::Left);
            let left_size = left.map_or(0, |l| self.subtree_size(l));
            match k.cmp(&left_size) {
                Ordering::Equal => return Some(nx),
                Ordering::Less => nx = left?,
                Ordering::Greater => {
                    k -= left_size + 1;
                    nx = self.child(nx, Slot::Right)?;
                }
            }
        }
    }

    /// Select a non-root node uniformly at random.
    ///
    /// Draws `k` from `[0, size - 1)` and returns the `k`th node of the in-order traversal with
    /// the root skipped. Returns `None` for single-node trees.
    pub fn random_node<R>(&self, rng: &mut R) -> Option<NodeIndex>
    where
        R: Rng,
    {
        let size = self.size();
        if size < 2 {
            return None;
        }
        let k = rng.gen_range(0..size - 1);
        let root_position = self
            .child(self.root, Slot::Left)
            .map_or(0, |l| self.subtree_size(l));
        let position = if k < root_position { k } else { k + 1 };
        self.kth_node(position)
    }

    /// Clone the subtree whose root is at the given node into a new expression.
    pub fn clone_subtree(&self, nx: NodeIndex) -> Expr {
        let n = self.subtree_size(nx);
        let mut graph = Graph::with_capacity(n, n.saturating_sub(1));
        let root = copy_subtree(&mut graph, &self.graph, nx);
        Expr { graph, root }
    }

    /// Replace the subtree rooted at `nx` with a copy of `subtree`.
    ///
    /// The copy takes over the slot `nx` occupied beneath its parent, or becomes the new root
    /// when `nx` is the root. Every ancestor size is recomputed. Returns the index of the
    /// grafted subtree's root.
    pub fn replace_subtree(&mut self, nx: NodeIndex, subtree: &Expr) -> NodeIndex {
        let parent = self.parent(nx);
        self.remove_subtree(nx);
        let grafted = copy_subtree(&mut self.graph, &subtree.graph, subtree.root);
        match parent {
            Some((p, slot)) => {
                self.graph.add_edge(grafted, p, slot);
                self.refresh_ancestors(p);
            }
            None => self.root = grafted,
        }
        grafted
    }

    /// Overwrite the value of a coefficient node.
    ///
    /// Returns `false` and leaves the tree untouched if `nx` is not a coefficient.
    pub fn set_coefficient(&mut self, nx: NodeIndex, value: f64) -> bool {
        match self.graph[nx].node {
            Node::Coefficient(ref mut v) => {
                *v = value;
                true
            }
            _ => false,
        }
    }

    /// Replace the operator at `nx` and everything beneath it with a single coefficient.
    pub(crate) fn collapse(&mut self, nx: NodeIndex, value: f64) {
        let inputs: Vec<_> = self.graph.neighbors_directed(nx, Incoming).collect();
        for input in inputs {
            self.remove_subtree(input);
        }
        self.graph[nx].node = Node::Coefficient(value);
        self.refresh_ancestors(nx);
    }

    /// Replace the operator at `nx` with its child in `keep`, dropping the other child.
    ///
    /// Returns the index now occupying the slot `nx` held.
    pub(crate) fn hoist(&mut self, nx: NodeIndex, keep: Slot) -> NodeIndex {
        let (kept, dropped) = match (self.child(nx, keep), self.child(nx, keep.sibling())) {
            (Some(k), Some(d)) => (k, d),
            _ => return nx,
        };
        let parent = self.parent(nx);
        self.remove_subtree(dropped);
        self.graph.remove_node(nx);
        match parent {
            Some((p, slot)) => {
                self.graph.add_edge(kept, p, slot);
                self.refresh_ancestors(p);
            }
            None => self.root = kept,
        }
        kept
    }

    fn remove_subtree(&mut self, nx: NodeIndex) {
        let mut stack = vec![nx];
        while let Some(n) = stack.pop() {
            stack.extend(self.graph.neighbors_directed(n, Incoming));
            self.graph.remove_node(n);
        }
    }

    /// Recompute the cached size of `nx` and of every node above it, walking up to the root.
    pub(crate) fn refresh_ancestors(&mut self, nx: NodeIndex) {
        let mut next = Some(nx);
        while let Some(n) = next {
            let size = 1 + self
                .graph
                .neighbors_directed(n, Incoming)
                .map(|c| self.graph[c].size)
                .sum::<usize>();
            self.graph[n].size = size;
            next = self.parent(n).map(|(p, _)| p);
        }
    }

    /// Check every structural invariant of the tree.
    ///
    /// Operators have exactly a left and a right child, leaves have none, every cached size is
    /// `1 + left + right`, every non-root node has exactly one parent and the arena holds no
    /// nodes unreachable from the root.
    pub fn is_well_formed(&self) -> bool {
        if self.parent(self.root).is_some() {
            return false;
        }
        let mut reached = 0;
        let mut stack = vec![self.root];
        while let Some(nx) = stack.pop() {
            reached += 1;
            let inputs: Vec<_> = self.graph.edges_directed(nx, Incoming).collect();
            let outputs = self.graph.edges_directed(nx, Outgoing).count();
            if nx != self.root && outputs != 1 {
                return false;
            }
            match self.graph[nx].node {
                Node::Operator(_) => {
                    let (l, r) = match self.children(nx) {
                        Some(children) if inputs.len() == 2 => children,
                        _ => return false,
                    };
                    if self.subtree_size(nx) != 1 + self.subtree_size(l) + self.subtree_size(r) {
                        return false;
                    }
                    stack.push(l);
                    stack.push(r);
                }
                _ => {
                    if !inputs.is_empty() || self.subtree_size(nx) != 1 {
                        return false;
                    }
                }
            }
        }
        reached == self.graph.node_count() && reached == self.size()
    }

    fn subtree_eq(&self, a: NodeIndex, other: &Expr, b: NodeIndex) -> bool {
        if self.node(a) != other.node(b) {
            return false;
        }
        match (self.children(a), other.children(b)) {
            (Some((al, ar)), Some((bl, br))) => {
                self.subtree_eq(al, other, bl) && self.subtree_eq(ar, other, br)
            }
            (None, None) => true,
            _ => false,
        }
    }

    fn write_node(&self, f: &mut fmt::Formatter, nx: NodeIndex) -> fmt::Result {
        match *self.node(nx) {
            Node::Operator(op) => {
                let (l, r) = self.operands(nx);
                f.write_str("(")?;
                self.write_node(f, l)?;
                write!(f, " {} ", op)?;
                self.write_node(f, r)?;
                f.write_str(")")
            }
            Node::Variable(ref name) => f.write_str(name),
            Node::Coefficient(value) => write!(f, "{}", value),
        }
    }
}

/// Copy the subtree of `src` rooted at `src_root` into `dst`, returning the copy's root.
///
/// The copied root is left detached. Cached sizes are copied verbatim.
fn copy_subtree(dst: &mut Graph, src: &Graph, src_root: NodeIndex) -> NodeIndex {
    let dst_root = dst.add_node(src[src_root].clone());
    let mut curr = vec![(src_root, dst_root)];
    let mut next = vec![];
    while !curr.is_empty() {
        for (src_parent, dst_parent) in curr.drain(..) {
            for e in src.edges_directed(src_parent, Incoming) {
                let dst_child = dst.add_node(src[e.source()].clone());
                dst.add_edge(dst_child, dst_parent, *e.weight());
                next.push((e.source(), dst_child));
            }
        }
        mem::swap(&mut curr, &mut next);
    }
    dst_root
}

impl Clone for Expr {
    fn clone(&self) -> Self {
        self.clone_subtree(self.root)
    }
}

/// Structural equality: same shape, same operators, same leaves.
impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.size() == other.size() && self.subtree_eq(self.root, other, other.root)
    }
}

/// Fully parenthesised infix notation, e.g. `((x1 + 2) * (x1 - 2))`.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.write_node(f, self.root)
    }
}

macro_rules! impl_expr_binop {
    ($Trait:ident, $method:ident, $op:expr) => {
        impl ops::$Trait for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::operator($op, self, rhs)
            }
        }

        impl ops::$Trait<f64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::operator($op, self, Expr::coefficient(rhs))
            }
        }
    };
}

impl_expr_binop!(Add, add, Operator::Add);
impl_expr_binop!(Sub, sub, Operator::Subtract);
impl_expr_binop!(Mul, mul, Operator::Multiply);
impl_expr_binop!(Div, div, Operator::Divide);
