//! The error type shared by the expression, evolution and dataset layers.

use crate::config::ConfigError;
use crate::gp::expr::Operator;

/// Everything that can go wrong while building, evaluating or evolving expressions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An expression referenced a variable that the bindings do not define.
    #[error("unbound variable `{0}`")]
    UnboundVariable(String),

    /// An operator was used where a leaf was expected.
    #[error("operator `{0}` cannot be used as a leaf node")]
    OperatorLeaf(Operator),

    /// An operator name could not be parsed.
    #[error("unknown operator `{0}`")]
    UnknownOperator(String),

    /// A random tree was requested without any operators to choose from.
    #[error("the operator set is empty")]
    EmptyOperatorSet,

    /// A random tree was requested deeper than the generator supports.
    #[error("tree depth {depth} exceeds the maximum of {max}")]
    DepthTooLarge {
        /// The requested depth.
        depth: u32,
        /// The deepest supported tree.
        max: u32,
    },

    /// Selection was attempted over an empty population.
    #[error("cannot select parents from an empty population")]
    EmptyPopulation,

    /// Selection needs at least two individuals to pick distinct parents.
    #[error("cannot select two distinct parents from a population of {0}")]
    PopulationTooSmall(usize),

    /// Fitness-proportional selection is undefined for this total fitness.
    #[error("fitness-proportional selection is undefined for a total fitness of {0}")]
    DegenerateSelection(f64),

    /// The dataset contained no usable rows.
    #[error("no usable rows in dataset `{0}`")]
    EmptyDataset(String),

    /// Reading a dataset failed.
    #[error("IO error reading {path}: {source}")]
    Io {
        /// The path being read.
        path: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The CSV reader failed at the IO level.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// Invalid configuration.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
