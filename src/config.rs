//! Run configuration.
//!
//! A [`Config`] is read from a TOML file in which every field is optional, then validated as a
//! whole so that every problem is reported at once.
//!
//! ```toml
//! population_size = 200
//! max_generations = 500
//! fitness_threshold = 0.01
//! depth = 3
//! variables = 1
//! operators = ["add", "subtract", "multiply", "divide"]
//! coefficient_range = [-5.0, 5.0]
//! dataset = "data/quadratic.csv"
//! ```

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::dataset::Metric;
use crate::error::Error;
use crate::ga::{Parameters, Termination};
use crate::gp::expr::Operator;
use crate::gp::gen::{self, Generator, MAX_DEPTH};
use crate::gp::variation::Mutation;

/// Errors arising from configuration parsing, validation, or I/O.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// TOML parsing failed.
    #[error("parse error in {file}: {source}")]
    Parse {
        /// The source that failed to parse.
        file: String,
        /// The underlying TOML error.
        #[source]
        source: toml::de::Error,
    },

    /// One or more fields hold invalid values.
    #[error("invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// The configuration file could not be read.
    #[error("IO error reading {file}: {source}")]
    Io {
        /// The path that could not be read.
        file: String,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Everything needed to describe a run.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// The number of individuals in each generation.
    pub population_size: usize,
    /// The maximum number of generations to breed.
    pub max_generations: Option<usize>,
    /// Fitness below which an individual counts as a solution.
    pub fitness_threshold: Option<f64>,
    /// Stop once this many distinct solutions were found.
    pub solutions_wanted: Option<usize>,
    /// The fraction of best individuals copied unchanged into the next generation.
    pub survival_rate: f64,
    /// The depth of the initial random trees.
    pub depth: u32,
    /// The number of input variables, `x1` through `xN`.
    pub variables: usize,
    /// The operators available to generated trees.
    pub operators: Vec<Operator>,
    /// The bounds of randomly drawn coefficients.
    pub coefficient_range: (f64, f64),
    /// Draw coefficients and mutation steps as whole numbers.
    pub integral: bool,
    /// The probability that any single coefficient of an offspring is perturbed.
    pub mutation_rate: f64,
    /// The bounds of a coefficient perturbation.
    pub mutation_range: (f64, f64),
    /// The probability that an offspring has a random subtree replaced.
    pub subtree_mutation_rate: f64,
    /// The depth of replacement subtrees.
    pub subtree_depth: u32,
    /// The file or directory holding the samples.
    pub dataset: Option<PathBuf>,
    /// The field delimiter of the samples.
    pub delimiter: char,
    /// The probability that a sample is used for training rather than testing.
    pub training_probability: f64,
    /// Whether selection fitness also covers the test samples.
    pub include_test: bool,
    /// How residuals are combined into fitness.
    pub metric: Metric,
    /// The value substituted for divisions by zero.
    pub division_sentinel: f64,
    /// Seed for the random number generator. Random when unset.
    pub seed: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        let mutation = Mutation::default();
        Config {
            population_size: 100,
            max_generations: Some(1_000),
            fitness_threshold: None,
            solutions_wanted: None,
            survival_rate: 0.1,
            depth: 3,
            variables: 1,
            operators: Operator::ALL.to_vec(),
            coefficient_range: (-5.0, 5.0),
            integral: false,
            mutation_rate: mutation.rate,
            mutation_range: mutation.range,
            subtree_mutation_rate: mutation.subtree_rate,
            subtree_depth: mutation.subtree_depth,
            dataset: None,
            delimiter: ',',
            training_probability: 0.5,
            include_test: false,
            metric: Metric::default(),
            division_sentinel: crate::gp::expr::DIVIDE_BY_ZERO,
            seed: None,
        }
    }
}

impl Config {
    /// Load and validate a configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            file: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&content, &path.display().to_string())
    }

    /// Parse and validate a configuration from TOML text.
    ///
    /// `source_name` identifies the text in error messages.
    pub fn from_toml(content: &str, source_name: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content).map_err(|source| ConfigError::Parse {
            file: source_name.to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every semantic constraint, collecting all violations.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, message: String| {
            if !ok {
                errors.push(message);
            }
        };

        check(
            self.population_size >= 2,
            format!("population_size must be at least 2, got {}", self.population_size),
        );
        check(
            self.max_generations.is_some() || self.fitness_threshold.is_some(),
            "one of max_generations or fitness_threshold must be set".to_string(),
        );
        check(
            self.solutions_wanted.is_none() || self.fitness_threshold.is_some(),
            "solutions_wanted requires fitness_threshold".to_string(),
        );
        check(
            self.fitness_threshold.map_or(true, f64::is_finite),
            "fitness_threshold must be finite".to_string(),
        );
        check(
            unit(self.survival_rate),
            format!("survival_rate must lie in [0, 1], got {}", self.survival_rate),
        );
        check(
            self.depth <= MAX_DEPTH,
            format!("depth must be at most {}, got {}", MAX_DEPTH, self.depth),
        );
        check(
            self.subtree_depth <= MAX_DEPTH,
            format!("subtree_depth must be at most {}, got {}", MAX_DEPTH, self.subtree_depth),
        );
        check(
            self.depth > MAX_DEPTH || self.variables <= 1 << self.depth,
            format!(
                "{} variables do not fit in the {} leaves of a depth {} tree",
                self.variables,
                1u64 << self.depth.min(MAX_DEPTH),
                self.depth
            ),
        );
        check(
            !self.operators.is_empty(),
            "operators must not be empty".to_string(),
        );
        check(
            finite_range(self.coefficient_range),
            format!("coefficient_range must be finite, got {:?}", self.coefficient_range),
        );
        check(
            unit(self.mutation_rate),
            format!("mutation_rate must lie in [0, 1], got {}", self.mutation_rate),
        );
        check(
            finite_range(self.mutation_range),
            format!("mutation_range must be finite, got {:?}", self.mutation_range),
        );
        check(
            unit(self.subtree_mutation_rate),
            format!(
                "subtree_mutation_rate must lie in [0, 1], got {}",
                self.subtree_mutation_rate
            ),
        );
        check(
            unit(self.training_probability),
            format!(
                "training_probability must lie in [0, 1], got {}",
                self.training_probability
            ),
        );
        check(
            self.delimiter.is_ascii(),
            format!("delimiter must be a single ASCII character, got {:?}", self.delimiter),
        );
        check(
            self.division_sentinel.is_finite(),
            "division_sentinel must be finite".to_string(),
        );

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// The names of the input variables.
    pub fn variable_names(&self) -> Vec<String> {
        gen::variable_names(self.variables)
    }

    /// The random tree generator described by this configuration.
    pub fn generator(&self) -> Result<Generator, Error> {
        Ok(Generator::new(
            self.operators.clone(),
            self.variable_names(),
            self.coefficient_range,
        )?
        .integral(self.integral))
    }

    /// The generational loop parameters described by this configuration.
    pub fn parameters(&self) -> Parameters {
        Parameters {
            population_size: self.population_size,
            survival_rate: self.survival_rate,
            depth: self.depth,
            mutation: Mutation {
                rate: self.mutation_rate,
                range: self.mutation_range,
                integral: self.integral,
                subtree_rate: self.subtree_mutation_rate,
                subtree_depth: self.subtree_depth,
            },
            termination: Termination {
                max_generations: self.max_generations,
                fitness_threshold: self.fitness_threshold,
                solutions_wanted: self.solutions_wanted,
            },
        }
    }

    /// The delimiter as a byte.
    pub fn delimiter_byte(&self) -> u8 {
        u8::try_from(self.delimiter).unwrap_or(b',')
    }
}

fn unit(p: f64) -> bool {
    (0.0..=1.0).contains(&p)
}

fn finite_range((a, b): (f64, f64)) -> bool {
    a.is_finite() && b.is_finite()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        let generator = config.generator().unwrap();
        assert_eq!(generator.variables(), ["x1"]);
        assert_eq!(generator.operators(), Operator::ALL);
        assert_eq!(config.parameters().mutation, Mutation::default());
    }

    #[test]
    fn parses_partial_toml() {
        let config = Config::from_toml(
            r#"
            population_size = 40
            fitness_threshold = 0.5
            operators = ["add", "multiply"]
            coefficient_range = [-2.0, 2.0]
            metric = "root_mean_squared"
            dataset = "samples.csv"
            delimiter = ";"
            "#,
            "inline",
        )
        .unwrap();
        assert_eq!(config.population_size, 40);
        assert_eq!(config.fitness_threshold, Some(0.5));
        assert_eq!(config.operators, [Operator::Add, Operator::Multiply]);
        assert_eq!(config.coefficient_range, (-2.0, 2.0));
        assert_eq!(config.metric, Metric::RootMeanSquared);
        assert_eq!(config.dataset, Some(PathBuf::from("samples.csv")));
        assert_eq!(config.delimiter_byte(), b';');
        assert_eq!(config.max_generations, Some(1_000));
    }

    #[test]
    fn rejects_unknown_fields() {
        let err = Config::from_toml("population = 3", "inline").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }), "{}", err);
    }

    #[test]
    fn collects_every_violation() {
        let config = Config {
            population_size: 1,
            survival_rate: 1.5,
            variables: 9,
            operators: vec![],
            max_generations: None,
            ..Config::default()
        };
        match config.validate() {
            Err(ConfigError::Validation(errors)) => {
                assert_eq!(errors.len(), 5, "{:?}", errors);
            }
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn solutions_need_a_threshold() {
        let config = Config {
            solutions_wanted: Some(3),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.toml");
        std::fs::write(&path, "seed = 42\nsurvival_rate = 0.2\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.survival_rate, 0.2);

        let missing = Config::load(&dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(missing, ConfigError::Io { .. }));
    }
}
