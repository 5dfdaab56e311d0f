//! Command line front end: evolve an expression that fits a dataset.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;
use tracing::info;
use tracing_subscriber::EnvFilter;

use gpsr::config::Config;
use gpsr::dataset::{Dataset, Metric};
use gpsr::ga::Simulation;
use gpsr::Operator;

#[derive(Parser, Debug, Clone)]
#[command(name = "gpsr")]
#[command(about = "Symbolic regression by genetic programming")]
struct Cli {
    /// Dataset file or directory. Each row holds the inputs followed by the output.
    data: Option<PathBuf>,

    /// TOML configuration file. Flags override its values.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Individuals per generation.
    #[arg(long)]
    population: Option<usize>,

    /// Maximum number of generations.
    #[arg(long)]
    generations: Option<usize>,

    /// Stop once the best fitness falls below this value.
    #[arg(long)]
    threshold: Option<f64>,

    /// Stop once this many distinct solutions below the threshold were found.
    #[arg(long)]
    solutions: Option<usize>,

    /// Depth of the initial random trees.
    #[arg(long)]
    depth: Option<u32>,

    /// Fraction of best individuals carried over unchanged.
    #[arg(long)]
    survival_rate: Option<f64>,

    /// Operators to use (comma-separated, e.g. `+,-,*`).
    #[arg(long, value_delimiter = ',')]
    operators: Option<Vec<Operator>>,

    /// Only use whole-number coefficients.
    #[arg(long)]
    integral: bool,

    /// Probability that a sample is used for training.
    #[arg(long)]
    training_probability: Option<f64>,

    /// Include the test samples in the fitness used for selection.
    #[arg(long)]
    include_test: bool,

    /// Report root mean squared error instead of the sum of squared residuals.
    #[arg(long)]
    rms: bool,

    /// Field delimiter of the dataset.
    #[arg(long)]
    delimiter: Option<char>,

    /// Random seed. Drawn from the operating system when omitted.
    #[arg(long)]
    seed: Option<u64>,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(data) = self.data {
            config.dataset = Some(data);
        }
        if let Some(n) = self.population {
            config.population_size = n;
        }
        if let Some(n) = self.generations {
            config.max_generations = Some(n);
        }
        if let Some(t) = self.threshold {
            config.fitness_threshold = Some(t);
        }
        if let Some(n) = self.solutions {
            config.solutions_wanted = Some(n);
        }
        if let Some(d) = self.depth {
            config.depth = d;
        }
        if let Some(r) = self.survival_rate {
            config.survival_rate = r;
        }
        if let Some(ops) = self.operators {
            config.operators = ops;
        }
        if let Some(p) = self.training_probability {
            config.training_probability = p;
        }
        if let Some(d) = self.delimiter {
            config.delimiter = d;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.integral |= self.integral;
        config.include_test |= self.include_test;
        if self.rms {
            config.metric = Metric::RootMeanSquared;
        }
    }
}

/// Install the global subscriber. `LOG_FORMAT=pretty` selects multi-line output, and the filter
/// is read from `RUST_LOG`, defaulting to `info`.
fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let result = match format.as_str() {
        "pretty" => tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
        _ => tracing_subscriber::fmt()
            .compact()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("tracing init failed: {e}"))
}

fn main() -> Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    cli.apply(&mut config);

    let seed = config.seed.unwrap_or_else(rand::random);
    info!(seed, "seeding random number generator");
    let mut rng = XorShiftRng::seed_from_u64(seed);

    let path = match &config.dataset {
        Some(path) => path.clone(),
        None => bail!("no dataset given, pass a path or set `dataset` in the configuration"),
    };
    let data = Dataset::load(
        &mut rng,
        &path,
        config.delimiter_byte(),
        config.training_probability,
    )
    .with_context(|| format!("failed to load dataset {}", path.display()))?
    .include_test(config.include_test)
    .metric(config.metric)
    .division_sentinel(config.division_sentinel);

    config.variables = data.variable_count();
    config.validate()?;

    let generator = config.generator()?;
    let mut simulation = Simulation::new(&mut rng, &data, generator, config.parameters())
        .context("failed to initialize the population")?;
    let outcome = simulation.run(&mut rng, &data)?;

    let best = outcome.best.expr();
    println!("best: {}", best);
    println!("  size: {}", outcome.best.size());
    println!("  training fitness: {}", data.score(best, false)?);
    if !data.test().is_empty() {
        println!("  overall fitness: {}", data.score(best, true)?);
    }
    println!("generations: {} ({:?})", outcome.generations, outcome.stop);
    if !outcome.solutions.is_empty() {
        println!("solutions:");
        for solution in &outcome.solutions {
            println!("  {}  [{}]", solution.expr(), solution.fitness());
        }
    }
    Ok(())
}
