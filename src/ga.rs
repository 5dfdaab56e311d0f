//! A module for abstracting common processes related to Genetic Algorithms.
//!
//! # Genetic Algorithms
//!
//! The genetic algorithm process can be described as follows:
//!
//! 1. Initialise a *Population* of *Individual*s.
//! 2. Evaluate the *Fitness* of each of the *Individual*s.
//! 3. Based on the *Fitness*, create a new generation via elitism, selection, crossover and
//!    mutation.
//! 4. If the terminal condition is met, we're done.
//! 5. GOTO 2.
//!
//! Fitness is an error measure: lower is better and the population is kept sorted ascending.

use rand::Rng;
use std::cmp::Ordering;
use tracing::{debug, info, warn};

use crate::error::Error;
use crate::gp::expr::Expr;
use crate::gp::gen::Generator;
use crate::gp::variation::{self, Mutation};

/// The fitness given to individuals whose evaluation was degenerate.
///
/// Such individuals always sort to the bottom of the population.
pub const INVALID_FITNESS: f64 = f64::MAX;

// Breeding attempts allowed per population slot before falling back to random immigrants.
const ATTEMPTS_PER_SLOT: usize = 50;

// Traits.

/// The environment in which an expression's fitness is tested.
pub trait Environment {
    /// The error of `expr` within this environment. Lower is better.
    fn fitness(&self, expr: &Expr) -> Result<f64, Error>;
}

// Model.

/// A candidate expression along with its cached fitness and size.
#[derive(Clone, Debug)]
pub struct Individual {
    expr: Expr,
    fitness: f64,
    size: usize,
}

/// The states of the generational loop.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    Initializing,
    Evaluating,
    Selecting,
    Reproducing,
    Terminated,
}

/// Why a simulation stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stop {
    /// The generation budget was exhausted.
    Generations,
    /// The best fitness dropped below the threshold.
    Threshold,
    /// Enough below-threshold individuals were collected.
    Solutions,
}

/// When a simulation should stop. Any criterion that is set may end the run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Termination {
    /// The maximum number of generations to breed.
    pub max_generations: Option<usize>,
    /// Fitness below which an individual counts as a solution.
    pub fitness_threshold: Option<f64>,
    /// Stop once this many distinct solutions were found, rather than at the first.
    pub solutions_wanted: Option<usize>,
}

/// The parameters of the generational loop.
#[derive(Clone, Debug, PartialEq)]
pub struct Parameters {
    /// The number of individuals in each generation.
    pub population_size: usize,
    /// The fraction of best individuals copied unchanged into the next generation.
    pub survival_rate: f64,
    /// The depth of randomly generated individuals.
    pub depth: u32,
    /// How offspring are mutated.
    pub mutation: Mutation,
    /// When to stop.
    pub termination: Termination,
}

/// The simulation in which the genetic algorithm is run.
#[derive(Debug)]
pub struct Simulation {
    generator: Generator,
    params: Parameters,
    // Always sorted by fitness, best first.
    population: Vec<Individual>,
    best: Individual,
    solutions: Vec<Individual>,
    generation: usize,
    phase: Phase,
}

/// The result of a completed run.
#[derive(Clone, Debug)]
pub struct Outcome {
    /// The best individual seen in any generation.
    pub best: Individual,
    /// The number of generations bred.
    pub generations: usize,
    /// Distinct individuals found below the fitness threshold.
    pub solutions: Vec<Individual>,
    /// Why the run stopped.
    pub stop: Stop,
}

// Fitness-proportional parent selection over a sorted population.
#[derive(Clone, Debug)]
struct Roulette {
    cumulative: Vec<f64>,
}

// Impls.

impl Individual {
    /// Simplify `expr` and score it within `env`.
    ///
    /// Degenerate simplifications and non-finite scores produce [`INVALID_FITNESS`].
    pub fn new<E>(mut expr: Expr, env: &E) -> Result<Self, Error>
    where
        E: Environment,
    {
        let simplified = expr.simplify();
        let fitness = if simplified.degenerate {
            INVALID_FITNESS
        } else {
            let fitness = env.fitness(&expr)?;
            if fitness.is_finite() {
                fitness
            } else {
                INVALID_FITNESS
            }
        };
        let size = expr.size();
        Ok(Individual {
            expr,
            fitness,
            size,
        })
    }

    /// The individual's expression.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// The individual's fitness. Lower is better.
    pub fn fitness(&self) -> f64 {
        self.fitness
    }

    /// The number of nodes in the individual's expression.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whether the individual's evaluation was usable.
    pub fn is_valid(&self) -> bool {
        self.fitness < INVALID_FITNESS
    }

    /// Consume the individual, returning its expression.
    pub fn into_expr(self) -> Expr {
        self.expr
    }

    // An offspring is a duplicate of a parent when neither its fitness nor its size changed.
    fn duplicates(&self, other: &Individual) -> bool {
        self.fitness.to_bits() == other.fitness.to_bits() && self.size == other.size
    }
}

/// Best first: lower fitness, then smaller size.
fn rank(a: &Individual, b: &Individual) -> Ordering {
    a.fitness
        .total_cmp(&b.fitness)
        .then_with(|| a.size.cmp(&b.size))
}

/// The number of individuals copied unchanged into the next generation.
pub fn elite_count(population_size: usize, survival_rate: f64) -> usize {
    let elites = (population_size as f64 * survival_rate.clamp(0.0, 1.0)).ceil() as usize;
    elites.min(population_size)
}

/// Choose the indices of two distinct parents from a population sorted best first.
///
/// Each valid individual is weighted by `(total - fitness) / total`, where `total` is the summed
/// fitness of all valid individuals, so fitter individuals are more likely to be drawn. Two
/// independent draws are made against the cumulative weights. If both land on the same
/// individual the second parent is replaced with a uniformly random different one.
pub fn select_parents<R>(rng: &mut R, population: &[Individual]) -> Result<(usize, usize), Error>
where
    R: Rng,
{
    Roulette::new(population)?.spin_twice(rng)
}

impl Roulette {
    fn new(population: &[Individual]) -> Result<Self, Error> {
        match population.len() {
            0 => return Err(Error::EmptyPopulation),
            1 => return Err(Error::PopulationTooSmall(1)),
            _ => (),
        }
        let total: f64 = population
            .iter()
            .filter(|i| i.is_valid())
            .map(Individual::fitness)
            .sum();
        if !(total.is_finite() && total > 0.0) {
            return Err(Error::DegenerateSelection(total));
        }

        let weights: Vec<f64> = population
            .iter()
            .map(|i| {
                if i.is_valid() {
                    (total - i.fitness) / total
                } else {
                    0.0
                }
            })
            .collect();
        let sum: f64 = weights.iter().sum();

        let cumulative = if sum > 0.0 {
            let running: Vec<f64> = weights
                .iter()
                .scan(0.0, |acc, w| {
                    *acc += w;
                    Some(*acc)
                })
                .collect();
            // Dividing by the final entry makes the sweep end at exactly 1.
            let last = running[running.len() - 1];
            running.into_iter().map(|c| c / last).collect()
        } else {
            warn!("every selection weight is zero, selecting uniformly");
            let n = population.len() as f64;
            (1..=population.len()).map(|i| i as f64 / n).collect()
        };
        Ok(Roulette { cumulative })
    }

    fn spin(&self, draw: f64) -> usize {
        let ix = self.cumulative.partition_point(|&c| c <= draw);
        ix.min(self.cumulative.len() - 1)
    }

    fn spin_twice<R>(&self, rng: &mut R) -> Result<(usize, usize), Error>
    where
        R: Rng,
    {
        let n = self.cumulative.len();
        if n < 2 {
            return Err(Error::PopulationTooSmall(n));
        }
        let a = self.spin(rng.gen());
        let mut b = self.spin(rng.gen());
        if a == b {
            b = rng.gen_range(0..n - 1);
            if b >= a {
                b += 1;
            }
        }
        Ok((a, b))
    }
}

impl Simulation {
    /// Initialise the simulation with a population of random individuals.
    pub fn new<R, E>(
        rng: &mut R,
        env: &E,
        generator: Generator,
        params: Parameters,
    ) -> Result<Self, Error>
    where
        R: Rng,
        E: Environment,
    {
        debug!(size = params.population_size, depth = params.depth, "initializing population");
        let population = (0..params.population_size)
            .map(|_| Individual::new(generator.generate(rng, params.depth)?, env))
            .collect::<Result<Vec<_>, _>>()?;
        Self::with_population(population, generator, params)
    }

    /// Initialise the simulation with an existing population.
    pub fn with_population(
        mut population: Vec<Individual>,
        generator: Generator,
        params: Parameters,
    ) -> Result<Self, Error> {
        population.sort_by(rank);
        let best = population.first().cloned().ok_or(Error::EmptyPopulation)?;
        let mut simulation = Simulation {
            generator,
            params,
            population,
            best,
            solutions: Vec::new(),
            generation: 0,
            phase: Phase::Initializing,
        };
        simulation.phase = Phase::Evaluating;
        simulation.record();
        simulation.phase = if simulation.stop().is_some() {
            Phase::Terminated
        } else {
            Phase::Selecting
        };
        Ok(simulation)
    }

    /// Step forward the simulation by a single generation.
    ///
    /// The elite carry over unchanged. The remaining slots are filled with mutated offspring of
    /// fitness-proportionally selected parents, rejecting offspring whose fitness and size both
    /// match either parent.
    pub fn step<R, E>(&mut self, rng: &mut R, env: &E) -> Result<(), Error>
    where
        R: Rng,
        E: Environment,
    {
        if self.phase == Phase::Terminated {
            return Ok(());
        }
        let n = self.params.population_size;

        // 1. Keep the elite.
        let elites = elite_count(n, self.params.survival_rate);
        let mut next: Vec<Individual> = self.population.iter().take(elites).cloned().collect();

        // 2. Breed the rest.
        self.phase = Phase::Reproducing;
        let mut attempts = 0;
        let mut rejected = 0;
        if next.len() < n {
            let roulette = Roulette::new(&self.population)?;
            while next.len() < n && attempts < n * ATTEMPTS_PER_SLOT {
                attempts += 1;
                let (a, b) = roulette.spin_twice(rng)?;
                let (pa, pb) = (&self.population[a], &self.population[b]);
                let (c, d) = variation::crossover(rng, pa.expr(), pb.expr());
                for mut child in [c, d] {
                    variation::mutate(rng, &mut child, &self.params.mutation, &self.generator)?;
                    let child = Individual::new(child, env)?;
                    if child.duplicates(pa) || child.duplicates(pb) {
                        rejected += 1;
                    } else if next.len() < n {
                        next.push(child);
                    }
                }
            }
        }
        if next.len() < n {
            warn!(
                missing = n - next.len(),
                attempts, "breeding stalled, filling with random individuals"
            );
            while next.len() < n {
                let expr = self.generator.generate(rng, self.params.depth)?;
                next.push(Individual::new(expr, env)?);
            }
        }
        debug!(attempts, rejected, "bred generation");

        // 3. Rank the new generation.
        self.phase = Phase::Evaluating;
        next.sort_by(rank);
        self.population = next;
        self.generation += 1;
        self.record();
        self.phase = if self.stop().is_some() {
            Phase::Terminated
        } else {
            Phase::Selecting
        };
        Ok(())
    }

    /// Step until a termination criterion is met.
    pub fn run<R, E>(&mut self, rng: &mut R, env: &E) -> Result<Outcome, Error>
    where
        R: Rng,
        E: Environment,
    {
        loop {
            if let Some(stop) = self.stop() {
                info!(
                    generation = self.generation,
                    fitness = self.best.fitness,
                    ?stop,
                    "terminated"
                );
                self.phase = Phase::Terminated;
                return Ok(Outcome {
                    best: self.best.clone(),
                    generations: self.generation,
                    solutions: self.solutions.clone(),
                    stop,
                });
            }
            self.step(rng, env)?;
            let best = self.most_fit();
            info!(
                generation = self.generation,
                fitness = best.fitness,
                size = best.size,
                expr = %best.expr,
                "generation complete"
            );
        }
    }

    /// The reason the simulation should stop now, if any.
    pub fn stop(&self) -> Option<Stop> {
        let t = &self.params.termination;
        match (t.fitness_threshold, t.solutions_wanted) {
            (Some(_), Some(wanted)) if self.solutions.len() >= wanted => {
                return Some(Stop::Solutions)
            }
            (Some(threshold), None) if self.best.fitness < threshold => {
                return Some(Stop::Threshold)
            }
            _ => (),
        }
        match t.max_generations {
            Some(max) if self.generation >= max => Some(Stop::Generations),
            _ => None,
        }
    }

    // Track the best-ever individual and any new solutions.
    fn record(&mut self) {
        if let Some(first) = self.population.first() {
            if rank(first, &self.best) == Ordering::Less {
                self.best = first.clone();
            }
        }
        if let Some(threshold) = self.params.termination.fitness_threshold {
            for individual in &self.population {
                if individual.fitness >= threshold {
                    break;
                }
                if !self.solutions.iter().any(|s| s.expr == individual.expr) {
                    debug!(expr = %individual.expr, fitness = individual.fitness, "found solution");
                    self.solutions.push(individual.clone());
                }
            }
        }
    }

    /// View the current generation's population and their fitness.
    ///
    /// This slice will always be sorted by its fitness, best first.
    pub fn population(&self) -> &[Individual] {
        &self.population
    }

    /// The best individual of the current generation.
    pub fn most_fit(&self) -> &Individual {
        &self.population[0]
    }

    /// The worst individual of the current generation.
    pub fn least_fit(&self) -> &Individual {
        &self.population[self.population.len() - 1]
    }

    /// The best individual seen in any generation so far.
    pub fn best(&self) -> &Individual {
        &self.best
    }

    /// Distinct individuals found below the fitness threshold so far.
    pub fn solutions(&self) -> &[Individual] {
        &self.solutions
    }

    /// The number of generations bred so far.
    pub fn generation(&self) -> usize {
        self.generation
    }

    /// The state of the generational loop.
    pub fn phase(&self) -> Phase {
        self.phase
    }
}
