//! Demonstrates evolving an expression that fits samples of `x^2 + 2x + 1`.
//!
//! 1. What is the "Terminal Set"?
//!
//! - The single input `x1`.
//! - Whole-number coefficients in the range -3..=3.
//!
//! 2. What is the "Function Set"?
//!
//! - `+` `-` `*` `/`
//!
//! 3. What is the "Fitness Measure"?
//!
//! - The sum of squared residuals over the training samples.
//!
//! 4. What are the "Control Parameters"?
//!
//! - 200 individuals, 10% of which survive unchanged.
//! - Initial trees of depth 3.
//!
//! 5. What is the "Termination Criterion"?
//!
//! - A fitness below 0.001 OR
//! - 300 generations.

use gpsr::dataset::{Dataset, Sample};
use gpsr::ga::{Parameters, Simulation, Termination};
use gpsr::gp::gen::{variable_names, Generator};
use gpsr::gp::variation::Mutation;
use gpsr::Operator;
use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

// Constants.

const SEED: u64 = 2018;
const SAMPLES: usize = 40;
const POPULATION: usize = 200;
const GENERATIONS: usize = 300;
const THRESHOLD: f64 = 1e-3;

fn target(x: f64) -> f64 {
    x * x + 2.0 * x + 1.0
}

fn main() {
    tracing_subscriber::fmt().compact().init();
    let mut rng = XorShiftRng::seed_from_u64(SEED);

    let samples = (0..SAMPLES)
        .map(|i| {
            let x = -4.0 + 8.0 * i as f64 / SAMPLES as f64;
            Sample::new(&[x], target(x))
        })
        .collect();
    let data = Dataset::new(&mut rng, samples, 0.75, "x^2 + 2x + 1").expect("samples");

    let generator = Generator::new(Operator::ALL.to_vec(), variable_names(1), (-3.0, 3.0))
        .expect("operators")
        .integral(true);
    let params = Parameters {
        population_size: POPULATION,
        survival_rate: 0.1,
        depth: 3,
        mutation: Mutation {
            integral: true,
            ..Mutation::default()
        },
        termination: Termination {
            max_generations: Some(GENERATIONS),
            fitness_threshold: Some(THRESHOLD),
            solutions_wanted: None,
        },
    };

    let mut sim = Simulation::new(&mut rng, &data, generator, params).expect("population");
    let outcome = sim.run(&mut rng, &data).expect("run");

    let best = outcome.best.expr();
    println!("after {} generations: {}", outcome.generations, best);
    println!("training error: {}", outcome.best.fitness());
    println!("test error: {}", data.score(best, true).expect("score"));
}
