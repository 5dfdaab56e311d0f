//! End-to-end runs of the generational loop against small datasets.

use std::fs;

use rand::SeedableRng;
use rand_xorshift::XorShiftRng;

use gpsr::config::Config;
use gpsr::dataset::{Dataset, Sample};
use gpsr::ga::{Simulation, Stop};

fn line(rng: &mut XorShiftRng) -> Dataset {
    let samples = (-5..=5)
        .map(|x| Sample::new(&[x as f64], 2.0 * x as f64 + 1.0))
        .collect();
    Dataset::new(rng, samples, 0.8, "line").unwrap()
}

fn config(toml: &str) -> Config {
    Config::from_toml(toml, "test").unwrap()
}

fn run(seed: u64, config: &Config) -> (String, f64, usize, Stop) {
    let mut rng = XorShiftRng::seed_from_u64(seed);
    let data = line(&mut rng);
    let mut sim = Simulation::new(&mut rng, &data, config.generator().unwrap(), config.parameters())
        .unwrap();
    let initial = sim.best().fitness();
    let outcome = sim.run(&mut rng, &data).unwrap();
    assert!(outcome.best.fitness() <= initial);
    (
        outcome.best.expr().to_string(),
        outcome.best.fitness(),
        outcome.generations,
        outcome.stop,
    )
}

#[test]
fn run_respects_generation_budget() {
    let config = config("population_size = 30\nmax_generations = 8\ndepth = 2\n");
    let (_, _, generations, stop) = run(41, &config);
    assert_eq!(stop, Stop::Generations);
    assert_eq!(generations, 8);
}

#[test]
fn same_seed_same_result() {
    let config = config("population_size = 25\nmax_generations = 5\nintegral = true\n");
    assert_eq!(run(42, &config), run(42, &config));
}

#[test]
fn stops_once_below_threshold() {
    // Any valid random tree on this line scores far below the threshold.
    let config = config(
        "population_size = 60\nmax_generations = 40\nfitness_threshold = 1e12\ndepth = 2\nintegral = true\n",
    );
    let (expr, fitness, generations, stop) = run(43, &config);
    assert_eq!(stop, Stop::Threshold);
    assert_eq!(generations, 0);
    assert!(fitness < 1e12, "{} scored {}", expr, fitness);
}

#[test]
fn unreachable_threshold_exhausts_the_budget() {
    // Fitness is never negative, so nothing falls strictly below zero.
    let config = config(
        "population_size = 30\nmax_generations = 6\nfitness_threshold = 0.0\ndepth = 2\n",
    );
    let (_, fitness, generations, stop) = run(45, &config);
    assert_eq!(stop, Stop::Generations);
    assert_eq!(generations, 6);
    assert!(fitness >= 0.0);
}

#[test]
fn collects_requested_solutions() {
    let config = config(
        "population_size = 40\nmax_generations = 30\nfitness_threshold = 1e12\nsolutions_wanted = 3\n",
    );
    let mut rng = XorShiftRng::seed_from_u64(44);
    let data = line(&mut rng);
    let mut sim =
        Simulation::new(&mut rng, &data, config.generator().unwrap(), config.parameters()).unwrap();
    let outcome = sim.run(&mut rng, &data).unwrap();
    assert_eq!(outcome.stop, Stop::Solutions);
    assert!(outcome.solutions.len() >= 3);
    for (i, a) in outcome.solutions.iter().enumerate() {
        assert!(a.fitness() < 1e12);
        for b in &outcome.solutions[i + 1..] {
            assert_ne!(a.expr(), b.expr());
        }
    }
}

#[test]
fn loads_configuration_and_dataset_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let data_path = dir.path().join("line.csv");
    let rows: String = (0..10)
        .map(|x| format!("{},{}\n", x, 3 * x - 2))
        .collect();
    fs::write(&data_path, format!("x,y\n{}", rows)).unwrap();
    let config_path = dir.path().join("run.toml");
    fs::write(
        &config_path,
        format!(
            "population_size = 20\nmax_generations = 3\nseed = 7\ntraining_probability = 1.0\ndataset = {:?}\n",
            data_path.display().to_string()
        ),
    )
    .unwrap();

    let config = Config::load(&config_path).unwrap();
    let mut rng = XorShiftRng::seed_from_u64(config.seed.unwrap());
    let data = Dataset::load(
        &mut rng,
        config.dataset.as_deref().unwrap(),
        config.delimiter_byte(),
        config.training_probability,
    )
    .unwrap();
    assert_eq!(data.training().len(), 10);
    assert!(data.test().is_empty());
    assert_eq!(data.variable_count(), 1);

    let mut sim =
        Simulation::new(&mut rng, &data, config.generator().unwrap(), config.parameters()).unwrap();
    let outcome = sim.run(&mut rng, &data).unwrap();
    assert_eq!(outcome.generations, 3);
    assert_eq!(outcome.stop, Stop::Generations);
}
