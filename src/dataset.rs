//! Delimited numeric samples and the fitness measure computed over them.
//!
//! Every row holds the input values followed by the target output. Inputs are named `x1, x2, ...`
//! in column order. Rows that do not parse as numbers are skipped, which also takes care of
//! header lines.

use rand::Rng;
use serde::Deserialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::Error;
use crate::ga::{Environment, INVALID_FITNESS};
use crate::gp::expr::{Bindings, Expr, DIVIDE_BY_ZERO};
use crate::gp::gen::variable_names;

/// One row of a dataset.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    /// The named input values.
    pub inputs: Bindings,
    /// The expected output.
    pub output: f64,
}

/// How residuals are combined into a fitness value.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// The sum of squared residuals.
    #[default]
    SumSquared,
    /// The square root of the summed mean squared residuals of the included splits.
    RootMeanSquared,
}

/// Samples partitioned into training and test subsets.
#[derive(Clone, Debug)]
pub struct Dataset {
    training: Vec<Sample>,
    test: Vec<Sample>,
    variables: usize,
    include_test: bool,
    metric: Metric,
    division_sentinel: f64,
}

impl Sample {
    /// A sample from input values in column order.
    pub fn new(inputs: &[f64], output: f64) -> Self {
        let inputs = variable_names(inputs.len())
            .into_iter()
            .zip(inputs.iter().copied())
            .collect();
        Sample { inputs, output }
    }
}

/// Parse delimited rows into samples.
///
/// Rows containing a field that is not a number, or whose width differs from the first
/// accepted row, are skipped.
pub fn parse_samples<R>(reader: R, delimiter: u8) -> Result<Vec<Sample>, Error>
where
    R: Read,
{
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(delimiter)
        .from_reader(reader);

    let mut samples = Vec::new();
    let mut width = None;
    for (row, result) in rdr.records().enumerate() {
        let record = match result {
            Ok(record) => record,
            Err(err) if err.is_io_error() => return Err(err.into()),
            Err(err) => {
                debug!(row, %err, "skipping unreadable row");
                continue;
            }
        };
        let values: Result<Vec<f64>, _> = record.iter().map(str::parse::<f64>).collect();
        let values = match values {
            Ok(values) if !values.is_empty() => values,
            _ => {
                debug!(row, ?record, "skipping malformed row");
                continue;
            }
        };
        if *width.get_or_insert(values.len()) != values.len() {
            debug!(row, fields = values.len(), "skipping row of unexpected width");
            continue;
        }
        let (output, inputs) = match values.split_last() {
            Some((output, inputs)) => (*output, inputs),
            None => continue,
        };
        samples.push(Sample::new(inputs, output));
    }
    Ok(samples)
}

/// Read samples from a file, or from every file beneath a directory in file name order.
pub fn read_samples(path: &Path, delimiter: u8) -> Result<Vec<Sample>, Error> {
    let io_err = |source| Error::Io {
        path: path.display().to_string(),
        source,
    };
    if !path.is_dir() {
        let file = File::open(path).map_err(io_err)?;
        return parse_samples(file, delimiter);
    }
    let mut samples = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.map_err(|e| io_err(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let file = File::open(entry.path()).map_err(|source| Error::Io {
            path: entry.path().display().to_string(),
            source,
        })?;
        samples.extend(parse_samples(file, delimiter)?);
    }
    Ok(samples)
}

impl Dataset {
    /// Randomly partition `samples`, placing each into training with `training_probability`.
    ///
    /// At least one sample always lands in training.
    pub fn new<R>(
        rng: &mut R,
        samples: Vec<Sample>,
        training_probability: f64,
        source: &str,
    ) -> Result<Self, Error>
    where
        R: Rng,
    {
        if samples.is_empty() {
            return Err(Error::EmptyDataset(source.to_string()));
        }
        let variables = samples.iter().map(|s| s.inputs.len()).max().unwrap_or(0);
        let p = training_probability.clamp(0.0, 1.0);
        let (mut training, mut test): (Vec<_>, Vec<_>) =
            samples.into_iter().partition(|_| rng.gen_bool(p));
        if training.is_empty() {
            training.push(test.remove(0));
        }
        info!(
            source,
            training = training.len(),
            test = test.len(),
            variables,
            "loaded dataset"
        );
        Ok(Dataset {
            training,
            test,
            variables,
            include_test: false,
            metric: Metric::default(),
            division_sentinel: DIVIDE_BY_ZERO,
        })
    }

    /// Load and partition the samples at `path`.
    pub fn load<R>(
        rng: &mut R,
        path: &Path,
        delimiter: u8,
        training_probability: f64,
    ) -> Result<Self, Error>
    where
        R: Rng,
    {
        let samples = read_samples(path, delimiter)?;
        Self::new(rng, samples, training_probability, &path.display().to_string())
    }

    /// Whether fitness used for selection also covers the test samples.
    pub fn include_test(mut self, include_test: bool) -> Self {
        self.include_test = include_test;
        self
    }

    /// How residuals are combined.
    pub fn metric(mut self, metric: Metric) -> Self {
        self.metric = metric;
        self
    }

    /// The value substituted for divisions by zero during evaluation.
    pub fn division_sentinel(mut self, sentinel: f64) -> Self {
        self.division_sentinel = sentinel;
        self
    }

    /// The training samples.
    pub fn training(&self) -> &[Sample] {
        &self.training
    }

    /// The test samples.
    pub fn test(&self) -> &[Sample] {
        &self.test
    }

    /// The number of input columns.
    pub fn variable_count(&self) -> usize {
        self.variables
    }

    /// The error of `expr` over the training samples, plus the test samples if requested.
    ///
    /// Any division by zero during evaluation makes the whole score [`INVALID_FITNESS`].
    pub fn score(&self, expr: &Expr, include_test: bool) -> Result<f64, Error> {
        let mut total = match self.split_error(expr, &self.training)? {
            Some(e) => e,
            None => return Ok(INVALID_FITNESS),
        };
        if include_test {
            match self.split_error(expr, &self.test)? {
                Some(e) => total += e,
                None => return Ok(INVALID_FITNESS),
            }
        }
        Ok(match self.metric {
            Metric::SumSquared => total,
            Metric::RootMeanSquared => total.sqrt(),
        })
    }

    // The split's contribution before any final root. `None` when evaluation was degenerate.
    fn split_error(&self, expr: &Expr, samples: &[Sample]) -> Result<Option<f64>, Error> {
        let mut sum = 0.0;
        for sample in samples {
            let eval = expr.evaluate_with(&sample.inputs, self.division_sentinel)?;
            if eval.degenerate {
                return Ok(None);
            }
            let residual = sample.output - eval.value;
            sum += residual * residual;
        }
        let error = match self.metric {
            Metric::SumSquared => sum,
            Metric::RootMeanSquared if samples.is_empty() => 0.0,
            Metric::RootMeanSquared => sum / samples.len() as f64,
        };
        Ok(Some(error))
    }
}

impl Environment for Dataset {
    fn fitness(&self, expr: &Expr) -> Result<f64, Error> {
        self.score(expr, self.include_test)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;
    use std::io::Write;

    const CSV: &str = "x,y\n1, 3\n2,5\nnot,a number\n3,7\n4,9,1\n\n5,11\n";

    fn line() -> Dataset {
        let samples = parse_samples(CSV.as_bytes(), b',').unwrap();
        let mut rng = XorShiftRng::seed_from_u64(31);
        Dataset::new(&mut rng, samples, 1.0, "line").unwrap()
    }

    #[test]
    fn skips_malformed_rows() {
        let samples = parse_samples(CSV.as_bytes(), b',').unwrap();
        assert_eq!(samples.len(), 4);
        assert_eq!(samples[0], Sample::new(&[1.0], 3.0));
        assert_eq!(samples[3].inputs["x1"], 5.0);
        assert_eq!(samples[3].output, 11.0);
    }

    #[test]
    fn names_inputs_in_column_order() {
        let samples = parse_samples("1;2;3;10\n".as_bytes(), b';').unwrap();
        let inputs = &samples[0].inputs;
        assert_eq!((inputs["x1"], inputs["x2"], inputs["x3"]), (1.0, 2.0, 3.0));
        assert_eq!(samples[0].output, 10.0);
    }

    #[test]
    fn sums_squared_residuals() {
        let data = line();
        let exact = Expr::variable("x1") * 2.0 + 1.0;
        assert_eq!(data.score(&exact, false).unwrap(), 0.0);
        // Residuals of `2 * x1` are all 1.
        let off = Expr::variable("x1") * 2.0;
        assert_eq!(data.fitness(&off).unwrap(), 4.0);
    }

    #[test]
    fn root_mean_squared() {
        let data = line().metric(Metric::RootMeanSquared);
        let off = Expr::variable("x1") * 2.0 - 1.0;
        assert_relative_eq!(data.fitness(&off).unwrap(), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn root_mean_squared_combines_splits_before_the_root() {
        let samples: Vec<Sample> = (0..8)
            .map(|x| Sample::new(&[x as f64], 2.0 * x as f64 + 1.0))
            .collect();
        let (training, test) = samples.split_at(4);
        let data = Dataset {
            training: training.to_vec(),
            test: test.to_vec(),
            variables: 1,
            include_test: true,
            metric: Metric::RootMeanSquared,
            division_sentinel: DIVIDE_BY_ZERO,
        };

        // Every residual is 1, so each split has a mean squared residual of 1.
        let off = Expr::variable("x1") * 2.0;
        assert_relative_eq!(data.score(&off, false).unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(data.fitness(&off).unwrap(), 2f64.sqrt(), epsilon = 1e-12);

        let sum = data.metric(Metric::SumSquared);
        assert_eq!(sum.fitness(&off).unwrap(), 8.0);
    }

    #[test]
    fn degenerate_evaluation_is_invalid() {
        let data = line();
        let expr = Expr::coefficient(1.0) / (Expr::variable("x1") - 3.0);
        assert_eq!(data.fitness(&expr).unwrap(), INVALID_FITNESS);
    }

    #[test]
    fn unbound_variables_propagate() {
        let data = line();
        assert!(matches!(
            data.fitness(&Expr::variable("x2")),
            Err(Error::UnboundVariable(_))
        ));
    }

    #[test]
    fn training_is_never_empty() {
        let samples = parse_samples(CSV.as_bytes(), b',').unwrap();
        let mut rng = XorShiftRng::seed_from_u64(32);
        let data = Dataset::new(&mut rng, samples, 0.0, "none").unwrap();
        assert_eq!(data.training().len(), 1);
        assert_eq!(data.test().len(), 3);
        assert_eq!(data.variable_count(), 1);

        let data = data.include_test(true);
        let off = Expr::variable("x1") * 2.0;
        assert_eq!(data.fitness(&off).unwrap(), 4.0);
    }

    #[test]
    fn empty_input_is_an_error() {
        let mut rng = XorShiftRng::seed_from_u64(33);
        assert!(matches!(
            Dataset::new(&mut rng, vec![], 0.5, "empty"),
            Err(Error::EmptyDataset(_))
        ));
    }

    #[test]
    fn reads_files_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = File::create(dir.path().join("a.csv")).unwrap();
        writeln!(a, "1,2\n2,4").unwrap();
        let mut b = File::create(dir.path().join("b.csv")).unwrap();
        writeln!(b, "3,6").unwrap();

        let one = read_samples(&dir.path().join("b.csv"), b',').unwrap();
        assert_eq!(one, vec![Sample::new(&[3.0], 6.0)]);

        let all = read_samples(dir.path(), b',').unwrap();
        let outputs: Vec<f64> = all.iter().map(|s| s.output).collect();
        assert_eq!(outputs, [2.0, 4.0, 6.0]);

        assert!(matches!(
            read_samples(&dir.path().join("missing.csv"), b','),
            Err(Error::Io { .. })
        ));
    }
}
