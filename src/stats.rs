use serde::{Deserialize, Serialize};

/// Online mean and standard deviation (Welford's algorithm).
#[derive(Debug, Default, Clone)]
pub struct Accumulator {
    n_vals: usize,
    mean: f64,
    sq_dev_sum: f64,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorReport {
    pub n_vals: usize,
    pub mean: f64,
    pub std_dev: f64,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, val: f64) {
        self.n_vals += 1;
        let dev_old = val - self.mean;
        self.mean += dev_old / self.n_vals as f64;
        let dev_new = val - self.mean;
        self.sq_dev_sum += dev_old * dev_new;
    }

    pub fn report(&self) -> AccumulatorReport {
        let std_dev = if self.n_vals > 1 {
            (self.sq_dev_sum / (self.n_vals - 1) as f64).sqrt()
        } else {
            f64::NAN
        };
        AccumulatorReport {
            n_vals: self.n_vals,
            mean: if self.n_vals > 0 { self.mean } else { f64::NAN },
            std_dev,
        }
    }
}

/// Time series summarized after discarding its equilibration transient.
#[derive(Debug, Default, Clone)]
pub struct TimeSeries {
    vals: Vec<f64>,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesReport {
    /// Index of the first value kept.
    pub i_equil: usize,
    pub mean: f64,
    pub std_dev: f64,
    /// Standard error of the mean.
    pub sem: f64,
    /// Whether a start before the midpoint was found.
    pub is_equil: bool,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, val: f64) {
        self.vals.push(val);
    }

    pub fn report(&self) -> TimeSeriesReport {
        let i_equil = equilibration_index(&self.vals);
        let tail = &self.vals[i_equil..];
        TimeSeriesReport {
            i_equil,
            mean: mean(tail),
            std_dev: variance(tail).sqrt(),
            sem: blocking_sem(tail),
            is_equil: i_equil < self.vals.len() / 2,
        }
    }
}

fn mean(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::NAN;
    }
    vals.iter().sum::<f64>() / vals.len() as f64
}

fn variance(vals: &[f64]) -> f64 {
    if vals.len() < 2 {
        return f64::NAN;
    }
    let mean = mean(vals);
    let sq_dev_sum: f64 = vals.iter().map(|&val| (val - mean).powi(2)).sum();
    sq_dev_sum / (vals.len() - 1) as f64
}

/// Standard error of the mean of correlated data by Flyvbjerg-Petersen blocking.
///
/// Pairs of values are averaged until the squared error estimate stops
/// growing within its own uncertainty.
fn blocking_sem(vals: &[f64]) -> f64 {
    let mut block = vals.to_vec();
    let mut levels = Vec::new();
    while block.len() >= 2 {
        let n_vals = block.len() as f64;
        let sem2 = variance(&block) / n_vals;
        levels.push((sem2, sem2 * (2.0 / (n_vals - 1.0)).sqrt()));
        block = block
            .chunks_exact(2)
            .map(|pair| 0.5 * (pair[0] + pair[1]))
            .collect();
    }

    for (i_lvl, &(sem2, _)) in levels.iter().enumerate() {
        let plateau = levels[i_lvl..]
            .iter()
            .map(|&(sem2, err)| sem2 - err)
            .fold(f64::NEG_INFINITY, f64::max);
        if sem2 > plateau {
            return sem2.sqrt();
        }
    }
    levels.last().map_or(f64::NAN, |&(sem2, _)| sem2.sqrt())
}

/// Start of the equilibrated part of a series by the marginal standard error rule.
///
/// Candidate starts are `len / 2^k`; the one minimizing the marginal
/// standard error of the remaining values wins, the midpoint by default.
fn equilibration_index(vals: &[f64]) -> usize {
    let n_vals = vals.len();
    if n_vals < 4 {
        return 0;
    }

    let mut best = (f64::INFINITY, n_vals / 2);
    let n_cands = n_vals.ilog2();
    for k in (1..=n_cands).rev() {
        let i_equil = n_vals >> k;
        let tail = &vals[i_equil..];
        let n_tail = tail.len();
        let mse = variance(tail) * (n_tail - 1) as f64 / (n_tail * n_tail) as f64;
        if mse < best.0 {
            best = (mse, i_equil);
        }
    }
    best.1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulator_matches_batch_statistics() {
        let vals = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let mut acc = Accumulator::new();
        for val in vals {
            acc.add(val);
        }
        let report = acc.report();
        assert_eq!(report.n_vals, 8);
        assert!((report.mean - 5.0).abs() < 1e-12);
        assert!((report.std_dev - variance(&vals).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn empty_accumulator_reports_nan() {
        let report = Accumulator::new().report();
        assert_eq!(report.n_vals, 0);
        assert!(report.mean.is_nan());
        assert!(report.std_dev.is_nan());
    }

    #[test]
    fn constant_series_has_zero_error() {
        let mut series = TimeSeries::new();
        for _ in 0..64 {
            series.push(0.25);
        }
        let report = series.report();
        assert_eq!(report.mean, 0.25);
        assert_eq!(report.std_dev, 0.0);
        assert_eq!(report.sem, 0.0);
    }

    #[test]
    fn transient_is_discarded() {
        let mut series = TimeSeries::new();
        for i in 0..128 {
            series.push(if i < 16 { 10.0 } else { f64::from(i % 2) });
        }
        let report = series.report();
        assert!(report.i_equil >= 16);
        assert!(report.is_equil);
        assert!((report.mean - 0.5).abs() < 0.05);
    }

    #[test]
    fn short_series_are_kept_whole() {
        let mut series = TimeSeries::new();
        series.push(1.0);
        series.push(3.0);
        let report = series.report();
        assert_eq!(report.i_equil, 0);
        assert_eq!(report.mean, 2.0);
        assert!(TimeSeries::new().report().mean.is_nan());
    }
}
