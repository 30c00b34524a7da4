use crate::config::Config;
use crate::model::UpdateStatus;
use crate::record::StepRecord;
use crate::stats::{Accumulator, TimeSeries};
use anyhow::{Context, Result, bail};
use std::{
    fs::File,
    io::{BufRead, BufReader, BufWriter},
    path::Path,
};

/// Observable computed from the records of one tick.
pub trait Obs {
    fn update(&mut self, records: &[StepRecord]) -> Result<()>;
    fn report(&self) -> serde_json::Value;
}

/// Fraction of binary agents in state 1.
pub struct Adoption {
    time_series: TimeSeries,
}

impl Adoption {
    pub fn new() -> Self {
        Self {
            time_series: TimeSeries::new(),
        }
    }
}

impl Obs for Adoption {
    fn update(&mut self, records: &[StepRecord]) -> Result<()> {
        let n_active = records
            .iter()
            .filter(|record| record.state.first() == Some(&1.0))
            .count();
        self.time_series.push(n_active as f64 / records.len() as f64);
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        let report = self.time_series.report();
        serde_json::json!({ "adoption": report })
    }
}

/// Fraction of agents whose state changed.
pub struct Changed {
    acc: Accumulator,
}

impl Changed {
    pub fn new() -> Self {
        Self {
            acc: Accumulator::new(),
        }
    }
}

impl Obs for Changed {
    fn update(&mut self, records: &[StepRecord]) -> Result<()> {
        let n_changed = records
            .iter()
            .filter(|record| record.status == UpdateStatus::Changed)
            .count();
        self.acc.add(n_changed as f64 / records.len() as f64);
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        serde_json::json!({ "changed": self.acc.report() })
    }
}

/// Population mean of each state element.
pub struct MeanState {
    acc_vec: Vec<Accumulator>,
}

impl MeanState {
    pub fn new(cfg: &Config) -> Self {
        let mut acc_vec = Vec::new();
        acc_vec.resize_with(cfg.state_len(), Accumulator::new);
        Self { acc_vec }
    }
}

impl Obs for MeanState {
    fn update(&mut self, records: &[StepRecord]) -> Result<()> {
        let state_len = self.acc_vec.len();
        let mut state_sum = vec![0.0; state_len];
        for record in records {
            if record.state.len() != state_len {
                bail!(
                    "state length must be {state_len}, but agent {} has {}",
                    record.id,
                    record.state.len()
                );
            }
            for (sum, val) in state_sum.iter_mut().zip(&record.state) {
                *sum += val;
            }
        }

        for (acc, sum) in self.acc_vec.iter_mut().zip(state_sum) {
            acc.add(sum / records.len() as f64);
        }
        Ok(())
    }

    fn report(&self) -> serde_json::Value {
        let reports: Vec<_> = self.acc_vec.iter().map(|acc| acc.report()).collect();
        serde_json::json!({ "mean_state": reports })
    }
}

/// Reads trajectory files of a run and reports its observables.
pub struct Analyzer {
    n_agents: usize,
    state_len: usize,
    vector: bool,
    obs_ptr_vec: Vec<Box<dyn Obs>>,
}

impl Analyzer {
    pub fn new(cfg: &Config) -> Self {
        let vector = cfg.model.algorithm.is_vector();
        let mut obs_ptr_vec: Vec<Box<dyn Obs>> = Vec::new();
        if !vector {
            obs_ptr_vec.push(Box::new(Adoption::new()));
        }
        obs_ptr_vec.push(Box::new(Changed::new()));
        obs_ptr_vec.push(Box::new(MeanState::new(cfg)));
        Self {
            n_agents: cfg.network.n_agents,
            state_len: cfg.state_len(),
            vector,
            obs_ptr_vec,
        }
    }

    pub fn add_file<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let reader = BufReader::new(file);

        let mut records: Vec<StepRecord> = Vec::with_capacity(self.n_agents);
        for (line_idx, line) in reader.lines().enumerate() {
            let line = line.context("failed to read line")?;
            let record = StepRecord::parse(&line, self.state_len, self.vector)
                .with_context(|| format!("failed to parse line {}", line_idx + 1))?;
            if let Some(first) = records.first() {
                if record.tick != first.tick {
                    bail!("tick {} holds {} records", first.tick, records.len());
                }
            }
            records.push(record);

            if records.len() == self.n_agents {
                for obs in &mut self.obs_ptr_vec {
                    obs.update(&records).context("failed to update observable")?;
                }
                records.clear();
            }
        }
        if !records.is_empty() {
            bail!("file ends inside a tick");
        }
        Ok(())
    }

    pub fn save_results<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let writer = BufWriter::new(file);

        let reports: Vec<_> = self.obs_ptr_vec.iter().map(|obs| obs.report()).collect();
        serde_json::to_writer_pretty(writer, &reports).context("failed to serialize results")?;
        Ok(())
    }
}
