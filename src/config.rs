use crate::model::AgentId;
use crate::rule::UpdateRule;
use crate::solver::SolverConfig;
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    fs,
    ops::{Bound, RangeBounds},
    path::{Path, PathBuf},
};

/// Simulation configuration parameters.
///
/// Loaded from a TOML file and validated before use.
/// See [`Config::from_file`] for loading.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seed of the random number generator; drawn from the OS when absent.
    pub seed: Option<u64>,

    pub model: ModelConfig,
    pub network: NetworkConfig,
    #[serde(default)]
    pub init: InitConfig,
    pub output: OutputConfig,

    /// External solver, required by the `external_*` algorithms.
    pub solver: Option<SolverConfig>,
}

/// Update rule and scheduling parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Update rule selector.
    pub algorithm: UpdateRule,
    /// Scheduling discipline.
    pub update: UpdateMode,
    /// Threshold of the Watts rules, required by them.
    pub threshold: Option<f64>,
    /// Whether a Watts evaluation without a state change counts as an update.
    #[serde(default = "default_count_unchanged")]
    pub count_unchanged: bool,
    /// Agents selected per tick.
    #[serde(default)]
    pub selection: Selection,
}

fn default_count_unchanged() -> bool {
    true
}

/// How selected agents are updated within a tick.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateMode {
    /// Compute and commit one agent at a time.
    Sequential,
    /// Compute every candidate from the pre-tick state, then commit them all.
    Simultaneous,
}

/// Number of agents drawn per tick.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selection {
    Count(usize),
    Fraction(f64),
}

impl Default for Selection {
    fn default() -> Self {
        Self::Fraction(1.0)
    }
}

impl Selection {
    /// Number of agents to draw from a population of `n_agents`.
    pub fn size(&self, n_agents: usize) -> usize {
        match *self {
            Self::Count(count) => count.min(n_agents),
            Self::Fraction(fraction) => ((fraction * n_agents as f64).round() as usize).min(n_agents),
        }
    }
}

/// Population and edges.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Number of agents, with ids `0..n_agents`.
    pub n_agents: usize,
    /// Directed `[source, target]` edges.
    #[serde(default)]
    pub edges: Vec<[AgentId; 2]>,
    /// File with one `source target` edge per line, relative to the simulation directory.
    pub edge_file: Option<PathBuf>,
    /// Probability of each ordered pair of distinct agents being joined by a random edge.
    pub prob_edge: Option<f64>,
}

impl NetworkConfig {
    /// Explicit edges followed by the edges listed in `edge_file`.
    pub fn collect_edges<P: AsRef<Path>>(&self, base_dir: P) -> Result<Vec<[AgentId; 2]>> {
        let mut edges = self.edges.clone();
        if let Some(edge_file) = &self.edge_file {
            let file = base_dir.as_ref().join(edge_file);
            let text =
                fs::read_to_string(&file).with_context(|| format!("failed to read {file:?}"))?;
            edges.extend(parse_edges(&text).with_context(|| format!("failed to parse {file:?}"))?);
        }
        for &[source, target] in &edges {
            check_num(source, 0..self.n_agents).context("invalid edge source")?;
            check_num(target, 0..self.n_agents).context("invalid edge target")?;
        }
        Ok(edges)
    }
}

/// Parse an edge list: `source target` per line, `#` starts a comment.
pub fn parse_edges(text: &str) -> Result<Vec<[AgentId; 2]>> {
    let mut edges = Vec::new();
    for (line_idx, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default().trim();
        if line.is_empty() {
            continue;
        }
        let ids = line
            .split_whitespace()
            .map(|field| field.parse::<AgentId>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("invalid agent id on line {}", line_idx + 1))?;
        let [source, target] = ids[..] else {
            bail!("line {} must hold 2 ids, but holds {}", line_idx + 1, ids.len());
        };
        edges.push([source, target]);
    }
    Ok(edges)
}

/// Initial condition parameters.
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
pub struct InitConfig {
    /// Probability of a binary agent starting in state 1.
    #[serde(default)]
    pub prob_seed: f64,
    /// Binary agents starting in state 1.
    #[serde(default)]
    pub seed_agents: Vec<AgentId>,

    /// Prototype pool of vector agents.
    #[serde(default)]
    pub prototypes: Vec<Vec<u8>>,
    /// Mutation probability applied to a sampled prototype to seed an agent.
    #[serde(default)]
    pub prob_mut: f64,
    /// Mutated prototype copies written per agent when a run is created.
    #[serde(default)]
    pub n_training_examples: usize,
}

/// Output parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Number of ticks written per trajectory file.
    pub ticks_per_file: usize,
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let text = fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;
        Self::parse(&text)
    }

    /// Parse and validate a [`Config`] from TOML text.
    pub fn parse(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    /// Length of the agents' state.
    pub fn state_len(&self) -> usize {
        if self.model.algorithm.is_vector() {
            self.init.prototypes.first().map_or(0, Vec::len)
        } else {
            1
        }
    }

    fn validate(&self) -> Result<()> {
        let n_agents = self.network.n_agents;
        check_num(n_agents, 1..100_000).context("invalid number of agents")?;

        match self.model.threshold {
            Some(threshold) => {
                check_num(threshold, 0.0..=1.0).context("invalid threshold")?;
            }
            None if self.model.algorithm.uses_threshold() => {
                bail!("algorithm {} needs a threshold", self.model.algorithm);
            }
            None => {}
        }
        match self.model.selection {
            Selection::Count(count) => {
                check_num(count, 1..=n_agents).context("invalid selection count")?;
            }
            Selection::Fraction(fraction) => {
                check_num(fraction, (Bound::Excluded(0.0), Bound::Included(1.0)))
                    .context("invalid selection fraction")?;
            }
        }

        for &[source, target] in &self.network.edges {
            check_num(source, 0..n_agents).context("invalid edge source")?;
            check_num(target, 0..n_agents).context("invalid edge target")?;
        }
        if let Some(prob_edge) = self.network.prob_edge {
            check_num(prob_edge, 0.0..=1.0).context("invalid edge probability")?;
        }

        check_num(self.output.ticks_per_file, 1..1_000_000)
            .context("invalid number of ticks per file")?;

        if self.model.algorithm.is_vector() {
            self.validate_vector().context("invalid vector parameters")?;
        } else {
            check_num(self.init.prob_seed, 0.0..=1.0).context("invalid seed probability")?;
            for &id in &self.init.seed_agents {
                check_num(id, 0..n_agents).context("invalid seed agent")?;
            }
        }

        Ok(())
    }

    fn validate_vector(&self) -> Result<()> {
        let algorithm = &self.model.algorithm;
        let Some(solver) = &self.solver else {
            bail!("algorithm {algorithm} needs a [solver] section");
        };

        let state_len = self.state_len();
        if state_len == 0 || state_len % 2 != 0 {
            bail!("prototype length must be even and non-zero, but is {state_len}");
        }
        for (i_pro, prototype) in self.init.prototypes.iter().enumerate() {
            check_bits(prototype, state_len).with_context(|| format!("invalid prototype {i_pro}"))?;
        }
        check_num(self.init.prob_mut, 0.0..=1.0).context("invalid mutation probability")?;

        let n_values = solver.window.n_values();
        if n_values != state_len {
            bail!("output window yields {n_values} values, but the state length is {state_len}");
        }
        if let Some(rows) = &solver.manual_inputs {
            if rows.is_empty() {
                bail!("manual inputs must hold at least one row");
            }
            for (i_row, row) in rows.iter().enumerate() {
                check_len(row, state_len).with_context(|| format!("invalid manual input {i_row}"))?;
            }
        }

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}

fn check_len<T>(vec: &[T], exp_len: usize) -> Result<()> {
    let len = vec.len();
    if len != exp_len {
        bail!("vector length must be {exp_len}, but is {len}");
    }
    Ok(())
}

fn check_bits(vec: &[u8], exp_len: usize) -> Result<()> {
    check_len(vec, exp_len)?;
    if vec.iter().any(|&bit| bit > 1) {
        bail!("vector must hold only 0 and 1");
    }
    Ok(())
}
