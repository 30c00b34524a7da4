//! External solver collaborator.
//!
//! The solver is a black box: it receives influence examples and the agent's
//! own state, and answers with the agent's new state vector. [`ProcessSolver`]
//! talks to an external program through exchange files; any closure with the
//! right signature is a solver too.

use crate::error::{Error, Result};
use crate::exchange::{self, ExampleTag, OutputWindow};
use crate::model::Agent;
use crate::sampling::InfluenceExample;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs, io,
    path::{Path, PathBuf},
    process::Command,
};

/// Input of one solver evaluation.
pub struct SolverRequest<'a> {
    /// Agent marked for update.
    pub agent: &'a Agent,
    /// The agent's own state followed by the sampled influences.
    pub examples: &'a [InfluenceExample],
}

/// Computes a new state vector for an agent.
pub trait Solver {
    fn evaluate(&mut self, request: &SolverRequest<'_>) -> Result<Vec<f64>>;
}

impl<F> Solver for F
where
    F: FnMut(&SolverRequest<'_>) -> Result<Vec<f64>>,
{
    fn evaluate(&mut self, request: &SolverRequest<'_>) -> Result<Vec<f64>> {
        self(request)
    }
}

/// Variables passed to the solver process.
///
/// The positive bank is bound to `p0, p1, ...`, the negative bank to
/// `n0, n1, ...`, the zero-padded agent id to `a` and the training
/// criterion, when set, to `c`.
pub fn env_bindings(agent: &Agent, criterion: Option<f64>) -> Result<BTreeMap<String, String>> {
    let (pos, neg) = agent.pos_neg_banks()?;
    let mut env = BTreeMap::new();
    env.insert("a".to_string(), format!("{:06}", agent.id()));
    if let Some(criterion) = criterion {
        env.insert("c".to_string(), criterion.to_string());
    }
    for (i, val) in pos.iter().enumerate() {
        env.insert(format!("p{i}"), val.to_string());
    }
    for (i, val) in neg.iter().enumerate() {
        env.insert(format!("n{i}"), val.to_string());
    }
    Ok(env)
}

/// How to invoke the external solver program.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Solver executable.
    pub program: PathBuf,
    /// Arguments, typically the solver script to run.
    #[serde(default)]
    pub args: Vec<String>,

    /// Exchange file the examples are written to.
    pub ex_file: PathBuf,
    /// Output file the new state is read from.
    pub out_file: PathBuf,
    /// Line window of the new state in the output file.
    pub window: OutputWindow,
    /// Tag written in front of example values.
    #[serde(default)]
    pub tag: ExampleTag,

    /// Training criterion bound to `c`.
    pub criterion: Option<f64>,
    /// Influence vectors sampled instead of live predecessors.
    pub manual_inputs: Option<Vec<Vec<f64>>>,
}

/// Solver backed by an external process and exchange files.
///
/// Relative paths in the configuration resolve against `base_dir`, which is
/// also the working directory of the process.
pub struct ProcessSolver {
    cfg: SolverConfig,
    base_dir: PathBuf,
}

impl ProcessSolver {
    pub fn new<P: AsRef<Path>>(cfg: SolverConfig, base_dir: P) -> Self {
        Self {
            cfg,
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        self.base_dir.join(path)
    }
}

impl Solver for ProcessSolver {
    fn evaluate(&mut self, request: &SolverRequest<'_>) -> Result<Vec<f64>> {
        let ex_file = self.resolve(&self.cfg.ex_file);
        let out_file = self.resolve(&self.cfg.out_file);

        exchange::write_exchange_file(
            &ex_file,
            &exchange::format_examples(request.examples, self.cfg.tag),
        )?;

        // A leftover output file must not pass for this evaluation's result.
        match fs::remove_file(&out_file) {
            Err(err) if err.kind() != io::ErrorKind::NotFound => {
                return Err(Error::solver_io(format!("failed to remove {out_file:?}"), err));
            }
            _ => {}
        }

        let env = env_bindings(request.agent, self.cfg.criterion)?;
        let program = &self.cfg.program;
        log::debug!("running {program:?} for agent {}", request.agent.id());
        let status = Command::new(program)
            .args(&self.cfg.args)
            .envs(&env)
            .current_dir(&self.base_dir)
            .status()
            .map_err(|err| Error::solver_io(format!("failed to run {program:?}"), err))?;
        if !status.success() {
            return Err(Error::solver(format!("{program:?} exited with {status}")));
        }

        exchange::read_output(&out_file, &self.cfg.window)
    }
}
