use crate::config::{Config, UpdateMode};
use crate::error::Error;
use crate::exchange::{self, ExampleTag};
use crate::model::{Agent, AgentId, IdAllocator, State};
use crate::mutation::{mutate, training_examples};
use crate::network::Network;
use crate::record::StepRecord;
use crate::rule::Candidate;
use crate::solver::Solver;
use anyhow::{Context, Result};
use rand::prelude::*;
use rand_chacha::ChaCha12Rng;
use rand_distr::Bernoulli;
use rmp_serde::{decode, encode};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
    path::Path,
};

/// Simulation engine.
///
/// Holds the configuration, the agent network, the tick counter and the
/// random number generator, and provides methods to initialize, run, save,
/// and load simulations. The solver is not part of a checkpoint and has to
/// be attached again after loading.
#[derive(Serialize, Deserialize)]
pub struct Engine {
    cfg: Config,
    network: Network,
    rng: ChaCha12Rng,
    tick: u64,
    #[serde(skip)]
    solver: Option<Box<dyn Solver>>,
}

impl Engine {
    /// Create a new `Engine` with the given configuration and a random initial state.
    ///
    /// Relative paths of the configuration resolve against `base_dir`.
    pub fn generate_initial_condition<P: AsRef<Path>>(cfg: Config, base_dir: P) -> Result<Self> {
        let mut rng = match cfg.seed {
            Some(seed) => ChaCha12Rng::seed_from_u64(seed),
            None => ChaCha12Rng::try_from_os_rng()?,
        };

        let n_agents = cfg.network.n_agents;
        let mut ids = IdAllocator::new();
        let mut network = Network::new();

        if cfg.model.algorithm.is_vector() {
            for _ in 0..n_agents {
                let prototype = cfg
                    .init
                    .prototypes
                    .choose(&mut rng)
                    .context("prototype pool is empty")?;
                let bits = mutate(prototype, cfg.init.prob_mut, &mut rng)?;
                let mut agent = Agent::vector(&mut ids, prototype.len(), Some(prototype.clone()))?;
                agent.seed(State::Vector(bits.into_iter().map(f64::from).collect()))?;
                network.add_agent(agent)?;
            }
        } else {
            let seed_dist = Bernoulli::new(cfg.init.prob_seed)?;
            for _ in 0..n_agents {
                let threshold = cfg.model.threshold.unwrap_or_default();
                let mut agent = Agent::binary(&mut ids, threshold)?;
                let seeded = seed_dist.sample(&mut rng);
                if seeded || cfg.init.seed_agents.contains(&agent.id()) {
                    agent.seed(State::Binary(1))?;
                }
                network.add_agent(agent)?;
            }
        }

        let edges = cfg
            .network
            .collect_edges(base_dir)
            .context("failed to collect edges")?;
        for [source, target] in edges {
            network.add_edge(source, target)?;
        }
        if let Some(prob_edge) = cfg.network.prob_edge {
            let edge_dist = Bernoulli::new(prob_edge)?;
            for source in 0..n_agents {
                for target in 0..n_agents {
                    if source != target && edge_dist.sample(&mut rng) {
                        network.add_edge(source, target)?;
                    }
                }
            }
        }
        network.refresh_predecessors();
        log::info!(
            "generated {} agents and {} edges",
            network.len(),
            network.n_edges()
        );

        Ok(Self {
            cfg,
            network,
            rng,
            tick: 0,
            solver: None,
        })
    }

    pub fn cfg(&self) -> &Config {
        &self.cfg
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    /// Mutable access to the network; call
    /// [`Network::refresh_predecessors`] after changing edges.
    pub fn network_mut(&mut self) -> &mut Network {
        &mut self.network
    }

    /// Number of ticks performed so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Attach the solver used by the external solver rules.
    pub fn set_solver(&mut self, solver: Box<dyn Solver>) {
        self.solver = Some(solver);
    }

    /// Perform the simulation and write the step records to a CSV file.
    pub fn perform_simulation<P: AsRef<Path>>(&mut self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);

        let n_ticks = self.cfg.output.ticks_per_file;
        let log_every = (n_ticks / 100).max(1);
        for i_tick in 0..n_ticks {
            let records = self.perform_step().context("failed to perform step")?;
            for record in &records {
                writeln!(writer, "{record}").context("failed to write record")?;
            }

            if (i_tick + 1) % log_every == 0 || i_tick + 1 == n_ticks {
                let progress = 100.0 * (i_tick + 1) as f64 / n_ticks as f64;
                log::info!("completed {progress:06.2}%");
            }
        }

        writer.flush().context("failed to flush writer stream")?;

        Ok(())
    }

    /// Save a checkpoint of the entire engine state.
    ///
    /// Can be used to resume the simulation later.
    pub fn save_checkpoint<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, &self).context("failed to serialize engine")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }

    /// Load a previously saved engine checkpoint.
    pub fn load_checkpoint<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let mut reader = BufReader::new(file);
        let engine = decode::from_read(&mut reader).context("failed to deserialize engine")?;
        Ok(engine)
    }

    /// Write `n_training_examples` mutated prototype copies per vector agent
    /// to `training-NNNNNN.ex` files in `dir`.
    pub fn save_training_examples<P: AsRef<Path>>(&mut self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        let n_examples = self.cfg.init.n_training_examples;
        let tag = self
            .cfg
            .solver
            .as_ref()
            .map_or(ExampleTag::default(), |solver| solver.tag);

        for agent in self.network.agents() {
            let Some(prototype) = agent.prototype() else {
                continue;
            };
            let examples =
                training_examples(prototype, n_examples, self.cfg.init.prob_mut, &mut self.rng)?;
            let file = dir.join(format!("training-{:06}.ex", agent.id()));
            exchange::write_exchange_file(
                &file,
                &exchange::format_training_examples(&examples, tag),
            )?;
        }
        log::info!("wrote training examples to {dir:?}");

        Ok(())
    }

    /// Perform one tick and return one record per agent.
    pub fn perform_step(&mut self) -> Result<Vec<StepRecord>> {
        if self.network.is_stale() {
            return Err(Error::StalePredecessors.into());
        }

        let n_selected = self.cfg.model.selection.size(self.network.len());
        let selected = self
            .network
            .sample_agents(n_selected, &mut self.rng)
            .context("failed to select agents")?;

        let count_unchanged = self
            .cfg
            .model
            .algorithm
            .counts_unchanged(self.cfg.model.count_unchanged);

        match self.cfg.model.update {
            UpdateMode::Sequential => {
                for &id in &selected {
                    let candidate = self.compute_candidate(id)?;
                    let agent = self.network.agent_mut(id)?;
                    agent.stage(candidate)?;
                    agent.commit(count_unchanged)?;
                }
            }
            UpdateMode::Simultaneous => {
                // Every candidate must be computed before the first commit.
                let mut candidates = Vec::with_capacity(selected.len());
                for &id in &selected {
                    candidates.push((id, self.compute_candidate(id)?));
                }
                for (id, candidate) in candidates {
                    self.network.agent_mut(id)?.stage(candidate)?;
                }
                for &id in &selected {
                    self.network.agent_mut(id)?.commit(count_unchanged)?;
                }
            }
        }

        let tick = self.tick;
        let records = self
            .network
            .agents()
            .iter()
            .map(|agent| StepRecord::from_agent(tick, agent))
            .collect();

        for agent in self.network.agents_mut() {
            agent.reset_step();
        }
        self.tick += 1;
        log::debug!("performed tick {tick} over {n_selected} agents");

        Ok(records)
    }

    fn compute_candidate(&mut self, id: AgentId) -> Result<Candidate> {
        let agent = self.network.agent(id)?;
        let predecessors = self.network.predecessors_of(id)?;
        let manual_inputs = self
            .cfg
            .solver
            .as_ref()
            .and_then(|solver| solver.manual_inputs.as_deref());
        let solver: Option<&mut dyn Solver> = match &mut self.solver {
            Some(solver) => Some(solver.as_mut()),
            None => None,
        };

        let candidate = self
            .cfg
            .model
            .algorithm
            .compute(agent, &predecessors, &mut self.rng, solver, manual_inputs)
            .with_context(|| format!("failed to update agent {id}"))?;
        Ok(candidate)
    }
}
