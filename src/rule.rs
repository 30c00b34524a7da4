//! Update rules.
//!
//! A rule reads an agent and its predecessors and proposes a [`Candidate`]
//! without mutating anything; the engine decides when the candidate is
//! committed.

use crate::error::{Error, Result};
use crate::model::{Agent, Influence, State, UpdateStatus};
use crate::sampling::influence_examples;
use crate::solver::{Solver, SolverRequest};
use rand::Rng;
use rand::seq::IndexedRandom;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Probability of adopting a differing predecessor's state under [`UpdateRule::DefaultContagion`].
pub const ADOPTION_PROB: f64 = 0.7;

/// Proposed outcome of one agent evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// New state, `None` to keep the current one.
    pub state: Option<State>,
    pub status: UpdateStatus,
    pub influence: Option<Influence>,
}

impl Candidate {
    fn keep() -> Self {
        Self {
            state: None,
            status: UpdateStatus::NoChange,
            influence: None,
        }
    }

    fn not_evaluated() -> Self {
        Self {
            state: None,
            status: UpdateStatus::NotEvaluated,
            influence: None,
        }
    }

    fn change(state: State) -> Self {
        Self {
            state: Some(state),
            status: UpdateStatus::Changed,
            influence: None,
        }
    }
}

/// How many influences the external solver sees per update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfluencePick {
    /// One random predecessor.
    Single,
    /// Every predecessor, in random order.
    All,
}

/// Strategy used to compute an agent's candidate state.
///
/// Serialized as its selector string, so unknown selectors fail when a
/// configuration is parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum UpdateRule {
    DefaultContagion,
    WattsThreshold,
    WattsThresholdReversible,
    ExternalSolver(InfluencePick),
}

impl FromStr for UpdateRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "default" => Ok(Self::DefaultContagion),
            "threshold_watts" => Ok(Self::WattsThreshold),
            "threshold_watts_flip" => Ok(Self::WattsThresholdReversible),
            "external_random_1" => Ok(Self::ExternalSolver(InfluencePick::Single)),
            "external_random_all" => Ok(Self::ExternalSolver(InfluencePick::All)),
            _ => Err(Error::UnknownAlgorithm(s.to_string())),
        }
    }
}

impl TryFrom<String> for UpdateRule {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<UpdateRule> for String {
    fn from(rule: UpdateRule) -> Self {
        rule.to_string()
    }
}

impl fmt::Display for UpdateRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::DefaultContagion => "default",
            Self::WattsThreshold => "threshold_watts",
            Self::WattsThresholdReversible => "threshold_watts_flip",
            Self::ExternalSolver(InfluencePick::Single) => "external_random_1",
            Self::ExternalSolver(InfluencePick::All) => "external_random_all",
        };
        write!(f, "{name}")
    }
}

impl UpdateRule {
    /// Whether the rule operates on vector agents.
    pub fn is_vector(&self) -> bool {
        matches!(self, Self::ExternalSolver(_))
    }

    /// Whether the rule compares neighbour proportions against a threshold.
    pub fn uses_threshold(&self) -> bool {
        matches!(self, Self::WattsThreshold | Self::WattsThresholdReversible)
    }

    /// Whether an evaluation without a state change still counts as an update.
    ///
    /// Contagion only counts real changes; the solver rule always counts;
    /// the Watts rules follow `watts_count_unchanged`.
    pub fn counts_unchanged(&self, watts_count_unchanged: bool) -> bool {
        match self {
            Self::DefaultContagion => false,
            Self::WattsThreshold | Self::WattsThresholdReversible => watts_count_unchanged,
            Self::ExternalSolver(_) => true,
        }
    }

    /// Compute the agent's candidate state from its predecessors.
    ///
    /// An agent without predecessors is left alone and reported as
    /// [`UpdateStatus::NotEvaluated`]. Solver failures are reported the same
    /// way so the caller can move on to other agents.
    pub fn compute<R: Rng + ?Sized>(
        &self,
        agent: &Agent,
        predecessors: &[&Agent],
        rng: &mut R,
        solver: Option<&mut dyn Solver>,
        manual_inputs: Option<&[Vec<f64>]>,
    ) -> Result<Candidate> {
        if predecessors.is_empty() {
            log::warn!("agent {} has no predecessors", agent.id());
            return Ok(Candidate::not_evaluated());
        }

        match self {
            Self::DefaultContagion => default_contagion(agent, predecessors, rng),
            Self::WattsThreshold => watts_threshold(agent, predecessors),
            Self::WattsThresholdReversible => watts_threshold_reversible(agent, predecessors),
            Self::ExternalSolver(pick) => {
                let solver = solver.ok_or_else(|| {
                    Error::solver(format!("rule {self} needs an external solver"))
                })?;
                external_solver(agent, predecessors, *pick, rng, solver, manual_inputs)
            }
        }
    }
}

fn binary_state(agent: &Agent) -> Result<u8> {
    agent.state().as_binary().ok_or_else(|| {
        Error::InvalidState(format!("agent {} does not hold a binary state", agent.id()))
    })
}

fn default_contagion<R: Rng + ?Sized>(
    agent: &Agent,
    predecessors: &[&Agent],
    rng: &mut R,
) -> Result<Candidate> {
    let state = binary_state(agent)?;
    let Some(picked) = predecessors.choose(rng) else {
        return Ok(Candidate::not_evaluated());
    };
    let picked_state = binary_state(picked)?;

    if picked_state == state {
        log::trace!("agent {} matches predecessor {}", agent.id(), picked.id());
        return Ok(Candidate::keep());
    }
    if rng.random::<f64>() < ADOPTION_PROB {
        log::trace!("agent {} adopts state of {}", agent.id(), picked.id());
        Ok(Candidate::change(State::Binary(picked_state)))
    } else {
        Ok(Candidate::keep())
    }
}

fn watts_threshold(agent: &Agent, predecessors: &[&Agent]) -> Result<Candidate> {
    if binary_state(agent)? == 1 {
        return Ok(Candidate::keep());
    }

    let mut n_active = 0;
    for predecessor in predecessors {
        if binary_state(predecessor)? == 1 {
            n_active += 1;
        }
    }
    let prop_active = n_active as f64 / predecessors.len() as f64;
    log::debug!(
        "agent {}: {n_active}/{} active predecessors, threshold {}",
        agent.id(),
        predecessors.len(),
        agent.threshold()
    );

    if prop_active >= agent.threshold() {
        Ok(Candidate::change(State::Binary(1)))
    } else {
        Ok(Candidate {
            state: Some(State::Binary(0)),
            ..Candidate::keep()
        })
    }
}

fn watts_threshold_reversible(agent: &Agent, predecessors: &[&Agent]) -> Result<Candidate> {
    let state = binary_state(agent)?;

    let mut n_opposite = 0;
    for predecessor in predecessors {
        if binary_state(predecessor)? != state {
            n_opposite += 1;
        }
    }
    let prop_opposite = n_opposite as f64 / predecessors.len() as f64;
    log::debug!(
        "agent {}: {n_opposite}/{} opposite predecessors, threshold {}",
        agent.id(),
        predecessors.len(),
        agent.threshold()
    );

    if prop_opposite >= agent.threshold() {
        Ok(Candidate::change(State::Binary(1 - state)))
    } else {
        Ok(Candidate {
            state: Some(State::Binary(state)),
            ..Candidate::keep()
        })
    }
}

fn external_solver<R: Rng + ?Sized>(
    agent: &Agent,
    predecessors: &[&Agent],
    pick: InfluencePick,
    rng: &mut R,
    solver: &mut dyn Solver,
    manual_inputs: Option<&[Vec<f64>]>,
) -> Result<Candidate> {
    let input = agent.state().as_vector().ok_or_else(|| {
        Error::InvalidState(format!("agent {} does not hold a vector state", agent.id()))
    })?;
    let n = match (pick, manual_inputs) {
        (InfluencePick::Single, _) => 1,
        (InfluencePick::All, Some(rows)) => rows.len(),
        (InfluencePick::All, None) => predecessors.len(),
    };
    let examples = influence_examples(agent, predecessors, n, manual_inputs, rng)?;

    let influence = Influence {
        influencer: examples.get(1).and_then(|ex| ex.source),
        input: input.to_vec(),
        target: examples.get(1).map(|ex| ex.values.clone()).unwrap_or_default(),
    };

    let request = SolverRequest {
        agent,
        examples: &examples,
    };
    let values = match solver.evaluate(&request) {
        Ok(values) => values,
        Err(err) => {
            log::error!("agent {} was not updated: {err}", agent.id());
            return Ok(Candidate {
                influence: Some(influence),
                ..Candidate::not_evaluated()
            });
        }
    };
    if values.len() != input.len() {
        return Err(Error::LengthMismatch {
            expected: input.len(),
            actual: values.len(),
        });
    }

    Ok(Candidate {
        state: Some(State::Vector(values)),
        status: UpdateStatus::Changed,
        influence: Some(influence),
    })
}
