//! Agent state model.
//!
//! An [`Agent`] only changes through [`Agent::seed`], [`Agent::set_state`]
//! and the two-phase [`Agent::stage`] / [`Agent::commit`] pair driven by the
//! engine. Predecessors are stored as ids; the [`Network`](crate::network::Network)
//! owns the agents they refer to.

use crate::error::{Error, Result};
use crate::rule::Candidate;
use serde::{Deserialize, Serialize};

/// Agent identifier, unique within a population.
pub type AgentId = usize;

/// Hands out monotonically increasing agent ids for one population.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IdAllocator {
    next: AgentId,
}

impl IdAllocator {
    /// Create an allocator whose first id is 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the next unused id.
    pub fn allocate(&mut self) -> AgentId {
        let id = self.next;
        self.next += 1;
        id
    }
}

/// Outcome of an agent's last evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateStatus {
    NoChange,
    Changed,
    NotEvaluated,
}

impl UpdateStatus {
    /// Integer code used in step records.
    pub fn code(self) -> i8 {
        match self {
            Self::NoChange => 0,
            Self::Changed => 1,
            Self::NotEvaluated => -1,
        }
    }

    /// Inverse of [`UpdateStatus::code`].
    pub fn from_code(code: i8) -> Option<Self> {
        match code {
            0 => Some(Self::NoChange),
            1 => Some(Self::Changed),
            -1 => Some(Self::NotEvaluated),
            _ => None,
        }
    }
}

/// State held by an agent.
///
/// Binary agents hold a single value in {0, 1}. Vector agents hold an
/// even-length sequence split into a positive bank (first half) and a
/// negative bank (second half).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum State {
    Binary(u8),
    Vector(Vec<f64>),
}

impl State {
    /// Create a binary state, checking its domain.
    pub fn binary(value: u8) -> Result<Self> {
        let state = Self::Binary(value);
        state.check_domain()?;
        Ok(state)
    }

    /// Create an all-zero vector state of the given (even, non-zero) length.
    pub fn zeros(len: usize) -> Result<Self> {
        if len == 0 || len % 2 != 0 {
            return Err(Error::InvalidState(format!(
                "vector state length must be even and non-zero, but is {len}"
            )));
        }
        Ok(Self::Vector(vec![0.0; len]))
    }

    /// Number of scalar values in the state.
    pub fn dim(&self) -> usize {
        match self {
            Self::Binary(_) => 1,
            Self::Vector(values) => values.len(),
        }
    }

    /// Binary value, if this is a binary state.
    pub fn as_binary(&self) -> Option<u8> {
        match self {
            Self::Binary(value) => Some(*value),
            Self::Vector(_) => None,
        }
    }

    /// Vector values, if this is a vector state.
    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Self::Binary(_) => None,
            Self::Vector(values) => Some(values),
        }
    }

    /// Flattened values, as written to step records.
    pub fn values(&self) -> Vec<f64> {
        match self {
            Self::Binary(value) => vec![f64::from(*value)],
            Self::Vector(values) => values.clone(),
        }
    }

    fn check_domain(&self) -> Result<()> {
        if let Self::Binary(value) = self {
            if *value > 1 {
                return Err(Error::InvalidState(format!(
                    "binary state must be 0 or 1, but is {value}"
                )));
            }
        }
        Ok(())
    }

    /// Check that `self` may replace `current`: same kind, same length, valid domain.
    pub(crate) fn check_shape(&self, current: &State) -> Result<()> {
        match (current, self) {
            (Self::Binary(_), Self::Binary(_)) => self.check_domain(),
            (Self::Vector(old), Self::Vector(new)) => {
                if old.len() != new.len() {
                    return Err(Error::LengthMismatch {
                        expected: old.len(),
                        actual: new.len(),
                    });
                }
                Ok(())
            }
            _ => Err(Error::InvalidState(
                "cannot mix binary and vector states".to_string(),
            )),
        }
    }
}

/// Inputs that drove a vector agent's last evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Influence {
    /// First sampled predecessor, if any.
    pub influencer: Option<AgentId>,
    /// Agent state before the evaluation.
    pub input: Vec<f64>,
    /// State of the influencer.
    pub target: Vec<f64>,
}

/// A member of the population.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    id: AgentId,
    state: State,
    predecessors: Vec<AgentId>,
    num_updates: u64,
    pending: Option<State>,
    staged: bool,
    status: UpdateStatus,
    threshold: f64,
    prototype: Option<Vec<u8>>,
    influence: Option<Influence>,
}

impl Agent {
    /// Create a binary agent in state 0.
    pub fn binary(ids: &mut IdAllocator, threshold: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&threshold) {
            return Err(Error::InvalidProbability(threshold));
        }
        Ok(Self::with_state(ids.allocate(), State::Binary(0), threshold, None))
    }

    /// Create a vector agent with an all-zero state of length `len`.
    pub fn vector(ids: &mut IdAllocator, len: usize, prototype: Option<Vec<u8>>) -> Result<Self> {
        let state = State::zeros(len)?;
        if let Some(prototype) = &prototype {
            if prototype.len() != len {
                return Err(Error::LengthMismatch {
                    expected: len,
                    actual: prototype.len(),
                });
            }
        }
        Ok(Self::with_state(ids.allocate(), state, 0.0, prototype))
    }

    fn with_state(id: AgentId, state: State, threshold: f64, prototype: Option<Vec<u8>>) -> Self {
        Self {
            id,
            state,
            predecessors: Vec::new(),
            num_updates: 0,
            pending: None,
            staged: false,
            status: UpdateStatus::NotEvaluated,
            threshold,
            prototype,
            influence: None,
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn predecessors(&self) -> &[AgentId] {
        &self.predecessors
    }

    pub fn num_updates(&self) -> u64 {
        self.num_updates
    }

    pub fn pending(&self) -> Option<&State> {
        self.pending.as_ref()
    }

    pub fn status(&self) -> UpdateStatus {
        self.status
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn prototype(&self) -> Option<&[u8]> {
        self.prototype.as_deref()
    }

    pub fn influence(&self) -> Option<&Influence> {
        self.influence.as_ref()
    }

    pub fn has_predecessor(&self) -> bool {
        !self.predecessors.is_empty()
    }

    /// Replace the predecessor list. Called by the network on refresh.
    pub fn set_predecessors(&mut self, predecessors: Vec<AgentId>) {
        self.predecessors = predecessors;
    }

    /// Set the state directly, bypassing the update counter.
    ///
    /// Any shape mismatch, length included, is an invalid state here.
    pub fn seed(&mut self, value: State) -> Result<()> {
        value.check_shape(&self.state).map_err(|err| match err {
            Error::LengthMismatch { expected, actual } => Error::InvalidState(format!(
                "agent {} seeded with {actual} values, expected {expected}",
                self.id
            )),
            err => err,
        })?;
        self.state = value;
        Ok(())
    }

    /// Replace the state with a validated full copy of `value`.
    ///
    /// Binary assignments must change the value: setting the current value
    /// again is rejected.
    pub fn set_state(&mut self, value: State) -> Result<()> {
        value.check_shape(&self.state)?;
        if value.as_binary().is_some() && value == self.state {
            return Err(Error::InvalidState(format!(
                "agent {} is already in state {:?}",
                self.id, self.state
            )));
        }
        self.state = value;
        Ok(())
    }

    /// Set the update counter; only `current` and `current + 1` are accepted.
    pub fn set_num_updates(&mut self, value: u64) -> Result<()> {
        if value != self.num_updates && value != self.num_updates + 1 {
            return Err(Error::UpdateCount {
                current: self.num_updates,
                requested: value,
            });
        }
        self.num_updates = value;
        Ok(())
    }

    /// Split a vector state into its positive and negative banks.
    pub fn pos_neg_banks(&self) -> Result<(&[f64], &[f64])> {
        let values = self.state.as_vector().ok_or_else(|| {
            Error::InvalidState(format!("agent {} has no state banks", self.id))
        })?;
        Ok(values.split_at(values.len() / 2))
    }

    /// Hold a computed candidate until [`Agent::commit`].
    pub fn stage(&mut self, candidate: Candidate) -> Result<()> {
        if self.staged {
            return Err(Error::InvalidState(format!(
                "agent {} already holds a candidate this tick",
                self.id
            )));
        }
        if let Some(state) = &candidate.state {
            state.check_shape(&self.state)?;
        }
        self.pending = candidate.state;
        self.status = candidate.status;
        self.influence = candidate.influence;
        self.staged = true;
        Ok(())
    }

    /// Apply the staged candidate.
    ///
    /// The counter moves by one when the state changed, or on any evaluation
    /// when `count_unchanged` is set.
    pub fn commit(&mut self, count_unchanged: bool) -> Result<UpdateStatus> {
        if self.status == UpdateStatus::NotEvaluated {
            self.pending = None;
            return Ok(self.status);
        }

        let status = match self.pending.take() {
            Some(value) if value != self.state => {
                self.set_state(value)?;
                UpdateStatus::Changed
            }
            _ => UpdateStatus::NoChange,
        };
        self.status = status;

        if status == UpdateStatus::Changed || count_unchanged {
            self.set_num_updates(self.num_updates + 1)?;
        }
        Ok(status)
    }

    /// Clear per-tick fields so the agent can be staged again.
    pub fn reset_step(&mut self) {
        self.pending = None;
        self.staged = false;
        self.status = UpdateStatus::NotEvaluated;
        self.influence = None;
    }
}
