//! Error types of the diffusion core.
//!
//! Every variant except [`Error::Solver`] signals a contract violation by
//! the caller or the configuration: it fails the operation that raised it and
//! is never corrected silently. Solver failures are scoped to a single agent
//! update and the engine records them instead of aborting the run.

use crate::model::AgentId;
use thiserror::Error;

/// Errors raised by the diffusion core.
#[derive(Error, Debug)]
pub enum Error {
    /// State value outside the agent's domain, or a no-op binary assignment.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Vector state of the wrong length.
    #[error("state length must be {expected}, but is {actual}")]
    LengthMismatch {
        /// Length of the current state.
        expected: usize,
        /// Length of the rejected value.
        actual: usize,
    },

    /// Probability outside `[0, 1]`.
    #[error("probability must be in [0, 1], but is {0}")]
    InvalidProbability(f64),

    /// Bit value other than 0 or 1.
    #[error("bit must be 0 or 1, but is {0}")]
    InvalidBit(u8),

    /// Agent id already present in the population.
    #[error("agent id {0} is already assigned")]
    DuplicateId(AgentId),

    /// Agent id not present in the population.
    #[error("agent id {0} is not in the network")]
    UnknownAgent(AgentId),

    /// Sample size larger than the population it is drawn from.
    #[error("cannot sample {requested} elements from a population of {available}")]
    InsufficientPopulation {
        /// Requested sample size.
        requested: usize,
        /// Population size.
        available: usize,
    },

    /// Update counter assignment other than `current` or `current + 1`.
    #[error("update count is {current}, it cannot be set to {requested}")]
    UpdateCount {
        /// Current counter value.
        current: u64,
        /// Rejected value.
        requested: u64,
    },

    /// Edges changed since the last predecessor refresh.
    #[error("predecessor lists are stale, refresh them before updating")]
    StalePredecessors,

    /// Unrecognized update algorithm selector.
    #[error("unknown algorithm {0:?}")]
    UnknownAlgorithm(String),

    /// External solver invocation, exchange or output parsing failed.
    #[error("external solver failed: {message}")]
    Solver {
        /// What the solver layer was doing.
        message: String,
        /// Underlying I/O error, if any.
        #[source]
        source: Option<std::io::Error>,
    },
}

impl Error {
    /// Creates a solver error without an I/O source.
    pub fn solver(message: impl Into<String>) -> Self {
        Self::Solver {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a solver error wrapping an I/O failure.
    pub fn solver_io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Solver {
            message: message.into(),
            source: Some(source),
        }
    }
}

/// Result alias for the diffusion core.
pub type Result<T> = std::result::Result<T, Error>;
