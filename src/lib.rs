//! Opinion diffusion over directed social networks of agents.
//!
//! The diffusion core ([`model`], [`network`], [`rule`], [`sampling`],
//! [`mutation`], [`exchange`], [`solver`]) reports typed [`Error`]s. The run
//! tooling ([`engine`], [`config`], [`analysis`], [`manager`]) drives it
//! from a simulation directory.

pub mod analysis;
pub mod config;
pub mod engine;
pub mod error;
pub mod exchange;
pub mod manager;
pub mod model;
pub mod mutation;
pub mod network;
pub mod record;
pub mod rule;
pub mod sampling;
pub mod solver;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Error, Result};
