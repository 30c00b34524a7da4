//! Per-tick step records.
//!
//! One comma-separated line per agent per tick:
//!
//! - binary agents: `tick,id,num_updates,status,state`
//! - vector agents: `tick,id,num_updates,status,influencer,state...,input...,target...,prototype...`
//!
//! Vector values are flattened in place. A missing influencer or target is
//! written as `NA`.

use crate::model::{Agent, AgentId, UpdateStatus};
use anyhow::{Context, Result, bail};
use std::fmt;

const MISSING: &str = "NA";

/// Fields only present for vector agents.
#[derive(Debug, Clone, PartialEq)]
pub struct VectorFields {
    pub influencer: Option<AgentId>,
    /// State before this tick's evaluation.
    pub input: Vec<f64>,
    /// State of the influencer, empty if there was none.
    pub target: Vec<f64>,
    pub prototype: Vec<u8>,
}

/// Snapshot of one agent after one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub tick: u64,
    pub id: AgentId,
    pub num_updates: u64,
    pub status: UpdateStatus,
    pub state: Vec<f64>,
    pub vector: Option<VectorFields>,
}

impl StepRecord {
    pub fn from_agent(tick: u64, agent: &Agent) -> Self {
        let state = agent.state().values();
        let vector = agent.state().as_vector().map(|_| {
            let (influencer, input, target) = match agent.influence() {
                Some(influence) => (
                    influence.influencer,
                    influence.input.clone(),
                    influence.target.clone(),
                ),
                None => (None, state.clone(), Vec::new()),
            };
            VectorFields {
                influencer,
                input,
                target,
                prototype: agent.prototype().map(<[u8]>::to_vec).unwrap_or_default(),
            }
        });
        Self {
            tick,
            id: agent.id(),
            num_updates: agent.num_updates(),
            status: agent.status(),
            state,
            vector,
        }
    }

    /// Parse a record line; `state_len` is 1 for binary agents.
    pub fn parse(line: &str, state_len: usize, vector: bool) -> Result<Self> {
        let mut fields = line.trim().split(',');
        let mut next = |name: &str| {
            fields
                .next()
                .with_context(|| format!("record is missing field {name}"))
        };

        let tick = next("tick")?.parse::<u64>().context("invalid tick")?;
        let id = next("id")?.parse::<AgentId>().context("invalid id")?;
        let num_updates = next("num_updates")?
            .parse::<u64>()
            .context("invalid update count")?;
        let code = next("status")?.parse::<i8>().context("invalid status")?;
        let Some(status) = UpdateStatus::from_code(code) else {
            bail!("unknown status code {code}");
        };

        let influencer = if vector {
            match next("influencer")? {
                MISSING => None,
                field => Some(field.parse::<AgentId>().context("invalid influencer")?),
            }
        } else {
            None
        };

        let state = parse_values(&mut next, "state", state_len)?;

        let vector = if vector {
            let input = parse_values(&mut next, "input", state_len)?;
            let target = parse_values(&mut next, "target", state_len)?;
            let mut prototype = Vec::new();
            while let Ok(field) = next("prototype") {
                prototype.push(field.parse::<u8>().context("invalid prototype bit")?);
            }
            Some(VectorFields {
                influencer,
                input,
                target,
                prototype,
            })
        } else {
            None
        };

        Ok(Self {
            tick,
            id,
            num_updates,
            status,
            state,
            vector,
        })
    }
}

fn parse_values<'a>(
    next: &mut impl FnMut(&str) -> Result<&'a str>,
    name: &str,
    len: usize,
) -> Result<Vec<f64>> {
    let mut values = Vec::with_capacity(len);
    for _ in 0..len {
        match next(name)? {
            MISSING => {}
            field => values.push(
                field
                    .parse::<f64>()
                    .with_context(|| format!("invalid {name} value"))?,
            ),
        }
    }
    Ok(values)
}

fn write_values<T: fmt::Display>(f: &mut fmt::Formatter<'_>, values: &[T]) -> fmt::Result {
    for val in values {
        write!(f, ",{val}")?;
    }
    Ok(())
}

impl fmt::Display for StepRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{}",
            self.tick,
            self.id,
            self.num_updates,
            self.status.code()
        )?;
        match &self.vector {
            None => write_values(f, &self.state),
            Some(vector) => {
                match vector.influencer {
                    Some(id) => write!(f, ",{id}")?,
                    None => write!(f, ",{MISSING}")?,
                }
                write_values(f, &self.state)?;
                write_values(f, &vector.input)?;
                if vector.target.is_empty() {
                    for _ in 0..self.state.len() {
                        write!(f, ",{MISSING}")?;
                    }
                } else {
                    write_values(f, &vector.target)?;
                }
                write_values(f, &vector.prototype)
            }
        }
    }
}
