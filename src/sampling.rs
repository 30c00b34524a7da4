//! Uniform sampling without replacement and influence-example selection.

use crate::error::{Error, Result};
use crate::model::{Agent, AgentId};
use rand::Rng;
use rand::seq::{IndexedRandom, index};

/// Draw `k` distinct elements of `population` uniformly at random.
pub fn sample<'a, T, R: Rng + ?Sized>(
    population: &'a [T],
    k: usize,
    rng: &mut R,
) -> Result<Vec<&'a T>> {
    check_size(population.len(), k)?;
    Ok(population.choose_multiple(rng, k).collect())
}

/// Draw `k` distinct indices in `0..len` uniformly at random, in draw order.
pub fn sample_indices<R: Rng + ?Sized>(len: usize, k: usize, rng: &mut R) -> Result<Vec<usize>> {
    check_size(len, k)?;
    Ok(index::sample(rng, len, k).into_vec())
}

fn check_size(available: usize, requested: usize) -> Result<()> {
    if requested > available {
        return Err(Error::InsufficientPopulation {
            requested,
            available,
        });
    }
    Ok(())
}

/// One state vector handed to the external solver.
#[derive(Debug, Clone, PartialEq)]
pub struct InfluenceExample {
    /// Example name in the exchange file.
    pub label: String,
    /// Agent the values were taken from, if they came from the network.
    pub source: Option<AgentId>,
    pub values: Vec<f64>,
}

impl InfluenceExample {
    /// The agent marked for update; its label carries the `-1` suffix.
    pub fn own(agent: &Agent) -> Self {
        Self {
            label: format!("agent{}-1", agent.id()),
            source: Some(agent.id()),
            values: agent.state().values(),
        }
    }

    fn predecessor(agent: &Agent) -> Self {
        Self {
            label: format!("agent{}", agent.id()),
            source: Some(agent.id()),
            values: agent.state().values(),
        }
    }
}

/// The agent's own state followed by `n` distinct sampled influences.
///
/// Influences come from `manual` rows when given, from `predecessors`
/// otherwise.
pub fn influence_examples<R: Rng + ?Sized>(
    agent: &Agent,
    predecessors: &[&Agent],
    n: usize,
    manual: Option<&[Vec<f64>]>,
    rng: &mut R,
) -> Result<Vec<InfluenceExample>> {
    let mut examples = Vec::with_capacity(n + 1);
    examples.push(InfluenceExample::own(agent));

    match manual {
        Some(rows) => {
            let dim = agent.state().dim();
            for (i_pick, i_row) in sample_indices(rows.len(), n, rng)?.into_iter().enumerate() {
                let row = &rows[i_row];
                if row.len() != dim {
                    return Err(Error::LengthMismatch {
                        expected: dim,
                        actual: row.len(),
                    });
                }
                examples.push(InfluenceExample {
                    label: format!("agent{i_pick}_manual"),
                    source: None,
                    values: row.clone(),
                });
            }
        }
        None => {
            for predecessor in sample(predecessors, n, rng)? {
                examples.push(InfluenceExample::predecessor(predecessor));
            }
        }
    }

    log::trace!(
        "agent {} influence examples: {:?}",
        agent.id(),
        examples.iter().map(|ex| &ex.label).collect::<Vec<_>>()
    );
    Ok(examples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{IdAllocator, State};
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;
    use std::collections::HashSet;

    fn vector_agents(n: usize) -> Vec<Agent> {
        let mut ids = IdAllocator::new();
        (0..n)
            .map(|i| {
                let mut agent = Agent::vector(&mut ids, 4, None).unwrap();
                agent.seed(State::Vector(vec![i as f64; 4])).unwrap();
                agent
            })
            .collect()
    }

    #[test]
    fn oversampling_fails() {
        let mut rng = ChaCha12Rng::seed_from_u64(0);
        let err = sample(&[1, 2, 3], 4, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            Error::InsufficientPopulation {
                requested: 4,
                available: 3
            }
        ));
        assert!(sample_indices(0, 1, &mut rng).is_err());
    }

    #[test]
    fn full_sample_is_permutation() {
        let mut rng = ChaCha12Rng::seed_from_u64(3);
        let mut picked: Vec<_> = sample(&[10, 20, 30], 3, &mut rng)
            .unwrap()
            .into_iter()
            .copied()
            .collect();
        picked.sort_unstable();
        assert_eq!(picked, [10, 20, 30]);
    }

    #[test]
    fn own_state_comes_first() {
        let agents = vector_agents(4);
        let predecessors: Vec<&Agent> = agents[1..].iter().collect();
        let mut rng = ChaCha12Rng::seed_from_u64(42);

        let examples = influence_examples(&agents[0], &predecessors, 0, None, &mut rng).unwrap();
        assert_eq!(examples.len(), 1);
        assert_eq!(examples[0].label, "agent0-1");

        let examples = influence_examples(&agents[0], &predecessors, 2, None, &mut rng).unwrap();
        assert_eq!(examples.len(), 3);
        assert_eq!(examples[0].values, vec![0.0; 4]);
        let sources: HashSet<_> = examples[1..].iter().map(|ex| ex.source).collect();
        assert_eq!(sources.len(), 2);
        for example in &examples[1..] {
            let id = example.source.unwrap();
            assert!((1..4).contains(&id));
            assert_eq!(example.label, format!("agent{id}"));
            assert_eq!(example.values, vec![id as f64; 4]);
        }

        assert!(influence_examples(&agents[0], &predecessors, 4, None, &mut rng).is_err());
    }

    #[test]
    fn manual_rows_replace_predecessors() {
        let agents = vector_agents(2);
        let predecessors = vec![&agents[1]];
        let manual = vec![vec![9.0; 4], vec![8.0; 4]];
        let mut rng = ChaCha12Rng::seed_from_u64(42);

        let examples =
            influence_examples(&agents[0], &predecessors, 2, Some(&manual), &mut rng).unwrap();
        assert_eq!(examples.len(), 3);
        assert_eq!(examples[1].label, "agent0_manual");
        assert_eq!(examples[2].label, "agent1_manual");
        assert!(examples[1..].iter().all(|ex| ex.source.is_none()));
        let mut firsts: Vec<f64> = examples[1..].iter().map(|ex| ex.values[0]).collect();
        firsts.sort_by(f64::total_cmp);
        assert_eq!(firsts, [8.0, 9.0]);

        let short = vec![vec![1.0; 2]];
        assert!(matches!(
            influence_examples(&agents[0], &predecessors, 1, Some(&short), &mut rng),
            Err(Error::LengthMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn sample_is_distinct_subset(len in 0usize..50, k in 0usize..50, seed in any::<u64>()) {
            let population: Vec<usize> = (0..len).collect();
            let mut rng = ChaCha12Rng::seed_from_u64(seed);
            match sample(&population, k, &mut rng) {
                Ok(picked) => {
                    prop_assert!(k <= len);
                    prop_assert_eq!(picked.len(), k);
                    let distinct: HashSet<_> = picked.iter().collect();
                    prop_assert_eq!(distinct.len(), k);
                    prop_assert!(picked.iter().all(|&&x| x < len));
                }
                Err(_) => prop_assert!(k > len),
            }
        }
    }
}
