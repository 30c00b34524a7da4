//! Directed multigraph of agents.
//!
//! Node `i` of the graph is `agents[i]`; the node weight is the agent id.
//! Predecessor lists are derived from the edges and must be refreshed with
//! [`Network::refresh_predecessors`] after the edges change.

use crate::error::{Error, Result};
use crate::model::{Agent, AgentId};
use crate::sampling::sample;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Population of agents connected by directed influence edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Network {
    graph: DiGraph<AgentId, ()>,
    agents: Vec<Agent>,
    /// Map from agent id to position in `agents`.
    index: HashMap<AgentId, usize>,
    stale: bool,
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an agent; ids must be unique.
    pub fn add_agent(&mut self, agent: Agent) -> Result<()> {
        let id = agent.id();
        if self.index.contains_key(&id) {
            return Err(Error::DuplicateId(id));
        }
        self.graph.add_node(id);
        self.index.insert(id, self.agents.len());
        self.agents.push(agent);
        Ok(())
    }

    /// Add a directed edge `source -> target`. Self-loops and parallel edges are allowed.
    pub fn add_edge(&mut self, source: AgentId, target: AgentId) -> Result<()> {
        let source = self.node(source)?;
        let target = self.node(target)?;
        self.graph.add_edge(source, target, ());
        self.stale = true;
        Ok(())
    }

    fn node(&self, id: AgentId) -> Result<NodeIndex> {
        self.index
            .get(&id)
            .map(|&i_agt| NodeIndex::new(i_agt))
            .ok_or(Error::UnknownAgent(id))
    }

    /// Recompute every agent's predecessors: the distinct sources of its
    /// incoming edges, in ascending id order.
    pub fn refresh_predecessors(&mut self) {
        let graph = &self.graph;
        for (i_agt, agent) in self.agents.iter_mut().enumerate() {
            let mut predecessors: Vec<AgentId> = graph
                .neighbors_directed(NodeIndex::new(i_agt), Direction::Incoming)
                .map(|node| graph[node])
                .collect();
            predecessors.sort_unstable();
            predecessors.dedup();
            agent.set_predecessors(predecessors);
        }
        self.stale = false;
        log::debug!(
            "refreshed predecessors of {} agents over {} edges",
            self.agents.len(),
            self.graph.edge_count()
        );
    }

    /// Whether edges changed since the last refresh.
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn n_edges(&self) -> usize {
        self.graph.edge_count()
    }

    /// All edges as `(source, target)` id pairs.
    pub fn edges(&self) -> impl Iterator<Item = (AgentId, AgentId)> + '_ {
        self.graph
            .edge_references()
            .map(|edge| (self.graph[edge.source()], self.graph[edge.target()]))
    }

    pub fn agents(&self) -> &[Agent] {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut [Agent] {
        &mut self.agents
    }

    pub fn agent(&self, id: AgentId) -> Result<&Agent> {
        let i_agt = self.node(id)?.index();
        Ok(&self.agents[i_agt])
    }

    pub fn agent_mut(&mut self, id: AgentId) -> Result<&mut Agent> {
        let i_agt = self.node(id)?.index();
        Ok(&mut self.agents[i_agt])
    }

    /// The agents listed as predecessors of `id` at the last refresh.
    pub fn predecessors_of(&self, id: AgentId) -> Result<Vec<&Agent>> {
        self.agent(id)?
            .predecessors()
            .iter()
            .map(|&pred| self.agent(pred))
            .collect()
    }

    /// Draw `k` distinct agent ids uniformly at random.
    pub fn sample_agents<R: Rng + ?Sized>(&self, k: usize, rng: &mut R) -> Result<Vec<AgentId>> {
        let ids: Vec<AgentId> = self.agents.iter().map(|agent| agent.id()).collect();
        Ok(sample(&ids, k, rng)?.into_iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::IdAllocator;
    use rand::SeedableRng;
    use rand_chacha::ChaCha12Rng;
    use std::collections::HashSet;

    fn network(n_agents: usize) -> Network {
        let mut ids = IdAllocator::new();
        let mut network = Network::new();
        for _ in 0..n_agents {
            network.add_agent(Agent::binary(&mut ids, 0.5).unwrap()).unwrap();
        }
        network
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut network = network(2);
        let mut ids = IdAllocator::new();
        let again = Agent::binary(&mut ids, 0.5).unwrap();
        assert!(matches!(network.add_agent(again), Err(Error::DuplicateId(0))));
        assert_eq!(network.len(), 2);
    }

    #[test]
    fn edges_need_known_endpoints() {
        let mut network = network(2);
        assert!(matches!(network.add_edge(0, 5), Err(Error::UnknownAgent(5))));
        assert!(matches!(network.add_edge(7, 0), Err(Error::UnknownAgent(7))));
    }

    #[test]
    fn predecessors_are_distinct_sources() {
        let mut network = network(4);
        for (source, target) in [(2, 0), (1, 0), (2, 0), (0, 0), (3, 1)] {
            network.add_edge(source, target).unwrap();
        }
        assert!(network.is_stale());
        assert!(!network.agent(0).unwrap().has_predecessor());

        network.refresh_predecessors();
        assert!(!network.is_stale());
        assert_eq!(network.agent(0).unwrap().predecessors(), &[0, 1, 2]);
        assert_eq!(network.agent(1).unwrap().predecessors(), &[3]);
        assert!(!network.agent(3).unwrap().has_predecessor());
        assert_eq!(network.n_edges(), 5);

        let ids: Vec<_> = network
            .predecessors_of(0)
            .unwrap()
            .iter()
            .map(|agent| agent.id())
            .collect();
        assert_eq!(ids, [0, 1, 2]);
    }

    #[test]
    fn edge_list_round_trips() {
        let mut network = network(3);
        network.add_edge(0, 1).unwrap();
        network.add_edge(1, 2).unwrap();
        network.add_edge(0, 1).unwrap();
        let mut edges: Vec<_> = network.edges().collect();
        edges.sort_unstable();
        assert_eq!(edges, [(0, 1), (0, 1), (1, 2)]);
    }

    #[test]
    fn sampled_agents_are_distinct() {
        let network = network(10);
        let mut rng = ChaCha12Rng::seed_from_u64(9);
        let picked = network.sample_agents(4, &mut rng).unwrap();
        let distinct: HashSet<_> = picked.iter().collect();
        assert_eq!(distinct.len(), 4);
        assert!(picked.iter().all(|&id| id < 10));
        assert!(network.sample_agents(11, &mut rng).is_err());
    }
}
