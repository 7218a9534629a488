//! Static topologies for the simulator
//!
//! Provides builders for the usual test shapes:
//! - Line: a chain of relays
//! - Ring: a chain closed on itself
//! - Grid: rows of a fixed width, linked to the row below
//! - Star: one hub connected to every other node
//! - Random: seeded, with a configurable link probability
//!
//! Nodes are numbered from 1 and addressed `10.0.0.<n>`.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use manet_core::NodeAddress;

/// Largest node number that fits the last octet
pub const MAX_NODES: usize = 254;

/// Address of node `n`
pub fn node_address(n: u8) -> NodeAddress {
    NodeAddress::from_octets(10, 0, 0, n)
}

/// Topology construction errors
#[derive(Debug, Error, PartialEq)]
pub enum TopologyError {
    #[error("topology needs between 1 and {MAX_NODES} nodes, got {0}")]
    NodeCount(usize),

    #[error("grid width must be between 1 and the node count, got {0}")]
    GridWidth(usize),

    #[error("link probability must be within [0, 1], got {0}")]
    Probability(f64),
}

/// Topology shapes the builder knows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TopologyKind {
    Line,
    Ring,
    Grid,
    Star,
    Random,
}

impl fmt::Display for TopologyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Line => "line",
            Self::Ring => "ring",
            Self::Grid => "grid",
            Self::Star => "star",
            Self::Random => "random",
        };
        f.write_str(name)
    }
}

/// Symmetric links between nodes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Topology {
    adjacency: BTreeMap<NodeAddress, BTreeSet<NodeAddress>>,
}

impl Topology {
    /// Create an empty topology
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node without links
    pub fn add_node(&mut self, node: NodeAddress) {
        self.adjacency.entry(node).or_default();
    }

    /// Add a bidirectional link, creating missing nodes
    pub fn connect(&mut self, a: NodeAddress, b: NodeAddress) {
        if a == b {
            return;
        }
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    /// Remove the link between two nodes. Returns whether it existed.
    pub fn disconnect(&mut self, a: NodeAddress, b: NodeAddress) -> bool {
        let removed = self.adjacency.get_mut(&a).is_some_and(|n| n.remove(&b));
        if let Some(neighbors) = self.adjacency.get_mut(&b) {
            neighbors.remove(&a);
        }
        removed
    }

    /// Check if two nodes are directly connected
    pub fn are_connected(&self, a: NodeAddress, b: NodeAddress) -> bool {
        self.adjacency.get(&a).is_some_and(|n| n.contains(&b))
    }

    /// Current neighbors of a node
    pub fn neighbors(&self, node: NodeAddress) -> impl Iterator<Item = NodeAddress> + '_ {
        self.adjacency.get(&node).into_iter().flatten().copied()
    }

    /// All nodes, in address order
    pub fn nodes(&self) -> impl Iterator<Item = NodeAddress> + '_ {
        self.adjacency.keys().copied()
    }

    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    /// Number of links
    pub fn edge_count(&self) -> usize {
        self.adjacency.values().map(BTreeSet::len).sum::<usize>() / 2
    }

    /// Whether every node can reach every other one
    pub fn is_connected(&self) -> bool {
        let Some(start) = self.adjacency.keys().next().copied() else {
            return true;
        };
        let mut seen = BTreeSet::from([start]);
        let mut frontier = vec![start];
        while let Some(node) = frontier.pop() {
            for neighbor in self.neighbors(node) {
                if seen.insert(neighbor) {
                    frontier.push(neighbor);
                }
            }
        }
        seen.len() == self.adjacency.len()
    }

    /// ASCII adjacency listing
    pub fn visualize(&self) -> String {
        let mut output = String::new();
        output.push_str("Topology:\n");
        output.push_str(&format!("  Nodes: {}\n", self.node_count()));
        output.push_str(&format!("  Links: {}\n\n", self.edge_count()));

        for (node, neighbors) in &self.adjacency {
            let neighbor_str: Vec<String> = neighbors.iter().map(|n| n.to_string()).collect();
            output.push_str(&format!("  {} -> [{}]\n", node, neighbor_str.join(", ")));
        }
        output
    }
}

/// Builder for the standard topologies
#[derive(Debug, Clone)]
pub struct TopologyBuilder {
    nodes: Vec<NodeAddress>,
}

impl TopologyBuilder {
    /// Create a builder for nodes 1..=`node_count`
    pub fn new(node_count: usize) -> Result<Self, TopologyError> {
        let count = u8::try_from(node_count)
            .ok()
            .filter(|&c| c >= 1 && usize::from(c) <= MAX_NODES)
            .ok_or(TopologyError::NodeCount(node_count))?;
        Ok(Self {
            nodes: (1..=count).map(node_address).collect(),
        })
    }

    /// Build the given shape with shape-specific defaults
    ///
    /// Grids are as square as the node count allows; random topologies use
    /// the given probability and seed.
    pub fn build(
        self,
        kind: TopologyKind,
        probability: f64,
        seed: u64,
    ) -> Result<Topology, TopologyError> {
        match kind {
            TopologyKind::Line => Ok(self.line()),
            TopologyKind::Ring => Ok(self.ring()),
            TopologyKind::Star => Ok(self.star()),
            TopologyKind::Grid => {
                let width = (self.nodes.len() as f64).sqrt().ceil() as usize;
                self.grid(width)
            }
            TopologyKind::Random => self.random(probability, seed),
        }
    }

    fn empty(&self) -> Topology {
        let mut topology = Topology::new();
        for node in &self.nodes {
            topology.add_node(*node);
        }
        topology
    }

    /// 1 - 2 - 3 - ... - n
    pub fn line(self) -> Topology {
        let mut topology = self.empty();
        for pair in self.nodes.windows(2) {
            topology.connect(pair[0], pair[1]);
        }
        topology
    }

    /// 1 - 2 - ... - n - 1
    pub fn ring(self) -> Topology {
        let mut topology = self.empty();
        let n = self.nodes.len();
        for i in 0..n {
            topology.connect(self.nodes[i], self.nodes[(i + 1) % n]);
        }
        topology
    }

    /// Rows of `width` nodes; each node links right and down
    pub fn grid(self, width: usize) -> Result<Topology, TopologyError> {
        if width == 0 || width > self.nodes.len() {
            return Err(TopologyError::GridWidth(width));
        }
        let mut topology = self.empty();
        for i in 0..self.nodes.len() {
            if (i + 1) % width != 0 && i + 1 < self.nodes.len() {
                topology.connect(self.nodes[i], self.nodes[i + 1]);
            }
            if i + width < self.nodes.len() {
                topology.connect(self.nodes[i], self.nodes[i + width]);
            }
        }
        Ok(topology)
    }

    /// Node 1 in the center, linked to all others
    pub fn star(self) -> Topology {
        let mut topology = self.empty();
        if let Some((center, rest)) = self.nodes.split_first() {
            for node in rest {
                topology.connect(*center, *node);
            }
        }
        topology
    }

    /// Each pair linked with `probability`; isolated nodes get one random link
    pub fn random(self, probability: f64, seed: u64) -> Result<Topology, TopologyError> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(TopologyError::Probability(probability));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let mut topology = self.empty();
        let n = self.nodes.len();

        for i in 0..n {
            for j in (i + 1)..n {
                if rng.random::<f64>() < probability {
                    topology.connect(self.nodes[i], self.nodes[j]);
                }
            }
        }

        if n > 1 {
            for i in 0..n {
                if topology.neighbors(self.nodes[i]).next().is_none() {
                    let offset = rng.random_range(1..n);
                    topology.connect(self.nodes[i], self.nodes[(i + offset) % n]);
                }
            }
        }

        Ok(topology)
    }
}

/// Build a topology from an edge list of node numbers
pub fn from_edges(edges: &[(u8, u8)]) -> Topology {
    let mut topology = Topology::new();
    for (a, b) in edges {
        topology.connect(node_address(*a), node_address(*b));
    }
    topology
}
