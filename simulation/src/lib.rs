//! # MANET Simulation
//!
//! A discrete-event simulator that runs one DSR engine per node over a
//! static, symmetric topology.
//!
//! ## Architecture
//!
//! - **Topology** (`topology.rs`): Line, ring, grid, star and seeded random shapes
//! - **Network** (`network.rs`): Event queue, link model and per-node dispatch
//! - **Scenarios** (`scenarios.rs`): Canned runs producing a [`SimReport`]
//!
//! Every handler call of a node runs inside a `node` span carrying the
//! node's address, so engine log lines can be told apart.
//!
//! ## Example
//!
//! ```rust,ignore
//! use manet_dsr::DsrConfig;
//! use manet_simulation::*;
//!
//! let topology = TopologyBuilder::new(4)?.line();
//! let mut network = Network::new(topology, &DsrConfig::default(), SimConfig::default())?;
//!
//! network.send(node_address(1), node_address(4), "hello")?;
//! network.run_for(Duration::from_secs(1));
//!
//! assert_eq!(network.delivered_at(node_address(4)).count(), 1);
//! ```

pub mod error;
pub mod network;
pub mod scenarios;
pub mod topology;

// Re-export main types
pub use error::{SimError, SimResult};
pub use network::{Delivery, Network, NetworkStats, Origination, SimConfig};
pub use scenarios::{Scenario, SimReport, run_scenario};
pub use topology::{
    Topology, TopologyBuilder, TopologyError, TopologyKind, from_edges, node_address,
};
