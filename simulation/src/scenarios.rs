//! Pre-defined simulation scenarios
//!
//! Each scenario builds a topology, schedules traffic (and link failures
//! where the scenario is about route maintenance), runs the network to the
//! configured end time and summarizes the run in a [`SimReport`].

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::info;

use manet_core::NodeAddress;
use manet_dsr::{DsrConfig, DsrStats};

use crate::error::SimResult;
use crate::network::{Network, NetworkStats, SimConfig};
use crate::topology::{Topology, TopologyBuilder, from_edges, node_address};

/// Nodes in the random traffic scenario
pub const RANDOM_NODES: usize = 12;
/// Link probability of the random traffic topology
pub const RANDOM_LINK_PROBABILITY: f64 = 0.3;
/// Datagrams originated in the random traffic scenario
pub const RANDOM_PACKETS: usize = 40;
/// Links removed halfway through the random traffic scenario
pub const RANDOM_LINK_BREAKS: usize = 2;

/// The built-in scenarios
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Discovery across a five-node line, then reuse of the cached route
    Discovery,
    /// A relay answers a request from its route cache
    CachedReply,
    /// A broken link is reported and the packet salvaged over a detour
    Salvage,
    /// Random pairs exchange traffic over a random topology with failures
    RandomTraffic,
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Discovery => "discovery",
            Self::CachedReply => "cached_reply",
            Self::Salvage => "salvage",
            Self::RandomTraffic => "random_traffic",
        };
        f.write_str(name)
    }
}

/// Summary of one simulation run
#[derive(Debug, Clone, Serialize)]
pub struct SimReport {
    pub scenario: Scenario,
    /// Wall-clock start of the run
    pub started_at: DateTime<Utc>,
    /// Simulated time covered by the run
    pub simulated_time: Duration,
    pub node_count: usize,
    pub link_count: usize,
    pub originated: usize,
    pub delivered: usize,
    /// Mean time from origination to delivery, in milliseconds
    pub average_latency_ms: Option<f64>,
    pub network: NetworkStats,
    /// All nodes' counters added up
    pub totals: DsrStats,
    /// Counters per node, keyed by address
    pub nodes: BTreeMap<String, DsrStats>,
}

impl SimReport {
    /// Finalize the network and summarize it
    pub fn collect(scenario: Scenario, started_at: DateTime<Utc>, network: &mut Network) -> Self {
        let per_node = network.finalize();

        let mut totals = DsrStats::default();
        for stats in per_node.values() {
            totals.merge(stats);
        }

        let sent_at: HashMap<_, _> = network
            .originated()
            .iter()
            .map(|o| ((o.source, o.id), o.at))
            .collect();
        let latencies: Vec<f64> = network
            .delivered()
            .iter()
            .filter_map(|d| {
                let at = sent_at.get(&(d.datagram.source, d.datagram.id))?;
                Some(d.at.saturating_sub(*at).as_secs_f64() * 1000.0)
            })
            .collect();
        let average_latency_ms = (!latencies.is_empty())
            .then(|| latencies.iter().sum::<f64>() / latencies.len() as f64);

        Self {
            scenario,
            started_at,
            simulated_time: network.now(),
            node_count: network.topology().node_count(),
            link_count: network.topology().edge_count(),
            originated: network.originated().len(),
            delivered: network.delivered().len(),
            average_latency_ms,
            network: network.stats().clone(),
            totals,
            nodes: per_node
                .into_iter()
                .map(|(node, stats)| (node.to_string(), stats))
                .collect(),
        }
    }

    /// Fraction of originated datagrams that were delivered
    pub fn delivery_ratio(&self) -> f64 {
        if self.originated == 0 {
            return 0.0;
        }
        self.delivered as f64 / self.originated as f64
    }

    /// Human-readable summary
    pub fn summary(&self) -> String {
        let mut output = String::new();
        output.push_str(&format!("=== Scenario: {} ===\n", self.scenario));
        output.push_str(&format!(
            "  Nodes: {}, links at end: {}\n",
            self.node_count, self.link_count
        ));
        output.push_str(&format!(
            "  Simulated time: {:.3}s\n",
            self.simulated_time.as_secs_f64()
        ));
        output.push_str(&format!(
            "  Delivered: {}/{} ({:.1}%)\n",
            self.delivered,
            self.originated,
            self.delivery_ratio() * 100.0
        ));
        if let Some(latency) = self.average_latency_ms {
            output.push_str(&format!("  Average latency: {:.2}ms\n", latency));
        }
        output.push_str(&format!(
            "  Frames: {} ({} broadcast, {} failed)\n",
            self.network.frames_transmitted, self.network.broadcasts, self.network.link_failures
        ));

        let t = &self.totals;
        output.push_str(&format!(
            "  Requests: {} initiated, {} resent, {} relayed\n",
            t.requests_initiated, t.requests_resent, t.requests_relayed
        ));
        output.push_str(&format!(
            "  Replies: {} from targets, {} from caches\n",
            t.replies_initiated_as_destination, t.replies_initiated_as_intermediate
        ));
        output.push_str(&format!(
            "  Route errors: {}, salvaged: {}, link breaks: {}\n",
            t.errors_initiated, t.salvaged, t.link_breaks
        ));
        output.push_str(&format!(
            "  Average route length: {:.2} hops\n",
            t.average_route_length()
        ));
        output
    }
}

/// Run one scenario to completion
pub fn run_scenario(
    scenario: Scenario,
    dsr_config: &DsrConfig,
    sim_config: SimConfig,
) -> SimResult<SimReport> {
    info!(scenario = %scenario, seed = sim_config.seed, "=== Running scenario ===");
    let started_at = Utc::now();

    let mut network = match scenario {
        Scenario::Discovery => discovery(dsr_config, sim_config)?,
        Scenario::CachedReply => cached_reply(dsr_config, sim_config)?,
        Scenario::Salvage => salvage(dsr_config, sim_config)?,
        Scenario::RandomTraffic => random_traffic(dsr_config, sim_config)?,
    };
    network.run();

    let report = SimReport::collect(scenario, started_at, &mut network);
    info!(
        scenario = %scenario,
        originated = report.originated,
        delivered = report.delivered,
        "Scenario finished"
    );
    Ok(report)
}

/// 1 - 2 - 3 - 4 - 5; node 1 sends to 5 once a second
fn discovery(dsr_config: &DsrConfig, sim_config: SimConfig) -> SimResult<Network> {
    let topology = TopologyBuilder::new(5)?.line();
    let mut network = Network::new(topology, dsr_config, sim_config)?;

    for i in 0..3 {
        network.send_at(
            Duration::from_secs(i),
            node_address(1),
            node_address(5),
            format!("discovery #{i}"),
        )?;
    }
    Ok(network)
}

/// 1 - 2 - 3 - 4, with 5 moving into range of 2 later
///
/// After 1 has discovered 4, node 2 holds a route to 4 and answers 5's
/// request from its cache. Node 5 arrives late so it cannot overhear the
/// first discovery.
fn cached_reply(dsr_config: &DsrConfig, sim_config: SimConfig) -> SimResult<Network> {
    let mut topology = from_edges(&[(1, 2), (2, 3), (3, 4)]);
    topology.add_node(node_address(5));
    let mut network = Network::new(topology, dsr_config, sim_config)?;

    network.send_at(Duration::ZERO, node_address(1), node_address(4), "from 1")?;
    network.connect_at(Duration::from_millis(900), node_address(2), node_address(5))?;
    network.send_at(Duration::from_secs(1), node_address(5), node_address(4), "from 5")?;
    Ok(network)
}

/// Two routes from 2 to 4: through 3 and through 5
///
/// Once 1 uses the route through 3, the link 2 - 3 fails. Node 2 reports
/// the break to 1 and salvages the packet over 5.
fn salvage(dsr_config: &DsrConfig, sim_config: SimConfig) -> SimResult<Network> {
    let topology = from_edges(&[(1, 2), (2, 3), (3, 4), (2, 5), (5, 4)]);
    let mut network = Network::new(topology, dsr_config, sim_config)?;

    network.send_at(Duration::ZERO, node_address(1), node_address(4), "before")?;
    network.break_link_at(Duration::from_secs(1), node_address(2), node_address(3));
    network.send_at(Duration::from_millis(1100), node_address(1), node_address(4), "salvaged")?;
    network.send_at(Duration::from_secs(2), node_address(1), node_address(4), "after")?;
    Ok(network)
}

/// Random pairs over a seeded random topology, with links failing midway
fn random_traffic(dsr_config: &DsrConfig, sim_config: SimConfig) -> SimResult<Network> {
    let mut rng = StdRng::seed_from_u64(sim_config.seed);
    let topology =
        TopologyBuilder::new(RANDOM_NODES)?.random(RANDOM_LINK_PROBABILITY, sim_config.seed)?;
    let links = links_of(&topology);
    let nodes: Vec<_> = topology.nodes().collect();
    let horizon = sim_config.max_time / 2;

    let mut network = Network::new(topology, dsr_config, sim_config)?;

    for i in 0..RANDOM_PACKETS {
        let source = nodes[rng.random_range(0..nodes.len())];
        let mut destination = nodes[rng.random_range(0..nodes.len())];
        while destination == source {
            destination = nodes[rng.random_range(0..nodes.len())];
        }
        let at = horizon.mul_f64(rng.random::<f64>());
        network.send_at(at, source, destination, format!("packet #{i}"))?;
    }

    for _ in 0..RANDOM_LINK_BREAKS.min(links.len()) {
        let (a, b) = links[rng.random_range(0..links.len())];
        let at = horizon / 2 + horizon.mul_f64(rng.random::<f64>() / 2.0);
        network.break_link_at(at, a, b);
    }

    Ok(network)
}

fn links_of(topology: &Topology) -> Vec<(NodeAddress, NodeAddress)> {
    topology
        .nodes()
        .flat_map(|a| topology.neighbors(a).filter(move |b| a < *b).map(move |b| (a, b)))
        .collect()
}
