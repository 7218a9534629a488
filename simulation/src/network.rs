//! Discrete-event network of DSR nodes
//!
//! Every node runs its own [`Dsr`] instance. Frames, link-layer reports and
//! timer expiries are events in a single queue ordered by simulated time and
//! then by the order they were scheduled, so a run is fully determined by
//! its topology, configuration and seed.
//!
//! Links are symmetric and lossless while they exist. A unicast frame over a
//! link that has gone away is reported back to its sender as a failure.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, debug_span, trace};

use manet_core::{
    Clock, Datagram, DropReason, LinkLayer, LinkStatus, NodeAddress, SimTime, TimerService,
    TimerToken, protocol,
};
use manet_dsr::{Dsr, DsrConfig, DsrStats, RouteDecision};

use crate::error::{SimError, SimResult};
use crate::topology::Topology;

/// Configuration for the simulator itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Time a frame spends on a link
    pub link_delay: Duration,
    /// Simulated time at which a run stops
    pub max_time: Duration,
    /// Seed for traffic, random topologies and the engines' jitter
    pub seed: u64,
    /// Let neighbors of a unicast sender overhear the frame
    pub overhear: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            link_delay: Duration::from_millis(1),
            max_time: Duration::from_secs(60),
            seed: 0,
            overhear: true,
        }
    }
}

/// A datagram handed to the network by an application
#[derive(Debug, Clone, Serialize)]
pub struct Origination {
    pub at: SimTime,
    pub source: NodeAddress,
    pub destination: NodeAddress,
    pub id: u16,
}

/// A datagram delivered to an application
#[derive(Debug, Clone, Serialize)]
pub struct Delivery {
    pub at: SimTime,
    pub node: NodeAddress,
    pub datagram: Datagram,
}

/// Link-level counters for a whole run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkStats {
    /// Frames handed to the link layer by any node
    pub frames_transmitted: u64,
    /// Of which were broadcasts
    pub broadcasts: u64,
    /// Unicast frames whose link was missing
    pub link_failures: u64,
    /// Frame copies delivered to promiscuous listeners
    pub overheard: u64,
}

enum Event {
    Originate {
        node: NodeAddress,
        destination: NodeAddress,
        payload: Bytes,
    },
    Deliver {
        to: NodeAddress,
        from: NodeAddress,
        datagram: Datagram,
    },
    Overhear {
        node: NodeAddress,
        from: NodeAddress,
        datagram: Datagram,
    },
    LinkReport {
        node: NodeAddress,
        status: LinkStatus,
    },
    Timer {
        node: NodeAddress,
        token: TimerToken,
    },
    LinkDown {
        a: NodeAddress,
        b: NodeAddress,
    },
    LinkUp {
        a: NodeAddress,
        b: NodeAddress,
    },
}

struct Scheduled {
    at: SimTime,
    seq: u64,
    event: Event,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        (self.at, self.seq) == (other.at, other.seq)
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Reversed: BinaryHeap is a max-heap
    fn cmp(&self, other: &Self) -> Ordering {
        (other.at, other.seq).cmp(&(self.at, self.seq))
    }
}

/// What a node asked of its surroundings during one handler call
#[derive(Default)]
struct NodeOutbox {
    now: SimTime,
    transmits: Vec<(Datagram, NodeAddress, Duration)>,
    timers: Vec<(TimerToken, Duration)>,
}

impl Clock for NodeOutbox {
    fn now(&self) -> SimTime {
        self.now
    }
}

impl LinkLayer for NodeOutbox {
    fn transmit(&mut self, datagram: Datagram, next_hop: NodeAddress, delay: Duration) {
        self.transmits.push((datagram, next_hop, delay));
    }
}

impl TimerService for NodeOutbox {
    fn schedule(&mut self, token: TimerToken, delay: Duration) {
        self.timers.push((token, delay));
    }
}

/// The simulated network
pub struct Network {
    topology: Topology,
    nodes: BTreeMap<NodeAddress, Dsr>,
    next_id: BTreeMap<NodeAddress, u16>,
    queue: BinaryHeap<Scheduled>,
    seq: u64,
    now: SimTime,
    config: SimConfig,
    stats: NetworkStats,
    originated: Vec<Origination>,
    delivered: Vec<Delivery>,
}

impl Network {
    /// Create one engine per topology node
    ///
    /// Each engine's jitter seed is derived from the simulation seed and
    /// the node's address.
    pub fn new(topology: Topology, dsr_config: &DsrConfig, config: SimConfig) -> SimResult<Self> {
        let mut nodes = BTreeMap::new();
        for node in topology.nodes() {
            let seed = config.seed.wrapping_add(u64::from(node.as_u32()));
            nodes.insert(node, Dsr::new(node, dsr_config.clone().with_seed(seed))?);
        }
        debug!(nodes = nodes.len(), links = topology.edge_count(), "Network created");

        Ok(Self {
            topology,
            nodes,
            next_id: BTreeMap::new(),
            queue: BinaryHeap::new(),
            seq: 0,
            now: Duration::ZERO,
            config,
            stats: NetworkStats::default(),
            originated: Vec::new(),
            delivered: Vec::new(),
        })
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn stats(&self) -> &NetworkStats {
        &self.stats
    }

    /// Engine of a node
    pub fn node(&self, node: NodeAddress) -> Option<&Dsr> {
        self.nodes.get(&node)
    }

    /// Every datagram handed to the network so far
    pub fn originated(&self) -> &[Origination] {
        &self.originated
    }

    /// Every datagram delivered so far
    pub fn delivered(&self) -> &[Delivery] {
        &self.delivered
    }

    /// Datagrams delivered at one node
    pub fn delivered_at(&self, node: NodeAddress) -> impl Iterator<Item = &Delivery> {
        self.delivered.iter().filter(move |d| d.node == node)
    }

    /// Whether no events are pending
    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    /// Originate a UDP datagram at `source` now
    pub fn send(
        &mut self,
        source: NodeAddress,
        destination: NodeAddress,
        payload: impl Into<Bytes>,
    ) -> SimResult<RouteDecision> {
        if !self.nodes.contains_key(&source) {
            return Err(SimError::UnknownNode(source));
        }
        Ok(self.originate(source, destination, payload.into()))
    }

    /// Originate a UDP datagram at `source` at time `at`
    pub fn send_at(
        &mut self,
        at: SimTime,
        source: NodeAddress,
        destination: NodeAddress,
        payload: impl Into<Bytes>,
    ) -> SimResult<()> {
        if !self.nodes.contains_key(&source) {
            return Err(SimError::UnknownNode(source));
        }
        self.schedule(
            at,
            Event::Originate {
                node: source,
                destination,
                payload: payload.into(),
            },
        );
        Ok(())
    }

    /// Remove a link now
    pub fn break_link(&mut self, a: NodeAddress, b: NodeAddress) -> bool {
        let removed = self.topology.disconnect(a, b);
        if removed {
            debug!(a = %a, b = %b, at = ?self.now, "Link broken");
        }
        removed
    }

    /// Remove a link at time `at`
    pub fn break_link_at(&mut self, at: SimTime, a: NodeAddress, b: NodeAddress) {
        self.schedule(at, Event::LinkDown { a, b });
    }

    /// Restore or add a link between existing nodes now
    pub fn connect(&mut self, a: NodeAddress, b: NodeAddress) -> SimResult<()> {
        for node in [a, b] {
            if !self.nodes.contains_key(&node) {
                return Err(SimError::UnknownNode(node));
            }
        }
        self.topology.connect(a, b);
        debug!(a = %a, b = %b, at = ?self.now, "Link up");
        Ok(())
    }

    /// Restore or add a link at time `at`
    pub fn connect_at(&mut self, at: SimTime, a: NodeAddress, b: NodeAddress) -> SimResult<()> {
        for node in [a, b] {
            if !self.nodes.contains_key(&node) {
                return Err(SimError::UnknownNode(node));
            }
        }
        self.schedule(at, Event::LinkUp { a, b });
        Ok(())
    }

    /// Process the next event. Returns false when the queue is empty.
    pub fn step(&mut self) -> bool {
        let Some(next) = self.queue.pop() else {
            return false;
        };
        self.now = next.at;
        self.dispatch(next.event);
        true
    }

    /// Process every event up to and including `deadline`
    pub fn run_until(&mut self, deadline: SimTime) {
        while self.queue.peek().is_some_and(|next| next.at <= deadline) {
            self.step();
        }
        self.now = self.now.max(deadline);
    }

    pub fn run_for(&mut self, duration: Duration) {
        let deadline = self.now + duration;
        self.run_until(deadline);
    }

    /// Run to the configured end of the simulation
    pub fn run(&mut self) {
        self.run_until(self.config.max_time);
    }

    /// Finalize every engine and collect its statistics
    pub fn finalize(&mut self) -> BTreeMap<NodeAddress, DsrStats> {
        self.nodes
            .iter_mut()
            .map(|(node, dsr)| (*node, dsr.finalize()))
            .collect()
    }

    fn originate(
        &mut self,
        source: NodeAddress,
        destination: NodeAddress,
        payload: Bytes,
    ) -> RouteDecision {
        let id = self.next_id.entry(source).or_insert(0);
        *id = id.wrapping_add(1);
        let datagram = Datagram::new(source, destination, *id, protocol::UDP, payload);

        self.originated.push(Origination {
            at: self.now,
            source,
            destination,
            id: datagram.id,
        });
        trace!(src = %source, dst = %destination, id = datagram.id, "Originating datagram");

        self.with_node(source, |dsr, ctx| dsr.route_packet(ctx, datagram, None))
            .unwrap_or(RouteDecision::Dropped(DropReason::NoRoute))
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Originate {
                node,
                destination,
                payload,
            } => {
                self.originate(node, destination, payload);
            }
            Event::Deliver { to, from, datagram } => {
                let delivered = self
                    .with_node(to, |dsr, ctx| dsr.receive_from_link(ctx, datagram, from))
                    .flatten();
                if let Some(datagram) = delivered {
                    debug!(node = %to, src = %datagram.source, id = datagram.id, "Datagram delivered");
                    self.delivered.push(Delivery {
                        at: self.now,
                        node: to,
                        datagram,
                    });
                }
            }
            Event::Overhear { node, from, datagram } => {
                self.stats.overheard += 1;
                self.with_node(node, |dsr, ctx| dsr.peek(ctx, &datagram, from));
            }
            Event::LinkReport { node, status } => {
                self.with_node(node, |dsr, ctx| dsr.handle_link_status(ctx, status));
            }
            Event::Timer { node, token } => {
                self.with_node(node, |dsr, ctx| dsr.handle_timer(ctx, token));
            }
            Event::LinkDown { a, b } => {
                self.break_link(a, b);
            }
            Event::LinkUp { a, b } => {
                self.topology.connect(a, b);
                debug!(a = %a, b = %b, "Link up");
            }
        }
    }

    /// Run a handler on one node inside its span, then apply what it asked for
    fn with_node<R>(
        &mut self,
        node: NodeAddress,
        f: impl FnOnce(&mut Dsr, &mut NodeOutbox) -> R,
    ) -> Option<R> {
        let dsr = self.nodes.get_mut(&node)?;
        let mut ctx = NodeOutbox {
            now: self.now,
            ..Default::default()
        };

        let span = debug_span!("node", addr = %node);
        let result = span.in_scope(|| f(dsr, &mut ctx));

        self.apply(node, ctx);
        Some(result)
    }

    fn apply(&mut self, node: NodeAddress, ctx: NodeOutbox) {
        for (token, delay) in ctx.timers {
            self.schedule(self.now + delay, Event::Timer { node, token });
        }

        for (datagram, next_hop, delay) in ctx.transmits {
            self.stats.frames_transmitted += 1;
            let arrival = self.now + delay + self.config.link_delay;

            if next_hop.is_broadcast() {
                self.stats.broadcasts += 1;
                let neighbors: Vec<_> = self.topology.neighbors(node).collect();
                for neighbor in neighbors {
                    self.schedule(
                        arrival,
                        Event::Deliver {
                            to: neighbor,
                            from: node,
                            datagram: datagram.clone(),
                        },
                    );
                }
            } else if self.topology.are_connected(node, next_hop) {
                if self.config.overhear {
                    let listeners: Vec<_> = self
                        .topology
                        .neighbors(node)
                        .filter(|n| *n != next_hop)
                        .collect();
                    for listener in listeners {
                        self.schedule(
                            arrival,
                            Event::Overhear {
                                node: listener,
                                from: node,
                                datagram: datagram.clone(),
                            },
                        );
                    }
                }
                self.schedule(
                    arrival,
                    Event::Deliver {
                        to: next_hop,
                        from: node,
                        datagram,
                    },
                );
                self.schedule(
                    arrival,
                    Event::LinkReport {
                        node,
                        status: LinkStatus::Delivered { next_hop },
                    },
                );
            } else {
                self.stats.link_failures += 1;
                trace!(node = %node, next_hop = %next_hop, "No link to next hop");
                self.schedule(
                    arrival,
                    Event::LinkReport {
                        node,
                        status: LinkStatus::Failed { datagram, next_hop },
                    },
                );
            }
        }
    }

    fn schedule(&mut self, at: SimTime, event: Event) {
        self.seq += 1;
        self.queue.push(Scheduled {
            at,
            seq: self.seq,
            event,
        });
    }
}
