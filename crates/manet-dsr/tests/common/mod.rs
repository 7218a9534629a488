//! Discrete-event test network
//!
//! Nodes are connected by symmetric links with a fixed latency. Unicast
//! transmissions over a missing link fail and are reported back to the
//! sender; broadcasts reach every current neighbor.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::time::Duration;

use manet_core::{Clock, LinkLayer, SimTime, TimerService, protocol};
use manet_dsr::{
    Datagram, Dsr, DsrConfig, DsrPacket, LinkStatus, NodeAddress, RouteDecision, TimerToken,
};

pub const LINK_LATENCY: Duration = Duration::from_millis(1);

pub fn addr(n: u8) -> NodeAddress {
    NodeAddress::from_octets(10, 0, 0, n)
}

pub fn path(ns: &[u8]) -> Vec<NodeAddress> {
    ns.iter().map(|n| addr(*n)).collect()
}

/// Collects what a node asks of its environment during one call
#[derive(Default)]
struct Outbox {
    now: SimTime,
    transmits: Vec<(Datagram, NodeAddress, Duration)>,
    timers: Vec<(TimerToken, Duration)>,
}

impl Clock for Outbox {
    fn now(&self) -> SimTime {
        self.now
    }
}

impl LinkLayer for Outbox {
    fn transmit(&mut self, datagram: Datagram, next_hop: NodeAddress, delay: Duration) {
        self.transmits.push((datagram, next_hop, delay));
    }
}

impl TimerService for Outbox {
    fn schedule(&mut self, token: TimerToken, delay: Duration) {
        self.timers.push((token, delay));
    }
}

enum Event {
    Arrive {
        to: NodeAddress,
        from: NodeAddress,
        datagram: Datagram,
    },
    Status {
        node: NodeAddress,
        status: LinkStatus,
    },
    Timer {
        node: NodeAddress,
        token: TimerToken,
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
    // Min-heap on (time, insertion order)
    fn cmp(&self, other: &Self) -> Ordering {
        (other.at, other.seq).cmp(&(self.at, self.seq))
    }
}

/// A frame handed to the link layer
#[derive(Debug, Clone)]
pub struct Transmission {
    pub at: SimTime,
    pub from: NodeAddress,
    pub next_hop: NodeAddress,
    pub datagram: Datagram,
}

impl Transmission {
    /// Decoded DSR header, if the frame carries one
    pub fn packet(&self) -> Option<DsrPacket> {
        if self.datagram.protocol != protocol::DSR {
            return None;
        }
        DsrPacket::decode(&self.datagram.payload).ok()
    }
}

pub struct TestNetwork {
    nodes: BTreeMap<NodeAddress, Dsr>,
    links: BTreeSet<(NodeAddress, NodeAddress)>,
    queue: BinaryHeap<Scheduled>,
    seq: u64,
    now: SimTime,
    /// Every frame handed to the link layer, in order
    pub transmissions: Vec<Transmission>,
    /// Datagrams delivered upward: (node, datagram)
    pub delivered: Vec<(NodeAddress, Datagram)>,
}

impl TestNetwork {
    pub fn new(nodes: &[u8], links: &[(u8, u8)], config: DsrConfig) -> Self {
        let nodes = nodes
            .iter()
            .map(|n| {
                let dsr = Dsr::new(addr(*n), config.clone().with_seed(u64::from(*n))).unwrap();
                (addr(*n), dsr)
            })
            .collect();
        let mut network = Self {
            nodes,
            links: BTreeSet::new(),
            queue: BinaryHeap::new(),
            seq: 0,
            now: Duration::ZERO,
            transmissions: Vec::new(),
            delivered: Vec::new(),
        };
        for (a, b) in links {
            network.connect(*a, *b);
        }
        network
    }

    /// A chain 1 - 2 - ... - n
    pub fn line(n: u8, config: DsrConfig) -> Self {
        let nodes: Vec<u8> = (1..=n).collect();
        let links: Vec<(u8, u8)> = (1..n).map(|i| (i, i + 1)).collect();
        Self::new(&nodes, &links, config)
    }

    pub fn connect(&mut self, a: u8, b: u8) {
        self.links.insert((addr(a), addr(b)));
        self.links.insert((addr(b), addr(a)));
    }

    pub fn break_link(&mut self, a: u8, b: u8) {
        self.links.remove(&(addr(a), addr(b)));
        self.links.remove(&(addr(b), addr(a)));
    }

    pub fn node(&self, n: u8) -> &Dsr {
        &self.nodes[&addr(n)]
    }

    pub fn now(&self) -> SimTime {
        self.now
    }

    /// Originate a UDP datagram at `src`
    pub fn send(&mut self, src: u8, dst: u8, id: u16) -> RouteDecision {
        let datagram = Datagram::new(addr(src), addr(dst), id, protocol::UDP, &b"payload"[..]);
        let node = addr(src);
        self.with_node(node, |dsr, ctx| dsr.route_packet(ctx, datagram, None))
    }

    pub fn run_for(&mut self, duration: Duration) {
        let deadline = self.now + duration;
        self.run_until(deadline);
    }

    pub fn run_until(&mut self, deadline: SimTime) {
        while self.queue.peek().is_some_and(|next| next.at <= deadline) {
            let Some(next) = self.queue.pop() else {
                break;
            };
            self.now = next.at;
            self.dispatch(next.event);
        }
        self.now = deadline;
    }

    /// Datagrams delivered at node `n`
    pub fn delivered_at(&self, n: u8) -> Vec<&Datagram> {
        self.delivered
            .iter()
            .filter(|(node, _)| *node == addr(n))
            .map(|(_, d)| d)
            .collect()
    }

    /// Transmissions of the data packet `(src, id)`
    pub fn data_transmissions(&self, src: u8, id: u16) -> Vec<&Transmission> {
        self.transmissions
            .iter()
            .filter(|t| t.datagram.source == addr(src) && t.datagram.id == id)
            .filter(|t| match t.packet() {
                Some(packet) => packet.next_header == protocol::UDP,
                None => t.datagram.protocol == protocol::UDP,
            })
            .collect()
    }

    fn dispatch(&mut self, event: Event) {
        match event {
            Event::Arrive { to, from, datagram } => {
                let delivered = self.with_node(to, |dsr, ctx| dsr.receive_from_link(ctx, datagram, from));
                if let Some(datagram) = delivered {
                    self.delivered.push((to, datagram));
                }
            }
            Event::Status { node, status } => {
                self.with_node(node, |dsr, ctx| dsr.handle_link_status(ctx, status));
            }
            Event::Timer { node, token } => {
                self.with_node(node, |dsr, ctx| dsr.handle_timer(ctx, token));
            }
        }
    }

    fn with_node<R>(&mut self, node: NodeAddress, f: impl FnOnce(&mut Dsr, &mut Outbox) -> R) -> R {
        let mut outbox = Outbox {
            now: self.now,
            ..Default::default()
        };
        let dsr = self.nodes.get_mut(&node).unwrap();
        let result = f(dsr, &mut outbox);
        self.apply(node, outbox);
        result
    }

    fn apply(&mut self, node: NodeAddress, outbox: Outbox) {
        for (token, delay) in outbox.timers {
            self.schedule(self.now + delay, Event::Timer { node, token });
        }

        for (datagram, next_hop, delay) in outbox.transmits {
            let at = self.now + delay;
            self.transmissions.push(Transmission {
                at,
                from: node,
                next_hop,
                datagram: datagram.clone(),
            });
            let arrival = at + LINK_LATENCY;

            if next_hop.is_broadcast() {
                let neighbors: Vec<_> = self
                    .links
                    .iter()
                    .filter(|(a, _)| *a == node)
                    .map(|(_, b)| *b)
                    .collect();
                for neighbor in neighbors {
                    self.schedule(
                        arrival,
                        Event::Arrive {
                            to: neighbor,
                            from: node,
                            datagram: datagram.clone(),
                        },
                    );
                }
            } else if self.links.contains(&(node, next_hop)) {
                self.schedule(
                    arrival,
                    Event::Arrive {
                        to: next_hop,
                        from: node,
                        datagram,
                    },
                );
                self.schedule(
                    arrival,
                    Event::Status {
                        node,
                        status: LinkStatus::Delivered { next_hop },
                    },
                );
            } else {
                self.schedule(
                    arrival,
                    Event::Status {
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
