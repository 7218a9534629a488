//! DSR protocol engine
//!
//! One [`Dsr`] instance runs per node. It owns every table and buffer of
//! that node and is driven synchronously through its entry points:
//!
//! - [`Dsr::route_packet`]: the router function, for packets the network
//!   layer wants to send or forward
//! - [`Dsr::receive_from_link`]: network-layer dispatch of a received frame
//! - [`Dsr::handle_protocol_packet`]: DSR packets addressed to this node
//! - [`Dsr::peek`]: frames overheard in promiscuous mode
//! - [`Dsr::handle_link_status`]: transmission outcomes from the link layer
//! - [`Dsr::handle_timer`]: expiry of a timer the engine scheduled
//!
//! The node's clock, link layer and timer service come in as a
//! [`NodeContext`] on every call.

mod discovery;
mod forwarding;
mod maintenance;

use std::time::Duration;

use manet_core::{
    Datagram, DropReason, LinkStatus, NodeAddress, NodeContext, TimerToken, protocol,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info, instrument, trace, warn};

use crate::codec::{DsrOption, DsrPacket, NO_NEXT_HEADER};
use crate::config::DsrConfig;
use crate::error::{DsrResult, ParseError};
use crate::request_table::RequestTable;
use crate::rexmt_buffer::RexmtBuffer;
use crate::route_cache::{InsertOutcome, RouteCache};
use crate::send_buffer::SendBuffer;
use crate::stats::DsrStats;
use crate::timers::{DsrTimer, TimerRegistry};

/// Outcome of the router function
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// DSR did not take the packet; the network layer handles it
    NotRouted(Datagram),
    /// Sent towards the destination with a source route
    Transmitted,
    /// Waiting in the send buffer for route discovery
    Buffered,
    /// Forwarded along the source route it carries
    Forwarded,
    /// Dropped
    Dropped(DropReason),
}

impl RouteDecision {
    /// Whether DSR took ownership of the packet
    pub fn was_routed(&self) -> bool {
        !matches!(self, Self::NotRouted(_))
    }
}

/// A DSR routing instance
#[derive(Debug)]
pub struct Dsr {
    local_address: NodeAddress,
    config: DsrConfig,
    route_cache: RouteCache,
    request_table: RequestTable,
    send_buffer: SendBuffer,
    rexmt_buffer: RexmtBuffer,
    timers: TimerRegistry,
    stats: DsrStats,
    /// Identification of the next route request
    request_id: u16,
    /// Identification of the next control datagram
    datagram_id: u16,
    rng: StdRng,
}

impl Dsr {
    /// Create an instance for `local_address`
    pub fn new(local_address: NodeAddress, config: DsrConfig) -> DsrResult<Self> {
        config.validate()?;

        info!(node = %local_address, seed = config.seed, "DSR initialized");

        Ok(Self {
            local_address,
            route_cache: RouteCache::new(&config.route_cache),
            request_table: RequestTable::new(&config.request_table),
            send_buffer: SendBuffer::new(&config.send_buffer),
            rexmt_buffer: RexmtBuffer::new(config.maintenance.rexmt_buffer_size),
            timers: TimerRegistry::new(),
            stats: DsrStats::default(),
            request_id: 0,
            datagram_id: 0,
            rng: StdRng::seed_from_u64(config.seed),
            config,
        })
    }

    pub fn local_address(&self) -> NodeAddress {
        self.local_address
    }

    /// Address-change notification
    pub fn set_local_address(&mut self, address: NodeAddress) {
        info!(old = %self.local_address, new = %address, "Local address changed");
        self.local_address = address;
    }

    pub fn config(&self) -> &DsrConfig {
        &self.config
    }

    pub fn stats(&self) -> &DsrStats {
        &self.stats
    }

    pub fn route_cache(&self) -> &RouteCache {
        &self.route_cache
    }

    pub fn request_table(&self) -> &RequestTable {
        &self.request_table
    }

    pub fn send_buffer(&self) -> &SendBuffer {
        &self.send_buffer
    }

    pub fn rexmt_buffer(&self) -> &RexmtBuffer {
        &self.rexmt_buffer
    }

    /// Shut the instance down and return its statistics
    pub fn finalize(&mut self) -> DsrStats {
        if self.config.collect_statistics {
            let stats = &self.stats;
            info!(
                node = %self.local_address,
                requests_initiated = stats.requests_initiated,
                replies_received = stats.replies_received,
                errors_initiated = stats.errors_initiated,
                data_initiated = stats.data_initiated,
                data_received = stats.data_received,
                data_forwarded = stats.data_forwarded,
                routes_added = stats.routes_added,
                average_route_length = stats.average_route_length(),
                salvaged = stats.salvaged,
                "DSR statistics"
            );
        }
        self.stats.clone()
    }

    /// Router function
    ///
    /// `previous_hop` is `None` for packets originated by this node.
    #[instrument(
        skip(self, ctx, datagram),
        fields(node = %self.local_address, dest = %datagram.destination, id = datagram.id)
    )]
    pub fn route_packet<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        datagram: Datagram,
        previous_hop: Option<NodeAddress>,
    ) -> RouteDecision {
        let destination = datagram.destination;

        match previous_hop {
            None if destination == self.local_address => RouteDecision::NotRouted(datagram),
            None => self.route_originated(ctx, datagram),
            Some(_) if destination == self.local_address => {
                if !datagram.is_dsr() {
                    self.stats.data_received += 1;
                }
                RouteDecision::NotRouted(datagram)
            }
            Some(previous_hop) => self.route_transit(ctx, datagram, previous_hop),
        }
    }

    /// Dispatch a received frame the way the network layer does.
    ///
    /// Returns the datagram to deliver upward, if any.
    pub fn receive_from_link<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        datagram: Datagram,
        previous_hop: NodeAddress,
    ) -> Option<Datagram> {
        let for_us = datagram.destination == self.local_address || datagram.destination.is_broadcast();
        if datagram.is_dsr() && for_us {
            return self.handle_protocol_packet(ctx, datagram, previous_hop);
        }

        match self.route_packet(ctx, datagram, Some(previous_hop)) {
            RouteDecision::NotRouted(datagram) => Some(datagram),
            _ => None,
        }
    }

    /// Process a DSR packet addressed to this node or broadcast.
    ///
    /// An encapsulated payload addressed to this node is returned for upward
    /// delivery.
    #[instrument(
        skip(self, ctx, datagram),
        fields(node = %self.local_address, src = %datagram.source, prev = %previous_hop)
    )]
    pub fn handle_protocol_packet<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        datagram: Datagram,
        previous_hop: NodeAddress,
    ) -> Option<Datagram> {
        let packet = self.decode(&datagram)?;
        self.handle_options(ctx, &datagram, &packet, previous_hop, false);

        if packet.next_header == NO_NEXT_HEADER || datagram.destination != self.local_address {
            return None;
        }
        self.stats.data_received += 1;
        Some(Datagram {
            protocol: packet.next_header,
            payload: packet.payload,
            ..datagram
        })
    }

    /// Learn from a frame overheard in promiscuous mode
    pub fn peek<C: NodeContext>(&mut self, ctx: &mut C, datagram: &Datagram, previous_hop: NodeAddress) {
        if !datagram.is_dsr() {
            return;
        }
        let Some(packet) = self.decode(datagram) else {
            return;
        };
        // Requests are broadcast, so the copy addressed to us is handled anyway
        if packet.starts_with_route_request() {
            return;
        }
        trace!(node = %self.local_address, src = %datagram.source, "Overheard DSR packet");
        self.handle_options(ctx, datagram, &packet, previous_hop, true);
    }

    /// Transmission outcome reported by the link layer
    #[instrument(skip(self, ctx, status), fields(node = %self.local_address, next_hop = %status.next_hop()))]
    pub fn handle_link_status<C: NodeContext>(&mut self, ctx: &mut C, status: LinkStatus) {
        match status {
            LinkStatus::Delivered { next_hop } => {
                let confirmed = self.rexmt_buffer.remove_by_next_hop(next_hop);
                trace!(confirmed, "Next hop confirmed");
            }
            LinkStatus::Failed { datagram, next_hop } => {
                self.handle_link_failure(ctx, datagram, next_hop);
            }
        }
    }

    /// A timer scheduled by this instance fired
    pub fn handle_timer<C: NodeContext>(&mut self, ctx: &mut C, token: TimerToken) {
        let Some(timer) = self.timers.fire(token) else {
            trace!(node = %self.local_address, %token, "Ignoring stale timer");
            return;
        };

        match timer {
            DsrTimer::CheckReplied { destination } => {
                if self.request_table.sent(destination).and_then(|e| e.retry_timer) == Some(token) {
                    self.request_table.set_retry_timer(destination, None);
                }
                self.check_replied(ctx, destination);
            }
            DsrTimer::PacketTimeout { key } => {
                if self.send_buffer.remove(key).is_some() {
                    self.stats.data_dropped_no_route += 1;
                    debug!(
                        node = %self.local_address,
                        dest = %key.destination,
                        id = key.id,
                        reason = %DropReason::Expired,
                        "Buffered packet expired"
                    );
                }
            }
            DsrTimer::RouteCacheSweep => {
                self.route_cache.sweep_timer = None;
                let outcome = self.route_cache.age_sweep(ctx.now());
                if outcome.evicted > 0 {
                    debug!(node = %self.local_address, evicted = outcome.evicted, "Expired cached routes");
                }
                if let Some(delay) = outcome.next_expiry {
                    let token = self.timers.arm(ctx, DsrTimer::RouteCacheSweep, delay);
                    self.route_cache.sweep_timer = Some(token);
                }
            }
        }
    }

    /// Walk the option chain of a received packet.
    ///
    /// Returns `true` if the packet was forwarded along its source route.
    fn handle_options<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        datagram: &Datagram,
        packet: &DsrPacket,
        previous_hop: NodeAddress,
        overheard: bool,
    ) -> bool {
        let transit = datagram.destination != self.local_address && !datagram.destination.is_broadcast();
        let mut forwarded = false;

        for (index, option) in packet.options.iter().enumerate() {
            match option {
                DsrOption::Pad1 | DsrOption::PadN(_) => {}
                DsrOption::RouteRequest(request) => {
                    if overheard
                        || self.handle_request(ctx, datagram, packet, index, request, previous_hop)
                    {
                        break;
                    }
                }
                DsrOption::RouteReply(reply) => {
                    self.handle_reply(ctx, datagram.destination, reply, previous_hop);
                }
                DsrOption::RouteError(error) => {
                    self.handle_route_error(error);
                }
                DsrOption::SourceRoute(route) => {
                    self.learn_from_source_route(ctx, datagram, packet, route, previous_hop);
                    if !overheard && transit {
                        forwarded |= self.forward_with_source_route(ctx, datagram, packet);
                    }
                }
            }
        }
        forwarded
    }

    /// Store the usable sub-paths of `path` in both directions
    fn learn_routes<C: NodeContext>(&mut self, ctx: &mut C, path: &[NodeAddress], previous_hop: NodeAddress) {
        let self_included = path.contains(&self.local_address);

        let reversed: Vec<_> = path.iter().rev().copied().collect();
        self.store_directional(ctx, &reversed, previous_hop, self_included);
        self.store_directional(ctx, path, previous_hop, self_included);
    }

    /// Cache every prefix of the part of `path` reachable from here.
    ///
    /// If this node is on the path, that is the part after it. Otherwise
    /// the path is entered through `previous_hop`, which is prepended when
    /// the path does not already contain it.
    fn store_directional<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        path: &[NodeAddress],
        previous_hop: NodeAddress,
        self_included: bool,
    ) {
        let route: Vec<NodeAddress> = if self_included {
            match path.iter().position(|hop| *hop == self.local_address) {
                Some(index) => path[index + 1..].to_vec(),
                None => return,
            }
        } else if let Some(index) = path.iter().position(|hop| *hop == previous_hop) {
            path[index..].to_vec()
        } else if !previous_hop.is_any() {
            std::iter::once(previous_hop).chain(path.iter().copied()).collect()
        } else {
            return;
        };

        for len in (1..=route.len()).rev() {
            self.add_route(ctx, &route[..len]);
        }
    }

    /// Insert a route and flush packets waiting for its destination
    fn add_route<C: NodeContext>(&mut self, ctx: &mut C, path: &[NodeAddress]) {
        let now = ctx.now();
        if self.route_cache.insert(path, now) != InsertOutcome::Inserted {
            return;
        }

        self.stats.routes_added += 1;
        self.stats.route_hops_added += path.len() as u64;

        if self.route_cache.sweep_timer.is_none() {
            let timeout = self.route_cache.timeout();
            let token = self.timers.arm(ctx, DsrTimer::RouteCacheSweep, timeout);
            self.route_cache.sweep_timer = Some(token);
        }

        if let Some(&destination) = path.last() {
            self.flush_send_buffer(ctx, destination, path);
        }
    }

    /// Next identification for a datagram generated by DSR itself
    fn control_datagram(&mut self, destination: NodeAddress, packet: &DsrPacket) -> Datagram {
        let id = self.datagram_id;
        self.datagram_id = self.datagram_id.wrapping_add(1);
        Datagram::new(self.local_address, destination, id, protocol::DSR, packet.encode())
    }

    /// Random delay for requests and replies
    fn jitter(&mut self) -> Duration {
        let max = self.config.broadcast_jitter;
        if max.is_zero() {
            return Duration::ZERO;
        }
        max.mul_f64(self.rng.random::<f64>())
    }

    /// Check a datagram against the MTU, counting it if it is too large
    fn fits_mtu(&mut self, datagram: &Datagram) -> bool {
        if datagram.len() > self.config.mtu {
            self.stats.packets_greater_mtu += 1;
            warn!(
                node = %self.local_address,
                dest = %datagram.destination,
                len = datagram.len(),
                mtu = self.config.mtu,
                "Packet larger than MTU dropped"
            );
            return false;
        }
        true
    }

    fn decode(&mut self, datagram: &Datagram) -> Option<DsrPacket> {
        match DsrPacket::decode(&datagram.payload) {
            Ok(packet) => Some(packet),
            Err(err) => {
                self.record_parse_error(datagram, &err);
                None
            }
        }
    }

    fn record_parse_error(&mut self, datagram: &Datagram, err: &ParseError) {
        self.stats.parse_errors += 1;
        warn!(
            node = %self.local_address,
            src = %datagram.source,
            error = %err,
            reason = %DropReason::Malformed,
            "Dropping malformed DSR packet"
        );
    }

    fn cancel_timer<C: NodeContext>(&mut self, ctx: &mut C, token: Option<TimerToken>) {
        if let Some(token) = token {
            self.timers.cancel(ctx, token);
        }
    }

    /// Cancel retry timers of discoveries the request table evicted
    fn cancel_orphaned_timers<C: NodeContext>(&mut self, ctx: &mut C) {
        for token in self.request_table.take_orphaned_timers() {
            self.timers.cancel(ctx, token);
        }
    }
}
