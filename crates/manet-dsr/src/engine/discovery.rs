//! Route discovery: requests, replies and the originating side of routing

use std::iter;

use manet_core::{Datagram, DropReason, NodeAddress, NodeContext};
use tracing::{debug, trace, warn};

use super::{Dsr, RouteDecision};
use crate::codec::{
    DsrOption, DsrPacket, MAX_OPTION_DATA_LEN, RouteReply, RouteRequest, SourceRoute,
};
use crate::timers::DsrTimer;

impl Dsr {
    /// Route a packet this node originated
    pub(super) fn route_originated<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        datagram: Datagram,
    ) -> RouteDecision {
        let destination = datagram.destination;

        if let Some(path) = self.route_cache.lookup(destination).map(|e| e.path.clone()) {
            if !datagram.is_dsr() {
                self.stats.data_initiated += 1;
            }
            return match self.transmit_with_source_route(ctx, datagram, &path, 0) {
                Ok(()) => RouteDecision::Transmitted,
                Err(reason) => RouteDecision::Dropped(reason),
            };
        }

        let now = ctx.now();
        let discovering = self
            .request_table
            .sent(destination)
            .is_some_and(|entry| !entry.backoff_elapsed(now));
        if !discovering {
            self.initiate_request(ctx, destination);
        }

        self.buffer_packet(ctx, datagram)
    }

    /// Hold a packet until a route to its destination is known. Packets
    /// beyond the buffer limit are dropped and counted.
    fn buffer_packet<C: NodeContext>(&mut self, ctx: &mut C, datagram: Datagram) -> RouteDecision {
        let key = datagram.key();
        let token = self
            .timers
            .arm(ctx, DsrTimer::PacketTimeout { key }, self.config.send_buffer.timeout);

        match self.send_buffer.insert(datagram, ctx.now(), token) {
            Ok(()) => {
                trace!(dest = %key.destination, id = key.id, "Buffered packet awaiting route");
                RouteDecision::Buffered
            }
            Err(err) => {
                self.timers.cancel(ctx, token);
                self.stats.data_dropped_over_limit += 1;
                warn!(
                    node = %self.local_address,
                    dest = %key.destination,
                    error = %err,
                    reason = %DropReason::BufferFull,
                    "Send buffer full, dropping packet"
                );
                RouteDecision::Dropped(DropReason::BufferFull)
            }
        }
    }

    /// Start a discovery round for `destination` with a non-propagating
    /// request
    pub(super) fn initiate_request<C: NodeContext>(&mut self, ctx: &mut C, destination: NodeAddress) {
        let now = ctx.now();
        let entry = self
            .request_table
            .add_sent(destination, now, &self.config.discovery);
        let previous = entry.retry_timer.take();
        self.cancel_timer(ctx, previous);
        self.cancel_orphaned_timers(ctx);

        let ttl = self.config.discovery.non_propagating_ttl;
        let identification = self.broadcast_request(ctx, destination, ttl);
        self.stats.requests_initiated += 1;

        debug!(
            node = %self.local_address,
            target = %destination,
            identification,
            ttl,
            "Initiated route request"
        );

        let timeout = self.config.discovery.non_propagating_timeout;
        let token = self
            .timers
            .arm(ctx, DsrTimer::CheckReplied { destination }, timeout);
        self.request_table.set_retry_timer(destination, Some(token));
    }

    /// Send a propagating request, or restart discovery once the retries
    /// are used up
    fn retry_request<C: NodeContext>(&mut self, ctx: &mut C, destination: NodeAddress) {
        let now = ctx.now();
        let exhausted = self
            .request_table
            .sent(destination)
            .is_some_and(|entry| entry.exhausted(&self.config.discovery));
        if exhausted {
            debug!(node = %self.local_address, target = %destination, "Request retries exhausted, restarting discovery");
            self.initiate_request(ctx, destination);
            return;
        }

        let Some(entry) = self.request_table.sent_mut(destination) else {
            return;
        };
        entry.record_retry(now, &self.config.discovery);
        let (ttl, backoff, count) = (entry.ttl, entry.backoff, entry.count);

        let identification = self.broadcast_request(ctx, destination, ttl);
        self.stats.requests_resent += 1;

        debug!(
            node = %self.local_address,
            target = %destination,
            identification,
            ttl,
            count,
            ?backoff,
            "Resent route request"
        );

        let token = self
            .timers
            .arm(ctx, DsrTimer::CheckReplied { destination }, backoff);
        let previous = self.request_table.set_retry_timer(destination, Some(token));
        self.cancel_timer(ctx, previous);
    }

    /// Retry timer expired: resend if packets are still waiting and no
    /// route has turned up
    pub(super) fn check_replied<C: NodeContext>(&mut self, ctx: &mut C, destination: NodeAddress) {
        if self.route_cache.lookup(destination).is_some()
            || !self.send_buffer.contains_destination(destination)
        {
            return;
        }

        let now = ctx.now();
        let due = self
            .request_table
            .sent(destination)
            .is_some_and(|entry| entry.retry_due(now));
        if due {
            self.retry_request(ctx, destination);
        }
    }

    /// Broadcast a fresh request for `target`, returning its identification
    fn broadcast_request<C: NodeContext>(&mut self, ctx: &mut C, target: NodeAddress, ttl: u8) -> u16 {
        let identification = self.request_id;
        self.request_id = self.request_id.wrapping_add(1);

        let packet = DsrPacket::control()
            .with_option(DsrOption::RouteRequest(RouteRequest::new(identification, target)));
        let datagram = self
            .control_datagram(NodeAddress::BROADCAST, &packet)
            .with_ttl(ttl);
        let delay = self.jitter();
        ctx.transmit(datagram, NodeAddress::BROADCAST, delay);
        identification
    }

    /// Process a route request option.
    ///
    /// Returns `true` when the request is discarded (loop, duplicate or
    /// hop limit), in which case the remaining options are skipped.
    pub(super) fn handle_request<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        datagram: &Datagram,
        packet: &DsrPacket,
        index: usize,
        request: &RouteRequest,
        previous_hop: NodeAddress,
    ) -> bool {
        self.stats.requests_received += 1;
        let requester = datagram.source;

        let travelled: Vec<_> = iter::once(requester)
            .chain(request.recorded.iter().copied())
            .collect();
        self.learn_routes(ctx, &travelled, previous_hop);

        if request.target == self.local_address {
            self.stats.requests_received_as_destination += 1;
            self.initiate_reply(ctx, requester, request);
            return false;
        }

        if requester == self.local_address || request.recorded.contains(&self.local_address) {
            self.stats.requests_in_loop += 1;
            trace!(node = %self.local_address, src = %requester, "Discarding looping request");
            return true;
        }

        if self
            .request_table
            .check_seen(requester, request.identification, request.target)
        {
            self.stats.requests_duplicate += 1;
            trace!(
                node = %self.local_address,
                src = %requester,
                identification = request.identification,
                reason = %DropReason::Duplicate,
                "Discarding duplicate request"
            );
            return true;
        }
        self.request_table
            .add_seen(requester, request.identification, request.target);
        self.cancel_orphaned_timers(ctx);

        if self.cached_reply(ctx, requester, request) {
            return false;
        }

        if datagram.ttl <= 1 {
            self.stats.requests_ttl_expired += 1;
            trace!(
                node = %self.local_address,
                src = %requester,
                reason = %DropReason::TtlExpired,
                "Request hop limit reached"
            );
            return true;
        }

        self.relay_request(ctx, datagram, packet, index, request);
        false
    }

    /// Answer a request for this node with the recorded route
    fn initiate_reply<C: NodeContext>(&mut self, ctx: &mut C, requester: NodeAddress, request: &RouteRequest) {
        let path: Vec<_> = request
            .recorded
            .iter()
            .copied()
            .chain(iter::once(self.local_address))
            .collect();

        self.stats.replies_initiated_as_destination += 1;
        debug!(
            node = %self.local_address,
            requester = %requester,
            hops = path.len(),
            "Replying to route request"
        );
        self.send_reply(ctx, requester, &request.recorded, RouteReply::new(path));
    }

    /// Answer on behalf of the target from the route cache.
    ///
    /// Refused when the joined route would loop or overflow the reply
    /// option; the request is then relayed as usual.
    fn cached_reply<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        requester: NodeAddress,
        request: &RouteRequest,
    ) -> bool {
        let Some(cached) = self.route_cache.lookup(request.target).map(|e| e.path.clone()) else {
            return false;
        };

        if cached.contains(&requester) || request.recorded.iter().any(|hop| cached.contains(hop)) {
            trace!(node = %self.local_address, target = %request.target, "Cached route would loop");
            return false;
        }

        let hops = request.recorded.len() + 1 + cached.len();
        if RouteReply::data_len_for(hops) > MAX_OPTION_DATA_LEN {
            trace!(node = %self.local_address, hops, "Cached route too long for a reply");
            return false;
        }

        let path: Vec<_> = request
            .recorded
            .iter()
            .copied()
            .chain(iter::once(self.local_address))
            .chain(cached)
            .collect();

        self.stats.replies_initiated_as_intermediate += 1;
        debug!(
            node = %self.local_address,
            requester = %requester,
            target = %request.target,
            hops = path.len(),
            "Replying from route cache"
        );
        self.send_reply(ctx, requester, &request.recorded, RouteReply::new(path));
        true
    }

    /// Send a reply back along the reverse of `recorded`
    fn send_reply<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        requester: NodeAddress,
        recorded: &[NodeAddress],
        reply: RouteReply,
    ) {
        let reverse: Vec<_> = recorded.iter().rev().copied().collect();
        let next_hop = reverse.first().copied().unwrap_or(requester);

        let mut packet = DsrPacket::control();
        if !reverse.is_empty() {
            packet = packet.with_option(DsrOption::SourceRoute(SourceRoute::new(reverse)));
        }
        packet = packet.with_option(DsrOption::RouteReply(reply));

        let ttl = u8::try_from(recorded.len() + 1).unwrap_or(u8::MAX);
        let datagram = self.control_datagram(requester, &packet).with_ttl(ttl);
        if !self.fits_mtu(&datagram) {
            return;
        }
        let delay = self.jitter();
        ctx.transmit(datagram, next_hop, delay);
    }

    /// Append this node to the request and rebroadcast it
    fn relay_request<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        datagram: &Datagram,
        packet: &DsrPacket,
        index: usize,
        request: &RouteRequest,
    ) {
        if !request.can_record_another() {
            debug!(
                node = %self.local_address,
                recorded = request.recorded.len(),
                "Request route record full, not relaying"
            );
            return;
        }

        let mut relayed = packet.clone();
        if let Some(DsrOption::RouteRequest(option)) = relayed.options.get_mut(index) {
            option.recorded.push(self.local_address);
        }

        let datagram = Datagram {
            ttl: datagram.ttl - 1,
            payload: relayed.encode(),
            ..datagram.clone()
        };
        self.stats.requests_relayed += 1;
        trace!(
            node = %self.local_address,
            src = %datagram.source,
            target = %request.target,
            ttl = datagram.ttl,
            "Relaying route request"
        );
        let delay = self.jitter();
        ctx.transmit(datagram, NodeAddress::BROADCAST, delay);
    }

    /// Process a route reply option
    pub(super) fn handle_reply<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        destination: NodeAddress,
        reply: &RouteReply,
        previous_hop: NodeAddress,
    ) {
        self.stats.replies_received += 1;

        if destination == self.local_address {
            self.stats.replies_received_as_source += 1;
            if let Some(entry) = reply.target().and_then(|t| self.request_table.delete_sent(t)) {
                debug!(node = %self.local_address, target = %entry.destination, "Discovery completed");
                self.cancel_timer(ctx, entry.retry_timer);
            }
        }

        let path: Vec<_> = iter::once(destination)
            .chain(reply.path.iter().copied())
            .collect();
        self.learn_routes(ctx, &path, previous_hop);
    }
}
