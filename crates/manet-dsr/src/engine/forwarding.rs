//! Source-routed transmission and per-hop forwarding

use std::iter;
use std::time::Duration;

use manet_core::{Datagram, DropReason, NodeAddress, NodeContext, protocol};
use tracing::{debug, trace};

use super::{Dsr, RouteDecision};
use crate::codec::{DsrOption, DsrPacket, NO_NEXT_HEADER, SourceRoute};

impl Dsr {
    /// Route a unicast packet that is neither from nor for this node
    pub(super) fn route_transit<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        datagram: Datagram,
        previous_hop: NodeAddress,
    ) -> RouteDecision {
        if !datagram.is_dsr() {
            debug!(
                node = %self.local_address,
                src = %datagram.source,
                reason = %DropReason::NoRoute,
                "Transit packet without a source route"
            );
            return RouteDecision::Dropped(DropReason::NoRoute);
        }
        if datagram.ttl <= 1 {
            trace!(node = %self.local_address, reason = %DropReason::TtlExpired, "Transit packet expired");
            return RouteDecision::Dropped(DropReason::TtlExpired);
        }

        let Some(packet) = self.decode(&datagram) else {
            return RouteDecision::Dropped(DropReason::Malformed);
        };

        if self.handle_options(ctx, &datagram, &packet, previous_hop, false) {
            RouteDecision::Forwarded
        } else {
            RouteDecision::Dropped(DropReason::NoRoute)
        }
    }

    /// Send `datagram` along `path`, the hops after this node ending at the
    /// destination.
    ///
    /// A one-hop path goes out bare. Longer paths get a source route
    /// option, added in front of any existing DSR options or wrapped around
    /// the original payload. The copy handed to the link layer is kept for
    /// retransmission.
    pub(super) fn transmit_with_source_route<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        datagram: Datagram,
        path: &[NodeAddress],
        salvage: u8,
    ) -> Result<(), DropReason> {
        let Some((&next_hop, _)) = path.split_first() else {
            return Err(DropReason::NoRoute);
        };
        let ttl = u8::try_from(path.len()).unwrap_or(u8::MAX);

        let datagram = if path.len() == 1 {
            datagram.with_ttl(ttl)
        } else {
            let route = SourceRoute::new(path[..path.len() - 1].to_vec())
                .salvaged(salvage, self.local_address);

            let packet = if datagram.is_dsr() {
                let Some(mut packet) = self.decode(&datagram) else {
                    return Err(DropReason::Malformed);
                };
                packet.options.insert(0, DsrOption::SourceRoute(route));
                packet
            } else {
                DsrPacket::encapsulate(datagram.protocol, datagram.payload.clone())
                    .with_option(DsrOption::SourceRoute(route))
            };

            Datagram {
                protocol: protocol::DSR,
                ttl,
                payload: packet.encode(),
                ..datagram
            }
        };

        if !self.fits_mtu(&datagram) {
            return Err(DropReason::TooLarge);
        }

        trace!(
            node = %self.local_address,
            dest = %datagram.destination,
            next_hop = %next_hop,
            hops = path.len(),
            salvage,
            "Sending with source route"
        );
        self.send_unicast(ctx, datagram, next_hop, true);
        Ok(())
    }

    /// Learn the route a source-routed packet is travelling
    pub(super) fn learn_from_source_route<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        datagram: &Datagram,
        packet: &DsrPacket,
        route: &SourceRoute,
        previous_hop: NodeAddress,
    ) {
        // Replies are learned from their own option
        if packet.has_route_reply() {
            return;
        }

        let first = route.salvage_origin.unwrap_or(datagram.source);
        let path: Vec<_> = iter::once(first)
            .chain(route.hops.iter().copied())
            .chain(iter::once(datagram.destination))
            .collect();
        self.learn_routes(ctx, &path, previous_hop);
    }

    /// Pass a source-routed packet on to its next hop.
    ///
    /// The source route is dropped on the last segment, and the original
    /// datagram restored if nothing else is left in the DSR header.
    pub(super) fn forward_with_source_route<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        datagram: &Datagram,
        packet: &DsrPacket,
    ) -> bool {
        let mut forwarded = packet.clone();
        let Some(route) = forwarded.source_route_mut() else {
            return false;
        };
        let next_hop = match route.advance() {
            Some(hop) => hop,
            None => {
                forwarded.take_source_route();
                datagram.destination
            }
        };

        let is_reply = forwarded.has_route_reply();
        let is_data = forwarded.next_header != NO_NEXT_HEADER;
        let ttl = datagram.ttl.saturating_sub(1);

        let outgoing = if forwarded.options.is_empty() && is_data {
            Datagram {
                protocol: forwarded.next_header,
                ttl,
                payload: forwarded.payload,
                ..datagram.clone()
            }
        } else {
            Datagram {
                ttl,
                payload: forwarded.encode(),
                ..datagram.clone()
            }
        };

        if is_data {
            self.stats.data_forwarded += 1;
        }
        trace!(
            node = %self.local_address,
            src = %outgoing.source,
            dest = %outgoing.destination,
            next_hop = %next_hop,
            "Forwarding along source route"
        );
        self.send_unicast(ctx, outgoing, next_hop, !is_reply);
        true
    }

    /// Send every packet waiting for `destination` over `path`
    pub(super) fn flush_send_buffer<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        destination: NodeAddress,
        path: &[NodeAddress],
    ) {
        let waiting = self.send_buffer.drain_for(destination);
        if waiting.is_empty() {
            return;
        }
        debug!(
            node = %self.local_address,
            dest = %destination,
            packets = waiting.len(),
            hops = path.len(),
            "Route found, flushing send buffer"
        );

        for packet in waiting {
            self.timers.cancel(ctx, packet.timer);
            if !packet.datagram.is_dsr() {
                self.stats.data_initiated += 1;
            }
            if let Err(reason) = self.transmit_with_source_route(ctx, packet.datagram, path, 0) {
                debug!(node = %self.local_address, dest = %destination, %reason, "Buffered packet dropped");
            }
        }
    }

    fn send_unicast<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        datagram: Datagram,
        next_hop: NodeAddress,
        track: bool,
    ) {
        if track && !self.rexmt_buffer.insert(datagram.clone(), next_hop, ctx.now()) {
            trace!(node = %self.local_address, next_hop = %next_hop, "Retransmission buffer full");
        }
        ctx.transmit(datagram, next_hop, Duration::ZERO);
    }
}
