//! Route maintenance: link failures, route errors and salvaging

use std::time::Duration;

use manet_core::{DEFAULT_TTL, Datagram, DropReason, NodeAddress, NodeContext};
use tracing::{debug, trace};

use super::Dsr;
use crate::codec::{DsrOption, DsrPacket, ERROR_NODE_UNREACHABLE, NO_NEXT_HEADER, RouteError};

impl Dsr {
    /// The link layer could not deliver `datagram` to `next_hop`
    pub(super) fn handle_link_failure<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        datagram: Datagram,
        next_hop: NodeAddress,
    ) {
        let packet = if datagram.is_dsr() {
            let Some(packet) = self.decode(&datagram) else {
                return;
            };
            if packet.starts_with_route_request() || packet.has_route_reply() {
                trace!(node = %self.local_address, next_hop = %next_hop, "Ignoring failed discovery packet");
                return;
            }
            Some(packet)
        } else {
            None
        };

        self.packet_drop(ctx, datagram, packet, next_hop);
    }

    /// Retransmit a failed packet, or give up on the link and try to
    /// salvage it.
    fn packet_drop<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        datagram: Datagram,
        packet: Option<DsrPacket>,
        next_hop: NodeAddress,
    ) {
        let key = datagram.key();
        let now = ctx.now();
        let max_retransmissions = self.config.maintenance.max_retransmissions;

        let retry = match self.rexmt_buffer.find_mut(key, next_hop) {
            Some(entry) if entry.count < max_retransmissions => {
                entry.count += 1;
                entry.timestamp = now;
                Some((entry.datagram.clone(), entry.count))
            }
            _ => None,
        };
        if let Some((copy, count)) = retry {
            debug!(
                node = %self.local_address,
                dest = %key.destination,
                next_hop = %next_hop,
                count,
                "Retransmitting to next hop"
            );
            ctx.transmit(copy, next_hop, Duration::ZERO);
            return;
        }

        self.stats.link_breaks += 1;
        let purged = self
            .route_cache
            .delete_by_link(self.local_address, self.local_address, next_hop);
        debug!(
            node = %self.local_address,
            next_hop = %next_hop,
            purged,
            "Link broken"
        );

        if datagram.source != self.local_address {
            self.send_route_error(ctx, &datagram, packet.as_ref(), next_hop);
        }
        self.salvage(ctx, datagram, packet);
        self.rexmt_buffer.remove(key, next_hop);
    }

    /// Report the broken link to the packet's source, or to the node that
    /// last salvaged it
    fn send_route_error<C: NodeContext>(
        &mut self,
        ctx: &mut C,
        datagram: &Datagram,
        packet: Option<&DsrPacket>,
        unreachable: NodeAddress,
    ) {
        let route = packet.and_then(|p| match p.options.first() {
            Some(DsrOption::SourceRoute(route)) => Some(route),
            _ => None,
        });
        let (salvage, destination) = match route {
            Some(route) if route.salvage > 0 => {
                (route.salvage, route.salvage_origin.unwrap_or(datagram.source))
            }
            Some(route) => (route.salvage, datagram.source),
            None => (0, datagram.source),
        };

        let error = RouteError::node_unreachable(salvage, self.local_address, destination, unreachable);
        let packet = DsrPacket::control().with_option(DsrOption::RouteError(error));
        let error_datagram = self
            .control_datagram(destination, &packet)
            .with_ttl(DEFAULT_TTL);

        self.stats.errors_initiated += 1;
        debug!(
            node = %self.local_address,
            dest = %destination,
            unreachable = %unreachable,
            "Sending route error"
        );
        let decision = self.route_packet(ctx, error_datagram, None);
        trace!(?decision, "Route error routed");
    }

    /// Re-send a packet over another cached route, bumping its salvage count
    fn salvage<C: NodeContext>(&mut self, ctx: &mut C, datagram: Datagram, packet: Option<DsrPacket>) {
        let destination = datagram.destination;
        let Some(path) = self.route_cache.lookup(destination).map(|e| e.path.clone()) else {
            self.stats.data_dropped_rexmt_timeout += 1;
            debug!(
                node = %self.local_address,
                dest = %destination,
                reason = %DropReason::NoRoute,
                "No alternate route, dropping packet"
            );
            return;
        };

        let (datagram, salvage) = match packet {
            Some(mut packet) if matches!(packet.options.first(), Some(DsrOption::SourceRoute(_))) => {
                let Some(route) = packet.take_source_route() else {
                    return;
                };
                if route.salvage >= self.config.maintenance.max_salvage_count {
                    debug!(
                        node = %self.local_address,
                        dest = %destination,
                        salvage = route.salvage,
                        reason = %DropReason::SalvageExhausted,
                        "Salvage limit reached, dropping packet"
                    );
                    return;
                }

                let stripped = if packet.options.is_empty() && packet.next_header != NO_NEXT_HEADER {
                    Datagram {
                        protocol: packet.next_header,
                        payload: packet.payload,
                        ..datagram
                    }
                } else {
                    Datagram {
                        payload: packet.encode(),
                        ..datagram
                    }
                };
                (stripped, route.salvage + 1)
            }
            _ => (datagram, 1),
        };

        self.stats.salvaged += 1;
        debug!(
            node = %self.local_address,
            dest = %destination,
            salvage,
            hops = path.len(),
            "Salvaging packet"
        );
        if let Err(reason) = self.transmit_with_source_route(ctx, datagram, &path, salvage) {
            debug!(node = %self.local_address, dest = %destination, %reason, "Salvaged packet dropped");
        }
    }

    /// Process a route error option
    pub(super) fn handle_route_error(&mut self, error: &RouteError) {
        self.stats.errors_received += 1;
        if error.destination == self.local_address {
            self.stats.errors_received_as_source += 1;
        }

        if error.error_type != ERROR_NODE_UNREACHABLE {
            trace!(node = %self.local_address, error_type = error.error_type, "Ignoring route error type");
            return;
        }

        let removed = self
            .route_cache
            .delete_by_link(self.local_address, error.source, error.unreachable);
        debug!(
            node = %self.local_address,
            from = %error.source,
            to = %error.unreachable,
            removed,
            "Route error received"
        );
    }
}
