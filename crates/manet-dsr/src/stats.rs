//! Per-instance protocol counters

use serde::{Deserialize, Serialize};

/// DSR statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsrStats {
    pub requests_initiated: u64,
    pub requests_resent: u64,
    pub requests_relayed: u64,
    pub requests_received: u64,
    pub requests_duplicate: u64,
    pub requests_ttl_expired: u64,
    pub requests_received_as_destination: u64,
    /// Requests discarded because this node is already on the recorded route
    pub requests_in_loop: u64,

    pub replies_initiated_as_destination: u64,
    /// Replies sent on behalf of the target from the route cache
    pub replies_initiated_as_intermediate: u64,
    pub replies_received: u64,
    pub replies_received_as_source: u64,

    pub errors_initiated: u64,
    pub errors_received: u64,
    pub errors_received_as_source: u64,

    pub data_initiated: u64,
    pub data_forwarded: u64,
    pub data_received: u64,
    pub data_dropped_no_route: u64,
    /// Refused by a full send buffer
    pub data_dropped_over_limit: u64,
    /// Could be neither retransmitted nor salvaged
    pub data_dropped_rexmt_timeout: u64,

    pub routes_added: u64,
    /// Sum of the hop counts of every added route
    pub route_hops_added: u64,
    pub salvaged: u64,
    pub link_breaks: u64,
    pub packets_greater_mtu: u64,
    pub parse_errors: u64,
}

impl DsrStats {
    /// Mean hop count of the routes added so far
    pub fn average_route_length(&self) -> f64 {
        if self.routes_added == 0 {
            0.0
        } else {
            self.route_hops_added as f64 / self.routes_added as f64
        }
    }

    /// Fold another instance's counters into this one
    pub fn merge(&mut self, other: &DsrStats) {
        self.requests_initiated += other.requests_initiated;
        self.requests_resent += other.requests_resent;
        self.requests_relayed += other.requests_relayed;
        self.requests_received += other.requests_received;
        self.requests_duplicate += other.requests_duplicate;
        self.requests_ttl_expired += other.requests_ttl_expired;
        self.requests_received_as_destination += other.requests_received_as_destination;
        self.requests_in_loop += other.requests_in_loop;
        self.replies_initiated_as_destination += other.replies_initiated_as_destination;
        self.replies_initiated_as_intermediate += other.replies_initiated_as_intermediate;
        self.replies_received += other.replies_received;
        self.replies_received_as_source += other.replies_received_as_source;
        self.errors_initiated += other.errors_initiated;
        self.errors_received += other.errors_received;
        self.errors_received_as_source += other.errors_received_as_source;
        self.data_initiated += other.data_initiated;
        self.data_forwarded += other.data_forwarded;
        self.data_received += other.data_received;
        self.data_dropped_no_route += other.data_dropped_no_route;
        self.data_dropped_over_limit += other.data_dropped_over_limit;
        self.data_dropped_rexmt_timeout += other.data_dropped_rexmt_timeout;
        self.routes_added += other.routes_added;
        self.route_hops_added += other.route_hops_added;
        self.salvaged += other.salvaged;
        self.link_breaks += other.link_breaks;
        self.packets_greater_mtu += other.packets_greater_mtu;
        self.parse_errors += other.parse_errors;
    }
}
