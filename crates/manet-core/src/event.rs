//! Events crossing the boundary between a routing instance and its link layer

use serde::{Deserialize, Serialize};

use crate::address::NodeAddress;
use crate::datagram::Datagram;

/// Outcome of a unicast transmission, reported by the link layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkStatus {
    /// The next hop acknowledged the frame
    Delivered { next_hop: NodeAddress },
    /// The link layer gave up on the frame; ownership of the datagram
    /// returns to the sender
    Failed {
        datagram: Datagram,
        next_hop: NodeAddress,
    },
}

impl LinkStatus {
    /// Get the next hop this status refers to
    pub fn next_hop(&self) -> NodeAddress {
        match self {
            Self::Delivered { next_hop } => *next_hop,
            Self::Failed { next_hop, .. } => *next_hop,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }
}

/// Reasons a packet might be dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DropReason {
    /// TTL (hop limit) expired
    TtlExpired,
    /// No route available to destination
    NoRoute,
    /// Packet larger than the link MTU
    TooLarge,
    /// Salvage limit reached
    SalvageExhausted,
    /// Buffer capacity exceeded
    BufferFull,
    /// Waited too long for a route
    Expired,
    /// Malformed routing header
    Malformed,
    /// Route request already processed or looping back
    Duplicate,
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TtlExpired => write!(f, "TTL expired"),
            Self::NoRoute => write!(f, "No route available"),
            Self::TooLarge => write!(f, "Packet too large"),
            Self::SalvageExhausted => write!(f, "Salvage limit reached"),
            Self::BufferFull => write!(f, "Buffer full"),
            Self::Expired => write!(f, "Timed out waiting for a route"),
            Self::Malformed => write!(f, "Malformed routing header"),
            Self::Duplicate => write!(f, "Duplicate packet"),
        }
    }
}
