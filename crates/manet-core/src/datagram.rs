//! Network-layer datagram
//!
//! The routing engine sits beside the network layer rather than inside it,
//! so it only needs the handful of header fields it reads or rewrites:
//! addresses, TTL, identification and the protocol number. The payload is
//! owned [`Bytes`], which keeps the duplicate copies held for retransmission
//! cheap.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::address::NodeAddress;

/// Protocol numbers carried in the datagram header
pub mod protocol {
    /// UDP
    pub const UDP: u8 = 17;
    /// Dynamic Source Routing
    pub const DSR: u8 = 48;
}

/// Size of the fixed network-layer header in bytes
pub const IP_HEADER_LEN: usize = 20;

/// Default hop limit for locally generated control traffic
pub const DEFAULT_TTL: u8 = 64;

/// A network-layer packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datagram {
    /// Originating node
    pub source: NodeAddress,
    /// Final destination
    pub destination: NodeAddress,
    /// Remaining hop limit
    pub ttl: u8,
    /// Identification assigned by the originator
    pub id: u16,
    /// Protocol of the payload
    pub protocol: u8,
    /// Everything after the network-layer header
    pub payload: Bytes,
}

impl Datagram {
    /// Create a datagram with the default TTL
    pub fn new(
        source: NodeAddress,
        destination: NodeAddress,
        id: u16,
        protocol: u8,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            source,
            destination,
            ttl: DEFAULT_TTL,
            id,
            protocol,
            payload: payload.into(),
        }
    }

    /// Set the TTL
    pub fn with_ttl(mut self, ttl: u8) -> Self {
        self.ttl = ttl;
        self
    }

    /// Total length on the wire, header included
    pub fn len(&self) -> usize {
        IP_HEADER_LEN + self.payload.len()
    }

    /// A datagram always carries at least its header
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether the payload is a DSR header
    pub fn is_dsr(&self) -> bool {
        self.protocol == protocol::DSR
    }

    /// Key identifying one transmission of this datagram
    pub fn key(&self) -> DatagramKey {
        DatagramKey {
            destination: self.destination,
            source: self.source,
            id: self.id,
        }
    }
}

/// Identifies a datagram independently of its (rewritten) payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatagramKey {
    pub destination: NodeAddress,
    pub source: NodeAddress,
    pub id: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(n: u8) -> NodeAddress {
        NodeAddress::from_octets(10, 0, 0, n)
    }

    #[test]
    fn test_length_includes_header() {
        let datagram = Datagram::new(addr(1), addr(2), 7, protocol::UDP, vec![0u8; 100]);
        assert_eq!(datagram.len(), IP_HEADER_LEN + 100);
        assert_eq!(datagram.ttl, DEFAULT_TTL);
        assert!(!datagram.is_dsr());
    }

    #[test]
    fn test_key_ignores_payload_and_ttl() {
        let a = Datagram::new(addr(1), addr(2), 7, protocol::UDP, &b"one"[..]);
        let b = Datagram::new(addr(1), addr(2), 7, protocol::DSR, &b"two"[..]).with_ttl(3);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_serde_roundtrip() {
        let datagram = Datagram::new(addr(3), addr(9), 42, protocol::DSR, &b"\x00\x00\x00\x00"[..]);
        let json = serde_json::to_string(&datagram).unwrap();
        let back: Datagram = serde_json::from_str(&json).unwrap();
        assert_eq!(back, datagram);
    }
}
