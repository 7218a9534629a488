//! Send buffer
//!
//! Holds packets that are waiting for a route, ordered by destination so a
//! newly learned route can flush everything for its destination at once.
//! Each packet carries the token of its expiry timer.

use manet_core::{Datagram, DatagramKey, NodeAddress, SimTime, TimerToken};

use crate::config::SendBufferConfig;
use crate::error::SendBufferError;

/// A packet waiting for a route
#[derive(Debug, Clone)]
pub struct BufferedPacket {
    pub datagram: Datagram,
    pub destination: NodeAddress,
    pub inserted_at: SimTime,
    /// Expiry timer armed for this packet
    pub timer: TimerToken,
}

/// Destination-ordered buffer bounded by packet count or bytes
#[derive(Debug)]
pub struct SendBuffer {
    packets: Vec<BufferedPacket>,
    bytes: usize,
    max_packets: usize,
    max_bytes: usize,
}

impl SendBuffer {
    pub fn new(config: &SendBufferConfig) -> Self {
        Self {
            packets: Vec::new(),
            bytes: 0,
            max_packets: config.max_packets,
            max_bytes: config.max_bytes,
        }
    }

    /// Whether `datagram` would be refused
    fn would_overflow(&self, datagram: &Datagram) -> bool {
        if self.max_bytes == 0 {
            self.packets.len() >= self.max_packets
        } else {
            self.bytes + datagram.len() > self.max_bytes
        }
    }

    /// Buffer a packet behind any already queued for the same destination
    pub fn insert(
        &mut self,
        datagram: Datagram,
        now: SimTime,
        timer: TimerToken,
    ) -> Result<(), SendBufferError> {
        if self.would_overflow(&datagram) {
            return Err(SendBufferError::Full {
                packets: self.packets.len(),
                bytes: self.bytes,
            });
        }

        let destination = datagram.destination;
        let index = self
            .packets
            .partition_point(|packet| packet.destination <= destination);
        self.bytes += datagram.len();
        self.packets.insert(
            index,
            BufferedPacket {
                datagram,
                destination,
                inserted_at: now,
                timer,
            },
        );
        Ok(())
    }

    /// Remove and return every packet for `destination`, oldest first
    pub fn drain_for(&mut self, destination: NodeAddress) -> Vec<BufferedPacket> {
        let start = self
            .packets
            .partition_point(|packet| packet.destination < destination);
        let end = self
            .packets
            .partition_point(|packet| packet.destination <= destination);
        let drained: Vec<_> = self.packets.drain(start..end).collect();
        self.bytes -= drained.iter().map(|p| p.datagram.len()).sum::<usize>();
        drained
    }

    /// Remove the packet identified by `key`, typically when its timer fires
    pub fn remove(&mut self, key: DatagramKey) -> Option<BufferedPacket> {
        let index = self
            .packets
            .iter()
            .position(|packet| packet.datagram.key() == key)?;
        let packet = self.packets.remove(index);
        self.bytes -= packet.datagram.len();
        Some(packet)
    }

    pub fn contains_destination(&self, destination: NodeAddress) -> bool {
        self.packets
            .binary_search_by(|packet| packet.destination.cmp(&destination))
            .is_ok()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Bytes currently buffered, network header included
    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferedPacket> {
        self.packets.iter()
    }
}
