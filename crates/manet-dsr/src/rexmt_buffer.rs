//! Retransmission buffer
//!
//! Every unicast transmission leaves a copy here until the link layer
//! reports the outcome. A success for a next hop clears everything sent to
//! it; a failure looks the copy up to retry it or to start route
//! maintenance.

use manet_core::{Datagram, DatagramKey, NodeAddress, SimTime};

/// A transmission awaiting confirmation
#[derive(Debug, Clone)]
pub struct RexmtEntry {
    /// Copy of the datagram as it was handed to the link layer
    pub datagram: Datagram,
    pub key: DatagramKey,
    pub next_hop: NodeAddress,
    /// Retransmissions so far
    pub count: u32,
    /// Time of the last (re)transmission
    pub timestamp: SimTime,
}

/// Destination-ordered, bounded buffer of unconfirmed transmissions
#[derive(Debug)]
pub struct RexmtBuffer {
    entries: Vec<RexmtEntry>,
    capacity: usize,
}

impl RexmtBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
        }
    }

    /// Track a transmission. Returns `false`, keeping nothing, when full.
    pub fn insert(&mut self, datagram: Datagram, next_hop: NodeAddress, now: SimTime) -> bool {
        if self.entries.len() >= self.capacity {
            return false;
        }

        let key = datagram.key();
        let index = self
            .entries
            .partition_point(|entry| entry.key.destination <= key.destination);
        self.entries.insert(
            index,
            RexmtEntry {
                datagram,
                key,
                next_hop,
                count: 0,
                timestamp: now,
            },
        );
        true
    }

    pub fn find_mut(&mut self, key: DatagramKey, next_hop: NodeAddress) -> Option<&mut RexmtEntry> {
        self.entries
            .iter_mut()
            .find(|entry| entry.key == key && entry.next_hop == next_hop)
    }

    pub fn remove(&mut self, key: DatagramKey, next_hop: NodeAddress) -> Option<RexmtEntry> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.key == key && entry.next_hop == next_hop)?;
        Some(self.entries.remove(index))
    }

    /// Drop every entry sent to `next_hop`
    pub fn remove_by_next_hop(&mut self, next_hop: NodeAddress) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.next_hop != next_hop);
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RexmtEntry> {
        self.entries.iter()
    }
}
