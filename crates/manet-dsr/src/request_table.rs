//! Route request table
//!
//! Two kinds of records share one bounded table:
//!
//! - *seen* records remember, per request source, the last few
//!   (identification, target) pairs so duplicates of a flooded request are
//!   processed once,
//! - *sent* records track the discovery this node is running for a
//!   destination: hop limit, attempt count and backoff.
//!
//! When the table is full the least recently touched record of either kind
//! is evicted.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use manet_core::{NodeAddress, SimTime, TimerToken};
use tracing::trace;

use crate::config::{DiscoveryConfig, RequestTableConfig};
use crate::list::{Links, List};
use crate::pool::{EntryPool, Handle};

/// Requests recently seen from one source
#[derive(Debug, Clone)]
pub struct SeenEntry {
    pub source: NodeAddress,
    ids: VecDeque<(u16, NodeAddress)>,
}

impl SeenEntry {
    pub fn contains(&self, identification: u16, target: NodeAddress) -> bool {
        self.ids.contains(&(identification, target))
    }

    /// Remembered (identification, target) pairs, oldest first
    pub fn ids(&self) -> impl Iterator<Item = &(u16, NodeAddress)> {
        self.ids.iter()
    }
}

/// An outstanding route discovery
#[derive(Debug, Clone)]
pub struct SentEntry {
    pub destination: NodeAddress,
    /// Hop limit of the last request
    pub ttl: u8,
    /// Requests sent in the current round
    pub count: u32,
    /// Wait before the next retry
    pub backoff: Duration,
    /// When the last request left
    pub last_sent: SimTime,
    /// Pending retry check
    pub retry_timer: Option<TimerToken>,
}

impl SentEntry {
    /// Start a fresh round with a non-propagating request
    pub fn restart(&mut self, now: SimTime, config: &DiscoveryConfig) {
        self.ttl = config.non_propagating_ttl;
        self.count = 1;
        self.backoff = config.non_propagating_timeout;
        self.last_sent = now;
    }

    /// Account for a propagating retry sent at `now`
    pub fn record_retry(&mut self, now: SimTime, config: &DiscoveryConfig) {
        self.last_sent = now;
        self.count += 1;
        self.ttl = config.propagating_ttl;
        self.backoff = if self.backoff * 2 <= config.max_request_period {
            if self.count == 2 {
                config.request_period
            } else {
                self.backoff * 2
            }
        } else {
            config.max_request_period
        };
    }

    /// Retries are used up and discovery should start over
    pub fn exhausted(&self, config: &DiscoveryConfig) -> bool {
        self.count > config.max_request_retransmissions + 1
    }

    /// The backoff has strictly elapsed
    pub fn backoff_elapsed(&self, now: SimTime) -> bool {
        now > self.last_sent + self.backoff
    }

    /// A retry is due
    pub fn retry_due(&self, now: SimTime) -> bool {
        now >= self.last_sent + self.backoff
    }
}

#[derive(Debug)]
enum Record {
    Seen(SeenEntry),
    Sent(SentEntry),
}

#[derive(Debug)]
struct Slot {
    record: Record,
    lru: Links,
}

fn lru_links(slot: &mut Slot) -> &mut Links {
    &mut slot.lru
}

/// Bounded table of seen and sent route requests
#[derive(Debug)]
pub struct RequestTable {
    slots: EntryPool<Slot>,
    lru: List,
    seen: HashMap<NodeAddress, Handle>,
    sent: HashMap<NodeAddress, Handle>,
    capacity: usize,
    ids_per_source: usize,
    orphaned_timers: Vec<TimerToken>,
}

impl RequestTable {
    pub fn new(config: &RequestTableConfig) -> Self {
        Self {
            slots: EntryPool::with_chunk(config.capacity),
            lru: List::default(),
            seen: HashMap::new(),
            sent: HashMap::new(),
            capacity: config.capacity.max(1),
            ids_per_source: config.ids_per_source.max(1),
            orphaned_timers: Vec::new(),
        }
    }

    /// Whether (identification, target) from `source` was already processed
    pub fn check_seen(&self, source: NodeAddress, identification: u16, target: NodeAddress) -> bool {
        self.seen_entry(source)
            .is_some_and(|entry| entry.contains(identification, target))
    }

    /// Remember a request. Returns `false` if it was already remembered.
    pub fn add_seen(&mut self, source: NodeAddress, identification: u16, target: NodeAddress) -> bool {
        let ids_per_source = self.ids_per_source;
        if let Some(&handle) = self.seen.get(&source) {
            self.lru.move_to_back(&mut self.slots, handle, lru_links);
            let Record::Seen(entry) = &mut self.slots[handle].record else {
                return false;
            };
            if entry.contains(identification, target) {
                return false;
            }
            if entry.ids.len() >= ids_per_source {
                entry.ids.pop_front();
            }
            entry.ids.push_back((identification, target));
            return true;
        }

        let mut ids = VecDeque::with_capacity(ids_per_source);
        ids.push_back((identification, target));
        let handle = self.allocate(Record::Seen(SeenEntry { source, ids }));
        self.seen.insert(source, handle);
        true
    }

    pub fn seen_entry(&self, source: NodeAddress) -> Option<&SeenEntry> {
        let handle = self.seen.get(&source)?;
        match &self.slots.get(*handle)?.record {
            Record::Seen(entry) => Some(entry),
            Record::Sent(_) => None,
        }
    }

    /// Create or reset the discovery record for `destination`, starting a
    /// non-propagating round at `now`.
    ///
    /// The previous retry timer, if any, is left in place for the caller
    /// to cancel.
    pub fn add_sent(
        &mut self,
        destination: NodeAddress,
        now: SimTime,
        config: &DiscoveryConfig,
    ) -> &mut SentEntry {
        let handle = match self.sent.get(&destination) {
            Some(&handle) => {
                self.lru.move_to_back(&mut self.slots, handle, lru_links);
                handle
            }
            None => {
                let handle = self.allocate(Record::Sent(SentEntry {
                    destination,
                    ttl: config.non_propagating_ttl,
                    count: 1,
                    backoff: config.non_propagating_timeout,
                    last_sent: now,
                    retry_timer: None,
                }));
                self.sent.insert(destination, handle);
                handle
            }
        };

        let entry = self.sent_slot_mut(handle);
        entry.restart(now, config);
        entry
    }

    pub fn sent(&self, destination: NodeAddress) -> Option<&SentEntry> {
        let handle = self.sent.get(&destination)?;
        match &self.slots.get(*handle)?.record {
            Record::Sent(entry) => Some(entry),
            Record::Seen(_) => None,
        }
    }

    /// Mutable access to a discovery record; counts as a touch
    pub fn sent_mut(&mut self, destination: NodeAddress) -> Option<&mut SentEntry> {
        let handle = *self.sent.get(&destination)?;
        self.lru.move_to_back(&mut self.slots, handle, lru_links);
        Some(self.sent_slot_mut(handle))
    }

    /// Replace the retry timer of a discovery without touching it,
    /// returning the previous one
    pub fn set_retry_timer(
        &mut self,
        destination: NodeAddress,
        token: Option<TimerToken>,
    ) -> Option<TimerToken> {
        let handle = *self.sent.get(&destination)?;
        std::mem::replace(&mut self.sent_slot_mut(handle).retry_timer, token)
    }

    /// Forget the discovery for `destination`
    pub fn delete_sent(&mut self, destination: NodeAddress) -> Option<SentEntry> {
        let handle = self.sent.remove(&destination)?;
        self.lru.unlink(&mut self.slots, handle, lru_links);
        match self.slots.remove(handle)?.record {
            Record::Sent(entry) => Some(entry),
            Record::Seen(_) => None,
        }
    }

    /// Retry timers of discovery records lost to eviction
    pub fn take_orphaned_timers(&mut self) -> Vec<TimerToken> {
        std::mem::take(&mut self.orphaned_timers)
    }

    /// Total records of both kinds
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    pub fn sent_len(&self) -> usize {
        self.sent.len()
    }

    fn sent_slot_mut(&mut self, handle: Handle) -> &mut SentEntry {
        match &mut self.slots[handle].record {
            Record::Sent(entry) => entry,
            Record::Seen(_) => unreachable!("sent index points at a seen record"),
        }
    }

    fn allocate(&mut self, record: Record) -> Handle {
        if self.slots.len() >= self.capacity {
            self.evict_lru();
        }
        let handle = self.slots.insert(Slot {
            record,
            lru: Links::default(),
        });
        self.lru.push_back(&mut self.slots, handle, lru_links);
        handle
    }

    fn evict_lru(&mut self) {
        let Some(head) = self.lru.head() else {
            return;
        };
        self.lru.unlink(&mut self.slots, head, lru_links);
        match self.slots.remove(head).map(|slot| slot.record) {
            Some(Record::Seen(entry)) => {
                trace!(source = %entry.source, "Evicted seen requests");
                self.seen.remove(&entry.source);
            }
            Some(Record::Sent(entry)) => {
                trace!(dest = %entry.destination, "Evicted outstanding discovery");
                self.sent.remove(&entry.destination);
                self.orphaned_timers.extend(entry.retry_timer);
            }
            None => {}
        }
    }
}
