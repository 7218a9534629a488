//! Route cache
//!
//! Multi-path store of source routes, keyed by destination. Every entry is a
//! member of two lists at once:
//!
//! - its hash bucket, ordered by (destination, hop count) so the first entry
//!   found for a destination is the shortest route,
//! - the recency list, oldest first, which drives age eviction.
//!
//! Paths exclude the owning node and end at the destination, so the hop
//! count of an entry is simply its path length.

use std::time::Duration;

use manet_core::{NodeAddress, SimTime, TimerToken};
use tracing::trace;

use crate::codec::{MAX_OPTION_DATA_LEN, SourceRoute};
use crate::config::RouteCacheConfig;
use crate::list::{Links, List};
use crate::pool::{EntryPool, Handle};

/// Longest path, in bytes, a source route option can carry
const MAX_PATH_BYTES: usize = MAX_OPTION_DATA_LEN - SourceRoute::FIXED_DATA_LEN;

/// A cached route
#[derive(Debug, Clone)]
pub struct RouteEntry {
    /// Last address of the path
    pub destination: NodeAddress,
    /// Hops from the first neighbour to the destination
    pub path: Vec<NodeAddress>,
    /// Last time the route was inserted or refreshed
    pub timestamp: SimTime,
    bucket: Links,
    recency: Links,
}

impl RouteEntry {
    pub fn hop_count(&self) -> usize {
        self.path.len()
    }

    /// First hop of the route
    pub fn next_hop(&self) -> NodeAddress {
        self.path[0]
    }

    fn key(&self) -> (NodeAddress, usize) {
        (self.destination, self.path.len())
    }
}

fn bucket_links(entry: &mut RouteEntry) -> &mut Links {
    &mut entry.bucket
}

fn bucket_links_ref(entry: &RouteEntry) -> &Links {
    &entry.bucket
}

fn recency_links(entry: &mut RouteEntry) -> &mut Links {
    &mut entry.recency
}

fn recency_links_ref(entry: &RouteEntry) -> &Links {
    &entry.recency
}

/// Result of [`RouteCache::insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new entry was created
    Inserted,
    /// The identical path was already cached; its age was reset
    Refreshed,
    /// Empty path, or too long for a source route option
    Rejected,
}

/// Result of [`RouteCache::age_sweep`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Entries removed by this sweep
    pub evicted: usize,
    /// Time until the oldest remaining entry expires
    pub next_expiry: Option<Duration>,
}

/// Route cache for a single node
#[derive(Debug)]
pub struct RouteCache {
    entries: EntryPool<RouteEntry>,
    buckets: Vec<List>,
    recency: List,
    timeout: Duration,
    /// Armed eviction timer, if any
    pub(crate) sweep_timer: Option<TimerToken>,
}

impl RouteCache {
    pub fn new(config: &RouteCacheConfig) -> Self {
        Self {
            entries: EntryPool::with_chunk(config.pool_chunk),
            buckets: vec![List::default(); config.buckets.max(1)],
            recency: List::default(),
            timeout: config.timeout,
            sweep_timer: None,
        }
    }

    fn bucket_of(&self, destination: NodeAddress) -> usize {
        destination.as_u32() as usize % self.buckets.len()
    }

    /// Cache `path`, which must end at its destination.
    pub fn insert(&mut self, path: &[NodeAddress], now: SimTime) -> InsertOutcome {
        let Some(&destination) = path.last() else {
            return InsertOutcome::Rejected;
        };
        if path.len() * NodeAddress::WIRE_LEN > MAX_PATH_BYTES {
            return InsertOutcome::Rejected;
        }

        let bucket = self.bucket_of(destination);
        let key = (destination, path.len());
        let mut before = None;
        let mut existing = None;
        for handle in self.buckets[bucket].iter(&self.entries, bucket_links_ref) {
            let entry = &self.entries[handle];
            if entry.key() == key && entry.path == path {
                existing = Some(handle);
                break;
            }
            if entry.key() > key {
                before = Some(handle);
                break;
            }
        }

        if let Some(handle) = existing {
            self.entries[handle].timestamp = now;
            self.recency
                .move_to_back(&mut self.entries, handle, recency_links);
            trace!(dest = %destination, hops = path.len(), "Refreshed cached route");
            return InsertOutcome::Refreshed;
        }

        let handle = self.entries.insert(RouteEntry {
            destination,
            path: path.to_vec(),
            timestamp: now,
            bucket: Links::default(),
            recency: Links::default(),
        });
        self.buckets[bucket].insert_before(&mut self.entries, handle, before, bucket_links);
        self.recency.push_back(&mut self.entries, handle, recency_links);
        trace!(dest = %destination, hops = path.len(), "Cached route");
        InsertOutcome::Inserted
    }

    /// Shortest cached route to `destination`
    pub fn lookup(&self, destination: NodeAddress) -> Option<&RouteEntry> {
        let bucket = self.bucket_of(destination);
        self.buckets[bucket]
            .iter(&self.entries, bucket_links_ref)
            .map(|handle| &self.entries[handle])
            .find(|entry| entry.destination == destination)
    }

    /// Every cached route to `destination`, shortest first
    pub fn routes_to(&self, destination: NodeAddress) -> Vec<&RouteEntry> {
        let bucket = self.bucket_of(destination);
        self.buckets[bucket]
            .iter(&self.entries, bucket_links_ref)
            .map(|handle| &self.entries[handle])
            .filter(|entry| entry.destination == destination)
            .collect()
    }

    /// Remove every route that uses the link `from -> to`.
    ///
    /// When `from` is the owning node the link is the route's first hop.
    /// Otherwise only the first occurrence of `from` in a path is checked.
    pub fn delete_by_link(&mut self, local: NodeAddress, from: NodeAddress, to: NodeAddress) -> usize {
        let broken: Vec<Handle> = self
            .entries
            .iter()
            .filter(|(_, entry)| {
                if from == local {
                    entry.path.first() == Some(&to)
                } else {
                    entry
                        .path
                        .iter()
                        .position(|hop| *hop == from)
                        .and_then(|i| entry.path.get(i + 1))
                        == Some(&to)
                }
            })
            .map(|(handle, _)| handle)
            .collect();

        for handle in &broken {
            self.remove(*handle);
        }
        if !broken.is_empty() {
            trace!(from = %from, to = %to, removed = broken.len(), "Removed routes over broken link");
        }
        broken.len()
    }

    /// Evict every entry whose age has reached the timeout.
    pub fn age_sweep(&mut self, now: SimTime) -> SweepOutcome {
        let mut evicted = 0;
        while let Some(head) = self.recency.head() {
            if self.entries[head].timestamp + self.timeout > now {
                break;
            }
            self.remove(head);
            evicted += 1;
        }

        let next_expiry = self
            .recency
            .head()
            .map(|head| (self.entries[head].timestamp + self.timeout).saturating_sub(now));
        SweepOutcome {
            evicted,
            next_expiry,
        }
    }

    /// Route lifetime
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries from least to most recently refreshed
    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.recency
            .iter(&self.entries, recency_links_ref)
            .map(|handle| &self.entries[handle])
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.buckets.iter_mut().for_each(List::clear);
        self.recency.clear();
    }

    fn remove(&mut self, handle: Handle) {
        let bucket = self.bucket_of(self.entries[handle].destination);
        self.buckets[bucket].unlink(&mut self.entries, handle, bucket_links);
        self.recency.unlink(&mut self.entries, handle, recency_links);
        self.entries.remove(handle);
    }
}
